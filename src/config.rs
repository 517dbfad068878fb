// config.rs — 配置管理模块
// 遵循 Unix 风格：优先从 ~/.config/bingwall/config.toml 读取配置

use crate::category::{CategoryEntry, Taxonomy};
use crate::error::ConfigError;
use crate::parser::MarkupSelectors;
use crate::progress::{DEFAULT_STAGE_LABELS, ProgressConfig};
use schemars::JsonSchema; // 引入用于生成 JSON Schema 的 trait
use serde::{Deserialize, Serialize}; // 引入序列化与反序列化 trait
use shellexpand::tilde; // 用于展开 ~ 和环境变量
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// 展开路径中的 ~ 和环境变量 ($HOME, $XDG_CONFIG_HOME 等)
fn expand_path(path_str: &str) -> PathBuf {
    PathBuf::from(tilde(path_str).into_owned())
}

/// 映射 config.toml 文件内容的嵌套结构体
#[derive(Debug, Deserialize, Serialize, Default, JsonSchema)]
struct ConfigFile {
    #[serde(default)]
    common: CommonConfig,
    #[serde(default)]
    progress: ProgressSection,
    #[serde(default)]
    markup: MarkupSelectors,
    /// 分类体系，不配置则使用站点默认分类
    #[serde(default)]
    taxonomy: Vec<CategoryEntry>,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct CommonConfig {
    /// 站点根地址
    #[serde(default = "default_domain")]
    domain: String,
    /// 临时工作目录，相对路径相对于当前工作目录
    #[serde(default = "default_workspace_dir")]
    workspace_dir: String,
    /// 默认下载目录 (支持 ~、$HOME 等环境变量，相对路径则相对于 $HOME)，不配置则每次会话询问
    #[serde(default)]
    download_dir: Option<String>,
    /// 单次请求超时（秒）
    #[serde(default = "default_timeout_secs")]
    timeout_secs: u64,
    /// 连接失败或超时时的重试次数
    #[serde(default)]
    retries: u32,
}

impl Default for CommonConfig {
    fn default() -> Self {
        Self {
            domain: default_domain(),
            workspace_dir: default_workspace_dir(),
            download_dir: None,
            timeout_secs: default_timeout_secs(),
            retries: 0,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct ProgressSection {
    /// 模拟进度的刷新间隔（毫秒）
    #[serde(default = "default_tick_interval_ms")]
    tick_interval_ms: u64,
    /// 各阶段标签，阶段数等于标签数
    #[serde(default = "default_stage_labels")]
    stage_labels: Vec<String>,
}

impl Default for ProgressSection {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            stage_labels: default_stage_labels(),
        }
    }
}

fn default_domain() -> String {
    "http://www.bingwallpaperhd.com".to_string()
}
fn default_workspace_dir() -> String {
    ".bingwall-workspace".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_tick_interval_ms() -> u64 {
    500
}
fn default_stage_labels() -> Vec<String> {
    DEFAULT_STAGE_LABELS.iter().map(|s| s.to_string()).collect()
}

/// 应用全局配置项
#[derive(Debug)]
pub struct AppConfig {
    /// 站点根地址 (优先级：ENV > TOML)
    pub domain: String,
    /// 临时工作目录
    pub workspace_dir: PathBuf,
    /// 默认下载目录 (优先级：ENV > TOML)
    pub download_dir: Option<PathBuf>,
    pub timeout: Duration,
    pub retries: u32,
    pub progress: ProgressConfig,
    pub markup: MarkupSelectors,
    pub taxonomy: Taxonomy,
    /// 配置文件所在路径
    pub config_path: PathBuf,
    /// 配置文件中的原始分类条目（为空表示使用默认分类）
    taxonomy_entries: Vec<CategoryEntry>,
    home: PathBuf,
}

impl AppConfig {
    /// 初始化配置
    pub fn new() -> Self {
        let home = env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));
        let config_path = home.join(".config").join("bingwall").join("config.toml");

        let mut config = Self::load(&config_path, &home);

        // 优先级：环境变量 > 配置文件内容
        if let Ok(domain) = env::var("BINGWALL_DOMAIN") {
            config.domain = domain.trim_end_matches('/').to_string();
        }
        if let Ok(dir) = env::var("BINGWALL_DOWNLOAD_DIR") {
            config.download_dir = Some(resolve_home_relative(&dir, &home));
        }
        config
    }

    /// 从指定文件加载配置；文件不存在或无法解析时使用默认值
    pub fn load(config_path: &Path, home: &Path) -> Self {
        let file = Self::load_config_from_file(config_path).unwrap_or_default();
        Self::from_file(file, config_path.to_path_buf(), home.to_path_buf())
    }

    fn from_file(file: ConfigFile, config_path: PathBuf, home: PathBuf) -> Self {
        let taxonomy = if file.taxonomy.is_empty() {
            Taxonomy::default()
        } else {
            Taxonomy::new(file.taxonomy.clone())
        };

        let stage_labels = if file.progress.stage_labels.is_empty() {
            default_stage_labels()
        } else {
            file.progress.stage_labels
        };

        Self {
            domain: file.common.domain.trim_end_matches('/').to_string(),
            workspace_dir: expand_path(&file.common.workspace_dir),
            download_dir: file
                .common
                .download_dir
                .as_deref()
                .map(|dir| resolve_home_relative(dir, &home)),
            timeout: Duration::from_secs(file.common.timeout_secs.max(1)),
            retries: file.common.retries,
            progress: ProgressConfig {
                tick_interval: Duration::from_millis(file.progress.tick_interval_ms.max(1)),
                stage_labels,
            },
            markup: file.markup,
            taxonomy,
            config_path,
            taxonomy_entries: file.taxonomy,
            home,
        }
    }

    /// 辅助函数：解析 TOML 配置文件
    fn load_config_from_file(path: &Path) -> Option<ConfigFile> {
        let content = fs::read_to_string(path).ok()?;
        match toml::from_str(&content) {
            Ok(file) => Some(file),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable config file");
                None
            }
        }
    }

    fn to_file(&self) -> ConfigFile {
        ConfigFile {
            common: CommonConfig {
                domain: self.domain.clone(),
                workspace_dir: self.workspace_dir.to_string_lossy().to_string(),
                download_dir: self
                    .download_dir
                    .as_ref()
                    .map(|p| p.to_string_lossy().to_string()),
                timeout_secs: self.timeout.as_secs(),
                retries: self.retries,
            },
            progress: ProgressSection {
                tick_interval_ms: self.progress.tick_interval.as_millis() as u64,
                stage_labels: self.progress.stage_labels.clone(),
            },
            markup: self.markup.clone(),
            taxonomy: self.taxonomy_entries.clone(),
        }
    }

    /// 将配置保存回文件
    pub fn save(&self) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: self.config_path.clone(),
            source,
        };
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let toml_str = toml::to_string_pretty(&self.to_file())?;
        fs::write(&self.config_path, toml_str).map_err(io_err)
    }

    /// 修改单个配置项（不自动保存）
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = || ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        };

        match key {
            "domain" => {
                url::Url::parse(value).map_err(|_| invalid())?;
                self.domain = value.trim_end_matches('/').to_string();
            }
            "download_dir" | "dir" => {
                self.download_dir = if value.is_empty() {
                    None
                } else {
                    Some(resolve_home_relative(value, &self.home))
                };
            }
            "workspace_dir" | "workspace" => {
                if value.is_empty() {
                    return Err(invalid());
                }
                self.workspace_dir = expand_path(value);
            }
            "tick_ms" | "tick_interval_ms" => {
                let ms: u64 = value.parse().map_err(|_| invalid())?;
                if ms == 0 {
                    return Err(invalid());
                }
                self.progress.tick_interval = Duration::from_millis(ms);
            }
            "timeout" | "timeout_secs" => {
                let secs: u64 = value.parse().map_err(|_| invalid())?;
                if secs == 0 {
                    return Err(invalid());
                }
                self.timeout = Duration::from_secs(secs);
            }
            "retries" => self.retries = value.parse().map_err(|_| invalid())?,
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        Ok(())
    }

    /// 获取配置文件的 JSON Schema
    pub fn get_schema() -> String {
        let schema = schemars::schema_for!(ConfigFile);
        serde_json::to_string_pretty(&schema).unwrap_or_default()
    }

    /// 将当前配置转换为 TOML 字符串
    pub fn to_toml(&self) -> String {
        let toml_str = toml::to_string_pretty(&self.to_file())
            .unwrap_or_else(|_| "# Error serializing config".to_string());

        // toml 库不支持带注释序列化，所以手动插入
        toml_str.replace(
            "[markup]",
            "# 站点改版后只需调整这里的 CSS 选择器\n[markup]",
        )
    }
}

/// 相对路径则相对于 $HOME
fn resolve_home_relative(path: &str, home: &Path) -> PathBuf {
    let p = expand_path(path);
    if p.is_absolute() { p } else { home.join(p) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_gives_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = AppConfig::load(&tmp.path().join("none.toml"), tmp.path());

        assert_eq!(config.domain, "http://www.bingwallpaperhd.com");
        assert_eq!(config.workspace_dir, PathBuf::from(".bingwall-workspace"));
        assert_eq!(config.download_dir, None);
        assert_eq!(config.progress.tick_interval, Duration::from_millis(500));
        assert_eq!(config.progress.stage_labels.len(), 4);
        assert_eq!(config.taxonomy, Taxonomy::default());
        assert_eq!(config.markup, MarkupSelectors::default());
    }

    #[test]
    fn file_values_override_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(
            &path,
            r#"
[common]
domain = "https://mirror.test/"
download_dir = "Pictures/walls"
retries = 2

[progress]
tick_interval_ms = 250
stage_labels = ["one", "two"]

[markup]
post = "main.gallery"

[[taxonomy]]
name = "City"
subs = ["Night", "Skyline"]
"#,
        )
        .unwrap();

        let config = AppConfig::load(&path, tmp.path());
        assert_eq!(config.domain, "https://mirror.test");
        assert_eq!(config.download_dir, Some(tmp.path().join("Pictures/walls")));
        assert_eq!(config.retries, 2);
        assert_eq!(config.progress.tick_interval, Duration::from_millis(250));
        assert_eq!(config.progress.stage_labels, vec!["one", "two"]);
        assert_eq!(config.markup.post, "main.gallery");
        assert_eq!(config.markup.item, "div.imgview");
        assert_eq!(config.taxonomy.entries().len(), 1);
        assert_eq!(config.taxonomy.entries()[0].subs, vec!["City", "Night", "Skyline"]);
    }

    #[test]
    fn broken_file_falls_back_to_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(&path, "[common\ndomain = ").unwrap();
        let config = AppConfig::load(&path, tmp.path());
        assert_eq!(config.domain, default_domain());
    }

    #[test]
    fn set_and_save_round_trip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("config.toml");
        let mut config = AppConfig::load(&path, tmp.path());

        config.set("tick_ms", "1000").unwrap();
        config.set("dir", "/srv/walls").unwrap();
        config.save().unwrap();

        let reloaded = AppConfig::load(&path, tmp.path());
        assert_eq!(reloaded.progress.tick_interval, Duration::from_secs(1));
        assert_eq!(reloaded.download_dir, Some(PathBuf::from("/srv/walls")));
        // 未配置分类时不把默认分类写进文件
        assert!(!fs::read_to_string(&path).unwrap().contains("[[taxonomy]]"));
    }

    #[test]
    fn set_rejects_bad_input() {
        let tmp = TempDir::new().unwrap();
        let mut config = AppConfig::load(&tmp.path().join("c.toml"), tmp.path());

        assert!(matches!(config.set("colour", "red"), Err(ConfigError::UnknownKey(_))));
        assert!(matches!(config.set("tick_ms", "0"), Err(ConfigError::InvalidValue { .. })));
        assert!(matches!(config.set("domain", "not a url"), Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn schema_mentions_sections() {
        let schema = AppConfig::get_schema();
        assert!(schema.contains("\"common\""));
        assert!(schema.contains("\"taxonomy\""));
    }
}
