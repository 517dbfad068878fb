// error.rs — 错误类型定义
// 每类失败只影响单次搜索或下载，不会终止整个会话

use std::path::PathBuf;
use thiserror::Error;

/// 页面结构解析失败
///
/// `reason` 取值固定：`"pagination"`（找不到分页导航）或 `"no-images"`（找不到图片）
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("could not parse page: {reason}")]
pub struct ParseError {
    pub reason: &'static str,
}

impl ParseError {
    pub const PAGINATION: &'static str = "pagination";
    pub const NO_IMAGES: &'static str = "no-images";

    pub fn pagination() -> Self {
        Self { reason: Self::PAGINATION }
    }

    pub fn no_images() -> Self {
        Self { reason: Self::NO_IMAGES }
    }
}

/// 工作目录（临时存储区）相关的文件系统错误
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("filesystem error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("workspace {0} is not empty")]
    WorkspaceNotEmpty(PathBuf),

    #[error("invalid image file name: {0:?}")]
    InvalidFileName(String),
}

impl StoreError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// 一次搜索流程可能出现的错误
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("\"{sub}\" is not a sub-category of \"{main}\"")]
    InvalidCategory { main: String, sub: String },

    #[error("failed to load {url}: {cause}")]
    PageLoadFailed { url: String, cause: String },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("another search is still running")]
    Busy,

    #[error("search cancelled")]
    Cancelled,
}

impl SearchError {
    pub fn page_load_failed(url: &str, cause: impl std::fmt::Display) -> Self {
        Self::PageLoadFailed {
            url: url.to_string(),
            cause: cause.to_string(),
        }
    }
}

/// 下载（从工作目录移动到目标目录）的结果错误
///
/// `NoDirectoryChosen` 不是真正的失败：用户取消了目录选择，调用方应静默放弃
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("no image selected")]
    NoImageSelected,

    #[error("no directory chosen")]
    NoDirectoryChosen,

    #[error("another search is still running")]
    Busy,

    #[error(transparent)]
    Filesystem(#[from] StoreError),
}

/// 配置读写错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot write config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("unknown config key: {0}")]
    UnknownKey(String),

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("invalid selector {selector:?}: {reason}")]
    Selector { selector: String, reason: String },
}
