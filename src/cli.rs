// cli.rs — 命令行接口定义模块
// 使用 clap 的 derive 模式定义所有子命令和参数

use clap::{ArgAction, Parser, Subcommand};
use clap_complete::Shell; // Shell 枚举：Bash, Zsh, Fish, Elvish, PowerShell
use std::path::PathBuf;

/// 分类壁纸浏览与下载工具
///
/// 从 bingwallpaperhd.com 的分类中随机抓取一张高清壁纸，
/// 确认后再移动到下载目录。
#[derive(Parser)]
#[command(name = "bingwall")]
#[command(version)]
#[command(author)]
#[command(about = "Random categorized wallpapers from bingwallpaperhd.com")]
pub struct Cli {
    /// 输出更多日志（-v: info, -vv: debug, -vvv: trace）
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 在指定分类中随机抓取一张壁纸并下载
    ///
    /// 用法示例:
    ///   bingwall search nature
    ///   bingwall search nature forest --to ~/Pictures
    Search {
        /// 主分类（如 Nature, Modern, Space）
        main: String,

        /// 子分类（不指定则为整个主分类）
        sub: Option<String>,

        /// 下载目录（不指定则使用配置或询问）
        #[arg(short, long, value_name = "DIR")]
        to: Option<PathBuf>,
    },

    /// 随机选择分类并抓取一张壁纸
    ///
    /// 用法示例:
    ///   bingwall random --to ~/Pictures
    Random {
        /// 下载目录
        #[arg(short, long, value_name = "DIR")]
        to: Option<PathBuf>,
    },

    /// 列出所有分类
    Categories,

    /// 交互式会话：反复搜索，满意后再下载
    ///
    /// 用法示例:
    ///   bingwall session
    Session {
        /// 下载目录
        #[arg(short, long, value_name = "DIR")]
        to: Option<PathBuf>,
    },

    /// 生成 shell 补全脚本（支持 bash, zsh, fish, elvish, powershell）
    ///
    /// 用法示例：
    ///   bingwall completions zsh > ~/.zsh/completions/_bingwall
    Completions {
        /// 目标 shell 类型
        shell: Shell,
    },

    /// 配置管理操作
    ///
    /// 用法示例:
    ///   bingwall config show
    ///   bingwall config set dir ~/Pictures/bing
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// 清理上次异常退出时遗留的临时工作目录
    Clean,
}

/// 配置管理操作
#[derive(Subcommand)]
pub enum ConfigAction {
    /// 查看当前所有配置简报
    Show,
    /// 生成配置文件对应的 JSON Schema
    Schema,
    /// 以 TOML 格式打印当前完整配置内容
    Dump,
    /// 设置配置项的值 (支持: domain, dir, workspace, tick_ms, timeout, retries)
    Set {
        /// 要设置的键
        key: String,
        /// 要设置的值（dir 设为空字符串表示每次询问）
        value: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_search_with_optional_sub() {
        let cli = Cli::try_parse_from(["bingwall", "-vv", "search", "nature", "forest", "--to", "/tmp"]).unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Search { main, sub, to } => {
                assert_eq!(main, "nature");
                assert_eq!(sub.as_deref(), Some("forest"));
                assert_eq!(to, Some(PathBuf::from("/tmp")));
            }
            _ => panic!("expected search"),
        }
    }
}
