// main.rs — 程序入口
// 负责初始化日志与异步运行时、解析命令行参数、分发子命令

mod category;
mod cli;
mod config;
mod error;
mod event;
mod fetcher;
mod parser;
mod picker;
mod pipeline;
mod progress;
mod session;
mod store;
#[cfg(test)]
mod test_support;
mod view;

// 初始化多语言支持，嵌入 locales 目录下的所有翻译
rust_i18n::i18n!("locales", fallback = "en");

use category::{CategoryResolver, Taxonomy};
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Commands, ConfigAction};
use config::AppConfig;
use error::{DownloadError, SearchError};
use event::EventReceiver;
use fetcher::HttpFetcher;
use parser::HtmlPageParser;
use picker::{StdinLines, TerminalPicker, prompt};
use pipeline::SearchPipeline;
use rust_i18n::t;
use session::{SearchHandle, Session};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use store::ImageStore;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    // 自动检测系统语言并设置
    let locale = std::env::var("LANG").unwrap_or_else(|_| "en".to_string());
    if locale.starts_with("zh") {
        rust_i18n::set_locale("zh-CN");
    } else {
        rust_i18n::set_locale("en");
    }

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", t!("error_message", message => e));
            ExitCode::FAILURE
        }
    }
}

/// 日志写到 stderr，默认只输出警告；RUST_LOG 优先于 -v
fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("bingwall={level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let mut config = AppConfig::new();

    match &cli.command {
        Commands::Search { main, sub, to } => {
            let (mut session, mut events) = open_session(&config, to.as_deref(), StdinLines::spawn()).await?;
            let handle = session.on_search(main, sub.as_deref());
            let code = fetch_and_download(&mut session, &mut events, handle).await;
            session.shutdown().await?;
            return code;
        }

        Commands::Random { to } => {
            let (mut session, mut events) = open_session(&config, to.as_deref(), StdinLines::spawn()).await?;
            let handle = session.on_random();
            let code = fetch_and_download(&mut session, &mut events, handle).await;
            session.shutdown().await?;
            return code;
        }

        Commands::Session { to } => {
            handle_session(&config, to.as_deref()).await?;
        }

        Commands::Categories => print_categories(&config.taxonomy),

        Commands::Completions { shell } => {
            generate(
                *shell,
                &mut Cli::command(),
                "bingwall",
                &mut std::io::stdout(),
            );
        }

        Commands::Config { action } => handle_config(&mut config, action)?,

        Commands::Clean => handle_clean(&config).await?,
    }

    Ok(ExitCode::SUCCESS)
}

/// 组装核心组件并创建会话
async fn open_session(
    config: &AppConfig,
    to: Option<&Path>,
    lines: StdinLines,
) -> Result<(Session, EventReceiver), Box<dyn std::error::Error>> {
    let taxonomy = Arc::new(config.taxonomy.clone());
    let pipeline = SearchPipeline::new(
        CategoryResolver::new(config.domain.clone(), Arc::clone(&taxonomy)),
        Arc::new(HttpFetcher::new(config.timeout, config.retries)?),
        Arc::new(HtmlPageParser::new(&config.markup)?),
        config.progress.clone(),
    );

    let (tx, rx) = event::channel();
    let picker = TerminalPicker::new(lines);
    let mut session = Session::start(
        taxonomy,
        pipeline,
        ImageStore::new(&config.workspace_dir),
        Box::new(picker),
        tx,
    )
    .await?;

    // 命令行参数 > 配置文件
    if let Some(dir) = to.map(Path::to_path_buf).or_else(|| config.download_dir.clone()) {
        session.set_download_dir(dir);
    }
    Ok((session, rx))
}

/// 单次模式：搜索一张图，成功后直接下载
async fn fetch_and_download(
    session: &mut Session,
    events: &mut EventReceiver,
    handle: Result<SearchHandle, SearchError>,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let handle = match handle {
        Ok(handle) => handle,
        Err(e) => {
            println!("{}", t!("error_message", message => e));
            return Ok(ExitCode::FAILURE);
        }
    };

    match view::follow_search(handle, events).await {
        Ok(_) => {}
        Err(SearchError::Cancelled) => return Ok(ExitCode::SUCCESS),
        // 错误消息已经由事件输出
        Err(_) => return Ok(ExitCode::FAILURE),
    }

    let code = match session.on_download().await {
        Ok(path) => {
            println!("{}", t!("saved", path => path.display()));
            ExitCode::SUCCESS
        }
        Err(DownloadError::NoDirectoryChosen) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    };
    view::flush_events(events);
    Ok(code)
}

/// 交互式会话：一次只保留一张图，下载目录在会话内沿用
async fn handle_session(config: &AppConfig, to: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    // 会话命令与目录选择共用同一个输入队列
    let lines = StdinLines::spawn();
    let (mut session, mut events) = open_session(config, to, lines.clone()).await?;

    println!("{}", t!("session_help"));
    loop {
        prompt("> ");
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!();
            break;
        };

        let words: Vec<&str> = line.split_whitespace().collect();
        match words.as_slice() {
            [] => continue,
            ["search", main] => {
                let handle = session.on_search(main, None);
                if !session_search(&mut events, handle).await {
                    break;
                }
            }
            ["search", main, sub] => {
                let handle = session.on_search(main, Some(*sub));
                if !session_search(&mut events, handle).await {
                    break;
                }
            }
            ["random"] => {
                let handle = session.on_random();
                if !session_search(&mut events, handle).await {
                    break;
                }
            }
            ["download"] => {
                if let Ok(path) = session.on_download().await {
                    println!("{}", t!("saved", path => path.display()));
                }
                view::flush_events(&mut events);
            }
            ["dir", rest @ ..] if !rest.is_empty() => {
                let dir = PathBuf::from(shellexpand::tilde(&rest.join(" ")).into_owned());
                println!("{}", t!("dir_set", path => dir.display()));
                session.set_download_dir(dir);
            }
            ["show"] => {
                match session.resident_path() {
                    Some(path) => println!("{}", path.display()),
                    None => println!("{}", t!("no_image")),
                }
                let dir = session
                    .download_target()
                    .directory
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| t!("config_ask").to_string());
                println!("{}", t!("current_dir", path => dir));
            }
            ["categories"] => print_categories(session.taxonomy()),
            ["help"] => println!("{}", t!("session_help")),
            ["quit"] | ["exit"] => break,
            _ => println!("{}", t!("unknown_command", line => line.trim())),
        }
    }

    session.shutdown().await?;
    Ok(())
}

/// 在会话中跟随一次搜索；返回 `false` 表示用户按了 Ctrl-C，会话应当结束
async fn session_search(events: &mut EventReceiver, handle: Result<SearchHandle, SearchError>) -> bool {
    match handle {
        Ok(handle) => match view::follow_search(handle, events).await {
            Ok(found) => println!("{}", t!("image_url", url => found.image_url)),
            Err(SearchError::Cancelled) => return false,
            Err(_) => {}
        },
        Err(e) => println!("{}", t!("error_message", message => e)),
    }
    true
}

fn print_categories(taxonomy: &Taxonomy) {
    println!("{}", t!("categories_title"));
    for entry in taxonomy.entries() {
        let subs: Vec<&str> = entry
            .subs
            .iter()
            .filter(|s| !s.eq_ignore_ascii_case(&entry.name))
            .map(String::as_str)
            .collect();
        if subs.is_empty() {
            println!("  {}", entry.name);
        } else {
            println!("  {}: {}", entry.name, subs.join(", "));
        }
    }
}

/// 处理 clean 子命令：清空并移除遗留的工作目录
async fn handle_clean(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut store = ImageStore::new(&config.workspace_dir);
    if !store.workspace().exists() {
        println!("{}", t!("clean_nothing", path => store.workspace().display()));
        return Ok(());
    }

    println!("{}", t!("cleaning_dir", path => store.workspace().display()));
    let report = store.clear_workspace().await?;
    for path in &report.skipped {
        println!("  {} {}", t!("skipped"), path.display());
    }
    if report.skipped.is_empty() {
        store.teardown_workspace().await?;
    }

    println!("{}", t!("clean_done", count => report.removed));
    Ok(())
}

/// 处理 config 子命令：查看或修改配置
fn handle_config(config: &mut AppConfig, action: &ConfigAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ConfigAction::Show => {
            println!("{}", t!("config_title"));
            println!("{}", t!("config_path", path => config.config_path.display()));
            println!("{}", t!("config_domain", domain => config.domain));
            println!("{}", t!("config_workspace", path => config.workspace_dir.display()));
            let dir = config
                .download_dir
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| t!("config_ask").to_string());
            println!("{}", t!("config_download_dir", path => dir));
            println!(
                "{}",
                t!("config_tick", ms => config.progress.tick_interval.as_millis())
            );
            println!(
                "{}",
                t!("config_timeout", secs => config.timeout.as_secs(), retries => config.retries)
            );
        }
        ConfigAction::Schema => {
            println!("{}", AppConfig::get_schema());
        }
        ConfigAction::Dump => {
            println!("{}", config.to_toml());
        }
        ConfigAction::Set { key, value } => {
            config.set(key, value)?;
            config.save()?;
            println!("{}", t!("config_updated", key => key, value => value));
        }
    }
    Ok(())
}
