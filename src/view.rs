// view.rs — 终端展示层
// 消费核心发出的事件，用 indicatif 进度条显示模拟进度

use crate::error::SearchError;
use crate::event::{EventReceiver, SearchEvent};
use crate::parser::SearchResult;
use crate::session::SearchHandle;
use indicatif::{ProgressBar, ProgressStyle};
use rust_i18n::t;
use std::pin::pin;

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:32.cyan/blue}] {pos:>3}% {prefix} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    bar
}

/// 把一个事件画到进度条上
fn render(bar: &ProgressBar, event: SearchEvent) {
    match event {
        SearchEvent::Progress(state) => {
            bar.set_position(u64::from(state.percent));
            if state.stage_index > 0 {
                bar.set_prefix(format!("{}.", state.stage_index));
                bar.set_message(state.label);
            }
        }
        SearchEvent::ImageReady { file_name, path } => {
            bar.set_position(100);
            bar.set_message(file_name);
            bar.println(t!("image_path", path => path.display()).to_string());
        }
        SearchEvent::Error { message } => {
            bar.println(t!("error_message", message => message).to_string());
        }
        SearchEvent::DownloadCancelled => {}
    }
}

/// 跟随一次搜索直到结束，期间持续刷新进度条
///
/// 收到 Ctrl-C 时放弃等待并返回 `Cancelled`，后台任务由会话关闭时取消
pub async fn follow_search(
    handle: SearchHandle,
    events: &mut EventReceiver,
) -> Result<SearchResult, SearchError> {
    let bar = progress_bar();
    let selection = handle.selection().clone();
    bar.println(t!("search_start", main => selection.main, sub => selection.sub).to_string());
    bar.enable_steady_tick(std::time::Duration::from_millis(120));

    let mut task = pin!(handle.wait());
    let result = loop {
        tokio::select! {
            Some(event) = events.recv() => render(&bar, event),
            result = &mut task => break result,
            _ = tokio::signal::ctrl_c() => {
                bar.abandon_with_message(t!("interrupted").to_string());
                return Err(SearchError::Cancelled);
            }
        }
    };

    // 任务结束前发出的事件可能还在队列里
    while let Ok(event) = events.try_recv() {
        render(&bar, event);
    }

    match &result {
        Ok(found) => {
            bar.set_position(100);
            bar.finish_with_message(t!("image_ready", file => found.file_name).to_string());
        }
        Err(_) => bar.finish_and_clear(),
    }
    result
}

/// 输出搜索之外（如下载）产生的事件
pub fn flush_events(events: &mut EventReceiver) {
    while let Ok(event) = events.try_recv() {
        match event {
            SearchEvent::Error { message } => {
                println!("{}", t!("error_message", message => message));
            }
            // 取消选择目录不是错误，不提示
            SearchEvent::DownloadCancelled
            | SearchEvent::Progress(_)
            | SearchEvent::ImageReady { .. } => {}
        }
    }
}
