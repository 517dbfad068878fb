// picker.rs — 终端下的目录选择器
// 标准输入由一个独立线程读取，交互会话和目录选择共用同一个行队列

use crate::session::DirectoryPicker;
use async_trait::async_trait;
use rust_i18n::t;
use shellexpand::tilde;
use std::future::Future;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tracing::debug;

/// 标准输入的行队列
#[derive(Clone)]
pub struct StdinLines {
    rx: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
}

impl StdinLines {
    /// 启动读取线程
    ///
    /// 使用普通线程而不是 spawn_blocking：阻塞在 read_line 上的线程不会拖住运行时退出
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
            debug!("stdin closed");
        });
        Self {
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    /// 读取下一行；输入结束时返回 `None`
    pub async fn next_line(&self) -> Option<String> {
        self.rx.lock().await.recv().await
    }
}

/// 打印提示符（不换行）
pub fn prompt(text: &str) {
    print!("{text}");
    let _ = std::io::stdout().flush();
}

/// 在终端询问下载目录，空输入表示取消
pub struct TerminalPicker {
    lines: StdinLines,
}

impl TerminalPicker {
    pub fn new(lines: StdinLines) -> Self {
        Self { lines }
    }
}

#[async_trait]
impl DirectoryPicker for TerminalPicker {
    async fn pick_directory(&self) -> Option<PathBuf> {
        prompt(&t!("pick_directory"));
        // 进度条监听过 Ctrl-C 后默认的 SIGINT 行为已失效，这里把它当作取消
        read_directory(&self.lines, tokio::signal::ctrl_c()).await
    }
}

/// 读取一行目录；`interrupt` 先完成或输入为空时视为取消
async fn read_directory<T>(lines: &StdinLines, interrupt: impl Future<Output = T>) -> Option<PathBuf> {
    let line = tokio::select! {
        line = lines.next_line() => line?,
        _ = interrupt => {
            println!();
            return None;
        }
    };
    let answer = line.trim();
    if answer.is_empty() {
        return None;
    }

    let dir = PathBuf::from(tilde(answer).into_owned());
    if let Err(e) = std::fs::create_dir_all(&dir) {
        println!("{}", t!("pick_directory_failed", path => dir.display(), reason => e));
        return None;
    }
    Some(dir)
}
