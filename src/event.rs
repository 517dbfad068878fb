// event.rs — 核心向展示层发送的通知
// 后台任务只通过这个通道与展示层通信，不直接修改界面状态

use std::path::PathBuf;
use tokio::sync::mpsc;

/// 进度条的当前状态
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProgressState {
    /// 当前阶段（1..=阶段数），0 表示空闲
    pub stage_index: usize,
    /// 百分比 0..=100
    pub percent: u8,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchEvent {
    /// 模拟进度更新
    Progress(ProgressState),
    /// 新图片已写入工作目录
    ImageReady { file_name: String, path: PathBuf },
    /// 搜索或下载失败，消息可直接展示给用户
    Error { message: String },
    /// 用户取消了目录选择
    DownloadCancelled,
}

pub type EventSender = mpsc::UnboundedSender<SearchEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<SearchEvent>;

pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
