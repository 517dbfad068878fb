// progress.rs — 模拟进度
// 进度只按时间推进，和真实的抓取进度无关，只用于让用户感觉程序在工作

use crate::event::{EventSender, ProgressState, SearchEvent};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(500);

pub const DEFAULT_STAGE_LABELS: [&str; 4] = [
    "Fetching random page...",
    "Fetching random image...",
    "Opening image...",
    "Downloading image...",
];

/// 模拟进度配置
#[derive(Debug, Clone)]
pub struct ProgressConfig {
    pub tick_interval: Duration,
    /// 每个阶段的标签，阶段数等于标签数
    pub stage_labels: Vec<String>,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            stage_labels: DEFAULT_STAGE_LABELS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// 进度曲线：每一跳把"下一个阶段边界"推进一个步长（最多到 100），
/// 然后把百分比移到当前值与边界的中点，所以永远到不了 100
#[derive(Debug, Clone)]
pub struct ProgressCurve {
    step: u32,
    percent: u32,
    boundary: u32,
    stage_count: usize,
}

impl ProgressCurve {
    pub fn new(stage_count: usize) -> Self {
        let stage_count = stage_count.max(1);
        Self {
            step: (100 / stage_count as u32).max(1),
            percent: 0,
            boundary: 0,
            stage_count,
        }
    }

    /// 前进一跳，返回 `(百分比, 阶段下标)`；百分比没有变化时返回 `None`
    pub fn tick(&mut self) -> Option<(u32, usize)> {
        if self.percent >= 100 {
            return None;
        }

        // 严格大于当前边界和当前百分比的下一个步长倍数
        let floor = self.boundary.max(self.percent);
        let next = (floor / self.step + 1) * self.step;
        self.boundary = next.min(100);

        let percent = (self.percent + self.boundary) / 2;
        if percent <= self.percent {
            return None;
        }
        self.percent = percent;

        let stage = ((self.boundary / self.step) as usize)
            .saturating_sub(1)
            .min(self.stage_count - 1);
        Some((percent, stage))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulatorState {
    Idle,
    Running,
    Stopped,
}

/// 后台定时任务，按固定间隔发出进度事件
pub struct ProgressSimulator {
    config: ProgressConfig,
    state: SimulatorState,
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
    events: Option<EventSender>,
}

impl ProgressSimulator {
    pub fn new(config: ProgressConfig) -> Self {
        Self {
            config,
            state: SimulatorState::Idle,
            token: CancellationToken::new(),
            task: None,
            events: None,
        }
    }

    /// 进入 Running 状态并开始计时；只能从 Idle 启动
    pub fn start(&mut self, events: EventSender) {
        if self.state != SimulatorState::Idle {
            warn!(state = ?self.state, "progress simulator can only start once");
            return;
        }
        self.state = SimulatorState::Running;

        let labels = self.config.stage_labels.clone();
        let tick_interval = self.config.tick_interval;
        let token = self.token.clone();
        let sender = events.clone();
        self.events = Some(events);

        self.task = Some(tokio::spawn(async move {
            let mut curve = ProgressCurve::new(labels.len());
            let mut interval = tokio::time::interval(tick_interval);
            // interval 的第一跳立即完成，跳过它，第一次更新在一个间隔之后
            interval.tick().await;

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        let Some((percent, stage)) = curve.tick() else {
                            continue;
                        };
                        let state = ProgressState {
                            stage_index: stage + 1,
                            percent: percent as u8,
                            label: labels.get(stage).cloned().unwrap_or_default(),
                        };
                        if sender.send(SearchEvent::Progress(state)).is_err() {
                            break;
                        }
                    }
                }
            }
        }));
    }

    /// 停止计时并把进度归零
    ///
    /// 会等待定时任务退出，所以归零事件一定排在最后一次进度事件之后
    pub async fn stop(&mut self) {
        if self.state != SimulatorState::Running {
            self.state = SimulatorState::Stopped;
            return;
        }
        self.state = SimulatorState::Stopped;
        self.token.cancel();

        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                debug!(error = %e, "progress task ended abnormally");
            }
        }
        if let Some(events) = self.events.take() {
            let _ = events.send(SearchEvent::Progress(ProgressState::default()));
        }
    }
}
