// pipeline.rs — 搜索流水线
// 解析分类 -> 抓取分类页 -> 随机页码 -> 抓取结果页 -> 随机图片 -> 下载原图 -> 写入工作目录

use crate::category::{CategoryResolver, CategorySelection, page_url};
use crate::error::SearchError;
use crate::event::{EventSender, SearchEvent};
use crate::fetcher::PageFetcher;
use crate::parser::{PageParser, SearchResult, max_pages, pick_image, random_page};
use crate::progress::{ProgressConfig, ProgressSimulator};
use crate::store::ImageStore;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 流水线所处阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Idle,
    Fetching,
    Parsing,
    Locating,
    Downloading,
    Done,
    Failed,
}

pub struct SearchPipeline {
    resolver: CategoryResolver,
    fetcher: Arc<dyn PageFetcher>,
    parser: Arc<dyn PageParser>,
    progress: ProgressConfig,
    stage: PipelineStage,
    rng: StdRng,
}

impl SearchPipeline {
    pub fn new(
        resolver: CategoryResolver,
        fetcher: Arc<dyn PageFetcher>,
        parser: Arc<dyn PageParser>,
        progress: ProgressConfig,
    ) -> Self {
        Self {
            resolver,
            fetcher,
            parser,
            progress,
            stage: PipelineStage::Idle,
            rng: StdRng::from_entropy(),
        }
    }

    /// 使用固定的随机数生成器，复现页码与图片的选择
    #[cfg(test)]
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    fn enter(&mut self, stage: PipelineStage) {
        debug!(from = ?self.stage, to = ?stage, "pipeline stage");
        self.stage = stage;
    }

    /// 执行一次完整搜索
    ///
    /// 不论成功失败，模拟进度都会在返回前停止；失败时发出一条 `Error` 事件，
    /// 工作目录中不会留下图片
    pub async fn run(
        &mut self,
        selection: &CategorySelection,
        store: &mut ImageStore,
        events: &EventSender,
        token: &CancellationToken,
    ) -> Result<SearchResult, SearchError> {
        self.enter(PipelineStage::Fetching);

        if let Err(e) = store.delete_previous().await {
            return self.fail(e.into(), events);
        }

        let url = match self.resolver.resolve(&selection.main, &selection.sub) {
            Ok(url) => url,
            Err(e) => return self.fail(e, events),
        };
        info!(main = %selection.main, sub = %selection.sub, %url, "search started");

        let mut simulator = ProgressSimulator::new(self.progress.clone());
        simulator.start(events.clone());

        let acquired = self.acquire(&url, token).await;
        simulator.stop().await;

        let stored = match acquired {
            Ok((result, bytes)) => store
                .store(&bytes, &result.file_name)
                .await
                .map(|path| (result, path))
                .map_err(SearchError::from),
            Err(e) => Err(e),
        };

        match stored {
            Ok((result, path)) => {
                self.enter(PipelineStage::Done);
                info!(file = %result.file_name, "image ready");
                let _ = events.send(SearchEvent::ImageReady {
                    file_name: result.file_name.clone(),
                    path,
                });
                Ok(result)
            }
            Err(e) => self.fail(e, events),
        }
    }

    async fn acquire(
        &mut self,
        url: &str,
        token: &CancellationToken,
    ) -> Result<(SearchResult, Vec<u8>), SearchError> {
        let fetcher = Arc::clone(&self.fetcher);

        let listing = cancellable(token, fetcher.fetch_text(url)).await?;
        self.enter(PipelineStage::Parsing);
        let max = max_pages(self.parser.as_ref(), &listing)?;
        let page = random_page(&mut self.rng, max);
        let page = page_url(url, page);
        debug!(max, %page, "random page chosen");

        let html = cancellable(token, fetcher.fetch_text(&page)).await?;
        self.enter(PipelineStage::Locating);
        let result = pick_image(self.parser.as_ref(), &html, &page, &mut self.rng)?;
        debug!(image = %result.image_url, "random image chosen");

        self.enter(PipelineStage::Downloading);
        let bytes = cancellable(token, fetcher.fetch_bytes(&result.image_url)).await?;
        Ok((result, bytes))
    }

    fn fail<T>(&mut self, error: SearchError, events: &EventSender) -> Result<T, SearchError> {
        self.enter(PipelineStage::Failed);
        if matches!(error, SearchError::Cancelled) {
            debug!("search cancelled");
        } else {
            warn!(%error, "search failed");
            let _ = events.send(SearchEvent::Error {
                message: error.to_string(),
            });
        }
        Err(error)
    }
}

/// 令牌取消时立即放弃正在进行的请求
async fn cancellable<T>(
    token: &CancellationToken,
    fut: impl Future<Output = Result<T, SearchError>>,
) -> Result<T, SearchError> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(SearchError::Cancelled),
        result = fut => result,
    }
}
