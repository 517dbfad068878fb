// session.rs — 会话与命令处理
// 展示层只调用 on_search / on_random / on_download，结果通过事件通道和返回值送回

use crate::category::{CategorySelection, Taxonomy};
use crate::error::{DownloadError, SearchError, StoreError};
use crate::event::{EventSender, SearchEvent};
use crate::parser::SearchResult;
use crate::pipeline::SearchPipeline;
use crate::store::ImageStore;
use async_trait::async_trait;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// 目录选择器（外部协作方）
///
/// 返回 `None` 表示用户取消了选择
#[async_trait]
pub trait DirectoryPicker: Send + Sync {
    async fn pick_directory(&self) -> Option<PathBuf>;
}

/// 下载目标目录；一旦选定，在本次会话内一直沿用
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadTarget {
    pub directory: Option<PathBuf>,
}

/// 后台任务独占的资源：流水线和工作目录
struct Worker {
    pipeline: SearchPipeline,
    store: ImageStore,
}

/// 一次正在进行的搜索
pub struct SearchHandle {
    selection: CategorySelection,
    task: JoinHandle<Result<SearchResult, SearchError>>,
}

impl SearchHandle {
    pub fn selection(&self) -> &CategorySelection {
        &self.selection
    }

    /// 等待搜索结束
    pub async fn wait(self) -> Result<SearchResult, SearchError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "search task aborted");
                Err(SearchError::Cancelled)
            }
        }
    }
}

pub struct Session {
    worker: Arc<Mutex<Worker>>,
    taxonomy: Arc<Taxonomy>,
    events: EventSender,
    picker: Box<dyn DirectoryPicker>,
    target: DownloadTarget,
    rng: StdRng,
    in_flight: Option<CancellationToken>,
}

impl Session {
    /// 创建会话并初始化工作目录
    pub async fn start(
        taxonomy: Arc<Taxonomy>,
        pipeline: SearchPipeline,
        mut store: ImageStore,
        picker: Box<dyn DirectoryPicker>,
        events: EventSender,
    ) -> Result<Self, StoreError> {
        let report = store.init_workspace().await?;
        if !report.skipped.is_empty() {
            warn!(
                workspace = %store.workspace().display(),
                skipped = report.skipped.len(),
                "workspace contains entries that were left in place"
            );
        }

        Ok(Self {
            worker: Arc::new(Mutex::new(Worker { pipeline, store })),
            taxonomy,
            events,
            picker,
            target: DownloadTarget::default(),
            rng: StdRng::from_entropy(),
            in_flight: None,
        })
    }

    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    pub fn download_target(&self) -> &DownloadTarget {
        &self.target
    }

    /// 预先设置下载目录（命令行参数或配置文件中的默认值）
    pub fn set_download_dir(&mut self, directory: impl Into<PathBuf>) {
        self.target.directory = Some(directory.into());
    }

    /// 当前常驻图片的路径；搜索进行中时返回 `None`
    pub fn resident_path(&self) -> Option<PathBuf> {
        self.worker
            .try_lock()
            .ok()
            .and_then(|worker| worker.store.resident_path())
    }

    /// 按指定分类搜索
    ///
    /// 分类不合法时在任何网络请求之前返回 `InvalidCategory`；
    /// 上一次搜索尚未结束时返回 `Busy`
    pub fn on_search(&mut self, main: &str, sub: Option<&str>) -> Result<SearchHandle, SearchError> {
        let selection = self.taxonomy.select(main, sub)?;
        self.dispatch(selection)
    }

    /// 随机选择分类后搜索
    pub fn on_random(&mut self) -> Result<SearchHandle, SearchError> {
        let selection = self.taxonomy.random_selection(&mut self.rng).ok_or_else(|| {
            SearchError::InvalidCategory {
                main: String::new(),
                sub: String::new(),
            }
        })?;
        self.dispatch(selection)
    }

    fn dispatch(&mut self, selection: CategorySelection) -> Result<SearchHandle, SearchError> {
        let mut worker = Arc::clone(&self.worker)
            .try_lock_owned()
            .map_err(|_| SearchError::Busy)?;

        let token = CancellationToken::new();
        self.in_flight = Some(token.clone());

        let events = self.events.clone();
        let task_selection = selection.clone();
        let task = tokio::spawn(async move {
            let Worker { pipeline, store } = &mut *worker;
            pipeline.run(&task_selection, store, &events, &token).await
        });

        debug!(main = %selection.main, sub = %selection.sub, "search dispatched");
        Ok(SearchHandle { selection, task })
    }

    /// 把常驻图片移动到下载目录
    ///
    /// 还没有下载目录时先询问目录选择器；用户取消时发出 `DownloadCancelled`，
    /// 返回 `NoDirectoryChosen`，不显示错误消息
    pub async fn on_download(&mut self) -> Result<PathBuf, DownloadError> {
        let Ok(mut worker) = Arc::clone(&self.worker).try_lock_owned() else {
            return Err(self.report(DownloadError::Busy));
        };

        if worker.store.resident().is_none() {
            return Err(self.report(DownloadError::NoImageSelected));
        }

        if self.target.directory.is_none() {
            match self.picker.pick_directory().await {
                Some(directory) => self.target.directory = Some(directory),
                None => {
                    let _ = self.events.send(SearchEvent::DownloadCancelled);
                    return Err(DownloadError::NoDirectoryChosen);
                }
            }
        }

        let directory = self.target.directory.as_deref();
        match worker.store.download(directory).await {
            Ok(path) => Ok(path),
            Err(e) => Err(self.report(e)),
        }
    }

    fn report(&self, error: DownloadError) -> DownloadError {
        warn!(%error, "download failed");
        let _ = self.events.send(SearchEvent::Error {
            message: error.to_string(),
        });
        error
    }

    /// 关闭会话：取消进行中的搜索，删除常驻图片，清空并移除工作目录
    pub async fn shutdown(self) -> Result<(), StoreError> {
        if let Some(token) = &self.in_flight {
            token.cancel();
        }

        // 等到后台任务释放锁后再清理
        let mut worker = self.worker.lock().await;
        let store = &mut worker.store;

        if let Err(e) = store.delete_previous().await {
            warn!(error = %e, "cannot delete resident image");
        }
        match store.clear_workspace().await {
            Ok(report) if !report.skipped.is_empty() => {
                warn!(skipped = ?report.skipped, "workspace entries left in place");
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "cannot clear workspace"),
        }
        store.teardown_workspace().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::CategoryResolver;
    use crate::event::{EventReceiver, channel};
    use crate::parser::HtmlPageParser;
    use crate::progress::ProgressConfig;
    use crate::test_support::{FakeSite, drain, error_count};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;
    use tokio::sync::Notify;

    /// 总是取消的选择器
    struct FixedPicker;

    impl FixedPicker {
        fn cancel() -> Self {
            Self
        }
    }

    #[async_trait]
    impl DirectoryPicker for FixedPicker {
        async fn pick_directory(&self) -> Option<PathBuf> {
            None
        }
    }

    /// 记录调用次数的选择器
    struct CountingPicker {
        answer: Option<PathBuf>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl DirectoryPicker for CountingPicker {
        async fn pick_directory(&self) -> Option<PathBuf> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer.clone()
        }
    }

    fn site() -> FakeSite {
        FakeSite::new()
            .with_category("nature/lake", 4, "lake", b"LAKE")
            .with_category("space", 2, "nebula", b"NEBULA")
            .with_category("animal", 7, "fox", b"FOX")
    }

    async fn session_with(
        tmp: &TempDir,
        site: FakeSite,
        picker: Box<dyn DirectoryPicker>,
    ) -> (Session, EventReceiver) {
        let taxonomy = Arc::new(Taxonomy::default());
        let pipeline = SearchPipeline::new(
            CategoryResolver::new(FakeSite::DOMAIN, Arc::clone(&taxonomy)),
            Arc::new(site),
            Arc::new(HtmlPageParser::default()),
            ProgressConfig::default(),
        );
        let (tx, rx) = channel();
        let session = Session::start(
            taxonomy,
            pipeline,
            ImageStore::new(tmp.path().join("ws")),
            picker,
            tx,
        )
        .await
        .unwrap();
        (session, rx)
    }

    fn workspace_files(tmp: &TempDir) -> Vec<String> {
        std::fs::read_dir(tmp.path().join("ws"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect()
    }

    #[tokio::test]
    async fn consecutive_searches_leave_only_latest_image() {
        let tmp = TempDir::new().unwrap();
        let (mut session, _rx) = session_with(&tmp, site(), Box::new(FixedPicker::cancel())).await;

        let mut last = String::new();
        for (main, sub) in [("Nature", Some("Lake")), ("Space", None), ("animal", None), ("Nature", Some("lake"))] {
            let result = session.on_search(main, sub).unwrap().wait().await.unwrap();
            last = result.file_name;
        }

        assert_eq!(last, "lake.jpg");
        assert_eq!(workspace_files(&tmp), vec!["lake.jpg"]);
    }

    #[tokio::test]
    async fn invalid_category_is_rejected_before_fetching() {
        let tmp = TempDir::new().unwrap();
        let (mut session, mut rx) = session_with(&tmp, site(), Box::new(FixedPicker::cancel())).await;

        let err = session.on_search("Space", Some("Forest")).err().unwrap();
        assert!(matches!(err, SearchError::InvalidCategory { .. }));
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn random_search_picks_valid_category() {
        let tmp = TempDir::new().unwrap();
        let (mut session, _rx) = session_with(&tmp, site(), Box::new(FixedPicker::cancel())).await;

        let handle = session.on_random().unwrap();
        let selection = handle.selection().clone();
        assert!(session
            .taxonomy()
            .select(&selection.main, Some(&selection.sub))
            .is_ok());
        // 假站点只登记了部分分类，结果可能失败，但会话必须仍然可用
        let _ = handle.wait().await;
        assert!(session.on_search("Space", None).is_ok());
    }

    #[tokio::test]
    async fn second_search_while_running_is_busy() {
        let tmp = TempDir::new().unwrap();
        let gate = Arc::new(Notify::new());
        let (mut session, _rx) = session_with(
            &tmp,
            site().with_gate(Arc::clone(&gate)),
            Box::new(FixedPicker::cancel()),
        )
        .await;

        let first = session.on_search("Space", None).unwrap();
        assert!(matches!(session.on_search("Nature", None), Err(SearchError::Busy)));
        assert!(matches!(session.on_download().await, Err(DownloadError::Busy)));

        session.shutdown().await.unwrap();
        assert!(matches!(first.wait().await, Err(SearchError::Cancelled)));
        assert!(!tmp.path().join("ws").exists());
    }

    #[tokio::test]
    async fn download_without_search_reports_no_image() {
        let tmp = TempDir::new().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let picker = CountingPicker {
            answer: Some(tmp.path().to_path_buf()),
            calls: Arc::clone(&calls),
        };
        let (mut session, mut rx) = session_with(&tmp, site(), Box::new(picker)).await;

        let err = session.on_download().await.unwrap_err();
        assert!(matches!(err, DownloadError::NoImageSelected));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(error_count(&drain(&mut rx)), 1);
    }

    #[tokio::test]
    async fn cancelled_picker_aborts_silently() {
        let tmp = TempDir::new().unwrap();
        let (mut session, mut rx) = session_with(&tmp, site(), Box::new(FixedPicker::cancel())).await;
        session.on_search("Space", None).unwrap().wait().await.unwrap();
        drain(&mut rx);

        let err = session.on_download().await.unwrap_err();
        assert!(matches!(err, DownloadError::NoDirectoryChosen));

        let events = drain(&mut rx);
        assert_eq!(events, vec![SearchEvent::DownloadCancelled]);
        assert_eq!(workspace_files(&tmp), vec!["nebula.jpg"]);
        assert_eq!(session.download_target().directory, None);
    }

    #[tokio::test]
    async fn chosen_directory_is_cached_for_the_session() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("dest");
        std::fs::create_dir(&dest).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let picker = CountingPicker {
            answer: Some(dest.clone()),
            calls: Arc::clone(&calls),
        };
        let (mut session, _rx) = session_with(&tmp, site(), Box::new(picker)).await;

        session.on_search("Space", None).unwrap().wait().await.unwrap();
        let moved = session.on_download().await.unwrap();
        assert_eq!(moved, dest.join("nebula.jpg"));
        assert!(workspace_files(&tmp).is_empty());

        session.on_search("Animal", None).unwrap().wait().await.unwrap();
        session.on_download().await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(dest.join("fox.jpg").exists());
        assert!(session.resident_path().is_none());
    }

    #[tokio::test]
    async fn preset_directory_skips_picker() {
        let tmp = TempDir::new().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let picker = CountingPicker {
            answer: None,
            calls: Arc::clone(&calls),
        };
        let (mut session, _rx) = session_with(&tmp, site(), Box::new(picker)).await;
        session.set_download_dir(tmp.path());

        session.on_search("Nature", Some("Lake")).unwrap().wait().await.unwrap();
        assert_eq!(session.resident_path(), Some(tmp.path().join("ws").join("lake.jpg")));

        let moved = session.on_download().await.unwrap();
        assert_eq!(moved, tmp.path().join("lake.jpg"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_move_keeps_image_and_session_usable() {
        let tmp = TempDir::new().unwrap();
        let (mut session, mut rx) = session_with(&tmp, site(), Box::new(FixedPicker::cancel())).await;
        session.set_download_dir(tmp.path().join("nope").join("deeper"));
        session.on_search("Space", None).unwrap().wait().await.unwrap();
        drain(&mut rx);

        let err = session.on_download().await.unwrap_err();
        assert!(matches!(err, DownloadError::Filesystem(_)));
        assert_eq!(error_count(&drain(&mut rx)), 1);
        assert_eq!(session.resident_path(), Some(tmp.path().join("ws").join("nebula.jpg")));
        assert_eq!(workspace_files(&tmp), vec!["nebula.jpg"]);

        let result = session.on_search("Animal", None).unwrap().wait().await.unwrap();
        assert_eq!(result.file_name, "fox.jpg");
        assert_eq!(workspace_files(&tmp), vec!["fox.jpg"]);
    }

    #[tokio::test]
    async fn shutdown_removes_workspace_with_resident_image() {
        let tmp = TempDir::new().unwrap();
        let (mut session, _rx) = session_with(&tmp, site(), Box::new(FixedPicker::cancel())).await;
        session.on_search("Space", None).unwrap().wait().await.unwrap();

        session.shutdown().await.unwrap();
        assert!(!tmp.path().join("ws").exists());
    }
}
