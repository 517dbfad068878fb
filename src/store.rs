// store.rs — 临时图片存储
// 工作目录中最多只保留一张图片（"常驻图片"），新的搜索开始前和程序退出时都要先删除旧图

use crate::error::{DownloadError, StoreError};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// 清理工作目录的结果
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PurgeReport {
    /// 已删除的文件和空目录数量
    pub removed: usize,
    /// 无法处理而跳过的条目（非空子目录、删除失败的文件等）
    pub skipped: Vec<PathBuf>,
}

/// 单槽位的临时图片存储
#[derive(Debug)]
pub struct ImageStore {
    workspace: PathBuf,
    /// 常驻图片的文件名
    resident: Option<String>,
}

impl ImageStore {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
            resident: None,
        }
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn resident(&self) -> Option<&str> {
        self.resident.as_deref()
    }

    /// 常驻图片的完整路径，供展示层打开或预览
    pub fn resident_path(&self) -> Option<PathBuf> {
        self.resident.as_ref().map(|name| self.workspace.join(name))
    }

    /// 确保工作目录存在；已存在时清空其中的文件
    pub async fn init_workspace(&mut self) -> Result<PurgeReport, StoreError> {
        fs::create_dir_all(&self.workspace)
            .await
            .map_err(|e| StoreError::io(&self.workspace, e))?;
        self.resident = None;
        self.clear_workspace().await
    }

    /// 删除工作目录中的文件和空目录
    ///
    /// 遇到非空子目录等意外结构时只记录警告，不会递归删除
    pub async fn clear_workspace(&mut self) -> Result<PurgeReport, StoreError> {
        let mut report = PurgeReport::default();

        let mut entries = match fs::read_dir(&self.workspace).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(report),
            Err(e) => return Err(StoreError::io(&self.workspace, e)),
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::io(&self.workspace, e))?
        {
            let path = entry.path();
            let result = match entry.file_type().await {
                Ok(ft) if ft.is_dir() => fs::remove_dir(&path).await,
                Ok(_) => fs::remove_file(&path).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(()) => report.removed += 1,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "cannot remove workspace entry, leaving it in place");
                    report.skipped.push(path);
                }
            }
        }

        if self
            .resident
            .as_ref()
            .is_some_and(|name| !self.workspace.join(name).exists())
        {
            self.resident = None;
        }

        debug!(removed = report.removed, skipped = report.skipped.len(), "workspace cleared");
        Ok(report)
    }

    /// 删除常驻图片；没有常驻图片时什么都不做
    pub async fn delete_previous(&mut self) -> Result<(), StoreError> {
        let Some(name) = self.resident.take() else {
            return Ok(());
        };

        let path = self.workspace.join(&name);
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(file = %name, "previous image deleted");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => {
                // 删除失败时保留槽位记录，下次还能再试
                self.resident = Some(name);
                Err(StoreError::io(path, e))
            }
        }
    }

    /// 写入新图片并设为常驻图片
    ///
    /// 写入前总是先删除旧图，保证工作目录中只有一张图片
    pub async fn store(&mut self, content: &[u8], file_name: &str) -> Result<PathBuf, StoreError> {
        let name = sanitize_file_name(file_name)?;
        self.delete_previous().await?;

        let path = self.workspace.join(&name);
        if let Err(e) = write_file(&path, content).await {
            // 写了一半的文件不能留在工作目录里
            let _ = fs::remove_file(&path).await;
            return Err(StoreError::io(&path, e));
        }

        debug!(file = %name, bytes = content.len(), "image stored");
        self.resident = Some(name);
        Ok(path)
    }

    /// 把常驻图片移动到目标目录，文件名不变
    ///
    /// # 返回值
    /// - `Ok(PathBuf)`: 移动后的完整路径，工作目录中不再有这张图
    /// - `Err(NoImageSelected)`: 还没有搜索过图片，不会访问文件系统
    /// - `Err(NoDirectoryChosen)`: 没有目标目录
    pub async fn download(&mut self, directory: Option<&Path>) -> Result<PathBuf, DownloadError> {
        let name = self.resident.clone().ok_or(DownloadError::NoImageSelected)?;
        let directory = directory.ok_or(DownloadError::NoDirectoryChosen)?;

        let from = self.workspace.join(&name);
        let to = directory.join(&name);
        move_file(&from, &to).await?;

        self.resident = None;
        info!(to = %to.display(), "image downloaded");
        Ok(to)
    }

    /// 删除常驻图片后移除工作目录
    ///
    /// 目录非空说明上游的生命周期管理有问题，此时返回 `WorkspaceNotEmpty`
    pub async fn teardown_workspace(&mut self) -> Result<(), StoreError> {
        self.delete_previous().await?;

        match fs::remove_dir(&self.workspace).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => {
                let non_empty = std::fs::read_dir(&self.workspace)
                    .map(|mut entries| entries.next().is_some())
                    .unwrap_or(false);
                if non_empty {
                    Err(StoreError::WorkspaceNotEmpty(self.workspace.clone()))
                } else {
                    Err(StoreError::io(&self.workspace, e))
                }
            }
        }
    }
}

/// 只保留路径的最后一段，防止文件名中带目录
fn sanitize_file_name(file_name: &str) -> Result<String, StoreError> {
    Path::new(file_name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty() && *n != "." && *n != "..")
        .map(str::to_string)
        .ok_or_else(|| StoreError::InvalidFileName(file_name.to_string()))
}

async fn write_file(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(content).await?;
    file.flush().await
}

/// 移动文件；跨文件系统时 rename 会失败，退回到复制后删除
async fn move_file(from: &Path, to: &Path) -> Result<(), StoreError> {
    if fs::rename(from, to).await.is_ok() {
        return Ok(());
    }

    fs::copy(from, to).await.map_err(|e| StoreError::io(to, e))?;
    fs::remove_file(from)
        .await
        .map_err(|e| StoreError::io(from, e))
}
