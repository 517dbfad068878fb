// fetcher.rs — 页面抓取模块
// 一次 GET 请求，只有 HTTP 200 视为成功，其余状态码和传输错误都归为 PageLoadFailed

use crate::error::SearchError;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{debug, warn};

/// 页面抓取的抽象 Trait
///
/// 流水线只依赖这个 Trait，测试里可以换成不走网络的实现
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// 抓取 HTML 页面，返回文本内容
    async fn fetch_text(&self, url: &str) -> Result<String, SearchError>;

    /// 抓取图片等二进制内容
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, SearchError>;
}

/// 基于 reqwest 的 HTTP 抓取器
pub struct HttpFetcher {
    /// HTTP 客户端（内部有连接池，应复用）
    client: reqwest::Client,
    /// 传输错误的额外重试次数，0 表示只尝试一次
    retries: u32,
    backoff: Duration,
}

impl HttpFetcher {
    /// 创建抓取器
    ///
    /// # 参数
    /// - `timeout`: 单次请求的超时时间
    /// - `retries`: 连接失败或超时时的重试次数（非 200 状态码不重试）
    pub fn new(timeout: Duration, retries: u32) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("bingwall/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            retries,
            backoff: Duration::from_millis(750),
        })
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, SearchError> {
        let mut attempt = 0;
        loop {
            match self.client.get(url).send().await {
                Ok(response) if response.status() == StatusCode::OK => return Ok(response),
                Ok(response) => {
                    return Err(SearchError::page_load_failed(
                        url,
                        format!("HTTP {}", response.status()),
                    ));
                }
                Err(e) if attempt < self.retries && (e.is_timeout() || e.is_connect()) => {
                    attempt += 1;
                    warn!(url, attempt, error = %e, "request failed, retrying");
                    tokio::time::sleep(self.backoff).await;
                }
                Err(e) => return Err(SearchError::page_load_failed(url, e)),
            }
        }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String, SearchError> {
        debug!(url, "fetching page");
        let response = self.get(url).await?;
        response
            .text()
            .await
            .map_err(|e| SearchError::page_load_failed(url, e))
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, SearchError> {
        debug!(url, "fetching image");
        let response = self.get(url).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| SearchError::page_load_failed(url, e))?;
        Ok(bytes.to_vec())
    }
}
