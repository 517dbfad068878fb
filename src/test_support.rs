// test_support.rs — 测试辅助：不走网络的假站点

use crate::error::SearchError;
use crate::event::{EventReceiver, SearchEvent};
use crate::fetcher::PageFetcher;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// 按 URL 返回预设内容的抓取器，未登记的 URL 视为 404
#[derive(Default)]
pub struct FakeSite {
    pages: HashMap<String, Vec<u8>>,
    hits: Mutex<Vec<String>>,
    gate: Option<Arc<Notify>>,
}

impl FakeSite {
    pub const DOMAIN: &'static str = "https://site.test";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, body: &str) -> Self {
        self.pages.insert(url.to_string(), body.as_bytes().to_vec());
        self
    }

    /// 登记一个分类：分类页、全部结果页和一张原图
    pub fn with_category(mut self, path: &str, max_pages: u32, stem: &str, image: &[u8]) -> Self {
        let base = format!("{}/{}", Self::DOMAIN, path);
        self = self.with_page(&base, &listing_html(max_pages));
        for page in 1..=max_pages {
            self = self.with_page(&format!("{base}/page/{page}"), &results_html(stem));
        }
        self.pages
            .insert(format!("https://cdn.test/img/{stem}.jpg"), image.to_vec());
        self
    }

    /// 所有请求都会阻塞到 `gate` 被通知为止
    pub fn with_gate(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn hits(&self) -> Vec<String> {
        self.hits.lock().unwrap().clone()
    }

    async fn get(&self, url: &str) -> Result<Vec<u8>, SearchError> {
        self.hits.lock().unwrap().push(url.to_string());
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| SearchError::page_load_failed(url, "HTTP 404 Not Found"))
    }
}

#[async_trait]
impl PageFetcher for FakeSite {
    async fn fetch_text(&self, url: &str) -> Result<String, SearchError> {
        let body = self.get(url).await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, SearchError> {
        self.get(url).await
    }
}

/// 最大页码为 `max_pages` 的分类页，最后一个链接是"下一页"
pub fn listing_html(max_pages: u32) -> String {
    let links: String = (1..=max_pages)
        .map(|n| format!("<a href=\"/page/{n}\">{n}</a>"))
        .collect();
    format!(
        "<html><body><div class=\"pagination\">{links}<a href=\"/page/2\">Next</a></div></body></html>"
    )
}

pub fn results_html(stem: &str) -> String {
    format!(
        "<html><body><div class=\"post\">\
         <div class=\"imgview\"><img src=\"https://cdn.test/img/{stem}-640x360.jpg\"></div>\
         </div></body></html>"
    )
}

pub fn drain(rx: &mut EventReceiver) -> Vec<SearchEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn error_count(events: &[SearchEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, SearchEvent::Error { .. }))
        .count()
}
