// bingwallpaperhd.rs — bingwallpaperhd.com 页面结构适配器
// 所有 CSS 选择器都来自配置，站点改版时改配置即可

use super::PageParser;
use crate::error::ConfigError;
use schemars::JsonSchema;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

/// 页面结构选择器
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct MarkupSelectors {
    /// 分页导航区域
    #[serde(default = "default_pagination")]
    pub pagination: String,
    /// 分页区域内的链接
    #[serde(default = "default_pagination_link")]
    pub pagination_link: String,
    /// 文章（图片列表）容器
    #[serde(default = "default_post")]
    pub post: String,
    /// 容器内的单个图片块
    #[serde(default = "default_item")]
    pub item: String,
    /// 图片块内的缩略图
    #[serde(default = "default_thumbnail")]
    pub thumbnail: String,
}

impl Default for MarkupSelectors {
    fn default() -> Self {
        Self {
            pagination: default_pagination(),
            pagination_link: default_pagination_link(),
            post: default_post(),
            item: default_item(),
            thumbnail: default_thumbnail(),
        }
    }
}

fn default_pagination() -> String {
    "div.pagination".to_string()
}
fn default_pagination_link() -> String {
    "a".to_string()
}
fn default_post() -> String {
    "div.post".to_string()
}
fn default_item() -> String {
    "div.imgview".to_string()
}
fn default_thumbnail() -> String {
    "img".to_string()
}

/// 基于 scraper 的 HTML 解析器
#[derive(Debug)]
pub struct HtmlPageParser {
    pagination: Selector,
    pagination_link: Selector,
    post: Selector,
    item: Selector,
    thumbnail: Selector,
}

impl Default for HtmlPageParser {
    fn default() -> Self {
        // 默认选择器都是合法的 CSS
        Self::new(&MarkupSelectors::default()).expect("default selectors are valid")
    }
}

impl HtmlPageParser {
    /// 编译选择器；任何一个不合法都会返回 `ConfigError::Selector`
    pub fn new(selectors: &MarkupSelectors) -> Result<Self, ConfigError> {
        Ok(Self {
            pagination: compile(&selectors.pagination)?,
            pagination_link: compile(&selectors.pagination_link)?,
            post: compile(&selectors.post)?,
            item: compile(&selectors.item)?,
            thumbnail: compile(&selectors.thumbnail)?,
        })
    }
}

fn compile(selector: &str) -> Result<Selector, ConfigError> {
    Selector::parse(selector).map_err(|e| ConfigError::Selector {
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}

/// 缩略图地址：优先 `src`，懒加载页面则退回 `data-src`
fn thumbnail_src(img: ElementRef<'_>) -> Option<String> {
    let attrs = img.value();
    attrs
        .attr("src")
        .filter(|s| !s.trim().is_empty() && !s.starts_with("data:"))
        .or_else(|| attrs.attr("data-src"))
        .map(|s| s.trim().to_string())
}

impl PageParser for HtmlPageParser {
    fn pagination_links(&self, html: &str) -> Option<Vec<String>> {
        let document = Html::parse_document(html);
        let nav = document.select(&self.pagination).next()?;

        Some(
            nav.select(&self.pagination_link)
                .map(|a| a.text().collect::<String>().trim().to_string())
                .collect(),
        )
    }

    fn image_candidates(&self, html: &str) -> Vec<String> {
        let document = Html::parse_document(html);
        let Some(post) = document.select(&self.post).next() else {
            return Vec::new();
        };

        post.select(&self.item)
            .filter_map(|item| item.select(&self.thumbnail).next())
            .filter_map(thumbnail_src)
            .collect()
    }
}
