// parser/mod.rs — 页面解析模块入口
// 分页与图片提取只依赖 PageParser 这个能力接口，站点改版时只需换一个适配器

pub mod bingwallpaperhd;

use crate::error::ParseError;
use rand::Rng;
use regex::Regex;
use std::sync::LazyLock;

pub use bingwallpaperhd::{HtmlPageParser, MarkupSelectors};

/// 站点标记结构的抽象
///
/// 两个操作分别对应"分页范围"和"候选图片"，都按文档顺序返回
pub trait PageParser: Send + Sync {
    /// 第一个分页导航区域内所有链接的文本；页面中没有分页区域时返回 `None`
    fn pagination_links(&self, html: &str) -> Option<Vec<String>>;

    /// 第一个文章容器内每个图片块的缩略图地址
    fn image_candidates(&self, html: &str) -> Vec<String>;
}

/// 一次搜索选中的图片
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    /// 原图地址
    pub image_url: String,
    /// 原图文件名（URL 最后一段）
    pub file_name: String,
}

/// 从分类列表页中读出最大页数
///
/// 分页区域的最后一个链接是"下一页"，所以倒数第二个链接的文本才是最大页码
pub fn max_pages(parser: &dyn PageParser, html: &str) -> Result<u32, ParseError> {
    let links = parser
        .pagination_links(html)
        .ok_or_else(ParseError::pagination)?;

    if links.len() < 2 {
        return Err(ParseError::pagination());
    }

    let text = links[links.len() - 2].trim().replace(',', "");
    match text.parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ParseError::pagination()),
    }
}

/// 在 `[1, max]` 中均匀抽取一个页码
pub fn random_page<R: Rng + ?Sized>(rng: &mut R, max: u32) -> u32 {
    rng.gen_range(1..=max.max(1))
}

/// 从结果页中随机挑一张图，并推导出原图地址
///
/// `base` 用于解析相对地址（站点根地址或当前页地址）
pub fn pick_image<R: Rng + ?Sized>(
    parser: &dyn PageParser,
    html: &str,
    base: &str,
    rng: &mut R,
) -> Result<SearchResult, ParseError> {
    let candidates = parser.image_candidates(html);
    if candidates.is_empty() {
        return Err(ParseError::no_images());
    }

    let thumb = &candidates[rng.gen_range(0..candidates.len())];
    let image_url = strip_dimension_suffix(&absolutize(base, thumb));
    let file_name = file_name_of(&image_url).ok_or_else(ParseError::no_images)?;

    Ok(SearchResult {
        image_url,
        file_name,
    })
}

static DIMENSION_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"-\d+x\d+(\.[A-Za-z0-9]+)([?#].*)?$").expect("dimension suffix pattern is valid")
});

/// 去掉扩展名前的 `-<宽>x<高>` 尺寸后缀，得到原图地址
///
/// `foo-640x360.jpg` -> `foo.jpg`；查询串和片段原样保留；没有后缀时原样返回，因此可以重复调用
pub fn strip_dimension_suffix(url: &str) -> String {
    DIMENSION_SUFFIX.replace(url, "${1}${2}").into_owned()
}

/// URL 路径的最后一段（忽略查询串和片段）
pub fn file_name_of(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

/// 把协议相对或站内相对地址补全为绝对地址
fn absolutize(base: &str, src: &str) -> String {
    match url::Url::parse(base).and_then(|b| b.join(src)) {
        Ok(u) => u.to_string(),
        Err(_) => src.to_string(),
    }
}
