// category.rs — 分类体系与分类 URL 解析
// 将用户选择的 (主分类, 子分类) 转换成站点上的分类页 URL，不涉及任何网络访问

use crate::error::SearchError;
use rand::Rng;
use rand::seq::SliceRandom;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 一个主分类及其子分类列表
///
/// 子分类列表总是包含主分类自身（选择它表示"整个主分类"）
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct CategoryEntry {
    /// 主分类名称，如 "Nature"
    pub name: String,
    /// 子分类名称列表（按显示顺序）
    #[serde(default)]
    pub subs: Vec<String>,
}

impl CategoryEntry {
    fn new(name: &str, subs: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            subs: subs.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// 用户的一次分类选择，名称为分类体系中的规范写法
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategorySelection {
    pub main: String,
    pub sub: String,
}

/// 不可变的分类体系：主分类 -> 有序子分类列表
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Taxonomy {
    entries: Vec<CategoryEntry>,
}

impl Default for Taxonomy {
    fn default() -> Self {
        Self::new(Self::default_entries())
    }
}

impl Taxonomy {
    /// 由条目列表构建分类体系
    ///
    /// 若某个条目的子分类中缺少主分类自身，会把它补到最前面
    pub fn new(entries: Vec<CategoryEntry>) -> Self {
        let entries = entries
            .into_iter()
            .filter(|e| !e.name.trim().is_empty())
            .map(|mut e| {
                if !e.subs.iter().any(|s| s.eq_ignore_ascii_case(&e.name)) {
                    e.subs.insert(0, e.name.clone());
                }
                e
            })
            .collect();
        Self { entries }
    }

    /// bingwallpaperhd.com 上的分类
    pub fn default_entries() -> Vec<CategoryEntry> {
        vec![
            CategoryEntry::new(
                "Nature",
                &[
                    "Nature", "Forest", "Mountain", "Cave", "Island", "Sea", "Coast", "River",
                    "Lake", "Waterfall", "Sky", "Park", "Snow",
                ],
            ),
            CategoryEntry::new("Animal", &["Animal"]),
            CategoryEntry::new("Plant", &["Plant"]),
            CategoryEntry::new("People", &["People"]),
            CategoryEntry::new(
                "Modern",
                &[
                    "Modern", "Art", "Bridge", "Road", "Building", "Lighthouse", "Festival",
                    "Fireworks", "Fields", "Town", "City", "History",
                ],
            ),
            CategoryEntry::new("Space", &["Space"]),
            CategoryEntry::new("Other", &["Other"]),
        ]
    }

    pub fn entries(&self) -> &[CategoryEntry] {
        &self.entries
    }

    /// 按名称查找主分类（大小写不敏感）
    pub fn entry(&self, main: &str) -> Option<&CategoryEntry> {
        self.entries
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(main))
    }

    /// 校验选择并返回规范写法的 `CategorySelection`
    ///
    /// `sub` 为 `None` 时表示选择整个主分类
    pub fn select(&self, main: &str, sub: Option<&str>) -> Result<CategorySelection, SearchError> {
        let invalid = || SearchError::InvalidCategory {
            main: main.to_string(),
            sub: sub.unwrap_or(main).to_string(),
        };

        let entry = self.entry(main).ok_or_else(invalid)?;
        let wanted = sub.unwrap_or(&entry.name);
        let sub = entry
            .subs
            .iter()
            .find(|s| s.eq_ignore_ascii_case(wanted))
            .ok_or_else(invalid)?;

        Ok(CategorySelection {
            main: entry.name.clone(),
            sub: sub.clone(),
        })
    }

    /// 随机选择：先均匀抽取主分类，再在其子分类中均匀抽取
    pub fn random_selection<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<CategorySelection> {
        let entry = self.entries.choose(rng)?;
        let sub = entry.subs.choose(rng)?;
        Some(CategorySelection {
            main: entry.name.clone(),
            sub: sub.clone(),
        })
    }
}

/// 分类 URL 解析器
///
/// 持有站点根地址和注入的分类体系，`resolve` 是纯函数
#[derive(Debug, Clone)]
pub struct CategoryResolver {
    domain: String,
    taxonomy: Arc<Taxonomy>,
}

impl CategoryResolver {
    pub fn new(domain: impl Into<String>, taxonomy: Arc<Taxonomy>) -> Self {
        let domain = domain.into().trim_end_matches('/').to_string();
        Self { domain, taxonomy }
    }

    /// 构建分类页 URL：`domain/main[/sub]`
    ///
    /// 站点路径全部小写；`sub` 与 `main` 相同（忽略大小写）时不追加子路径
    pub fn resolve(&self, main: &str, sub: &str) -> Result<String, SearchError> {
        let selection = self.taxonomy.select(main, Some(sub))?;

        let mut url = format!("{}/{}", self.domain, selection.main.to_lowercase());
        if !selection.sub.eq_ignore_ascii_case(&selection.main) {
            url.push('/');
            url.push_str(&selection.sub.to_lowercase());
        }
        Ok(url)
    }
}

/// 分类列表的第 `page` 页地址（WordPress 风格分页）
pub fn page_url(category_url: &str, page: u32) -> String {
    format!("{}/page/{}", category_url.trim_end_matches('/'), page)
}
