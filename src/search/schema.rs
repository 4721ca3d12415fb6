//! Search request / result types / 搜索请求与结果类型

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::config::SiteConfig;

/// Primary sort key / 排序字段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sort {
    Title,
    Pages,
    CreatedAt,
    ReleasedAt,
    Random,
}

impl Sort {
    /// Parse from a query parameter (case-insensitive) / 解析排序参数
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "title" => Some(Self::Title),
            "pages" => Some(Self::Pages),
            "created_at" => Some(Self::CreatedAt),
            "released_at" => Some(Self::ReleasedAt),
            "random" => Some(Self::Random),
            _ => None,
        }
    }
}

/// Sort direction / 排序方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    Asc,
    Desc,
}

impl Order {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }

    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Search request / 搜索请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Raw query string in the search language / 原始查询字符串
    pub query: String,
    pub sort: Sort,
    pub order: Order,
    /// Seed for `Sort::Random` / 随机排序种子
    pub seed: Option<String>,
    /// Page number, starting at 1 / 页码
    pub page: usize,
    /// Page size, 0 means unlimited / 每页数量，0 表示不限
    pub limit: usize,
    /// Id filter from the request, `None` when absent or empty / 请求中的ID筛选
    pub ids: Option<Vec<i64>>,
    /// Restrict to items that belong to a series / 仅系列内条目
    pub series: bool,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            query: String::new(),
            sort: Sort::ReleasedAt,
            order: Order::Desc,
            seed: None,
            page: 1,
            limit: 24,
            ids: None,
            series: false,
        }
    }
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn with_sort(mut self, sort: Sort, order: Order) -> Self {
        self.sort = sort;
        self.order = order;
        self
    }

    pub fn with_seed(mut self, seed: impl Into<String>) -> Self {
        self.seed = Some(seed.into());
        self
    }

    pub fn with_page(mut self, page: usize) -> Self {
        self.page = page.max(1);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_series(mut self, series: bool) -> Self {
        self.series = series;
        self
    }

    /// Build a request from URL query parameters / 从URL参数构建请求
    ///
    /// Unknown sort/order values fall back to the site defaults, a limit that is
    /// not one of the configured page limits falls back to the default limit.
    pub fn from_params(params: &HashMap<String, String>, site: &SiteConfig) -> Self {
        let listing = &site.gallery_listing;

        let sort = params
            .get("sort")
            .and_then(|s| Sort::parse(s))
            .unwrap_or(site.default_sort);
        let order = params
            .get("order")
            .and_then(|o| Order::parse(o))
            .unwrap_or(site.default_order);
        let page = params
            .get("page")
            .and_then(|p| p.parse::<usize>().ok())
            .unwrap_or(1)
            .max(1);
        let limit = params
            .get("limit")
            .and_then(|l| l.parse::<usize>().ok())
            .filter(|l| listing.page_limits.contains(l))
            .unwrap_or_else(|| listing.default_page_limit());
        let ids = params
            .get("ids")
            .map(|ids| {
                ids.split(',')
                    .filter_map(|id| id.trim().parse::<i64>().ok())
                    .collect::<Vec<_>>()
            })
            .filter(|ids| !ids.is_empty());

        Self {
            query: params.get("q").cloned().unwrap_or_default(),
            sort,
            order,
            seed: params.get("seed").filter(|s| !s.is_empty()).cloned(),
            page,
            limit,
            ids,
            series: params.contains_key("series"),
        }
    }
}

/// Caller-side options for a search / 搜索选项
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Include soft-deleted items / 包含已隐藏条目
    pub show_hidden: bool,
    /// Intersect with this id list. `Some(vec![])` always yields an empty result / ID白名单
    pub allow_ids: Option<Vec<i64>>,
    /// `namespace:name` entries excluded exactly / 标签黑名单
    pub tag_blacklist: Vec<String>,
    /// Return the full ordered list instead of one page / 跳过分页
    pub skip_pagination: bool,
}

impl SearchOptions {
    pub fn show_hidden(mut self, enabled: bool) -> Self {
        self.show_hidden = enabled;
        self
    }

    pub fn with_allow_ids(mut self, ids: Vec<i64>) -> Self {
        self.allow_ids = Some(ids);
        self
    }

    pub fn with_blacklist(mut self, blacklist: Vec<String>) -> Self {
        self.tag_blacklist = blacklist;
        self
    }

    pub fn skip_pagination(mut self, enabled: bool) -> Self {
        self.skip_pagination = enabled;
        self
    }
}

/// Ordered ids for one page plus the total match count / 搜索结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub ids: Vec<i64>,
    pub total: usize,
}

impl SearchResult {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Options for hydrating a page of ids / 加载条目选项
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Order to restore; defaults to the order of the requested ids / 排序依据
    pub preserve_order_by: Option<Vec<i64>>,
    /// Apply display-time tag exclude/weight rules / 应用标签展示规则
    pub apply_tag_curation: bool,
}
