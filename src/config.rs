//! Application configuration module / 应用配置模块
//!
//! Manages application configuration loaded from config.json
//! Creates default config file on first run / 首次运行时创建默认配置文件

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::search::{Order, Sort};

/// Application configuration / 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration / 服务器配置
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration / 数据库配置
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Site configuration / 站点配置
    #[serde(default)]
    pub site: SiteConfig,
}

/// Server configuration / 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host address / 服务器监听地址
    pub host: String,
    /// Server port / 服务器端口
    pub port: u16,
}

/// Database vendor, decides which SQL dialect the search compiler renders / 数据库类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    #[default]
    Sqlite,
    Postgresql,
}

/// Database configuration / 数据库配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub vendor: Vendor,
    /// Data directory path (sqlite only) / 数据目录路径
    pub data_dir: String,
    /// Database file path relative to data_dir (sqlite only) / 数据库文件路径
    pub db_file: String,
    /// Full connection URL, required for postgresql / 完整连接地址
    #[serde(default)]
    pub url: Option<String>,
    pub max_connections: u32,
}

/// Site configuration / 站点配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub default_sort: Sort,
    pub default_order: Order,
    #[serde(default)]
    pub gallery_listing: GalleryListingConfig,
}

/// A single tag name rule value, either one name or a list / 标签名（单个或列表）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum TagNames {
    One(String),
    Many(Vec<String>),
}

impl TagNames {
    pub fn as_slice(&self) -> &[String] {
        match self {
            TagNames::One(name) => std::slice::from_ref(name),
            TagNames::Many(names) => names,
        }
    }
}

/// Tag weight rule used to order tags for display / 标签权重规则
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TagWeightRule {
    #[serde(default)]
    pub name: Option<TagNames>,
    #[serde(default)]
    pub namespace: Option<String>,
    pub weight: i64,
    #[serde(default)]
    pub ignore_case: bool,
}

/// Tag exclude rule used to hide tags from listings / 标签隐藏规则
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TagExcludeRule {
    #[serde(default)]
    pub name: Option<TagNames>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub ignore_case: bool,
}

/// Gallery listing configuration / 列表配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GalleryListingConfig {
    pub page_limits: Vec<usize>,
    #[serde(default)]
    pub default_page_limit: Option<usize>,
    #[serde(default)]
    pub tag_weight: Vec<TagWeightRule>,
    #[serde(default)]
    pub tag_exclude: Vec<TagExcludeRule>,
    pub use_default_tag_weight: bool,
    pub use_default_tag_exclude: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            vendor: Vendor::Sqlite,
            data_dir: "data".to_string(),
            db_file: "gallery.db".to_string(),
            url: None,
            max_connections: 8,
        }
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            default_sort: Sort::ReleasedAt,
            default_order: Order::Desc,
            gallery_listing: GalleryListingConfig::default(),
        }
    }
}

impl Default for GalleryListingConfig {
    fn default() -> Self {
        Self {
            page_limits: vec![24],
            default_page_limit: None,
            tag_weight: Vec::new(),
            tag_exclude: Vec::new(),
            use_default_tag_weight: true,
            use_default_tag_exclude: true,
        }
    }
}

impl GalleryListingConfig {
    /// Page limit used when the request does not name an allowed one / 默认每页数量
    pub fn default_page_limit(&self) -> usize {
        let first = self.page_limits.first().copied().unwrap_or(24);
        match self.default_page_limit {
            Some(limit) if self.page_limits.contains(&limit) => limit,
            _ => first,
        }
    }

    /// Weight rules with the built-in namespace weights prepended / 生效的权重规则
    pub fn effective_tag_weight(&self) -> Vec<TagWeightRule> {
        let mut rules = Vec::new();
        if self.use_default_tag_weight {
            for (namespace, weight) in [("artist", 1000), ("circle", 999), ("parody", 998)] {
                rules.push(TagWeightRule {
                    name: None,
                    namespace: Some(namespace.to_string()),
                    weight,
                    ignore_case: false,
                });
            }
        }
        rules.extend(self.tag_weight.iter().cloned());
        rules
    }

    /// Exclude rules with the built-in ones prepended / 生效的隐藏规则
    pub fn effective_tag_exclude(&self) -> Vec<TagExcludeRule> {
        let mut rules = Vec::new();
        if self.use_default_tag_exclude {
            rules.push(TagExcludeRule {
                name: Some(TagNames::Many(vec![
                    "original".to_string(),
                    "original work".to_string(),
                ])),
                namespace: Some("parody".to_string()),
                ignore_case: true,
            });
            for namespace in ["magazine", "event", "publisher"] {
                rules.push(TagExcludeRule {
                    name: None,
                    namespace: Some(namespace.to_string()),
                    ignore_case: false,
                });
            }
        }
        rules.extend(self.tag_exclude.iter().cloned());
        rules
    }
}

impl AppConfig {
    /// Get the full database URL / 获取完整的数据库URL
    pub fn get_database_url(&self) -> String {
        if let Some(url) = &self.database.url {
            return url.clone();
        }
        let db_path = Path::new(&self.database.data_dir).join(&self.database.db_file);
        format!("sqlite:{}?mode=rwc", db_path.to_string_lossy())
    }

    /// Get the full data directory path / 获取完整的数据目录路径
    pub fn get_data_dir(&self) -> PathBuf {
        PathBuf::from(&self.database.data_dir)
    }

    /// Get the server bind address / 获取服务器绑定地址
    pub fn get_bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// Get the config file path / 获取配置文件路径
fn get_config_path() -> PathBuf {
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("config.json")
}

/// Load configuration from file, or create default if not exists / 加载配置文件，不存在则创建默认配置
pub fn load_config() -> Result<AppConfig, String> {
    let config_path = get_config_path();

    if config_path.exists() {
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let config: AppConfig = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse config file: {}", e))?;

        tracing::info!("Loaded configuration from {:?}", config_path);
        Ok(config)
    } else {
        let config = AppConfig::default();
        save_config(&config)?;
        tracing::info!("Created default configuration at {:?}", config_path);
        Ok(config)
    }
}

/// Save configuration to file / 保存配置到文件
pub fn save_config(config: &AppConfig) -> Result<(), String> {
    let config_path = get_config_path();

    let content = serde_json::to_string_pretty(config)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;

    std::fs::write(&config_path, content)
        .map_err(|e| format!("Failed to write config file: {}", e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: AppConfig = serde_json::from_str(
            r#"{ "site": { "default_sort": "title", "default_order": "asc" } }"#,
        )
        .unwrap();
        assert_eq!(config.site.default_sort, Sort::Title);
        assert_eq!(config.site.default_order, Order::Asc);
        assert_eq!(config.database.vendor, Vendor::Sqlite);
        assert_eq!(config.site.gallery_listing.page_limits, vec![24]);
    }

    #[test]
    fn test_tag_names_accepts_string_or_list() {
        let rule: TagExcludeRule =
            serde_json::from_str(r#"{ "name": "foo", "namespace": "tag" }"#).unwrap();
        assert_eq!(rule.name.unwrap().as_slice(), &["foo".to_string()]);

        let rule: TagExcludeRule = serde_json::from_str(r#"{ "name": ["a", "b"] }"#).unwrap();
        assert_eq!(rule.name.unwrap().as_slice().len(), 2);
    }

    #[test]
    fn test_default_page_limit_must_be_listed() {
        let listing = GalleryListingConfig {
            page_limits: vec![24, 48],
            default_page_limit: Some(100),
            ..Default::default()
        };
        assert_eq!(listing.default_page_limit(), 24);

        let listing = GalleryListingConfig {
            page_limits: vec![24, 48],
            default_page_limit: Some(48),
            ..Default::default()
        };
        assert_eq!(listing.default_page_limit(), 48);
    }

    #[test]
    fn test_effective_rules_include_defaults() {
        let listing = GalleryListingConfig::default();
        assert_eq!(listing.effective_tag_weight().len(), 3);
        assert_eq!(listing.effective_tag_exclude().len(), 4);

        let listing = GalleryListingConfig {
            use_default_tag_weight: false,
            use_default_tag_exclude: false,
            ..Default::default()
        };
        assert!(listing.effective_tag_weight().is_empty());
        assert!(listing.effective_tag_exclude().is_empty());
    }

    #[test]
    fn test_database_url_prefers_explicit_url() {
        let mut config = AppConfig::default();
        assert!(config.get_database_url().starts_with("sqlite:"));
        config.database.url = Some("postgres://localhost/gallery".to_string());
        assert_eq!(config.get_database_url(), "postgres://localhost/gallery");
    }
}
