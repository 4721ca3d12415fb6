//! Query tokenizer - turns the raw search string into structured filters / 查询分词器
//!
//! Recognized forms / 支持的语法：
//! - `namespace:value`, `-namespace:value`, `~namespace:value`, `namespace:"quoted value"`
//! - `pages>10`, `tags<=5`, `sources=2`, `size>=10m`, `artist>3`
//! - `language:en`, `source:name`, `url:fragment`
//! - everything else is free text, `~word` = OR term, `-word` = NOT term
//!
//! Parsing never fails: malformed filters are dropped.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Namespaces that are never tag namespaces / 保留命名空间
///
/// Shared by tag extraction and numeric extraction.
pub const RESERVED_NAMESPACES: [&str; 6] = ["source", "sources", "url", "language", "size", "tags"];

/// Namespace used when a tag filter targets any tag / 通用标签命名空间
pub const GENERIC_NAMESPACE: &str = "tag";

/// Tag-shaped token: optional sigil, namespace, quoted phrase or non-space run
static TAG_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([-~]?)(\w+):("[^"]*"|\S+)"#).expect("valid tag token pattern"));

/// Numeric comparison token with optional k/m/g unit
static NUMERIC_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\w+)(>=|<=|>|<|=)(\d+)([kmg])?\b").expect("valid numeric token pattern")
});

pub fn is_reserved_namespace(namespace: &str) -> bool {
    let lower = namespace.to_ascii_lowercase();
    RESERVED_NAMESPACES.contains(&lower.as_str())
}

/// A tag filter / 标签过滤条件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagMatch {
    pub namespace: String,
    /// LIKE pattern; ends with `%` unless the filter was exact / 名称匹配模式
    pub name: String,
    pub negate: bool,
    /// Part of the optional (OR) group / 属于可选组
    pub or: bool,
}

impl TagMatch {
    /// Build an exact negated match from a blacklist entry (`namespace:name` or `name`) / 黑名单条目
    pub fn from_blacklist_entry(entry: &str) -> Option<Self> {
        let entry = entry.trim();
        let (namespace, name) = match entry.split_once(':') {
            Some((namespace, name)) if !namespace.is_empty() => (namespace, name),
            _ => (GENERIC_NAMESPACE, entry),
        };
        if name.is_empty() {
            return None;
        }
        Some(Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            negate: true,
            or: false,
        })
    }

    /// Neither negated nor optional: the item must carry this tag / 必须包含
    pub fn is_inclusive(&self) -> bool {
        !self.negate && !self.or
    }
}

/// Comparison operator of a numeric filter / 比较运算符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    Gt,
    Lt,
    Eq,
    Gte,
    Lte,
}

impl Comparison {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            ">" => Some(Self::Gt),
            "<" => Some(Self::Lt),
            "=" => Some(Self::Eq),
            ">=" => Some(Self::Gte),
            "<=" => Some(Self::Lte),
            _ => None,
        }
    }

    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Eq => "=",
            Self::Gte => ">=",
            Self::Lte => "<=",
        }
    }
}

/// What a numeric filter compares / 数值过滤对象
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NumericSubject {
    Pages,
    TagCount,
    SourceCount,
    /// Archive size in bytes / 字节大小
    Size,
    /// Number of tags in one namespace, e.g. `artist>3` / 命名空间标签数量
    NamespaceCount(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumericFilter {
    pub subject: NumericSubject,
    pub op: Comparison,
    pub value: i64,
}

/// Free-text words split by their role / 标题检索词
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleTerms {
    pub and: Vec<String>,
    pub or: Vec<String>,
    pub not: Vec<String>,
}

impl TitleTerms {
    pub fn is_empty(&self) -> bool {
        self.and.is_empty() && self.or.is_empty() && self.not.is_empty()
    }
}

/// Everything extracted from one query string / 解析结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedQuery {
    pub tags: Vec<TagMatch>,
    /// At most one filter per subject, the last occurrence wins / 每个对象只保留最后一个
    pub numeric: Vec<NumericFilter>,
    pub languages: Vec<String>,
    pub sources: Vec<String>,
    pub urls: Vec<String>,
    pub title: TitleTerms,
}

impl ParsedQuery {
    pub fn numeric_for(&self, subject: &NumericSubject) -> Option<&NumericFilter> {
        self.numeric.iter().find(|f| &f.subject == subject)
    }

    fn push_numeric(&mut self, filter: NumericFilter) {
        self.numeric.retain(|f| f.subject != filter.subject);
        self.numeric.push(filter);
    }
}

/// Parse a raw query string / 解析查询字符串
pub fn parse_query(query: &str) -> ParsedQuery {
    let mut parsed = ParsedQuery::default();

    // Tag-shaped tokens first; their spans are blanked before numeric extraction
    // so `artist:foo>3` never doubles as a count filter.
    let residual = TAG_TOKEN.replace_all(query, |caps: &regex::Captures| {
        let sigil = caps.get(1).map_or("", |m| m.as_str());
        let namespace = &caps[2];
        let raw_value = &caps[3];
        extract_tag_token(&mut parsed, sigil, namespace, raw_value);
        " "
    });

    let residual = NUMERIC_TOKEN.replace_all(&residual, |caps: &regex::Captures| {
        extract_numeric_token(&mut parsed, caps);
        " "
    });

    parsed.title = classify_words(&residual);
    parsed
}

fn extract_tag_token(parsed: &mut ParsedQuery, sigil: &str, namespace: &str, raw_value: &str) {
    let value = raw_value.replace('"', "");

    if is_reserved_namespace(namespace) {
        let value = value.replace('$', "");
        if value.is_empty() {
            return;
        }
        match namespace.to_ascii_lowercase().as_str() {
            "language" => parsed.languages.push(value),
            "source" => parsed.sources.push(value),
            "url" => {
                if is_plausible_url(&value) {
                    parsed.urls.push(value);
                } else {
                    tracing::debug!("Dropped url filter that does not parse: {}", value);
                }
            }
            other => tracing::debug!("Dropped reserved token {}:{}", other, value),
        }
        return;
    }

    let exact = value.ends_with('$');
    let mut name = value.replace('$', "").replace('*', "%");
    if name.chars().all(|c| c == '%') {
        // Empty or wildcard-only: matches everything, meaningless as a filter
        return;
    }
    if !exact {
        name.push('%');
    }

    parsed.tags.push(TagMatch {
        namespace: namespace.to_string(),
        name,
        negate: sigil == "-",
        or: sigil == "~",
    });
}

fn extract_numeric_token(parsed: &mut ParsedQuery, caps: &regex::Captures) {
    let word = &caps[1];
    let Some(op) = Comparison::parse(&caps[2]) else {
        return;
    };
    let Ok(number) = caps[3].parse::<i64>() else {
        tracing::debug!("Dropped numeric filter with out of range value: {}", &caps[0]);
        return;
    };
    let unit = caps.get(4).map(|m| m.as_str().to_ascii_lowercase());

    let subject = match word.to_ascii_lowercase().as_str() {
        "pages" => NumericSubject::Pages,
        "tags" => NumericSubject::TagCount,
        "sources" => NumericSubject::SourceCount,
        "size" => NumericSubject::Size,
        _ if is_reserved_namespace(word) => {
            tracing::debug!("Dropped numeric filter on reserved word: {}", &caps[0]);
            return;
        }
        _ => NumericSubject::NamespaceCount(word.to_string()),
    };

    let value = match (&subject, unit.as_deref()) {
        (NumericSubject::Size, unit) => match number.checked_mul(size_multiplier(unit)) {
            Some(value) => value,
            None => return,
        },
        (_, None) => number,
        // units only make sense for size
        (_, Some(_)) => return,
    };

    parsed.push_numeric(NumericFilter { subject, op, value });
}

/// Binary multiplier for a size unit / 大小单位倍数
fn size_multiplier(unit: Option<&str>) -> i64 {
    match unit {
        Some("k") => 1024,
        Some("m") => 1024 * 1024,
        Some("g") => 1024 * 1024 * 1024,
        _ => 1,
    }
}

fn is_plausible_url(fragment: &str) -> bool {
    url::Url::parse(&format!("http://{}", fragment)).is_ok()
}

fn classify_words(residual: &str) -> TitleTerms {
    let mut terms = TitleTerms::default();

    for word in residual.split_whitespace() {
        let word = word.replace('$', "");
        if let Some(rest) = word.strip_prefix('~') {
            if !rest.is_empty() {
                terms.or.push(rest.to_string());
            }
        } else if let Some(rest) = word.strip_prefix('-') {
            if !rest.is_empty() {
                terms.not.push(rest.to_string());
            }
        } else if !word.is_empty() {
            terms.and.push(word);
        }
    }

    terms
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(namespace: &str, name: &str, negate: bool, or: bool) -> TagMatch {
        TagMatch {
            namespace: namespace.to_string(),
            name: name.to_string(),
            negate,
            or,
        }
    }

    #[test]
    fn test_quoted_tag_gets_prefix_wildcard() {
        let parsed = parse_query(r#"artist:"John Doe""#);
        assert_eq!(parsed.tags, vec![tag("artist", "John Doe%", false, false)]);
        assert!(parsed.title.is_empty());
    }

    #[test]
    fn test_dollar_suffix_means_exact() {
        let parsed = parse_query(r#"artist:"John Doe$""#);
        assert_eq!(parsed.tags, vec![tag("artist", "John Doe", false, false)]);

        let parsed = parse_query("circle:foo$");
        assert_eq!(parsed.tags, vec![tag("circle", "foo", false, false)]);
    }

    #[test]
    fn test_sigils() {
        let parsed = parse_query("-artist:foo ~tag:bar");
        assert_eq!(
            parsed.tags,
            vec![tag("artist", "foo%", true, false), tag("tag", "bar%", false, true)]
        );
    }

    #[test]
    fn test_wildcard_only_value_is_dropped() {
        let parsed = parse_query("artist:% tag:** female:\"\"");
        assert!(parsed.tags.is_empty());
    }

    #[test]
    fn test_last_numeric_filter_wins() {
        let parsed = parse_query("pages>=10 pages<5");
        assert_eq!(
            parsed.numeric,
            vec![NumericFilter {
                subject: NumericSubject::Pages,
                op: Comparison::Lt,
                value: 5,
            }]
        );
    }

    #[test]
    fn test_size_units_are_binary() {
        let parsed = parse_query("size>2m");
        let size = parsed.numeric_for(&NumericSubject::Size).unwrap();
        assert_eq!(size.value, 2 * 1024 * 1024);
        assert_eq!(size.op, Comparison::Gt);

        let parsed = parse_query("size<=1G");
        assert_eq!(parsed.numeric_for(&NumericSubject::Size).unwrap().value, 1024 * 1024 * 1024);

        let parsed = parse_query("size=512");
        assert_eq!(parsed.numeric_for(&NumericSubject::Size).unwrap().value, 512);
    }

    #[test]
    fn test_unit_on_non_size_subject_is_dropped() {
        let parsed = parse_query("pages>10k");
        assert!(parsed.numeric.is_empty());
        assert!(parsed.title.is_empty());
    }

    #[test]
    fn test_count_filters() {
        let parsed = parse_query("tags<=5 sources=2 artist>3 circle<2");
        assert_eq!(parsed.numeric.len(), 4);
        assert_eq!(
            parsed.numeric_for(&NumericSubject::TagCount).unwrap().op,
            Comparison::Lte
        );
        assert_eq!(parsed.numeric_for(&NumericSubject::SourceCount).unwrap().value, 2);
        let artist = parsed
            .numeric_for(&NumericSubject::NamespaceCount("artist".to_string()))
            .unwrap();
        assert_eq!((artist.op, artist.value), (Comparison::Gt, 3));
    }

    #[test]
    fn test_reserved_words_are_never_tag_namespaces() {
        let parsed = parse_query("source:foo sources:bar url:example.com language:english size:big tags:many");
        assert!(parsed.tags.is_empty());
        assert_eq!(parsed.sources, vec!["foo".to_string()]);
        assert_eq!(parsed.urls, vec!["example.com".to_string()]);
        assert_eq!(parsed.languages, vec!["english".to_string()]);
        assert!(parsed.title.is_empty());

        let parsed = parse_query("url>3 language=2 source<1");
        assert!(parsed.numeric.is_empty());
    }

    #[test]
    fn test_invalid_url_is_dropped() {
        let parsed = parse_query("url:exa[mple");
        assert!(parsed.urls.is_empty());
    }

    #[test]
    fn test_multiple_languages_are_kept() {
        let parsed = parse_query("language:english language:japanese");
        assert_eq!(parsed.languages, vec!["english".to_string(), "japanese".to_string()]);
    }

    #[test]
    fn test_residual_words_are_classified() {
        let parsed = parse_query("big ~red ~blue -green artist:x cat$ pages>2");
        assert_eq!(parsed.title.and, vec!["big".to_string(), "cat".to_string()]);
        assert_eq!(parsed.title.or, vec!["red".to_string(), "blue".to_string()]);
        assert_eq!(parsed.title.not, vec!["green".to_string()]);
        assert_eq!(parsed.tags.len(), 1);
    }

    #[test]
    fn test_tag_value_does_not_double_as_count_filter() {
        let parsed = parse_query("artist:foo>3");
        assert_eq!(parsed.tags, vec![tag("artist", "foo>3%", false, false)]);
        assert!(parsed.numeric.is_empty());
    }

    #[test]
    fn test_parsing_is_pure() {
        let query = r#"-artist:"a b" ~tag:c pages>3 size<1k language:en hello -world"#;
        assert_eq!(parse_query(query), parse_query(query));
    }

    #[test]
    fn test_blacklist_entry() {
        assert_eq!(
            TagMatch::from_blacklist_entry("female:gore"),
            Some(tag("female", "gore", true, false))
        );
        assert_eq!(
            TagMatch::from_blacklist_entry("gore"),
            Some(tag("tag", "gore", true, false))
        );
        assert_eq!(TagMatch::from_blacklist_entry("artist:"), None);
    }
}
