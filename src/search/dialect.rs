//! SQL dialect strategies / SQL 方言
//!
//! Everything that differs between PostgreSQL and SQLite lives behind
//! [`Dialect`]; the compiler builds a dialect-neutral plan and the renderer
//! asks the dialect for placeholders, LIKE operator, full-text predicate and
//! ORDER BY expressions.

use serde::Serialize;

use super::schema::{Order, Sort};
use super::title::{compile_fts5, compile_tsquery, Fts5Match};
use super::tokenizer::TitleTerms;

/// Which backend a query was rendered for / 方言类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DialectKind {
    Postgres,
    Sqlite,
}

/// Bound parameter value / 绑定参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bind {
    Int(i64),
    Text(String),
}

/// SQL text plus its parameters, tagged with the dialect it targets / 渲染后的查询
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedQuery {
    pub dialect: DialectKind,
    pub sql: String,
    pub binds: Vec<Bind>,
}

/// A full-text condition split around its single bound query string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FullTextCondition {
    pub prefix: &'static str,
    pub query: String,
    pub suffix: &'static str,
}

pub trait Dialect: Send + Sync {
    fn kind(&self) -> DialectKind;

    /// Placeholder for the `index`-th bind, starting at 1
    fn placeholder(&self, index: usize) -> String;

    /// Case-insensitive LIKE operator
    fn like_operator(&self) -> &'static str;

    /// Title predicate, `None` when no term survives sanitising
    fn full_text_condition(&self, terms: &TitleTerms) -> Option<FullTextCondition>;

    /// Primary ORDER BY expression for a sort key, direction included
    fn order_expression(&self, sort: Sort, order: Order) -> String;

    /// Whether ORDER BY title already yields a natural, case-aware order
    fn orders_titles_naturally(&self) -> bool;

    /// Scalar subquery returning the item's tags as a JSON array (text),
    /// in attachment order
    fn tag_list_json(&self) -> &'static str;
}

/// PostgreSQL: tsvector full-text search, ILIKE, NULLS LAST / PostgreSQL 方言
pub struct PostgresDialect;

/// SQLite: FTS5 full-text index, NOCASE collation, no NULLS LAST / SQLite 方言
pub struct SqliteDialect;

impl Dialect for PostgresDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Postgres
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    fn like_operator(&self) -> &'static str {
        "ILIKE"
    }

    fn full_text_condition(&self, terms: &TitleTerms) -> Option<FullTextCondition> {
        compile_tsquery(terms).map(|query| FullTextCondition {
            prefix: "archives.fts @@ to_tsquery('simple', ",
            query,
            suffix: ")",
        })
    }

    fn order_expression(&self, sort: Sort, order: Order) -> String {
        match sort {
            Sort::ReleasedAt => format!("archives.released_at {} NULLS LAST", order),
            Sort::Title => format!("archives.title {}", order),
            Sort::Pages => format!("archives.pages {}", order),
            Sort::CreatedAt | Sort::Random => format!("archives.created_at {}", order),
        }
    }

    fn orders_titles_naturally(&self) -> bool {
        true
    }

    fn tag_list_json(&self) -> &'static str {
        r#"(SELECT COALESCE(json_agg(t), '[]'::json)::text FROM (
            SELECT tags.id, tags.namespace, tags.name, tags.display_name
            FROM archive_tags INNER JOIN tags ON tags.id = archive_tags.tag_id
            WHERE archive_tags.archive_id = archives.id
            ORDER BY archive_tags.created_at ASC, tags.id ASC
        ) AS t)"#
    }
}

impl Dialect for SqliteDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Sqlite
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn like_operator(&self) -> &'static str {
        "LIKE"
    }

    fn full_text_condition(&self, terms: &TitleTerms) -> Option<FullTextCondition> {
        compile_fts5(terms).map(|matched| match matched {
            Fts5Match::Matching(query) => FullTextCondition {
                prefix: "archives.id IN (SELECT rowid FROM archives_fts WHERE archives_fts MATCH ",
                query,
                suffix: ")",
            },
            Fts5Match::Excluding(query) => FullTextCondition {
                prefix: "archives.id NOT IN (SELECT rowid FROM archives_fts WHERE archives_fts MATCH ",
                query,
                suffix: ")",
            },
        })
    }

    fn order_expression(&self, sort: Sort, order: Order) -> String {
        match sort {
            // NULL sorts first in SQLite, push missing dates to the end
            Sort::ReleasedAt => format!(
                "archives.released_at IS NULL ASC, archives.released_at {}",
                order
            ),
            Sort::Title => format!("archives.title COLLATE NOCASE {}", order),
            Sort::Pages => format!("archives.pages {}", order),
            Sort::CreatedAt | Sort::Random => format!("archives.created_at {}", order),
        }
    }

    fn orders_titles_naturally(&self) -> bool {
        false
    }

    fn tag_list_json(&self) -> &'static str {
        r#"(SELECT json_group_array(json_object('id', t.id, 'namespace', t.namespace, 'name', t.name, 'display_name', t.display_name)) FROM (
            SELECT tags.id, tags.namespace, tags.name, tags.display_name
            FROM archive_tags INNER JOIN tags ON tags.id = archive_tags.tag_id
            WHERE archive_tags.archive_id = archives.id
            ORDER BY archive_tags.created_at ASC, tags.id ASC
        ) AS t)"#
    }
}

/// Incremental SQL builder that numbers placeholders for its dialect / SQL 拼接器
pub struct SqlWriter<'d> {
    dialect: &'d dyn Dialect,
    sql: String,
    binds: Vec<Bind>,
}

impl<'d> SqlWriter<'d> {
    pub fn new(dialect: &'d dyn Dialect) -> Self {
        Self {
            dialect,
            sql: String::new(),
            binds: Vec::new(),
        }
    }

    pub fn dialect(&self) -> &'d dyn Dialect {
        self.dialect
    }

    pub fn push(&mut self, sql: &str) -> &mut Self {
        self.sql.push_str(sql);
        self
    }

    pub fn push_bind(&mut self, bind: Bind) -> &mut Self {
        self.binds.push(bind);
        let placeholder = self.dialect.placeholder(self.binds.len());
        self.sql.push_str(&placeholder);
        self
    }

    pub fn push_text(&mut self, value: impl Into<String>) -> &mut Self {
        self.push_bind(Bind::Text(value.into()))
    }

    pub fn push_int(&mut self, value: i64) -> &mut Self {
        self.push_bind(Bind::Int(value))
    }

    /// Inline an id list; ids are integers so they are safe as literals
    pub fn push_id_list(&mut self, ids: &[i64]) -> &mut Self {
        let list = ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        self.sql.push('(');
        self.sql.push_str(&list);
        self.sql.push(')');
        self
    }

    pub fn finish(self) -> RenderedQuery {
        RenderedQuery {
            dialect: self.dialect.kind(),
            sql: self.sql,
            binds: self.binds,
        }
    }
}
