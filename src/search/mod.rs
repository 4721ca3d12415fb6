//! Search module - query language, cross-dialect compiler and executor / 搜索模块
//!
//! Architecture principles / 架构原则：
//! - Parsing is pure: the same string always yields the same `ParsedQuery`
//! - Compilation builds an inspectable `QueryPlan`; only the renderer knows SQL dialects
//! - The full ordered id list is materialised, then sliced into pages
//!
//! Call direction: API → SearchEngine → (tokenizer, resolver, plan, order, assembler) → DbPool

pub mod assembler;
pub mod dialect;
pub mod engine;
pub mod error;
pub mod order;
pub mod plan;
pub mod resolver;
pub mod schema;
pub mod title;
pub mod tokenizer;

pub use dialect::{Dialect, DialectKind, PostgresDialect, RenderedQuery, SqliteDialect};
pub use engine::SearchEngine;
pub use error::SearchError;
pub use schema::{LoadOptions, Order, SearchOptions, SearchRequest, SearchResult, Sort};
pub use tokenizer::{parse_query, ParsedQuery, TagMatch, RESERVED_NAMESPACES};
