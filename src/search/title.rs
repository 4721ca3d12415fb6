//! Title full-text compiler / 标题全文检索编译
//!
//! Renders classified free-text words into the query language of each
//! full-text engine:
//! - PostgreSQL `to_tsquery`: `a <-> b & (c | d) & !(e | f)`
//! - SQLite FTS5 `MATCH`: `"a" AND "b" AND ("c" OR "d") NOT ("e" OR "f")`

use super::tokenizer::TitleTerms;

/// Characters with operator meaning in tsquery syntax
const TSQUERY_RESERVED: &[char] = &['&', '|', '!', '(', ')', '<', '>', ':', '*', '\\', '"'];

const APOSTROPHES: &[char] = &['\'', '\u{2019}'];

/// A compiled FTS5 expression / FTS5 表达式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fts5Match {
    /// Rows whose index matches the expression / 匹配的行
    Matching(String),
    /// Rows whose index does NOT match the expression. FTS5 has no standalone
    /// negation, so a NOT-only query becomes an exclusion subquery / 排除匹配的行
    Excluding(String),
}

/// Render for PostgreSQL `to_tsquery('simple', ...)` / 渲染 tsquery
pub fn compile_tsquery(terms: &TitleTerms) -> Option<String> {
    let and: Vec<String> = terms.and.iter().filter_map(|w| tsquery_term(w)).collect();
    let or: Vec<String> = terms.or.iter().filter_map(|w| tsquery_term(w)).collect();
    let not: Vec<String> = terms.not.iter().filter_map(|w| tsquery_term(w)).collect();

    let mut clauses = Vec::new();
    if !and.is_empty() {
        clauses.push(and.join(" <-> "));
    }
    if !or.is_empty() {
        clauses.push(format!("({})", or.join(" | ")));
    }
    if !not.is_empty() {
        clauses.push(format!("!({})", not.join(" | ")));
    }

    if clauses.is_empty() {
        None
    } else {
        Some(clauses.join(" & "))
    }
}

/// Render for SQLite FTS5 `MATCH` / 渲染 FTS5 表达式
pub fn compile_fts5(terms: &TitleTerms) -> Option<Fts5Match> {
    let and: Vec<String> = terms.and.iter().filter_map(|w| fts5_term(w)).collect();
    let or: Vec<String> = terms.or.iter().filter_map(|w| fts5_term(w)).collect();
    let not: Vec<String> = terms.not.iter().filter_map(|w| fts5_term(w)).collect();

    let not_group = (!not.is_empty()).then(|| format!("({})", not.join(" OR ")));

    if and.is_empty() && or.is_empty() {
        return not_group.map(Fts5Match::Excluding);
    }

    let mut expr = and.join(" AND ");
    if !or.is_empty() {
        if !expr.is_empty() {
            expr.push_str(" AND ");
        }
        expr.push_str(&format!("({})", or.join(" OR ")));
    }
    if let Some(not_group) = not_group {
        expr.push_str(" NOT ");
        expr.push_str(&not_group);
    }

    Some(Fts5Match::Matching(expr))
}

fn tsquery_term(word: &str) -> Option<String> {
    let cleaned: String = word
        .to_lowercase()
        .chars()
        .filter(|c| !TSQUERY_RESERVED.contains(c) && !c.is_whitespace())
        .collect();

    // contractions stay adjacent: don't -> don <-> t
    let parts: Vec<&str> = cleaned
        .split(APOSTROPHES)
        .filter(|part| part.chars().any(char::is_alphanumeric))
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" <-> "))
    }
}

fn fts5_term(word: &str) -> Option<String> {
    let word = word.trim();
    // a phrase without tokens matches nothing in FTS5
    if !word.chars().any(char::is_alphanumeric) {
        return None;
    }
    Some(format!("\"{}\"", word.replace('"', "\"\"")))
}
