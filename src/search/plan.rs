//! Dialect-neutral query plan / 查询计划
//!
//! `compile` turns a parsed query plus resolved tag sets into a [`QueryPlan`];
//! `render` prints the plan through a [`Dialect`]. Nothing in the plan knows
//! which database it will run on.

use super::dialect::{Dialect, RenderedQuery, SqlWriter};
use super::resolver::ResolvedTags;
use super::schema::{Order, SearchOptions, SearchRequest, Sort};
use super::tokenizer::{Comparison, NumericSubject, ParsedQuery, TitleTerms, GENERIC_NAMESPACE};

/// Plain archive column compared by a numeric filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Pages,
    Size,
}

impl Column {
    fn as_sql(self) -> &'static str {
        match self {
            Column::Pages => "archives.pages",
            Column::Size => "archives.size",
        }
    }
}

/// One WHERE condition / 过滤条件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Item carries a tag matching the pattern
    HasTag { namespace: String, pattern: String },
    IdIn(Vec<i64>),
    IdNotIn(Vec<i64>),
    FullText(TitleTerms),
    Compare { column: Column, op: Comparison, value: i64 },
    Language(String),
    AnySourceName(Vec<String>),
    /// Substring match against source urls
    AnySourceUrl(Vec<String>),
    InSeries,
    /// Not soft-deleted
    Visible,
}

/// Aggregated join used by count filters / 计数连接
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CountJoin {
    Tags,
    Sources,
    /// Tags of one namespace, joined on top of `Tags`
    Namespace { alias: String, namespace: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CountTarget {
    Tags,
    Sources,
    Namespace(String),
}

impl CountTarget {
    fn count_expression(&self) -> String {
        match self {
            CountTarget::Tags => "COUNT(DISTINCT tag_links.tag_id)".to_string(),
            CountTarget::Sources => "COUNT(DISTINCT source_links.id)".to_string(),
            CountTarget::Namespace(alias) => format!("COUNT(DISTINCT {}.id)", alias),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HavingCount {
    pub target: CountTarget,
    pub op: Comparison,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPlan {
    pub predicates: Vec<Predicate>,
    pub joins: Vec<CountJoin>,
    pub having: Vec<HavingCount>,
    pub sort: Sort,
    pub order: Order,
}

impl QueryPlan {
    pub fn needs_group_by(&self) -> bool {
        !self.joins.is_empty()
    }

    fn ensure_join(&mut self, join: CountJoin) {
        if !self.joins.contains(&join) {
            self.joins.push(join);
        }
    }
}

/// Build the plan for one search / 编译查询计划
pub fn compile(
    parsed: &ParsedQuery,
    resolved: &ResolvedTags,
    request: &SearchRequest,
    options: &SearchOptions,
) -> QueryPlan {
    let mut plan = QueryPlan {
        predicates: Vec::new(),
        joins: Vec::new(),
        having: Vec::new(),
        sort: request.sort,
        order: request.order,
    };

    if !options.show_hidden {
        plan.predicates.push(Predicate::Visible);
    }
    if let Some(ids) = &options.allow_ids {
        plan.predicates.push(Predicate::IdIn(ids.clone()));
    }
    if let Some(ids) = &request.ids {
        plan.predicates.push(Predicate::IdIn(ids.clone()));
    }
    if request.series {
        plan.predicates.push(Predicate::InSeries);
    }

    for tag in parsed.tags.iter().filter(|t| t.is_inclusive()) {
        plan.predicates.push(Predicate::HasTag {
            namespace: tag.namespace.clone(),
            pattern: tag.name.clone(),
        });
    }
    if !resolved.excluded.is_empty() {
        plan.predicates.push(Predicate::IdNotIn(resolved.excluded.clone()));
    }
    if let Some(optional) = &resolved.optional {
        plan.predicates.push(Predicate::IdIn(optional.clone()));
    }

    if !parsed.title.is_empty() {
        plan.predicates.push(Predicate::FullText(parsed.title.clone()));
    }

    for language in &parsed.languages {
        plan.predicates.push(Predicate::Language(language.clone()));
    }
    if !parsed.sources.is_empty() {
        plan.predicates.push(Predicate::AnySourceName(parsed.sources.clone()));
    }
    if !parsed.urls.is_empty() {
        plan.predicates.push(Predicate::AnySourceUrl(parsed.urls.clone()));
    }

    let mut namespace_aliases = 0;
    for filter in &parsed.numeric {
        match &filter.subject {
            NumericSubject::Pages => plan.predicates.push(Predicate::Compare {
                column: Column::Pages,
                op: filter.op,
                value: filter.value,
            }),
            NumericSubject::Size => plan.predicates.push(Predicate::Compare {
                column: Column::Size,
                op: filter.op,
                value: filter.value,
            }),
            NumericSubject::TagCount => {
                plan.ensure_join(CountJoin::Tags);
                plan.having.push(HavingCount {
                    target: CountTarget::Tags,
                    op: filter.op,
                    value: filter.value,
                });
            }
            NumericSubject::SourceCount => {
                plan.ensure_join(CountJoin::Sources);
                plan.having.push(HavingCount {
                    target: CountTarget::Sources,
                    op: filter.op,
                    value: filter.value,
                });
            }
            NumericSubject::NamespaceCount(namespace) => {
                let alias = format!("ns_{}", namespace_aliases);
                namespace_aliases += 1;
                plan.ensure_join(CountJoin::Tags);
                plan.ensure_join(CountJoin::Namespace {
                    alias: alias.clone(),
                    namespace: namespace.clone(),
                });
                plan.having.push(HavingCount {
                    target: CountTarget::Namespace(alias),
                    op: filter.op,
                    value: filter.value,
                });
            }
        }
    }

    plan
}

/// Render the plan as `SELECT archives.id, archives.title ...` / 渲染SQL
pub fn render(plan: &QueryPlan, dialect: &dyn Dialect) -> RenderedQuery {
    let mut w = SqlWriter::new(dialect);
    w.push("SELECT archives.id, archives.title FROM archives");

    // Tags must come before any namespace join that hangs off it
    let mut joins: Vec<&CountJoin> = plan.joins.iter().collect();
    joins.sort_by_key(|join| match join {
        CountJoin::Tags => 0,
        CountJoin::Namespace { .. } => 1,
        CountJoin::Sources => 2,
    });
    for join in joins {
        match join {
            CountJoin::Tags => {
                w.push(" LEFT JOIN archive_tags AS tag_links ON tag_links.archive_id = archives.id");
            }
            CountJoin::Sources => {
                w.push(" LEFT JOIN archive_sources AS source_links ON source_links.archive_id = archives.id");
            }
            CountJoin::Namespace { alias, namespace } => {
                w.push(&format!(
                    " LEFT JOIN tags AS {alias} ON {alias}.id = tag_links.tag_id AND {alias}.namespace = "
                ));
                w.push_text(namespace.as_str());
            }
        }
    }

    let mut first = true;
    for predicate in &plan.predicates {
        if let Predicate::FullText(terms) = predicate {
            // all words sanitised away: no title condition at all
            if dialect.full_text_condition(terms).is_none() {
                continue;
            }
        }
        w.push(if first { " WHERE " } else { " AND " });
        first = false;
        render_predicate(&mut w, predicate);
    }

    if plan.needs_group_by() {
        w.push(" GROUP BY archives.id");
    }

    for (i, having) in plan.having.iter().enumerate() {
        w.push(if i == 0 { " HAVING " } else { " AND " });
        w.push(&having.target.count_expression());
        w.push(" ");
        w.push(having.op.as_sql());
        w.push(" ");
        w.push_int(having.value);
    }

    w.push(" ORDER BY ");
    w.push(&dialect.order_expression(plan.sort, plan.order));
    w.push(&format!(
        ", archives.created_at {order}, archives.id {order}",
        order = plan.order
    ));

    w.finish()
}

fn render_predicate(w: &mut SqlWriter<'_>, predicate: &Predicate) {
    let like = w.dialect().like_operator();
    match predicate {
        Predicate::HasTag { namespace, pattern } => {
            w.push(
                "EXISTS (SELECT 1 FROM archive_tags INNER JOIN tags ON tags.id = archive_tags.tag_id \
                 WHERE archive_tags.archive_id = archives.id AND ",
            );
            if namespace.eq_ignore_ascii_case(GENERIC_NAMESPACE) {
                w.push(&format!("(tags.name {} ", like));
                w.push_text(pattern.as_str());
                w.push(&format!(" OR tags.display_name {} ", like));
                w.push_text(pattern.as_str());
                w.push("))");
            } else {
                w.push(&format!("tags.name {} ", like));
                w.push_text(pattern.as_str());
                w.push(" AND tags.namespace = ");
                w.push_text(namespace.as_str());
                w.push(")");
            }
        }
        Predicate::IdIn(ids) => {
            if ids.is_empty() {
                w.push("1 = 0");
            } else {
                w.push("archives.id IN ").push_id_list(ids);
            }
        }
        Predicate::IdNotIn(ids) => {
            if ids.is_empty() {
                w.push("1 = 1");
            } else {
                w.push("archives.id NOT IN ").push_id_list(ids);
            }
        }
        Predicate::FullText(terms) => {
            if let Some(condition) = w.dialect().full_text_condition(terms) {
                w.push(condition.prefix);
                w.push_text(condition.query);
                w.push(condition.suffix);
            }
        }
        Predicate::Compare { column, op, value } => {
            w.push(&format!("{} {} ", column.as_sql(), op.as_sql()));
            w.push_int(*value);
        }
        Predicate::Language(language) => {
            w.push(&format!("archives.language {} ", like));
            w.push_text(language.as_str());
        }
        Predicate::AnySourceName(names) => {
            w.push("(");
            for (i, name) in names.iter().enumerate() {
                if i > 0 {
                    w.push(" OR ");
                }
                w.push(&format!(
                    "EXISTS (SELECT 1 FROM archive_sources WHERE archive_sources.archive_id = archives.id \
                     AND archive_sources.name {} ",
                    like
                ));
                w.push_text(name.as_str());
                w.push(")");
            }
            w.push(")");
        }
        Predicate::AnySourceUrl(urls) => {
            w.push("(");
            for (i, url) in urls.iter().enumerate() {
                if i > 0 {
                    w.push(" OR ");
                }
                w.push(&format!(
                    "EXISTS (SELECT 1 FROM archive_sources WHERE archive_sources.archive_id = archives.id \
                     AND archive_sources.url {} ",
                    like
                ));
                w.push_text(format!("%{}%", url));
                w.push(")");
            }
            w.push(")");
        }
        Predicate::InSeries => {
            w.push("EXISTS (SELECT 1 FROM series_archive WHERE series_archive.archive_id = archives.id)");
        }
        Predicate::Visible => {
            w.push("archives.deleted_at IS NULL");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::dialect::{Bind, PostgresDialect, SqliteDialect};
    use crate::search::tokenizer::parse_query;

    fn plan_for(query: &str) -> QueryPlan {
        compile(
            &parse_query(query),
            &ResolvedTags::default(),
            &SearchRequest::new(query),
            &SearchOptions::default(),
        )
    }

    #[test]
    fn test_empty_query_only_hides_deleted() {
        let plan = plan_for("");
        assert_eq!(plan.predicates, vec![Predicate::Visible]);
        assert!(!plan.needs_group_by());

        let q = render(&plan, &SqliteDialect);
        assert_eq!(
            q.sql,
            "SELECT archives.id, archives.title FROM archives WHERE archives.deleted_at IS NULL \
             ORDER BY archives.released_at IS NULL ASC, archives.released_at DESC, \
             archives.created_at DESC, archives.id DESC"
        );
    }

    #[test]
    fn test_show_hidden_drops_visibility() {
        let plan = compile(
            &parse_query(""),
            &ResolvedTags::default(),
            &SearchRequest::default(),
            &SearchOptions::default().show_hidden(true),
        );
        assert!(plan.predicates.is_empty());
        let q = render(&plan, &PostgresDialect);
        assert!(!q.sql.contains("WHERE"));
    }

    #[test]
    fn test_generic_tag_matches_display_name() {
        let q = render(&plan_for("tag:cat"), &PostgresDialect);
        assert!(q.sql.contains("(tags.name ILIKE $1 OR tags.display_name ILIKE $2)"));
        assert_eq!(
            q.binds,
            vec![Bind::Text("cat%".to_string()), Bind::Text("cat%".to_string())]
        );
    }

    #[test]
    fn test_namespaced_tag_binds_namespace() {
        let q = render(&plan_for("artist:jane"), &SqliteDialect);
        assert!(q.sql.contains("tags.name LIKE ? AND tags.namespace = ?"));
        assert_eq!(
            q.binds,
            vec![Bind::Text("jane%".to_string()), Bind::Text("artist".to_string())]
        );
    }

    #[test]
    fn test_counts_use_having_and_group_by() {
        let q = render(&plan_for("tags>3 artist>=2 sources=1"), &PostgresDialect);
        assert!(q.sql.contains("LEFT JOIN archive_tags AS tag_links"));
        assert!(q.sql.contains("LEFT JOIN tags AS ns_0 ON ns_0.id = tag_links.tag_id AND ns_0.namespace = $1"));
        assert!(q.sql.contains("LEFT JOIN archive_sources AS source_links"));
        assert!(q.sql.contains(" GROUP BY archives.id HAVING "));
        assert!(q.sql.contains("COUNT(DISTINCT tag_links.tag_id) > $2"));
        assert!(q.sql.contains("COUNT(DISTINCT ns_0.id) >= $3"));
        assert!(q.sql.contains("COUNT(DISTINCT source_links.id) = $4"));
        assert_eq!(q.binds[0], Bind::Text("artist".to_string()));
        assert_eq!(&q.binds[1..], &[Bind::Int(3), Bind::Int(2), Bind::Int(1)]);
    }

    #[test]
    fn test_pages_and_size_are_plain_comparisons() {
        let q = render(&plan_for("pages>10 size<2m"), &SqliteDialect);
        assert!(q.sql.contains("archives.pages > ?"));
        assert!(q.sql.contains("archives.size < ?"));
        assert!(!q.sql.contains("GROUP BY"));
        assert_eq!(q.binds, vec![Bind::Int(10), Bind::Int(2 * 1024 * 1024)]);
    }

    #[test]
    fn test_resolved_sets_become_id_lists() {
        let resolved = ResolvedTags {
            excluded: vec![4, 5],
            optional: Some(vec![1, 2]),
        };
        let plan = compile(
            &parse_query(""),
            &resolved,
            &SearchRequest::default(),
            &SearchOptions::default(),
        );
        let q = render(&plan, &SqliteDialect);
        assert!(q.sql.contains("archives.id NOT IN (4, 5)"));
        assert!(q.sql.contains("archives.id IN (1, 2)"));
    }

    #[test]
    fn test_allow_list_and_request_ids_intersect() {
        let request = SearchRequest {
            ids: Some(vec![1, 2]),
            ..Default::default()
        };
        let options = SearchOptions::default().with_allow_ids(vec![2, 3]);
        let plan = compile(&parse_query(""), &ResolvedTags::default(), &request, &options);
        let q = render(&plan, &PostgresDialect);
        assert!(q.sql.contains("archives.id IN (2, 3) AND archives.id IN (1, 2)"));
    }

    #[test]
    fn test_title_terms_use_dialect_full_text() {
        let q = render(&plan_for("big cat"), &PostgresDialect);
        assert!(q.sql.contains("archives.fts @@ to_tsquery('simple', $1)"));
        assert_eq!(q.binds, vec![Bind::Text("big <-> cat".to_string())]);

        let q = render(&plan_for("big cat"), &SqliteDialect);
        assert!(q.sql.contains("archives.id IN (SELECT rowid FROM archives_fts WHERE archives_fts MATCH ?)"));
        assert_eq!(q.binds, vec![Bind::Text(r#""big" AND "cat""#.to_string())]);
    }

    #[test]
    fn test_sanitised_away_title_adds_no_condition() {
        let q = render(&plan_for("()"), &PostgresDialect);
        assert!(q.binds.is_empty());
        assert!(!q.sql.contains("fts"));
    }

    #[test]
    fn test_sources_urls_and_languages() {
        let q = render(
            &plan_for("language:english source:pixiv url:example.com/a"),
            &PostgresDialect,
        );
        assert!(q.sql.contains("archives.language ILIKE $1"));
        assert!(q.sql.contains("archive_sources.name ILIKE $2"));
        assert!(q.sql.contains("archive_sources.url ILIKE $3"));
        assert_eq!(q.binds[2], Bind::Text("%example.com/a%".to_string()));
    }

    #[test]
    fn test_series_flag() {
        let request = SearchRequest::default().with_series(true);
        let plan = compile(
            &parse_query(""),
            &ResolvedTags::default(),
            &request,
            &SearchOptions::default(),
        );
        assert!(plan.predicates.contains(&Predicate::InSeries));
    }

    #[test]
    fn test_title_sort_per_dialect() {
        let request = SearchRequest::default().with_sort(Sort::Title, Order::Asc);
        let plan = compile(
            &parse_query(""),
            &ResolvedTags::default(),
            &request,
            &SearchOptions::default(),
        );
        let q = render(&plan, &SqliteDialect);
        assert!(q.sql.ends_with(
            "ORDER BY archives.title COLLATE NOCASE ASC, archives.created_at ASC, archives.id ASC"
        ));
        let q = render(&plan, &PostgresDialect);
        assert!(q.sql.ends_with(
            "ORDER BY archives.title ASC, archives.created_at ASC, archives.id ASC"
        ));
    }
}
