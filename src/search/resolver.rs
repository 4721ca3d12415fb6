//! Tag set resolution / 标签集合解析
//!
//! Negated and optional tag filters are resolved to item id sets before the
//! main query is compiled: tag patterns -> tag ids -> item ids.

use futures::future::try_join_all;

use super::dialect::SqlWriter;
use super::error::Result;
use super::tokenizer::{TagMatch, GENERIC_NAMESPACE};
use crate::db::DbPool;

/// Item id sets derived from tag filters / 标签解析结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedTags {
    /// Items carrying any negated tag / 需排除的条目
    pub excluded: Vec<i64>,
    /// Items carrying any optional tag, `None` without optional filters / 可选组条目
    pub optional: Option<Vec<i64>>,
}

pub struct TagResolver<'a> {
    db: &'a DbPool,
}

impl<'a> TagResolver<'a> {
    pub fn new(db: &'a DbPool) -> Self {
        Self { db }
    }

    /// Resolve negated and optional groups concurrently / 并发解析排除组与可选组
    pub async fn resolve(&self, tags: &[TagMatch]) -> Result<ResolvedTags> {
        let excludes: Vec<&TagMatch> = tags.iter().filter(|t| t.negate && !t.or).collect();
        let optionals: Vec<&TagMatch> = tags.iter().filter(|t| t.or).collect();

        let (excluded, optional) =
            tokio::try_join!(self.items_for(&excludes), self.items_for(&optionals))?;

        Ok(ResolvedTags {
            excluded,
            optional: if optionals.is_empty() { None } else { Some(optional) },
        })
    }

    /// Distinct items carrying any tag matched by `matches`
    async fn items_for(&self, matches: &[&TagMatch]) -> Result<Vec<i64>> {
        if matches.is_empty() {
            return Ok(Vec::new());
        }

        let mut tag_ids: Vec<i64> = try_join_all(matches.iter().map(|m| self.tag_ids(m)))
            .await?
            .into_iter()
            .flatten()
            .collect();
        tag_ids.sort_unstable();
        tag_ids.dedup();

        if tag_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut w = SqlWriter::new(self.db.dialect());
        w.push("SELECT archive_tags.archive_id FROM archive_tags WHERE archive_tags.tag_id IN ")
            .push_id_list(&tag_ids)
            .push(" GROUP BY archive_tags.archive_id");
        self.db.fetch_ids(&w.finish()).await
    }

    /// Tag ids whose name or display name matches / 匹配的标签ID
    async fn tag_ids(&self, tag: &TagMatch) -> Result<Vec<i64>> {
        let dialect = self.db.dialect();
        let like = dialect.like_operator();

        let mut w = SqlWriter::new(dialect);
        w.push("SELECT tags.id FROM tags WHERE ");
        if !tag.namespace.eq_ignore_ascii_case(GENERIC_NAMESPACE) {
            w.push("tags.namespace = ").push_text(tag.namespace.as_str()).push(" AND ");
        }
        w.push(&format!("(tags.name {} ", like))
            .push_text(tag.name.as_str())
            .push(&format!(" OR tags.display_name {} ", like))
            .push_text(tag.name.as_str())
            .push(")");

        self.db.fetch_ids(&w.finish()).await
    }
}
