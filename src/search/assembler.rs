//! Result assembler - hydrates an ordered id page into listing items / 结果组装
//!
//! One batch query loads all rows with their tags, then the caller's order is
//! restored and display-time tag rules are applied.

use std::collections::HashMap;

use super::dialect::{Dialect, RenderedQuery, SqlWriter};
use crate::config::{GalleryListingConfig, TagExcludeRule, TagNames, TagWeightRule};
use crate::models::{LibraryItem, Tag};

/// Batch load query for `ids` / 批量加载查询
pub fn render_load(ids: &[i64], dialect: &dyn Dialect) -> RenderedQuery {
    let mut w = SqlWriter::new(dialect);
    w.push(
        "SELECT archives.id AS id, archives.hash AS hash, archives.title AS title, \
         archives.pages AS pages, archives.thumbnail AS thumbnail, \
         archives.deleted_at IS NOT NULL AS deleted, ",
    );
    w.push(dialect.tag_list_json());
    w.push(" AS tags FROM archives WHERE archives.id IN ")
        .push_id_list(ids);
    w.finish()
}

/// Put items in the order of `order`; ids not loaded are skipped / 恢复顺序
pub fn restore_order(items: Vec<LibraryItem>, order: &[i64]) -> Vec<LibraryItem> {
    let mut by_id: HashMap<i64, LibraryItem> = items.into_iter().map(|item| (item.id, item)).collect();
    order.iter().filter_map(|id| by_id.remove(id)).collect()
}

/// Display-time tag rules / 标签展示规则
#[derive(Debug, Clone, Default)]
pub struct TagCuration {
    exclude: Vec<TagExcludeRule>,
    weight: Vec<TagWeightRule>,
}

impl TagCuration {
    pub fn from_listing(listing: &GalleryListingConfig) -> Self {
        Self {
            exclude: listing.effective_tag_exclude(),
            weight: listing.effective_tag_weight(),
        }
    }

    /// Drop excluded tags, then order by weight (desc) and name / 过滤并排序
    pub fn apply(&self, tags: Vec<Tag>) -> Vec<Tag> {
        let mut kept: Vec<(i64, Tag)> = tags
            .into_iter()
            .filter(|tag| {
                !self.exclude.iter().any(|rule| {
                    rule_matches(rule.namespace.as_deref(), rule.name.as_ref(), rule.ignore_case, tag)
                })
            })
            .map(|tag| (self.weight_of(&tag), tag))
            .collect();

        kept.sort_by(|(wa, a), (wb, b)| {
            wb.cmp(wa)
                .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
                .then_with(|| a.name.cmp(&b.name))
        });

        kept.into_iter().map(|(_, tag)| tag).collect()
    }

    /// First matching rule wins
    fn weight_of(&self, tag: &Tag) -> i64 {
        self.weight
            .iter()
            .find(|rule| {
                rule_matches(rule.namespace.as_deref(), rule.name.as_ref(), rule.ignore_case, tag)
            })
            .map_or(0, |rule| rule.weight)
    }
}

/// A rule with only a namespace covers the whole namespace, a rule with only
/// names covers those names in any namespace. An empty rule matches nothing.
fn rule_matches(namespace: Option<&str>, names: Option<&TagNames>, ignore_case: bool, tag: &Tag) -> bool {
    if namespace.is_none() && names.is_none() {
        return false;
    }
    let namespace_ok = namespace.map_or(true, |ns| ns == tag.namespace);
    let name_ok = names.map_or(true, |names| {
        names.as_slice().iter().any(|name| {
            if ignore_case {
                name.to_lowercase() == tag.name.to_lowercase()
            } else {
                *name == tag.name
            }
        })
    });
    namespace_ok && name_ok
}
