//! Search engine - query string in, ordered page of ids out / 搜索引擎
//!
//! Pipeline / 流程：
//! 1. parse the query string into structured filters
//! 2. resolve negated and optional tag groups to id sets
//! 3. compile a dialect-neutral plan and render it for the connection
//! 4. order in memory where SQL cannot (natural titles, seeded random)
//! 5. paginate
//!
//! Every database step can be abandoned through a [`CancellationToken`].

use std::collections::HashSet;
use std::future::Future;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use super::assembler::{render_load, restore_order, TagCuration};
use super::error::{Result, SearchError};
use super::order::{paginate, seeded_shuffle, sort_titles_naturally};
use super::plan::{compile, render};
use super::resolver::TagResolver;
use super::schema::{LoadOptions, SearchOptions, SearchRequest, SearchResult, Sort};
use super::tokenizer::{parse_query, TagMatch};
use crate::config::SiteConfig;
use crate::db::DbPool;
use crate::models::LibraryItem;

/// Search engine bound to one database / 搜索引擎
pub struct SearchEngine {
    db: DbPool,
    site: SiteConfig,
    curation: TagCuration,
}

impl SearchEngine {
    pub fn new(db: DbPool, site: SiteConfig) -> Self {
        let curation = TagCuration::from_listing(&site.gallery_listing);
        Self { db, site, curation }
    }

    pub fn db(&self) -> &DbPool {
        &self.db
    }

    pub fn site(&self) -> &SiteConfig {
        &self.site
    }

    /// Search without a cancellation source / 搜索
    pub async fn search(&self, request: &SearchRequest, options: &SearchOptions) -> Result<SearchResult> {
        self.search_with_cancel(request, options, &CancellationToken::new())
            .await
    }

    /// Search, giving up with [`SearchError::Cancelled`] once `cancel` fires / 可取消的搜索
    pub async fn search_with_cancel(
        &self,
        request: &SearchRequest,
        options: &SearchOptions,
        cancel: &CancellationToken,
    ) -> Result<SearchResult> {
        if matches!(&options.allow_ids, Some(ids) if ids.is_empty()) {
            tracing::debug!("Empty allow-list, skipping search");
            return Ok(SearchResult::empty());
        }

        let started = Instant::now();

        let mut parsed = parse_query(&request.query);
        parsed.tags.extend(
            options
                .tag_blacklist
                .iter()
                .filter_map(|entry| TagMatch::from_blacklist_entry(entry)),
        );
        tracing::debug!("Parsed query '{}' in {:?}", request.query, started.elapsed());

        let languages: HashSet<String> = parsed.languages.iter().map(|l| l.to_lowercase()).collect();
        if languages.len() > 1 {
            tracing::warn!(
                "Query names {} languages, all must match: {:?}",
                languages.len(),
                parsed.languages
            );
        }

        let step = Instant::now();
        let resolved = cancellable(cancel, TagResolver::new(&self.db).resolve(&parsed.tags)).await?;
        tracing::debug!(
            "Resolved tag groups in {:?}: {} excluded, {:?} optional",
            step.elapsed(),
            resolved.excluded.len(),
            resolved.optional.as_ref().map(Vec::len)
        );
        if matches!(&resolved.optional, Some(ids) if ids.is_empty()) {
            tracing::debug!("Optional tag group matched nothing");
            return Ok(SearchResult::empty());
        }

        let plan = compile(&parsed, &resolved, request, options);
        let rendered = render(&plan, self.db.dialect());
        tracing::debug!("Search SQL: {} ({} binds)", rendered.sql, rendered.binds.len());

        let step = Instant::now();
        let mut rows = cancellable(cancel, self.db.fetch_id_title(&rendered)).await?;
        tracing::debug!("Fetched {} rows in {:?}", rows.len(), step.elapsed());

        let step = Instant::now();
        match request.sort {
            Sort::Title if !self.db.dialect().orders_titles_naturally() => {
                sort_titles_naturally(&mut rows, request.order);
            }
            Sort::Random => match &request.seed {
                Some(seed) => seeded_shuffle(&mut rows, seed),
                None => tracing::debug!("Random sort without seed, keeping creation order"),
            },
            _ => {}
        }

        let ids: Vec<i64> = rows.into_iter().map(|(id, _)| id).collect();
        let total = ids.len();
        let ids = if options.skip_pagination {
            ids
        } else {
            paginate(&ids, request.page, request.limit)
        };
        tracing::debug!(
            "Ordered and paged in {:?}, {} of {} items, total {:?}",
            step.elapsed(),
            ids.len(),
            total,
            started.elapsed()
        );

        Ok(SearchResult { ids, total })
    }

    /// Hydrate ids into listing items / 加载条目
    pub async fn load_items(&self, ids: &[i64], options: &LoadOptions) -> Result<Vec<LibraryItem>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rendered = render_load(ids, self.db.dialect());
        let rows = self.db.fetch_items(&rendered).await?;

        let mut items = rows
            .into_iter()
            .map(LibraryItem::try_from)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        if options.apply_tag_curation {
            for item in &mut items {
                item.tags = self.curation.apply(std::mem::take(&mut item.tags));
            }
        }

        let order = options.preserve_order_by.as_deref().unwrap_or(ids);
        Ok(restore_order(items, order))
    }
}

/// Race a step against the cancellation token
async fn cancellable<T, F>(cancel: &CancellationToken, step: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            tracing::debug!("Search cancelled");
            Err(SearchError::Cancelled)
        }
        result = step => result,
    }
}
