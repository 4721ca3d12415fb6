//! Library listing endpoints / 列表接口

use axum::{
    extract::{Query, State},
    Json,
};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;

use crate::api::ApiResponse;
use crate::state::AppState;
use gallery_backend::models::{LibraryItem, LibraryPage, LoadItemsRequest};
use gallery_backend::search::{LoadOptions, SearchOptions, SearchRequest, Sort};

const SEED_LENGTH: usize = 16;

/// Random alphanumeric seed for a fresh random listing / 生成随机种子
fn generate_seed() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SEED_LENGTH)
        .map(char::from)
        .collect()
}

/// GET /api/library
pub async fn library(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<ApiResponse<LibraryPage>> {
    let mut request = SearchRequest::from_params(&params, state.engine.site());
    if request.sort == Sort::Random && request.seed.is_none() {
        request.seed = Some(generate_seed());
    }

    // 无登录体系：隐藏条目不对外
    let options = SearchOptions::default();
    let result = match state.engine.search(&request, &options).await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!("Library search failed: {}", e);
            return Json(ApiResponse::error("搜索失败"));
        }
    };

    let load = LoadOptions {
        preserve_order_by: None,
        apply_tag_curation: true,
    };
    let items = match state.engine.load_items(&result.ids, &load).await {
        Ok(items) => items,
        Err(e) => {
            tracing::error!("Loading library items failed: {}", e);
            return Json(ApiResponse::error("加载条目失败"));
        }
    };

    Json(ApiResponse::success(LibraryPage {
        items,
        total: result.total,
        page: request.page,
        limit: request.limit,
        seed: request.seed.filter(|_| request.sort == Sort::Random),
    }))
}

/// POST /api/library/items
pub async fn items(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoadItemsRequest>,
) -> Json<ApiResponse<Vec<LibraryItem>>> {
    // keep hidden items out, same as the listing
    let options = SearchOptions::default()
        .with_allow_ids(req.ids.clone())
        .skip_pagination(true);
    let visible = match state.engine.search(&SearchRequest::default(), &options).await {
        Ok(result) => result.ids,
        Err(e) => {
            tracing::error!("Filtering requested items failed: {}", e);
            return Json(ApiResponse::error("加载条目失败"));
        }
    };

    let load = LoadOptions {
        preserve_order_by: Some(req.ids),
        apply_tag_curation: true,
    };
    match state.engine.load_items(&visible, &load).await {
        Ok(items) => Json(ApiResponse::success(items)),
        Err(e) => {
            tracing::error!("Loading items failed: {}", e);
            Json(ApiResponse::error("加载条目失败"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_seed_shape() {
        let seed = generate_seed();
        assert_eq!(seed.len(), SEED_LENGTH);
        assert!(seed.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(seed, generate_seed());
    }
}
