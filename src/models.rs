use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Tag {
    pub id: i64,
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Row shape of the batch item load; `tags` is a JSON array of [`Tag`]
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ItemRow {
    pub id: i64,
    pub hash: String,
    pub title: String,
    pub pages: i64,
    pub thumbnail: i64,
    pub deleted: bool,
    pub tags: String,
}

/// Listing card for one library item / 列表条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryItem {
    pub id: i64,
    pub hash: String,
    pub title: String,
    pub pages: i64,
    pub thumbnail: i64,
    pub deleted: bool,
    pub tags: Vec<Tag>,
}

impl TryFrom<ItemRow> for LibraryItem {
    type Error = serde_json::Error;

    fn try_from(row: ItemRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            hash: row.hash,
            title: row.title,
            pages: row.pages,
            thumbnail: row.thumbnail,
            deleted: row.deleted,
            tags: serde_json::from_str(&row.tags)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryPage {
    pub items: Vec<LibraryItem>,
    pub total: usize,
    pub page: usize,
    pub limit: usize,
    /// Seed used for random order, echoed so the client can page consistently
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadItemsRequest {
    pub ids: Vec<i64>,
}
