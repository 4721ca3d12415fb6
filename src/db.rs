//! Database access / 数据库访问
//!
//! One pool per process, either SQLite or PostgreSQL. The pool also decides
//! the SQL dialect the search compiler renders for.

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{PgPool, SqlitePool};

use crate::config::Vendor;
use crate::models::ItemRow;
use crate::search::dialect::{Bind, Dialect, DialectKind, PostgresDialect, RenderedQuery, SqliteDialect};
use crate::search::error::SearchError;

/// Connection pool for the configured vendor / 数据库连接池
#[derive(Debug, Clone)]
pub enum DbPool {
    Sqlite(SqlitePool),
    Postgres(PgPool),
}

/// Bind every parameter of a rendered query in order
macro_rules! bind_all {
    ($query:expr, $binds:expr) => {{
        let mut query = $query;
        for bind in $binds {
            query = match bind {
                Bind::Int(value) => query.bind(*value),
                Bind::Text(value) => query.bind(value.as_str()),
            };
        }
        query
    }};
}

impl DbPool {
    /// Connect to the database / 连接数据库
    pub async fn connect(vendor: Vendor, url: &str, max_connections: u32) -> Result<Self> {
        match vendor {
            Vendor::Sqlite => {
                let pool = SqlitePoolOptions::new()
                    .max_connections(max_connections)
                    .connect(url)
                    .await?;
                // 启用WAL模式，提高并发性能
                sqlx::query("PRAGMA journal_mode=WAL").execute(&pool).await?;
                Ok(DbPool::Sqlite(pool))
            }
            Vendor::Postgresql => {
                let pool = PgPoolOptions::new()
                    .max_connections(max_connections)
                    .connect(url)
                    .await?;
                Ok(DbPool::Postgres(pool))
            }
        }
    }

    pub fn kind(&self) -> DialectKind {
        match self {
            DbPool::Sqlite(_) => DialectKind::Sqlite,
            DbPool::Postgres(_) => DialectKind::Postgres,
        }
    }

    /// Dialect matching this connection / 当前连接对应的方言
    pub fn dialect(&self) -> &'static dyn Dialect {
        match self {
            DbPool::Sqlite(_) => &SqliteDialect,
            DbPool::Postgres(_) => &PostgresDialect,
        }
    }

    fn check_dialect(&self, query: &RenderedQuery) -> Result<(), SearchError> {
        if query.dialect != self.kind() {
            tracing::error!(
                "Refusing to run {:?} query on {:?} connection: {}",
                query.dialect,
                self.kind(),
                query.sql
            );
            return Err(SearchError::DialectMismatch {
                expected: query.dialect,
                actual: self.kind(),
            });
        }
        Ok(())
    }

    /// Run a query selecting `(id, title)` / 查询 (id, title)
    pub async fn fetch_id_title(&self, query: &RenderedQuery) -> Result<Vec<(i64, String)>, SearchError> {
        self.check_dialect(query)?;
        let rows = match self {
            DbPool::Sqlite(pool) => {
                bind_all!(sqlx::query_as::<_, (i64, String)>(&query.sql), &query.binds)
                    .fetch_all(pool)
                    .await?
            }
            DbPool::Postgres(pool) => {
                bind_all!(sqlx::query_as::<_, (i64, String)>(&query.sql), &query.binds)
                    .fetch_all(pool)
                    .await?
            }
        };
        Ok(rows)
    }

    /// Run a query selecting a single id column / 查询ID列
    pub async fn fetch_ids(&self, query: &RenderedQuery) -> Result<Vec<i64>, SearchError> {
        self.check_dialect(query)?;
        let ids = match self {
            DbPool::Sqlite(pool) => {
                bind_all!(sqlx::query_scalar::<_, i64>(&query.sql), &query.binds)
                    .fetch_all(pool)
                    .await?
            }
            DbPool::Postgres(pool) => {
                bind_all!(sqlx::query_scalar::<_, i64>(&query.sql), &query.binds)
                    .fetch_all(pool)
                    .await?
            }
        };
        Ok(ids)
    }

    /// Run the batch item load / 批量加载条目
    pub async fn fetch_items(&self, query: &RenderedQuery) -> Result<Vec<ItemRow>, SearchError> {
        self.check_dialect(query)?;
        let rows = match self {
            DbPool::Sqlite(pool) => {
                bind_all!(sqlx::query_as::<_, ItemRow>(&query.sql), &query.binds)
                    .fetch_all(pool)
                    .await?
            }
            DbPool::Postgres(pool) => {
                bind_all!(sqlx::query_as::<_, ItemRow>(&query.sql), &query.binds)
                    .fetch_all(pool)
                    .await?
            }
        };
        Ok(rows)
    }

}

/// Run database migrations / 运行数据库迁移
pub async fn run_migrations(db: &DbPool) -> Result<()> {
    match db {
        DbPool::Sqlite(pool) => run_sqlite_migrations(pool).await,
        DbPool::Postgres(pool) => run_postgres_migrations(pool).await,
    }
}

const SQLITE_SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS archives (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        hash TEXT NOT NULL UNIQUE,
        title TEXT NOT NULL,
        description TEXT,
        pages INTEGER NOT NULL DEFAULT 0,
        thumbnail INTEGER NOT NULL DEFAULT 1,
        language TEXT,
        size INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
        released_at TEXT,
        deleted_at TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tags (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        namespace TEXT NOT NULL,
        name TEXT NOT NULL,
        display_name TEXT,
        UNIQUE (namespace, name)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS archive_tags (
        archive_id INTEGER NOT NULL REFERENCES archives(id) ON DELETE CASCADE,
        tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
        created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
        PRIMARY KEY (archive_id, tag_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS archive_sources (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        archive_id INTEGER NOT NULL REFERENCES archives(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        url TEXT,
        created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS series (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS series_archive (
        series_id INTEGER NOT NULL REFERENCES series(id) ON DELETE CASCADE,
        archive_id INTEGER NOT NULL REFERENCES archives(id) ON DELETE CASCADE,
        "order" INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (series_id, archive_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_archive_tags_tag_id ON archive_tags(tag_id)",
    "CREATE INDEX IF NOT EXISTS idx_archive_sources_archive_id ON archive_sources(archive_id)",
    "CREATE INDEX IF NOT EXISTS idx_tags_name ON tags(name)",
    "CREATE INDEX IF NOT EXISTS idx_series_archive_archive_id ON series_archive(archive_id)",
    // 全文索引：rowid = archives.id
    "CREATE VIRTUAL TABLE IF NOT EXISTS archives_fts USING fts5(title, description, tags)",
    r#"
    CREATE TRIGGER IF NOT EXISTS archives_fts_insert AFTER INSERT ON archives BEGIN
        INSERT INTO archives_fts (rowid, title, description, tags)
        VALUES (new.id, new.title, coalesce(new.description, ''), '');
    END
    "#,
    r#"
    CREATE TRIGGER IF NOT EXISTS archives_fts_update AFTER UPDATE OF title, description ON archives BEGIN
        UPDATE archives_fts SET title = new.title, description = coalesce(new.description, '')
        WHERE rowid = new.id;
    END
    "#,
    r#"
    CREATE TRIGGER IF NOT EXISTS archives_fts_delete AFTER DELETE ON archives BEGIN
        DELETE FROM archives_fts WHERE rowid = old.id;
    END
    "#,
    r#"
    CREATE TRIGGER IF NOT EXISTS archive_tags_fts_insert AFTER INSERT ON archive_tags BEGIN
        UPDATE archives_fts SET tags = (
            SELECT coalesce(group_concat(tags.name, ' '), '')
            FROM archive_tags INNER JOIN tags ON tags.id = archive_tags.tag_id
            WHERE archive_tags.archive_id = new.archive_id
        ) WHERE rowid = new.archive_id;
    END
    "#,
    r#"
    CREATE TRIGGER IF NOT EXISTS archive_tags_fts_delete AFTER DELETE ON archive_tags BEGIN
        UPDATE archives_fts SET tags = (
            SELECT coalesce(group_concat(tags.name, ' '), '')
            FROM archive_tags INNER JOIN tags ON tags.id = archive_tags.tag_id
            WHERE archive_tags.archive_id = old.archive_id
        ) WHERE rowid = old.archive_id;
    END
    "#,
];

const POSTGRES_SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS archives (
        id BIGSERIAL PRIMARY KEY,
        hash TEXT NOT NULL UNIQUE,
        title TEXT NOT NULL,
        description TEXT,
        pages BIGINT NOT NULL DEFAULT 0,
        thumbnail BIGINT NOT NULL DEFAULT 1,
        language TEXT,
        size BIGINT NOT NULL DEFAULT 0,
        created_at TIMESTAMP NOT NULL DEFAULT now(),
        released_at TIMESTAMP,
        deleted_at TIMESTAMP,
        fts TSVECTOR
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tags (
        id BIGSERIAL PRIMARY KEY,
        namespace TEXT NOT NULL,
        name TEXT NOT NULL,
        display_name TEXT,
        UNIQUE (namespace, name)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS archive_tags (
        archive_id BIGINT NOT NULL REFERENCES archives(id) ON DELETE CASCADE,
        tag_id BIGINT NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
        created_at TIMESTAMP NOT NULL DEFAULT now(),
        PRIMARY KEY (archive_id, tag_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS archive_sources (
        id BIGSERIAL PRIMARY KEY,
        archive_id BIGINT NOT NULL REFERENCES archives(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        url TEXT,
        created_at TIMESTAMP NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS series (
        id BIGSERIAL PRIMARY KEY,
        title TEXT NOT NULL,
        created_at TIMESTAMP NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS series_archive (
        series_id BIGINT NOT NULL REFERENCES series(id) ON DELETE CASCADE,
        archive_id BIGINT NOT NULL REFERENCES archives(id) ON DELETE CASCADE,
        "order" BIGINT NOT NULL DEFAULT 0,
        PRIMARY KEY (series_id, archive_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_archive_tags_tag_id ON archive_tags(tag_id)",
    "CREATE INDEX IF NOT EXISTS idx_archive_sources_archive_id ON archive_sources(archive_id)",
    "CREATE INDEX IF NOT EXISTS idx_tags_name ON tags(name)",
    "CREATE INDEX IF NOT EXISTS idx_series_archive_archive_id ON series_archive(archive_id)",
    "CREATE INDEX IF NOT EXISTS idx_archives_fts ON archives USING GIN (fts)",
    r#"
    CREATE OR REPLACE FUNCTION archives_fts_refresh(target BIGINT) RETURNS VOID AS $$
        UPDATE archives SET fts =
            to_tsvector('simple', title)
            || to_tsvector('simple', coalesce(description, ''))
            || to_tsvector('simple', coalesce((
                SELECT string_agg(tags.name, ' ')
                FROM tags INNER JOIN archive_tags ON archive_tags.tag_id = tags.id
                WHERE archive_tags.archive_id = target
            ), ''))
        WHERE id = target;
    $$ LANGUAGE sql
    "#,
    r#"
    CREATE OR REPLACE FUNCTION archives_fts_trigger() RETURNS TRIGGER AS $$
    BEGIN
        IF TG_TABLE_NAME = 'archives' THEN
            PERFORM archives_fts_refresh(NEW.id);
        ELSIF TG_OP = 'DELETE' THEN
            PERFORM archives_fts_refresh(OLD.archive_id);
        ELSE
            PERFORM archives_fts_refresh(NEW.archive_id);
        END IF;
        RETURN NULL;
    END;
    $$ LANGUAGE plpgsql
    "#,
    "DROP TRIGGER IF EXISTS archives_fts_on_archives ON archives",
    r#"
    CREATE TRIGGER archives_fts_on_archives
        AFTER INSERT OR UPDATE OF title, description ON archives
        FOR EACH ROW EXECUTE FUNCTION archives_fts_trigger()
    "#,
    "DROP TRIGGER IF EXISTS archives_fts_on_archive_tags ON archive_tags",
    r#"
    CREATE TRIGGER archives_fts_on_archive_tags
        AFTER INSERT OR DELETE ON archive_tags
        FOR EACH ROW EXECUTE FUNCTION archives_fts_trigger()
    "#,
];

async fn run_sqlite_migrations(pool: &SqlitePool) -> Result<()> {
    for statement in SQLITE_SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    tracing::debug!("SQLite schema ready");
    Ok(())
}

async fn run_postgres_migrations(pool: &PgPool) -> Result<()> {
    for statement in POSTGRES_SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    tracing::debug!("PostgreSQL schema ready");
    Ok(())
}

/// In-memory SQLite with the full schema, shared by the search tests
#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    pub async fn memory_pool() -> DbPool {
        // a single connection keeps the in-memory database alive and shared
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let db = DbPool::Sqlite(pool);
        run_migrations(&db).await.unwrap();
        db
    }

    /// Insert an archive and return its id
    pub async fn insert_archive(db: &DbPool, hash: &str, title: &str, pages: i64) -> i64 {
        let DbPool::Sqlite(pool) = db else {
            unreachable!()
        };
        sqlx::query_scalar::<_, i64>(
            "INSERT INTO archives (hash, title, pages) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(hash)
        .bind(title)
        .bind(pages)
        .fetch_one(pool)
        .await
        .unwrap()
    }

    pub async fn exec(db: &DbPool, sql: &str) {
        let DbPool::Sqlite(pool) = db else {
            unreachable!()
        };
        sqlx::query(sql).execute(pool).await.unwrap();
    }

    /// Attach a tag, creating it when needed
    pub async fn tag_archive(db: &DbPool, archive_id: i64, namespace: &str, name: &str) {
        let DbPool::Sqlite(pool) = db else {
            unreachable!()
        };
        sqlx::query("INSERT OR IGNORE INTO tags (namespace, name) VALUES (?, ?)")
            .bind(namespace)
            .bind(name)
            .execute(pool)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO archive_tags (archive_id, tag_id) \
             SELECT ?, id FROM tags WHERE namespace = ? AND name = ?",
        )
        .bind(archive_id)
        .bind(namespace)
        .bind(name)
        .execute(pool)
        .await
        .unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::search::dialect::SqlWriter;

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let db = memory_pool().await;
        run_migrations(&db).await.unwrap();
        assert_eq!(db.kind(), DialectKind::Sqlite);
    }

    #[tokio::test]
    async fn test_fts_follows_title_and_tags() {
        let db = memory_pool().await;
        let id = insert_archive(&db, "h1", "Summer Festival", 10).await;
        tag_archive(&db, id, "tag", "fireworks").await;

        let mut w = SqlWriter::new(db.dialect());
        w.push("SELECT rowid FROM archives_fts WHERE archives_fts MATCH ")
            .push_text("\"fireworks\"");
        assert_eq!(db.fetch_ids(&w.finish()).await.unwrap(), vec![id]);

        exec(&db, "UPDATE archives SET title = 'Winter Market'").await;
        let mut w = SqlWriter::new(db.dialect());
        w.push("SELECT rowid FROM archives_fts WHERE archives_fts MATCH ")
            .push_text("\"winter\"");
        assert_eq!(db.fetch_ids(&w.finish()).await.unwrap(), vec![id]);

        exec(&db, "UPDATE archives SET description = 'sunset beach'").await;
        let mut w = SqlWriter::new(db.dialect());
        w.push("SELECT rowid FROM archives_fts WHERE archives_fts MATCH ")
            .push_text("\"sunset\"");
        assert_eq!(db.fetch_ids(&w.finish()).await.unwrap(), vec![id]);
    }

    #[tokio::test]
    async fn test_dialect_mismatch_is_rejected() {
        let db = memory_pool().await;
        let mut w = SqlWriter::new(&PostgresDialect);
        w.push("SELECT 1");
        let err = db.fetch_ids(&w.finish()).await.unwrap_err();
        assert!(matches!(
            err,
            SearchError::DialectMismatch {
                expected: DialectKind::Postgres,
                actual: DialectKind::Sqlite
            }
        ));
    }
}
