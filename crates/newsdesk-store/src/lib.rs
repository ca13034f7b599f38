//! Durable, deduplicated article + task-run storage for Newsdesk.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use newsdesk_core::{earliest_published_at, Article, NewArticle, TaskRun};
use thiserror::Error;

mod mem;
mod sqlite;

pub use mem::MemoryStore;
pub use sqlite::SqliteStore;

pub const CRATE_NAME: &str = "newsdesk-store";

#[derive(Debug, Error)]
pub enum StoreError {
    /// The storage engine cannot be reached at all.
    #[error("storage unavailable")]
    Unavailable,
    /// The engine rejected or failed a query.
    #[error("database query failed: {0}")]
    Database(#[from] sqlx::Error),
}

/// Result of a single article insert. A duplicate `url` is an expected
/// no-op outcome, never an error: re-ingesting known articles must not
/// fail the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(i64),
    Duplicate,
}

impl InsertOutcome {
    pub fn inserted_id(self) -> Option<i64> {
        match self {
            Self::Inserted(id) => Some(id),
            Self::Duplicate => None,
        }
    }
}

/// One page of a cursor-paginated article listing, newest first.
#[derive(Debug, Clone, PartialEq)]
pub struct ArticlePage {
    pub items: Vec<Article>,
    /// Whether older matching articles exist beyond this page.
    pub has_more: bool,
}

impl ArticlePage {
    /// Cursor for the next page: publish time of the oldest item here.
    pub fn next_before(&self) -> Option<DateTime<Utc>> {
        earliest_published_at(&self.items)
    }
}

#[async_trait]
pub trait ArticleStore: Send + Sync {
    /// Persist one article; a duplicate `url` resolves to
    /// [`InsertOutcome::Duplicate`] without error.
    async fn insert_article(&self, article: &NewArticle) -> Result<InsertOutcome, StoreError>;

    /// Insert each article independently and return the newly created ids
    /// in input order. Duplicates are skipped; a row-level failure is
    /// logged and does not abort the rest of the batch.
    async fn insert_articles(&self, articles: &[NewArticle]) -> Vec<i64> {
        let mut inserted = Vec::new();
        for article in articles {
            match self.insert_article(article).await {
                Ok(InsertOutcome::Inserted(id)) => inserted.push(id),
                Ok(InsertOutcome::Duplicate) => {
                    tracing::debug!(url = %article.url, "article already stored, skipping");
                }
                Err(err) => {
                    tracing::warn!(url = %article.url, error = %err, "article insert failed, continuing batch");
                }
            }
        }
        inserted
    }

    /// Articles whose title or source contains `query` (ASCII
    /// case-insensitive; empty matches all) and whose publish time is
    /// strictly before `before`, newest first, at most `page_size` items.
    async fn search_articles(
        &self,
        query: &str,
        before: DateTime<Utc>,
        page_size: u32,
    ) -> Result<ArticlePage, StoreError>;

    /// Up to `limit` articles published within the last `window_days` days,
    /// newest first.
    async fn recent_articles(&self, window_days: i64, limit: u32)
        -> Result<Vec<Article>, StoreError>;
}

#[async_trait]
pub trait TaskRunLog: Send + Sync {
    /// Append a completion record for `task`, stamped now (UTC).
    async fn record_task_run(&self, task: &str, manual: bool) -> Result<(), StoreError>;

    /// Latest scheduler-triggered run of `task`. Manual runs are excluded
    /// so an on-demand trigger cannot mask a stalled schedule.
    async fn most_recent_automatic_run(&self, task: &str)
        -> Result<Option<TaskRun>, StoreError>;
}

#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn check_health(&self) -> Result<(), StoreError>;
}

/// Full capability set of the storage layer; the seam the web facade and
/// ingestion pipeline consume.
pub trait Store: ArticleStore + TaskRunLog + HealthCheck {}

impl<T: ArticleStore + TaskRunLog + HealthCheck> Store for T {}
