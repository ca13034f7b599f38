//! Production storage over sqlx + SQLite.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use newsdesk_core::{Article, NewArticle, TaskRun};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};

use crate::{ArticlePage, ArticleStore, HealthCheck, InsertOutcome, StoreError, TaskRunLog};

const CREATE_ARTICLE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS article (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT UNIQUE NOT NULL,
    title TEXT NOT NULL,
    description TEXT,
    source TEXT NOT NULL,
    author TEXT,
    lede_image TEXT,
    published_at TEXT NOT NULL,
    created_at TEXT NOT NULL
)
"#;

const CREATE_TASK_RUN_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS task_run (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    task TEXT NOT NULL,
    manual BOOLEAN NOT NULL DEFAULT FALSE,
    completed_at TEXT NOT NULL
)
"#;

const ARTICLE_COLUMNS: &str =
    "id, url, title, description, source, author, lede_image, published_at, created_at";

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect using a sqlx database URL, e.g.
    /// `sqlite:./newsdesk.sqlite?mode=rwc`.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    /// Open (creating if absent) a database file at `path`.
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        Self::connect(&format!("sqlite:{path}?mode=rwc")).await
    }

    /// Create the tables if missing. Safe to run on every startup.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(CREATE_ARTICLE_TABLE).execute(&self.pool).await?;
        sqlx::query(CREATE_TASK_RUN_TABLE).execute(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn article_from_row(row: &SqliteRow) -> Result<Article, sqlx::Error> {
    Ok(Article {
        id: row.try_get("id")?,
        url: row.try_get("url")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        source: row.try_get("source")?,
        author: row.try_get("author")?,
        lede_image: row.try_get("lede_image")?,
        published_at: row.try_get("published_at")?,
        created_at: row.try_get("created_at")?,
    })
}

fn task_run_from_row(row: &SqliteRow) -> Result<TaskRun, sqlx::Error> {
    Ok(TaskRun {
        id: row.try_get("id")?,
        task: row.try_get("task")?,
        manual: row.try_get("manual")?,
        completed_at: row.try_get("completed_at")?,
    })
}

/// Escape LIKE metacharacters so user input is matched as a literal
/// substring rather than a pattern.
fn escape_like(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len());
    for c in query.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[async_trait]
impl ArticleStore for SqliteStore {
    async fn insert_article(&self, article: &NewArticle) -> Result<InsertOutcome, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO article
                (url, title, description, source, author, lede_image, published_at, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&article.url)
        .bind(&article.title)
        .bind(&article.description)
        .bind(&article.source)
        .bind(&article.author)
        .bind(&article.lede_image)
        .bind(article.published_at)
        .bind(article.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) => Ok(InsertOutcome::Inserted(done.last_insert_rowid())),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                tracing::debug!(url = %article.url, "article url already stored");
                Ok(InsertOutcome::Duplicate)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn search_articles(
        &self,
        query: &str,
        before: DateTime<Utc>,
        page_size: u32,
    ) -> Result<ArticlePage, StoreError> {
        // One extra row decides `has_more` without a COUNT query.
        let pattern = format!("%{}%", escape_like(query));
        let rows = sqlx::query(&format!(
            r#"
            SELECT {ARTICLE_COLUMNS}
            FROM article
            WHERE published_at < ?1
              AND (title LIKE ?2 ESCAPE '\' OR source LIKE ?2 ESCAPE '\')
            ORDER BY published_at DESC
            LIMIT ?3
            "#
        ))
        .bind(before)
        .bind(&pattern)
        .bind(i64::from(page_size) + 1)
        .fetch_all(&self.pool)
        .await?;

        let mut items = rows
            .iter()
            .map(article_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        let has_more = items.len() > page_size as usize;
        if has_more {
            items.truncate(page_size as usize);
        }
        Ok(ArticlePage { items, has_more })
    }

    async fn recent_articles(
        &self,
        window_days: i64,
        limit: u32,
    ) -> Result<Vec<Article>, StoreError> {
        let cutoff = Utc::now() - Duration::days(window_days);
        let rows = sqlx::query(&format!(
            r#"
            SELECT {ARTICLE_COLUMNS}
            FROM article
            WHERE published_at > ?1
            ORDER BY published_at DESC
            LIMIT ?2
            "#
        ))
        .bind(cutoff)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(article_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }
}

#[async_trait]
impl TaskRunLog for SqliteStore {
    async fn record_task_run(&self, task: &str, manual: bool) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO task_run (task, manual, completed_at) VALUES (?1, ?2, ?3)")
            .bind(task)
            .bind(manual)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn most_recent_automatic_run(
        &self,
        task: &str,
    ) -> Result<Option<TaskRun>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, task, manual, completed_at
            FROM task_run
            WHERE task = ?1 AND manual = FALSE
            ORDER BY completed_at DESC
            LIMIT 1
            "#,
        )
        .bind(task)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(task_run_from_row).transpose().map_err(Into::into)
    }
}

#[async_trait]
impl HealthCheck for SqliteStore {
    async fn check_health(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
