//! In-memory store: the controllable test double behind the same seams as
//! the SQLite implementation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use newsdesk_core::{Article, NewArticle, TaskRun};

use crate::{ArticlePage, ArticleStore, HealthCheck, InsertOutcome, StoreError, TaskRunLog};

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    unavailable: AtomicBool,
}

#[derive(Default)]
struct Inner {
    articles: Vec<Article>,
    task_runs: Vec<TaskRun>,
    next_article_id: i64,
    next_task_run_id: i64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip the store into (or out of) a simulated outage: every operation
    /// returns [`StoreError::Unavailable`] while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable);
        }
        self.inner.lock().map_err(|_| StoreError::Unavailable)
    }
}

fn matches_query(article: &Article, query: &str) -> bool {
    if query.is_empty() {
        return true;
    }
    let query = query.to_lowercase();
    article.title.to_lowercase().contains(&query)
        || article.source.to_lowercase().contains(&query)
}

#[async_trait]
impl ArticleStore for MemoryStore {
    async fn insert_article(&self, article: &NewArticle) -> Result<InsertOutcome, StoreError> {
        let mut inner = self.lock()?;
        if inner.articles.iter().any(|a| a.url == article.url) {
            return Ok(InsertOutcome::Duplicate);
        }
        inner.next_article_id += 1;
        let id = inner.next_article_id;
        inner.articles.push(Article {
            id,
            url: article.url.clone(),
            title: article.title.clone(),
            description: article.description.clone(),
            source: article.source.clone(),
            author: article.author.clone(),
            lede_image: article.lede_image.clone(),
            published_at: article.published_at,
            created_at: article.created_at,
        });
        Ok(InsertOutcome::Inserted(id))
    }

    async fn search_articles(
        &self,
        query: &str,
        before: DateTime<Utc>,
        page_size: u32,
    ) -> Result<ArticlePage, StoreError> {
        let inner = self.lock()?;
        let mut items: Vec<Article> = inner
            .articles
            .iter()
            .filter(|a| a.published_at < before && matches_query(a, query))
            .cloned()
            .collect();
        items.sort_by(|a, b| b.published_at.cmp(&a.published_at));

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
        let inner = self.lock()?;
        let mut items: Vec<Article> = inner
            .articles
            .iter()
            .filter(|a| a.published_at > cutoff)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        items.truncate(limit as usize);
        Ok(items)
    }
}

#[async_trait]
impl TaskRunLog for MemoryStore {
    async fn record_task_run(&self, task: &str, manual: bool) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        inner.next_task_run_id += 1;
        let id = inner.next_task_run_id;
        inner.task_runs.push(TaskRun {
            id,
            task: task.to_string(),
            manual,
            completed_at: Utc::now(),
        });
        Ok(())
    }

    async fn most_recent_automatic_run(
        &self,
        task: &str,
    ) -> Result<Option<TaskRun>, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .task_runs
            .iter()
            .filter(|r| r.task == task && !r.manual)
            .max_by_key(|r| r.completed_at)
            .cloned())
    }
}

#[async_trait]
impl HealthCheck for MemoryStore {
    async fn check_health(&self) -> Result<(), StoreError> {
        self.lock().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use newsdesk_core::TASK_SYNC_ARTICLES;

    fn new_article(url: &str, published_at: DateTime<Utc>) -> NewArticle {
        NewArticle {
            url: url.to_string(),
            title: "Title".to_string(),
            description: None,
            source: "example".to_string(),
            author: None,
            lede_image: None,
            published_at,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn mirrors_duplicate_absorption_and_pagination() {
        let store = MemoryStore::new();
        let now = Utc::now();

        for i in 0..3 {
            let outcome = store
                .insert_article(&new_article(
                    &format!("https://example.com/{i}"),
                    now - Duration::hours(i),
                ))
                .await
                .expect("insert");
            assert!(outcome.inserted_id().is_some());
        }
        let dup = store
            .insert_article(&new_article("https://example.com/0", now))
            .await
            .expect("insert");
        assert_eq!(dup, InsertOutcome::Duplicate);

        let page = store
            .search_articles("", now + Duration::hours(1), 2)
            .await
            .expect("search");
        assert_eq!(page.items.len(), 2);
        assert!(page.has_more);

        let rest = store
            .search_articles("", page.next_before().expect("cursor"), 2)
            .await
            .expect("search");
        assert_eq!(rest.items.len(), 1);
        assert!(!rest.has_more);
    }

    #[tokio::test]
    async fn outage_switch_fails_every_operation() {
        let store = MemoryStore::new();
        store.set_unavailable(true);

        assert!(matches!(
            store.check_health().await,
            Err(StoreError::Unavailable)
        ));
        assert!(store
            .search_articles("", Utc::now(), 10)
            .await
            .is_err());
        assert!(store
            .record_task_run(TASK_SYNC_ARTICLES, false)
            .await
            .is_err());

        // Batch insert absorbs the failures without panicking.
        let ids = store
            .insert_articles(&[new_article("https://example.com/a", Utc::now())])
            .await;
        assert!(ids.is_empty());

        store.set_unavailable(false);
        store.check_health().await.expect("healthy again");
    }
}
