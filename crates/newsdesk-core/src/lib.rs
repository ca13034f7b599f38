//! Core domain model for Newsdesk.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "newsdesk-core";

/// Trailing number of days within which an article counts as recent.
pub const RECENT_ARTICLE_WINDOW_DAYS: i64 = 3;

/// Trailing number of days within which a completed sync counts as recent.
pub const RECENT_SYNC_THRESHOLD_DAYS: i64 = 3;

/// Default page size for the cursor-paginated article listing.
pub const DEFAULT_PAGE_SIZE: u32 = 8;

/// Default row cap for the recent-articles listing.
pub const DEFAULT_RECENT_LIMIT: u32 = 10;

/// Task name recorded for each completed article sync cycle.
pub const TASK_SYNC_ARTICLES: &str = "sync-articles";

/// A stored news article. Rows are immutable once inserted; `url` is the
/// dedup key and is unique across the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub id: i64,
    pub url: String,
    pub title: String,
    pub description: Option<String>,
    pub source: String,
    pub author: Option<String>,
    pub lede_image: Option<String>,
    pub published_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Candidate article handed from the ingestion pipeline to the store:
/// the [`Article`] shape minus the store-assigned id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewArticle {
    pub url: String,
    pub title: String,
    pub description: Option<String>,
    pub source: String,
    pub author: Option<String>,
    pub lede_image: Option<String>,
    pub published_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Article {
    fn days_since_published(&self, now: DateTime<Utc>) -> f64 {
        (now - self.published_at).num_seconds() as f64 / 86_400.0
    }

    pub fn is_recent(&self, now: DateTime<Utc>) -> bool {
        self.days_since_published(now) <= RECENT_ARTICLE_WINDOW_DAYS as f64
    }

    /// Headline trimmed for list display: the `"|"`-suffixed publication
    /// tail is dropped, then the remainder is truncated to 62 chars.
    pub fn display_title(&self) -> String {
        let title = self.title.split('|').next().unwrap_or_default().trim_end();
        trim_text(title, 62)
    }

    /// Description with basic HTML list tags stripped, truncated to 140 chars.
    pub fn display_description(&self) -> String {
        let mut description = self.description.clone().unwrap_or_default();
        for tag in ["<ol>", "</ol>", "<ul>", "</ul>", "<li>", "</li>"] {
            description = description.replace(tag, "");
        }
        trim_text(&description, 140)
    }

    /// Relative publish date: "Today", "1 day ago", "n days ago" up to a
    /// week, then the absolute date.
    pub fn display_publish_date(&self, now: DateTime<Utc>) -> String {
        let days = self.days_since_published(now).round() as i64;
        match days {
            0 => "Today".to_string(),
            1 => "1 day ago".to_string(),
            2..=7 => format!("{days} days ago"),
            _ => self.published_at.format("%b %d, %Y").to_string(),
        }
    }
}

/// One completed run of a named recurring task. History is append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRun {
    pub id: i64,
    pub task: String,
    pub manual: bool,
    pub completed_at: DateTime<Utc>,
}

impl TaskRun {
    pub fn is_recent(&self, now: DateTime<Utc>) -> bool {
        let days = (now - self.completed_at).num_seconds() as f64 / 86_400.0;
        days <= RECENT_SYNC_THRESHOLD_DAYS as f64
    }
}

/// Publish time of the last (oldest) article in a page, used as the
/// `before` cursor for the next page.
pub fn earliest_published_at(articles: &[Article]) -> Option<DateTime<Utc>> {
    articles.last().map(|a| a.published_at)
}

/// Truncate `text` to at most `limit` chars, ellipsized. Splits on char
/// boundaries, not bytes.
pub fn trim_text(text: &str, limit: usize) -> String {
    if text.chars().count() > limit {
        let kept: String = text.chars().take(limit.saturating_sub(3)).collect();
        format!("{kept}...")
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn article_published_at(published_at: DateTime<Utc>) -> Article {
        Article {
            id: 1,
            url: "https://example.com/a".into(),
            title: "Some title".into(),
            description: None,
            source: "example".into(),
            author: None,
            lede_image: None,
            published_at,
            created_at: published_at,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 7, 20, 12, 0, 0).single().unwrap()
    }

    #[test]
    fn article_two_days_old_is_recent() {
        let article = article_published_at(now() - Duration::days(2));
        assert!(article.is_recent(now()));
    }

    #[test]
    fn article_four_days_old_is_not_recent() {
        let article = article_published_at(now() - Duration::days(4));
        assert!(!article.is_recent(now()));
    }

    #[test]
    fn task_run_freshness_follows_threshold() {
        let mut run = TaskRun {
            id: 1,
            task: TASK_SYNC_ARTICLES.into(),
            manual: false,
            completed_at: now() - Duration::days(1),
        };
        assert!(run.is_recent(now()));

        run.completed_at = now() - Duration::days(10);
        assert!(!run.is_recent(now()));
    }

    #[test]
    fn trim_text_is_char_boundary_safe() {
        assert_eq!(trim_text("short", 62), "short");
        assert_eq!(trim_text("abcdefgh", 6), "abc...");
        // Multibyte input must not split inside a char.
        assert_eq!(trim_text("éééééééé", 6), "ééé...");
    }

    #[test]
    fn display_title_drops_publication_tail() {
        let mut article = article_published_at(now());
        article.title = "Senate vote expected this week | Example News".into();
        assert_eq!(article.display_title(), "Senate vote expected this week");
    }

    #[test]
    fn display_description_strips_list_tags() {
        let mut article = article_published_at(now());
        article.description = Some("<ul><li>one</li><li>two</li></ul>".into());
        assert_eq!(article.display_description(), "onetwo");
    }

    #[test]
    fn display_publish_date_buckets() {
        let today = article_published_at(now() - Duration::hours(2));
        assert_eq!(today.display_publish_date(now()), "Today");

        let yesterday = article_published_at(now() - Duration::days(1));
        assert_eq!(yesterday.display_publish_date(now()), "1 day ago");

        let last_week = article_published_at(now() - Duration::days(5));
        assert_eq!(last_week.display_publish_date(now()), "5 days ago");

        let old = article_published_at(now() - Duration::days(30));
        assert_eq!(old.display_publish_date(now()), "Jun 20, 2020");
    }

    #[test]
    fn earliest_published_at_takes_last_item() {
        assert_eq!(earliest_published_at(&[]), None);

        let newest = article_published_at(now());
        let oldest = article_published_at(now() - Duration::days(3));
        let page = vec![newest, oldest.clone()];
        assert_eq!(earliest_published_at(&page), Some(oldest.published_at));
    }
}
