//! Offset pagination over a creator's posts.
//!
//! Some servers wrap around or overlap pages instead of returning an empty
//! page at the end, so posts are deduplicated by id and a page that is
//! mostly repeats ends the walk.

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use super::Post;

#[derive(Debug, Clone)]
pub struct PaginationConfig {
    pub page_size: usize,
    pub max_posts: Option<usize>,
    /// Highest offset that will be requested.
    pub max_offset: usize,
    pub page_delay: Duration,
    /// Stop when more than this share of a page was already seen...
    pub duplicate_ratio: f64,
    /// ...once more than this many unique posts are collected.
    pub duplicate_min_posts: usize,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            page_size: 50,
            max_posts: None,
            max_offset: 10_000,
            page_delay: Duration::from_millis(500),
            duplicate_ratio: 0.9,
            duplicate_min_posts: 100,
        }
    }
}

#[derive(Debug, Error)]
pub enum PageError {
    #[error("Failed to fetch posts at offset {offset}: {message}")]
    Fetch { offset: usize, message: String },

    #[error("Malformed posts page at offset {offset}: {message}")]
    Malformed { offset: usize, message: String },
}

/// Why pagination ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EmptyPage,
    /// A page with no new ids, or mostly repeats after enough posts.
    DuplicatePage { new: usize, total: usize },
    ShortPage,
    MaxPosts,
    OffsetCeiling,
    /// A later page failed; the posts gathered so far are kept.
    FetchError,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::EmptyPage => f.write_str("empty page"),
            StopReason::DuplicatePage { new, total } => {
                write!(f, "duplicate page ({} new of {})", new, total)
            }
            StopReason::ShortPage => f.write_str("last page"),
            StopReason::MaxPosts => f.write_str("post limit reached"),
            StopReason::OffsetCeiling => f.write_str("offset ceiling reached"),
            StopReason::FetchError => f.write_str("page fetch error"),
        }
    }
}

/// Source of post pages, keyed by offset.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, offset: usize) -> Result<Vec<Post>, PageError>;
}

#[derive(Debug)]
pub struct Pagination {
    pub posts: Vec<Post>,
    pub stop_reason: StopReason,
    pub pages_fetched: usize,
}

/// Walk pages sequentially until one of the stop conditions hits.
///
/// An error on the first page is returned; errors on later pages end the
/// walk with [`StopReason::FetchError`].
pub async fn paginate<S: PageSource + ?Sized>(
    source: &S,
    config: &PaginationConfig,
) -> Result<Pagination, PageError> {
    let page_size = config.page_size.max(1);
    let mut seen: HashSet<String> = HashSet::new();
    let mut posts: Vec<Post> = Vec::new();
    let mut offset = 0usize;
    let mut pages_fetched = 0usize;

    let stop_reason = loop {
        if offset > config.max_offset {
            break StopReason::OffsetCeiling;
        }
        if pages_fetched > 0 && !config.page_delay.is_zero() {
            tokio::time::sleep(config.page_delay).await;
        }

        let page = match source.fetch_page(offset).await {
            Ok(page) => page,
            Err(e) if pages_fetched == 0 => return Err(e),
            Err(e) => {
                tracing::warn!("Stopping pagination with {} posts: {}", posts.len(), e);
                break StopReason::FetchError;
            }
        };
        pages_fetched += 1;

        if page.is_empty() {
            break StopReason::EmptyPage;
        }

        let total = page.len();
        let mut new = 0usize;
        for post in page {
            if seen.insert(post.id.clone()) {
                new += 1;
                posts.push(post);
            }
        }
        tracing::debug!(
            "Page at offset {}: {} posts, {} new ({} total)",
            offset,
            total,
            new,
            posts.len()
        );

        if let Some(max) = config.max_posts {
            if posts.len() >= max {
                posts.truncate(max);
                break StopReason::MaxPosts;
            }
        }
        if new == 0 {
            break StopReason::DuplicatePage { new, total };
        }
        let duplicate_share = (total - new) as f64 / total as f64;
        if posts.len() > config.duplicate_min_posts && duplicate_share > config.duplicate_ratio {
            break StopReason::DuplicatePage { new, total };
        }
        if total < page_size {
            break StopReason::ShortPage;
        }

        offset += page_size;
    };

    tracing::info!(
        "Collected {} posts over {} pages ({})",
        posts.len(),
        pages_fetched,
        stop_reason
    );

    Ok(Pagination {
        posts,
        stop_reason,
        pages_fetched,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Serves scripted pages and records requested offsets.
    struct ScriptedSource {
        pages: Vec<Result<Vec<Post>, ()>>,
        requested: Mutex<Vec<usize>>,
    }

    impl ScriptedSource {
        fn new(pages: Vec<Result<Vec<Post>, ()>>) -> Self {
            Self {
                pages,
                requested: Mutex::new(Vec::new()),
            }
        }

        fn offsets(&self) -> Vec<usize> {
            self.requested.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PageSource for ScriptedSource {
        async fn fetch_page(&self, offset: usize) -> Result<Vec<Post>, PageError> {
            let mut requested = self.requested.lock().unwrap();
            let index = requested.len();
            requested.push(offset);
            match self.pages.get(index) {
                Some(Ok(page)) => Ok(page.clone()),
                Some(Err(())) => Err(PageError::Fetch {
                    offset,
                    message: "boom".to_string(),
                }),
                None => Ok(Vec::new()),
            }
        }
    }

    fn posts(range: std::ops::Range<usize>) -> Vec<Post> {
        range
            .map(|i| Post {
                id: i.to_string(),
                title: None,
                file: None,
                attachments: Vec::new(),
            })
            .collect()
    }

    fn config() -> PaginationConfig {
        PaginationConfig {
            page_delay: Duration::ZERO,
            ..PaginationConfig::default()
        }
    }

    #[tokio::test]
    async fn test_repeated_page_stops_with_duplicate() {
        let source = ScriptedSource::new(vec![Ok(posts(0..50)), Ok(posts(0..50))]);
        let result = paginate(&source, &config()).await.unwrap();
        assert_eq!(result.posts.len(), 50);
        assert_eq!(
            result.stop_reason,
            StopReason::DuplicatePage { new: 0, total: 50 }
        );
        assert_eq!(source.offsets(), [0, 50]);
    }

    #[tokio::test]
    async fn test_short_page_ends() {
        let source = ScriptedSource::new(vec![Ok(posts(0..50)), Ok(posts(50..70))]);
        let result = paginate(&source, &config()).await.unwrap();
        assert_eq!(result.posts.len(), 70);
        assert_eq!(result.stop_reason, StopReason::ShortPage);
    }

    #[tokio::test]
    async fn test_empty_page_ends() {
        let source = ScriptedSource::new(vec![Ok(posts(0..50)), Ok(Vec::new())]);
        let result = paginate(&source, &config()).await.unwrap();
        assert_eq!(result.stop_reason, StopReason::EmptyPage);
        assert_eq!(result.pages_fetched, 2);
    }

    #[tokio::test]
    async fn test_mostly_duplicate_page_after_threshold() {
        // 150 unique posts, then a page with 46 repeats and 4 new
        let mut wrap = posts(100..146);
        wrap.extend(posts(150..154));
        let source = ScriptedSource::new(vec![
            Ok(posts(0..50)),
            Ok(posts(50..100)),
            Ok(posts(100..150)),
            Ok(wrap),
        ]);
        let result = paginate(&source, &config()).await.unwrap();
        assert_eq!(
            result.stop_reason,
            StopReason::DuplicatePage { new: 4, total: 50 }
        );
        assert_eq!(result.posts.len(), 154);
    }

    #[tokio::test]
    async fn test_duplicate_ratio_ignored_below_min_posts() {
        let mut overlap = posts(0..46);
        overlap.extend(posts(50..54));
        let source = ScriptedSource::new(vec![Ok(posts(0..50)), Ok(overlap), Ok(Vec::new())]);
        let result = paginate(&source, &config()).await.unwrap();
        assert_eq!(result.stop_reason, StopReason::EmptyPage);
        assert_eq!(result.posts.len(), 54);
    }

    #[tokio::test]
    async fn test_max_posts_truncates() {
        let source = ScriptedSource::new(vec![Ok(posts(0..50)), Ok(posts(50..100))]);
        let cfg = PaginationConfig {
            max_posts: Some(60),
            ..config()
        };
        let result = paginate(&source, &cfg).await.unwrap();
        assert_eq!(result.posts.len(), 60);
        assert_eq!(result.stop_reason, StopReason::MaxPosts);
    }

    #[tokio::test]
    async fn test_offset_ceiling() {
        let pages = (0..10).map(|i| Ok(posts(i * 50..(i + 1) * 50))).collect();
        let source = ScriptedSource::new(pages);
        let cfg = PaginationConfig {
            max_offset: 100,
            ..config()
        };
        let result = paginate(&source, &cfg).await.unwrap();
        assert_eq!(result.stop_reason, StopReason::OffsetCeiling);
        assert_eq!(source.offsets(), [0, 50, 100]);
        assert_eq!(result.posts.len(), 150);
    }

    #[tokio::test]
    async fn test_first_page_error_is_returned() {
        let source = ScriptedSource::new(vec![Err(())]);
        assert!(paginate(&source, &config()).await.is_err());
    }

    #[tokio::test]
    async fn test_later_page_error_keeps_posts() {
        let source = ScriptedSource::new(vec![Ok(posts(0..50)), Err(())]);
        let result = paginate(&source, &config()).await.unwrap();
        assert_eq!(result.stop_reason, StopReason::FetchError);
        assert_eq!(result.posts.len(), 50);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inter_page_delay() {
        let source = ScriptedSource::new(vec![Ok(posts(0..50)), Ok(posts(50..60))]);
        let start = tokio::time::Instant::now();
        paginate(&source, &PaginationConfig::default()).await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_millis(500));
    }
}
