//! YouTube Data API adapter (Creative Commons videos only).
//!
//! A search costs one call for ids plus one `videos.list` call per batch of
//! 50 ids. Both go through the volatile cache with ETag revalidation, use
//! `fields` projections, and carry `quotaUser` when the caller is known.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, instrument, warn};

use super::http::{client, get_json_conditional};
use super::{Conditional, FetchContext, SourceAdapter, SourceError};
use crate::core::batch::{BatchCoordinator, BatchItem};
use crate::core::cache_key::cache_key;
use crate::core::volatile::VolatileCache;
use crate::domain::{ContentKind, SourceResult};

pub const SOURCE_NAME: &str = "YouTube (CC)";

const API_BASE: &str = "https://www.googleapis.com/youtube/v3";

/// The search endpoint caps `maxResults` at 50
const MAX_SEARCH_RESULTS: usize = 50;

const SEARCH_FIELDS: &str = "etag,items(id/videoId)";
const VIDEO_FIELDS: &str = "etag,items(id,snippet(title,channelTitle,publishedAt,description,\
thumbnails(high/url,medium/url,default/url)),statistics(viewCount,likeCount),\
contentDetails/duration,status/license)";

const DESCRIPTION_LIMIT: usize = 200;

/// Filter holding the minimum view count
pub const MIN_VIEWS_FILTER: &str = "min_views";

#[derive(Debug, Deserialize)]
struct SearchList {
    #[serde(default)]
    etag: Option<String>,
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchId,
}

#[derive(Debug, Deserialize)]
struct SearchId {
    #[serde(rename = "videoId")]
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VideoList {
    #[serde(default)]
    etag: Option<String>,
    #[serde(default)]
    items: Vec<Video>,
}

/// The projected subset of a `videos.list` item
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    pub id: String,
    #[serde(default)]
    pub snippet: Snippet,
    #[serde(default)]
    pub statistics: Statistics,
}

impl BatchItem for Video {
    fn batch_id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snippet {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub channel_title: String,
    #[serde(default)]
    pub thumbnails: Thumbnails,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Thumbnails {
    pub high: Option<Thumbnail>,
    pub medium: Option<Thumbnail>,
    pub default: Option<Thumbnail>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thumbnail {
    pub url: String,
}

/// Counters arrive as decimal strings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub view_count: Option<String>,
    pub like_count: Option<String>,
}

impl Video {
    pub fn views(&self) -> u64 {
        self.statistics
            .view_count
            .as_deref()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }

    fn best_thumbnail(&self) -> Option<&str> {
        let t = &self.snippet.thumbnails;
        [&t.high, &t.medium, &t.default]
            .into_iter()
            .flatten()
            .map(|thumb| thumb.url.as_str())
            .find(|url| !url.is_empty())
    }
}

/// Map detailed videos to results, dropping those under `min_views`
pub fn map_videos(videos: Vec<Video>, min_views: u64, limit: usize) -> Vec<SourceResult> {
    videos
        .into_iter()
        .filter(|video| video.views() >= min_views)
        .take(limit)
        .map(|video| {
            let views = video.views();
            let thumbnail = video.best_thumbnail().unwrap_or_default().to_string();
            let description: String = video
                .snippet
                .description
                .chars()
                .take(DESCRIPTION_LIMIT)
                .collect();

            SourceResult::new(
                SOURCE_NAME,
                &video.id,
                video.snippet.title,
                format!("https://www.youtube.com/watch?v={}", video.id),
                "CC BY",
                ContentKind::Video,
            )
            .with_description(description)
            .with_thumbnail(thumbnail)
            .with_author(video.snippet.channel_title)
            .with_popularity(views as f64)
        })
        .collect()
}

/// YouTube adapter
pub struct YouTubeAdapter {
    api_key: String,
    client: reqwest::Client,
    cache: Arc<VolatileCache>,
    batches: BatchCoordinator,
    base_url: String,
}

impl YouTubeAdapter {
    pub fn new(api_key: impl Into<String>, cache: Arc<VolatileCache>) -> Self {
        Self {
            api_key: api_key.into(),
            client: client(),
            batches: BatchCoordinator::new(cache.clone()),
            cache,
            base_url: API_BASE.to_string(),
        }
    }

    /// Override the detail batch size
    pub fn with_batch_size(mut self, max_batch_size: usize) -> Self {
        self.batches = BatchCoordinator::with_batch_size(self.cache.clone(), max_batch_size);
        self
    }

    /// Point at a different API root
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn search_ids(
        &self,
        query: &str,
        max_results: usize,
        quota_user: Option<&str>,
        etag: Option<String>,
    ) -> Result<Conditional<Vec<String>>, SourceError> {
        let mut request = self
            .client
            .get(format!("{}/search", self.base_url))
            .query(&[
                ("part", "id"),
                ("q", query),
                ("type", "video"),
                ("videoLicense", "creativeCommon"),
                ("order", "viewCount"),
                ("fields", SEARCH_FIELDS),
                ("key", self.api_key.as_str()),
            ])
            .query(&[("maxResults", max_results.to_string())]);
        if let Some(token) = quota_user {
            request = request.query(&[("quotaUser", token)]);
        }

        let response: Conditional<SearchList> =
            get_json_conditional(SOURCE_NAME, request, etag.as_deref()).await?;

        Ok(match response {
            Conditional::Modified { body, etag } => Conditional::Modified {
                etag: etag.or(body.etag),
                body: body
                    .items
                    .into_iter()
                    .filter_map(|item| item.id.video_id)
                    .collect(),
            },
            Conditional::NotModified => Conditional::NotModified,
        })
    }

    async fn video_details(
        &self,
        ids: Vec<String>,
        quota_user: Option<&str>,
        etag: Option<String>,
    ) -> Result<Conditional<Vec<Video>>, SourceError> {
        let mut request = self.client.get(format!("{}/videos", self.base_url)).query(&[
            ("part", "snippet,statistics,contentDetails,status"),
            ("id", ids.join(",").as_str()),
            ("fields", VIDEO_FIELDS),
            ("key", self.api_key.as_str()),
        ]);
        if let Some(token) = quota_user {
            request = request.query(&[("quotaUser", token)]);
        }

        let response: Conditional<VideoList> =
            get_json_conditional(SOURCE_NAME, request, etag.as_deref()).await?;

        Ok(match response {
            Conditional::Modified { body, etag } => Conditional::Modified {
                etag: etag.or(body.etag),
                body: body.items,
            },
            Conditional::NotModified => Conditional::NotModified,
        })
    }
}

#[async_trait]
impl SourceAdapter for YouTubeAdapter {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    #[instrument(skip(self, ctx), fields(source = SOURCE_NAME))]
    async fn fetch(
        &self,
        query: &str,
        limit: usize,
        ctx: &FetchContext,
    ) -> Result<Vec<SourceResult>, SourceError> {
        if self.api_key.trim().is_empty() {
            return Err(SourceError::NotConfigured {
                provider: SOURCE_NAME.to_string(),
                message: "YOUTUBE_API_KEY is not set".to_string(),
            });
        }

        let max_results = limit.clamp(1, MAX_SEARCH_RESULTS);
        let min_views = ctx
            .filter(MIN_VIEWS_FILTER)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(0);
        let quota_user = ctx.quota_user.as_ref().map(|t| t.token());

        let search_key = cache_key("search", &json!({ "q": query, "max": max_results }));
        let ids = self
            .batches
            .fetch_cached(&search_key, |etag| {
                self.search_ids(query, max_results, quota_user, etag)
            })
            .await?
            .into_inner();
        debug!(ids = ids.len(), "Search returned video ids");

        let outcome = self
            .batches
            .fetch_details("videos", &ids, |chunk, etag| {
                self.video_details(chunk, quota_user, etag)
            })
            .await;

        let videos = match outcome.failure {
            Some(failure) if outcome.items.is_empty() => return Err(failure.error),
            Some(failure) => {
                warn!(
                    kept = outcome.items.len(),
                    error = %failure,
                    "Using partial video details"
                );
                outcome.items
            }
            None => outcome.items,
        };

        Ok(map_videos(videos, min_views, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> Vec<Video> {
        let list: VideoList = serde_json::from_value(json!({
            "etag": "\"list-etag\"",
            "items": [
                {
                    "id": "abc123",
                    "snippet": {
                        "title": "Lo-fi beats",
                        "description": "x".repeat(300),
                        "channelTitle": "Study Channel",
                        "thumbnails": {
                            "medium": { "url": "https://i.ytimg.com/vi/abc123/mq.jpg" },
                            "default": { "url": "https://i.ytimg.com/vi/abc123/d.jpg" }
                        }
                    },
                    "statistics": { "viewCount": "15000", "likeCount": "300" }
                },
                {
                    "id": "low",
                    "snippet": { "title": "Barely watched" },
                    "statistics": { "viewCount": "12" }
                }
            ]
        }))
        .unwrap();
        assert_eq!(list.etag.as_deref(), Some("\"list-etag\""));
        list.items
    }

    #[test]
    fn test_map_videos() {
        let results = map_videos(fixture(), 1000, 10);
        assert_eq!(results.len(), 1);

        let video = &results[0];
        assert_eq!(video.id, "youtube_abc123");
        assert_eq!(video.url, "https://www.youtube.com/watch?v=abc123");
        assert_eq!(video.source_name, SOURCE_NAME);
        assert_eq!(video.kind, ContentKind::Video);
        assert_eq!(video.author.as_deref(), Some("Study Channel"));
        assert_eq!(video.popularity, Some(15000.0));
        assert_eq!(video.description.as_ref().unwrap().chars().count(), 200);
        assert_eq!(
            video.thumbnail.as_deref(),
            Some("https://i.ytimg.com/vi/abc123/mq.jpg")
        );
    }

    #[test]
    fn test_min_views_and_limit() {
        assert_eq!(map_videos(fixture(), 0, 10).len(), 2);
        assert_eq!(map_videos(fixture(), 0, 1).len(), 1);

        let sparse = map_videos(fixture(), 0, 10).pop().unwrap();
        assert!(sparse.thumbnail.is_none());
        assert!(sparse.description.is_none());
        assert!(!sparse.is_rich());
    }

    #[test]
    fn test_search_ids_skip_non_videos() {
        let list: SearchList = serde_json::from_value(json!({
            "items": [
                { "id": { "videoId": "a" } },
                { "id": { "channelId": "c" } },
                { "id": { "videoId": "b" } }
            ]
        }))
        .unwrap();
        let ids: Vec<_> = list.items.into_iter().filter_map(|i| i.id.video_id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_missing_key_is_not_configured() {
        let adapter = YouTubeAdapter::new("", Arc::new(VolatileCache::default()));
        let err = adapter
            .fetch("music", 10, &FetchContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::NotConfigured { .. }));
    }
}
