//! Pixabay image search (photos, illustrations, vectors).

use async_trait::async_trait;
use serde::Deserialize;

use super::http::{client, get_json};
use super::{FetchContext, SourceAdapter, SourceError};
use crate::domain::{ContentKind, SourceResult};

pub const SOURCE_NAME: &str = "Pixabay";

const API_URL: &str = "https://pixabay.com/api/";
const MIN_PER_PAGE: usize = 3;
const MAX_PER_PAGE: usize = 200;

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Hit {
    id: u64,
    #[serde(default)]
    tags: String,
    #[serde(default)]
    user: Option<String>,
    #[serde(default, rename = "largeImageURL")]
    large_image_url: Option<String>,
    #[serde(default, rename = "webformatURL")]
    webformat_url: Option<String>,
    #[serde(default, rename = "previewURL")]
    preview_url: Option<String>,
    #[serde(default)]
    likes: Option<u64>,
}

/// Pixabay's `image_type` values; anything else means "all"
fn image_type(ctx: &FetchContext) -> &str {
    match ctx.filter("image_type") {
        Some(t @ ("photo" | "illustration" | "vector")) => t,
        _ => "all",
    }
}

fn map_hits(page: SearchPage) -> Vec<SourceResult> {
    page.hits
        .into_iter()
        .filter_map(|hit| {
            let url = hit.large_image_url.or(hit.webformat_url.clone())?;
            let thumbnail = hit.preview_url.or(hit.webformat_url).unwrap_or_default();
            // Tag lists repeat across hits, so they describe rather than title
            let tags = hit
                .tags
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join(", ");

            let mut result = SourceResult::new(
                SOURCE_NAME,
                hit.id,
                String::new(),
                url,
                "Pixabay Content License",
                ContentKind::Image,
            )
            .with_thumbnail(thumbnail);
            if !tags.is_empty() {
                result = result.with_description(tags);
            }
            if let Some(user) = hit.user {
                result = result.with_author(user);
            }
            if let Some(likes) = hit.likes {
                result = result.with_popularity(likes as f64);
            }
            Some(result)
        })
        .collect()
}

/// Pixabay adapter
pub struct PixabayAdapter {
    api_key: String,
    client: reqwest::Client,
}

impl PixabayAdapter {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            client: client(),
        }
    }
}

#[async_trait]
impl SourceAdapter for PixabayAdapter {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    async fn fetch(
        &self,
        query: &str,
        limit: usize,
        ctx: &FetchContext,
    ) -> Result<Vec<SourceResult>, SourceError> {
        let request = self
            .client
            .get(API_URL)
            .query(&[
                ("key", self.api_key.as_str()),
                ("q", query),
                ("image_type", image_type(ctx)),
                ("safesearch", "true"),
            ])
            .query(&[("per_page", limit.clamp(MIN_PER_PAGE, MAX_PER_PAGE))]);

        let page: SearchPage = get_json(SOURCE_NAME, request).await?;
        let mut results = map_hits(page);
        results.truncate(limit);
        Ok(results)
    }
}
