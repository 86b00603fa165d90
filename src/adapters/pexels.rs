//! Pexels photo search.

use async_trait::async_trait;
use serde::Deserialize;

use super::http::{client, get_json};
use super::{FetchContext, SourceAdapter, SourceError};
use crate::domain::{ContentKind, SourceResult};

pub const SOURCE_NAME: &str = "Pexels";

const API_URL: &str = "https://api.pexels.com/v1/search";
const MAX_PER_PAGE: usize = 80;

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    photos: Vec<Photo>,
}

#[derive(Debug, Deserialize)]
struct Photo {
    id: u64,
    #[serde(default)]
    alt: Option<String>,
    #[serde(default)]
    photographer: Option<String>,
    src: PhotoSource,
}

#[derive(Debug, Deserialize)]
struct PhotoSource {
    #[serde(default)]
    large: Option<String>,
    #[serde(default)]
    medium: Option<String>,
    #[serde(default)]
    original: Option<String>,
}

fn map_photos(page: SearchPage) -> Vec<SourceResult> {
    page.photos
        .into_iter()
        .filter_map(|photo| {
            let url = photo.src.large.or(photo.src.original)?;
            // Untitled photos keep an empty title so dedupe falls back to the URL
            let title = photo
                .alt
                .map(|alt| alt.trim().to_string())
                .unwrap_or_default();

            let mut result = SourceResult::new(
                SOURCE_NAME,
                photo.id,
                title,
                url,
                "Pexels License",
                ContentKind::Image,
            )
            .with_thumbnail(photo.src.medium.unwrap_or_default());
            if let Some(photographer) = photo.photographer {
                result = result.with_author(photographer);
            }
            Some(result)
        })
        .collect()
}

/// Pexels adapter; photos only
pub struct PexelsAdapter {
    api_key: String,
    client: reqwest::Client,
}

impl PexelsAdapter {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            client: client(),
        }
    }
}

#[async_trait]
impl SourceAdapter for PexelsAdapter {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    async fn fetch(
        &self,
        query: &str,
        limit: usize,
        ctx: &FetchContext,
    ) -> Result<Vec<SourceResult>, SourceError> {
        // Pexels has no illustrations or vectors
        if matches!(ctx.filter("image_type"), Some(t) if t != "all" && t != "photo") {
            return Ok(Vec::new());
        }

        let request = self
            .client
            .get(API_URL)
            .header(reqwest::header::AUTHORIZATION, &self.api_key)
            .query(&[("query", query)])
            .query(&[("per_page", limit.clamp(1, MAX_PER_PAGE)), ("page", 1)]);

        let page: SearchPage = get_json(SOURCE_NAME, request).await?;
        Ok(map_photos(page))
    }
}
