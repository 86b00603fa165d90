//! Unsplash photo search. Only registered when an access key is configured.

use async_trait::async_trait;
use serde::Deserialize;

use super::http::{client, get_json};
use super::{FetchContext, SourceAdapter, SourceError};
use crate::domain::{ContentKind, SourceResult};

pub const SOURCE_NAME: &str = "Unsplash";

const API_URL: &str = "https://api.unsplash.com/search/photos";
const MAX_PER_PAGE: usize = 30;

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    results: Vec<Photo>,
}

#[derive(Debug, Deserialize)]
struct Photo {
    id: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    alt_description: Option<String>,
    #[serde(default)]
    likes: Option<u64>,
    urls: PhotoUrls,
    #[serde(default)]
    user: Option<User>,
}

#[derive(Debug, Deserialize)]
struct PhotoUrls {
    regular: String,
    #[serde(default)]
    small: Option<String>,
}

#[derive(Debug, Deserialize)]
struct User {
    #[serde(default)]
    name: Option<String>,
}

fn map_photos(page: SearchPage) -> Vec<SourceResult> {
    page.results
        .into_iter()
        .map(|photo| {
            let title = [&photo.description, &photo.alt_description]
                .into_iter()
                .flatten()
                .map(|t| t.trim())
                .find(|t| !t.is_empty())
                .unwrap_or_default()
                .to_string();

            let mut result = SourceResult::new(
                SOURCE_NAME,
                &photo.id,
                title,
                photo.urls.regular,
                "Unsplash License",
                ContentKind::Image,
            )
            .with_thumbnail(photo.urls.small.unwrap_or_default());
            if let Some(description) = photo.alt_description {
                result = result.with_description(description);
            }
            if let Some(name) = photo.user.and_then(|u| u.name) {
                result = result.with_author(name);
            }
            if let Some(likes) = photo.likes {
                result = result.with_popularity(likes as f64);
            }
            result
        })
        .collect()
}

/// Unsplash adapter; photos only
pub struct UnsplashAdapter {
    access_key: String,
    client: reqwest::Client,
}

impl UnsplashAdapter {
    pub fn new(access_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            client: client(),
        }
    }
}

#[async_trait]
impl SourceAdapter for UnsplashAdapter {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    async fn fetch(
        &self,
        query: &str,
        limit: usize,
        ctx: &FetchContext,
    ) -> Result<Vec<SourceResult>, SourceError> {
        if matches!(ctx.filter("image_type"), Some(t) if t != "all" && t != "photo") {
            return Ok(Vec::new());
        }

        let request = self
            .client
            .get(API_URL)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Client-ID {}", self.access_key),
            )
            .query(&[("query", query), ("orientation", "landscape")])
            .query(&[("per_page", limit.clamp(1, MAX_PER_PAGE)), ("page", 1)]);

        let page: SearchPage = get_json(SOURCE_NAME, request).await?;
        Ok(map_photos(page))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_map_photos() {
        let page: SearchPage = serde_json::from_value(json!({
            "total": 1,
            "results": [
                {
                    "id": "Dwu85P9SOIk",
                    "description": null,
                    "alt_description": "white and brown mountain",
                    "likes": 120,
                    "urls": {
                        "regular": "https://images.unsplash.com/photo-1?w=1080",
                        "small": "https://images.unsplash.com/photo-1?w=400"
                    },
                    "user": { "name": "Jane Doe" }
                }
            ]
        }))
        .unwrap();

        let results = map_photos(page);
        assert_eq!(results.len(), 1);
        let photo = &results[0];
        assert_eq!(photo.id, "unsplash_Dwu85P9SOIk");
        assert_eq!(photo.title, "white and brown mountain");
        assert_eq!(photo.author.as_deref(), Some("Jane Doe"));
        assert!(photo.is_rich());
    }

    #[test]
    fn test_blank_description_falls_back_to_alt() {
        let page: SearchPage = serde_json::from_value(json!({
            "results": [
                {
                    "id": "a",
                    "description": " ",
                    "alt_description": "red kite",
                    "urls": { "regular": "https://images.unsplash.com/a" }
                },
                { "id": "b", "urls": { "regular": "https://images.unsplash.com/b" } }
            ]
        }))
        .unwrap();

        let results = map_photos(page);
        assert_eq!(results[0].title, "red kite");
        assert!(results[1].title.is_empty());
    }
}
