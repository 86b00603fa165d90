//! The common result shape every source adapter maps into.

use serde::{Deserialize, Serialize};

/// Kind of content a result points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    /// Video (YouTube and similar)
    Video,

    /// Article or web page
    Article,

    /// Book or long-form document
    Book,

    /// Photo, illustration or vector image
    Image,
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentKind::Video => write!(f, "video"),
            ContentKind::Article => write!(f, "article"),
            ContentKind::Book => write!(f, "book"),
            ContentKind::Image => write!(f, "image"),
        }
    }
}

/// A single item returned by a source adapter.
///
/// `id` is always prefixed with the source (`"<source>_<native id>"`) so ids
/// from different providers never collide in a merged list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceResult {
    /// Source-prefixed identifier
    pub id: String,

    /// Display title
    pub title: String,

    /// Short description, if the provider has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Canonical URL of the content
    pub url: String,

    /// Preview image URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,

    /// License string as reported (canonical label once verified)
    pub license: String,

    /// Name of the source that produced this result
    #[serde(rename = "source")]
    pub source_name: String,

    /// Provider popularity signal (views, likes)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub popularity: Option<f64>,

    /// Creator / channel / photographer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    /// Kind of content
    pub kind: ContentKind,

    /// Set once the license filter has accepted this result
    #[serde(default)]
    pub license_verified: bool,
}

impl SourceResult {
    /// Create a result with the required fields; optional fields start empty
    pub fn new(
        source_name: impl Into<String>,
        native_id: impl std::fmt::Display,
        title: impl Into<String>,
        url: impl Into<String>,
        license: impl Into<String>,
        kind: ContentKind,
    ) -> Self {
        let source_name = source_name.into();
        Self {
            id: format!("{}_{}", source_prefix(&source_name), native_id),
            title: title.into(),
            description: None,
            url: url.into(),
            thumbnail: None,
            license: license.into(),
            source_name,
            popularity: None,
            author: None,
            kind,
            license_verified: false,
        }
    }

    /// Set the description (empty strings are stored as `None`)
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = non_empty(description.into());
        self
    }

    /// Set the thumbnail (empty strings are stored as `None`)
    pub fn with_thumbnail(mut self, thumbnail: impl Into<String>) -> Self {
        self.thumbnail = non_empty(thumbnail.into());
        self
    }

    /// Set the popularity signal
    pub fn with_popularity(mut self, popularity: f64) -> Self {
        self.popularity = Some(popularity);
        self
    }

    /// Set the author
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = non_empty(author.into());
        self
    }

    /// Whether the result carries both a description and a thumbnail
    pub fn is_rich(&self) -> bool {
        has_text(&self.description) && has_text(&self.thumbnail)
    }
}

/// Lowercase, whitespace-free prefix used in result ids ("YouTube (CC)" -> "youtube")
fn source_prefix(source_name: &str) -> String {
    source_name
        .split(|c: char| !c.is_alphanumeric())
        .find(|part| !part.is_empty())
        .unwrap_or("source")
        .to_lowercase()
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

fn has_text(value: &Option<String>) -> bool {
    value.as_deref().map(|v| !v.trim().is_empty()).unwrap_or(false)
}
