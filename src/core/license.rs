//! License classification for aggregated results.
//!
//! A result is usable when its source is on the always-open list, or when its
//! license string contains a permissive marker. Anything else is dropped:
//! unknown license plus unknown source means "not usable".
//!
//! Markers and source names are matched as whole terms, so "ted" matches
//! "TED Talks" but not "curated", and "pd" does not match "updated".
//!
//! The lists themselves live in [`LicenseTable`], which can be replaced from
//! configuration without touching the rules below.

use serde::{Deserialize, Serialize};

use crate::domain::SourceResult;

/// Canonical license tags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CanonicalLicense {
    PublicDomainCc0,
    CcBySa,
    CcByNd,
    CcByNcSa,
    CcByNcNd,
    CcByNc,
    CcBy,
    OpenAccess,
    /// Default license of an always-open source
    SourceDefault(String),
    /// No rule matched and the source is unknown; the raw string, untouched
    Unrecognized(String),
}

impl CanonicalLicense {
    /// Display label
    pub fn label(&self) -> &str {
        match self {
            CanonicalLicense::PublicDomainCc0 => "Public Domain (CC0)",
            CanonicalLicense::CcBySa => "CC BY-SA 4.0",
            CanonicalLicense::CcByNd => "CC BY-ND 4.0",
            CanonicalLicense::CcByNcSa => "CC BY-NC-SA 4.0",
            CanonicalLicense::CcByNcNd => "CC BY-NC-ND 4.0",
            CanonicalLicense::CcByNc => "CC BY-NC 4.0",
            CanonicalLicense::CcBy => "CC BY 4.0",
            CanonicalLicense::OpenAccess => "Open Access (CC BY)",
            CanonicalLicense::SourceDefault(label) => label,
            CanonicalLicense::Unrecognized(raw) => raw,
        }
    }

    /// Whether this is a recognised canonical form
    pub fn is_canonical(&self) -> bool {
        !matches!(self, CanonicalLicense::Unrecognized(_))
    }
}

impl std::fmt::Display for CanonicalLicense {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Default license for one always-open source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDefault {
    pub source: String,
    pub license: String,
}

/// Allow-list data consumed by the classifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LicenseTable {
    /// Substrings that mark a license string as permissive
    pub permissive_markers: Vec<String>,

    /// Sources whose whole catalog is openly licensed
    pub always_open_sources: Vec<String>,

    /// Per-source default labels, first match wins
    pub source_defaults: Vec<SourceDefault>,

    /// Label for always-open sources without an explicit default
    pub generic_default: String,
}

impl Default for LicenseTable {
    fn default() -> Self {
        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        Self {
            permissive_markers: strings(&[
                "cc by", "cc-by", "creative commons", "cc by-sa", "cc-by-sa", "cc by sa",
                "cc by-nd", "cc-by-nd", "cc by nd", "cc0", "public domain", "pd",
                "no known copyright", "open access", "open-access",
            ]),
            always_open_sources: strings(&[
                "openstax", "wikiversity", "wikibooks", "wikimedia", "wikipedia",
                "oer commons", "internet archive", "library of congress", "youtube (cc)",
                "ted", "tedx", "arxiv", "pubmed", "doaj", "ck-12", "freecodecamp",
                "mit opencourseware", "project gutenberg", "storyweaver", "open library",
                "pexels", "pixabay", "unsplash",
            ]),
            source_defaults: [
                ("openstax", "CC BY 4.0"),
                ("wikipedia", "CC BY-SA 3.0"),
                ("wikiversity", "CC BY-SA 3.0"),
                ("wikibooks", "CC BY-SA 3.0"),
                ("project gutenberg", "Public Domain"),
                ("internet archive", "Public Domain"),
                ("storyweaver", "CC BY 4.0"),
                ("open library", "Public Domain"),
                ("arxiv", "Open Access"),
                ("ted", "CC BY-NC-ND 4.0"),
                ("tedx", "CC BY-NC-ND 4.0"),
                ("pexels", "Pexels License"),
                ("pixabay", "Pixabay Content License"),
                ("unsplash", "Unsplash License"),
            ]
            .into_iter()
            .map(|(source, license)| SourceDefault {
                source: source.to_string(),
                license: license.to_string(),
            })
            .collect(),
            generic_default: "CC BY".to_string(),
        }
    }
}

/// Ordered normalization rules: the first rule with a matching term wins.
///
/// Non-commercial variants come before the plain attribution rules so that
/// their restrictions survive normalization.
fn rules() -> [(&'static [&'static str], CanonicalLicense); 8] {
    [
        (&["public domain", "pd", "cc0"], CanonicalLicense::PublicDomainCc0),
        (&["by-nc-sa", "by nc sa"], CanonicalLicense::CcByNcSa),
        (&["by-nc-nd", "by nc nd"], CanonicalLicense::CcByNcNd),
        (&["by-nc", "by nc", "noncommercial", "non-commercial"], CanonicalLicense::CcByNc),
        (&["by-sa", "share alike"], CanonicalLicense::CcBySa),
        (&["by-nd"], CanonicalLicense::CcByNd),
        (&["cc by", "creative commons", "attribution"], CanonicalLicense::CcBy),
        (&["open access"], CanonicalLicense::OpenAccess),
    ]
}

/// Pure license classifier
#[derive(Debug, Clone)]
pub struct LicenseClassifier {
    table: LicenseTable,
}

impl Default for LicenseClassifier {
    fn default() -> Self {
        Self::new(LicenseTable::default())
    }
}

impl LicenseClassifier {
    /// Build a classifier; table entries are lower-cased once here
    pub fn new(table: LicenseTable) -> Self {
        let lower = |items: Vec<String>| {
            items
                .into_iter()
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
        };

        Self {
            table: LicenseTable {
                permissive_markers: lower(table.permissive_markers),
                always_open_sources: lower(table.always_open_sources),
                source_defaults: table
                    .source_defaults
                    .into_iter()
                    .map(|d| SourceDefault {
                        source: d.source.trim().to_lowercase(),
                        license: d.license,
                    })
                    .collect(),
                generic_default: table.generic_default,
            },
        }
    }

    pub fn table(&self) -> &LicenseTable {
        &self.table
    }

    /// Whether the source is on the always-open list
    pub fn is_open_source(&self, source_name: &str) -> bool {
        let source = source_name.trim().to_lowercase();
        self.table
            .always_open_sources
            .iter()
            .any(|s| contains_term(&source, s))
    }

    /// Usable if the source is always-open or the license is permissive
    pub fn is_usable(&self, raw_license: &str, source_name: &str) -> bool {
        if self.is_open_source(source_name) {
            return true;
        }
        let license = raw_license.trim().to_lowercase();
        self.table
            .permissive_markers
            .iter()
            .any(|marker| contains_term(&license, marker))
    }

    /// Map a raw license string to its canonical tag
    pub fn normalize(&self, raw_license: &str, source_name: &str) -> CanonicalLicense {
        let license = raw_license.trim().to_lowercase();

        for (terms, canonical) in rules() {
            if terms.iter().any(|term| contains_term(&license, term)) {
                return canonical;
            }
        }

        if self.is_open_source(source_name) {
            let source = source_name.trim().to_lowercase();
            let label = self
                .table
                .source_defaults
                .iter()
                .find(|d| contains_term(&source, &d.source))
                .map(|d| d.license.clone())
                .unwrap_or_else(|| self.table.generic_default.clone());
            return CanonicalLicense::SourceDefault(label);
        }

        CanonicalLicense::Unrecognized(raw_license.to_string())
    }

    /// Keep usable results, rewriting their license to the canonical label
    pub fn filter(&self, results: Vec<SourceResult>) -> Vec<SourceResult> {
        results
            .into_iter()
            .filter(|r| self.is_usable(&r.license, &r.source_name))
            .map(|mut r| {
                r.license = self.normalize(&r.license, &r.source_name).label().to_string();
                r.license_verified = true;
                r
            })
            .collect()
    }
}

/// Whether `needle` occurs in `haystack` as a whole term.
///
/// An alphanumeric edge of the needle must not touch another alphanumeric
/// character in the haystack.
fn contains_term(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    let starts_alnum = needle.chars().next().map(char::is_alphanumeric).unwrap_or(false);
    let ends_alnum = needle.chars().next_back().map(char::is_alphanumeric).unwrap_or(false);

    haystack.match_indices(needle).any(|(start, _)| {
        let before_ok = !starts_alnum
            || haystack[..start]
                .chars()
                .next_back()
                .map(|c| !c.is_alphanumeric())
                .unwrap_or(true);
        let after_ok = !ends_alnum
            || haystack[start + needle.len()..]
                .chars()
                .next()
                .map(|c| !c.is_alphanumeric())
                .unwrap_or(true);
        before_ok && after_ok
    })
}
