//! Fan-out Integration Tests
//!
//! Tests for concurrent dispatch, failure isolation, merge order and paging.

mod common;

use std::time::Duration;

use ccscout::adapters::{FetchContext, SourceError};
use ccscout::core::{paginate, SourceOutcome};
use ccscout::domain::{ContentKind, SourceResult};
use common::{adapters, aggregator, item, items, quota_error, Behaviour, ScriptedAdapter};

const SHORT_TIMEOUT: Duration = Duration::from_millis(200);

#[tokio::test]
async fn test_dedupe_across_adapters() {
    let x = item("alpha", "x");
    let mut x_from_b = x.clone();
    x_from_b.id = "beta_x".to_string();
    x_from_b.source_name = "beta".to_string();

    let a = ScriptedAdapter::returning("alpha", vec![x.clone(), item("alpha", "y")]);
    let b = ScriptedAdapter::returning("beta", vec![x_from_b, item("beta", "z")]);

    let merged = aggregator(SHORT_TIMEOUT)
        .collect("q", &adapters(&[a, b]), 10, &FetchContext::default())
        .await;

    let ids: Vec<_> = merged.items.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["alpha_x", "alpha_y", "beta_z"]);
    assert_eq!(merged.sources_used, vec!["alpha", "beta"]);
}

#[tokio::test]
async fn test_untitled_images_with_distinct_urls_survive() {
    let untitled = |source: &str, id: u32, license: &str| {
        SourceResult::new(
            source,
            id,
            "",
            format!("https://{}.example/{}.jpg", source.to_lowercase(), id),
            license,
            ContentKind::Image,
        )
    };
    let pexels = ScriptedAdapter::returning(
        "Pexels",
        (1..=3).map(|id| untitled("Pexels", id, "Pexels License")).collect(),
    );
    let pixabay = ScriptedAdapter::returning(
        "Pixabay",
        vec![untitled("Pixabay", 1, "Pixabay Content License")],
    );

    let merged = aggregator(SHORT_TIMEOUT)
        .collect("q", &adapters(&[pexels, pixabay]), 10, &FetchContext::default())
        .await;

    let ids: Vec<_> = merged.items.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["pexels_1", "pexels_2", "pexels_3", "pixabay_1"]);
}

#[tokio::test]
async fn test_partial_failure_is_isolated() {
    let a = ScriptedAdapter::returning("alpha", items("alpha", 2));
    let b = ScriptedAdapter::new(
        "beta",
        Behaviour::Fail(SourceError::Http {
            provider: "beta".into(),
            status: 500,
        }),
    );
    let c = ScriptedAdapter::returning("gamma", items("gamma", 3));

    let merged = aggregator(SHORT_TIMEOUT)
        .collect("q", &adapters(&[a, b, c]), 10, &FetchContext::default())
        .await;

    assert_eq!(merged.items.len(), 5);
    assert_eq!(merged.sources_used, vec!["alpha", "gamma"]);
    assert!(matches!(merged.outcomes[1].1, SourceOutcome::Failed { .. }));
    assert!(!merged.quota_exceeded());
    assert!(!merged.all_failed());
}

#[tokio::test]
async fn test_timeout_is_isolated() {
    let a = ScriptedAdapter::returning("alpha", items("alpha", 2));
    let slow = ScriptedAdapter::new("slow", Behaviour::Sleep(Duration::from_secs(5)));
    let c = ScriptedAdapter::returning("gamma", items("gamma", 1));

    let started = std::time::Instant::now();
    let merged = aggregator(SHORT_TIMEOUT)
        .collect("q", &adapters(&[a, slow, c]), 10, &FetchContext::default())
        .await;

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(merged.sources_used, vec!["alpha", "gamma"]);
    assert_eq!(merged.outcomes[1], ("slow".to_string(), SourceOutcome::TimedOut));
}

#[tokio::test]
async fn test_music_end_to_end() {
    let a = ScriptedAdapter::returning("alpha", items("alpha", 5));
    let b = ScriptedAdapter::returning("beta", items("beta", 3));
    let slow = ScriptedAdapter::new("slow", Behaviour::Sleep(Duration::from_secs(5)));

    let page = aggregator(SHORT_TIMEOUT)
        .aggregate(
            "music",
            &adapters(&[a, b, slow]),
            30,
            &FetchContext::default(),
            1,
            10,
        )
        .await;

    assert_eq!(page.items.len(), 8);
    assert_eq!(page.total, 8);
    assert_eq!(page.total_pages, 1);
    assert_eq!(page.sources_used.len(), 2);
    assert!(!page.has_next());
    assert!(!page.has_prev());
}

#[tokio::test]
async fn test_all_sources_fail() {
    let a = ScriptedAdapter::new("alpha", Behaviour::Fail(quota_error("alpha")));
    let b = ScriptedAdapter::new("beta", Behaviour::Sleep(Duration::from_secs(5)));

    let aggregator = aggregator(SHORT_TIMEOUT);
    let merged = aggregator
        .collect("q", &adapters(&[a.clone(), b.clone()]), 10, &FetchContext::default())
        .await;
    assert!(merged.items.is_empty());
    assert!(merged.all_failed());
    assert!(merged.quota_exceeded());

    let page = aggregator
        .aggregate("q", &adapters(&[a, b]), 10, &FetchContext::default(), 1, 10)
        .await;
    assert!(page.items.is_empty());
    assert!(page.sources_used.is_empty());
    assert_eq!(page.total_pages, 0);
}

#[tokio::test]
async fn test_license_filter_and_rank() {
    let restricted = SourceResult::new(
        "alpha",
        "r",
        "restricted",
        "https://alpha.example/r",
        "All Rights Reserved",
        ContentKind::Video,
    );
    let rich = item("alpha", "rich")
        .with_description("described")
        .with_thumbnail("https://alpha.example/rich.jpg");
    let a = ScriptedAdapter::returning("alpha", vec![item("alpha", "plain"), restricted, rich]);

    let merged = aggregator(SHORT_TIMEOUT)
        .collect("q", &adapters(&[a]), 10, &FetchContext::default())
        .await;

    let ids: Vec<_> = merged.items.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["alpha_rich", "alpha_plain"]);
    assert!(merged.items.iter().all(|r| r.license_verified));
    assert!(merged.items.iter().all(|r| r.license == "CC BY 4.0"));
}

#[tokio::test]
async fn test_per_source_limit_is_enforced() {
    let a = ScriptedAdapter::returning("alpha", items("alpha", 20));

    let merged = aggregator(SHORT_TIMEOUT)
        .collect("q", &adapters(&[a]), 5, &FetchContext::default())
        .await;

    assert_eq!(merged.items.len(), 5);
    assert_eq!(merged.outcomes[0].1, SourceOutcome::Ok { count: 5 });
}

#[test]
fn test_pagination_62_by_50() {
    let all = items("alpha", 62);

    let first = paginate(all.clone(), vec!["alpha".into()], 1, 50);
    assert_eq!(first.items.len(), 50);
    assert_eq!(first.total_pages, 2);
    assert!(first.has_next());
    assert!(!first.has_prev());

    let second = paginate(all, vec!["alpha".into()], 2, 50);
    assert_eq!(second.items.len(), 12);
    assert!(second.has_prev());
    assert!(!second.has_next());
    assert_eq!(second.items[0].id, "alpha_50");
}
