//! End-to-end collection runs against scripted pages and an in-memory store.

use std::sync::Arc;

use tubescout_collector::also_watched::{AlsoWatchedDetector, NoAlsoWatched};
use tubescout_collector::extractor::{
    RELATED_CARD_SELECTOR, RELATED_REGION_SELECTOR, SEARCH_CARD_SELECTOR,
};
use tubescout_collector::testing::{
    card, watch_url, FixedAlsoWatched, MockBrowser, MockPage, MockRunStore,
};
use tubescout_collector::{search_url, CollectSettings, Collector, CollectorError, RunStore};
use tubescout_common::{Locale, Provenance, RawVideo, RunOutcome, RunStatus, SourceTier, Video};

const KEYWORD: &str = "resep nasi goreng";

fn search_page_url() -> String {
    search_url(KEYWORD, &Locale::default())
}

fn collector(
    browser: &MockBrowser,
    store: &Arc<MockRunStore>,
    detector: impl AlsoWatchedDetector + 'static,
) -> Collector {
    Collector::new(
        Arc::new(browser.clone()),
        store.clone(),
        Arc::new(detector),
        CollectSettings::default(),
    )
}

async fn queued_run(store: &MockRunStore) -> uuid::Uuid {
    store.create_run(KEYWORD, &Locale::default()).await.unwrap().id
}

fn tier(videos: &[Video], tier: SourceTier) -> Vec<Video> {
    videos.iter().filter(|v| v.source_type == tier).cloned().collect()
}

fn module_card(title: &str, id: &str, views: &str) -> RawVideo {
    RawVideo {
        title: title.to_string(),
        url: watch_url(id),
        id: id.to_string(),
        channel: "Dapur Kita".to_string(),
        views: views.to_string(),
    }
}

fn two_result_search() -> MockPage {
    MockPage::new().with_cards(
        SEARCH_CARD_SELECTOR,
        vec![
            card("Nasi Goreng Kampung", "s1", "Dapur Kita", "1,2 jt x ditonton"),
            card("Nasi Goreng Seafood", "s2", "Masak Yuk", "850 rb x ditonton"),
            card("Nasi Goreng Pete", "s3", "Masak Yuk", "12 rb x ditonton"),
        ],
    )
}

#[tokio::test]
async fn module_present_collects_search_and_module_tiers() {
    let browser = MockBrowser::new()
        .on_page(&search_page_url(), two_result_search())
        .on_page(&watch_url("m2"), MockPage::new().with_views("3.456 x ditonton"));
    let store = Arc::new(MockRunStore::new());
    let detector = FixedAlsoWatched::new(vec![
        module_card("Mie Goreng Jawa", "m1", "2 jt x ditonton"),
        module_card("Kwetiau Goreng", "m2", ""),
        module_card("Bihun Goreng", "m3", "1 rb x ditonton"),
    ]);

    let run_id = queued_run(&store).await;
    let summary = collector(&browser, &store, detector)
        .collect(run_id, KEYWORD)
        .await
        .unwrap();

    assert_eq!(summary.status, RunStatus::Success);
    assert!(!summary.report.fallback_attempted);

    let videos = store.videos(run_id);
    let search = tier(&videos, SourceTier::Search);
    assert_eq!(search.len(), 2);
    assert_eq!(search[0].title, "Nasi Goreng Kampung");
    assert_eq!(search[0].views_num, 1_200_000);
    assert_eq!(search[1].views_num, 850_000);
    assert!(search.iter().all(|v| v.collected_from == Provenance::Search));

    let module = tier(&videos, SourceTier::PeopleAlsoWatched);
    assert_eq!(module.len(), 2);
    assert_eq!(module[0].views_num, 2_000_000);
    assert_eq!(module[1].views_raw, "3.456 x ditonton");
    assert_eq!(module[1].views_num, 3456);
    assert!(module.iter().all(|v| v.collected_from == Provenance::Module));

    assert!(tier(&videos, SourceTier::RelatedFallback).is_empty());
    assert!(!browser.stats().visits().contains(&watch_url("s1")));
}

#[tokio::test]
async fn single_search_result_with_module_skips_fallback() {
    let search = MockPage::new().with_cards(
        SEARCH_CARD_SELECTOR,
        vec![card("Nasi Goreng Kampung", "s1", "Dapur Kita", "500 x ditonton")],
    );
    let browser = MockBrowser::new().on_page(&search_page_url(), search);
    let store = Arc::new(MockRunStore::new());
    let detector = FixedAlsoWatched::new(vec![
        module_card("Mie Goreng Jawa", "m1", "2 jt x ditonton"),
        module_card("Kwetiau Goreng", "m2", "15 rb x ditonton"),
    ]);

    let run_id = queued_run(&store).await;
    let summary = collector(&browser, &store, detector)
        .collect(run_id, KEYWORD)
        .await
        .unwrap();

    assert_eq!(summary.status, RunStatus::Success);
    let videos = store.videos(run_id);
    assert_eq!(tier(&videos, SourceTier::Search).len(), 1);
    assert_eq!(tier(&videos, SourceTier::PeopleAlsoWatched).len(), 2);
    assert!(tier(&videos, SourceTier::RelatedFallback).is_empty());
    assert_eq!(browser.stats().visits(), vec![search_page_url()]);
}

#[tokio::test]
async fn module_absent_falls_back_to_related_videos() {
    let watch = MockPage::new().with_selector(RELATED_REGION_SELECTOR).with_cards(
        RELATED_CARD_SELECTOR,
        vec![
            card("Nasi Goreng Merah", "r1", "Chef A", "40 rb x ditonton"),
            card("Nasi Goreng Hijau", "r2", "Chef B", "7 rb x ditonton"),
            card("Nasi Goreng Hitam", "r3", "Chef C", "1 rb x ditonton"),
        ],
    );
    let browser = MockBrowser::new()
        .on_page(&search_page_url(), two_result_search())
        .on_page(&watch_url("s1"), watch);
    let store = Arc::new(MockRunStore::new());

    let run_id = queued_run(&store).await;
    let summary = collector(&browser, &store, NoAlsoWatched)
        .collect(run_id, KEYWORD)
        .await
        .unwrap();

    assert_eq!(summary.status, RunStatus::Success);
    assert!(summary.report.fallback_attempted);
    assert_eq!(summary.report.related_fallback, 2);

    let videos = store.videos(run_id);
    let related = tier(&videos, SourceTier::RelatedFallback);
    assert_eq!(related.len(), 2);
    assert_eq!(related[0].video_id, "r1");
    assert_eq!(related[1].video_id, "r2");
    assert_eq!(related[0].views_num, 40_000);
    assert!(related.iter().all(|v| v.collected_from == Provenance::WatchPage));
    assert!(tier(&videos, SourceTier::PeopleAlsoWatched).is_empty());

    assert_eq!(
        browser.stats().visits(),
        vec![search_page_url(), watch_url("s1")]
    );
}

#[tokio::test]
async fn failing_detector_is_treated_as_absent() {
    let watch = MockPage::new()
        .with_selector(RELATED_REGION_SELECTOR)
        .with_cards(RELATED_CARD_SELECTOR, vec![card("R", "r1", "C", "5 views")]);
    let browser = MockBrowser::new()
        .on_page(&search_page_url(), two_result_search())
        .on_page(&watch_url("s1"), watch);
    let store = Arc::new(MockRunStore::new());

    let run_id = queued_run(&store).await;
    let summary = collector(&browser, &store, FixedAlsoWatched::failing("module markup changed"))
        .collect(run_id, KEYWORD)
        .await
        .unwrap();

    assert_eq!(summary.status, RunStatus::Success);
    assert_eq!(tier(&store.videos(run_id), SourceTier::RelatedFallback).len(), 1);
}

#[tokio::test]
async fn missing_search_results_fail_the_run() {
    let browser = MockBrowser::new();
    let store = Arc::new(MockRunStore::new());

    let run_id = queued_run(&store).await;
    let summary = collector(&browser, &store, NoAlsoWatched)
        .collect(run_id, KEYWORD)
        .await
        .unwrap();

    assert_eq!(summary.status, RunStatus::Failed);
    let run = store.run(run_id).unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.finished_at.is_some());
    let message = run.error_message.unwrap();
    assert!(message.contains(SEARCH_CARD_SELECTOR), "{message}");
    assert!(store.videos(run_id).is_empty());
    assert_eq!(browser.stats().released(), 1);
}

#[tokio::test]
async fn related_region_timeout_fails_run_but_keeps_search_rows() {
    let browser = MockBrowser::new().on_page(&search_page_url(), two_result_search());
    let store = Arc::new(MockRunStore::new());

    let run_id = queued_run(&store).await;
    let summary = collector(&browser, &store, NoAlsoWatched)
        .collect(run_id, KEYWORD)
        .await
        .unwrap();

    assert_eq!(summary.status, RunStatus::Failed);
    assert!(summary.report.fallback_attempted);
    assert!(summary
        .error_message
        .unwrap()
        .contains(RELATED_REGION_SELECTOR));
    assert_eq!(tier(&store.videos(run_id), SourceTier::Search).len(), 2);
    assert_eq!(browser.stats().released(), 1);
}

#[tokio::test]
async fn empty_search_results_skip_fallback() {
    let browser = MockBrowser::new().on_page(
        &search_page_url(),
        MockPage::new().with_selector(SEARCH_CARD_SELECTOR),
    );
    let store = Arc::new(MockRunStore::new());

    let run_id = queued_run(&store).await;
    let summary = collector(&browser, &store, NoAlsoWatched)
        .collect(run_id, KEYWORD)
        .await
        .unwrap();

    assert_eq!(summary.status, RunStatus::Success);
    assert!(!summary.report.fallback_attempted);
    assert!(store.videos(run_id).is_empty());
    assert_eq!(browser.stats().visits(), vec![search_page_url()]);
}

#[tokio::test]
async fn enrichment_runs_only_for_empty_view_text() {
    let search = MockPage::new().with_cards(
        SEARCH_CARD_SELECTOR,
        vec![
            card("Has views", "s1", "C", "10 rb x ditonton"),
            card("No views", "s2", "C", ""),
        ],
    );
    let browser = MockBrowser::new()
        .on_page(&search_page_url(), search)
        .on_page(&watch_url("s2"), MockPage::new().with_views("1.234 x ditonton"));
    let store = Arc::new(MockRunStore::new());
    let detector = FixedAlsoWatched::new(vec![module_card("M", "m1", "3 rb x ditonton")]);

    let run_id = queued_run(&store).await;
    let summary = collector(&browser, &store, detector)
        .collect(run_id, KEYWORD)
        .await
        .unwrap();

    assert_eq!(summary.report.enrichment_attempts, 1);
    assert_eq!(summary.report.enrichment_degraded, 0);
    let stats = browser.stats();
    assert_eq!(stats.tabs_opened(), 1);
    assert_eq!(stats.tabs_closed(), 1);

    let search = tier(&store.videos(run_id), SourceTier::Search);
    assert_eq!(search[1].views_raw, "1.234 x ditonton");
    assert_eq!(search[1].views_num, 1234);
}

#[tokio::test]
async fn related_cards_without_views_are_enriched() {
    let watch = MockPage::new().with_selector(RELATED_REGION_SELECTOR).with_cards(
        RELATED_CARD_SELECTOR,
        vec![
            card("Nasi Goreng Merah", "r1", "Chef A", ""),
            card("Nasi Goreng Hijau", "r2", "Chef B", "7 rb x ditonton"),
        ],
    );
    let browser = MockBrowser::new()
        .on_page(&search_page_url(), two_result_search())
        .on_page(&watch_url("s1"), watch)
        .on_page(&watch_url("r1"), MockPage::new().with_views("9 rb x ditonton"));
    let store = Arc::new(MockRunStore::new());

    let run_id = queued_run(&store).await;
    let summary = collector(&browser, &store, NoAlsoWatched)
        .collect(run_id, KEYWORD)
        .await
        .unwrap();

    assert_eq!(summary.status, RunStatus::Success);
    assert_eq!(summary.report.enrichment_attempts, 1);
    let stats = browser.stats();
    assert_eq!(stats.tabs_opened(), 1);
    assert_eq!(stats.tabs_closed(), 1);
    assert!(stats.visits().contains(&watch_url("r1")));

    let related = tier(&store.videos(run_id), SourceTier::RelatedFallback);
    assert_eq!(related[0].views_raw, "9 rb x ditonton");
    assert_eq!(related[0].views_num, 9_000);
    assert_eq!(related[1].views_num, 7_000);
}

#[tokio::test]
async fn failed_enrichment_degrades_to_zero_views() {
    let search = MockPage::new().with_cards(
        SEARCH_CARD_SELECTOR,
        vec![card("No views", "s1", "C", "")],
    );
    let browser = MockBrowser::new()
        .on_page(&search_page_url(), search)
        .on_page(&watch_url("s1"), MockPage::new().failing_goto());
    let store = Arc::new(MockRunStore::new());
    let detector = FixedAlsoWatched::new(vec![module_card("M", "m1", "3 rb x ditonton")]);

    let run_id = queued_run(&store).await;
    let summary = collector(&browser, &store, detector)
        .collect(run_id, KEYWORD)
        .await
        .unwrap();

    assert_eq!(summary.status, RunStatus::Success);
    assert_eq!(summary.report.enrichment_degraded, 1);
    let search = tier(&store.videos(run_id), SourceTier::Search);
    assert_eq!(search[0].views_raw, "");
    assert_eq!(search[0].views_num, 0);

    let stats = browser.stats();
    assert_eq!(stats.tabs_opened(), stats.tabs_closed());
}

#[tokio::test]
async fn ranks_are_dense_and_start_at_one() {
    let watch = MockPage::new().with_selector(RELATED_REGION_SELECTOR).with_cards(
        RELATED_CARD_SELECTOR,
        vec![
            card("R1", "r1", "C", "1 views"),
            card("R2", "r2", "C", "2 views"),
            card("R3", "r3", "C", "3 views"),
        ],
    );
    let browser = MockBrowser::new()
        .on_page(&search_page_url(), two_result_search())
        .on_page(&watch_url("s1"), watch);
    let store = Arc::new(MockRunStore::new());

    let run_id = queued_run(&store).await;
    collector(&browser, &store, NoAlsoWatched)
        .collect(run_id, KEYWORD)
        .await
        .unwrap();

    let videos = store.videos(run_id);
    for t in [SourceTier::Search, SourceTier::RelatedFallback] {
        let ranks: Vec<i32> = tier(&videos, t).iter().map(|v| v.rank).collect();
        assert_eq!(ranks, vec![1, 2], "{t}");
    }
}

#[tokio::test]
async fn provisioning_failure_fails_the_run() {
    let browser = MockBrowser::new().failing_acquire();
    let store = Arc::new(MockRunStore::new());

    let run_id = queued_run(&store).await;
    let summary = collector(&browser, &store, NoAlsoWatched)
        .collect(run_id, KEYWORD)
        .await
        .unwrap();

    assert_eq!(summary.status, RunStatus::Failed);
    assert!(summary.error_message.unwrap().contains("provisioning"));
    let stats = browser.stats();
    assert_eq!(stats.acquired(), 0);
    assert_eq!(stats.released(), 0);
    assert!(store.run(run_id).unwrap().finished_at.is_some());
}

#[tokio::test]
async fn persistence_fault_fails_run_and_releases_session() {
    let browser = MockBrowser::new().on_page(&search_page_url(), two_result_search());
    let store = Arc::new(MockRunStore::new().failing_video_inserts_after(1));

    let run_id = queued_run(&store).await;
    let summary = collector(&browser, &store, NoAlsoWatched)
        .collect(run_id, KEYWORD)
        .await
        .unwrap();

    assert_eq!(summary.status, RunStatus::Failed);
    assert_eq!(store.videos(run_id).len(), 1);
    assert_eq!(browser.stats().released(), 1);
}

#[tokio::test]
async fn unrecordable_finish_is_an_error_after_release() {
    let browser = MockBrowser::new().on_page(&search_page_url(), two_result_search());
    let store = Arc::new(MockRunStore::new().failing_finish());

    let run_id = queued_run(&store).await;
    let err = collector(&browser, &store, FixedAlsoWatched::new(Vec::new()))
        .collect(run_id, KEYWORD)
        .await
        .unwrap_err();

    match err {
        CollectorError::Unrecorded {
            outcome: RunOutcome::Failed(message),
            ..
        } => assert!(message.contains(RELATED_REGION_SELECTOR), "{message}"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(browser.stats().acquired(), 1);
    assert_eq!(browser.stats().released(), 1);
    assert_eq!(store.run(run_id).unwrap().status, RunStatus::Running);
}

#[tokio::test]
async fn finished_at_is_set_exactly_when_terminal() {
    let browser = MockBrowser::new().on_page(&search_page_url(), two_result_search());
    let store = Arc::new(MockRunStore::new());

    let run_id = queued_run(&store).await;
    let queued = store.run(run_id).unwrap();
    assert_eq!(queued.status, RunStatus::Queued);
    assert!(queued.finished_at.is_none());

    collector(&browser, &store, NoAlsoWatched)
        .collect(run_id, KEYWORD)
        .await
        .unwrap();

    let run = store.run(run_id).unwrap();
    assert!(run.status.is_terminal());
    assert!(run.finished_at.is_some());
}

#[tokio::test]
async fn finished_run_cannot_be_collected_again() {
    let browser = MockBrowser::new().on_page(&search_page_url(), two_result_search());
    let store = Arc::new(MockRunStore::new());
    let collector = collector(&browser, &store, NoAlsoWatched);

    let run_id = queued_run(&store).await;
    collector.collect(run_id, KEYWORD).await.unwrap();

    let err = collector.collect(run_id, KEYWORD).await.unwrap_err();
    assert!(matches!(err, CollectorError::Store(_)));
    assert_eq!(browser.stats().acquired(), 1);
}
