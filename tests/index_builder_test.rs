//! Tests for [`IndexBuilder`]: partial failures, refresh, rebuild and the
//! lifecycle state machine.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{MockSource, fast_retry, procedure_json, transient};
use procedex::cache::EntryCache;
use procedex::index::{IndexBuilder, IndexConfig, IndexState, KeywordIndex};
use procedex::{FetchCoordinator, FetchKey, ProcedexError};

struct Fixture {
    source: Arc<MockSource>,
    index: Arc<KeywordIndex>,
    builder: IndexBuilder,
}

fn fixture(source: MockSource) -> Fixture {
    let source = Arc::new(source);
    let coordinator = Arc::new(FetchCoordinator::new(
        source.clone(),
        Arc::new(EntryCache::default()),
        fast_retry(),
    ));
    let index = Arc::new(KeywordIndex::new(&IndexConfig::default()));
    let builder = IndexBuilder::new(coordinator, Arc::clone(&index), 4);
    Fixture {
        source,
        index,
        builder,
    }
}

fn catalog() -> MockSource {
    MockSource::new()
        .with_procedure(1, "Business registration", &["company"])
        .with_procedure(2, "Vehicle registration", &["car"])
        .with_procedure(3, "Import permit", &["customs"])
}

#[tokio::test]
async fn partial_failure_does_not_abort_batch() {
    let f = fixture(catalog());
    f.source.fail_always(FetchKey::procedure(2), transient());

    let summary = f.builder.build_all(&[1, 2, 3]).await;

    assert_eq!(summary.succeeded, vec![1, 3]);
    assert_eq!(summary.failed_ids(), vec![2]);
    assert_eq!(summary.failed[0].error, transient());
    assert_eq!(f.index.procedure_ids(), vec![1, 3]);
    assert!(f.index.postings("vehicle").is_empty());
    assert_eq!(f.index.postings("registration"), vec![1]);
    assert_eq!(f.builder.state(), IndexState::Ready);
}

#[tokio::test]
async fn permanently_missing_procedure_does_not_abort_batch() {
    let f = fixture(catalog());
    f.source.delete(FetchKey::procedure(2));

    let summary = f.builder.build_all(&[1, 2, 3]).await;

    assert_eq!(summary.succeeded, vec![1, 3]);
    assert_eq!(summary.failed_ids(), vec![2]);
    assert_eq!(
        summary.failed[0].error,
        ProcedexError::NotFound(FetchKey::procedure(2))
    );
    assert_eq!(f.index.procedure_ids(), vec![1, 3]);
    assert!(f.index.postings("vehicle").is_empty());
    assert!(f.index.terms_for(2).is_empty());
    assert_eq!(f.builder.state(), IndexState::Ready);
}

#[tokio::test]
async fn missing_procedure_is_reported_as_not_found() {
    let f = fixture(catalog());

    let summary = f.builder.build_all(&[1, 99]).await;

    assert_eq!(summary.succeeded, vec![1]);
    assert_eq!(
        summary.failed[0].error,
        ProcedexError::NotFound(FetchKey::procedure(99))
    );
}

#[tokio::test]
async fn summary_preserves_input_order() {
    let f = fixture(catalog().with_delay(Duration::from_millis(5)));

    let summary = f.builder.build_all(&[3, 1, 2]).await;

    assert_eq!(summary.succeeded, vec![3, 1, 2]);
    assert!(summary.is_complete());
}

#[tokio::test]
async fn indexed_text_covers_title_keywords_and_category() {
    let source = MockSource::new().with(FetchKey::procedure(5), {
        let mut record = procedure_json(5, "Work permit", &["employment"]);
        record["category"] = "Labour".into();
        record["description"] = "Permit for foreign nationals".into();
        record
    });
    let f = fixture(source);

    f.builder.build_all(&[5]).await;

    for term in ["work", "permit", "employment", "labour", "foreign", "nationals"] {
        assert_eq!(f.index.postings(term), vec![5], "term {term}");
    }
}

#[tokio::test]
async fn build_reuses_cached_records() {
    let f = fixture(catalog());

    f.builder.build_all(&[1, 2]).await;
    f.builder.build_all(&[1, 2]).await;

    assert_eq!(f.source.total_calls(), 2);
}

#[tokio::test]
async fn refresh_refetches_and_reindexes() {
    let f = fixture(catalog());
    f.builder.build_all(&[1]).await;
    f.source
        .put(FetchKey::procedure(1), procedure_json(1, "Company licence", &[]));

    f.builder.refresh(1).await.unwrap();

    assert_eq!(f.source.calls(FetchKey::procedure(1)), 2);
    assert_eq!(f.index.terms_for(1), vec!["company", "licence"]);
    assert!(f.index.postings("registration").is_empty());
}

#[tokio::test]
async fn refresh_of_deleted_procedure_removes_it() {
    let f = fixture(catalog());
    f.builder.build_all(&[1, 2]).await;
    f.source.delete(FetchKey::procedure(1));

    let err = f.builder.refresh(1).await.unwrap_err();

    assert_eq!(err, ProcedexError::NotFound(FetchKey::procedure(1)));
    assert!(!f.index.contains(1));
    assert_eq!(f.index.postings("registration"), vec![2]);
}

#[tokio::test]
async fn failed_refresh_keeps_previous_terms() {
    let f = fixture(catalog());
    f.builder.build_all(&[1]).await;
    f.source.fail_always(FetchKey::procedure(1), transient());

    // The fresh cached record is served as the fallback.
    f.builder.refresh(1).await.unwrap();

    assert!(f.index.contains(1));
    assert_eq!(f.index.postings("business"), vec![1]);
}

#[tokio::test]
async fn rebuild_all_drops_procedures_not_rebuilt() {
    let f = fixture(catalog());
    f.builder.build_all(&[1, 2, 3]).await;

    let summary = f.builder.rebuild_all(&[3]).await;

    assert_eq!(summary.succeeded, vec![3]);
    assert_eq!(f.index.procedure_ids(), vec![3]);
    assert!(f.index.search("registration", 5).is_empty());
}

#[tokio::test]
async fn lifecycle_states() {
    let f = fixture(catalog().with_delay(Duration::from_millis(40)));
    assert_eq!(f.builder.state(), IndexState::Empty);

    let (_, during_build) = tokio::join!(f.builder.build_all(&[1, 2]), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        f.builder.state()
    });
    assert_eq!(during_build, IndexState::Building);
    assert_eq!(f.builder.state(), IndexState::Ready);

    let (_, during_refresh) = tokio::join!(f.builder.refresh(1), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        f.builder.state()
    });
    assert_eq!(during_refresh, IndexState::Refreshing);
    assert_eq!(f.builder.state(), IndexState::Ready);
}

#[tokio::test]
async fn refresh_of_unbuilt_index_is_a_build() {
    let f = fixture(catalog().with_delay(Duration::from_millis(40)));

    let (refreshed, during_refresh) = tokio::join!(f.builder.refresh(1), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        f.builder.state()
    });

    refreshed.unwrap();
    assert_eq!(during_refresh, IndexState::Building);
    assert_eq!(f.builder.state(), IndexState::Ready);
    assert_eq!(f.index.procedure_ids(), vec![1]);
}

#[tokio::test]
async fn search_answers_from_previous_state_during_refresh() {
    let f = fixture(catalog().with_delay(Duration::from_millis(40)));
    f.builder.build_all(&[1, 2]).await;

    let (_, hits) = tokio::join!(f.builder.build_all(&[3]), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        f.index.search("registration", 5)
    });

    assert_eq!(hits.len(), 2);
}

#[tokio::test]
async fn reset_returns_to_empty() {
    let f = fixture(catalog());
    f.builder.build_all(&[1]).await;

    f.builder.reset();

    assert_eq!(f.builder.state(), IndexState::Empty);
    assert!(f.index.is_empty());
}
