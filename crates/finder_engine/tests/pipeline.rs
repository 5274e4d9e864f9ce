mod common;

use std::sync::Mutex;
use std::time::Duration;

use finder_engine::{
    execute_run, EnrichedRecord, FailureKind, FinishReason, PipelineEvent, Query, ResultSink,
    RunCanceller, RunOutcome, RunProgress, TotalEstimate, UNKNOWN,
};
use pretty_assertions::assert_eq;

use common::{
    init_logging, record_names, test_config, Call, CollectingSink, Failure, FixtureCatalog,
};

async fn run(catalog: &FixtureCatalog, genres: &[&str], page_size: u32) -> Vec<PipelineEvent> {
    let sink = CollectingSink::new();
    let query = Query::new(genres).unwrap();
    execute_run(
        catalog,
        &query,
        &test_config(page_size),
        &RunCanceller::new(),
        1,
        &sink,
    )
    .await;
    sink.take()
}

fn outcome(events: &[PipelineEvent]) -> RunOutcome {
    let finished: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            PipelineEvent::Finished(outcome) => Some(outcome.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(finished.len(), 1, "exactly one terminal event");
    assert!(matches!(events.last(), Some(PipelineEvent::Finished(_))));
    finished[0].clone()
}

#[tokio::test]
async fn single_page_emits_total_progress_records_then_finished() {
    init_logging();
    let catalog = FixtureCatalog::new().with_genre("idm", &["a1", "b22"]);

    let events = run(&catalog, &["idm"], 50).await;

    let record = |id: &str, followers: u64| EnrichedRecord {
        name: format!("Playlist {id}"),
        follower_count: followers,
        owner_display_name: format!("Owner owner-{id}"),
        owner_email: format!("owner-{id}@example.com"),
        canonical_link: format!("https://open.example/playlist/{id}"),
        description: format!("About {id}"),
    };
    let progress = |processed| {
        PipelineEvent::Progress(RunProgress {
            run_id: 1,
            delta: 1,
            processed,
        })
    };
    assert_eq!(
        events,
        vec![
            PipelineEvent::TotalKnown(TotalEstimate {
                count: 2,
                per_item: Duration::from_millis(100),
            }),
            progress(1),
            PipelineEvent::Record(record("a1", 20)),
            progress(2),
            PipelineEvent::Record(record("b22", 30)),
            PipelineEvent::Finished(RunOutcome {
                run_id: 1,
                reason: FinishReason::Completed,
                records_emitted: 2,
                items_skipped: 0,
            }),
        ]
    );
}

#[tokio::test]
async fn total_counts_happen_once_per_genre_before_any_page_fetch() {
    init_logging();
    let catalog = FixtureCatalog::new()
        .with_genre("idm", &["a", "b", "c"])
        .with_genre("electro", &["d"])
        .with_genre("drum and bass", &[]);

    run(&catalog, &["idm", "electro", "drum and bass"], 2).await;

    let searches: Vec<(u32, u32)> = catalog
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            Call::Search { limit, offset, .. } => Some((limit, offset)),
            _ => None,
        })
        .collect();
    let counts = searches.iter().take_while(|(limit, _)| *limit == 1).count();
    assert_eq!(counts, 3);
    assert!(searches[counts..].iter().all(|(limit, _)| *limit == 2));
    assert!(matches!(
        catalog.calls().get(3),
        Some(Call::Search { limit: 2, offset: 0, .. })
    ));
}

#[tokio::test]
async fn pagination_walks_every_page_until_empty() {
    init_logging();
    let catalog = FixtureCatalog::new().with_genre("techno", &["p1", "p2", "p3", "p4", "p5"]);

    let events = run(&catalog, &["techno"], 2).await;

    assert_eq!(
        record_names(&events),
        vec![
            "Playlist p1",
            "Playlist p2",
            "Playlist p3",
            "Playlist p4",
            "Playlist p5"
        ]
    );
    let offsets: Vec<u32> = catalog
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            Call::Search {
                limit: 2, offset, ..
            } => Some(offset),
            _ => None,
        })
        .collect();
    assert_eq!(offsets, vec![0, 2, 4, 6]);

    let done = outcome(&events);
    assert_eq!(done.reason, FinishReason::Completed);
    assert_eq!(done.records_emitted, 5);
}

#[tokio::test]
async fn totals_are_summed_and_playlists_are_not_deduplicated_across_genres() {
    init_logging();
    let catalog = FixtureCatalog::new()
        .with_genre("idm", &["shared", "x"])
        .with_genre("electro", &["shared"])
        .with_total("idm", 120)
        .with_total("electro", 80);

    let events = run(&catalog, &["idm", "electro"], 50).await;

    assert_eq!(
        events.first(),
        Some(&PipelineEvent::TotalKnown(TotalEstimate {
            count: 200,
            per_item: Duration::from_millis(100),
        }))
    );
    assert_eq!(
        record_names(&events),
        vec!["Playlist shared", "Playlist x", "Playlist shared"]
    );
    // Upstream totals are estimates; fewer records than announced is fine.
    assert_eq!(outcome(&events).records_emitted, 3);
}

#[tokio::test]
async fn missing_email_and_description_use_unknown_sentinel() {
    init_logging();
    let catalog = FixtureCatalog::new()
        .with_genre("idm", &["lonely"])
        .without_description("lonely")
        .without_email("owner-lonely");

    let events = run(&catalog, &["idm"], 50).await;

    let record = events
        .iter()
        .find_map(|event| match event {
            PipelineEvent::Record(record) => Some(record.clone()),
            _ => None,
        })
        .expect("record emitted");
    assert_eq!(record.owner_email, UNKNOWN);
    assert_eq!(record.description, UNKNOWN);
}

#[tokio::test]
async fn vanished_playlist_is_skipped_and_run_continues() {
    init_logging();
    let catalog = FixtureCatalog::new()
        .with_genre("idm", &["a", "gone", "c"])
        .failing_detail("gone", Failure::NotFound);

    let events = run(&catalog, &["idm"], 50).await;

    assert_eq!(record_names(&events), vec!["Playlist a", "Playlist c"]);
    let processed: Vec<u64> = events
        .iter()
        .filter_map(|event| match event {
            PipelineEvent::Progress(progress) => Some(progress.processed),
            _ => None,
        })
        .collect();
    assert_eq!(processed, vec![1, 2, 3]);

    let done = outcome(&events);
    assert_eq!(done.reason, FinishReason::Completed);
    assert_eq!(done.items_skipped, 1);
    assert!(!catalog.calls().contains(&Call::User("owner-gone".to_string())));
}

#[tokio::test]
async fn transient_detail_failures_are_retried() {
    init_logging();
    let catalog = FixtureCatalog::new()
        .with_genre("idm", &["flaky"])
        .failing_detail("flaky", Failure::Transient(2));

    let events = run(&catalog, &["idm"], 50).await;

    assert_eq!(record_names(&events), vec!["Playlist flaky"]);
    let detail_calls = catalog
        .calls()
        .into_iter()
        .filter(|call| matches!(call, Call::Detail(_)))
        .count();
    assert_eq!(detail_calls, 3);
}

#[tokio::test]
async fn exhausted_retries_skip_only_that_item() {
    init_logging();
    let catalog = FixtureCatalog::new()
        .with_genre("idm", &["flaky", "fine"])
        .failing_detail("flaky", Failure::Transient(10));

    let events = run(&catalog, &["idm"], 50).await;

    assert_eq!(record_names(&events), vec!["Playlist fine"]);
    assert_eq!(outcome(&events).items_skipped, 1);
}

#[tokio::test]
async fn auth_failure_mid_run_ends_with_failed_reason() {
    init_logging();
    let catalog = FixtureCatalog::new()
        .with_genre("idm", &["a", "revoked", "c"])
        .failing_detail("revoked", Failure::Auth);

    let events = run(&catalog, &["idm"], 50).await;

    assert_eq!(record_names(&events), vec!["Playlist a"]);
    match outcome(&events).reason {
        FinishReason::Failed(err) => assert_eq!(err.kind, FailureKind::Auth),
        other => panic!("expected auth failure, got {other:?}"),
    }
}

#[tokio::test]
async fn failed_total_count_suppresses_total_but_paging_continues() {
    init_logging();
    let catalog = FixtureCatalog::new()
        .with_genre("idm", &["a", "b"])
        .failing_total_counts();

    let events = run(&catalog, &["idm"], 50).await;

    assert!(!events
        .iter()
        .any(|event| matches!(event, PipelineEvent::TotalKnown(_))));
    assert_eq!(record_names(&events).len(), 2);
    assert_eq!(outcome(&events).reason, FinishReason::Completed);
}

#[tokio::test]
async fn offset_cap_stops_paging() {
    init_logging();
    let catalog = FixtureCatalog::new().with_genre("idm", &["a", "b", "c", "d", "e"]);
    let config = finder_engine::PipelineConfig {
        max_offset: Some(4),
        ..test_config(2)
    };
    let sink = CollectingSink::new();

    execute_run(
        &catalog,
        &Query::new(["idm"]).unwrap(),
        &config,
        &RunCanceller::new(),
        9,
        &sink,
    )
    .await;

    let events = sink.take();
    assert_eq!(
        record_names(&events),
        vec!["Playlist a", "Playlist b", "Playlist c", "Playlist d"]
    );
    assert_eq!(outcome(&events).run_id, 9);
}

#[tokio::test]
async fn identical_queries_yield_identical_results() {
    init_logging();
    let catalog = FixtureCatalog::new()
        .with_genre("idm", &["a", "b", "c"])
        .with_genre("electro", &["d", "a"]);

    let first = run(&catalog, &["idm", "electro"], 2).await;
    let second = run(&catalog, &["idm", "electro"], 2).await;

    assert_eq!(first, second);
}

/// Cancels the run as soon as it has seen `after` records.
struct CancelAfter {
    after: usize,
    canceller: RunCanceller,
    events: Mutex<Vec<PipelineEvent>>,
}

impl ResultSink for CancelAfter {
    fn emit(&self, event: PipelineEvent) {
        let mut events = self.events.lock().unwrap();
        events.push(event);
        let records = events
            .iter()
            .filter(|e| matches!(e, PipelineEvent::Record(_)))
            .count();
        if records == self.after {
            self.canceller.cancel();
        }
    }
}

#[tokio::test]
async fn cancel_after_record_k_stops_before_the_next_item() {
    init_logging();
    let catalog =
        FixtureCatalog::new().with_genre("idm", &["p1", "p2", "p3", "p4", "p5", "p6", "p7"]);
    let canceller = RunCanceller::new();
    let sink = CancelAfter {
        after: 3,
        canceller: canceller.clone(),
        events: Mutex::new(Vec::new()),
    };

    let done = execute_run(
        &catalog,
        &Query::new(["idm"]).unwrap(),
        &test_config(5),
        &canceller,
        1,
        &sink,
    )
    .await;

    let events = sink.events.into_inner().unwrap();
    assert_eq!(done.reason, FinishReason::Cancelled);
    assert_eq!(done.records_emitted, 3);
    assert_eq!(record_names(&events).len(), 3);
    assert!(!catalog.calls().contains(&Call::Detail("p4".to_string())));
}

#[tokio::test]
async fn cancel_before_start_emits_only_finished() {
    init_logging();
    let catalog = FixtureCatalog::new().with_genre("idm", &["a"]);
    let canceller = RunCanceller::new();
    canceller.cancel();
    let sink = CollectingSink::new();

    execute_run(
        &catalog,
        &Query::new(["idm"]).unwrap(),
        &test_config(50),
        &canceller,
        1,
        &sink,
    )
    .await;

    let events = sink.take();
    assert_eq!(events.len(), 1);
    assert_eq!(outcome(&events).reason, FinishReason::Cancelled);
    assert!(catalog.calls().is_empty());
}

fn page_fetches(catalog: &FixtureCatalog, genre: &str) -> usize {
    catalog
        .calls()
        .into_iter()
        .filter(|call| matches!(call, Call::Search { genre: g, limit, .. } if g == genre && *limit != 1))
        .count()
}

fn failure_kind(done: &RunOutcome) -> FailureKind {
    match &done.reason {
        FinishReason::Failed(err) => err.kind,
        other => panic!("expected a failed run, got {other:?}"),
    }
}

#[tokio::test]
async fn page_fetch_that_outlasts_retries_fails_the_run_as_network() {
    init_logging();
    let catalog = FixtureCatalog::new()
        .with_genre("idm", &["a", "b"])
        .with_genre("electro", &["c"])
        .failing_pages("electro", Failure::Transient(10));

    let events = run(&catalog, &["idm", "electro"], 50).await;

    // Records from the genre that paged cleanly stay delivered.
    assert_eq!(record_names(&events), vec!["Playlist a", "Playlist b"]);
    let done = outcome(&events);
    assert_eq!(failure_kind(&done), FailureKind::Network);
    assert_eq!(done.records_emitted, 2);
    // One first attempt plus `max_retries` (2) more.
    assert_eq!(page_fetches(&catalog, "electro"), 3);
}

#[tokio::test]
async fn transient_page_failure_recovers_within_retry_budget() {
    init_logging();
    let catalog = FixtureCatalog::new()
        .with_genre("idm", &["a"])
        .failing_pages("idm", Failure::Transient(1));

    let events = run(&catalog, &["idm"], 50).await;

    assert_eq!(record_names(&events), vec!["Playlist a"]);
    assert_eq!(outcome(&events).reason, FinishReason::Completed);
}

#[tokio::test]
async fn unexpected_or_malformed_pages_fail_as_protocol_without_retry() {
    init_logging();
    for failure in [Failure::Unexpected(500), Failure::Malformed, Failure::NotFound] {
        let catalog = FixtureCatalog::new()
            .with_genre("idm", &["a"])
            .failing_pages("idm", failure);

        let events = run(&catalog, &["idm"], 50).await;

        assert!(record_names(&events).is_empty(), "{failure:?}");
        assert_eq!(failure_kind(&outcome(&events)), FailureKind::Protocol, "{failure:?}");
        assert_eq!(page_fetches(&catalog, "idm"), 1, "{failure:?}");
    }
}

#[tokio::test]
async fn failed_owner_lookup_still_emits_record_with_unknown_email() {
    init_logging();
    let catalog = FixtureCatalog::new()
        .with_genre("idm", &["a", "b", "c"])
        .failing_user("owner-a", Failure::NotFound)
        .failing_user("owner-b", Failure::Transient(10));

    let events = run(&catalog, &["idm"], 50).await;

    let emails: Vec<String> = events
        .iter()
        .filter_map(|event| match event {
            PipelineEvent::Record(record) => Some(record.owner_email.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(
        emails,
        vec![
            UNKNOWN.to_string(),
            UNKNOWN.to_string(),
            "owner-c@example.com".to_string()
        ]
    );
    let done = outcome(&events);
    assert_eq!(done.reason, FinishReason::Completed);
    assert_eq!(done.items_skipped, 0);
    let owner_b_calls = catalog
        .calls()
        .into_iter()
        .filter(|call| *call == Call::User("owner-b".to_string()))
        .count();
    assert_eq!(owner_b_calls, 3);
}

#[tokio::test]
async fn rejected_owner_lookup_ends_the_run_as_auth_failure() {
    init_logging();
    let catalog = FixtureCatalog::new()
        .with_genre("idm", &["a", "b"])
        .failing_user("owner-b", Failure::Auth);

    let events = run(&catalog, &["idm"], 50).await;

    assert_eq!(record_names(&events), vec!["Playlist a"]);
    assert_eq!(failure_kind(&outcome(&events)), FailureKind::Auth);
}

#[tokio::test]
async fn cancel_during_long_retry_after_finishes_promptly() {
    init_logging();
    let catalog = FixtureCatalog::new()
        .with_genre("idm", &["a"])
        .failing_pages("idm", Failure::RateLimited(Duration::from_secs(20)));
    let config = finder_engine::PipelineConfig {
        max_retries: 3,
        max_backoff: Duration::from_secs(60),
        ..test_config(50)
    };
    let canceller = RunCanceller::new();
    let sink = CollectingSink::new();

    let trigger = canceller.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });
    let done = tokio::time::timeout(
        Duration::from_secs(5),
        execute_run(
            &catalog,
            &Query::new(["idm"]).unwrap(),
            &config,
            &canceller,
            1,
            &sink,
        ),
    )
    .await
    .expect("run should end soon after cancel");

    assert_eq!(done.reason, FinishReason::Cancelled);
    assert_eq!(page_fetches(&catalog, "idm"), 1);
    assert_eq!(outcome(&sink.take()).reason, FinishReason::Cancelled);
}
