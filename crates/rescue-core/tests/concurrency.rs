//! Concurrent merges must never lose appends or duplicate contributors, and
//! separate handles on one database must agree on what exists and where.

use rescue_core::blob::DirBlobStore;
use rescue_core::config::EngineConfig;
use rescue_core::error::ErrorCode;
use rescue_core::db::SqliteCaseStore;
use rescue_core::model::{CaseId, Point, Submission};
use rescue_core::store::MemoryCaseStore;
use rescue_core::{Caller, Engine};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

const WRITERS: usize = 8;

fn open_case(engine: &Engine, describe: bool) -> CaseId {
    let mut submission = Submission::new("dog").at(Point::new(77.6, 12.9));
    if describe {
        submission = submission.describe("initial");
    }
    engine
        .create_case(&Caller::reporter("asha"), &submission)
        .expect("create")
        .case
        .id
}

fn hammer(engine: &Arc<Engine>, id: &CaseId, contributor_of: fn(usize) -> String) {
    let barrier = Arc::new(Barrier::new(WRITERS));
    let handles: Vec<_> = (0..WRITERS)
        .map(|n| {
            let engine = Arc::clone(engine);
            let barrier = Arc::clone(&barrier);
            let id = id.clone();
            thread::spawn(move || {
                barrier.wait();
                engine
                    .merge_into_case(
                        &Caller::reporter(contributor_of(n)),
                        &id,
                        &Submission::default()
                            .describe(format!("writer {n}"))
                            .with_photo_url(format!("https://img.example/{n}.jpg")),
                    )
                    .expect("merge")
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("writer thread");
    }
}

fn assert_no_lost_appends(engine: &Engine, id: &CaseId, expected_contributors: usize) {
    let case = engine
        .get_case(&Caller::reporter("asha"), id)
        .expect("get");

    assert_eq!(case.photos.len(), WRITERS);
    let urls: BTreeSet<_> = case.photos.iter().map(|p| p.url.as_str()).collect();
    assert_eq!(urls.len(), WRITERS);
    assert_eq!(case.reporter_info.len(), WRITERS + 1);
    assert_eq!(case.descriptions.len(), 1);
    assert!(case.descriptions[0].text.starts_with("writer "));
    assert_eq!(case.contributors.len(), expected_contributors);
    assert_eq!(case.version, 1 + WRITERS as u64);
    assert!(case.invariant_violations().is_empty());
}

#[test]
fn memory_store_concurrent_merges_keep_every_photo() {
    let dir = tempfile::tempdir().expect("temp dir");
    let engine = Arc::new(
        Engine::open(
            Arc::new(MemoryCaseStore::new()),
            Arc::new(DirBlobStore::new(dir.path())),
            EngineConfig::default(),
        )
        .expect("open"),
    );
    let id = open_case(&engine, true);

    hammer(&engine, &id, |n| format!("reporter-{n}"));
    assert_no_lost_appends(&engine, &id, WRITERS + 1);
}

#[test]
fn repeated_contributor_is_recorded_once() {
    let dir = tempfile::tempdir().expect("temp dir");
    let engine = Arc::new(
        Engine::open(
            Arc::new(MemoryCaseStore::new()),
            Arc::new(DirBlobStore::new(dir.path())),
            EngineConfig::default(),
        )
        .expect("open"),
    );
    let id = open_case(&engine, true);

    hammer(&engine, &id, |_| "ravi".to_string());
    assert_no_lost_appends(&engine, &id, 2);
}

#[test]
fn sqlite_store_concurrent_merges_keep_every_photo() {
    let dir = tempfile::tempdir().expect("temp dir");
    let store = SqliteCaseStore::open(&dir.path().join("cases.sqlite3"), Duration::from_secs(10))
        .expect("open store");
    let engine = Arc::new(
        Engine::open(
            Arc::new(store),
            Arc::new(DirBlobStore::new(dir.path().join("photos"))),
            EngineConfig::default(),
        )
        .expect("open"),
    );
    let id = open_case(&engine, false);

    hammer(&engine, &id, |n| format!("reporter-{n}"));
    assert_no_lost_appends(&engine, &id, WRITERS + 1);
}

/// Two engines on one database file behave like two processes: they share
/// no in-process lock, so only the version check keeps appends intact.
#[test]
fn separate_engines_on_one_database_serialize_through_versions() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("cases.sqlite3");
    let mut config = EngineConfig::default();
    config.store.conflict_retries = 64;
    config.store.busy_timeout_ms = 10_000;

    let open_engine = || {
        let store = SqliteCaseStore::open(&path, config.store.busy_timeout()).expect("open store");
        Arc::new(
            Engine::open(
                Arc::new(store),
                Arc::new(DirBlobStore::new(dir.path().join("photos"))),
                config.clone(),
            )
            .expect("open engine"),
        )
    };
    let left = open_engine();
    let right = open_engine();
    let id = open_case(&left, true);

    let barrier = Arc::new(Barrier::new(WRITERS));
    let handles: Vec<_> = (0..WRITERS)
        .map(|n| {
            let engine = if n % 2 == 0 {
                Arc::clone(&left)
            } else {
                Arc::clone(&right)
            };
            let barrier = Arc::clone(&barrier);
            let id = id.clone();
            thread::spawn(move || {
                barrier.wait();
                engine
                    .merge_into_case(
                        &Caller::reporter(format!("reporter-{n}")),
                        &id,
                        &Submission::default()
                            .describe(format!("writer {n}"))
                            .with_photo_url(format!("https://img.example/{n}.jpg")),
                    )
                    .expect("merge")
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("writer thread");
    }

    assert_no_lost_appends(&right, &id, WRITERS + 1);
}

#[test]
fn concurrent_creates_from_different_reporters_open_separate_cases() {
    let dir = tempfile::tempdir().expect("temp dir");
    let engine = Arc::new(
        Engine::open(
            Arc::new(MemoryCaseStore::new()),
            Arc::new(DirBlobStore::new(dir.path())),
            EngineConfig::default(),
        )
        .expect("open"),
    );

    thread::scope(|scope| {
        for n in 0..4 {
            let engine = Arc::clone(&engine);
            scope.spawn(move || {
                engine
                    .create_case(
                        &Caller::reporter(format!("reporter-{n}")),
                        &Submission::new("cat").at(Point::new(1.0, 1.0)),
                    )
                    .expect("create");
            });
        }
    });

    let found = engine
        .find_candidates(&Caller::reporter("asha"), "cat", Point::new(1.0, 1.0))
        .expect("find");
    assert_eq!(found.len(), 4);
}

fn sqlite_engine(dir: &std::path::Path) -> Arc<Engine> {
    let store = SqliteCaseStore::open(&dir.join("cases.sqlite3"), Duration::from_secs(10))
        .expect("open store");
    Arc::new(
        Engine::open(
            Arc::new(store),
            Arc::new(DirBlobStore::new(dir.join("photos"))),
            EngineConfig::default(),
        )
        .expect("open engine"),
    )
}

fn nearby(engine: &Engine, point: Point) -> Vec<CaseId> {
    engine
        .find_candidates(&Caller::reporter("mei"), "dog", point)
        .expect("find")
        .into_iter()
        .map(|candidate| candidate.case_id)
        .collect()
}

#[test]
fn engines_on_one_database_see_each_others_cases_and_moves() {
    let dir = tempfile::tempdir().expect("temp dir");
    let left = sqlite_engine(dir.path());
    let right = sqlite_engine(dir.path());
    let first_seen = Point::new(77.6, 12.9);
    let moved_to = Point::new(78.0, 13.5);

    let id = open_case(&left, false);
    assert_eq!(nearby(&right, first_seen), vec![id.clone()]);

    right
        .merge_into_case(
            &Caller::reporter("ravi"),
            &id,
            &Submission::default().at(moved_to),
        )
        .expect("merge");
    assert!(nearby(&left, first_seen).is_empty());
    assert_eq!(nearby(&left, moved_to), vec![id.clone()]);

    right
        .delete_case(&Caller::administrator("ops"), &id)
        .expect("delete");
    assert!(nearby(&left, moved_to).is_empty());
    let err = left
        .merge_into_case(&Caller::reporter("mei"), &id, &Submission::default().describe("x"))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::CaseNotFound);
}

#[test]
fn readers_never_observe_half_applied_merges() {
    const MERGES: u32 = 40;

    let dir = tempfile::tempdir().expect("temp dir");
    let writer = sqlite_engine(dir.path());
    let reader = sqlite_engine(dir.path());
    let id = open_case(&writer, true);
    let done = AtomicBool::new(false);

    thread::scope(|scope| {
        scope.spawn(|| {
            for n in 0..MERGES {
                let step = f64::from(n + 1) * 0.001;
                writer
                    .merge_into_case(
                        &Caller::reporter(format!("reporter-{n}")),
                        &id,
                        &Submission::default()
                            .at(Point::new(77.6 + step, 12.9 + step))
                            .with_photo_url(format!("https://img.example/{n}.jpg")),
                    )
                    .expect("merge");
            }
            done.store(true, Ordering::Release);
        });

        scope.spawn(|| {
            let asha = Caller::reporter("asha");
            while !done.load(Ordering::Acquire) {
                let case = reader.get_case(&asha, &id).expect("get");
                let merges = case.photos.len();
                assert_eq!(case.reporter_info.len(), merges + 1);
                assert_eq!(case.location_history.len(), merges + 1);
                assert_eq!(case.version, merges as u64 + 1);
                assert_eq!(
                    case.location_history.last().map(|entry| entry.point),
                    Some(case.location)
                );
                assert!(case.invariant_violations().is_empty());
            }
        });
    });

    let case = reader.get_case(&Caller::reporter("asha"), &id).expect("get");
    assert_eq!(case.photos.len(), MERGES as usize);
}
