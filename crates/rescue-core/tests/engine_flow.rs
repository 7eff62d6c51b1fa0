//! End-to-end engine flows over the in-memory and SQLite stores.

use rescue_core::blob::{BlobError, BlobStore, DirBlobStore};
use rescue_core::config::EngineConfig;
use rescue_core::db::SqliteCaseStore;
use rescue_core::geo::EARTH_RADIUS_METERS;
use rescue_core::model::{Category, Point, ReporterFields, Status, Submission};
use rescue_core::store::{CaseFilter, CaseStore, MemoryCaseStore};
use rescue_core::{Caller, Engine, EngineError, ErrorCode};
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    _dir: tempfile::TempDir,
    engine: Engine,
}

fn memory_engine() -> Harness {
    let dir = tempfile::tempdir().expect("temp dir");
    let engine = Engine::open(
        Arc::new(MemoryCaseStore::new()),
        Arc::new(DirBlobStore::new(dir.path().join("photos"))),
        EngineConfig::default(),
    )
    .expect("open engine");
    Harness { _dir: dir, engine }
}

fn sqlite_engine() -> Harness {
    let dir = tempfile::tempdir().expect("temp dir");
    let store = SqliteCaseStore::open(&dir.path().join("cases.sqlite3"), Duration::from_secs(5))
        .expect("open sqlite store");
    let engine = Engine::open(
        Arc::new(store),
        Arc::new(DirBlobStore::new(dir.path().join("photos"))),
        EngineConfig::default(),
    )
    .expect("open engine");
    Harness { _dir: dir, engine }
}

/// A point `meters` due north of `origin`.
fn north_of(origin: Point, meters: f64) -> Point {
    Point::new(origin.lng, origin.lat + (meters / EARTH_RADIUS_METERS).to_degrees())
}

fn example_scenario(engine: &Engine) {
    let asha = Caller::reporter("asha");
    let ravi = Caller::reporter("ravi");

    let first = engine
        .create_case(
            &asha,
            &Submission::new("dog")
                .at(Point::new(77.6, 12.9))
                .describe("limping near gate"),
        )
        .expect("create")
        .case;
    assert_eq!(first.status, Status::Unhandled);
    assert_eq!(first.category, Category::Dog);
    let texts: Vec<_> = first.descriptions.iter().map(|d| d.text.as_str()).collect();
    assert_eq!(texts, vec!["limping near gate"]);

    let second_point = Point::new(77.6001, 12.9001);
    let candidates = engine
        .find_candidates(&ravi, "Dog", second_point)
        .expect("find");
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].case_id, first.id);
    assert!(candidates[0].distance_m > 5.0 && candidates[0].distance_m < 20.0);

    let merged = engine
        .merge_into_case(
            &ravi,
            &first.id,
            &Submission::new("Dog")
                .at(second_point)
                .describe("lying under the tea stall")
                .with_photo_url("https://img.example/ravi.jpg"),
        )
        .expect("merge")
        .case;

    assert_eq!(merged.descriptions.len(), 1);
    assert_eq!(merged.descriptions[0].text, "lying under the tea stall");
    assert_eq!(merged.photos.len(), 1);
    assert_eq!(merged.contributors.len(), 2);
    assert_eq!(merged.location, second_point);
    assert_eq!(merged.location_history.len(), 2);
    assert_eq!(merged.created_by.as_str(), "asha");
    assert!(merged.invariant_violations().is_empty());
}

#[test]
fn example_scenario_in_memory() {
    let harness = memory_engine();
    example_scenario(&harness.engine);
}

#[test]
fn example_scenario_on_sqlite() {
    let harness = sqlite_engine();
    example_scenario(&harness.engine);
}

#[test]
fn created_case_is_first_candidate_at_distance_zero() {
    let harness = memory_engine();
    let engine = &harness.engine;
    let asha = Caller::reporter("asha");
    let here = Point::new(-0.1276, 51.5072);

    engine
        .create_case(&asha, &Submission::new("cat").at(north_of(here, 40.0)))
        .expect("create neighbor");
    let created = engine
        .create_case(&asha, &Submission::new("cat").at(here))
        .expect("create")
        .case;

    let found = engine.find_candidates(&asha, "cat", here).expect("find");
    assert_eq!(found[0].case_id, created.id);
    assert!(found[0].distance_m.abs() < f64::EPSILON);
    assert_eq!(found.len(), 2);
}

#[test]
fn radius_boundary_is_inclusive_of_4999_and_excludes_5001() {
    let harness = memory_engine();
    let engine = &harness.engine;
    let asha = Caller::reporter("asha");
    let origin = Point::new(77.6, 12.9);

    let inside = engine
        .create_case(&asha, &Submission::new("cow").at(north_of(origin, 4_999.0)))
        .expect("create inside")
        .case;
    engine
        .create_case(&asha, &Submission::new("cow").at(north_of(origin, 5_001.0)))
        .expect("create outside");

    let found = engine.find_candidates(&asha, "cow", origin).expect("find");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].case_id, inside.id);
}

#[test]
fn candidates_are_capped_at_five_nearest() {
    let harness = memory_engine();
    let engine = &harness.engine;
    let asha = Caller::reporter("asha");
    let origin = Point::new(10.0, 10.0);

    for meters in [900.0, 100.0, 700.0, 300.0, 500.0, 200.0, 800.0] {
        engine
            .create_case(&asha, &Submission::new("dog").at(north_of(origin, meters)))
            .expect("create");
    }
    engine
        .create_case(&asha, &Submission::new("cat").at(origin))
        .expect("create cat");

    let found = engine.find_candidates(&asha, "DOG", origin).expect("find");
    assert_eq!(found.len(), 5);
    assert!(found.iter().all(|c| c.category == Category::Dog));
    assert!(found.windows(2).all(|w| w[0].distance_m <= w[1].distance_m));
    assert!((found[4].distance_m - 700.0).abs() < 1.0);
}

#[test]
fn description_is_overwritten_while_other_fields_accumulate() {
    let harness = sqlite_engine();
    let engine = &harness.engine;
    let id = engine
        .create_case(
            &Caller::reporter("asha"),
            &Submission::new("dog")
                .at(Point::new(1.0, 1.0))
                .describe("first words")
                .with_photo_url("https://img.example/0.jpg"),
        )
        .expect("create")
        .case
        .id;

    for (idx, who) in ["ravi", "mei", "ravi"].into_iter().enumerate() {
        engine
            .merge_into_case(
                &Caller::reporter(who),
                &id,
                &Submission::default()
                    .describe(format!("update {idx}"))
                    .with_photo_url(format!("https://img.example/{}.jpg", idx + 1))
                    .with_reporter(ReporterFields {
                        display_name: who.to_string(),
                        ..ReporterFields::default()
                    }),
            )
            .expect("merge");
    }

    let case = engine
        .get_case(&Caller::reporter("asha"), &id)
        .expect("get");
    assert_eq!(case.descriptions.len(), 1);
    assert_eq!(case.descriptions[0].text, "update 2");
    assert_eq!(case.descriptions[0].contributor.as_str(), "ravi");
    assert_eq!(case.photos.len(), 4);
    assert_eq!(case.reporter_info.len(), 4);
    assert_eq!(case.contributors.len(), 3);
    assert!(case.invariant_violations().is_empty());
}

#[test]
fn status_accepts_any_order_and_rejects_unknown_values() {
    let harness = sqlite_engine();
    let engine = &harness.engine;
    let admin = Caller::administrator("ops");
    let id = engine
        .create_case(&Caller::reporter("asha"), &Submission::new("cat").at(Point::new(2.0, 2.0)))
        .expect("create")
        .case
        .id;

    for raw in ["Resolved", "Collected", "Unhandled", "InTreatment", "Resolved"] {
        let case = engine.set_status(&admin, &id, raw).expect("set status");
        assert_eq!(case.status.as_str(), raw);
    }

    let err = engine.set_status(&admin, &id, "Adopted").unwrap_err();
    assert!(matches!(err, EngineError::InvalidStatus { ref value } if value == "Adopted"));
    for raw in ["resolved", "  COLLECTED ", "intreatment"] {
        let err = engine.set_status(&admin, &id, raw).unwrap_err();
        assert!(matches!(err, EngineError::InvalidStatus { ref value } if value == raw));
    }
    assert_eq!(engine.get_case(&admin, &id).expect("get").status, Status::Resolved);

    let still_here = Submission::default().describe("still here");
    let merged = engine
        .merge_into_case(&Caller::reporter("ravi"), &id, &still_here)
        .expect("merge")
        .case;
    assert_eq!(merged.status, Status::Resolved);
}

#[test]
fn dashboard_and_my_cases_views() {
    let harness = sqlite_engine();
    let engine = &harness.engine;
    let admin = Caller::administrator("ops");
    let asha = Caller::reporter("asha");
    let ravi = Caller::reporter("ravi");

    let dog = engine
        .create_case(&asha, &Submission::new("dog").at(Point::new(3.0, 3.0)))
        .expect("create")
        .case;
    let cat = engine
        .create_case(&ravi, &Submission::new("cat").at(Point::new(4.0, 4.0)))
        .expect("create")
        .case;
    engine
        .merge_into_case(&asha, &cat.id, &Submission::default().describe("seen again"))
        .expect("merge");
    engine.set_status(&admin, &dog.id, "Collected").expect("status");

    let collected = engine
        .list_cases(
            &admin,
            &CaseFilter {
                status: Some(Status::Collected),
                ..CaseFilter::default()
            },
        )
        .expect("list");
    assert_eq!(collected.len(), 1);
    assert_eq!(collected[0].id, dog.id);

    let cats = engine
        .list_cases(
            &admin,
            &CaseFilter {
                category: Some(Category::Cat),
                ..CaseFilter::default()
            },
        )
        .expect("list");
    assert_eq!(cats.len(), 1);

    let mine: Vec<_> = engine
        .my_cases(&asha)
        .expect("mine")
        .into_iter()
        .map(|case| case.id)
        .collect();
    assert_eq!(mine.len(), 2);
    assert!(mine.contains(&dog.id) && mine.contains(&cat.id));
    assert_eq!(engine.my_cases(&ravi).expect("mine").len(), 1);
}

struct DownBlobs;

impl BlobStore for DownBlobs {
    fn put(&self, _bytes: &[u8], _content_type: &str) -> Result<String, BlobError> {
        Err(BlobError::Io(std::io::Error::other("connection reset")))
    }
}

#[test]
fn upload_failure_keeps_merge_and_reports_upstream_error() {
    let store: Arc<dyn CaseStore> = Arc::new(MemoryCaseStore::new());
    let engine = Engine::open(store, Arc::new(DownBlobs), EngineConfig::default())
        .expect("open engine");
    let asha = Caller::reporter("asha");
    let case = engine
        .create_case(&asha, &Submission::new("dog").at(Point::new(5.0, 5.0)))
        .expect("create")
        .case;

    let outcome = engine
        .merge_into_case(
            &Caller::reporter("ravi"),
            &case.id,
            &Submission::default()
                .describe("has a collar")
                .with_photo_upload(vec![0x89, b'P', b'N', b'G'], "image/png"),
        )
        .expect("merge despite upload failure");

    assert!(outcome.case.photos.is_empty());
    assert_eq!(outcome.case.descriptions[0].text, "has a collar");
    let err = outcome.photo_error.expect("upload error reported");
    assert_eq!(err.code(), ErrorCode::UpstreamFailure);
    assert!(err.to_string().contains("connection reset"));
}

#[test]
fn uploaded_photo_is_stored_as_file_url() {
    let harness = memory_engine();
    let created = harness
        .engine
        .create_case(
            &Caller::reporter("asha"),
            &Submission::new("dog")
                .at(Point::new(6.0, 6.0))
                .with_photo_upload(b"\xff\xd8\xff fake jpeg".to_vec(), "image/jpeg"),
        )
        .expect("create");
    assert!(created.photo_error.is_none());
    assert_eq!(created.case.photos.len(), 1);
    assert!(created.case.photos[0].url.starts_with("file://"));
    assert!(created.case.invariant_violations().is_empty());
}
