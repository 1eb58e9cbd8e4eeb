//! Batch coordinator tests
//!
//! End-to-end runs over real files and a file-backed catalog, with the
//! inference server replaced by a scripted client: fault isolation,
//! skip/update behavior, thumbnails, parallel runs and cancellation.

mod helpers;

use helpers::{
    create_test_db, fields_json, write_corrupt_image, write_test_png, ScriptedClient,
};
use pictag::config::{ExtractionSettings, InferenceConfig};
use pictag::db::images;
use pictag::services::extraction::ExtractionPipeline;
use pictag::services::thumbnails::ThumbnailStore;
use pictag::workflow::{BatchCoordinator, BatchOptions};
use pictag_common::config::DataDir;
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

struct BatchFixture {
    client: Arc<ScriptedClient>,
    coordinator: BatchCoordinator,
    data_dir: DataDir,
    // Held for their drop side effects
    _catalog_dir: TempDir,
    _data_root: TempDir,
    pool: SqlitePool,
}

async fn batch_fixture(settings: ExtractionSettings) -> BatchFixture {
    let (catalog_dir, pool) = create_test_db().await.expect("catalog setup failed");
    let data_root = TempDir::new().expect("data dir setup failed");
    let data_dir = DataDir::new(data_root.path().to_path_buf());

    let client = Arc::new(ScriptedClient::new());
    let pipeline = Arc::new(ExtractionPipeline::new(
        client.clone(),
        InferenceConfig::default(),
        settings.clone(),
    ));
    let coordinator = BatchCoordinator::new(
        pool.clone(),
        pipeline,
        settings,
        data_dir.clone(),
        CancellationToken::new(),
    );

    BatchFixture {
        client,
        coordinator,
        data_dir,
        _catalog_dir: catalog_dir,
        _data_root: data_root,
        pool,
    }
}

fn sequential_options() -> BatchOptions {
    BatchOptions {
        update_existing: false,
        parallelism: 1,
    }
}

fn failure_log_files(data_dir: &DataDir) -> Vec<std::path::PathBuf> {
    let mut logs: Vec<_> = std::fs::read_dir(data_dir.root())
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| {
                    p.file_name()
                        .and_then(|n| n.to_str())
                        .map(|n| n.starts_with("failed-image-processing-"))
                        .unwrap_or(false)
                })
                .collect()
        })
        .unwrap_or_default();
    logs.sort();
    logs
}

fn canonical_str(path: &Path) -> String {
    path.canonicalize()
        .expect("fixture path should canonicalize")
        .to_string_lossy()
        .into_owned()
}

#[tokio::test]
async fn test_one_bad_file_does_not_stop_the_batch() {
    let fixture = batch_fixture(ExtractionSettings::default()).await;
    let images_dir = TempDir::new().unwrap();

    // Sorted scan order puts the corrupt file last
    for i in 1..=4 {
        write_test_png(images_dir.path(), &format!("photo-{:02}.png", i), 20, 20);
        fixture.client.push_chat(fields_json(
            &["sample"],
            &format!("Test photo number {}", i),
            &format!("Photo {}", i),
            false,
        ));
    }
    write_corrupt_image(images_dir.path(), "zz-broken.png");

    let summary = fixture
        .coordinator
        .run(images_dir.path(), &sequential_options())
        .await
        .expect("batch should complete");

    assert_eq!(summary.total, 5);
    assert_eq!(summary.succeeded, 4);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.skipped, 0);
    assert_eq!(images::count_images(&fixture.pool).await.unwrap(), 4);

    // One failure line, carrying the stable category label
    let logs = failure_log_files(&fixture.data_dir);
    assert_eq!(logs.len(), 1);
    let content = std::fs::read_to_string(&logs[0]).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains("zz-broken.png"));
    assert!(lines[0].ends_with("\"ReadError\""));
}

#[tokio::test]
async fn test_no_failure_log_written_for_clean_run() {
    let fixture = batch_fixture(ExtractionSettings::default()).await;
    let images_dir = TempDir::new().unwrap();
    write_test_png(images_dir.path(), "ok.png", 16, 16);
    fixture
        .client
        .push_chat(fields_json(&["ok"], "Fine", "Fine", false));

    fixture
        .coordinator
        .run(images_dir.path(), &sequential_options())
        .await
        .expect("batch should complete");

    assert!(failure_log_files(&fixture.data_dir).is_empty());
}

#[tokio::test]
async fn test_existing_image_skipped_without_update_flag() {
    let fixture = batch_fixture(ExtractionSettings::default()).await;
    let images_dir = TempDir::new().unwrap();
    let path = write_test_png(images_dir.path(), "cat.png", 16, 16);
    fixture
        .client
        .push_chat(fields_json(&["cat"], "A cat", "Cat", false));

    let first = fixture
        .coordinator
        .run(images_dir.path(), &sequential_options())
        .await
        .unwrap();
    assert_eq!(first.succeeded, 1);

    // Re-run without the flag: nothing scripted, so an inference call
    // would panic inside the scripted client
    let second = fixture
        .coordinator
        .run(images_dir.path(), &sequential_options())
        .await
        .unwrap();

    assert_eq!(second.total, 1);
    assert_eq!(second.skipped, 1);
    assert_eq!(second.succeeded, 0);
    assert_eq!(images::count_images(&fixture.pool).await.unwrap(), 1);

    let record = images::find_by_path(&fixture.pool, &canonical_str(&path))
        .await
        .unwrap()
        .expect("record should exist");
    assert_eq!(record.description.as_deref(), Some("A cat"));
}

#[tokio::test]
async fn test_update_flag_overwrites_existing_record() {
    let fixture = batch_fixture(ExtractionSettings::default()).await;
    let images_dir = TempDir::new().unwrap();
    let path = write_test_png(images_dir.path(), "dog.png", 16, 16);

    fixture
        .client
        .push_chat(fields_json(&["dog"], "First analysis", "Dog", false));
    fixture
        .coordinator
        .run(images_dir.path(), &sequential_options())
        .await
        .unwrap();

    fixture.client.push_chat(fields_json(
        &["dog", "puppy"],
        "Second analysis",
        "Puppy",
        false,
    ));
    let options = BatchOptions {
        update_existing: true,
        parallelism: 1,
    };
    let summary = fixture
        .coordinator
        .run(images_dir.path(), &options)
        .await
        .unwrap();

    assert_eq!(summary.succeeded, 1);
    assert_eq!(images::count_images(&fixture.pool).await.unwrap(), 1);

    let record = images::find_by_path(&fixture.pool, &canonical_str(&path))
        .await
        .unwrap()
        .expect("record should exist");
    assert_eq!(record.description.as_deref(), Some("Second analysis"));
    assert_eq!(record.short_title.as_deref(), Some("Puppy"));
    assert_eq!(record.tags, vec!["dog", "puppy"]);
}

#[tokio::test]
async fn test_parallel_run_catalogs_every_file() {
    let fixture = batch_fixture(ExtractionSettings::default()).await;
    let images_dir = TempDir::new().unwrap();
    for i in 1..=6 {
        write_test_png(images_dir.path(), &format!("img-{}.png", i), 12, 12);
        fixture.client.push_chat(fields_json(
            &["batch"],
            "Parallel test image",
            "Image",
            false,
        ));
    }

    let options = BatchOptions {
        update_existing: false,
        parallelism: 4,
    };
    let summary = fixture
        .coordinator
        .run(images_dir.path(), &options)
        .await
        .unwrap();

    assert_eq!(summary.total, 6);
    assert_eq!(summary.succeeded, 6);
    assert_eq!(summary.failed, 0);
    assert_eq!(images::count_images(&fixture.pool).await.unwrap(), 6);
    assert_eq!(fixture.client.chat_calls(), 6);
}

#[tokio::test]
async fn test_single_file_root_catalogs_one_image() {
    let fixture = batch_fixture(ExtractionSettings::default()).await;
    let images_dir = TempDir::new().unwrap();
    let path = write_test_png(images_dir.path(), "solo.png", 16, 16);
    fixture
        .client
        .push_chat(fields_json(&["solo"], "A single image", "Solo", false));

    let summary = fixture
        .coordinator
        .run(&path, &sequential_options())
        .await
        .unwrap();

    assert_eq!(summary.total, 1);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(images::count_images(&fixture.pool).await.unwrap(), 1);
}

#[tokio::test]
async fn test_missing_root_fails_before_processing() {
    let fixture = batch_fixture(ExtractionSettings::default()).await;

    let result = fixture
        .coordinator
        .run(Path::new("/no/such/directory"), &sequential_options())
        .await;

    assert!(result.is_err());
    assert_eq!(fixture.client.chat_calls(), 0);
    assert_eq!(images::count_images(&fixture.pool).await.unwrap(), 0);
}

#[tokio::test]
async fn test_thumbnail_written_and_recorded() {
    let fixture = batch_fixture(ExtractionSettings::default()).await;
    let images_dir = TempDir::new().unwrap();
    let path = write_test_png(images_dir.path(), "thumb.png", 400, 300);
    fixture
        .client
        .push_chat(fields_json(&["thumb"], "Thumbnail test", "Thumb", false));

    fixture
        .coordinator
        .run(images_dir.path(), &sequential_options())
        .await
        .unwrap();

    let full_path = canonical_str(&path);
    let expected_name = ThumbnailStore::thumbnail_name(&full_path);
    let thumb_path = fixture.data_dir.thumbnails_dir().join(&expected_name);
    assert!(thumb_path.exists(), "thumbnail file should exist");

    let record = images::find_by_path(&fixture.pool, &full_path)
        .await
        .unwrap()
        .expect("record should exist");
    assert_eq!(record.thumbnail_name.as_deref(), Some(expected_name.as_str()));
}

#[tokio::test]
async fn test_thumbnails_disabled_leaves_no_files() {
    let settings = ExtractionSettings {
        keep_thumbnails: false,
        ..ExtractionSettings::default()
    };
    let fixture = batch_fixture(settings).await;
    let images_dir = TempDir::new().unwrap();
    let path = write_test_png(images_dir.path(), "plain.png", 64, 64);
    fixture
        .client
        .push_chat(fields_json(&["plain"], "No thumbnail", "Plain", false));

    fixture
        .coordinator
        .run(images_dir.path(), &sequential_options())
        .await
        .unwrap();

    let thumbs_dir = fixture.data_dir.thumbnails_dir();
    let thumb_count = std::fs::read_dir(&thumbs_dir)
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(thumb_count, 0);

    let record = images::find_by_path(&fixture.pool, &canonical_str(&path))
        .await
        .unwrap()
        .expect("record should exist");
    assert_eq!(record.thumbnail_name, None);
}

#[tokio::test]
async fn test_cancelled_batch_schedules_nothing() {
    let (_catalog_dir, pool) = create_test_db().await.unwrap();
    let data_root = TempDir::new().unwrap();
    let data_dir = DataDir::new(data_root.path().to_path_buf());

    let client = Arc::new(ScriptedClient::new());
    let pipeline = Arc::new(ExtractionPipeline::new(
        client.clone(),
        InferenceConfig::default(),
        ExtractionSettings::default(),
    ));
    let cancel = CancellationToken::new();
    cancel.cancel();
    let coordinator = BatchCoordinator::new(
        pool.clone(),
        pipeline,
        ExtractionSettings::default(),
        data_dir,
        cancel,
    );

    let images_dir = TempDir::new().unwrap();
    write_test_png(images_dir.path(), "a.png", 16, 16);
    write_test_png(images_dir.path(), "b.png", 16, 16);

    let summary = coordinator
        .run(images_dir.path(), &sequential_options())
        .await
        .unwrap();

    assert_eq!(summary.total, 2);
    assert_eq!(summary.succeeded, 0);
    assert_eq!(summary.failed, 0);
    assert_eq!(client.chat_calls(), 0);
    assert_eq!(images::count_images(&pool).await.unwrap(), 0);
}

#[tokio::test]
async fn test_normalized_tags_persisted_sorted_and_deduplicated() {
    let fixture = batch_fixture(ExtractionSettings::default()).await;
    let images_dir = TempDir::new().unwrap();
    let path = write_test_png(images_dir.path(), "farm.png", 16, 16);
    fixture.client.push_chat(fields_json(
        &["Chicken", "chicken", "BIRD", "  "],
        "A chicken in a yard",
        "Chicken",
        false,
    ));

    fixture
        .coordinator
        .run(images_dir.path(), &sequential_options())
        .await
        .unwrap();

    let record = images::find_by_path(&fixture.pool, &canonical_str(&path))
        .await
        .unwrap()
        .expect("record should exist");
    assert_eq!(record.tags, vec!["bird", "chicken"]);
}

#[tokio::test]
async fn test_person_tag_added_for_person_indicators() {
    let fixture = batch_fixture(ExtractionSettings::default()).await;
    let images_dir = TempDir::new().unwrap();
    let path = write_test_png(images_dir.path(), "crowd.png", 16, 16);
    fixture.client.push_chat(fields_json(
        &["woman", "market"],
        "A woman at a market stall",
        "Market",
        false,
    ));

    fixture
        .coordinator
        .run(images_dir.path(), &sequential_options())
        .await
        .unwrap();

    let record = images::find_by_path(&fixture.pool, &canonical_str(&path))
        .await
        .unwrap()
        .expect("record should exist");
    assert_eq!(record.tags, vec!["market", "person", "woman"]);
}
