mod common;

use std::collections::HashSet;
use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use common::{CollectingObserver, Library, QuarterEncoder, RecordingStore, sorted};
use music_batch_converter::batch::CANCELLED_MESSAGE;
use music_batch_converter::{Action, BatchStatistics, NoopObserver, TargetCodec};
use rstest::rstest;

#[test]
fn test_every_file_gets_exactly_one_result() {
    let lib = Library::mixed();
    let files = lib.files();
    assert_eq!(files.len(), 9, "cover.jpg is not audio");

    let observer = CollectingObserver::default();
    let outcome = lib
        .orchestrator(QuarterEncoder::default(), RecordingStore::default(), 4)
        .run(&files, TargetCodec::Mp3, 192, &observer)
        .unwrap();

    assert_eq!(outcome.results.len(), files.len());
    let sources: HashSet<_> = outcome.results.iter().map(|r| &r.source_path).collect();
    assert_eq!(sources, files.iter().collect());

    let stats = outcome.statistics();
    assert_eq!(stats.converted + stats.copied + stats.errors, files.len());
    assert_eq!(stats.converted, 6);
    assert_eq!(stats.copied, 2);
    assert_eq!(stats.errors, 1);
    assert!(!outcome.cancelled);

    assert_eq!(*observer.started.borrow(), Some(9));
    let progress = observer.progress.borrow();
    assert_eq!(progress.len(), 9);
    for (i, (completed, total)) in progress.iter().enumerate() {
        assert_eq!(*completed, i + 1);
        assert_eq!(*total, 9);
    }
}

#[test]
fn test_actions_and_output_layout() {
    let lib = Library::mixed();
    let outcome = lib
        .orchestrator(QuarterEncoder::default(), RecordingStore::default(), 2)
        .run(&lib.files(), TargetCodec::Aac, 192, &NoopObserver)
        .unwrap();

    for result in &outcome.results {
        match result.action {
            Action::Converted => {
                assert_eq!(result.target_path.extension().unwrap(), "m4a");
                assert!(result.target_path.starts_with(&lib.target));
                assert!(result.target_path.is_file());
                assert_eq!(
                    fs::metadata(&result.target_path).unwrap().len(),
                    result.target_size
                );
            }
            Action::Copied => {
                assert_eq!(
                    fs::read(&result.target_path).unwrap(),
                    fs::read(&result.source_path).unwrap()
                );
            }
            Action::Error => {
                assert_eq!(result.target_path, result.source_path);
                assert_eq!(result.target_size, 0);
            }
        }
    }
    assert!(lib.target.join("Artist/Album/01 intro.m4a").is_file());
    assert!(lib.target.join("Various/old.m4a").is_file());
}

#[test]
fn test_probe_failure_is_isolated() {
    let lib = Library::mixed();
    let outcome = lib
        .orchestrator(QuarterEncoder::default(), RecordingStore::default(), 3)
        .run(&lib.files(), TargetCodec::Mp3, 192, &NoopObserver)
        .unwrap();

    let errors: Vec<_> = outcome
        .results
        .iter()
        .filter(|r| r.action == Action::Error)
        .collect();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].source_path.ends_with("broken.m4a"));
    assert_eq!(
        errors[0].error_message.as_deref(),
        Some("No audio stream found in file")
    );
    assert!(errors[0].source_format.is_none());
}

#[rstest]
fn test_worker_count_does_not_change_results(
    #[values(TargetCodec::Mp3, TargetCodec::Opus, TargetCodec::Flac)] codec: TargetCodec,
) {
    let mut runs = Vec::new();
    for threads in [1, 4, 16] {
        let lib = Library::mixed();
        let outcome = lib
            .orchestrator(QuarterEncoder::default(), RecordingStore::default(), threads)
            .run(&lib.files(), codec, codec.effective_bitrate(192), &NoopObserver)
            .unwrap();
        let stats = outcome.statistics();
        // strip the per-run temp dir so results are comparable across libraries
        let normalized: Vec<_> = sorted(outcome.results)
            .into_iter()
            .map(|r| {
                (
                    r.source_path.strip_prefix(&lib.source).unwrap().to_path_buf(),
                    r.action,
                    r.source_size,
                    r.target_size,
                    r.source_format,
                    r.error_message,
                )
            })
            .collect();
        runs.push((normalized, stats));
    }
    assert_eq!(runs[0], runs[1]);
    assert_eq!(runs[0], runs[2]);
}

#[test]
fn test_dry_run_leaves_target_untouched() {
    let lib = Library::mixed();
    let encoder = QuarterEncoder::default();
    let store = RecordingStore::default();
    let orchestrator = music_batch_converter::BatchOrchestrator::new(
        lib.processor(encoder.clone()).dry_run(true),
        Box::new(store.clone()),
        4,
    );
    let outcome = orchestrator
        .run(&lib.files(), TargetCodec::Mp3, 192, &NoopObserver)
        .unwrap();

    assert!(!lib.target.exists());
    assert_eq!(encoder.calls.load(Ordering::SeqCst), 0);
    assert!(store.applied.lock().unwrap().is_empty());

    let stats = outcome.statistics();
    assert_eq!((stats.converted, stats.copied, stats.errors), (6, 2, 1));
    // only the broken file contributes a saving: it has no projected output
    assert_eq!(stats.space_saved, "broken".len() as i64);
    for r in outcome.results.iter().filter(|r| r.action != Action::Error) {
        assert_eq!(r.target_size, r.source_size);
        assert!(r.target_path.starts_with(&lib.target));
    }
}

#[test]
fn test_metadata_applied_once_per_converted_file() {
    let lib = Library::mixed();
    let store = RecordingStore::default();
    let observer = CollectingObserver::default();
    let outcome = lib
        .orchestrator(QuarterEncoder::default(), store.clone(), 4)
        .run(&lib.files(), TargetCodec::Mp3, 192, &observer)
        .unwrap();

    let mut applied = store.applied.lock().unwrap().clone();
    applied.sort();
    let mut expected: Vec<_> = outcome
        .results
        .iter()
        .filter(|r| r.action == Action::Converted)
        .filter(|r| !r.source_path.ends_with("Various/notag.flac"))
        .map(|r| r.target_path.clone())
        .collect();
    expected.sort();
    assert_eq!(applied, expected);

    // the failed tag copy is reported but the file still counts as converted
    let warnings = observer.warnings.borrow();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("notag.mp3"));
    let notag = outcome
        .results
        .iter()
        .find(|r| r.source_path.ends_with("Various/notag.flac"))
        .unwrap();
    assert_eq!(notag.action, Action::Converted);
}

#[test]
fn test_cancel_before_start_marks_everything() {
    let lib = Library::mixed();
    let files = lib.files();
    let cancel = Arc::new(AtomicBool::new(true));
    let encoder = QuarterEncoder::default();
    let outcome = lib
        .orchestrator(encoder.clone(), RecordingStore::default(), 4)
        .with_cancel_flag(cancel)
        .run(&files, TargetCodec::Mp3, 192, &NoopObserver)
        .unwrap();

    assert!(outcome.cancelled);
    assert_eq!(outcome.results.len(), files.len());
    assert!(outcome.results.iter().all(|r| r.action == Action::Error
        && r.error_message.as_deref() == Some(CANCELLED_MESSAGE)));
    assert_eq!(encoder.calls.load(Ordering::SeqCst), 0);
    assert!(!lib.target.exists());
}

#[test]
fn test_cancel_mid_batch_keeps_partial_results() {
    let lib = Library::new(&[
        ("a.flac", "flac:900000"),
        ("b.flac", "flac:900000"),
        ("c.flac", "flac:900000"),
        ("d.flac", "flac:900000"),
        ("e.flac", "flac:900000"),
    ]);
    let files = lib.files();
    let cancel = Arc::new(AtomicBool::new(false));
    let encoder = QuarterEncoder {
        cancel_after_first: Some(Arc::clone(&cancel)),
        ..Default::default()
    };
    let outcome = lib
        .orchestrator(encoder.clone(), RecordingStore::default(), 1)
        .with_cancel_flag(Arc::clone(&cancel))
        .run(&files, TargetCodec::Mp3, 320, &NoopObserver)
        .unwrap();

    assert!(outcome.cancelled);
    assert_eq!(outcome.results.len(), 5);
    assert_eq!(encoder.calls.load(Ordering::SeqCst), 1);
    let stats = outcome.statistics();
    assert_eq!(stats.converted, 1);
    assert_eq!(stats.errors, 4);
    assert!(outcome
        .results
        .iter()
        .filter(|r| r.action == Action::Error)
        .all(|r| r.error_message.as_deref() == Some(CANCELLED_MESSAGE)));
}

#[test]
fn test_worker_panic_becomes_error_result() {
    let lib = Library::new(&[
        ("ok.flac", "flac:900000"),
        ("boom.flac", "flac:900000 panic"),
        ("fine.mp3", "mp3:128000"),
    ]);
    let files = lib.files();
    let outcome = lib
        .orchestrator(QuarterEncoder::default(), RecordingStore::default(), 2)
        .run(&files, TargetCodec::Mp3, 320, &NoopObserver)
        .unwrap();

    assert_eq!(outcome.results.len(), 3);
    let boom = outcome
        .results
        .iter()
        .find(|r| r.source_path.ends_with("boom.flac"))
        .unwrap();
    assert_eq!(boom.action, Action::Error);
    assert!(
        boom.error_message
            .as_deref()
            .unwrap()
            .starts_with("Worker panicked: encoder blew up")
    );
    let stats = outcome.statistics();
    assert_eq!((stats.converted, stats.copied, stats.errors), (1, 1, 1));
}

#[test]
fn test_statistics_match_results() {
    let lib = Library::mixed();
    let outcome = lib
        .orchestrator(QuarterEncoder::default(), RecordingStore::default(), 4)
        .run(&lib.files(), TargetCodec::Opus, 128, &NoopObserver)
        .unwrap();
    let stats = BatchStatistics::from_results(&outcome.results);
    let source: u64 = outcome.results.iter().map(|r| r.source_size).sum();
    let target: u64 = outcome.results.iter().map(|r| r.target_size).sum();
    assert_eq!(stats.total_source_size, source);
    assert_eq!(stats.total_target_size, target);
    assert_eq!(stats.space_saved, source as i64 - target as i64);
    assert!(stats.space_saved > 0);
}

#[rstest]
#[case::flac_and_mp3(&[("a.flac", "flac:900000 padding"), ("a.mp3", "mp3:128000")], TargetCodec::Mp3, "a.mp3", "a.flac")]
#[case::m4a_and_aac(&[("x.aac", "aac:128000"), ("x.m4a", "aac:128000 padding")], TargetCodec::Aac, "x.m4a", "x.aac")]
fn test_shared_output_path_has_one_owner(
    #[case] files: &[(&str, &str)],
    #[case] codec: TargetCodec,
    #[case] loser: &str,
    #[case] owner: &str,
) {
    let lib = Library::new(files);
    let store = RecordingStore::default();
    let observer = CollectingObserver::default();
    let outcome = lib
        .orchestrator(QuarterEncoder::default(), store.clone(), 2)
        .run(&lib.files(), codec, 320, &observer)
        .unwrap();

    assert_eq!(outcome.results.len(), 2);
    assert_eq!(observer.progress.borrow().len(), 2);
    let (errors, done): (Vec<_>, Vec<_>) = outcome
        .results
        .iter()
        .partition(|r| r.action == Action::Error);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].source_path.ends_with(loser));
    assert_eq!(errors[0].target_path, errors[0].source_path);
    assert_eq!(errors[0].target_size, 0);
    let message = errors[0].error_message.as_deref().unwrap();
    assert!(message.contains("already used by"), "{message}");
    assert!(message.contains(owner), "{message}");

    assert_eq!(done.len(), 1);
    assert!(done[0].source_path.ends_with(owner));
    assert_eq!(fs::metadata(&done[0].target_path).unwrap().len(), done[0].target_size);
}
