//! Fans file processing out over a worker pool and gathers the results.
//!
//! Workers send finished results over a channel to a single consumer on the
//! calling thread. Only the consumer touches the result list, the completed
//! counter and the observer.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info, warn};
use rayon::ThreadPoolBuilder;

use crate::codec::TargetCodec;
use crate::error::Error;
use crate::metadata::{self, MetadataStore};
use crate::processor::{Action, ConversionRequest, ConversionResult, FileProcessor, file_size};
use crate::stats::BatchStatistics;

pub const CANCELLED_MESSAGE: &str = "Cancelled before processing";

/// Receives progress from the orchestrator. All calls happen on the thread
/// that called [`BatchOrchestrator::run`], in completion order.
pub trait BatchObserver {
    fn on_start(&self, _total: usize) {}

    /// Called once per file, after its metadata has been handled
    fn on_result(&self, result: &ConversionResult, completed: usize, total: usize);

    /// Non-fatal per-file problems, e.g. tags that could not be written
    fn on_warning(&self, message: &str) {
        warn!("{}", message);
    }
}

/// Observer that ignores progress
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl BatchObserver for NoopObserver {
    fn on_result(&self, _: &ConversionResult, _: usize, _: usize) {}
}

/// Results of a batch, in completion order
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub results: Vec<ConversionResult>,
    /// Set when cancellation was requested before every file started
    pub cancelled: bool,
}

impl BatchOutcome {
    pub fn statistics(&self) -> BatchStatistics {
        BatchStatistics::from_results(&self.results)
    }
}

struct Completed {
    result: ConversionResult,
    warnings: Vec<String>,
}

pub struct BatchOrchestrator {
    processor: FileProcessor,
    metadata: Box<dyn MetadataStore>,
    num_threads: usize,
    cancel: Arc<AtomicBool>,
}

impl BatchOrchestrator {
    pub fn new(
        processor: FileProcessor,
        metadata: Box<dyn MetadataStore>,
        num_threads: usize,
    ) -> Self {
        Self {
            processor,
            metadata,
            num_threads: num_threads.max(1),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shares an externally owned cancellation flag, e.g. one set by a
    /// Ctrl-C handler.
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    /// Processes every file and returns exactly one result per input path.
    ///
    /// Files not yet started when cancellation is requested are reported as
    /// errors; files in flight run to completion. When several sources map to
    /// the same output, the first in path order owns it and the rest are
    /// reported as errors without being processed.
    pub fn run(
        &self,
        files: &[PathBuf],
        codec: TargetCodec,
        bitrate_kbps: u32,
        observer: &dyn BatchObserver,
    ) -> Result<BatchOutcome, Error> {
        let total = files.len();
        observer.on_start(total);
        if total == 0 {
            return Ok(BatchOutcome::default());
        }

        let pool = ThreadPoolBuilder::new()
            .num_threads(self.num_threads)
            .thread_name(|i| format!("convert-{i}"))
            .build()?;
        info!(
            "Processing {} files with {} worker(s)...",
            total, self.num_threads
        );

        let (tx, rx) = crossbeam_channel::unbounded::<Completed>();
        let mut results = Vec::with_capacity(total);

        let conflicts = self.output_conflicts(files, codec);

        pool.in_place_scope(|scope| {
            for path in files {
                if let Some(e) = conflicts.get(path.as_path()) {
                    warn!("Skipping {:?}: {}", path, e);
                    let _ = tx.send(Completed {
                        result: ConversionResult::failed(path, file_size(path), e.to_string()),
                        warnings: Vec::new(),
                    });
                    continue;
                }
                let tx = tx.clone();
                let request = ConversionRequest::new(path.clone(), codec, bitrate_kbps);
                scope.spawn(move |_| {
                    let completed = self.run_unit(&request);
                    // the receiver outlives every sender
                    let _ = tx.send(completed);
                });
            }
            drop(tx);

            for completed in rx.iter() {
                for message in &completed.warnings {
                    observer.on_warning(message);
                }
                results.push(completed.result);
                if let Some(result) = results.last() {
                    debug!(
                        "[{}/{}] {} {:?}",
                        results.len(),
                        total,
                        result.action,
                        result.file_name()
                    );
                    observer.on_result(result, results.len(), total);
                }
            }
        });

        let cancelled = self.cancel.load(Ordering::SeqCst);
        if cancelled {
            warn!("Batch cancelled; partial results kept");
        }
        Ok(BatchOutcome { results, cancelled })
    }

    /// Sources whose output is already claimed by an earlier source
    fn output_conflicts<'a>(
        &self,
        files: &'a [PathBuf],
        codec: TargetCodec,
    ) -> HashMap<&'a Path, Error> {
        let mut ordered: Vec<&Path> = files.iter().map(PathBuf::as_path).collect();
        ordered.sort();
        ordered.dedup();

        let mut owners: HashMap<PathBuf, &Path> = HashMap::new();
        let mut conflicts = HashMap::new();
        for source in ordered {
            // unmappable paths fail inside the processor with their own message
            let Ok(output) = self.processor.output_path(source, codec) else {
                continue;
            };
            match owners.get(&output) {
                Some(owner) => {
                    conflicts.insert(
                        source,
                        Error::OutputConflict {
                            output,
                            owner: owner.to_path_buf(),
                        },
                    );
                }
                None => {
                    owners.insert(output, source);
                }
            }
        }
        conflicts
    }

    fn run_unit(&self, request: &ConversionRequest) -> Completed {
        if self.cancel.load(Ordering::SeqCst) {
            return Completed {
                result: ConversionResult::failed(
                    &request.source_path,
                    file_size(&request.source_path),
                    CANCELLED_MESSAGE,
                ),
                warnings: Vec::new(),
            };
        }

        panic::catch_unwind(AssertUnwindSafe(|| self.process_and_tag(request))).unwrap_or_else(
            |payload| {
                let message = format!("Worker panicked: {}", panic_message(payload.as_ref()));
                warn!("{:?}: {}", request.source_path, message);
                Completed {
                    result: ConversionResult::failed(
                        &request.source_path,
                        file_size(&request.source_path),
                        message,
                    ),
                    warnings: Vec::new(),
                }
            },
        )
    }

    fn process_and_tag(&self, request: &ConversionRequest) -> Completed {
        let result = self.processor.process(request);
        let mut warnings = Vec::new();
        if result.action == Action::Converted && !self.processor.is_dry_run() {
            if let Err(e) =
                metadata::propagate(self.metadata.as_ref(), &result.source_path, &result.target_path)
            {
                let e = Error::Metadata {
                    path: result.target_path.clone(),
                    source: e,
                };
                warnings.push(e.to_string());
            }
        }
        Completed { result, warnings }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
