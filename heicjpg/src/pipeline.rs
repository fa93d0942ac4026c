//! Batch conversion: enumerate, dispatch to the worker pool, collect outcomes

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use rayon::iter::{IndexedParallelIterator, IntoParallelIterator, ParallelIterator};

use crate::config::ConvertConfig;
use crate::error::ConvertError;
use crate::image::{self, Codec, DefaultCodec};
use crate::job::{Job, JobState};
use crate::scan;

#[derive(Debug)]
pub enum ProgressEvent {
    /// Enumeration finished, `total` jobs are about to be dispatched
    Started { total: usize },
    Registered { id: usize, source: PathBuf },
    Stage { id: usize, state: JobState },
    /// Every job has reached `Done` or `Failed`
    BatchComplete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Converted {
    pub dimensions: (u32, u32),
    pub quality: u8,
    pub bytes: usize,
    pub oversized: bool,
}

#[derive(Debug)]
pub struct JobOutcome {
    pub job: Job,
    pub result: Result<Converted, ConvertError>,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<JobOutcome>,
    pub elapsed: Duration,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.succeeded()
    }

    /// Written, but still above the size budget
    pub fn oversized(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.result, Ok(Converted { oversized: true, .. })))
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&Job, &ConvertError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (&o.job, e)))
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }
}

pub struct Converter<C = DefaultCodec> {
    config: ConvertConfig,
    codec: C,
}

impl Converter<DefaultCodec> {
    pub fn new(config: ConvertConfig) -> Self {
        Self::with_codec(config, DefaultCodec)
    }
}

impl<C: Codec> Converter<C> {
    pub fn with_codec(config: ConvertConfig, codec: C) -> Self {
        Converter { config, codec }
    }

    pub fn config(&self) -> &ConvertConfig {
        &self.config
    }

    /// One job per HEIC file below `source_dir`, sorted by file name.
    ///
    /// Every job gets its own destination. Sources that would share one
    /// (`IMG.heic` next to `IMG.HEIC`) are numbered in sort order.
    pub fn jobs(&self, source_dir: &Path, destination_dir: &Path) -> Vec<Job> {
        let mut jobs: Vec<Job> = scan::heic_files(source_dir, self.config.recursive)
            .map(|source| Job::new(source, source_dir, destination_dir))
            .collect();

        jobs.sort_by(|a, b| {
            sort_key(&a.source)
                .cmp(&sort_key(&b.source))
                .then_with(|| a.source.cmp(&b.source))
        });

        // compared case-insensitively, the destination may not be case-sensitive
        let mut taken = HashSet::new();
        jobs.into_iter()
            .map(|job| {
                let mut unique = job.clone();
                let mut n = 0;
                while !taken.insert(sort_key(&unique.destination)) {
                    n += 1;
                    unique = job.clone().numbered(n);
                }
                if n > 0 {
                    log::warn!(
                        "{} collides with another output, writing {}",
                        job.destination.display(),
                        unique.destination.display()
                    );
                }
                unique
            })
            .collect()
    }

    pub fn run(&self, source_dir: &Path, destination_dir: &Path) -> Result<BatchReport> {
        self.run_with_progress(source_dir, destination_dir, None)
    }

    /// Convert every HEIC file in `source_dir` into `destination_dir`.
    ///
    /// Per-file failures end up in the report. Only problems that stop the
    /// batch from starting at all (missing source, destination not creatable,
    /// no worker pool) are returned as errors.
    pub fn run_with_progress(
        &self,
        source_dir: &Path,
        destination_dir: &Path,
        events: Option<&mpsc::Sender<ProgressEvent>>,
    ) -> Result<BatchReport> {
        let start = Instant::now();
        let send = |event| {
            if let Some(tx) = events {
                // a dropped receiver only means nobody is watching
                tx.send(event).ok();
            }
        };

        if !source_dir.is_dir() {
            anyhow::bail!("Input directory does not exist: {}", source_dir.display());
        }

        // created once up front so workers never race on it
        fs::create_dir_all(destination_dir).with_context(|| {
            format!(
                "Failed to create output directory {}",
                destination_dir.display()
            )
        })?;

        let jobs = self.jobs(source_dir, destination_dir);
        send(ProgressEvent::Started { total: jobs.len() });

        if jobs.is_empty() {
            log::info!("No HEIC files found in {}", source_dir.display());
            send(ProgressEvent::BatchComplete);
            return Ok(BatchReport {
                outcomes: Vec::new(),
                elapsed: start.elapsed(),
            });
        }

        for (id, job) in jobs.iter().enumerate() {
            send(ProgressEvent::Registered {
                id,
                source: job.source.clone(),
            });
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.threads.unwrap_or(0))
            .thread_name(|i| format!("heicjpg-worker-{i}"))
            .build()
            .context("Failed to build worker pool")?;

        log::info!(
            "Found {} HEIC files, converting with {} threads",
            jobs.len(),
            pool.current_num_threads()
        );

        let outcomes: Vec<JobOutcome> = pool.install(|| {
            jobs.into_par_iter()
                .enumerate()
                .map(|(id, job)| {
                    let result = self.convert(&job, |state| {
                        send(ProgressEvent::Stage { id, state });
                    });
                    JobOutcome { job, result }
                })
                .collect()
        });

        send(ProgressEvent::BatchComplete);

        let report = BatchReport {
            outcomes,
            elapsed: start.elapsed(),
        };

        log::info!(
            "Processing complete: {} converted, {} failed in {:.1?}",
            report.succeeded(),
            report.failed(),
            report.elapsed
        );

        Ok(report)
    }

    /// Run one job through every stage, reporting each state it enters.
    ///
    /// Ends with exactly one of `Done` or `Failed`.
    pub fn convert<F>(&self, job: &Job, mut on_state: F) -> Result<Converted, ConvertError>
    where
        F: FnMut(JobState),
    {
        let mut enter = |state: JobState| {
            log::debug!("{}: {state}", job.file_name());
            on_state(state);
        };

        match self.convert_stages(job, &mut enter) {
            Ok(converted) => {
                enter(JobState::Done);
                log::debug!(
                    "Success: {} -> {} ({}x{}, quality {}, {} KB)",
                    job.file_name(),
                    job.destination.display(),
                    converted.dimensions.0,
                    converted.dimensions.1,
                    converted.quality,
                    converted.bytes / 1024
                );
                Ok(converted)
            }
            Err(e) => {
                enter(JobState::Failed);
                log::warn!("{e}");
                Err(e)
            }
        }
    }

    fn convert_stages(
        &self,
        job: &Job,
        on_state: &mut impl FnMut(JobState),
    ) -> Result<Converted, ConvertError> {
        let source = &job.source;

        on_state(JobState::Decoding);
        let data = fs::read(source).map_err(|e| ConvertError::Read {
            path: source.clone(),
            source: e,
        })?;
        let img = self.codec.decode(&data).map_err(|e| ConvertError::Decode {
            path: source.clone(),
            source: e,
        })?;
        drop(data);

        on_state(JobState::Adjusting);
        let img = image::fit_within(img, self.config.max_side).map_err(|e| {
            ConvertError::Resize {
                path: source.clone(),
                source: e,
            }
        })?;
        let img = image::enhance(&img);

        on_state(JobState::Encoding);
        let encoded = image::encode_within_budget(
            &self.codec,
            &img,
            self.config.max_bytes,
            &self.config.quality,
        )
        .map_err(|e| ConvertError::Encode {
            path: source.clone(),
            source: e,
        })?;

        if encoded.oversized {
            log::warn!(
                "Could not compress {} below {} KB, keeping {} KB at quality {}",
                job.file_name(),
                self.config.max_bytes / 1024,
                encoded.data.len() / 1024,
                encoded.quality
            );
        }

        on_state(JobState::Writing);
        write_atomically(&job.destination, &encoded.data).map_err(|e| ConvertError::Write {
            path: job.destination.clone(),
            source: e,
        })?;

        if self.config.preserve_times {
            if let Err(e) = copy_file_times(source, &job.destination) {
                log::warn!(
                    "Could not copy timestamps to {}: {e}",
                    job.destination.display()
                );
            }
        }

        Ok(Converted {
            dimensions: img.dimensions(),
            quality: encoded.quality,
            bytes: encoded.data.len(),
            oversized: encoded.oversized,
        })
    }
}

fn sort_key(path: &Path) -> String {
    path.to_string_lossy().to_lowercase()
}

/// Write through a temporary sibling and rename it into place, so the
/// destination is either absent or complete.
fn write_atomically(destination: &Path, data: &[u8]) -> std::io::Result<()> {
    let dir = destination
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or(Path::new("."));

    // subdirectories in recursive mode; tolerates concurrent creation
    fs::create_dir_all(dir)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".heicjpg-")
        .suffix(".part")
        .tempfile_in(dir)?;
    tmp.write_all(data)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(fs::Permissions::from_mode(0o644))?;
    }

    tmp.persist(destination).map_err(|e| e.error)?;
    Ok(())
}

fn copy_file_times(source: &Path, destination: &Path) -> std::io::Result<()> {
    let metadata = fs::metadata(source)?;
    let times = fs::FileTimes::new()
        .set_accessed(metadata.accessed()?)
        .set_modified(metadata.modified()?);

    fs::File::options()
        .write(true)
        .open(destination)?
        .set_times(times)
}
