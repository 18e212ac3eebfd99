//! Bounded batches of molecules, analyzed in parallel, each persisted to its own CSV.

use crate::libs::holes::MoleculeGroup;
use crate::libs::kinetics::{KineticsRow, OutputColumns, PerMoleculeResult};
use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const BATCH_FILE_PREFIX: &str = "tmp_analysis_chunk_";

/// One molecule and where its consensus aligned, 0-based half-open
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoleculeJob {
    pub group: MoleculeGroup,
    pub scaffold: String,
    pub start: usize,
    pub end: usize,
}

impl MoleculeJob {
    pub fn hole_id(&self) -> u64 {
        self.group.hole_id
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    Analyzed(PerMoleculeResult),
    Failed { hole_id: u64, reason: String },
}

impl AnalysisOutcome {
    pub fn hole_id(&self) -> u64 {
        match self {
            AnalysisOutcome::Analyzed(result) => result.hole_id,
            AnalysisOutcome::Failed { hole_id, .. } => *hole_id,
        }
    }

    pub fn is_analyzed(&self) -> bool {
        matches!(self, AnalysisOutcome::Analyzed(_))
    }

    /// A failure, or a result without rows, still shows up as one placeholder row
    pub fn into_rows(self) -> Vec<KineticsRow> {
        match self {
            AnalysisOutcome::Analyzed(result) if !result.rows.is_empty() => result.rows,
            other => vec![KineticsRow::placeholder(other.hole_id())],
        }
    }
}

/// Analysis of a single molecule. Must not panic; failures are outcomes.
pub trait MoleculeAnalyzer: Sync {
    fn analyze(&self, job: &MoleculeJob) -> AnalysisOutcome;
}

impl<F> MoleculeAnalyzer for F
where
    F: Fn(&MoleculeJob) -> AnalysisOutcome + Sync,
{
    fn analyze(&self, job: &MoleculeJob) -> AnalysisOutcome {
        self(job)
    }
}

/// Contiguous batches of at most `size` items; the last one may be smaller.
///
/// An error of the underlying stream is passed on and ends the batches.
///
/// ```
/// use smsn::libs::batch::Batches;
/// let items = (0..7).map(Ok::<_, std::io::Error>);
/// let sizes: Vec<usize> = Batches::new(items, 3).map(|b| b.unwrap().len()).collect();
/// assert_eq!(sizes, vec![3, 3, 1]);
/// ```
pub struct Batches<I> {
    inner: I,
    size: usize,
    done: bool,
}

impl<I> Batches<I> {
    pub fn new(inner: I, size: usize) -> Self {
        Batches {
            inner,
            size: size.max(1),
            done: false,
        }
    }
}

impl<I, T, E> Iterator for Batches<I>
where
    I: Iterator<Item = Result<T, E>>,
{
    type Item = Result<Vec<T>, E>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut batch = Vec::with_capacity(self.size);
        while batch.len() < self.size {
            match self.inner.next() {
                Some(Ok(item)) => batch.push(item),
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                None => {
                    self.done = true;
                    break;
                }
            }
        }

        if batch.is_empty() {
            None
        } else {
            Some(Ok(batch))
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    pub workers: usize,
    pub batch_size: usize,
    pub outdir: PathBuf,
    pub columns: OutputColumns,
    pub progress: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub batches: usize,
    pub dispatched: usize,
    pub analyzed: usize,
    pub failed: usize,
    pub files: Vec<PathBuf>,
}

const TICK_SETTINGS: (&str, u64) = (r"+-x| ", 200);

fn get_progress_bar(length: u64, msg: &str) -> ProgressBar {
    let progress_bar = ProgressBar::new(length);
    if let Ok(style) = ProgressStyle::default_spinner()
        .tick_chars(TICK_SETTINGS.0)
        .template(" {spinner} {msg:<24} {pos}/{len} {wide_bar} ETA {eta_precise} ")
    {
        progress_bar.set_style(style);
    }
    progress_bar.enable_steady_tick(Duration::from_millis(TICK_SETTINGS.1));
    progress_bar.set_message(msg.to_owned());

    progress_bar
}

/// Owns the worker pool. Batch `n + 1` is only pulled once batch `n` is on disk.
pub struct Scheduler {
    pool: rayon::ThreadPool,
    options: SchedulerOptions,
}

impl Scheduler {
    pub fn new(options: SchedulerOptions) -> anyhow::Result<Self> {
        if options.workers == 0 || options.batch_size == 0 {
            anyhow::bail!(
                "workers ({}) and batch size ({}) must be positive",
                options.workers,
                options.batch_size
            );
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.workers)
            .build()
            .context("could not build the worker pool")?;

        Ok(Scheduler { pool, options })
    }

    pub fn options(&self) -> &SchedulerOptions {
        &self.options
    }

    pub fn batch_file(&self, n: usize) -> PathBuf {
        batch_file(&self.options.outdir, n)
    }

    pub fn dispatch<I, A>(&self, jobs: I, analyzer: &A) -> anyhow::Result<DispatchSummary>
    where
        I: Iterator<Item = anyhow::Result<MoleculeJob>>,
        A: MoleculeAnalyzer + ?Sized,
    {
        let progress = if self.options.progress {
            Some(get_progress_bar(0, "Analyzing molecules"))
        } else {
            None
        };

        let mut summary = DispatchSummary::default();
        for (n, batch) in Batches::new(jobs, self.options.batch_size).enumerate() {
            let batch = batch.with_context(|| {
                format!("reading the molecules of batch {}, earlier batches are kept", n)
            })?;
            if let Some(pb) = &progress {
                pb.inc_length(batch.len() as u64);
            }

            let outcomes: Vec<AnalysisOutcome> = self.pool.install(|| {
                batch
                    .par_iter()
                    .map(|job| {
                        let outcome = analyzer.analyze(job);
                        if let Some(pb) = &progress {
                            pb.inc(1);
                        }
                        outcome
                    })
                    .collect()
            });

            let analyzed = outcomes.iter().filter(|o| o.is_analyzed()).count();
            for outcome in &outcomes {
                if let AnalysisOutcome::Failed { hole_id, reason } = outcome {
                    log::warn!("Hole {} gave no data: {}", hole_id, reason);
                }
            }

            let path = self.batch_file(n);
            write_batch(&path, outcomes, &self.options.columns)?;
            log::info!(
                "Batch {}: {} molecules, {} analyzed, saved to {}",
                n,
                batch.len(),
                analyzed,
                path.display()
            );

            summary.batches += 1;
            summary.dispatched += batch.len();
            summary.analyzed += analyzed;
            summary.failed += batch.len() - analyzed;
            summary.files.push(path);
        }

        if let Some(pb) = progress {
            pb.finish_and_clear();
        }

        Ok(summary)
    }
}

pub fn batch_file(dir: &Path, n: usize) -> PathBuf {
    dir.join(format!("{}{}.csv", BATCH_FILE_PREFIX, n))
}

fn write_batch(
    path: &Path,
    outcomes: Vec<AnalysisOutcome>,
    columns: &OutputColumns,
) -> anyhow::Result<()> {
    let mut writer = crate::writer(&path.to_string_lossy())?;
    writeln!(writer, "{}", columns.header())?;
    for outcome in outcomes {
        for row in outcome.into_rows() {
            writeln!(writer, "{}", row.to_csv(columns))?;
        }
    }
    writer
        .flush()
        .with_context(|| format!("could not write {}", path.display()))?;

    Ok(())
}
