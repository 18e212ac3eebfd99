//! `smsn run`: from subreads to the compiled table.

use crate::libs::batch::{DispatchSummary, MoleculeAnalyzer, MoleculeJob, Scheduler, SchedulerOptions};
use crate::libs::ccs::CcsTable;
use crate::libs::compile::{compile_files, CompileSummary};
use crate::libs::config::{resolve_model, RunConfig};
use crate::libs::error::SmsnError;
use crate::libs::external::{call_process, check_tools, REQUIRED_TOOLS};
use crate::libs::fasta::prepare_reference;
use crate::libs::holes::{HoleGroups, Restriction};
use crate::libs::molecule::IpdAnalyzer;
use crate::libs::sam::{self, SamLines};
use anyhow::Context;
use cmd_lib::run_cmd;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub dispatch: DispatchSummary,
    pub compile: CompileSummary,
    pub tmpdir: PathBuf,
}

/// The given directory, or a new `smsn_tmpdir_*` in the working directory.
/// The flag tells whether the user supplied it.
pub fn make_tmpdir(tmpdir: Option<&Path>) -> anyhow::Result<(PathBuf, bool)> {
    match tmpdir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("could not create {}", dir.display()))?;
            Ok((intspan::absolute_path(dir)?, true))
        }
        None => {
            let dir = tempfile::Builder::new()
                .prefix("smsn_tmpdir_")
                .tempdir_in(".")
                .context("could not create a temporary directory")?
                .into_path();
            Ok((intspan::absolute_path(dir)?, false))
        }
    }
}

/// Circular consensus with permissive settings, `<tmpdir>/<movie>.CCS.bam`
pub fn recreate_ccs(subreads: &str, movie: &str, threads: usize, tmpdir: &Path) -> anyhow::Result<PathBuf> {
    let output = tmpdir.join(format!("{}.CCS.bam", movie));
    log::info!("Building the consensus of {} with {} threads", subreads, threads);
    let threads = threads.to_string();
    let out = output.to_string_lossy().to_string();
    call_process(
        "ccs",
        [
            "--minLength", "0",
            "--minIdentity", "0",
            "--minZScore", "NaN",
            "--minSnr", "1",
            "--polish",
            "--minReadScore", "0",
            "--richQVs",
            "--maxLength", "5000000",
            "--minPasses", "0",
            "--minPredictedAccuracy", "0",
            "--numThreads", threads.as_str(),
            subreads,
            out.as_str(),
        ],
    )?;

    Ok(output)
}

/// `samtools sort -n`, so that the subreads of a hole are contiguous
pub fn sort_by_name(bam: &str, output: &Path, threads: usize) -> anyhow::Result<()> {
    let output = output.to_string_lossy().to_string();
    let threads = threads.to_string();
    run_cmd!(samtools sort -n --threads $threads -o $output $bam)
        .with_context(|| format!("could not sort {} by name", bam))?;
    Ok(())
}

/// Aligns the consensus reads with blasr, best hit only
pub fn align_ccs(
    ccs: &str,
    reference: &Path,
    output: &Path,
    unaligned: &Path,
    threads: usize,
) -> anyhow::Result<()> {
    let reference = reference.to_string_lossy().to_string();
    let out = output.to_string_lossy().to_string();
    let nproc = threads.to_string();
    let unaligned = unaligned.to_string_lossy().to_string();
    call_process(
        "blasr",
        [
            ccs,
            reference.as_str(),
            "--bestn", "1",
            "--hitPolicy", "leftmost",
            "--bam",
            "--out", out.as_str(),
            "--clipping", "none",
            "--nproc", nproc.as_str(),
            "--unaligned", unaligned.as_str(),
        ],
    )?;
    log::debug!("Aligned {} on {} into {}", ccs, reference, out);

    Ok(())
}

/// Groups the sorted subreads of the kept holes and dispatches them
pub fn analyze_holes<A>(
    subreads: &str,
    header: &str,
    table: &CcsTable,
    min_subreads: usize,
    scheduler: &Scheduler,
    analyzer: &A,
) -> anyhow::Result<DispatchSummary>
where
    A: MoleculeAnalyzer + ?Sized,
{
    if table.is_empty() {
        return Err(SmsnError::EmptyResult.into());
    }

    let groups = HoleGroups::new(SamLines::open(subreads)?)
        .restrict(Restriction::new(table.hole_ids()))
        .min_subreads(min_subreads)
        .header(header);

    let jobs = groups.map(|group| {
        let group = group?;
        let aln = table
            .get(group.hole_id)
            .with_context(|| format!("no consensus alignment for hole {}", group.hole_id))?;
        Ok(MoleculeJob {
            scaffold: aln.scaffold.clone(),
            start: aln.start as usize,
            end: aln.end as usize,
            group,
        })
    });

    let summary = scheduler.dispatch(jobs, analyzer)?;
    log::info!(
        "{} molecules in {} batches: {} analyzed, {} without data",
        summary.dispatched,
        summary.batches,
        summary.analyzed,
        summary.failed
    );
    if summary.analyzed == 0 {
        return Err(SmsnError::EmptyResult.into());
    }

    Ok(summary)
}

/// `config` is expected to be validated with [`RunConfig::validate`]
pub fn run(config: RunConfig) -> anyhow::Result<RunSummary> {
    let config = config.normalize(num_cpus::get());
    let threads = config.parallel;

    let mut tools = REQUIRED_TOOLS.to_vec();
    if config.ccs.is_none() {
        tools.push("ccs");
    }
    check_tools(&tools)?;

    let (tmpdir, user_tmpdir) = make_tmpdir(config.tmpdir.as_deref())?;
    log::info!("Temporary files go to {}", tmpdir.display());

    let header = sam::read_header(&config.bam)?;
    let info = sam::parse_run_info(&header)
        .with_context(|| format!("invalid @RG header in {}", config.bam))?;
    let movie = info.movie.clone();
    log::info!("Movie {}, {} Hz", movie, info.frame_rate);

    let model = resolve_model(&config.model, config.model_dir.as_deref())?;
    log::info!("Using model {}", model.display());

    let (ref_path, reference) = prepare_reference(&config.reference, &tmpdir)?;
    log::info!("{} scaffolds in {}", reference.len(), ref_path.display());

    //----------------------------
    // Consensus
    //----------------------------
    log::info!("Step 1: consensus and sorted subreads");
    let ccs = match &config.ccs {
        Some(ccs) => {
            log::info!("Using the consensus {}, skipping ccs", ccs);
            ccs.clone()
        }
        None => recreate_ccs(&config.bam, &movie, threads, &tmpdir)?
            .to_string_lossy()
            .to_string(),
    };

    let sorted = tmpdir.join(format!("sorted_subreads_{}.bam", movie));
    sort_by_name(&config.bam, &sorted, threads)?;

    //----------------------------
    // Alignment
    //----------------------------
    log::info!("Step 2: aligning the consensus reads");
    let ccs_name = Path::new(&ccs)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| format!("{}.CCS.bam", movie));
    let aligned = tmpdir.join(format!("alignedCCS_{}", ccs_name));
    let unaligned = tmpdir.join(format!("NOTalignedCCS_{}.fasta", movie));
    align_ccs(&ccs, &ref_path, &aligned, &unaligned, threads)?;

    let table = CcsTable::from_lines(SamLines::open(&aligned.to_string_lossy())?)?;
    if table.is_empty() {
        anyhow::bail!("no consensus read in {}", aligned.display());
    }
    let table_csv = tmpdir.join(format!("aligned_CCS_{}.csv", movie));
    let mut writer = crate::writer(&table_csv.to_string_lossy())?;
    table.write_csv(&mut writer)?;
    writer.flush()?;

    let before = table.len();
    let table = table.filter_identity(config.min_identity);
    log::info!(
        "{} of {} holes have a consensus identity >= {}",
        table.len(),
        before,
        config.min_identity
    );

    //----------------------------
    // Molecules
    //----------------------------
    log::info!("Step 3: analyzing the molecules");
    let scheduler = Scheduler::new(SchedulerOptions {
        workers: threads,
        batch_size: config.chunk_size,
        outdir: tmpdir.clone(),
        columns: config.columns(),
        progress: config.progress,
    })?;
    let analyzer = IpdAnalyzer::new(Arc::new(reference), &tmpdir, &model, config.columns());
    let dispatch = analyze_holes(
        &sorted.to_string_lossy(),
        &header,
        &table,
        config.min_subreads,
        &scheduler,
        &analyzer,
    )?;

    //----------------------------
    // Output
    //----------------------------
    log::info!("Step 4: compiling the results");
    let compiled = compile_files(&tmpdir, &dispatch.files, &config.output)?;
    log::info!("Results saved to {}", config.output);

    if !config.preserve_tmpdir && !user_tmpdir {
        if let Err(e) = std::fs::remove_dir_all(&tmpdir) {
            log::warn!("Could not remove {}: {}", tmpdir.display(), e);
        }
    }

    Ok(RunSummary {
        dispatch,
        compile: compiled,
        tmpdir,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::libs::batch::AnalysisOutcome;
    use crate::libs::kinetics::{KineticsRow, OutputColumns, PerMoleculeResult};
    use tempfile::TempDir;

    const SUBREADS: &str = "tests/smsn/mocked_holes.sam";

    fn table(min_identity: f64) -> CcsTable {
        CcsTable::from_lines(SamLines::open("tests/smsn/mocked_alignment.sam").unwrap())
            .unwrap()
            .filter_identity(min_identity)
    }

    fn scheduler(dir: &Path) -> Scheduler {
        Scheduler::new(SchedulerOptions {
            workers: 2,
            batch_size: 1,
            outdir: dir.to_path_buf(),
            columns: OutputColumns {
                identification_qv: false,
                context: false,
            },
            progress: false,
        })
        .unwrap()
    }

    fn echo(job: &MoleculeJob) -> AnalysisOutcome {
        assert!(job.group.header().unwrap().starts_with("@HD"));
        AnalysisOutcome::Analyzed(PerMoleculeResult {
            hole_id: job.hole_id(),
            rows: vec![
                KineticsRow {
                    hole_id: job.hole_id(),
                    scaffold: Some(job.scaffold.clone()),
                    tpl: Some(job.end as u64),
                    strand: Some(1),
                    ..Default::default()
                },
                KineticsRow {
                    hole_id: job.hole_id(),
                    scaffold: Some(job.scaffold.clone()),
                    tpl: Some(job.start as u64 + 1),
                    strand: Some(0),
                    ..Default::default()
                },
            ],
        })
    }

    #[test]
    fn test_analyze_holes() {
        let tmp = TempDir::new().unwrap();
        let header = sam::read_header(SUBREADS).unwrap();

        let summary = analyze_holes(SUBREADS, &header, &table(0.9), 2, &scheduler(tmp.path()), &echo)
            .unwrap();
        assert_eq!(summary.dispatched, 2);
        assert_eq!(summary.analyzed, 2);
        assert_eq!(summary.batches, 2);

        let output = tmp.path().join("out.csv");
        let compiled = compile_files(tmp.path(), &summary.files, output.to_str().unwrap()).unwrap();
        assert_eq!(compiled.rows, 4);

        let text = std::fs::read_to_string(&output).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[1], "4260642,chr1,20,0,,,,,,,,");
        assert_eq!(lines[2], "4260642,chr1,79,1,,,,,,,,");
        assert_eq!(lines[3], "4260763,chr1,40,0,,,,,,,,");
        assert_eq!(lines[4], "4260763,chr1,99,1,,,,,,,,");
    }

    #[test]
    fn test_rerun_in_used_tmpdir() {
        let tmp = TempDir::new().unwrap();
        let header = sam::read_header(SUBREADS).unwrap();
        // left by an interrupted run
        let stale = tmp.path().join("tmp_analysis_chunk_7.csv");
        std::fs::write(
            &stale,
            "HoleID,scaffold,tpl,strand,base,score,tMean,tErr,modelPrediction,ipdRatio,coverage,isboundary\n\
            999,chrX,1,0,,,,,,,,\n",
        )
        .unwrap();

        let summary = analyze_holes(SUBREADS, &header, &table(0.9), 2, &scheduler(tmp.path()), &echo)
            .unwrap();
        assert!(!summary.files.contains(&stale));

        let output = tmp.path().join("out.csv");
        let compiled = compile_files(tmp.path(), &summary.files, output.to_str().unwrap()).unwrap();
        assert_eq!(compiled.rows, 4);
        assert_eq!(compiled.files, 2);

        let text = std::fs::read_to_string(&output).unwrap();
        assert!(!text.contains("999,chrX"));
        assert!(text.lines().skip(1).all(|l| l.starts_with("4260642,") || l.starts_with("4260763,")));
        assert!(stale.is_file());
    }

    #[test]
    fn test_analyze_holes_filters() {
        let tmp = TempDir::new().unwrap();
        let header = sam::read_header(SUBREADS).unwrap();

        // only 4260642 has enough subreads
        let summary = analyze_holes(SUBREADS, &header, &table(0.9), 3, &scheduler(tmp.path()), &echo)
            .unwrap();
        assert_eq!(summary.dispatched, 1);

        // nothing passes the identity filter
        let err = analyze_holes(SUBREADS, &header, &table(1.0).filter_identity(1.1), 0, &scheduler(tmp.path()), &echo)
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<SmsnError>(), Some(SmsnError::EmptyResult)));

        // every molecule fails
        let failing = |job: &MoleculeJob| AnalysisOutcome::Failed {
            hole_id: job.hole_id(),
            reason: "no data".to_string(),
        };
        let err = analyze_holes(SUBREADS, &header, &table(0.9), 0, &scheduler(tmp.path()), &failing)
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<SmsnError>(), Some(SmsnError::EmptyResult)));
        // the batch files are still there
        assert!(!crate::libs::compile::list_batch_files(tmp.path()).unwrap().is_empty());
    }

    #[test]
    fn test_unsorted_subreads() {
        let tmp = TempDir::new().unwrap();
        let header = sam::read_header(SUBREADS).unwrap();
        let err = analyze_holes(
            "tests/smsn/unsorted_holes.sam",
            &header,
            &table(0.9),
            0,
            &scheduler(tmp.path()),
            &echo,
        )
        .unwrap_err();
        assert!(format!("{:#}", err).contains("reappears"));
    }

    #[test]
    fn test_make_tmpdir() {
        let tmp = TempDir::new().unwrap();
        let wanted = tmp.path().join("a/b");
        let (dir, user) = make_tmpdir(Some(&wanted)).unwrap();
        assert!(user);
        assert!(dir.is_dir());
        assert!(dir.is_absolute());
    }
}
