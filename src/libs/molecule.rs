//! Kinetic analysis of a single molecule with blasr and ipdSummary.

use crate::libs::batch::{AnalysisOutcome, MoleculeAnalyzer, MoleculeJob};
use crate::libs::chunk::{ChunkGeometry, DEFAULT_PADDING};
use crate::libs::error::SmsnError;
use crate::libs::external::call_process;
use crate::libs::fasta::{write_fasta, Reference};
use crate::libs::kinetics::{self, OutputColumns, PerMoleculeResult, Remap};
use anyhow::Context;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn lossy(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Runs the per-molecule steps in `<tmpdir>/<hole_id>`, removed afterwards.
///
/// 1. subreads to an indexed BAM
/// 2. the aligned span of the consensus, padded, as a small reference
/// 3. subreads aligned on it with blasr
/// 4. ipdSummary, whose rows are brought back to reference coordinates
pub struct IpdAnalyzer {
    reference: Arc<Reference>,
    tmpdir: PathBuf,
    model: PathBuf,
    columns: OutputColumns,
    padding: usize,
}

impl IpdAnalyzer {
    pub fn new(
        reference: Arc<Reference>,
        tmpdir: &Path,
        model: &Path,
        columns: OutputColumns,
    ) -> Self {
        IpdAnalyzer {
            reference,
            tmpdir: tmpdir.to_path_buf(),
            model: model.to_path_buf(),
            columns,
            padding: DEFAULT_PADDING,
        }
    }

    pub fn workdir(&self, hole_id: u64) -> PathBuf {
        self.tmpdir.join(hole_id.to_string())
    }

    fn chunk(&self, job: &MoleculeJob) -> anyhow::Result<ChunkGeometry> {
        let seq = self
            .reference
            .get(&job.scaffold)
            .with_context(|| format!("scaffold {} is not in the reference", job.scaffold))?;
        Ok(ChunkGeometry::compute(job.start, job.end, seq, self.padding)?)
    }

    fn run(&self, job: &MoleculeJob, workdir: &Path) -> anyhow::Result<PerMoleculeResult> {
        let hole_id = job.hole_id();
        let sam = workdir.join(format!("{}.sam", hole_id));
        let bam = workdir.join(format!("{}.bam", hole_id));
        let chunk_fa = workdir.join("chunked_ref.fasta");
        let aligned = workdir.join(format!("aligned_on_restrictedscaffold_{}.bam", hole_id));
        let unaligned = workdir.join(format!("{}_unaligned.fasta", hole_id));
        let csv = workdir.join(format!("{}.csv", hole_id));
        let gff = workdir.join("output.gff");

        std::fs::write(&sam, job.group.sam_text() + "\n")?;
        call_process(
            "samtools",
            ["view", "-b", "-S", "-h", "-o", lossy(&bam).as_str(), lossy(&sam).as_str()],
        )?;
        call_process("pbindex", [lossy(&bam)])?;

        let chunk = self.chunk(job)?;
        log::debug!(
            "Hole {}: [{}, {}) on {}, chunk [{}, {})",
            hole_id,
            job.start,
            job.end,
            job.scaffold,
            chunk.start,
            chunk.end
        );
        write_fasta(&lossy(&chunk_fa), [(job.scaffold.as_str(), chunk.sequence.as_str())])?;
        call_process("samtools", ["faidx".to_string(), lossy(&chunk_fa)])?;

        call_process(
            "blasr",
            [
                lossy(&bam),
                lossy(&chunk_fa),
                "--bestn".to_string(),
                "1".to_string(),
                "--hitPolicy".to_string(),
                "leftmost".to_string(),
                "--minPctAccuracy".to_string(),
                "0.75".to_string(),
                "--clipping".to_string(),
                "none".to_string(),
                "--bam".to_string(),
                "--out".to_string(),
                lossy(&aligned),
                "--unaligned".to_string(),
                lossy(&unaligned),
            ],
        )?;
        call_process("pbindex", [lossy(&aligned)])?;

        call_process(
            "ipdSummary",
            [
                lossy(&aligned),
                "--reference".to_string(),
                lossy(&chunk_fa),
                "--pvalue".to_string(),
                "1".to_string(),
                "--identify".to_string(),
                "m4C,m6A".to_string(),
                "--csv".to_string(),
                lossy(&csv),
                "--minCoverage".to_string(),
                "0".to_string(),
                "--identifyMinCov".to_string(),
                "0".to_string(),
                "--gff".to_string(),
                lossy(&gff),
                "--ipdModel".to_string(),
                lossy(&self.model),
            ],
        )?;

        self.collect(job, &chunk, &csv, &gff)
    }

    /// Reads the ipdSummary outputs of one molecule
    pub fn collect(
        &self,
        job: &MoleculeJob,
        chunk: &ChunkGeometry,
        csv: &Path,
        gff: &Path,
    ) -> anyhow::Result<PerMoleculeResult> {
        let records = kinetics::parse_ipd_csv(crate::reader(&lossy(csv))?)
            .with_context(|| format!("reading {}", csv.display()))?;

        let qvs = if self.columns.identification_qv && gff.is_file() {
            kinetics::parse_gff_qvs(crate::reader(&lossy(gff))?)
                .with_context(|| format!("reading {}", gff.display()))?
        } else {
            Default::default()
        };

        let remap = Remap {
            hole_id: job.hole_id(),
            chunk,
            real_start: job.start,
            real_end: job.end,
            context: self.columns.context,
        };

        Ok(PerMoleculeResult {
            hole_id: job.hole_id(),
            rows: remap.rows(records, &qvs)?,
        })
    }
}

impl MoleculeAnalyzer for IpdAnalyzer {
    fn analyze(&self, job: &MoleculeJob) -> AnalysisOutcome {
        let hole_id = job.hole_id();
        let workdir = self.workdir(hole_id);

        let result = std::fs::create_dir_all(&workdir)
            .with_context(|| format!("could not create {}", workdir.display()))
            .and_then(|_| self.run(job, &workdir));

        if let Err(e) = std::fs::remove_dir_all(&workdir) {
            log::debug!("Could not remove {}: {}", workdir.display(), e);
        }

        let reason = match result {
            Ok(result) if !result.rows.is_empty() => return AnalysisOutcome::Analyzed(result),
            Ok(_) => "ipdSummary gave no row, the coverage may be too low".to_string(),
            Err(e) => format!("{:#}", e),
        };

        AnalysisOutcome::Failed {
            hole_id,
            reason: SmsnError::Worker { hole_id, reason }.to_string(),
        }
    }
}
