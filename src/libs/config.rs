use crate::libs::kinetics::OutputColumns;
use anyhow::{bail, Context};
use std::path::{Path, PathBuf};

/// IPD models shipped with kineticsTools, `<name>.npz.gz`
pub const MODELS: [&str; 3] = ["SP2-C2", "SP3-C3", "P6-C4"];

/// Where named models are looked for when `--model-dir` is absent
pub const MODEL_DIR_ENV: &str = "SMSN_MODEL_DIR";

pub const DEFAULT_MIN_IDENTITY: f64 = 0.99;
pub const DEFAULT_MIN_SUBREADS: usize = 50;
pub const DEFAULT_CHUNK_SIZE: usize = 5000;

/// Everything `smsn run` needs
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub bam: String,
    pub reference: String,
    pub model: String,
    pub model_dir: Option<PathBuf>,
    pub output: String,
    pub ccs: Option<String>,
    pub min_identity: f64,
    pub min_subreads: usize,
    pub tmpdir: Option<PathBuf>,
    /// 0 means all available cores
    pub parallel: usize,
    pub chunk_size: usize,
    pub context: bool,
    pub identification_qv: bool,
    pub preserve_tmpdir: bool,
    pub progress: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            bam: String::new(),
            reference: String::new(),
            model: "SP2-C2".to_string(),
            model_dir: None,
            output: String::new(),
            ccs: None,
            min_identity: DEFAULT_MIN_IDENTITY,
            min_subreads: DEFAULT_MIN_SUBREADS,
            tmpdir: None,
            parallel: 1,
            chunk_size: DEFAULT_CHUNK_SIZE,
            context: true,
            identification_qv: true,
            preserve_tmpdir: false,
            progress: false,
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(self.min_identity > 0.0 && self.min_identity <= 1.0) {
            bail!("--min-identity must be in ]0, 1], got {}", self.min_identity);
        }
        if self.chunk_size == 0 {
            bail!("--chunk-size must be positive");
        }
        for (name, path) in [("--bam", &self.bam), ("--reference", &self.reference)] {
            if !Path::new(path).is_file() {
                bail!("{} {} is not a file", name, path);
            }
        }
        if let Some(ccs) = &self.ccs {
            if !Path::new(ccs).is_file() {
                bail!("--ccs {} is not a file", ccs);
            }
        }

        Ok(())
    }

    /// Caps the workers to the machine, keeps batches at least as large as the
    /// worker count, and warns about permissive filters.
    pub fn normalize(mut self, available: usize) -> Self {
        let available = available.max(1);
        if self.parallel == 0 {
            self.parallel = available;
            log::info!("Using all {} cores", available);
        } else if self.parallel > available {
            log::warn!(
                "{} cores asked but only {} available, using {}",
                self.parallel,
                available,
                available
            );
            self.parallel = available;
        }

        if self.chunk_size < self.parallel {
            log::warn!(
                "--chunk-size {} is below the number of workers, using {}",
                self.chunk_size,
                20 * self.parallel
            );
            self.chunk_size = 20 * self.parallel;
        }

        if self.min_subreads < DEFAULT_MIN_SUBREADS {
            log::warn!(
                "--min-subreads is {}, below {} the kinetic signal per strand gets weak",
                self.min_subreads,
                DEFAULT_MIN_SUBREADS
            );
        }
        if self.min_identity < 0.9 {
            log::warn!(
                "--min-identity is {}, poorly aligned consensus reads will be analyzed",
                self.min_identity
            );
        }

        self
    }

    pub fn columns(&self) -> OutputColumns {
        OutputColumns {
            identification_qv: self.identification_qv,
            context: self.context,
        }
    }
}

/// An existing file is used as is; one of [`MODELS`] is looked up in `model_dir`,
/// then in `$SMSN_MODEL_DIR`.
pub fn resolve_model(model: &str, model_dir: Option<&Path>) -> anyhow::Result<PathBuf> {
    if Path::new(model).is_file() {
        return Ok(intspan::absolute_path(model)?);
    }
    if !MODELS.contains(&model) {
        bail!(
            "unknown model {}, expected one of {} or a model file",
            model,
            MODELS.join(", ")
        );
    }

    let dir = match model_dir {
        Some(dir) => dir.to_path_buf(),
        None => std::env::var_os(MODEL_DIR_ENV)
            .map(PathBuf::from)
            .with_context(|| {
                format!("no --model-dir and ${} is not set to find {}", MODEL_DIR_ENV, model)
            })?,
    };
    let path = dir.join(format!("{}.npz.gz", model));
    if !path.is_file() {
        bail!("model file {} not found", path.display());
    }

    Ok(intspan::absolute_path(path)?)
}
