use thiserror::Error;

pub type Result<T> = std::result::Result<T, SmsnError>;

#[derive(Debug, Error)]
pub enum SmsnError {
    /// Malformed CIGAR string
    #[error("invalid CIGAR \"{cigar}\": {message}")]
    Cigar { cigar: String, message: String },

    /// The hole id token of a subread name can't be parsed
    #[error("can't extract a hole id from record \"{record}\"")]
    HoleId { record: String },

    /// A SAM line with missing or malformed mandatory fields
    #[error("malformed SAM record ({message}): \"{record}\"")]
    SamRecord { record: String, message: String },

    /// A hole id shows up again after another hole was seen
    #[error("hole {hole_id} reappears at line {line}; subreads must be grouped by hole (samtools sort -n)")]
    Unsorted { hole_id: u64, line: usize },

    /// Coordinates outside of what the sequence allows
    #[error("invalid range: {0}")]
    Range(String),

    /// A character without a complement
    #[error("can't complement character '{0}'")]
    Alphabet(char),

    /// Failure of the analysis of a single molecule
    #[error("analysis of hole {hole_id} failed: {reason}")]
    Worker { hole_id: u64, reason: String },

    #[error("not a single molecule could be analyzed")]
    EmptyResult,

    /// The batch files were kept in `dir`
    #[error("compilation into {output} failed, batch files are kept in {dir}: {message}")]
    Compilation {
        output: String,
        dir: String,
        message: String,
    },

    /// An external program exited abnormally
    #[error("`{program}` failed with {status}: {stderr}")]
    Tool {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
