//! Run-length encoded alignment descriptions.
//!
//! Only the totals per operation are kept; the alignment itself is never expanded.
//!
//! Counting rules:
//!
//! * `=` and `M` are matches, `X` substitutions
//!
//!   `M` doesn't tell a match from a mismatch. Counting it as matches keeps
//!   `ref_len` right, so alignment spans stay exact, but the identity becomes an
//!   upper bound: `60M` has an identity of 1. blasr writes `=`/`X`; other aligners
//!   must be run with extended CIGARs for the identity filter to mean anything.
//!   See [`Cigar::has_ambiguous_matches`].
//! * `I` insertions, `D` deletions, `S` soft-clipped bases
//! * `N`, `H` and `P` are accepted but counted apart, in `num_other`.
//!   They take no part in `ref_len`, `seq_len` or the identity

use crate::libs::error::{Result, SmsnError};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CigarOp {
    /// `=`
    Match,
    /// `X`
    Substitution,
    /// `M`, match or mismatch
    AlnMatch,
    /// `I`
    Insertion,
    /// `D`
    Deletion,
    /// `S`
    SoftClip,
    /// `H`
    HardClip,
    /// `N`
    RefSkip,
    /// `P`
    Padding,
}

impl CigarOp {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '=' => Some(CigarOp::Match),
            'X' => Some(CigarOp::Substitution),
            'M' => Some(CigarOp::AlnMatch),
            'I' => Some(CigarOp::Insertion),
            'D' => Some(CigarOp::Deletion),
            'S' => Some(CigarOp::SoftClip),
            'H' => Some(CigarOp::HardClip),
            'N' => Some(CigarOp::RefSkip),
            'P' => Some(CigarOp::Padding),
            _ => None,
        }
    }

    pub fn as_char(&self) -> char {
        match self {
            CigarOp::Match => '=',
            CigarOp::Substitution => 'X',
            CigarOp::AlnMatch => 'M',
            CigarOp::Insertion => 'I',
            CigarOp::Deletion => 'D',
            CigarOp::SoftClip => 'S',
            CigarOp::HardClip => 'H',
            CigarOp::RefSkip => 'N',
            CigarOp::Padding => 'P',
        }
    }
}

/// Alignment statistics derived from a CIGAR string.
///
/// ```
/// let cigar = smsn::libs::cigar::Cigar::new("3=1I1D1X1=").unwrap();
/// assert_eq!(cigar.num_matches(), 4);
/// assert_eq!(cigar.ref_len(), 6);
/// assert_eq!(cigar.seq_len(), 6);
/// assert!((cigar.identity() - 2.0 / 3.0).abs() < 1e-9);
/// ```
#[derive(Debug, Clone)]
pub struct Cigar {
    string: String,
    scaffold: Option<String>,
    groups: Vec<(u64, CigarOp)>,
    num_matches: u64,
    num_insertions: u64,
    num_deletions: u64,
    num_substitutions: u64,
    num_clipped: u64,
    num_other: u64,
}

impl Cigar {
    pub fn new(cigar: &str) -> Result<Self> {
        let groups = parse_groups(cigar)?;

        let mut obj = Cigar {
            string: cigar.to_string(),
            scaffold: None,
            groups,
            num_matches: 0,
            num_insertions: 0,
            num_deletions: 0,
            num_substitutions: 0,
            num_clipped: 0,
            num_other: 0,
        };
        obj.count();

        Ok(obj)
    }

    pub fn with_scaffold(cigar: &str, scaffold: &str) -> Result<Self> {
        let mut obj = Self::new(cigar)?;
        obj.scaffold = Some(scaffold.to_string());
        Ok(obj)
    }

    /// An unaligned read: a single soft-clip block covering the whole read.
    pub fn unaligned(seq_len: usize) -> Self {
        let mut obj = Cigar {
            string: format!("{}S", seq_len),
            scaffold: None,
            groups: vec![(seq_len as u64, CigarOp::SoftClip)],
            num_matches: 0,
            num_insertions: 0,
            num_deletions: 0,
            num_substitutions: 0,
            num_clipped: 0,
            num_other: 0,
        };
        obj.count();
        obj
    }

    /// The CIGAR field of a SAM record, `*` being an unaligned read
    pub fn from_sam_field(cigar: &str, seq_len: usize) -> Result<Self> {
        if cigar == "*" {
            Ok(Self::unaligned(seq_len))
        } else {
            Self::new(cigar)
        }
    }

    fn count(&mut self) {
        for &(len, op) in &self.groups {
            match op {
                CigarOp::Match | CigarOp::AlnMatch => self.num_matches += len,
                CigarOp::Substitution => self.num_substitutions += len,
                CigarOp::Insertion => self.num_insertions += len,
                CigarOp::Deletion => self.num_deletions += len,
                CigarOp::SoftClip => self.num_clipped += len,
                CigarOp::HardClip | CigarOp::RefSkip | CigarOp::Padding => {
                    self.num_other += len
                }
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.string
    }

    pub fn scaffold(&self) -> Option<&str> {
        self.scaffold.as_deref()
    }

    pub fn groups(&self) -> &[(u64, CigarOp)] {
        &self.groups
    }

    pub fn num_matches(&self) -> u64 {
        self.num_matches
    }

    pub fn num_insertions(&self) -> u64 {
        self.num_insertions
    }

    pub fn num_deletions(&self) -> u64 {
        self.num_deletions
    }

    pub fn num_substitutions(&self) -> u64 {
        self.num_substitutions
    }

    pub fn num_clipped(&self) -> u64 {
        self.num_clipped
    }

    pub fn num_other(&self) -> u64 {
        self.num_other
    }

    /// Whether some matches come from `M`, making [`Cigar::identity`] an upper bound
    pub fn has_ambiguous_matches(&self) -> bool {
        self.groups.iter().any(|(_, op)| *op == CigarOp::AlnMatch)
    }

    /// Reference bases covered by the alignment, clipping excluded
    pub fn ref_len(&self) -> u64 {
        self.num_matches + self.num_substitutions + self.num_deletions
    }

    /// Read bases, clipped ones included
    pub fn seq_len(&self) -> u64 {
        self.num_matches + self.num_clipped + self.num_substitutions + self.num_insertions
    }

    /// `2 * matches / (ref_len + seq_len)`.
    ///
    /// Reference-side and read-side differences weigh the same, and clipped
    /// bases count against the identity.
    pub fn identity(&self) -> f64 {
        let total = self.ref_len() + self.seq_len();
        if total == 0 {
            0.0
        } else {
            (2 * self.num_matches) as f64 / total as f64
        }
    }
}

impl PartialEq for Cigar {
    fn eq(&self, other: &Self) -> bool {
        self.string == other.string && self.scaffold == other.scaffold
    }
}

impl Eq for Cigar {}

impl fmt::Display for Cigar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.string)
    }
}

fn parse_groups(cigar: &str) -> Result<Vec<(u64, CigarOp)>> {
    let error = |message: &str| SmsnError::Cigar {
        cigar: cigar.to_string(),
        message: message.to_string(),
    };

    if cigar.is_empty() {
        return Err(error("empty string"));
    }

    let mut groups = vec![];
    let mut len: Option<u64> = None;
    for c in cigar.chars() {
        if let Some(digit) = c.to_digit(10) {
            let cur = len.unwrap_or(0);
            len = Some(
                cur.checked_mul(10)
                    .and_then(|v| v.checked_add(digit as u64))
                    .ok_or_else(|| error("length overflow"))?,
            );
        } else {
            let op = CigarOp::from_char(c)
                .ok_or_else(|| error(&format!("unknown operation '{}'", c)))?;
            let n = len
                .take()
                .ok_or_else(|| error(&format!("operation '{}' without a length", c)))?;
            groups.push((n, op));
        }
    }

    if len.is_some() {
        return Err(error("trailing length without an operation"));
    }

    Ok(groups)
}
