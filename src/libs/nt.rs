use crate::libs::error::{Result, SmsnError};

/// Half-width of the context written in the `context` column
pub const CONTEXT_WIDTH: usize = 12;

pub fn complement(base: u8) -> Option<u8> {
    match base.to_ascii_uppercase() {
        b'A' => Some(b'T'),
        b'T' => Some(b'A'),
        b'C' => Some(b'G'),
        b'G' => Some(b'C'),
        b'N' => Some(b'N'),
        _ => None,
    }
}

fn revcomp_in_place(seq: &mut [u8]) -> Result<()> {
    seq.reverse();
    for b in seq.iter_mut() {
        *b = complement(*b).ok_or(SmsnError::Alphabet(*b as char))?;
    }
    Ok(())
}

/// ```
/// assert_eq!(smsn::libs::nt::revcomp("GNGCTAGN").unwrap(), "NCTAGCNC");
/// assert!(smsn::libs::nt::revcomp("ACGR").is_err());
/// ```
pub fn revcomp(seq: &str) -> Result<String> {
    let mut bytes = seq.as_bytes().to_vec();
    revcomp_in_place(&mut bytes)?;
    // complement() only produces ASCII
    String::from_utf8(bytes).map_err(|e| SmsnError::Range(e.to_string()))
}

/// The `2n + 1` bases centred on the 0-based `position`, padded with `N` past the ends
/// of `seq`. Strand `1` gives the reverse complement.
///
/// `position == seq.len()` is allowed and gives an `N` in the centre.
///
/// ```
/// use smsn::libs::nt::get_context;
/// assert_eq!(get_context("GATCGCT", 0, 0, 2).unwrap(), "NNGAT");
/// assert_eq!(get_context("GATCGCT", 1, 1, 3).unwrap(), "CGATCNN");
/// ```
pub fn get_context(seq: &str, position: usize, strand: u8, n: usize) -> Result<String> {
    if n == 0 || seq.is_empty() || position > seq.len() || strand > 1 {
        return Err(SmsnError::Range(format!(
            "context of {} bases at {} on strand {} in a sequence of length {}",
            n,
            position,
            strand,
            seq.len()
        )));
    }
    if let Some(c) = seq.chars().find(|c| !c.is_ascii()) {
        return Err(SmsnError::Alphabet(c));
    }

    let bytes = seq.as_bytes();
    let len = bytes.len();
    let mut out = Vec::with_capacity(2 * n + 1);

    let left_start = position.saturating_sub(n);
    out.resize(n - (position - left_start), b'N');
    out.extend(bytes[left_start..position].iter().map(u8::to_ascii_uppercase));

    out.push(bytes.get(position).map_or(b'N', u8::to_ascii_uppercase));

    let right_start = (position + 1).min(len);
    let right_end = (position + n + 1).min(len);
    if right_start < right_end {
        out.extend(bytes[right_start..right_end].iter().map(u8::to_ascii_uppercase));
    }
    out.resize(2 * n + 1, b'N');

    if strand == 1 {
        revcomp_in_place(&mut out)?;
    }

    String::from_utf8(out).map_err(|e| SmsnError::Range(e.to_string()))
}
