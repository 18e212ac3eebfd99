use crate::libs::error::{Result, SmsnError};

/// Bases added on each side of an alignment span
pub const DEFAULT_PADDING: usize = 100;

/// A padded window of a reference sequence.
///
/// Coordinates are 0-based and half-open. `offset` translates positions in the window
/// back to the reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkGeometry {
    pub start: usize,
    pub end: usize,
    pub offset: usize,
    pub sequence: String,
}

impl ChunkGeometry {
    /// `real_end` is exclusive: pass the last aligned position + 1.
    ///
    /// ```
    /// use smsn::libs::chunk::ChunkGeometry;
    /// let chunk = ChunkGeometry::compute(2, 5, "AACCGGTT", 1).unwrap();
    /// assert_eq!((chunk.start, chunk.end, chunk.offset), (1, 6, 1));
    /// assert_eq!(chunk.sequence, "ACCGG");
    /// ```
    pub fn compute(
        real_start: usize,
        real_end: usize,
        reference: &str,
        distance: usize,
    ) -> Result<Self> {
        let len = reference.len();
        if real_start > real_end || real_end > len + 1 {
            return Err(SmsnError::Range(format!(
                "span [{}, {}) doesn't fit a sequence of length {}",
                real_start, real_end, len
            )));
        }

        let start = real_start.saturating_sub(distance);
        let end = real_end.saturating_add(distance).min(len);
        // real_end == len + 1 with distance 0
        let start = start.min(end);

        let sequence = reference
            .get(start..end)
            .ok_or_else(|| SmsnError::Range(format!("[{}, {}) is not a valid slice", start, end)))?
            .to_string();

        log::trace!(
            "chunk of [{}, {}) with distance {}: [{}, {})",
            real_start,
            real_end,
            distance,
            start,
            end
        );

        Ok(ChunkGeometry {
            start,
            end,
            offset: start,
            sequence,
        })
    }

    pub fn size(&self) -> usize {
        self.end - self.start
    }

    /// Converts a 0-based position in the window to the reference
    pub fn to_global(&self, local: usize) -> usize {
        local + self.offset
    }
}
