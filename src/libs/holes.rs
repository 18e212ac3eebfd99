//! Splits a stream of subreads into molecules.
//!
//! Subreads of one ZMW (a "hole") must be contiguous in the stream, as produced by
//! `samtools sort -n`. The scanner keeps a single molecule in memory.

use crate::libs::error::{Result, SmsnError};
use crate::libs::sam::hole_id_of;
use fxhash::FxHashSet;
use std::io;
use std::mem;
use std::sync::Arc;

/// Which holes are kept
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Restriction {
    #[default]
    Unrestricted,
    Only(FxHashSet<u64>),
}

impl Restriction {
    /// An empty set restricts nothing
    pub fn new(ids: FxHashSet<u64>) -> Self {
        if ids.is_empty() {
            Restriction::Unrestricted
        } else {
            Restriction::Only(ids)
        }
    }

    pub fn allows(&self, hole_id: u64) -> bool {
        match self {
            Restriction::Unrestricted => true,
            Restriction::Only(ids) => ids.contains(&hole_id),
        }
    }
}

/// All subreads of one hole, in stream order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoleculeGroup {
    pub hole_id: u64,
    pub lines: Vec<String>,
    header: Option<Arc<str>>,
}

impl MoleculeGroup {
    pub fn new(hole_id: u64, lines: Vec<String>) -> Self {
        MoleculeGroup {
            hole_id,
            lines,
            header: None,
        }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn header(&self) -> Option<&str> {
        self.header.as_deref()
    }

    /// A standalone SAM document: header (if any) followed by the subreads
    pub fn sam_text(&self) -> String {
        let body = self.lines.join("\n");
        match &self.header {
            Some(header) => format!("{}\n{}", header.trim_end(), body),
            None => body,
        }
    }
}

#[derive(Debug)]
enum ScanState {
    BeforeFirst,
    Accumulating { hole_id: u64, lines: Vec<String> },
    Done,
}

/// Pull-based grouping of alignment lines by hole id.
///
/// A group is emitted when the hole id changes or the input ends, and only if the
/// hole passes the restriction and has strictly more than `min_subreads` lines.
/// A hole id that shows up again after another one ends the iteration with
/// [`SmsnError::Unsorted`].
///
/// ```
/// use smsn::libs::holes::HoleGroups;
/// let lines = ["m/7/0_10\t4", "m/7/10_20\t4", "m/9/0_10\t4"]
///     .iter()
///     .map(|l| Ok(l.to_string()));
/// let groups: Vec<_> = HoleGroups::new(lines).map(|g| g.unwrap()).collect();
/// assert_eq!(groups.len(), 2);
/// assert_eq!(groups[0].hole_id, 7);
/// assert_eq!(groups[0].len(), 2);
/// ```
pub struct HoleGroups<I> {
    lines: I,
    state: ScanState,
    restriction: Restriction,
    min_subreads: usize,
    header: Option<Arc<str>>,
    seen: FxHashSet<u64>,
    line_no: usize,
}

impl<I> HoleGroups<I>
where
    I: Iterator<Item = io::Result<String>>,
{
    pub fn new(lines: I) -> Self {
        HoleGroups {
            lines,
            state: ScanState::BeforeFirst,
            restriction: Restriction::Unrestricted,
            min_subreads: 0,
            header: None,
            seen: FxHashSet::default(),
            line_no: 0,
        }
    }

    pub fn restrict(mut self, restriction: Restriction) -> Self {
        self.restriction = restriction;
        self
    }

    pub fn min_subreads(mut self, min_subreads: usize) -> Self {
        self.min_subreads = min_subreads;
        self
    }

    /// Attached to every emitted group; stored once
    pub fn header(mut self, header: &str) -> Self {
        self.header = Some(Arc::from(header));
        self
    }

    fn emit(&self, hole_id: u64, lines: Vec<String>) -> Option<MoleculeGroup> {
        if !self.restriction.allows(hole_id) {
            log::trace!("Hole {} is not in the restriction", hole_id);
            return None;
        }
        if lines.len() <= self.min_subreads {
            log::debug!(
                "Hole {} has {} subreads, {} needed",
                hole_id,
                lines.len(),
                self.min_subreads + 1
            );
            return None;
        }

        Some(MoleculeGroup {
            hole_id,
            lines,
            header: self.header.clone(),
        })
    }

    fn fail(&mut self, err: SmsnError) -> Option<Result<MoleculeGroup>> {
        self.state = ScanState::Done;
        Some(Err(err))
    }
}

impl<I> Iterator for HoleGroups<I>
where
    I: Iterator<Item = io::Result<String>>,
{
    type Item = Result<MoleculeGroup>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let ScanState::Done = self.state {
                return None;
            }

            let line = match self.lines.next() {
                None => {
                    let last = mem::replace(&mut self.state, ScanState::Done);
                    if let ScanState::Accumulating { hole_id, lines } = last {
                        return self.emit(hole_id, lines).map(Ok);
                    }
                    return None;
                }
                Some(Err(e)) => return self.fail(e.into()),
                Some(Ok(line)) => line,
            };
            self.line_no += 1;

            let id = match hole_id_of(&line) {
                Ok(id) => id,
                Err(e) => return self.fail(e),
            };

            if let ScanState::Accumulating { hole_id, lines } = &mut self.state {
                if *hole_id == id {
                    lines.push(line);
                    continue;
                }
            }

            if !self.seen.insert(id) {
                let line = self.line_no;
                return self.fail(SmsnError::Unsorted { hole_id: id, line });
            }

            let previous = mem::replace(
                &mut self.state,
                ScanState::Accumulating {
                    hole_id: id,
                    lines: vec![line],
                },
            );
            if let ScanState::Accumulating { hole_id, lines } = previous {
                if let Some(group) = self.emit(hole_id, lines) {
                    return Some(Ok(group));
                }
            }
        }
    }
}

/// The first hole id that reappears after another hole, with its record number
pub fn first_unsorted<I>(lines: I) -> Result<Option<(u64, usize)>>
where
    I: Iterator<Item = io::Result<String>>,
{
    let mut seen = FxHashSet::default();
    let mut current = None;
    for (i, line) in lines.enumerate() {
        let id = hole_id_of(&line?)?;
        if current == Some(id) {
            continue;
        }
        if !seen.insert(id) {
            return Ok(Some((id, i + 1)));
        }
        current = Some(id);
    }

    Ok(None)
}

/// Whether every hole's subreads are contiguous
pub fn check_sorted<I>(lines: I) -> Result<bool>
where
    I: Iterator<Item = io::Result<String>>,
{
    Ok(first_unsorted(lines)?.is_none())
}
