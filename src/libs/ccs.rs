//! Alignments of the circular consensus reads, one per hole.

use crate::libs::cigar::Cigar;
use crate::libs::error::Result;
use crate::libs::sam::SamRecord;
use fxhash::FxHashSet;
use indexmap::IndexMap;
use std::io;
use std::io::Write;

#[derive(Debug, Clone, PartialEq)]
pub struct CcsAlignment {
    pub movie: String,
    pub hole_id: u64,
    pub flag: u16,
    pub scaffold: String,
    /// 0-based
    pub start: u64,
    /// Exclusive, `start + ref_len`
    pub end: u64,
    pub ref_len: u64,
    pub mapq: u8,
    pub matches: u64,
    pub clipped: u64,
    pub identity: f64,
    pub cigar: String,
}

pub const CCS_COLUMNS: [&str; 12] = [
    "movie",
    "HoleID",
    "flag",
    "scaffold",
    "start",
    "end",
    "reflen",
    "mapQV",
    "matching_bases",
    "clipped_bases",
    "identity",
    "CIGAR",
];

impl CcsAlignment {
    /// ```
    /// use smsn::libs::ccs::CcsAlignment;
    /// let line = "m54063/4260642/ccs\t0\tchr1\t11\t254\t2S8=1D2=\t*\t0\t0\tACGTACGTACGT\t*";
    /// let aln = CcsAlignment::from_sam_line(line).unwrap();
    /// assert_eq!((aln.start, aln.end), (10, 21));
    /// ```
    pub fn from_sam_line(line: &str) -> Result<Self> {
        let rec = SamRecord::parse(line)?;
        let cigar = Cigar::from_sam_field(rec.cigar, rec.sequence.len())?;
        let start = rec.position.saturating_sub(1);

        Ok(CcsAlignment {
            movie: rec.movie.to_string(),
            hole_id: rec.hole_id,
            flag: rec.flag,
            scaffold: rec.scaffold.to_string(),
            start,
            end: start + cigar.ref_len(),
            ref_len: cigar.ref_len(),
            mapq: rec.mapq,
            matches: cigar.num_matches(),
            clipped: cigar.num_clipped(),
            identity: cigar.identity(),
            cigar: cigar.to_string(),
        })
    }

    pub fn is_aligned(&self) -> bool {
        self.flag & 0x4 == 0 && self.scaffold != "*"
    }

    pub fn to_csv(&self) -> String {
        format!(
            "{},{},{},{},{},{},{},{},{},{},{},{}",
            self.movie,
            self.hole_id,
            self.flag,
            self.scaffold,
            self.start,
            self.end,
            self.ref_len,
            self.mapq,
            self.matches,
            self.clipped,
            self.identity,
            self.cigar
        )
    }
}

/// Consensus alignments keyed by hole, in file order
#[derive(Debug, Clone, Default)]
pub struct CcsTable {
    alignments: IndexMap<u64, CcsAlignment>,
    records: usize,
}

impl CcsTable {
    /// The first alignment of a hole wins; extra ones are counted and reported.
    pub fn from_lines<I>(lines: I) -> Result<Self>
    where
        I: Iterator<Item = io::Result<String>>,
    {
        let mut table = CcsTable::default();
        let mut duplicated = FxHashSet::default();
        let mut ambiguous = 0;

        for line in lines {
            let aln = CcsAlignment::from_sam_line(&line?)?;
            table.records += 1;
            if aln.cigar.contains('M') {
                ambiguous += 1;
            }
            if table.alignments.contains_key(&aln.hole_id) {
                duplicated.insert(aln.hole_id);
                continue;
            }
            table.alignments.insert(aln.hole_id, aln);
        }

        if !duplicated.is_empty() {
            log::error!(
                "{} alignments for {} consensus reads: {} holes aligned more than once. \
                The rest of the analysis might be corrupted",
                table.records,
                table.alignments.len(),
                duplicated.len()
            );
        }

        if ambiguous > 0 {
            log::warn!(
                "{} consensus alignments use `M` in their CIGAR, their identity is an upper bound",
                ambiguous
            );
        }

        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.alignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alignments.is_empty()
    }

    /// Number of SAM records read, duplicates included
    pub fn records(&self) -> usize {
        self.records
    }

    pub fn get(&self, hole_id: u64) -> Option<&CcsAlignment> {
        self.alignments.get(&hole_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CcsAlignment> {
        self.alignments.values()
    }

    /// Aligned holes with an identity of at least `min_identity`
    pub fn filter_identity(self, min_identity: f64) -> Self {
        let records = self.records;
        let alignments = self
            .alignments
            .into_iter()
            .filter(|(_, aln)| aln.is_aligned() && aln.identity >= min_identity)
            .collect();

        CcsTable {
            alignments,
            records,
        }
    }

    pub fn hole_ids(&self) -> FxHashSet<u64> {
        self.alignments.keys().copied().collect()
    }

    pub fn write_csv(&self, writer: &mut dyn Write) -> io::Result<()> {
        writeln!(writer, "{}", CCS_COLUMNS.join(","))?;
        for aln in self.alignments.values() {
            writeln!(writer, "{}", aln.to_csv())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::libs::error::SmsnError;
    use crate::libs::sam::SamLines;
    use approx::assert_relative_eq;

    fn mocked() -> CcsTable {
        CcsTable::from_lines(SamLines::open("tests/smsn/mocked_alignment.sam").unwrap()).unwrap()
    }

    #[test]
    fn test_from_sam_line() {
        let line = "m54063_170928_100556/4260642/ccs\t16\tchr1\t1\t254\t3=1I1D1X1=\t*\t0\t0\tACGTACG\t*";
        let aln = CcsAlignment::from_sam_line(line).unwrap();
        assert_eq!(aln.movie, "m54063_170928_100556");
        assert_eq!(aln.hole_id, 4260642);
        assert_eq!(aln.start, 0);
        assert_eq!(aln.end, 6);
        assert_eq!(aln.matches, 4);
        assert_relative_eq!(aln.identity, 2.0 / 3.0);
        assert!(aln.is_aligned());

        let unaligned = "m54063_170928_100556/4260763/ccs\t4\t*\t0\t255\t*\t*\t0\t0\tACGTACG\t*";
        let aln = CcsAlignment::from_sam_line(unaligned).unwrap();
        assert_eq!(aln.cigar, "7S");
        assert_eq!(aln.clipped, 7);
        assert_eq!((aln.start, aln.end), (0, 0));
        assert_eq!(aln.identity, 0.0);
        assert!(!aln.is_aligned());

        let bad = "m54063_170928_100556/4260763/ccs\t0\tchr1\t10\t254\t3Q\t*\t0\t0\tACG\t*";
        assert!(matches!(
            CcsAlignment::from_sam_line(bad),
            Err(SmsnError::Cigar { .. })
        ));
    }

    #[test]
    fn test_from_sam_line_aln_match() {
        let line = "m54063_170928_100556/4325503/ccs\t0\tchr1\t5\t254\t12M\t*\t0\t0\tACGTACGTACGT\t*";
        let aln = CcsAlignment::from_sam_line(line).unwrap();
        assert_eq!((aln.start, aln.end), (4, 16));
        assert_eq!(aln.matches, 12);
        assert_relative_eq!(aln.identity, 1.0);

        let lines = vec![Ok(line.to_string())].into_iter();
        let table = CcsTable::from_lines(lines).unwrap();
        assert_eq!(table.filter_identity(0.99).len(), 1);
    }

    #[test]
    fn test_table() {
        let table = mocked();
        assert_eq!(table.records(), 4);
        assert_eq!(table.len(), 3);
        assert_eq!(
            table.iter().map(|a| a.hole_id).collect::<Vec<_>>(),
            vec![4260642, 4260763, 4325503]
        );

        let aln = table.get(4260642).unwrap();
        assert_eq!(aln.scaffold, "chr1");
        assert_eq!(aln.start, 19);
        assert_eq!(aln.end, 79);
        assert_eq!(aln.identity, 1.0);

        let filtered = table.filter_identity(0.99);
        assert_eq!(filtered.len(), 1);
        assert!(filtered.hole_ids().contains(&4260642));
        assert_eq!(filtered.records(), 4);
    }

    #[test]
    fn test_write_csv() {
        let mut out: Vec<u8> = vec![];
        mocked().write_csv(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], CCS_COLUMNS.join(","));
        assert_eq!(
            lines[1],
            "m54063_170928_100556,4260642,0,chr1,19,79,60,254,60,0,1,60="
        );
    }
}
