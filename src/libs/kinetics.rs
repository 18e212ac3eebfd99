//! Per-base kinetic rows: parsing `ipdSummary` output and writing the result table.

use crate::libs::chunk::ChunkGeometry;
use crate::libs::nt;
use anyhow::{anyhow, bail, Context};
use fxhash::FxHashMap;
use std::fmt::Display;
use std::io::BufRead;

/// Bases closer than this to either end of the CCS alignment are flagged `isboundary`
pub const BOUNDARY_DISTANCE: i64 = 10;

pub const BASE_COLUMNS: [&str; 12] = [
    "HoleID",
    "scaffold",
    "tpl",
    "strand",
    "base",
    "score",
    "tMean",
    "tErr",
    "modelPrediction",
    "ipdRatio",
    "coverage",
    "isboundary",
];

/// The optional trailing columns of the result table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputColumns {
    pub identification_qv: bool,
    pub context: bool,
}

impl Default for OutputColumns {
    fn default() -> Self {
        OutputColumns {
            identification_qv: true,
            context: true,
        }
    }
}

impl OutputColumns {
    pub fn names(&self) -> Vec<&'static str> {
        let mut names = BASE_COLUMNS.to_vec();
        if self.identification_qv {
            names.push("identificationQv");
        }
        if self.context {
            names.push("context");
        }
        names
    }

    pub fn header(&self) -> String {
        self.names().join(",")
    }
}

/// One base of one molecule, in reference coordinates.
///
/// All fields but `hole_id` are optional: a molecule whose analysis failed is
/// represented by a single row with nothing but its hole id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KineticsRow {
    pub hole_id: u64,
    pub scaffold: Option<String>,
    /// 1-based
    pub tpl: Option<u64>,
    pub strand: Option<u8>,
    pub base: Option<char>,
    pub score: Option<u32>,
    pub t_mean: Option<f64>,
    pub t_err: Option<f64>,
    pub model_prediction: Option<f64>,
    pub ipd_ratio: Option<f64>,
    pub coverage: Option<u32>,
    pub is_boundary: Option<bool>,
    pub identification_qv: Option<u32>,
    pub context: Option<String>,
}

fn cell<T: Display>(value: &Option<T>) -> String {
    value.as_ref().map(|v| v.to_string()).unwrap_or_default()
}

impl KineticsRow {
    pub fn placeholder(hole_id: u64) -> Self {
        KineticsRow {
            hole_id,
            ..Default::default()
        }
    }

    pub fn is_placeholder(&self) -> bool {
        *self == Self::placeholder(self.hole_id)
    }

    pub fn to_csv(&self, columns: &OutputColumns) -> String {
        let mut fields = vec![
            self.hole_id.to_string(),
            cell(&self.scaffold),
            cell(&self.tpl),
            cell(&self.strand),
            cell(&self.base),
            cell(&self.score),
            cell(&self.t_mean),
            cell(&self.t_err),
            cell(&self.model_prediction),
            cell(&self.ipd_ratio),
            cell(&self.coverage),
            self.is_boundary
                .map(|b| if b { "True" } else { "False" }.to_string())
                .unwrap_or_default(),
        ];
        if columns.identification_qv {
            fields.push(cell(&self.identification_qv));
        }
        if columns.context {
            fields.push(cell(&self.context));
        }

        fields.join(",")
    }
}

/// All rows of one molecule
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PerMoleculeResult {
    pub hole_id: u64,
    pub rows: Vec<KineticsRow>,
}

/// One line of the `--csv` output of `ipdSummary`, chunk coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct IpdRecord {
    pub ref_name: String,
    /// 1-based, relative to the chunk
    pub tpl: u64,
    pub strand: u8,
    pub base: char,
    pub score: u32,
    pub t_mean: f64,
    pub t_err: f64,
    pub model_prediction: f64,
    pub ipd_ratio: f64,
    pub coverage: u32,
}

fn parse_field<T>(fields: &[&str], idx: usize, name: &str) -> anyhow::Result<T>
where
    T: std::str::FromStr,
{
    let raw = fields
        .get(idx)
        .ok_or_else(|| anyhow!("missing column {}", name))?;
    raw.trim()
        .parse::<T>()
        .map_err(|_| anyhow!("invalid {} \"{}\"", name, raw))
}

/// Columns are looked up by name, extra ones are ignored
pub fn parse_ipd_csv<R: BufRead>(reader: R) -> anyhow::Result<Vec<IpdRecord>> {
    let mut lines = reader.lines();
    let header = match lines.next() {
        Some(line) => line?,
        None => bail!("empty ipdSummary CSV"),
    };

    let names: Vec<&str> = header.trim().split(',').collect();
    let index = |name: &str| -> anyhow::Result<usize> {
        names
            .iter()
            .position(|n| *n == name)
            .ok_or_else(|| anyhow!("no {} column in ipdSummary CSV", name))
    };
    let i_ref = index("refName")?;
    let i_tpl = index("tpl")?;
    let i_strand = index("strand")?;
    let i_base = index("base")?;
    let i_score = index("score")?;
    let i_mean = index("tMean")?;
    let i_err = index("tErr")?;
    let i_pred = index("modelPrediction")?;
    let i_ratio = index("ipdRatio")?;
    let i_cov = index("coverage")?;

    let mut records = vec![];
    for (i, line) in lines.enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.trim().split(',').collect();
        let record = (|| -> anyhow::Result<IpdRecord> {
            Ok(IpdRecord {
                ref_name: fields
                    .get(i_ref)
                    .map(|s| s.trim_matches('"').to_string())
                    .unwrap_or_default(),
                tpl: parse_field(&fields, i_tpl, "tpl")?,
                strand: parse_field(&fields, i_strand, "strand")?,
                base: parse_field(&fields, i_base, "base")?,
                score: parse_field(&fields, i_score, "score")?,
                t_mean: parse_field(&fields, i_mean, "tMean")?,
                t_err: parse_field(&fields, i_err, "tErr")?,
                model_prediction: parse_field(&fields, i_pred, "modelPrediction")?,
                ipd_ratio: parse_field(&fields, i_ratio, "ipdRatio")?,
                coverage: parse_field(&fields, i_cov, "coverage")?,
            })
        })()
        .with_context(|| format!("line {} of ipdSummary CSV: \"{}\"", i + 2, line))?;
        records.push(record);
    }

    Ok(records)
}

/// `identificationQv` attributes of an `ipdSummary` GFF, keyed by `(start, strand)`.
///
/// Strand `+` is 0, anything else 1.
pub fn parse_gff_qvs<R: BufRead>(reader: R) -> anyhow::Result<FxHashMap<(u64, u8), u32>> {
    let mut qvs = FxHashMap::default();
    for line in reader.lines() {
        let line = line?;
        if line.starts_with('#') || line.trim().is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 9 {
            bail!("GFF line with {} fields: \"{}\"", fields.len(), line);
        }
        let start = fields[3]
            .parse::<u64>()
            .with_context(|| format!("invalid GFF start in \"{}\"", line))?;
        let strand = if fields[6] == "+" { 0 } else { 1 };

        let qv = fields[8]
            .trim()
            .split(';')
            .filter_map(|attr| attr.split_once('='))
            .find(|(key, _)| *key == "identificationQv")
            .map(|(_, value)| value);
        if let Some(qv) = qv {
            let qv = qv
                .parse::<u32>()
                .with_context(|| format!("invalid identificationQv in \"{}\"", line))?;
            qvs.insert((start, strand), qv);
        }
    }

    Ok(qvs)
}

/// Where the rows of one molecule go back to
#[derive(Debug, Clone, Copy)]
pub struct Remap<'a> {
    pub hole_id: u64,
    pub chunk: &'a ChunkGeometry,
    /// 0-based, half-open span of the CCS alignment
    pub real_start: usize,
    pub real_end: usize,
    pub context: bool,
}

impl Remap<'_> {
    /// Moves chunk rows to reference coordinates and joins the QVs
    pub fn rows(
        &self,
        records: Vec<IpdRecord>,
        qvs: &FxHashMap<(u64, u8), u32>,
    ) -> crate::libs::error::Result<Vec<KineticsRow>> {
        let mut rows = Vec::with_capacity(records.len());
        for rec in records {
            let tpl = rec.tpl + self.chunk.offset as u64;
            let g = tpl as i64 - 1;
            let to_start = g - self.real_start as i64;
            let to_end = self.real_end as i64 - g;

            let context = if self.context {
                let local = (rec.tpl as usize).saturating_sub(1);
                Some(nt::get_context(
                    &self.chunk.sequence,
                    local,
                    rec.strand,
                    nt::CONTEXT_WIDTH,
                )?)
            } else {
                None
            };

            rows.push(KineticsRow {
                hole_id: self.hole_id,
                identification_qv: qvs.get(&(rec.tpl, rec.strand)).copied(),
                scaffold: Some(rec.ref_name),
                tpl: Some(tpl),
                strand: Some(rec.strand),
                base: Some(rec.base),
                score: Some(rec.score),
                t_mean: Some(rec.t_mean),
                t_err: Some(rec.t_err),
                model_prediction: Some(rec.model_prediction),
                ipd_ratio: Some(rec.ipd_ratio),
                coverage: Some(rec.coverage),
                is_boundary: Some(to_start.min(to_end) < BOUNDARY_DISTANCE),
                context,
            });
        }

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Cursor;

    const IPD_CSV: &str = "refName,tpl,strand,base,score,tMean,tErr,modelPrediction,ipdRatio,coverage\n\
\"chr1\",1,0,G,3,0.805,0.352,0.927,0.868,11\n\
\"chr1\",1,1,C,1,1.102,0.215,1.011,1.090,12\n\
\"chr1\",3,0,T,22,2.513,0.601,0.852,2.950,11\n\
\"chr1\",20,1,A,40,6.21,1.2,0.98,6.337,9\n";

    const GFF: &str = "##gff-version 3\n\
##source ipdSummary v2.0\n\
chr1\tkinModCall\tm6A\t3\t3\t22\t+\t.\tcoverage=11;context=TTTTAAGTCTA;IPDRatio=2.95;identificationQv=20\n\
chr1\tkinModCall\tmodified_base\t20\t20\t40\t-\t.\tcoverage=9;context=AGCTAGCTAGC;IPDRatio=6.34;identificationQv=22\n\
chr1\tkinModCall\tmodified_base\t7\t7\t31\t-\t.\tcoverage=9;context=AGCTAGCTAGC;IPDRatio=3.1\n";

    #[test]
    fn test_columns() {
        let all = OutputColumns::default();
        assert_eq!(all.names().len(), 14);
        assert!(all.header().ends_with(",isboundary,identificationQv,context"));

        let bare = OutputColumns {
            identification_qv: false,
            context: false,
        };
        assert_eq!(
            bare.header(),
            "HoleID,scaffold,tpl,strand,base,score,tMean,tErr,modelPrediction,ipdRatio,coverage,isboundary"
        );
    }

    #[test]
    fn test_placeholder() {
        let row = KineticsRow::placeholder(4260642);
        assert!(row.is_placeholder());
        assert_eq!(
            row.to_csv(&OutputColumns::default()),
            "4260642,,,,,,,,,,,,,"
        );
        assert_eq!(row.to_csv(&OutputColumns::default()).split(',').count(), 14);
    }

    #[test]
    fn test_parse_ipd_csv() {
        let records = parse_ipd_csv(Cursor::new(IPD_CSV)).unwrap();
        assert_eq!(records.len(), 4);
        assert_eq!(records[0].ref_name, "chr1");
        assert_eq!(records[2].tpl, 3);
        assert_eq!(records[2].base, 'T');
        assert_eq!(records[2].score, 22);
        assert_relative_eq!(records[2].ipd_ratio, 2.95);
        assert_eq!(records[3].strand, 1);

        assert!(parse_ipd_csv(Cursor::new("")).is_err());
        assert!(parse_ipd_csv(Cursor::new("refName,tpl\n")).is_err());
        assert!(parse_ipd_csv(Cursor::new(
            "refName,tpl,strand,base,score,tMean,tErr,modelPrediction,ipdRatio,coverage\nchr1,x,0,G,3,0.8,0.3,0.9,0.8,11\n"
        ))
        .is_err());
    }

    #[test]
    fn test_parse_gff() {
        let qvs = parse_gff_qvs(Cursor::new(GFF)).unwrap();
        assert_eq!(qvs.len(), 2);
        assert_eq!(qvs[&(3, 0)], 20);
        assert_eq!(qvs[&(20, 1)], 22);
        assert!(qvs.get(&(7, 1)).is_none());
    }

    #[test]
    fn test_remap() {
        // chunk [4, 28) of a 40 bp scaffold, CCS alignment on [6, 26)
        let reference = "ACGTACGTTTGACCATGGCATTAGCCGATTACAGGCTAAT";
        let chunk = ChunkGeometry::compute(6, 26, reference, 2).unwrap();
        assert_eq!(chunk.offset, 4);

        let records = parse_ipd_csv(Cursor::new(IPD_CSV)).unwrap();
        let qvs = parse_gff_qvs(Cursor::new(GFF)).unwrap();
        let remap = Remap {
            hole_id: 4260642,
            chunk: &chunk,
            real_start: 6,
            real_end: 26,
            context: true,
        };
        let rows = remap.rows(records, &qvs).unwrap();
        assert_eq!(rows.len(), 4);

        assert_eq!(rows[0].tpl, Some(5));
        assert_eq!(rows[0].is_boundary, Some(true));
        assert_eq!(rows[0].identification_qv, None);
        // tpl 1 of the chunk is reference[4]
        assert_eq!(
            rows[0].context.as_deref(),
            Some(nt::get_context(&chunk.sequence, 0, 0, 12).unwrap().as_str())
        );
        assert_eq!(rows[0].context.as_ref().unwrap().chars().nth(12), Some('A'));
        assert_eq!(rows[1].context.as_ref().unwrap().chars().nth(12), Some('T'));

        assert_eq!(rows[2].tpl, Some(7));
        assert_eq!(rows[2].identification_qv, Some(20));

        // reference position 23: 17 from the start, 3 from the end
        assert_eq!(rows[3].tpl, Some(24));
        assert_eq!(rows[3].identification_qv, Some(22));
        assert_eq!(rows[3].is_boundary, Some(true));

        let line = rows[2].to_csv(&OutputColumns::default());
        let fields: Vec<&str> = line.split(',').collect();
        assert_eq!(fields.len(), 14);
        assert_eq!(fields[0], "4260642");
        assert_eq!(fields[1], "chr1");
        assert_eq!(fields[2], "7");
        assert_eq!(fields[11], "True");
        assert_eq!(fields[12], "20");
        assert_eq!(fields[13].len(), 25);
    }

    #[test]
    fn test_context_centre() {
        // the chunk starts at 2 and holds the template of IPD_CSV
        let reference = "AAGCTAACGGATCCATGCAAGTCAGGCTTACA";
        let chunk = ChunkGeometry::compute(4, 30, reference, 2).unwrap();
        assert_eq!(chunk.offset, 2);
        assert_eq!(chunk.sequence, "GCTAACGGATCCATGCAAGTCAGGCTTACA");

        let records = parse_ipd_csv(Cursor::new(IPD_CSV)).unwrap();
        let remap = Remap {
            hole_id: 4260642,
            chunk: &chunk,
            real_start: 4,
            real_end: 30,
            context: true,
        };
        let rows = remap.rows(records, &FxHashMap::default()).unwrap();

        // ipdSummary reports the base at tpl - 1, complemented on strand 1
        for row in &rows {
            let centre = row.context.as_ref().unwrap().chars().nth(12);
            assert_eq!(centre, row.base, "tpl {:?}", row.tpl);
        }
        assert_eq!(rows[2].tpl, Some(5));
        assert_eq!(rows[2].context.as_deref(), Some("NNNNNNNNNNGCTAACGGATCCATG"));
        // one base to the left would centre on C
        assert_eq!(
            nt::get_context(&chunk.sequence, 1, 0, 12).unwrap(),
            "NNNNNNNNNNNGCTAACGGATCCAT"
        );
        assert_eq!(rows[3].tpl, Some(22));
        assert_eq!(rows[3].context.as_deref(), Some("NNTGTAAGCCTGACTTGCATGGATC"));
    }

    #[test]
    fn test_remap_inner() {
        let reference = "ACGTACGTTTGACCATGGCATTAGCCGATTACAGGCTAATACGTACGTTTGACCATGGC";
        let chunk = ChunkGeometry::compute(10, 50, reference, 5).unwrap();
        let record = IpdRecord {
            ref_name: "chr1".to_string(),
            tpl: 21,
            strand: 0,
            base: 'G',
            score: 5,
            t_mean: 1.0,
            t_err: 0.1,
            model_prediction: 1.0,
            ipd_ratio: 1.0,
            coverage: 10,
        };
        let remap = Remap {
            hole_id: 1,
            chunk: &chunk,
            real_start: 10,
            real_end: 50,
            context: false,
        };
        let rows = remap.rows(vec![record], &FxHashMap::default()).unwrap();
        // global 0-based 25: 15 from the start, 25 from the end
        assert_eq!(rows[0].tpl, Some(26));
        assert_eq!(rows[0].is_boundary, Some(false));
        assert_eq!(rows[0].context, None);
        assert!(rows[0]
            .to_csv(&OutputColumns::default())
            .ends_with(",False,,"));
    }
}
