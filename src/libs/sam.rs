//! Just enough SAM to group subreads and read alignments.
//!
//! BAM files are never decoded here, `samtools view` turns them into text.

use crate::libs::error::{Result, SmsnError};
use anyhow::Context;
use cmd_lib::run_fun;
use indexmap::IndexMap;
use std::io::{self, BufRead, BufReader};
use std::process::{Child, Command, Stdio};

fn excerpt(line: &str) -> String {
    line.chars().take(200).collect()
}

/// Hole id of a PacBio read name, `movie/HOLE/start_end`
///
/// ```
/// let line = "m54063_170928_100556/4260642/0_391\t4\t*\t0\t255\t*";
/// assert_eq!(smsn::libs::sam::hole_id_of(line).unwrap(), 4260642);
/// ```
pub fn hole_id_of(line: &str) -> Result<u64> {
    line.split_whitespace()
        .next()
        .and_then(|qname| qname.split('/').nth(1))
        .and_then(|token| token.parse::<u64>().ok())
        .ok_or_else(|| SmsnError::HoleId {
            record: excerpt(line),
        })
}

/// The mandatory fields we use from one SAM line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamRecord<'a> {
    pub movie: &'a str,
    pub hole_id: u64,
    pub flag: u16,
    pub scaffold: &'a str,
    /// 1-based leftmost position, 0 when unmapped
    pub position: u64,
    pub mapq: u8,
    pub cigar: &'a str,
    pub sequence: &'a str,
}

impl<'a> SamRecord<'a> {
    pub fn parse(line: &'a str) -> Result<Self> {
        let fields: Vec<&str> = line.split('\t').collect();
        let error = |message: &str| SmsnError::SamRecord {
            record: excerpt(line),
            message: message.to_string(),
        };

        if fields.len() < 11 {
            return Err(error(&format!("{} fields instead of at least 11", fields.len())));
        }

        let hole_id = hole_id_of(line)?;
        let movie = fields[0].split('/').next().unwrap_or_default();
        let flag = fields[1].parse::<u16>().map_err(|_| error("FLAG"))?;
        let position = fields[3].parse::<u64>().map_err(|_| error("POS"))?;
        let mapq = fields[4].parse::<u8>().map_err(|_| error("MAPQ"))?;

        Ok(SamRecord {
            movie,
            hole_id,
            flag,
            scaffold: fields[2],
            position,
            mapq,
            cigar: fields[5],
            sequence: fields[9],
        })
    }

    pub fn is_unmapped(&self) -> bool {
        self.flag & 0x4 != 0
    }

    pub fn is_reverse(&self) -> bool {
        self.flag & 0x10 != 0
    }
}

/// Alignment lines of a SAM stream, header lines skipped.
///
/// The source is either any reader (file, gzip, stdin, memory) or the stdout of
/// `samtools view`. The child process is reaped at the end of the stream and a
/// failing exit status is reported as the last item.
pub struct SamLines {
    reader: Box<dyn BufRead>,
    child: Option<Child>,
    finished: bool,
    // first record, read ahead by `header()`
    pending: Option<String>,
}

impl SamLines {
    pub fn from_reader(reader: Box<dyn BufRead>) -> Self {
        SamLines {
            reader,
            child: None,
            finished: false,
            pending: None,
        }
    }

    /// `.bam` files go through `samtools view`, everything else is read as SAM text
    pub fn open(input: &str) -> anyhow::Result<Self> {
        if !is_bam(input) {
            return Ok(Self::from_reader(crate::reader(input)?));
        }

        log::debug!("Streaming {} through samtools view", input);
        let mut child = Command::new("samtools")
            .arg("view")
            .arg(input)
            .stdout(Stdio::piped())
            .spawn()
            .with_context(|| format!("could not launch `samtools view {}`", input))?;
        let stdout = child
            .stdout
            .take()
            .context("samtools view has no stdout")?;

        Ok(SamLines {
            reader: Box::new(BufReader::new(stdout)),
            child: Some(child),
            finished: false,
            pending: None,
        })
    }

    fn reap(&mut self) -> io::Result<()> {
        if let Some(mut child) = self.child.take() {
            let status = child.wait()?;
            if !status.success() {
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    format!("samtools view exited with {}", status),
                ));
            }
        }
        Ok(())
    }

    /// The next line without its line terminator, header lines included
    fn raw_line(&mut self) -> Option<io::Result<String>> {
        if self.finished {
            return None;
        }

        let mut buf = String::new();
        match self.reader.read_line(&mut buf) {
            Ok(0) => {
                self.finished = true;
                self.reap().err().map(Err)
            }
            Ok(_) => Some(Ok(buf.trim_end_matches(['\r', '\n']).to_string())),
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }

    /// The leading `@` lines of the stream, joined by `\n`.
    ///
    /// Call it before pulling records; the first record is kept for `next()`. This
    /// is the way to get the header of a stream that can't be opened twice, such as
    /// stdin. `samtools view` doesn't output the header of a BAM.
    pub fn header(&mut self) -> io::Result<String> {
        let mut lines = vec![];
        while self.pending.is_none() {
            match self.raw_line() {
                None => break,
                Some(Err(e)) => return Err(e),
                Some(Ok(line)) => {
                    if line.starts_with('@') {
                        lines.push(line);
                    } else if !line.is_empty() {
                        self.pending = Some(line);
                    }
                }
            }
        }

        Ok(lines.join("\n"))
    }
}

impl Iterator for SamLines {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(line) = self.pending.take() {
            return Some(Ok(line));
        }

        loop {
            match self.raw_line()? {
                Ok(line) if line.is_empty() || line.starts_with('@') => continue,
                other => return Some(other),
            }
        }
    }
}

impl Drop for SamLines {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

pub fn is_bam(input: &str) -> bool {
    input.ends_with(".bam")
}

/// The header as SAM text, without a trailing newline
pub fn read_header(input: &str) -> anyhow::Result<String> {
    if is_bam(input) {
        let header = run_fun!(samtools view -H $input)
            .with_context(|| format!("could not read the header of {}", input))?;
        return Ok(header.trim().to_string());
    }

    let mut lines = vec![];
    for line in crate::reader(input)?.lines() {
        let line = line?;
        if !line.starts_with('@') {
            break;
        }
        lines.push(line.trim_end().to_string());
    }

    Ok(lines.join("\n"))
}

/// Sequencing run information from the `@RG` line
#[derive(Debug, Clone, PartialEq)]
pub struct RunInfo {
    /// `PU`
    pub movie: String,
    pub frame_rate: f64,
    /// `ID`, `PL`, `PU`, `PM`... and the `key=value` pairs of `DS`
    pub fields: IndexMap<String, String>,
}

/// ```
/// let header = "@HD\tVN:1.5\n@RG\tID:3c2d\tPL:PACBIO\tDS:READTYPE=SUBREAD;Ipd:CodecV1=ip;FRAMERATEHZ=80.000000\tPU:m54063\tPM:SEQUEL";
/// let info = smsn::libs::sam::parse_run_info(header).unwrap();
/// assert_eq!(info.movie, "m54063");
/// assert_eq!(info.fields["Ipd:CodecV1"], "ip");
/// ```
pub fn parse_run_info(header: &str) -> anyhow::Result<RunInfo> {
    let rg = header
        .lines()
        .find(|l| l.starts_with("@RG"))
        .context("no @RG line in the header")?;

    let mut fields: IndexMap<String, String> = IndexMap::new();
    for field in rg.split('\t').skip(1) {
        if let Some(ds) = field.strip_prefix("DS:") {
            for pair in ds.split(';').filter(|p| !p.is_empty()) {
                let (key, value) = pair
                    .split_once('=')
                    .with_context(|| format!("malformed DS entry \"{}\"", pair))?;
                fields.insert(key.to_string(), value.to_string());
            }
        } else if let Some((key, value)) = field.split_once(':') {
            fields.insert(key.to_string(), value.to_string());
        }
    }

    if fields.contains_key("Ipd:Frames") {
        log::warn!(
            "The IPDs are stored as raw frames instead of the lossy CodecV1. \
            This was never tested; bax2bam can re-encode old data with CodecV1"
        );
    }

    let movie = fields.get("PU").context("no PU (movie name) in @RG")?.clone();
    let frame_rate = fields
        .get("FRAMERATEHZ")
        .context("no FRAMERATEHZ in @RG")?
        .parse::<f64>()
        .context("FRAMERATEHZ is not a number")?;
    if !(frame_rate > 0.0) {
        anyhow::bail!("FRAMERATEHZ should be positive, got {}", frame_rate);
    }

    Ok(RunInfo {
        movie,
        frame_rate,
        fields,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const HEADER: &str = "@HD\tVN:1.5\tSO:unknown\tpb:3.0.1\n@RG\tID:3c2d9223\tPL:PACBIO\tDS:READTYPE=SUBREAD;Ipd:CodecV1=ip;PulseWidth:CodecV1=pw;BINDINGKIT=100-862-200;SEQUENCINGKIT=101-093-700;BASECALLERVERSION=5.0.0.6236;FRAMERATEHZ=80.000000\tPU:m54063_170928_100556\tPM:SEQUEL\n@PG\tID:baz2bam\tPN:baz2bam\tVN:5.0.0.6236";

    #[test]
    fn test_hole_id() {
        assert_eq!(
            hole_id_of("m54063_170928_100556/4325503/1018_1405 4 *").unwrap(),
            4325503
        );
        for line in ["", "noslash\t4", "movie/abc/0_1\t4", "movie\t4/12/3"] {
            assert!(matches!(hole_id_of(line), Err(SmsnError::HoleId { .. })));
        }
    }

    #[test]
    fn test_sam_record() {
        let line = "m54063_170928_100556/4260642/ccs\t16\tNZ_AVCD01000005.1\t400918\t254\t3S5=1X2=\t*\t0\t0\tACGTACGTACG\t~~~~~~~~~~~\tnp:i:12";
        let rec = SamRecord::parse(line).unwrap();
        assert_eq!(rec.movie, "m54063_170928_100556");
        assert_eq!(rec.hole_id, 4260642);
        assert_eq!(rec.flag, 16);
        assert!(rec.is_reverse());
        assert!(!rec.is_unmapped());
        assert_eq!(rec.scaffold, "NZ_AVCD01000005.1");
        assert_eq!(rec.position, 400918);
        assert_eq!(rec.mapq, 254);
        assert_eq!(rec.cigar, "3S5=1X2=");
        assert_eq!(rec.sequence, "ACGTACGTACG");

        assert!(matches!(
            SamRecord::parse("m/1/2\t0\tchr1\t10"),
            Err(SmsnError::SamRecord { .. })
        ));
        assert!(matches!(
            SamRecord::parse("m/1/2\tx\tchr1\t10\t0\t*\t*\t0\t0\tA\t~"),
            Err(SmsnError::SamRecord { .. })
        ));
    }

    #[test]
    fn test_sam_lines() {
        let text = format!("{}\nm/1/0_10\t4\nm/1/10_20\t4\n\nm/2/0_10\t4\n", HEADER);
        let lines: Vec<String> = SamLines::from_reader(Box::new(Cursor::new(text)))
            .map(|l| l.unwrap())
            .collect();
        assert_eq!(lines, vec!["m/1/0_10\t4", "m/1/10_20\t4", "m/2/0_10\t4"]);
    }

    #[test]
    fn test_sam_lines_header() {
        let text = format!("{}\nm/1/0_10\t4\r\nm/1/10_20\t4\tRG:Z:a b \n", HEADER);
        let mut lines = SamLines::from_reader(Box::new(Cursor::new(text)));
        let header = lines.header().unwrap();
        assert_eq!(header, HEADER);
        // asking again gives nothing more and keeps the first record
        assert_eq!(lines.header().unwrap(), "");

        let records: Vec<String> = lines.map(|l| l.unwrap()).collect();
        // trailing spaces of tag values are kept, CR LF is not
        assert_eq!(records, vec!["m/1/0_10\t4", "m/1/10_20\t4\tRG:Z:a b "]);

        let mut lines = SamLines::from_reader(Box::new(Cursor::new("@HD\tVN:1.5\n")));
        assert_eq!(lines.header().unwrap(), "@HD\tVN:1.5");
        assert!(lines.next().is_none());
    }

    #[test]
    fn test_read_header_text() {
        let header = read_header("tests/smsn/mocked_holes.sam").unwrap();
        assert_eq!(header.lines().count(), 3);
        assert!(header.starts_with("@HD"));
        assert!(!header.ends_with('\n'));
    }

    #[test]
    fn test_run_info() {
        let info = parse_run_info(HEADER).unwrap();
        assert_eq!(info.movie, "m54063_170928_100556");
        assert_eq!(info.frame_rate, 80.0);
        assert_eq!(info.fields["ID"], "3c2d9223");
        assert_eq!(info.fields["PL"], "PACBIO");
        assert_eq!(info.fields["PM"], "SEQUEL");
        assert_eq!(info.fields["READTYPE"], "SUBREAD");
        assert_eq!(info.fields["PulseWidth:CodecV1"], "pw");
        assert_eq!(info.fields["BINDINGKIT"], "100-862-200");
        assert_eq!(info.fields.len(), 11);

        assert!(parse_run_info("@HD\tVN:1.5").is_err());
        assert!(parse_run_info("@RG\tID:x\tPU:m\tDS:FRAMERATEHZ=0").is_err());
    }
}
