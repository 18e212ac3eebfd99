use anyhow::Context;
use std::io::{BufRead, BufReader, BufWriter, Write};

/// Opens `input` for line reading. `stdin` reads the standard input, `.gz` files are
/// decompressed on the fly.
///
/// ```
/// use std::io::BufRead;
/// let reader = smsn::reader("tests/smsn/mocked_holes.sam").unwrap();
/// let records = reader
///     .lines()
///     .map(|l| l.unwrap())
///     .filter(|l| !l.starts_with('@'))
///     .count();
/// assert_eq!(records, 11);
/// ```
pub fn reader(input: &str) -> anyhow::Result<Box<dyn BufRead>> {
    let reader: Box<dyn BufRead> = if input == "stdin" {
        Box::new(BufReader::new(std::io::stdin()))
    } else {
        let path = std::path::Path::new(input);
        let file = std::fs::File::open(path)
            .with_context(|| format!("could not open {}", path.display()))?;

        if path.extension() == Some(std::ffi::OsStr::new("gz")) {
            Box::new(BufReader::new(flate2::read::MultiGzDecoder::new(file)))
        } else {
            Box::new(BufReader::new(file))
        }
    };

    Ok(reader)
}

/// `stdout` writes to the screen, anything else is created (or truncated) as a file.
pub fn writer(output: &str) -> anyhow::Result<Box<dyn Write>> {
    let writer: Box<dyn Write> = if output == "stdout" {
        Box::new(BufWriter::new(std::io::stdout()))
    } else {
        let file = std::fs::File::create(output)
            .with_context(|| format!("could not create {}", output))?;
        Box::new(BufWriter::new(file))
    };

    Ok(writer)
}

/// Reads a list of integer ids, one per line; blank lines and `#` comments are skipped.
pub fn read_ids(input: &str) -> anyhow::Result<fxhash::FxHashSet<u64>> {
    let mut ids = fxhash::FxHashSet::default();
    for line in reader(input)?.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let id = line
            .parse::<u64>()
            .with_context(|| format!("invalid hole id \"{}\" in {}", line, input))?;
        ids.insert(id);
    }

    Ok(ids)
}
