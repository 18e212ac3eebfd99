//! Merges the batch files into the final table.

use crate::libs::batch::BATCH_FILE_PREFIX;
use crate::libs::error::{Result, SmsnError};
use anyhow::{anyhow, bail, Context};
use indexmap::IndexSet;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileSummary {
    pub files: usize,
    pub rows: usize,
    pub duplicates: usize,
}

fn batch_number(path: &Path) -> Option<usize> {
    path.file_name()?
        .to_str()?
        .strip_prefix(BATCH_FILE_PREFIX)?
        .strip_suffix(".csv")?
        .parse()
        .ok()
}

/// `tmp_analysis_chunk_<n>.csv` files of `dir`, by increasing `n`
pub fn list_batch_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files: Vec<(usize, PathBuf)> = vec![];
    for entry in std::fs::read_dir(dir).with_context(|| format!("could not read {}", dir.display()))? {
        let path = entry?.path();
        if let Some(n) = batch_number(&path) {
            files.push((n, path));
        }
    }
    files.sort();

    Ok(files.into_iter().map(|(_, p)| p).collect())
}

type SortKey = [(bool, u64); 3];

/// `(HoleID, tpl, strand)`, missing values last
fn sort_key(line: &str, idx: &[usize; 3]) -> SortKey {
    let fields: Vec<&str> = line.split(',').collect();
    idx.map(|i| match fields.get(i).and_then(|f| f.parse::<u64>().ok()) {
        Some(v) => (false, v),
        None => (true, 0),
    })
}

fn merge(files: &[PathBuf], output: &str) -> anyhow::Result<CompileSummary> {
    if files.is_empty() {
        bail!("no {}<n>.csv file", BATCH_FILE_PREFIX);
    }

    let mut header: Option<String> = None;
    let mut rows: IndexSet<String> = IndexSet::new();
    let mut total = 0;
    for file in files {
        let mut lines = crate::reader(&file.to_string_lossy())?.lines();
        let first = match lines.next() {
            Some(line) => line?,
            None => bail!("{} is empty", file.display()),
        };
        match &header {
            None => header = Some(first),
            Some(h) if *h != first => {
                bail!("{} doesn't have the columns of {}", file.display(), files[0].display())
            }
            _ => {}
        }

        for line in lines {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            total += 1;
            rows.insert(line);
        }
    }
    let header = header.ok_or_else(|| anyhow!("no header"))?;

    let names: Vec<&str> = header.split(',').collect();
    let mut idx = [0usize; 3];
    for (slot, name) in idx.iter_mut().zip(["HoleID", "tpl", "strand"]) {
        *slot = names
            .iter()
            .position(|n| *n == name)
            .ok_or_else(|| anyhow!("no {} column", name))?;
    }

    let mut rows: Vec<String> = rows.into_iter().collect();
    rows.sort_by_cached_key(|line| sort_key(line, &idx));

    let mut writer = crate::writer(output)?;
    writeln!(writer, "{}", header)?;
    for row in &rows {
        writeln!(writer, "{}", row)?;
    }
    writer.flush()?;

    Ok(CompileSummary {
        files: files.len(),
        rows: rows.len(),
        duplicates: total - rows.len(),
    })
}

/// Concatenates the batch files of `dir` into `output`, dropping duplicated rows and
/// sorting by `(HoleID, tpl, strand)`.
///
/// The batch files are removed on success and left untouched otherwise.
pub fn compile(dir: &Path, output: &str) -> Result<CompileSummary> {
    let files = list_batch_files(dir).map_err(|e| compilation_error(dir, output, e))?;
    compile_files(dir, &files, output)
}

/// Same as [`compile`], restricted to `files`. Other batch files of `dir`, left by an
/// earlier run, are neither read nor removed.
pub fn compile_files(dir: &Path, files: &[PathBuf], output: &str) -> Result<CompileSummary> {
    let summary = merge(files, output).map_err(|e| compilation_error(dir, output, e))?;
    log::info!(
        "Compiled {} rows from {} batch files into {} ({} duplicates dropped)",
        summary.rows,
        summary.files,
        output,
        summary.duplicates
    );

    for file in files {
        if let Err(e) = std::fs::remove_file(file) {
            log::warn!("Could not remove {}: {}", file.display(), e);
        }
    }

    Ok(summary)
}

fn compilation_error(dir: &Path, output: &str, e: anyhow::Error) -> SmsnError {
    SmsnError::Compilation {
        output: output.to_string(),
        dir: dir.display().to_string(),
        message: format!("{:#}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const HEADER: &str = "HoleID,scaffold,tpl,strand,base,score,tMean,tErr,modelPrediction,ipdRatio,coverage,isboundary";

    fn write(dir: &Path, name: &str, lines: &[&str]) {
        std::fs::write(dir.join(name), lines.join("\n") + "\n").unwrap();
    }

    #[test]
    fn test_list_batch_files() {
        let tmp = TempDir::new().unwrap();
        for name in [
            "tmp_analysis_chunk_10.csv",
            "tmp_analysis_chunk_2.csv",
            "tmp_analysis_chunk_0.csv",
            "tmp_analysis_chunk_x.csv",
            "aligned_CCS_m54063.csv",
        ] {
            write(tmp.path(), name, &[HEADER]);
        }
        let files = list_batch_files(tmp.path()).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "tmp_analysis_chunk_0.csv",
                "tmp_analysis_chunk_2.csv",
                "tmp_analysis_chunk_10.csv"
            ]
        );
    }

    #[test]
    fn test_compile() {
        let tmp = TempDir::new().unwrap();
        write(
            tmp.path(),
            "tmp_analysis_chunk_0.csv",
            &[
                HEADER,
                "4325503,chr1,12,1,A,3,1.0,0.1,1.0,1.0,9,False",
                "4325503,chr1,12,0,T,3,1.0,0.1,1.0,1.0,9,False",
                "4260763,,,,,,,,,,,",
            ],
        );
        write(
            tmp.path(),
            "tmp_analysis_chunk_1.csv",
            &[
                HEADER,
                "4260642,chr1,30,0,G,3,1.0,0.1,1.0,1.0,9,True",
                "4260642,chr1,4,0,C,3,1.0,0.1,1.0,1.0,9,True",
                "4325503,chr1,12,1,A,3,1.0,0.1,1.0,1.0,9,False",
            ],
        );

        let output = tmp.path().join("out.csv");
        let summary = compile(tmp.path(), output.to_str().unwrap()).unwrap();
        assert_eq!(
            summary,
            CompileSummary {
                files: 2,
                rows: 5,
                duplicates: 1
            }
        );

        let text = std::fs::read_to_string(&output).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                HEADER,
                "4260642,chr1,4,0,C,3,1.0,0.1,1.0,1.0,9,True",
                "4260642,chr1,30,0,G,3,1.0,0.1,1.0,1.0,9,True",
                "4260763,,,,,,,,,,,",
                "4325503,chr1,12,0,T,3,1.0,0.1,1.0,1.0,9,False",
                "4325503,chr1,12,1,A,3,1.0,0.1,1.0,1.0,9,False",
            ]
        );

        // batch files are gone, the output stays
        assert!(list_batch_files(tmp.path()).unwrap().is_empty());
        assert!(output.is_file());
    }

    #[test]
    fn test_compile_files_ignores_others() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "tmp_analysis_chunk_0.csv", &[HEADER, "4260642,chr1,4,0,C,3,1.0,0.1,1.0,1.0,9,True"]);
        write(tmp.path(), "tmp_analysis_chunk_7.csv", &[HEADER, "999,chrX,1,0,A,3,1.0,0.1,1.0,1.0,9,False"]);

        let output = tmp.path().join("out.csv");
        let files = vec![tmp.path().join("tmp_analysis_chunk_0.csv")];
        let summary = compile_files(tmp.path(), &files, output.to_str().unwrap()).unwrap();
        assert_eq!(summary.rows, 1);

        let text = std::fs::read_to_string(&output).unwrap();
        assert!(!text.contains("999,chrX"));
        assert_eq!(
            list_batch_files(tmp.path()).unwrap(),
            vec![tmp.path().join("tmp_analysis_chunk_7.csv")]
        );
    }

    #[test]
    fn test_compile_failure_keeps_files() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "tmp_analysis_chunk_0.csv", &[HEADER, "1,chr1,1,0"]);
        write(tmp.path(), "tmp_analysis_chunk_1.csv", &["HoleID,tpl", "2,5"]);

        let output = tmp.path().join("out.csv");
        match compile(tmp.path(), output.to_str().unwrap()) {
            Err(SmsnError::Compilation { dir, message, .. }) => {
                assert_eq!(dir, tmp.path().display().to_string());
                assert!(message.contains("tmp_analysis_chunk_1.csv"));
            }
            other => panic!("expected a compilation error, got {:?}", other),
        }
        assert_eq!(list_batch_files(tmp.path()).unwrap().len(), 2);

        let empty = TempDir::new().unwrap();
        assert!(matches!(
            compile(empty.path(), "stdout"),
            Err(SmsnError::Compilation { .. })
        ));
    }
}
