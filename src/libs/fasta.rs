use anyhow::Context;
use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::Regex;
use std::io::Write;
use std::path::{Path, PathBuf};

lazy_static! {
    // characters the PacBio tools can't cope with in sequence ids
    static ref RE_SPECIAL: Regex = Regex::new(r"[\s.,\-&|\[\]{}/]").unwrap();
}

/// Bases per line in written FASTA files
pub const LINE_WIDTH: usize = 60;

pub fn has_special_chars(id: &str) -> bool {
    RE_SPECIAL.is_match(id)
}

/// ```
/// assert_eq!(smsn::libs::fasta::sanitize_name("NZ_AVCD01.1 plasmid|x"), "NZ_AVCD01_1_plasmid_x");
/// ```
pub fn sanitize_name(id: &str) -> String {
    RE_SPECIAL.replace_all(id, "_").into_owned()
}

/// Scaffold id to upper-case sequence.
///
/// The id is the whole definition line, description included, the way the PacBio
/// tools see it once whitespace is gone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reference {
    scaffolds: IndexMap<String, String>,
}

impl Reference {
    pub fn from_path(input: &str) -> anyhow::Result<Self> {
        let reader = crate::reader(input)?;
        let mut fa_in = noodles_fasta::io::Reader::new(reader);

        let mut scaffolds = IndexMap::new();
        for result in fa_in.records() {
            let record = result.with_context(|| format!("malformed FASTA {}", input))?;
            let name = String::from_utf8(record.name().into())?;
            let id = match record.description() {
                Some(desc) => format!("{} {}", name, String::from_utf8(desc.into())?),
                None => name,
            };
            let seq = String::from_utf8(record.sequence().as_ref().to_ascii_uppercase())?;

            if scaffolds.insert(id.clone(), seq).is_some() {
                log::warn!("Scaffold {} appears more than once in {}", id, input);
            }
        }

        Ok(Reference { scaffolds })
    }

    pub fn from_pairs<I, S, T>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, T)>,
        S: Into<String>,
        T: AsRef<str>,
    {
        let scaffolds = pairs
            .into_iter()
            .map(|(id, seq)| (id.into(), seq.as_ref().to_ascii_uppercase()))
            .collect();
        Reference { scaffolds }
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.scaffolds.get(id).map(|s| s.as_str())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.scaffolds.keys().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.scaffolds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scaffolds.is_empty()
    }

    pub fn has_special_names(&self) -> bool {
        self.scaffolds.keys().any(|id| has_special_chars(id))
    }

    pub fn sanitized(&self) -> Self {
        let scaffolds = self
            .scaffolds
            .iter()
            .map(|(id, seq)| (sanitize_name(id), seq.clone()))
            .collect();
        Reference { scaffolds }
    }

    pub fn write(&self, output: &str) -> anyhow::Result<()> {
        write_fasta(output, self.scaffolds.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }
}

/// Writes records wrapped at [`LINE_WIDTH`]
pub fn write_fasta<'a, I>(output: &str, records: I) -> anyhow::Result<()>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let writer = crate::writer(output)?;
    let mut fa_out = noodles_fasta::io::writer::Builder::default()
        .set_line_base_count(LINE_WIDTH)
        .build_from_writer(writer);

    for (id, seq) in records {
        let definition = noodles_fasta::record::Definition::new(id, None);
        let sequence = noodles_fasta::record::Sequence::from(seq.as_bytes().to_vec());
        fa_out
            .write_record(&noodles_fasta::Record::new(definition, sequence))
            .with_context(|| format!("could not write {}", output))?;
    }
    fa_out.get_mut().flush()?;

    Ok(())
}

/// Loads the reference. Ids with whitespace or special characters are replaced by
/// `_` in `<dir>/whitespacefree_<name>`, which is then the reference to use.
pub fn prepare_reference(input: &str, dir: &Path) -> anyhow::Result<(PathBuf, Reference)> {
    let reference = Reference::from_path(input)?;
    if !reference.has_special_names() {
        return Ok((intspan::absolute_path(input)?, reference));
    }

    log::warn!("At least one id in {} contains whitespace or unsupported characters", input);
    let cleaned = reference.sanitized();
    let file_name = Path::new(input)
        .file_name()
        .with_context(|| format!("{} has no file name", input))?
        .to_string_lossy();
    let path = dir.join(format!("whitespacefree_{}", file_name));
    cleaned.write(&path.to_string_lossy())?;
    log::warn!(
        "Built {} with whitespace-free ids, scaffold names in the results change accordingly. \
        Rename the scaffolds (e.g. with '_') to avoid this",
        path.display()
    );

    Ok((path, cleaned))
}
