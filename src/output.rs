//! CSV output of repository records

use crate::types::{RECORD_HEADER, RepositoryRecord};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Writes one CSV row per record, flushing after each so partial runs are
/// still usable
pub struct RecordWriter<W: Write> {
    out: W,
    written: usize,
}

impl RecordWriter<BufWriter<File>> {
    /// Create the output file, replacing an existing one, and write the header
    pub fn create(path: &Path) -> Result<Self> {
        match std::fs::metadata(path) {
            Ok(_) => {
                tracing::warn!("File {} exists, it will be deleted", path.display());
                std::fs::remove_file(path)
                    .with_context(|| format!("Unable to remove {}", path.display()))?;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e).with_context(|| format!("Unable to stat {}", path.display()));
            }
        }

        let file = File::create(path)
            .with_context(|| format!("Unable to create file {}", path.display()))?;
        Self::new(BufWriter::new(file))
    }
}

impl<W: Write> RecordWriter<W> {
    pub fn new(out: W) -> Result<Self> {
        let mut writer = Self { out, written: 0 };
        writer.write_row(RECORD_HEADER.iter().copied())?;
        Ok(writer)
    }

    pub fn write(&mut self, record: &RepositoryRecord) -> Result<()> {
        let row = record.to_row();
        self.write_row(row.iter().map(String::as_str))
            .with_context(|| format!("Unable to write record of {}", record.url))?;
        self.written += 1;
        Ok(())
    }

    /// Records written so far, header excluded
    pub fn written(&self) -> usize {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_row<'a>(&mut self, fields: impl Iterator<Item = &'a str>) -> Result<()> {
        let line = fields.map(escape).collect::<Vec<_>>().join(",");
        writeln!(self.out, "{}", line)?;
        self.out.flush()?;
        Ok(())
    }
}

/// Quote a field when it holds a separator, a quote or a line break
fn escape(field: &str) -> std::borrow::Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\"")).into()
    } else {
        field.into()
    }
}

/// Set each record's fork count: for every archive it lists, the number of
/// other records listing the same archive
pub fn set_forks(records: &mut [RepositoryRecord]) {
    let mut repos_by_siva: HashMap<String, usize> = HashMap::new();
    for record in records.iter() {
        for siva in &record.siva_files {
            *repos_by_siva.entry(siva.clone()).or_default() += 1;
        }
    }

    for record in records.iter_mut() {
        let forks: usize = record
            .siva_files
            .iter()
            .map(|siva| repos_by_siva.get(siva).copied().unwrap_or(1) - 1)
            .sum();
        record.forks += forks;
    }
}
