use crate::model::{CanonicalRecord, DiagnosticArtifact};
use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

pub trait RecordSink {
    fn emit(&mut self, record: &CanonicalRecord) -> Result<()>;
    fn diagnostic(&mut self, artifact: &DiagnosticArtifact) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemorySink {
    pub records: Vec<CanonicalRecord>,
    pub diagnostics: Vec<DiagnosticArtifact>,
}

impl RecordSink for MemorySink {
    fn emit(&mut self, record: &CanonicalRecord) -> Result<()> {
        self.records.push(record.clone());
        Ok(())
    }

    fn diagnostic(&mut self, artifact: &DiagnosticArtifact) -> Result<()> {
        self.diagnostics.push(artifact.clone());
        Ok(())
    }
}

/// Appends one JSON object per record; diagnostics land next to it as an
/// `.html` snapshot plus a `.json` sidecar.
pub struct JsonLinesSink {
    records_path: PathBuf,
    writer: BufWriter<File>,
    diagnostics_dir: PathBuf,
    diagnostics_written: usize,
}

impl JsonLinesSink {
    pub fn create(records_path: &Path, diagnostics_dir: &Path) -> Result<Self> {
        if let Some(parent) = records_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create output directory {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(records_path)
            .with_context(|| format!("failed to open records file {}", records_path.display()))?;

        Ok(Self {
            records_path: records_path.to_path_buf(),
            writer: BufWriter::new(file),
            diagnostics_dir: diagnostics_dir.to_path_buf(),
            diagnostics_written: 0,
        })
    }

    pub fn records_path(&self) -> &Path {
        &self.records_path
    }

    pub fn diagnostics_written(&self) -> usize {
        self.diagnostics_written
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer
            .flush()
            .with_context(|| format!("failed to flush {}", self.records_path.display()))
    }
}

impl RecordSink for JsonLinesSink {
    fn emit(&mut self, record: &CanonicalRecord) -> Result<()> {
        let line = serde_json::to_string(record)?;
        writeln!(self.writer, "{line}")
            .with_context(|| format!("failed to write {}", self.records_path.display()))?;
        Ok(())
    }

    fn diagnostic(&mut self, artifact: &DiagnosticArtifact) -> Result<()> {
        std::fs::create_dir_all(&self.diagnostics_dir).with_context(|| {
            format!(
                "failed to create diagnostics directory {}",
                self.diagnostics_dir.display()
            )
        })?;

        let stem = format!("{}-{}", artifact.name, artifact.digest);
        let markup_path = self.diagnostics_dir.join(format!("{stem}.html"));
        std::fs::write(&markup_path, &artifact.markup)
            .with_context(|| format!("failed to write {}", markup_path.display()))?;

        let sidecar_path = self.diagnostics_dir.join(format!("{stem}.json"));
        std::fs::write(&sidecar_path, serde_json::to_string_pretty(artifact)?)
            .with_context(|| format!("failed to write {}", sidecar_path.display()))?;

        self.diagnostics_written += 1;
        info!(file = %markup_path.display(), "diagnostic artifact written");
        Ok(())
    }
}

impl Drop for JsonLinesSink {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}

pub fn read_records(path: &Path) -> Result<Vec<CanonicalRecord>> {
    let file =
        File::open(path).with_context(|| format!("failed to open records file {}", path.display()))?;

    let mut records = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line)
            .with_context(|| format!("failed to parse record at {}:{}", path.display(), index + 1))?;
        records.push(record);
    }
    Ok(records)
}
