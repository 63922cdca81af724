use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::domain::{Finding, SecretScanDoc};
use crate::error::Result;

/// Appends findings to the per-scan JSON-lines boundary file, one
/// `SecretScanDoc` per line.
pub struct DocWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    scan_id: String,
    host_mount_path: String,
}

impl DocWriter {
    /// Open (append) the boundary file for `scan_id` under `dir`.
    pub fn create(dir: &Path, scan_id: &str, host_mount_path: &str) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("strata-scan-{scan_id}.jsonl"));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            scan_id: scan_id.to_string(),
            host_mount_path: host_mount_path.to_string(),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, finding: &Finding) -> Result<()> {
        let mut finding = finding.clone();
        super::strip_host_mount(&mut finding, &self.host_mount_path);
        let doc = SecretScanDoc {
            finding,
            scan_id: self.scan_id.clone(),
        };
        serde_json::to_writer(&mut self.writer, &doc)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
