//! Project export as a gzip-compressed tarball.

use std::fs::File;
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;

use crate::plugins::store::Project;

const ARCHIVE_EXTENSION: &str = ".tar.gz";
const FALLBACK_ARCHIVE_STEM: &str = "project";

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("Project has no files")]
    Empty,
    #[error("Invalid file path in project: {0}")]
    InvalidPath(String),
    #[error("Export failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Writes a project's files somewhere outside the store.
pub trait ProjectExporter: Send + Sync {
    /// Returns the path of the written archive.
    fn export(&self, project: &Project, out_dir: &Path) -> Result<PathBuf, ExportError>;
}

/// Archive file name: runs of characters outside `[A-Za-z0-9_-]` become `_`.
pub fn archive_file_name(project_name: &str) -> String {
    let mut stem = String::with_capacity(project_name.len());
    let mut in_run = false;
    for ch in project_name.chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' {
            stem.push(ch);
            in_run = false;
        } else if !in_run {
            stem.push('_');
            in_run = true;
        }
    }
    if project_name.is_empty() {
        stem.push_str(FALLBACK_ARCHIVE_STEM);
    }
    format!("{stem}{ARCHIVE_EXTENSION}")
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TarGzExporter;

impl ProjectExporter for TarGzExporter {
    fn export(&self, project: &Project, out_dir: &Path) -> Result<PathBuf, ExportError> {
        if project.files.is_empty() {
            return Err(ExportError::Empty);
        }

        std::fs::create_dir_all(out_dir)?;
        let archive_path = out_dir.join(archive_file_name(&project.name));
        let tmp_path = archive_path.with_extension("gz.tmp");

        let result = write_archive(project, &tmp_path);
        if let Err(err) = result {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(err);
        }
        std::fs::rename(&tmp_path, &archive_path)?;

        log::info!(
            "Exported project {} ({} files) to {}",
            project.id,
            project.files.len(),
            archive_path.display()
        );
        Ok(archive_path)
    }
}

fn write_archive(project: &Project, path: &Path) -> Result<(), ExportError> {
    let file = File::create(path)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for (file_path, entry) in &project.files {
        let relative = file_path.trim_start_matches('/');
        if relative.is_empty() {
            return Err(ExportError::InvalidPath(file_path.clone()));
        }

        let bytes = entry.content.as_bytes();
        let mut header = tar::Header::new_gnu();
        header.set_size(bytes.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(project.updated_at / 1000);
        header.set_cksum();
        builder
            .append_data(&mut header, relative, bytes)
            .map_err(|_| ExportError::InvalidPath(file_path.clone()))?;
    }

    let encoder = builder.into_inner()?;
    encoder.finish()?;
    Ok(())
}
