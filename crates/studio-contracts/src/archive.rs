//! Batch export of history entries into a zip archive with a prompt manifest.

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::codec::{self, CodecError};
use crate::models::StoredImage;

pub const MANIFEST_FILE_NAME: &str = "prompts.txt";
pub const DEFAULT_ARCHIVE_PREFIX: &str = "image-studio";

const MANIFEST_HEADER: &str = "Prompts for images in this archive:\n\n";
const MANIFEST_SEPARATOR: &str = "----------------------------------------";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("zip packaging failed: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Downloading is not available: no archive backend configured.")]
    Unavailable,
    #[error("Nothing to export: the selection is empty.")]
    NoEntries,
    #[error("image {id} has an unreadable data URL: {source}")]
    Codec {
        id: String,
        #[source]
        source: CodecError,
    },
    #[error("failed to write archive: {0}")]
    ArchiveWrite(#[from] ArchiveError),
}

/// Packaging and save-to-disk facilities used by [`ArchiveExporter`].
pub trait ArchiveBackend {
    fn create_archive(&self, files: &[ArchiveFile]) -> Result<Vec<u8>, ArchiveError>;
    fn save(&self, bytes: &[u8], filename: &str) -> Result<PathBuf, ArchiveError>;
}

impl<B: ArchiveBackend + ?Sized> ArchiveBackend for Box<B> {
    fn create_archive(&self, files: &[ArchiveFile]) -> Result<Vec<u8>, ArchiveError> {
        (**self).create_archive(files)
    }

    fn save(&self, bytes: &[u8], filename: &str) -> Result<PathBuf, ArchiveError> {
        (**self).save(bytes, filename)
    }
}

/// Deflated zip archives saved into a directory.
#[derive(Debug, Clone)]
pub struct ZipDirectoryBackend {
    out_dir: PathBuf,
}

impl ZipDirectoryBackend {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }
}

impl ArchiveBackend for ZipDirectoryBackend {
    fn create_archive(&self, files: &[ArchiveFile]) -> Result<Vec<u8>, ArchiveError> {
        let mut buffer = Vec::new();
        let mut zip = ZipWriter::new(Cursor::new(&mut buffer));
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        for file in files {
            zip.start_file(file.name.as_str(), options)?;
            zip.write_all(&file.bytes)?;
        }
        zip.finish()?;
        drop(zip);
        Ok(buffer)
    }

    fn save(&self, bytes: &[u8], filename: &str) -> Result<PathBuf, ArchiveError> {
        std::fs::create_dir_all(&self.out_dir)?;
        let path = self.out_dir.join(filename);
        std::fs::write(&path, bytes)?;
        Ok(path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    pub path: PathBuf,
    pub archive_name: String,
    pub file_names: Vec<String>,
    pub manifest: String,
}

#[derive(Debug)]
pub struct ArchiveExporter<B: ArchiveBackend> {
    backend: Option<B>,
    prefix: String,
}

impl<B: ArchiveBackend> ArchiveExporter<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend: Some(backend),
            prefix: DEFAULT_ARCHIVE_PREFIX.to_string(),
        }
    }

    /// An exporter whose every export fails with [`ExportError::Unavailable`].
    pub fn unavailable() -> Self {
        Self {
            backend: None,
            prefix: DEFAULT_ARCHIVE_PREFIX.to_string(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    pub fn export(&self, entries: &[StoredImage]) -> Result<ExportReport, ExportError> {
        let Some(backend) = self.backend.as_ref() else {
            return Err(ExportError::Unavailable);
        };
        if entries.is_empty() {
            return Err(ExportError::NoEntries);
        }

        let mut files = Vec::with_capacity(entries.len() + 1);
        let mut manifest = String::from(MANIFEST_HEADER);
        for (idx, entry) in entries.iter().enumerate() {
            let blob = codec::decode(&entry.image_data_url).map_err(|source| ExportError::Codec {
                id: entry.id.clone(),
                source,
            })?;
            let name = archive_image_name(
                idx + 1,
                &entry.id,
                &codec::extension_for_mime(&blob.mime_type),
            );
            manifest.push_str(&manifest_block(&name, entry));
            files.push(ArchiveFile {
                name,
                bytes: blob.bytes,
            });
        }
        let file_names = files.iter().map(|file| file.name.clone()).collect();
        files.push(ArchiveFile {
            name: MANIFEST_FILE_NAME.to_string(),
            bytes: manifest.clone().into_bytes(),
        });

        let archive = backend.create_archive(&files)?;
        let archive_name = format!(
            "{}-batch-{}.zip",
            self.prefix,
            chrono::Utc::now().timestamp_millis()
        );
        let path = backend.save(&archive, &archive_name)?;
        tracing::debug!(path = %path.display(), images = entries.len(), "archive saved");
        Ok(ExportReport {
            path,
            archive_name,
            file_names,
            manifest,
        })
    }
}

pub fn archive_image_name(position: usize, id: &str, extension: &str) -> String {
    format!("image_{position}_{id}.{extension}")
}

fn manifest_block(file_name: &str, entry: &StoredImage) -> String {
    let mut block = format!("File: {file_name}\nType: {}\n", entry.kind);
    if let Some(aspect_ratio) = entry.aspect_ratio {
        block.push_str(&format!("Aspect Ratio: {aspect_ratio}\n"));
    }
    block.push_str(&format!("Prompt: \"{}\"\n", entry.prompt));
    block.push_str(MANIFEST_SEPARATOR);
    block.push_str("\n\n");
    block
}
