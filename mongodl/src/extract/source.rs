use crate::error::DownloaderError;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Mode given to files whose archive entry carries no permission bits at all.
pub const DEFAULT_FILE_MODE: u32 = 0o644;

const S_IFMT: u32 = 0o170000;
const S_IFREG: u32 = 0o100000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    File,
    Directory,
    /// Links, devices and other entries that are never materialized.
    Other,
}

/// One entry of an archive, handed out while the archive is positioned on it.
pub struct ArchiveMember<'a> {
    pub path: String,
    pub kind: MemberKind,
    pub mode: u32,
    pub size: u64,
    reader: &'a mut dyn Read,
}

impl ArchiveMember<'_> {
    pub fn reader(&mut self) -> &mut dyn Read {
        &mut *self.reader
    }
}

pub type MemberVisitor<'v> =
    dyn for<'m> FnMut(ArchiveMember<'m>) -> Result<(), DownloaderError> + 'v;

/// Uniform, in-order access to the members of an archive.
pub trait ArchiveSource {
    fn for_each_member(&mut self, visit: &mut MemberVisitor<'_>) -> Result<(), DownloaderError>;
}

/// Open `path` with the reader its file extension names.
pub fn open_archive(path: &Path) -> Result<Box<dyn ArchiveSource>, DownloaderError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    if name.ends_with(".zip") {
        Ok(Box::new(ZipSource::open(path)?))
    } else if name.ends_with(".tgz") || name.ends_with(".tar.gz") {
        Ok(Box::new(TarGzSource::open(path)?))
    } else {
        Err(DownloaderError::UnsupportedFormat(path.to_path_buf()))
    }
}

/// Symlinks, devices and the like, judged by the file type bits of a unix mode.
fn is_special_file(mode: u32) -> bool {
    let file_type = mode & S_IFMT;
    file_type != 0 && file_type != S_IFREG
}

pub struct TarGzSource {
    archive: tar::Archive<GzDecoder<BufReader<File>>>,
}

impl TarGzSource {
    pub fn open(path: &Path) -> Result<Self, DownloaderError> {
        let file = File::open(path)?;

        Ok(Self {
            archive: tar::Archive::new(GzDecoder::new(BufReader::new(file))),
        })
    }
}

impl ArchiveSource for TarGzSource {
    fn for_each_member(&mut self, visit: &mut MemberVisitor<'_>) -> Result<(), DownloaderError> {
        for entry in self.archive.entries()? {
            let mut entry = entry?;

            let path = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
            let header = entry.header();
            let entry_type = header.entry_type();
            let kind = if entry_type.is_dir() {
                MemberKind::Directory
            } else if entry_type.is_file() {
                MemberKind::File
            } else {
                MemberKind::Other
            };
            let mode = header
                .mode()
                .map(|mode| mode & 0o7777)
                .unwrap_or(DEFAULT_FILE_MODE);
            let size = header.size().unwrap_or(0);

            visit(ArchiveMember {
                path,
                kind,
                mode,
                size,
                reader: &mut entry,
            })?;
        }

        Ok(())
    }
}

pub struct ZipSource {
    archive: zip::ZipArchive<BufReader<File>>,
}

impl ZipSource {
    pub fn open(path: &Path) -> Result<Self, DownloaderError> {
        let file = File::open(path)?;

        Ok(Self {
            archive: zip::ZipArchive::new(BufReader::new(file))?,
        })
    }
}

impl ArchiveSource for ZipSource {
    fn for_each_member(&mut self, visit: &mut MemberVisitor<'_>) -> Result<(), DownloaderError> {
        for index in 0..self.archive.len() {
            let mut file = self.archive.by_index(index)?;

            let path = file.name().to_owned();
            let unix_mode = file.unix_mode();
            let kind = if file.is_dir() {
                MemberKind::Directory
            } else if unix_mode.is_some_and(is_special_file) {
                MemberKind::Other
            } else {
                MemberKind::File
            };
            let mode = unix_mode
                .map(|mode| mode & 0o7777)
                .unwrap_or(DEFAULT_FILE_MODE);
            let size = file.size();

            visit(ArchiveMember {
                path,
                kind,
                mode,
                size,
                reader: &mut file,
            })?;
        }

        Ok(())
    }
}
