use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};

use super::ImportError;

/// Container layouts the importer can walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveKind {
    Tar,
    TarGz,
    /// Unpacked dump: every `*.xml` file in one directory.
    Directory,
    XmlFile,
}

impl ArchiveKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tar => "tar",
            Self::TarGz => "tar.gz",
            Self::Directory => "directory",
            Self::XmlFile => "xml",
        }
    }
}

/// Logical table encoded in a dump entry name.
///
/// `AS_ADDROBJ_20171217_33bb6037-d55f-49e1-bb44-b24e834a7ff5.XML` → `ADDROBJ`.
/// Only the file-name component counts; names without the segment between the
/// first and second `_` carry no table.
pub fn table_name_from_entry(entry: &str) -> Option<String> {
    let file_name = entry.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(entry);
    let mut parts = file_name.split('_');
    parts.next()?;
    let table = parts.next()?;
    parts.next()?;
    if table.is_empty() {
        return None;
    }
    Some(table.to_uppercase())
}

/// Detect the container from magic bytes, falling back to the extension
/// only for bare XML files.
pub fn detect_kind(path: &Path) -> Result<ArchiveKind, ImportError> {
    if path.is_dir() {
        return Ok(ArchiveKind::Directory);
    }

    let mut file = File::open(path)?;
    let mut header = [0u8; 512];
    let bytes_read = read_up_to(&mut file, &mut header)?;

    match &header[..bytes_read] {
        // gzip: 1F 8B
        [0x1F, 0x8B, ..] => Ok(ArchiveKind::TarGz),
        // POSIX tar: "ustar" at offset 257
        h if h.len() >= 262 && &h[257..262] == b"ustar" => Ok(ArchiveKind::Tar),
        _ if has_xml_extension(path) => Ok(ArchiveKind::XmlFile),
        _ => Err(ImportError::UnsupportedArchive(path.to_path_buf())),
    }
}

fn read_up_to(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

fn has_xml_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("xml"))
}

/// A dump on disk, walked entry by entry as byte streams.
#[derive(Debug, Clone)]
pub struct ArchiveSource {
    path: PathBuf,
    kind: ArchiveKind,
}

impl ArchiveSource {
    pub fn open(path: &Path) -> Result<Self, ImportError> {
        let kind = detect_kind(path)?;
        tracing::debug!(path = %path.display(), kind = kind.as_str(), "Archive opened");
        Ok(Self {
            path: path.to_path_buf(),
            kind,
        })
    }

    pub fn kind(&self) -> ArchiveKind {
        self.kind
    }

    /// Visit every entry in archive order with its name and a stream over its
    /// bytes. Entries the visitor does not read are skipped without parsing.
    pub fn for_each_entry<F>(&self, mut visit: F) -> Result<(), ImportError>
    where
        F: FnMut(&str, &mut dyn Read) -> Result<(), ImportError>,
    {
        match self.kind {
            ArchiveKind::Tar => visit_tar(File::open(&self.path)?, &mut visit),
            ArchiveKind::TarGz => visit_tar(GzDecoder::new(File::open(&self.path)?), &mut visit),
            ArchiveKind::Directory => {
                for path in xml_files_in(&self.path)? {
                    let name = file_name_of(&path);
                    let mut file = File::open(&path)?;
                    visit(&name, &mut file)?;
                }
                Ok(())
            }
            ArchiveKind::XmlFile => {
                let name = file_name_of(&self.path);
                let mut file = File::open(&self.path)?;
                visit(&name, &mut file)
            }
        }
    }
}

fn visit_tar<R, F>(reader: R, visit: &mut F) -> Result<(), ImportError>
where
    R: Read,
    F: FnMut(&str, &mut dyn Read) -> Result<(), ImportError>,
{
    let mut archive = tar::Archive::new(reader);
    for entry in archive.entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let name = entry.path()?.to_string_lossy().into_owned();
        visit(&name, &mut entry)?;
    }
    Ok(())
}

fn xml_files_in(dir: &Path) -> Result<Vec<PathBuf>, ImportError> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && has_xml_extension(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
