//! Siva-style archive codec
//!
//! An archive is a single seekable file: every packed file's bytes laid out
//! back to back, followed by an index block describing them and a fixed-size
//! footer. Readers start from the footer, so the index can be located without
//! scanning the content.
//!
//! ```text
//! [file 0][file 1]...[file n-1][index][footer]
//!
//! index  = "IBA" version:u8 entry*
//! entry  = name_len:u32 name mode:u32 mod_time:i64 offset:u64 size:u64 flags:u32
//! footer = entry_count:u32 index_size:u64 block_size:u64 checksum:u32
//! ```
//!
//! Integers are big endian. `checksum` is the first four bytes of the
//! SHA-256 of the index.

use crate::error::ArchiveError;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Component, Path};
use std::time::UNIX_EPOCH;
use walkdir::WalkDir;

const INDEX_SIGNATURE: &[u8; 3] = b"IBA";
const INDEX_VERSION: u8 = 1;
const FOOTER_SIZE: u64 = 24;
/// Encoded size of an entry with an empty name
const MIN_ENTRY_SIZE: u64 = 36;

/// One file described by the archive index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Slash separated path relative to the packed directory
    pub name: String,
    /// Unix permission bits
    pub mode: u32,
    /// Modification time in nanoseconds since the Unix epoch
    pub mod_time: i64,
    /// Offset of the content from the start of the archive
    pub offset: u64,
    /// Content length in bytes
    pub size: u64,
    pub flags: u32,
}

impl IndexEntry {
    fn encode(&self, out: &mut Vec<u8>) {
        let name = self.name.as_bytes();
        out.extend_from_slice(&(name.len() as u32).to_be_bytes());
        out.extend_from_slice(name);
        out.extend_from_slice(&self.mode.to_be_bytes());
        out.extend_from_slice(&self.mod_time.to_be_bytes());
        out.extend_from_slice(&self.offset.to_be_bytes());
        out.extend_from_slice(&self.size.to_be_bytes());
        out.extend_from_slice(&self.flags.to_be_bytes());
    }

    fn decode(cursor: &mut &[u8]) -> Result<Self, ArchiveError> {
        let name_len = take_u32(cursor)? as usize;
        let name = take(cursor, name_len)?;
        let name = String::from_utf8(name.to_vec())
            .map_err(|_| ArchiveError::InvalidEntryName("name is not UTF-8".to_string()))?;

        Ok(Self {
            name,
            mode: take_u32(cursor)?,
            mod_time: take_u64(cursor)? as i64,
            offset: take_u64(cursor)?,
            size: take_u64(cursor)?,
            flags: take_u32(cursor)?,
        })
    }
}

fn take<'a>(cursor: &mut &'a [u8], len: usize) -> Result<&'a [u8], ArchiveError> {
    if cursor.len() < len {
        return Err(ArchiveError::Truncated(format!(
            "expected {} more index bytes, found {}",
            len,
            cursor.len()
        )));
    }
    let (head, tail) = cursor.split_at(len);
    *cursor = tail;
    Ok(head)
}

fn take_u32(cursor: &mut &[u8]) -> Result<u32, ArchiveError> {
    let bytes = take(cursor, 4)?;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn take_u64(cursor: &mut &[u8]) -> Result<u64, ArchiveError> {
    let bytes = take(cursor, 8)?;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    Ok(u64::from_be_bytes(buf))
}

fn checksum(index: &[u8]) -> u32 {
    let digest = Sha256::digest(index);
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

#[cfg(unix)]
fn file_mode(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn file_mode(_meta: &fs::Metadata) -> u32 {
    0o644
}

fn entry_name(root: &Path, path: &Path) -> Result<String, ArchiveError> {
    let relative = path
        .strip_prefix(root)
        .map_err(|_| ArchiveError::InvalidEntryName(path.display().to_string()))?;

    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            _ => return Err(ArchiveError::InvalidEntryName(relative.display().to_string())),
        }
    }
    Ok(parts.join("/"))
}

/// Pack every regular file under `dir` into a new archive at `archive`.
///
/// Entries are written in sorted path order so packing the same tree twice
/// yields the same index. Returns the archive size in bytes.
pub fn pack_dir(dir: &Path, archive: &Path) -> Result<u64, ArchiveError> {
    let mut out = BufWriter::new(File::create(archive)?);
    let mut entries = Vec::new();
    let mut offset = 0u64;

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| ArchiveError::Io(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let meta = entry.metadata().map_err(|e| ArchiveError::Io(e.into()))?;
        let mod_time = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos() as i64)
            .unwrap_or(0);

        let mut file = File::open(entry.path())?;
        let size = std::io::copy(&mut file, &mut out)?;

        entries.push(IndexEntry {
            name: entry_name(dir, entry.path())?,
            mode: file_mode(&meta),
            mod_time,
            offset,
            size,
            flags: 0,
        });
        offset += size;
    }

    let mut index = Vec::with_capacity(4 + entries.len() * 64);
    index.extend_from_slice(INDEX_SIGNATURE);
    index.push(INDEX_VERSION);
    for entry in &entries {
        entry.encode(&mut index);
    }

    let block_size = offset + index.len() as u64 + FOOTER_SIZE;
    out.write_all(&index)?;
    out.write_all(&(entries.len() as u32).to_be_bytes())?;
    out.write_all(&(index.len() as u64).to_be_bytes())?;
    out.write_all(&block_size.to_be_bytes())?;
    out.write_all(&checksum(&index).to_be_bytes())?;
    out.flush()?;
    out.into_inner()
        .map_err(|e| ArchiveError::Io(e.into_error()))?
        .sync_all()?;

    tracing::debug!(
        "Packed {} files ({} bytes) into {}",
        entries.len(),
        block_size,
        archive.display()
    );
    Ok(block_size)
}

/// Read and verify the index of an archive
pub fn read_index<R: Read + Seek>(reader: &mut R) -> Result<Vec<IndexEntry>, ArchiveError> {
    let len = reader.seek(SeekFrom::End(0))?;
    if len < FOOTER_SIZE {
        return Err(ArchiveError::Truncated(format!(
            "archive is {} bytes, footer needs {}",
            len, FOOTER_SIZE
        )));
    }

    reader.seek(SeekFrom::Start(len - FOOTER_SIZE))?;
    let mut footer = [0u8; FOOTER_SIZE as usize];
    reader.read_exact(&mut footer)?;
    let mut cursor = &footer[..];
    let entry_count = take_u32(&mut cursor)?;
    let index_size = take_u64(&mut cursor)?;
    let block_size = take_u64(&mut cursor)?;
    let expected = take_u32(&mut cursor)?;

    if block_size != len || index_size > len - FOOTER_SIZE {
        return Err(ArchiveError::Truncated(format!(
            "footer describes {} bytes, archive has {}",
            block_size, len
        )));
    }

    reader.seek(SeekFrom::Start(len - FOOTER_SIZE - index_size))?;
    let mut index = vec![0u8; index_size as usize];
    reader.read_exact(&mut index)?;
    if checksum(&index) != expected {
        return Err(ArchiveError::ChecksumMismatch);
    }

    let mut cursor = &index[..];
    if take(&mut cursor, 3)? != INDEX_SIGNATURE {
        return Err(ArchiveError::InvalidSignature);
    }
    let version = take(&mut cursor, 1)?[0];
    if version != INDEX_VERSION {
        return Err(ArchiveError::UnsupportedVersion(version));
    }

    // The footer is not covered by the checksum
    if u64::from(entry_count) > cursor.len() as u64 / MIN_ENTRY_SIZE {
        return Err(ArchiveError::Truncated(format!(
            "footer lists {} entries, index holds at most {}",
            entry_count,
            cursor.len() as u64 / MIN_ENTRY_SIZE
        )));
    }

    let data_end = len - FOOTER_SIZE - index_size;
    let mut entries = Vec::with_capacity(entry_count as usize);
    for _ in 0..entry_count {
        let entry = IndexEntry::decode(&mut cursor)?;
        let end = entry.offset.checked_add(entry.size);
        if end.is_none_or(|end| end > data_end) {
            return Err(ArchiveError::Truncated(format!(
                "entry '{}' points past the content block",
                entry.name
            )));
        }
        entries.push(entry);
    }

    Ok(entries)
}

fn safe_target(dir: &Path, name: &str) -> Result<std::path::PathBuf, ArchiveError> {
    let relative = Path::new(name);
    if name.is_empty()
        || relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
    {
        return Err(ArchiveError::InvalidEntryName(name.to_string()));
    }
    Ok(dir.join(relative))
}

/// Unpack an archive into `dir`, returning the number of files written
pub fn unpack(archive: &Path, dir: &Path) -> Result<usize, ArchiveError> {
    let mut reader = BufReader::new(File::open(archive)?);
    let entries = read_index(&mut reader)?;

    for entry in &entries {
        let target = safe_target(dir, &entry.name)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        reader.seek(SeekFrom::Start(entry.offset))?;
        let mut out = File::create(&target)?;
        let written = std::io::copy(&mut (&mut reader).take(entry.size), &mut out)?;
        if written != entry.size {
            return Err(ArchiveError::Truncated(format!(
                "entry '{}' has {} of {} bytes",
                entry.name, written, entry.size
            )));
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if entry.mode != 0 {
                fs::set_permissions(&target, fs::Permissions::from_mode(entry.mode))?;
            }
        }
    }

    tracing::debug!(
        "Unpacked {} files from {} into {}",
        entries.len(),
        archive.display(),
        dir.display()
    );
    Ok(entries.len())
}
