// src/process/archive.rs
use crate::error::{ItpError, ItpResult, SourceFailure};
use std::io::{Cursor, Read};
use tracing::{debug, info, instrument};
use zip::ZipArchive;

const UTF8_BOM: char = '\u{feff}';

/// The member chosen from an archive, decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveMember {
    pub name: String,
    pub text: String,
}

fn open(year: u16, bytes: &[u8]) -> ItpResult<ZipArchive<Cursor<&[u8]>>> {
    ZipArchive::new(Cursor::new(bytes)).map_err(|e| ItpError::SourceUnavailable {
        year,
        failure: SourceFailure::CorruptArchive(e.to_string()),
    })
}

/// Names of every entry in the archive, in archive order.
pub fn list_members(year: u16, bytes: &[u8]) -> ItpResult<Vec<String>> {
    let archive = open(year, bytes)?;
    Ok(archive.file_names().map(str::to_string).collect())
}

/// Decode the first file entry whose name contains `wanted` (case-insensitive).
#[instrument(level = "info", skip(bytes), fields(bytes = bytes.len()))]
pub fn read_member(year: u16, bytes: &[u8], wanted: &str) -> ItpResult<ArchiveMember> {
    let mut archive = open(year, bytes)?;
    let needle = wanted.to_lowercase();
    debug!(members = archive.len(), "archive opened");

    let mut members = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| ItpError::SourceUnavailable {
            year,
            failure: SourceFailure::CorruptArchive(format!("entry #{}: {}", i, e)),
        })?;
        let name = entry.name().to_string();
        if !entry.is_file() || !name.to_lowercase().contains(&needle) {
            members.push(name);
            continue;
        }

        let mut buf = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut buf)
            .map_err(|e| ItpError::SourceUnavailable {
                year,
                failure: SourceFailure::CorruptArchive(format!("reading {}: {}", name, e)),
            })?;
        let text = String::from_utf8(buf).map_err(|e| ItpError::DecodeFailure {
            year,
            member: name.clone(),
            message: e.to_string(),
        })?;
        let text = match text.strip_prefix(UTF8_BOM) {
            Some(rest) => rest.to_string(),
            None => text,
        };
        info!(member = %name, chars = text.len(), "selected member");
        return Ok(ArchiveMember { name, text });
    }

    Err(ItpError::ArchiveMemberNotFound {
        year,
        wanted: wanted.to_string(),
        members,
    })
}
