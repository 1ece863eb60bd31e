//! Archive layout.
//!
//! Archives are zip files. Entries are classified by suffix:
//!
//! | Entry            | Meaning                                                  |
//! |------------------|----------------------------------------------------------|
//! | `a/b/C.wasm`     | module symbol `a.b.C`                                    |
//! | `*.desc`         | encoded `FileDescriptorSet` (with its imports included)  |
//! | `*.jar`, `*.zip` | nested archive, registered as a root of its own          |
//!
//! Anything else is ignored.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use zip::ZipArchive;

const MODULE_SUFFIX: &str = ".wasm";
const DESCRIPTOR_SUFFIX: &str = ".desc";
const NESTED_SUFFIXES: [&str; 2] = [".jar", ".zip"];

/// Symbol name of a module entry, `None` for other entries.
pub fn module_symbol(entry: &str) -> Option<String> {
    let stem = entry.strip_suffix(MODULE_SUFFIX)?;
    if stem.is_empty() || stem.ends_with('/') {
        return None;
    }
    Some(stem.trim_start_matches('/').replace('/', "."))
}

fn is_nested(entry: &str) -> bool {
    NESTED_SUFFIXES.iter().any(|s| entry.ends_with(s))
}

/// Entries of interest in one archive.
#[derive(Debug, Default)]
pub(crate) struct ScannedArchive {
    /// (symbol, entry name)
    pub modules: Vec<(String, String)>,
    /// (entry name, encoded descriptor set)
    pub descriptor_sets: Vec<(String, Vec<u8>)>,
    /// (entry name, archive bytes)
    pub nested: Vec<(String, Vec<u8>)>,
}

/// Index an archive. Nested archives are read out only when `read_nested`.
pub(crate) fn scan(file: File, read_nested: bool) -> Result<ScannedArchive, String> {
    let mut archive = ZipArchive::new(file).map_err(|e| e.to_string())?;
    let mut scanned = ScannedArchive::default();

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| e.to_string())?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();

        if let Some(symbol) = module_symbol(&name) {
            scanned.modules.push((symbol, name));
        } else if name.ends_with(DESCRIPTOR_SUFFIX) {
            let mut bytes = Vec::new();
            entry
                .read_to_end(&mut bytes)
                .map_err(|e| format!("{}: {}", name, e))?;
            scanned.descriptor_sets.push((name, bytes));
        } else if read_nested && is_nested(&name) {
            let mut bytes = Vec::new();
            entry
                .read_to_end(&mut bytes)
                .map_err(|e| format!("{}: {}", name, e))?;
            scanned.nested.push((name, bytes));
        }
    }
    Ok(scanned)
}

/// Read one entry from a materialized archive.
pub(crate) fn read_entry(path: &Path, entry: &str) -> Result<Vec<u8>, String> {
    let file = File::open(path).map_err(|e| e.to_string())?;
    let mut archive = ZipArchive::new(file).map_err(|e| e.to_string())?;
    let mut zipped = archive.by_name(entry).map_err(|e| format!("{}: {}", entry, e))?;
    let mut bytes = Vec::new();
    zipped
        .read_to_end(&mut bytes)
        .map_err(|e| format!("{}: {}", entry, e))?;
    Ok(bytes)
}

/// Write archive bytes to a scratch file, removed when the handle drops.
pub(crate) fn materialize(bytes: &[u8], scratch_dir: Option<&Path>) -> std::io::Result<NamedTempFile> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("covenant-archive-").suffix(".zip");
    let mut file = match scratch_dir {
        Some(dir) => builder.tempfile_in(dir)?,
        None => builder.tempfile()?,
    };
    file.write_all(bytes)?;
    file.flush()?;
    Ok(file)
}
