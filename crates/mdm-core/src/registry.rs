//! Local file registry: what is on disk, per region.
//!
//! Reconstructs per-region records from the storage root, prunes obsolete
//! versions eagerly and applies part deletes with the base-to-auxiliary
//! cascade. Filesystem removals are best-effort: a residual file is logged
//! and left for the next `scan` rather than failing the operation.

use crate::layout;
use crate::part::{Part, PartSet};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// One concrete on-disk version of a region's files.
#[derive(Debug, Clone)]
pub struct LocalFile {
    name: String,
    version: i64,
    parts: PartSet,
    base_size: u64,
    aux_size: u64,
    dir: PathBuf,
}

impl LocalFile {
    fn new(name: &str, version: i64, dir: PathBuf) -> LocalFile {
        LocalFile {
            name: name.to_string(),
            version,
            parts: PartSet::EMPTY,
            base_size: 0,
            aux_size: 0,
            dir,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn parts(&self) -> PartSet {
        self.parts
    }

    /// Path of one part file within this record's version directory.
    pub fn path(&self, part: Part) -> PathBuf {
        self.dir.join(layout::part_file_name(&self.name, part))
    }

    pub fn size(&self, part: Part) -> u64 {
        match part {
            Part::Base => self.base_size,
            Part::Auxiliary => self.aux_size,
        }
    }

    /// Total on-disk bytes for the present subset of `parts`.
    pub fn size_of(&self, parts: PartSet) -> u64 {
        parts
            .intersect(self.parts)
            .parts()
            .map(|part| self.size(part))
            .sum()
    }

    fn set_part(&mut self, part: Part, size: u64) {
        self.parts.insert(part);
        match part {
            Part::Base => self.base_size = size,
            Part::Auxiliary => self.aux_size = size,
        }
    }

    fn clear_part(&mut self, part: Part) {
        self.parts.remove(part);
        match part {
            Part::Base => self.base_size = 0,
            Part::Auxiliary => self.aux_size = 0,
        }
    }
}

/// Registry of local file records under one storage root.
pub struct Registry {
    root: PathBuf,
    records: HashMap<String, LocalFile>,
}

impl Registry {
    /// Creates an empty registry. Call `scan` to populate it from disk.
    pub fn new(root: PathBuf) -> Registry {
        Registry {
            root,
            records: HashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Rebuilds the record set from disk, deleting the files of every record
    /// superseded by a greater version of the same region. Idempotent: a
    /// second scan over a pruned tree changes nothing.
    pub fn scan(&mut self) {
        self.records.clear();
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::debug!(root = %self.root.display(), %err, "storage root not readable");
                return;
            }
        };

        let mut found: HashMap<String, Vec<LocalFile>> = HashMap::new();
        for entry in entries.flatten() {
            let dir_name = entry.file_name();
            let Ok(version) = dir_name.to_string_lossy().parse::<i64>() else {
                continue;
            };
            let dir = entry.path();
            if !dir.is_dir() {
                continue;
            }
            let files = match fs::read_dir(&dir) {
                Ok(files) => files,
                Err(err) => {
                    tracing::warn!(dir = %dir.display(), %err, "failed to read version directory");
                    continue;
                }
            };
            for file in files.flatten() {
                let file_name = file.file_name();
                let file_name_str = file_name.to_string_lossy();
                let Some((name, part)) = layout::parse_part_file_name(&file_name_str)
                else {
                    continue;
                };
                let size = file.metadata().map(|m| m.len()).unwrap_or(0);
                let candidates = found.entry(name.to_string()).or_default();
                match candidates.iter_mut().find(|f| f.version == version) {
                    Some(record) => record.set_part(part, size),
                    None => {
                        let mut record = LocalFile::new(name, version, dir.clone());
                        record.set_part(part, size);
                        candidates.push(record);
                    }
                }
            }
        }

        for (name, mut versions) in found {
            versions.sort_by_key(|f| f.version);
            let newest = versions.pop().expect("every scanned name has a record");
            for obsolete in versions {
                tracing::info!(
                    region = %name,
                    version = obsolete.version,
                    kept = newest.version,
                    "pruning obsolete version"
                );
                delete_record_files(&obsolete);
            }
            self.records.insert(name, newest);
        }
    }

    /// The surviving record for a region, or none.
    pub fn latest(&self, name: &str) -> Option<&LocalFile> {
        self.records.get(name)
    }

    /// Removes the given parts (plus their dependents) from the region's
    /// current record. The record disappears entirely, sidecar index
    /// included, once its part set becomes empty. Returns the remaining
    /// parts.
    pub fn apply_part_delete(&mut self, name: &str, parts: PartSet) -> PartSet {
        let parts = parts.with_dependents();
        let Some(record) = self.records.get_mut(name) else {
            return PartSet::EMPTY;
        };
        for part in parts.intersect(record.parts).parts() {
            remove_file_logged(&record.path(part));
            record.clear_part(part);
        }
        if record.parts.is_empty() {
            let dir = record.dir.clone();
            remove_file_logged(&dir.join(layout::index_file_name(name)));
            self.records.remove(name);
            let _ = fs::remove_dir(&dir);
            PartSet::EMPTY
        } else {
            record.parts
        }
    }

    /// Registers a newly-downloaded part at `version`, replacing any
    /// older-version record for the same region.
    pub fn commit(&mut self, name: &str, version: i64, part: Part, size: u64) {
        if let Some(record) = self.records.get_mut(name) {
            if record.version == version {
                record.set_part(part, size);
                return;
            }
            if record.version > version {
                tracing::warn!(
                    region = name,
                    version,
                    surviving = record.version,
                    "ignoring commit older than surviving record"
                );
                return;
            }
            let superseded = record.clone();
            delete_record_files(&superseded);
        }
        let mut record = LocalFile::new(name, version, layout::version_dir(&self.root, version));
        record.set_part(part, size);
        self.records.insert(name.to_string(), record);
    }

    /// Removes the `.part` temp and `.resume` marker for the given parts at
    /// `version`. Called on explicit deletion only; the scheduler never
    /// removes these implicitly on failure.
    pub fn discard_transfer_artifacts(&self, name: &str, version: i64, parts: PartSet) {
        for part in parts.parts() {
            let final_path = layout::part_path(&self.root, version, name, part);
            remove_file_logged(&layout::temp_path(&final_path));
            remove_file_logged(&layout::resume_path(&final_path));
        }
    }
}

fn delete_record_files(record: &LocalFile) {
    for part in record.parts().parts() {
        remove_file_logged(&record.path(part));
    }
    remove_file_logged(&record.dir.join(layout::index_file_name(record.name())));
    let _ = fs::remove_dir(&record.dir);
}

fn remove_file_logged(path: &Path) {
    if let Err(err) = fs::remove_file(path) {
        if err.kind() != io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), %err, "failed to remove file");
        }
    }
}
