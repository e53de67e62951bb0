//! Extraction of session entries to the host filesystem.

use std::collections::HashMap;
use std::fs::File;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use super::ArchiveSession;
use crate::entry::{Entry, EntryKind, EntrySource};
use crate::fs::{apply_metadata, copy_chunked, copy_with_permissions, create_symlink, ensure_parent};
use crate::{ArchivePath, Error, Result};

/// Statistics from [`ArchiveSession::extract_to`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[must_use = "extraction results should be checked to verify what was written"]
pub struct ExtractResult {
    /// Regular files written.
    pub files: usize,
    /// Directories created.
    pub directories: usize,
    /// Symbolic links created.
    pub symlinks: usize,
    /// Content bytes written.
    pub bytes: u64,
}

impl ExtractResult {
    /// Returns the number of entries extracted.
    pub fn total_entries(&self) -> usize {
        self.files + self.directories + self.symlinks
    }
}

impl ArchiveSession {
    /// Extracts entries under `destination`.
    ///
    /// The session's current entries are extracted, including pending
    /// additions, renames and deletions. With an empty `names` slice every
    /// entry is extracted. Otherwise each name must match an entry exactly;
    /// the named entries are extracted together with the directories that
    /// contain them.
    ///
    /// When metadata preservation is enabled, permissions and modification
    /// times are applied once all content is written, directories last.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EntryNotFound`] for a name with no entry; this is
    /// checked before anything is written.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use mutarc::ArchiveSession;
    ///
    /// let session = ArchiveSession::open_read_only("bundle.zip")?;
    /// session.extract_to("out", &["config/app.toml"])?;
    /// # Ok::<(), mutarc::Error>(())
    /// ```
    pub fn extract_to<S: AsRef<str>>(
        &self,
        destination: impl AsRef<Path>,
        names: &[S],
    ) -> Result<ExtractResult> {
        let destination = destination.as_ref();
        let selected = self.select(names)?;
        let bytes = self.materialize(destination, &selected)?;

        let mut result = ExtractResult {
            bytes,
            ..ExtractResult::default()
        };
        for entry in &selected {
            match entry.kind() {
                EntryKind::File => result.files += 1,
                EntryKind::Directory => result.directories += 1,
                EntryKind::Symlink => result.symlinks += 1,
            }
        }

        if self.options.preserve_metadata {
            for entry in selected.iter().filter(|e| !e.is_dir()) {
                apply_metadata(&destination.join(entry.path.trimmed()), &entry.meta);
            }
            let mut dirs: Vec<&&Entry> = selected.iter().filter(|e| e.is_dir()).collect();
            dirs.sort_by_key(|e| std::cmp::Reverse(e.path.as_str().matches('/').count()));
            for entry in dirs {
                apply_metadata(&destination.join(entry.path.trimmed()), &entry.meta);
            }
        }

        log::info!(
            "Extracted {} entries ({} bytes) to {}",
            result.total_entries(),
            result.bytes,
            destination.display()
        );
        Ok(result)
    }

    fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<&Entry>> {
        if names.is_empty() {
            return Ok(self.entries.iter().collect());
        }
        let mut named: Vec<&ArchivePath> = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref();
            let index = self.position(name).ok_or_else(|| Error::EntryNotFound {
                path: name.to_string(),
            })?;
            named.push(&self.entries[index].path);
        }
        Ok(self
            .entries
            .iter()
            .filter(|entry| {
                named.contains(&&entry.path)
                    || (entry.is_dir() && named.iter().any(|n| entry.path.is_ancestor_of(n)))
            })
            .collect())
    }

    /// Writes `entries` under `root`: directories, then file contents, then
    /// symbolic links. Returns the number of content bytes written.
    pub(super) fn materialize(&self, root: &Path, entries: &[&Entry]) -> Result<u64> {
        std::fs::create_dir_all(root)?;

        for entry in entries.iter().filter(|e| e.is_dir()) {
            std::fs::create_dir_all(root.join(entry.path.trimmed()))?;
        }

        let mut bytes = 0;
        let mut wanted: HashMap<&ArchivePath, PathBuf> = HashMap::new();
        for entry in entries.iter().filter(|e| e.kind() == EntryKind::File) {
            let target = root.join(entry.path.trimmed());
            match &entry.source {
                EntrySource::Host(source) => {
                    ensure_parent(&target)?;
                    bytes += copy_with_permissions(source, &target)?;
                }
                EntrySource::Container(member) => {
                    wanted.insert(member, target);
                }
                EntrySource::Synthetic => {
                    ensure_parent(&target)?;
                    File::create(&target)?;
                }
            }
        }
        if !wanted.is_empty() {
            bytes += self.copy_members(&wanted)?;
        }

        for entry in entries.iter().filter(|e| e.kind() == EntryKind::Symlink) {
            let target = entry.meta.link_target.as_deref().ok_or_else(|| {
                Error::format(format!("symlink {} has no target", entry.path))
            })?;
            let link = root.join(entry.path.trimmed());
            ensure_parent(&link)?;
            create_symlink(target, &link)?;
        }
        Ok(bytes)
    }

    /// Copies container members to their targets in one pass.
    ///
    /// A member stored twice is written twice; the later copy wins.
    fn copy_members(&self, wanted: &HashMap<&ArchivePath, PathBuf>) -> Result<u64> {
        let missing = |member: &ArchivePath| Error::EntryNotFound {
            path: member.to_string(),
        };
        let Some(container) = self.location() else {
            let member = wanted.keys().next().copied();
            return Err(member.map_or(Error::WriterFinished, missing));
        };

        let mut copied: HashMap<ArchivePath, u64> = HashMap::new();
        self.codec.read_members(container, &mut |member, _, data| {
            if let Some(target) = wanted.get(member) {
                ensure_parent(target)?;
                let mut file = File::create(target)?;
                let n = copy_chunked(data, &mut file)?;
                log::debug!("Extracted {} ({} bytes)", member, n);
                copied.insert(member.clone(), n);
            }
            Ok(ControlFlow::Continue(()))
        })?;

        if let Some(member) = wanted.keys().find(|m| !copied.contains_key(**m)) {
            return Err(missing(*member));
        }
        Ok(copied.values().sum())
    }
}
