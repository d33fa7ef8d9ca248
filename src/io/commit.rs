//! Staged multi-file commits.
//!
//! Every file of a store update is written to its own temporary sibling first. Only when
//! all of them are fully written and synced are they renamed over their targets; any
//! failure before that point drops the staged files and leaves the previous
//! generation untouched.
//!
//! A journaled commit also survives a crash *between* renames. Before the first rename
//! each existing target is hard-linked to `<target>.prev` and a journal listing the
//! targets is written. The journal is removed once every rename has landed. If it is
//! still present, [`StagedCommit::recover`] puts the previous generation back.

use std::io::Write;
use std::path::{Path, PathBuf};

use atomic_write_file::AtomicWriteFile;
use serde::{Deserialize, Serialize};

use crate::error::Result;

const PREVIOUS_SUFFIX: &str = ".prev";

struct StagedFile {
    target: PathBuf,
    atomic: AtomicWriteFile,
}

#[derive(Debug, Serialize, Deserialize)]
struct CommitJournal {
    entries: Vec<JournalEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct JournalEntry {
    target: PathBuf,
    had_previous: bool,
}

#[derive(Default)]
pub struct StagedCommit {
    files: Vec<StagedFile>,
    removals: Vec<PathBuf>,
    journal: Option<PathBuf>,
}

impl StagedCommit {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A commit that records its progress in `journal` so an interrupted rename phase
    /// can be rolled back.
    #[must_use]
    pub fn journaled(journal: &Path) -> Self {
        Self {
            journal: Some(journal.to_path_buf()),
            ..Self::default()
        }
    }

    /// Writes `bytes` to a temporary file that will replace `target` on commit.
    pub fn stage(&mut self, target: &Path, bytes: &[u8]) -> Result<()> {
        let mut atomic = AtomicWriteFile::open(target)?;
        atomic.write_all(bytes)?;
        atomic.flush()?;
        atomic.as_file().sync_all()?;
        tracing::debug!(target = ?target, bytes = bytes.len(), "staged file");
        self.files.push(StagedFile {
            target: target.to_path_buf(),
            atomic,
        });
        Ok(())
    }

    /// Deletes `target` (if present) once every staged file is in place.
    pub fn stage_removal(&mut self, target: &Path) {
        self.removals.push(target.to_path_buf());
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len() + self.removals.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Renames every staged file into place, in staging order, then applies removals.
    pub fn commit(self) -> Result<()> {
        let targets = self.targets();
        let Self {
            files,
            removals,
            journal,
        } = self;
        if let Some(journal) = &journal {
            begin(journal, &targets)?;
        }
        let count = files.len();
        for staged in files {
            staged.atomic.commit()?;
            tracing::trace!(target = ?staged.target, "committed file");
        }
        for target in &removals {
            if target.is_file() {
                fs_err::remove_file(target)?;
            }
        }
        if let Some(journal) = &journal {
            finish(journal, &targets)?;
        }
        tracing::debug!(files = count, removed = removals.len(), "staged commit applied");
        Ok(())
    }

    pub fn discard(self) -> Result<()> {
        for staged in self.files {
            staged.atomic.discard()?;
        }
        Ok(())
    }

    /// Rolls back a journaled commit that stopped part-way through its renames.
    /// Returns `false` when `journal` does not exist and there was nothing to undo.
    ///
    /// Callers must hold whatever lock serialises writers of these targets.
    pub fn recover(journal: &Path) -> Result<bool> {
        if !journal.is_file() {
            return Ok(false);
        }
        let record: CommitJournal = serde_json::from_slice(&fs_err::read(journal)?)?;
        for entry in &record.entries {
            let previous = previous_path(&entry.target);
            if entry.had_previous {
                // Already restored when a previous recovery was itself interrupted.
                if previous.is_file() {
                    fs_err::rename(&previous, &entry.target)?;
                }
            } else if entry.target.is_file() {
                fs_err::remove_file(&entry.target)?;
            }
        }
        let dir = parent_dir(journal);
        sync_dir(dir)?;
        fs_err::remove_file(journal)?;
        sync_dir(dir)?;
        tracing::warn!(
            journal = ?journal,
            files = record.entries.len(),
            "rolled back an interrupted commit"
        );
        Ok(true)
    }

    fn targets(&self) -> Vec<PathBuf> {
        self.files
            .iter()
            .map(|staged| staged.target.clone())
            .chain(self.removals.iter().cloned())
            .collect()
    }

    /// Runs the journal and the first `renames` renames, then stops as a crash would.
    #[cfg(test)]
    pub(crate) fn commit_interrupted(self, renames: usize) -> Result<()> {
        let targets = self.targets();
        if let Some(journal) = &self.journal {
            begin(journal, &targets)?;
        }
        for staged in self.files.into_iter().take(renames) {
            staged.atomic.commit()?;
        }
        Ok(())
    }
}

fn begin(journal: &Path, targets: &[PathBuf]) -> Result<()> {
    let mut entries = Vec::with_capacity(targets.len());
    for target in targets {
        let previous = previous_path(target);
        if previous.is_file() {
            fs_err::remove_file(&previous)?;
        }
        let had_previous = target.is_file();
        if had_previous {
            fs_err::hard_link(target, &previous)?;
        }
        entries.push(JournalEntry {
            target: target.clone(),
            had_previous,
        });
    }
    let mut bytes = serde_json::to_vec_pretty(&CommitJournal { entries })?;
    bytes.push(b'\n');
    let mut atomic = AtomicWriteFile::open(journal)?;
    atomic.write_all(&bytes)?;
    atomic.flush()?;
    atomic.as_file().sync_all()?;
    atomic.commit()?;
    Ok(())
}

fn finish(journal: &Path, targets: &[PathBuf]) -> Result<()> {
    let dir = parent_dir(journal);
    sync_dir(dir)?;
    fs_err::remove_file(journal)?;
    sync_dir(dir)?;
    for target in targets {
        let previous = previous_path(target);
        if previous.is_file() {
            fs_err::remove_file(&previous)?;
        }
    }
    Ok(())
}

fn previous_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(PREVIOUS_SUFFIX);
    target.with_file_name(name)
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<()> {
    fs_err::File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn nothing_is_visible_before_commit() {
        let dir = TempDir::new().expect("tempdir");
        let a = dir.path().join("a.bin");
        let b = dir.path().join("b.json");
        fs_err::write(&a, b"old").expect("seed");

        let mut commit = StagedCommit::new();
        commit.stage(&a, b"new-a").expect("stage a");
        commit.stage(&b, b"new-b").expect("stage b");
        assert_eq!(commit.len(), 2);
        assert_eq!(fs_err::read(&a).expect("read a"), b"old");
        assert!(!b.exists());

        commit.commit().expect("commit");
        assert_eq!(fs_err::read(&a).expect("read a"), b"new-a");
        assert_eq!(fs_err::read(&b).expect("read b"), b"new-b");
    }

    #[test]
    fn discard_keeps_previous_generation() {
        let dir = TempDir::new().expect("tempdir");
        let a = dir.path().join("a.bin");
        fs_err::write(&a, b"old").expect("seed");

        let mut commit = StagedCommit::new();
        commit.stage(&a, b"new").expect("stage");
        commit.discard().expect("discard");
        assert_eq!(fs_err::read(&a).expect("read"), b"old");
        let leftovers = fs_err::read_dir(dir.path()).expect("list").count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn journaled_commit_leaves_no_journal_or_backups() {
        let dir = TempDir::new().expect("tempdir");
        let journal = dir.path().join("store.commit");
        let a = dir.path().join("a.bin");
        let gone = dir.path().join("gone.json");
        fs_err::write(&a, b"old").expect("seed a");
        fs_err::write(&gone, b"stale").expect("seed gone");

        let mut commit = StagedCommit::journaled(&journal);
        commit.stage(&a, b"new").expect("stage");
        commit.stage_removal(&gone);
        commit.commit().expect("commit");

        assert_eq!(fs_err::read(&a).expect("read"), b"new");
        assert!(!gone.exists());
        assert!(!StagedCommit::recover(&journal).expect("recover"));
        let names: Vec<_> = fs_err::read_dir(dir.path())
            .expect("list")
            .map(|entry| entry.expect("entry").file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("a.bin")]);
    }

    #[test]
    fn interrupted_renames_roll_back_to_the_previous_generation() {
        let dir = TempDir::new().expect("tempdir");
        let journal = dir.path().join("store.commit");
        let a = dir.path().join("a.bin");
        let b = dir.path().join("b.bin");
        let c = dir.path().join("c.json");
        let summary = dir.path().join("summary.json");
        fs_err::write(&a, b"old-a").expect("seed a");
        fs_err::write(&b, b"old-b").expect("seed b");
        fs_err::write(&summary, b"old-summary").expect("seed summary");

        let mut commit = StagedCommit::journaled(&journal);
        commit.stage(&a, b"new-a").expect("stage a");
        commit.stage(&b, b"new-b").expect("stage b");
        commit.stage(&c, b"new-c").expect("stage c");
        commit.stage_removal(&summary);
        commit.commit_interrupted(1).expect("partial");
        assert_eq!(fs_err::read(&a).expect("read a"), b"new-a");
        assert!(journal.is_file());

        assert!(StagedCommit::recover(&journal).expect("recover"));
        assert_eq!(fs_err::read(&a).expect("read a"), b"old-a");
        assert_eq!(fs_err::read(&b).expect("read b"), b"old-b");
        assert!(!c.exists());
        assert_eq!(fs_err::read(&summary).expect("read summary"), b"old-summary");
        assert!(!journal.exists());
        assert!(!previous_path(&a).exists());
        assert!(!StagedCommit::recover(&journal).expect("second recover"));
    }

    #[test]
    fn recovery_clears_the_way_for_the_next_commit() {
        let dir = TempDir::new().expect("tempdir");
        let journal = dir.path().join("store.commit");
        let a = dir.path().join("a.bin");
        fs_err::write(&a, b"old").expect("seed");

        let mut first = StagedCommit::journaled(&journal);
        first.stage(&a, b"torn").expect("stage");
        first.commit_interrupted(0).expect("partial");
        StagedCommit::recover(&journal).expect("recover");

        let mut second = StagedCommit::journaled(&journal);
        second.stage(&a, b"next").expect("stage");
        second.commit().expect("commit");
        assert_eq!(fs_err::read(&a).expect("read"), b"next");
        assert!(!previous_path(&a).exists());
    }
}
