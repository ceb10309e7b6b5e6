//! Commit/rollback strategy for files consumed from a local directory.
//!
//! # Design
//! - Moves keep the resource's endpoint-relative name under the target directory.
//! - An existing target is replaced; a file already gone is not an error on delete.
//! - Targets are rebuilt from the name's normal components only, so a move never
//!   leaves its directory.
//! - Renames fall back to copy and remove when the target sits on another device.
//!   The copy lands under a staging name first and replaces the target by rename.
//! - The read-lock marker is released after the action, whether or not it succeeded.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use settle_completion::{
    CommitRollbackStrategy, CompletionContext, FileResource, StrategyError, StrategyResult,
};
use settle_config::{CommitActionSettings, RollbackActionSettings, StrategySettings};
use tracing::{debug, info, warn};

use crate::error::{FsOpsError, FsOpsResult};

/// What happens to a file once its processing is committed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CommitAction {
    /// Leave the file where it is.
    #[default]
    Leave,
    /// Delete the file.
    Delete,
    /// Move the file under `directory`.
    Move {
        /// Directory receiving committed files.
        directory: PathBuf,
    },
}

impl From<&CommitActionSettings> for CommitAction {
    fn from(settings: &CommitActionSettings) -> Self {
        match settings {
            CommitActionSettings::Leave => Self::Leave,
            CommitActionSettings::Delete => Self::Delete,
            CommitActionSettings::Move { directory } => Self::Move {
                directory: directory.clone(),
            },
        }
    }
}

/// What happens to a file whose processing is rolled back.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RollbackAction {
    /// Leave the file in place.
    #[default]
    Leave,
    /// Move the file under `directory`.
    Move {
        /// Directory receiving rolled-back files.
        directory: PathBuf,
    },
}

impl From<&RollbackActionSettings> for RollbackAction {
    fn from(settings: &RollbackActionSettings) -> Self {
        match settings {
            RollbackActionSettings::Leave => Self::Leave,
            RollbackActionSettings::Move { directory } => Self::Move {
                directory: directory.clone(),
            },
        }
    }
}

/// Strategy acting on files in the local filesystem.
#[derive(Debug, Clone, Default)]
pub struct LocalFileStrategy {
    commit: CommitAction,
    rollback: RollbackAction,
    lock_suffix: Option<String>,
}

impl LocalFileStrategy {
    /// Strategy applying `commit` and `rollback`.
    #[must_use]
    pub const fn new(commit: CommitAction, rollback: RollbackAction) -> Self {
        Self {
            commit,
            rollback,
            lock_suffix: None,
        }
    }

    /// Strategy described by validated settings.
    #[must_use]
    pub fn from_settings(settings: &StrategySettings) -> Self {
        Self {
            commit: CommitAction::from(&settings.commit),
            rollback: RollbackAction::from(&settings.rollback),
            lock_suffix: settings.lock_suffix.clone(),
        }
    }

    /// Release a `<path><suffix>` read-lock marker after every action.
    #[must_use]
    pub fn with_lock_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.lock_suffix = Some(suffix.into());
        self
    }

    /// Configured commit action.
    #[must_use]
    pub const fn commit_action(&self) -> &CommitAction {
        &self.commit
    }

    /// Configured rollback action.
    #[must_use]
    pub const fn rollback_action(&self) -> &RollbackAction {
        &self.rollback
    }

    fn release_lock(&self, resource: &FileResource) -> FsOpsResult<()> {
        let Some(suffix) = &self.lock_suffix else {
            return Ok(());
        };
        let mut marker = resource.path().as_os_str().to_owned();
        marker.push(suffix);
        let marker = PathBuf::from(marker);
        match fs::remove_file(&marker) {
            Ok(()) => {
                debug!(lock = %marker.display(), "released read lock");
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(FsOpsError::io("release_lock", marker, err)),
        }
    }

    fn finish(
        &self,
        resource: &FileResource,
        operation: &'static str,
        outcome: FsOpsResult<()>,
    ) -> StrategyResult<()> {
        let released = self.release_lock(resource);
        outcome.map_err(|err| StrategyError::new(operation, err))?;
        released.map_err(|err| StrategyError::new("release_lock", err))
    }
}

impl CommitRollbackStrategy<FileResource> for LocalFileStrategy {
    fn name(&self) -> &'static str {
        "local_file"
    }

    fn commit(&self, resource: &FileResource, context: &CompletionContext) -> StrategyResult<()> {
        let (operation, outcome) = match &self.commit {
            CommitAction::Leave => ("commit.leave", Ok(())),
            CommitAction::Delete => ("commit.delete", delete_file(resource.path())),
            CommitAction::Move { directory } => {
                let outcome = target_path(directory, resource.name())
                    .and_then(|target| move_file(resource.path(), &target));
                ("commit.move", outcome)
            }
        };
        if outcome.is_ok() {
            info!(
                endpoint = %context.endpoint,
                completion_id = %context.completion_id,
                resource = resource.name(),
                operation,
                "committed file"
            );
        }
        self.finish(resource, operation, outcome)
    }

    fn rollback(&self, resource: &FileResource, context: &CompletionContext) -> StrategyResult<()> {
        let (operation, outcome) = match &self.rollback {
            RollbackAction::Leave => ("rollback.leave", Ok(())),
            RollbackAction::Move { directory } => {
                let outcome = target_path(directory, resource.name())
                    .and_then(|target| move_file(resource.path(), &target));
                ("rollback.move", outcome)
            }
        };
        if outcome.is_ok() {
            info!(
                endpoint = %context.endpoint,
                completion_id = %context.completion_id,
                resource = resource.name(),
                operation,
                "rolled back file"
            );
        }
        self.finish(resource, operation, outcome)
    }
}

fn delete_file(path: &Path) -> FsOpsResult<()> {
    match fs::remove_file(path) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => {
            Err(FsOpsError::io("delete_file", path, err))
        }
        _ => Ok(()),
    }
}

fn target_path(directory: &Path, name: &str) -> FsOpsResult<PathBuf> {
    let mut target = directory.to_path_buf();
    let mut segments = 0_usize;
    for component in Path::new(name).components() {
        match component {
            Component::Normal(segment) => {
                target.push(segment);
                segments += 1;
            }
            Component::CurDir => {}
            _ => {
                return Err(FsOpsError::InvalidInput {
                    field: "name",
                    reason: "escapes_directory",
                    value: Some(name.to_string()),
                });
            }
        }
    }
    if segments == 0 {
        return Err(FsOpsError::InvalidInput {
            field: "name",
            reason: "empty",
            value: Some(name.to_string()),
        });
    }
    Ok(target)
}

fn move_file(source: &Path, destination: &Path) -> FsOpsResult<()> {
    if source == destination {
        return Err(FsOpsError::InvalidInput {
            field: "destination",
            reason: "same_as_source",
            value: Some(destination.to_string_lossy().into_owned()),
        });
    }
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)
            .map_err(|source_err| FsOpsError::io("move_file.create_parent", parent, source_err))?;
    }
    match fs::rename(source, destination) {
        Ok(()) => Ok(()),
        Err(rename_err) if rename_err.kind() == io::ErrorKind::NotFound => {
            Err(FsOpsError::io("move_file.rename", source, rename_err))
        }
        Err(rename_err) => {
            debug!(
                source = %source.display(),
                path = %destination.display(),
                error = %rename_err,
                "rename failed; copying instead"
            );
            copy_into_place(source, destination)?;
            fs::remove_file(source)
                .map_err(|source_err| FsOpsError::io("move_file.cleanup", source, source_err))
        }
    }
}

/// Copy `source` over `destination` without exposing a partial file.
///
/// The existing target is only replaced once the full copy is on disk.
fn copy_into_place(source: &Path, destination: &Path) -> FsOpsResult<()> {
    let staging = staging_path(destination)?;
    let placed = fs::copy(source, &staging)
        .map_err(|err| FsOpsError::io("move_file.copy", &staging, err))
        .and_then(|_| {
            fs::rename(&staging, destination)
                .map_err(|err| FsOpsError::io("move_file.replace", destination, err))
        });
    if placed.is_err() {
        discard_staging(&staging);
    }
    placed
}

fn staging_path(destination: &Path) -> FsOpsResult<PathBuf> {
    let Some(file_name) = destination.file_name() else {
        return Err(FsOpsError::InvalidInput {
            field: "destination",
            reason: "missing_file_name",
            value: Some(destination.to_string_lossy().into_owned()),
        });
    };
    let mut staged = std::ffi::OsString::from(".");
    staged.push(file_name);
    staged.push(".partial");
    Ok(destination.with_file_name(staged))
}

fn discard_staging(staging: &Path) {
    if let Err(err) = fs::remove_file(staging)
        && err.kind() != io::ErrorKind::NotFound
    {
        warn!(path = %staging.display(), error = %err, "staging file left behind");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn temp_dir() -> io::Result<TempDir> {
        tempfile::Builder::new().prefix("settle-fsops-").tempdir()
    }

    fn context(failed: bool) -> CompletionContext {
        CompletionContext::new(Arc::from("inbox"), failed)
    }

    fn resource(root: &Path, name: &str) -> io::Result<FileResource> {
        let path = root.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, name)?;
        Ok(FileResource::new(name, path))
    }

    #[test]
    fn move_file_replaces_existing_target() -> anyhow::Result<()> {
        let temp = temp_dir()?;
        let source = temp.path().join("a.csv");
        let target = temp.path().join("done/a.csv");
        fs::write(&source, "new")?;
        fs::create_dir_all(temp.path().join("done"))?;
        fs::write(&target, "old")?;

        move_file(&source, &target)?;

        assert!(!source.exists());
        assert_eq!(fs::read_to_string(&target)?, "new");
        Ok(())
    }

    #[test]
    fn move_file_rejects_missing_source_and_same_path() -> anyhow::Result<()> {
        let temp = temp_dir()?;
        let missing = temp.path().join("missing.csv");
        let err = move_file(&missing, &temp.path().join("out/missing.csv"))
            .err()
            .ok_or_else(|| anyhow::anyhow!("expected missing source to fail"))?;
        assert!(matches!(err, FsOpsError::Io { operation: "move_file.rename", .. }));

        let same = move_file(&missing, &missing);
        assert!(matches!(same, Err(FsOpsError::InvalidInput { field: "destination", .. })));
        Ok(())
    }

    #[test]
    fn copy_into_place_replaces_target_without_leftovers() -> anyhow::Result<()> {
        let temp = temp_dir()?;
        let source = temp.path().join("a.csv");
        let target = temp.path().join("done/a.csv");
        fs::create_dir_all(temp.path().join("done"))?;
        fs::write(&source, "new")?;
        fs::write(&target, "old")?;

        copy_into_place(&source, &target)?;

        assert_eq!(fs::read_to_string(&target)?, "new");
        assert!(!temp.path().join("done/.a.csv.partial").exists());
        Ok(())
    }

    #[test]
    fn failed_copy_keeps_existing_target() -> anyhow::Result<()> {
        let temp = temp_dir()?;
        let target = temp.path().join("done/a.csv");
        fs::create_dir_all(temp.path().join("done"))?;
        fs::write(&target, "archived")?;

        let err = copy_into_place(&temp.path().join("missing.csv"), &target)
            .err()
            .ok_or_else(|| anyhow::anyhow!("expected copy of a missing source to fail"))?;

        assert!(matches!(err, FsOpsError::Io { operation: "move_file.copy", .. }));
        assert_eq!(fs::read_to_string(&target)?, "archived");
        assert!(!temp.path().join("done/.a.csv.partial").exists());
        Ok(())
    }

    #[test]
    fn failed_fallback_keeps_source_and_target() -> anyhow::Result<()> {
        let temp = temp_dir()?;
        let source = temp.path().join("a.csv");
        let target = temp.path().join("done/a.csv");
        fs::write(&source, "new")?;
        fs::create_dir_all(target.join("occupied"))?;

        let err = move_file(&source, &target)
            .err()
            .ok_or_else(|| anyhow::anyhow!("expected move onto a directory to fail"))?;

        assert!(matches!(err, FsOpsError::Io { operation: "move_file.replace", .. }));
        assert_eq!(fs::read_to_string(&source)?, "new");
        assert!(target.join("occupied").is_dir());
        assert!(!temp.path().join("done/.a.csv.partial").exists());
        Ok(())
    }

    #[test]
    fn move_rejects_names_leaving_the_directory() -> anyhow::Result<()> {
        let temp = temp_dir()?;
        let inbox = temp.path().join("in");
        let done = temp.path().join("done");
        let outside = temp.path().join("outside/a.csv");
        let absolute = FileResource::new(outside.to_string_lossy(), inbox.join("a.csv"));
        let climbing = FileResource::new("../escaped/b.csv", inbox.join("b.csv"));
        fs::create_dir_all(&inbox)?;
        fs::write(absolute.path(), "a")?;
        fs::write(climbing.path(), "b")?;

        let strategy = LocalFileStrategy::new(
            CommitAction::Move {
                directory: done.clone(),
            },
            RollbackAction::Move {
                directory: done.clone(),
            },
        );
        for file in [&absolute, &climbing] {
            let err = strategy
                .commit(file, &context(false))
                .err()
                .ok_or_else(|| anyhow::anyhow!("expected escaping name to be rejected"))?;
            assert_eq!(err.operation, "commit.move");
            let cause = err.source.downcast_ref::<FsOpsError>();
            assert!(matches!(
                cause,
                Some(FsOpsError::InvalidInput { field: "name", .. })
            ));
            assert!(strategy.rollback(file, &context(true)).is_err());
            assert!(file.path().is_file());
        }

        assert!(!outside.exists());
        assert!(!temp.path().join("escaped").exists());
        assert!(!done.exists());
        Ok(())
    }

    #[test]
    fn target_path_keeps_nested_names_inside() -> anyhow::Result<()> {
        let done = Path::new("/srv/done");
        assert_eq!(
            target_path(done, "./2024/invoice-42.csv")?,
            done.join("2024/invoice-42.csv")
        );
        assert!(matches!(
            target_path(done, "."),
            Err(FsOpsError::InvalidInput { reason: "empty", .. })
        ));
        Ok(())
    }

    #[test]
    fn delete_tolerates_missing_file() -> anyhow::Result<()> {
        let temp = temp_dir()?;
        delete_file(&temp.path().join("gone.csv"))?;
        Ok(())
    }

    #[test]
    fn commit_moves_nested_file_and_releases_lock() -> anyhow::Result<()> {
        let temp = temp_dir()?;
        let inbox = temp.path().join("in");
        let done = temp.path().join("done");
        let file = resource(&inbox, "2024/invoice-42.csv")?;
        let lock = inbox.join("2024/invoice-42.csv.lock");
        fs::write(&lock, "")?;

        let strategy = LocalFileStrategy::new(
            CommitAction::Move {
                directory: done.clone(),
            },
            RollbackAction::Leave,
        )
        .with_lock_suffix(".lock");
        strategy.commit(&file, &context(false))?;

        assert!(done.join("2024/invoice-42.csv").is_file());
        assert!(!file.path().exists());
        assert!(!lock.exists());
        Ok(())
    }

    #[test]
    fn failed_rollback_still_releases_lock() -> anyhow::Result<()> {
        let temp = temp_dir()?;
        let file = FileResource::new("vanished.csv", temp.path().join("vanished.csv"));
        let lock = temp.path().join("vanished.csv.lock");
        fs::write(&lock, "")?;

        let strategy = LocalFileStrategy::new(
            CommitAction::Leave,
            RollbackAction::Move {
                directory: temp.path().join("failed"),
            },
        )
        .with_lock_suffix(".lock");
        let err = strategy
            .rollback(&file, &context(true))
            .err()
            .ok_or_else(|| anyhow::anyhow!("expected rollback to fail"))?;

        assert_eq!(err.operation, "rollback.move");
        assert!(!lock.exists());
        Ok(())
    }

    #[test]
    fn settings_map_to_actions() {
        let settings = StrategySettings {
            commit: CommitActionSettings::Delete,
            rollback: RollbackActionSettings::Move {
                directory: PathBuf::from("/data/failed"),
            },
            lock_suffix: Some(".lock".to_string()),
        };
        let strategy = LocalFileStrategy::from_settings(&settings);
        assert_eq!(strategy.commit_action(), &CommitAction::Delete);
        assert_eq!(
            strategy.rollback_action(),
            &RollbackAction::Move {
                directory: PathBuf::from("/data/failed")
            }
        );
        assert_eq!(
            CommitRollbackStrategy::<FileResource>::name(&strategy),
            "local_file"
        );
    }
}
