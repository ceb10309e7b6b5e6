//! Durable idempotent repository persisted as one key per line.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use settle_completion::{
    IdempotentRepository, KeyCache, RepositoryError, RepositoryResult, ResourceKey,
};
use tracing::{debug, info, warn};

use crate::error::{FsOpsError, FsOpsResult};

/// Store file grows to this multiple of the capacity before it is compacted.
const COMPACTION_FACTOR: usize = 2;

#[derive(Debug)]
struct StoreState {
    cache: KeyCache,
    lines_on_disk: usize,
}

/// Idempotent repository that survives restarts.
///
/// The most recent `capacity` keys are kept in memory; `add` appends to the
/// store file and the file is rewritten from memory once it holds twice as
/// many lines as the capacity. A key is reported as added once its line is
/// appended; a failed compaction is retried on the next append.
#[derive(Debug)]
pub struct FileIdempotentRepository {
    path: PathBuf,
    state: Mutex<StoreState>,
}

impl FileIdempotentRepository {
    /// Open (or create) the store at `path`, loading its most recent keys.
    ///
    /// # Errors
    ///
    /// Returns an error if the store or its parent directory cannot be read or created.
    pub fn open(path: impl Into<PathBuf>, capacity: usize) -> FsOpsResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .map_err(|source| FsOpsError::io("repository.create_parent", parent, source))?;
        }

        let mut cache = KeyCache::with_capacity(capacity);
        let mut lines_on_disk = 0;
        match File::open(&path) {
            Ok(file) => {
                for line in BufReader::new(file).lines() {
                    let line =
                        line.map_err(|source| FsOpsError::io("repository.load", &path, source))?;
                    let key = line.trim();
                    if key.is_empty() {
                        continue;
                    }
                    lines_on_disk += 1;
                    let _ = cache.insert(ResourceKey::from(key));
                }
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(FsOpsError::io("repository.open", &path, err)),
        }

        info!(
            path = %path.display(),
            keys = cache.len(),
            capacity = cache.capacity(),
            "opened file idempotent repository"
        );
        Ok(Self {
            path,
            state: Mutex::new(StoreState {
                cache,
                lines_on_disk,
            }),
        })
    }

    /// Location of the store file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of keys retained in memory.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock_state().cache.len()
    }

    /// Whether no keys are retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock_state().cache.is_empty()
    }

    fn lock_state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn append(&self, key: &ResourceKey) -> FsOpsResult<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| FsOpsError::io("repository.append", &self.path, source))?;
        writeln!(file, "{key}")
            .map_err(|source| FsOpsError::io("repository.append", &self.path, source))
    }

    fn rewrite<'a>(&self, keys: impl Iterator<Item = &'a ResourceKey>) -> FsOpsResult<usize> {
        let mut staging = self.path.as_os_str().to_owned();
        staging.push(".tmp");
        let staging = PathBuf::from(staging);

        let mut contents = String::new();
        let mut written = 0;
        for key in keys {
            contents.push_str(key.as_str());
            contents.push('\n');
            written += 1;
        }
        fs::write(&staging, contents)
            .map_err(|source| FsOpsError::io("repository.rewrite", &staging, source))?;
        fs::rename(&staging, &self.path)
            .map_err(|source| FsOpsError::io("repository.rewrite", &self.path, source))?;
        debug!(path = %self.path.display(), keys = written, "rewrote repository store");
        Ok(written)
    }
}

fn validate_key(key: &ResourceKey) -> FsOpsResult<()> {
    let raw = key.as_str();
    if raw.trim().is_empty() || raw.trim() != raw || raw.contains(['\n', '\r']) {
        return Err(FsOpsError::InvalidInput {
            field: "key",
            reason: "not storable on a single line",
            value: Some(raw.to_string()),
        });
    }
    Ok(())
}

impl IdempotentRepository for FileIdempotentRepository {
    fn add(&self, key: &ResourceKey) -> RepositoryResult<bool> {
        validate_key(key).map_err(|err| RepositoryError::new("add", err))?;
        let mut state = self.lock_state();
        if state.cache.contains(key) {
            let _ = state.cache.insert(key.clone());
            return Ok(false);
        }

        self.append(key)
            .map_err(|err| RepositoryError::new("add", err))?;
        state.lines_on_disk += 1;
        let inserted = state.cache.insert(key.clone());

        if state.lines_on_disk > state.cache.capacity().saturating_mul(COMPACTION_FACTOR) {
            match self.rewrite(state.cache.iter()) {
                Ok(lines) => state.lines_on_disk = lines,
                Err(err) => warn!(
                    path = %self.path.display(),
                    lines = state.lines_on_disk,
                    error = %err,
                    "repository compaction failed; store keeps growing"
                ),
            }
        }
        Ok(inserted)
    }

    fn contains(&self, key: &ResourceKey) -> RepositoryResult<bool> {
        Ok(self.lock_state().cache.contains(key))
    }

    fn remove(&self, key: &ResourceKey) -> RepositoryResult<bool> {
        let mut state = self.lock_state();
        if !state.cache.contains(key) {
            return Ok(false);
        }
        let lines = self
            .rewrite(state.cache.iter().filter(|kept| *kept != key))
            .map_err(|err| RepositoryError::new("remove", err))?;
        state.lines_on_disk = lines;
        Ok(state.cache.remove(key))
    }
}
