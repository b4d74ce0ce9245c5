//! Exclusive, path-scoped leases over chunk destinations.
//!
//! A [`Leaser`] gives one worker at a time the right to compute and publish a
//! given output file. Workers share nothing but the output filesystem, so
//! the default implementation, [`LockFileLeaser`], keeps each lease as a lock
//! file next to its destination, created with `O_EXCL` semantics.
//!
//! Acquisition re-checks the destination after the lock is taken. A worker
//! that loses a race to a holder who has since published therefore sees the
//! destination as complete instead of writing it a second time.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use chrono::{DateTime, Utc};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, ShardError};
use crate::publish::write_parquet_atomic;

/// Exclusive right to produce one destination file.
#[derive(Debug, PartialEq, Eq)]
pub struct Lease {
    target: PathBuf,
    holder: String,
}

impl Lease {
    pub fn new(target: impl Into<PathBuf>, holder: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            holder: holder.into(),
        }
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }
}

/// Result of trying to lease a destination.
#[derive(Debug, PartialEq, Eq)]
pub enum Acquisition {
    Acquired(Lease),
    /// The destination exists and overwrite was not requested.
    AlreadyComplete,
    /// Another worker holds the lease.
    Contended,
}

/// Mutual exclusion and atomic publication for chunk destinations.
pub trait Leaser {
    /// Attempts to lease `target`.
    ///
    /// Without `overwrite`, an existing destination is reported as
    /// [`Acquisition::AlreadyComplete`], both before and after the lease is taken.
    fn try_acquire(&self, target: &Path, overwrite: bool) -> Result<Acquisition>;

    /// Atomically publishes `df` to the leased destination, returning bytes written.
    fn publish(&self, lease: &Lease, df: &mut DataFrame) -> Result<u64> {
        write_parquet_atomic(lease.target(), df)
    }

    /// Gives up the lease.
    fn release(&self, lease: Lease) -> Result<()>;
}

/// What to do when another worker holds the lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentionPolicy {
    /// Report [`Acquisition::Contended`] at once.
    #[default]
    Skip,
    /// Poll until the holder lets go or `timeout` elapses.
    Wait {
        poll_interval: Duration,
        timeout: Duration,
    },
}

/// Contents of a lock file, for operators inspecting a stuck run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub holder: String,
    pub pid: u32,
    pub acquired_at: DateTime<Utc>,
}

/// Lock-file backed [`Leaser`].
///
/// The lock for `target` lives at `<target>.lock`.
#[derive(Debug, Clone, Default)]
pub struct LockFileLeaser {
    contention: ContentionPolicy,
    stale_after: Option<Duration>,
}

impl LockFileLeaser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contention(mut self, contention: ContentionPolicy) -> Self {
        self.contention = contention;
        self
    }

    /// Treats locks untouched for longer than `age` as abandoned.
    pub fn with_stale_after(mut self, age: Option<Duration>) -> Self {
        self.stale_after = age;
        self
    }

    /// Lock file guarding `target`.
    pub fn lock_path(target: &Path) -> PathBuf {
        let mut name = target.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    /// Creates the lock file, or returns `None` if it already exists.
    fn create_lock(&self, target: &Path) -> Result<Option<Lease>> {
        let lock_path = Self::lock_path(target);
        let file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(None),
            Err(source) => {
                return Err(ShardError::Io {
                    operation: "create lock",
                    path: lock_path,
                    source,
                });
            }
        };

        let record = LockRecord {
            holder: new_holder_id(),
            pid: std::process::id(),
            acquired_at: Utc::now(),
        };
        if let Err(e) = write_record(file, &lock_path, &record) {
            let _ = fs::remove_file(&lock_path);
            return Err(e);
        }

        debug!(lock = %lock_path.display(), holder = %record.holder, "acquired lease");
        Ok(Some(Lease::new(target, record.holder)))
    }

    /// Removes the lock on `target` if it is older than the stale threshold.
    ///
    /// The lock is re-inspected just before removal and left alone if it was
    /// replaced in the meantime, so a breaker never deletes a fresh lock taken
    /// by another breaker.
    ///
    /// Returns `true` when acquisition should be retried immediately.
    fn break_if_stale(&self, target: &Path) -> Result<bool> {
        let Some(stale_after) = self.stale_after else {
            return Ok(false);
        };
        let lock_path = Self::lock_path(target);

        // Released between our create attempt and now.
        let Some(observed) = LockSnapshot::take(&lock_path)? else {
            return Ok(true);
        };
        let age = SystemTime::now()
            .duration_since(observed.modified)
            .unwrap_or_default();
        if age <= stale_after {
            return Ok(false);
        }

        match LockSnapshot::take(&lock_path)? {
            Some(current) if current == observed => {}
            _ => {
                debug!(lock = %lock_path.display(), "lock changed while judging staleness");
                return Ok(true);
            }
        }

        warn!(
            lock = %lock_path.display(),
            age_secs = age.as_secs(),
            holder = ?observed.holder,
            "breaking stale lock"
        );
        match fs::remove_file(&lock_path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(true),
            Err(source) => Err(ShardError::Io {
                operation: "remove stale lock",
                path: lock_path,
                source,
            }),
        }
    }
}

/// Identity of a lock file at one point in time.
#[derive(Debug, PartialEq, Eq)]
struct LockSnapshot {
    modified: SystemTime,
    /// `None` while the record is still being written.
    holder: Option<String>,
}

impl LockSnapshot {
    /// Returns `None` if the lock does not exist.
    fn take(lock_path: &Path) -> Result<Option<Self>> {
        let modified = match fs::metadata(lock_path).and_then(|meta| meta.modified()) {
            Ok(modified) => modified,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(ShardError::Io {
                    operation: "inspect lock",
                    path: lock_path.to_path_buf(),
                    source,
                });
            }
        };
        let holder = read_record(lock_path).ok().map(|record| record.holder);
        Ok(Some(Self { modified, holder }))
    }
}

impl Leaser for LockFileLeaser {
    fn try_acquire(&self, target: &Path, overwrite: bool) -> Result<Acquisition> {
        if !overwrite && target.exists() {
            return Ok(Acquisition::AlreadyComplete);
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|source| ShardError::Io {
                operation: "create directory",
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let started = Instant::now();
        loop {
            if let Some(lease) = self.create_lock(target)? {
                // The previous holder may have published while we waited.
                if !overwrite && target.exists() {
                    self.release(lease)?;
                    return Ok(Acquisition::AlreadyComplete);
                }
                return Ok(Acquisition::Acquired(lease));
            }

            if self.break_if_stale(target)? {
                continue;
            }

            match self.contention {
                ContentionPolicy::Skip => {
                    debug!(path = %target.display(), "lease held by another worker");
                    return Ok(Acquisition::Contended);
                }
                ContentionPolicy::Wait {
                    poll_interval,
                    timeout,
                } => {
                    let waited = started.elapsed();
                    if waited >= timeout {
                        return Err(ShardError::LeaseTimeout {
                            target: target.to_path_buf(),
                            waited,
                        });
                    }
                    debug!(path = %target.display(), "waiting for lease");
                    thread::sleep(poll_interval.min(timeout - waited));
                    if !overwrite && target.exists() {
                        return Ok(Acquisition::AlreadyComplete);
                    }
                }
            }
        }
    }

    fn release(&self, lease: Lease) -> Result<()> {
        let lock_path = Self::lock_path(lease.target());
        let record = match read_record(&lock_path) {
            Ok(record) => record,
            Err(ShardError::Io { source, .. }) if source.kind() == ErrorKind::NotFound => {
                warn!(lock = %lock_path.display(), "lock vanished before release");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        if record.holder != lease.holder() {
            warn!(
                lock = %lock_path.display(),
                holder = %lease.holder(),
                current_holder = %record.holder,
                "lock was broken and re-acquired by another worker; leaving it"
            );
            return Ok(());
        }

        match fs::remove_file(&lock_path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(source) => {
                return Err(ShardError::Io {
                    operation: "remove lock",
                    path: lock_path,
                    source,
                });
            }
        }
        debug!(lock = %lock_path.display(), "released lease");
        Ok(())
    }
}

fn new_holder_id() -> String {
    format!("{}-{:016x}", std::process::id(), rand::random::<u64>())
}

fn write_record(mut file: File, lock_path: &Path, record: &LockRecord) -> Result<()> {
    let bytes = serde_json::to_vec(record).map_err(|source| ShardError::LockRecord {
        path: lock_path.to_path_buf(),
        source,
    })?;
    file.write_all(&bytes).map_err(|source| ShardError::Io {
        operation: "write lock",
        path: lock_path.to_path_buf(),
        source,
    })?;
    file.sync_all().map_err(|source| ShardError::Io {
        operation: "sync lock",
        path: lock_path.to_path_buf(),
        source,
    })
}

/// Reads the record of an existing lock file.
pub fn read_record(lock_path: &Path) -> Result<LockRecord> {
    let bytes = fs::read(lock_path).map_err(|source| ShardError::Io {
        operation: "read lock",
        path: lock_path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| ShardError::LockRecord {
        path: lock_path.to_path_buf(),
        source,
    })
}
