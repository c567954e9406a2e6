//! Claim coordinator - a token file guarding read-modify-write cycles.
//!
//! Acquisition creates `<store>.lock` exclusively. If the file already exists
//! and its embedded timestamp is older than the staleness threshold, the
//! holder is presumed crashed and the token is overwritten. Otherwise the
//! caller backs off and retries a bounded number of times.
//!
//! Stale takeover is a rename, and the last rename wins. A taker re-reads the
//! token after its rename and backs off unless it finds its own nonce, so two
//! waiters that both saw the same stale token normally end with one holder.
//! If the second rename lands after the first taker's re-read, both still
//! hold the token until the next cycle.
//!
//! Known race: there is no fencing token. A holder that stalls past the
//! staleness threshold and then resumes can still rewrite the store after a
//! new holder took the token over. Keep the threshold well above the longest
//! exclusive-access cycle.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use taskhive_core::WorkerId;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::error::StoreError;

/// Timing parameters for token acquisition.
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// Age after which a token is presumed abandoned.
    pub stale_after: Duration,

    /// Fixed backoff between attempts.
    pub retry_interval: Duration,

    /// Attempts before giving up with `LockTimeout`.
    pub max_attempts: u32,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(30),
            retry_interval: Duration::from_millis(100),
            max_attempts: 50,
        }
    }
}

impl LockConfig {
    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }
}

/// Contents of the token file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LockToken {
    holder: WorkerId,
    /// Distinguishes two acquisitions by the same identity.
    nonce: String,
    acquired_at_ms: i64,
}

impl LockToken {
    fn new(holder: &WorkerId) -> Self {
        Self {
            holder: holder.clone(),
            nonce: Uuid::new_v4().simple().to_string(),
            acquired_at_ms: Utc::now().timestamp_millis(),
        }
    }

    fn age(&self) -> Duration {
        let elapsed = Utc::now().timestamp_millis() - self.acquired_at_ms;
        Duration::from_millis(elapsed.max(0) as u64)
    }
}

/// What a failed create found in the token file.
enum Existing {
    Held { holder: Option<WorkerId>, age: Duration },
    Vanished,
}

/// Acquires the token on behalf of one worker identity.
#[derive(Debug, Clone)]
pub struct ClaimCoordinator {
    lock_path: PathBuf,
    holder: WorkerId,
    config: LockConfig,
}

impl ClaimCoordinator {
    pub fn new(lock_path: impl Into<PathBuf>, holder: WorkerId, config: LockConfig) -> Self {
        Self {
            lock_path: lock_path.into(),
            holder,
            config,
        }
    }

    /// Coordinator for the token file that sits next to `store_path`.
    pub fn for_store(store_path: &Path, holder: WorkerId, config: LockConfig) -> Self {
        let mut name = store_path.as_os_str().to_os_string();
        name.push(".lock");
        Self::new(PathBuf::from(name), holder, config)
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    pub fn holder(&self) -> &WorkerId {
        &self.holder
    }

    /// Acquire the token, backing off between attempts.
    pub async fn acquire(&self) -> Result<LockGuard, StoreError> {
        if let Some(parent) = self.lock_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        for attempt in 1..=self.config.max_attempts {
            if let Some(guard) = self.try_acquire()? {
                trace!(attempt, holder = %self.holder, "Lock acquired");
                return Ok(guard);
            }
            if attempt < self.config.max_attempts {
                tokio::time::sleep(self.config.retry_interval).await;
            }
        }

        debug!(
            path = %self.lock_path.display(),
            attempts = self.config.max_attempts,
            "Gave up waiting for lock"
        );
        Err(StoreError::LockTimeout {
            path: self.lock_path.clone(),
            attempts: self.config.max_attempts,
        })
    }

    /// One non-blocking attempt.
    fn try_acquire(&self) -> Result<Option<LockGuard>, StoreError> {
        let token = LockToken::new(&self.holder);

        if self.create_token(&token)? {
            return Ok(Some(self.guard(token)));
        }

        match self.inspect_existing()? {
            Existing::Vanished => {
                // Released between our create and our read; try once more.
                if self.create_token(&token)? {
                    return Ok(Some(self.guard(token)));
                }
                Ok(None)
            }
            Existing::Held { holder, age } if age > self.config.stale_after => {
                warn!(
                    path = %self.lock_path.display(),
                    stale_holder = ?holder.as_ref().map(WorkerId::as_str),
                    age_ms = age.as_millis() as u64,
                    "Taking over stale lock"
                );
                self.overwrite_token(&token)?;
                if !self.still_holds(&token)? {
                    debug!(path = %self.lock_path.display(), "Lost stale lock takeover");
                    return Ok(None);
                }
                Ok(Some(self.guard(token)))
            }
            Existing::Held { holder, age } => {
                trace!(
                    holder = ?holder.as_ref().map(WorkerId::as_str),
                    age_ms = age.as_millis() as u64,
                    "Lock busy"
                );
                Ok(None)
            }
        }
    }

    /// Exclusive create. Returns false if the file already exists.
    fn create_token(&self, token: &LockToken) -> Result<bool, StoreError> {
        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.lock_path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        let written = serde_json::to_vec(token)
            .map_err(StoreError::from)
            .and_then(|bytes| {
                file.write_all(&bytes)?;
                file.sync_all()?;
                Ok(())
            });
        if let Err(e) = written {
            let _ = fs::remove_file(&self.lock_path);
            return Err(e);
        }
        Ok(true)
    }

    /// Replace a stale token through a temporary file so readers never see
    /// a torn token.
    fn overwrite_token(&self, token: &LockToken) -> Result<(), StoreError> {
        let mut tmp_name = self.lock_path.as_os_str().to_os_string();
        tmp_name.push(format!(".{}.tmp", token.nonce));
        let tmp_path = PathBuf::from(tmp_name);

        let result = serde_json::to_vec(token)
            .map_err(StoreError::from)
            .and_then(|bytes| {
                let mut file = File::create(&tmp_path)?;
                file.write_all(&bytes)?;
                file.sync_all()?;
                fs::rename(&tmp_path, &self.lock_path)?;
                Ok(())
            });
        if result.is_err() {
            let _ = fs::remove_file(&tmp_path);
        }
        result
    }

    /// Whether the token file still carries `token`.
    fn still_holds(&self, token: &LockToken) -> Result<bool, StoreError> {
        match fs::read_to_string(&self.lock_path) {
            Ok(contents) => Ok(serde_json::from_str::<LockToken>(&contents)
                .is_ok_and(|current| current == *token)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn inspect_existing(&self) -> Result<Existing, StoreError> {
        let contents = match fs::read_to_string(&self.lock_path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Existing::Vanished),
            Err(e) => return Err(e.into()),
        };

        if let Ok(token) = serde_json::from_str::<LockToken>(&contents) {
            return Ok(Existing::Held {
                age: token.age(),
                holder: Some(token.holder),
            });
        }

        // Torn or foreign content: fall back to the file's modification time.
        let age = match fs::metadata(&self.lock_path) {
            Ok(meta) => meta
                .modified()
                .ok()
                .and_then(|modified| modified.elapsed().ok())
                .unwrap_or_default(),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Existing::Vanished),
            Err(e) => return Err(e.into()),
        };
        Ok(Existing::Held { holder: None, age })
    }

    fn guard(&self, token: LockToken) -> LockGuard {
        LockGuard {
            path: self.lock_path.clone(),
            token,
            released: false,
        }
    }
}

/// Proof of holding the token. Release explicitly with [`LockGuard::release`];
/// dropping the guard releases best-effort.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    token: LockToken,
    released: bool,
}

impl LockGuard {
    pub fn holder(&self) -> &WorkerId {
        &self.token.holder
    }

    /// Remove the token file if it is still ours.
    ///
    /// Returns false when another holder has since replaced the token, in
    /// which case the file is left alone.
    pub fn release(mut self) -> Result<bool, StoreError> {
        self.released = true;
        release_token(&self.path, &self.token)
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = release_token(&self.path, &self.token) {
            warn!(error = %e, path = %self.path.display(), "Failed to release lock on drop");
        }
    }
}

fn release_token(path: &Path, token: &LockToken) -> Result<bool, StoreError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!(path = %path.display(), "Lock file already gone at release");
            return Ok(false);
        }
        Err(e) => return Err(e.into()),
    };

    match serde_json::from_str::<LockToken>(&contents) {
        Ok(current) if current == *token => match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        },
        Ok(current) => {
            warn!(
                path = %path.display(),
                holder = %token.holder,
                current_holder = %current.holder,
                "Lock was taken over; leaving it in place"
            );
            Ok(false)
        }
        Err(_) => {
            warn!(
                path = %path.display(),
                "Lock file holds an unreadable token; leaving it in place"
            );
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> LockConfig {
        LockConfig::default()
            .with_retry_interval(Duration::from_millis(10))
            .with_max_attempts(3)
    }

    fn coordinator(dir: &Path, holder: &str) -> ClaimCoordinator {
        ClaimCoordinator::for_store(
            &dir.join("queue.jsonl"),
            WorkerId::new(holder),
            fast_config(),
        )
    }

    fn write_token(path: &Path, holder: &str, age: Duration) {
        let token = LockToken {
            holder: WorkerId::new(holder),
            nonce: "foreign".to_string(),
            acquired_at_ms: Utc::now().timestamp_millis() - age.as_millis() as i64,
        };
        fs::write(path, serde_json::to_vec(&token).unwrap()).unwrap();
    }

    fn read_token(path: &Path) -> LockToken {
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn test_lock_path_sits_next_to_store() {
        let c = ClaimCoordinator::for_store(
            Path::new("/tmp/hive/queue.jsonl"),
            WorkerId::new("w"),
            LockConfig::default(),
        );
        assert_eq!(c.lock_path(), Path::new("/tmp/hive/queue.jsonl.lock"));
    }

    #[tokio::test]
    async fn test_acquire_and_release() {
        let dir = tempfile::tempdir().unwrap();
        let c = coordinator(dir.path(), "worker-a");

        let guard = c.acquire().await.unwrap();
        assert!(c.lock_path().exists());
        assert_eq!(read_token(c.lock_path()).holder, WorkerId::new("worker-a"));

        assert!(guard.release().unwrap());
        assert!(!c.lock_path().exists());
    }

    #[tokio::test]
    async fn test_fresh_foreign_token_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let a = coordinator(dir.path(), "worker-a");
        let b = coordinator(dir.path(), "worker-b");

        let _held = a.acquire().await.unwrap();
        let err = b.acquire().await.unwrap_err();
        assert!(err.is_lock_timeout());
        assert!(matches!(err, StoreError::LockTimeout { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn test_stale_token_is_taken_over() {
        let dir = tempfile::tempdir().unwrap();
        let c = coordinator(dir.path(), "worker-a");
        write_token(c.lock_path(), "crashed", Duration::from_secs(120));

        let guard = c.acquire().await.unwrap();
        assert_eq!(read_token(c.lock_path()).holder, WorkerId::new("worker-a"));
        assert!(guard.release().unwrap());
    }

    #[test]
    fn test_takeover_checks_the_nonce_after_rename() {
        let dir = tempfile::tempdir().unwrap();
        let c = coordinator(dir.path(), "worker-a");
        let ours = LockToken::new(c.holder());

        c.overwrite_token(&ours).unwrap();
        assert!(c.still_holds(&ours).unwrap());

        // A second taker renamed its token over ours.
        write_token(c.lock_path(), "worker-b", Duration::ZERO);
        assert!(!c.still_holds(&ours).unwrap());

        fs::remove_file(c.lock_path()).unwrap();
        assert!(!c.still_holds(&ours).unwrap());
    }

    #[test]
    fn test_concurrent_stale_takeover_winner_owns_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("queue.jsonl.lock");
        write_token(&lock_path, "crashed", Duration::from_secs(120));

        let barrier = std::sync::Arc::new(std::sync::Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let dir = dir.path().to_path_buf();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    let c = coordinator(&dir, &format!("worker-{}", i));
                    barrier.wait();
                    c.try_acquire().unwrap()
                })
            })
            .collect();
        let guards: Vec<LockGuard> = handles
            .into_iter()
            .filter_map(|h| h.join().unwrap())
            .collect();

        // Whoever holds the file must be among the winners.
        let current = read_token(&lock_path);
        assert!(!guards.is_empty());
        assert!(guards.iter().any(|g| g.token == current));
        for guard in guards {
            guard.release().unwrap();
        }
    }

    #[tokio::test]
    async fn test_release_leaves_foreign_token() {
        let dir = tempfile::tempdir().unwrap();
        let c = coordinator(dir.path(), "worker-a");

        let guard = c.acquire().await.unwrap();
        write_token(c.lock_path(), "worker-b", Duration::ZERO);

        assert!(!guard.release().unwrap());
        assert_eq!(read_token(c.lock_path()).holder, WorkerId::new("worker-b"));
    }

    #[tokio::test]
    async fn test_same_identity_different_nonce_is_not_released() {
        let dir = tempfile::tempdir().unwrap();
        let c = coordinator(dir.path(), "worker-a");

        let guard = c.acquire().await.unwrap();
        write_token(c.lock_path(), "worker-a", Duration::ZERO);

        assert!(!guard.release().unwrap());
        assert!(c.lock_path().exists());
    }

    #[tokio::test]
    async fn test_drop_releases() {
        let dir = tempfile::tempdir().unwrap();
        let c = coordinator(dir.path(), "worker-a");
        {
            let _guard = c.acquire().await.unwrap();
        }
        assert!(!c.lock_path().exists());
    }

    #[tokio::test]
    async fn test_torn_token_ages_by_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let held = coordinator(dir.path(), "worker-a");
        fs::write(held.lock_path(), b"").unwrap();

        // A fresh, unreadable token counts as held.
        assert!(held.acquire().await.unwrap_err().is_lock_timeout());

        tokio::time::sleep(Duration::from_millis(30)).await;
        let impatient = ClaimCoordinator::for_store(
            &dir.path().join("queue.jsonl"),
            WorkerId::new("worker-b"),
            fast_config().with_stale_after(Duration::from_millis(1)),
        );
        let guard = impatient.acquire().await.unwrap();
        assert_eq!(guard.holder(), &WorkerId::new("worker-b"));
    }
}
