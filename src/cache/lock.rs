//! Host-scoped advisory lock backed by a marker file.
//!
//! The marker is named `<key>-<hostname>` and holds the absolute instant at
//! which the lease expires. A marker past its expiry is treated as abandoned
//! and removed by whoever looks at it next. Each lease carries a token, and
//! a guard only removes the marker while that token is still in it.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Default lock key, giving a marker named `lock-<hostname>`.
pub const DEFAULT_LOCK_KEY: &str = "lock";

/// Lease lifetime (1 hour).
const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

/// Fixed polling cadence while another holder owns the lease.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Counter for unique sibling names and lease tokens within a process
static MARKER_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Contents of the marker file.
#[derive(Debug, Serialize, Deserialize)]
struct LockMarker {
    /// Expiry as milliseconds since the Unix epoch.
    expires_at_ms: u64,
    host: String,
    pid: u32,
    #[serde(default)]
    token: String,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Returns the host name of this machine.
pub fn hostname() -> String {
    let mut buf = [0u8; 256];
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if rc != 0 {
        return "localhost".to_string();
    }
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

/// A named, host-qualified lease with a fixed time-to-live.
///
/// One instance guards every repository operation on the host; it is not
/// scoped per repository.
#[derive(Debug, Clone)]
pub struct RefreshLock {
    path: PathBuf,
    ttl: Duration,
    poll_interval: Duration,
}

/// Holds the lease until dropped.
#[derive(Debug)]
pub struct LockGuard<'a> {
    lock: &'a RefreshLock,
    token: String,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.lock.release_owned(&self.token);
    }
}

impl Default for RefreshLock {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_KEY)
    }
}

impl RefreshLock {
    /// Lock whose marker lives in the process working directory.
    pub fn new(key: &str) -> Self {
        Self::in_dir(".", key)
    }

    /// Lock whose marker lives in `dir`.
    pub fn in_dir(dir: impl AsRef<Path>, key: &str) -> Self {
        Self {
            path: dir.as_ref().join(format!("{}-{}", key, hostname())),
            ttl: DEFAULT_TTL,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Set the lease lifetime.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the polling interval used while waiting.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Path of the marker file.
    pub fn marker_path(&self) -> &Path {
        &self.path
    }

    /// Returns true if an unexpired marker exists.
    ///
    /// An expired or unreadable marker is removed and reported as unlocked.
    pub fn is_locked(&self) -> bool {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(_) => return false,
        };

        let expired = match serde_json::from_slice::<LockMarker>(&raw) {
            Ok(marker) => {
                log::trace!(
                    "Lock {} held by {} (pid {})",
                    self.path.display(),
                    marker.host,
                    marker.pid
                );
                marker.expires_at_ms < now_ms()
            }
            Err(e) => {
                log::warn!("Unreadable lock marker {}: {}", self.path.display(), e);
                true
            }
        };

        if expired {
            log::info!("Removing expired lock marker {}", self.path.display());
            self.remove_if_unchanged(&raw);
            return false;
        }
        true
    }

    /// Block until the lease is free, then take it.
    ///
    /// There is no upper bound on the wait.
    pub fn acquire(&self) -> io::Result<LockGuard<'_>> {
        let token = format!(
            "{}:{}:{}",
            hostname(),
            std::process::id(),
            MARKER_COUNTER.fetch_add(1, Ordering::Relaxed)
        );
        let mut announced = false;
        loop {
            if self.is_locked() {
                if !announced {
                    log::debug!("Waiting for lock {}", self.path.display());
                    announced = true;
                }
                std::thread::sleep(self.poll_interval);
                continue;
            }

            if self.try_create_marker(&token)? {
                log::debug!("Acquired lock {}", self.path.display());
                return Ok(LockGuard { lock: self, token });
            }
        }
    }

    /// Delete the marker unless it has already expired, whoever holds it.
    ///
    /// Failures are ignored.
    pub fn release(&self) {
        if self.is_locked()
            && let Err(e) = fs::remove_file(&self.path)
        {
            log::debug!("Failed to remove lock marker {}: {}", self.path.display(), e);
        }
    }

    /// Delete the marker only if it still carries `token`.
    fn release_owned(&self, token: &str) {
        let Ok(raw) = fs::read(&self.path) else {
            return;
        };
        match serde_json::from_slice::<LockMarker>(&raw) {
            Ok(marker) if marker.token == token => self.remove_if_unchanged(&raw),
            _ => log::debug!(
                "Lock {} was taken over, leaving the marker",
                self.path.display()
            ),
        }
    }

    /// Remove the marker if its bytes are still `seen`.
    ///
    /// The marker is renamed aside first, so a marker written after `seen`
    /// was read is put back instead of deleted.
    fn remove_if_unchanged(&self, seen: &[u8]) {
        let aside = self.sibling("stale");
        if let Err(e) = fs::rename(&self.path, &aside) {
            log::debug!("Failed to remove lock marker {}: {}", self.path.display(), e);
            return;
        }
        if fs::read(&aside).is_ok_and(|raw| raw != seen) {
            log::debug!("Lock marker {} changed, restoring it", self.path.display());
            if let Err(e) = fs::hard_link(&aside, &self.path) {
                log::warn!("Failed to restore lock marker {}: {}", self.path.display(), e);
            }
        }
        let _ = fs::remove_file(&aside);
    }

    /// Unique path next to the marker, e.g. `lock-host.tmp.<pid>.<n>`.
    fn sibling(&self, kind: &str) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(format!(
            ".{}.{}.{}",
            kind,
            std::process::id(),
            MARKER_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        self.path.with_file_name(name)
    }

    /// Write the marker to a temp path and hard-link it into place, so the
    /// marker appears with its full contents or not at all.
    ///
    /// Returns false if another holder created the marker first.
    fn try_create_marker(&self, token: &str) -> io::Result<bool> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let marker = LockMarker {
            expires_at_ms: now_ms().saturating_add(self.ttl.as_millis() as u64),
            host: hostname(),
            pid: std::process::id(),
            token: token.to_string(),
        };
        let body = serde_json::to_vec(&marker).map_err(io::Error::other)?;

        let temp_path = loop {
            let candidate = self.sibling("tmp");
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&candidate)
            {
                Ok(mut file) => {
                    file.write_all(&body)?;
                    file.sync_all()?;
                    break candidate;
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e),
            }
        };

        let result = fs::hard_link(&temp_path, &self.path);
        let _ = fs::remove_file(&temp_path);

        match result {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e),
        }
    }
}
