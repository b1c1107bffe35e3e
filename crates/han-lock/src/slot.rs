//! Capacity-bounded execution slots.
//!
//! A slot is a JSON record `slots/slot-<id>` stamped with the owner's
//! PID. Slots are granted and released only under the coordinator lock;
//! every locked section first sweeps records whose owner PID is dead, so
//! a crashed orchestrator can never wedge the machine. Waiters back off
//! with a jittered sleep between attempts.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::{Coordinator, pid_alive};

const BACKOFF_BASE_MS: u64 = 50;
const BACKOFF_SPAN_MS: u64 = 200;

/// Diagnostic record written into each slot file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotRecord {
    pub pid: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub hook_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin_name: Option<String>,
    pub acquired_at: DateTime<Utc>,
}

/// A granted slot. Removed on `release()` or `Drop`, whichever comes
/// first; a crash leaves the file for the next sweep to reap.
pub struct SlotGuard {
    coordinator: Coordinator,
    slot_id: u32,
    path: PathBuf,
    released: bool,
}

impl std::fmt::Debug for SlotGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotGuard")
            .field("slot_id", &self.slot_id)
            .field("path", &self.path)
            .finish()
    }
}

impl SlotGuard {
    /// Slot id, ≥ 0 when granted.
    pub fn slot_id(&self) -> u32 {
        self.slot_id
    }

    /// Release under the coordinator lock. Only removes the file while
    /// it still records this process as the owner.
    pub fn release(mut self) -> Result<()> {
        self.release_inner()
    }

    fn release_inner(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        let _lock = self.coordinator.lock()?;
        let owned = match fs::read_to_string(&self.path) {
            Ok(content) => serde_json::from_str::<SlotRecord>(&content)
                .map(|record| record.pid == std::process::id())
                .unwrap_or(false),
            // Already reaped by a peer sweep; nothing left to release.
            Err(_) => false,
        };
        if owned {
            fs::remove_file(&self.path)
                .with_context(|| format!("Failed to remove slot file: {}", self.path.display()))?;
        }
        Ok(())
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if let Err(error) = self.release_inner() {
            tracing::warn!(error = %error, "Failed to release slot on drop");
        }
    }
}

impl Coordinator {
    /// Acquire a slot in `pool` (the hook name), waiting with jittered
    /// backoff while the pool is at capacity. Dead owners are reaped on
    /// every attempt, so waiting is bounded by live holders only.
    pub fn acquire_slot(
        &self,
        pool: &str,
        plugin_name: Option<&str>,
        session_id: Option<&str>,
    ) -> Result<SlotGuard> {
        loop {
            if let Some(guard) = self.try_acquire_slot(pool, plugin_name, session_id)? {
                return Ok(guard);
            }
            std::thread::sleep(backoff_jitter());
        }
    }

    /// Single non-blocking attempt: sweep, count the pool, grant if under
    /// capacity.
    pub fn try_acquire_slot(
        &self,
        pool: &str,
        plugin_name: Option<&str>,
        session_id: Option<&str>,
    ) -> Result<Option<SlotGuard>> {
        let slots_dir = self.slots_dir();
        fs::create_dir_all(&slots_dir)
            .with_context(|| format!("Failed to create slots directory: {}", slots_dir.display()))?;

        let _lock = self.lock()?;

        let mut pool_live = 0u32;
        let mut used_ids = Vec::new();
        for entry in fs::read_dir(&slots_dir)
            .with_context(|| format!("Failed to read slots directory: {}", slots_dir.display()))?
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(error) => {
                    tracing::debug!(error = %error, "Skipping unreadable slot entry");
                    continue;
                }
            };
            let name = entry.file_name().to_string_lossy().to_string();
            let Some(id) = name
                .strip_prefix("slot-")
                .and_then(|id| id.parse::<u32>().ok())
            else {
                continue;
            };

            let record = fs::read_to_string(entry.path())
                .ok()
                .and_then(|content| serde_json::from_str::<SlotRecord>(&content).ok());
            match record {
                Some(record) if pid_alive(record.pid) => {
                    used_ids.push(id);
                    if record.hook_name == pool {
                        pool_live += 1;
                    }
                }
                // Dead owner or torn record: reap. A peer may have beaten
                // us to the removal, which is fine.
                _ => {
                    let _ = fs::remove_file(entry.path());
                }
            }
        }

        if pool_live >= self.capacity() {
            return Ok(None);
        }

        let slot_id = (0..).find(|id| !used_ids.contains(id)).unwrap_or(0);
        let path = slots_dir.join(format!("slot-{slot_id}"));
        let record = SlotRecord {
            pid: std::process::id(),
            session_id: session_id.map(str::to_string),
            hook_name: pool.to_string(),
            plugin_name: plugin_name.map(str::to_string),
            acquired_at: Utc::now(),
        };
        let json = serde_json::to_string(&record).context("Failed to serialize slot record")?;
        fs::write(&path, json)
            .with_context(|| format!("Failed to write slot file: {}", path.display()))?;

        Ok(Some(SlotGuard {
            coordinator: self.clone(),
            slot_id,
            path,
            released: false,
        }))
    }

    /// Run `f` while holding a slot, releasing it on every exit path
    /// (return, error, panic-unwind via the guard's `Drop`).
    pub async fn with_global_slot<F, Fut, T>(
        &self,
        pool: &str,
        plugin_name: Option<&str>,
        session_id: Option<&str>,
        f: F,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let guard = self.acquire_slot(pool, plugin_name, session_id)?;
        let out = f().await;
        guard.release()?;
        Ok(out)
    }

    /// Live slot count across pools, for diagnostics.
    pub fn live_slots(&self) -> Result<u32> {
        let slots_dir = self.slots_dir();
        if !slots_dir.exists() {
            return Ok(0);
        }
        let mut live = 0;
        for entry in fs::read_dir(&slots_dir)? {
            let Ok(entry) = entry else { continue };
            let alive = fs::read_to_string(entry.path())
                .ok()
                .and_then(|content| serde_json::from_str::<SlotRecord>(&content).ok())
                .is_some_and(|record| pid_alive(record.pid));
            if alive {
                live += 1;
            }
        }
        Ok(live)
    }
}

/// 50–250 ms, spread by wall-clock nanoseconds so colliding waiters
/// desynchronize.
fn backoff_jitter() -> Duration {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    Duration::from_millis(BACKOFF_BASE_MS + u64::from(nanos) % BACKOFF_SPAN_MS)
}
