//! Tracking of live workers and the termination barrier.

use super::channel::ChannelReader;
use super::status::TerminationReason;
use crate::error::{HistfanError, Result};
use nix::unistd::Pid;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// A spawned worker awaiting resolution.
pub struct WorkerHandle {
    pub pid: Pid,
    pub slot: usize,
    pub input_name: String,
    /// Coordinator's read end of the worker's result channel.
    pub reader: ChannelReader,
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("pid", &self.pid)
            .field("slot", &self.slot)
            .field("input_name", &self.input_name)
            .finish_non_exhaustive()
    }
}

/// Counters for one coordinator run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub spawned: usize,
    /// Tracked workers that exited on their own.
    pub exited: usize,
    /// Tracked workers killed by a signal.
    pub killed: usize,
    /// Result files written.
    pub collected: usize,
    /// Exited workers whose histogram could not be received or written.
    pub failed: usize,
}

impl RegistryStats {
    /// Workers whose termination has been observed.
    pub fn accounted(&self) -> usize {
        self.exited + self.killed
    }

    /// Every spawned worker has terminated, one way or the other.
    pub fn is_settled(&self) -> bool {
        self.accounted() >= self.spawned
    }
}

/// What the notifier should do with a resolved termination.
#[derive(Debug)]
pub enum Resolution {
    /// Normal exit: read the channel and write the result file.
    Collect(WorkerHandle),
    /// Killed: nothing was produced, the handle is released.
    Discard(WorkerHandle),
}

/// Registry contents. Only reachable through [`WorkerRegistry::lock`].
#[derive(Default)]
pub struct RegistryState {
    workers: HashMap<Pid, WorkerHandle>,
    stats: RegistryStats,
}

impl RegistryState {
    /// Track a freshly spawned worker.
    pub fn register(&mut self, handle: WorkerHandle) -> Result<()> {
        if self.workers.contains_key(&handle.pid) {
            return Err(HistfanError::Setup(format!(
                "pid {} is already tracked",
                handle.pid
            )));
        }
        tracing::debug!(
            pid = handle.pid.as_raw(),
            slot = handle.slot,
            input = %handle.input_name,
            "Registered worker"
        );
        self.workers.insert(handle.pid, handle);
        self.stats.spawned += 1;
        Ok(())
    }

    /// Map a termination back to its worker and account for it.
    ///
    /// The handle is removed, so a second notification for the same pid
    /// is a [`HistfanError::Resolution`] and is never collected twice.
    /// Unknown pids do not move any counter.
    pub fn resolve(&mut self, pid: Pid, reason: &TerminationReason) -> Result<Resolution> {
        let handle = self
            .workers
            .remove(&pid)
            .ok_or(HistfanError::Resolution(pid.as_raw()))?;

        match reason {
            TerminationReason::Exited(_) => {
                self.stats.exited += 1;
                Ok(Resolution::Collect(handle))
            }
            TerminationReason::Signaled { .. } => {
                self.stats.killed += 1;
                Ok(Resolution::Discard(handle))
            }
            TerminationReason::StillAlive | TerminationReason::Other => {
                // Not a termination; keep tracking.
                self.workers.insert(pid, handle);
                Err(HistfanError::Resolution(pid.as_raw()))
            }
        }
    }

    #[cfg(test)]
    pub fn is_tracked(&self, pid: Pid) -> bool {
        self.workers.contains_key(&pid)
    }

    #[cfg(test)]
    pub fn outstanding(&self) -> usize {
        self.workers.len()
    }

    #[cfg(test)]
    pub fn stats(&self) -> RegistryStats {
        self.stats
    }
}

/// Shared worker registry.
///
/// The coordinator holds the lock across spawn + register, and the
/// notifier holds it across waitpid + resolve.
#[derive(Default)]
pub struct WorkerRegistry {
    state: Mutex<RegistryState>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the registry. A poisoned lock is recovered; the counters are
    /// only ever updated in single statements.
    pub fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn stats(&self) -> RegistryStats {
        self.lock().stats
    }

    pub fn is_settled(&self) -> bool {
        self.lock().stats.is_settled()
    }

    pub fn record_collected(&self) {
        self.lock().stats.collected += 1;
    }

    pub fn record_failed(&self) {
        self.lock().stats.failed += 1;
    }

    /// Remove every remaining handle, closing their read ends on drop.
    pub fn release_all(&self) -> Vec<WorkerHandle> {
        let mut state = self.lock();
        let mut handles: Vec<WorkerHandle> = state.workers.drain().map(|(_, h)| h).collect();
        handles.sort_by_key(|h| h.slot);
        handles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fanout::channel::ResultChannel;
    use nix::sys::signal::Signal;

    fn handle(pid: i32, slot: usize, name: &str) -> WorkerHandle {
        let (_writer, reader) = ResultChannel::create().unwrap();
        WorkerHandle {
            pid: Pid::from_raw(pid),
            slot,
            input_name: name.to_string(),
            reader,
        }
    }

    #[test]
    fn test_register_and_settle() {
        let registry = WorkerRegistry::new();
        {
            let mut state = registry.lock();
            state.register(handle(100, 0, "a.txt")).unwrap();
            state.register(handle(101, 1, "b.txt")).unwrap();
        }
        assert_eq!(registry.stats().spawned, 2);
        assert!(!registry.is_settled());

        let mut state = registry.lock();
        let r = state
            .resolve(Pid::from_raw(101), &TerminationReason::Exited(0))
            .unwrap();
        assert!(matches!(r, Resolution::Collect(ref h) if h.slot == 1));
        assert!(!state.stats().is_settled());

        let r = state
            .resolve(
                Pid::from_raw(100),
                &TerminationReason::Signaled {
                    signal: Signal::SIGINT,
                    core_dumped: false,
                },
            )
            .unwrap();
        assert!(matches!(r, Resolution::Discard(ref h) if h.input_name == "a.txt"));

        let stats = state.stats();
        assert_eq!(stats.exited, 1);
        assert_eq!(stats.killed, 1);
        assert!(stats.is_settled());
        assert_eq!(state.outstanding(), 0);
    }

    #[test]
    fn test_duplicate_notification_is_ignored() {
        let registry = WorkerRegistry::new();
        let mut state = registry.lock();
        state.register(handle(200, 0, "a.txt")).unwrap();

        let pid = Pid::from_raw(200);
        assert!(state.resolve(pid, &TerminationReason::Exited(0)).is_ok());
        let err = state.resolve(pid, &TerminationReason::Exited(0)).unwrap_err();
        assert!(matches!(err, HistfanError::Resolution(200)));
        // Counted once
        assert_eq!(state.stats().exited, 1);
    }

    #[test]
    fn test_unknown_pid_moves_no_counter() {
        let registry = WorkerRegistry::new();
        let mut state = registry.lock();
        state.register(handle(300, 0, "a.txt")).unwrap();

        let err = state
            .resolve(Pid::from_raw(999), &TerminationReason::Exited(0))
            .unwrap_err();
        assert!(matches!(err, HistfanError::Resolution(999)));
        assert_eq!(state.stats().accounted(), 0);
        assert!(state.is_tracked(Pid::from_raw(300)));
    }

    #[test]
    fn test_non_terminal_status_keeps_tracking() {
        let registry = WorkerRegistry::new();
        let mut state = registry.lock();
        state.register(handle(400, 0, "a.txt")).unwrap();

        assert!(
            state
                .resolve(Pid::from_raw(400), &TerminationReason::Other)
                .is_err()
        );
        assert!(state.is_tracked(Pid::from_raw(400)));
        assert_eq!(state.stats().accounted(), 0);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let registry = WorkerRegistry::new();
        let mut state = registry.lock();
        state.register(handle(500, 0, "a.txt")).unwrap();
        assert!(state.register(handle(500, 1, "b.txt")).is_err());
        assert_eq!(state.stats().spawned, 1);
    }

    #[test]
    fn test_release_all_in_slot_order() {
        let registry = WorkerRegistry::new();
        {
            let mut state = registry.lock();
            state.register(handle(602, 2, "c")).unwrap();
            state.register(handle(600, 0, "a")).unwrap();
            state.register(handle(601, 1, "b")).unwrap();
        }
        let released = registry.release_all();
        let slots: Vec<usize> = released.iter().map(|h| h.slot).collect();
        assert_eq!(slots, vec![0, 1, 2]);
        assert_eq!(registry.lock().outstanding(), 0);
    }

    #[test]
    fn test_empty_registry_is_settled() {
        assert!(WorkerRegistry::new().is_settled());
    }
}
