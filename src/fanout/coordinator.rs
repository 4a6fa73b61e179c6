//! Spawn sequencing, the termination barrier, and shutdown.

use super::channel::ResultChannel;
use super::collector::ResultCollector;
use super::notifier::{TerminationHandler, TerminationNotifier};
use super::registry::{RegistryStats, WorkerHandle, WorkerRegistry};
use super::spawn::{spawn_worker, worker_executable};
use super::spec::{DEFAULT_SENTINEL, WorkerSpec};
use crate::error::Result;
use nix::sys::signal::{Signal, kill};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::instrument;

/// Configuration for a coordinator run.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Input token that requests an interrupt for its worker.
    pub sentinel: String,
    /// Time every worker stays alive after sending its histogram.
    pub base_delay: Duration,
    /// Extra hold time per slot index.
    pub stagger: Duration,
    /// Sleep between barrier checks.
    pub poll_interval: Duration,
    /// Directory for result files (None = next to the input name).
    pub output_dir: Option<PathBuf>,
    /// Worker executable (None = this binary).
    pub worker_exe: Option<PathBuf>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            sentinel: DEFAULT_SENTINEL.to_string(),
            base_delay: Duration::from_secs(10),
            stagger: Duration::from_secs(3),
            poll_interval: Duration::from_secs(1),
            output_dir: None,
            worker_exe: None,
        }
    }
}

/// Outcome of [`Coordinator::run`].
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub stats: RegistryStats,
    /// The barrier wait was abandoned by a shutdown request.
    pub interrupted: bool,
    /// Workers still unaccounted for at shutdown.
    pub outstanding: usize,
    pub elapsed: Duration,
}

/// Spawns one worker per spec and waits for all of them.
pub struct Coordinator {
    config: CoordinatorConfig,
    registry: Arc<WorkerRegistry>,
    shutdown: Arc<AtomicBool>,
}

impl Coordinator {
    pub fn new(config: CoordinatorConfig) -> Self {
        Self {
            config,
            registry: Arc::new(WorkerRegistry::new()),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that abandons the barrier wait when set (e.g. from Ctrl+C).
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Run every worker to completion.
    ///
    /// Setup failures (pipe, spawn, handler installation) abort the run;
    /// everything after that is isolated to the affected worker.
    #[instrument(level = "debug", skip_all, fields(workers = specs.len()))]
    pub fn run(&self, specs: &[WorkerSpec]) -> Result<RunSummary> {
        let started = Instant::now();
        let exe = worker_executable(self.config.worker_exe.as_deref())?;
        let collector = ResultCollector::new(self.config.output_dir.clone());
        let handler = TerminationHandler::new(Arc::clone(&self.registry), collector);

        // Installed before the first fork so no SIGCHLD is missed.
        let mut notifier = TerminationNotifier::start(handler)?;

        for spec in specs {
            self.spawn_one(&exe, spec)?;
        }

        let interrupted = self.wait_for_barrier();

        notifier.stop();
        let leftover = self.registry.release_all();
        for handle in &leftover {
            tracing::warn!(
                pid = handle.pid.as_raw(),
                slot = handle.slot,
                input = %handle.input_name,
                "Worker still running at shutdown"
            );
        }
        drop(leftover);

        let stats = self.registry.stats();
        let summary = RunSummary {
            stats,
            interrupted,
            outstanding: stats.spawned.saturating_sub(stats.accounted()),
            elapsed: started.elapsed(),
        };
        tracing::info!(
            spawned = stats.spawned,
            collected = stats.collected,
            killed = stats.killed,
            failed = stats.failed,
            outstanding = summary.outstanding,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "Run finished"
        );
        Ok(summary)
    }

    /// Create the channel, spawn, interrupt if requested, and register,
    /// all under the registry lock.
    fn spawn_one(&self, exe: &std::path::Path, spec: &WorkerSpec) -> Result<()> {
        let mut state = self.registry.lock();

        let (writer, reader) = ResultChannel::create()?;
        let hold = spec.hold_delay(self.config.base_delay, self.config.stagger);
        let pid = spawn_worker(exe, spec, hold, writer)?;

        if spec.interrupt_requested {
            // The worker may already be past the point where this matters.
            tracing::info!(pid = pid.as_raw(), slot = spec.slot, "Sending SIGINT to child");
            if let Err(e) = kill(pid, Signal::SIGINT) {
                tracing::warn!(pid = pid.as_raw(), error = %e, "Failed to deliver SIGINT");
            }
        }

        state.register(WorkerHandle {
            pid,
            slot: spec.slot,
            input_name: spec.input_name.clone(),
            reader,
        })?;
        tracing::debug!(
            pid = pid.as_raw(),
            slot = spec.slot,
            hold_ms = hold.as_millis() as u64,
            "Spawned worker"
        );
        Ok(())
    }

    /// Poll until every worker is accounted for. Returns true if the wait
    /// was abandoned through the shutdown flag.
    fn wait_for_barrier(&self) -> bool {
        loop {
            if self.registry.is_settled() {
                return false;
            }
            if self.shutdown.load(Ordering::SeqCst) {
                let stats = self.registry.stats();
                tracing::warn!(
                    outstanding = stats.spawned.saturating_sub(stats.accounted()),
                    "Shutdown requested, no longer waiting for workers"
                );
                return true;
            }
            std::thread::sleep(self.config.poll_interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.sentinel, "SIG");
        assert_eq!(config.base_delay, Duration::from_secs(10));
        assert_eq!(config.stagger, Duration::from_secs(3));
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert!(config.output_dir.is_none());
        assert!(config.worker_exe.is_none());
    }

    #[test]
    fn test_shutdown_flag_is_shared() {
        let coordinator = Coordinator::new(CoordinatorConfig::default());
        let flag = coordinator.shutdown_flag();
        flag.store(true, Ordering::SeqCst);
        assert!(coordinator.shutdown.load(Ordering::SeqCst));
    }

    #[test]
    fn test_barrier_returns_immediately_when_empty() {
        let coordinator = Coordinator::new(CoordinatorConfig::default());
        assert!(!coordinator.wait_for_barrier());
    }
}
