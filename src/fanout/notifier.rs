//! Asynchronous reaping on SIGCHLD.
//!
//! The signal handler itself only writes one byte to a non-blocking
//! self-pipe, which is async-signal-safe. A dedicated thread blocks on the
//! other end and runs one notifier invocation per wake-up:
//!
//! 1. lock the registry
//! 2. `waitpid(-1, WNOHANG)` until nothing is pending
//! 3. resolve each pid to its worker, counting it toward the barrier
//! 4. unlock, then collect histograms for normal exits
//!
//! The handler is installed once with `sigaction` and stays installed
//! until [`TerminationNotifier::stop`]; nothing is re-armed per signal.

use super::collector::ResultCollector;
use super::channel::PipeFd;
use super::registry::{Resolution, WorkerHandle, WorkerRegistry};
use super::status::{TerminationReason, analyze_wait_status};
use crate::error::{HistfanError, Result};
use nix::errno::Errno;
use nix::fcntl::{FcntlArg, OFlag, fcntl};
use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;
use std::io::Read;
use std::os::unix::io::{AsRawFd, BorrowedFd, OwnedFd};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::thread::JoinHandle;

/// Write end of the self-pipe, read by the signal handler. -1 when idle.
static WAKE_FD: AtomicI32 = AtomicI32::new(-1);

/// Only one SIGCHLD notifier can own the process-wide disposition.
static INSTALLED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_sigchld(_: nix::libc::c_int) {
    let fd = WAKE_FD.load(Ordering::SeqCst);
    if fd < 0 {
        return;
    }
    let saved = Errno::last_raw();
    // Safety: the fd is closed only after WAKE_FD is reset and the
    // handler has been uninstalled.
    let fd = unsafe { BorrowedFd::borrow_raw(fd) };
    // EAGAIN means the pipe is full, so a wake-up is already pending.
    let _ = nix::unistd::write(fd, &[1u8]);
    Errno::set_raw(saved);
}

/// Source of terminated children.
pub trait Reaper {
    /// Next state change, or `None` when nothing is pending.
    fn reap(&mut self) -> Result<Option<WaitStatus>>;
}

/// Reaps any child of this process without blocking.
#[derive(Debug, Default)]
pub struct ChildReaper;

impl Reaper for ChildReaper {
    fn reap(&mut self) -> Result<Option<WaitStatus>> {
        loop {
            match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) => return Ok(None),
                Ok(status) => return Ok(Some(status)),
                // No children at all
                Err(Errno::ECHILD) => return Ok(None),
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Body of one notifier invocation.
#[derive(Clone)]
pub struct TerminationHandler {
    registry: Arc<WorkerRegistry>,
    collector: ResultCollector,
}

impl TerminationHandler {
    pub fn new(registry: Arc<WorkerRegistry>, collector: ResultCollector) -> Self {
        Self {
            registry,
            collector,
        }
    }

    /// Drain every pending termination, then collect results.
    ///
    /// Returns the number of tracked workers resolved.
    pub fn handle<R: Reaper>(&self, reaper: &mut R) -> usize {
        let resolutions = self.drain(reaper);
        let resolved = resolutions.len();

        for resolution in resolutions {
            match resolution {
                Resolution::Collect(handle) => self.collect(handle),
                Resolution::Discard(handle) => {
                    tracing::debug!(
                        pid = handle.pid.as_raw(),
                        slot = handle.slot,
                        "Released channel of killed worker"
                    );
                }
            }
        }
        resolved
    }

    fn drain<R: Reaper>(&self, reaper: &mut R) -> Vec<Resolution> {
        let mut resolutions = Vec::new();
        let mut state = self.registry.lock();

        loop {
            let status = match reaper.reap() {
                Ok(Some(status)) => status,
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(error = %e, "waitpid failed");
                    break;
                }
            };

            let (pid, reason) = analyze_wait_status(status);
            let Some(pid) = pid else { continue };
            if !reason.is_terminal() {
                tracing::trace!(pid = pid.as_raw(), %reason, "Ignoring non-terminal state change");
                continue;
            }
            log_termination(pid, &reason);

            match state.resolve(pid, &reason) {
                Ok(resolution) => resolutions.push(resolution),
                Err(HistfanError::Resolution(raw)) => {
                    tracing::error!(pid = raw, "Child PID {} is not a tracked worker", raw);
                }
                Err(e) => tracing::error!(pid = pid.as_raw(), error = %e, "Resolution failed"),
            }
        }

        resolutions
    }

    fn collect(&self, handle: WorkerHandle) {
        let pid = handle.pid.as_raw();
        let slot = handle.slot;
        match self.collector.collect(handle) {
            Ok(path) => {
                self.registry.record_collected();
                tracing::info!(pid, slot, path = %path.display(), "Histogram saved");
            }
            Err(e) => {
                self.registry.record_failed();
                tracing::error!(pid, slot, error = %e, "No histogram collected");
            }
        }
    }
}

fn log_termination(pid: Pid, reason: &TerminationReason) {
    let pid = pid.as_raw();
    if reason.is_success() {
        tracing::info!(pid, "Child {} {}", pid, reason);
    } else {
        tracing::warn!(pid, "Child {} {}", pid, reason);
    }
}

/// Running SIGCHLD notifier: installed handler plus its thread.
pub struct TerminationNotifier {
    thread: Option<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
    wake: Option<OwnedFd>,
}

impl TerminationNotifier {
    /// Install the SIGCHLD handler and start the notifier thread.
    ///
    /// Must be called before the first worker is spawned.
    pub fn start(handler: TerminationHandler) -> Result<Self> {
        let (read_fd, write_fd) = nix::unistd::pipe2(OFlag::O_CLOEXEC | OFlag::O_NONBLOCK)
            .map_err(|e| HistfanError::Setup(format!("Failed to create wake-up pipe: {}", e)))?;
        // Only the handler's end must never block.
        fcntl(&read_fd, FcntlArg::F_SETFL(OFlag::empty()))?;

        if INSTALLED.swap(true, Ordering::SeqCst) {
            return Err(HistfanError::Setup(
                "a SIGCHLD notifier is already running".into(),
            ));
        }
        WAKE_FD.store(write_fd.as_raw_fd(), Ordering::SeqCst);

        let action = SigAction::new(
            SigHandler::Handler(on_sigchld),
            SaFlags::SA_RESTART | SaFlags::SA_NOCLDSTOP,
            SigSet::empty(),
        );
        // Safety: the handler only touches an atomic and calls write(2).
        if let Err(e) = unsafe { sigaction(Signal::SIGCHLD, &action) } {
            WAKE_FD.store(-1, Ordering::SeqCst);
            INSTALLED.store(false, Ordering::SeqCst);
            return Err(HistfanError::Setup(format!(
                "Failed to install SIGCHLD handler: {}",
                e
            )));
        }

        let stop = Arc::new(AtomicBool::new(false));
        let stop_clone = Arc::clone(&stop);
        let wake_reader = PipeFd::new(read_fd);

        let mut notifier = Self {
            thread: None,
            stop,
            wake: Some(write_fd),
        };

        let thread = std::thread::Builder::new()
            .name("sigchld-notifier".to_string())
            .spawn(move || notifier_loop(wake_reader, handler, stop_clone))
            .map_err(|e| {
                HistfanError::Setup(format!("Failed to spawn notifier thread: {}", e))
            });
        match thread {
            Ok(thread) => notifier.thread = Some(thread),
            Err(e) => {
                notifier.stop();
                return Err(e);
            }
        }

        tracing::debug!("SIGCHLD notifier installed");
        Ok(notifier)
    }

    /// Stop the thread and restore the default SIGCHLD disposition.
    ///
    /// Collection already in progress finishes before this returns.
    pub fn stop(&mut self) {
        let Some(wake) = self.wake.take() else {
            return;
        };

        self.stop.store(true, Ordering::SeqCst);
        let _ = nix::unistd::write(&wake, &[0u8]);
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            tracing::error!("Notifier thread panicked");
        }

        // SigDfl, not SigIgn: ignoring SIGCHLD would auto-reap children.
        let default = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
        // Safety: restoring the default disposition.
        let _ = unsafe { sigaction(Signal::SIGCHLD, &default) };
        WAKE_FD.store(-1, Ordering::SeqCst);
        drop(wake);
        INSTALLED.store(false, Ordering::SeqCst);
        tracing::debug!("SIGCHLD notifier stopped");
    }
}

impl Drop for TerminationNotifier {
    fn drop(&mut self) {
        self.stop();
    }
}

fn notifier_loop(mut wake: PipeFd, handler: TerminationHandler, stop: Arc<AtomicBool>) {
    let mut reaper = ChildReaper;
    // Anything that terminated before this thread was scheduled.
    handler.handle(&mut reaper);

    let mut buf = [0u8; 64];
    loop {
        match wake.read(&mut buf) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::error!(error = %e, "Notifier wake-up pipe failed");
                break;
            }
        }
        if stop.load(Ordering::SeqCst) {
            break;
        }
        handler.handle(&mut reaper);
    }
}
