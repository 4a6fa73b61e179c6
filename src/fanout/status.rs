//! Termination analysis for reaped workers.

use nix::sys::signal::Signal;
use nix::sys::wait::WaitStatus;
use nix::unistd::Pid;

/// Why a worker process changed state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationReason {
    /// Normal exit with status code.
    Exited(i32),
    /// Killed by signal.
    Signaled { signal: Signal, core_dumped: bool },
    /// Nothing to report yet.
    StillAlive,
    /// Stop/continue/ptrace events; never a termination.
    Other,
}

impl TerminationReason {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Exited(0))
    }

    /// The process is gone and its pid has been released.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Exited(_) | Self::Signaled { .. })
    }

    pub fn description(&self) -> String {
        match self {
            Self::Exited(code) => format!("terminated normally with status {}", code),
            Self::Signaled {
                signal,
                core_dumped: true,
            } => format!("terminated by signal {} (core dumped)", signal.as_str()),
            Self::Signaled { signal, .. } => format!("terminated by signal {}", signal.as_str()),
            Self::StillAlive => "still running".to_string(),
            Self::Other => "changed state".to_string(),
        }
    }
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Split a `WaitStatus` into the pid it concerns and the reason.
pub fn analyze_wait_status(status: WaitStatus) -> (Option<Pid>, TerminationReason) {
    let reason = match status {
        WaitStatus::Exited(_, code) => TerminationReason::Exited(code),
        WaitStatus::Signaled(_, signal, core_dumped) => TerminationReason::Signaled {
            signal,
            core_dumped,
        },
        WaitStatus::StillAlive => TerminationReason::StillAlive,
        _ => TerminationReason::Other,
    };
    (status.pid(), reason)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analyze_exit() {
        let (pid, reason) = analyze_wait_status(WaitStatus::Exited(Pid::from_raw(42), 0));
        assert_eq!(pid, Some(Pid::from_raw(42)));
        assert_eq!(reason, TerminationReason::Exited(0));
        assert!(reason.is_success());
        assert!(reason.is_terminal());
    }

    #[test]
    fn test_nonzero_exit_is_still_normal() {
        let (_, reason) = analyze_wait_status(WaitStatus::Exited(Pid::from_raw(7), 1));
        assert!(reason.is_terminal());
        assert!(!reason.is_success());
    }

    #[test]
    fn test_analyze_signal() {
        let (pid, reason) =
            analyze_wait_status(WaitStatus::Signaled(Pid::from_raw(9), Signal::SIGINT, false));
        assert_eq!(pid, Some(Pid::from_raw(9)));
        assert!(!reason.is_success());
        assert!(reason.is_terminal());
        assert!(reason.to_string().contains("SIGINT"));
    }

    #[test]
    fn test_core_dump_noted() {
        let (_, reason) =
            analyze_wait_status(WaitStatus::Signaled(Pid::from_raw(9), Signal::SIGSEGV, true));
        assert!(reason.to_string().contains("core dumped"));
    }

    #[test]
    fn test_still_alive_has_no_pid() {
        let (pid, reason) = analyze_wait_status(WaitStatus::StillAlive);
        assert_eq!(pid, None);
        assert!(!reason.is_terminal());
    }

    #[test]
    fn test_stop_is_not_terminal() {
        let (_, reason) =
            analyze_wait_status(WaitStatus::Stopped(Pid::from_raw(3), Signal::SIGSTOP));
        assert_eq!(reason, TerminationReason::Other);
        assert!(!reason.is_terminal());
    }
}
