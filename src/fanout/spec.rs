//! Worker specifications built from the positional arguments.

use crate::error::{HistfanError, Result};
use std::time::Duration;

/// Token that requests an interrupt for the worker in its slot.
pub const DEFAULT_SENTINEL: &str = "SIG";

/// Upper bound on the number of workers per run.
pub const MAX_WORKERS: usize = 100;

/// One planned worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSpec {
    /// Position in the argument list, starting at 0.
    pub slot: usize,
    /// File to histogram. For a sentinel entry this is the sentinel itself.
    pub input_name: String,
    /// Deliver SIGINT right after spawn.
    pub interrupt_requested: bool,
}

impl WorkerSpec {
    /// How long the worker stays alive after sending its histogram.
    ///
    /// Saturates at `Duration::MAX` instead of overflowing.
    pub fn hold_delay(&self, base: Duration, stagger: Duration) -> Duration {
        u32::try_from(self.slot)
            .ok()
            .and_then(|slot| stagger.checked_mul(slot))
            .and_then(|extra| base.checked_add(extra))
            .unwrap_or(Duration::MAX)
    }
}

/// Turn positional arguments into worker specs, in argument order.
///
/// The sentinel token keeps its own text as the input name, so the
/// interrupted worker tries to histogram a file of that name.
pub fn parse_inputs<S: AsRef<str>>(inputs: &[S], sentinel: &str) -> Result<Vec<WorkerSpec>> {
    if inputs.is_empty() {
        return Err(HistfanError::Usage(
            "insufficient number of command line arguments: expected at least one file".into(),
        ));
    }
    if inputs.len() > MAX_WORKERS {
        return Err(HistfanError::Usage(format!(
            "too many inputs: {} given, at most {} workers are supported",
            inputs.len(),
            MAX_WORKERS
        )));
    }

    let specs = inputs
        .iter()
        .enumerate()
        .map(|(slot, input)| {
            let input = input.as_ref();
            let interrupt_requested = input == sentinel;
            if interrupt_requested {
                tracing::info!(slot, "Interrupt requested for worker in slot {}", slot);
            } else {
                tracing::info!(slot, file = input, "File name added: {}", input);
            }
            WorkerSpec {
                slot,
                input_name: input.to_string(),
                interrupt_requested,
            }
        })
        .collect();

    Ok(specs)
}
