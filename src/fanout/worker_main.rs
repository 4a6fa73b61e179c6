//! Worker subprocess main entry point.
//!
//! Runs when the binary is invoked with `--internal-worker`. stdout is the
//! write end of this worker's result channel.

use super::channel::ChannelWriter;
use crate::error::Result;
use crate::histogram::Histogram;
use std::time::Duration;

/// Compute and send the histogram for `input`.
fn send_histogram(input: &str, writer: ChannelWriter) -> Result<Histogram> {
    let histogram = Histogram::compute(input)?;
    writer.send(&histogram)?;
    Ok(histogram)
}

/// Run the worker: histogram, send, hold for `hold`, exit.
///
/// Exits 0 once the histogram is sent, 1 if the input cannot be read or
/// the channel write fails. Nothing is written to the channel on failure.
pub fn run_worker_main(slot: usize, input: &str, hold: Duration) -> ! {
    // Ignore SIGPIPE - a closed channel surfaces as an io::Error instead
    // Safety: setting a signal disposition to SIG_IGN
    unsafe {
        nix::sys::signal::signal(
            nix::sys::signal::Signal::SIGPIPE,
            nix::sys::signal::SigHandler::SigIgn,
        )
        .ok();
    }

    // Safety: nothing else in the worker touches fd 1
    let writer = unsafe { ChannelWriter::from_stdout() };

    match send_histogram(input, writer) {
        Ok(histogram) => {
            tracing::debug!(slot, input, letters = histogram.total(), "Histogram sent");
        }
        Err(e) => {
            tracing::error!(slot, input, error = %e, "Unable to process file: {}", input);
            std::process::exit(1);
        }
    }

    std::thread::sleep(hold);
    std::process::exit(0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HistfanError;
    use crate::fanout::channel::ResultChannel;
    use tempfile::tempdir;

    #[test]
    fn test_send_histogram_delivers_counts() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "Aa Bb").unwrap();

        let (writer, reader) = ResultChannel::create().unwrap();
        let sent = send_histogram(path.to_str().unwrap(), writer).unwrap();
        let received = reader.receive().unwrap();
        assert_eq!(sent, received);
        assert_eq!(received.count('a'), 2);
    }

    #[test]
    fn test_missing_input_sends_nothing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("SIG");

        let (writer, reader) = ResultChannel::create().unwrap();
        let err = send_histogram(path.to_str().unwrap(), writer).unwrap_err();
        assert!(matches!(err, HistfanError::Io(_)));
        // The writer was dropped unsent, so the reader sees a bare EOF
        assert!(matches!(reader.receive(), Err(HistfanError::Channel(_))));
    }
}
