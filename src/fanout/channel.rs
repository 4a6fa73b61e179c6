//! Result channels: one pipe per worker.
//!
//! Both ends are created close-on-exec. The write end is handed to the
//! worker as its stdout (dup2 clears the flag on fd 1), so the read end
//! never leaks into any worker and reading it observes EOF once the
//! worker has exited.

use super::protocol::WorkerMessage;
use crate::error::{HistfanError, Result};
use crate::histogram::Histogram;
use nix::fcntl::OFlag;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::os::unix::io::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};
use std::process::Stdio;

/// A file descriptor wrapper that implements Read/Write with EINTR handling.
pub struct PipeFd {
    fd: OwnedFd,
}

impl PipeFd {
    pub fn new(fd: OwnedFd) -> Self {
        Self { fd }
    }

    /// Create from a raw file descriptor (takes ownership).
    ///
    /// # Safety
    /// The caller must ensure `fd` is a valid, open descriptor that nothing
    /// else will close.
    pub unsafe fn from_raw(fd: RawFd) -> Self {
        Self {
            fd: unsafe { OwnedFd::from_raw_fd(fd) },
        }
    }

    pub fn into_owned_fd(self) -> OwnedFd {
        self.fd
    }
}

impl AsFd for PipeFd {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl AsRawFd for PipeFd {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl Read for PipeFd {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match nix::unistd::read(&self.fd, buf) {
                Ok(n) => return Ok(n),
                // SIGCHLD lands on whichever thread it likes
                Err(nix::errno::Errno::EINTR) => continue,
                Err(e) => return Err(io::Error::from_raw_os_error(e as i32)),
            }
        }
    }
}

impl Write for PipeFd {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        loop {
            match nix::unistd::write(&self.fd, buf) {
                Ok(n) => return Ok(n),
                Err(nix::errno::Errno::EINTR) => continue,
                Err(e) => return Err(io::Error::from_raw_os_error(e as i32)),
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Constructor for a worker's result pipe.
pub struct ResultChannel;

impl ResultChannel {
    /// Create a fresh channel, returning `(write_end, read_end)`.
    pub fn create() -> Result<(ChannelWriter, ChannelReader)> {
        let (read_fd, write_fd) = nix::unistd::pipe2(OFlag::O_CLOEXEC)
            .map_err(|e| HistfanError::Setup(format!("Failed to create result pipe: {}", e)))?;
        Ok((
            ChannelWriter::new(PipeFd::new(write_fd)),
            ChannelReader::new(PipeFd::new(read_fd)),
        ))
    }
}

/// Write end of a result channel. Sending consumes it, which closes the fd.
pub struct ChannelWriter {
    fd: PipeFd,
}

impl ChannelWriter {
    pub fn new(fd: PipeFd) -> Self {
        Self { fd }
    }

    /// Take over the process's stdout, which is the channel in a worker.
    ///
    /// # Safety
    /// Nothing else in the process may use or close fd 1 afterwards.
    pub unsafe fn from_stdout() -> Self {
        Self::new(unsafe { PipeFd::from_raw(1) })
    }

    /// Hand the write end to a child as its stdout.
    pub fn into_stdio(self) -> Stdio {
        Stdio::from(self.fd.into_owned_fd())
    }

    /// Send the histogram and close the write end.
    pub fn send(mut self, histogram: &Histogram) -> Result<()> {
        let line = WorkerMessage::histogram(*histogram).to_line()?;
        self.fd
            .write_all(line.as_bytes())
            .map_err(|e| HistfanError::Channel(format!("Failed to write histogram: {}", e)))
    }
}

/// Read end of a result channel. Receiving consumes it.
pub struct ChannelReader {
    reader: BufReader<PipeFd>,
}

impl ChannelReader {
    pub fn new(fd: PipeFd) -> Self {
        Self {
            reader: BufReader::new(fd),
        }
    }

    /// Read the single histogram message.
    ///
    /// Fails if the writer closed without sending a complete line, or sent
    /// something that is not a histogram.
    pub fn receive(mut self) -> Result<Histogram> {
        let mut line = String::new();
        let n = self
            .reader
            .read_line(&mut line)
            .map_err(|e| HistfanError::Channel(format!("Failed to read histogram: {}", e)))?;
        if n == 0 {
            return Err(HistfanError::Channel(
                "channel closed before a histogram was sent".into(),
            ));
        }
        if !line.ends_with('\n') {
            return Err(HistfanError::Channel(format!(
                "short histogram message ({} bytes)",
                n
            )));
        }

        let WorkerMessage::Histogram { counts } = WorkerMessage::from_line(&line)
            .map_err(|e| HistfanError::Channel(format!("Malformed histogram message: {}", e)))?;
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_receive() {
        let (writer, reader) = ResultChannel::create().unwrap();
        let mut h = Histogram::new();
        h.record_bytes(b"Aa Bb");

        writer.send(&h).unwrap();
        assert_eq!(reader.receive().unwrap(), h);
    }

    #[test]
    fn test_closed_without_send_fails() {
        let (writer, reader) = ResultChannel::create().unwrap();
        drop(writer);
        let err = reader.receive().unwrap_err();
        assert!(matches!(err, HistfanError::Channel(_)));
        assert!(err.to_string().contains("closed"));
    }

    #[test]
    fn test_truncated_message_fails() {
        let (writer, reader) = ResultChannel::create().unwrap();
        let mut fd = writer.fd;
        fd.write_all(br#"{"type":"histogram","counts":[1,"#).unwrap();
        drop(fd);
        let err = reader.receive().unwrap_err();
        assert!(err.to_string().contains("short"));
    }

    #[test]
    fn test_garbage_message_fails() {
        let (writer, reader) = ResultChannel::create().unwrap();
        let mut fd = writer.fd;
        fd.write_all(b"hello\n").unwrap();
        drop(fd);
        let err = reader.receive().unwrap_err();
        assert!(err.to_string().contains("Malformed"));
    }

    #[test]
    fn test_ends_are_close_on_exec() {
        use nix::fcntl::{FcntlArg, FdFlag, fcntl};

        let (writer, reader) = ResultChannel::create().unwrap();
        let w = FdFlag::from_bits_truncate(fcntl(&writer.fd, FcntlArg::F_GETFD).unwrap());
        let r = FdFlag::from_bits_truncate(fcntl(reader.reader.get_ref(), FcntlArg::F_GETFD).unwrap());
        assert!(w.contains(FdFlag::FD_CLOEXEC));
        assert!(r.contains(FdFlag::FD_CLOEXEC));
    }
}
