//! Letter-frequency histograms.
//!
//! A [`Histogram`] counts ASCII letters case-insensitively; every other
//! byte is ignored. Counting is byte-oriented, so non-UTF-8 input is fine.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::Path;

/// Number of buckets, one per letter `a`..=`z`.
pub const ALPHABET_SIZE: usize = 26;

/// Read buffer for [`Histogram::compute`].
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Fixed 26-bucket letter-frequency table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Histogram {
    counts: [u64; ALPHABET_SIZE],
}

impl Histogram {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one byte if it is an ASCII letter.
    pub fn record(&mut self, byte: u8) {
        if byte.is_ascii_alphabetic() {
            self.counts[(byte.to_ascii_lowercase() - b'a') as usize] += 1;
        }
    }

    pub fn record_bytes(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.record(b);
        }
    }

    /// Histogram the whole of `reader`.
    pub fn from_reader<R: Read>(mut reader: R) -> io::Result<Self> {
        let mut histogram = Self::new();
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => return Ok(histogram),
                Ok(n) => histogram.record_bytes(&buf[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Histogram the file at `path`.
    ///
    /// Either the entire file is scanned or an error is returned; there are
    /// no partial results.
    pub fn compute(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Ok(Self::from_reader(BufReader::new(file))?)
    }

    /// Count for `letter`, either case. Non-letters are always zero.
    #[cfg(test)]
    pub fn count(&self, letter: char) -> u64 {
        if letter.is_ascii_alphabetic() {
            self.counts[(letter.to_ascii_lowercase() as u8 - b'a') as usize]
        } else {
            0
        }
    }

    /// Total number of letters counted.
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// `(letter, count)` pairs in alphabetical order.
    pub fn iter(&self) -> impl Iterator<Item = (char, u64)> + '_ {
        self.counts
            .iter()
            .enumerate()
            .map(|(i, &c)| ((b'a' + i as u8) as char, c))
    }

    /// Write the result-file body: 26 lines of `<letter> <count>`.
    pub fn write_report<W: Write>(&self, mut out: W) -> io::Result<()> {
        for (letter, count) in self.iter() {
            writeln!(out, "{} {}", letter, count)?;
        }
        out.flush()
    }
}
