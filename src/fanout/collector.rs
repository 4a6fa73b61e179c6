//! Persisting received histograms.

use super::registry::WorkerHandle;
use crate::error::Result;
use nix::unistd::Pid;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Component, Path, PathBuf};

/// Suffix of every result file.
const RESULT_EXTENSION: &str = "hist";

/// Reads a terminated worker's channel and writes `<input><pid>.hist`.
#[derive(Debug, Clone, Default)]
pub struct ResultCollector {
    /// Directory result files are written under (None = as named).
    output_dir: Option<PathBuf>,
}

impl ResultCollector {
    pub fn new(output_dir: Option<PathBuf>) -> Self {
        Self { output_dir }
    }

    /// Result path for a worker: the input name with the pid and
    /// extension appended verbatim.
    ///
    /// Under an output directory only the plain components of the input
    /// path are kept, so the result always lands inside that directory.
    pub fn result_path(&self, input_name: &str, pid: Pid) -> PathBuf {
        let name = format!("{}{}.{}", input_name, pid, RESULT_EXTENSION);
        match &self.output_dir {
            Some(dir) => {
                let relative: PathBuf = Path::new(&name)
                    .components()
                    .filter(|c| matches!(c, Component::Normal(_)))
                    .collect();
                dir.join(relative)
            }
            None => PathBuf::from(name),
        }
    }

    /// Receive the histogram and write the result file.
    ///
    /// Touches only this handle's channel and one file. Nothing is left on
    /// disk if the channel or the write fails.
    pub fn collect(&self, handle: WorkerHandle) -> Result<PathBuf> {
        let WorkerHandle {
            pid,
            input_name,
            reader,
            ..
        } = handle;

        let histogram = reader.receive()?;
        let path = self.result_path(&input_name, pid);
        // Inputs with directories mirror their layout under the output dir
        if self.output_dir.is_some()
            && let Some(parent) = path.parent()
        {
            std::fs::create_dir_all(parent)?;
        }
        write_atomically(&path, |file| histogram.write_report(BufWriter::new(file)))?;

        tracing::debug!(
            pid = pid.as_raw(),
            letters = histogram.total(),
            path = %path.display(),
            "Wrote histogram"
        );
        Ok(path)
    }
}

/// Write via a sibling temp file, then rename into place.
fn write_atomically<F>(path: &Path, write: F) -> std::io::Result<()>
where
    F: FnOnce(&mut File) -> std::io::Result<()>,
{
    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);

    let result = File::create(&temp_path)
        .and_then(|mut file| {
            write(&mut file)?;
            file.sync_all()
        })
        .and_then(|()| std::fs::rename(&temp_path, path));

    if result.is_err() {
        let _ = std::fs::remove_file(&temp_path);
    }
    result
}
