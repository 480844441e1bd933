//! Raw capture → database conversion
//!
//! Runs the external converter as `<program> <perf.data> -e <perf.db>
//! [--So_dir <dir>]`. The call blocks; with a timeout configured the child
//! is polled and killed on expiry.

use crate::config::ConverterConfig;
use crate::error::{AnalysisError, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Converter binary name shipped for the current platform
pub fn default_program_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "trace_streamer_window.exe"
    } else if cfg!(target_os = "macos") {
        "trace_streamer_mac"
    } else {
        "trace_streamer_linux"
    }
}

#[derive(Debug, Clone)]
pub struct Converter {
    program: PathBuf,
    so_dir: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl Converter {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            so_dir: None,
            timeout: None,
        }
    }

    pub fn from_config(config: &ConverterConfig) -> Self {
        Self {
            program: config.program.clone(),
            so_dir: config.so_dir.clone(),
            timeout: config.timeout(),
        }
    }

    pub fn with_so_dir(mut self, so_dir: impl Into<PathBuf>) -> Self {
        self.so_dir = Some(so_dir.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Command line for one conversion
    pub fn command(&self, input: &Path, output: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg(input).arg("-e").arg(output);
        if let Some(so_dir) = &self.so_dir {
            cmd.arg("--So_dir").arg(so_dir);
        }
        cmd.stdin(Stdio::null()).stdout(Stdio::null());
        cmd
    }

    /// Convert `input` into the database `output`
    ///
    /// A database left behind by a failed conversion is removed.
    ///
    /// # Errors
    /// `MissingArtifact` when the capture is absent or no database was
    /// written, `ConverterFailure` on spawn failure, wait failure or non-zero
    /// exit, `ConverterTimeout` when the child had to be killed.
    pub fn convert(&self, input: &Path, output: &Path) -> Result<()> {
        if !input.is_file() {
            return Err(AnalysisError::MissingArtifact {
                path: input.to_path_buf(),
            });
        }

        tracing::info!(
            "Converting {} -> {} with {}",
            input.display(),
            output.display(),
            self.program.display()
        );
        let started = Instant::now();

        if let Err(e) = self.run(input, output) {
            discard_partial(output);
            return Err(e);
        }
        if !output.is_file() {
            return Err(AnalysisError::MissingArtifact {
                path: output.to_path_buf(),
            });
        }

        tracing::debug!("Conversion finished in {:?}", started.elapsed());
        Ok(())
    }

    fn run(&self, input: &Path, output: &Path) -> Result<()> {
        let mut child = self
            .command(input, output)
            .spawn()
            .map_err(|e| self.failure(e.to_string()))?;

        let status = match self.timeout {
            Some(timeout) => self.wait_with_timeout(&mut child, timeout)?,
            None => child
                .wait()
                .map_err(|e| self.failure(format!("wait failed: {}", e)))?,
        };

        if !status.success() {
            return Err(self.failure(format!("exited with {}", status)));
        }
        Ok(())
    }

    fn wait_with_timeout(&self, child: &mut std::process::Child, timeout: Duration) -> Result<ExitStatus> {
        let deadline = Instant::now() + timeout;
        loop {
            let polled = child
                .try_wait()
                .map_err(|e| self.failure(format!("wait failed: {}", e)));
            let polled = match polled {
                Ok(polled) => polled,
                Err(e) => {
                    stop(child);
                    return Err(e);
                }
            };
            if let Some(status) = polled {
                return Ok(status);
            }
            if Instant::now() >= deadline {
                stop(child);
                return Err(AnalysisError::ConverterTimeout {
                    program: self.program.display().to_string(),
                    timeout,
                });
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    fn failure(&self, reason: String) -> AnalysisError {
        AnalysisError::ConverterFailure {
            program: self.program.display().to_string(),
            reason,
        }
    }
}

/// Kill and reap a converter that must not keep writing
fn stop(child: &mut std::process::Child) {
    if let Err(e) = child.kill() {
        tracing::warn!("Failed to kill converter: {}", e);
    }
    let _ = child.wait();
}

fn discard_partial(output: &Path) {
    if !output.exists() {
        return;
    }
    match std::fs::remove_file(output) {
        Ok(()) => tracing::debug!("Removed partial database {}", output.display()),
        Err(e) => tracing::warn!("Cannot remove partial database {}: {}", output.display(), e),
    }
}

/// Path of a usable database, converting the capture first when needed
pub fn ensure_database(perf_data: &Path, perf_db: &Path, converter: Option<&Converter>) -> Result<PathBuf> {
    if perf_db.is_file() {
        return Ok(perf_db.to_path_buf());
    }
    match converter {
        Some(converter) => {
            converter.convert(perf_data, perf_db)?;
            Ok(perf_db.to_path_buf())
        }
        None => Err(AnalysisError::MissingArtifact {
            path: perf_db.to_path_buf(),
        }),
    }
}
