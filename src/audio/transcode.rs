//! External transcoder fallback (ffmpeg)
//!
//! Input bytes, transcoder output and its stderr all live in `NamedTempFile`s
//! inside a scratch directory. The guards are dropped on every return path,
//! so a failed, timed-out or successful invocation leaves nothing behind.
//! Stderr goes to a file rather than a pipe: nothing has to drain it, and a
//! grandchild that inherits it cannot block the caller.

use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use super::{decode, CanonicalWaveform, TARGET_CHANNELS};
use crate::error::{Result, VoxgateError};

/// How often a running transcoder is polled for exit
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Stderr bytes kept for the error message (tail)
const STDERR_TAIL: usize = 4096;

/// Transcoder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscoderConfig {
    /// Executable name or path
    pub program: String,
    /// Arguments inserted before the ffmpeg argument list (wrappers such as `nice -n 10`)
    pub pre_args: Vec<String>,
    /// Hard limit on a single invocation (ms)
    pub timeout_ms: u64,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            program: "ffmpeg".to_string(),
            pre_args: Vec::new(),
            timeout_ms: 30_000,
        }
    }
}

/// Runs the external transcoder with forced mono output at a fixed rate
#[derive(Debug, Clone)]
pub struct Transcoder {
    program: String,
    pre_args: Vec<String>,
    timeout: Duration,
    sample_rate: u32,
    scratch_dir: PathBuf,
}

impl Transcoder {
    pub fn new(config: &TranscoderConfig, sample_rate: u32, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: config.program.clone(),
            pre_args: config.pre_args.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
            sample_rate,
            scratch_dir: scratch_dir.into(),
        }
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Transcode arbitrary container bytes into a mono waveform
    pub fn transcode(&self, bytes: &[u8], hint: Option<&str>) -> Result<CanonicalWaveform> {
        let extension = hint.unwrap_or("bin");

        let mut input = tempfile::Builder::new()
            .prefix("voxgate-in-")
            .suffix(&format!(".{}", extension))
            .tempfile_in(&self.scratch_dir)
            .map_err(|e| VoxgateError::io("Failed to create transcoder input file", e))?;
        input
            .write_all(bytes)
            .and_then(|_| input.flush())
            .map_err(|e| VoxgateError::io("Failed to write transcoder input file", e))?;

        let output = tempfile::Builder::new()
            .prefix("voxgate-out-")
            .suffix(".wav")
            .tempfile_in(&self.scratch_dir)
            .map_err(|e| VoxgateError::io("Failed to create transcoder output file", e))?;

        self.run(input.path(), output.path())?;

        let transcoded = std::fs::read(output.path())
            .map_err(|e| VoxgateError::io("Failed to read transcoder output", e))?;
        if transcoded.is_empty() {
            return Err(VoxgateError::UnsupportedAudio(
                "transcoder produced no output".to_string(),
            ));
        }

        decode::decode_direct(&transcoded, Some("wav")).map_err(|e| {
            VoxgateError::UnsupportedAudio(format!("transcoded output unreadable: {:#}", e))
        })
    }

    /// Spawn the transcoder and wait for it within the timeout
    fn run(&self, input: &Path, output: &Path) -> Result<()> {
        let rate = self.sample_rate.to_string();
        let channels = TARGET_CHANNELS.to_string();

        let stderr_log = tempfile::Builder::new()
            .prefix("voxgate-err-")
            .suffix(".log")
            .tempfile_in(&self.scratch_dir)
            .map_err(|e| VoxgateError::io("Failed to create transcoder log file", e))?;
        let stderr_sink = stderr_log
            .reopen()
            .map_err(|e| VoxgateError::io("Failed to open transcoder log file", e))?;

        let mut command = Command::new(&self.program);
        command
            .args(&self.pre_args)
            .args(["-hide_banner", "-loglevel", "error", "-nostdin", "-y", "-i"])
            .arg(input)
            .args(["-ac", channels.as_str(), "-ar", rate.as_str(), "-f", "wav"])
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(stderr_sink));

        let mut child = command.spawn().map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                VoxgateError::TranscodeUtility(format!("'{}' not found", self.program))
            } else {
                VoxgateError::TranscodeUtility(format!("failed to launch '{}': {}", self.program, e))
            }
        })?;

        // Only the child holds the log file now
        drop(command);

        let status = match wait_with_timeout(&mut child, self.timeout) {
            Ok(Some(status)) => status,
            Ok(None) => {
                log::warn!(
                    "Transcoder '{}' exceeded {}ms, killed",
                    self.program,
                    self.timeout.as_millis()
                );
                return Err(VoxgateError::TranscodeUtility(format!(
                    "timed out after {}ms",
                    self.timeout.as_millis()
                )));
            }
            Err(e) => {
                return Err(VoxgateError::TranscodeUtility(format!(
                    "failed waiting for '{}': {}",
                    self.program, e
                )))
            }
        };

        if !status.success() {
            let stderr = read_tail(stderr_log.path());
            return Err(VoxgateError::TranscodeUtility(format!(
                "'{}' exited with {}: {}",
                self.program,
                status,
                stderr.trim()
            )));
        }

        log::debug!("Transcoder finished: {}", output.display());
        Ok(())
    }
}

/// Last `STDERR_TAIL` bytes of the transcoder log, lossily decoded
fn read_tail(path: &Path) -> String {
    match std::fs::read(path) {
        Ok(bytes) => {
            let start = bytes.len().saturating_sub(STDERR_TAIL);
            String::from_utf8_lossy(&bytes[start..]).into_owned()
        }
        Err(e) => format!("<stderr unavailable: {}>", e),
    }
}

/// Poll for exit until the deadline; kill and reap on expiry (returns `None`)
fn wait_with_timeout(child: &mut Child, timeout: Duration) -> io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;

    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }

        if Instant::now() >= deadline {
            let _ = child.kill();
            child.wait()?;
            return Ok(None);
        }

        std::thread::sleep(POLL_INTERVAL);
    }
}
