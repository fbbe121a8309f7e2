//! Bridges to external capture tools.
//!
//! Raw microphone, camera and screen capture stay outside the agent. A
//! configured shell command does the capture and prints a small result on
//! stdout, which is all the agent ever sees:
//!
//! - score providers print a number (see [`ScoreFormat`]);
//! - the context source writes an encoded screenshot.
//!
//! A command that exits with status 69 (`EX_UNAVAILABLE`) reports that its
//! modality cannot work on this machine and is not asked again. A command
//! that runs past its timeout is killed and counts as a failed sample.

use crate::config::{BreathingConfig, PostureConfig};
use crate::core::auxiliary::{breathing_concern, posture_concern, SignalProvider};
use crate::core::intent::ContextSource;
use crate::error::SignalError;
use std::process::{Command, Output, Stdio};
use std::time::Duration;

/// Exit status signalling a permanently unavailable modality.
pub const EXIT_UNAVAILABLE: i32 = 69;

/// How to turn a provider's stdout into a concern score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScoreFormat {
    /// A 0-100 concern score
    Score,
    /// `<breaths per minute> [confidence]`; confidence defaults to 1
    Breathing { min_rate: u32, max_rate: u32 },
    /// Forward neck angle in degrees
    Posture { neck_angle_threshold: u32 },
}

impl ScoreFormat {
    pub fn breathing(config: &BreathingConfig) -> Self {
        ScoreFormat::Breathing {
            min_rate: config.min_rate,
            max_rate: config.max_rate,
        }
    }

    pub fn posture(config: &PostureConfig) -> Self {
        ScoreFormat::Posture {
            neck_angle_threshold: config.neck_angle_threshold,
        }
    }
}

fn parse_number(token: Option<&str>, what: &str) -> Result<f64, SignalError> {
    let token = token.ok_or_else(|| SignalError::Acquisition(format!("missing {what}")))?;
    token
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| SignalError::Acquisition(format!("invalid {what}: {token:?}")))
}

/// Parse a provider's stdout into a 0-100 concern score.
pub fn parse_output(format: ScoreFormat, stdout: &str) -> Result<f64, SignalError> {
    let mut tokens = stdout.split_whitespace();
    match format {
        ScoreFormat::Score => parse_number(tokens.next(), "score").map(|s| s.clamp(0.0, 100.0)),
        ScoreFormat::Breathing { min_rate, max_rate } => {
            let rate = parse_number(tokens.next(), "breathing rate")?;
            let confidence = match tokens.next() {
                Some(token) => parse_number(Some(token), "confidence")?,
                None => 1.0,
            };
            Ok(breathing_concern(rate, confidence, min_rate, max_rate))
        }
        ScoreFormat::Posture {
            neck_angle_threshold,
        } => {
            let angle = parse_number(tokens.next(), "neck angle")?;
            Ok(posture_concern(angle, neck_angle_threshold))
        }
    }
}

fn shell(command: &str) -> Command {
    #[cfg(windows)]
    {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(command);
        cmd
    }
    #[cfg(not(windows))]
    {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd
    }
}

fn check_status(output: Output) -> Result<Output, SignalError> {
    match output.status.code() {
        Some(0) => Ok(output),
        Some(EXIT_UNAVAILABLE) => Err(SignalError::Unavailable(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        )),
        code => Err(SignalError::Acquisition(format!(
            "provider exited with {code:?}"
        ))),
    }
}

/// Runs one shell command with a time limit.
///
/// Owns a current-thread runtime so it can be driven from the plain
/// monitoring threads. A run that outlives the limit is killed and reported
/// as a transient failure.
#[derive(Debug)]
struct CommandRunner {
    command: String,
    timeout: Duration,
    runtime: tokio::runtime::Runtime,
}

impl CommandRunner {
    fn new(command: String, timeout: Duration) -> Result<Self, SignalError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| SignalError::Unavailable(format!("could not create runtime: {e}")))?;

        Ok(Self {
            command,
            timeout,
            runtime,
        })
    }

    fn run(&self) -> Result<Output, SignalError> {
        self.runtime.block_on(async {
            let mut cmd = tokio::process::Command::from(shell(&self.command));
            cmd.stdin(Stdio::null()).kill_on_drop(true);

            // Dropping the output future on expiry kills the child.
            match tokio::time::timeout(self.timeout, cmd.output()).await {
                Ok(Ok(output)) => check_status(output),
                Ok(Err(e)) => Err(SignalError::Unavailable(format!(
                    "could not run provider: {e}"
                ))),
                Err(_) => Err(SignalError::Acquisition(format!(
                    "provider timed out after {:.1}s",
                    self.timeout.as_secs_f64()
                ))),
            }
        })
    }
}

/// Auxiliary score provider backed by a shell command.
#[derive(Debug)]
pub struct CommandProvider {
    runner: CommandRunner,
    format: ScoreFormat,
}

impl CommandProvider {
    pub fn new(
        command: impl Into<String>,
        format: ScoreFormat,
        timeout: Duration,
    ) -> Result<Self, SignalError> {
        Ok(Self {
            runner: CommandRunner::new(command.into(), timeout)?,
            format,
        })
    }

    pub fn command(&self) -> &str {
        &self.runner.command
    }
}

impl SignalProvider for CommandProvider {
    fn sample(&mut self) -> Result<f64, SignalError> {
        let output = self.runner.run()?;
        parse_output(self.format, &String::from_utf8_lossy(&output.stdout))
    }
}

/// Screenshot source backed by a shell command writing image bytes to
/// stdout. The bytes are handed to the judge and dropped.
#[derive(Debug)]
pub struct CommandContextSource {
    runner: CommandRunner,
}

impl CommandContextSource {
    pub fn new(command: impl Into<String>, timeout: Duration) -> Result<Self, SignalError> {
        Ok(Self {
            runner: CommandRunner::new(command.into(), timeout)?,
        })
    }
}

impl ContextSource for CommandContextSource {
    fn capture(&self) -> Option<Vec<u8>> {
        match self.runner.run() {
            Ok(output) if !output.stdout.is_empty() => Some(output.stdout),
            Ok(_) => {
                tracing::debug!("Screen capture produced no data");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "Screen capture failed");
                None
            }
        }
    }
}
