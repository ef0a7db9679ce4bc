use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::command::CommandSpec;
use crate::config::MediaConfig;
use crate::error::{ClipstitchError, Result};

/// Most diagnostic text kept from the processor's combined output.
const TAIL_LIMIT: usize = 4096;
/// Portion of the tail quoted in failure messages.
const ERROR_TAIL: usize = 500;
const WARNING_TAIL: usize = 300;

/// Instantaneous progress derived from the processor's streamed output.
/// fps/speed are observability-only and degrade to "N/A" when absent.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub percent: f64,
    pub current_secs: u64,
    pub total_secs: u64,
    pub fps: String,
    pub speed: String,
}

pub type ProgressObserver<'a> = &'a (dyn Fn(&ProgressUpdate) + Send + Sync);

fn duration_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Duration: (\d{2}):(\d{2}):(\d{2})\.\d{2}").unwrap())
}

fn time_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"time=(\d{2}):(\d{2}):(\d{2})\.\d{2}").unwrap())
}

fn fps_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"fps=\s*(\d+\.?\d*)").unwrap())
}

fn speed_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"speed=\s*(\d+\.?\d*)x").unwrap())
}

fn parse_clock(caps: &regex::Captures<'_>) -> u64 {
    let hours: u64 = caps[1].parse().unwrap_or(0);
    let minutes: u64 = caps[2].parse().unwrap_or(0);
    let seconds: u64 = caps[3].parse().unwrap_or(0);
    hours * 3600 + minutes * 60 + seconds
}

/// Incremental parser for the processor's textual progress protocol.
/// The first Duration marker fixes the total; time= markers after that
/// yield percentage updates, capped at 100.
#[derive(Debug, Default)]
pub struct ProgressParser {
    duration_secs: Option<u64>,
}

impl ProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, line: &str) -> Option<ProgressUpdate> {
        if self.duration_secs.is_none() && line.contains("Duration:") {
            if let Some(caps) = duration_re().captures(line) {
                let total = parse_clock(&caps);
                self.duration_secs = Some(total);
                debug!("Total duration: {}s", total);
            }
        }

        let total = self.duration_secs.filter(|t| *t > 0)?;
        if !line.contains("time=") {
            return None;
        }
        let caps = time_re().captures(line)?;
        let current = parse_clock(&caps);
        let percent = f64::min(100.0, current as f64 / total as f64 * 100.0);

        let fps = fps_re()
            .captures(line)
            .map(|c| c[1].to_string())
            .unwrap_or_else(|| "N/A".to_string());
        let speed = speed_re()
            .captures(line)
            .map(|c| c[1].to_string())
            .unwrap_or_else(|| "N/A".to_string());

        Some(ProgressUpdate {
            percent,
            current_secs: current,
            total_secs: total,
            fps,
            speed,
        })
    }
}

/// Terminal state of one supervised run.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecOutcome {
    Succeeded { bytes: u64 },
    EmptyOutput { tail: String },
    MissingOutput,
    FailedExit { code: i32, tail: String },
    Crashed { detail: String },
    TimedOut { secs: u64 },
}

/// The caller-facing result pair: a prefixed status string and the output
/// path (empty when no file was produced).
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub status_message: String,
    pub output_path: String,
}

impl ExecOutcome {
    pub fn into_result(self, output_path: &str) -> ExecutionResult {
        match self {
            ExecOutcome::Succeeded { bytes } => ExecutionResult {
                status_message: format!(
                    "SUCCESS: Processor created {} byte file at {}",
                    bytes, output_path
                ),
                output_path: output_path.to_string(),
            },
            // A zero-byte file still exists, so the path is returned.
            ExecOutcome::EmptyOutput { tail } => ExecutionResult {
                status_message: format!(
                    "WARNING: Output file created but is 0 bytes. Processor output: {}",
                    tail
                ),
                output_path: output_path.to_string(),
            },
            ExecOutcome::MissingOutput => ExecutionResult {
                status_message: format!(
                    "WARNING: Processor completed but output file not found: {}",
                    output_path
                ),
                output_path: String::new(),
            },
            ExecOutcome::FailedExit { code, tail } => ExecutionResult {
                status_message: format!(
                    "ERROR: Processor failed (exit code {}). Output: {}",
                    code, tail
                ),
                output_path: String::new(),
            },
            ExecOutcome::Crashed { detail } => ExecutionResult {
                status_message: format!("ERROR: Exception during processor execution: {}", detail),
                output_path: String::new(),
            },
            ExecOutcome::TimedOut { secs } => ExecutionResult {
                status_message: format!(
                    "ERROR: Processor timed out after {}s and was killed",
                    secs
                ),
                output_path: String::new(),
            },
        }
    }
}

/// Last `limit` characters of a string, respecting char boundaries.
fn tail_of(text: &str, limit: usize) -> &str {
    if text.len() <= limit {
        return text;
    }
    let mut start = text.len() - limit;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}

/// Bounded aggregation of the processor's combined output, front-truncated
/// so failure diagnostics always have a recent tail available.
#[derive(Debug, Default)]
struct OutputTail {
    buffer: String,
}

impl OutputTail {
    fn push(&mut self, line: &str) {
        self.buffer.push_str(line);
        self.buffer.push('\n');
        if self.buffer.len() > TAIL_LIMIT {
            self.buffer = tail_of(&self.buffer, TAIL_LIMIT).to_string();
        }
    }

    fn tail(&self, limit: usize) -> String {
        tail_of(self.buffer.trim_end(), limit).to_string()
    }
}

/// Runs one resolved command and classifies its terminal state. One child
/// process per run, blocking sequential line reads, no retries.
pub struct ProcessSupervisor {
    config: MediaConfig,
}

impl ProcessSupervisor {
    pub fn new(config: MediaConfig) -> Self {
        Self { config }
    }

    /// Check if the processor binary is available
    pub async fn check_availability(&self) -> Result<()> {
        let output = Command::new(&self.config.binary_path)
            .arg("-version")
            .output()
            .await
            .map_err(|e| ClipstitchError::Execution(format!("Processor not found: {}", e)))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(ClipstitchError::Execution(
                "Processor version check failed".to_string(),
            ))
        }
    }

    fn spawn(&self, line: &str) -> Result<Child> {
        #[cfg(unix)]
        let mut cmd = {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(line);
            cmd
        };
        #[cfg(windows)]
        let mut cmd = {
            let mut cmd = Command::new("cmd");
            cmd.arg("/C").arg(line);
            cmd
        };

        cmd.stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null())
            .kill_on_drop(true);

        cmd.spawn()
            .map_err(|e| ClipstitchError::Execution(format!("Failed to launch processor: {}", e)))
    }

    /// Run the command to completion. Every exit path, including stream
    /// faults and timeout expiry, kills the child before returning.
    pub async fn run(
        &self,
        spec: &CommandSpec,
        output_path: &str,
        on_progress: Option<ProgressObserver<'_>>,
    ) -> ExecutionResult {
        info!("Executing command: {}", spec.line);

        let mut child = match self.spawn(&spec.line) {
            Ok(child) => child,
            Err(e) => {
                return ExecOutcome::Crashed {
                    detail: e.to_string(),
                }
                .into_result(output_path);
            }
        };

        let supervised = self.supervise(&mut child, output_path, on_progress);
        let outcome = match self.config.timeout_secs {
            Some(secs) => {
                match tokio::time::timeout(Duration::from_secs(secs), supervised).await {
                    Ok(result) => result,
                    Err(_) => {
                        let _ = child.kill().await;
                        warn!("Processor exceeded {}s timeout, killed", secs);
                        Ok(ExecOutcome::TimedOut { secs })
                    }
                }
            }
            None => supervised.await,
        };

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                let _ = child.kill().await;
                ExecOutcome::Crashed {
                    detail: e.to_string(),
                }
            }
        };

        outcome.into_result(output_path)
    }

    async fn supervise(
        &self,
        child: &mut Child,
        output_path: &str,
        on_progress: Option<ProgressObserver<'_>>,
    ) -> Result<ExecOutcome> {
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ClipstitchError::Execution("Processor stdout unavailable".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ClipstitchError::Execution("Processor stderr unavailable".to_string()))?;

        let mut out_lines = BufReader::new(stdout).lines();
        let mut err_lines = BufReader::new(stderr).lines();
        let mut out_done = false;
        let mut err_done = false;

        let mut parser = ProgressParser::new();
        let mut tail = OutputTail::default();

        while !(out_done && err_done) {
            tokio::select! {
                line = out_lines.next_line(), if !out_done => match line? {
                    Some(line) => self.inspect(&line, &mut parser, &mut tail, on_progress),
                    None => out_done = true,
                },
                line = err_lines.next_line(), if !err_done => match line? {
                    Some(line) => self.inspect(&line, &mut parser, &mut tail, on_progress),
                    None => err_done = true,
                },
            }
        }

        let status = child.wait().await?;
        let code = status.code().unwrap_or(-1);

        if code != 0 {
            return Ok(ExecOutcome::FailedExit {
                code,
                tail: tail.tail(ERROR_TAIL),
            });
        }

        match tokio::fs::metadata(output_path).await {
            Ok(meta) if meta.len() == 0 => Ok(ExecOutcome::EmptyOutput {
                tail: tail.tail(WARNING_TAIL),
            }),
            Ok(meta) => Ok(ExecOutcome::Succeeded { bytes: meta.len() }),
            Err(_) => Ok(ExecOutcome::MissingOutput),
        }
    }

    fn inspect(
        &self,
        line: &str,
        parser: &mut ProgressParser,
        tail: &mut OutputTail,
        on_progress: Option<ProgressObserver<'_>>,
    ) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        tail.push(line);

        if let Some(update) = parser.observe(line) {
            info!(
                "Progress: {:.1}% ({}/{}s) | FPS: {} | Speed: {}x",
                update.percent, update.current_secs, update.total_secs, update.fps, update.speed
            );
            if let Some(observer) = on_progress {
                observer(&update);
            }
        } else {
            let lowered = line.to_lowercase();
            if ["error", "warning", "failed"].iter().any(|k| lowered.contains(k)) {
                warn!("Processor: {}", line);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn supervisor() -> ProcessSupervisor {
        ProcessSupervisor::new(MediaConfig {
            binary_path: "ffmpeg".to_string(),
            timeout_secs: None,
            timestamp_output: false,
        })
    }

    fn spec(line: &str) -> CommandSpec {
        CommandSpec {
            line: line.to_string(),
            inputs: vec![],
        }
    }

    #[test]
    fn test_progress_fifty_percent() {
        let mut parser = ProgressParser::new();
        assert!(parser.observe("  Duration: 00:00:10.00, start: 0.0").is_none());
        let update = parser
            .observe("frame=  150 fps= 30 time=00:00:05.00 bitrate= 900k speed=1.5x")
            .unwrap();
        assert_eq!(update.percent, 50.0);
        assert_eq!(update.current_secs, 5);
        assert_eq!(update.total_secs, 10);
        assert_eq!(update.fps, "30");
        assert_eq!(update.speed, "1.5");
    }

    #[test]
    fn test_progress_requires_known_duration() {
        let mut parser = ProgressParser::new();
        assert!(parser.observe("frame=1 time=00:00:01.00").is_none());
    }

    #[test]
    fn test_progress_caps_at_hundred() {
        let mut parser = ProgressParser::new();
        parser.observe("Duration: 00:00:10.00");
        let update = parser.observe("time=00:00:15.00").unwrap();
        assert_eq!(update.percent, 100.0);
    }

    #[test]
    fn test_first_duration_marker_wins() {
        let mut parser = ProgressParser::new();
        parser.observe("Duration: 00:01:00.00");
        parser.observe("Duration: 00:10:00.00");
        let update = parser.observe("time=00:00:30.00").unwrap();
        assert_eq!(update.total_secs, 60);
        assert_eq!(update.percent, 50.0);
    }

    #[test]
    fn test_missing_rate_fields_degrade() {
        let mut parser = ProgressParser::new();
        parser.observe("Duration: 01:02:03.45");
        let update = parser.observe("time=00:31:01.00").unwrap();
        assert_eq!(update.total_secs, 3723);
        assert_eq!(update.fps, "N/A");
        assert_eq!(update.speed, "N/A");
    }

    #[test]
    fn test_tail_of_respects_char_boundaries() {
        assert_eq!(tail_of("abcdef", 3), "def");
        assert_eq!(tail_of("ab", 3), "ab");
        // Multibyte char straddling the cut must not split.
        let text = "aaébb";
        let tail = tail_of(text, 4);
        assert!(text.ends_with(tail));
    }

    #[test]
    fn test_output_tail_is_bounded() {
        let mut tail = OutputTail::default();
        for i in 0..5000 {
            tail.push(&format!("line {}", i));
        }
        assert!(tail.buffer.len() <= TAIL_LIMIT);
        assert!(tail.tail(ERROR_TAIL).contains("line 4999"));
    }

    #[tokio::test]
    async fn test_nonzero_exit_classified_as_error() {
        let result = supervisor()
            .run(&spec("echo 'something failed'; exit 7"), "/nonexistent/out.mp4", None)
            .await;
        assert!(result.status_message.starts_with("ERROR:"));
        assert!(result.status_message.contains("exit code 7"));
        assert!(result.status_message.contains("something failed"));
        assert!(result.output_path.is_empty());
    }

    #[tokio::test]
    async fn test_zero_byte_output_is_warning_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.mp4");
        let out_str = out.to_string_lossy().to_string();

        let result = supervisor()
            .run(&spec(&format!("touch \"{}\"", out_str)), &out_str, None)
            .await;
        assert!(result.status_message.starts_with("WARNING:"));
        assert_eq!(result.output_path, out_str);
    }

    #[tokio::test]
    async fn test_missing_output_is_warning_with_empty_path() {
        let result = supervisor().run(&spec("true"), "/nonexistent/out.mp4", None).await;
        assert!(result.status_message.starts_with("WARNING:"));
        assert!(result.status_message.contains("not found"));
        assert!(result.output_path.is_empty());
    }

    #[tokio::test]
    async fn test_successful_run_reports_byte_size() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.mp4");
        let out_str = out.to_string_lossy().to_string();

        let result = supervisor()
            .run(&spec(&format!("printf 'data' > \"{}\"", out_str)), &out_str, None)
            .await;
        assert!(result.status_message.starts_with("SUCCESS:"));
        assert!(result.status_message.contains("4 byte"));
        assert_eq!(result.output_path, out_str);
    }

    #[tokio::test]
    async fn test_stub_processor_streams_progress() {
        let observed = Mutex::new(Vec::new());
        let observer = |update: &ProgressUpdate| {
            observed.lock().unwrap().push(update.percent);
        };

        let line = "echo 'Duration: 00:00:10.00'; echo 'time=00:00:05.00 fps=25 speed=1.0x'; true";
        let result = supervisor()
            .run(&spec(line), "/nonexistent/out.mp4", Some(&observer))
            .await;

        assert!(result.status_message.starts_with("WARNING:"));
        let observed = observed.lock().unwrap();
        assert_eq!(observed.as_slice(), &[50.0]);
    }

    #[tokio::test]
    async fn test_timeout_kills_and_reports() {
        let sup = ProcessSupervisor::new(MediaConfig {
            binary_path: "ffmpeg".to_string(),
            timeout_secs: Some(1),
            timestamp_output: false,
        });
        let result = sup.run(&spec("sleep 30"), "/nonexistent/out.mp4", None).await;
        assert!(result.status_message.starts_with("ERROR:"));
        assert!(result.status_message.contains("timed out"));
    }
}
