use std::path::Path;
use tokio::fs;
use tracing::{debug, info};

use crate::command::{CommandBuilder, CommandIntent, CommandSpec};
use crate::config::Config;
use crate::error::{ClipstitchError, Result};
use crate::exec::{ExecutionResult, ProcessSupervisor, ProgressObserver};
use crate::plan;
use crate::probe::{FfprobeProber, MediaProberTrait};

/// One transcode job as supplied by the caller.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub input1: String,
    pub input2: Option<String>,
    pub output_path: String,
    pub command: String,
}

impl JobRequest {
    /// The supplied input locators, trimmed, in order.
    fn inputs(&self) -> Vec<String> {
        let mut inputs = Vec::new();
        if !self.input1.trim().is_empty() {
            inputs.push(self.input1.trim().to_string());
        }
        if let Some(input2) = &self.input2 {
            if !input2.trim().is_empty() {
                inputs.push(input2.trim().to_string());
            }
        }
        inputs
    }
}

fn is_url(locator: &str) -> bool {
    locator.starts_with("http://") || locator.starts_with("https://")
}

/// Orchestrates one invocation: validate, resolve intent, plan, build,
/// prepare the output directory, supervise. All failures fold into the
/// status-string channel; nothing panics across this boundary.
pub struct Workflow {
    builder: CommandBuilder,
    prober: Box<dyn MediaProberTrait>,
    supervisor: ProcessSupervisor,
}

impl Workflow {
    pub fn new(config: Config) -> Self {
        let prober = Box::new(FfprobeProber::new(config.probe.clone()));
        Self::with_prober(config, prober)
    }

    /// Seam for substituting the prober (used by tests with a mock).
    pub fn with_prober(config: Config, prober: Box<dyn MediaProberTrait>) -> Self {
        let builder = CommandBuilder::new(
            config.media.binary_path.clone(),
            config.media.timestamp_output,
        );
        let supervisor = ProcessSupervisor::new(config.media);
        Self {
            builder,
            prober,
            supervisor,
        }
    }

    /// Run a job to its terminal result. Never returns an error: every
    /// failure kind becomes an ERROR-prefixed status with an empty path.
    pub async fn run(
        &self,
        request: &JobRequest,
        on_progress: Option<ProgressObserver<'_>>,
    ) -> ExecutionResult {
        let (spec, output_path) = match self.build_command(request).await {
            Ok(built) => built,
            Err(e) => {
                return ExecutionResult {
                    status_message: format!("ERROR: {}", e),
                    output_path: String::new(),
                };
            }
        };

        if let Err(e) = self.prepare_output_dir(&output_path).await {
            return ExecutionResult {
                status_message: format!("ERROR: {}", e),
                output_path: String::new(),
            };
        }

        self.supervisor.run(&spec, &output_path, on_progress).await
    }

    /// Validate the request and resolve it into a ready command plus the
    /// effective output path. No process is launched here.
    pub async fn build_command(&self, request: &JobRequest) -> Result<(CommandSpec, String)> {
        if request.input1.trim().is_empty() {
            return Err(ClipstitchError::Validation(
                "At least one input file path is required".to_string(),
            ));
        }

        let inputs = request.inputs();
        self.builder
            .validate(&inputs, &request.output_path, &request.command)?;

        for input in &inputs {
            if !is_url(input) && !Path::new(input).exists() {
                return Err(ClipstitchError::FileNotFound(input.clone()));
            }
        }

        let output_path = self.builder.resolve_output_path(&request.output_path);

        let spec = match CommandIntent::resolve(&request.command) {
            CommandIntent::SmartConcat(params) => {
                if inputs.len() != 2 {
                    return Err(ClipstitchError::Validation(format!(
                        "SMART_CONCAT requires exactly 2 input files, got {}",
                        inputs.len()
                    )));
                }

                let dims1 = self.prober.probe(&inputs[0]).await.map_err(|e| {
                    ClipstitchError::Analysis(format!(
                        "Could not analyze video dimensions for smart concat: {}",
                        e
                    ))
                })?;
                let dims2 = self.prober.probe(&inputs[1]).await.map_err(|e| {
                    ClipstitchError::Analysis(format!(
                        "Could not analyze video dimensions for smart concat: {}",
                        e
                    ))
                })?;

                let plan = plan::plan(dims1, dims2, params.trim1, params.trim2, params.encode);
                info!(
                    "Smart concat: {}x{} + {}x{} -> {}x{}",
                    dims1.width, dims1.height, dims2.width, dims2.height,
                    plan.target_width, plan.target_height
                );

                self.builder.smart_concat(&plan, &inputs, &output_path)?
            }
            CommandIntent::RawTemplate(template) => {
                self.builder.from_template(&template, &inputs, &output_path)?
            }
        };

        debug!("Resolved command: {}", spec.line);
        Ok((spec, output_path))
    }

    async fn prepare_output_dir(&self, output_path: &str) -> Result<()> {
        if let Some(parent) = Path::new(output_path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    ClipstitchError::Execution(format!(
                        "Could not create output directory: {}",
                        e
                    ))
                })?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{Dimensions, MockMediaProberTrait};
    use std::io::Write;

    fn workflow_with(mock: MockMediaProberTrait) -> Workflow {
        Workflow::with_prober(Config::default(), Box::new(mock))
    }

    fn temp_clip() -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".mp4").tempfile().unwrap();
        file.write_all(b"stub").unwrap();
        file
    }

    fn request(input1: &str, input2: Option<&str>, command: &str) -> JobRequest {
        JobRequest {
            input1: input1.to_string(),
            input2: input2.map(|s| s.to_string()),
            output_path: "/tmp/clipstitch-test-out.mp4".to_string(),
            command: command.to_string(),
        }
    }

    #[tokio::test]
    async fn test_empty_first_input_fails_before_any_probe() {
        let mut mock = MockMediaProberTrait::new();
        mock.expect_probe().times(0);

        let result = workflow_with(mock)
            .run(&request("", None, "SMART_CONCAT"), None)
            .await;
        assert!(result.status_message.starts_with("ERROR:"));
        assert!(result.output_path.is_empty());
    }

    #[tokio::test]
    async fn test_third_input_reference_fails_before_any_probe() {
        let clip1 = temp_clip();
        let clip2 = temp_clip();
        let mut mock = MockMediaProberTrait::new();
        mock.expect_probe().times(0);

        let result = workflow_with(mock)
            .run(
                &request(
                    clip1.path().to_str().unwrap(),
                    Some(clip2.path().to_str().unwrap()),
                    "ffmpeg {inputs} -i {input3} {output}",
                ),
                None,
            )
            .await;
        assert!(result.status_message.starts_with("ERROR:"));
        assert!(result.status_message.contains("2 inputs"));
    }

    #[tokio::test]
    async fn test_missing_input_file_is_reported() {
        let mut mock = MockMediaProberTrait::new();
        mock.expect_probe().times(0);

        let result = workflow_with(mock)
            .run(&request("/no/such/clip.mp4", None, "ffmpeg {input1} {output}"), None)
            .await;
        assert!(result.status_message.starts_with("ERROR:"));
        assert!(result.status_message.contains("/no/such/clip.mp4"));
    }

    #[tokio::test]
    async fn test_smart_concat_mixed_orientation_builds_square_command() {
        let clip1 = temp_clip();
        let clip2 = temp_clip();

        let mut mock = MockMediaProberTrait::new();
        let mut dims = vec![
            Dimensions { width: 1080, height: 1920 },
            Dimensions { width: 1920, height: 1080 },
        ];
        mock.expect_probe()
            .times(2)
            .returning(move |_| Ok(dims.pop().unwrap()));

        let workflow = workflow_with(mock);
        let (spec, _) = workflow
            .build_command(&request(
                clip1.path().to_str().unwrap(),
                Some(clip2.path().to_str().unwrap()),
                "SMART_CONCAT",
            ))
            .await
            .unwrap();

        assert_eq!(spec.line.matches(" -i ").count(), 2);
        assert!(spec.line.contains("-filter_complex"));
        assert!(spec.line.contains("crop=1080:1080:"));
    }

    #[tokio::test]
    async fn test_smart_concat_with_one_input_is_validation_error() {
        let clip1 = temp_clip();
        let mut mock = MockMediaProberTrait::new();
        mock.expect_probe().times(0);

        let err = workflow_with(mock)
            .build_command(&request(clip1.path().to_str().unwrap(), None, "SMART_CONCAT"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClipstitchError::Validation(_)));
        assert!(err.to_string().contains("exactly 2"));
    }

    #[tokio::test]
    async fn test_probe_failure_is_distinct_analysis_error() {
        let clip1 = temp_clip();
        let clip2 = temp_clip();

        let mut mock = MockMediaProberTrait::new();
        mock.expect_probe()
            .returning(|_| Err(ClipstitchError::Probe("no video stream".to_string())));

        let err = workflow_with(mock)
            .build_command(&request(
                clip1.path().to_str().unwrap(),
                Some(clip2.path().to_str().unwrap()),
                "SMART_CONCAT",
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, ClipstitchError::Analysis(_)));
    }

    #[tokio::test]
    async fn test_url_locators_skip_existence_check() {
        let mut mock = MockMediaProberTrait::new();
        mock.expect_probe().times(0);

        let workflow = workflow_with(mock);
        let (spec, _) = workflow
            .build_command(&request(
                "https://example.com/a.mp4",
                None,
                "ffmpeg {input1} -c copy {output}",
            ))
            .await
            .unwrap();
        assert!(spec.line.contains("https://example.com/a.mp4"));
    }
}
