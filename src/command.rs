use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::error::{ClipstitchError, Result};
use crate::plan::{CompositionPlan, EncodeSettings, TrimWindow};

/// Sentinel that selects the built-in composition mode.
pub const SMART_CONCAT: &str = "SMART_CONCAT";

/// Placeholders recognized in raw templates.
const PLACEHOLDERS: [&str; 4] = ["{input1}", "{input2}", "{inputs}", "{output}"];

/// What the caller asked for, resolved once at the boundary instead of
/// re-detecting the sentinel by substring search at every decision point.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandIntent {
    SmartConcat(SmartConcatParams),
    RawTemplate(String),
}

/// Smart-concat knobs with their documented defaults. Overrides are parsed
/// out of the command text as key=value tokens.
#[derive(Debug, Clone, PartialEq)]
pub struct SmartConcatParams {
    pub trim1: TrimWindow,
    pub trim2: TrimWindow,
    pub encode: EncodeSettings,
}

impl Default for SmartConcatParams {
    fn default() -> Self {
        Self {
            trim1: TrimWindow::new(0.5, 4.5),
            trim2: TrimWindow::new(0.5, 7.5),
            encode: EncodeSettings::default(),
        }
    }
}

fn trim1_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"trim1=(\d+\.?\d*):(\d+\.?\d*)").unwrap())
}

fn trim2_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"trim2=(\d+\.?\d*):(\d+\.?\d*)").unwrap())
}

fn crf_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"crf=(\d+)").unwrap())
}

fn preset_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"preset=(\w+)").unwrap())
}

impl SmartConcatParams {
    /// Parse recognized key=value overrides out of free text, falling back
    /// to the default table for anything unspecified.
    pub fn parse_overrides(text: &str) -> Self {
        let mut params = Self::default();

        if let Some(caps) = trim1_re().captures(text) {
            if let (Ok(start), Ok(end)) = (caps[1].parse(), caps[2].parse()) {
                params.trim1 = TrimWindow::new(start, end);
            }
        }
        if let Some(caps) = trim2_re().captures(text) {
            if let (Ok(start), Ok(end)) = (caps[1].parse(), caps[2].parse()) {
                params.trim2 = TrimWindow::new(start, end);
            }
        }
        if let Some(caps) = crf_re().captures(text) {
            if let Ok(crf) = caps[1].parse() {
                params.encode.crf = crf;
            }
        }
        if let Some(caps) = preset_re().captures(text) {
            params.encode.preset = caps[1].to_string();
        }

        params
    }
}

impl CommandIntent {
    /// Resolve the caller's command text into an explicit intent. The
    /// sentinel is matched case-insensitively anywhere in the text.
    pub fn resolve(command_text: &str) -> Self {
        if command_text.to_uppercase().contains(SMART_CONCAT) {
            CommandIntent::SmartConcat(SmartConcatParams::parse_overrides(command_text))
        } else {
            CommandIntent::RawTemplate(command_text.to_string())
        }
    }
}

/// A fully resolved, shell-ready invocation plus the inputs it references.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandSpec {
    pub line: String,
    pub inputs: Vec<String>,
}

/// Builds and validates processor command lines.
pub struct CommandBuilder {
    binary_path: String,
    timestamp_output: bool,
}

impl CommandBuilder {
    pub fn new<S: Into<String>>(binary_path: S, timestamp_output: bool) -> Self {
        Self {
            binary_path: binary_path.into(),
            timestamp_output,
        }
    }

    /// Validate the request shape before any probing or process launch.
    /// Each rejection is a distinct, self-describing error.
    pub fn validate(
        &self,
        inputs: &[String],
        output_path: &str,
        command_text: &str,
    ) -> Result<()> {
        if inputs.is_empty() || inputs[0].trim().is_empty() {
            return Err(ClipstitchError::Validation(
                "At least one input file path is required".to_string(),
            ));
        }
        if output_path.trim().is_empty() {
            return Err(ClipstitchError::Validation(
                "Output path is required".to_string(),
            ));
        }
        if command_text.trim().is_empty() {
            return Err(ClipstitchError::Validation(
                "Processor command is required".to_string(),
            ));
        }
        if Path::new(output_path).is_dir()
            || output_path.ends_with('/')
            || output_path.ends_with('\\')
        {
            return Err(ClipstitchError::Validation(
                "Output path must include a filename (e.g. /path/to/output.mp4)".to_string(),
            ));
        }
        if command_text.contains("[1:v]") && inputs.len() < 2 {
            return Err(ClipstitchError::Validation(format!(
                "Command references [1:v] (second input) but only {} input file(s) provided",
                inputs.len()
            )));
        }
        if command_text.contains("[1:a]") && inputs.len() < 2 {
            return Err(ClipstitchError::Validation(format!(
                "Command references [1:a] (second input audio) but only {} input file(s) provided",
                inputs.len()
            )));
        }
        if ["[2:v]", "[2:a]", "{input3}"]
            .iter()
            .any(|r| command_text.contains(r))
        {
            return Err(ClipstitchError::Validation(
                "Only 2 inputs are supported; third input references ([2:v], [2:a], {input3}) are not"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Apply the opt-in timestamping policy to the output filename.
    pub fn resolve_output_path(&self, output_path: &str) -> String {
        if !self.timestamp_output {
            return output_path.to_string();
        }

        let suffix = chrono::Local::now().format("%Y%m%d-%H%M%S");
        let path = Path::new(output_path);
        match (path.file_stem(), path.extension()) {
            (Some(stem), Some(ext)) => {
                let name = format!("{}-{}.{}", stem.to_string_lossy(), suffix, ext.to_string_lossy());
                path.with_file_name(name).to_string_lossy().to_string()
            }
            _ => format!("{}-{}", output_path, suffix),
        }
    }

    /// Build the fully synthesized smart-concat invocation from a plan.
    pub fn smart_concat(
        &self,
        plan: &CompositionPlan,
        inputs: &[String],
        output_path: &str,
    ) -> Result<CommandSpec> {
        if inputs.len() != 2 {
            return Err(ClipstitchError::Validation(format!(
                "{} requires exactly 2 input files, got {}",
                SMART_CONCAT,
                inputs.len()
            )));
        }

        let line = format!(
            "{bin} -i \"{in1}\" -i \"{in2}\" -y -filter_complex \"{graph}\" -map \"[outv]\" -an -c:v libx264 -crf {crf} -preset {preset} \"{out}\"",
            bin = self.binary_path,
            in1 = inputs[0],
            in2 = inputs[1],
            graph = plan.filter_complex(),
            crf = plan.encode.crf,
            preset = plan.encode.preset,
            out = output_path,
        );

        debug!("Smart-concat command: {}", line);
        Ok(CommandSpec {
            line,
            inputs: inputs.to_vec(),
        })
    }

    /// Expand a raw template: substitute placeholders, repair a missing
    /// input-flag sequence, and reject anything left unresolved.
    pub fn from_template(
        &self,
        template: &str,
        inputs: &[String],
        output_path: &str,
    ) -> Result<CommandSpec> {
        let input_flags: String = inputs
            .iter()
            .map(|locator| format!("-i \"{}\"", locator))
            .collect::<Vec<_>>()
            .join(" ");

        let mut line = template.to_string();
        if !inputs.is_empty() {
            line = line.replace("{input1}", &format!("\"{}\"", inputs[0]));
        }
        if inputs.len() >= 2 {
            line = line.replace("{input2}", &format!("\"{}\"", inputs[1]));
        }
        line = line.replace("{inputs}", &input_flags);
        line = line.replace("{output}", &format!("\"{}\"", output_path));

        // Best-effort repair for hand-written templates that forgot their
        // input flags entirely.
        let prefix = format!("{} ", self.binary_path);
        if line.starts_with(&prefix) && !line.contains(" -i ") {
            line = line.replacen(&prefix, &format!("{} {} ", self.binary_path, input_flags), 1);
        }

        if let Some(unresolved) = PLACEHOLDERS.iter().find(|p| line.contains(*p)) {
            return Err(ClipstitchError::Validation(format!(
                "Unresolved placeholder {} (provide enough inputs or remove it)",
                unresolved
            )));
        }

        debug!("Templated command: {}", line);
        Ok(CommandSpec {
            line,
            inputs: inputs.to_vec(),
        })
    }
}
