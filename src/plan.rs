use tracing::debug;

use crate::probe::{AspectCategory, Dimensions};

/// Half-open trim range applied to one input clip, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrimWindow {
    pub start: f64,
    pub end: f64,
}

impl TrimWindow {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EncodeSettings {
    pub crf: u32,
    pub preset: String,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            crf: 18,
            preset: "veryfast".to_string(),
        }
    }
}

/// Per-input transform: trim, timestamp reset, cover-fit scale, centered crop.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipFilter {
    pub input_index: usize,
    pub scaled_width: u32,
    pub scaled_height: u32,
    pub crop_x: u32,
    pub crop_y: u32,
    pub trim: TrimWindow,
}

/// One invocation's worth of geometry decisions. Consumed immediately to
/// build an ffmpeg command, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositionPlan {
    pub target_width: u32,
    pub target_height: u32,
    pub clips: Vec<ClipFilter>,
    pub encode: EncodeSettings,
}

impl CompositionPlan {
    /// Render the filter_complex graph: one trim/scale/crop chain per input,
    /// concatenated in input order, video only.
    pub fn filter_complex(&self) -> String {
        let chains: Vec<String> = self
            .clips
            .iter()
            .map(|clip| {
                format!(
                    "[{idx}:v]trim=start={start}:end={end},setpts=PTS-STARTPTS,scale={sw}:{sh},crop={tw}:{th}:{cx}:{cy}[v{idx}]",
                    idx = clip.input_index,
                    start = clip.trim.start,
                    end = clip.trim.end,
                    sw = clip.scaled_width,
                    sh = clip.scaled_height,
                    tw = self.target_width,
                    th = self.target_height,
                    cx = clip.crop_x,
                    cy = clip.crop_y,
                )
            })
            .collect();

        let labels: String = self
            .clips
            .iter()
            .map(|clip| format!("[v{}]", clip.input_index))
            .collect();

        format!(
            "{};{}concat=n={}:v=1:a=0[outv]",
            chains.join(";"),
            labels,
            self.clips.len()
        )
    }
}

/// Shared output canvas for a pair of aspect categories:
/// both landscape/square -> 1920x1080, both portrait/square -> 1080x1920,
/// one of each -> 1080x1080.
fn target_resolution(cat1: AspectCategory, cat2: AspectCategory) -> (u32, u32) {
    use AspectCategory::*;
    let wide1 = matches!(cat1, Landscape | Square);
    let wide2 = matches!(cat2, Landscape | Square);
    let tall1 = matches!(cat1, Portrait | Square);
    let tall2 = matches!(cat2, Portrait | Square);

    if wide1 && wide2 {
        (1920, 1080)
    } else if tall1 && tall2 {
        (1080, 1920)
    } else {
        (1080, 1080)
    }
}

/// Cover-fit one source onto the target canvas: scale so neither dimension
/// under-fills, then center-crop the excess.
fn clip_filter(dims: Dimensions, target_w: u32, target_h: u32, index: usize, trim: TrimWindow) -> ClipFilter {
    let scale = f64::max(
        target_w as f64 / dims.width as f64,
        target_h as f64 / dims.height as f64,
    );
    let scaled_width = (dims.width as f64 * scale) as u32;
    let scaled_height = (dims.height as f64 * scale) as u32;

    let crop_x = scaled_width.saturating_sub(target_w) / 2;
    let crop_y = scaled_height.saturating_sub(target_h) / 2;

    ClipFilter {
        input_index: index,
        scaled_width,
        scaled_height,
        crop_x,
        crop_y,
        trim,
    }
}

/// Derive the full composition plan for two clips. Pure and deterministic:
/// identical inputs always produce an identical plan.
pub fn plan(
    dims1: Dimensions,
    dims2: Dimensions,
    trim1: TrimWindow,
    trim2: TrimWindow,
    encode: EncodeSettings,
) -> CompositionPlan {
    let (target_width, target_height) = target_resolution(dims1.category(), dims2.category());

    debug!(
        "Clip 1: {}x{}, clip 2: {}x{}, target: {}x{}",
        dims1.width, dims1.height, dims2.width, dims2.height, target_width, target_height
    );

    let clips = vec![
        clip_filter(dims1, target_width, target_height, 0, trim1),
        clip_filter(dims2, target_width, target_height, 1, trim2),
    ];

    CompositionPlan {
        target_width,
        target_height,
        clips,
        encode,
    }
}
