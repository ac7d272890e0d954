//! ffmpeg encoder.
//!
//! Every layer becomes one input stream normalised to the frame size and
//! frame rate. Stills are looped with a zoompan move, video clips are
//! padded with their last frame. Layers are then chained pairwise: `xfade`
//! where the next layer crossfades in, `concat` otherwise. A crossfade
//! overlaps the previous layer, so that layer's input is lengthened by the
//! crossfade duration and the chained total still equals the timeline.
//!
//! Audio segments are trimmed, padded where the source runs short and
//! concatenated into one track.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::{RenderEncoder, RenderError, RenderResult};
use crate::assets::placeholder::label_color;
use crate::config::RenderSettings;
use crate::logging::EpisodeLogger;
use crate::timeline::{AudioSource, Layer, LayerSource, Motion, Pan, Timeline, Transition};

const AUDIO_RATE: u32 = 44100;
const STDERR_TAIL_LINES: usize = 20;

/// Builds the ffmpeg argument list for a timeline. Pure; nothing is run.
pub struct FfmpegArgsBuilder<'a> {
    timeline: &'a Timeline,
    settings: &'a RenderSettings,
    output: &'a Path,
}

impl<'a> FfmpegArgsBuilder<'a> {
    pub fn new(timeline: &'a Timeline, settings: &'a RenderSettings, output: &'a Path) -> Self {
        Self {
            timeline,
            settings,
            output,
        }
    }

    pub fn build(&self) -> Vec<String> {
        let mut args: Vec<String> = vec!["-hide_banner".into(), "-y".into()];

        self.add_video_inputs(&mut args);
        self.add_audio_inputs(&mut args);

        args.push("-filter_complex".into());
        args.push(self.filter_graph());

        let crf = self.settings.crf.to_string();
        let fps = self.settings.fps.to_string();
        let total = secs(self.timeline.final_duration_secs);
        push_all(
            &mut args,
            &[
                "-map",
                "[vout]",
                "-map",
                "[aout]",
                "-c:v",
                &self.settings.video_codec,
                "-preset",
                &self.settings.preset,
                "-crf",
                &crf,
                "-pix_fmt",
                "yuv420p",
                "-r",
                &fps,
                "-c:a",
                &self.settings.audio_codec,
                "-b:a",
                "192k",
                "-movflags",
                "+faststart",
                "-t",
                &total,
            ],
        );
        args.push(self.output.to_string_lossy().to_string());
        args
    }

    /// Seconds of input a layer needs, including overlap into the next layer.
    fn input_secs(&self, index: usize) -> f64 {
        let layer = &self.timeline.layers[index];
        let overlap = match self.timeline.layers.get(index + 1).map(|l| l.transition) {
            Some(Transition::Crossfade { secs }) => secs,
            _ => 0.0,
        };
        layer.duration_secs + overlap
    }

    fn add_video_inputs(&self, args: &mut Vec<String>) {
        let fps = self.settings.fps.to_string();
        for (index, layer) in self.timeline.layers.iter().enumerate() {
            let duration = secs(self.input_secs(index));
            match &layer.source {
                LayerSource::Asset { path, .. } if layer.source.is_still() => {
                    push_all(args, &["-loop", "1", "-framerate", &fps, "-t", &duration, "-i"]);
                    args.push(path.to_string_lossy().to_string());
                }
                LayerSource::Asset { path, .. } => {
                    args.push("-i".into());
                    args.push(path.to_string_lossy().to_string());
                }
                LayerSource::Placeholder { label } => {
                    let [r, g, b] = label_color(label);
                    let color = format!(
                        "color=c=0x{:02x}{:02x}{:02x}:s={}x{}:r={}",
                        r, g, b, self.timeline.width, self.timeline.height, fps
                    );
                    push_all(args, &["-f", "lavfi", "-t", &duration, "-i", &color]);
                }
            }
        }
    }

    fn add_audio_inputs(&self, args: &mut Vec<String>) {
        for segment in &self.timeline.audio.segments {
            let duration = secs(segment.duration_secs);
            match &segment.source {
                AudioSource::File { path } => {
                    push_all(args, &["-ss", &secs(segment.offset_secs), "-t", &duration, "-i"]);
                    args.push(path.to_string_lossy().to_string());
                }
                AudioSource::Silence => {
                    let source = format!("anullsrc=r={}:cl=stereo", AUDIO_RATE);
                    push_all(args, &["-f", "lavfi", "-t", &duration, "-i", &source]);
                }
            }
        }
    }

    fn filter_graph(&self) -> String {
        let mut chains: Vec<String> = Vec::new();
        let layers = &self.timeline.layers;

        for (index, layer) in layers.iter().enumerate() {
            chains.push(format!("[{}:v]{}[v{}]", index, self.layer_filter(index, layer), index));
        }

        // Pairwise chain; `acc` covers [0, start of next layer + overlap).
        let mut acc = "v0".to_string();
        for (index, layer) in layers.iter().enumerate().skip(1) {
            let out = format!("c{}", index);
            match layer.transition {
                Transition::Crossfade { secs: d } if d > 0.0 => chains.push(format!(
                    "[{}][v{}]xfade=transition=fade:duration={}:offset={}[{}]",
                    acc,
                    index,
                    secs(d),
                    secs(layer.start_secs),
                    out
                )),
                _ => chains.push(format!("[{}][v{}]concat=n=2:v=1:a=0[{}]", acc, index, out)),
            }
            acc = out;
        }
        chains.push(format!("[{}]format=yuv420p[vout]", acc));

        let video_inputs = layers.len();
        let segments = &self.timeline.audio.segments;
        for (j, segment) in segments.iter().enumerate() {
            chains.push(format!(
                "[{}:a]aformat=sample_rates={}:channel_layouts=stereo,apad,atrim=duration={},asetpts=PTS-STARTPTS[a{}]",
                video_inputs + j,
                AUDIO_RATE,
                secs(segment.duration_secs),
                j
            ));
        }
        let audio_labels: String = (0..segments.len()).map(|j| format!("[a{}]", j)).collect();
        chains.push(format!(
            "{}concat=n={}:v=0:a=1[aout]",
            audio_labels,
            segments.len()
        ));

        chains.join(";")
    }

    fn layer_filter(&self, index: usize, layer: &Layer) -> String {
        let (w, h) = (self.timeline.width, self.timeline.height);
        let fps = self.settings.fps;
        let duration = self.input_secs(index);
        let mut filters: Vec<String> = Vec::new();

        match (&layer.motion, layer.source.is_still()) {
            (Some(Motion::KenBurns { start_scale, end_scale, pan }), true) => {
                let frames = ((duration * fps as f64).round() as u64).max(1);
                let progress = format!("on/{}", frames);
                let (x, y) = pan_expressions(*pan, &progress);
                filters.push(format!(
                    "scale={}:{}:force_original_aspect_ratio=increase,crop={}:{}",
                    w * 2,
                    h * 2,
                    w * 2,
                    h * 2
                ));
                filters.push(format!(
                    "zoompan=z='{:.4}+{:.4}*{}':x='{}':y='{}':d=1:s={}x{}:fps={}",
                    start_scale,
                    end_scale - start_scale,
                    progress,
                    x,
                    y,
                    w,
                    h,
                    fps
                ));
            }
            (_, still) => {
                filters.push(format!(
                    "scale={}:{}:force_original_aspect_ratio=increase,crop={}:{}",
                    w, h, w, h
                ));
                filters.push(format!("fps={}", fps));
                if !still {
                    filters.push(format!("tpad=stop_mode=clone:stop_duration={}", secs(duration)));
                }
            }
        }

        filters.push(format!("trim=duration={}", secs(duration)));
        filters.push("setpts=PTS-STARTPTS".into());
        filters.push("setsar=1".into());
        filters.push("format=yuv420p".into());

        if let Transition::Fade { secs: d } = layer.transition {
            if d > 0.0 {
                filters.push(format!("fade=t=in:st=0:d={}", secs(d)));
            }
        }

        filters.join(",")
    }
}

fn pan_expressions(pan: Pan, progress: &str) -> (String, String) {
    let center_x = "iw/2-(iw/zoom/2)".to_string();
    let center_y = "ih/2-(ih/zoom/2)".to_string();
    match pan {
        Pan::Center => (center_x, center_y),
        Pan::Left => (format!("(iw-iw/zoom)*(1-{})", progress), center_y),
        Pan::Right => (format!("(iw-iw/zoom)*{}", progress), center_y),
        Pan::Up => (center_x, format!("(ih-ih/zoom)*(1-{})", progress)),
        Pan::Down => (center_x, format!("(ih-ih/zoom)*{}", progress)),
    }
}

fn secs(value: f64) -> String {
    format!("{:.3}", value.max(0.0))
}

fn push_all(args: &mut Vec<String>, items: &[&str]) {
    args.extend(items.iter().map(|s| s.to_string()));
}

/// Runs ffmpeg with the arguments from `FfmpegArgsBuilder`.
pub struct FfmpegEncoder {
    settings: RenderSettings,
    logger: Option<Arc<EpisodeLogger>>,
}

impl FfmpegEncoder {
    pub fn new(settings: RenderSettings) -> Self {
        Self {
            settings,
            logger: None,
        }
    }

    pub fn with_logger(mut self, logger: Arc<EpisodeLogger>) -> Self {
        self.logger = Some(logger);
        self
    }
}

#[async_trait]
impl RenderEncoder for FfmpegEncoder {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn encode(&self, timeline: &Timeline, output: &Path) -> RenderResult<PathBuf> {
        let args = FfmpegArgsBuilder::new(timeline, &self.settings, output).build();
        let program = self.settings.ffmpeg_path.clone();

        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| RenderError::io("creating output directory", e))?;
        }
        if let Some(logger) = &self.logger {
            logger.command(&format!("{} {}", program, args.join(" ")));
        }
        tracing::debug!(program = %program, layers = timeline.layers.len(), "starting encode");

        let limit = Duration::from_secs(self.settings.timeout_secs);
        let run = Command::new(&program).args(&args).kill_on_drop(true).output();
        let result = match tokio::time::timeout(limit, run).await {
            Ok(result) => result.map_err(|source| RenderError::Spawn {
                program: program.clone(),
                source,
            })?,
            Err(_) => {
                if let Some(logger) = &self.logger {
                    logger.error(&format!("{} timed out after {}s", program, self.settings.timeout_secs));
                }
                return Err(RenderError::TimedOut {
                    program,
                    secs: self.settings.timeout_secs,
                });
            }
        };

        let stderr = String::from_utf8_lossy(&result.stderr);
        if let Some(logger) = &self.logger {
            for line in stderr.lines() {
                logger.output_line(line, true);
            }
        }

        if !result.status.success() {
            let exit_code = result.status.code().unwrap_or(-1);
            if let Some(logger) = &self.logger {
                logger.show_tail("ffmpeg output");
            }
            let lines: Vec<&str> = stderr.lines().collect();
            let tail = lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n");
            return Err(RenderError::CommandFailed {
                program,
                exit_code,
                stderr_tail: tail,
            });
        }

        if !output.is_file() {
            return Err(RenderError::MissingOutput(output.to_path_buf()));
        }
        Ok(output.to_path_buf())
    }
}
