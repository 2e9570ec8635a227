//! Background-music overlay planning.
//!
//! Decides whether the music has to be looped or trimmed to cover the
//! narration, and builds the matching ffmpeg invocation. Kept free of I/O so
//! the policy can be tested without the toolchain.

use crate::defaults;
use std::path::Path;

/// How the background track is fitted to the narration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OverlayPlan {
    /// Music is shorter than the narration: replay it `extra_loops` more times.
    Loop { extra_loops: u32 },
    /// Music is at least as long as the narration: cut it at `duration_secs`.
    Trim { duration_secs: f64 },
    /// Narration length is unknown; `amix duration=first` alone bounds the output.
    Unbounded,
}

impl OverlayPlan {
    /// Choose a plan from the narration duration `narration` (D) and the music
    /// duration `music` (M), both in seconds.
    ///
    /// A zero duration means the probe failed.
    pub fn for_durations(narration: f64, music: f64) -> Self {
        if !narration.is_finite() || narration <= 0.0 {
            return OverlayPlan::Unbounded;
        }
        if music.is_finite() && music > 0.0 && music < narration {
            let loops = (narration / music).ceil() as u32;
            return OverlayPlan::Loop {
                extra_loops: loops.saturating_sub(1),
            };
        }
        OverlayPlan::Trim {
            duration_secs: narration,
        }
    }

    /// Duration the mixed output is expected to have, if known.
    ///
    /// The narration is always the first `amix` input, so the output follows it.
    pub fn expected_output_secs(&self, narration: f64) -> Option<f64> {
        match self {
            OverlayPlan::Unbounded => None,
            _ => Some(narration),
        }
    }

    /// Total seconds of music available to the mixer under this plan.
    pub fn music_coverage_secs(&self, music: f64) -> Option<f64> {
        match self {
            OverlayPlan::Loop { extra_loops } => Some(music * f64::from(extra_loops + 1)),
            OverlayPlan::Trim { duration_secs } => Some(*duration_secs),
            OverlayPlan::Unbounded => None,
        }
    }

    /// Arguments for `ffmpeg` that mix `background` under `main` into `output`.
    pub fn ffmpeg_args(&self, main: &Path, background: &Path, output: &Path, gain: f32) -> Vec<String> {
        let main = main.to_string_lossy().into_owned();
        let background = background.to_string_lossy().into_owned();
        let mix = "amix=inputs=2:duration=first:dropout_transition=2";

        let mut args: Vec<String> = Vec::new();
        match self {
            OverlayPlan::Loop { extra_loops } => {
                args.extend([
                    "-stream_loop".to_string(),
                    extra_loops.to_string(),
                    "-i".to_string(),
                    background,
                    "-i".to_string(),
                    main,
                    "-filter_complex".to_string(),
                    format!("[0:a]volume={gain}[music];[1:a][music]{mix}"),
                ]);
            }
            OverlayPlan::Trim { duration_secs } => {
                args.extend([
                    "-i".to_string(),
                    main,
                    "-i".to_string(),
                    background,
                    "-filter_complex".to_string(),
                    format!("[1:a]atrim=0:{duration_secs},volume={gain}[music];[0:a][music]{mix}"),
                ]);
            }
            OverlayPlan::Unbounded => {
                args.extend([
                    "-i".to_string(),
                    main,
                    "-i".to_string(),
                    background,
                    "-filter_complex".to_string(),
                    format!("[1:a]volume={gain}[music];[0:a][music]{mix}"),
                ]);
            }
        }
        args.extend(mp3_output_args(output));
        args
    }
}

/// Trailing encoder arguments shared by every ffmpeg invocation.
pub(crate) fn mp3_output_args(output: &Path) -> [String; 6] {
    [
        "-c:a".to_string(),
        "libmp3lame".to_string(),
        "-b:a".to_string(),
        defaults::MP3_BITRATE.to_string(),
        "-y".to_string(),
        output.to_string_lossy().into_owned(),
    ]
}
