//! Media processing via ffmpeg/ffprobe subprocesses.
//!
//! Three capabilities cover the audio assembly chain: concatenating
//! per-line clips with silence padding, mixing the speech track over
//! background music, and cutting the mix into HLS segments. Argument
//! construction is kept in pure functions so the command lines are
//! testable without the binaries.

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::AudioConfig;
use crate::registry::{Capability, CapabilityError, NamedInputs};

fn round3(n: f64) -> f64 {
    (n * 1000.0).round() / 1000.0
}

async fn run_tool(program: &str, args: &[String]) -> Result<Vec<u8>, CapabilityError> {
    debug!(program, ?args, "spawning media tool");
    let output = Command::new(program).args(args).output().await?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail: String = stderr
            .chars()
            .rev()
            .take(400)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        return Err(CapabilityError::Subprocess {
            program: program.to_string(),
            message: tail,
        });
    }
    Ok(output.stdout)
}

/// Duration of a media file in seconds; 0.0 when ffprobe cannot tell.
async fn probe_duration(ffprobe: &str, path: &str) -> Result<f64, CapabilityError> {
    let args = vec![
        "-v".into(),
        "error".into(),
        "-show_entries".into(),
        "format=duration".into(),
        "-of".into(),
        "default=noprint_wrappers=1:nokey=1".into(),
        path.to_string(),
    ];
    let stdout = run_tool(ffprobe, &args).await?;
    let text = String::from_utf8_lossy(&stdout);
    match text.trim().parse::<f64>() {
        Ok(secs) if secs.is_finite() => Ok(secs),
        _ => {
            warn!(path, "ffprobe reported no usable duration");
            Ok(0.0)
        }
    }
}

/// Interleave clips with their trailing silences: a short pause after
/// every line, a long pause after the last.
fn concat_entries(clips: &[String], short_silence: &str, long_silence: &str) -> Vec<String> {
    let mut entries = Vec::with_capacity(clips.len() * 2);
    for (index, clip) in clips.iter().enumerate() {
        let is_last = index + 1 == clips.len();
        entries.push(clip.clone());
        entries.push(if is_last { long_silence } else { short_silence }.to_string());
    }
    entries
}

/// Body of an ffmpeg concat-demuxer list file.
fn concat_list_body(entries: &[String]) -> String {
    entries
        .iter()
        .map(|path| format!("file '{}'\n", path.replace('\'', r"'\''")))
        .collect()
}

/// `audio.concat`: join per-line clips in script order with asymmetric
/// silence padding, re-encoding through the concat demuxer.
///
/// Inputs: `clips` (ordered paths), `short_silence`, `long_silence`,
/// `output_path`.
///
/// Output: `{"output_path", "per_line_durations"}` where each duration
/// includes the line's trailing silence.
pub struct AudioConcat {
    config: AudioConfig,
}

impl AudioConcat {
    pub fn new(config: AudioConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Capability for AudioConcat {
    async fn invoke(&self, inputs: NamedInputs, _params: &Value) -> Result<Value, CapabilityError> {
        let clips = inputs.str_items("clips")?;
        if clips.is_empty() {
            return Err(CapabilityError::MissingInput {
                what: "clips (non-empty array)".into(),
            });
        }
        let short_silence = inputs.require_str("short_silence")?;
        let long_silence = inputs.require_str("long_silence")?;
        let output_path = inputs.require_str("output_path")?;

        let entries = concat_entries(&clips, short_silence, long_silence);
        let list_path = format!("{output_path}.concat.txt");
        tokio::fs::write(&list_path, concat_list_body(&entries)).await?;

        let args = vec![
            "-y".into(),
            "-f".into(),
            "concat".into(),
            "-safe".into(),
            "0".into(),
            "-i".into(),
            list_path.clone(),
            "-codec:a".into(),
            "libmp3lame".into(),
            "-q:a".into(),
            "2".into(),
            output_path.to_string(),
        ];
        run_tool(&self.config.ffmpeg_path, &args).await?;

        let mut per_line_durations = Vec::with_capacity(clips.len());
        for (index, clip) in clips.iter().enumerate() {
            let is_last = index + 1 == clips.len();
            let silence = if is_last {
                self.config.long_silence_secs
            } else {
                self.config.short_silence_secs
            };
            let duration = probe_duration(&self.config.ffprobe_path, clip).await?;
            per_line_durations.push(round3(duration + silence));
        }

        Ok(json!({
            "output_path": output_path,
            "per_line_durations": per_line_durations,
        }))
    }
}

/// The mix filter chain: delay and boost the speech, attenuate the music,
/// sum with longest-duration semantics, trim to the planned total, fade
/// out over the final padding interval.
fn bgm_filter(padding_ms: u64, total_secs: f64, speech_gain: f64, music_gain: f64) -> String {
    let padding_secs = padding_ms as f64 / 1000.0;
    let fade_start = round3(total_secs - padding_secs);
    format!(
        "[1:a]adelay={p}|{p},volume={sg}[a1];\
         [0:a]volume={mg}[a0];\
         [a0][a1]amix=inputs=2:duration=longest:dropout_transition=3[mix];\
         [mix]atrim=start=0:end={total}[trim];\
         [trim]afade=t=out:st={fade_start}:d={fade}[final]",
        p = padding_ms,
        sg = speech_gain,
        mg = music_gain,
        total = total_secs,
        fade = padding_secs,
    )
}

/// `audio.mix_bgm`: mix the concatenated speech track over a music bed.
///
/// Inputs: `speech_path`, `music_path`, `output_path`. Params:
/// `padding_ms` (defaults to the configured padding).
///
/// Output: `{"output_path", "duration"}` where `duration` is the planned
/// total (`speech + 2 × padding`, 3-decimal rounding).
pub struct AudioMixBgm {
    config: AudioConfig,
}

impl AudioMixBgm {
    pub fn new(config: AudioConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Capability for AudioMixBgm {
    async fn invoke(&self, inputs: NamedInputs, params: &Value) -> Result<Value, CapabilityError> {
        let speech_path = inputs.require_str("speech_path")?;
        let music_path = inputs.require_str("music_path")?;
        let output_path = inputs.require_str("output_path")?;
        let padding_ms = params
            .get("padding_ms")
            .and_then(Value::as_u64)
            .unwrap_or(self.config.padding_ms);

        let speech_secs = probe_duration(&self.config.ffprobe_path, speech_path).await?;
        let total = round3(speech_secs + 2.0 * (padding_ms as f64 / 1000.0));
        let filter = bgm_filter(
            padding_ms,
            total,
            self.config.speech_gain,
            self.config.music_gain,
        );

        let args = vec![
            "-y".into(),
            "-i".into(),
            music_path.to_string(),
            "-i".into(),
            speech_path.to_string(),
            "-filter_complex".into(),
            filter,
            "-map".into(),
            "[final]".into(),
            output_path.to_string(),
        ];
        run_tool(&self.config.ffmpeg_path, &args).await?;

        Ok(json!({"output_path": output_path, "duration": total}))
    }
}

/// HLS transcode arguments: AAC stereo, fixed-length independent
/// segments, full VOD playlist.
fn hls_args(
    input_path: &str,
    output_dir: &str,
    base_name: &str,
    segment_seconds: u32,
) -> Vec<String> {
    vec![
        "-y".into(),
        "-i".into(),
        input_path.to_string(),
        "-ac".into(),
        "2".into(),
        "-c:a".into(),
        "aac".into(),
        "-b:a".into(),
        "128k".into(),
        "-f".into(),
        "hls".into(),
        "-hls_time".into(),
        segment_seconds.to_string(),
        "-hls_list_size".into(),
        "0".into(),
        "-hls_flags".into(),
        "independent_segments".into(),
        "-hls_segment_filename".into(),
        format!("{output_dir}/{base_name}_%03d.ts"),
        format!("{output_dir}/{base_name}.m3u8"),
    ]
}

/// `audio.segment`: cut the mixed track into a streaming playlist.
///
/// Inputs: `input_path`, `output_dir`, `base_name`. Params:
/// `segment_seconds` (defaults to the configured length).
///
/// Output: `{"manifest": "<base>.m3u8"}`.
pub struct AudioSegment {
    config: AudioConfig,
}

impl AudioSegment {
    pub fn new(config: AudioConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Capability for AudioSegment {
    async fn invoke(&self, inputs: NamedInputs, params: &Value) -> Result<Value, CapabilityError> {
        let input_path = inputs.require_str("input_path")?;
        let output_dir = inputs.require_str("output_dir")?;
        let base_name = inputs.require_str("base_name")?;
        let segment_seconds = params
            .get("segment_seconds")
            .and_then(Value::as_u64)
            .map(|n| n as u32)
            .unwrap_or(self.config.segment_seconds);

        let args = hls_args(input_path, output_dir, base_name, segment_seconds);
        run_tool(&self.config.ffmpeg_path, &args).await?;
        Ok(json!({"manifest": format!("{base_name}.m3u8")}))
    }
}
