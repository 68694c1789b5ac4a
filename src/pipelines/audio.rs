//! Audio assembly: per-line synthesis fan-out, silence-padded
//! concatenation, background-music mixing, HLS segmenting, upload, and
//! guaranteed scratch cleanup.

use serde_json::{Value, json};
use std::sync::Arc;
use tracing::instrument;

use crate::config::PodweaveConfig;
use crate::executor::Executor;
use crate::graph::{Binding, ComputeSpec, GraphBuilder, GraphDefinitionError, GraphSpec, MapSpec};
use crate::pipelines::PipelineError;
use crate::pipelines::entities::{AudioPreviewInput, AudioPreviewOutput, PodcastRenderJob};
use crate::registry::CapabilityRegistry;
use crate::scratch::JobScratch;

/// Renders a script into an uploaded, segmented audio stream.
pub struct AudioPipeline {
    config: PodweaveConfig,
    registry: Arc<CapabilityRegistry>,
}

impl AudioPipeline {
    pub fn new(config: PodweaveConfig, registry: Arc<CapabilityRegistry>) -> Self {
        Self { config, registry }
    }

    /// Run one preview job. The job's scratch tree is removed on every
    /// exit path before the result or error is returned.
    #[instrument(skip_all, fields(lines = input.script.len()))]
    pub async fn render_preview(
        &self,
        input: AudioPreviewInput,
    ) -> Result<AudioPreviewOutput, PipelineError> {
        if input.script.is_empty() {
            return Err(PipelineError::Validation {
                field: "script",
                message: "script must contain at least one line".into(),
            });
        }

        let job = PodcastRenderJob::assemble(
            &input,
            &self.config.tts.default_voices,
            self.config.audio.padding_ms,
        );
        let scratch = JobScratch::create(&self.config.scratch_root, &job.base_name).await?;

        let result = self.run_job(&job, &input, &scratch).await;
        scratch.remove().await;
        result
    }

    async fn run_job(
        &self,
        job: &PodcastRenderJob,
        input: &AudioPreviewInput,
        scratch: &JobScratch,
    ) -> Result<AudioPreviewOutput, PipelineError> {
        let graph = build_audio_graph(&self.config, job, input, scratch)?;
        let mut executor = Executor::new(graph, self.registry.clone())?
            .with_map_concurrency(self.config.tts.concurrency);
        executor.inject("lines", serde_json::to_value(&job.lines)?)?;

        let bag = executor.run().await?;

        let duration = bag
            .get("mixed")
            .and_then(|m| m.get("duration"))
            .and_then(Value::as_f64)
            .unwrap_or(0.0);

        let manifest_key_suffix = format!("{}.m3u8", job.base_name);
        let uploads = bag
            .get("published")
            .and_then(|p| p.get("uploads"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let audio_url = uploads
            .iter()
            .find(|upload| {
                upload
                    .get("key")
                    .and_then(Value::as_str)
                    .is_some_and(|key| key.ends_with(&manifest_key_suffix))
            })
            .and_then(|upload| upload.get("url"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| PipelineError::GenerationFailed {
                message: "upload produced no stream manifest".into(),
            })?;

        let separated_audio_urls = job
            .lines
            .iter()
            .map(|line| format!("{}.mp3", line.filename))
            .collect();

        Ok(AudioPreviewOutput {
            audio_url,
            separated_audio_urls,
            script_id: job.id.clone(),
            duration,
        })
    }
}

/// The audio assembly graph for one job. Job-derived constants are bound
/// as literals; only the line list is injected.
pub fn build_audio_graph(
    config: &PodweaveConfig,
    job: &PodcastRenderJob,
    input: &AudioPreviewInput,
    scratch: &JobScratch,
) -> Result<GraphSpec, GraphDefinitionError> {
    let lines_dir = scratch.lines_dir.to_string_lossy().into_owned();
    let mix_dir = scratch.mix_dir.to_string_lossy().into_owned();
    let segments_dir = scratch.segments_dir.to_string_lossy().into_owned();
    let asset_dir = config.asset_cache_dir.to_string_lossy().into_owned();

    let tts_model = input
        .model
        .clone()
        .unwrap_or_else(|| config.tts.model.clone());
    let fallback_voice = job
        .voices
        .first()
        .cloned()
        .unwrap_or_else(|| "shimmer".to_string());
    let bgm_key = job
        .bgm_id
        .as_ref()
        .map(|id| format!("{id}.mp3"))
        .unwrap_or_else(|| config.audio.default_bgm_key.clone());

    let combined_path = format!("{mix_dir}/{}.mp3", job.base_name);
    let mixed_path = format!("{mix_dir}/{}_bgm.mp3", job.base_name);
    let stream_prefix = format!("{}/{}", config.storage.stream_prefix, job.base_name);

    GraphBuilder::new()
        .value("lines")
        .map(
            "synthesize",
            MapSpec::new(line_graph(&tts_model)?, Binding::reference("lines"))
                .input("voicemap", Binding::literal(json!(job.voice_map)))
                .input("fallback", Binding::literal(json!(fallback_voice)))
                .input("lines_dir", Binding::literal(json!(lines_dir)))
                .concurrency(config.tts.concurrency),
        )
        .compute(
            "clip_paths",
            ComputeSpec::new("transform.pluck")
                .input("items", Binding::reference("synthesize"))
                .params(json!({"path": "clip.path"})),
        )
        .compute(
            "short_silence",
            ComputeSpec::new("store.fetch_asset")
                .input("asset", Binding::literal(json!(config.audio.short_silence_key)))
                .input("dir", Binding::literal(json!(asset_dir.clone()))),
        )
        .compute(
            "long_silence",
            ComputeSpec::new("store.fetch_asset")
                .input("asset", Binding::literal(json!(config.audio.long_silence_key)))
                .input("dir", Binding::literal(json!(asset_dir.clone()))),
        )
        .compute(
            "bgm",
            ComputeSpec::new("store.fetch_asset")
                .input("asset", Binding::literal(json!(bgm_key)))
                .input("dir", Binding::literal(json!(asset_dir))),
        )
        .compute(
            "combined",
            ComputeSpec::new("audio.concat")
                .input("clips", Binding::reference("clip_paths"))
                .input("short_silence", Binding::reference("short_silence.path"))
                .input("long_silence", Binding::reference("long_silence.path"))
                .input("output_path", Binding::literal(json!(combined_path))),
        )
        .compute(
            "mixed",
            ComputeSpec::new("audio.mix_bgm")
                .input("speech_path", Binding::reference("combined.output_path"))
                .input("music_path", Binding::reference("bgm.path"))
                .input("output_path", Binding::literal(json!(mixed_path)))
                .params(json!({"padding_ms": job.padding_ms}))
                .result(),
        )
        .compute(
            "segments",
            ComputeSpec::new("audio.segment")
                .input("input_path", Binding::reference("mixed.output_path"))
                .input("output_dir", Binding::literal(json!(segments_dir.clone())))
                .input("base_name", Binding::literal(json!(job.base_name)))
                .params(json!({"segment_seconds": config.audio.segment_seconds})),
        )
        .compute(
            "published",
            ComputeSpec::new("store.upload_dir")
                .input("dir", Binding::literal(json!(segments_dir)))
                .input("prefix", Binding::literal(json!(stream_prefix)))
                // Ordering only: upload must wait for segmenting.
                .input("after", Binding::reference("segments"))
                .result(),
        )
        .build()
}

/// Per-line sub-graph: resolve the voice, synthesize, write the clip.
fn line_graph(tts_model: &str) -> Result<GraphSpec, GraphDefinitionError> {
    GraphBuilder::new()
        .value("row")
        .value("voicemap")
        .value("fallback")
        .value("lines_dir")
        .compute(
            "voice",
            ComputeSpec::new("transform.resolve_voice")
                .input("speaker", Binding::reference("row.speaker"))
                .input("voicemap", Binding::reference("voicemap"))
                .input("fallback", Binding::reference("fallback")),
        )
        .compute(
            "path",
            ComputeSpec::new("transform.line_path")
                .input("dir", Binding::reference("lines_dir"))
                .input("filename", Binding::reference("row.filename")),
        )
        .compute(
            "speech",
            ComputeSpec::new("tts.synthesize")
                .input("text", Binding::reference("row.text"))
                .input("voice", Binding::reference("voice"))
                .params(json!({"model": tts_model})),
        )
        .compute(
            "clip",
            ComputeSpec::new("fs.write")
                .input("path", Binding::reference("path"))
                .input("buffer", Binding::reference("speech.buffer"))
                .result(),
        )
        .build()
}
