//! Audio pipeline scenarios: the full synthesize/concat/mix/segment/
//! upload chain with media-tool doubles, plus the cleanup guarantee under
//! injected failures at every step.

mod common;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use common::*;
use serde_json::{Map, Value, json};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use podweave::capabilities::ObjectStoreClient;
use podweave::capabilities::store::{StoreFetchAsset, StoreUploadDir};
use podweave::config::PodweaveConfig;
use podweave::pipelines::entities::{AudioPreviewInput, ScriptLine};
use podweave::pipelines::{AudioPipeline, PipelineError};
use podweave::registry::{Capability, CapabilityError, CapabilityRegistry, NamedInputs};

/// Records inputs and echoes the requested output path.
struct MockConcat {
    calls: Arc<Mutex<Vec<Value>>>,
}

#[async_trait]
impl Capability for MockConcat {
    async fn invoke(&self, inputs: NamedInputs, _params: &Value) -> Result<Value, CapabilityError> {
        let output_path = inputs.require_str("output_path")?.to_string();
        let clips = inputs.require_array("clips")?.len();
        let object: Map<String, Value> = inputs.into_inner().into_iter().collect();
        self.calls.lock().unwrap().push(Value::Object(object));
        Ok(json!({
            "output_path": output_path,
            "per_line_durations": vec![1.3; clips],
        }))
    }
}

struct MockMix {
    calls: Arc<Mutex<Vec<Value>>>,
}

#[async_trait]
impl Capability for MockMix {
    async fn invoke(&self, inputs: NamedInputs, _params: &Value) -> Result<Value, CapabilityError> {
        let output_path = inputs.require_str("output_path")?.to_string();
        let object: Map<String, Value> = inputs.into_inner().into_iter().collect();
        self.calls.lock().unwrap().push(Value::Object(object));
        Ok(json!({"output_path": output_path, "duration": 42.5}))
    }
}

/// Writes a manifest and two segments where ffmpeg would.
struct MockSegment;

#[async_trait]
impl Capability for MockSegment {
    async fn invoke(&self, inputs: NamedInputs, _params: &Value) -> Result<Value, CapabilityError> {
        let output_dir = inputs.require_str("output_dir")?;
        let base_name = inputs.require_str("base_name")?;
        for name in [
            format!("{base_name}.m3u8"),
            format!("{base_name}_000.ts"),
            format!("{base_name}_001.ts"),
        ] {
            tokio::fs::write(PathBuf::from(output_dir).join(&name), b"data").await?;
        }
        Ok(json!({"manifest": format!("{base_name}.m3u8")}))
    }
}

struct TestEnv {
    pipeline: AudioPipeline,
    client: ObjectStoreClient,
    scratch_root: PathBuf,
    tts_calls: Arc<AtomicUsize>,
    concat_calls: Arc<Mutex<Vec<Value>>>,
    mix_calls: Arc<Mutex<Vec<Value>>>,
    _dir: tempfile::TempDir,
}

async fn test_env(failing: Option<&str>) -> TestEnv {
    podweave::telemetry::init();
    let dir = tempfile::tempdir().unwrap();
    let mut config = PodweaveConfig::default();
    config.scratch_root = dir.path().join("jobs");
    config.asset_cache_dir = dir.path().join("assets");
    config.storage.public_base_url = "https://cdn.test".into();

    let client = ObjectStoreClient::in_memory("https://cdn.test");
    for key in ["silent300.mp3", "silent800.mp3", "stars_beyond.mp3", "lofi.mp3"] {
        client
            .put(key, Bytes::from_static(b"asset"), "audio/mpeg")
            .await
            .unwrap();
    }

    let mut registry = CapabilityRegistry::new();
    podweave::capabilities::register_transforms(&mut registry, &config);

    let (tts, tts_calls) = StaticJson::new(json!({"buffer": BASE64.encode(b"fake-audio")}));
    registry.register("tts.synthesize", tts);
    registry.register("fs.write", Arc::new(podweave::capabilities::files::FsWrite));

    let concat_calls = Arc::new(Mutex::new(Vec::new()));
    registry.register(
        "audio.concat",
        Arc::new(MockConcat {
            calls: concat_calls.clone(),
        }),
    );
    let mix_calls = Arc::new(Mutex::new(Vec::new()));
    registry.register(
        "audio.mix_bgm",
        Arc::new(MockMix {
            calls: mix_calls.clone(),
        }),
    );
    registry.register("audio.segment", Arc::new(MockSegment));
    registry.register(
        "store.fetch_asset",
        Arc::new(StoreFetchAsset::new(client.clone())),
    );
    registry.register(
        "store.upload_dir",
        Arc::new(StoreUploadDir::new(client.clone())),
    );

    if let Some(name) = failing {
        registry.register(name, FailingCap::new("injected failure"));
    }

    TestEnv {
        pipeline: AudioPipeline::new(config.clone(), Arc::new(registry)),
        client,
        scratch_root: config.scratch_root,
        tts_calls,
        concat_calls,
        mix_calls,
        _dir: dir,
    }
}

fn two_line_input(script_id: &str) -> AudioPreviewInput {
    AudioPreviewInput {
        script: vec![
            ScriptLine {
                speaker: "Host".into(),
                text: "Welcome to the show".into(),
                caption: None,
            },
            ScriptLine {
                speaker: "Guest".into(),
                text: "Glad to be here".into(),
                caption: None,
            },
        ],
        tts: "openai".into(),
        voices: vec![],
        speakers: vec!["Host".into(), "Guest".into()],
        script_id: Some(script_id.into()),
        bgm_id: None,
        model: None,
    }
}

#[tokio::test]
async fn two_line_preview_end_to_end() {
    let env = test_env(None).await;
    let out = env
        .pipeline
        .render_preview(two_line_input("job-e2e"))
        .await
        .unwrap();

    // Two syntheses, one per line.
    assert_eq!(env.tts_calls.load(Ordering::SeqCst), 2);

    // One concatenation over both clips with the silence assets resolved
    // from the shared cache.
    let concat = env.concat_calls.lock().unwrap();
    assert_eq!(concat.len(), 1);
    let clips = concat[0]["clips"].as_array().unwrap();
    assert_eq!(clips.len(), 2);
    assert!(clips[0].as_str().unwrap().ends_with("job_e2e0.mp3"));
    assert!(clips[1].as_str().unwrap().ends_with("job_e2e1.mp3"));
    assert!(
        concat[0]["short_silence"]
            .as_str()
            .unwrap()
            .ends_with("silent300.mp3")
    );
    assert!(
        concat[0]["long_silence"]
            .as_str()
            .unwrap()
            .ends_with("silent800.mp3")
    );

    // No bgm id: the default track is mixed in.
    let mix = env.mix_calls.lock().unwrap();
    assert!(
        mix[0]["music_path"]
            .as_str()
            .unwrap()
            .ends_with("stars_beyond.mp3")
    );

    // Manifest and segments were published under the job prefix.
    assert_eq!(out.audio_url, "https://cdn.test/stream/job_e2e/job_e2e.m3u8");
    assert!(env.client.get("stream/job_e2e/job_e2e.m3u8").await.is_ok());
    assert!(env.client.get("stream/job_e2e/job_e2e_000.ts").await.is_ok());

    assert_eq!(out.script_id, "job-e2e");
    assert_eq!(out.duration, 42.5);
    assert_eq!(
        out.separated_audio_urls,
        vec!["job_e2e0.mp3".to_string(), "job_e2e1.mp3".to_string()]
    );

    // The job's scratch tree is gone.
    assert!(!env.scratch_root.join("job_e2e").exists());
}

#[tokio::test]
async fn explicit_bgm_id_overrides_default_track() {
    let env = test_env(None).await;
    let mut input = two_line_input("job-bgm");
    input.bgm_id = Some("lofi".into());
    env.pipeline.render_preview(input).await.unwrap();

    let mix = env.mix_calls.lock().unwrap();
    assert!(mix[0]["music_path"].as_str().unwrap().ends_with("lofi.mp3"));
}

#[tokio::test]
async fn scratch_is_removed_on_failure_at_every_step() {
    for failing in [
        "tts.synthesize",
        "audio.concat",
        "audio.mix_bgm",
        "audio.segment",
        "store.upload_dir",
    ] {
        let env = test_env(Some(failing)).await;
        let job = format!("job-{}", failing.replace('.', "-"));
        let err = env
            .pipeline
            .render_preview(two_line_input(&job))
            .await
            .unwrap_err();
        assert!(
            matches!(err, PipelineError::Executor(_)),
            "expected executor failure when {failing} fails, got {err:?}"
        );

        let base = job.replace('-', "_");
        assert!(
            !env.scratch_root.join(&base).exists(),
            "scratch for {base} must be removed when {failing} fails"
        );
    }
}

#[tokio::test]
async fn empty_script_is_rejected_without_side_effects() {
    let env = test_env(None).await;
    let input = AudioPreviewInput {
        script: vec![],
        tts: "openai".into(),
        ..Default::default()
    };
    let err = env.pipeline.render_preview(input).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Validation { field: "script", .. }
    ));
    assert_eq!(env.tts_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn generated_job_id_is_returned_when_absent() {
    let env = test_env(None).await;
    let mut input = two_line_input("ignored");
    input.script_id = None;
    let out = env.pipeline.render_preview(input).await.unwrap();
    assert!(!out.script_id.is_empty());
    assert!(out.audio_url.ends_with(".m3u8"));
}
