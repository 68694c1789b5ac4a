//! Domain entities for the script and audio pipelines.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One spoken turn of a script. Order within a script is playback order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptLine {
    pub speaker: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

/// A source the script drew from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// The closed set of conversation styles a request may ask for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Situation {
    School,
    Expert,
    Interview,
    Friends,
    RadioPersonality,
}

impl Situation {
    /// Parse the request-level string form; `None` for anything outside
    /// the closed set.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "school" => Some(Self::School),
            "expert" => Some(Self::Expert),
            "interview" => Some(Self::Interview),
            "friends" => Some(Self::Friends),
            "radio_personality" => Some(Self::RadioPersonality),
            _ => None,
        }
    }
}

/// A prompt together with the script it produced.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PromptScriptData {
    pub prompt: String,
    pub script: Vec<ScriptLine>,
    #[serde(default)]
    pub reference: Vec<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub situation: Option<Situation>,
}

/// Script-generation request, as handed over by the transport layer.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CreateScriptInput {
    pub prompt: String,
    #[serde(default)]
    pub previous_script: Vec<PromptScriptData>,
    #[serde(default)]
    pub reference: Vec<Reference>,
    #[serde(default)]
    pub is_search: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub situation: Option<String>,
}

/// Script-generation response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateScriptOutput {
    pub new_script: PromptScriptData,
    pub previous_script: Vec<PromptScriptData>,
}

/// Audio-preview request.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AudioPreviewInput {
    pub script: Vec<ScriptLine>,
    /// Selected TTS backend identifier (e.g. "openai").
    pub tts: String,
    #[serde(default)]
    pub voices: Vec<String>,
    #[serde(default)]
    pub speakers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bgm_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Audio-preview response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AudioPreviewOutput {
    /// Public URL of the uploaded stream manifest.
    pub audio_url: String,
    /// Per-line clip filenames, in playback order.
    pub separated_audio_urls: Vec<String>,
    pub script_id: String,
    /// Planned total duration in seconds.
    pub duration: f64,
}

/// One script line augmented with its generated clip filename.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RenderLine {
    pub speaker: String,
    pub text: String,
    pub filename: String,
}

/// Everything the audio pipeline needs to render one job. Created once
/// per request and destroyed with the job's scratch tree.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PodcastRenderJob {
    pub id: String,
    pub tts: String,
    pub voices: Vec<String>,
    pub speakers: Vec<String>,
    pub lines: Vec<RenderLine>,
    /// Job id with hyphens flattened, used as the base of every generated
    /// filename.
    pub base_name: String,
    pub voice_map: BTreeMap<String, String>,
    pub padding_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bgm_id: Option<String>,
}

impl PodcastRenderJob {
    /// Assemble a render job from a request, generating an id when the
    /// caller supplied none and falling back to the configured voices.
    pub fn assemble(
        input: &AudioPreviewInput,
        default_voices: &[String],
        padding_ms: u64,
    ) -> Self {
        let id = input
            .script_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let base_name = id.replace('-', "_");

        let voices = if input.voices.is_empty() {
            default_voices.to_vec()
        } else {
            input.voices.clone()
        };

        let voice_map: BTreeMap<String, String> = input
            .speakers
            .iter()
            .zip(voices.iter())
            .map(|(speaker, voice)| (speaker.clone(), voice.clone()))
            .collect();

        let lines = input
            .script
            .iter()
            .enumerate()
            .map(|(index, line)| RenderLine {
                speaker: line.speaker.clone(),
                text: line.text.clone(),
                filename: format!("{base_name}{index}"),
            })
            .collect();

        Self {
            id,
            tts: input.tts.clone(),
            voices,
            speakers: input.speakers.clone(),
            lines,
            base_name,
            voice_map,
            padding_ms,
            bgm_id: input.bgm_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn situation_closed_set() {
        assert_eq!(Situation::parse("school"), Some(Situation::School));
        assert_eq!(
            Situation::parse("radio_personality"),
            Some(Situation::RadioPersonality)
        );
        assert_eq!(Situation::parse("pirate"), None);
    }

    #[test]
    fn job_assembly_generates_filenames_and_voice_map() {
        let input = AudioPreviewInput {
            script: vec![
                ScriptLine {
                    speaker: "Host".into(),
                    text: "Welcome".into(),
                    caption: None,
                },
                ScriptLine {
                    speaker: "Guest".into(),
                    text: "Thanks".into(),
                    caption: None,
                },
            ],
            tts: "openai".into(),
            voices: vec![],
            speakers: vec!["Host".into(), "Guest".into()],
            script_id: Some("ab-cd-ef".into()),
            bgm_id: None,
            model: None,
        };
        let defaults = vec!["shimmer".to_string(), "echo".to_string()];
        let job = PodcastRenderJob::assemble(&input, &defaults, 4000);

        assert_eq!(job.base_name, "ab_cd_ef");
        assert_eq!(job.lines[0].filename, "ab_cd_ef0");
        assert_eq!(job.lines[1].filename, "ab_cd_ef1");
        assert_eq!(job.voice_map["Host"], "shimmer");
        assert_eq!(job.voice_map["Guest"], "echo");
        assert_eq!(job.padding_ms, 4000);
    }

    #[test]
    fn job_assembly_generates_id_when_missing() {
        let input = AudioPreviewInput {
            script: vec![],
            tts: "openai".into(),
            ..Default::default()
        };
        let job = PodcastRenderJob::assemble(&input, &["shimmer".to_string()], 4000);
        assert!(!job.id.is_empty());
        assert!(!job.base_name.contains('-'));
    }
}
