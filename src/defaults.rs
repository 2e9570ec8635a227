//! Default configuration constants for mindtrack.
//!
//! Shared by the service config, the settings snapshot, and the pipeline so
//! that every layer falls back to the same values.

use std::path::PathBuf;
use std::time::Duration;

/// How long a session stays queryable after it was created, regardless of status.
pub const SESSION_RETENTION: Duration = Duration::from_secs(60 * 60);

/// How often the eviction sweep runs.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Literal token the generator places between chapters.
pub const CHAPTER_MARKER: &str = "<break>";

/// Number of chapters a script is normalized to.
pub const CHAPTER_COUNT: usize = 3;

/// Silence inserted between consecutive chapters, in seconds.
pub const SILENCE_SECS: u32 = 60;

/// Length of the placeholder clip rendered for an empty chapter, in seconds.
pub const EMPTY_CHAPTER_SECS: u32 = 1;

/// Amplitude factor applied to the background music (roughly -10 dB).
pub const BACKGROUND_GAIN: f32 = 0.3;

/// MP3 bitrate for every encoded artifact.
pub const MP3_BITRATE: &str = "128k";

/// Sample rate of generated silence.
pub const SILENCE_SAMPLE_RATE: u32 = 44_100;

/// Final value of the progress counter once a job completes.
pub const FINAL_STEP: u32 = 4;

/// Message recorded when a failure carries no text of its own.
pub const GENERIC_FAILURE: &str = "An error occurred during processing";

// Provider defaults

pub const OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const OPENAI_MODEL: &str = "gpt-4o-mini";
pub const LLM_TEMPERATURE: f32 = 0.8;
pub const LLM_MAX_TOKENS: u32 = 2500;

pub const ELEVENLABS_BASE_URL: &str = "https://api.elevenlabs.io";
pub const ELEVENLABS_MODEL: &str = "eleven_turbo_v2_5";
/// "Rachel"
pub const ELEVENLABS_VOICE_ID: &str = "21m00Tcm4TlvDq8ikWAM";
pub const SPEECH_SPEED: f32 = 1.0;
pub const SPEECH_STABILITY: f32 = 0.5;
pub const SPEECH_SIMILARITY_BOOST: f32 = 0.75;

/// ElevenLabs accepts speeds in this range only.
pub const SPEECH_SPEED_RANGE: (f32, f32) = (0.7, 1.2);

// Per-call timeouts

pub const LLM_TIMEOUT: Duration = Duration::from_secs(120);
pub const SPEECH_TIMEOUT: Duration = Duration::from_secs(120);
pub const TOOL_TIMEOUT: Duration = Duration::from_secs(300);
pub const STORAGE_TIMEOUT: Duration = Duration::from_secs(120);
pub const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

// Server defaults

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_APP_PASSWORD: &str = "meditation";
pub const MUSIC_PATH: &str = "assets/meditation_music.mp3";

// Storage defaults

pub const STORAGE_BUCKET: &str = "meditations";
pub const RECORDS_TABLE: &str = "meditations";
pub const SETTINGS_TABLE: &str = "admin_settings";

/// Persona sent as the system message with every generation request.
pub const SYSTEM_PERSONA: &str = "You are an expert meditation guide and writer, skilled in creating personalized healing meditations.";

/// Prompt used when no template is configured.
///
/// Placeholders: `{disease}`, `{symptom}`, `{additional_instructions}`, `{chapter_count}`.
pub const PROMPT_TEMPLATE: &str = r#"#Instruction: write a 10-minute meditation following the below structure. In that meditation, include elevenlabs tags such as [inhale], [exhale], [pause] or [whisper]. To not make it too fast paced, make sure to include a [pause 2 seconds] tag after each sentence. Using "..." also slows the pace down. Take the user inputs into account in the relevant parts of the meditation, as described. Avoid using "now" too much to progress the meditation forward.

#User input:
##Disease: {disease}
##Symptom: {symptom}
##Additional instruction: {additional_instructions}

#Output: output only the meditation itself with the relevant tags, without saying anything else or without including section titles

#Structure of the meditation with instructions for each section:
##Section 1: Introduction to the topic. The general topic is quantum healing. Select a topic at random addressed by Deepak Chopra in his Quantum Healing book without mentioning that book in the meditation. Tie in this general topic with the disease, symptom and additional instruction given by the user above. This part should be suitable for a meditation, yet scientific enough - without being too specific (e.g. there is a proven mind-body connection, but don't talk about peptides or other detailed processes, just give examples relevant to the disease and symptom)

##Section 2: start of the meditation, settle the user. Choose any of common techniques to do so (e.g. focus on breath, senses, body, etc.). Leave some extra time/silence at the end of this section to allow the user to relax further in silence. End this section with the following tag: <break>

##Section 3: further relaxation. Choose any of common techniques to do so. Leave some extra time/silence at the end of this section to allow the user to relax further in silence. End this section with the following tag: <break>

##Section 4: visualisation. Introduce the visualisation technique, tie it to the disease, symptom and additional instruction of the user and to section 1 of the meditation and then start. Choose any of common visualisation techniques to do so.

##Section 5: end of meditation."#;

/// Environment markers that indicate a serverless runtime with a read-only cwd.
const SERVERLESS_MARKERS: [&str; 3] = ["VERCEL", "AWS_LAMBDA_FUNCTION_NAME", "IS_SERVERLESS"];

/// Root directory for per-job workspaces.
///
/// Serverless runtimes only allow writes under `/tmp`; everywhere else the
/// workspaces live in `./temp`.
pub fn workspace_root() -> PathBuf {
    workspace_root_with(|key| std::env::var(key).ok())
}

pub(crate) fn workspace_root_with(lookup: impl Fn(&str) -> Option<String>) -> PathBuf {
    let serverless = SERVERLESS_MARKERS
        .iter()
        .any(|key| lookup(key).is_some_and(|v| !v.is_empty()));

    if serverless {
        PathBuf::from("/tmp").join("mindtrack")
    } else {
        PathBuf::from("temp")
    }
}

/// Directory where the local artifact store archives finished meditations.
pub fn archive_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from(".local/share"))
        .join("mindtrack")
        .join("archive")
}
