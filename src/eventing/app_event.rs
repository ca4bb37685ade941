//! AppEvent - Bus Event Catalogue
//!
//! The closed set of events that services exchange through the
//! [`EventBus`](crate::eventing::EventBus). Every variant wraps a small
//! payload record; handlers receive a shared, read-only instance and react
//! by publishing new events rather than mutating the one they were given.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Log level carried by [`UiLog`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn label(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DEBUG" | "TRACE" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" | "WARNING" => Ok(LogLevel::Warn),
            "ERROR" | "CRITICAL" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level: {other}")),
        }
    }
}

/// Broadcast shutdown notice
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppShutdown;

/// Observability sink shown in the host UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiLog {
    pub message: String,
    pub level: LogLevel,
}

impl UiLog {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level,
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, message)
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Warn, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, message)
    }
}

/// Captured audio ready for transcription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioRecorded {
    pub audio_path: Option<String>,
    pub audio_bytes: Option<Vec<u8>>,
    pub filename: String,
}

impl Default for AudioRecorded {
    fn default() -> Self {
        Self {
            audio_path: None,
            audio_bytes: None,
            filename: "recording.wav".to_string(),
        }
    }
}

/// Speech-to-text result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptionAvailable {
    pub text: String,
    pub is_final: bool,
    pub audio_path: Option<String>,
    pub error: Option<String>,
}

/// Request to the language model
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AiQuery {
    pub input_text: String,
    pub instruction: Option<String>,
    pub include_vision_context: bool,
    pub source: Option<String>,
}

impl AiQuery {
    pub fn new(input_text: impl Into<String>) -> Self {
        Self {
            input_text: input_text.into(),
            ..Default::default()
        }
    }

    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = Some(instruction.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Language model result
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AiResponse {
    pub text_to_speak: String,
    pub original_query: Option<String>,
}

/// Request to synthesize and play speech
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpeakRequest {
    pub text: String,
    pub collab_mode: bool,
}

impl SpeakRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            collab_mode: false,
        }
    }
}

/// Playback state change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtsSpeakingState {
    pub is_speaking: bool,
}

/// Transcript from an external source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalTranscript {
    pub text: String,
    pub speaker: String,
}

/// Web search request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub query: String,
    pub source: String,
    pub num_results: usize,
    pub original_user: Option<String>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            source: source.into(),
            num_results: 3,
            original_user: None,
        }
    }
}

/// A single web search hit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchHit {
    pub title: String,
    pub snippet: String,
    pub url: String,
}

/// Web search result
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchResult {
    pub query: String,
    pub results: Vec<SearchHit>,
    pub source: String,
    pub original_user: Option<String>,
    pub error: Option<String>,
}

/// Chat message from the stream platform
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TwitchMessage {
    pub username: String,
    pub message: String,
    pub tags: BTreeMap<String, String>,
}

/// Platform event such as a sub, resub, gift or raid
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TwitchUser {
    pub event_type: String,
    pub username: String,
    pub details: BTreeMap<String, String>,
}

/// Output loudness, drives the avatar's mouth
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioRmsVolume {
    pub rms_volume: f32,
}

/// Push-to-talk state change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PttRecordingState {
    pub is_recording: bool,
}

/// Summary of the captured screen
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisionSummary {
    pub summary: String,
}

macro_rules! event_catalogue {
    ($($variant:ident($payload:ident)),+ $(,)?) => {
        /// Events flowing through the bus
        #[derive(Debug, Clone, PartialEq)]
        pub enum Event {
            $($variant($payload),)+
        }

        /// Discriminant of [`Event`], the key subscriptions are registered under
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum EventKind {
            $($variant,)+
        }

        impl EventKind {
            pub fn name(&self) -> &'static str {
                match self {
                    $(EventKind::$variant => stringify!($variant),)+
                }
            }
        }

        impl Event {
            /// Resolve the concrete type of this event
            pub fn kind(&self) -> EventKind {
                match self {
                    $(Event::$variant(_) => EventKind::$variant,)+
                }
            }
        }

        $(
            impl From<$payload> for Event {
                fn from(payload: $payload) -> Self {
                    Event::$variant(payload)
                }
            }
        )+
    };
}

event_catalogue! {
    AppShutdown(AppShutdown),
    UiLog(UiLog),
    AudioRecorded(AudioRecorded),
    TranscriptionAvailable(TranscriptionAvailable),
    AiQuery(AiQuery),
    AiResponse(AiResponse),
    SpeakRequest(SpeakRequest),
    TtsSpeakingState(TtsSpeakingState),
    ExternalTranscript(ExternalTranscript),
    SearchRequest(SearchRequest),
    SearchResult(SearchResult),
    TwitchMessage(TwitchMessage),
    TwitchUser(TwitchUser),
    AudioRmsVolume(AudioRmsVolume),
    PttRecordingState(PttRecordingState),
    VisionSummary(VisionSummary),
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_variant() {
        let event: Event = UiLog::info("hello").into();
        assert_eq!(event.kind(), EventKind::UiLog);

        let event: Event = SpeakRequest::new("hi").into();
        assert_eq!(event.kind(), EventKind::SpeakRequest);
        assert_eq!(event.kind().to_string(), "SpeakRequest");
    }

    #[test]
    fn test_log_level_parsing() {
        assert_eq!("warning".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert_eq!("INFO".parse::<LogLevel>(), Ok(LogLevel::Info));
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_search_request_defaults() {
        let request = SearchRequest::new("rust", "twitch_command");
        assert_eq!(request.num_results, 3);
        assert!(request.original_user.is_none());
    }
}
