//! Result and option types shared across the speech client.

use super::error::SpeechError;

/// Kind of a result surfaced through [`poll`](super::client::SpeechClient::poll).
///
/// For a given id the client emits a valid prefix of
/// `Start? Intermediate* (End | Cancelled | Error)`; once a terminal kind has
/// been emitted no further results for that id follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechResultKind {
    Start,
    Intermediate,
    End,
    Cancelled,
    Error,
}

impl SpeechResultKind {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SpeechResultKind::End | SpeechResultKind::Cancelled | SpeechResultKind::Error
        )
    }
}

/// One recognition result delivered to the poller.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechResult {
    pub id: i32,
    pub kind: SpeechResultKind,
    /// Populated for `Error` results; `Cancelled` carries no error.
    pub error: Option<SpeechError>,
    pub asr: String,
    pub nlp: String,
    pub action: String,
    /// Opaque server metadata (JSON document with the activation verdict).
    pub extra: String,
}

impl SpeechResult {
    pub(crate) fn empty(id: i32, kind: SpeechResultKind) -> Self {
        Self {
            id,
            kind,
            error: None,
            asr: String::new(),
            nlp: String::new(),
            action: String::new(),
            extra: String::new(),
        }
    }
}

/// String-valued option bundle attached to a voice start request.
///
/// Serialized as a JSON object into the `framework_options` / `skill_options`
/// request fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VoiceOptions {
    entries: serde_json::Map<String, serde_json::Value>,
}

impl VoiceOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries
            .insert(key.into(), serde_json::Value::String(value.into()));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).and_then(|v| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_json(&self) -> String {
        serde_json::Value::Object(self.entries.clone()).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_serialize_to_json_object() {
        let mut opts = VoiceOptions::new();
        opts.set("stack", "com.example.app");
        opts.set("trigger_start", "120");
        let json: serde_json::Value = serde_json::from_str(&opts.to_json()).unwrap();
        assert_eq!(json["stack"], "com.example.app");
        assert_eq!(json["trigger_start"], "120");
    }

    #[test]
    fn terminal_kinds() {
        assert!(!SpeechResultKind::Start.is_terminal());
        assert!(!SpeechResultKind::Intermediate.is_terminal());
        assert!(SpeechResultKind::End.is_terminal());
        assert!(SpeechResultKind::Cancelled.is_terminal());
        assert!(SpeechResultKind::Error.is_terminal());
    }
}
