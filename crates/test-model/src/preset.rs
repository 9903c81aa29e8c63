use serde::{Deserialize, Serialize};

/// The events in a preset response.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PresetEvent {
    /// A text fragment. An empty string stands for a chunk that carries no
    /// text at all.
    #[serde(rename = "message_delta")]
    MessageDelta(String),
}

/// How a preset response fails.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresetFailure {
    /// The call is rejected before any event is streamed.
    Open,
    /// The stream breaks off after all preset events were delivered.
    Stream,
    /// The call is rejected as if the credential were missing.
    Configuration,
}

/// The preset response for one request.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PresetResponse {
    /// Events in this response.
    pub events: Vec<PresetEvent>,
    /// If set, the response fails instead of completing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<PresetFailure>,
}

impl PresetResponse {
    /// Creates a `PresetResponse` with the specified events.
    #[inline]
    pub fn with_events(events: impl Into<Vec<PresetEvent>>) -> Self {
        Self {
            events: events.into(),
            failure: None,
        }
    }

    /// Creates a `PresetResponse` that streams the given fragments.
    pub fn with_fragments<S: AsRef<str>>(
        fragments: impl IntoIterator<Item = S>,
    ) -> Self {
        Self::with_events(
            fragments
                .into_iter()
                .map(|f| PresetEvent::MessageDelta(f.as_ref().to_owned()))
                .collect::<Vec<_>>(),
        )
    }

    /// Makes the response fail in the given way.
    #[inline]
    pub fn with_failure(mut self, failure: PresetFailure) -> Self {
        self.failure = Some(failure);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_deserialize() {
        let response = PresetResponse::with_fragments(["Par", "tial"])
            .with_failure(PresetFailure::Stream);

        let serialized = serde_json::to_string(&response).unwrap();
        assert_eq!(
            serialized,
            r#"{"events":[{"type":"message_delta","data":"Par"},{"type":"message_delta","data":"tial"}],"failure":"stream"}"#
        );
        let deserialized: PresetResponse =
            serde_json::from_str(&serialized).unwrap();
        assert_eq!(response, deserialized);
    }

    #[test]
    fn test_failure_is_optional() {
        let response: PresetResponse = serde_json::from_str(
            r#"{"events":[{"type":"message_delta","data":"Hi"}]}"#,
        )
        .unwrap();
        assert_eq!(response, PresetResponse::with_fragments(["Hi"]));
    }
}
