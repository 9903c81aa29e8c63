use omnichat_model::{ModelFinishReason, ModelMessage, ModelRequest};
use serde::{Deserialize, Serialize};

// ------------------------------
// Types received from the server
// ------------------------------

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    pub prompt_feedback: Option<PromptFeedback>,
    // Errors raised after the stream has started are delivered in-band.
    pub error: Option<ApiError>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub content: Option<Content>,
    pub finish_reason: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    pub block_reason: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ApiError {
    pub code: Option<u16>,
    pub message: Option<String>,
    pub status: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

impl GenerateContentResponse {
    /// Returns the text carried by the first candidate, if any.
    ///
    /// Thought summaries are not part of the reply and are skipped.
    pub fn text(&self) -> Option<String> {
        let parts = &self.candidates.first()?.content.as_ref()?.parts;
        let mut text = None::<String>;
        for part in parts.iter().filter(|p| !p.thought.unwrap_or(false)) {
            if let Some(part_text) = &part.text {
                text.get_or_insert_default().push_str(part_text);
            }
        }
        text
    }

    pub fn finish_reason(&self) -> Option<ModelFinishReason> {
        let reason = self.candidates.first()?.finish_reason.as_deref()?;
        Some(match reason {
            "STOP" => ModelFinishReason::Stop,
            "MAX_TOKENS" => ModelFinishReason::MaxTokens,
            _ => ModelFinishReason::Other,
        })
    }

    pub fn block_reason(&self) -> Option<&str> {
        self.prompt_feedback.as_ref()?.block_reason.as_deref()
    }
}

impl ApiError {
    pub fn describe(&self) -> String {
        let message = self.message.as_deref().unwrap_or("unknown error");
        match (&self.status, self.code) {
            (Some(status), _) => format!("{status}: {message}"),
            (None, Some(code)) => format!("{code}: {message}"),
            (None, None) => message.to_owned(),
        }
    }
}

/// Extracts a readable message from a non-success response body.
pub fn error_message(status: u16, body: &str) -> String {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(body) => body.error.describe(),
        Err(_) if body.trim().is_empty() => format!("HTTP status {status}"),
        Err(_) => format!("HTTP status {status}: {}", body.trim()),
    }
}

// ---------------------------
// Types shared in both ways
// ---------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thought: Option<bool>,
}

// ------------------------
// Types sent to the server
// ------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    contents: Vec<Content>,
}

// -----------
// Conversions
// -----------

#[inline]
pub fn create_request(req: &ModelRequest) -> GenerateContentRequest {
    let mut system_texts = Vec::new();
    let mut contents = Vec::with_capacity(req.messages.len());
    for msg in &req.messages {
        match msg {
            ModelMessage::System(text) => system_texts.push(text.clone()),
            ModelMessage::User(text) => contents.push(text_content("user", text)),
            ModelMessage::Model(text) => {
                contents.push(text_content("model", text))
            }
        }
    }

    let system_instruction = (!system_texts.is_empty()).then(|| Content {
        role: None,
        parts: system_texts
            .into_iter()
            .map(|text| Part {
                text: Some(text),
                thought: None,
            })
            .collect(),
    });
    GenerateContentRequest {
        system_instruction,
        contents,
    }
}

#[inline]
fn text_content(role: &str, text: &str) -> Content {
    Content {
        role: Some(role.to_owned()),
        parts: vec![Part {
            text: Some(text.to_owned()),
            thought: None,
        }],
    }
}
