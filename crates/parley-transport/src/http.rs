use crate::transport::{ChatTransport, TurnRequest};
use async_trait::async_trait;
use futures_util::TryStreamExt;
use parley_core::config::BackendConfig;
use parley_core::ResponseError;
use parley_wire::{RawResponse, ResponseBody};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};

/// Reply shapes the client knows how to normalize.
const ACCEPTED_CONTENT: &str = "text/event-stream, application/json, multipart/mixed";
const AUDIO_FILE_FIELD: &str = "audio_file";
const AUDIO_FILE_NAME: &str = "recording.wav";
const AUDIO_MIME: &str = "audio/wav";

/// Posts turns to the chat endpoint over HTTP.
///
/// Text-only turns go out as JSON; turns with audio as `multipart/form-data`.
/// The reply body is handed back as a chunk stream without buffering.
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
}

impl HttpTransport {
    pub fn new(config: &BackendConfig) -> Result<Self, ResponseError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .read_timeout(config.read_timeout())
            .build()
            .map_err(|e| ResponseError::Transport(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: config.chat_url(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn build_form(request: &TurnRequest) -> Result<Form, ResponseError> {
        let mut form = Form::new()
            .text("session_id", request.session_id.as_str().to_string())
            .text("message", request.text.clone());
        if let Some(audio) = &request.audio {
            let part = Part::bytes(audio.to_vec())
                .file_name(AUDIO_FILE_NAME)
                .mime_str(AUDIO_MIME)
                .map_err(|e| ResponseError::Transport(format!("invalid audio part: {}", e)))?;
            form = form.part(AUDIO_FILE_FIELD, part);
        }
        Ok(form)
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    fn name(&self) -> &str {
        "http"
    }

    async fn send(&self, request: &TurnRequest) -> Result<RawResponse, ResponseError> {
        let builder = self.client.post(&self.url).header(ACCEPT, ACCEPTED_CONTENT);
        let builder = if request.has_audio() {
            builder.multipart(Self::build_form(request)?)
        } else {
            builder.json(&serde_json::json!({
                "session_id": request.session_id.as_str(),
                "message": request.text,
            }))
        };

        tracing::debug!(
            turn_id = %request.turn_id,
            session_id = %request.session_id,
            url = %self.url,
            with_audio = request.has_audio(),
            "posting turn"
        );
        let response = builder
            .send()
            .await
            .map_err(|e| ResponseError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        tracing::debug!(
            turn_id = %request.turn_id,
            status,
            content_type = content_type.as_deref().unwrap_or("<none>"),
            "response headers received"
        );

        let chunks = response
            .bytes_stream()
            .map_err(|e| ResponseError::Transport(e.to_string()));
        Ok(RawResponse::new(
            status,
            content_type.as_deref(),
            Some(ResponseBody::chunked(chunks)),
        ))
    }
}
