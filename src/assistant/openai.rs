//! `OpenAI` Assistants API implementation

use super::sse::RunEventStream;
use super::{AssistantError, AssistantTransport, EventStream, FileRegistry};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Timeout for the non-streaming calls; runs stream for as long as they take
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Assistant reachable through the `OpenAI` Assistants (v2) API
pub struct OpenAIAssistant {
    client: Client,
    api_key: String,
    assistant_id: String,
    base_url: String,
}

impl OpenAIAssistant {
    pub fn new(
        api_key: impl Into<String>,
        assistant_id: impl Into<String>,
        base_url: Option<&str>,
    ) -> Result<Self, AssistantError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| AssistantError::unknown(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            assistant_id: assistant_id.into(),
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{path}", self.base_url))
            .bearer_auth(&self.api_key)
            .header("OpenAI-Beta", "assistants=v2")
    }

    /// Send a request and return the response if it succeeded
    async fn send(request: RequestBuilder) -> Result<Response, AssistantError> {
        let response = request
            .send()
            .await
            .map_err(|e| AssistantError::from_reqwest(&e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .map_err(|e| AssistantError::network(format!("Failed to read response: {e}")))?;
        Err(AssistantError::from_status(status, &body))
    }

    async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, AssistantError> {
        let response = Self::send(request.timeout(REQUEST_TIMEOUT)).await?;
        let body = response
            .text()
            .await
            .map_err(|e| AssistantError::network(format!("Failed to read response: {e}")))?;
        serde_json::from_str(&body).map_err(|e| {
            AssistantError::unknown(format!("Failed to parse response: {e} - body: {body}"))
        })
    }
}

#[async_trait]
impl AssistantTransport for OpenAIAssistant {
    async fn verify(&self) -> Result<(), AssistantError> {
        let path = format!("/assistants/{}", self.assistant_id);
        let _: ObjectRef = Self::send_json(self.request(Method::GET, &path)).await?;
        Ok(())
    }

    async fn create_thread(&self) -> Result<String, AssistantError> {
        let request = self
            .request(Method::POST, "/threads")
            .json(&serde_json::json!({}));
        let thread: ObjectRef = Self::send_json(request).await?;
        Ok(thread.id)
    }

    async fn add_user_message(&self, thread_id: &str, content: &str) -> Result<(), AssistantError> {
        let request = self
            .request(Method::POST, &format!("/threads/{thread_id}/messages"))
            .json(&CreateMessageRequest {
                role: "user",
                content,
            });
        let _: ObjectRef = Self::send_json(request).await?;
        Ok(())
    }

    async fn stream_run(&self, thread_id: &str) -> Result<EventStream, AssistantError> {
        let request = self
            .request(Method::POST, &format!("/threads/{thread_id}/runs"))
            .header("Accept", "text/event-stream")
            .json(&CreateRunRequest {
                assistant_id: &self.assistant_id,
                stream: true,
            });
        let response = Self::send(request).await?;
        Ok(Box::pin(RunEventStream::new(Box::pin(
            response.bytes_stream(),
        ))))
    }

    fn assistant_id(&self) -> &str {
        &self.assistant_id
    }
}

#[async_trait]
impl FileRegistry for OpenAIAssistant {
    async fn filename(&self, file_id: &str) -> Result<String, AssistantError> {
        let file: FileObject =
            Self::send_json(self.request(Method::GET, &format!("/files/{file_id}"))).await?;
        Ok(file.filename)
    }
}

// Assistants API types

#[derive(Debug, Serialize)]
struct CreateMessageRequest<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateRunRequest<'a> {
    assistant_id: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ObjectRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct FileObject {
    filename: String,
}
