//! HTTP client for the Gemini API: file listing, file upload, and
//! content generation against `generativelanguage.googleapis.com`.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const BASE_URL: &str = "https://generativelanguage.googleapis.com";

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Failure kinds for remote operations. Per-file and per-turn failures are
/// inspected by the caller and converted to user-visible messages; nothing
/// here terminates the session.
#[derive(Error, Debug)]
pub enum GeminiError {
    /// The service rejected the request with HTTP 429. Recoverable once
    /// per turn via the answer generator's single retry.
    #[error("rate limited by the inference service")]
    RateLimited,

    /// Generation failed for a non-rate-limit reason. Terminal for the
    /// current turn only.
    #[error("generation failed: {0}")]
    Generation(String),

    /// The remote file listing could not be fetched. The cache loader
    /// degrades to uploading everything.
    #[error("file listing failed: {0}")]
    ListFailed(String),

    /// A single document could not be uploaded. The loader excludes the
    /// document and continues.
    #[error("upload of '{name}' failed: {message}")]
    UploadFailed { name: String, message: String },
}

impl GeminiError {
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, GeminiError::RateLimited)
    }
}

/// Handle to a file owned by the remote service. Referenced, never owned,
/// by this process; the display name is the join key against local files.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub mime_type: String,
    pub uri: String,
}

/// One part of a generation request: either instruction/question text or a
/// reference to an uploaded file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Part {
    Text {
        text: String,
    },
    File {
        #[serde(rename = "fileData")]
        file_data: FileData,
    },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    pub fn file(handle: &RemoteFile) -> Self {
        Part::File {
            file_data: FileData {
                file_uri: handle.uri.clone(),
                mime_type: handle.mime_type.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileData {
    #[serde(rename = "fileUri")]
    pub file_uri: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
}

#[derive(Deserialize)]
struct FileListResponse {
    #[serde(default)]
    files: Vec<RemoteFile>,
}

#[derive(Deserialize)]
struct UploadResponse {
    file: RemoteFile,
}

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

/// Boundary to the remote inference service. The concrete client talks to
/// the Gemini API; tests substitute a stub.
#[async_trait]
pub trait RemoteInference: Send + Sync {
    async fn list_files(&self) -> Result<Vec<RemoteFile>, GeminiError>;

    async fn upload_file(
        &self,
        bytes: Vec<u8>,
        display_name: &str,
        mime_type: &str,
    ) -> Result<RemoteFile, GeminiError>;

    async fn generate(&self, model: &str, parts: Vec<Part>) -> Result<String, GeminiError>;
}

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: &str) -> Self {
        Self::with_base_url(api_key, BASE_URL)
    }

    pub fn with_base_url(api_key: &str, base_url: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl RemoteInference for GeminiClient {
    async fn list_files(&self) -> Result<Vec<RemoteFile>, GeminiError> {
        let url = format!("{}/v1beta/files?key={}", self.base_url, self.api_key);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| GeminiError::ListFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(GeminiError::ListFailed(format!(
                "status {}",
                response.status()
            )));
        }

        let listing: FileListResponse = response
            .json()
            .await
            .map_err(|e| GeminiError::ListFailed(e.to_string()))?;
        Ok(listing.files)
    }

    async fn upload_file(
        &self,
        bytes: Vec<u8>,
        display_name: &str,
        mime_type: &str,
    ) -> Result<RemoteFile, GeminiError> {
        let upload_err = |message: String| GeminiError::UploadFailed {
            name: display_name.to_string(),
            message,
        };

        // Resumable upload handshake: the start request carries the metadata
        // and returns the session URL; the second request carries the bytes.
        let start_url = format!("{}/upload/v1beta/files?key={}", self.base_url, self.api_key);
        let metadata = serde_json::json!({ "file": { "display_name": display_name } });

        let start = self
            .client
            .post(&start_url)
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", bytes.len())
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .json(&metadata)
            .send()
            .await
            .map_err(|e| upload_err(e.to_string()))?;

        if !start.status().is_success() {
            return Err(upload_err(format!("status {}", start.status())));
        }

        let upload_url = start
            .headers()
            .get("x-goog-upload-url")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| upload_err("missing upload session URL".to_string()))?;

        let response = self
            .client
            .post(&upload_url)
            .header("X-Goog-Upload-Command", "upload, finalize")
            .header("X-Goog-Upload-Offset", "0")
            .body(bytes)
            .send()
            .await
            .map_err(|e| upload_err(e.to_string()))?;

        if !response.status().is_success() {
            return Err(upload_err(format!("status {}", response.status())));
        }

        let uploaded: UploadResponse = response
            .json()
            .await
            .map_err(|e| upload_err(e.to_string()))?;
        Ok(uploaded.file)
    }

    async fn generate(&self, model: &str, parts: Vec<Part>) -> Result<String, GeminiError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, model, self.api_key
        );

        let request = GenerateRequest {
            contents: vec![Content { parts }],
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| GeminiError::Generation(e.to_string()))?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(GeminiError::RateLimited);
        }

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(GeminiError::Generation(format!("{}: {}", status, text)));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| GeminiError::Generation(e.to_string()))?;

        let text = body
            .candidates
            .into_iter()
            .next()
            .map(|c| {
                c.content
                    .parts
                    .into_iter()
                    .map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .ok_or_else(|| GeminiError::Generation("response contained no candidates".to_string()))?;

        Ok(text)
    }
}
