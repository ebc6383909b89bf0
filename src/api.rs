//! Backend REST client
//!
//! One thin client over the interview backend's JSON endpoints. Every call is
//! a single request/response exchange; the backend wraps results in a
//! `success` flag, which maps to [`ApiError::Rejected`] so call sites handle
//! refusals and transport failures the same way.

use crate::config::{Config, InterviewConfig};
use crate::error::ApiError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Overall request timeout; a hung backend must not wedge an operation forever
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the interview backend REST API
pub(crate) struct BackendClient {
    base_url: String,
    candidate: InterviewConfig,
    tts_voice: Option<String>,
    tts_speed: Option<f64>,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
pub(crate) struct StartInterviewRequest {
    pub interview_type: String,
    pub candidate_name: String,
    pub position: String,
}

#[derive(Debug, Deserialize)]
struct StartInterviewResponse {
    success: bool,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    welcome_message: String,
}

/// Acknowledged start-interview result
#[derive(Debug)]
pub(crate) struct InterviewStarted {
    pub session_id: Option<String>,
    pub welcome_message: String,
}

/// Context forwarded with each chat turn: the code currently on display
#[derive(Debug, Serialize)]
pub(crate) struct ChatContext {
    pub current_code: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatRequest {
    pub message: String,
    pub interview_type: String,
    pub context: ChatContext,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    success: bool,
    #[serde(default)]
    response: String,
}

#[derive(Debug, Deserialize)]
struct SttResponse {
    success: bool,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
struct TtsRequest<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    voice: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    speed: Option<f64>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ScrapeRequest {
    pub url: String,
    pub platform: String,
}

#[derive(Debug, Deserialize)]
struct ScrapeResponse {
    success: bool,
    #[serde(default)]
    code: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct AutoScrapeStartRequest {
    pub url: String,
    pub interval: u64,
    pub platform: String,
}

#[derive(Debug, Deserialize)]
struct AckResponse {
    success: bool,
}

impl BackendClient {
    pub(crate) fn new(config: &Config) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            base_url: config.backend.base_url.trim_end_matches('/').to_string(),
            candidate: config.interview.clone(),
            tts_voice: config.speech.voice.clone(),
            tts_speed: config.speech.speed,
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, ApiError>
    where
        B: Serialize,
        R: DeserializeOwned,
    {
        let response = self.client.post(self.url(path)).json(body).send().await?;
        Self::read_json(response).await
    }

    async fn read_json<R: DeserializeOwned>(response: reqwest::Response) -> Result<R, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ApiError::ServerError {
                status: status.as_u16(),
                message,
            });
        }
        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }

    /// Begin an interview session with the configured candidate identity.
    pub(crate) async fn start_interview(
        &self,
        interview_type: &str,
    ) -> Result<InterviewStarted, ApiError> {
        let body = StartInterviewRequest {
            interview_type: interview_type.to_string(),
            candidate_name: self.candidate.candidate_name.clone(),
            position: self.candidate.position.clone(),
        };
        let response: StartInterviewResponse =
            self.post_json("/api/llm/start-interview", &body).await?;
        if !response.success {
            return Err(ApiError::Rejected("interview not started".into()));
        }
        Ok(InterviewStarted {
            session_id: response.session_id,
            welcome_message: response.welcome_message,
        })
    }

    /// One chat turn: the message plus the current code snapshot as context.
    pub(crate) async fn chat(
        &self,
        message: &str,
        interview_type: &str,
        context: ChatContext,
    ) -> Result<String, ApiError> {
        let body = ChatRequest {
            message: message.to_string(),
            interview_type: interview_type.to_string(),
            context,
        };
        let response: ChatResponse = self.post_json("/api/llm/chat", &body).await?;
        if !response.success {
            return Err(ApiError::Rejected("chat turn refused".into()));
        }
        Ok(response.response)
    }

    /// Upload one recording span as a multipart WAV for transcription.
    pub(crate) async fn transcribe(&self, wav_bytes: Vec<u8>) -> Result<String, ApiError> {
        let part = reqwest::multipart::Part::bytes(wav_bytes)
            .file_name("recording.wav")
            .mime_str("audio/wav")
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;
        let form = reqwest::multipart::Form::new().part("audio_file", part);

        let response = self
            .client
            .post(self.url("/api/speech/stt"))
            .multipart(form)
            .send()
            .await?;
        let response: SttResponse = Self::read_json(response).await?;
        if !response.success {
            return Err(ApiError::Rejected("transcription refused".into()));
        }
        Ok(response.text)
    }

    /// Synthesize speech; returns the raw audio payload on a 2xx response.
    pub(crate) async fn synthesize(&self, text: &str) -> Result<Vec<u8>, ApiError> {
        let body = TtsRequest {
            text,
            voice: self.tts_voice.as_deref(),
            speed: self.tts_speed,
        };
        let response = self
            .client
            .post(self.url("/api/speech/tts"))
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ApiError::ServerError {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.bytes().await?.to_vec())
    }

    /// One-shot scrape of the target URL; returns the scraped code text.
    pub(crate) async fn manual_scrape(&self, url: &str, platform: &str) -> Result<String, ApiError> {
        let body = ScrapeRequest {
            url: url.to_string(),
            platform: platform.to_string(),
        };
        let response: ScrapeResponse = self.post_json("/api/scraper/manual", &body).await?;
        if !response.success {
            return Err(ApiError::Rejected("scrape refused".into()));
        }
        Ok(response.code)
    }

    /// Ask the backend to start its polling loop for this client.
    pub(crate) async fn auto_scrape_start(
        &self,
        url: &str,
        interval: u64,
        platform: &str,
    ) -> Result<(), ApiError> {
        let body = AutoScrapeStartRequest {
            url: url.to_string(),
            interval,
            platform: platform.to_string(),
        };
        let response: AckResponse = self.post_json("/api/scraper/auto/start", &body).await?;
        if !response.success {
            return Err(ApiError::Rejected("auto scrape not started".into()));
        }
        Ok(())
    }

    /// Ask the backend to stop polling. The response body is not inspected;
    /// callers only need to know whether the request reached the backend.
    pub(crate) async fn auto_scrape_stop(&self) -> Result<(), ApiError> {
        let response = self
            .client
            .post(self.url("/api/scraper/auto/stop"))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ApiError::ServerError {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }

    /// Query the four service status endpoints concurrently and log the
    /// aggregate. Purely diagnostic; failures are logged and swallowed.
    pub(crate) async fn check_service_status(&self) {
        let (stt, tts, llm, scraper) = tokio::join!(
            self.fetch_status("/api/speech/stt/status"),
            self.fetch_status("/api/speech/tts/status"),
            self.fetch_status("/api/llm/status"),
            self.fetch_status("/api/scraper/status"),
        );
        info!(
            stt = %summarize(&stt),
            tts = %summarize(&tts),
            llm = %summarize(&llm),
            scraper = %summarize(&scraper),
            "Service status"
        );
    }

    async fn fetch_status(&self, path: &str) -> Result<serde_json::Value, ApiError> {
        let result: Result<serde_json::Value, ApiError> = async {
            let response = self.client.get(self.url(path)).send().await?;
            Self::read_json(response).await
        }
        .await;
        match &result {
            Ok(value) => debug!(path, %value, "Status probe"),
            Err(e) => warn!(path, "Status probe failed: {}", e),
        }
        result
    }
}

fn summarize(result: &Result<serde_json::Value, ApiError>) -> String {
    match result {
        Ok(value) => value.to_string(),
        Err(e) => format!("unavailable ({e})"),
    }
}
