//! Session controller
//!
//! One long-lived actor owns all transient session state: the interview and
//! scraping flags, the chat transcript, the latest code snapshot, and the
//! active capture handle. Frontends and background tasks talk to it through
//! [`Command`] messages; UI-relevant effects come back on a broadcast
//! [`UiEvent`] channel. Because every command is handled to completion before
//! the next, state is never observed mid-flight.

use crate::api::{BackendClient, ChatContext};
use crate::audio::{self, AudioCaptureHandle, SpeechPlayer};
use crate::config::Config;
use crate::events::{ConnectionState, NoticeLevel, UiEvent};
use crate::push::PushMessage;
use crate::transcript::{ChatRole, Transcript};
use chrono::{DateTime, Local, Utc};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

/// Operations on the session, sent by frontends and internal tasks
#[derive(Debug)]
pub(crate) enum Command {
    StartInterview { interview_type: String },
    StopInterview,
    StartRecording,
    StopRecording,
    /// Chat message, typed or voice-derived
    SendMessage { text: String },
    ManualScrape { url: String },
    ToggleAutoScrape { url: String, interval: u64 },
    SetVolume { level: f32 },
    /// Ask the push task to leave the offline state
    Reconnect,
    /// Notification delivered over the push channel
    Push(PushMessage),
    /// Push channel state transition
    Connection(ConnectionState),
    /// A recording span finished draining; samples are ready for upload
    CaptureFinished { samples: Vec<i16>, sample_rate: u32 },
    Shutdown,
}

pub(crate) struct SessionController {
    config: Config,
    api: Arc<BackendClient>,
    player: SpeechPlayer,
    /// For background tasks to feed results back through the actor
    cmd_tx: mpsc::Sender<Command>,
    event_tx: broadcast::Sender<UiEvent>,
    reconnect_tx: mpsc::Sender<()>,

    interview_active: bool,
    interview_type: String,
    session_id: Option<String>,
    auto_scraping: bool,
    capture: Option<AudioCaptureHandle>,
    transcript: Transcript,
    code_snapshot: String,
    code_updated_at: Option<DateTime<Local>>,
    volume: f32,
}

impl SessionController {
    pub(crate) fn new(
        config: Config,
        api: Arc<BackendClient>,
        player: SpeechPlayer,
        cmd_tx: mpsc::Sender<Command>,
        event_tx: broadcast::Sender<UiEvent>,
        reconnect_tx: mpsc::Sender<()>,
    ) -> Self {
        let interview_type = config.interview.default_type.clone();
        let volume = config.speech.volume.clamp(0.0, 1.0);
        Self {
            config,
            api,
            player,
            cmd_tx,
            event_tx,
            reconnect_tx,
            interview_active: false,
            interview_type,
            session_id: None,
            auto_scraping: false,
            capture: None,
            transcript: Transcript::default(),
            code_snapshot: String::new(),
            code_updated_at: None,
            volume,
        }
    }

    /// Handle commands until shutdown or until every sender is gone
    pub(crate) async fn run(mut self, mut cmd_rx: mpsc::Receiver<Command>) {
        info!("Session controller started");
        while let Some(command) = cmd_rx.recv().await {
            if matches!(command, Command::Shutdown) {
                break;
            }
            self.handle(command).await;
        }
        info!("Session controller stopped");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::StartInterview { interview_type } => {
                self.start_interview(interview_type).await;
            }
            Command::StopInterview => self.stop_interview(),
            Command::StartRecording => self.start_recording(),
            Command::StopRecording => self.stop_recording(),
            Command::SendMessage { text } => self.send_message(text).await,
            Command::ManualScrape { url } => self.manual_scrape(url).await,
            Command::ToggleAutoScrape { url, interval } => {
                self.toggle_auto_scrape(url, interval).await;
            }
            Command::SetVolume { level } => self.set_volume(level),
            Command::Reconnect => {
                if self.reconnect_tx.try_send(()).is_ok() {
                    self.notice(NoticeLevel::Info, "Reconnecting to backend...");
                }
            }
            Command::Push(message) => self.handle_push(message),
            Command::Connection(state) => self.handle_connection(state),
            Command::CaptureFinished {
                samples,
                sample_rate,
            } => self.process_recording(samples, sample_rate),
            Command::Shutdown => {}
        }
    }

    // ----- interview lifecycle -----

    async fn start_interview(&mut self, interview_type: String) {
        if self.interview_active {
            self.notice(NoticeLevel::Warning, "Interview is already running");
            return;
        }
        match self.api.start_interview(&interview_type).await {
            Ok(started) => {
                self.interview_active = true;
                self.interview_type = interview_type;
                self.session_id = started.session_id;
                self.emit(UiEvent::InterviewActive(true));
                self.append_entry(ChatRole::Assistant, &started.welcome_message);
                self.speak(&started.welcome_message);
                self.notice(NoticeLevel::Success, "Interview started");
            }
            Err(e) => {
                error!("Failed to start interview: {}", e);
                self.notice(NoticeLevel::Error, "Could not start interview");
            }
        }
    }

    /// Purely local: sessions are client-only and the backend exposes no
    /// end-session endpoint, so no request is sent.
    fn stop_interview(&mut self) {
        if !self.interview_active {
            return;
        }
        info!(session_id = ?self.session_id, "Interview ended");
        self.interview_active = false;
        self.session_id = None;
        self.emit(UiEvent::InterviewActive(false));
        self.notice(NoticeLevel::Info, "Interview ended");
    }

    // ----- recording -----

    fn start_recording(&mut self) {
        if self.capture.is_some() {
            warn!("Recording already in progress");
            return;
        }
        match audio::start_capture() {
            Ok((handle, mut chunk_rx)) => {
                self.capture = Some(handle);
                self.emit(UiEvent::RecordingActive(true));

                // Drain the span into one ordered buffer; the channel closes
                // when the capture handle is stopped.
                let cmd_tx = self.cmd_tx.clone();
                tokio::spawn(async move {
                    let mut samples = Vec::new();
                    let mut sample_rate = audio::STT_SAMPLE_RATE;
                    while let Some(chunk) = chunk_rx.recv().await {
                        sample_rate = chunk.sample_rate;
                        samples.extend_from_slice(&chunk.samples);
                    }
                    let _ = cmd_tx
                        .send(Command::CaptureFinished {
                            samples,
                            sample_rate,
                        })
                        .await;
                });
            }
            Err(e) => {
                error!("Failed to start recording: {}", e);
                self.notice(
                    NoticeLevel::Error,
                    format!("Could not start recording: {e}"),
                );
            }
        }
    }

    /// No-op when not recording
    fn stop_recording(&mut self) {
        let Some(mut handle) = self.capture.take() else {
            debug!("Stop recording requested but no capture is active");
            return;
        };
        // Joining the capture thread blocks briefly; keep it off the actor
        tokio::task::spawn_blocking(move || handle.stop());
        self.emit(UiEvent::RecordingActive(false));
    }

    /// Encode the finished span and submit it for transcription. On success
    /// the text re-enters the actor through the chat-send path.
    fn process_recording(&mut self, samples: Vec<i16>, sample_rate: u32) {
        if samples.is_empty() {
            warn!("Discarding empty recording");
            return;
        }
        self.notice(NoticeLevel::Info, "Processing speech...");

        let api = self.api.clone();
        let cmd_tx = self.cmd_tx.clone();
        let event_tx = self.event_tx.clone();
        tokio::spawn(async move {
            let wav = match audio::wav::encode_wav(&samples, sample_rate) {
                Ok(wav) => wav,
                Err(e) => {
                    error!("Failed to encode recording: {}", e);
                    let _ = event_tx.send(UiEvent::Notice {
                        level: NoticeLevel::Error,
                        message: "Could not encode recording".to_string(),
                    });
                    return;
                }
            };
            match api.transcribe(wav).await {
                Ok(text) => {
                    let _ = cmd_tx.send(Command::SendMessage { text }).await;
                }
                Err(e) => {
                    error!("Speech transcription failed: {}", e);
                    let _ = event_tx.send(UiEvent::Notice {
                        level: NoticeLevel::Error,
                        message: "Speech processing failed".to_string(),
                    });
                }
            }
        });
    }

    // ----- chat -----

    /// Chat is only available inside an interview; voice-derived messages go
    /// through the same gate, so a transcription that lands after the
    /// interview ended is dropped rather than sent.
    async fn send_message(&mut self, text: String) {
        let message = text.trim();
        if message.is_empty() {
            return;
        }
        if !self.interview_active {
            self.notice(NoticeLevel::Warning, "Start an interview first");
            return;
        }
        let message = message.to_string();

        // Optimistic: the user entry is shown before the backend confirms
        self.append_entry(ChatRole::User, &message);

        let context = ChatContext {
            current_code: self.code_snapshot.clone(),
            timestamp: Utc::now().to_rfc3339(),
        };
        match self.api.chat(&message, &self.interview_type, context).await {
            Ok(reply) => {
                self.append_entry(ChatRole::Assistant, &reply);
                self.speak(&reply);
            }
            Err(e) => {
                error!("Failed to send chat message: {}", e);
                self.notice(NoticeLevel::Error, "Could not send message");
                self.emit(UiEvent::DeliveryFailed { content: message });
            }
        }
    }

    // ----- scraping -----

    async fn manual_scrape(&mut self, url: String) {
        let url = url.trim().to_string();
        if url.is_empty() {
            self.notice(NoticeLevel::Warning, "Enter a scrape target URL first");
            return;
        }
        self.notice(NoticeLevel::Info, "Scraping code...");
        let platform = self.config.scraper.platform.clone();
        match self.api.manual_scrape(&url, &platform).await {
            Ok(code) => {
                self.update_code(code);
                self.notice(NoticeLevel::Success, "Code scraped");
            }
            Err(e) => {
                error!("Manual scrape failed: {}", e);
                self.notice(NoticeLevel::Error, "Code scrape failed");
            }
        }
    }

    async fn toggle_auto_scrape(&mut self, url: String, interval: u64) {
        if !self.auto_scraping {
            let url = url.trim().to_string();
            if url.is_empty() {
                self.notice(NoticeLevel::Warning, "Enter a scrape target URL first");
                return;
            }
            let platform = self.config.scraper.platform.clone();
            match self.api.auto_scrape_start(&url, interval, &platform).await {
                Ok(()) => {
                    self.auto_scraping = true;
                    self.emit(UiEvent::AutoScrapeActive(true));
                    self.notice(NoticeLevel::Success, "Auto scraping started");
                }
                Err(e) => {
                    error!("Failed to start auto scraping: {}", e);
                    self.notice(NoticeLevel::Error, "Could not start auto scraping");
                }
            }
        } else {
            // The local flag flips regardless of the stop outcome; an
            // unacknowledged stop is still surfaced so the divergence from
            // backend state is visible.
            match self.api.auto_scrape_stop().await {
                Ok(()) => {
                    self.notice(NoticeLevel::Info, "Auto scraping stopped");
                }
                Err(e) => {
                    warn!("Auto scrape stop was not acknowledged: {}", e);
                    self.notice(
                        NoticeLevel::Warning,
                        "Auto scraping stop was not acknowledged by the backend",
                    );
                }
            }
            self.auto_scraping = false;
            self.emit(UiEvent::AutoScrapeActive(false));
        }
    }

    // ----- speech & volume -----

    /// Fire-and-forget synthesis; failures are logged, never surfaced.
    /// Volume is applied by the playback thread when the utterance starts,
    /// so a change made during the synthesis round trip still takes effect.
    fn speak(&self, text: &str) {
        let api = self.api.clone();
        let player = self.player.clone();
        let text = text.to_string();
        tokio::spawn(async move {
            match api.synthesize(&text).await {
                Ok(bytes) => player.play(bytes),
                Err(e) => {
                    error!("Speech synthesis failed: {}", e);
                }
            }
        });
    }

    fn set_volume(&mut self, level: f32) {
        self.volume = level.clamp(0.0, 1.0);
        self.player.set_volume(self.volume);
        self.emit(UiEvent::VolumeChanged(self.volume));
    }

    // ----- push notifications -----

    fn handle_push(&mut self, message: PushMessage) {
        match message {
            PushMessage::ScrapeResult { data } => {
                self.update_code(data.code);
            }
            PushMessage::ChatResponse { content } => {
                self.append_entry(ChatRole::Assistant, &content);
                self.speak(&content);
            }
        }
    }

    fn handle_connection(&mut self, state: ConnectionState) {
        match state {
            ConnectionState::Connected => {
                self.notice(NoticeLevel::Success, "Connected to backend");
            }
            ConnectionState::Lost => {
                self.notice(NoticeLevel::Warning, "Connection to backend lost");
            }
            ConnectionState::Reconnecting { attempt } => {
                debug!("Reconnecting to backend (attempt {})", attempt);
            }
            ConnectionState::Offline => {
                self.notice(
                    NoticeLevel::Error,
                    "Backend unreachable - use /reconnect to retry",
                );
            }
        }
        self.emit(UiEvent::Connection(state));
    }

    // ----- shared state updates -----

    /// Replace the code snapshot. An empty result still refreshes the
    /// last-update timestamp, matching the scrape feed's contract.
    fn update_code(&mut self, code: String) {
        if !code.is_empty() {
            self.code_snapshot = code;
        }
        let at = *self.code_updated_at.insert(Local::now());
        self.emit(UiEvent::CodeUpdated {
            code: self.code_snapshot.clone(),
            at,
        });
    }

    fn append_entry(&mut self, role: ChatRole, content: &str) {
        let entry = self.transcript.append(role, content);
        self.emit(UiEvent::Transcript(entry));
    }

    fn emit(&self, event: UiEvent) {
        // No subscribers is fine, e.g. during tests
        let _ = self.event_tx.send(event);
    }

    fn notice(&self, level: NoticeLevel, message: impl Into<String>) {
        self.emit(UiEvent::Notice {
            level,
            message: message.into(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::push::ScrapePayload;

    struct Harness {
        controller: SessionController,
        events: broadcast::Receiver<UiEvent>,
        _cmd_rx: mpsc::Receiver<Command>,
        _reconnect_rx: mpsc::Receiver<()>,
    }

    fn harness() -> Harness {
        harness_with(|_| {})
    }

    /// Harness with the default config tweaked, e.g. pointed at a dead port
    /// so backend calls fail fast instead of reaching a local service.
    fn harness_with(tweak: impl FnOnce(&mut Config)) -> Harness {
        let mut config: Config =
            toml::from_str(include_str!("../config.toml")).expect("defaults must parse");
        tweak(&mut config);
        let api = Arc::new(BackendClient::new(&config).expect("client builds"));
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (event_tx, events) = broadcast::channel(64);
        let (reconnect_tx, reconnect_rx) = mpsc::channel(1);
        let controller = SessionController::new(
            config,
            api,
            SpeechPlayer::spawn(1.0),
            cmd_tx,
            event_tx,
            reconnect_tx,
        );
        Harness {
            controller,
            events,
            _cmd_rx: cmd_rx,
            _reconnect_rx: reconnect_rx,
        }
    }

    fn drain(events: &mut broadcast::Receiver<UiEvent>) -> Vec<UiEvent> {
        let mut collected = Vec::new();
        while let Ok(event) = events.try_recv() {
            collected.push(event);
        }
        collected
    }

    #[tokio::test]
    async fn test_empty_message_is_silently_ignored() {
        let mut h = harness();
        h.controller
            .handle(Command::SendMessage {
                text: "   \t ".to_string(),
            })
            .await;
        assert_eq!(h.controller.transcript.len(), 0);
        assert!(drain(&mut h.events).is_empty());
    }

    #[tokio::test]
    async fn test_chat_is_rejected_outside_an_interview() {
        let mut h = harness();
        h.controller
            .handle(Command::SendMessage {
                text: "hello".to_string(),
            })
            .await;
        // No user entry, no backend round trip, just the warning
        assert_eq!(h.controller.transcript.len(), 0);
        let events = drain(&mut h.events);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            UiEvent::Notice {
                level: NoticeLevel::Warning,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_empty_scrape_url_warns_without_request() {
        let mut h = harness();
        h.controller
            .handle(Command::ManualScrape {
                url: "  ".to_string(),
            })
            .await;
        let events = drain(&mut h.events);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            UiEvent::Notice {
                level: NoticeLevel::Warning,
                ..
            }
        ));
        assert!(h.controller.code_updated_at.is_none());
    }

    #[tokio::test]
    async fn test_auto_scrape_start_requires_url() {
        let mut h = harness();
        h.controller
            .handle(Command::ToggleAutoScrape {
                url: String::new(),
                interval: 30,
            })
            .await;
        assert!(!h.controller.auto_scraping);
        let events = drain(&mut h.events);
        assert!(matches!(
            &events[0],
            UiEvent::Notice {
                level: NoticeLevel::Warning,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_auto_scrape_stop_flips_flag_even_when_unacknowledged() {
        // Port 1 refuses connections, so the stop request fails
        let mut h = harness_with(|config| {
            config.backend.base_url = "http://127.0.0.1:1".to_string();
        });
        h.controller.auto_scraping = true;
        h.controller
            .handle(Command::ToggleAutoScrape {
                url: String::new(),
                interval: 30,
            })
            .await;

        assert!(!h.controller.auto_scraping);
        let events = drain(&mut h.events);
        assert!(events
            .iter()
            .any(|e| matches!(e, UiEvent::AutoScrapeActive(false))));
        assert!(events.iter().any(|e| matches!(
            e,
            UiEvent::Notice {
                level: NoticeLevel::Warning,
                ..
            }
        )));
    }

    #[tokio::test]
    async fn test_stop_interview_is_local_and_idempotent() {
        let mut h = harness();
        // Inactive: nothing happens
        h.controller.handle(Command::StopInterview).await;
        assert!(drain(&mut h.events).is_empty());

        // Active: flips, emits, no backend call involved
        h.controller.interview_active = true;
        h.controller.session_id = Some("abc".to_string());
        h.controller.handle(Command::StopInterview).await;
        assert!(!h.controller.interview_active);
        assert!(h.controller.session_id.is_none());
        let events = drain(&mut h.events);
        assert!(events
            .iter()
            .any(|e| matches!(e, UiEvent::InterviewActive(false))));
    }

    #[tokio::test]
    async fn test_stop_recording_without_capture_is_noop() {
        let mut h = harness();
        h.controller.handle(Command::StopRecording).await;
        assert!(drain(&mut h.events).is_empty());
    }

    #[tokio::test]
    async fn test_scrape_result_replaces_snapshot_and_bumps_timestamp() {
        let mut h = harness();
        h.controller
            .handle(Command::Push(PushMessage::ScrapeResult {
                data: ScrapePayload {
                    code: "def f(): pass".to_string(),
                },
            }))
            .await;
        assert_eq!(h.controller.code_snapshot, "def f(): pass");
        let first_update = h.controller.code_updated_at.expect("timestamp set");

        let events = drain(&mut h.events);
        assert!(events.iter().any(|e| matches!(
            e,
            UiEvent::CodeUpdated { code, .. } if code == "def f(): pass"
        )));

        // Empty push keeps the code but refreshes the timestamp
        h.controller
            .handle(Command::Push(PushMessage::ScrapeResult {
                data: ScrapePayload {
                    code: String::new(),
                },
            }))
            .await;
        assert_eq!(h.controller.code_snapshot, "def f(): pass");
        assert!(h.controller.code_updated_at.expect("timestamp set") >= first_update);
    }

    #[tokio::test]
    async fn test_chat_response_appends_exactly_one_assistant_entry() {
        let mut h = harness();
        h.controller
            .handle(Command::Push(PushMessage::ChatResponse {
                content: "Hello".to_string(),
            }))
            .await;
        assert_eq!(h.controller.transcript.len(), 1);
        let entry = &h.controller.transcript.entries()[0];
        assert_eq!(entry.role, ChatRole::Assistant);
        assert_eq!(entry.content, "Hello");

        let events = drain(&mut h.events);
        let appended = events
            .iter()
            .filter(|e| matches!(e, UiEvent::Transcript(_)))
            .count();
        assert_eq!(appended, 1);
    }

    #[tokio::test]
    async fn test_volume_is_clamped() {
        let mut h = harness();
        h.controller
            .handle(Command::SetVolume { level: 2.5 })
            .await;
        assert_eq!(h.controller.volume, 1.0);
        h.controller
            .handle(Command::SetVolume { level: -0.5 })
            .await;
        assert_eq!(h.controller.volume, 0.0);
        let events = drain(&mut h.events);
        assert!(events
            .iter()
            .any(|e| matches!(e, UiEvent::VolumeChanged(v) if *v == 0.0)));
    }

    #[tokio::test]
    async fn test_connection_states_surface_notices() {
        let mut h = harness();
        h.controller
            .handle(Command::Connection(ConnectionState::Offline))
            .await;
        let events = drain(&mut h.events);
        assert!(events.iter().any(|e| matches!(
            e,
            UiEvent::Notice {
                level: NoticeLevel::Error,
                ..
            }
        )));
        assert!(events
            .iter()
            .any(|e| matches!(e, UiEvent::Connection(ConnectionState::Offline))));
    }
}
