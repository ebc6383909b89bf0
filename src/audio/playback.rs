//! Speech playback
//!
//! Synthesized utterances play on a dedicated thread; each utterance gets its
//! own sink, so overlapping playback is concurrent, not queued. Volume
//! changes fan out to every sink still playing and apply to future ones.

use rodio::{Decoder, OutputStream, Sink};
use std::io::Cursor;
use std::sync::mpsc::{self, Sender};
use std::thread;
use tracing::{debug, warn};

enum PlayerMessage {
    Play(Vec<u8>),
    SetVolume(f32),
}

/// Handle to the playback thread
#[derive(Clone)]
pub struct SpeechPlayer {
    tx: Sender<PlayerMessage>,
}

impl SpeechPlayer {
    /// Spawn the playback thread. A missing output device disables playback
    /// until one appears; it is retried on each utterance. The thread owns
    /// the current volume, so each utterance starts at whatever volume was
    /// last set, not the one in effect when synthesis was requested.
    pub fn spawn(initial_volume: f32) -> Self {
        let (tx, rx) = mpsc::channel::<PlayerMessage>();
        thread::spawn(move || {
            let mut output = OutputStream::try_default().ok();
            if output.is_none() {
                warn!("Audio output unavailable; speech playback disabled until a device appears");
            }
            let mut active_sinks: Vec<Sink> = Vec::new();
            let mut current_volume = initial_volume;

            while let Ok(message) = rx.recv() {
                active_sinks.retain(|sink| !sink.empty());

                match message {
                    PlayerMessage::SetVolume(volume) => {
                        current_volume = volume;
                        for sink in &active_sinks {
                            sink.set_volume(volume);
                        }
                    }
                    PlayerMessage::Play(bytes) => {
                        if output.is_none() {
                            output = OutputStream::try_default().ok();
                            if output.is_none() {
                                continue;
                            }
                        }
                        let Some((_, handle)) = output.as_ref() else {
                            continue;
                        };

                        let decoder = match Decoder::new(Cursor::new(bytes)) {
                            Ok(decoder) => decoder,
                            Err(e) => {
                                debug!("Failed to decode synthesized audio: {}", e);
                                continue;
                            }
                        };
                        let sink = match Sink::try_new(handle) {
                            Ok(sink) => sink,
                            Err(e) => {
                                debug!("Failed to open playback sink: {}", e);
                                continue;
                            }
                        };
                        sink.set_volume(current_volume);
                        sink.append(decoder);
                        active_sinks.push(sink);
                    }
                }
            }
        });
        Self { tx }
    }

    /// Play an utterance at the current volume; concurrent with anything
    /// already playing.
    pub fn play(&self, bytes: Vec<u8>) {
        let _ = self.tx.send(PlayerMessage::Play(bytes));
    }

    /// Apply a volume to every utterance currently playing and to future ones
    pub fn set_volume(&self, volume: f32) {
        let _ = self.tx.send(PlayerMessage::SetVolume(volume));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Runs without an output device; the thread must stay alive and keep
    // accepting messages either way.
    #[test]
    fn test_volume_change_between_spawn_and_play_is_accepted() {
        let player = SpeechPlayer::spawn(0.8);
        player.set_volume(0.2);
        player.play(vec![0u8; 16]);
        player.set_volume(1.0);
        std::thread::sleep(std::time::Duration::from_millis(50));
        player.play(Vec::new());
    }
}
