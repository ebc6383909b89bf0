//! Line-based console frontend
//!
//! Stands in for the presentation layer: slash commands map to controller
//! operations and bare lines are chat messages. The console owns the "input
//! fields" - scrape target URL, polling interval, interview type - and passes
//! their values with each command, mirroring how a form-based frontend would.

use crate::config::Config;
use crate::controller::Command;
use crate::events::{ConnectionState, UiEvent};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

const HELP: &str = "\
commands:
  /start [type]     begin an interview (default type from config)
  /stop             end the interview (local only)
  /rec              start recording a voice answer
  /done             stop recording and send the transcription
  /url <url>        set the scrape target URL
  /every <secs>     set the auto-scrape interval
  /scrape           scrape the target URL once
  /auto             toggle automatic scraping
  /vol <0-100>      set playback volume
  /reconnect        retry the backend connection when offline
  /quit             exit
anything else is sent as a chat message";

/// Run the console until the user quits. Events render on stdout from a
/// separate task so pushes appear while the prompt waits.
pub(crate) async fn run(
    cmd_tx: mpsc::Sender<Command>,
    events: broadcast::Receiver<UiEvent>,
    config: &Config,
) -> anyhow::Result<()> {
    tokio::spawn(render_events(events));

    let mut target_url = String::new();
    let mut interval = config.scraper.default_interval_secs;
    let mut interview_type = config.interview.default_type.clone();

    println!("intervox - voice interview assistant ({})", config.backend.base_url);
    println!("type /help for commands");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix('/') {
            let mut parts = rest.split_whitespace();
            let command = parts.next().unwrap_or_default();
            let argument = parts.next().map(str::to_string);

            match command {
                "start" => {
                    if let Some(kind) = argument {
                        interview_type = kind;
                    }
                    cmd_tx
                        .send(Command::StartInterview {
                            interview_type: interview_type.clone(),
                        })
                        .await?;
                }
                "stop" => cmd_tx.send(Command::StopInterview).await?,
                "rec" => cmd_tx.send(Command::StartRecording).await?,
                "done" => cmd_tx.send(Command::StopRecording).await?,
                "url" => match argument {
                    Some(url) => {
                        target_url = url;
                        println!("scrape target: {target_url}");
                    }
                    None => println!("usage: /url <url>"),
                },
                "every" => match argument.as_deref().map(str::parse::<u64>) {
                    Some(Ok(secs)) => {
                        interval = secs;
                        println!("auto-scrape interval: {interval}s");
                    }
                    _ => println!("usage: /every <seconds>"),
                },
                "scrape" => {
                    cmd_tx
                        .send(Command::ManualScrape {
                            url: target_url.clone(),
                        })
                        .await?;
                }
                "auto" => {
                    cmd_tx
                        .send(Command::ToggleAutoScrape {
                            url: target_url.clone(),
                            interval,
                        })
                        .await?;
                }
                "vol" => match argument.as_deref().map(str::parse::<f32>) {
                    Some(Ok(percent)) => {
                        cmd_tx
                            .send(Command::SetVolume {
                                level: percent / 100.0,
                            })
                            .await?;
                    }
                    _ => println!("usage: /vol <0-100>"),
                },
                "reconnect" => cmd_tx.send(Command::Reconnect).await?,
                "help" => println!("{HELP}"),
                "quit" | "exit" => break,
                other => println!("unknown command /{other}, try /help"),
            }
        } else {
            cmd_tx.send(Command::SendMessage { text: line }).await?;
        }
    }

    // Also reached on stdin EOF; the controller stops either way
    let _ = cmd_tx.send(Command::Shutdown).await;
    Ok(())
}

/// Render controller events to stdout
async fn render_events(mut events: broadcast::Receiver<UiEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => render(event),
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                debug!("Console renderer lagged, {} events dropped", missed);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn render(event: UiEvent) {
    match event {
        UiEvent::Notice { level, message } => println!("[{level}] {message}"),
        UiEvent::Transcript(entry) => {
            println!(
                "{} {}: {}",
                entry.timestamp.format("%H:%M:%S"),
                entry.role,
                entry.content
            );
        }
        UiEvent::DeliveryFailed { content } => {
            println!("(!) not delivered: {content}");
        }
        UiEvent::CodeUpdated { code, at } => {
            println!("--- code (updated {}) ---", at.format("%H:%M:%S"));
            println!("{code}");
            println!("---");
        }
        UiEvent::InterviewActive(active) => {
            println!("interview: {}", if active { "active" } else { "idle" });
        }
        UiEvent::RecordingActive(recording) => {
            println!(
                "recording: {}",
                if recording { "on (/done to finish)" } else { "off" }
            );
        }
        UiEvent::AutoScrapeActive(active) => {
            println!("auto-scrape: {}", if active { "on" } else { "off" });
        }
        UiEvent::Connection(state) => match state {
            ConnectionState::Reconnecting { attempt } => {
                println!("connection: retrying (attempt {attempt})");
            }
            ConnectionState::Connected => println!("connection: up"),
            ConnectionState::Lost => println!("connection: lost"),
            ConnectionState::Offline => println!("connection: offline"),
        },
        UiEvent::VolumeChanged(volume) => {
            println!("volume: {}%", (volume * 100.0).round() as u32);
        }
    }
}
