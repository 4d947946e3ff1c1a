//! memoscribe binary: a minimal line-command front end over the session.
//!
//! Single-letter commands map onto the session's public operations:
//! s=start, t=stop, p=pause, r=resume, y=copy, l=clear, a <title>=archive,
//! e=export CSV to stdout, q/esc=cancel-and-quit.

use std::io::BufRead;

use memoscribe::platform::PlatformCapabilities;
use memoscribe::settings::load_settings;
use memoscribe::{Event, Session};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Load .env in development so the API key can live outside the shell.
    let _ = dotenvy::dotenv();
    env_logger::init();

    let api_key = std::env::var("SCRIBE_API_KEY").unwrap_or_default();
    if api_key.is_empty() {
        log::warn!("SCRIBE_API_KEY is not set; transcription will fail to connect");
    }

    let settings = load_settings();
    let caps = PlatformCapabilities::detect();

    let session = match Session::start(settings, caps, api_key) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("Failed to open archive: {}", e);
            std::process::exit(1);
        }
    };

    println!("memoscribe ready. Commands: s=start t=stop p=pause r=resume y=copy l=clear a <title>=archive e=export q=quit");

    let (line_tx, mut line_rx) = tokio::sync::mpsc::channel::<String>(8);
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if line_tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    let mut ui = session.ui();
    loop {
        tokio::select! {
            changed = ui.changed() => {
                if changed.is_ok() {
                    let state = ui.borrow().clone();
                    println!("[{}]", serde_json::to_string(&state).unwrap_or_default());
                }
            }
            line = line_rx.recv() => {
                let Some(line) = line else { break };
                let line = line.trim();
                match line.split_whitespace().next().unwrap_or("") {
                    "s" => session.send(Event::StartRequested).await,
                    "t" => session.send(Event::StopRequested).await,
                    "p" => session.send(Event::PauseRequested).await,
                    "r" => session.send(Event::ResumeRequested).await,
                    "y" => session.send(Event::CopyRequested).await,
                    "l" => session.send(Event::ClearRequested).await,
                    "a" => {
                        let title = line.strip_prefix('a').unwrap_or("").trim().to_string();
                        session
                            .send(Event::ArchiveRequested {
                                title,
                                category: "Note".to_string(),
                                is_important: false,
                                has_consent: true,
                            })
                            .await;
                    }
                    "e" => {
                        let csv = session.archive().lock().unwrap().export();
                        println!("{}", csv);
                    }
                    "" => {
                        // Show the current transcript on bare Enter.
                        let transcript = session.transcript();
                        let partial = session.partial();
                        println!("transcript: {}", transcript);
                        if !partial.is_empty() {
                            println!("partial:    {}", partial);
                        }
                    }
                    "q" | "\u{1b}" => {
                        session.send(Event::CancelRequested).await;
                        break;
                    }
                    other => println!("Unknown command: {}", other),
                }
            }
        }
    }

    session.shutdown().await;
}
