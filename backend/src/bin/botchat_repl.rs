//! Terminal chat driver
//!
//! Drives the reconciler from stdin using the same configuration as the
//! server. Plain lines are sent as messages; commands start with `/`.

use anyhow::Context;
use botchat_backend::config::Config;
use botchat_backend::gateway::UploadFile;
use botchat_backend::reconciler::{ReconcilerConfig, ReconcilerEvent};
use botchat_backend::state::AppState;
use std::io::Write;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::{wrappers::BroadcastStream, StreamExt};

const HELP: &str = "\
Commands:
  /sessions         list sessions
  /select <n>       open session n
  /new [n]          new session with expert n (default 1)
  /delete <n>       delete session n
  /experts          list experts
  /attach <path>    attach a file to the next message
  /quit             exit
Anything else is sent as a message.";

fn media_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("pdf") => "application/pdf",
        Some("txt") | Some("md") => "text/plain",
        _ => "application/octet-stream",
    }
}

/// Parse a 1-based index argument
fn index_arg(arg: Option<&str>, len: usize) -> Option<usize> {
    let n: usize = arg?.trim().parse().ok()?;
    (1..=len).contains(&n).then(|| n - 1)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env();
    let state = AppState::from_config(&config).await?;
    let reconciler = state.reconciler(ReconcilerConfig::from(&config.sync));

    // Print assistant text as it streams; lagged receivers skip ahead
    let mut events = BroadcastStream::new(reconciler.subscribe());
    tokio::spawn(async move {
        while let Some(event) = events.next().await {
            if let Ok(ReconcilerEvent::TextDelta { delta, .. }) = event {
                print!("{}", delta);
                let _ = std::io::stdout().flush();
            }
        }
    });

    reconciler.bootstrap().await.context("Failed to load sessions")?;
    println!("{}\n", HELP);

    let mut pending_files: Vec<UploadFile> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        let (command, arg) = match line.split_once(' ') {
            Some((c, a)) => (c, Some(a)),
            None => (line, None),
        };
        let snapshot = reconciler.snapshot().await;

        let result = match command {
            "" => Ok(()),
            "/quit" => break,
            "/help" => {
                println!("{}", HELP);
                Ok(())
            }
            "/experts" => {
                for (i, expert) in snapshot.experts.iter().enumerate() {
                    println!("{:>3}. {} ({})", i + 1, expert.name, expert.agent_name);
                }
                Ok(())
            }
            "/sessions" => {
                for (i, session) in snapshot.sessions.iter().enumerate() {
                    let marker = if snapshot.active_session_id.as_deref() == Some(&session.id) {
                        "*"
                    } else {
                        " "
                    };
                    println!(
                        "{}{:>3}. {} - {}",
                        marker,
                        i + 1,
                        session.title,
                        session.last_message.as_deref().unwrap_or("")
                    );
                }
                Ok(())
            }
            "/select" => match index_arg(arg, snapshot.sessions.len()) {
                Some(i) => {
                    let result = reconciler.select_session(&snapshot.sessions[i].id).await;
                    for message in reconciler.snapshot().await.messages {
                        println!("[{}] {}", message.role.as_str(), message.text());
                    }
                    result
                }
                None => {
                    println!("No such session");
                    Ok(())
                }
            },
            "/new" => {
                let index = match arg {
                    Some(_) => index_arg(arg, snapshot.experts.len()),
                    None => (!snapshot.experts.is_empty()).then_some(0),
                };
                match index {
                    Some(i) => reconciler
                        .create_session(&snapshot.experts[i].id)
                        .await
                        .map(|session| println!("Opened {}", session.id)),
                    None => {
                        println!("No such expert");
                        Ok(())
                    }
                }
            }
            "/delete" => match index_arg(arg, snapshot.sessions.len()) {
                Some(i) => reconciler.delete_session(&snapshot.sessions[i].id).await,
                None => {
                    println!("No such session");
                    Ok(())
                }
            },
            "/attach" => {
                let Some(path) = arg.map(str::trim) else {
                    println!("Usage: /attach <path>");
                    continue;
                };
                let path = Path::new(path);
                let data = match tokio::fs::read(path).await {
                    Ok(data) => data,
                    Err(e) => {
                        eprintln!("Failed to read {}: {}", path.display(), e);
                        continue;
                    }
                };
                pending_files.push(UploadFile {
                    filename: path
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_else(|| "file".to_string()),
                    media_type: media_type_for(path).to_string(),
                    data,
                });
                println!("{} file(s) attached", pending_files.len());
                Ok(())
            }
            _ => {
                let files = std::mem::take(&mut pending_files);
                let result = reconciler.submit_message(line, files).await;
                println!();
                result
            }
        };

        if let Err(e) = result {
            eprintln!("Error: {}", e);
        }
    }

    reconciler.wait_for_sync().await;
    reconciler.shutdown().await;
    Ok(())
}
