//! The stdin/stdout control protocol loop (C14): reads one JSON command
//! per line, dispatches it against a [`Lifecycle`], and writes the
//! corresponding event/status/response lines (§6.1).
//!
//! Three concurrent tasks share one locked writer, exactly as the teacher's
//! `host/stdio.rs` structures its reader/event-forwarder/server split:
//! a reader that dispatches commands and writes responses, an event
//! forwarder draining `Lifecycle::subscribe_events`, and a status forwarder
//! draining `Lifecycle::subscribe_status`. Serializing every write behind
//! one `tokio::sync::Mutex` keeps concurrently-produced lines from
//! interleaving their bytes on stdout.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::host::protocol::{
    self, Command, Event, StatusBroadcast, compose_response, format_response, metrics_response,
    parse_format_kind, parse_rewrite_tone, proofread_response, rewrite_response, status_response,
    summarize_response,
};
use crate::lifecycle::Lifecycle;

/// Drive the control protocol over `stdin`/`stdout` until EOF or `cancel`
/// fires. Returns once the input stream closes. Spawns the event and status
/// forwarder tasks internally and aborts them before returning.
pub async fn run_stdio_bridge(
    lifecycle: Arc<Lifecycle>,
    stdin: impl tokio::io::AsyncRead + Unpin,
    stdout: impl AsyncWrite + Unpin + Send + 'static,
    cancel: CancellationToken,
) {
    let writer = Arc::new(Mutex::new(stdout));

    let event_writer = Arc::clone(&writer);
    let mut event_rx = lifecycle.subscribe_events();
    let event_cancel = cancel.clone();
    let event_task = tokio::spawn(async move {
        loop {
            let recv = tokio::select! {
                _ = event_cancel.cancelled() => break,
                recv = event_rx.recv() => recv,
            };
            match recv {
                Ok(event) => {
                    let line = event_line(&event);
                    let mut w = event_writer.lock().await;
                    if write_line(&mut *w, &line).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(n)) => warn!(lagged = n, "event forwarder lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let status_writer = Arc::clone(&writer);
    let mut status_rx = lifecycle.subscribe_status();
    let status_cancel = cancel.clone();
    let status_task = tokio::spawn(async move {
        loop {
            let recv = tokio::select! {
                _ = status_cancel.cancelled() => break,
                recv = status_rx.recv() => recv,
            };
            match recv {
                Ok(status) => {
                    let line = status_line(status);
                    let mut w = status_writer.lock().await;
                    if write_line(&mut *w, &line).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(n)) => warn!(lagged = n, "status forwarder lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    run_reader(lifecycle, stdin, Arc::clone(&writer), cancel).await;

    event_task.abort();
    status_task.abort();
    let _ = event_task.await;
    let _ = status_task.await;
}

async fn run_reader(
    lifecycle: Arc<Lifecycle>,
    stdin: impl tokio::io::AsyncRead + Unpin,
    writer: Arc<Mutex<impl AsyncWrite + Unpin>>,
    cancel: CancellationToken,
) {
    let mut lines = BufReader::new(stdin).lines();

    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line,
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("error reading stdin: {e}");
                break;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        // P10: a malformed line is logged and dropped; the loop keeps running.
        let command = match protocol::parse_command(&line) {
            Ok(command) => command,
            Err(e) => {
                warn!("malformed control protocol line, ignoring: {e}");
                continue;
            }
        };

        if let Some(output) = dispatch(&lifecycle, command).await {
            let mut w = writer.lock().await;
            if write_line(&mut *w, &output).await.is_err() {
                break;
            }
        }
    }
}

/// Run one command against the lifecycle, returning the single line to
/// write to stdout, if any.
async fn dispatch(lifecycle: &Arc<Lifecycle>, command: Command) -> Option<String> {
    match command {
        Command::Start => {
            lifecycle.start();
            None
        }
        Command::Stop => {
            lifecycle.stop();
            None
        }
        Command::Interrupt => {
            lifecycle.interrupt();
            None
        }
        Command::ClearConversation => {
            lifecycle.clear_conversation().await;
            None
        }
        Command::GetStatus => {
            let conversation = lifecycle.get_conversation_info().await;
            Some(status_response(lifecycle.get_status(), &conversation).to_string())
        }
        Command::GetMetrics => Some(metrics_response(&lifecycle.get_metrics()).to_string()),
        Command::RewriteText { text, tone } => {
            let result = lifecycle.rewrite_text(&text, parse_rewrite_tone(&tone)).await;
            Some(rewrite_response(&result, &tone).to_string())
        }
        Command::SummarizeText { text, max_sentences } => {
            let result = lifecycle.summarize_text(&text, max_sentences.unwrap_or(3)).await;
            Some(summarize_response(&result).to_string())
        }
        Command::ProofreadText { text, show_changes } => {
            let result = lifecycle.proofread_text(&text, show_changes.unwrap_or(false)).await;
            Some(proofread_response(&result).to_string())
        }
        Command::FormatText { text, format } => {
            let result = lifecycle.format_text(&text, parse_format_kind(&format)).await;
            Some(format_response(&result, &format).to_string())
        }
        Command::ComposeText {
            prompt,
            context,
            max_length,
            temperature,
        } => {
            let result = lifecycle
                .compose_text(&prompt, context.as_deref(), max_length, temperature)
                .await;
            Some(compose_response(&result).to_string())
        }
    }
}

/// Wrap a [`StatusBroadcast`] as a `STATUS: ` prefixed line for forwarding
/// from a lifecycle status callback into this stdout stream.
pub fn status_line(status: crate::pipeline::messages::AssistantStatus) -> String {
    format!("STATUS: {}", serde_json::to_string(&StatusBroadcast::new(status)).unwrap_or_default())
}

/// Wrap an [`Event`] as an `EVENT: ` prefixed line.
pub fn event_line(event: &Event) -> String {
    format!("EVENT: {}", serde_json::to_string(event).unwrap_or_default())
}

async fn write_line(stdout: &mut (impl AsyncWrite + Unpin), line: &str) -> std::io::Result<()> {
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}
