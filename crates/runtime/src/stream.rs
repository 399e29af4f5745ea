//! Streaming response rendering: a bounded consumer over LLM token chunks
//! with a debounce timer on outgoing edits.
//!
//! The first flush sends a message; later flushes edit it.  Once the text
//! would cross the platform limit the message stops being edited and the
//! remainder goes out as fresh chunked messages at the end.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::warn;

use whisperengine_messaging::{MAX_CHUNK, MessagingAdapter, chunk_message};

/// Minimum interval between edits of the in-flight message.
pub const EDIT_INTERVAL: Duration = Duration::from_millis(700);
/// Stop editing before the hard limit so a final edit can never overflow.
const EDIT_CEILING: usize = 1950;

/// Drain `rx` to the channel, debouncing edits.  Returns the full response
/// text once the stream ends.
pub async fn stream_to_channel(
    adapter: Arc<dyn MessagingAdapter>,
    channel_id: &str,
    reply_to_message_id: Option<&str>,
    mut rx: mpsc::Receiver<String>,
) -> String {
    let mut full = String::new();
    let mut active_message: Option<String> = None;
    let mut rendered_len = 0usize;
    let mut overflowed = false;
    let mut last_edit = Instant::now() - EDIT_INTERVAL;

    while let Some(token) = rx.recv().await {
        full.push_str(&token);

        if overflowed || full.trim().is_empty() {
            continue;
        }
        if last_edit.elapsed() < EDIT_INTERVAL {
            continue;
        }

        if full.chars().count() >= EDIT_CEILING {
            // Past the ceiling the in-flight message is frozen; the tail is
            // delivered after the stream ends.
            overflowed = true;
            continue;
        }

        match &active_message {
            None => match adapter
                .send_message(channel_id, &full, reply_to_message_id)
                .await
            {
                Ok(message_id) => {
                    active_message = Some(message_id);
                    rendered_len = full.len();
                    last_edit = Instant::now();
                }
                Err(err) => warn!(%err, "streaming send failed"),
            },
            Some(message_id) => {
                if let Err(err) = adapter.edit_message(channel_id, message_id, &full).await {
                    warn!(%err, "streaming edit failed");
                } else {
                    rendered_len = full.len();
                }
                last_edit = Instant::now();
            }
        }
    }

    // Final settlement: make sure everything the model produced is visible.
    if full.trim().is_empty() {
        return full;
    }

    match &active_message {
        None => {
            // Nothing was flushed during streaming; send the whole thing.
            for chunk in chunk_message(&full, MAX_CHUNK) {
                if let Err(err) = adapter
                    .send_message(channel_id, &chunk, reply_to_message_id)
                    .await
                {
                    warn!(%err, "final streaming send failed");
                }
            }
        }
        Some(message_id) => {
            if !overflowed && full.chars().count() < EDIT_CEILING {
                if full.len() != rendered_len {
                    let _ = adapter.edit_message(channel_id, message_id, &full).await;
                }
            } else {
                // Finish the frozen message at the ceiling, then send the
                // tail as fresh messages.
                let mut cut = full
                    .char_indices()
                    .nth(EDIT_CEILING)
                    .map(|(i, _)| i)
                    .unwrap_or(full.len());
                while cut > 0 && !full.is_char_boundary(cut) {
                    cut -= 1;
                }
                let (head, tail) = full.split_at(cut);
                let _ = adapter.edit_message(channel_id, message_id, head).await;
                for chunk in chunk_message(tail, MAX_CHUNK) {
                    let _ = adapter.send_message(channel_id, &chunk, None).await;
                }
            }
        }
    }

    full
}
