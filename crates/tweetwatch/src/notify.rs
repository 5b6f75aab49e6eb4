//! Delivery of match notifications.
//!
//! A [`Notification`] is produced for every event whose classifier answer is
//! affirmative. Sinks decide where it goes: the log, an in-process channel,
//! or a chat webhook.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tokio::sync::mpsc;

use tweetwatch_core::{MatchResult, StreamEvent, TrackedEntity};

use crate::error::SinkError;

/// Webhook message bodies are cut to this many characters.
pub const MAX_WEBHOOK_CONTENT: usize = 2000;

/// A matched post together with the question it answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub event: StreamEvent,
    pub subscriber: TrackedEntity,
    pub result: MatchResult,
}

impl Notification {
    pub fn new(event: StreamEvent, subscriber: TrackedEntity, result: MatchResult) -> Self {
        Self {
            event,
            subscriber,
            result,
        }
    }

    /// Public URL of the post. Falls back to the subscriber's handle when the
    /// stream did not expand the author.
    pub fn url(&self) -> String {
        self.event.url().unwrap_or_else(|| {
            format!(
                "https://twitter.com/{}/status/{}",
                self.subscriber.handle, self.event.id
            )
        })
    }

    /// Plain-text rendering used by the log and webhook sinks.
    pub fn render(&self) -> String {
        let handle = self
            .event
            .author_handle()
            .unwrap_or(&self.subscriber.handle);
        let name = self
            .event
            .author
            .as_ref()
            .and_then(|a| a.name.as_deref())
            .unwrap_or(handle.as_str());

        format!(
            "{} (@{}) at {}\n{}\n\n{}\n\nQuestion: {}\nAnswer: {}\nMatch: {}",
            name,
            handle,
            self.event.created_at.format("%Y-%m-%d %H:%M UTC"),
            self.url(),
            self.event.text,
            self.subscriber.question.trim(),
            self.result.rationale,
            if self.result.is_match { "yes" } else { "no" },
        )
    }
}

/// Destination for match notifications.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), SinkError>;
}

#[async_trait]
impl<T: NotificationSink + ?Sized> NotificationSink for Arc<T> {
    async fn send(&self, notification: &Notification) -> Result<(), SinkError> {
        (**self).send(notification).await
    }
}

/// Writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn send(&self, notification: &Notification) -> Result<(), SinkError> {
        tracing::info!(
            handle = %notification.subscriber.handle,
            event = %notification.event.id,
            url = %notification.url(),
            "match: {}",
            notification.result.rationale
        );
        Ok(())
    }
}

/// Forwards notifications into an in-process channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::Sender<Notification>,
}

impl ChannelSink {
    pub fn new(sender: mpsc::Sender<Notification>) -> Self {
        Self { sender }
    }

    /// A sink and the receiver it feeds.
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl NotificationSink for ChannelSink {
    async fn send(&self, notification: &Notification) -> Result<(), SinkError> {
        self.sender
            .send(notification.clone())
            .await
            .map_err(|_| SinkError::Closed)
    }
}

#[derive(Serialize)]
struct WebhookMessage<'a> {
    content: &'a str,
}

/// Posts notifications to a chat webhook as `{"content": "..."}`.
pub struct WebhookSink {
    client: Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>) -> Result<Self, SinkError> {
        Self::with_timeout(url, Duration::from_secs(15))
    }

    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Result<Self, SinkError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SinkError::Delivery(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

fn clip(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn send(&self, notification: &Notification) -> Result<(), SinkError> {
        let rendered = notification.render();
        let message = WebhookMessage {
            content: clip(&rendered, MAX_WEBHOOK_CONTENT),
        };

        let response = self
            .client
            .post(&self.url)
            .json(&message)
            .send()
            .await
            .map_err(|e| SinkError::Delivery(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        let detail = format!("{}: {}", status, clip(&body, 320));
        if status.is_server_error() || status.as_u16() == 429 {
            Err(SinkError::Delivery(detail))
        } else {
            Err(SinkError::Rejected(detail))
        }
    }
}
