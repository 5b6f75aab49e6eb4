//! Event matching pipeline.
//!
//! For every delivered post the pipeline looks up the author's question,
//! asks the classifier, and forwards affirmative answers to a sink. Events
//! are handled one at a time in arrival order.

use std::time::Duration;

use tokio::sync::mpsc;

use tweetwatch_core::{MatchResult, StreamEvent};
use tweetwatch_store::{StoreError, SubscriberStore};

use crate::classifier::Classifier;
use crate::error::PipelineError;
use crate::notify::{Notification, NotificationSink};

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Upper bound on a single classifier call.
    pub classify_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            classify_timeout: Duration::from_secs(60),
        }
    }
}

/// What happened to one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The answer was affirmative and the sink accepted the notification.
    Notified(MatchResult),
    /// The answer was negative, or no answer was obtained.
    NotMatched(MatchResult),
    /// The author is not tracked.
    Dropped,
}

/// Counters from [`MatchingPipeline::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub received: u64,
    pub notified: u64,
    pub not_matched: u64,
    pub dropped: u64,
    pub failed: u64,
}

/// Classifies stream events against their subscriber's question.
pub struct MatchingPipeline<S, C> {
    store: S,
    classifier: C,
    config: PipelineConfig,
}

impl<S: SubscriberStore, C: Classifier> MatchingPipeline<S, C> {
    pub fn new(store: S, classifier: C) -> Self {
        Self::with_config(store, classifier, PipelineConfig::default())
    }

    pub fn with_config(store: S, classifier: C, config: PipelineConfig) -> Self {
        Self {
            store,
            classifier,
            config,
        }
    }

    /// Decide whether `event` answers its author's question.
    ///
    /// Fails with [`PipelineError::UnknownAuthor`] when the author is not
    /// tracked. A classifier failure is logged and reported as a non-match.
    pub async fn evaluate(&self, event: &StreamEvent) -> Result<MatchResult, PipelineError> {
        let question = match self.store.question_for(&event.author_id).await {
            Ok(question) => question,
            Err(StoreError::NotFound(_)) => {
                return Err(PipelineError::UnknownAuthor(event.author_id.clone()))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(self.classify(event, &question).await)
    }

    /// Evaluate `event` and notify `sink` on a match.
    ///
    /// Untracked authors are dropped rather than treated as errors; they are
    /// expected for posts already in flight when a handle is unsubscribed.
    pub async fn process<K>(
        &self,
        event: &StreamEvent,
        sink: &K,
    ) -> Result<ProcessOutcome, PipelineError>
    where
        K: NotificationSink + ?Sized,
    {
        let Some(subscriber) = self.store.get(&event.author_id).await? else {
            tracing::debug!(author = %event.author_id, event = %event.id, "dropping post from untracked author");
            return Ok(ProcessOutcome::Dropped);
        };

        let result = self.classify(event, &subscriber.question).await;
        if !result.is_match {
            tracing::debug!(handle = %subscriber.handle, event = %event.id, "no match");
            return Ok(ProcessOutcome::NotMatched(result));
        }

        tracing::info!(handle = %subscriber.handle, event = %event.id, "post matched question");
        let notification = Notification::new(event.clone(), subscriber, result.clone());
        sink.send(&notification).await?;
        Ok(ProcessOutcome::Notified(result))
    }

    /// Drain `events` through [`process`](Self::process) until the channel
    /// closes. Per-event failures are logged and counted; they never stop
    /// the loop.
    pub async fn run<K>(&self, mut events: mpsc::Receiver<StreamEvent>, sink: &K) -> PipelineStats
    where
        K: NotificationSink + ?Sized,
    {
        let mut stats = PipelineStats::default();
        while let Some(event) = events.recv().await {
            stats.received += 1;
            match self.process(&event, sink).await {
                Ok(ProcessOutcome::Notified(_)) => stats.notified += 1,
                Ok(ProcessOutcome::NotMatched(_)) => stats.not_matched += 1,
                Ok(ProcessOutcome::Dropped) => stats.dropped += 1,
                Err(e) => {
                    stats.failed += 1;
                    tracing::warn!(event = %event.id, "failed to process post: {}", e);
                }
            }
        }
        tracing::info!(
            received = stats.received,
            notified = stats.notified,
            "event channel closed"
        );
        stats
    }

    async fn classify(&self, event: &StreamEvent, question: &str) -> MatchResult {
        let call = self.classifier.classify(&event.text, question);
        match tokio::time::timeout(self.config.classify_timeout, call).await {
            Ok(Ok(answer)) => MatchResult::from_response(answer),
            Ok(Err(e)) => {
                tracing::warn!(event = %event.id, "classifier failed: {}", e);
                MatchResult::no_match(format!("classifier failed: {}", e))
            }
            Err(_) => {
                tracing::warn!(
                    event = %event.id,
                    timeout_ms = self.config.classify_timeout.as_millis() as u64,
                    "classifier timed out"
                );
                MatchResult::no_match("classifier timed out")
            }
        }
    }
}
