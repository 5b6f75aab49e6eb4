//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;

use tweetwatch::{
    Classifier, ClassifierError, Notification, NotificationSink, SinkError, Tracker, TrackerConfig,
};
use tweetwatch_core::{Author, EntityId, Handle, RuleLimits, StreamEvent};
use tweetwatch_store::MemoryStore;
use tweetwatch_stream::client::memory::{
    MemoryRuleService, MemoryStreamService, MemoryUserDirectory,
};

/// A tracker wired entirely to in-memory fakes.
pub type FixtureTracker = Tracker<
    Arc<MemoryRuleService>,
    Arc<MemoryStreamService>,
    Arc<MemoryUserDirectory>,
    Arc<MemoryStore>,
>;

/// In-memory remote service, user directory and store.
///
/// The fixture keeps handles to every fake so a test can inspect and
/// manipulate them after handing them to a [`Tracker`].
pub struct TestFixture {
    pub rules: Arc<MemoryRuleService>,
    pub stream: Arc<MemoryStreamService>,
    pub directory: Arc<MemoryUserDirectory>,
    pub store: Arc<MemoryStore>,
    next_user: Mutex<u64>,
}

impl TestFixture {
    /// Create a fixture with empty fakes.
    pub fn new() -> Self {
        Self {
            rules: Arc::new(MemoryRuleService::new()),
            stream: Arc::new(MemoryStreamService::new()),
            directory: Arc::new(MemoryUserDirectory::new()),
            store: Arc::new(MemoryStore::new()),
            next_user: Mutex::new(1000),
        }
    }

    /// Create a fixture with accounts already registered in the directory.
    pub fn with_users(handles: &[&str]) -> Self {
        let fixture = Self::new();
        for raw in handles {
            fixture.register(raw);
        }
        fixture
    }

    /// Register an account and return its id.
    pub fn register(&self, raw: &str) -> EntityId {
        let id = {
            let mut next = self.next_user.lock().unwrap_or_else(PoisonError::into_inner);
            *next += 1;
            EntityId::new(next.to_string())
        };
        self.directory.insert(handle(raw), id.clone());
        id
    }

    /// A tracker over this fixture's fakes.
    pub fn tracker(&self, limits: RuleLimits) -> FixtureTracker {
        self.tracker_with(TrackerConfig::with_limits(limits))
    }

    pub fn tracker_with(&self, config: TrackerConfig) -> FixtureTracker {
        Tracker::new(
            Arc::clone(&self.rules),
            Arc::clone(&self.stream),
            Arc::clone(&self.directory),
            Arc::clone(&self.store),
            config,
        )
    }

    /// A post by `author` with expanded author details.
    pub fn post(&self, id: &str, author: &EntityId, author_handle: &str, text: &str) -> StreamEvent {
        StreamEvent::new(id, author.clone(), text, Utc::now()).with_author(Author {
            handle: Some(handle(author_handle)),
            name: None,
            profile_image_url: None,
            id: author.clone(),
        })
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a handle, panicking on invalid input.
pub fn handle(raw: &str) -> Handle {
    Handle::new(raw).unwrap_or_else(|e| panic!("invalid test handle {:?}: {}", raw, e))
}

/// Parse a list of handles.
pub fn handles(raw: &[&str]) -> Vec<Handle> {
    raw.iter().map(|r| handle(r)).collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Scripted collaborators
// ─────────────────────────────────────────────────────────────────────────────

/// A classifier that replays queued answers, then falls back to a default.
pub struct ScriptedClassifier {
    answers: Mutex<VecDeque<Result<String, ClassifierError>>>,
    fallback: String,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedClassifier {
    /// Answer every call with `fallback`.
    pub fn always(fallback: impl Into<String>) -> Self {
        Self {
            answers: Mutex::new(VecDeque::new()),
            fallback: fallback.into(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue an answer for the next unanswered call.
    pub fn then(self, answer: impl Into<String>) -> Self {
        self.lock_answers().push_back(Ok(answer.into()));
        self
    }

    /// Queue a failure for the next unanswered call.
    pub fn then_fail(self, error: ClassifierError) -> Self {
        self.lock_answers().push_back(Err(error));
        self
    }

    /// Every `(text, criterion)` pair seen, in order.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn lock_answers(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<String, ClassifierError>>> {
        self.answers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    async fn classify(&self, text: &str, criterion: &str) -> Result<String, ClassifierError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((text.to_string(), criterion.to_string()));
        self.lock_answers()
            .pop_front()
            .unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

/// A sink that keeps every notification it receives.
#[derive(Default)]
pub struct CollectingSink {
    received: Mutex<Vec<Notification>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn received(&self) -> Vec<Notification> {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl NotificationSink for CollectingSink {
    async fn send(&self, notification: &Notification) -> Result<(), SinkError> {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notification.clone());
        Ok(())
    }
}
