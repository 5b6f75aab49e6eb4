//! Remote service abstraction.
//!
//! The filtered-stream service exposes three surfaces: a rule API, a
//! long-lived event stream, and a user lookup. Each sits behind a trait so the
//! synchronizer and session can run against the HTTP adapter in production
//! and the [`memory`] fakes in tests.

use std::sync::Arc;

use async_trait::async_trait;

use tweetwatch_core::{EntityId, Handle, Rule, RuleId, StreamEvent};

use crate::error::Result;

/// The remote rule API.
#[async_trait]
pub trait RuleClient: Send + Sync {
    /// Fetch every rule currently installed on the remote.
    async fn get_rules(&self) -> Result<Vec<Rule>>;

    /// Install one rule. Returns it with its remote id.
    async fn add_rules(&self, expression: &str) -> Result<Rule>;

    /// Delete the given rules. Deleting nothing is a no-op.
    async fn delete_rules(&self, ids: &[RuleId]) -> Result<()>;
}

/// Parameters sent when opening the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    pub expansions: Vec<String>,
    pub user_fields: Vec<String>,
    pub tweet_fields: Vec<String>,
}

impl Default for StreamRequest {
    fn default() -> Self {
        Self {
            expansions: vec!["author_id".into()],
            user_fields: vec![
                "username".into(),
                "name".into(),
                "profile_image_url".into(),
            ],
            tweet_fields: vec!["created_at".into()],
        }
    }
}

/// An open stream connection.
#[async_trait]
pub trait EventSource: Send {
    /// Wait for the next event.
    ///
    /// `Ok(None)` means the remote closed the connection; errors mean it was
    /// lost. Either way the source is spent.
    async fn next_event(&mut self) -> Result<Option<StreamEvent>>;

    /// Close the connection.
    async fn close(&mut self) -> Result<()>;
}

/// Opens stream connections.
#[async_trait]
pub trait StreamClient: Send + Sync {
    async fn open(&self, request: &StreamRequest) -> Result<Box<dyn EventSource>>;
}

/// Resolves handles to stable account ids.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Returns `None` when the account does not exist.
    async fn resolve(&self, handle: &Handle) -> Result<Option<EntityId>>;
}

#[async_trait]
impl<T: RuleClient + ?Sized> RuleClient for Arc<T> {
    async fn get_rules(&self) -> Result<Vec<Rule>> {
        (**self).get_rules().await
    }

    async fn add_rules(&self, expression: &str) -> Result<Rule> {
        (**self).add_rules(expression).await
    }

    async fn delete_rules(&self, ids: &[RuleId]) -> Result<()> {
        (**self).delete_rules(ids).await
    }
}

#[async_trait]
impl<T: StreamClient + ?Sized> StreamClient for Arc<T> {
    async fn open(&self, request: &StreamRequest) -> Result<Box<dyn EventSource>> {
        (**self).open(request).await
    }
}

#[async_trait]
impl<T: UserDirectory + ?Sized> UserDirectory for Arc<T> {
    async fn resolve(&self, handle: &Handle) -> Result<Option<EntityId>> {
        (**self).resolve(handle).await
    }
}

/// In-memory fakes of the remote service for testing.
///
/// The fakes record every call and can be told to fail, stall, or drop the
/// connection, so tests can drive the session through every transition.
pub mod memory {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Mutex, PoisonError};

    use tokio::sync::{mpsc, watch};
    use tweetwatch_core::RuleLimits;

    use crate::error::StreamError;

    /// A recorded call against [`MemoryRuleService`].
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum RuleCall {
        Get,
        Add(String),
        Delete(Vec<RuleId>),
    }

    impl RuleCall {
        /// Whether the call changes remote state.
        pub fn is_write(&self) -> bool {
            !matches!(self, RuleCall::Get)
        }
    }

    #[derive(Default)]
    struct RuleState {
        rules: Vec<Rule>,
        next_id: u64,
        calls: Vec<RuleCall>,
        failures: VecDeque<StreamError>,
        add_failures: VecDeque<StreamError>,
        unavailable: bool,
        limits: Option<RuleLimits>,
    }

    /// Fake rule API.
    pub struct MemoryRuleService {
        state: Mutex<RuleState>,
        paused: watch::Sender<bool>,
    }

    impl Default for MemoryRuleService {
        fn default() -> Self {
            Self {
                state: Mutex::new(RuleState {
                    next_id: 1,
                    ..RuleState::default()
                }),
                paused: watch::channel(false).0,
            }
        }
    }

    impl MemoryRuleService {
        pub fn new() -> Self {
            Self::default()
        }

        /// A service with rules already installed.
        pub fn with_rules<I, S>(expressions: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            let service = Self::new();
            {
                let mut state = service.lock();
                for expression in expressions {
                    let rule = state.install(expression.into());
                    state.rules.push(rule);
                }
            }
            service
        }

        /// Reject requests the way the real service does when limits are hit.
        pub fn enforce_limits(&self, limits: RuleLimits) {
            self.lock().limits = Some(limits);
        }

        /// Installed rules, in creation order.
        pub fn rules(&self) -> Vec<Rule> {
            self.lock().rules.clone()
        }

        /// Installed rule expressions, in creation order.
        pub fn expressions(&self) -> Vec<String> {
            self.lock()
                .rules
                .iter()
                .map(|r| r.expression.clone())
                .collect()
        }

        /// Every call received so far.
        pub fn calls(&self) -> Vec<RuleCall> {
            self.lock().calls.clone()
        }

        /// Calls that changed remote state.
        pub fn write_calls(&self) -> Vec<RuleCall> {
            self.lock()
                .calls
                .iter()
                .filter(|c| c.is_write())
                .cloned()
                .collect()
        }

        pub fn clear_calls(&self) {
            self.lock().calls.clear();
        }

        /// Fail the next call with `error`. Queued failures apply in order.
        pub fn fail_next(&self, error: StreamError) {
            self.lock().failures.push_back(error);
        }

        /// Fail the next `add_rules` call with `error`.
        pub fn fail_next_add(&self, error: StreamError) {
            self.lock().add_failures.push_back(error);
        }

        /// Fail every call until cleared.
        pub fn set_unavailable(&self, unavailable: bool) {
            self.lock().unavailable = unavailable;
        }

        /// Hold every call until [`resume`](Self::resume).
        pub fn pause(&self) {
            self.paused.send_replace(true);
        }

        pub fn resume(&self) {
            self.paused.send_replace(false);
        }

        fn lock(&self) -> std::sync::MutexGuard<'_, RuleState> {
            self.state.lock().unwrap_or_else(PoisonError::into_inner)
        }

        async fn enter(&self, call: RuleCall) -> Result<std::sync::MutexGuard<'_, RuleState>> {
            let mut paused = self.paused.subscribe();
            // The sender lives in self, so this only fails if self is gone.
            let _ = paused.wait_for(|p| !*p).await;

            let mut state = self.lock();
            state.calls.push(call);
            if let Some(error) = state.failures.pop_front() {
                return Err(error);
            }
            if state.unavailable {
                return Err(StreamError::RemoteUnavailable("service unavailable".into()));
            }
            Ok(state)
        }
    }

    impl RuleState {
        fn install(&mut self, expression: String) -> Rule {
            let id = RuleId::new(self.next_id.to_string());
            self.next_id += 1;
            Rule::remote(id, expression)
        }
    }

    #[async_trait]
    impl RuleClient for MemoryRuleService {
        async fn get_rules(&self) -> Result<Vec<Rule>> {
            let state = self.enter(RuleCall::Get).await?;
            Ok(state.rules.clone())
        }

        async fn add_rules(&self, expression: &str) -> Result<Rule> {
            let mut state = self.enter(RuleCall::Add(expression.to_string())).await?;
            if let Some(error) = state.add_failures.pop_front() {
                return Err(error);
            }

            if let Some(limits) = state.limits {
                if expression.len() > limits.max_rule_len {
                    return Err(StreamError::Rejected(format!(
                        "rule of {} bytes exceeds {}",
                        expression.len(),
                        limits.max_rule_len
                    )));
                }
                if state.rules.len() >= limits.max_rules {
                    return Err(StreamError::Rejected(format!(
                        "rule cap of {} reached",
                        limits.max_rules
                    )));
                }
            }

            let rule = state.install(expression.to_string());
            state.rules.push(rule.clone());
            Ok(rule)
        }

        async fn delete_rules(&self, ids: &[RuleId]) -> Result<()> {
            let mut state = self.enter(RuleCall::Delete(ids.to_vec())).await?;
            state
                .rules
                .retain(|r| r.id.as_ref().map_or(true, |id| !ids.contains(id)));
            Ok(())
        }
    }

    enum Signal {
        Event(StreamEvent),
        Drop,
        Fail(String),
    }

    #[derive(Default)]
    struct StreamState {
        requests: Vec<StreamRequest>,
        open_failures: VecDeque<StreamError>,
        current: Option<mpsc::UnboundedSender<Signal>>,
        closed: usize,
    }

    /// Fake stream endpoint. One connection is live at a time; opening a new
    /// one ends the previous one.
    pub struct MemoryStreamService {
        state: Arc<Mutex<StreamState>>,
        opened: watch::Sender<usize>,
    }

    impl Default for MemoryStreamService {
        fn default() -> Self {
            Self {
                state: Arc::new(Mutex::new(StreamState::default())),
                opened: watch::channel(0).0,
            }
        }
    }

    impl MemoryStreamService {
        pub fn new() -> Self {
            Self::default()
        }

        /// Deliver an event on the live connection. Returns false if there is
        /// none.
        pub fn push(&self, event: StreamEvent) -> bool {
            self.signal(Signal::Event(event))
        }

        /// End the live connection as if the remote hung up.
        pub fn drop_connection(&self) -> bool {
            self.signal(Signal::Drop)
        }

        /// Break the live connection with a transport error.
        pub fn fail_connection(&self, reason: impl Into<String>) -> bool {
            self.signal(Signal::Fail(reason.into()))
        }

        /// Fail the next `open` with `error`.
        pub fn fail_next_open(&self, error: StreamError) {
            self.lock().open_failures.push_back(error);
        }

        /// Number of successful opens so far.
        pub fn open_count(&self) -> usize {
            *self.opened.borrow()
        }

        /// Wait until at least `count` connections have been opened.
        pub async fn wait_for_opens(&self, count: usize) {
            let mut opened = self.opened.subscribe();
            let _ = opened.wait_for(|n| *n >= count).await;
        }

        /// Requests received by `open`, in order.
        pub fn requests(&self) -> Vec<StreamRequest> {
            self.lock().requests.clone()
        }

        /// Number of connections closed by the client.
        pub fn closed_count(&self) -> usize {
            self.lock().closed
        }

        /// Whether a connection is currently live.
        pub fn is_connected(&self) -> bool {
            self.lock()
                .current
                .as_ref()
                .map_or(false, |tx| !tx.is_closed())
        }

        fn signal(&self, signal: Signal) -> bool {
            match &self.lock().current {
                Some(tx) => tx.send(signal).is_ok(),
                None => false,
            }
        }

        fn lock(&self) -> std::sync::MutexGuard<'_, StreamState> {
            self.state.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    #[async_trait]
    impl StreamClient for MemoryStreamService {
        async fn open(&self, request: &StreamRequest) -> Result<Box<dyn EventSource>> {
            let receiver = {
                let mut state = self.lock();
                state.requests.push(request.clone());
                if let Some(error) = state.open_failures.pop_front() {
                    return Err(error);
                }
                let (tx, rx) = mpsc::unbounded_channel();
                state.current = Some(tx);
                rx
            };
            self.opened.send_modify(|n| *n += 1);

            Ok(Box::new(MemoryEventSource {
                receiver,
                state: Arc::clone(&self.state),
                closed: false,
            }))
        }
    }

    /// A connection handed out by [`MemoryStreamService`].
    pub struct MemoryEventSource {
        receiver: mpsc::UnboundedReceiver<Signal>,
        state: Arc<Mutex<StreamState>>,
        closed: bool,
    }

    #[async_trait]
    impl EventSource for MemoryEventSource {
        async fn next_event(&mut self) -> Result<Option<StreamEvent>> {
            if self.closed {
                return Ok(None);
            }
            match self.receiver.recv().await {
                Some(Signal::Event(event)) => Ok(Some(event)),
                Some(Signal::Drop) | None => Ok(None),
                Some(Signal::Fail(reason)) => Err(StreamError::RemoteUnavailable(reason)),
            }
        }

        async fn close(&mut self) -> Result<()> {
            if !self.closed {
                self.closed = true;
                self.receiver.close();
                self.state
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .closed += 1;
            }
            Ok(())
        }
    }

    /// Fake user lookup.
    #[derive(Default)]
    pub struct MemoryUserDirectory {
        users: Mutex<HashMap<Handle, EntityId>>,
    }

    impl MemoryUserDirectory {
        pub fn new() -> Self {
            Self::default()
        }

        /// Register an account.
        pub fn insert(&self, handle: Handle, id: impl Into<EntityId>) {
            self.users
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(handle, id.into());
        }
    }

    #[async_trait]
    impl UserDirectory for MemoryUserDirectory {
        async fn resolve(&self, handle: &Handle) -> Result<Option<EntityId>> {
            Ok(self
                .users
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(handle)
                .cloned())
        }
    }
}
