//! The Tracker: unified API for tweetwatch.
//!
//! The Tracker brings together the subscriber store, the rule synchronizer,
//! the stream session and the matching pipeline.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};

use tweetwatch_core::{
    validate_question, validate_subscription_handle, Handle, StreamEvent, TrackedEntity,
};
use tweetwatch_store::{InsertResult, StoreExt, SubscriberStore};
use tweetwatch_stream::{
    verify_rule_set, AddOutcome, ConvergenceResult, RuleClient, RuleSynchronizer, SessionState,
    SessionStatus, StreamClient, StreamSession, SyncReport, UserDirectory,
};

use crate::classifier::Classifier;
use crate::config::TrackerConfig;
use crate::error::{Result, TrackerError};
use crate::notify::NotificationSink;
use crate::pipeline::{MatchingPipeline, PipelineStats};

/// The main Tracker struct.
///
/// Provides a unified API for:
/// - Subscribing and unsubscribing accounts
/// - Starting and stopping the stream
/// - Running the matching pipeline over delivered posts
pub struct Tracker<R: RuleClient, C, D, S> {
    /// The subscriber store, shared with the session.
    store: Arc<S>,
    /// Resolves handles to stable ids.
    directory: D,
    /// The stream session; owns the rule synchronizer. Its membership lock
    /// also serializes subscription commands.
    session: StreamSession<R, C, Arc<S>>,
    config: TrackerConfig,
}

impl<R, C, D, S> Tracker<R, C, D, S>
where
    R: RuleClient + 'static,
    C: StreamClient + 'static,
    D: UserDirectory,
    S: SubscriberStore + 'static,
{
    /// Create a new tracker.
    pub fn new(rules: R, stream: C, directory: D, store: S, config: TrackerConfig) -> Self {
        let store = Arc::new(store);
        let synchronizer = Arc::new(RuleSynchronizer::new(rules, config.sync.clone()));
        let session = StreamSession::new(
            synchronizer,
            stream,
            Arc::clone(&store),
            config.session.clone(),
        );

        Self {
            store,
            directory,
            session,
            config,
        }
    }

    /// Get the store reference.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn synchronizer(&self) -> &RuleSynchronizer<R> {
        self.session.synchronizer()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Subscription Commands
    // ─────────────────────────────────────────────────────────────────────────

    /// Start tracking `handle` and ask `question` about each of its posts.
    ///
    /// The remote rules are updated first; the subscriber is only stored once
    /// that succeeded. A capacity rejection leaves both untouched.
    pub async fn subscribe(&self, handle: &str, question: &str) -> Result<TrackedEntity> {
        let handle = Handle::new(handle)?;
        validate_subscription_handle(&handle)?;
        validate_question(question)?;

        let _membership = self.session.lock_membership().await;

        if self.store.find_by_handle(&handle).await?.is_some() {
            return Err(TrackerError::AlreadyTracked(handle));
        }

        let id = self
            .directory
            .resolve(&handle)
            .await?
            .ok_or_else(|| TrackerError::UserNotFound(handle.clone()))?;

        // Same account under a new handle.
        if let Some(existing) = self.store.get(&id).await? {
            tracing::warn!(
                handle = %handle,
                tracked_as = %existing.handle,
                "account already tracked under another handle"
            );
            return Err(TrackerError::AlreadyTracked(existing.handle));
        }

        let outcome = self.synchronizer().add_one(&handle).await?;
        let entity = TrackedEntity::new(handle.clone(), id, question.trim());

        let stored = match self.store.insert(&entity).await {
            Ok(InsertResult::Inserted) => Ok(()),
            Ok(InsertResult::AlreadyExists) => Err(TrackerError::AlreadyTracked(handle.clone())),
            Err(e) => Err(e.into()),
        };
        if let Err(e) = stored {
            if !matches!(outcome, AddOutcome::AlreadyPresent) {
                self.rollback_rule(&handle).await;
            }
            return Err(e);
        }

        tracing::info!(handle = %entity.handle, id = %entity.id, "subscribed");
        Ok(entity)
    }

    /// Stop tracking `handle`. Returns the removed subscriber.
    pub async fn unsubscribe(&self, handle: &str) -> Result<TrackedEntity> {
        let handle = Handle::new(handle)?;
        let _membership = self.session.lock_membership().await;

        let entity = self
            .store
            .find_by_handle(&handle)
            .await?
            .ok_or_else(|| TrackerError::NotTracked(handle.clone()))?;

        self.synchronizer().remove_one(&handle).await?;
        self.store.remove(&entity.id).await?;

        tracing::info!(handle = %entity.handle, id = %entity.id, "unsubscribed");
        Ok(entity)
    }

    /// Tracked subscribers, in store order.
    pub async fn list(&self) -> Result<Vec<TrackedEntity>> {
        Ok(self.store.list().await?)
    }

    /// Rebuild the remote rules from the store.
    pub async fn resync(&self) -> Result<SyncReport> {
        let _membership = self.session.lock_membership().await;
        let handles = self.store.handles().await?;
        Ok(self.synchronizer().resync(&handles).await?)
    }

    /// Compare the remote rules with the store.
    pub async fn verify(&self) -> Result<ConvergenceResult> {
        let handles = self.store.handles().await?;
        Ok(verify_rule_set(self.synchronizer().client(), &handles).await?)
    }

    async fn rollback_rule(&self, handle: &Handle) {
        if let Err(e) = self.synchronizer().remove_one(handle).await {
            tracing::warn!(handle = %handle, "failed to roll back rule after store error: {}", e);
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Session
    // ─────────────────────────────────────────────────────────────────────────

    /// Resync the remote rules and open the stream.
    pub async fn start(&self) -> Result<()> {
        Ok(self.session.start().await?)
    }

    /// Close the stream and return to idle.
    pub async fn stop(&self) {
        self.session.stop().await
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Subscribe to session status notifications.
    pub fn subscribe_status(&self) -> broadcast::Receiver<SessionStatus> {
        self.session.subscribe_status()
    }

    /// Take the delivered-post channel. Only the first call succeeds.
    pub fn take_events(&self) -> Result<mpsc::Receiver<StreamEvent>> {
        self.session.take_events().ok_or(TrackerError::EventsTaken)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Matching
    // ─────────────────────────────────────────────────────────────────────────

    /// A matching pipeline over this tracker's store.
    pub fn pipeline<K: Classifier>(&self, classifier: K) -> MatchingPipeline<Arc<S>, K> {
        MatchingPipeline::with_config(
            Arc::clone(&self.store),
            classifier,
            self.config.pipeline.clone(),
        )
    }

    /// Feed delivered posts through the pipeline into `sink` until the event
    /// channel closes.
    pub async fn run_pipeline<K, N>(&self, classifier: K, sink: &N) -> Result<PipelineStats>
    where
        K: Classifier,
        N: NotificationSink + ?Sized,
    {
        let events = self.take_events()?;
        Ok(self.pipeline(classifier).run(events, sink).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClassifierError;
    use crate::notify::ChannelSink;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::time::Duration;
    use tokio::sync::watch;
    use tweetwatch_core::{EntityId, RuleLimits, ValidationError};
    use tweetwatch_store::{MemoryStore, StoreError};
    use tweetwatch_stream::client::memory::{
        MemoryRuleService, MemoryStreamService, MemoryUserDirectory, RuleCall,
    };
    use tweetwatch_stream::StreamError;

    type TestTracker = Tracker<
        Arc<MemoryRuleService>,
        Arc<MemoryStreamService>,
        Arc<MemoryUserDirectory>,
        MemoryStore,
    >;

    struct Harness {
        rules: Arc<MemoryRuleService>,
        stream: Arc<MemoryStreamService>,
        tracker: TestTracker,
    }

    fn directory() -> Arc<MemoryUserDirectory> {
        let directory = Arc::new(MemoryUserDirectory::new());
        for (i, name) in ["alice", "bob", "carol", "dave"].iter().enumerate() {
            directory.insert(Handle::new(name).unwrap(), (i + 1).to_string());
        }
        directory
    }

    fn harness(limits: RuleLimits) -> Harness {
        let rules = Arc::new(MemoryRuleService::new());
        let stream = Arc::new(MemoryStreamService::new());
        let tracker = Tracker::new(
            Arc::clone(&rules),
            Arc::clone(&stream),
            directory(),
            MemoryStore::new(),
            TrackerConfig::with_limits(limits),
        );
        Harness {
            rules,
            stream,
            tracker,
        }
    }

    /// Store whose writes wait until the gate is open.
    struct GatedStore {
        inner: MemoryStore,
        gate: watch::Sender<bool>,
    }

    impl GatedStore {
        fn new() -> Self {
            Self {
                inner: MemoryStore::new(),
                gate: watch::channel(true).0,
            }
        }

        fn close_gate(&self) {
            self.gate.send_replace(false);
        }

        fn open_gate(&self) {
            self.gate.send_replace(true);
        }

        async fn pass(&self) {
            let mut rx = self.gate.subscribe();
            let _ = rx.wait_for(|open| *open).await;
        }
    }

    #[async_trait]
    impl SubscriberStore for GatedStore {
        async fn list(&self) -> tweetwatch_store::Result<Vec<TrackedEntity>> {
            self.inner.list().await
        }

        async fn question_for(&self, id: &EntityId) -> tweetwatch_store::Result<String> {
            self.inner.question_for(id).await
        }

        async fn get(&self, id: &EntityId) -> tweetwatch_store::Result<Option<TrackedEntity>> {
            self.inner.get(id).await
        }

        async fn find_by_handle(
            &self,
            handle: &Handle,
        ) -> tweetwatch_store::Result<Option<TrackedEntity>> {
            self.inner.find_by_handle(handle).await
        }

        async fn insert(&self, entity: &TrackedEntity) -> tweetwatch_store::Result<InsertResult> {
            self.pass().await;
            self.inner.insert(entity).await
        }

        async fn remove(&self, id: &EntityId) -> tweetwatch_store::Result<bool> {
            self.pass().await;
            self.inner.remove(id).await
        }

        async fn count(&self) -> tweetwatch_store::Result<usize> {
            self.inner.count().await
        }
    }

    type GatedTracker = Tracker<
        Arc<MemoryRuleService>,
        Arc<MemoryStreamService>,
        Arc<MemoryUserDirectory>,
        GatedStore,
    >;

    struct GatedHarness {
        rules: Arc<MemoryRuleService>,
        stream: Arc<MemoryStreamService>,
        tracker: Arc<GatedTracker>,
    }

    fn gated_harness() -> GatedHarness {
        let rules = Arc::new(MemoryRuleService::new());
        let stream = Arc::new(MemoryStreamService::new());
        let tracker = Tracker::new(
            Arc::clone(&rules),
            Arc::clone(&stream),
            directory(),
            GatedStore::new(),
            TrackerConfig::default(),
        );
        GatedHarness {
            rules,
            stream,
            tracker: Arc::new(tracker),
        }
    }

    async fn wait_until(mut done: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !done() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition within 5s");
    }

    async fn next_status(rx: &mut broadcast::Receiver<SessionStatus>) -> SessionStatus {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("status within 5s")
            .expect("status channel open")
    }

    /// Drop the connection, let the reconnect reach its resync, then open the
    /// store gate and wait for the session to come back.
    async fn reconnect_while_gated(
        h: &GatedHarness,
        status: &mut broadcast::Receiver<SessionStatus>,
        command: tokio::task::JoinHandle<Result<TrackedEntity>>,
    ) {
        assert!(h.stream.drop_connection());
        assert!(matches!(
            next_status(status).await,
            SessionStatus::Disconnected { .. }
        ));
        assert_eq!(next_status(status).await, SessionStatus::Connecting);
        tokio::time::sleep(Duration::from_millis(50)).await;

        h.tracker.store().open_gate();
        command.await.unwrap().unwrap();
        assert_eq!(next_status(status).await, SessionStatus::Connected);
    }

    struct AlwaysYes;

    #[async_trait]
    impl Classifier for AlwaysYes {
        async fn classify(&self, _: &str, _: &str) -> std::result::Result<String, ClassifierError> {
            Ok("yes".into())
        }
    }

    #[tokio::test]
    async fn test_subscribe_updates_rules_then_store() {
        let h = harness(RuleLimits::default());

        let entity = h.tracker.subscribe("@alice", "  Is it about cats? ").await.unwrap();
        assert_eq!(entity.id.as_str(), "1");
        assert_eq!(entity.question, "Is it about cats?");

        h.tracker.subscribe("bob", "Dogs?").await.unwrap();
        assert_eq!(h.rules.expressions(), vec!["from:alice OR from:bob"]);

        let handles: Vec<_> = h
            .tracker
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.handle.to_string())
            .collect();
        assert_eq!(handles, vec!["alice", "bob"]);
        assert!(h.tracker.verify().await.unwrap().is_converged());
    }

    #[tokio::test]
    async fn test_subscribe_rejections() {
        let h = harness(RuleLimits::default());
        h.tracker.subscribe("alice", "Cats?").await.unwrap();

        assert!(matches!(
            h.tracker.subscribe("alice", "Again?").await,
            Err(TrackerError::AlreadyTracked(_))
        ));
        assert!(matches!(
            h.tracker.subscribe("nobody", "Who?").await,
            Err(TrackerError::UserNotFound(_))
        ));
        assert!(matches!(
            h.tracker.subscribe("carlos_long_name", "Too long?").await,
            Err(TrackerError::Validation(ValidationError::HandleLength { .. }))
        ));
        assert!(matches!(
            h.tracker.subscribe("bob", "   ").await,
            Err(TrackerError::Validation(ValidationError::EmptyQuestion))
        ));
        assert_eq!(h.tracker.store().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_capacity_rejection_leaves_store_untouched() {
        // One rule with room for a single handle.
        let h = harness(RuleLimits::new(1, 12));
        h.tracker.subscribe("alice", "Cats?").await.unwrap();
        h.rules.clear_calls();

        let err = h.tracker.subscribe("bob", "Dogs?").await.unwrap_err();
        assert!(err.is_capacity());
        assert_eq!(h.tracker.store().count().await.unwrap(), 1);
        assert!(h.rules.write_calls().is_empty());
    }

    #[tokio::test]
    async fn test_unsubscribe() {
        let h = harness(RuleLimits::default());
        h.tracker.subscribe("alice", "Cats?").await.unwrap();
        h.tracker.subscribe("bob", "Dogs?").await.unwrap();

        let removed = h.tracker.unsubscribe("alice").await.unwrap();
        assert_eq!(removed.handle.as_str(), "alice");
        assert_eq!(h.rules.expressions(), vec!["from:bob"]);
        assert!(h.tracker.store().find_by_handle(&removed.handle).await.unwrap().is_none());

        assert!(matches!(
            h.tracker.unsubscribe("alice").await,
            Err(TrackerError::NotTracked(_))
        ));
    }

    #[tokio::test]
    async fn test_remote_failure_is_not_persisted() {
        let h = harness(RuleLimits::default());
        h.rules.fail_next(StreamError::RemoteUnavailable("503".into()));

        let err = h.tracker.subscribe("alice", "Cats?").await.unwrap_err();
        assert!(matches!(err, TrackerError::Stream(StreamError::RemoteUnavailable(_))));
        assert_eq!(h.tracker.store().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_resync_rebuilds_from_store() {
        let h = harness(RuleLimits::default());
        h.tracker.subscribe("alice", "Cats?").await.unwrap();
        h.tracker.subscribe("bob", "Dogs?").await.unwrap();
        h.rules.clear_calls();

        let report = h.tracker.resync().await.unwrap();
        assert!(report.unchanged);
        assert_eq!(report.created.len(), 1);
        assert_eq!(h.rules.calls(), vec![RuleCall::Get]);
    }

    #[tokio::test]
    async fn test_start_and_run_pipeline() {
        let h = harness(RuleLimits::default());
        h.tracker.subscribe("alice", "Cats?").await.unwrap();

        let events = h.tracker.take_events().unwrap();
        assert!(matches!(h.tracker.take_events(), Err(TrackerError::EventsTaken)));

        h.tracker.start().await.unwrap();
        assert_eq!(h.tracker.state(), SessionState::Streaming);
        assert!(h.stream.push(StreamEvent::new("10", "1", "a cat!", Utc::now())));

        let (sink, mut notifications) = ChannelSink::channel(4);
        let pipeline = h.tracker.pipeline(AlwaysYes);
        let run = tokio::spawn(async move { pipeline.run(events, &sink).await });

        let notification = notifications.recv().await.unwrap();
        assert_eq!(notification.event.id.as_str(), "10");
        assert_eq!(notification.subscriber.question, "Cats?");

        h.tracker.stop().await;
        assert_eq!(h.tracker.state(), SessionState::Idle);
        drop(h.tracker);
        let stats = run.await.unwrap();
        assert_eq!(stats.notified, 1);
    }

    #[tokio::test]
    async fn test_reconnect_during_subscribe_keeps_new_rule() {
        let h = gated_harness();
        h.tracker.subscribe("alice", "Cats?").await.unwrap();
        h.tracker.start().await.unwrap();
        let mut status = h.tracker.subscribe_status();

        h.tracker.store().close_gate();
        let subscribing = {
            let tracker = Arc::clone(&h.tracker);
            tokio::spawn(async move { tracker.subscribe("bob", "Dogs?").await })
        };
        wait_until(|| h.rules.expressions() == vec!["from:alice OR from:bob"]).await;

        reconnect_while_gated(&h, &mut status, subscribing).await;

        assert_eq!(h.rules.expressions(), vec!["from:alice OR from:bob"]);
        assert!(h.tracker.verify().await.unwrap().is_converged());
        h.tracker.stop().await;
    }

    #[tokio::test]
    async fn test_reconnect_during_unsubscribe_keeps_rule_removed() {
        let h = gated_harness();
        h.tracker.subscribe("alice", "Cats?").await.unwrap();
        h.tracker.subscribe("bob", "Dogs?").await.unwrap();
        h.tracker.start().await.unwrap();
        let mut status = h.tracker.subscribe_status();

        h.tracker.store().close_gate();
        let unsubscribing = {
            let tracker = Arc::clone(&h.tracker);
            tokio::spawn(async move { tracker.unsubscribe("bob").await })
        };
        wait_until(|| h.rules.expressions() == vec!["from:alice"]).await;

        reconnect_while_gated(&h, &mut status, unsubscribing).await;

        assert_eq!(h.rules.expressions(), vec!["from:alice"]);
        assert!(h.tracker.verify().await.unwrap().is_converged());
        h.tracker.stop().await;
    }

    #[tokio::test]
    async fn test_failed_unsubscribe_keeps_co_tenants_matched() {
        let h = harness(RuleLimits::default());
        h.tracker.subscribe("alice", "Cats?").await.unwrap();
        h.tracker.subscribe("bob", "Dogs?").await.unwrap();
        h.tracker.subscribe("carol", "Birds?").await.unwrap();

        h.rules
            .fail_next_add(StreamError::RemoteUnavailable("create failed".into()));
        let err = h.tracker.unsubscribe("alice").await.unwrap_err();

        assert!(matches!(err, TrackerError::Stream(StreamError::RemoteUnavailable(_))));
        assert_eq!(h.tracker.store().count().await.unwrap(), 3);
        assert!(h.tracker.verify().await.unwrap().is_converged());
    }

    #[test]
    fn test_store_errors_convert() {
        let err: TrackerError = StoreError::NotFound("x".into()).into();
        assert!(matches!(err, TrackerError::Store(_)));
        assert!(!err.is_capacity());
    }
}
