//! Stream session lifecycle.
//!
//! A session owns one long-lived stream connection and brings the remote
//! rules in line with the tracked set before every (re)connect.
//!
//! ```text
//!            start()                 connected
//!   Idle ─────────────▶ Connecting ─────────────▶ Streaming
//!    ▲                    │   ▲                      │
//!    │ stop()       error │   │ resync + reopen      │ remote drop
//!    │                    ▼   │                      ▼
//!    └─────────────── Failed  └────────────── Disconnected
//! ```
//!
//! `stop()` returns to `Idle` from any state. It cancels an in-flight start or
//! reconnect and waits for the connection to be closed before returning.
//!
//! ## Observing
//!
//! Transitions are broadcast as [`SessionStatus`] values; delivered posts are
//! handed out through a bounded channel taken with
//! [`StreamSession::take_events`]. Posts arriving before the channel is taken
//! are discarded.
//!
//! ## Membership changes
//!
//! The resync before every (re)connect reads the store and rewrites the
//! remote rules under [`StreamSession::lock_membership`]. Callers that change
//! the store and the remote rules together must hold the same lock.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::{broadcast, mpsc, watch, MutexGuard, Notify};
use tokio::task::JoinHandle;

use tweetwatch_core::StreamEvent;
use tweetwatch_store::{StoreExt, SubscriberStore};

use crate::client::{EventSource, RuleClient, StreamClient, StreamRequest};
use crate::error::{Result, StreamError};
use crate::synchronizer::RuleSynchronizer;

/// Lifecycle state of a [`StreamSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Streaming,
    Disconnected,
    Failed,
}

impl SessionState {
    /// Whether the session holds, or is working towards, a connection.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SessionState::Connecting | SessionState::Streaming | SessionState::Disconnected
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Streaming => "streaming",
            SessionState::Disconnected => "disconnected",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Notification sent to status observers on every transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Connecting,
    Connected,
    Disconnected { reason: String },
    Failed { error: String },
    Stopped,
}

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Parameters sent when opening the stream.
    pub request: StreamRequest,
    /// Timeout for opening the stream.
    pub open_timeout: Duration,
    /// Timeout for closing the stream.
    pub close_timeout: Duration,
    /// Capacity of the event channel.
    pub event_buffer: usize,
    /// Capacity of the status broadcast.
    pub status_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request: StreamRequest::default(),
            open_timeout: Duration::from_secs(30),
            close_timeout: Duration::from_secs(5),
            event_buffer: 1000,
            status_buffer: 64,
        }
    }
}

struct Inner<R: RuleClient, C, S> {
    synchronizer: Arc<RuleSynchronizer<R>>,
    stream_client: C,
    store: S,
    config: SessionConfig,
    state: Mutex<SessionState>,
    /// Serializes start, stop and reconnect.
    transition: tokio::sync::Mutex<()>,
    /// Held while the tracked set and the remote rules change together.
    membership: tokio::sync::Mutex<()>,
    /// Bumped by `stop`; work started under an older epoch is abandoned.
    epoch: watch::Sender<u64>,
    status: broadcast::Sender<SessionStatus>,
    events: mpsc::Sender<StreamEvent>,
    /// Receiving end, until someone takes it.
    receiver: Mutex<Option<mpsc::Receiver<StreamEvent>>>,
    reconnect: Notify,
    pump_task: Mutex<Option<JoinHandle<()>>>,
}

/// A filtered-stream session.
pub struct StreamSession<R: RuleClient, C, S> {
    inner: Arc<Inner<R, C, S>>,
}

impl<R, C, S> StreamSession<R, C, S>
where
    R: RuleClient + 'static,
    C: StreamClient + 'static,
    S: SubscriberStore + 'static,
{
    pub fn new(
        synchronizer: Arc<RuleSynchronizer<R>>,
        stream_client: C,
        store: S,
        config: SessionConfig,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(config.event_buffer.max(1));
        let (status, _) = broadcast::channel(config.status_buffer.max(1));
        let (epoch, _) = watch::channel(0);

        Self {
            inner: Arc::new(Inner {
                synchronizer,
                stream_client,
                store,
                config,
                state: Mutex::new(SessionState::Idle),
                transition: tokio::sync::Mutex::new(()),
                membership: tokio::sync::Mutex::new(()),
                epoch,
                status,
                events: events_tx,
                receiver: Mutex::new(Some(events_rx)),
                reconnect: Notify::new(),
                pump_task: Mutex::new(None),
            }),
        }
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.inner.state()
    }

    pub fn synchronizer(&self) -> &Arc<RuleSynchronizer<R>> {
        &self.inner.synchronizer
    }

    /// Subscribe to status notifications.
    pub fn subscribe_status(&self) -> broadcast::Receiver<SessionStatus> {
        self.inner.status.subscribe()
    }

    /// Take the receiving end of the event channel. Only the first call
    /// returns it; events delivered before then are discarded.
    pub fn take_events(&self) -> Option<mpsc::Receiver<StreamEvent>> {
        self.inner
            .receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Exclude the connect-time resync while the guard is held.
    ///
    /// Hold it across a remote rule edit and the matching store write, so a
    /// reconnect never packs a store that disagrees with the remote.
    pub async fn lock_membership(&self) -> MutexGuard<'_, ()> {
        self.inner.membership.lock().await
    }

    /// Resync the remote rules and open the stream.
    ///
    /// Allowed from `Idle` and `Failed`. An empty tracked set skips the
    /// resync and leaves the remote rules alone.
    pub async fn start(&self) -> Result<()> {
        let inner = &self.inner;
        let _transition = inner.transition.lock().await;

        let state = inner.state();
        if !matches!(state, SessionState::Idle | SessionState::Failed) {
            return Err(StreamError::AlreadyRunning(state));
        }

        let epoch = inner.epoch();
        inner.enter(SessionState::Connecting, SessionStatus::Connecting);

        match inner.connect(epoch).await {
            Ok(source) => {
                // Discard a reconnect request left over from an earlier run.
                let _ = inner.reconnect.notified().now_or_never();

                inner.enter(SessionState::Streaming, SessionStatus::Connected);
                tracing::info!("stream session connected");

                let pump = tokio::spawn(Arc::clone(inner).pump(source, epoch));
                *inner.pump_task.lock().unwrap_or_else(PoisonError::into_inner) = Some(pump);
                Ok(())
            }
            Err(StreamError::Cancelled) => {
                inner.enter(SessionState::Idle, SessionStatus::Stopped);
                Err(StreamError::Cancelled)
            }
            Err(e) => {
                tracing::error!("failed to start stream session: {}", e);
                inner.enter(
                    SessionState::Failed,
                    SessionStatus::Failed {
                        error: e.to_string(),
                    },
                );
                Err(e)
            }
        }
    }

    /// Close the stream and return to `Idle`.
    ///
    /// Cancels any in-flight start or reconnect. Stopping an idle session is
    /// a no-op.
    pub async fn stop(&self) {
        let inner = &self.inner;
        inner.epoch.send_modify(|epoch| *epoch += 1);
        inner.join_pump().await;

        let _transition = inner.transition.lock().await;
        // A start that connected before it saw the cancellation may have
        // spawned a pump after the first join.
        inner.join_pump().await;

        let state = inner.state();
        if state != SessionState::Idle {
            inner.enter(SessionState::Idle, SessionStatus::Stopped);
            tracing::info!(from = %state, "stream session stopped");
        }
    }

    /// Close the current connection and reconnect, resyncing rules first.
    pub fn reconnect(&self) -> Result<()> {
        let state = self.inner.state();
        if state != SessionState::Streaming {
            return Err(StreamError::NotStreaming(state));
        }
        self.inner.reconnect.notify_one();
        Ok(())
    }
}

impl<R: RuleClient, C, S> Drop for StreamSession<R, C, S> {
    fn drop(&mut self) {
        self.inner.epoch.send_modify(|epoch| *epoch += 1);
    }
}

impl<R, C, S> Inner<R, C, S>
where
    R: RuleClient + 'static,
    C: StreamClient + 'static,
    S: SubscriberStore + 'static,
{
    fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enter(&self, state: SessionState, status: SessionStatus) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
        tracing::debug!(%state, "session state changed");
        // Having no observers is fine.
        let _ = self.status.send(status);
    }

    fn epoch(&self) -> u64 {
        *self.epoch.borrow()
    }

    /// Resolves once `stop` has been called after `epoch` was read.
    async fn cancelled(&self, epoch: u64) {
        let mut rx = self.epoch.subscribe();
        let _ = rx.wait_for(|current| *current != epoch).await;
    }

    async fn connect(&self, epoch: u64) -> Result<Box<dyn EventSource>> {
        tokio::select! {
            biased;
            _ = self.cancelled(epoch) => Err(StreamError::Cancelled),
            result = self.resync_and_open() => result,
        }
    }

    async fn resync_and_open(&self) -> Result<Box<dyn EventSource>> {
        {
            let _membership = self.membership.lock().await;
            let targets = self.store.handles().await?;
            if targets.is_empty() {
                tracing::info!("no tracked handles; skipping rule resync");
            } else {
                self.synchronizer.resync(&targets).await?;
            }
        }

        let timeout = self.config.open_timeout;
        tokio::time::timeout(timeout, self.stream_client.open(&self.config.request))
            .await
            .map_err(|_| StreamError::Timeout(format!("stream open took longer than {:?}", timeout)))?
    }

    /// Forward events until stopped, reconnecting whenever the connection
    /// is lost.
    async fn pump(self: Arc<Self>, mut source: Box<dyn EventSource>, epoch: u64) {
        loop {
            let reason = tokio::select! {
                biased;
                _ = self.cancelled(epoch) => {
                    self.close(source.as_mut()).await;
                    return;
                }
                _ = self.reconnect.notified() => "reconnect requested".to_string(),
                next = source.next_event() => match next {
                    Ok(Some(event)) => {
                        if !self.forward(event, epoch).await {
                            self.close(source.as_mut()).await;
                            return;
                        }
                        continue;
                    }
                    Ok(None) => "stream closed by remote".to_string(),
                    Err(e) => e.to_string(),
                },
            };

            tracing::warn!(reason = %reason, "stream connection lost");
            self.close(source.as_mut()).await;

            match self.reconnect_after(epoch, reason).await {
                Some(next) => source = next,
                None => return,
            }
        }
    }

    /// Returns false if the session was stopped while waiting for room.
    async fn forward(&self, event: StreamEvent, epoch: u64) -> bool {
        let untaken = self
            .receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some();
        if untaken {
            tracing::debug!(id = %event.id, "event channel not taken; discarding event");
            return true;
        }

        tokio::select! {
            biased;
            _ = self.cancelled(epoch) => false,
            sent = self.events.send(event) => {
                if sent.is_err() {
                    tracing::trace!("event receiver dropped; discarding event");
                }
                true
            }
        }
    }

    async fn reconnect_after(&self, epoch: u64, reason: String) -> Option<Box<dyn EventSource>> {
        let _transition = tokio::select! {
            biased;
            _ = self.cancelled(epoch) => return None,
            guard = self.transition.lock() => guard,
        };

        self.enter(
            SessionState::Disconnected,
            SessionStatus::Disconnected { reason },
        );
        self.enter(SessionState::Connecting, SessionStatus::Connecting);

        match self.connect(epoch).await {
            Ok(source) => {
                self.enter(SessionState::Streaming, SessionStatus::Connected);
                tracing::info!("stream session reconnected");
                Some(source)
            }
            Err(StreamError::Cancelled) => None,
            Err(e) => {
                tracing::error!("reconnect failed: {}", e);
                self.enter(
                    SessionState::Failed,
                    SessionStatus::Failed {
                        error: e.to_string(),
                    },
                );
                None
            }
        }
    }

    async fn close(&self, source: &mut dyn EventSource) {
        match tokio::time::timeout(self.config.close_timeout, source.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("error closing stream connection: {}", e),
            Err(_) => tracing::warn!("timed out closing stream connection"),
        }
    }

    async fn join_pump(&self) {
        let pump = self
            .pump_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(pump) = pump {
            if let Err(e) = pump.await {
                tracing::error!("stream pump task failed: {}", e);
            }
        }
    }
}
