//! Feed lifecycle manager
//!
//! Owns the order book and runs two tasks per connection: a receive loop,
//! the book's only writer, and an independent heartbeat loop. Errors are
//! terminal; there is no reconnection.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, trace, warn};

use super::client::{FeedConnection, FeedSink, FeedStream};
use crate::config::Config;
use crate::error::{MarketDataError, Result};
use crate::orderbook::{format_inside_levels, BookSnapshot, OrderBook};
use crate::parser::ParsedMessage;
use crate::stats::{MessageCounters, MessageCounts};

/// Connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Subscribed,
    Running,
    Closing,
    Closed,
    /// Terminal transport or decode failure; see `FeedManager::last_error`
    Errored,
}

impl ConnectionState {
    /// True while a session is being set up or is live
    pub fn is_active(self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting
                | ConnectionState::Subscribed
                | ConnectionState::Running
                | ConnectionState::Closing
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Subscribed => "subscribed",
            ConnectionState::Running => "running",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
            ConnectionState::Errored => "errored",
        };
        f.write_str(name)
    }
}

/// Lifecycle hooks, called from the task that observes the transition
pub trait FeedObserver: Send + Sync {
    /// Subscription handshake sent
    fn on_open(&self) {}

    /// `close` finished tearing down
    fn on_close(&self) {}

    /// Receive loop stopped on a terminal error
    fn on_error(&self, _error: &MarketDataError) {}
}

/// Default observer: logs each hook
#[derive(Debug, Default)]
pub struct LoggingObserver;

impl FeedObserver for LoggingObserver {
    fn on_open(&self) {
        info!("-- Subscribed! --");
    }

    fn on_close(&self) {
        info!("-- Socket Closed --");
    }

    fn on_error(&self, error: &MarketDataError) {
        error!(error = %error, "Feed stopped on error");
    }
}

/// State shared between the manager and its tasks
struct FeedShared {
    book: RwLock<OrderBook>,
    counters: MessageCounters,
    state: watch::Sender<ConnectionState>,
    last_error: watch::Sender<Option<MarketDataError>>,
    observer: Arc<dyn FeedObserver>,
    level_count: usize,
    verbose: bool,
}

impl FeedShared {
    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "Connection state changed");
        }
    }

    /// Decode one frame and route it; decode failures are returned
    async fn process_message(&self, raw: &str) -> Result<()> {
        let parsed = ParsedMessage::parse(raw)?;
        self.counters.record(parsed.kind());

        match parsed {
            ParsedMessage::Event(event) => {
                let mut book = self.book.write().await;
                book.apply(&event);
                trace!(kind = event.kind(), "Event applied");

                if self.verbose {
                    let snapshot = book.snapshot(self.level_count);
                    drop(book);
                    debug!(
                        kind = event.kind(),
                        "Inside levels\n{}",
                        format_inside_levels(&snapshot)
                    );
                }
            }
            ParsedMessage::Subscriptions(ack) => {
                info!(channels = ?ack.channels, "Subscription confirmed");
            }
            ParsedMessage::ExchangeError(err) => {
                warn!(message = %err.message, reason = ?err.reason, "Exchange reported an error");
            }
            ParsedMessage::Unknown(kind) => {
                debug!(kind = ?kind, "Ignoring unrecognised message type");
            }
        }

        Ok(())
    }

    fn fail(&self, err: MarketDataError) {
        self.last_error.send_replace(Some(err.clone()));
        self.set_state(ConnectionState::Errored);
        self.observer.on_error(&err);
    }
}

/// Handles of one running session
struct FeedTasks {
    shutdown: watch::Sender<bool>,
    sink: Arc<FeedSink>,
    receiver: JoinHandle<()>,
    heartbeat: JoinHandle<()>,
}

/// Streaming client: connection lifecycle plus the book it feeds
pub struct FeedManager {
    config: Arc<Config>,
    shared: Arc<FeedShared>,
    tasks: Option<FeedTasks>,
}

impl FeedManager {
    /// Create a stopped feed
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (last_error, _) = watch::channel(None);
        let shared = FeedShared {
            book: RwLock::new(OrderBook::new(config.max_depth)),
            counters: MessageCounters::new()?,
            state,
            last_error,
            observer: Arc::new(LoggingObserver),
            level_count: config.level_count,
            verbose: config.verbose,
        };

        Ok(Self {
            config: Arc::new(config),
            shared: Arc::new(shared),
            tasks: None,
        })
    }

    /// Replace the lifecycle observer; only before the first `start`
    pub fn with_observer(mut self, observer: Arc<dyn FeedObserver>) -> Self {
        if let Some(shared) = Arc::get_mut(&mut self.shared) {
            shared.observer = observer;
        } else {
            warn!("Observer not replaced: feed tasks hold shared state");
        }
        self
    }

    /// Connect, subscribe, and launch the receive and heartbeat loops
    ///
    /// A new session starts from an empty book. Fails with `AlreadyRunning`
    /// while a session is live.
    pub async fn start(&mut self) -> Result<()> {
        if self.state().is_active() {
            return Err(MarketDataError::AlreadyRunning);
        }
        // Join the tasks of a session that ended on error
        if self.tasks.is_some() {
            self.close().await;
        }

        self.shared.last_error.send_replace(None);
        *self.shared.book.write().await = OrderBook::new(self.config.max_depth);
        self.shared.set_state(ConnectionState::Connecting);

        let connection = FeedConnection::new(
            self.config.endpoint(),
            self.config.product_ids.clone(),
            self.config.channels.clone(),
        );
        let (sink, stream) = match connection.connect().await {
            Ok(halves) => halves,
            Err(e) => {
                error!(error = %e, "Failed to start feed");
                self.shared.last_error.send_replace(Some(e.clone()));
                self.shared.set_state(ConnectionState::Closed);
                return Err(e);
            }
        };

        self.shared.set_state(ConnectionState::Subscribed);
        self.shared.observer.on_open();

        let sink = Arc::new(sink);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let receiver = tokio::spawn(receive_loop(
            self.shared.clone(),
            stream,
            sink.clone(),
            shutdown_rx.clone(),
        ));
        let heartbeat = tokio::spawn(heartbeat_loop(
            sink.clone(),
            self.config.heartbeat_interval(),
            shutdown_rx,
        ));

        self.tasks = Some(FeedTasks {
            shutdown,
            sink,
            receiver,
            heartbeat,
        });
        Ok(())
    }

    /// Stop both loops and close the transport
    ///
    /// Safe to call repeatedly; does nothing when no session exists. A feed
    /// that errored stays `Errored`.
    pub async fn close(&mut self) {
        let Some(tasks) = self.tasks.take() else {
            return;
        };

        let errored = self.state() == ConnectionState::Errored;
        if !errored {
            self.shared.set_state(ConnectionState::Closing);
        }

        // Receivers are gone if both tasks already exited
        let _ = tasks.shutdown.send(true);
        tasks.sink.close().await;

        if let Err(e) = tasks.heartbeat.await {
            warn!(error = %e, "Heartbeat task panicked");
        }
        if let Err(e) = tasks.receiver.await {
            warn!(error = %e, "Receive task panicked");
        }

        if !errored {
            self.shared.set_state(ConnectionState::Closed);
        }
        self.shared.observer.on_close();
    }

    /// Copy of up to `level_count` best levels per side
    pub async fn snapshot(&self, level_count: usize) -> BookSnapshot {
        self.shared.book.read().await.snapshot(level_count)
    }

    /// Formatted inside levels at the configured level count
    pub async fn inside_levels(&self) -> String {
        let snapshot = self.snapshot(self.config.level_count).await;
        format_inside_levels(&snapshot)
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Follow state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Last terminal error of the current or previous session
    pub fn last_error(&self) -> Option<MarketDataError> {
        self.shared.last_error.borrow().clone()
    }

    pub fn counts(&self) -> MessageCounts {
        self.shared.counters.counts()
    }

    pub fn counters(&self) -> &MessageCounters {
        &self.shared.counters
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Drop for FeedManager {
    fn drop(&mut self) {
        if let Some(tasks) = &self.tasks {
            let _ = tasks.shutdown.send(true);
        }
    }
}

async fn receive_loop(
    shared: Arc<FeedShared>,
    mut stream: FeedStream,
    sink: Arc<FeedSink>,
    mut shutdown: watch::Receiver<bool>,
) {
    shared.state.send_if_modified(|state| {
        let entered = *state == ConnectionState::Subscribed;
        if entered {
            *state = ConnectionState::Running;
        }
        entered
    });
    info!("Receive loop running");

    loop {
        let next = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            next = stream.recv() => next,
        };

        let result = match next {
            Ok(Some(text)) => shared.process_message(&text).await,
            Ok(None) => Ok(()),
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            if *shutdown.borrow() {
                break;
            }
            shared.fail(e);
            break;
        }
    }

    sink.close().await;
    info!("Receive loop finished");
}

async fn heartbeat_loop(
    sink: Arc<FeedSink>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(period);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {}
        }

        if !sink.is_connected() {
            break;
        }
        if let Err(e) = sink.ping().await {
            warn!(error = %e, "Keepalive ping failed, stopping heartbeat");
            break;
        }
    }

    debug!("Heartbeat loop finished");
}
