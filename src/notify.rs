//! Connection-state and statistics delivery.
//!
//! The engine pushes events from its own threads through an [`EventSink`].
//! Events are posted to a single delivery thread per session, which invokes
//! whichever listener is registered at dispatch time. State transitions are
//! never dropped or reordered; stats snapshots are dropped when the bounded
//! stats queue is full. `Closed` is the last event a listener ever sees.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::errors::{Result, RtcError};
use crate::types::{ConnectionState, PublishConnectionStats};

pub type ConnectionStateListener = Arc<dyn Fn(ConnectionState) + Send + Sync>;
pub type PublishConnectionStatsListener = Arc<dyn Fn(PublishConnectionStats) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    state: Option<ConnectionStateListener>,
    stats: Option<PublishConnectionStatsListener>,
}

struct SinkShared {
    closed: AtomicBool,
    dropped_stats: AtomicU64,
}

/// Posting half handed to the engine at session creation.
///
/// Cheap to clone; every clone feeds the same delivery thread. Events posted
/// after the session is released are discarded.
#[derive(Clone)]
pub struct EventSink {
    shared: Arc<SinkShared>,
    state_tx: Sender<ConnectionState>,
    stats_tx: Sender<PublishConnectionStats>,
}

impl EventSink {
    /// Post a connection-state transition.
    pub fn connection_state(&self, state: ConnectionState) {
        if self.is_closed() {
            log::debug!("Dropping state {} posted after release", state);
            return;
        }
        // Send only fails once the delivery thread has exited after Closed.
        let _ = self.state_tx.send(state);
    }

    /// Post a statistics snapshot. Dropped if the stats queue is full.
    pub fn stats(&self, stats: PublishConnectionStats) {
        if self.is_closed() {
            return;
        }
        match self.stats_tx.try_send(stats) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                let dropped = self.shared.dropped_stats.fetch_add(1, Ordering::Relaxed) + 1;
                log::debug!("Stats queue full, dropped snapshot ({} total)", dropped);
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}

/// Owner of the listener lock and the delivery thread for one session.
pub(crate) struct Notifier {
    listeners: Arc<Mutex<Listeners>>,
    sink: EventSink,
    last_state: Arc<AtomicI32>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl Notifier {
    pub(crate) fn spawn(thread_name: &str, stats_queue_capacity: usize) -> Result<Self> {
        let (state_tx, state_rx) = crossbeam_channel::unbounded();
        let (stats_tx, stats_rx) = crossbeam_channel::bounded(stats_queue_capacity.max(1));

        let listeners = Arc::new(Mutex::new(Listeners::default()));
        let last_state = Arc::new(AtomicI32::new(ConnectionState::None.code()));

        let dispatch = Dispatch {
            listeners: listeners.clone(),
            last_state: last_state.clone(),
        };
        let handle = std::thread::Builder::new()
            .name(thread_name.to_string())
            .spawn(move || dispatch.run(state_rx, stats_rx))
            .map_err(|e| RtcError::spawn_failed(&e))?;

        Ok(Self {
            listeners,
            sink: EventSink {
                shared: Arc::new(SinkShared {
                    closed: AtomicBool::new(false),
                    dropped_stats: AtomicU64::new(0),
                }),
                state_tx,
                stats_tx,
            },
            last_state,
            dispatcher: Mutex::new(Some(handle)),
        })
    }

    pub(crate) fn sink(&self) -> EventSink {
        self.sink.clone()
    }

    fn lock_listeners(&self) -> MutexGuard<'_, Listeners> {
        // Listener slots stay consistent even if a holder panicked.
        self.listeners.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub(crate) fn set_state_listener(&self, listener: Option<ConnectionStateListener>) {
        self.lock_listeners().state = listener;
    }

    pub(crate) fn set_stats_listener(&self, listener: Option<PublishConnectionStatsListener>) {
        self.lock_listeners().stats = listener;
    }

    /// Last state handed to the delivery thread's listener slot.
    pub(crate) fn last_state(&self) -> ConnectionState {
        ConnectionState::from_code(self.last_state.load(Ordering::Acquire))
            .unwrap_or(ConnectionState::None)
    }

    pub(crate) fn dropped_stats(&self) -> u64 {
        self.sink.shared.dropped_stats.load(Ordering::Relaxed)
    }

    /// Stop accepting engine events and queue the terminal `Closed` state.
    ///
    /// Idempotent; only the first call queues `Closed`.
    pub(crate) fn close(&self) {
        if self.sink.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.sink.state_tx.send(ConnectionState::Closed);
    }

    /// Wait for the delivery thread to drain, bounded by `join_timeout`.
    ///
    /// When called from the delivery thread itself (a listener dropping the
    /// session) the thread is detached instead.
    pub(crate) fn shutdown(&self, join_timeout: Duration) {
        self.close();

        let handle = match self.dispatcher.lock() {
            Ok(mut g) => g.take(),
            Err(p) => p.into_inner().take(),
        };
        let Some(handle) = handle else {
            return;
        };
        if handle.thread().id() == std::thread::current().id() {
            return;
        }

        let start = Instant::now();
        loop {
            if handle.is_finished() {
                if handle.join().is_err() {
                    log::warn!("Delivery thread exited with a panic");
                }
                return;
            }
            if start.elapsed() >= join_timeout {
                log::warn!("Delivery thread still busy after {:?}, detaching", join_timeout);
                return;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
    }
}

struct Dispatch {
    listeners: Arc<Mutex<Listeners>>,
    last_state: Arc<AtomicI32>,
}

impl Dispatch {
    fn run(self, state_rx: Receiver<ConnectionState>, stats_rx: Receiver<PublishConnectionStats>) {
        loop {
            let keep_going = crossbeam_channel::select! {
                recv(state_rx) -> msg => match msg {
                    Ok(state) => {
                        self.deliver_state(state);
                        !state.is_terminal()
                    }
                    Err(_) => false,
                },
                recv(stats_rx) -> msg => match msg {
                    Ok(stats) => {
                        self.deliver_stats(stats);
                        true
                    }
                    Err(_) => {
                        // Both senders live in the same sink, so states are
                        // disconnected too; flush what is left.
                        self.flush_states(&state_rx);
                        false
                    }
                },
            };
            if !keep_going {
                break;
            }
        }
        log::debug!("Delivery thread finished");
    }

    fn flush_states(&self, state_rx: &Receiver<ConnectionState>) {
        for state in state_rx.try_iter() {
            self.deliver_state(state);
            if state.is_terminal() {
                return;
            }
        }
    }

    fn listeners(&self) -> MutexGuard<'_, Listeners> {
        self.listeners.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn deliver_state(&self, state: ConnectionState) {
        self.last_state.store(state.code(), Ordering::Release);
        let listener = self.listeners().state.clone();
        if let Some(listener) = listener {
            if catch_unwind(AssertUnwindSafe(|| listener(state))).is_err() {
                log::error!("Connection state listener panicked on {}", state);
            }
        }
    }

    fn deliver_stats(&self, stats: PublishConnectionStats) {
        let listener = self.listeners().stats.clone();
        if let Some(listener) = listener {
            if catch_unwind(AssertUnwindSafe(|| listener(stats))).is_err() {
                log::error!("Stats listener panicked");
            }
        }
    }
}
