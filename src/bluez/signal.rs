//! Forwarding of bus signals into channels.
//!
//! A [`Subscription`] owns one registration with the bus and a pump task that
//! copies every received message, in bus order, to each of its listeners.
//! Removing a listener always ends its channel with exactly one
//! [`Signal::Unsubscribed`].

use futures_util::stream::{BoxStream, StreamExt};
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc, Mutex, MutexGuard, PoisonError,
};
use tokio::task::JoinHandle;
use zbus::Message;

#[derive(Clone, Debug)]
pub enum Signal<T> {
    Received(T),
    /// Sentinel: no further values follow on this channel.
    Unsubscribed,
}

impl<T> Signal<T> {
    pub fn into_received(self) -> Option<T> {
        match self {
            Signal::Received(v) => Some(v),
            Signal::Unsubscribed => None,
        }
    }
}

pub type SignalReceiver<T = Message> = flume::Receiver<Signal<T>>;

/// One listener channel of a [`Subscription`].
#[derive(Debug, Clone)]
pub struct Listener {
    id: u64,
    rx: SignalReceiver,
}

impl Listener {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn receiver(&self) -> &SignalReceiver {
        &self.rx
    }

    pub fn into_receiver(self) -> SignalReceiver {
        self.rx
    }
}

#[derive(Default)]
struct Fanout {
    next_id: AtomicU64,
    closed: AtomicBool,
    listeners: Mutex<Vec<(u64, flume::Sender<Signal<Message>>)>>,
}

impl Fanout {
    fn lock(&self) -> MutexGuard<'_, Vec<(u64, flume::Sender<Signal<Message>>)>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn add(&self) -> Listener {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = flume::unbounded();
        let mut listeners = self.lock();
        // after the source closed, hand out an already disconnected channel
        if !self.closed.load(Ordering::Acquire) {
            listeners.push((id, tx));
        }
        Listener { id, rx }
    }

    fn remove(&self, id: u64) -> bool {
        let removed = {
            let mut listeners = self.lock();
            listeners
                .iter()
                .position(|(it, _)| *it == id)
                .map(|pos| listeners.remove(pos))
        };
        match removed {
            Some((_, tx)) => {
                let _ = tx.send(Signal::Unsubscribed);
                true
            }
            None => false,
        }
    }

    fn dispatch(&self, msg: &Message) {
        self.lock()
            .retain(|(_, tx)| tx.send(Signal::Received(msg.clone())).is_ok());
    }

    fn drain(&self) -> Vec<(u64, flume::Sender<Signal<Message>>)> {
        std::mem::take(&mut *self.lock())
    }

    /// Drops every sender and refuses new listeners.
    fn close(&self) {
        let mut listeners = self.lock();
        self.closed.store(true, Ordering::Release);
        listeners.clear();
    }

    fn len(&self) -> usize {
        self.lock().len()
    }
}

pub struct Subscription {
    fanout: Arc<Fanout>,
    pump: JoinHandle<()>,
}

impl Subscription {
    /// Starts forwarding `stream` to listeners. Must be called from within a
    /// tokio runtime.
    pub fn spawn(mut stream: BoxStream<'static, Message>) -> Self {
        let fanout = Arc::new(Fanout::default());
        let pump = tokio::spawn({
            let fanout = fanout.clone();
            async move {
                while let Some(msg) = stream.next().await {
                    fanout.dispatch(&msg);
                }
                tracing::debug!("Signal source closed");
                // listeners see a disconnected channel
                fanout.close();
            }
        });
        Self { fanout, pump }
    }

    pub fn listen(&self) -> Listener {
        self.fanout.add()
    }

    /// Ends one listener's channel. Returns false for unknown ids.
    pub fn unlisten(&self, id: u64) -> bool {
        self.fanout.remove(id)
    }

    pub fn listeners(&self) -> usize {
        self.fanout.len()
    }

    /// Whether the bus side went away. A closed subscription never delivers
    /// again.
    pub fn is_closed(&self) -> bool {
        self.fanout.closed.load(Ordering::Acquire)
    }

    /// Sends the sentinel to every listener and deregisters from the bus.
    pub async fn cancel(self) {
        self.pump.abort();
        // the stream, and with it the bus registration, is gone once the
        // aborted task has been reaped
        let _ = self.pump.await;
        for (_, tx) in self.fanout.drain() {
            let _ = tx.send(Signal::Unsubscribed);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("listeners", &self.listeners())
            .finish()
    }
}
