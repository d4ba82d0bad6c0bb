//! Zero-buffer rendezvous handoff between tasks
//!
//! `send` completes only once a receiver has taken the item, so a saturated
//! consumer side throttles the producer. Any number of senders and receivers
//! may share one handoff.

use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};

struct Envelope<T> {
    item: T,
    taken: oneshot::Sender<()>,
}

/// The receiving side went away before taking the item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandoffClosed;

impl fmt::Display for HandoffClosed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("handoff closed")
    }
}

impl std::error::Error for HandoffClosed {}

pub struct HandoffSender<T> {
    tx: mpsc::Sender<Envelope<T>>,
}

impl<T> Clone for HandoffSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

pub struct HandoffReceiver<T> {
    rx: Arc<Mutex<mpsc::Receiver<Envelope<T>>>>,
}

impl<T> Clone for HandoffReceiver<T> {
    fn clone(&self) -> Self {
        Self {
            rx: Arc::clone(&self.rx),
        }
    }
}

/// Create a rendezvous handoff
pub fn rendezvous<T>() -> (HandoffSender<T>, HandoffReceiver<T>) {
    // The single slot only parks the envelope; the sender still waits for `taken`
    let (tx, rx) = mpsc::channel(1);
    (
        HandoffSender { tx },
        HandoffReceiver {
            rx: Arc::new(Mutex::new(rx)),
        },
    )
}

impl<T> HandoffSender<T> {
    /// Hand `item` over, waiting until a receiver has taken it
    pub async fn send(&self, item: T) -> Result<(), HandoffClosed> {
        let (taken, taken_rx) = oneshot::channel();
        self.tx
            .send(Envelope { item, taken })
            .await
            .map_err(|_| HandoffClosed)?;
        taken_rx.await.map_err(|_| HandoffClosed)
    }
}

impl<T> HandoffReceiver<T> {
    /// Take the next item; `None` once every sender is gone
    pub async fn recv(&self) -> Option<T> {
        let envelope = {
            let mut rx = self.rx.lock().await;
            rx.recv().await?
        };
        let _ = envelope.taken.send(());
        Some(envelope.item)
    }
}
