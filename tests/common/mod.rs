#![allow(dead_code)]

pub mod backend;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chat_sync::api::stream::{Connector, Transport};
use chat_sync::error::{Result, SyncError};
use tokio::sync::mpsc;

/// Server side of one in-memory connection.
pub struct Peer {
    pub to_client: mpsc::UnboundedSender<String>,
    pub from_client: mpsc::UnboundedReceiver<String>,
}

impl Peer {
    pub fn push(&self, frame: serde_json::Value) {
        self.to_client.send(frame.to_string()).unwrap();
    }

    pub async fn next_frame(&mut self) -> serde_json::Value {
        let frame = tokio::time::timeout(Duration::from_secs(2), self.from_client.recv())
            .await
            .expect("no frame from client")
            .expect("client side closed");
        serde_json::from_str(&frame).unwrap()
    }
}

/// Hands out a fresh channel pair per connect and keeps the server ends.
#[derive(Clone, Default)]
pub struct MemoryConnector {
    pub connects: Arc<AtomicUsize>,
    pub peers: Arc<Mutex<Vec<Peer>>>,
    pub refuse: Arc<AtomicBool>,
}

impl MemoryConnector {
    /// A connector whose every connect fails.
    pub fn refusing() -> Self {
        let connector = Self::default();
        connector.refuse.store(true, Ordering::SeqCst);
        connector
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn take_peer(&self) -> Peer {
        self.peers.lock().unwrap().remove(0)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self) -> Result<Transport> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.refuse.load(Ordering::SeqCst) {
            return Err(SyncError::Stream("connection refused".into()));
        }
        let (to_client, incoming) = mpsc::unbounded_channel();
        let (outgoing, from_client) = mpsc::unbounded_channel();
        self.peers.lock().unwrap().push(Peer {
            to_client,
            from_client,
        });
        Ok(Transport {
            incoming,
            outgoing,
            tasks: Vec::new(),
        })
    }
}

/// Polls `check` until it holds or two seconds pass.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !check() {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
