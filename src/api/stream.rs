//! Shared event-stream connection.
//!
//! One connection serves every consumer. Consumers hold a [`Subscription`];
//! the first attach opens the connection and the last subscription dropped
//! closes it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use url::Url;

use crate::api::events::{IncomingEvent, OutgoingEvent, ServerEvent};
use crate::error::{Result, SyncError};

const EVENT_BUFFER: usize = 256;

/// A live duplex text channel. Dropping it does not stop `tasks`; the hub aborts them.
/// A task draining `outgoing` belongs outside `tasks`: it must run until every
/// sender is gone so it can flush and close the connection.
pub struct Transport {
    pub incoming: mpsc::UnboundedReceiver<String>,
    pub outgoing: mpsc::UnboundedSender<String>,
    pub tasks: Vec<JoinHandle<()>>,
}

#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self) -> Result<Transport>;
}

pub struct WsConnector {
    url: Url,
}

impl WsConnector {
    pub fn new(url: Url) -> Self {
        Self { url }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> Result<Transport> {
        let (ws_stream, _) = connect_async(self.url.as_str()).await?;
        log::info!("event stream connected to {}", self.url);
        let (mut sink, mut stream) = ws_stream.split();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();

        let reader = tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(WsMessage::Text(text)) => {
                        if in_tx.send(text).is_err() {
                            break;
                        }
                    }
                    Ok(WsMessage::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        log::warn!("event stream read failed: {e}");
                        break;
                    }
                }
            }
            log::info!("event stream closed by peer");
        });

        // Detached: ends after the last outgoing sender drops.
        tokio::spawn(async move {
            while let Some(text) = out_rx.recv().await {
                if let Err(e) = sink.send(WsMessage::Text(text)).await {
                    log::warn!("event stream write failed: {e}");
                    break;
                }
            }
            if let Err(e) = sink.close().await {
                log::debug!("event stream close failed: {e}");
            }
        });

        Ok(Transport {
            incoming: in_rx,
            outgoing: out_tx,
            tasks: vec![reader],
        })
    }
}

struct Live {
    id: u64,
    events: broadcast::Sender<ServerEvent>,
    outgoing: mpsc::UnboundedSender<String>,
    tasks: Vec<JoinHandle<()>>,
}

impl Live {
    fn start(id: u64, transport: Transport, hub: Weak<StreamHub>) -> Self {
        let Transport {
            mut incoming,
            outgoing,
            mut tasks,
        } = transport;
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let tx = events.clone();
        tasks.push(tokio::spawn(async move {
            while let Some(frame) = incoming.recv().await {
                match IncomingEvent::parse(&frame).and_then(IncomingEvent::into_server_event) {
                    Ok(Some(event)) => {
                        // No subscribers right now is fine.
                        let _ = tx.send(event);
                    }
                    Ok(None) => log::debug!("skipping unhandled event frame"),
                    Err(e) => log::warn!("dropping malformed event frame: {e}"),
                }
            }
            drop(tx);
            if let Some(hub) = hub.upgrade() {
                hub.connection_lost(id);
            }
        }));
        Self {
            id,
            events,
            outgoing,
            tasks,
        }
    }
}

impl Drop for Live {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

#[derive(Default)]
struct HubState {
    live: Option<Live>,
    consumers: usize,
    connections: u64,
}

pub struct StreamHub {
    connector: Box<dyn Connector>,
    state: Mutex<HubState>,
}

impl StreamHub {
    pub fn new(connector: impl Connector) -> Arc<Self> {
        Arc::new(Self {
            connector: Box::new(connector),
            state: Mutex::new(HubState::default()),
        })
    }

    pub fn websocket(url: Url) -> Arc<Self> {
        Self::new(WsConnector::new(url))
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn subscribe(self: &Arc<Self>, state: &mut HubState) -> Option<Subscription> {
        let live = state.live.as_ref()?;
        state.consumers += 1;
        Some(Subscription {
            hub: Arc::clone(self),
            events: live.events.subscribe(),
            outgoing: live.outgoing.clone(),
        })
    }

    pub async fn attach(self: &Arc<Self>) -> Result<Subscription> {
        let shared = {
            let mut state = self.lock();
            self.subscribe(&mut state)
        };
        if let Some(sub) = shared {
            return Ok(sub);
        }

        let id = {
            let mut state = self.lock();
            state.connections += 1;
            state.connections
        };
        let transport = self.connector.connect().await?;
        let live = Live::start(id, transport, Arc::downgrade(self));

        let mut state = self.lock();
        if state.live.is_none() {
            state.live = Some(live);
        } else {
            // Someone else connected while we were connecting; ours is dropped and aborted.
            log::debug!("event stream attach raced, sharing existing connection");
        }
        self.subscribe(&mut state)
            .ok_or_else(|| SyncError::Stream("connection vanished during attach".into()))
    }

    fn detach(&self) {
        let mut state = self.lock();
        state.consumers = state.consumers.saturating_sub(1);
        if state.consumers == 0 && state.live.take().is_some() {
            log::info!("last consumer detached, closing event stream");
        }
    }

    /// The peer went away. Dropping the connection closes every subscription's
    /// event feed; the next attach reconnects.
    fn connection_lost(&self, id: u64) {
        let mut state = self.lock();
        if state.live.as_ref().is_some_and(|live| live.id == id) {
            log::warn!("event stream lost");
            state.live = None;
        }
    }

    pub fn consumers(&self) -> usize {
        self.lock().consumers
    }

    pub fn is_connected(&self) -> bool {
        self.lock().live.is_some()
    }
}

/// One consumer's view of the shared connection.
pub struct Subscription {
    hub: Arc<StreamHub>,
    events: broadcast::Receiver<ServerEvent>,
    outgoing: mpsc::UnboundedSender<String>,
}

impl Subscription {
    /// `None` once the connection is gone.
    pub async fn next_event(&mut self) -> Option<ServerEvent> {
        loop {
            match self.events.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!("event consumer lagged, {skipped} events skipped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn emit(&self, event: &OutgoingEvent) -> Result<()> {
        let frame = event.to_frame()?;
        self.outgoing
            .send(frame)
            .map_err(|_| SyncError::Stream("connection closed".into()))
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.detach();
    }
}
