//! Async driver around the [`Coordinator`]: executes its effects, feeds back
//! completions, push events, user commands and timer ticks.

use std::future::pending;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;

use crate::api::client::ApiClient;
use crate::api::events::{OutgoingEvent, ServerEvent};
use crate::api::stream::{StreamHub, Subscription};
use crate::app::AppConfig;
use crate::error::{Result, SyncError};
use crate::sync::{Completion, Coordinator, Effect, PlatformFilter, SyncSettings};
use crate::utils::run_async_to_loop;

/// What the user asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Open(String),
    Close,
    MoreConversations,
    OlderMessages,
    /// An empty query leaves search mode.
    Search(String),
    Platform(PlatformFilter),
    Keystroke,
    Send(String),
    Logout,
    Quit,
}

impl Command {
    /// Parses one input line. Lines not starting with `/` are messages.
    pub fn parse(line: &str) -> std::result::Result<Self, String> {
        let line = line.trim();
        let Some(rest) = line.strip_prefix('/') else {
            return Ok(Command::Send(line.to_string()));
        };
        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };
        match name {
            "open" if !arg.is_empty() => Ok(Command::Open(arg.to_string())),
            "open" => Err("usage: /open <conversation id>".into()),
            "close" => Ok(Command::Close),
            "more" => Ok(Command::MoreConversations),
            "older" => Ok(Command::OlderMessages),
            "search" => Ok(Command::Search(arg.to_string())),
            "platform" => PlatformFilter::parse(arg)
                .map(Command::Platform)
                .ok_or_else(|| format!("unknown platform {arg:?}, expected all, slack or gmail")),
            "typing" => Ok(Command::Keystroke),
            "logout" => Ok(Command::Logout),
            "quit" | "exit" => Ok(Command::Quit),
            other => Err(format!("unknown command /{other}")),
        }
    }
}

pub struct Session {
    coordinator: Coordinator,
    client: ApiClient,
    hub: Arc<StreamHub>,
    subscription: Option<Subscription>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
}

impl Session {
    pub fn new(settings: SyncSettings, client: ApiClient, hub: Arc<StreamHub>) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self {
            coordinator: Coordinator::new(settings),
            client,
            hub,
            subscription: None,
            completions_tx,
            completions_rx,
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let client = ApiClient::new(&config.backend_url())?;
        let hub = StreamHub::websocket(config.stream_url()?);
        Ok(Self::new(config.sync_settings(), client, hub))
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    /// Attaches to the event stream and requests the first conversation page.
    /// A stream failure is reported but REST keeps working without it.
    pub async fn start(&mut self) -> Option<SyncError> {
        let notice = match self.hub.attach().await {
            Ok(subscription) => {
                self.subscription = Some(subscription);
                None
            }
            Err(e) => {
                log::warn!("event stream unavailable: {e}");
                Some(e)
            }
        };
        self.coordinator.load_more_conversations();
        self.dispatch();
        notice
    }

    /// Runs until `Quit` or until the command channel closes. `render` is
    /// called after every handled input with the error it produced, if any.
    pub async fn run<F>(&mut self, mut commands: mpsc::UnboundedReceiver<Command>, mut render: F)
    where
        F: FnMut(&Coordinator, Option<&SyncError>),
    {
        let notice = self.start().await;
        render(&self.coordinator, notice.as_ref());

        loop {
            let deadline = self.coordinator.next_deadline();
            let notice = tokio::select! {
                event = next_stream_event(&mut self.subscription) => match event {
                    Some(event) => self.on_event(event),
                    None => {
                        log::warn!("event stream closed");
                        self.subscription = None;
                        Some(SyncError::Stream("event stream closed".into()))
                    }
                },
                Some(completion) = self.completions_rx.recv() => {
                    let result = self.coordinator.complete(completion);
                    self.report(result)
                }
                command = commands.recv() => match command {
                    None | Some(Command::Quit) => break,
                    Some(command) => self.command(command, Instant::now()),
                },
                _ = sleep_until(deadline) => {
                    self.coordinator.tick(Instant::now());
                    None
                }
            };
            self.dispatch();
            render(&self.coordinator, notice.as_ref());
        }

        self.shutdown();
    }

    pub fn command(&mut self, command: Command, now: Instant) -> Option<SyncError> {
        match command {
            Command::Open(id) => {
                self.coordinator.open_conversation(&id);
            }
            Command::Close => self.coordinator.close_conversation(),
            Command::MoreConversations => {
                if !self.coordinator.load_more_conversations() {
                    log::debug!("no more conversations to load");
                }
            }
            Command::OlderMessages => {
                if !self.coordinator.load_older_messages() {
                    log::debug!("no older messages to load");
                }
            }
            Command::Search(query) => self.coordinator.set_search_query(&query, now),
            Command::Platform(filter) => self.coordinator.set_platform(filter),
            Command::Keystroke => self.coordinator.keystroke(now),
            Command::Send(body) => {
                if self.coordinator.active_id().is_none() {
                    return Some(SyncError::NoActiveConversation);
                }
                if body.trim().is_empty() {
                    return None;
                }
                self.coordinator.keystroke(now);
                self.coordinator.send(&body);
            }
            Command::Logout => {
                self.coordinator.end_session();
                self.coordinator.load_more_conversations();
            }
            Command::Quit => {}
        }
        None
    }

    fn on_event(&mut self, event: ServerEvent) -> Option<SyncError> {
        let result = self.coordinator.handle_event(event, Instant::now());
        self.report(result)
    }

    fn report(&self, result: Result<()>) -> Option<SyncError> {
        match result {
            Ok(()) => None,
            Err(e) if e.is_stale() => {
                log::debug!("dropped stale result");
                None
            }
            Err(e) => {
                log::warn!("{e}");
                Some(e)
            }
        }
    }

    /// Starts every queued effect; outcomes arrive on the completion channel.
    pub fn dispatch(&mut self) {
        for effect in self.coordinator.take_effects() {
            match effect {
                Effect::FetchConversations { page, limit } => {
                    let client = self.client.clone();
                    run_async_to_loop(&self.completions_tx, async move {
                        Completion::Conversations {
                            page,
                            result: client.conversations(page, limit).await,
                        }
                    });
                }
                Effect::FetchMessages {
                    conversation_id,
                    page,
                    limit,
                } => {
                    let client = self.client.clone();
                    let identity = self.coordinator.settings().local_identity.clone();
                    run_async_to_loop(&self.completions_tx, async move {
                        let result = client
                            .messages(&conversation_id, page, limit, &identity)
                            .await;
                        Completion::Messages {
                            conversation_id,
                            page,
                            result,
                        }
                    });
                }
                Effect::Search(req) => {
                    let client = self.client.clone();
                    run_async_to_loop(&self.completions_tx, async move {
                        Completion::Search {
                            seq: req.seq,
                            page: req.page,
                            result: client
                                .search_conversations(&req.query, req.page, req.limit)
                                .await,
                        }
                    });
                }
                Effect::SendMessage {
                    conversation_id,
                    temp_id,
                    request,
                } => {
                    let client = self.client.clone();
                    let identity = self.coordinator.settings().local_identity.clone();
                    run_async_to_loop(&self.completions_tx, async move {
                        Completion::Sent {
                            conversation_id,
                            temp_id,
                            result: client.send_message(&request, &identity).await,
                        }
                    });
                }
                Effect::StreamSend {
                    conversation_id,
                    temp_id,
                    event,
                } => {
                    if let Err(e) = self.emit(&event) {
                        let _ = self.completions_tx.send(Completion::Sent {
                            conversation_id,
                            temp_id,
                            result: Err(e),
                        });
                    }
                }
                Effect::Emit(event) => {
                    if let Err(e) = self.emit(&event) {
                        log::debug!("dropping {event:?}: {e}");
                    }
                }
            }
        }
    }

    fn emit(&self, event: &OutgoingEvent) -> Result<()> {
        let Some(subscription) = &self.subscription else {
            return Err(SyncError::Stream("not connected".into()));
        };
        subscription.emit(event).inspect_err(|e| {
            log::warn!("emit to {} failed: {e}", event.conversation_id());
        })
    }

    /// Stops typing, clears all session state and lets go of the stream.
    pub fn shutdown(&mut self) {
        self.coordinator.close_conversation();
        self.dispatch();
        self.coordinator.end_session();
        self.subscription = None;
    }
}

async fn next_stream_event(subscription: &mut Option<Subscription>) -> Option<ServerEvent> {
    match subscription {
        Some(sub) => sub.next_event().await,
        None => pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
        None => pending().await,
    }
}
