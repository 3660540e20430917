//! The single playback session: one serialized executor plus a cloneable handle.
//!
//! Catalog reads go straight through the handle and run concurrently.
//! Everything that touches queue or playback state becomes a
//! [`SessionCommand`] consumed in arrival order by [`Session::run`].

use std::sync::Arc;

use log::{debug, info, warn};
use serde_json::Value;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::catalog::library_tree::track_derived_categories;
use crate::catalog::{BrowseOutcome, BrowseRequests, ChangeFanout, MediaCatalog, SearchExtras};
use crate::command_dispatcher::{CommandContext, CommandDispatcher, CommandResult};
use crate::config::Config;
use crate::media_id::MediaId;
use crate::playback::engine::{EngineCallbacks, PlaybackEngine};
use crate::playback::state_machine::PlaybackStateMachine;
use crate::preferences::SessionPreferences;
use crate::protocol::{CatalogItem, EngineEvent, PlaybackStatus, SessionEvent, TransportCommand};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("session is no longer running")]
    Closed,
}

/// Work item for the session executor.
pub enum SessionCommand {
    Transport(TransportCommand),
    Engine(EngineEvent),
    Custom {
        name: String,
        params: Value,
        reply: oneshot::Sender<CommandResult>,
    },
    Status(oneshot::Sender<PlaybackStatus>),
    Shutdown,
}

pub struct Session {
    catalog: Arc<MediaCatalog>,
    state_machine: PlaybackStateMachine,
    dispatcher: CommandDispatcher,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    background: Vec<JoinHandle<()>>,
}

/// Cloneable entry point for control surfaces.
#[derive(Clone)]
pub struct SessionHandle {
    catalog: Arc<MediaCatalog>,
    browse_requests: BrowseRequests,
    commands: mpsc::UnboundedSender<SessionCommand>,
    bus_producer: broadcast::Sender<SessionEvent>,
}

fn forward_invalidations(
    mut invalidations: broadcast::Receiver<MediaId>,
    bus_producer: broadcast::Sender<SessionEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match invalidations.recv().await {
                Ok(parent) => {
                    let _ = bus_producer.send(SessionEvent::ChildrenInvalidated(parent));
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(
                        "Session: dropped {} invalidations, republishing track views",
                        skipped
                    );
                    for parent in track_derived_categories() {
                        let _ = bus_producer.send(SessionEvent::ChildrenInvalidated(parent));
                    }
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

impl Session {
    /// Builds the session and starts its executor on the current runtime.
    /// The engine is created with callbacks that feed the same executor.
    pub fn spawn<F>(
        catalog: MediaCatalog,
        preferences: SessionPreferences,
        dispatcher: CommandDispatcher,
        config: &Config,
        make_engine: F,
    ) -> (SessionHandle, JoinHandle<()>)
    where
        F: FnOnce(EngineCallbacks) -> Box<dyn PlaybackEngine>,
    {
        let capacity = config.session.event_bus_capacity.max(1);
        let (bus_producer, _) = broadcast::channel(capacity);
        let (command_sender, commands) = mpsc::unbounded_channel();
        let catalog = Arc::new(catalog);

        let fanout = ChangeFanout::new(capacity);
        let forwarder = forward_invalidations(fanout.subscribe(), bus_producer.clone());
        let fanout_task = fanout.spawn(catalog.source().subscribe_changes());

        let engine = make_engine(EngineCallbacks::new(command_sender.clone()));
        let state_machine = PlaybackStateMachine::new(
            engine,
            preferences,
            &config.playback,
            bus_producer.clone(),
        );

        let session = Session {
            catalog: Arc::clone(&catalog),
            state_machine,
            dispatcher,
            commands,
            background: vec![fanout_task, forwarder],
        };
        let task = tokio::spawn(session.run());

        let handle = SessionHandle {
            catalog,
            browse_requests: BrowseRequests::new(),
            commands: command_sender,
            bus_producer,
        };
        (handle, task)
    }

    async fn run(mut self) {
        info!("Session: started");
        // Rebuild the last queue so the first play resumes where we left off.
        self.state_machine
            .handle_command(&self.catalog, TransportCommand::Prepare)
            .await;

        while let Some(command) = self.commands.recv().await {
            match command {
                SessionCommand::Transport(command) => {
                    self.state_machine
                        .handle_command(&self.catalog, command)
                        .await;
                }
                SessionCommand::Engine(event) => self.state_machine.handle_engine_event(event),
                SessionCommand::Custom {
                    name,
                    params,
                    reply,
                } => {
                    let context = CommandContext {
                        current_media_id: self.state_machine.current_media_id(),
                    };
                    self.dispatcher.dispatch(
                        &name,
                        &context,
                        params,
                        Box::new(move |result| {
                            let _ = reply.send(result);
                        }),
                    );
                }
                SessionCommand::Status(reply) => {
                    let _ = reply.send(self.state_machine.status());
                }
                SessionCommand::Shutdown => {
                    debug!("Session: shutdown requested");
                    break;
                }
            }
        }

        for task in self.background.drain(..) {
            task.abort();
        }
        info!("Session: stopped");
    }
}

impl SessionHandle {
    pub async fn get_children(&self, parent: &MediaId) -> Option<Vec<CatalogItem>> {
        self.catalog.get_children(parent).await
    }

    pub async fn get_item(&self, id: &MediaId) -> Option<CatalogItem> {
        self.catalog.get_item(id).await
    }

    pub async fn search(&self, query: &str, extras: &SearchExtras) -> Vec<CatalogItem> {
        self.catalog.search(query, extras).await
    }

    /// Like [`SessionHandle::get_children`], but reports [`BrowseOutcome::Superseded`]
    /// when a newer browse of the same parent started meanwhile.
    pub async fn browse(&self, parent: &MediaId) -> BrowseOutcome {
        let ticket = self.browse_requests.begin(parent);
        let children = self.catalog.get_children(parent).await;
        self.browse_requests.finish(ticket, children)
    }

    fn enqueue(&self, command: SessionCommand) -> Result<(), SessionError> {
        self.commands
            .send(command)
            .map_err(|_| SessionError::Closed)
    }

    pub fn send(&self, command: TransportCommand) -> Result<(), SessionError> {
        self.enqueue(SessionCommand::Transport(command))
    }

    pub async fn custom_command(
        &self,
        name: impl Into<String>,
        params: Value,
    ) -> Result<CommandResult, SessionError> {
        let (reply, result) = oneshot::channel();
        self.enqueue(SessionCommand::Custom {
            name: name.into(),
            params,
            reply,
        })?;
        result.await.map_err(|_| SessionError::Closed)
    }

    /// Status after every command queued before this call has been applied.
    pub async fn status(&self) -> Result<PlaybackStatus, SessionError> {
        let (reply, status) = oneshot::channel();
        self.enqueue(SessionCommand::Status(reply))?;
        status.await.map_err(|_| SessionError::Closed)
    }

    /// Late subscribers miss earlier events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.bus_producer.subscribe()
    }

    pub fn engine_callbacks(&self) -> EngineCallbacks {
        EngineCallbacks::new(self.commands.clone())
    }

    pub fn shutdown(&self) -> Result<(), SessionError> {
        self.enqueue(SessionCommand::Shutdown)
    }
}
