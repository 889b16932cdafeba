//! Tracking service: single-owner actor around the controller.
//!
//! # Architecture
//!
//! ```text
//! TrackingHandle ──Command──┐
//!                           ├──> TrackingService::run (select! loop)
//! sources / timers / sync ──┘         │
//!            (TrackingEvent)          ├── broadcast<TrackingNotice>
//!                                     └── watch<TrackingStatus>
//! ```
//!
//! Commands and events are handled one at a time, so the controller's
//! session state needs no locking.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use super::config::TrackingConfig;
use super::controller::TrackingController;
use super::error::TrackingError;
use super::event::{event_channel, EventReceiver, TrackingNotice};
use super::history::HistoryEntry;
use super::renderer::MapRenderer;
use super::source::PositionSource;
use super::status::TrackingStatus;
use crate::sync::LocationSync;
use crate::time::Clock;

/// Buffer size of the command channel.
const COMMAND_CHANNEL_CAPACITY: usize = 32;

/// Request sent from a [`TrackingHandle`] to the service loop.
#[derive(Debug)]
pub enum Command {
    Start(oneshot::Sender<Result<(), TrackingError>>),
    Stop(oneshot::Sender<()>),
    SetVisible(bool),
    SetOnline(bool),
    ShowHistoryEntry(usize, oneshot::Sender<Result<HistoryEntry, TrackingError>>),
    Shutdown(oneshot::Sender<()>),
}

/// Builder for [`TrackingService`].
pub struct TrackingServiceBuilder<S: LocationSync + 'static> {
    source: Arc<dyn PositionSource>,
    renderer: Arc<dyn MapRenderer>,
    sync: Arc<S>,
    config: TrackingConfig,
    clock: Option<Arc<dyn Clock>>,
}

impl<S: LocationSync + 'static> TrackingServiceBuilder<S> {
    pub fn config(mut self, config: TrackingConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Build the service and its first handle.
    pub fn build(self) -> (TrackingService<S>, TrackingHandle) {
        let (event_tx, event_rx) = event_channel();
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);

        let mut controller =
            TrackingController::new(self.config, self.source, self.renderer, self.sync, event_tx);
        if let Some(clock) = self.clock {
            controller = controller.with_clock(clock);
        }

        let handle = TrackingHandle {
            commands: command_tx,
            notices: controller.notice_sender(),
            status: controller.status_receiver(),
        };

        let service = TrackingService {
            controller,
            commands: command_rx,
            events: event_rx,
        };

        (service, handle)
    }
}

/// Owns the controller and drives it from commands and events.
pub struct TrackingService<S: LocationSync + 'static> {
    controller: TrackingController<S>,
    commands: mpsc::Receiver<Command>,
    events: EventReceiver,
}

impl<S: LocationSync + 'static> TrackingService<S> {
    /// Start building a service with default configuration.
    pub fn builder(
        source: Arc<dyn PositionSource>,
        renderer: Arc<dyn MapRenderer>,
        sync: Arc<S>,
    ) -> TrackingServiceBuilder<S> {
        TrackingServiceBuilder {
            source,
            renderer,
            sync,
            config: TrackingConfig::default(),
            clock: None,
        }
    }

    /// Run the service loop on a new task.
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Run until shut down or until every handle is dropped.
    pub async fn run(mut self) {
        tracing::debug!("Tracking service started");

        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    let Some(command) = command else {
                        tracing::debug!("All tracking handles dropped");
                        break;
                    };
                    if !self.handle_command(command) {
                        break;
                    }
                }
                Some(event) = self.events.recv() => {
                    self.controller.handle_event(event);
                }
            }
        }

        self.controller.stop();
        tracing::debug!("Tracking service stopped");
    }

    /// Returns false when the loop should exit.
    fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Start(reply) => {
                let _ = reply.send(self.controller.start());
            }
            Command::Stop(reply) => {
                self.controller.stop();
                let _ = reply.send(());
            }
            Command::SetVisible(visible) => self.controller.on_visibility_changed(visible),
            Command::SetOnline(online) => self.controller.on_connectivity_changed(online),
            Command::ShowHistoryEntry(index, reply) => {
                let _ = reply.send(self.controller.show_history_entry(index));
            }
            Command::Shutdown(reply) => {
                self.controller.stop();
                let _ = reply.send(());
                return false;
            }
        }
        true
    }
}

/// Cloneable handle to a running [`TrackingService`].
#[derive(Debug, Clone)]
pub struct TrackingHandle {
    commands: mpsc::Sender<Command>,
    notices: broadcast::Sender<TrackingNotice>,
    status: watch::Receiver<TrackingStatus>,
}

impl TrackingHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, TrackingError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| TrackingError::ServiceStopped)?;
        rx.await.map_err(|_| TrackingError::ServiceStopped)
    }

    async fn send(&self, command: Command) -> Result<(), TrackingError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| TrackingError::ServiceStopped)
    }

    /// Start tracking.
    pub async fn start(&self) -> Result<(), TrackingError> {
        self.request(Command::Start).await?
    }

    /// Stop tracking.
    pub async fn stop(&self) -> Result<(), TrackingError> {
        self.request(Command::Stop).await
    }

    /// Report visibility changes of the hosting app.
    pub async fn set_visible(&self, visible: bool) -> Result<(), TrackingError> {
        self.send(Command::SetVisible(visible)).await
    }

    /// Report network connectivity changes.
    pub async fn set_online(&self, online: bool) -> Result<(), TrackingError> {
        self.send(Command::SetOnline(online)).await
    }

    /// Re-centre the map on a history entry.
    pub async fn show_history_entry(&self, index: usize) -> Result<HistoryEntry, TrackingError> {
        self.request(|tx| Command::ShowHistoryEntry(index, tx))
            .await?
    }

    /// Stop tracking and end the service loop.
    pub async fn shutdown(&self) -> Result<(), TrackingError> {
        self.request(Command::Shutdown).await
    }

    /// Subscribe to user-visible notices.
    pub fn subscribe(&self) -> broadcast::Receiver<TrackingNotice> {
        self.notices.subscribe()
    }

    /// Latest status snapshot.
    pub fn status(&self) -> TrackingStatus {
        self.status.borrow().clone()
    }

    /// Receiver that is notified on every status change.
    pub fn status_receiver(&self) -> watch::Receiver<TrackingStatus> {
        self.status.clone()
    }
}
