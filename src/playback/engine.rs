use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, trace, warn};
use tokio::sync::mpsc;

use crate::protocol::{EngineEvent, EngineState, QueueItem};
use crate::session::SessionCommand;

/// Audio renderer driven by the playback state machine.
///
/// Calls arrive from the serialized session executor. Asynchronous progress
/// is reported back through [`EngineCallbacks`].
pub trait PlaybackEngine: Send {
    /// Starts `item` from position 0.
    fn play(&mut self, item: &QueueItem);
    fn pause(&mut self);
    fn seek_to(&mut self, position_ms: u64);
    /// Releases the current item.
    fn stop(&mut self);
    fn current_position(&self) -> u64;
    fn is_playing(&self) -> bool;
    fn state(&self) -> EngineState;
}

/// Engine-side callback surface. Every callback is queued on the session executor.
#[derive(Clone)]
pub struct EngineCallbacks {
    commands: mpsc::UnboundedSender<SessionCommand>,
}

impl EngineCallbacks {
    pub(crate) fn new(commands: mpsc::UnboundedSender<SessionCommand>) -> Self {
        Self { commands }
    }

    fn send(&self, event: EngineEvent) {
        if self.commands.send(SessionCommand::Engine(event)).is_err() {
            trace!("EngineCallbacks: session is gone, dropping engine event");
        }
    }

    pub fn on_playback_status_changed(&self, state: EngineState) {
        self.send(EngineEvent::StatusChanged(state));
    }

    pub fn on_completion(&self) {
        self.send(EngineEvent::Completion);
    }

    pub fn on_error(&self, message: impl Into<String>) {
        self.send(EngineEvent::Error(message.into()));
    }
}

/// Engine that renders nothing and advances a wall clock, reporting
/// completion when an item's duration elapses.
pub struct SimulatedEngine {
    callbacks: EngineCallbacks,
    state: EngineState,
    duration_ms: u64,
    position_base_ms: u64,
    started_at: Option<Instant>,
    // Bumped on every transport call so stale completion timers do nothing.
    timer_generation: Arc<AtomicU64>,
}

impl SimulatedEngine {
    pub fn new(callbacks: EngineCallbacks) -> Self {
        Self {
            callbacks,
            state: EngineState::Idle,
            duration_ms: 0,
            position_base_ms: 0,
            started_at: None,
            timer_generation: Arc::new(AtomicU64::new(0)),
        }
    }

    fn elapsed_ms(&self) -> u64 {
        self.started_at
            .map(|started_at| started_at.elapsed().as_millis() as u64)
            .unwrap_or(0)
    }

    fn cancel_timer(&self) -> u64 {
        self.timer_generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn schedule_completion(&self) {
        let generation = self.cancel_timer();
        let remaining_ms = self.duration_ms.saturating_sub(self.position_base_ms);
        let timer_generation = Arc::clone(&self.timer_generation);
        let callbacks = self.callbacks.clone();

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("SimulatedEngine: no runtime, completion will not be reported");
            return;
        };
        runtime.spawn(async move {
            tokio::time::sleep(Duration::from_millis(remaining_ms)).await;
            if timer_generation.load(Ordering::SeqCst) == generation {
                callbacks.on_completion();
            }
        });
    }

    fn resume_clock(&mut self) {
        self.started_at = Some(Instant::now());
        self.state = EngineState::Playing;
        self.schedule_completion();
        self.callbacks
            .on_playback_status_changed(EngineState::Playing);
    }

    fn freeze_clock(&mut self) {
        self.position_base_ms = self.current_position();
        self.started_at = None;
        self.cancel_timer();
    }
}

impl PlaybackEngine for SimulatedEngine {
    fn play(&mut self, item: &QueueItem) {
        info!(
            "SimulatedEngine: playing {} ({})",
            item.description.title, item.media_id
        );
        self.duration_ms = item.description.duration_ms().unwrap_or(0);
        self.position_base_ms = 0;
        self.resume_clock();
    }

    fn pause(&mut self) {
        if self.state != EngineState::Playing {
            return;
        }
        self.freeze_clock();
        self.state = EngineState::Paused;
        debug!("SimulatedEngine: paused at {}ms", self.position_base_ms);
        self.callbacks
            .on_playback_status_changed(EngineState::Paused);
    }

    fn seek_to(&mut self, position_ms: u64) {
        let was_playing = self.state == EngineState::Playing;
        self.freeze_clock();
        self.position_base_ms = position_ms.min(self.duration_ms);
        debug!("SimulatedEngine: seek to {}ms", self.position_base_ms);
        if was_playing {
            self.started_at = Some(Instant::now());
            self.schedule_completion();
        }
    }

    fn stop(&mut self) {
        if self.state == EngineState::Stopped || self.state == EngineState::Idle {
            return;
        }
        self.freeze_clock();
        self.state = EngineState::Stopped;
        debug!("SimulatedEngine: stopped");
        self.callbacks
            .on_playback_status_changed(EngineState::Stopped);
    }

    fn current_position(&self) -> u64 {
        (self.position_base_ms + self.elapsed_ms()).min(self.duration_ms)
    }

    fn is_playing(&self) -> bool {
        self.state == EngineState::Playing
    }

    fn state(&self) -> EngineState {
        self.state
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::media_id::MediaId;
    use crate::protocol::{CatalogItem, CatalogItemKind};

    fn item(duration_ms: u64) -> QueueItem {
        let media_id = MediaId::of_track("tracks", "all", "1");
        QueueItem {
            media_id: media_id.clone(),
            description: CatalogItem {
                media_id,
                title: "A".to_string(),
                subtitle: String::new(),
                artwork: None,
                kind: CatalogItemKind::Playable {
                    duration_ms,
                    disc_number: 1,
                    track_number: 1,
                    source: "/music/1.flac".to_string(),
                },
            },
            queue_id: 0,
        }
    }

    async fn next_event(
        receiver: &mut mpsc::UnboundedReceiver<SessionCommand>,
    ) -> Option<EngineEvent> {
        match tokio::time::timeout(Duration::from_secs(1), receiver.recv()).await {
            Ok(Some(SessionCommand::Engine(event))) => Some(event),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_simulated_engine_reports_status_and_completion() {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let mut engine = SimulatedEngine::new(EngineCallbacks::new(sender));

        engine.play(&item(20));
        assert!(engine.is_playing());
        assert_eq!(
            next_event(&mut receiver).await,
            Some(EngineEvent::StatusChanged(EngineState::Playing))
        );
        assert_eq!(next_event(&mut receiver).await, Some(EngineEvent::Completion));
        assert_eq!(engine.current_position(), 20);
    }

    #[tokio::test]
    async fn test_paused_engine_does_not_complete() {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let mut engine = SimulatedEngine::new(EngineCallbacks::new(sender));

        engine.play(&item(50));
        engine.pause();
        assert_eq!(engine.state(), EngineState::Paused);
        assert_eq!(
            next_event(&mut receiver).await,
            Some(EngineEvent::StatusChanged(EngineState::Playing))
        );
        assert_eq!(
            next_event(&mut receiver).await,
            Some(EngineEvent::StatusChanged(EngineState::Paused))
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_seek_is_clamped_to_duration() {
        let (sender, _receiver) = mpsc::unbounded_channel();
        let mut engine = SimulatedEngine::new(EngineCallbacks::new(sender));
        engine.play(&item(60_000));
        engine.pause();

        engine.seek_to(90_000);
        assert_eq!(engine.current_position(), 60_000);
        engine.seek_to(1_500);
        assert_eq!(engine.current_position(), 1_500);
    }
}
