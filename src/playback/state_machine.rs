//! Transport state machine for the single playback session.
//!
//! Every transport command and engine callback is applied here, one at a
//! time, by the session executor. After each transition the advertised
//! [`PlaybackStatus`] is recomputed and published on the session bus.

use log::{debug, error, info, trace, warn};
use tokio::sync::broadcast::Sender;

use crate::catalog::MediaCatalog;
use crate::config::PlaybackConfig;
use crate::media_id::MediaId;
use crate::playback::actions::PlaybackActions;
use crate::playback::engine::PlaybackEngine;
use crate::preferences::{PreferenceError, SessionPreferences};
use crate::protocol::{
    EngineEvent, EngineState, PlaybackState, PlaybackStatus, QueueItem, RepeatMode, SessionEvent,
    ShuffleMode, TransportCommand,
};
use crate::queue_manager::{LoadKind, LoadOutcome, QueueManager, QueueSelector};

pub struct PlaybackStateMachine {
    engine: Box<dyn PlaybackEngine>,
    preferences: SessionPreferences,
    queue: QueueManager,
    status: PlaybackStatus,
    published: Option<PlaybackStatus>,
    announced: Option<(u64, MediaId)>,
    // Item the engine was last told to play.
    loaded_media_id: Option<MediaId>,
    // Item `status.position_ms` belongs to.
    position_media_id: Option<MediaId>,
    pending_pause: bool,
    skip_previous_threshold_ms: u64,
    bus_producer: Sender<SessionEvent>,
}

fn or_default<T: Default>(result: Result<T, PreferenceError>, what: &str) -> T {
    result.unwrap_or_else(|err| {
        warn!(
            "PlaybackStateMachine: failed to read {}, using default: {}",
            what, err
        );
        T::default()
    })
}

impl PlaybackStateMachine {
    pub fn new(
        engine: Box<dyn PlaybackEngine>,
        preferences: SessionPreferences,
        playback_config: &PlaybackConfig,
        bus_producer: Sender<SessionEvent>,
    ) -> Self {
        let shuffle_mode = or_default(preferences.shuffle_mode(), "shuffle mode");
        let repeat_mode = or_default(preferences.repeat_mode(), "repeat mode");
        let generation = or_default(
            preferences.queue_generation_counter(),
            "queue generation counter",
        );
        info!(
            "PlaybackStateMachine: restored shuffle={} repeat={} generation={}",
            shuffle_mode.as_str(),
            repeat_mode.as_str(),
            generation
        );

        let mut machine = Self {
            engine,
            preferences,
            queue: QueueManager::new(shuffle_mode, repeat_mode, generation),
            status: PlaybackStatus::default(),
            published: None,
            announced: None,
            loaded_media_id: None,
            position_media_id: None,
            pending_pause: false,
            skip_previous_threshold_ms: playback_config.skip_previous_threshold_ms,
            bus_producer,
        };
        machine.refresh_status();
        machine
    }

    /// Status as of the last transition, with a fresh engine position.
    pub fn status(&mut self) -> PlaybackStatus {
        self.refresh_status();
        self.status.clone()
    }

    pub fn current_media_id(&self) -> Option<MediaId> {
        self.queue.current().map(|item| item.media_id.clone())
    }

    pub async fn handle_command(&mut self, catalog: &MediaCatalog, command: TransportCommand) {
        debug!("PlaybackStateMachine: received {}", command.name());
        match command {
            TransportCommand::Play => self.play(catalog).await,
            TransportCommand::Pause => self.pause(),
            TransportCommand::Stop => self.stop(None),
            TransportCommand::SeekTo(position_ms) => self.seek_to(position_ms),
            TransportCommand::SkipToPrevious => self.skip_to_previous(),
            TransportCommand::SkipToNext => self.skip_by(1),
            TransportCommand::SkipToQueueItem(queue_id) => self.skip_to_queue_item(queue_id),
            TransportCommand::PlayFromMediaId { media_id, shuffled } => {
                self.play_from_media_id(catalog, &media_id, shuffled).await
            }
            TransportCommand::SetShuffleMode(mode) => self.set_shuffle_mode(mode),
            TransportCommand::SetRepeatMode(mode) => self.set_repeat_mode(mode),
            TransportCommand::Prepare => self.prepare(catalog).await,
        }
        self.publish();
    }

    pub fn handle_engine_event(&mut self, event: EngineEvent) {
        trace!("PlaybackStateMachine: engine event {:?}", event);
        match event {
            EngineEvent::StatusChanged(engine_state) => self.mirror_engine_state(engine_state),
            EngineEvent::Completion => self.handle_completion(),
            EngineEvent::Error(message) => self.handle_engine_error(message),
        }
        self.publish();
    }

    fn persist(&self, what: &str, result: Result<(), PreferenceError>) {
        if let Err(err) = result {
            warn!("PlaybackStateMachine: failed to persist {}: {}", what, err);
        }
    }

    fn current_is_loaded(&self) -> bool {
        match (self.queue.current(), self.loaded_media_id.as_ref()) {
            (Some(current), Some(loaded)) => &current.media_id == loaded,
            _ => false,
        }
    }

    fn playback_position(&self) -> u64 {
        let current = self.queue.current().map(|item| &item.media_id);
        if self.current_is_loaded() && self.status.state.is_active() {
            self.engine.current_position()
        } else if current.is_some() && self.position_media_id.as_ref() == current {
            self.status.position_ms
        } else {
            0
        }
    }

    fn capture_position(&mut self) {
        if self.current_is_loaded() {
            self.status.position_ms = self.engine.current_position();
            self.position_media_id = self.loaded_media_id.clone();
        }
    }

    async fn restore_last_queue(&mut self, catalog: &MediaCatalog) -> bool {
        let last_played = match self.preferences.last_played_media_id() {
            Ok(Some(media_id)) => media_id,
            Ok(None) => {
                debug!("PlaybackStateMachine: no last played item to restore");
                return false;
            }
            Err(err) => {
                warn!("PlaybackStateMachine: failed to read last played item: {}", err);
                return false;
            }
        };

        match self
            .queue
            .load_queue(catalog, &last_played, LoadKind::Resume)
            .await
        {
            LoadOutcome::Rejected => {
                warn!(
                    "PlaybackStateMachine: last played item {} no longer resolves",
                    last_played
                );
                false
            }
            _ => {
                info!("PlaybackStateMachine: restored queue around {}", last_played);
                self.publish_queue();
                self.queue.current().is_some()
            }
        }
    }

    fn start_item(&mut self, item: QueueItem, start_ms: u64) {
        self.engine.play(&item);
        if start_ms > 0 {
            self.engine.seek_to(start_ms);
        }
        if self.loaded_media_id.as_ref() != Some(&item.media_id) {
            self.persist(
                "last played item",
                self.preferences.set_last_played_media_id(&item.media_id),
            );
        }
        info!(
            "PlaybackStateMachine: playing {} from {}ms",
            item.media_id, start_ms
        );

        self.loaded_media_id = Some(item.media_id.clone());
        self.position_media_id = Some(item.media_id);
        self.status.position_ms = start_ms;
        self.status.last_stop_reason = None;
        self.pending_pause = false;
        self.status.state = if self.engine.state() == EngineState::Buffering {
            PlaybackState::Buffering
        } else {
            PlaybackState::Playing
        };
    }

    async fn play(&mut self, catalog: &MediaCatalog) {
        if self.queue.current().is_none() && !self.restore_last_queue(catalog).await {
            debug!("PlaybackStateMachine: nothing to play");
            return;
        }
        let Some(item) = self.queue.current().cloned() else {
            return;
        };
        if self.status.state.is_active() && self.current_is_loaded() {
            trace!("PlaybackStateMachine: {} already playing", item.media_id);
            return;
        }

        let resume_at = if self.position_media_id.as_ref() == Some(&item.media_id) {
            self.status.position_ms
        } else {
            0
        };
        self.start_item(item, resume_at);
    }

    fn pause(&mut self) {
        match self.status.state {
            PlaybackState::Playing => {
                if self.engine.is_playing() {
                    self.engine.pause();
                }
                self.capture_position();
                self.status.state = PlaybackState::Paused;
            }
            PlaybackState::Buffering => {
                debug!("PlaybackStateMachine: pause recorded while buffering");
                self.pending_pause = true;
            }
            ref state => trace!("PlaybackStateMachine: ignoring pause in {:?}", state),
        }
    }

    fn stop(&mut self, reason: Option<String>) {
        if self.status.state.is_active() || self.status.state == PlaybackState::Paused {
            self.capture_position();
        }
        self.engine.stop();
        self.loaded_media_id = None;
        self.pending_pause = false;
        self.status.state = PlaybackState::Stopped;
        match reason.as_deref() {
            Some(reason) => info!("PlaybackStateMachine: stopped: {}", reason),
            None => debug!("PlaybackStateMachine: stopped"),
        }
        self.status.last_stop_reason = reason;
    }

    fn seek_to(&mut self, position_ms: u64) {
        let Some(current) = self.current_media_id() else {
            trace!("PlaybackStateMachine: no current item, ignoring seek");
            return;
        };
        if self.current_is_loaded() {
            self.engine.seek_to(position_ms);
        }
        self.status.position_ms = position_ms;
        self.position_media_id = Some(current);
    }

    fn skip_to_previous(&mut self) {
        let position = self.playback_position();
        if self.queue.current().is_some() && position >= self.skip_previous_threshold_ms {
            debug!(
                "PlaybackStateMachine: {}ms into item, restarting it",
                position
            );
            self.seek_to(0);
            return;
        }
        self.skip_by(-1);
    }

    fn skip_by(&mut self, steps: i64) {
        let was_active = self.status.state.is_active();
        if !self.queue.skip_explicit(steps) {
            let reason = match self.queue.current() {
                None => "Cannot skip: no queue is loaded",
                Some(_) if steps > 0 => "Cannot skip to next: already at the last item",
                Some(_) => "Cannot skip to previous: already at the first item",
            };
            self.stop(Some(reason.to_string()));
            return;
        }
        self.enter_current(was_active);
    }

    fn skip_to_queue_item(&mut self, queue_id: u64) {
        let was_active = self.status.state.is_active();
        if !self
            .queue
            .set_current_item(&QueueSelector::QueueId(queue_id))
        {
            debug!("PlaybackStateMachine: no queue item {}, ignoring", queue_id);
            return;
        }
        self.enter_current(was_active);
    }

    // Plays the new current item if playback was active, else parks on it at 0.
    fn enter_current(&mut self, was_active: bool) {
        let Some(item) = self.queue.current().cloned() else {
            return;
        };
        if was_active {
            self.start_item(item, 0);
        } else {
            debug!(
                "PlaybackStateMachine: moved to {} without playing",
                item.media_id
            );
            self.status.position_ms = 0;
            self.position_media_id = Some(item.media_id);
        }
    }

    async fn play_from_media_id(
        &mut self,
        catalog: &MediaCatalog,
        media_id: &MediaId,
        shuffled: Option<bool>,
    ) {
        if let Some(shuffled) = shuffled {
            let mode = if shuffled {
                ShuffleMode::All
            } else {
                ShuffleMode::None
            };
            if mode != self.queue.shuffle_mode() {
                self.set_shuffle_mode(mode);
            }
        }

        match self
            .queue
            .load_queue(catalog, media_id, LoadKind::Explicit)
            .await
        {
            LoadOutcome::Rejected => {
                self.stop(Some(format!("Nothing playable under {}", media_id)));
                return;
            }
            LoadOutcome::Rebuilt => self.persist(
                "queue generation counter",
                self.preferences
                    .set_queue_generation_counter(self.queue.generation()),
            ),
            LoadOutcome::Repositioned | LoadOutcome::Unchanged => {}
        }
        self.publish_queue();

        match self.queue.current().cloned() {
            Some(item) if media_id.track().is_some() && item.media_id != *media_id => {
                self.stop(Some(format!("{} is not in the library", media_id)));
            }
            Some(item) => self.start_item(item, 0),
            None => self.stop(Some(format!("{} has no playable items", media_id))),
        }
    }

    fn set_shuffle_mode(&mut self, mode: ShuffleMode) {
        self.queue.set_shuffle_mode(mode);
        self.persist("shuffle mode", self.preferences.set_shuffle_mode(mode));
        self.publish_queue();
    }

    fn set_repeat_mode(&mut self, mode: RepeatMode) {
        self.queue.set_repeat_mode(mode);
        self.persist("repeat mode", self.preferences.set_repeat_mode(mode));
    }

    async fn prepare(&mut self, catalog: &MediaCatalog) {
        if self.queue.queue().is_some() {
            trace!("PlaybackStateMachine: queue already prepared");
            return;
        }
        self.restore_last_queue(catalog).await;
    }

    fn mirror_engine_state(&mut self, engine_state: EngineState) {
        let next = match engine_state {
            EngineState::Idle => return,
            EngineState::Buffering => PlaybackState::Buffering,
            EngineState::Playing => PlaybackState::Playing,
            EngineState::Paused => PlaybackState::Paused,
            EngineState::Stopped => PlaybackState::Stopped,
        };
        if matches!(self.status.state, PlaybackState::Error(_)) && !next.is_active() {
            return;
        }
        if next.is_active()
            && self.status.state == PlaybackState::Stopped
            && self.loaded_media_id.is_none()
        {
            trace!("PlaybackStateMachine: ignoring stale {:?} after stop", engine_state);
            return;
        }
        if next == PlaybackState::Playing && self.pending_pause {
            debug!("PlaybackStateMachine: applying pause recorded while buffering");
            self.pending_pause = false;
            self.engine.pause();
            self.capture_position();
            self.status.state = PlaybackState::Paused;
            return;
        }
        self.status.state = next;
    }

    fn handle_completion(&mut self) {
        let state = &self.status.state;
        if !(state.is_active() || *state == PlaybackState::Paused) {
            trace!("PlaybackStateMachine: ignoring completion in {:?}", state);
            return;
        }
        if self.queue.skip(1) {
            if let Some(item) = self.queue.current().cloned() {
                self.start_item(item, 0);
                return;
            }
        }

        info!("PlaybackStateMachine: reached the end of the queue");
        self.engine.stop();
        self.pending_pause = false;
        self.status.state = PlaybackState::Stopped;
        self.status.position_ms = 0;
        self.position_media_id = self.loaded_media_id.take();
        self.status.last_stop_reason = None;
    }

    fn handle_engine_error(&mut self, message: String) {
        error!("PlaybackStateMachine: engine error: {}", message);
        self.capture_position();
        self.pending_pause = false;
        self.status.state = PlaybackState::Error(message);
    }

    fn compute_actions(&self) -> PlaybackActions {
        let mut actions = PlaybackActions::ALWAYS;
        actions.set(PlaybackActions::PAUSE, self.status.state.is_active());
        actions.set(PlaybackActions::SEEK_TO, self.queue.current().is_some());
        actions.set(
            PlaybackActions::SKIP_TO_PREVIOUS,
            self.queue.can_skip_explicit(-1),
        );
        actions.set(PlaybackActions::SKIP_TO_NEXT, self.queue.can_skip_explicit(1));
        actions.set(
            PlaybackActions::SKIP_TO_QUEUE_ITEM,
            self.queue.queue().is_some_and(|queue| !queue.is_empty()),
        );
        actions
    }

    fn refresh_status(&mut self) {
        if self.current_is_loaded() && self.status.state.is_active() {
            self.status.position_ms = self.engine.current_position();
        }
        let current = self.queue.current();
        self.status.active_queue_id = current.map(|item| item.queue_id);
        self.status.now_playing = current.map(|item| item.media_id.clone());
        self.status.shuffle_mode = self.queue.shuffle_mode();
        self.status.repeat_mode = self.queue.repeat_mode();
        self.status.actions = self.compute_actions();
    }

    fn publish_queue(&self) {
        let Some(queue) = self.queue.queue() else {
            return;
        };
        let _ = self.bus_producer.send(SessionEvent::QueueChanged {
            origin: Some(queue.origin().clone()),
            items: queue.items().to_vec(),
            current_index: queue.current_index(),
        });
    }

    fn publish(&mut self) {
        self.refresh_status();

        if let Some(item) = self.queue.current() {
            let changed = self
                .announced
                .as_ref()
                .map_or(true, |(queue_id, media_id)| {
                    *queue_id != item.queue_id || media_id != &item.media_id
                });
            if changed {
                self.announced = Some((item.queue_id, item.media_id.clone()));
                let _ = self
                    .bus_producer
                    .send(SessionEvent::NowPlayingChanged(item.clone()));
            }
        }

        if self.published.as_ref() != Some(&self.status) {
            self.published = Some(self.status.clone());
            let _ = self
                .bus_producer
                .send(SessionEvent::PlaybackStatusChanged(self.status.clone()));
        }
    }
}
