//! Message types shared by the catalog, queue, playback, and session layers.
//!
//! This module defines the payloads exchanged between remote control
//! surfaces, the serialized session executor, and the playback engine.

use crate::media_id::MediaId;
use crate::playback::actions::PlaybackActions;

/// Repeat behavior applied when navigating beyond the current item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatMode {
    #[default]
    None, // Stop after reaching the end of the queue
    One, // Repeat current item
    All, // Repeat queue from the beginning
}

impl RepeatMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RepeatMode::None => "none",
            RepeatMode::One => "one",
            RepeatMode::All => "all",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "none" | "off" => Some(RepeatMode::None),
            "one" | "track" => Some(RepeatMode::One),
            "all" | "queue" => Some(RepeatMode::All),
            _ => None,
        }
    }
}

/// Queue ordering preference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShuffleMode {
    #[default]
    None,
    All,
}

impl ShuffleMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ShuffleMode::None => "none",
            ShuffleMode::All => "all",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "none" | "off" => Some(ShuffleMode::None),
            "all" | "on" => Some(ShuffleMode::All),
            _ => None,
        }
    }

    pub fn is_enabled(self) -> bool {
        self == ShuffleMode::All
    }
}

/// Externally advertised playback state.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub enum PlaybackState {
    #[default]
    None,
    Stopped,
    Paused,
    Playing,
    Buffering,
    Error(String),
}

impl PlaybackState {
    /// Playing or about to be playing once buffering completes.
    pub fn is_active(&self) -> bool {
        matches!(self, PlaybackState::Playing | PlaybackState::Buffering)
    }
}

/// State reported by a playback engine through its status callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Buffering,
    Playing,
    Paused,
    Stopped,
}

/// What kind of node a [`CatalogItem`] describes.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub enum CatalogItemKind {
    /// A Type or Category that has children.
    Browsable { child_count: Option<u32> },
    /// A leaf that references an actual audio source.
    Playable {
        duration_ms: u64,
        disc_number: u32,
        track_number: u32,
        source: String,
    },
}

/// One node handed to control surfaces. Built fresh on every resolution.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CatalogItem {
    pub media_id: MediaId,
    pub title: String,
    pub subtitle: String,
    pub artwork: Option<String>,
    pub kind: CatalogItemKind,
}

impl CatalogItem {
    pub fn browsable(
        media_id: MediaId,
        title: impl Into<String>,
        subtitle: impl Into<String>,
        child_count: Option<u32>,
    ) -> Self {
        Self {
            media_id,
            title: title.into(),
            subtitle: subtitle.into(),
            artwork: None,
            kind: CatalogItemKind::Browsable { child_count },
        }
    }

    pub fn with_artwork(mut self, artwork: Option<String>) -> Self {
        self.artwork = artwork;
        self
    }

    pub fn is_playable(&self) -> bool {
        matches!(self.kind, CatalogItemKind::Playable { .. })
    }

    pub fn duration_ms(&self) -> Option<u64> {
        match self.kind {
            CatalogItemKind::Playable { duration_ms, .. } => Some(duration_ms),
            CatalogItemKind::Browsable { .. } => None,
        }
    }
}

/// One queue row.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct QueueItem {
    pub media_id: MediaId,
    pub description: CatalogItem,
    /// Unique within one queue, assigned in catalog order, stable across reordering.
    pub queue_id: u64,
}

/// Coarse change notification emitted by a catalog source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogChange {
    AllTracks,
    EntityChanged(MediaId),
}

/// Fixed transport-control vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCommand {
    Play,
    Pause,
    Stop,
    SeekTo(u64),
    SkipToPrevious,
    SkipToNext,
    /// Jump to the queue row with this `queue_id`.
    SkipToQueueItem(u64),
    PlayFromMediaId {
        media_id: MediaId,
        shuffled: Option<bool>,
    },
    SetShuffleMode(ShuffleMode),
    SetRepeatMode(RepeatMode),
    /// Restore the last queue without starting playback.
    Prepare,
}

impl TransportCommand {
    /// Command names reserved for transport controls.
    pub const NAMES: [&'static str; 11] = [
        "play",
        "pause",
        "stop",
        "seek_to",
        "skip_to_previous",
        "skip_to_next",
        "skip_to_queue_item",
        "play_from_media_id",
        "set_shuffle_mode",
        "set_repeat_mode",
        "prepare",
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TransportCommand::Play => "play",
            TransportCommand::Pause => "pause",
            TransportCommand::Stop => "stop",
            TransportCommand::SeekTo(_) => "seek_to",
            TransportCommand::SkipToPrevious => "skip_to_previous",
            TransportCommand::SkipToNext => "skip_to_next",
            TransportCommand::SkipToQueueItem(_) => "skip_to_queue_item",
            TransportCommand::PlayFromMediaId { .. } => "play_from_media_id",
            TransportCommand::SetShuffleMode(_) => "set_shuffle_mode",
            TransportCommand::SetRepeatMode(_) => "set_repeat_mode",
            TransportCommand::Prepare => "prepare",
        }
    }
}

/// Engine callback payloads, injected into the session executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    StatusChanged(EngineState),
    Completion,
    Error(String),
}

/// Snapshot of everything a control surface needs to render transport state.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct PlaybackStatus {
    pub state: PlaybackState,
    pub position_ms: u64,
    pub actions: PlaybackActions,
    pub active_queue_id: Option<u64>,
    pub now_playing: Option<MediaId>,
    pub shuffle_mode: ShuffleMode,
    pub repeat_mode: RepeatMode,
    /// Set when a transport command could not continue and playback was stopped.
    pub last_stop_reason: Option<String>,
}

/// Notifications published on the session bus.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    PlaybackStatusChanged(PlaybackStatus),
    NowPlayingChanged(QueueItem),
    QueueChanged {
        origin: Option<MediaId>,
        items: Vec<QueueItem>,
        current_index: Option<usize>,
    },
    ChildrenInvalidated(MediaId),
}
