//! Durable session preferences: last-played id, shuffle and repeat modes, and
//! the queue generation counter.
//!
//! Values are stored as strings through any [`PreferenceStore`];
//! [`SessionPreferences`] adds typed accessors on top.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::media_id::MediaId;
use crate::protocol::{RepeatMode, ShuffleMode};

pub const KEY_LAST_PLAYED_MEDIA_ID: &str = "last_played_media_id";
pub const KEY_SHUFFLE_MODE: &str = "shuffle_mode";
pub const KEY_REPEAT_MODE: &str = "repeat_mode";
pub const KEY_QUEUE_GENERATION_COUNTER: &str = "queue_generation_counter";

#[derive(Debug, thiserror::Error)]
pub enum PreferenceError {
    #[error("preference storage failed: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("failed to prepare preference storage: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid value {value:?} stored for {key}")]
    InvalidValue { key: String, value: String },
    #[error("preference storage unavailable: {0}")]
    Unavailable(String),
}

/// Durable string key-value store.
pub trait PreferenceStore: Send {
    fn get(&self, key: &str) -> Result<Option<String>, PreferenceError>;
    fn set(&self, key: &str, value: &str) -> Result<(), PreferenceError>;
}

/// Process-local store. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPreferenceStore {
    values: Arc<Mutex<HashMap<String, String>>>,
}

impl InMemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_values<T>(&self, access: impl FnOnce(&mut HashMap<String, String>) -> T) -> T {
        match self.values.lock() {
            Ok(mut values) => access(&mut values),
            Err(poisoned) => access(&mut poisoned.into_inner()),
        }
    }
}

impl PreferenceStore for InMemoryPreferenceStore {
    fn get(&self, key: &str) -> Result<Option<String>, PreferenceError> {
        Ok(self.with_values(|values| values.get(key).cloned()))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PreferenceError> {
        self.with_values(|values| values.insert(key.to_string(), value.to_string()));
        Ok(())
    }
}

/// Typed view over a [`PreferenceStore`]. Missing keys read as defaults.
pub struct SessionPreferences {
    store: Box<dyn PreferenceStore>,
}

impl SessionPreferences {
    pub fn new(store: impl PreferenceStore + 'static) -> Self {
        Self {
            store: Box::new(store),
        }
    }

    fn invalid(key: &str, value: String) -> PreferenceError {
        PreferenceError::InvalidValue {
            key: key.to_string(),
            value,
        }
    }

    pub fn last_played_media_id(&self) -> Result<Option<MediaId>, PreferenceError> {
        match self.store.get(KEY_LAST_PLAYED_MEDIA_ID)? {
            Some(raw) => MediaId::parse(&raw)
                .map(Some)
                .map_err(|_| Self::invalid(KEY_LAST_PLAYED_MEDIA_ID, raw)),
            None => Ok(None),
        }
    }

    pub fn set_last_played_media_id(&self, media_id: &MediaId) -> Result<(), PreferenceError> {
        self.store
            .set(KEY_LAST_PLAYED_MEDIA_ID, &media_id.encode())
    }

    pub fn shuffle_mode(&self) -> Result<ShuffleMode, PreferenceError> {
        match self.store.get(KEY_SHUFFLE_MODE)? {
            Some(raw) => {
                ShuffleMode::from_name(&raw).ok_or_else(|| Self::invalid(KEY_SHUFFLE_MODE, raw))
            }
            None => Ok(ShuffleMode::default()),
        }
    }

    pub fn set_shuffle_mode(&self, mode: ShuffleMode) -> Result<(), PreferenceError> {
        self.store.set(KEY_SHUFFLE_MODE, mode.as_str())
    }

    pub fn repeat_mode(&self) -> Result<RepeatMode, PreferenceError> {
        match self.store.get(KEY_REPEAT_MODE)? {
            Some(raw) => {
                RepeatMode::from_name(&raw).ok_or_else(|| Self::invalid(KEY_REPEAT_MODE, raw))
            }
            None => Ok(RepeatMode::default()),
        }
    }

    pub fn set_repeat_mode(&self, mode: RepeatMode) -> Result<(), PreferenceError> {
        self.store.set(KEY_REPEAT_MODE, mode.as_str())
    }

    pub fn queue_generation_counter(&self) -> Result<u64, PreferenceError> {
        match self.store.get(KEY_QUEUE_GENERATION_COUNTER)? {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| Self::invalid(KEY_QUEUE_GENERATION_COUNTER, raw)),
            None => Ok(0),
        }
    }

    pub fn set_queue_generation_counter(&self, counter: u64) -> Result<(), PreferenceError> {
        self.store
            .set(KEY_QUEUE_GENERATION_COUNTER, &counter.to_string())
    }
}
