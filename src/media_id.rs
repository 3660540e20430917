//! Path-like media identifiers used by the browse tree and the queue.
//!
//! A media id has up to three parts and is encoded as
//! `type[/category[|track]]`. The empty string is the browse root.

use std::fmt;
use std::str::FromStr;

const CATEGORY_SEPARATOR: char = '/';
const TRACK_SEPARATOR: char = '|';

/// Reasons a string cannot be parsed as a [`MediaId`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MediaIdError {
    #[error("media id {0:?} has an empty type")]
    EmptyType(String),
    #[error("media id {0:?} has an empty category")]
    EmptyCategory(String),
    #[error("media id {0:?} has an empty track")]
    EmptyTrack(String),
    #[error("media id {0:?} has a track without a category")]
    TrackWithoutCategory(String),
    #[error("media id {0:?} contains an unexpected separator")]
    UnexpectedSeparator(String),
}

/// Identifier of a node in the browse tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MediaId {
    media_type: Option<String>,
    category: Option<String>,
    track: Option<String>,
}

impl MediaId {
    /// The browse root.
    pub fn root() -> Self {
        Self::default()
    }

    pub fn of_type(media_type: impl Into<String>) -> Self {
        Self {
            media_type: Some(media_type.into()),
            category: None,
            track: None,
        }
    }

    pub fn of_category(media_type: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            media_type: Some(media_type.into()),
            category: Some(category.into()),
            track: None,
        }
    }

    pub fn of_track(
        media_type: impl Into<String>,
        category: impl Into<String>,
        track: impl Into<String>,
    ) -> Self {
        Self {
            media_type: Some(media_type.into()),
            category: Some(category.into()),
            track: Some(track.into()),
        }
    }

    /// Parses the canonical encoding. Never returns a partial id.
    pub fn parse(raw: &str) -> Result<Self, MediaIdError> {
        if raw.is_empty() {
            return Ok(Self::root());
        }

        let (type_part, rest) = match raw.split_once(CATEGORY_SEPARATOR) {
            Some((type_part, rest)) => (type_part, Some(rest)),
            None => (raw, None),
        };

        if type_part.contains(TRACK_SEPARATOR) {
            return Err(MediaIdError::TrackWithoutCategory(raw.to_string()));
        }
        if type_part.is_empty() {
            return Err(MediaIdError::EmptyType(raw.to_string()));
        }

        let Some(rest) = rest else {
            return Ok(Self::of_type(type_part));
        };

        let (category_part, track_part) = match rest.split_once(TRACK_SEPARATOR) {
            Some((category_part, track_part)) => (category_part, Some(track_part)),
            None => (rest, None),
        };

        if category_part.contains(CATEGORY_SEPARATOR) {
            return Err(MediaIdError::UnexpectedSeparator(raw.to_string()));
        }
        if category_part.is_empty() {
            return Err(MediaIdError::EmptyCategory(raw.to_string()));
        }

        let Some(track_part) = track_part else {
            return Ok(Self::of_category(type_part, category_part));
        };

        if track_part.contains(CATEGORY_SEPARATOR) || track_part.contains(TRACK_SEPARATOR) {
            return Err(MediaIdError::UnexpectedSeparator(raw.to_string()));
        }
        if track_part.is_empty() {
            return Err(MediaIdError::EmptyTrack(raw.to_string()));
        }

        Ok(Self::of_track(type_part, category_part, track_part))
    }

    /// Canonical string form; inverse of [`MediaId::parse`].
    pub fn encode(&self) -> String {
        let mut encoded = String::new();
        if let Some(media_type) = self.media_type.as_deref() {
            encoded.push_str(media_type);
            if let Some(category) = self.category.as_deref() {
                encoded.push(CATEGORY_SEPARATOR);
                encoded.push_str(category);
                if let Some(track) = self.track.as_deref() {
                    encoded.push(TRACK_SEPARATOR);
                    encoded.push_str(track);
                }
            }
        }
        encoded
    }

    pub fn media_type(&self) -> Option<&str> {
        self.media_type.as_deref()
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn track(&self) -> Option<&str> {
        self.track.as_deref()
    }

    pub fn is_root(&self) -> bool {
        self.media_type.is_none()
    }

    /// Ids with a track part are leaves and never have children.
    pub fn is_browsable(&self) -> bool {
        self.track.is_none()
    }

    /// The `type/category` this id belongs to, with any track part removed.
    pub fn browse_category(&self) -> Option<MediaId> {
        match (self.media_type.as_deref(), self.category.as_deref()) {
            (Some(media_type), Some(category)) => Some(Self::of_category(media_type, category)),
            _ => None,
        }
    }

    /// The parent node in the browse tree. The root has no parent.
    pub fn parent(&self) -> Option<MediaId> {
        if self.track.is_some() {
            return self.browse_category();
        }
        if self.category.is_some() {
            return self.media_type.as_deref().map(Self::of_type);
        }
        if self.media_type.is_some() {
            return Some(Self::root());
        }
        None
    }

    /// Same id with the track part replaced.
    pub fn with_track(&self, track: impl Into<String>) -> Option<MediaId> {
        let category = self.browse_category()?;
        Some(MediaId {
            track: Some(track.into()),
            ..category
        })
    }
}

impl fmt::Display for MediaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for MediaId {
    type Err = MediaIdError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::parse(raw)
    }
}

impl serde::Serialize for MediaId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> serde::Deserialize<'de> for MediaId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        MediaId::parse(&raw).map_err(serde::de::Error::custom)
    }
}
