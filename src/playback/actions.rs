//! Bitmask of transport actions a control surface may currently offer.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(transparent)]
pub struct PlaybackActions(u32);

impl PlaybackActions {
    pub const PLAY: Self = Self(1 << 0);
    pub const PAUSE: Self = Self(1 << 1);
    pub const STOP: Self = Self(1 << 2);
    pub const SEEK_TO: Self = Self(1 << 3);
    pub const SKIP_TO_PREVIOUS: Self = Self(1 << 4);
    pub const SKIP_TO_NEXT: Self = Self(1 << 5);
    pub const PLAY_FROM_MEDIA_ID: Self = Self(1 << 6);
    pub const SET_SHUFFLE_MODE: Self = Self(1 << 7);
    pub const SET_REPEAT_MODE: Self = Self(1 << 8);
    pub const SKIP_TO_QUEUE_ITEM: Self = Self(1 << 9);

    /// Offered in every state.
    pub const ALWAYS: Self = Self(
        Self::PLAY.0
            | Self::PLAY_FROM_MEDIA_ID.0
            | Self::SET_SHUFFLE_MODE.0
            | Self::SET_REPEAT_MODE.0
            | Self::STOP.0,
    );

    const NAMED: [(Self, &'static str); 10] = [
        (Self::PLAY, "PLAY"),
        (Self::PAUSE, "PAUSE"),
        (Self::STOP, "STOP"),
        (Self::SEEK_TO, "SEEK_TO"),
        (Self::SKIP_TO_PREVIOUS, "SKIP_TO_PREVIOUS"),
        (Self::SKIP_TO_NEXT, "SKIP_TO_NEXT"),
        (Self::PLAY_FROM_MEDIA_ID, "PLAY_FROM_MEDIA_ID"),
        (Self::SET_SHUFFLE_MODE, "SET_SHUFFLE_MODE"),
        (Self::SET_REPEAT_MODE, "SET_REPEAT_MODE"),
        (Self::SKIP_TO_QUEUE_ITEM, "SKIP_TO_QUEUE_ITEM"),
    ];

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn set(&mut self, other: Self, enabled: bool) {
        if enabled {
            self.0 |= other.0;
        } else {
            self.0 &= !other.0;
        }
    }
}

impl BitOr for PlaybackActions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for PlaybackActions {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for PlaybackActions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Self::NAMED
            .iter()
            .filter(|(action, _)| self.contains(*action))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "PlaybackActions({})", names.join(" | "))
    }
}
