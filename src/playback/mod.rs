//! Playback modules (advertised actions, engine boundary, and the transport state machine).

pub mod actions;
pub mod engine;
pub mod state_machine;

pub use actions::PlaybackActions;
pub use engine::{EngineCallbacks, PlaybackEngine, SimulatedEngine};
pub use state_machine::PlaybackStateMachine;
