//! Media library browse tree and playback session controller.

pub mod catalog;
pub mod command_dispatcher;
pub mod config;
pub mod config_persistence;
pub mod db_manager;
pub mod media_id;
pub mod playback;
pub mod preferences;
pub mod protocol;
pub mod queue;
pub mod queue_manager;
pub mod session;
