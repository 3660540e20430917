//! Named custom commands outside the transport vocabulary.
//!
//! Handlers reply through a one-shot callback. Unknown names get
//! [`CommandResultCode::UnknownCommand`] through that same callback.

use std::collections::HashMap;

use log::{debug, warn};
use serde_json::{json, Value};

use crate::media_id::MediaId;
use crate::protocol::TransportCommand;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandResultCode {
    Success,
    Error,
    UnknownCommand,
}

impl CommandResultCode {
    /// Stable wire code.
    pub fn code(self) -> i32 {
        match self {
            CommandResultCode::Success => 0,
            CommandResultCode::Error => 1,
            CommandResultCode::UnknownCommand => -1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandResult {
    pub code: CommandResultCode,
    pub data: Value,
}

impl CommandResult {
    pub fn success(data: Value) -> Self {
        Self {
            code: CommandResultCode::Success,
            data,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            code: CommandResultCode::Error,
            data: json!({ "message": message.into() }),
        }
    }

    pub fn unknown_command(name: &str) -> Self {
        Self {
            code: CommandResultCode::UnknownCommand,
            data: json!({ "command": name }),
        }
    }
}

/// Session state a handler may act on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandContext {
    pub current_media_id: Option<MediaId>,
}

pub type CommandReply = Box<dyn FnOnce(CommandResult) + Send>;

pub trait CommandHandler: Send {
    fn handle(&mut self, context: &CommandContext, params: Value, reply: CommandReply);
}

impl<F> CommandHandler for F
where
    F: FnMut(&CommandContext, Value, CommandReply) + Send,
{
    fn handle(&mut self, context: &CommandContext, params: Value, reply: CommandReply) {
        self(context, params, reply)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatcherError {
    #[error("command name must not be empty")]
    EmptyName,
    #[error("command {0} is already registered")]
    Duplicate(String),
    #[error("command {0} is reserved for transport controls")]
    Reserved(String),
}

#[derive(Default)]
pub struct CommandDispatcher {
    handlers: HashMap<String, Box<dyn CommandHandler>>,
}

impl CommandDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        handler: impl CommandHandler + 'static,
    ) -> Result<(), DispatcherError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DispatcherError::EmptyName);
        }
        if TransportCommand::NAMES
            .iter()
            .any(|reserved| reserved.eq_ignore_ascii_case(name.trim()))
        {
            return Err(DispatcherError::Reserved(name));
        }
        if self.handlers.contains_key(&name) {
            return Err(DispatcherError::Duplicate(name));
        }
        debug!("CommandDispatcher: registered {}", name);
        self.handlers.insert(name, Box::new(handler));
        Ok(())
    }

    /// Registered names, sorted.
    pub fn command_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn dispatch(
        &mut self,
        name: &str,
        context: &CommandContext,
        params: Value,
        reply: CommandReply,
    ) {
        match self.handlers.get_mut(name) {
            Some(handler) => {
                debug!("CommandDispatcher: dispatching {}", name);
                handler.handle(context, params, reply);
            }
            None => {
                warn!("CommandDispatcher: unknown command {}", name);
                reply(CommandResult::unknown_command(name));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn capture() -> (Arc<Mutex<Vec<CommandResult>>>, impl Fn() -> CommandReply) {
        let results = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&results);
        let make_reply = move || -> CommandReply {
            let sink = Arc::clone(&sink);
            Box::new(move |result| sink.lock().expect("results lock").push(result))
        };
        (results, make_reply)
    }

    #[test]
    fn test_unknown_command_replies_with_stable_code() {
        let mut dispatcher = CommandDispatcher::new();
        let (results, reply) = capture();

        dispatcher.dispatch("rate_track", &CommandContext::default(), Value::Null, reply());

        let results = results.lock().expect("results lock");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].code, CommandResultCode::UnknownCommand);
        assert_eq!(results[0].code.code(), -1);
        assert_eq!(results[0].data, json!({ "command": "rate_track" }));
    }

    #[test]
    fn test_handler_sees_context_and_params() {
        let mut dispatcher = CommandDispatcher::new();
        dispatcher
            .register(
                "exclude_track",
                |context: &CommandContext, params: Value, reply: CommandReply| {
                    let target = context.current_media_id.as_ref().map(MediaId::encode);
                    reply(CommandResult::success(json!({
                        "target": target,
                        "reason": params["reason"],
                    })));
                },
            )
            .expect("valid registration");
        let (results, reply) = capture();
        let context = CommandContext {
            current_media_id: Some(MediaId::of_track("tracks", "all", "9")),
        };

        dispatcher.dispatch(
            "exclude_track",
            &context,
            json!({ "reason": "skip forever" }),
            reply(),
        );

        let results = results.lock().expect("results lock");
        assert_eq!(results[0].code.code(), 0);
        assert_eq!(
            results[0].data,
            json!({ "target": "tracks/all|9", "reason": "skip forever" })
        );
    }

    #[test]
    fn test_registration_is_validated() {
        let mut dispatcher = CommandDispatcher::new();
        let noop = |_: &CommandContext, _: Value, reply: CommandReply| {
            reply(CommandResult::success(Value::Null))
        };

        assert_eq!(
            dispatcher.register("  ", noop),
            Err(DispatcherError::EmptyName)
        );
        assert_eq!(
            dispatcher.register("skip_to_next", noop),
            Err(DispatcherError::Reserved("skip_to_next".to_string()))
        );
        assert_eq!(
            dispatcher.register("skip_to_queue_item", noop),
            Err(DispatcherError::Reserved("skip_to_queue_item".to_string()))
        );
        assert_eq!(
            dispatcher.register("PLAY", noop),
            Err(DispatcherError::Reserved("PLAY".to_string()))
        );
        assert_eq!(dispatcher.register("delete_track", noop), Ok(()));
        assert_eq!(
            dispatcher.register("delete_track", noop),
            Err(DispatcherError::Duplicate("delete_track".to_string()))
        );
        assert_eq!(dispatcher.command_names(), vec!["delete_track".to_string()]);
    }

    #[test]
    fn test_handler_may_reply_later() {
        let mut dispatcher = CommandDispatcher::new();
        let parked: Arc<Mutex<Option<CommandReply>>> = Arc::new(Mutex::new(None));
        let parked_by_handler = Arc::clone(&parked);
        dispatcher
            .register(
                "slow",
                move |_: &CommandContext, _: Value, reply: CommandReply| {
                    *parked_by_handler.lock().expect("parked lock") = Some(reply);
                },
            )
            .expect("valid registration");
        let (results, reply) = capture();

        dispatcher.dispatch("slow", &CommandContext::default(), Value::Null, reply());
        assert!(results.lock().expect("results lock").is_empty());

        let reply = parked.lock().expect("parked lock").take().expect("parked reply");
        reply(CommandResult::error("backend offline"));
        let results = results.lock().expect("results lock");
        assert_eq!(results[0].code, CommandResultCode::Error);
        assert_eq!(results[0].data, json!({ "message": "backend offline" }));
    }
}
