use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use log::{debug, error, info, warn, LevelFilter};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

use playsession::catalog::{
    build_library_catalog, BrowseOutcome, InMemoryCatalogSource, LibrarySnapshot, SearchExtras,
};
use playsession::command_dispatcher::{
    CommandContext, CommandDispatcher, CommandReply, CommandResult,
};
use playsession::config::{Config, StorageConfig};
use playsession::config_persistence::{
    default_config_path, load_or_create_config, persist_config_file,
};
use playsession::db_manager::{default_preferences_db_path, SqlitePreferenceStore};
use playsession::media_id::MediaId;
use playsession::playback::SimulatedEngine;
use playsession::preferences::{InMemoryPreferenceStore, PreferenceError, SessionPreferences};
use playsession::protocol::{
    CatalogItem, PlaybackStatus, RepeatMode, SessionEvent, ShuffleMode, TransportCommand,
};
use playsession::session::{Session, SessionHandle};

#[derive(Parser, Debug)]
#[command(name = "playsession", version, about = "Console control surface for a playback session")]
struct Args {
    /// Config file (defaults to the user config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// JSON library snapshot to browse and play; remembered in the config
    #[arg(long)]
    library: Option<PathBuf>,

    /// Overrides `[logging] level`
    #[arg(long)]
    log_level: Option<String>,
}

const HELP: &str = "commands: play | pause | stop | next | prev | jump <queue id> | seek <ms> \
| open <media id> | shuffle on|off | repeat none|one|all | ls [media id] | find <query> \
| status | cmd <name> [json] | quit";

fn open_preferences(storage: &StorageConfig) -> Result<SessionPreferences, PreferenceError> {
    if storage.in_memory {
        info!("Preferences: using in-memory store");
        return Ok(SessionPreferences::new(InMemoryPreferenceStore::new()));
    }
    let path = storage
        .preferences_db_path
        .clone()
        .or_else(default_preferences_db_path)
        .ok_or_else(|| PreferenceError::Unavailable("no data directory available".to_string()))?;
    info!("Preferences: using {}", path.display());
    Ok(SessionPreferences::new(SqlitePreferenceStore::new(&path)?))
}

fn load_library(config: &Config) -> Result<InMemoryCatalogSource, Box<dyn Error>> {
    match &config.library.snapshot_path {
        Some(path) => Ok(InMemoryCatalogSource::from_json_file(path)?),
        None => {
            warn!("Library: no snapshot configured, starting with an empty library");
            Ok(InMemoryCatalogSource::new(LibrarySnapshot::default()))
        }
    }
}

fn register_commands(
    dispatcher: &mut CommandDispatcher,
    source: Arc<InMemoryCatalogSource>,
) -> Result<(), Box<dyn Error>> {
    dispatcher.register(
        "now_playing",
        |context: &CommandContext, _: Value, reply: CommandReply| {
            let media_id = context.current_media_id.as_ref().map(MediaId::encode);
            reply(CommandResult::success(json!({ "media_id": media_id })));
        },
    )?;
    dispatcher.register(
        "delete_track",
        move |context: &CommandContext, _: Value, reply: CommandReply| {
            let track_id = context
                .current_media_id
                .as_ref()
                .and_then(MediaId::track)
                .and_then(|track| track.parse::<u64>().ok());
            match track_id {
                Some(track_id) => {
                    let removed = source.remove_track(track_id);
                    reply(CommandResult::success(
                        json!({ "track_id": track_id, "removed": removed }),
                    ));
                }
                None => reply(CommandResult::error("no track is current")),
            }
        },
    )?;
    Ok(())
}

fn print_items(items: &[CatalogItem]) {
    for item in items {
        let marker = if item.is_playable() { ' ' } else { '/' };
        if item.subtitle.is_empty() {
            println!("{}{}  {}", marker, item.media_id, item.title);
        } else {
            println!("{}{}  {}  ({})", marker, item.media_id, item.title, item.subtitle);
        }
    }
}

fn print_status(status: &PlaybackStatus) {
    let now_playing = status
        .now_playing
        .as_ref()
        .map(MediaId::encode)
        .unwrap_or_else(|| "-".to_string());
    println!(
        "state={:?} position={}ms now_playing={} shuffle={} repeat={} actions={:?}",
        status.state,
        status.position_ms,
        now_playing,
        status.shuffle_mode.as_str(),
        status.repeat_mode.as_str(),
        status.actions
    );
    if let Some(reason) = &status.last_stop_reason {
        println!("stopped: {}", reason);
    }
}

fn parse_transport(verb: &str, rest: &str) -> Option<Result<TransportCommand, String>> {
    let command = match verb {
        "play" => Ok(TransportCommand::Play),
        "pause" => Ok(TransportCommand::Pause),
        "stop" => Ok(TransportCommand::Stop),
        "next" => Ok(TransportCommand::SkipToNext),
        "prev" => Ok(TransportCommand::SkipToPrevious),
        "jump" => rest
            .parse::<u64>()
            .map(TransportCommand::SkipToQueueItem)
            .map_err(|_| format!("invalid queue id: {}", rest)),
        "seek" => rest
            .parse::<u64>()
            .map(TransportCommand::SeekTo)
            .map_err(|_| format!("invalid position: {}", rest)),
        "open" => MediaId::parse(rest)
            .map(|media_id| TransportCommand::PlayFromMediaId {
                media_id,
                shuffled: None,
            })
            .map_err(|err| err.to_string()),
        "shuffle" => ShuffleMode::from_name(rest)
            .map(TransportCommand::SetShuffleMode)
            .ok_or_else(|| format!("unknown shuffle mode: {}", rest)),
        "repeat" => RepeatMode::from_name(rest)
            .map(TransportCommand::SetRepeatMode)
            .ok_or_else(|| format!("unknown repeat mode: {}", rest)),
        _ => return None,
    };
    Some(command)
}

async fn execute(handle: &SessionHandle, verb: &str, rest: &str) -> Result<(), Box<dyn Error>> {
    if let Some(command) = parse_transport(verb, rest) {
        handle.send(command?)?;
        return Ok(());
    }
    match verb {
        "ls" => {
            let parent = if rest.is_empty() {
                MediaId::root()
            } else {
                MediaId::parse(rest)?
            };
            match handle.browse(&parent).await {
                BrowseOutcome::Loaded(Some(children)) => print_items(&children),
                BrowseOutcome::Loaded(None) => println!("nothing to browse under {}", parent),
                BrowseOutcome::Superseded => debug!("Console: browse of {} superseded", parent),
            }
        }
        "find" => print_items(&handle.search(rest, &SearchExtras::default()).await),
        "status" => print_status(&handle.status().await?),
        "cmd" => {
            let (name, params) = rest.split_once(' ').unwrap_or((rest, ""));
            let params = if params.trim().is_empty() {
                Value::Null
            } else {
                serde_json::from_str(params)?
            };
            let result = handle.custom_command(name, params).await?;
            println!("[{}] {}", result.code.code(), result.data);
        }
        "help" => println!("{}", HELP),
        _ => println!("unknown command '{}'; {}", verb, HELP),
    }
    Ok(())
}

fn spawn_event_printer(handle: &SessionHandle) {
    let mut events = handle.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(SessionEvent::NowPlayingChanged(item)) => {
                    println!("now playing: {} ({})", item.description.title, item.media_id);
                }
                Ok(SessionEvent::PlaybackStatusChanged(status)) => {
                    debug!("Console: status {:?}", status.state);
                    if let Some(reason) = status.last_stop_reason {
                        println!("stopped: {}", reason);
                    }
                }
                Ok(SessionEvent::QueueChanged { items, .. }) => {
                    println!("queue: {} items", items.len());
                }
                Ok(SessionEvent::ChildrenInvalidated(parent)) => {
                    debug!("Console: {} changed", parent);
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Console: missed {} session events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

async fn run_console(handle: SessionHandle) -> Result<(), Box<dyn Error>> {
    println!("{}", HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (verb, rest) = match line.split_once(' ') {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };
        if verb == "quit" || verb == "exit" {
            break;
        }
        if let Err(err) = execute(&handle, verb, rest).await {
            println!("error: {}", err);
        }
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let mut clog = colog::default_builder();
    clog.filter(None, LevelFilter::Trace);
    clog.init();

    std::panic::set_hook(Box::new(|panic_info| {
        let current_thread = std::thread::current();
        let thread_name = current_thread.name().unwrap_or("unnamed");
        log::error!("panic in thread '{}': {}", thread_name, panic_info);
    }));

    let config_path = args.config.clone().or_else(default_config_path);
    let mut config = match &config_path {
        Some(path) => load_or_create_config(path),
        None => {
            warn!("Config: no config directory available, using defaults");
            Config::default()
        }
    };

    let level = match &args.log_level {
        Some(level) => level.parse().unwrap_or_else(|_| {
            warn!("Config: unknown log level {}, using config level", level);
            config.logging.level_filter()
        }),
        None => config.logging.level_filter(),
    };
    log::set_max_level(level);

    if let Some(library) = &args.library {
        if config.library.snapshot_path.as_ref() != Some(library) {
            config.library.snapshot_path = Some(library.clone());
            if let Some(path) = &config_path {
                persist_config_file(&config, path);
            }
        }
    }

    let source = Arc::new(load_library(&config)?);
    let catalog = build_library_catalog(source.clone(), &config.library)?;
    let preferences = open_preferences(&config.storage)?;
    let mut dispatcher = CommandDispatcher::new();
    register_commands(&mut dispatcher, source)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let (handle, session_task) =
            Session::spawn(catalog, preferences, dispatcher, &config, |callbacks| {
                Box::new(SimulatedEngine::new(callbacks))
            });
        spawn_event_printer(&handle);

        let console_result = run_console(handle.clone()).await;
        if handle.shutdown().is_ok() {
            if let Err(err) = session_task.await {
                error!("Session: task failed: {}", err);
            }
        }
        console_result
    })?;

    info!("playsession: exiting");
    Ok(())
}
