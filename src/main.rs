mod config;
mod engine;
mod error;
mod http;
mod net;
mod push;
mod store;
mod sync;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use serde_json::json;
use std::path::PathBuf;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use crate::engine::{Engine, Event, Outcome};
use crate::http::{Method, Request, ResponseSnapshot};
use crate::net::{Fetcher, HttpFetcher};
use crate::store::{CacheStore, MemoryStore, SqliteStore};
use crate::sync::{ActionQueue, MemoryQueue, NewAction, SqliteQueue};

#[derive(Parser, Debug)]
#[command(name = "outpost")]
#[command(about = "An offline-first request gateway for field clients on intermittent connections")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/outpost/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Keep the cache and queue in memory; nothing persists across runs
  #[arg(long)]
  ephemeral: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Fetch and store the critical-asset manifest for the current version
  Install {
    /// Activate immediately after the install commits
    #[arg(long)]
    activate: bool,
  },
  /// Purge superseded cache generations and start serving
  Activate,
  /// Route one request through the gateway
  Fetch {
    /// Absolute URL, or a path resolved against the configured origin
    url: String,
    #[arg(short, long, default_value = "GET")]
    method: Method,
    /// Extra header as `name: value` (repeatable)
    #[arg(short = 'H', long = "header", value_name = "NAME: VALUE")]
    headers: Vec<String>,
    #[arg(short, long)]
    body: Option<String>,
  },
  /// Replay pending offline actions
  Sync {
    /// Sync reason tag (defaults to the configured drain tag)
    #[arg(long)]
    tag: Option<String>,
  },
  /// Pre-warm the cache with the given URLs or paths
  Warm { urls: Vec<String> },
  /// Inspect the pending-action queue
  Queue {
    #[command(subcommand)]
    command: QueueCommand,
  },
  /// Show the current generation, cache contents and queue depth
  Status,
  /// Deliver a push payload and print the resulting notification
  Push {
    #[arg(short, long)]
    payload: Option<String>,
  },
  /// Report a notification action chosen by the user
  Click { action: String },
}

#[derive(Subcommand, Debug)]
enum QueueCommand {
  /// List pending actions in enqueue order
  List,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("outpost=info")),
    )
    .with_writer(std::io::stderr)
    .init();

  let args = Args::parse();

  let config = config::Config::load(args.config.as_deref())?;
  let engine_config = config.engine_config()?;
  let fetcher = HttpFetcher::new(config.network.timeout())?;

  if args.ephemeral {
    let engine = Engine::new(MemoryStore::new(), MemoryQueue::new(), fetcher, engine_config);
    run(&engine, args.command).await
  } else {
    let db = config.database_path()?;
    let store = SqliteStore::open_at(&db)?;
    let queue = SqliteQueue::open_at(&db)?;
    let engine = Engine::new(store, queue, fetcher, engine_config);
    run(&engine, args.command).await
  }
}

async fn run<S, Q, F>(engine: &Engine<S, Q, F>, command: Command) -> Result<()>
where
  S: CacheStore,
  Q: ActionQueue,
  F: Fetcher,
{
  match command {
    Command::Install { activate } => {
      engine.dispatch(Event::Install).await?;
      println!(
        "install committed for generation {}",
        engine.generations().current()
      );
      if activate {
        engine.dispatch(Event::Activate).await?;
        println!("activated");
      }
    }

    Command::Activate => {
      engine.dispatch(Event::Activate).await?;
      println!("activated; superseded generations purged");
    }

    Command::Fetch {
      url,
      method,
      headers,
      body,
    } => {
      let request = build_request(engine, &url, method, &headers, body)?;
      match engine.handle_fetch(&request).await {
        Ok(response) => print_response(&response),
        Err(err) => {
          // A mutating request failed while offline: capture it for the
          // next sync sweep instead of losing the submission.
          warn!(%err, "network unavailable");
          let action = engine.queue().enqueue(NewAction::from_request(&request))?;
          println!(
            "request failed while offline; queued as action {} for the next sync",
            action.id
          );
        }
      }
    }

    Command::Sync { tag } => {
      let tag = tag.unwrap_or_else(|| engine.sync_tag().to_string());
      match engine.dispatch(Event::Sync(tag)).await? {
        Outcome::Drained(report) => println!(
          "replayed {}/{} pending actions ({} left queued)",
          report.synced, report.attempted, report.requeued
        ),
        _ => println!("nothing to do for that tag"),
      }
    }

    Command::Warm { urls } => {
      engine
        .dispatch(Event::Message(json!({ "type": "CACHE_URLS", "urls": urls })))
        .await?;
      println!("cache warmed");
    }

    Command::Queue {
      command: QueueCommand::List,
    } => {
      let pending = engine.queue().pending()?;
      if pending.is_empty() {
        println!("queue is empty");
      }
      for action in pending {
        println!(
          "{:>4}  {}  {:<6} {}",
          action.id,
          action.enqueued_at.format("%Y-%m-%d %H:%M:%S"),
          action.method,
          action.url
        );
      }
    }

    Command::Status => {
      let current = engine.generations().current();
      let generations = engine.store().generations()?;
      let urls = engine.store().entry_urls(current)?;
      let pending = engine.queue().pending()?.len();

      println!("current generation: {}", current);
      println!("ready to serve:     {}", engine.generations().is_ready());
      println!(
        "generations:        {}",
        if generations.is_empty() {
          "(none)".to_string()
        } else {
          generations.join(", ")
        }
      );
      println!("cached entries:     {}", urls.len());
      for url in urls {
        println!("  {}", url);
      }
      println!("pending actions:    {}", pending);
    }

    Command::Push { payload } => {
      let data = payload.map(String::into_bytes);
      if let Outcome::Notification(notification) = engine.dispatch(Event::Push(data)).await? {
        println!("{}", serde_json::to_string_pretty(&notification)?);
      }
    }

    Command::Click { action } => match engine.dispatch(Event::NotificationClick(action)).await? {
      Outcome::OpenWindow(url) => println!("open window at {}", url),
      _ => println!("dismissed"),
    },
  }

  Ok(())
}

fn build_request<S, Q, F>(
  engine: &Engine<S, Q, F>,
  url: &str,
  method: Method,
  headers: &[String],
  body: Option<String>,
) -> Result<Request>
where
  S: CacheStore,
  Q: ActionQueue,
  F: Fetcher,
{
  let url = engine
    .resolve(url)
    .map_err(|e| eyre!("Invalid url {}: {}", url, e))?;

  let headers = headers
    .iter()
    .map(|raw| {
      raw
        .split_once(':')
        .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        .ok_or_else(|| eyre!("Invalid header {:?}, expected `name: value`", raw))
    })
    .collect::<Result<Vec<_>>>()?;

  Ok(Request {
    method,
    url,
    headers,
    body: body.map(String::into_bytes),
  })
}

fn print_response(response: &ResponseSnapshot) {
  println!("status: {}", response.status);
  if let Some(content_type) = response.header("content-type") {
    println!("content-type: {}", content_type);
  }
  println!();
  println!("{}", response.body_text());
}
