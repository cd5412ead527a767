mod cache;
mod config;
mod event;
mod host;
mod logging;
mod net;
mod worker;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;

use cache::{CacheName, CacheStore, MemoryStorage, PartitionKind, SqliteStorage};
use event::{Event, FetchEvent, Outcome};
use host::Host;
use net::{HttpNetwork, Request};
use worker::{LogNotifier, OfflineCacheManager, PushOutcome, SyncOutcome, WorkerSettings};

#[derive(Parser, Debug)]
#[command(name = "shellcache")]
#[command(about = "Offline-first cache manager for a static site shell")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/shellcache/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Site origin to cache (overrides the config file)
  #[arg(long)]
  origin: Option<String>,

  /// Keep the cache in memory for this run only
  #[arg(long)]
  ephemeral: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Fetch the asset manifest into the static partition
  Install,
  /// Delete partitions left by other versions
  Activate,
  /// Install, then activate
  Update,
  /// Request a URL through the cache
  Fetch {
    /// Absolute URL, or a path relative to the origin
    url: String,
    /// Accept header; anything containing text/html is a page navigation
    #[arg(long, default_value = "*/*")]
    accept: String,
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,
    /// Write the response body to this file
    #[arg(short, long)]
    output: Option<PathBuf>,
  },
  /// List partitions and their entries
  Partitions,
  /// Fire a background-sync tag
  Sync { tag: String },
  /// Deliver a push message; PAYLOAD is JSON like {"title":"..","body":".."}
  Push { payload: Option<String> },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = logging::init();

  // Load configuration
  let mut config = config::Config::load(args.config.as_deref())?;

  // Override origin if specified on command line
  if let Some(origin) = args.origin {
    config.origin = origin;
    config.validate()?;
  }

  if args.ephemeral {
    run(&config, MemoryStorage::new(), args.command).await
  } else {
    let storage = SqliteStorage::open(&config.cache_path()?)?;
    run(&config, storage, args.command).await
  }
}

async fn run<S: CacheStore>(config: &config::Config, storage: S, command: Command) -> Result<()> {
  let settings = WorkerSettings::from_config(config)?;
  let network = HttpNetwork::new(&config.network)?;
  let worker = OfflineCacheManager::new(settings, storage, network, LogNotifier);
  let mut host = Host::resume(worker)?;
  tracing::debug!(state = ?host.state(), "host ready");

  match command {
    Command::Install => report(host.dispatch(Event::Install).await?),
    Command::Activate => report(host.dispatch(Event::Activate).await?),
    Command::Update => {
      for outcome in host.update().await? {
        report(outcome);
      }
    }
    Command::Fetch {
      url,
      accept,
      method,
      output,
    } => {
      let origin = config.origin_url()?;
      let request = Request::parse(&method, &url, &origin)?.with_header("accept", &accept);
      let outcome = host.dispatch(Event::Fetch(FetchEvent::new(request))).await?;

      let body = match (&output, &outcome) {
        (Some(path), Outcome::Responded(result)) => {
          std::fs::write(path, &result.data.body)
            .map_err(|e| eyre!("Failed to write {}: {}", path.display(), e))?;
          None
        }
        (None, Outcome::Responded(result)) if is_text(&result.data) => {
          Some(result.data.text().into_owned())
        }
        _ => None,
      };
      report(outcome);
      if let Some(body) = body {
        println!("{body}");
      }
    }
    Command::Partitions => list_partitions(&host)?,
    Command::Sync { tag } => report(host.dispatch(Event::Sync { tag }).await?),
    Command::Push { payload } => {
      let data = payload.map(String::into_bytes);
      report(host.dispatch(Event::Push { data }).await?);
    }
  }

  Ok(())
}

fn report(outcome: Outcome) {
  match outcome {
    Outcome::Installed(o) => println!("installed {} ({} assets)", o.cache, o.cached),
    Outcome::Activated(o) if o.deleted.is_empty() => println!("activated, nothing stale"),
    Outcome::Activated(o) => println!("activated, deleted {}", o.deleted.join(", ")),
    Outcome::Responded(result) => {
      let mut from = match &result.partition {
        Some(partition) => format!("{} [{}]", result.source.label(), partition),
        None => result.source.label().to_string(),
      };
      if let Some(cached_at) = result.cached_at {
        from.push_str(&format!(", stored {}", age(cached_at, Utc::now())));
      }
      println!(
        "{} from {}, {} bytes",
        result.data.status,
        from,
        result.data.body.len()
      );
    }
    Outcome::Passthrough(request) => println!("not intercepted: {}", request.url()),
    Outcome::Synced(SyncOutcome::Resolved) => println!("sync resolved"),
    Outcome::Synced(SyncOutcome::Ignored) => println!("sync tag not recognized"),
    Outcome::Pushed(PushOutcome::NoPayload) => println!("push without payload"),
    Outcome::Pushed(PushOutcome::Shown(n)) => println!("notification: {} - {}", n.title, n.body),
  }
}

/// Coarse age of a stored response, like "5m ago".
fn age(cached_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
  let secs = (now - cached_at).num_seconds().max(0);
  match secs {
    0..=59 => format!("{secs}s ago"),
    60..=3599 => format!("{}m ago", secs / 60),
    3600..=86399 => format!("{}h ago", secs / 3600),
    _ => format!("{}d ago", secs / 86400),
  }
}

fn is_text(response: &net::Response) -> bool {
  response
    .header("content-type")
    .is_some_and(|ct| ct.starts_with("text/"))
}

fn list_partitions<S, N, P>(host: &Host<S, N, P>) -> Result<()>
where
  S: CacheStore,
  N: net::Network,
  P: worker::Notifier,
{
  let worker = host.worker();
  let names = worker.storage().keys()?;
  if names.is_empty() {
    println!("no partitions");
    return Ok(());
  }

  for name in names {
    let marker = match CacheName::parse(&name) {
      Some(parsed) if worker.settings().is_current(&name) => match parsed.kind() {
        PartitionKind::Static => "static, current".to_string(),
        PartitionKind::Runtime => "runtime, current".to_string(),
      },
      Some(parsed) => format!("stale, version {}", parsed.version()),
      None => "stale, unknown".to_string(),
    };
    let entries = worker.storage().entries(&name)?;
    println!("{name} ({marker}, {} entries)", entries.len());
    for entry in entries {
      println!(
        "  {} {} {} {}B",
        entry.method, entry.status, entry.url, entry.size
      );
    }
  }

  Ok(())
}
