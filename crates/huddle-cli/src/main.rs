mod config;

use std::path::{Path, PathBuf};
use std::pin::pin;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use futures_util::StreamExt;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::info;

use huddle_db::{Action, Database, PreparedRecord};
use huddle_observe::{ObserverConfig, known_key, observe_conference, observe_participant_count};
use huddle_sync::SyncOperator;
use huddle_sync::events::apply_event;
use huddle_types::events::ServerEvent;

use crate::config::Config;

const USAGE: &str = "usage:
  huddle ingest <conferences|participants|drafts> <file.json> [--dry-run]
  huddle ingest-event <file.json>
  huddle watch <conference_id>";

enum Command {
    Ingest {
        kind: IngestKind,
        file: PathBuf,
        dry_run: bool,
    },
    IngestEvent {
        file: PathBuf,
    },
    Watch {
        conference_id: String,
    },
}

enum IngestKind {
    Conferences,
    Participants,
    Drafts,
}

/// An event file holds one event or a list of them.
#[derive(Deserialize)]
#[serde(untagged)]
enum EventFile {
    Many(Vec<ServerEvent>),
    One(ServerEvent),
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "huddle=debug".into()),
        )
        .init();

    let command = parse_args(std::env::args().skip(1).collect())?;
    let config = Config::from_env()?;

    let db = Arc::new(Database::open(&config.db_path)?);
    let operator = SyncOperator::new(db.clone());

    match command {
        Command::Ingest {
            kind,
            file,
            dry_run,
        } => {
            let prepared = match kind {
                IngestKind::Conferences => operator.handle_conferences(read_json(&file)?, dry_run)?,
                IngestKind::Participants => {
                    operator.handle_conference_participants(read_json(&file)?, dry_run)?
                }
                IngestKind::Drafts => operator.handle_drafts(read_json(&file)?, dry_run)?,
            };
            report(&prepared, dry_run);
        }
        Command::IngestEvent { file } => {
            let events = match read_json(&file)? {
                EventFile::Many(events) => events,
                EventFile::One(event) => vec![event],
            };
            let count = events.len();
            for event in events {
                apply_event(&operator, event)?;
            }
            info!("Applied {} events from {}", count, file.display());
        }
        Command::Watch { conference_id } => {
            watch(db, &conference_id, ObserverConfig { interval: config.poll_interval }).await?;
        }
    }

    Ok(())
}

fn parse_args(args: Vec<String>) -> Result<Command> {
    let args: Vec<&str> = args.iter().map(String::as_str).collect();

    let command = match args.as_slice() {
        ["ingest", kind, file, rest @ ..] => {
            let kind = match *kind {
                "conferences" => IngestKind::Conferences,
                "participants" => IngestKind::Participants,
                "drafts" => IngestKind::Drafts,
                other => bail!("unknown entity kind '{}'\n{}", other, USAGE),
            };
            let dry_run = match rest {
                [] => false,
                ["--dry-run"] => true,
                _ => bail!("unexpected arguments {:?}\n{}", rest, USAGE),
            };
            Command::Ingest {
                kind,
                file: PathBuf::from(*file),
                dry_run,
            }
        }
        ["ingest-event", file] => Command::IngestEvent {
            file: PathBuf::from(*file),
        },
        ["watch", conference_id] => Command::Watch {
            conference_id: conference_id.to_string(),
        },
        _ => bail!("{}", USAGE),
    };

    Ok(command)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

fn report(prepared: &[PreparedRecord], dry_run: bool) {
    let created = prepared.iter().filter(|p| p.action == Action::Create).count();
    let updated = prepared.len() - created;
    let verb = if dry_run { "Prepared (dry run)" } else { "Committed" };
    info!("{} {} records: {} created, {} updated", verb, prepared.len(), created, updated);

    for record in prepared {
        println!("{:?} {} {}", record.action, record.record.table(), record.record.id());
    }
}

/// Print participant count and tombstone changes until Ctrl-C.
async fn watch(db: Arc<Database>, conference_id: &str, config: ObserverConfig) -> Result<()> {
    let count = observe_participant_count(db.clone(), conference_id, config);
    let conference = observe_conference(db, known_key(conference_id), config);

    let mut counts = pin!(count.stream());
    let mut conferences = pin!(conference.stream());
    let mut ctrl_c = pin!(tokio::signal::ctrl_c());

    info!("Watching conference {} every {:?}", conference_id, config.interval);

    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                result?;
                info!("Stopping watch");
                return Ok(());
            }
            Some(n) = counts.next() => {
                println!("participants: {}", n);
            }
            Some(row) = conferences.next() => match row {
                Some(row) if row.is_deleted() => println!("conference {} ended", row.id),
                Some(row) => println!("conference {} live (started by {})", row.id, row.user_id),
                None => println!("conference {} not synced yet", conference_id),
            },
        }
    }
}
