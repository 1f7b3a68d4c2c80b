use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use sqlx::sqlite::SqlitePoolOptions;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use fuschia_pubsub::{MemoryBroker, StaticCredentials, SubscriptionName, TopicName};
use fuschia_query::{FsResultStore, SqliteQueryRunner};
use fuschia_trigger::{PollingTrigger, RealtimeTrigger, TriggerEvent};
use fuschia_trigger_config::{PollingTriggerDef, RealtimeTriggerDef};

/// Fuschia triggers - watch external sources and emit workflow trigger events
#[derive(Parser)]
#[command(name = "fuschia-triggers")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.fuschia)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Run a polling trigger against a SQLite database
  Poll {
    /// Path to the polling trigger definition (JSON)
    trigger_file: PathBuf,

    /// SQLite connection URL, e.g. sqlite://orders.db
    #[arg(long)]
    database: String,

    /// Evaluate once instead of on the trigger's interval
    #[arg(long)]
    once: bool,
  },

  /// Run a realtime trigger against an in-process broker fed from stdin,
  /// one message per line
  Subscribe {
    /// Path to the realtime trigger definition (JSON)
    trigger_file: PathBuf,
  },
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".fuschia"),
  };

  match cli.command {
    Some(Commands::Poll {
      trigger_file,
      database,
      once,
    }) => {
      let rt = tokio::runtime::Runtime::new()?;
      rt.block_on(async { run_poll(trigger_file, database, once, data_dir).await })?;
    }
    Some(Commands::Subscribe { trigger_file }) => {
      let rt = tokio::runtime::Runtime::new()?;
      rt.block_on(async { run_subscribe(trigger_file).await })?;
    }
    None => {
      println!("fuschia-triggers - use --help to see available commands");
    }
  }

  Ok(())
}

async fn load_definition<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
  let content = tokio::fs::read_to_string(path)
    .await
    .with_context(|| format!("failed to read trigger file: {}", path.display()))?;

  serde_json::from_str(&content)
    .with_context(|| format!("failed to parse trigger file: {}", path.display()))
}

fn print_event(event: &TriggerEvent) -> Result<()> {
  println!("{}", serde_json::to_string(event)?);
  Ok(())
}

async fn run_poll(trigger_file: PathBuf, database: String, once: bool, data_dir: PathBuf) -> Result<()> {
  let def: PollingTriggerDef = load_definition(&trigger_file).await?;
  anyhow::ensure!(def.interval_ms > 0, "interval_ms must be greater than zero");
  let interval = def.interval();

  let pool = SqlitePoolOptions::new()
    .connect(&database)
    .await
    .with_context(|| format!("failed to connect to database: {}", database))?;

  let results = FsResultStore::new(data_dir.join("results"));
  let runner = SqliteQueryRunner::new(pool).with_result_store(Arc::new(results));
  let trigger = PollingTrigger::new(def, Arc::new(runner));

  if once {
    if let Some(result) = trigger.evaluate().await.context("poll failed")? {
      print_event(&TriggerEvent::from_poll(trigger.trigger_id(), &result))?;
    }
    return Ok(());
  }

  let cancel = CancellationToken::new();
  let on_signal = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      on_signal.cancel();
    }
  });

  info!(trigger_id = %trigger.trigger_id(), ?interval, "polling");

  let mut ticker = tokio::time::interval(interval);
  ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

  loop {
    tokio::select! {
      _ = cancel.cancelled() => break,
      _ = ticker.tick() => {
        match trigger.evaluate().await {
          Ok(Some(result)) => print_event(&TriggerEvent::from_poll(trigger.trigger_id(), &result))?,
          Ok(None) => debug!("no rows"),
          Err(e) => error!(error = %e, "poll failed"),
        }
      }
    }
  }

  info!(trigger_id = %trigger.trigger_id(), "polling stopped");
  Ok(())
}

async fn run_subscribe(trigger_file: PathBuf) -> Result<()> {
  let def: RealtimeTriggerDef = load_definition(&trigger_file).await?;
  let project = def.credentials.project_id.clone();
  let topic = TopicName::new(project.as_deref(), &def.topic);
  let subscription = SubscriptionName::new(project.as_deref(), &def.subscription);

  let broker = MemoryBroker::new();
  broker.create_topic(&topic);

  let trigger = Arc::new(RealtimeTrigger::new(
    def,
    Arc::new(broker.clone()),
    Arc::new(broker.clone()),
    Arc::new(StaticCredentials),
  ));
  let mut stream = trigger.start().await.context("failed to start trigger")?;

  let feeder = trigger.clone();
  tokio::spawn(async move {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
      tokio::select! {
        line = lines.next_line() => match line {
          Ok(Some(line)) => {
            if let Err(e) = broker.publish(&topic, line, Default::default()) {
              error!(error = %e, "failed to publish message");
            }
          }
          Ok(None) => {
            // Let the backlog drain before stopping.
            while broker.backlog_len(&subscription) > 0 && !feeder.termination().is_set() {
              tokio::time::sleep(Duration::from_millis(10)).await;
            }
            break;
          }
          Err(e) => {
            error!(error = %e, "failed to read stdin");
            break;
          }
        },
        _ = tokio::signal::ctrl_c() => break,
      }
    }
    feeder.stop();
  });

  while let Some(item) = stream.next().await {
    let message = item.context("subscription failed")?;
    print_event(&TriggerEvent::from_message(trigger.trigger_id(), &message))?;
  }

  trigger.kill().await;
  Ok(())
}
