//! tweetwatch - track accounts and get notified when their posts answer a
//! question.
//!
//! ```text
//! tweetwatch [--db PATH] add HANDLE QUESTION
//! tweetwatch [--db PATH] remove HANDLE
//! tweetwatch [--db PATH] list
//! tweetwatch [--db PATH] run
//! ```

use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;

use tweetwatch::core::{RuleLimits, DEFAULT_MAX_RULES, DEFAULT_MAX_RULE_LEN};
use tweetwatch::store::{SqliteStore, SubscriberStore};
use tweetwatch::stream::{ConvergenceResult, TwitterClient, TwitterConfig};
use tweetwatch::{
    ClassifierConfig, LogSink, NotificationSink, OpenAiClassifier, RetryPolicy,
    RetryingClassifier, SessionStatus, Tracker, TrackerConfig, WebhookSink,
};

type TwitterTracker = Tracker<TwitterClient, TwitterClient, TwitterClient, SqliteStore>;

/// tweetwatch CLI
#[derive(Parser)]
#[command(name = "tweetwatch")]
#[command(about = "Track accounts and get notified when a post answers your question", long_about = None)]
#[command(version)]
struct Cli {
    /// Subscriber database path
    #[arg(long, env = "TWEETWATCH_DB", default_value = "tweetwatch.db", global = true)]
    db: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Track an account
    Add {
        /// Account handle, with or without the leading @
        handle: String,
        /// Question to ask about each of its posts
        question: String,
        #[command(flatten)]
        remote: RemoteArgs,
    },
    /// Stop tracking an account
    Remove {
        handle: String,
        #[command(flatten)]
        remote: RemoteArgs,
    },
    /// List tracked accounts
    List,
    /// Stream posts and send notifications until interrupted
    Run {
        #[command(flatten)]
        remote: RemoteArgs,
        #[command(flatten)]
        matching: MatchArgs,
    },
}

#[derive(Args)]
struct RemoteArgs {
    /// API bearer token
    #[arg(long, env = "TWITTER_BEARER_TOKEN", hide_env_values = true)]
    bearer_token: String,

    /// API base URL
    #[arg(long, env = "TWITTER_API_BASE")]
    api_base: Option<String>,

    /// Maximum number of filter rules
    #[arg(long, env = "TWEETWATCH_MAX_RULES", default_value_t = DEFAULT_MAX_RULES)]
    max_rules: usize,

    /// Maximum filter rule length
    #[arg(long, env = "TWEETWATCH_MAX_RULE_LEN", default_value_t = DEFAULT_MAX_RULE_LEN)]
    max_rule_len: usize,

    /// Timeout for rule requests, in seconds
    #[arg(long, default_value_t = 30)]
    request_timeout: u64,
}

#[derive(Args)]
struct MatchArgs {
    /// Classifier API key
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: String,

    /// Classifier model
    #[arg(long, env = "TWEETWATCH_MODEL")]
    model: Option<String>,

    /// Chat-completions endpoint
    #[arg(long, env = "TWEETWATCH_CLASSIFIER_URL")]
    classifier_url: Option<String>,

    /// Attempts per classifier call
    #[arg(long, default_value_t = 1)]
    classifier_attempts: u32,

    /// Post notifications to this webhook instead of the log
    #[arg(long, env = "TWEETWATCH_WEBHOOK_URL")]
    webhook_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let store = SqliteStore::open(&cli.db)
        .with_context(|| format!("failed to open database {}", cli.db))?;

    match cli.command {
        Command::Add {
            handle,
            question,
            remote,
        } => {
            let tracker = build_tracker(&remote, store)?;
            let entity = tracker.subscribe(&handle, &question).await?;
            println!("tracking @{} ({})", entity.handle, entity.id);
        }
        Command::Remove { handle, remote } => {
            let tracker = build_tracker(&remote, store)?;
            let entity = tracker.unsubscribe(&handle).await?;
            println!("stopped tracking @{}", entity.handle);
        }
        Command::List => {
            let entities = store.list().await?;
            if entities.is_empty() {
                println!("no accounts tracked");
            }
            for entity in entities {
                println!("@{}\t{}\t{}", entity.handle, entity.id, entity.question);
            }
        }
        Command::Run { remote, matching } => {
            let tracker = build_tracker(&remote, store)?;
            run(tracker, matching).await?;
        }
    }

    Ok(())
}

fn build_tracker(args: &RemoteArgs, store: SqliteStore) -> anyhow::Result<TwitterTracker> {
    if args.max_rules == 0 {
        bail!("--max-rules must be at least 1");
    }

    let mut twitter = TwitterConfig::new(args.bearer_token.clone());
    if let Some(base) = &args.api_base {
        twitter.api_base = base.trim_end_matches('/').to_string();
    }
    let timeout = Duration::from_secs(args.request_timeout);
    twitter.request_timeout = timeout;
    let client = TwitterClient::new(twitter).context("failed to create API client")?;

    let config = TrackerConfig::with_limits(RuleLimits::new(args.max_rules, args.max_rule_len))
        .request_timeout(timeout);

    Ok(Tracker::new(
        client.clone(),
        client.clone(),
        client,
        store,
        config,
    ))
}

async fn run(tracker: TwitterTracker, args: MatchArgs) -> anyhow::Result<()> {
    let mut classifier_config = ClassifierConfig::new(args.openai_api_key);
    if let Some(model) = args.model {
        classifier_config.model = model;
    }
    if let Some(url) = args.classifier_url {
        classifier_config.endpoint = url;
    }
    let classifier = RetryingClassifier::new(
        OpenAiClassifier::new(classifier_config)?,
        RetryPolicy::with_attempts(args.classifier_attempts),
    );

    let sink: Box<dyn NotificationSink> = match args.webhook_url {
        Some(url) => Box::new(WebhookSink::new(url)?),
        None => Box::new(LogSink),
    };

    let mut status = tracker.subscribe_status();
    let status_log = tokio::spawn(async move {
        loop {
            match status.recv().await {
                Ok(SessionStatus::Disconnected { reason }) => {
                    tracing::warn!("stream disconnected: {}", reason)
                }
                Ok(SessionStatus::Failed { error }) => tracing::error!("stream failed: {}", error),
                Ok(other) => tracing::info!(status = ?other, "stream status"),
                Err(RecvError::Lagged(missed)) => {
                    tracing::debug!(missed, "status log fell behind")
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let events = tracker.take_events()?;
    tracker.start().await.context("failed to start stream")?;

    match tracker.verify().await {
        Ok(ConvergenceResult::Converged) => tracing::debug!("remote rules match tracked accounts"),
        Ok(ConvergenceResult::Diverged {
            missing,
            unexpected,
        }) => tracing::warn!(?missing, ?unexpected, "remote rules differ from tracked accounts"),
        Err(e) => tracing::warn!("could not verify remote rules: {}", e),
    }

    let pipeline = tracker.pipeline(classifier);
    tokio::select! {
        stats = pipeline.run(events, sink.as_ref()) => {
            tracing::info!(?stats, "pipeline finished");
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for ctrl-c")?;
            tracing::info!("interrupted, shutting down");
        }
    }

    tracker.stop().await;
    status_log.abort();
    Ok(())
}
