//! Plexus CLI - Main entry point

mod cli;

use clap::{Parser, Subcommand};
use plexus_core::Host;
use plexus_foundation::PlexusConfig;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Plexus - plugin host for entities, commands and session events
#[derive(Parser, Debug)]
#[command(name = "plexus")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Load configuration from this file instead of the global/project files
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List registered plugins and their capabilities
    Plugins,
    /// List commands exposed by plugins
    Commands,
    /// Run a plugin command (`name` or `plugin:name`)
    Run {
        command: String,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Query entities across plugins
    Query {
        /// Entity type
        #[arg(long = "type")]
        entity_type: Option<String>,
        /// Field filter (repeatable)
        #[arg(long = "filter", value_name = "KEY=VALUE", value_parser = cli::parse_filter)]
        filters: Vec<(String, String)>,
        /// Required capability (repeatable)
        #[arg(long = "capability")]
        capabilities: Vec<String>,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        offset: Option<usize>,
        /// Sort by field
        #[arg(long)]
        sort: Option<String>,
        /// Sort descending
        #[arg(long)]
        desc: bool,
    },
    /// Show recent events
    Events {
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },
    /// Show session activity
    Sessions {
        #[arg(short, long)]
        limit: Option<u32>,
    },
    /// Run the event pipeline until Ctrl-C
    Watch {
        /// Seconds between metrics lines (0 disables)
        #[arg(long, default_value = "30")]
        interval: u64,
    },
}

impl Args {
    /// 외부 훅에서 호출된 경우 (`run emit`, `run hooks:emit`)
    fn is_hook(&self) -> bool {
        matches!(
            &self.command,
            Command::Run { command, .. } if command == "emit" || command == "hooks:emit"
        )
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let hook = args.is_hook();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        // 훅 호출자는 실패로 멈추면 안 됨: 로그만 남김
        Err(e) if hook => {
            tracing::error!(error = %format!("{:#}", e), "Hook invocation failed");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => PlexusConfig::load_from(path)?,
        None => PlexusConfig::load()?,
    };
    init_logging(&config, args.debug, args.is_hook())?;

    let host = Host::open(config).await?;
    let result = match args.command {
        Command::Plugins => cli::list_plugins(&host).await,
        Command::Commands => cli::list_commands(&host).await,
        Command::Run { command, args } => cli::run_command(&host, &command, &args).await,
        Command::Query {
            entity_type,
            filters,
            capabilities,
            limit,
            offset,
            sort,
            desc,
        } => {
            let query = cli::build_query(
                entity_type,
                filters,
                capabilities,
                limit,
                offset,
                sort,
                desc,
            );
            cli::query(&host, &query).await
        }
        Command::Events { limit } => cli::list_events(&host, limit).await,
        Command::Sessions { limit } => cli::list_sessions(&host, limit).await,
        Command::Watch { interval } => cli::watch(&host, interval).await,
    };

    host.shutdown().await;
    result
}

/// tracing 초기화
///
/// `RUST_LOG` > `--debug` > 설정의 `logLevel`. 훅 호출은 stdout/stderr를
/// 건드리지 않도록 `<data_dir>/plexus.log`에 기록합니다.
fn init_logging(config: &PlexusConfig, debug: bool, hook: bool) -> anyhow::Result<()> {
    let level = if debug { "debug" } else { config.log_level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if hook {
        let path = config.log_file()?;
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;

        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hook_detection() {
        let args = Args::parse_from(["plexus", "run", "emit", "--session", "s1"]);
        assert!(args.is_hook());
        match args.command {
            Command::Run { command, args } => {
                assert_eq!(command, "emit");
                assert_eq!(args, vec!["--session", "s1"]);
            }
            other => panic!("unexpected command: {:?}", other),
        }

        let args = Args::parse_from(["plexus", "--debug", "run", "hooks:emit"]);
        assert!(args.is_hook());
        assert!(args.debug);

        assert!(!Args::parse_from(["plexus", "plugins"]).is_hook());
    }

    #[test]
    fn test_query_args() {
        let args = Args::parse_from([
            "plexus",
            "query",
            "--type",
            "session",
            "--filter",
            "status=active",
            "--capability",
            "trackable",
            "--sort",
            "last_seen",
            "--desc",
            "--limit",
            "5",
        ]);
        match args.command {
            Command::Query {
                entity_type,
                filters,
                capabilities,
                limit,
                sort,
                desc,
                ..
            } => {
                assert_eq!(entity_type.as_deref(), Some("session"));
                assert_eq!(filters, vec![("status".to_string(), "active".to_string())]);
                assert_eq!(capabilities, vec!["trackable"]);
                assert_eq!(limit, Some(5));
                assert_eq!(sort.as_deref(), Some("last_seen"));
                assert!(desc);
            }
            other => panic!("unexpected command: {:?}", other),
        }

        assert!(Args::try_parse_from(["plexus", "query", "--filter", "nokey"]).is_err());
    }

    #[test]
    fn test_global_config_flag() {
        let args = Args::parse_from(["plexus", "events", "--config", "/tmp/p.json"]);
        assert_eq!(args.config, Some(PathBuf::from("/tmp/p.json")));
    }
}
