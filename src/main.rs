mod actions;
mod api;
mod board;
mod boss;
mod clock;
mod config;
mod diagnostics;
mod error;
mod notify;
mod runtime;
mod store;
mod time_provider;
mod timezone;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use crate::actions::{ActionReceipt, mark_defeated, schedule_respawn};
use crate::api::{ApiContext, ApiServer, ApiServerConfig};
use crate::board::{build_rows, render_table};
use crate::boss::model::Board;
use crate::boss::roster::Roster;
use crate::config::{WatchConfig, load_watch_config};
use crate::notify::{ConsoleSurface, LogPushRegistrar};
use crate::runtime::Runtime;
use crate::store::{JsonFileStore, SharedStore, lock_store};
use crate::time_provider::{SystemTimeSource, TimeSource};
use crate::timezone::format_respawn_display;

#[derive(Parser, Debug)]
#[command(
    name = "bosswatch",
    version,
    about = "Boss respawn countdowns with advance notifications"
)]
struct Cli {
    #[arg(long, global = true, default_value = "bosswatch.json")]
    config: PathBuf,

    /// Overrides `store_path` from the config file.
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[arg(long)]
    diagnostics: bool,

    #[arg(long, global = true)]
    poll_secs: Option<u64>,

    #[arg(long, global = true, default_value = "0.0.0.0")]
    api_bind: String,

    #[arg(long, global = true, default_value_t = 8099)]
    api_port: u16,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum BoardChoice {
    Guild,
    Server,
    All,
}

impl From<BoardChoice> for Option<Board> {
    fn from(value: BoardChoice) -> Self {
        match value {
            BoardChoice::Guild => Some(Board::Guild),
            BoardChoice::Server => Some(Board::Server),
            BoardChoice::All => None,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the countdown board.
    Board {
        #[arg(long, value_enum, default_value_t = BoardChoice::All)]
        board: BoardChoice,

        #[arg(long)]
        json: bool,
    },
    /// Mark a guild boss defeated, now or at a GMT+8 time like "8:30 PM".
    Defeat {
        boss_id: String,

        #[arg(long)]
        at: Option<String>,
    },
    /// Set a server boss respawn at the next weekday and GMT+8 time.
    Schedule {
        boss_id: String,

        #[arg(long)]
        day: String,

        #[arg(long)]
        at: String,
    },
    /// List every known boss.
    Bosses,
    /// Run countdowns, alerts and the local board API.
    Watch {
        #[arg(long)]
        for_secs: Option<u64>,

        #[arg(long)]
        no_api: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    if let Err(err) = run(cli) {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let mut config = load_watch_config(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    if let Some(store) = cli.store.clone() {
        config.store_path = store;
    }
    if let Some(poll_secs) = cli.poll_secs {
        if poll_secs == 0 {
            bail!("--poll-secs must be greater than zero");
        }
        config.poll_interval_secs = poll_secs;
    }

    let roster = Roster::builtin();
    let time: Arc<dyn TimeSource> = Arc::new(SystemTimeSource);
    let mut store = JsonFileStore::open(&config.store_path)
        .with_context(|| format!("failed to open timer store {}", config.store_path.display()))?;

    if cli.diagnostics {
        return diagnostics::run_diagnostics(time.as_ref(), &config, &roster, &store);
    }

    let Some(command) = cli.command else {
        bail!("no command given; try `bosswatch board` or `bosswatch --help`");
    };

    match command {
        Command::Board { board, json } => {
            let rows = build_rows(
                &roster,
                board.into(),
                &store,
                time.now(),
                config.close_to_respawn_secs,
            );
            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                print!("{}", render_table(&rows));
            }
            Ok(())
        }
        Command::Defeat { boss_id, at } => {
            let receipt = mark_defeated(&roster, &mut store, &boss_id, at.as_deref(), time.now())?;
            print_receipt(&receipt);
            Ok(())
        }
        Command::Schedule { boss_id, day, at } => {
            let receipt = schedule_respawn(&roster, &mut store, &boss_id, &day, &at, time.now())?;
            print_receipt(&receipt);
            Ok(())
        }
        Command::Bosses => {
            for boss in roster.iter() {
                println!(
                    "{:<20} {:<40} {:>3}h",
                    boss.id,
                    boss.display_identity(),
                    boss.respawn_hours
                );
            }
            Ok(())
        }
        Command::Watch { for_secs, no_api } => {
            let api = cli_api(&cli.api_bind, cli.api_port, no_api);
            run_watch(api, config, roster, store, time, for_secs)
        }
    }
}

fn cli_api(bind_addr: &str, port: u16, disabled: bool) -> Option<ApiServerConfig> {
    (!disabled).then(|| ApiServerConfig {
        bind_addr: bind_addr.to_string(),
        port,
    })
}

fn run_watch(
    api: Option<ApiServerConfig>,
    config: WatchConfig,
    roster: Roster,
    store: JsonFileStore,
    time: Arc<dyn TimeSource>,
    for_secs: Option<u64>,
) -> Result<()> {
    let store: SharedStore = Arc::new(Mutex::new(store));
    let api_server = match api {
        Some(api) => Some(
            ApiServer::start(
                &api,
                ApiContext::new(
                    roster.clone(),
                    Arc::clone(&store),
                    Arc::clone(&time),
                    config.board_password.clone(),
                    config.close_to_respawn_secs,
                ),
            )
            .with_context(|| format!("failed to start local API at {}:{}", api.bind_addr, api.port))?,
        ),
        None => None,
    };

    {
        let records = lock_store(&store)?.all().len();
        tracing::info!(records, "watching timer store");
    }

    let mut runtime = Runtime::new(
        roster,
        store,
        ConsoleSurface::new(config.permission),
        &config,
        None,
    );
    if let Some(addr) = api_server.as_ref().and_then(ApiServer::local_addr) {
        println!("Board API on http://{addr}");
    }
    let permission = runtime.enable_notifications(&mut LogPushRegistrar, config.push.as_ref());
    if let Some(advisory) = permission.advisory() {
        println!("{advisory}");
    }
    let result = runtime.run(time.as_ref(), for_secs.map(Duration::from_secs));

    if let Some(server) = api_server {
        tracing::info!(requests = server.context.total_requests(), "board API stopped");
    }
    result
}

fn print_receipt(receipt: &ActionReceipt) {
    println!(
        "{} respawns {}",
        receipt.boss.display_identity(),
        format_respawn_display(receipt.respawn_at)
    );
}
