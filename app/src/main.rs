use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use clap::Parser;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod actors;
mod bus;
mod scorer;
mod state;
mod transport;

use actors::Actor;
use bus::BusSender;
use sayg::{
    BridgeOptions, BusMessage, LegSave, Listeners, LiveSyncBridge, LiveTransport, SaygSession,
    SaygStorage, ScoreAsYouGo, WebserverSection, WsLiveTransport,
};
use state::SystemState;
use transport::{BusStorage, BusTransport};

#[derive(Parser, Debug, Clone)]
#[command(name = "sayg", about = "Score-as-you-go darts scorer and live match server")]
struct Config {
    /// Config file path (default: ~/.config/sayg/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Serve the REST API and live channel only, no terminal scorer
    #[arg(long)]
    headless: bool,

    /// Override the first web server's bind address (persisted to config)
    #[arg(long)]
    bind: Option<String>,

    /// Home player name
    #[arg(long, default_value = "Home")]
    home: String,

    /// Away player name; omit for a single-player match
    #[arg(long)]
    away: Option<String>,

    /// Number of legs (default from [scoring])
    #[arg(long)]
    legs: Option<u32>,

    /// Starting score (default from [scoring])
    #[arg(long)]
    starting_score: Option<u32>,

    /// Continue a stored match instead of starting a new one
    #[arg(long)]
    resume: Option<Uuid>,

    /// Follow live updates for the match from the start
    #[arg(long)]
    live: bool,

    /// Do not save on the first visit of each leg
    #[arg(long)]
    no_auto_save: bool,

    /// Use a remote live channel (ws://host:port/api/live) instead of this
    /// process's bus
    #[arg(long)]
    remote: Option<String>,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> anyhow::Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new("sayg=info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::debug!("debug logging enabled");

    let cli = Config::parse();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(state::config::default_config_path);

    // Web actors run their own runtimes; this one hosts the drain task.
    let rt = tokio::runtime::Runtime::new()?;
    let _guard = rt.enter();

    // Single unified bus
    let (bus_tx, _) = broadcast::channel::<BusMessage>(1024);

    let (system_state, store_writer) = SystemState::new(config_path)?;
    let state = Arc::new(system_state);

    if let Some(bind) = &cli.bind {
        state.system.update(|c| {
            c.webserver.insert(
                "0".into(),
                WebserverSection {
                    name: "Web Server".into(),
                    bind: bind.clone(),
                },
            );
        });
    }

    // System actor owns the store writer. Must be fully up before anything
    // else can issue storage commands.
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let sender = BusSender::new("system".into(), bus_tx.clone(), Arc::clone(&shutdown));
        let receiver = sender.subscribe();
        let (actor, ready_rx) = actors::system::SystemActor::new(store_writer);
        actor.start(Arc::clone(&state), sender, receiver);
        ready_rx
            .recv()
            .map_err(|_| anyhow::anyhow!("system actor failed to start"))?;
        state.register_actor("system".into(), Box::new(actor), shutdown);
    }

    let snap = state.system.snapshot();
    for ra in actors::resolve_actors(&snap) {
        tracing::info!("starting actor '{}' ({})", ra.id, ra.name);
        actors::start_actor(ra.id, ra.actor, &state, &bus_tx);
    }

    // Drain bus (keeps broadcast channel healthy when no other subscriber)
    let mut drain_rx = bus_tx.subscribe();
    let drain_handle = tokio::spawn(async move {
        loop {
            match drain_rx.recv().await {
                Ok(_) => {}
                Err(broadcast::error::RecvError::Closed) => break,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("drain subscriber lagged, dropped {n} events");
                }
            }
        }
    });

    let outcome = if cli.headless {
        tracing::info!("running headless (no terminal scorer)");
        rt.block_on(async { tokio::signal::ctrl_c().await })
            .map_err(anyhow::Error::from)
    } else {
        run_scorer(&cli, &state, &bus_tx)
    };

    tracing::info!("shutting down...");
    for id in state.actor_ids() {
        state.stop_actor(&id);
    }
    // Drop bus_tx closes the broadcast channel as secondary signal
    drop(bus_tx);
    drain_handle.abort();

    outcome
}

fn run_scorer(
    cli: &Config,
    state: &Arc<SystemState>,
    bus_tx: &broadcast::Sender<BusMessage>,
) -> anyhow::Result<()> {
    let scoring = state.system.snapshot().scoring;
    let sender = BusSender::new(
        "scorer".into(),
        bus_tx.clone(),
        Arc::new(AtomicBool::new(false)),
    );

    let storage: Arc<dyn SaygStorage> =
        Arc::new(BusStorage::new(sender.clone(), state.store.clone()));
    let transport: Arc<dyn LiveTransport> = match &cli.remote {
        Some(url) => Arc::new(WsLiveTransport::connect(url, &cli.home)?),
        None => Arc::new(BusTransport::new(sender.clone())?),
    };

    let sayg = ScoreAsYouGo::new(
        cli.home.clone(),
        cli.away.clone(),
        cli.legs.unwrap_or(scoring.number_of_legs),
        cli.starting_score.unwrap_or(scoring.starting_score),
    );
    let mut listeners = Listeners::new();
    listeners.add(scorer::listener());
    let options = BridgeOptions {
        auto_save: scoring.auto_save && !cli.no_auto_save,
        leg_save: LegSave::Bridge,
    };
    let mut bridge = LiveSyncBridge::new(
        SaygSession::with_listeners(sayg, listeners),
        storage,
        transport,
        options,
    );

    if let Some(id) = cli.resume
        && !bridge.load(id)?
    {
        anyhow::bail!("match {id} could not be loaded");
    }
    if cli.live {
        let id = match bridge.snapshot().id {
            Some(id) => id,
            None => bridge
                .save()?
                .ok_or_else(|| anyhow::anyhow!("the new match could not be saved"))?,
        };
        bridge.enable_live_updates(true, id)?;
    }

    let result = scorer::run(bridge);
    // Stops this scorer's bus pollers.
    sender.shutdown();
    result
}
