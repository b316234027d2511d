//! Beegate CLI - inspect and drive a gate store from the terminal
//!
//!   beegate status                          → setup, lock state, pending requests
//!   beegate init --password <pw>            → record the wallet password
//!   beegate add-wallet --password <pw> --address <addr> --key <hex> [--name <n>]
//!   beegate wallets --password <pw>         → unlock in-process, list addresses
//!   beegate screen [--password <pw>]        → what a surface would render now
//!   beegate pending                         → pending requests, priority order
//!   beegate clear <connection|contract>     → abandon a stuck request
//!   beegate run                             → background loop over stdin events
//!
//! `run` reads one JSON event per line ({"page": envelope}, {"surface": result},
//! {"closed": surfaceId}, {"openTab": true}) and prints page replies and window
//! operations as JSON lines.
//!
//! Configuration comes from `BEEGATE_*` variables (a `.env` file is loaded
//! first). The decrypted wallet list is session-only, so each invocation
//! starts locked.

use anyhow::{anyhow, Context};
use beegate::logging::init_logging;
use beegate::runtime::install_signal_handlers;
use beegate::{
    Background, BackgroundEvent, FileStore, GateConfig, LifecycleController, PageEnvelope, RequestKind,
    RequestOutcome, RequestRegistry, SurfaceHost, SurfaceMessage, SurfaceSpec, TabSurface, Wallet,
    WalletAccess,
};
use beegate::surface::SurfaceId;
use futures::channel::mpsc;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use std::env;
use std::io::{BufRead, IsTerminal};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

fn main() {
    let args: Vec<String> = env::args().collect();
    let opts = ParsedArgs::parse(&args[1..]);
    init_logging();

    if opts.help {
        print_usage();
        return;
    }

    if opts.version {
        println!("beegate {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    let config = GateConfig::from_env();
    let result = match opts.command.as_deref() {
        Some("status") => cmd_status(&config),
        Some("init") => cmd_init(&config, &opts),
        Some("add-wallet") => cmd_add_wallet(&config, &opts),
        Some("wallets") => cmd_wallets(&config, &opts),
        Some("screen") => cmd_screen(&config, &opts),
        Some("pending") => cmd_pending(&config),
        Some("clear") => cmd_clear(&config, &opts),
        Some("run") => cmd_run(&config),
        Some(cmd) => Err(anyhow!("Unknown command: {}", cmd)),
        None => {
            print_usage();
            return;
        }
    };

    let pretty = opts.pretty || std::io::stdout().is_terminal();
    match result {
        Ok(output) => println!("{}", render(&output, pretty)),
        Err(e) => {
            eprintln!("{}", render(&json!({"error": format!("{e:#}")}), pretty));
            std::process::exit(1);
        }
    }
}

fn render(value: &Value, pretty: bool) -> String {
    let rendered = if pretty { serde_json::to_string_pretty(value) } else { serde_json::to_string(value) };
    rendered.unwrap_or_else(|_| value.to_string())
}

#[derive(Default)]
struct ParsedArgs {
    command: Option<String>,
    target: Option<String>,
    password: Option<String>,
    address: Option<String>,
    key: Option<String>,
    name: Option<String>,
    pretty: bool,
    help: bool,
    version: bool,
}

impl ParsedArgs {
    fn parse(args: &[String]) -> Self {
        // Load .env file if present
        if let Ok(contents) = std::fs::read_to_string(".env") {
            for line in contents.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if let Some((key, value)) = line.split_once('=') {
                    let value = value.trim().trim_matches('"');
                    if !value.is_empty() && env::var(key.trim()).is_err() {
                        env::set_var(key.trim(), value);
                    }
                }
            }
        }

        let mut opts = ParsedArgs::default();
        let mut positional = Vec::new();
        let mut args = args.iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--help" | "-h" => opts.help = true,
                "--version" | "-V" => opts.version = true,
                "--pretty" => opts.pretty = true,
                "--password" | "-p" => opts.password = args.next().cloned(),
                "--address" | "-a" => opts.address = args.next().cloned(),
                "--key" | "-k" => opts.key = args.next().cloned(),
                "--name" | "-n" => opts.name = args.next().cloned(),
                _ if !arg.starts_with('-') => positional.push(arg.clone()),
                _ => {} // Ignore unknown flags
            }
        }

        let mut positional = positional.into_iter();
        opts.command = positional.next();
        opts.target = positional.next();

        if opts.password.is_none() {
            opts.password = env::var("BEEGATE_PASSWORD").ok().filter(|s| !s.is_empty());
        }
        opts
    }

    fn password(&self) -> anyhow::Result<&str> {
        self.password.as_deref().context("--password (or BEEGATE_PASSWORD) is required")
    }
}

fn print_usage() {
    println!(
        r#"beegate - wallet access gate

USAGE:
    beegate <command> [options]

COMMANDS:
    status                        Setup, lock state and pending requests
    init --password <pw>          Record the wallet password
    add-wallet --password <pw> --address <addr> --key <hex> [--name <n>]
    wallets --password <pw>       Unlock and list wallet addresses
    screen [--password <pw>]      Screen a surface would render
    pending                       Pending requests in priority order
    clear <connection|contract>   Abandon a pending request
    run                           Background loop over JSON events on stdin

OPTIONS:
    --pretty                      Pretty-print JSON
    -h, --help                    Show this help
    -V, --version                 Show version

ENVIRONMENT:
    BEEGATE_ROOT, BEEGATE_APP, BEEGATE_POPUP_URL, BEEGATE_TAB_URL,
    BEEGATE_INACTIVITY_SECS, BEEGATE_SWEEP_SECS, BEEGATE_PASSWORD,
    BEEGATE_LOG_JSON, RUST_LOG"#
    );
}

fn open_store(config: &GateConfig) -> anyhow::Result<FileStore> {
    let path = config.store_path();
    debug!(path = %path.display(), "opening store");
    FileStore::open(&path).with_context(|| format!("opening {}", path.display()))
}

fn cmd_status(config: &GateConfig) -> anyhow::Result<Value> {
    let store = open_store(config)?;
    let access = WalletAccess::new(store.clone());
    let pending = RequestRegistry::new(store.clone()).pending()?;
    Ok(json!({
        "store": store.path().display().to_string(),
        "setup": access.is_setup()?,
        "lockState": access.lock_state()?,
        "pending": pending.iter().map(|r| json!({"id": r.id, "kind": r.kind(), "origin": r.origin()})).collect::<Vec<_>>(),
    }))
}

fn cmd_init(config: &GateConfig, opts: &ParsedArgs) -> anyhow::Result<Value> {
    let access = WalletAccess::new(open_store(config)?);
    access.setup(opts.password()?)?;
    info!("wallet password initialized");
    Ok(json!({"setup": true}))
}

fn cmd_add_wallet(config: &GateConfig, opts: &ParsedArgs) -> anyhow::Result<Value> {
    let address = opts.address.clone().context("--address is required")?;
    let private_key = opts.key.clone().context("--key is required")?;
    let access = WalletAccess::new(open_store(config)?);
    let wallet = Wallet { address: address.clone(), name: opts.name.clone().unwrap_or_default(), private_key };
    access.add_wallet(opts.password()?, wallet)?;
    Ok(json!({"added": address}))
}

fn cmd_wallets(config: &GateConfig, opts: &ParsedArgs) -> anyhow::Result<Value> {
    let access = WalletAccess::new(open_store(config)?);
    let wallets = access.unlock(opts.password()?)?;
    let active = access.active_wallet()?.map(|w| w.address);
    access.lock()?;
    Ok(json!({
        "active": active,
        "wallets": wallets.iter().map(|w| json!({"address": w.address, "name": w.name})).collect::<Vec<_>>(),
    }))
}

fn cmd_screen(config: &GateConfig, opts: &ParsedArgs) -> anyhow::Result<Value> {
    let (tx, _rx) = mpsc::unbounded::<SurfaceMessage>();
    let controller = LifecycleController::new(open_store(config)?, TabSurface, tx);
    let screen = match opts.password.as_deref() {
        Some(password) => controller.unlock(password)?,
        None => controller.mount()?,
    };
    Ok(serde_json::to_value(&screen)?)
}

fn cmd_pending(config: &GateConfig) -> anyhow::Result<Value> {
    let pending = RequestRegistry::new(open_store(config)?).pending()?;
    Ok(serde_json::to_value(pending)?)
}

fn cmd_clear(config: &GateConfig, opts: &ParsedArgs) -> anyhow::Result<Value> {
    let kind = RequestKind::parse(opts.target.as_deref().context("clear needs a request kind")?)?;
    let registry = RequestRegistry::new(open_store(config)?);
    let Some(request) = registry.peek(kind)? else {
        return Ok(json!({"cleared": null}));
    };
    registry.resolve(&request.id, RequestOutcome::Abandoned)?;
    Ok(json!({"cleared": request.id, "kind": kind}))
}

/// Window operations go to stdout; the caller owns the real windows.
struct StdoutHost {
    next_id: AtomicU64,
}

impl SurfaceHost for StdoutHost {
    fn open(&self, spec: &SurfaceSpec) -> beegate::GateResult<SurfaceId> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        println!("{}", json!({"open": spec, "surfaceId": id}));
        Ok(id)
    }

    fn close(&self, id: SurfaceId) -> beegate::GateResult<()> {
        println!("{}", json!({"close": id}));
        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
enum InputEvent {
    Page(PageEnvelope),
    Surface(SurfaceMessage),
    Closed(SurfaceId),
    OpenTab(bool),
}

impl From<InputEvent> for BackgroundEvent {
    fn from(event: InputEvent) -> Self {
        match event {
            InputEvent::Page(envelope) => BackgroundEvent::Page(envelope),
            InputEvent::Surface(message) => BackgroundEvent::Surface(message),
            InputEvent::Closed(id) => BackgroundEvent::SurfaceClosed(id),
            InputEvent::OpenTab(_) => BackgroundEvent::OpenTab,
        }
    }
}

fn cmd_run(config: &GateConfig) -> anyhow::Result<Value> {
    let store = open_store(config)?;
    let rt = tokio::runtime::Runtime::new().context("creating runtime")?;

    rt.block_on(async {
        let shutdown = install_signal_handlers();
        let (reply_tx, mut reply_rx) = mpsc::unbounded();
        let (event_tx, event_rx) = mpsc::unbounded::<BackgroundEvent>();
        let host = Arc::new(StdoutHost { next_id: AtomicU64::new(0) });
        let background = Background::new(store, host, reply_tx, config);

        // stdin is blocking; feed it from its own thread.
        std::thread::spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<InputEvent>(&line) {
                    Ok(event) => {
                        if event_tx.unbounded_send(event.into()).is_err() {
                            break;
                        }
                    }
                    Err(e) => eprintln!("{}", json!({"error": format!("bad event: {e}")})),
                }
            }
        });

        let printer = tokio::spawn(async move {
            while let Some(reply) = reply_rx.next().await {
                println!("{}", json!({"reply": reply}));
            }
        });

        info!("background running; one JSON event per line on stdin");
        let result = background.run(event_rx, shutdown).await;
        drop(background);
        let _ = printer.await;
        result
    })?;

    Ok(json!({"stopped": true}))
}
