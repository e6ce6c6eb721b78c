use std::sync::Arc;

use clap::Parser;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use constellation_agent::agent::{AgentDeps, run_agent};
use constellation_agent::auth::FileWebViewSource;
use constellation_agent::config::Settings;
use constellation_agent::egress::{HttpEgressProbe, ProxyPool};
use constellation_agent::pacing::TokioSleeper;
use constellation_agent::store::AccountStore;

#[derive(Parser, Debug)]
#[command(name = "constellation-agent", version, about = "Runs one game agent per account")]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    /// Run only these accounts (default: every account in the store)
    #[arg(long = "account")]
    accounts: Vec<String>,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("constellation_agent=info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let settings = cli.settings;
    settings.validate()?;

    let store = AccountStore::new(&settings.accounts_config);
    let accounts: Vec<String> = store
        .load()
        .await?
        .into_keys()
        .filter(|name| cli.accounts.is_empty() || cli.accounts.contains(name))
        .filter(|name| {
            let skip = settings.is_blacklisted(name);
            if skip {
                tracing::info!(account = %name, "Skipping blacklisted account");
            }
            !skip
        })
        .collect();
    if accounts.is_empty() {
        anyhow::bail!(
            "No accounts to run in {}",
            settings.accounts_config.display()
        );
    }

    let proxies = if settings.use_proxy {
        ProxyPool::load(&settings.proxies_path)?
    } else {
        ProxyPool::default()
    };
    tracing::info!(
        accounts = accounts.len(),
        proxies = proxies.len(),
        "Starting agents"
    );

    let deps = AgentDeps {
        webview: Arc::new(FileWebViewSource::new(settings.sessions_dir.clone())),
        settings: Arc::new(settings),
        store: Arc::new(store),
        egress: Arc::new(HttpEgressProbe::new()),
        proxies: Arc::new(proxies),
        sleeper: Arc::new(TokioSleeper),
    };

    let shutdown = CancellationToken::new();
    let mut agents = JoinSet::new();
    for account in accounts {
        let name = account.clone();
        let task = run_agent(account, deps.clone(), shutdown.child_token());
        agents.spawn(async move { (name, task.await) });
    }

    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested");
            ctrl_c.cancel();
        }
    });

    let mut failed = 0;
    while let Some(joined) = agents.join_next().await {
        match joined {
            Ok((_, Ok(()))) => {}
            Ok((account, Err(err))) => {
                failed += 1;
                tracing::error!(account = %account, error = %err, "Agent terminated");
            }
            Err(err) => {
                failed += 1;
                tracing::error!(error = %err, "Agent task panicked");
            }
        }
    }

    tracing::info!(failed, "All agents stopped");
    Ok(())
}
