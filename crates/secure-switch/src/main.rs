mod cli;
mod config;
mod server;
mod watcher;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use switch_engine::loader::load_rules;
use switch_engine::SharedRuleSet;
use switch_redirect::{Decision, ExemptHosts, Switch, SwitchAction, SwitchRequest};

use crate::cli::{Cli, Command};
use crate::config::Config;
use crate::server::{Server, ServerSettings};
use crate::watcher::RulesWatcher;

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Build the switch with the configured hooks around a fresh rule set.
fn build_switch(cfg: &Config, rules: Arc<SharedRuleSet>) -> Result<Switch> {
    let mut switch = Switch::new(rules);

    let exempt = ExemptHosts::new(&cfg.server.exempt_hosts)
        .context("invalid exempt_hosts pattern")?;
    if !exempt.is_empty() {
        info!(patterns = ?cfg.server.exempt_hosts, "exempt hosts configured");
        switch = switch.with_hook(exempt);
    }

    Ok(switch)
}

struct CheckOptions {
    local: bool,
    force: bool,
    application_root: String,
    json: bool,
}

fn check(cfg: &Config, urls: &[String], opts: &CheckOptions) -> Result<()> {
    let rules = load_rules(&cfg.rules_file).context("failed to load rules file")?;
    let switch = build_switch(cfg, Arc::new(SharedRuleSet::new(rules)))?;

    for url in urls {
        let request = SwitchRequest::parse(url)?
            .with_application_root(opts.application_root.as_str())
            .local(opts.local)
            .forced(opts.force);
        let decision = switch
            .decide(&request)
            .with_context(|| format!("failed to decide {url}"))?;

        if opts.json {
            let line = serde_json::json!({
                "url": url,
                "decision": decision,
            });
            println!("{line}");
        } else {
            println!("{}", describe(url, &decision));
        }
    }
    Ok(())
}

fn describe(url: &str, decision: &Decision) -> String {
    let evaluation = &decision.evaluation;
    let mut line = format!("{url}: {} ({})", evaluation.verdict, evaluation.reason);
    if let SwitchAction::Redirect(redirect) = &decision.action {
        line.push_str(&format!(" -> {}", redirect.location));
        if redirect.bypass_warning {
            line.push_str(" [bypass warning]");
        }
    }
    line
}

fn validate(cfg: &Config) -> Result<()> {
    let rules = load_rules(&cfg.rules_file).context("rules file is invalid")?;
    println!(
        "{}: ok (mode {}, {} file rule(s), {} directory rule(s))",
        cfg.rules_file.display(),
        rules.mode(),
        rules.files().len(),
        rules.directories().len()
    );
    Ok(())
}

async fn serve(cfg: &Config) -> Result<()> {
    let rules = load_rules(&cfg.rules_file).context("failed to load rules file")?;
    let shared = Arc::new(SharedRuleSet::new(rules));
    info!(rules = ?shared, "rules loaded");

    let switch = build_switch(cfg, Arc::clone(&shared))?;

    // Shutdown signal (ctrl_c + SIGTERM).
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);
    let shutdown_tx_signal = shutdown_tx.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        let _ = shutdown_tx_signal.send(());
    });

    let mut rules_watcher = RulesWatcher::new(&cfg.rules_file, Arc::clone(&shared))?;
    rules_watcher.start()?;
    let watcher_task = tokio::spawn(rules_watcher.run(shutdown_tx.subscribe()));

    let listen_addr: std::net::SocketAddr = cfg
        .server
        .listen_addr
        .parse()
        .context("invalid listen address")?;
    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind {listen_addr}"))?;

    let server = Server::new(
        switch,
        ServerSettings {
            application_root: cfg.server.application_root.clone(),
            trust_forwarded_headers: cfg.server.trust_forwarded_headers,
        },
    );
    let result = server.run(listener, shutdown_tx.subscribe()).await;

    let _ = shutdown_tx.send(());
    if let Err(e) = watcher_task.await {
        warn!(error = %e, "rules watcher task failed");
    }

    info!("secure-switch stopped");
    result
}

async fn wait_for_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("received SIGINT (ctrl-c)"),
                    _ = sigterm.recv() => info!("received SIGTERM"),
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to register SIGTERM handler");
                ctrl_c.await.ok();
                info!("received SIGINT (ctrl-c)");
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("received SIGINT (ctrl-c)");
    }
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Parse CLI args.
    let cli = Cli::parse();

    // 2. Load config, then merge CLI overrides.
    let mut cfg = config::load(&cli.config)?;

    if let Some(ref rules) = cli.rules {
        cfg.rules_file = rules.clone();
    }
    if let Command::Serve {
        listen: Some(ref listen),
    } = cli.command
    {
        cfg.server.listen_addr = listen.clone();
    }

    // 3. Init tracing-subscriber with JSON format. Logs go to stderr so
    //    command output on stdout stays machine-readable.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.logging.level));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .init();

    info!(
        config_file = %cli.config.display(),
        rules_file = %cfg.rules_file.display(),
        "secure-switch starting"
    );

    // 4. Dispatch.
    match cli.command {
        Command::Check {
            urls,
            local,
            force,
            application_root,
            json,
        } => {
            let opts = CheckOptions {
                local,
                force,
                application_root: application_root
                    .unwrap_or_else(|| cfg.server.application_root.clone()),
                json,
            };
            check(&cfg, &urls, &opts)
        }
        Command::Validate => validate(&cfg),
        Command::Serve { .. } => serve(&cfg).await,
    }
}
