use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use notify::{
    Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use switch_engine::loader::load_rules;
use switch_engine::{RuleSet, SharedRuleSet};

/// Outcome of a reload attempt.
#[derive(Debug, Clone)]
pub enum ReloadEvent {
    /// The rules file was reloaded and is now current.
    Reloaded(Arc<RuleSet>),
    /// The rules file failed to load; the previous rules stay current.
    ReloadFailed(String),
}

/// Reloads the rules file into a [`SharedRuleSet`] when it changes on disk.
///
/// The parent directory is watched rather than the file itself so that
/// editors which save by renaming a temporary file are still noticed.
pub struct RulesWatcher {
    path: PathBuf,
    file_name: Option<OsString>,
    rules: Arc<SharedRuleSet>,
    watcher: RecommendedWatcher,
    event_rx: mpsc::Receiver<notify::Result<Event>>,
    debounce: Duration,
}

impl RulesWatcher {
    pub fn new(path: impl AsRef<Path>, rules: Arc<SharedRuleSet>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let (event_tx, event_rx) = mpsc::channel(16);

        let watcher = RecommendedWatcher::new(
            move |res| {
                let _ = event_tx.blocking_send(res);
            },
            NotifyConfig::default().with_poll_interval(Duration::from_secs(1)),
        )
        .context("failed to create rules file watcher")?;

        Ok(Self {
            file_name: path.file_name().map(OsString::from),
            path,
            rules,
            watcher,
            event_rx,
            debounce: Duration::from_millis(500),
        })
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Start watching for changes.
    pub fn start(&mut self) -> Result<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        info!(path = %self.path.display(), dir = %dir.display(), "starting rules watcher");

        self.watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("failed to watch {}", dir.display()))?;
        Ok(())
    }

    /// Load the rules file and install it, or keep the current rules if it
    /// does not validate.
    pub fn reload(&self) -> ReloadEvent {
        match load_rules(&self.path) {
            Ok(rules) => {
                self.rules.replace(rules);
                let current = self.rules.load();
                info!(
                    path = %self.path.display(),
                    files = current.files().len(),
                    directories = current.directories().len(),
                    "rules reloaded"
                );
                ReloadEvent::Reloaded(current)
            }
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %format!("{e:#}"),
                    "rules reload failed, keeping current rules"
                );
                ReloadEvent::ReloadFailed(format!("{e:#}"))
            }
        }
    }

    fn is_relevant(&self, event: &Event) -> bool {
        if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
            return false;
        }
        match &self.file_name {
            Some(name) => event
                .paths
                .iter()
                .any(|p| p.file_name() == Some(name.as_os_str())),
            None => true,
        }
    }

    /// Wait for the next change to the rules file and reload it.
    ///
    /// Returns `None` for unrelated events, watcher errors, or once the
    /// watcher has been dropped.
    pub async fn process_events(&mut self) -> Option<ReloadEvent> {
        let event = self.event_rx.recv().await?;

        match event {
            Ok(event) => {
                if !self.is_relevant(&event) {
                    return None;
                }
                debug!(paths = ?event.paths, "rules file modified");

                // Let a burst of writes settle, then reload once.
                tokio::time::sleep(self.debounce).await;
                while self.event_rx.try_recv().is_ok() {}

                Some(self.reload())
            }
            Err(e) => {
                error!(error = %e, "file watcher error");
                None
            }
        }
    }

    /// Run the watcher loop until `shutdown` fires.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                _ = self.process_events() => {}
                _ = shutdown.recv() => {
                    info!("rules watcher shutting down");
                    break;
                }
            }
        }
    }
}
