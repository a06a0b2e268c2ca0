use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::error::ConfigError;
use crate::rule::{DirectoryRule, FileRule, RuleKind};
use crate::ruleset::RuleSet;
use crate::schema::{RuleEntry, RulesConfig};
use crate::verdict::SecurityVerdict;

/// Load and validate a [`RuleSet`] from a YAML file on disk.
pub fn load_rules(path: impl AsRef<Path>) -> Result<RuleSet> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read rules file: {}", path.display()))?;
    let rules = load_rules_from_str(&contents)
        .with_context(|| format!("failed to load rules file: {}", path.display()))?;

    info!(
        path = %path.display(),
        mode = %rules.mode(),
        files = rules.files().len(),
        directories = rules.directories().len(),
        "rules loaded"
    );
    Ok(rules)
}

/// Parse and validate a [`RuleSet`] from a YAML string.
///
/// Failures carry a [`ConfigError`] that callers can recover with
/// `downcast_ref`.
pub fn load_rules_from_str(yaml: &str) -> Result<RuleSet> {
    let config: RulesConfig =
        serde_yml::from_str(yaml).map_err(|e| ConfigError::Parse(e.to_string()))?;
    Ok(build_rule_set(&config)?)
}

/// Translate a deserialized [`RulesConfig`] into a validated [`RuleSet`].
pub fn build_rule_set(config: &RulesConfig) -> Result<RuleSet, ConfigError> {
    let mut builder = RuleSet::builder();

    if let Some(mode) = &config.mode {
        builder = builder.mode(mode.parse()?);
    }
    if let Some(policy) = &config.ignore_handlers {
        builder = builder.handler_policy(policy.parse()?);
    }
    if let Some(uri) = &config.encrypted_uri {
        builder = builder.encrypted_uri(uri.as_str());
    }
    if let Some(uri) = &config.unencrypted_uri {
        builder = builder.unencrypted_uri(uri.as_str());
    }
    if let Some(maintain) = config.maintain_path {
        builder = builder.maintain_path(maintain);
    }
    if let Some(mode) = &config.warning_bypass_mode {
        builder = builder.warning_bypass_mode(mode.parse()?);
    }
    if let Some(name) = &config.bypass_query_param_name {
        builder = builder.bypass_query_param_name(name.as_str());
    }

    for entry in &config.rules {
        match entry {
            RuleEntry::Directory {
                path,
                secure,
                recurse,
            } => {
                let path = required_path(path.as_deref(), RuleKind::Directory)?;
                let security = security_of(secure.as_deref())?;
                builder.add_directory_rule(DirectoryRule::new(path, security, *recurse))?;
            }
            RuleEntry::File { path, secure } => {
                let path = required_path(path.as_deref(), RuleKind::File)?;
                let security = security_of(secure.as_deref())?;
                builder.add_file_rule(FileRule::new(path, security))?;
            }
        }
    }

    builder.build()
}

/// A rule's `path` must be present and non-blank; `/` names the root.
fn required_path(path: Option<&str>, kind: RuleKind) -> Result<&str, ConfigError> {
    match path {
        Some(p) if !p.trim().is_empty() => Ok(p),
        _ => Err(ConfigError::MissingPath { kind }),
    }
}

fn security_of(secure: Option<&str>) -> Result<SecurityVerdict, ConfigError> {
    secure.map_or(Ok(SecurityVerdict::default()), str::parse)
}
