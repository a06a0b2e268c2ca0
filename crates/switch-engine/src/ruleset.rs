use std::fmt;
use std::str::FromStr;

use url::Url;

use crate::error::ConfigError;
use crate::matcher::HandlerFilter;
use crate::path::{normalize_path, PathKind};
use crate::rule::{DirectoryRule, FileRule, PathRule, RuleCollection};

/// Query parameter checked by [`WarningBypassMode::BypassWithQueryParam`]
/// when none is configured.
pub const DEFAULT_BYPASS_QUERY_PARAM: &str = "BypassSecurityWarning";

// ---------------------------------------------------------------------------
// Enumerated settings
// ---------------------------------------------------------------------------

/// Global gate deciding whether a request is evaluated at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Evaluate every request.
    #[default]
    On,
    /// Evaluate only requests coming from another host.
    RemoteOnly,
    /// Evaluate only requests coming from the server itself.
    LocalOnly,
    /// Never evaluate.
    Off,
}

impl Mode {
    /// Whether a request from a local (`is_local`) or remote client must be
    /// evaluated under this mode.
    pub fn requires_evaluation(self, is_local: bool) -> bool {
        match self {
            Self::On => true,
            Self::RemoteOnly => !is_local,
            Self::LocalOnly => is_local,
            Self::Off => false,
        }
    }
}

/// Which framework handler requests are skipped automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandlerIgnorePolicy {
    /// Skip the fixed set of built-in handler names.
    #[default]
    BuiltIn,
    /// Skip anything with a handler-style suffix.
    StandardExtensions,
    /// Skip nothing; only explicit rules apply.
    None,
}

/// When a switch from a secure to an insecure page should bypass the
/// browser's security warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WarningBypassMode {
    AlwaysBypass,
    #[default]
    BypassWithQueryParam,
    NeverBypass,
}

/// Canonical key for enum parsing: trimmed, lower-cased, separators dropped.
///
/// Lets `RemoteOnly`, `remote_only` and `remote-only` all parse.
pub(crate) fn enum_key(s: &str) -> String {
    s.trim()
        .chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

macro_rules! text_enum {
    ($ty:ident, $attribute:literal, { $($variant:ident => $key:literal, $display:literal;)+ }) => {
        impl FromStr for $ty {
            type Err = ConfigError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match enum_key(s).as_str() {
                    $($key => Ok(Self::$variant),)+
                    _ => Err(ConfigError::InvalidValue {
                        attribute: $attribute,
                        value: s.to_string(),
                    }),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    $(Self::$variant => f.write_str($display),)+
                }
            }
        }
    };
}

text_enum!(Mode, "mode", {
    On => "on", "on";
    RemoteOnly => "remoteonly", "remote_only";
    LocalOnly => "localonly", "local_only";
    Off => "off", "off";
});

text_enum!(HandlerIgnorePolicy, "ignore_handlers", {
    BuiltIn => "builtin", "built_in";
    StandardExtensions => "standardextensions", "standard_extensions";
    None => "none", "none";
});

text_enum!(WarningBypassMode, "warning_bypass_mode", {
    AlwaysBypass => "alwaysbypass", "always_bypass";
    BypassWithQueryParam => "bypasswithqueryparam", "bypass_with_query_param";
    NeverBypass => "neverbypass", "never_bypass";
});

// ---------------------------------------------------------------------------
// Redirect settings
// ---------------------------------------------------------------------------

/// Absolute base URIs used instead of a plain scheme swap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectTargets {
    pub secure: Url,
    pub insecure: Url,
}

/// Values the redirecting adapter needs; the evaluator never reads them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectSettings {
    targets: Option<RedirectTargets>,
    maintain_path: bool,
    warning_bypass_mode: WarningBypassMode,
    bypass_query_param_name: String,
}

impl Default for RedirectSettings {
    fn default() -> Self {
        Self {
            targets: None,
            maintain_path: true,
            warning_bypass_mode: WarningBypassMode::default(),
            bypass_query_param_name: DEFAULT_BYPASS_QUERY_PARAM.to_string(),
        }
    }
}

impl RedirectSettings {
    /// Configured host URIs; `None` means "same host, other scheme".
    pub fn targets(&self) -> Option<&RedirectTargets> {
        self.targets.as_ref()
    }

    /// Whether the request path is carried over to a configured host.
    pub fn maintain_path(&self) -> bool {
        self.maintain_path
    }

    pub fn warning_bypass_mode(&self) -> WarningBypassMode {
        self.warning_bypass_mode
    }

    pub fn bypass_query_param_name(&self) -> &str {
        &self.bypass_query_param_name
    }
}

// ---------------------------------------------------------------------------
// RuleSet
// ---------------------------------------------------------------------------

/// A validated, read-only snapshot of switching configuration.
///
/// Built once per configuration generation through [`RuleSetBuilder`] and
/// shared by reference across concurrent evaluations.
#[derive(Debug, Clone)]
pub struct RuleSet {
    mode: Mode,
    handler_filter: HandlerFilter,
    redirect: RedirectSettings,
    files: RuleCollection<FileRule>,
    directories: RuleCollection<DirectoryRule>,
}

impl RuleSet {
    pub fn builder() -> RuleSetBuilder {
        RuleSetBuilder::new()
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn handler_policy(&self) -> HandlerIgnorePolicy {
        self.handler_filter.policy()
    }

    pub fn handler_filter(&self) -> &HandlerFilter {
        &self.handler_filter
    }

    pub fn redirect(&self) -> &RedirectSettings {
        &self.redirect
    }

    pub fn files(&self) -> &RuleCollection<FileRule> {
        &self.files
    }

    pub fn directories(&self) -> &RuleCollection<DirectoryRule> {
        &self.directories
    }

    /// Exact, case-insensitive file rule lookup.
    pub fn find_file_rule(&self, path: &str) -> Option<&FileRule> {
        self.files.get(&normalize_path(path, PathKind::Lookup))
    }

    /// The most specific directory rule covering `directory_path`.
    ///
    /// Every rule is inspected; among the matching ones the longest path
    /// wins, and the earliest rule wins a tie.
    pub fn find_best_directory_rule(&self, directory_path: &str) -> Option<&DirectoryRule> {
        let directory_path = normalize_path(directory_path, PathKind::Lookup);
        let mut best: Option<&DirectoryRule> = None;

        for rule in &self.directories {
            if !rule.matches(&directory_path) {
                continue;
            }
            let deeper = match best {
                Some(current) => rule.path().len() > current.path().len(),
                None => true,
            };
            if deeper {
                best = Some(rule);
            }
        }

        best
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Mutable staging area for a [`RuleSet`].
///
/// Rule insertion rejects duplicates immediately; cross-field validation
/// happens in [`RuleSetBuilder::build`].
#[derive(Debug)]
pub struct RuleSetBuilder {
    mode: Mode,
    handler_policy: HandlerIgnorePolicy,
    encrypted_uri: Option<String>,
    unencrypted_uri: Option<String>,
    maintain_path: bool,
    warning_bypass_mode: WarningBypassMode,
    bypass_query_param_name: String,
    files: RuleCollection<FileRule>,
    directories: RuleCollection<DirectoryRule>,
}

impl Default for RuleSetBuilder {
    fn default() -> Self {
        let redirect = RedirectSettings::default();
        Self {
            mode: Mode::default(),
            handler_policy: HandlerIgnorePolicy::default(),
            encrypted_uri: None,
            unencrypted_uri: None,
            maintain_path: redirect.maintain_path,
            warning_bypass_mode: redirect.warning_bypass_mode,
            bypass_query_param_name: redirect.bypass_query_param_name,
            files: RuleCollection::new(),
            directories: RuleCollection::new(),
        }
    }
}

impl RuleSetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn handler_policy(mut self, policy: HandlerIgnorePolicy) -> Self {
        self.handler_policy = policy;
        self
    }

    /// Base URI for secure redirects. Blank values count as unset.
    pub fn encrypted_uri(mut self, uri: impl Into<String>) -> Self {
        self.encrypted_uri = non_blank(uri.into());
        self
    }

    /// Base URI for insecure redirects. Blank values count as unset.
    pub fn unencrypted_uri(mut self, uri: impl Into<String>) -> Self {
        self.unencrypted_uri = non_blank(uri.into());
        self
    }

    pub fn maintain_path(mut self, maintain: bool) -> Self {
        self.maintain_path = maintain;
        self
    }

    pub fn warning_bypass_mode(mut self, mode: WarningBypassMode) -> Self {
        self.warning_bypass_mode = mode;
        self
    }

    pub fn bypass_query_param_name(mut self, name: impl Into<String>) -> Self {
        self.bypass_query_param_name = name.into();
        self
    }

    /// Add a file rule; fails if its normalized path is already taken.
    pub fn add_file_rule(&mut self, rule: FileRule) -> Result<(), ConfigError> {
        self.files.insert(rule)
    }

    /// Add a directory rule; fails if its normalized path is already taken.
    pub fn add_directory_rule(&mut self, rule: DirectoryRule) -> Result<(), ConfigError> {
        self.directories.insert(rule)
    }

    /// Validate and freeze the configuration.
    pub fn build(self) -> Result<RuleSet, ConfigError> {
        let targets = match (self.encrypted_uri, self.unencrypted_uri) {
            (None, None) => None,
            (Some(secure), Some(insecure)) => Some(RedirectTargets {
                secure: parse_uri("encrypted_uri", &secure)?,
                insecure: parse_uri("unencrypted_uri", &insecure)?,
            }),
            _ => return Err(ConfigError::PartialRedirectUris),
        };

        Ok(RuleSet {
            mode: self.mode,
            handler_filter: HandlerFilter::new(self.handler_policy)?,
            redirect: RedirectSettings {
                targets,
                maintain_path: self.maintain_path,
                warning_bypass_mode: self.warning_bypass_mode,
                bypass_query_param_name: self.bypass_query_param_name,
            },
            files: self.files,
            directories: self.directories,
        })
    }
}

fn non_blank(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value.trim().to_string())
    }
}

fn parse_uri(attribute: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|reason| ConfigError::InvalidUri {
        attribute,
        value: value.to_string(),
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::RuleKind;
    use crate::verdict::SecurityVerdict;

    fn dir(path: &str, security: SecurityVerdict, recurse: bool) -> DirectoryRule {
        DirectoryRule::new(path, security, recurse)
    }

    // ---- enum parsing ----

    #[test]
    fn mode_parses_both_spellings() {
        assert_eq!("On".parse::<Mode>().unwrap(), Mode::On);
        assert_eq!("RemoteOnly".parse::<Mode>().unwrap(), Mode::RemoteOnly);
        assert_eq!("remote_only".parse::<Mode>().unwrap(), Mode::RemoteOnly);
        assert_eq!("local-only".parse::<Mode>().unwrap(), Mode::LocalOnly);
        assert_eq!(" off ".parse::<Mode>().unwrap(), Mode::Off);
    }

    #[test]
    fn invalid_enum_values_name_their_attribute() {
        let err = "sometimes".parse::<Mode>().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { attribute: "mode", .. }));

        let err = "all".parse::<HandlerIgnorePolicy>().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { attribute: "ignore_handlers", .. }
        ));

        let err = "maybe".parse::<WarningBypassMode>().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { attribute: "warning_bypass_mode", .. }
        ));
    }

    #[test]
    fn enums_display_snake_case() {
        assert_eq!(Mode::RemoteOnly.to_string(), "remote_only");
        assert_eq!(HandlerIgnorePolicy::StandardExtensions.to_string(), "standard_extensions");
        assert_eq!(WarningBypassMode::NeverBypass.to_string(), "never_bypass");
    }

    #[test]
    fn mode_gate_truth_table() {
        assert!(Mode::On.requires_evaluation(true));
        assert!(Mode::On.requires_evaluation(false));
        assert!(!Mode::Off.requires_evaluation(true));
        assert!(!Mode::Off.requires_evaluation(false));
        assert!(Mode::RemoteOnly.requires_evaluation(false));
        assert!(!Mode::RemoteOnly.requires_evaluation(true));
        assert!(Mode::LocalOnly.requires_evaluation(true));
        assert!(!Mode::LocalOnly.requires_evaluation(false));
    }

    // ---- builder validation ----

    #[test]
    fn defaults_match_documented_values() {
        let rules = RuleSet::builder().build().unwrap();
        assert_eq!(rules.mode(), Mode::On);
        assert_eq!(rules.handler_policy(), HandlerIgnorePolicy::BuiltIn);
        assert!(rules.redirect().maintain_path());
        assert_eq!(
            rules.redirect().warning_bypass_mode(),
            WarningBypassMode::BypassWithQueryParam
        );
        assert_eq!(rules.redirect().bypass_query_param_name(), "BypassSecurityWarning");
        assert!(rules.redirect().targets().is_none());
        assert!(rules.files().is_empty());
        assert!(rules.directories().is_empty());
    }

    #[test]
    fn paired_uris_are_accepted() {
        let rules = RuleSet::builder()
            .encrypted_uri("https://secure.example.com/")
            .unencrypted_uri("http://www.example.com/")
            .build()
            .unwrap();
        let targets = rules.redirect().targets().unwrap();
        assert_eq!(targets.secure.host_str(), Some("secure.example.com"));
        assert_eq!(targets.insecure.scheme(), "http");
    }

    #[test]
    fn a_single_uri_is_rejected() {
        let err = RuleSet::builder()
            .encrypted_uri("https://secure.example.com/")
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::PartialRedirectUris));

        let err = RuleSet::builder()
            .encrypted_uri("   ")
            .unencrypted_uri("http://www.example.com/")
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::PartialRedirectUris));
    }

    #[test]
    fn relative_uri_is_rejected() {
        let err = RuleSet::builder()
            .encrypted_uri("/secure")
            .unencrypted_uri("http://www.example.com/")
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidUri { attribute: "encrypted_uri", .. }
        ));
    }

    #[test]
    fn duplicate_directory_rejected_but_same_path_across_kinds_allowed() {
        let mut b = RuleSet::builder();
        b.add_directory_rule(dir("/Admin/", SecurityVerdict::Secure, true))
            .unwrap();
        let err = b
            .add_directory_rule(dir("admin", SecurityVerdict::Insecure, false))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::DuplicateRule { kind: RuleKind::Directory, ref path } if path == "admin"
        ));

        // A file rule may share a path with a directory rule.
        b.add_file_rule(FileRule::new("admin", SecurityVerdict::Ignore))
            .unwrap();
        let rules = b.build().unwrap();
        assert_eq!(rules.directories().len(), 1);
        assert_eq!(rules.files().len(), 1);
    }

    // ---- lookups ----

    #[test]
    fn file_lookup_round_trips_through_normalization() {
        let mut b = RuleSet::builder();
        b.add_file_rule(FileRule::new("/Secure/Login.aspx", SecurityVerdict::Secure))
            .unwrap();
        let rules = b.build().unwrap();

        let by_original = rules.find_file_rule("/Secure/Login.aspx").unwrap();
        let by_variant = rules.find_file_rule("secure/LOGIN.ASPX/").unwrap();
        assert_eq!(by_original, by_variant);
        assert_eq!(by_original.path(), "secure/login.aspx");
        assert!(rules.find_file_rule("secure/other.aspx").is_none());
    }

    #[test]
    fn deepest_directory_wins() {
        let mut b = RuleSet::builder();
        b.add_directory_rule(dir("admin", SecurityVerdict::Secure, true))
            .unwrap();
        b.add_directory_rule(dir("admin/public", SecurityVerdict::Insecure, true))
            .unwrap();
        let rules = b.build().unwrap();

        let best = rules.find_best_directory_rule("admin/public/page").unwrap();
        assert_eq!(best.path(), "admin/public");
        let best = rules.find_best_directory_rule("admin/other").unwrap();
        assert_eq!(best.path(), "admin");
    }

    #[test]
    fn deepest_directory_wins_regardless_of_order() {
        let mut b = RuleSet::builder();
        b.add_directory_rule(dir("admin/public", SecurityVerdict::Insecure, true))
            .unwrap();
        b.add_directory_rule(dir("admin", SecurityVerdict::Secure, true))
            .unwrap();
        b.add_directory_rule(dir("", SecurityVerdict::Ignore, true))
            .unwrap();
        let rules = b.build().unwrap();

        assert_eq!(
            rules.find_best_directory_rule("admin/public/x").unwrap().path(),
            "admin/public"
        );
        assert_eq!(rules.find_best_directory_rule("blog").unwrap().path(), "");
    }

    #[test]
    fn exact_non_recursive_beats_shallower_recursive() {
        let mut b = RuleSet::builder();
        b.add_directory_rule(dir("shop", SecurityVerdict::Insecure, true))
            .unwrap();
        b.add_directory_rule(dir("shop/checkout", SecurityVerdict::Secure, false))
            .unwrap();
        let rules = b.build().unwrap();

        assert_eq!(
            rules.find_best_directory_rule("shop/checkout").unwrap().path(),
            "shop/checkout"
        );
        // Non-recursive rule does not reach below its own directory.
        assert_eq!(
            rules.find_best_directory_rule("shop/checkout/step2").unwrap().path(),
            "shop"
        );
    }

    #[test]
    fn directory_lookup_is_case_insensitive() {
        let mut b = RuleSet::builder();
        b.add_directory_rule(dir("Admin", SecurityVerdict::Secure, true))
            .unwrap();
        let rules = b.build().unwrap();
        assert!(rules.find_best_directory_rule("ADMIN/Page").is_some());
        assert!(rules.find_best_directory_rule("/admin/").is_some());
    }

    #[test]
    fn no_directory_match_returns_none() {
        let mut b = RuleSet::builder();
        b.add_directory_rule(dir("admin", SecurityVerdict::Secure, false))
            .unwrap();
        let rules = b.build().unwrap();
        assert!(rules.find_best_directory_rule("public").is_none());
        assert!(rules.find_best_directory_rule("admin/nested").is_none());
    }
}
