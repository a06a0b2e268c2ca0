use serde::{Deserialize, Serialize};

/// Rules file as written on disk.
///
/// Enumerated values are kept as text here and parsed during validation so
/// an unknown value is reported against the attribute that carried it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RulesConfig {
    /// `on`, `remote_only`, `local_only` or `off`. Default `on`.
    pub mode: Option<String>,
    /// Base URI for secure redirects; must be paired with `unencrypted_uri`.
    pub encrypted_uri: Option<String>,
    /// Base URI for insecure redirects; must be paired with `encrypted_uri`.
    pub unencrypted_uri: Option<String>,
    /// Keep the request path when redirecting to a configured URI. Default
    /// `true`.
    pub maintain_path: Option<bool>,
    /// `always_bypass`, `bypass_with_query_param` or `never_bypass`.
    pub warning_bypass_mode: Option<String>,
    pub bypass_query_param_name: Option<String>,
    /// `built_in`, `standard_extensions` or `none`. Default `built_in`.
    pub ignore_handlers: Option<String>,
    /// Ordered rule entries.
    #[serde(default)]
    pub rules: Vec<RuleEntry>,
}

/// A single `file` or `directory` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum RuleEntry {
    Directory {
        path: Option<String>,
        /// `secure`, `insecure` or `ignore`. Default `secure`.
        secure: Option<String>,
        #[serde(default)]
        recurse: bool,
    },
    File {
        path: Option<String>,
        secure: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_minimal_config() {
        let config: RulesConfig = serde_yml::from_str("rules: []\n").unwrap();
        assert!(config.mode.is_none());
        assert!(config.maintain_path.is_none());
        assert!(config.rules.is_empty());
    }

    #[test]
    fn deserialize_full_config() {
        let yaml = r#"
mode: remote_only
encrypted_uri: "https://secure.example.com/"
unencrypted_uri: "http://www.example.com/"
maintain_path: false
warning_bypass_mode: never_bypass
bypass_query_param_name: skipWarning
ignore_handlers: standard_extensions
rules:
  - type: directory
    path: /admin/
    secure: secure
    recurse: true
  - type: file
    path: login.aspx
"#;
        let config: RulesConfig = serde_yml::from_str(yaml).unwrap();
        assert_eq!(config.mode.as_deref(), Some("remote_only"));
        assert_eq!(config.maintain_path, Some(false));
        assert_eq!(config.bypass_query_param_name.as_deref(), Some("skipWarning"));
        assert_eq!(config.rules.len(), 2);

        match &config.rules[0] {
            RuleEntry::Directory { path, secure, recurse } => {
                assert_eq!(path.as_deref(), Some("/admin/"));
                assert_eq!(secure.as_deref(), Some("secure"));
                assert!(recurse);
            }
            other => panic!("expected Directory entry, got {:?}", other),
        }
        match &config.rules[1] {
            RuleEntry::File { path, secure } => {
                assert_eq!(path.as_deref(), Some("login.aspx"));
                assert!(secure.is_none());
            }
            other => panic!("expected File entry, got {:?}", other),
        }
    }

    #[test]
    fn recurse_defaults_to_false() {
        let yaml = r#"
rules:
  - type: directory
    path: shop
"#;
        let config: RulesConfig = serde_yml::from_str(yaml).unwrap();
        assert!(matches!(
            config.rules[0],
            RuleEntry::Directory { recurse: false, .. }
        ));
    }

    #[test]
    fn unknown_rule_type_is_rejected() {
        let yaml = r#"
rules:
  - type: folder
    path: shop
"#;
        assert!(serde_yml::from_str::<RulesConfig>(yaml).is_err());
    }

    #[test]
    fn unknown_top_level_attribute_is_rejected() {
        let yaml = r#"
mode: "on"
encryptedUrl: "https://secure.example.com/"
"#;
        assert!(serde_yml::from_str::<RulesConfig>(yaml).is_err());
    }
}
