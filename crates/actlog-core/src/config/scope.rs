//! Allow/deny pattern lists.

use serde::{Deserialize, Deserializer, Serialize};

/// A pair of pattern lists deciding which identifiers are audited.
///
/// `deny` carries the defaults and may be replaced wholesale; `deny_extra` is
/// appended to it so deployments can extend the defaults without restating them.
/// A non-empty `allow` list turns the scope into an allow-list.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ScopeConfig {
    #[serde(default)]
    pub allow: Vec<String>,

    #[serde(default)]
    pub deny: Vec<String>,

    #[serde(default)]
    pub deny_extra: Vec<String>,
}

impl ScopeConfig {
    /// Entities never audited unless reconfigured: the audit tables themselves
    /// and framework bookkeeping models.
    pub fn default_entities() -> Self {
        Self {
            allow: Vec::new(),
            deny: vec![
                r"^actlog\.".to_string(),
                r"^sessions\.".to_string(),
                r"^auth\.permission$".to_string(),
                r"^contenttypes\.".to_string(),
                r"^migrations\.".to_string(),
                r"^admin\.logentry$".to_string(),
            ],
            deny_extra: Vec::new(),
        }
    }

    pub fn default_urls() -> Self {
        Self {
            allow: Vec::new(),
            deny: vec![
                "^/admin/".to_string(),
                "^/static/".to_string(),
                "^/favicon.ico$".to_string(),
            ],
            deny_extra: Vec::new(),
        }
    }

    /// Deserialize an `entities:` section, keeping the default deny list when
    /// `deny` is omitted.
    pub fn deserialize_entities<'de, D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        PartialScope::deserialize(deserializer).map(|p| p.or_defaults(Self::default_entities()))
    }

    /// Deserialize a `urls:` section, keeping the default deny list when
    /// `deny` is omitted.
    pub fn deserialize_urls<'de, D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        PartialScope::deserialize(deserializer).map(|p| p.or_defaults(Self::default_urls()))
    }

    /// The deny list in evaluation order: defaults first, then extras.
    pub fn effective_deny(&self) -> Vec<String> {
        self.deny
            .iter()
            .chain(self.deny_extra.iter())
            .cloned()
            .collect()
    }
}

/// A scope section as written, before defaults are applied.
#[derive(Deserialize)]
struct PartialScope {
    #[serde(default)]
    allow: Vec<String>,

    #[serde(default)]
    deny: Option<Vec<String>>,

    #[serde(default)]
    deny_extra: Vec<String>,
}

impl PartialScope {
    fn or_defaults(self, defaults: ScopeConfig) -> ScopeConfig {
        ScopeConfig {
            allow: self.allow,
            deny: self.deny.unwrap_or(defaults.deny),
            deny_extra: self.deny_extra,
        }
    }
}
