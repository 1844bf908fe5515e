//! Allow/deny scope filtering.
//!
//! The same rule decides entity scope (qualified model names) and URL scope
//! (request paths); only the pattern lists differ.

use regex::Regex;

use actlog_core::ScopeConfig;

use crate::error::AuditError;

/// Ordered list of start-anchored patterns.
#[derive(Debug, Clone, Default)]
pub struct PatternList {
    patterns: Vec<Regex>,
}

impl PatternList {
    /// Compile patterns. Each one only matches at the start of the identifier.
    pub fn compile<S: AsRef<str>>(patterns: &[S]) -> Result<Self, AuditError> {
        let patterns = patterns
            .iter()
            .map(|p| {
                let p = p.as_ref();
                Regex::new(&format!("^(?:{p})")).map_err(|e| {
                    AuditError::configuration(format!("invalid scope pattern {p:?}: {e}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// First pattern matching `identifier`, in list order.
    pub fn first_match(&self, identifier: &str) -> Option<&Regex> {
        self.patterns.iter().find(|p| p.is_match(identifier))
    }

    pub fn matches(&self, identifier: &str) -> bool {
        self.first_match(identifier).is_some()
    }
}

/// Decide whether `identifier` is audited.
///
/// A deny match always excludes. Otherwise a non-empty allow list must match,
/// and an empty allow list admits everything.
pub fn is_in_scope(identifier: &str, allow: &PatternList, deny: &PatternList) -> bool {
    if deny.matches(identifier) {
        return false;
    }
    if !allow.is_empty() {
        return allow.matches(identifier);
    }
    true
}

/// A compiled allow/deny pair.
#[derive(Debug, Clone, Default)]
pub struct ScopeFilter {
    allow: PatternList,
    deny: PatternList,
}

impl ScopeFilter {
    pub fn new<S: AsRef<str>>(allow: &[S], deny: &[S]) -> Result<Self, AuditError> {
        Ok(Self {
            allow: PatternList::compile(allow)?,
            deny: PatternList::compile(deny)?,
        })
    }

    /// Compile the lists of a configuration section (defaults plus extras).
    pub fn from_config(config: &ScopeConfig) -> Result<Self, AuditError> {
        Self::new(config.allow.as_slice(), config.effective_deny().as_slice())
    }

    pub fn is_in_scope(&self, identifier: &str) -> bool {
        is_in_scope(identifier, &self.allow, &self.deny)
    }
}
