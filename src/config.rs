//! Engine configuration
use std::str::FromStr;

use anyhow::Context;

use crate::address::{Address, AddressValidator, HexAddressValidator};

pub const DEFAULT_QUERY_LIMIT: usize = 50;
pub const MAX_QUERY_LIMIT: usize = 500;

/// Which status reports the reconciliation gateway accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconcilePolicy {
    /// Only `pending -> confirmed|failed`. Backward and cross-terminal moves are conflicts.
    #[default]
    Forward,
    /// Apply whatever status the chain watcher reports.
    Permissive,
}

impl FromStr for ReconcilePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "forward" | "strict" => Ok(ReconcilePolicy::Forward),
            "permissive" => Ok(ReconcilePolicy::Permissive),
            other => Err(anyhow::anyhow!("unknown reconcile policy '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Addresses allowed to decide trusted issuer requests.
    pub reviewers: Vec<Address>,
    pub default_query_limit: usize,
    pub max_query_limit: usize,
    pub reconcile_policy: ReconcilePolicy,
    /// Target contract of trusted issuer approval transactions. When unset the
    /// issuer's own contract address is recorded instead.
    pub trusted_issuers_registry: Option<Address>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reviewers: vec![],
            default_query_limit: DEFAULT_QUERY_LIMIT,
            max_query_limit: MAX_QUERY_LIMIT,
            reconcile_policy: ReconcilePolicy::default(),
            trusted_issuers_registry: None,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn add_reviewer(mut self, reviewer: Address) -> Self {
        if !self.reviewers.contains(&reviewer) {
            self.reviewers.push(reviewer);
        }
        self
    }
    pub fn set_default_query_limit(mut self, limit: usize) -> Self {
        self.default_query_limit = limit.max(1);
        self
    }
    pub fn set_max_query_limit(mut self, limit: usize) -> Self {
        self.max_query_limit = limit.max(1);
        self
    }
    pub fn set_reconcile_policy(mut self, policy: ReconcilePolicy) -> Self {
        self.reconcile_policy = policy;
        self
    }
    pub fn set_trusted_issuers_registry(mut self, registry: Address) -> Self {
        self.trusted_issuers_registry = Some(registry);
        self
    }

    /// Resolve the effective result size for a query. An explicit `0` yields
    /// no results; only the configured default is kept at one or more.
    pub fn query_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_query_limit)
            .min(self.max_query_limit)
    }

    /// Build a config from `COMPLIANCE_*` environment variables. Unset
    /// variables keep their defaults.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let validator = HexAddressValidator;
        let mut config = Self::new();

        if let Some(raw) = lookup("COMPLIANCE_REVIEWERS") {
            for part in raw.split(',').filter(|p| !p.trim().is_empty()) {
                let reviewer = parse_address(part, &validator)
                    .with_context(|| format!("COMPLIANCE_REVIEWERS entry '{part}'"))?;
                config = config.add_reviewer(reviewer);
            }
        }
        if let Some(raw) = lookup("COMPLIANCE_QUERY_LIMIT") {
            let limit = raw
                .trim()
                .parse::<usize>()
                .with_context(|| format!("COMPLIANCE_QUERY_LIMIT '{raw}'"))?;
            config = config.set_default_query_limit(limit);
        }
        if let Some(raw) = lookup("COMPLIANCE_MAX_QUERY_LIMIT") {
            let limit = raw
                .trim()
                .parse::<usize>()
                .with_context(|| format!("COMPLIANCE_MAX_QUERY_LIMIT '{raw}'"))?;
            config = config.set_max_query_limit(limit);
        }
        if let Some(raw) = lookup("COMPLIANCE_RECONCILE_POLICY") {
            config = config.set_reconcile_policy(raw.parse()?);
        }
        if let Some(raw) = lookup("COMPLIANCE_ISSUER_REGISTRY") {
            let registry = parse_address(&raw, &validator)
                .context("COMPLIANCE_ISSUER_REGISTRY")?;
            config = config.set_trusted_issuers_registry(registry);
        }

        if config.default_query_limit > config.max_query_limit {
            anyhow::bail!(
                "default query limit {} exceeds max query limit {}",
                config.default_query_limit,
                config.max_query_limit
            );
        }
        Ok(config)
    }
}

fn parse_address(raw: &str, validator: &dyn AddressValidator) -> anyhow::Result<Address> {
    Ok(Address::parse(raw, validator)?)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_env() {
        let config = EngineConfig::from_lookup(|_| None).unwrap();
        assert!(config.reviewers.is_empty());
        assert_eq!(config.query_limit(None), DEFAULT_QUERY_LIMIT);
        assert_eq!(config.reconcile_policy, ReconcilePolicy::Forward);
    }

    #[test]
    fn reads_reviewers_and_limits() {
        let config = EngineConfig::from_lookup(lookup(&[
            (
                "COMPLIANCE_REVIEWERS",
                "0x1111111111111111111111111111111111111111, 0xAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA",
            ),
            ("COMPLIANCE_QUERY_LIMIT", "20"),
            ("COMPLIANCE_RECONCILE_POLICY", "permissive"),
        ]))
        .unwrap();

        assert_eq!(config.reviewers.len(), 2);
        assert_eq!(
            config.reviewers[1].as_str(),
            "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"
        );
        assert_eq!(config.query_limit(None), 20);
        assert_eq!(config.query_limit(Some(10_000)), MAX_QUERY_LIMIT);
        assert_eq!(config.query_limit(Some(0)), 0);
        assert_eq!(config.reconcile_policy, ReconcilePolicy::Permissive);
    }

    #[test]
    fn from_env_without_compliance_vars_uses_defaults() {
        if std::env::vars().any(|(key, _)| key.starts_with("COMPLIANCE_")) {
            return;
        }
        let config = EngineConfig::from_env().unwrap();
        assert!(config.reviewers.is_empty());
        assert_eq!(config.default_query_limit, DEFAULT_QUERY_LIMIT);
        assert_eq!(config.trusted_issuers_registry, None);
    }

    #[test]
    fn rejects_bad_reviewer() {
        let err = EngineConfig::from_lookup(lookup(&[("COMPLIANCE_REVIEWERS", "0xnope")]));
        assert!(err.is_err());
    }
}
