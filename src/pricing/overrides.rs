//! User-agent overrides.
//!
//! The org config lists bot/crawler signatures. A request whose user agent matches an
//! active signature is answered with default prices and never reaches the pricing service.
//!
//! The raw org config payload is cached for a day. Compiling it is not free, so the last
//! compiled set is memoized next to the payload it was built from.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Deserializer, Serialize};

use crate::pricing::types::{code_or_name, SpressoError};

/// Org config endpoint carrying the override list.
pub const ORG_CONFIG_PATH: &str = "/pim/v1/priceOptimizationOrgConfig";

/// Cache key of the raw org config payload.
pub const USER_AGENT_CACHE_KEY: &str = "spresso.pricing.user_agents";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UserAgentStatus {
    Active,
    Disabled,
    Deleted,
}

impl<'de> Deserialize<'de> for UserAgentStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        code_or_name(
            deserializer,
            &[
                (0, "Active", UserAgentStatus::Active),
                (1, "Disabled", UserAgentStatus::Disabled),
                (2, "Deleted", UserAgentStatus::Deleted),
            ],
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAgentRule {
    pub name: String,
    pub regexp: String,
    pub status: UserAgentStatus,
}

#[derive(Debug, Deserialize)]
struct OrgConfig {
    data: OrgConfigData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrgConfigData {
    #[serde(default)]
    user_agent_blacklist: Vec<UserAgentRule>,
}

/// Compiled active override signatures.
#[derive(Debug, Clone, Default)]
pub struct UserAgentOverrides {
    rules: Vec<(String, Regex)>,
}

impl UserAgentOverrides {
    /// Parse an org config payload. Inactive rules are dropped; rules that fail to
    /// compile are skipped with a warning.
    pub fn parse(payload: &str) -> Result<Self, SpressoError> {
        let config: OrgConfig = serde_json::from_str(payload).map_err(|e| {
            tracing::error!(error = %e, "Unreadable user-agent override payload");
            SpressoError::Unknown
        })?;

        let rules = config
            .data
            .user_agent_blacklist
            .into_iter()
            .filter(|rule| rule.status == UserAgentStatus::Active)
            .filter_map(|rule| {
                match RegexBuilder::new(&rule.regexp).dot_matches_new_line(true).build() {
                    Ok(regex) => Some((rule.name, regex)),
                    Err(e) => {
                        tracing::warn!(rule = %rule.name, error = %e, "Skipping invalid user-agent override");
                        None
                    }
                }
            })
            .collect();

        Ok(Self { rules })
    }

    /// Name of the first active rule matching `user_agent`.
    pub fn matching_rule(&self, user_agent: &str) -> Option<&str> {
        self.rules
            .iter()
            .find(|(_, regex)| regex.is_match(user_agent))
            .map(|(name, _)| name.as_str())
    }

    pub fn matches(&self, user_agent: &str) -> bool {
        self.matching_rule(user_agent).is_some()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|(name, _)| name.as_str())
    }
}

#[derive(Debug)]
struct Compiled {
    payload: String,
    overrides: Arc<UserAgentOverrides>,
}

/// Last compiled override set, keyed by the payload it came from.
#[derive(Debug, Default)]
pub(crate) struct OverrideMemo {
    current: ArcSwapOption<Compiled>,
}

impl OverrideMemo {
    pub fn compile(&self, payload: &str) -> Result<Arc<UserAgentOverrides>, SpressoError> {
        if let Some(compiled) = self.current.load_full() {
            if compiled.payload == payload {
                return Ok(Arc::clone(&compiled.overrides));
            }
        }

        let overrides = Arc::new(UserAgentOverrides::parse(payload)?);
        tracing::debug!(active = overrides.len(), "Compiled user-agent overrides");
        self.current.store(Some(Arc::new(Compiled {
            payload: payload.to_string(),
            overrides: Arc::clone(&overrides),
        })));
        Ok(overrides)
    }
}
