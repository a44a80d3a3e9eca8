//! Selector Policy: learned reliability of DOM selectors per search engine.
//!
//! Every `(engine, role)` pair owns an ordered list of candidate selectors and
//! a scalar value for each. [`SelectorPolicy::get_selector`] is ε-greedy:
//! usually the best-valued candidate, occasionally a random one so that a
//! selector which fell out of favour gets re-tested after the engine's markup
//! changes back. Values move with `value ← value + α·(reward − value)` and are
//! clamped to `[-value_clamp, value_clamp]`.
//!
//! When every known selector misses, callers register structural fallbacks
//! through [`SelectorPolicy::discover`]; candidates are never removed.
//!
//! Persisted as JSON (see [`PolicyState`]), written atomically (temp file +
//! rename). A missing or corrupt file leaves the seed table in place.

use crate::core::config::PolicyConfig;
use crate::core::error::ResearchError;
use crate::core::types::{Role, SelectorCandidate};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::RwLock;
use tracing::{debug, info, warn};

/// Reward for a selector that located its element and whose action succeeded.
pub const REWARD_SUCCESS: f64 = 1.0;
/// Penalty for a selector that located nothing or whose action failed.
pub const REWARD_FAILURE: f64 = -1.0;

const STATE_VERSION: u32 = 1;

type PolicyKey = (String, Role);

/// On-disk representation of the candidate table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyState {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
    pub candidates: Vec<SelectorCandidate>,
}

/// ε-greedy selector table shared by every engine search of a process.
#[derive(Debug)]
pub struct SelectorPolicy {
    config: PolicyConfig,
    table: RwLock<BTreeMap<PolicyKey, Vec<SelectorCandidate>>>,
}

impl SelectorPolicy {
    /// Empty policy; seed it with [`SelectorPolicy::seed`].
    pub fn new(config: PolicyConfig) -> Self {
        Self {
            config,
            table: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// Register seed selectors (value 0) for one `(engine, role)` pair.
    /// Already-known selectors keep their value.
    pub fn seed<S: AsRef<str>>(&self, engine: &str, role: Role, selectors: &[S]) {
        for s in selectors {
            self.discover(engine, role, s.as_ref());
        }
    }

    /// Pick a selector for `(engine, role)`.
    ///
    /// With probability ε a uniformly random candidate (exploration), otherwise
    /// the highest-valued one; ties go to the earliest registered.
    pub fn get_selector(&self, engine: &str, role: Role) -> Result<String, ResearchError> {
        use rand::prelude::*;

        let table = self.table.read().unwrap_or_else(|e| e.into_inner());
        let candidates = table
            .get(&(engine.to_string(), role))
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ResearchError::NoCandidates {
                engine: engine.to_string(),
                role,
            })?;

        let mut rng = rand::rng();
        let explore = self.config.epsilon > 0.0 && rng.random_range(0.0..1.0) < self.config.epsilon;
        let picked = if explore {
            &candidates[rng.random_range(0..candidates.len())]
        } else {
            best_candidate(candidates)
        };

        debug!(
            "selector_policy: {}/{} → '{}' (value {:.3}, {})",
            engine,
            role,
            picked.selector,
            picked.value,
            if explore { "explore" } else { "exploit" }
        );
        Ok(picked.selector.clone())
    }

    /// Move the value of `selector` toward `reward`.
    ///
    /// Returns the new value, or `None` if the selector is not registered.
    pub fn update_value(&self, engine: &str, role: Role, selector: &str, reward: f64) -> Option<f64> {
        let clamp = self.config.value_clamp;
        let reward = reward.clamp(-clamp, clamp);
        let alpha = self.config.learning_rate;

        let mut table = self.table.write().unwrap_or_else(|e| e.into_inner());
        let Some(candidate) = table
            .get_mut(&(engine.to_string(), role))
            .and_then(|list| list.iter_mut().find(|c| c.selector == selector))
        else {
            warn!(
                "selector_policy: update for unknown selector '{}' ({}/{}) ignored",
                selector, engine, role
            );
            return None;
        };

        let previous = candidate.value;
        candidate.value = (previous + alpha * (reward - previous)).clamp(-clamp, clamp);
        debug!(
            "selector_policy: {}/{} '{}' {:.3} → {:.3} (reward {:+})",
            engine, role, selector, previous, candidate.value, reward
        );
        Some(candidate.value)
    }

    /// Register a new candidate with value 0. Idempotent; returns `true` when
    /// the selector was not known before.
    pub fn discover(&self, engine: &str, role: Role, selector: &str) -> bool {
        let selector = selector.trim();
        if selector.is_empty() {
            return false;
        }
        let mut table = self.table.write().unwrap_or_else(|e| e.into_inner());
        let list = table.entry((engine.to_string(), role)).or_default();
        if list.iter().any(|c| c.selector == selector) {
            return false;
        }
        list.push(SelectorCandidate {
            engine: engine.to_string(),
            role,
            selector: selector.to_string(),
            value: 0.0,
        });
        true
    }

    /// Candidates of one pair in registration order.
    pub fn candidates(&self, engine: &str, role: Role) -> Vec<SelectorCandidate> {
        let table = self.table.read().unwrap_or_else(|e| e.into_inner());
        table
            .get(&(engine.to_string(), role))
            .cloned()
            .unwrap_or_default()
    }

    pub fn value_of(&self, engine: &str, role: Role, selector: &str) -> Option<f64> {
        let table = self.table.read().unwrap_or_else(|e| e.into_inner());
        table
            .get(&(engine.to_string(), role))?
            .iter()
            .find(|c| c.selector == selector)
            .map(|c| c.value)
    }

    /// Full table, ordered by engine, role, then registration order.
    pub fn snapshot(&self) -> PolicyState {
        let table = self.table.read().unwrap_or_else(|e| e.into_inner());
        PolicyState {
            version: STATE_VERSION,
            saved_at: Some(Utc::now()),
            candidates: table.values().flatten().cloned().collect(),
        }
    }

    /// Merge a previously saved table: known selectors take the stored value,
    /// unknown ones are appended.
    pub fn restore(&self, state: PolicyState) {
        let clamp = self.config.value_clamp;
        let mut table = self.table.write().unwrap_or_else(|e| e.into_inner());
        for stored in state.candidates {
            if stored.selector.trim().is_empty() || !stored.value.is_finite() {
                continue;
            }
            let list = table
                .entry((stored.engine.clone(), stored.role))
                .or_default();
            let value = stored.value.clamp(-clamp, clamp);
            match list.iter().position(|c| c.selector == stored.selector) {
                Some(idx) => list[idx].value = value,
                None => list.push(SelectorCandidate { value, ..stored }),
            }
        }
    }

    /// Load persisted values from `path` on top of the current (seed) table.
    ///
    /// Returns `true` when a state file was applied. A missing file is silent;
    /// an unreadable or corrupt one is logged. Either way the seeds stay usable.
    pub fn load_state(&self, path: &Path) -> bool {
        if !path.exists() {
            debug!("selector_policy: no state at {}, using seeds", path.display());
            return false;
        }
        let content = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) => {
                warn!("selector_policy: failed to read {}: {}", path.display(), e);
                return false;
            }
        };
        match serde_json::from_str::<PolicyState>(&content) {
            Ok(state) if state.version == STATE_VERSION => {
                let count = state.candidates.len();
                self.restore(state);
                info!(
                    "selector_policy: loaded {} candidates from {}",
                    count,
                    path.display()
                );
                true
            }
            Ok(state) => {
                warn!(
                    "selector_policy: unsupported state version {} at {}, using seeds",
                    state.version,
                    path.display()
                );
                false
            }
            Err(e) => {
                warn!(
                    "selector_policy: failed to parse {}: {}, using seeds",
                    path.display(),
                    e
                );
                false
            }
        }
    }

    /// Persist the full table to `path` atomically.
    pub fn save_state(&self, path: &Path) -> Result<(), ResearchError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                ResearchError::State(format!("failed to create {}: {}", parent.display(), e))
            })?;
        }

        let json = serde_json::to_string_pretty(&self.snapshot())
            .map_err(|e| ResearchError::State(format!("serialization failed: {}", e)))?;

        // Atomic write via temp file + rename.
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, json).map_err(|e| {
            ResearchError::State(format!("failed to write {}: {}", tmp.display(), e))
        })?;
        std::fs::rename(&tmp, path).map_err(|e| {
            ResearchError::State(format!(
                "failed to rename {} → {}: {}",
                tmp.display(),
                path.display(),
                e
            ))
        })?;
        debug!("selector_policy: saved to {}", path.display());
        Ok(())
    }
}

fn best_candidate(candidates: &[SelectorCandidate]) -> &SelectorCandidate {
    let mut best = &candidates[0];
    for c in &candidates[1..] {
        if c.value > best.value {
            best = c;
        }
    }
    best
}
