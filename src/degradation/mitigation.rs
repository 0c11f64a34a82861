//! Active mitigations put in place by degradation actions.
//!
//! The engine does not own the callers' data paths, so the built-in actions
//! do not serve data themselves. They publish what a caller should do
//! instead (serve `cached_data`, shorten a timeout, call `backup_service`) on
//! a [`MitigationBoard`] that callers consult before the real call.

use crate::clock::checked_after;
use crate::core::ActionError;
use crate::degradation::action::{ActionContext, ActionHandler, ActionType, DegradationAction};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// A degradation currently in effect for a service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveMitigation {
    /// Service the mitigation applies to.
    pub service: String,
    /// Strategy that put it in place.
    pub strategy_id: String,
    /// What kind of mitigation it is.
    pub action_type: ActionType,
    /// Substitute data source or backup target.
    pub target: String,
    /// Parameters copied from the action.
    pub parameters: HashMap<String, Value>,
    /// When it was first activated.
    pub activated_at: DateTime<Utc>,
    /// When it was last re-triggered.
    pub refreshed_at: DateTime<Utc>,
    /// When it lapses; `None` means until cleared.
    pub expires_at: Option<DateTime<Utc>>,
}

impl ActiveMitigation {
    /// Returns `true` once the mitigation has lapsed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(false, |at| now >= at)
    }

    /// Returns the shortened timeout of a timeout mitigation.
    pub fn timeout(&self) -> Option<Duration> {
        self.parameters
            .get("timeout_ms")
            .and_then(Value::as_u64)
            .map(Duration::from_millis)
    }

    /// Returns the backup endpoint of a redirect mitigation.
    pub fn endpoint(&self) -> Option<&str> {
        self.parameters.get("endpoint").and_then(Value::as_str)
    }
}

type MitigationKey = (String, ActionType, String);

/// The set of mitigations in effect, keyed by service, action type and
/// target.
#[derive(Debug, Default)]
pub struct MitigationBoard {
    entries: DashMap<MitigationKey, ActiveMitigation>,
}

impl MitigationBoard {
    /// Creates an empty board.
    pub fn new() -> Self {
        Self::default()
    }

    /// Activates a mitigation or refreshes the matching one.
    ///
    /// Returns `true` if it was not already in effect.
    pub fn activate(&self, mitigation: ActiveMitigation) -> bool {
        let key = (
            mitigation.service.clone(),
            mitigation.action_type,
            mitigation.target.clone(),
        );
        let now = mitigation.refreshed_at;
        let mut is_new = true;
        self.entries
            .entry(key)
            .and_modify(|existing| {
                if !existing.is_expired(now) {
                    is_new = false;
                    let activated_at = existing.activated_at;
                    *existing = mitigation.clone();
                    existing.activated_at = activated_at;
                } else {
                    *existing = mitigation.clone();
                }
            })
            .or_insert_with(|| mitigation.clone());
        is_new
    }

    /// Returns the unexpired mitigations for `service`.
    pub fn active_for(&self, service: &str, now: DateTime<Utc>) -> Vec<ActiveMitigation> {
        let mut active: Vec<_> = self
            .entries
            .iter()
            .filter(|e| e.key().0 == service && !e.value().is_expired(now))
            .map(|e| e.value().clone())
            .collect();
        active.sort_by(|a, b| (a.action_type, &a.target).cmp(&(b.action_type, &b.target)));
        active
    }

    /// Returns every unexpired mitigation.
    pub fn all(&self, now: DateTime<Utc>) -> Vec<ActiveMitigation> {
        let mut active: Vec<_> = self
            .entries
            .iter()
            .filter(|e| !e.value().is_expired(now))
            .map(|e| e.value().clone())
            .collect();
        active.sort_by(|a, b| {
            (&a.service, a.action_type, &a.target).cmp(&(&b.service, b.action_type, &b.target))
        });
        active
    }

    /// Lifts every mitigation for `service`. Returns how many were removed.
    pub fn clear(&self, service: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| key.0 != service);
        before - self.entries.len()
    }

    /// Drops lapsed mitigations. Returns how many were removed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, m| !m.is_expired(now));
        before - self.entries.len()
    }

    /// Returns the number of entries, including lapsed ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the board has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Handles the fallback, cache, timeout and redirect actions by posting
/// mitigations for the event's service.
///
/// Recognised parameters are `ttl` (ms) on every type, `timeout_ms` on
/// timeout actions (required) and `endpoint` on redirects.
#[derive(Debug, Clone)]
pub struct BuiltinActionHandler {
    board: Arc<MitigationBoard>,
}

impl BuiltinActionHandler {
    /// Creates a handler posting to `board`.
    pub fn new(board: Arc<MitigationBoard>) -> Self {
        Self { board }
    }
}

impl ActionHandler for BuiltinActionHandler {
    fn execute(&self, ctx: &ActionContext<'_>, action: &DegradationAction) -> Result<(), ActionError> {
        match action.action_type {
            ActionType::Fallback | ActionType::Cache => {}
            ActionType::Timeout => {
                if action.u64_parameter("timeout_ms")?.is_none() {
                    return Err(action.invalid("timeout_ms", "required for timeout actions"));
                }
            }
            ActionType::Redirect => {
                action.str_parameter("endpoint")?;
            }
            ActionType::Custom => {
                return Err(ActionError::NoHandler {
                    target: action.target.clone(),
                })
            }
        }

        let expires_at = match action.u64_parameter("ttl")? {
            Some(ttl) => Some(
                checked_after(ctx.now, Duration::from_millis(ttl))
                    .ok_or_else(|| action.invalid("ttl", format!("{ttl} ms is out of range")))?,
            ),
            None => None,
        };

        let is_new = self.board.activate(ActiveMitigation {
            service: ctx.event.service.clone(),
            strategy_id: ctx.strategy.id.clone(),
            action_type: action.action_type,
            target: action.target.clone(),
            parameters: action.parameters.clone(),
            activated_at: ctx.now,
            refreshed_at: ctx.now,
            expires_at,
        });

        tracing::info!(
            service = %ctx.event.service,
            strategy = %ctx.strategy.name,
            action = %action.action_type,
            target = %action.target,
            refreshed = !is_new,
            "Degradation action applied"
        );
        Ok(())
    }
}
