//! Checkpoint configuration: an opaque lookup map. Callers are expected to
//! hand the orchestrator already-structured fields rather than a raw config
//! string; interpreting those fields into
//! [`crate::drop_planner::DropDirective`]s remains in scope, since that's
//! orchestration logic, not tokenizing.

use crate::drop_planner::DropDirective;
use crate::error::{Error, Result};

/// One raw element of the `drop` config list: a bare key (`drop_named`) or a
/// `from=NAME` / `to=NAME` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDropItem {
    pub key: String,
    pub value: Option<String>,
}

impl RawDropItem {
    pub fn named(name: impl Into<String>) -> Self {
        RawDropItem {
            key: name.into(),
            value: None,
        }
    }

    pub fn from(name: impl Into<String>) -> Self {
        RawDropItem {
            key: "from".to_string(),
            value: Some(name.into()),
        }
    }

    pub fn to(name: impl Into<String>) -> Self {
        RawDropItem {
            key: "to".to_string(),
            value: Some(name.into()),
        }
    }
}

/// Per-call checkpoint configuration, as read from `target`, `name`, and
/// `drop`. Whichever layer parses the engine's actual configuration string
/// populates this struct; the orchestrator never sees the string itself.
#[derive(Debug, Clone, Default)]
pub struct CheckpointConfig {
    /// `target`: URI keys selecting trees. Empty means "no explicit
    /// target" (fall back to the all-trees/open-trees dispatch).
    pub target: Vec<String>,
    /// `name`: identifier for the new snapshot. `None`/empty means
    /// "internal".
    pub name: Option<String>,
    /// `drop`: raw directive list, interpreted by [`CheckpointConfig::drop_directives`].
    pub drop: Vec<RawDropItem>,
}

impl CheckpointConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target.push(target.into());
        self
    }

    pub fn with_drop(mut self, item: RawDropItem) -> Self {
        self.drop.push(item);
        self
    }

    /// Whether this is a "named or drop-bearing" checkpoint: naming or
    /// dropping requires touching every tree known to metadata, not just
    /// open ones.
    pub fn names_or_drops(&self) -> bool {
        self.name.as_deref().map_or(false, |n| !n.is_empty()) || !self.drop.is_empty()
    }

    /// Interprets the raw `drop` list into typed directives. Each element's
    /// operand name(s) must be validated against
    /// [`crate::name::NameValidator`] by the caller before dispatching to
    /// [`crate::drop_planner::DropPlanner`]; this method only does the
    /// bare-key-vs-`from=`/`to=` interpretation.
    pub fn drop_directives(&self) -> Result<Vec<DropDirective>> {
        self.drop
            .iter()
            .map(|item| match (item.key.as_str(), &item.value) {
                (key, None) => Ok(DropDirective::Named(key.to_string())),
                ("from", Some(v)) => Ok(DropDirective::From(v.clone())),
                ("to", Some(v)) => Ok(DropDirective::To(v.clone())),
                (key, Some(_)) => Err(Error::invalid_argument(format!(
                    "unexpected value for checkpoint key: {}",
                    key
                ))),
            })
            .collect()
    }

    /// Validates that every `target` entry has no associated value (URIs
    /// containing colons require quoting in the config syntax, so a
    /// non-empty value at this layer always indicates a malformed target).
    /// Our `target` field is just `Vec<String>`, so this is a no-op left in
    /// place to document the invariant the opaque config map must uphold
    /// before handing us its keys.
    pub fn validate_targets(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_key_is_named() {
        let cfg = CheckpointConfig::new().with_drop(RawDropItem::named("s1"));
        assert_eq!(
            cfg.drop_directives().unwrap(),
            vec![DropDirective::Named("s1".to_string())]
        );
    }

    #[test]
    fn from_and_to_keys() {
        let cfg = CheckpointConfig::new()
            .with_drop(RawDropItem::from("s2"))
            .with_drop(RawDropItem::to("s4"));
        assert_eq!(
            cfg.drop_directives().unwrap(),
            vec![
                DropDirective::From("s2".to_string()),
                DropDirective::To("s4".to_string())
            ]
        );
    }

    #[test]
    fn unknown_key_with_value_is_invalid_argument() {
        let cfg = CheckpointConfig::new().with_drop(RawDropItem {
            key: "bogus".to_string(),
            value: Some("x".to_string()),
        });
        assert!(matches!(
            cfg.drop_directives(),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn names_or_drops_detection() {
        assert!(!CheckpointConfig::new().names_or_drops());
        assert!(CheckpointConfig::new().with_name("x").names_or_drops());
        assert!(CheckpointConfig::new()
            .with_drop(RawDropItem::named("x"))
            .names_or_drops());
    }
}
