//! Actions label the outgoing edges of a node.
//!
//! Post returns an [`Action`]; the runner looks it up in the current node's
//! successor map to pick the next node. An action with no matching successor
//! ends the run with the current output. `"default"` is the conventional
//! label for a node's single forward path.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A non-empty string identifying an outgoing edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Action(String);

impl Action {
    /// The reserved label for a node's single forward path.
    pub const DEFAULT: &'static str = "default";

    /// Create an action. The name must be non-empty; connecting an edge
    /// under an empty action is rejected by [`Node::connect`].
    ///
    /// [`Node::connect`]: crate::node::Node::connect
    pub fn new(name: impl Into<String>) -> Self {
        Action(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    pub fn is_default(&self) -> bool {
        self.0 == Self::DEFAULT
    }
}

impl Default for Action {
    fn default() -> Self {
        Action(Self::DEFAULT.to_string())
    }
}

impl From<&str> for Action {
    fn from(name: &str) -> Self {
        Action::new(name)
    }
}

impl From<String> for Action {
    fn from(name: String) -> Self {
        Action::new(name)
    }
}

impl AsRef<str> for Action {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for Action {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Action {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_action() {
        let action = Action::default();
        assert!(action.is_default());
        assert_eq!(action, "default");
    }

    #[test]
    fn from_str() {
        let action: Action = "high".into();
        assert_eq!(action.name(), "high");
        assert!(!action.is_default());
    }
}
