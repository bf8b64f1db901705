//! Pre-run connection validation.

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::node::Node;

/// Walk the successor graph reachable from `root` and verify that every
/// edge's source output kind is assignable to its target input kind.
///
/// The visit set is keyed on node identity, not name, since names are only
/// unique when a builder enforces it; cyclic graphs (agent loops) therefore
/// terminate. O(nodes + edges); call once after construction, before the
/// first run.
pub fn validate_graph(root: &Arc<Node>) -> Result<()> {
    let mut visited: HashSet<*const Node> = HashSet::new();
    let mut stack = vec![Arc::clone(root)];
    visited.insert(Arc::as_ptr(root));

    while let Some(node) = stack.pop() {
        for (action, next) in node.successors() {
            if !node.output_kind().assignable_to(next.input_kind()) {
                return Err(Error::TypeMismatch {
                    from: node.name().to_string(),
                    to: next.name().to_string(),
                    action,
                    output: node.output_kind(),
                    input: next.input_kind(),
                });
            }
            if visited.insert(Arc::as_ptr(&next)) {
                stack.push(next);
            }
        }
    }

    Ok(())
}
