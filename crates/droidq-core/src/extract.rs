//! Condition-based extraction of elements from a raw hierarchy.
//!
//! [`extract`] walks a [`RawNode`] tree in document (pre-order) order and
//! returns an [`Element`] for every node that satisfies all conditions.
//! Only matched nodes are wrapped; traversal itself reads raw nodes.
//!
//! # Example
//!
//! ```
//! use droidq_core::element::RawNode;
//! use droidq_core::extract::{extract, Conditions};
//!
//! let root = RawNode::new()
//!     .with_attribute("class", "android.widget.FrameLayout")
//!     .with_child(RawNode::new().with_attribute("class", "android.widget.Button"))
//!     .with_child(RawNode::new().with_attribute("class", "android.widget.ImageButton"));
//!
//! let mut conditions = Conditions::new();
//! conditions.insert("class".into(), "*.Button|*.ImageButton".into());
//!
//! let found = extract(&root, &conditions).unwrap();
//! assert_eq!(found.len(), 2);
//! ```

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::debug;

use crate::element::{Element, ElementError, RawNode};
use crate::matcher::attribute_matches;

/// Attribute name to pattern. A node must satisfy every entry.
///
/// An empty condition set matches every node.
pub type Conditions = BTreeMap<String, String>;

/// Error returned by [`parse_condition`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid condition {0:?}: expected ATTRIBUTE=PATTERN")]
pub struct ConditionSyntaxError(pub String);

/// Parses a `name=pattern` condition, splitting on the first `=`.
///
/// The attribute name must be non-empty; the pattern may be anything,
/// including another `=`.
pub fn parse_condition(input: &str) -> Result<(String, String), ConditionSyntaxError> {
    match input.split_once('=') {
        Some((name, pattern)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), pattern.to_string()))
        }
        _ => Err(ConditionSyntaxError(input.to_string())),
    }
}

/// Returns true if `node` satisfies every condition.
///
/// A condition fails when the node lacks the attribute or its value is empty,
/// before the pattern is even consulted.
pub fn node_matches(node: &RawNode, conditions: &Conditions) -> bool {
    conditions.iter().all(|(name, pattern)| match node.attribute(name) {
        Some(value) if !value.is_empty() => attribute_matches(pattern, Some(value)),
        _ => false,
    })
}

/// Collects every node under (and including) `root` that matches `conditions`,
/// in pre-order.
///
/// # Errors
///
/// Returns [`ElementError::MalformedBounds`] if a matched node has an
/// unparseable `bounds` attribute. Unmatched nodes are never decoded.
///
/// The returned elements borrow from `root`; no part of the tree is copied.
pub fn extract<'a>(root: &'a RawNode, conditions: &Conditions) -> Result<Vec<Element<'a>>, ElementError> {
    let mut extracted = Vec::new();
    collect(root, conditions, &mut extracted)?;
    debug!(
        conditions = conditions.len(),
        matched = extracted.len(),
        "Extraction complete"
    );
    Ok(extracted)
}

fn collect<'a>(
    node: &'a RawNode,
    conditions: &Conditions,
    extracted: &mut Vec<Element<'a>>,
) -> Result<(), ElementError> {
    if node_matches(node, conditions) {
        extracted.push(Element::new(node)?);
    }
    for child in node.children.iter() {
        collect(child, conditions, extracted)?;
    }
    Ok(())
}

/// Counts the nodes in a raw tree, including the root.
pub fn count_nodes(root: &RawNode) -> usize {
    1 + root.children.iter().map(count_nodes).sum::<usize>()
}
