//! UI element types for uiautomator hierarchy dumps.
//!
//! A dump is ingested into a tree of [`RawNode`]s (see [`crate::hierarchy`]).
//! [`Element`] is the read-only, query-facing view over one raw node: its
//! attributes, its decoded on-screen [`Bounds`], and its children.
//!
//! # Example
//!
//! ```
//! use droidq_core::element::{Element, RawNode};
//!
//! let node = RawNode::new()
//!     .with_attribute("class", "android.widget.Button")
//!     .with_attribute("bounds", "[10,20][110,220]");
//!
//! let element = Element::new(&node).unwrap();
//! let bounds = element.bounds.unwrap();
//! assert_eq!((bounds.width, bounds.height), (100, 200));
//! assert_eq!(bounds.center(), (60, 120));
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Name of the attribute carrying the on-screen rectangle.
pub const BOUNDS_ATTRIBUTE: &str = "bounds";

/// Errors that can occur when building an [`Element`] from a [`RawNode`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ElementError {
    /// The `bounds` attribute is present but is not of the form `[x1,y1][x2,y2]`.
    #[error("Malformed bounds attribute: {value:?}")]
    MalformedBounds {
        /// The offending attribute value.
        value: String,
    },
}

/// The child reference of a [`RawNode`].
///
/// Mirrors the three shapes a parsed markup node can have: no nested nodes,
/// exactly one, or an ordered list of several.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ChildRef {
    /// The node has no nested nodes.
    #[default]
    Absent,
    /// The node has exactly one nested node.
    One(Box<RawNode>),
    /// The node has several nested nodes, in document order.
    Many(Vec<RawNode>),
}

impl ChildRef {
    /// Appends a node, promoting `Absent` to `One` and `One` to `Many`.
    pub fn push(&mut self, node: RawNode) {
        *self = match std::mem::take(self) {
            ChildRef::Absent => ChildRef::One(Box::new(node)),
            ChildRef::One(first) => ChildRef::Many(vec![*first, node]),
            ChildRef::Many(mut nodes) => {
                nodes.push(node);
                ChildRef::Many(nodes)
            }
        };
    }

    /// Iterates the referenced nodes in document order.
    pub fn iter(&self) -> std::slice::Iter<'_, RawNode> {
        match self {
            ChildRef::Absent => (&[] as &[RawNode]).iter(),
            ChildRef::One(node) => std::slice::from_ref(node.as_ref()).iter(),
            ChildRef::Many(nodes) => nodes.iter(),
        }
    }

    /// Number of referenced nodes.
    pub fn len(&self) -> usize {
        match self {
            ChildRef::Absent => 0,
            ChildRef::One(_) => 1,
            ChildRef::Many(nodes) => nodes.len(),
        }
    }

    /// Returns true if no nodes are referenced.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A parsed dump node: de-prefixed attributes plus a child reference.
///
/// Produced by the markup ingestion step; the query engine only reads it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawNode {
    /// Attribute name to raw string value.
    pub attributes: BTreeMap<String, String>,
    /// Nested nodes.
    pub children: ChildRef,
}

impl RawNode {
    /// Creates an empty node with no attributes and no children.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style attribute setter.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Builder-style child appender.
    pub fn with_child(mut self, child: RawNode) -> Self {
        self.children.push(child);
        self
    }

    /// Looks up a raw attribute value.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// On-screen rectangle of an element, in device pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    /// Left edge.
    pub x: i32,
    /// Top edge.
    pub y: i32,
    /// Horizontal extent (`x2 - x1`).
    pub width: i32,
    /// Vertical extent (`y2 - y1`).
    pub height: i32,
}

impl Bounds {
    /// Parses the uiautomator `[x1,y1][x2,y2]` notation.
    ///
    /// # Errors
    ///
    /// Returns [`ElementError::MalformedBounds`] if the value is not exactly
    /// two bracketed integer pairs.
    pub fn parse(value: &str) -> Result<Self, ElementError> {
        let malformed = || ElementError::MalformedBounds {
            value: value.to_string(),
        };

        let inner = value
            .strip_prefix('[')
            .and_then(|s| s.strip_suffix(']'))
            .ok_or_else(malformed)?;
        let (first, second) = inner.split_once("][").ok_or_else(malformed)?;
        let (x1, y1) = parse_pair(first).ok_or_else(malformed)?;
        let (x2, y2) = parse_pair(second).ok_or_else(malformed)?;

        Ok(Self {
            x: x1,
            y: y1,
            width: x2.checked_sub(x1).ok_or_else(malformed)?,
            height: y2.checked_sub(y1).ok_or_else(malformed)?,
        })
    }

    /// Integer midpoint of the rectangle, suitable as a tap target.
    pub fn center(&self) -> (i32, i32) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }

    /// Returns true if the point lies inside the rectangle (right/bottom edges exclusive).
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x && y >= self.y && x < self.x + self.width && y < self.y + self.height
    }
}

fn parse_pair(pair: &str) -> Option<(i32, i32)> {
    let (a, b) = pair.split_once(',')?;
    Some((a.parse().ok()?, b.parse().ok()?))
}

/// Read-only view over a single [`RawNode`].
///
/// The view borrows the node it wraps: attributes are read in place and
/// children are wrapped on demand by [`Element::children`], so a malformed
/// descendant never prevents a matched ancestor from being returned. Only
/// this node's own `bounds` is decoded on construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Element<'a> {
    /// Attribute name to value, as found in the dump.
    pub attributes: &'a BTreeMap<String, String>,

    /// Decoded `bounds` attribute, if the node carries one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounds: Option<Bounds>,

    #[serde(skip)]
    node: &'a RawNode,
}

impl<'a> Element<'a> {
    /// Builds the element view for `node`.
    ///
    /// # Errors
    ///
    /// Returns [`ElementError::MalformedBounds`] if the node has an
    /// unparseable `bounds` attribute.
    pub fn new(node: &'a RawNode) -> Result<Self, ElementError> {
        let bounds = node
            .attribute(BOUNDS_ATTRIBUTE)
            .map(Bounds::parse)
            .transpose()?;

        Ok(Self {
            attributes: &node.attributes,
            bounds,
            node,
        })
    }

    /// Wraps the nested nodes in document order.
    ///
    /// # Errors
    ///
    /// Returns [`ElementError::MalformedBounds`] if any direct child has an
    /// unparseable `bounds` attribute.
    pub fn children(&self) -> Result<Vec<Element<'a>>, ElementError> {
        let node = self.node;
        node.children.iter().map(Element::new).collect()
    }

    /// Number of direct children, without wrapping them.
    pub fn child_count(&self) -> usize {
        self.node.children.len()
    }

    /// The raw node this element views.
    pub fn raw(&self) -> &'a RawNode {
        self.node
    }

    /// Runs [`crate::extract::extract`] over this element's subtree,
    /// including the element itself.
    pub fn extract(&self, conditions: &crate::extract::Conditions) -> Result<Vec<Element<'a>>, ElementError> {
        crate::extract::extract(self.node, conditions)
    }

    /// Looks up an attribute value.
    pub fn attribute(&self, name: &str) -> Option<&'a str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// The `text` attribute.
    pub fn text(&self) -> Option<&'a str> {
        self.attribute("text")
    }

    /// The `class` attribute (e.g. `android.widget.Button`).
    pub fn class_name(&self) -> Option<&'a str> {
        self.attribute("class")
    }

    /// The `resource-id` attribute.
    pub fn resource_id(&self) -> Option<&'a str> {
        self.attribute("resource-id")
    }

    /// The `content-desc` attribute.
    pub fn content_desc(&self) -> Option<&'a str> {
        self.attribute("content-desc")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_parse() {
        let bounds = Bounds::parse("[10,20][110,220]").unwrap();
        assert_eq!(
            bounds,
            Bounds {
                x: 10,
                y: 20,
                width: 100,
                height: 200
            }
        );
    }

    #[test]
    fn test_bounds_single_pair_is_malformed() {
        let err = Bounds::parse("[10,20]").unwrap_err();
        assert_eq!(
            err,
            ElementError::MalformedBounds {
                value: "[10,20]".to_string()
            }
        );
    }

    #[test]
    fn test_bounds_rejects_garbage() {
        for value in ["", "10,20,110,220", "[a,b][c,d]", "[1,2][3,4][5,6]", "[1,2] [3,4]", "[1;2][3;4]"] {
            assert!(Bounds::parse(value).is_err(), "expected error for {:?}", value);
        }
    }

    #[test]
    fn test_bounds_center_and_contains() {
        let bounds = Bounds::parse("[0,0][101,51]").unwrap();
        assert_eq!(bounds.center(), (50, 25));
        assert!(bounds.contains(0, 0));
        assert!(bounds.contains(100, 50));
        assert!(!bounds.contains(101, 50));
    }

    #[test]
    fn test_empty_node_yields_empty_element() {
        let node = RawNode::default();
        let element = Element::new(&node).unwrap();
        assert!(element.attributes.is_empty());
        assert!(element.bounds.is_none());
        assert_eq!(element.child_count(), 0);
    }

    #[test]
    fn test_missing_bounds_is_not_an_error() {
        let node = RawNode::new().with_attribute("text", "OK");
        let element = Element::new(&node).unwrap();
        assert!(element.bounds.is_none());
        assert_eq!(element.text(), Some("OK"));
    }

    #[test]
    fn test_malformed_bounds_propagates() {
        let node = RawNode::new().with_attribute("bounds", "[0,0]");
        assert!(matches!(
            Element::new(&node),
            Err(ElementError::MalformedBounds { .. })
        ));
    }

    #[test]
    fn test_malformed_bounds_in_child_surfaces_on_access() {
        let node = RawNode::new().with_child(RawNode::new().with_attribute("bounds", "nope"));
        let element = Element::new(&node).unwrap();
        assert_eq!(element.child_count(), 1);
        assert!(element.children().is_err());
    }

    #[test]
    fn test_children_single() {
        let node = RawNode::new().with_child(RawNode::new().with_attribute("text", "only"));
        assert!(matches!(node.children, ChildRef::One(_)));

        let children = Element::new(&node).unwrap().children().unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].text(), Some("only"));
    }

    #[test]
    fn test_children_many_preserve_order() {
        let node = RawNode::new()
            .with_child(RawNode::new().with_attribute("index", "0"))
            .with_child(RawNode::new().with_attribute("index", "1"))
            .with_child(RawNode::new().with_attribute("index", "2"));
        assert!(matches!(node.children, ChildRef::Many(_)));

        let children = Element::new(&node).unwrap().children().unwrap();
        let indices: Vec<_> = children
            .iter()
            .map(|c| c.attribute("index").unwrap())
            .collect();
        assert_eq!(indices, ["0", "1", "2"]);
    }

    #[test]
    fn test_children_absent() {
        let node = RawNode::new().with_attribute("class", "leaf");
        assert!(node.children.is_empty());
        assert!(Element::new(&node).unwrap().children().unwrap().is_empty());
    }

    #[test]
    fn test_convenience_accessors() {
        let node = RawNode::new()
            .with_attribute("class", "android.widget.Button")
            .with_attribute("resource-id", "com.example:id/ok")
            .with_attribute("content-desc", "Confirm");
        let element = Element::new(&node).unwrap();
        assert_eq!(element.class_name(), Some("android.widget.Button"));
        assert_eq!(element.resource_id(), Some("com.example:id/ok"));
        assert_eq!(element.content_desc(), Some("Confirm"));
        assert_eq!(element.text(), None);
    }

    #[test]
    fn test_children_borrow_the_source_nodes() {
        let node = RawNode::new()
            .with_child(RawNode::new().with_attribute("index", "0"))
            .with_child(RawNode::new().with_attribute("index", "1"));
        let element = Element::new(&node).unwrap();
        assert!(std::ptr::eq(element.raw(), &node));

        let children = element.children().unwrap();
        for (child, raw) in children.iter().zip(node.children.iter()) {
            assert!(std::ptr::eq(child.raw(), raw));
            assert!(std::ptr::eq(child.attributes, &raw.attributes));
        }
    }

    #[test]
    fn test_element_serializes_without_empty_fields() {
        let node = RawNode::new().with_attribute("text", "hi");
        let element = Element::new(&node).unwrap();
        let json = serde_json::to_value(&element).unwrap();
        assert_eq!(json, serde_json::json!({ "attributes": { "text": "hi" } }));
    }
}
