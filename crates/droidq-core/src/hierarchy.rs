//! Ingestion of `uiautomator dump` XML.
//!
//! A dump looks like:
//!
//! ```xml
//! <?xml version='1.0' encoding='UTF-8' standalone='yes' ?>
//! <hierarchy rotation="0">
//!   <node index="0" text="" class="android.widget.FrameLayout" bounds="[0,0][1080,1920]">
//!     <node index="0" text="OK" class="android.widget.Button" bounds="[40,1700][1040,1820]" />
//!   </node>
//! </hierarchy>
//! ```
//!
//! [`Hierarchy::parse`] turns it into a [`RawNode`] tree rooted at the first
//! top-level `<node>`. Attribute names are stored without any namespace
//! prefix and values are unescaped.

use quick_xml::escape::unescape;
use quick_xml::events::BytesStart;
use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;
use tracing::{debug, warn};

use crate::element::{Element, ElementError, RawNode};
use crate::extract::{count_nodes, extract, Conditions};

const NODE_TAG: &[u8] = b"node";

/// Errors that can occur while ingesting or querying a dump.
#[derive(Error, Debug)]
pub enum HierarchyError {
    /// The XML reader failed.
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// An attribute could not be read.
    #[error("XML attribute error: {0}")]
    Attribute(#[from] quick_xml::events::attributes::AttrError),

    /// An attribute value contained an invalid escape sequence.
    #[error("XML escape error: {0}")]
    Escape(#[from] quick_xml::escape::EscapeError),

    /// An attribute name or value was not valid UTF-8.
    #[error("Invalid UTF-8 in dump: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// A matched element could not be built.
    #[error(transparent)]
    Element(#[from] ElementError),
}

/// A parsed UI hierarchy snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hierarchy {
    root: RawNode,
}

impl Hierarchy {
    /// Wraps an already-built raw tree.
    pub fn from_root(root: RawNode) -> Self {
        Self { root }
    }

    /// Parses a `uiautomator dump` document.
    ///
    /// Text before the first `<` (such as a status banner) is skipped. A
    /// document without any `<node>` yields an empty root.
    ///
    /// # Errors
    ///
    /// Returns [`HierarchyError`] if the XML cannot be read.
    pub fn parse(dump: &str) -> Result<Self, HierarchyError> {
        let xml = dump.find('<').map_or("", |start| &dump[start..]);

        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<RawNode> = Vec::new();
        let mut top_level: Vec<RawNode> = Vec::new();

        loop {
            match reader.read_event()? {
                Event::Start(e) if e.local_name().as_ref() == NODE_TAG => {
                    stack.push(read_node(&e)?);
                }
                Event::Empty(e) if e.local_name().as_ref() == NODE_TAG => {
                    let node = read_node(&e)?;
                    attach(node, &mut stack, &mut top_level);
                }
                Event::End(e) if e.local_name().as_ref() == NODE_TAG => {
                    if let Some(node) = stack.pop() {
                        attach(node, &mut stack, &mut top_level);
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        // Unclosed nodes at EOF: fold them back up so nothing is lost.
        while let Some(node) = stack.pop() {
            attach(node, &mut stack, &mut top_level);
        }

        if top_level.len() > 1 {
            warn!(
                count = top_level.len(),
                "Dump has several top-level nodes, using the first"
            );
        }

        let root = top_level.into_iter().next().unwrap_or_default();
        debug!(nodes = count_nodes(&root), "Parsed hierarchy");
        Ok(Self { root })
    }

    /// The raw root node.
    pub fn raw_root(&self) -> &RawNode {
        &self.root
    }

    /// Unfiltered element view of the root node.
    pub fn root(&self) -> Result<Element<'_>, ElementError> {
        Element::new(&self.root)
    }

    /// All elements matching `conditions`, in document order.
    pub fn extract(&self, conditions: &Conditions) -> Result<Vec<Element<'_>>, ElementError> {
        extract(&self.root, conditions)
    }

    /// The first element matching `conditions`, if any.
    pub fn first(&self, conditions: &Conditions) -> Result<Option<Element<'_>>, ElementError> {
        Ok(self.extract(conditions)?.into_iter().next())
    }

    /// Number of nodes in the snapshot.
    pub fn len(&self) -> usize {
        count_nodes(&self.root)
    }

    /// Returns true if the snapshot holds only an empty default root.
    pub fn is_empty(&self) -> bool {
        self.root == RawNode::default()
    }
}

fn read_node(start: &BytesStart<'_>) -> Result<RawNode, HierarchyError> {
    let mut node = RawNode::new();
    for attr in start.attributes() {
        let attr = attr?;
        let name = String::from_utf8(attr.key.local_name().as_ref().to_vec())?;
        let raw = String::from_utf8(attr.value.to_vec())?;
        let value = unescape(&raw)?.into_owned();
        node.attributes.insert(name, value);
    }
    Ok(node)
}

fn attach(node: RawNode, stack: &mut [RawNode], top_level: &mut Vec<RawNode>) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => top_level.push(node),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::ChildRef;

    const LOGIN_DUMP: &str = r#"<?xml version='1.0' encoding='UTF-8' standalone='yes' ?>
<hierarchy rotation="0">
  <node index="0" text="" resource-id="" class="android.widget.FrameLayout" package="com.example" bounds="[0,0][1080,1920]">
    <node index="0" text="Sign in" resource-id="com.example:id/title" class="android.widget.TextView" package="com.example" bounds="[40,100][1040,200]" />
    <node index="1" text="" resource-id="com.example:id/form" class="android.widget.LinearLayout" package="com.example" bounds="[0,300][1080,1500]">
      <node index="0" text="Email &amp; phone" resource-id="com.example:id/user" class="android.widget.EditText" package="com.example" bounds="[40,320][1040,420]" />
    </node>
    <node index="2" text="OK" resource-id="com.example:id/ok" class="android.widget.Button" package="com.example" bounds="[40,1700][1040,1820]" />
  </node>
</hierarchy>"#;

    fn conditions(pairs: &[(&str, &str)]) -> Conditions {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_shapes_children() {
        let hierarchy = Hierarchy::parse(LOGIN_DUMP).unwrap();
        let root = hierarchy.raw_root();
        assert_eq!(root.attribute("class"), Some("android.widget.FrameLayout"));
        assert!(matches!(root.children, ChildRef::Many(ref nodes) if nodes.len() == 3));

        let form = root.children.iter().nth(1).unwrap();
        assert!(matches!(form.children, ChildRef::One(_)));

        let ok = root.children.iter().nth(2).unwrap();
        assert!(matches!(ok.children, ChildRef::Absent));
        assert_eq!(hierarchy.len(), 5);
    }

    #[test]
    fn test_parse_unescapes_attributes() {
        let hierarchy = Hierarchy::parse(LOGIN_DUMP).unwrap();
        let user = hierarchy
            .first(&conditions(&[("resource-id", "*:id/user")]))
            .unwrap()
            .unwrap();
        assert_eq!(user.text(), Some("Email & phone"));
    }

    #[test]
    fn test_extract_buttons_with_bounds() {
        let hierarchy = Hierarchy::parse(LOGIN_DUMP).unwrap();
        let found = hierarchy
            .extract(&conditions(&[("class", "*.Button|*.EditText")]))
            .unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].resource_id(), Some("com.example:id/user"));
        assert_eq!(found[1].bounds.unwrap().center(), (540, 1760));
    }

    #[test]
    fn test_root_view() {
        let hierarchy = Hierarchy::parse(LOGIN_DUMP).unwrap();
        let root = hierarchy.root().unwrap();
        assert_eq!(root.child_count(), 3);
        let children = root.children().unwrap();
        assert_eq!(children[0].text(), Some("Sign in"));
    }

    #[test]
    fn test_banner_is_skipped() {
        let dump = format!("{}UI hierchary dumped to: /dev/tty", LOGIN_DUMP);
        let hierarchy = Hierarchy::parse(&dump).unwrap();
        assert_eq!(hierarchy.len(), 5);

        let dump = format!("some prefix\n{}", LOGIN_DUMP);
        assert_eq!(Hierarchy::parse(&dump).unwrap().len(), 5);
    }

    #[test]
    fn test_empty_document_yields_empty_root() {
        let hierarchy = Hierarchy::parse("").unwrap();
        assert!(hierarchy.is_empty());

        let hierarchy = Hierarchy::parse("<hierarchy rotation=\"0\"></hierarchy>").unwrap();
        assert!(hierarchy.is_empty());
        assert_eq!(hierarchy.extract(&Conditions::new()).unwrap().len(), 1);
    }

    #[test]
    fn test_namespace_prefix_is_stripped() {
        let hierarchy =
            Hierarchy::parse(r#"<hierarchy><node a:text="Hi" class="X" /></hierarchy>"#).unwrap();
        assert_eq!(hierarchy.raw_root().attribute("text"), Some("Hi"));
    }

    #[test]
    fn test_first_returns_none_on_no_match() {
        let hierarchy = Hierarchy::parse(LOGIN_DUMP).unwrap();
        assert!(hierarchy
            .first(&conditions(&[("text", "Cancel")]))
            .unwrap()
            .is_none());
    }
}
