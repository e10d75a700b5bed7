//! # droidq-core
//!
//! Core library for Android UI automation over `adb`.
//!
//! The heart of the crate is a small query engine over `uiautomator` dumps:
//! a dump is parsed into a tree of raw nodes, and [`extract::extract`] pulls
//! out every node whose attributes satisfy a set of patterns.
//!
//! ## Modules
//!
//! - [`element`] - Raw dump nodes and the read-only [`element::Element`] view with decoded bounds
//! - [`matcher`] - Attribute pattern matching (exact, glob, alternation, existence)
//! - [`extract`] - Pre-order, condition-based element extraction
//! - [`hierarchy`] - `uiautomator` XML ingestion
//! - [`adb`] - Wrapper around the `adb` CLI for dumps and input injection
//! - [`source`] - Dump sources (device, file) behind one async trait
//! - [`config`] - Persistent user configuration
//!
//! ## External Dependencies
//!
//! Device operations require the Android platform tools (`adb`) on `PATH`,
//! or configured via `~/.droidq/config.json`.
//!
//! ## Example
//!
//! ```
//! use droidq_core::extract::Conditions;
//! use droidq_core::hierarchy::Hierarchy;
//!
//! let dump = r#"<hierarchy rotation="0">
//!   <node class="android.widget.FrameLayout" bounds="[0,0][1080,1920]">
//!     <node class="android.widget.Button" text="OK" bounds="[40,1700][1040,1820]" />
//!   </node>
//! </hierarchy>"#;
//!
//! let hierarchy = Hierarchy::parse(dump).unwrap();
//!
//! let mut conditions = Conditions::new();
//! conditions.insert("class".into(), "*.Button|*.ImageButton".into());
//! conditions.insert("text".into(), "ok".into());
//!
//! let buttons = hierarchy.extract(&conditions).unwrap();
//! assert_eq!(buttons.len(), 1);
//! assert_eq!(buttons[0].bounds.unwrap().center(), (540, 1760));
//! ```

pub mod adb;
pub mod config;
pub mod element;
pub mod extract;
pub mod hierarchy;
pub mod matcher;
pub mod source;
