//! tether value tree
//!
//! Immutable, reference-counted JSON-like values used to marshal call
//! arguments and results across the async boundary.
//!
//! # Example
//! ```rust
//! use tether_value::{ParseStrategy, ValueTree};
//!
//! let tree = ValueTree::parse(r#"{"name": "tether", "tags": [1, 2.5]}"#, ParseStrategy::Standard).unwrap();
//! assert_eq!(tree["name"].string_value(), "tether");
//! assert_eq!(tree["tags"][1].number_value(), 2.5);
//! assert!(tree["missing"].is_null());
//! ```

mod tree;
mod parse;
mod dump;
mod serde_impl;

#[cfg(feature = "quickjs")]
pub mod quickjs;

pub use tree::{Kind, ValueTree, Object, Array};
pub use parse::{ParseStrategy, ParseError, MultiParse, MAX_DEPTH};

/// Parse result
pub type Result<T> = std::result::Result<T, ParseError>;
