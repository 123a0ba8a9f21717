//! Rewrites an XML document into a string in one forward pass.
//!
//! A callback is asked at every element boundary what to do with it. It
//! sees the tag name, the element's attributes and whether this is an
//! opening, empty or closing tag, and answers with an [`Action`]: leave the
//! boundary as is, drop the element with everything inside it, or apply a
//! [`RuleSet`]. Rules can rename or remove tags, add, remove, rename or change
//! attributes, insert literal content around and inside an element, and pass
//! the serialized element or its content through a function.
//!
//! The output does not have to be XML.
//!
//! # Examples
//! ```
//! use xml_transformer::{transform, Action, NodeKind, RuleSet};
//!
//! let xml = r#"<root><hello-world xml:lang="de" /></root>"#;
//! let output = transform(xml, |tag, attributes, _kind: NodeKind| match tag {
//!     "root" => RuleSet::new().remove_tag().into(),
//!     "hello-world" => {
//!         let greeting = match attributes.get("xml:lang").map(String::as_str) {
//!             Some("de") => "Hallo Welt",
//!             _ => "Hello world",
//!         };
//!         RuleSet::new().remove_tag().insert_before(greeting).into()
//!     }
//!     _ => Action::Unchanged,
//! })
//! .unwrap();
//! assert_eq!(output, "Hallo Welt");
//! ```
mod attributes;
mod decode;
mod entities;
mod error;
mod escape;
mod rules;
mod transformer;

pub use crate::attributes::Attributes;
pub use crate::error::{BoxError, Error, Result};
pub use crate::escape::escape;
pub use crate::rules::{
    Action, NodeKind, RuleSet, RuleValue, TransformFn, ATTRIBUTE_MARKER, RULE_INSERT_AFTER,
    RULE_INSERT_AT_END, RULE_INSERT_AT_START, RULE_INSERT_BEFORE, RULE_TAG, RULE_TRANSFORM_INNER,
    RULE_TRANSFORM_OUTER,
};
pub use crate::transformer::TransformOptions;

use crate::transformer::Transformer;
use std::io::Read;

/// Transforms `xml` with default [`TransformOptions`].
///
/// # Errors
///
/// - [`Error::MalformedXML`]: `xml` is empty or not well-formed.
/// - [`Error::UnexpectedRule`], [`Error::InvalidRule`]: the callback returned rules that cannot be applied.
/// - [`Error::Transform`]: a transform function failed.
///
/// Nothing is returned on error, not even the output produced so far.
pub fn transform<F>(xml: &str, callback: F) -> Result<String>
where
    F: FnMut(&str, &Attributes, NodeKind) -> Action,
{
    transform_with_opts(xml, callback, TransformOptions::default())
}

pub fn transform_with_opts<F>(xml: &str, callback: F, opts: TransformOptions) -> Result<String>
where
    F: FnMut(&str, &Attributes, NodeKind) -> Action,
{
    Transformer::new(callback, opts).run(xml)
}

/// Transforms xml given as bytes in any encoding `encoding_rs` supports.
///
/// # Errors
///
/// - [`Error::CannotDecode`]: The declared encoding is unknown, or the bytes are not valid in it.
///
/// Otherwise as [`transform`].
pub fn transform_bytes<F>(bytes: &[u8], callback: F, opts: TransformOptions) -> Result<String>
where
    F: FnMut(&str, &Attributes, NodeKind) -> Action,
{
    let xml = decode::decode(bytes)?;
    transform_with_opts(&xml, callback, opts)
}

/// Reads all of `reader`, then works as [`transform_bytes`].
pub fn transform_reader<R, F>(mut reader: R, callback: F, opts: TransformOptions) -> Result<String>
where
    R: Read,
    F: FnMut(&str, &Attributes, NodeKind) -> Action,
{
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    transform_bytes(&bytes, callback, opts)
}
