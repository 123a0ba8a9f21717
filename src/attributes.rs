use crate::escape::escape;
use crate::rules::AttributeRule;
use indexmap::IndexMap;

/// Attributes of an element in source order.
///
/// Keys are qualified names as written in the source (`xml:lang`, `xmlns:rng`),
/// values are unescaped.
pub type Attributes = IndexMap<String, String>;

/// Builds the opening tag `<name a="b">`, or `<name a="b" />` if `empty`.
///
/// Rules for attributes the element has are applied in place. Rules for
/// attributes it lacks only add an attribute when they carry a literal value.
pub(crate) fn opening_tag(
    name: &str,
    attributes: &Attributes,
    rules: &IndexMap<String, AttributeRule>,
    empty: bool,
) -> String {
    let mut tag = String::with_capacity(name.len() + 2 + attributes.len() * 16);
    tag.push('<');
    tag.push_str(name);
    for (attr_name, value) in attributes {
        match rules.get(attr_name) {
            Some(AttributeRule::Remove) => {}
            Some(AttributeRule::Rename(new_name)) => push_attribute(&mut tag, new_name, value),
            Some(AttributeRule::Value(new_value)) => push_attribute(&mut tag, attr_name, new_value),
            None => push_attribute(&mut tag, attr_name, value),
        }
    }
    for (attr_name, rule) in rules {
        if attributes.contains_key(attr_name) {
            continue;
        }
        // Removing or renaming a missing attribute does nothing.
        if let AttributeRule::Value(value) = rule {
            push_attribute(&mut tag, attr_name, value);
        }
    }
    if empty {
        tag.push_str(" />");
    } else {
        tag.push('>');
    }
    tag
}

fn push_attribute(tag: &mut String, name: &str, value: &str) {
    tag.push(' ');
    tag.push_str(name);
    tag.push_str("=\"");
    tag.push_str(&escape(value));
    tag.push('"');
}
