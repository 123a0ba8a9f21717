use crate::error::{BoxError, Error, Result};
use indexmap::IndexMap;
use std::fmt;

/// Replacement tag name. [`RuleValue::Off`] or an empty name removes the tag but keeps its content.
pub const RULE_TAG: &str = "tag";
/// Literal content inserted before the opening tag.
pub const RULE_INSERT_BEFORE: &str = "insert-before";
/// Literal content inserted after the closing tag.
pub const RULE_INSERT_AFTER: &str = "insert-after";
/// Literal content inserted right after the opening tag.
pub const RULE_INSERT_AT_START: &str = "insert-at-start";
/// Literal content inserted right before the closing tag.
pub const RULE_INSERT_AT_END: &str = "insert-at-end";
/// Function receiving the whole serialized element, tags included.
pub const RULE_TRANSFORM_OUTER: &str = "transform-outer";
/// Function receiving the serialized content of the element, tags excluded.
pub const RULE_TRANSFORM_INNER: &str = "transform-inner";
/// Prefix of attribute rule keys (`@href`) and of attribute rename targets (`@src`).
pub const ATTRIBUTE_MARKER: char = '@';

/// Function applied to the serialized form of a subtree.
pub type TransformFn = Box<dyn FnOnce(String) -> std::result::Result<String, BoxError>>;

/// Which boundary of an element the callback is being asked about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Opening tag of an element that has a matching closing tag.
    Open,
    /// Self-closing element, e.g. `<br />`.
    Empty,
    /// Closing tag.
    Close,
}

/// What the callback wants done at an element boundary.
#[derive(Debug)]
pub enum Action {
    /// Copy the boundary as it is.
    Unchanged,
    /// Drop the element together with everything inside it.
    Suppress,
    /// Apply the given rules.
    Rules(RuleSet),
}

impl Default for Action {
    fn default() -> Action {
        Action::Unchanged
    }
}

impl From<RuleSet> for Action {
    fn from(rules: RuleSet) -> Action {
        Action::Rules(rules)
    }
}

impl From<Option<RuleSet>> for Action {
    fn from(rules: Option<RuleSet>) -> Action {
        match rules {
            Some(rules) => Action::Rules(rules),
            None => Action::Unchanged,
        }
    }
}

/// Value stored under a rule key.
pub enum RuleValue {
    Text(String),
    /// The "false" value: removes a tag or an attribute, disables an insertion.
    Off,
    Transform(TransformFn),
}

impl RuleValue {
    fn kind(&self) -> &'static str {
        match self {
            RuleValue::Text(_) => "text",
            RuleValue::Off => "off",
            RuleValue::Transform(_) => "transform function",
        }
    }
}

impl fmt::Debug for RuleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleValue::Text(text) => f.debug_tuple("Text").field(text).finish(),
            RuleValue::Off => f.write_str("Off"),
            RuleValue::Transform(_) => f.write_str("Transform(..)"),
        }
    }
}

impl From<&str> for RuleValue {
    fn from(text: &str) -> RuleValue {
        RuleValue::Text(text.to_string())
    }
}

impl From<String> for RuleValue {
    fn from(text: String) -> RuleValue {
        RuleValue::Text(text)
    }
}

/// Rules returned by the callback for one element boundary.
///
/// Keys are plain strings so that a rule set can be assembled from data.
/// The builder methods cover every recognized key; [`RuleSet::set`] accepts
/// anything and leaves the checking to the transformer.
///
/// # Examples
/// ```
/// use xml_transformer::RuleSet;
///
/// let rules = RuleSet::new()
///     .tag("section")
///     .rename_attr("id", "xml:id")
///     .remove_attr("style")
///     .insert_before("\n");
/// assert_eq!(rules.len(), 4);
/// ```
#[derive(Debug, Default)]
pub struct RuleSet {
    entries: IndexMap<String, RuleValue>,
}

impl RuleSet {
    pub fn new() -> RuleSet {
        RuleSet::default()
    }

    /// Sets `key` to `value`, replacing an earlier value for the same key.
    pub fn set<K: Into<String>, V: Into<RuleValue>>(mut self, key: K, value: V) -> RuleSet {
        self.entries.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&RuleValue> {
        self.entries.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|key| key.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Renames the tag.
    pub fn tag<S: Into<String>>(self, name: S) -> RuleSet {
        self.set(RULE_TAG, name.into())
    }

    /// Removes the tag itself. Content inside the element is kept.
    pub fn remove_tag(self) -> RuleSet {
        self.set(RULE_TAG, RuleValue::Off)
    }

    /// Sets the value of attribute `name`, adding it if the element doesn't have it.
    ///
    /// A value starting with [`ATTRIBUTE_MARKER`] is read as a rename, see [`RuleSet::rename_attr`].
    pub fn attr<N: AsRef<str>, V: Into<String>>(self, name: N, value: V) -> RuleSet {
        let key = attribute_key(name.as_ref());
        self.set(key, value.into())
    }

    /// Renames attribute `name`, keeping its value.
    /// Has no effect if the element doesn't have the attribute.
    pub fn rename_attr<N: AsRef<str>, M: AsRef<str>>(self, name: N, new_name: M) -> RuleSet {
        let key = attribute_key(name.as_ref());
        let target = attribute_key(new_name.as_ref());
        self.set(key, target)
    }

    pub fn remove_attr<N: AsRef<str>>(self, name: N) -> RuleSet {
        let key = attribute_key(name.as_ref());
        self.set(key, RuleValue::Off)
    }

    pub fn insert_before<S: Into<String>>(self, content: S) -> RuleSet {
        self.set(RULE_INSERT_BEFORE, content.into())
    }

    pub fn insert_after<S: Into<String>>(self, content: S) -> RuleSet {
        self.set(RULE_INSERT_AFTER, content.into())
    }

    pub fn insert_at_start<S: Into<String>>(self, content: S) -> RuleSet {
        self.set(RULE_INSERT_AT_START, content.into())
    }

    pub fn insert_at_end<S: Into<String>>(self, content: S) -> RuleSet {
        self.set(RULE_INSERT_AT_END, content.into())
    }

    /// Replaces the whole element (tags, content and insertions) with the result of `f`.
    pub fn transform_outer<F>(self, f: F) -> RuleSet
    where
        F: FnOnce(String) -> String + 'static,
    {
        self.try_transform_outer(move |content| Ok::<_, BoxError>(f(content)))
    }

    pub fn try_transform_outer<F, E>(self, f: F) -> RuleSet
    where
        F: FnOnce(String) -> std::result::Result<String, E> + 'static,
        E: Into<BoxError>,
    {
        self.set(RULE_TRANSFORM_OUTER, boxed_transform(f))
    }

    /// Replaces the content of the element with the result of `f`, keeping its tags.
    pub fn transform_inner<F>(self, f: F) -> RuleSet
    where
        F: FnOnce(String) -> String + 'static,
    {
        self.try_transform_inner(move |content| Ok::<_, BoxError>(f(content)))
    }

    pub fn try_transform_inner<F, E>(self, f: F) -> RuleSet
    where
        F: FnOnce(String) -> std::result::Result<String, E> + 'static,
        E: Into<BoxError>,
    {
        self.set(RULE_TRANSFORM_INNER, boxed_transform(f))
    }
}

fn attribute_key(name: &str) -> String {
    let mut key = String::with_capacity(name.len() + 1);
    key.push(ATTRIBUTE_MARKER);
    key.push_str(name);
    key
}

fn boxed_transform<F, E>(f: F) -> RuleValue
where
    F: FnOnce(String) -> std::result::Result<String, E> + 'static,
    E: Into<BoxError>,
{
    RuleValue::Transform(Box::new(
        move |content: String| -> std::result::Result<String, BoxError> {
            f(content).map_err(Into::into)
        },
    ))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum AttributeRule {
    Remove,
    Rename(String),
    Value(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TransformMode {
    Outer,
    Inner,
}

/// Rules of an opening or empty boundary, checked and split into their parts.
pub(crate) struct OpenRules {
    /// `None` if the tag is removed.
    pub tag: Option<String>,
    pub insert_before: String,
    pub insert_at_start: String,
    pub insert_after: String,
    pub transform: Option<(TransformMode, TransformFn)>,
    pub attributes: IndexMap<String, AttributeRule>,
}

impl OpenRules {
    pub fn unchanged(name: &str) -> OpenRules {
        OpenRules {
            tag: Some(name.to_string()),
            insert_before: String::new(),
            insert_at_start: String::new(),
            insert_after: String::new(),
            transform: None,
            attributes: IndexMap::new(),
        }
    }
}

/// Rules of a closing boundary.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct CloseRules {
    pub tag: Option<String>,
    pub insert_at_end: String,
    pub insert_after: String,
}

impl CloseRules {
    pub fn unchanged(name: &str) -> CloseRules {
        CloseRules {
            tag: Some(name.to_string()),
            insert_at_end: String::new(),
            insert_after: String::new(),
        }
    }
}

// Every recognized key, destructured. Shared by both boundaries.
struct Parts {
    tag: Option<String>,
    insert_before: String,
    insert_after: String,
    insert_at_start: String,
    insert_at_end: String,
    transform_outer: Option<TransformFn>,
    transform_inner: Option<TransformFn>,
    attributes: IndexMap<String, AttributeRule>,
}

impl RuleSet {
    pub(crate) fn into_open_rules(self, name: &str, empty: bool) -> Result<OpenRules> {
        let parts = self.into_parts(name)?;
        if empty {
            if !parts.insert_at_end.is_empty() {
                return Err(invalid(
                    RULE_INSERT_AT_END,
                    name,
                    format!("empty tags have no content, use \"{}\"", RULE_INSERT_AFTER),
                ));
            }
            if !parts.insert_at_start.is_empty() {
                return Err(invalid(
                    RULE_INSERT_AT_START,
                    name,
                    format!("empty tags have no content, use \"{}\"", RULE_INSERT_BEFORE),
                ));
            }
            if parts.transform_outer.is_some() {
                return Err(invalid(
                    RULE_TRANSFORM_OUTER,
                    name,
                    format!(
                        "does not work with empty tags, use \"{}\" and \"{}\" to wrap the tag",
                        RULE_INSERT_BEFORE, RULE_INSERT_AFTER
                    ),
                ));
            }
        }

        let transform = match (parts.transform_outer, parts.transform_inner) {
            (Some(f), _) => Some((TransformMode::Outer, f)),
            (None, Some(f)) => Some((TransformMode::Inner, f)),
            (None, None) => None,
        };
        Ok(OpenRules {
            tag: parts.tag,
            insert_before: parts.insert_before,
            insert_at_start: parts.insert_at_start,
            insert_after: parts.insert_after,
            transform,
            attributes: parts.attributes,
        })
    }

    pub(crate) fn into_close_rules(self, name: &str) -> Result<CloseRules> {
        let parts = self.into_parts(name)?;
        Ok(CloseRules {
            tag: parts.tag,
            insert_at_end: parts.insert_at_end,
            insert_after: parts.insert_after,
        })
    }

    fn into_parts(self, name: &str) -> Result<Parts> {
        let mut parts = Parts {
            tag: Some(name.to_string()),
            insert_before: String::new(),
            insert_after: String::new(),
            insert_at_start: String::new(),
            insert_at_end: String::new(),
            transform_outer: None,
            transform_inner: None,
            attributes: IndexMap::new(),
        };
        for (key, value) in self.entries {
            match key.as_str() {
                RULE_TAG => {
                    parts.tag = match text_value(&key, name, value)? {
                        Some(tag) if !tag.is_empty() => Some(tag),
                        _ => None,
                    }
                }
                RULE_INSERT_BEFORE => parts.insert_before = insertion(&key, name, value)?,
                RULE_INSERT_AFTER => parts.insert_after = insertion(&key, name, value)?,
                RULE_INSERT_AT_START => parts.insert_at_start = insertion(&key, name, value)?,
                RULE_INSERT_AT_END => parts.insert_at_end = insertion(&key, name, value)?,
                RULE_TRANSFORM_OUTER => parts.transform_outer = transform_value(&key, name, value)?,
                RULE_TRANSFORM_INNER => parts.transform_inner = transform_value(&key, name, value)?,
                _ => {
                    let attr_name = key
                        .strip_prefix(ATTRIBUTE_MARKER)
                        .filter(|attr_name| !attr_name.is_empty())
                        .map(str::to_string);
                    let attr_name = match attr_name {
                        Some(attr_name) => attr_name,
                        None => {
                            return Err(Error::UnexpectedRule {
                                key,
                                tag: name.to_string(),
                            })
                        }
                    };
                    let rule = match text_value(&key, name, value)? {
                        None => AttributeRule::Remove,
                        Some(text) => match text.strip_prefix(ATTRIBUTE_MARKER) {
                            Some(new_name) => AttributeRule::Rename(new_name.to_string()),
                            None => AttributeRule::Value(text),
                        },
                    };
                    parts.attributes.insert(attr_name, rule);
                }
            }
        }
        Ok(parts)
    }
}

fn invalid(key: &str, tag: &str, hint: String) -> Error {
    Error::InvalidRule {
        key: key.to_string(),
        tag: tag.to_string(),
        hint,
    }
}

fn wrong_kind(key: &str, tag: &str, expected: &str, value: &RuleValue) -> Error {
    invalid(
        key,
        tag,
        format!("expected {}, got {}", expected, value.kind()),
    )
}

// `Off` is returned as `None`.
fn text_value(key: &str, tag: &str, value: RuleValue) -> Result<Option<String>> {
    match value {
        RuleValue::Text(text) => Ok(Some(text)),
        RuleValue::Off => Ok(None),
        value => Err(wrong_kind(key, tag, "text or off", &value)),
    }
}

fn insertion(key: &str, tag: &str, value: RuleValue) -> Result<String> {
    Ok(text_value(key, tag, value)?.unwrap_or_default())
}

fn transform_value(key: &str, tag: &str, value: RuleValue) -> Result<Option<TransformFn>> {
    match value {
        RuleValue::Transform(f) => Ok(Some(f)),
        RuleValue::Off => Ok(None),
        value => Err(wrong_kind(key, tag, "a transform function or off", &value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_keys() {
        let rules = RuleSet::new()
            .tag("b")
            .attr("xml:id", "x")
            .rename_attr("a", "c")
            .remove_attr("d")
            .insert_at_end("!");
        let keys: Vec<&str> = rules.keys().collect();
        assert_eq!(keys, vec!["tag", "@xml:id", "@a", "@d", "insert-at-end"]);
        assert!(matches!(rules.get("@a"), Some(RuleValue::Text(t)) if t == "@c"));
        assert!(matches!(rules.get("@d"), Some(RuleValue::Off)));
    }

    #[test]
    fn test_set_replaces() {
        let rules = RuleSet::new().tag("a").tag("b");
        assert_eq!(rules.len(), 1);
        assert!(matches!(rules.get("tag"), Some(RuleValue::Text(t)) if t == "b"));
    }

    #[test]
    fn test_open_rules() {
        let rules = RuleSet::new()
            .tag("new")
            .attr("a", "1")
            .rename_attr("b", "c")
            .remove_attr("d")
            .insert_before("<")
            .insert_at_start("[")
            .transform_inner(|s| s)
            .into_open_rules("old", false)
            .unwrap();
        assert_eq!(rules.tag.as_deref(), Some("new"));
        assert_eq!(rules.insert_before, "<");
        assert_eq!(rules.insert_at_start, "[");
        assert!(matches!(rules.transform, Some((TransformMode::Inner, _))));
        assert_eq!(rules.attributes["a"], AttributeRule::Value("1".to_string()));
        assert_eq!(rules.attributes["b"], AttributeRule::Rename("c".to_string()));
        assert_eq!(rules.attributes["d"], AttributeRule::Remove);
    }

    #[test]
    fn test_outer_wins_over_inner() {
        let rules = RuleSet::new()
            .transform_inner(|s| s)
            .transform_outer(|s| s)
            .into_open_rules("e", false)
            .unwrap();
        assert!(matches!(rules.transform, Some((TransformMode::Outer, _))));
    }

    #[test]
    fn test_falsy_tag() {
        let off = RuleSet::new().remove_tag().into_close_rules("e").unwrap();
        assert_eq!(off.tag, None);
        let empty = RuleSet::new().tag("").into_close_rules("e").unwrap();
        assert_eq!(empty.tag, None);
        let absent = RuleSet::new().into_close_rules("e").unwrap();
        assert_eq!(absent, CloseRules::unchanged("e"));
    }

    #[test]
    fn test_unexpected_key() {
        let err = RuleSet::new()
            .set("unexpected", "value")
            .into_open_rules("root", false)
            .err()
            .unwrap();
        match err {
            Error::UnexpectedRule { key, tag } => {
                assert_eq!(key, "unexpected");
                assert_eq!(tag, "root");
            }
            err => panic!("unexpected error {:?}", err),
        }
        let err = RuleSet::new().set("@", "x").into_close_rules("root");
        assert!(matches!(err, Err(Error::UnexpectedRule { .. })));
    }

    #[test]
    fn test_empty_element_checks() {
        for key in &[RULE_INSERT_AT_START, RULE_INSERT_AT_END] {
            let err = RuleSet::new()
                .set(*key, "x")
                .into_open_rules("empty", true)
                .err()
                .unwrap();
            assert!(matches!(err, Error::InvalidRule { key: ref k, .. } if k.as_str() == *key));
            // allowed for elements with content
            assert!(RuleSet::new().set(*key, "x").into_open_rules("e", false).is_ok());
            // an empty insertion is no insertion
            assert!(RuleSet::new().set(*key, "").into_open_rules("empty", true).is_ok());
        }
        let err = RuleSet::new()
            .transform_outer(|s| s)
            .into_open_rules("empty", true)
            .err()
            .unwrap();
        assert!(err.to_string().contains("does not work with empty tags"));
        assert!(RuleSet::new()
            .transform_inner(|s| s)
            .into_open_rules("empty", true)
            .is_ok());
    }

    #[test]
    fn test_wrong_value_kind() {
        let err = RuleSet::new()
            .set(RULE_TAG, RuleValue::Transform(Box::new(|s: String| Ok::<_, BoxError>(s))))
            .into_close_rules("e");
        assert!(matches!(err, Err(Error::InvalidRule { .. })));
        let err = RuleSet::new()
            .set(RULE_TRANSFORM_OUTER, "not a function")
            .into_open_rules("e", false);
        assert!(matches!(err, Err(Error::InvalidRule { .. })));
    }

    #[test]
    fn test_action_from() {
        assert!(matches!(Action::from(None), Action::Unchanged));
        assert!(matches!(
            Action::from(Some(RuleSet::new())),
            Action::Rules(_)
        ));
        assert!(matches!(Action::default(), Action::Unchanged));
    }
}
