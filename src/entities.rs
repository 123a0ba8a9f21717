use lazy_static::lazy_static;
use quick_xml::escape::unescape_with;
use regex::bytes::Regex;
use std::collections::HashMap;

lazy_static! {
    static ref ENTITY_DECL: Regex =
        Regex::new(r#"<!ENTITY\s+([^\s%"'<>&;]+)\s+(?:"([^"]*)"|'([^']*)')\s*>"#).unwrap();
}

const PREDEFINED: [&[u8]; 5] = [b"lt", b"gt", b"amp", b"apos", b"quot"];

/// General entities declared in the internal subset of a DOCTYPE.
#[derive(Debug, Default)]
pub(crate) struct Entities {
    // Literal value as declared. Parsed as content where it is referenced.
    replacement: HashMap<Vec<u8>, Vec<u8>>,
    // Value with every reference in it resolved, for attribute values.
    values: HashMap<Vec<u8>, Vec<u8>>,
}

impl Entities {
    pub(crate) fn new() -> Entities {
        Entities::default()
    }

    /// Collects `<!ENTITY name "value">` declarations from the content of a
    /// DOCTYPE event. Parameter entities and external entities are skipped.
    pub(crate) fn collect(&mut self, doctype: &[u8]) {
        let mut declared = Vec::new();
        for cap in ENTITY_DECL.captures_iter(doctype) {
            let value = match cap.get(2).or_else(|| cap.get(3)) {
                Some(value) => value.as_bytes(),
                None => continue,
            };
            let name = &cap[1];
            // Later declarations of the same name are ignored, as in XML.
            if PREDEFINED.contains(&name) || self.replacement.contains_key(name) {
                continue;
            }
            self.replacement.insert(name.to_vec(), value.to_vec());
            declared.push(name.to_vec());
        }
        self.resolve_values(declared);
    }

    // Entities may reference each other in any order, so resolve until nothing changes.
    // What is left references an undeclared or recursive entity and fails when used.
    fn resolve_values(&mut self, mut pending: Vec<Vec<u8>>) {
        loop {
            let before = pending.len();
            let replacement = &self.replacement;
            let values = &mut self.values;
            pending.retain(|name| {
                let resolved = match unescape_with(&replacement[name], values) {
                    Ok(resolved) => resolved.into_owned(),
                    Err(_) => return true,
                };
                values.insert(name.clone(), resolved);
                false
            });
            if pending.is_empty() || pending.len() == before {
                return;
            }
        }
    }

    /// Fully resolved values, in the form quick-xml takes for unescaping.
    pub(crate) fn values(&self) -> &HashMap<Vec<u8>, Vec<u8>> {
        &self.values
    }

    /// Finds the first reference to a declared entity in escaped text.
    ///
    /// Returns the byte range of the reference, `&` and `;` included, and
    /// the replacement text to parse in its place.
    pub(crate) fn find_reference(&self, raw: &[u8]) -> Option<(usize, usize, &[u8])> {
        if self.replacement.is_empty() {
            return None;
        }
        let mut from = 0;
        while let Some(pos) = raw[from..].iter().position(|b| *b == b'&') {
            let start = from + pos;
            let end = match raw[start..].iter().position(|b| *b == b';') {
                Some(len) => start + len,
                None => return None,
            };
            if let Some(replacement) = self.replacement.get(&raw[start + 1..end]) {
                return Some((start, end + 1, replacement));
            }
            from = start + 1;
        }
        None
    }
}
