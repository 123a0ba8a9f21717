use std::borrow::Cow;

/// Escapes `&`, `<`, `>`, `'` and `"` so that `raw` can be written as
/// character data or as a double-quoted attribute value.
pub fn escape(raw: &str) -> Cow<str> {
    match quick_xml::escape::escape(raw.as_bytes()) {
        Cow::Borrowed(_) => Cow::Borrowed(raw),
        // Only ASCII bytes are replaced, so the result is still UTF-8.
        Cow::Owned(escaped) => match String::from_utf8(escaped) {
            Ok(escaped) => Cow::Owned(escaped),
            Err(err) => Cow::Owned(String::from_utf8_lossy(err.as_bytes()).into_owned()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(escape("plain"), "plain");
        assert!(matches!(escape("plain ü"), Cow::Borrowed(_)));
        assert_eq!(
            escape("a < b && c > \"d\" 'e'"),
            "a &lt; b &amp;&amp; c &gt; &quot;d&quot; &apos;e&apos;"
        );
        assert_eq!(escape("Grüße & €"), "Grüße &amp; €");
    }
}
