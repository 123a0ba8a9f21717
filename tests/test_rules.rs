use std::error::Error as _;
use std::fmt;

use xml_transformer::{transform, Action, BoxError, Error, NodeKind, RuleSet, RuleValue};

#[test]
fn test_content_insertions_on_empty_element_err() {
    for (key, rules) in vec![
        ("insert-at-start", RuleSet::new().insert_at_start("x")),
        ("insert-at-end", RuleSet::new().insert_at_end("x")),
        ("transform-outer", RuleSet::new().transform_outer(|s| s)),
    ] {
        let mut rules = Some(rules);
        let err = transform("<root><img/></root>", |tag, _, _| match tag {
            "img" => rules.take().into(),
            _ => Action::Unchanged,
        })
        .unwrap_err();
        match &err {
            Error::InvalidRule { key: k, tag, .. } => {
                assert_eq!(k, key);
                assert_eq!(tag, "img");
            }
            err => panic!("unexpected error: {:?}", err),
        }
        let message = err.to_string();
        assert!(message.contains(key), "{}", message);
        assert!(message.contains("<img>"), "{}", message);
    }
}

#[test]
fn test_empty_content_insertions_on_empty_element_ok() {
    let output = transform("<img/>", |_, _, _| {
        RuleSet::new().insert_at_start("").insert_at_end("").into()
    })
    .unwrap();
    assert_eq!(output, "<img />");
}

#[test]
fn test_unexpected_key_err() {
    let err = transform("<root><p>x</p></root>", |tag, _, _| match tag {
        "p" => RuleSet::new().set("insert-somewhere", "x").into(),
        _ => Action::Unchanged,
    })
    .unwrap_err();
    assert!(matches!(err, Error::UnexpectedRule { .. }));
    let message = err.to_string();
    assert!(message.contains("insert-somewhere"), "{}", message);
    assert!(message.contains("<p>"), "{}", message);

    // A lone marker does not name an attribute.
    let err = transform("<p/>", |_, _, _| RuleSet::new().set("@", "x").into()).unwrap_err();
    assert!(matches!(err, Error::UnexpectedRule { .. }));
}

#[test]
fn test_unexpected_key_on_close_err() {
    let err = transform("<p>x</p>", |_, _, kind| match kind {
        NodeKind::Close => RuleSet::new().set("colour", "red").into(),
        _ => Action::Unchanged,
    })
    .unwrap_err();
    assert!(matches!(err, Error::UnexpectedRule { ref key, .. } if key == "colour"));
}

#[test]
fn test_wrong_value_kind_err() {
    let err = transform("<p>x</p>", |_, _, _| {
        RuleSet::new()
            .set("insert-before", RuleValue::Transform(Box::new(|s: String| Ok::<_, BoxError>(s))))
            .into()
    })
    .unwrap_err();
    assert!(matches!(err, Error::InvalidRule { ref key, .. } if key == "insert-before"));

    let err = transform("<p>x</p>", |_, _, _| {
        RuleSet::new().set("transform-inner", "upper").into()
    })
    .unwrap_err();
    assert!(matches!(err, Error::InvalidRule { ref key, .. } if key == "transform-inner"));
}

#[test]
fn test_off_values() {
    let xml = "<root><a id=\"1\">x</a></root>";
    let output = transform(xml, |tag, _, _| match tag {
        "a" => RuleSet::new()
            .set("tag", RuleValue::Off)
            .set("@id", RuleValue::Off)
            .set("insert-before", RuleValue::Off)
            .set("transform-outer", RuleValue::Off)
            .into(),
        _ => Action::Unchanged,
    })
    .unwrap();
    assert_eq!(output, "<root>x</root>");
}

#[derive(Debug)]
struct TooLong(usize);

impl fmt::Display for TooLong {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "content too long: {} bytes", self.0)
    }
}

impl std::error::Error for TooLong {}

#[test]
fn test_transform_error_is_propagated() {
    let xml = "<root><short>ok</short><long>not ok at all</long></root>";
    let err = transform(xml, |_, _, kind| match kind {
        NodeKind::Open => RuleSet::new()
            .try_transform_inner(|content| {
                if content.len() > 10 {
                    Err(TooLong(content.len()))
                } else {
                    Ok(content)
                }
            })
            .into(),
        _ => Action::Unchanged,
    })
    .unwrap_err();
    assert!(matches!(err, Error::Transform(_)));
    let source = err.source().unwrap();
    assert_eq!(source.to_string(), "content too long: 13 bytes");
    assert!(source.downcast_ref::<TooLong>().is_some());
}

#[test]
fn test_transform_error_with_string() {
    let err = transform("<a>x</a>", |_, _, kind| match kind {
        NodeKind::Open => RuleSet::new()
            .try_transform_outer(|_| Err("refused"))
            .into(),
        _ => Action::Unchanged,
    })
    .unwrap_err();
    assert!(err.to_string().contains("refused"), "{}", err);
}
