//! Declarative field schemas for monit status documents
//!
//! A schema is an ordered table of `(output name, locator, coercion)` entries.
//! Locators are slash separated element paths evaluated against a `<service>`
//! node, or against the whole document when prefixed with `//`.

use std::fmt;

use roxmltree::Node;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
    Text,
    Integer,
    Float,
}

impl Coercion {
    /// Coerces raw element text, returning `None` when the value does not parse.
    /// Floats must be finite: `NaN` and `inf` spellings are not numbers here.
    pub fn apply(self, raw: &str) -> Option<FieldValue> {
        match self {
            Self::Text => Some(FieldValue::Text(raw.to_string())),
            Self::Integer => raw.trim().parse::<i64>().ok().map(FieldValue::Integer),
            Self::Float => raw
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|value| value.is_finite())
                .map(FieldValue::Float),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub locator: &'static str,
    pub coercion: Coercion,
}

impl FieldSpec {
    pub const fn new(name: &'static str, locator: &'static str, coercion: Coercion) -> Self {
        Self {
            name,
            locator,
            coercion,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Float(f64),
}

pub trait FromFieldValue: Sized {
    fn from_field_value(value: FieldValue) -> Option<Self>;
}

impl FromFieldValue for String {
    fn from_field_value(value: FieldValue) -> Option<Self> {
        match value {
            FieldValue::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl FromFieldValue for i64 {
    fn from_field_value(value: FieldValue) -> Option<Self> {
        match value {
            FieldValue::Integer(number) => Some(number),
            _ => None,
        }
    }
}

impl FromFieldValue for f64 {
    fn from_field_value(value: FieldValue) -> Option<Self> {
        match value {
            FieldValue::Float(number) => Some(number),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Anchor {
    Node,
    Document,
}

/// A parsed element path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator<'a> {
    anchor: Anchor,
    steps: Vec<&'a str>,
}

impl<'a> Locator<'a> {
    pub fn parse(source: &'a str) -> Option<Self> {
        let (anchor, path) = match source.strip_prefix("//") {
            Some(rest) => (Anchor::Document, rest),
            None => (Anchor::Node, source),
        };

        let steps: Vec<&str> = path.split('/').collect();
        if steps.iter().any(|step| step.is_empty()) {
            return None;
        }

        Some(Self { anchor, steps })
    }

    pub fn is_absolute(&self) -> bool {
        self.anchor == Anchor::Document
    }

    /// Returns the first element matching this path in document order.
    pub fn first_match<'d, 'i>(&self, node: Node<'d, 'i>) -> Option<Node<'d, 'i>> {
        match self.anchor {
            Anchor::Node => find_path(node, &self.steps),
            Anchor::Document => {
                let (head, rest) = self.steps.split_first()?;
                node.document()
                    .root()
                    .descendants()
                    .filter(|candidate| step_matches(*candidate, head))
                    .find_map(|candidate| find_path(candidate, rest))
            }
        }
    }
}

impl fmt::Display for Locator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_absolute() {
            f.write_str("//")?;
        }
        f.write_str(&self.steps.join("/"))
    }
}

fn step_matches(node: Node<'_, '_>, step: &str) -> bool {
    node.is_element() && node.tag_name().name() == step
}

fn find_path<'d, 'i>(node: Node<'d, 'i>, steps: &[&str]) -> Option<Node<'d, 'i>> {
    let Some((head, rest)) = steps.split_first() else {
        return Some(node);
    };

    node.children()
        .filter(|child| step_matches(*child, head))
        .find_map(|child| find_path(child, rest))
}

#[cfg(test)]
mod tests {
    use roxmltree::Document;

    use super::*;

    const DOC: &str = r#"<monit>
        <server><uptime>42</uptime></server>
        <service type="3">
            <memory><kilobyte>10</kilobyte></memory>
            <memory><percent>1.5</percent></memory>
        </service>
    </monit>"#;

    fn service<'d, 'i>(doc: &'d Document<'i>) -> Node<'d, 'i> {
        doc.descendants()
            .find(|node| node.has_tag_name("service"))
            .expect("service node")
    }

    #[test]
    fn relative_locator_backtracks_across_siblings() {
        let doc = Document::parse(DOC).expect("valid xml");
        let locator = Locator::parse("memory/percent").expect("valid locator");

        let matched = locator.first_match(service(&doc)).expect("match");
        assert_eq!(matched.text(), Some("1.5"));
    }

    #[test]
    fn absolute_locator_searches_whole_document() {
        let doc = Document::parse(DOC).expect("valid xml");
        let locator = Locator::parse("//server/uptime").expect("valid locator");

        assert!(locator.is_absolute());
        let matched = locator.first_match(service(&doc)).expect("match");
        assert_eq!(matched.text(), Some("42"));
    }

    #[test]
    fn rejects_empty_steps() {
        assert!(Locator::parse("").is_none());
        assert!(Locator::parse("block//percent").is_none());
        assert!(Locator::parse("//").is_none());
    }

    #[test]
    fn locator_display_round_trips_source() {
        let locator = Locator::parse("//platform/name").expect("valid locator");
        assert_eq!(locator.to_string(), "//platform/name");
    }

    #[test]
    fn numeric_coercions_swallow_parse_failures() {
        assert_eq!(Coercion::Integer.apply(" 17 "), Some(FieldValue::Integer(17)));
        assert_eq!(Coercion::Integer.apply("-3"), Some(FieldValue::Integer(-3)));
        assert_eq!(Coercion::Integer.apply("1.5"), None);
        assert_eq!(Coercion::Float.apply("0.15"), Some(FieldValue::Float(0.15)));
        assert_eq!(Coercion::Float.apply("n/a"), None);
        assert_eq!(
            Coercion::Text.apply(" raw "),
            Some(FieldValue::Text(" raw ".to_string()))
        );
    }

    #[test]
    fn float_coercion_rejects_non_finite_spellings() {
        for raw in ["NaN", "nan", "inf", "-inf", "infinity", " Infinity "] {
            assert_eq!(Coercion::Float.apply(raw), None, "{raw:?} should be null");
        }
        assert_eq!(Coercion::Float.apply("1e3"), Some(FieldValue::Float(1000.0)));
    }
}
