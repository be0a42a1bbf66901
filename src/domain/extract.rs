//! Schema driven field extraction from a single XML node

use std::collections::BTreeMap;

use roxmltree::Node;

use crate::domain::schema::{FieldSpec, FieldValue, FromFieldValue, Locator};

pub type FieldMap = BTreeMap<&'static str, FieldValue>;

/// Applies every schema entry to `node`. Fields whose locator has no match,
/// whose element carries no text, or whose text fails coercion are left out
/// of the map, so they read back as `None`.
pub fn extract(node: Node<'_, '_>, schema: &[FieldSpec]) -> FieldMap {
    schema
        .iter()
        .filter_map(|spec| extract_field(node, spec).map(|value| (spec.name, value)))
        .collect()
}

fn extract_field(node: Node<'_, '_>, spec: &FieldSpec) -> Option<FieldValue> {
    let locator = Locator::parse(spec.locator)?;
    let matched = locator.first_match(node)?;
    spec.coercion.apply(matched.text()?)
}

pub fn take<T: FromFieldValue>(fields: &mut FieldMap, name: &str) -> Option<T> {
    fields.remove(name).and_then(T::from_field_value)
}

#[cfg(test)]
mod tests {
    use roxmltree::Document;

    use super::*;
    use crate::domain::schema::Coercion;

    const SCHEMA: &[FieldSpec] = &[
        FieldSpec::new("name", "name", Coercion::Text),
        FieldSpec::new("pid", "pid", Coercion::Integer),
        FieldSpec::new("cpu", "cpu/percent", Coercion::Float),
        FieldSpec::new("children", "children", Coercion::Integer),
        FieldSpec::new("broken", "cpu//percent", Coercion::Float),
    ];

    #[test]
    fn extracts_present_fields_and_skips_missing_ones() {
        let doc = Document::parse(
            "<service><name>nginx</name><pid>311</pid><cpu><percent>2.5</percent></cpu></service>",
        )
        .expect("valid xml");

        let fields = extract(doc.root_element(), SCHEMA);
        assert_eq!(fields.get("name"), Some(&FieldValue::Text("nginx".to_string())));
        assert_eq!(fields.get("pid"), Some(&FieldValue::Integer(311)));
        assert_eq!(fields.get("cpu"), Some(&FieldValue::Float(2.5)));
        assert!(!fields.contains_key("children"));
        assert!(!fields.contains_key("broken"));
    }

    #[test]
    fn coercion_failure_does_not_affect_siblings() {
        let doc = Document::parse(
            "<service><name>db</name><pid>abc</pid><children>4</children></service>",
        )
        .expect("valid xml");

        let fields = extract(doc.root_element(), SCHEMA);
        assert!(!fields.contains_key("pid"));
        assert_eq!(fields.get("children"), Some(&FieldValue::Integer(4)));
        assert_eq!(fields.get("name"), Some(&FieldValue::Text("db".to_string())));
    }

    #[test]
    fn empty_element_reads_as_absent() {
        let doc = Document::parse("<service><name/></service>").expect("valid xml");

        let fields = extract(doc.root_element(), SCHEMA);
        assert!(fields.is_empty());
    }

    #[test]
    fn take_rejects_mismatched_variant() {
        let mut fields = FieldMap::new();
        fields.insert("pid", FieldValue::Integer(7));

        assert_eq!(take::<String>(&mut fields, "pid"), None);
        assert!(fields.is_empty());
    }
}
