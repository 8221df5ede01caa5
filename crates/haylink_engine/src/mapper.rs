//! Remote value to local node value conversion.

use haylink_protocol::Value;
use haylink_tree::NodeValue;
use std::collections::BTreeMap;

/// Converts a remote value into the value a tree node holds.
///
/// Units are dropped; temporal values, refs, coordinates and binaries become
/// their text form.
pub fn map_value(value: &Value) -> NodeValue {
    match value {
        Value::Null => NodeValue::Null,
        Value::Marker => NodeValue::Bool(true),
        Value::Bool(b) => NodeValue::Bool(*b),
        Value::Number { value, .. } if value.is_finite() => NodeValue::Number(*value),
        Value::Number { value, .. } => NodeValue::String(non_finite(*value).to_string()),
        Value::Str(s) | Value::Uri(s) | Value::Date(s) | Value::Time(s) | Value::DateTime(s) => {
            NodeValue::String(s.clone())
        }
        Value::Ref { id, .. } => NodeValue::String(id.to_string()),
        Value::Coord { lat, lng } => NodeValue::String(format!("C({lat},{lng})")),
        Value::Bin { mime } => NodeValue::String(mime.clone()),
        Value::List(items) => NodeValue::Array(items.iter().map(map_value).collect()),
        Value::Dict(cells) => NodeValue::Map(
            cells
                .iter()
                .map(|(name, v)| (name.clone(), map_value(v)))
                .collect::<BTreeMap<_, _>>(),
        ),
    }
}

fn non_finite(n: f64) -> &'static str {
    if n.is_nan() {
        "NaN"
    } else if n > 0.0 {
        "INF"
    } else {
        "-INF"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use haylink_protocol::EntityRef;
    use haylink_tree::ValueType;

    #[test]
    fn scalars() {
        assert_eq!(map_value(&Value::Null), NodeValue::Null);
        assert_eq!(map_value(&Value::Marker), NodeValue::Bool(true));
        assert_eq!(map_value(&Value::Bool(false)), NodeValue::Bool(false));
        assert_eq!(
            map_value(&Value::number_with_unit(21.5, "°C")),
            NodeValue::Number(21.5)
        );
        assert_eq!(
            map_value(&Value::DateTime("2024-01-01T00:00:00Z UTC".into())),
            NodeValue::from("2024-01-01T00:00:00Z UTC")
        );
    }

    #[test]
    fn non_finite_numbers_become_text() {
        assert_eq!(map_value(&Value::number(f64::NAN)), NodeValue::from("NaN"));
        assert_eq!(map_value(&Value::number(f64::INFINITY)), NodeValue::from("INF"));
        assert_eq!(
            map_value(&Value::number(f64::NEG_INFINITY)),
            NodeValue::from("-INF")
        );
    }

    #[test]
    fn refs_and_coords() {
        let value = Value::Ref {
            id: EntityRef::new("ahu-1"),
            dis: Some("AHU 1".into()),
        };
        assert_eq!(map_value(&value), NodeValue::from("@ahu-1"));
        assert_eq!(
            map_value(&Value::Coord { lat: 37.5, lng: -77.25 }),
            NodeValue::from("C(37.5,-77.25)")
        );
        assert_eq!(
            map_value(&Value::Bin { mime: "image/png".into() }),
            NodeValue::from("image/png")
        );
    }

    #[test]
    fn collections() {
        let list = Value::List(vec![Value::number(1.0), Value::Marker]);
        assert_eq!(
            map_value(&list),
            NodeValue::Array(vec![NodeValue::Number(1.0), NodeValue::Bool(true)])
        );

        let dict = Value::Dict(vec![("site".into(), Value::Marker)]);
        let mapped = map_value(&dict);
        assert_eq!(mapped.value_type(), ValueType::Map);
    }
}
