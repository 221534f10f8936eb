use serde_json::Value;

const MASK_CHAR: char = '*';

/// Mask the named string fields of a response record, recursing into nested
/// objects and arrays. All but the last 4 characters are replaced; values
/// of 4 characters or fewer are fully masked. Response shaping only, never
/// storage.
pub fn mask(value: Value, field_names: &[&str]) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, inner)| {
                    let masked = if field_names.contains(&key.as_str()) {
                        mask_value(inner, field_names)
                    } else {
                        mask(inner, field_names)
                    };
                    (key, masked)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| mask(item, field_names))
                .collect(),
        ),
        other => other,
    }
}

/// Mask a value selected by field name. Strings are masked directly;
/// containers are traversed so every string inside them is masked.
fn mask_value(value: Value, field_names: &[&str]) -> Value {
    match value {
        Value::String(s) => Value::String(mask_string(&s)),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| mask_value(item, field_names))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, inner)| (key, mask_value(inner, field_names)))
                .collect(),
        ),
        other => other,
    }
}

fn mask_string(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= 4 {
        return "****".to_string();
    }

    let visible: String = chars[chars.len() - 4..].iter().collect();
    let mut masked = String::with_capacity(chars.len());
    for _ in 0..chars.len() - 4 {
        masked.push(MASK_CHAR);
    }
    masked.push_str(&visible);
    masked
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_mask_boundaries() {
        let record = json!({ "ssn": "123456789" });
        let masked = mask(record, &["ssn"]);
        assert_eq!(masked["ssn"], "*****6789");

        let record = json!({ "ssn": "12" });
        let masked = mask(record, &["ssn"]);
        assert_eq!(masked["ssn"], "****");

        let record = json!({ "ssn": "1234" });
        let masked = mask(record, &["ssn"]);
        assert_eq!(masked["ssn"], "****");
    }

    #[test]
    fn test_mask_recurses_into_nested_records() {
        let record = json!({
            "patient": { "ssn": "987654321", "name": "Dana Fox" },
            "contacts": [
                { "phone": "5551234567" },
                { "phone": "5559876543" }
            ]
        });

        let masked = mask(record, &["ssn", "phone"]);
        assert_eq!(masked["patient"]["ssn"], "*****4321");
        assert_eq!(masked["patient"]["name"], "Dana Fox");
        assert_eq!(masked["contacts"][0]["phone"], "******4567");
        assert_eq!(masked["contacts"][1]["phone"], "******6543");
    }

    #[test]
    fn test_mask_named_array_field() {
        let record = json!({ "mrns": ["A1234567", "B7654321"] });
        let masked = mask(record, &["mrns"]);
        assert_eq!(masked["mrns"][0], "****4567");
        assert_eq!(masked["mrns"][1], "****4321");
    }

    #[test]
    fn test_non_string_fields_untouched() {
        let record = json!({ "ssn": 123456789, "active": true });
        let masked = mask(record, &["ssn"]);
        assert_eq!(masked["ssn"], 123456789);
        assert_eq!(masked["active"], true);
    }
}
