use serde_json::Value;

/// Key answer fields as dotted paths into the result object, in priority
/// order: the analysed metric, then the single-value rate commands.
const PRIORITY_PATHS: [&str; 3] = ["base_case.metric_value", "rate", "npv"];

/// Print just the key answer value from the output.
///
/// Falls back to the first field in the result object.
pub fn print_minimal(value: &Value) {
    let result_obj = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    for path in PRIORITY_PATHS {
        if let Some(val) = lookup(result_obj, path) {
            if !val.is_null() {
                println!("{}", format_minimal(val));
                return;
            }
        }
    }

    if let Value::Object(map) = result_obj {
        if let Some((key, val)) = map.iter().next() {
            println!("{}: {}", key, format_minimal(val));
            return;
        }
    }

    println!("{}", format_minimal(result_obj));
}

fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |node, key| node.get(key))
}

fn format_minimal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lookup_nested_path() {
        let v = json!({ "base_case": { "metric_value": 0.12 } });
        assert_eq!(lookup(&v, "base_case.metric_value"), Some(&json!(0.12)));
        assert_eq!(lookup(&v, "rate"), None);
    }
}
