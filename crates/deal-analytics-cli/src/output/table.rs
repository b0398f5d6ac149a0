use serde_json::{Map, Value};
use tabled::{builder::Builder, Table};

/// Result sections rendered as their own tables, in this order.
const SECTIONS: [(&str, &str); 4] = [
    ("sensitivity", "Sensitivity (tornado)"),
    ("break_even", "Break-even"),
    ("scenarios", "Scenarios"),
    ("monte_carlo", "Monte Carlo"),
];

/// Format output as tables using the tabled crate.
pub fn print_table(value: &Value) {
    match value {
        Value::Object(map) => {
            if let Some(result) = map.get("result") {
                print_result_tables(result, map);
            } else {
                print_flat_object(map);
            }
        }
        Value::Array(arr) => print_array_table(arr),
        _ => println!("{}", value),
    }
}

fn print_result_tables(result: &Value, envelope: &Map<String, Value>) {
    let Value::Object(res_map) = result else {
        print_flat_object(envelope);
        return;
    };

    // Scalars and the base case first, then one table per section.
    let mut summary = Map::new();
    for (key, val) in res_map {
        if SECTIONS.iter().any(|(k, _)| k == key) {
            continue;
        }
        match val {
            Value::Object(inner) => {
                for (k, v) in inner {
                    summary.insert(format!("{key}.{k}"), v.clone());
                }
            }
            _ => {
                summary.insert(key.clone(), val.clone());
            }
        }
    }
    print_flat_object(&summary);

    for (key, title) in SECTIONS {
        match res_map.get(key) {
            Some(Value::Array(rows)) => {
                println!("\n{title}:");
                print_array_table(rows);
            }
            Some(Value::Object(section)) => {
                println!("\n{title}:");
                print_section_object(section);
            }
            _ => {}
        }
    }

    if let Some(Value::Array(warnings)) = envelope.get("warnings") {
        if !warnings.is_empty() {
            println!("\nWarnings:");
            for w in warnings {
                if let Value::String(s) = w {
                    println!("  - {}", s);
                }
            }
        }
    }

    if let Some(Value::String(meth)) = envelope.get("methodology") {
        println!("\nMethodology: {}", meth);
    }
}

/// Scalars as Field/Value rows, nested objects flattened one level, and
/// nested row arrays (break-even variables) as their own table. The
/// histogram is left to the JSON output.
fn print_section_object(section: &Map<String, Value>) {
    let mut flat = Map::new();
    let mut nested_rows = None;
    for (key, val) in section {
        match val {
            Value::Object(inner) => {
                for (k, v) in inner {
                    flat.insert(format!("{key}.{k}"), v.clone());
                }
            }
            Value::Array(rows) if key == "variables" => nested_rows = Some(rows),
            Value::Array(_) => {}
            _ => {
                flat.insert(key.clone(), val.clone());
            }
        }
    }
    print_flat_object(&flat);
    if let Some(rows) = nested_rows {
        print_array_table(rows);
    }
}

fn print_flat_object(map: &Map<String, Value>) {
    let mut builder = Builder::default();
    builder.push_record(["Field", "Value"]);
    for (key, val) in map {
        builder.push_record([key.as_str(), &format_value(val)]);
    }
    let table = Table::from(builder);
    println!("{}", table);
}

fn print_array_table(arr: &[Value]) {
    if arr.is_empty() {
        println!("(empty)");
        return;
    }

    if let Some(Value::Object(first)) = arr.first() {
        let headers: Vec<String> = first.keys().cloned().collect();
        let mut builder = Builder::default();
        builder.push_record(&headers);

        for item in arr {
            if let Value::Object(map) = item {
                let row: Vec<String> = headers
                    .iter()
                    .map(|h| map.get(h.as_str()).map(format_value).unwrap_or_default())
                    .collect();
                builder.push_record(row);
            }
        }

        let table = Table::from(builder);
        println!("{}", table);
    } else {
        for item in arr {
            println!("{}", format_value(item));
        }
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "-".to_string(),
        Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(format_value).collect();
            items.join(", ")
        }
        Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}
