use serde_json::{Map, Value};
use std::io;

type CsvWriter = csv::Writer<io::StdoutLock<'static>>;

/// Write output as CSV to stdout. Row sections (sensitivity, break-even
/// variables, scenarios) each get a `section` marker record followed by a
/// header row.
pub fn print_csv(value: &Value) {
    let mut wtr = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(io::stdout().lock());

    match value {
        Value::Object(map) => match map.get("result") {
            Some(Value::Object(result)) => write_result(&mut wtr, result),
            _ => write_fields(&mut wtr, map),
        },
        Value::Array(arr) => write_array_csv(&mut wtr, arr),
        _ => {
            let _ = wtr.write_record([&format_csv_value(value)]);
        }
    }

    let _ = wtr.flush();
}

fn write_result(wtr: &mut CsvWriter, result: &Map<String, Value>) {
    let mut scalars = Map::new();
    let mut sections: Vec<(&str, &[Value])> = Vec::new();
    for (key, val) in result {
        match val {
            Value::Array(rows) => sections.push((key.as_str(), rows.as_slice())),
            Value::Object(inner) => {
                for (k, v) in inner {
                    match v {
                        Value::Array(rows) if k == "variables" => {
                            sections.push((key.as_str(), rows.as_slice()))
                        }
                        Value::Array(_) => {}
                        Value::Object(nested) => {
                            for (nk, nv) in nested {
                                scalars.insert(format!("{key}.{k}.{nk}"), nv.clone());
                            }
                        }
                        _ => {
                            scalars.insert(format!("{key}.{k}"), v.clone());
                        }
                    }
                }
            }
            _ => {
                scalars.insert(key.clone(), val.clone());
            }
        }
    }

    write_fields(wtr, &scalars);
    for (name, rows) in sections {
        let _ = wtr.write_record(["section", name]);
        write_array_csv(wtr, rows);
    }
}

fn write_fields(wtr: &mut CsvWriter, map: &Map<String, Value>) {
    let _ = wtr.write_record(["field", "value"]);
    for (key, val) in map {
        let _ = wtr.write_record([key.as_str(), &format_csv_value(val)]);
    }
}

fn write_array_csv(wtr: &mut CsvWriter, arr: &[Value]) {
    if arr.is_empty() {
        return;
    }

    if let Some(Value::Object(first)) = arr.first() {
        let headers: Vec<&str> = first.keys().map(|k| k.as_str()).collect();
        let _ = wtr.write_record(&headers);

        for item in arr {
            if let Value::Object(map) = item {
                let row: Vec<String> = headers
                    .iter()
                    .map(|h| map.get(*h).map(format_csv_value).unwrap_or_default())
                    .collect();
                let _ = wtr.write_record(&row);
            }
        }
    } else {
        for item in arr {
            let _ = wtr.write_record([&format_csv_value(item)]);
        }
    }
}

fn format_csv_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
