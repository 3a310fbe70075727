//! # Python Source Rendering
//!
//! Turns marshalled values into Python literals for the code-generating
//! execution mode.

use crate::value::Kwargs;
use crate::value::SOURCE;
use crate::value::TARGET;
use crate::value::Value;

/// `getMeta` -> `get_meta`; dots are kept, so `cols.toUpper` -> `cols.to_upper`.
pub fn camel_to_snake(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev: Option<char> = None;
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            if matches!(prev, Some(p) if p != '.' && p != '_') {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
        prev = Some(c);
    }
    out
}

/// Renders a value as a Python literal.
///
/// Names and handles become bare identifiers. Buffers, callbacks and proxies
/// have no literal form and render as `None`; the marshaller replaces them
/// before code is generated.
pub fn literal(value: &Value) -> String {
    match value {
        Value::Null => "None".into(),
        Value::Bool(true) => "True".into(),
        Value::Bool(false) => "False".into(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => float(*f),
        Value::Str(s) => string(s),
        Value::Name(name) => name.to_string(),
        Value::Handle(source) => source.name().to_string(),
        Value::Buffer(_) | Value::Callback(_) | Value::Proxy(_) => "None".into(),
        Value::List(items) => {
            let items: Vec<String> = items.iter().map(literal).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Record(record) => {
            let entries: Vec<String> = record
                .iter()
                .map(|(k, v)| format!("{}: {}", string(k), literal(v)))
                .collect();
            format!("{{{}}}", entries.join(", "))
        }
    }
}

fn float(f: f64) -> String {
    if f.is_nan() {
        "float(\"nan\")".into()
    } else if f.is_infinite() {
        if f > 0.0 { "float(\"inf\")".into() } else { "float(\"-inf\")".into() }
    } else if f.fract() == 0.0 && f.abs() < 1e16 {
        format!("{:.1}", f)
    } else {
        f.to_string()
    }
}

fn string(s: &str) -> String {
    // JSON string escaping is a subset of what Python accepts.
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".into())
}

/// Renders kwargs as `key=value, ...`, leaving out `source` and `target`.
pub fn arguments(kwargs: &Kwargs) -> String {
    kwargs
        .iter()
        .filter(|(key, _)| key.as_str() != SOURCE && key.as_str() != TARGET)
        .map(|(key, value)| format!("{}={}", camel_to_snake(key), literal(value)))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Builds `"<target> = <source>.<method>(<args>)"`, dropping the assignment
/// when there is no target and the `source.` prefix when there is no source.
pub fn method_call(target: Option<&str>, source: Option<&str>, method: &str, kwargs: &Kwargs) -> String {
    let mut code = String::new();
    if let Some(target) = target {
        code.push_str(target);
        code.push_str(" = ");
    }
    if let Some(source) = source {
        code.push_str(source);
        code.push('.');
    }
    code.push_str(&camel_to_snake(method));
    code.push('(');
    code.push_str(&arguments(kwargs));
    code.push(')');
    code
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::value::Name;
    use crate::value::Record;

    #[test]
    fn test_camel_to_snake() {
        assert_eq!(camel_to_snake("getMeta"), "get_meta");
        assert_eq!(camel_to_snake("cols.upper"), "cols.upper");
        assert_eq!(camel_to_snake("cols.toUpper"), "cols.to_upper");
        assert_eq!(camel_to_snake("Sample"), "sample");
        assert_eq!(camel_to_snake("outputCols"), "output_cols");
    }

    #[test]
    fn test_literals() {
        assert_eq!(literal(&Value::Null), "None");
        assert_eq!(literal(&Value::Bool(true)), "True");
        assert_eq!(literal(&Value::Float(2.0)), "2.0");
        assert_eq!(literal(&Value::Float(0.25)), "0.25");
        assert_eq!(literal(&Value::Float(f64::NAN)), "float(\"nan\")");
        assert_eq!(literal(&Value::from("a\"b")), "\"a\\\"b\"");
        assert_eq!(literal(&Value::Name(Name::new("df1"))), "df1");

        let mut record = Record::new();
        record.insert("a".into(), Value::List(vec![Value::Int(1), Value::from("x")]));
        assert_eq!(literal(&Value::Record(record)), "{\"a\": [1, \"x\"]}");
    }

    #[test]
    fn test_method_call_shapes() {
        let mut kwargs = Kwargs::new();
        kwargs.insert("source".into(), "df1".into());
        kwargs.insert("target".into(), "df2".into());
        kwargs.insert("cols".into(), "*".into());
        kwargs.insert("outputCols".into(), Value::Null);

        assert_eq!(
            method_call(Some("df2"), Some("df1"), "cols.upper", &kwargs),
            "df2 = df1.cols.upper(cols=\"*\", output_cols=None)"
        );
        assert_eq!(method_call(None, None, "ascii", &Kwargs::new()), "ascii()");
    }
}
