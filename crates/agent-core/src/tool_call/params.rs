//! Parameter decoding and type coercion for tag payloads.
//!
//! Three encodings are tried in order: a JSON object, `key=value` pairs
//! separated by commas, and a single positional value. Nothing here ever
//! fails; malformed input degrades to plain strings.

use serde_json::Value;

use crate::tool::{ParamType, ToolParameter};

/// Ordered parameter name → value map handed to a tool
pub type ParameterMap = serde_json::Map<String, Value>;

const TRUTHY: [&str; 3] = ["true", "1", "yes"];

/// Key receiving a bare positional value, per tool family
const POSITIONAL_KEYS: [(&str, &str); 4] = [
    ("search", "query"),
    ("web_search", "query"),
    ("memory", "query"),
    ("rag", "query"),
];
const DEFAULT_POSITIONAL_KEY: &str = "input";

/// Maps a convenience key onto a canonical `action` for multi-action tools
struct ActionRule {
    tool: &'static str,
    key: &'static str,
    action: &'static str,
    /// Rename `key` to this primary argument; `None` keeps it as is
    rename_to: Option<&'static str>,
}

const ACTION_RULES: [ActionRule; 7] = [
    ActionRule { tool: "memory", key: "recall", action: "search", rename_to: Some("query") },
    ActionRule { tool: "memory", key: "store", action: "add", rename_to: Some("content") },
    ActionRule { tool: "memory", key: "query", action: "search", rename_to: None },
    ActionRule { tool: "memory", key: "content", action: "add", rename_to: None },
    ActionRule { tool: "rag", key: "search", action: "search", rename_to: Some("query") },
    ActionRule { tool: "rag", key: "query", action: "search", rename_to: None },
    ActionRule { tool: "rag", key: "text", action: "add_text", rename_to: None },
];

/// Decode a tag payload into typed parameters.
///
/// `schema` drives type coercion: only declared names are touched.
pub fn coerce_parameters(tool_name: &str, raw: &str, schema: &[ToolParameter]) -> ParameterMap {
    let text = raw.trim();

    let mut params = parse_json_object(text)
        .or_else(|| parse_key_values(text))
        .unwrap_or_else(|| positional(tool_name, text));

    apply_declared_types(&mut params, schema);

    if !params.contains_key("action") {
        infer_action(tool_name, &mut params);
    }

    params
}

fn parse_json_object(text: &str) -> Option<ParameterMap> {
    if !text.starts_with('{') {
        return None;
    }
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Some(map),
        Ok(_) => None,
        Err(e) => {
            tracing::debug!(error = %e, "Tag parameters look like JSON but do not parse");
            None
        }
    }
}

fn parse_key_values(text: &str) -> Option<ParameterMap> {
    if !text.contains('=') {
        return None;
    }

    let mut params = ParameterMap::new();
    for segment in text.split(',') {
        if let Some((key, value)) = segment.split_once('=') {
            let key = key.trim();
            if !key.is_empty() {
                params.insert(key.to_string(), Value::String(value.trim().to_string()));
            }
        }
    }
    Some(params)
}

fn positional(tool_name: &str, text: &str) -> ParameterMap {
    let key = POSITIONAL_KEYS
        .iter()
        .find(|(tool, _)| *tool == tool_name)
        .map_or(DEFAULT_POSITIONAL_KEY, |(_, key)| *key);

    let mut params = ParameterMap::new();
    params.insert(key.to_string(), Value::String(text.to_string()));
    params
}

fn apply_declared_types(params: &mut ParameterMap, schema: &[ToolParameter]) {
    for declared in schema {
        if let Some(value) = params.get_mut(&declared.name) {
            if let Some(coerced) = coerce_value(value, declared.param_type) {
                *value = coerced;
            }
        }
    }
}

/// Coerce a string value to `param_type`; `None` means keep the original.
pub fn coerce_value(value: &Value, param_type: ParamType) -> Option<Value> {
    let Value::String(text) = value else {
        return None;
    };
    let text = text.trim();

    match param_type {
        ParamType::Number => parse_number(text),
        ParamType::Integer => text.parse::<i64>().ok().map(Value::from),
        ParamType::Boolean => {
            let lowered = text.to_ascii_lowercase();
            Some(Value::Bool(TRUTHY.contains(&lowered.as_str())))
        }
        ParamType::String | ParamType::Array | ParamType::Object => None,
    }
}

fn parse_number(text: &str) -> Option<Value> {
    if let Ok(int) = text.parse::<i64>() {
        return Some(Value::from(int));
    }
    text.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
}

fn infer_action(tool_name: &str, params: &mut ParameterMap) {
    let Some(rule) = ACTION_RULES
        .iter()
        .find(|rule| rule.tool == tool_name && params.contains_key(rule.key))
    else {
        return;
    };

    if let Some(target) = rule.rename_to {
        if let Some(value) = params.shift_remove(rule.key) {
            params.insert(target.to_string(), value);
        }
    }
    params.insert("action".to_string(), Value::String(rule.action.to_string()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn declared(name: &str, param_type: ParamType) -> ToolParameter {
        ToolParameter::new(name, param_type, "")
    }

    #[test]
    fn test_json_with_declared_number() {
        let schema = [declared("x", ParamType::Number)];
        let params = coerce_parameters("calc", r#"{"x":"3","y":5}"#, &schema);
        assert_eq!(Value::Object(params), json!({"x": 3, "y": 5}));
    }

    #[test]
    fn test_json_without_schema_matches_plain_parse() {
        let raw = r#"{"q": "rust", "n": 2.5, "flag": true, "tags": ["a", "b"], "nested": {"k": null}}"#;
        let params = coerce_parameters("lookup", raw, &[]);
        let independent: Value = serde_json::from_str(raw).unwrap();
        assert_eq!(Value::Object(params), independent);
    }

    #[test]
    fn test_malformed_json_falls_through() {
        let params = coerce_parameters("lookup", "{not json", &[]);
        assert_eq!(Value::Object(params), json!({"input": "{not json"}));

        let params = coerce_parameters("lookup", "{broken, city=Paris", &[]);
        assert_eq!(params.get("city"), Some(&json!("Paris")));
    }

    #[test]
    fn test_key_value_pairs_are_trimmed() {
        let params = coerce_parameters("weather", " city = Paris , days=3 ", &[]);
        assert_eq!(Value::Object(params), json!({"city": "Paris", "days": "3"}));
    }

    #[test]
    fn test_split_on_first_equals_only() {
        let params = coerce_parameters("calculate", "expression=x=1", &[]);
        assert_eq!(params.get("expression"), Some(&json!("x=1")));
    }

    #[test]
    fn test_positional_key_per_family() {
        let params = coerce_parameters("search", "Python", &[]);
        assert_eq!(Value::Object(params), json!({"query": "Python"}));

        let params = coerce_parameters("calculate", "2 + 2", &[]);
        assert_eq!(Value::Object(params), json!({"input": "2 + 2"}));

        let params = coerce_parameters("memory", "favourite colour", &[]);
        assert_eq!(params.get("action"), Some(&json!("search")));
        assert_eq!(params.get("query"), Some(&json!("favourite colour")));
    }

    #[test]
    fn test_type_coercion_never_fails() {
        let schema = [
            declared("count", ParamType::Integer),
            declared("ratio", ParamType::Number),
            declared("verbose", ParamType::Boolean),
            declared("strict", ParamType::Boolean),
        ];
        let params = coerce_parameters(
            "report",
            "count=4.5, ratio=0.25, verbose=YES, strict=nah, extra=1",
            &schema,
        );
        assert_eq!(params.get("count"), Some(&json!("4.5")));
        assert_eq!(params.get("ratio"), Some(&json!(0.25)));
        assert_eq!(params.get("verbose"), Some(&json!(true)));
        assert_eq!(params.get("strict"), Some(&json!(false)));
        assert_eq!(params.get("extra"), Some(&json!("1")));
    }

    #[test]
    fn test_non_finite_number_stays_string() {
        let schema = [declared("x", ParamType::Number)];
        let params = coerce_parameters("calc", "x=inf", &schema);
        assert_eq!(params.get("x"), Some(&json!("inf")));
    }

    #[test]
    fn test_memory_action_inference() {
        let params = coerce_parameters("memory", "recall=cats", &[]);
        assert_eq!(Value::Object(params), json!({"query": "cats", "action": "search"}));

        let params = coerce_parameters("memory", "store=likes tea", &[]);
        assert_eq!(params.get("action"), Some(&json!("add")));
        assert_eq!(params.get("content"), Some(&json!("likes tea")));
        assert!(!params.contains_key("store"));
    }

    #[test]
    fn test_rag_action_inference() {
        let params = coerce_parameters("rag", "search=vector stores", &[]);
        assert_eq!(params.get("action"), Some(&json!("search")));
        assert_eq!(params.get("query"), Some(&json!("vector stores")));

        let params = coerce_parameters("rag", "text=some passage", &[]);
        assert_eq!(params.get("action"), Some(&json!("add_text")));
        assert_eq!(params.get("text"), Some(&json!("some passage")));
    }

    #[test]
    fn test_explicit_action_is_kept() {
        let params = coerce_parameters("memory", "action=summary, recall=cats", &[]);
        assert_eq!(params.get("action"), Some(&json!("summary")));
        assert_eq!(params.get("recall"), Some(&json!("cats")));
    }

    #[test]
    fn test_unknown_family_gets_no_action() {
        let params = coerce_parameters("notes", "recall=cats", &[]);
        assert!(!params.contains_key("action"));
    }
}
