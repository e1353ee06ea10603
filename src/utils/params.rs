//! `--set key.path=value` parsing for the CLI.
use serde_json::{json, Map, Value};

use crate::error::{AppError, AppResult};
use crate::prompt::GenerationParams;

pub type SetPair = (Vec<String>, Value);

pub fn parse_set_pairs(items: &[String]) -> AppResult<Vec<SetPair>> {
    let mut out = Vec::new();
    for s in items {
        let Some((k, val)) = s.split_once('=') else {
            return Err(AppError::InvalidParameter {
                name: s.clone(),
                reason: "expected KEY=VALUE".into(),
            });
        };
        let key_path: Vec<String> = k.split('.').map(|p| p.trim().to_string()).collect();
        if key_path.iter().any(String::is_empty) {
            return Err(AppError::InvalidParameter {
                name: k.to_string(),
                reason: "empty path segment".into(),
            });
        }
        out.push((key_path, parse_value(val)));
    }
    Ok(out)
}

/// JSON when it parses, then loose literals, then a plain string.
pub fn parse_value(src: &str) -> Value {
    if let Ok(v) = serde_json::from_str::<Value>(src) {
        return v;
    }
    if src.eq_ignore_ascii_case("null") {
        return Value::Null;
    }
    if src.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if src.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    if let Ok(i) = src.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(f) = src.parse::<f64>() {
        return json!(f);
    }
    Value::String(src.to_string())
}

/// Set `path` inside `root`, creating intermediate objects. Returns false if
/// an intermediate value exists and is not an object.
pub fn apply_set_path(root: &mut Map<String, Value>, path: &[String], new_val: Value) -> bool {
    let Some((last, parents)) = path.split_last() else {
        return false;
    };
    let mut cur = root;
    for key in parents {
        let next = cur
            .entry(key.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        match next {
            Value::Object(map) => cur = map,
            _ => return false,
        }
    }
    cur.insert(last.clone(), new_val);
    true
}

/// Apply every pair onto `root`, failing on the first path that cannot be set.
pub fn apply_set_pairs(root: &mut Map<String, Value>, pairs: Vec<SetPair>) -> AppResult<()> {
    for (path, value) in pairs {
        if !apply_set_path(root, &path, value) {
            return Err(AppError::InvalidParameter {
                name: path.join("."),
                reason: "parent is not an object".into(),
            });
        }
    }
    Ok(())
}

/// Build generation overrides from `--set` items such as `stylization=250`.
pub fn params_from_sets(items: &[String]) -> AppResult<GenerationParams> {
    let mut root = Map::new();
    apply_set_pairs(&mut root, parse_set_pairs(items)?)?;
    GenerationParams::from_value(&Value::Object(root))
}
