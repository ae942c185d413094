//! Depth-bounded, always-succeeding serialization for tool results.
//!
//! Whatever a domain operation hands back, the orchestrator must be able to
//! forward it to the model as text. Values nested deeper than the cap are
//! replaced with [`MAX_DEPTH_SENTINEL`], error chains are flattened into
//! plain strings, and a source chain that loops back on itself is cut with
//! [`CIRCULAR_SENTINEL`].

use serde::Serialize;
use serde_json::Value;

pub const DEFAULT_MAX_DEPTH: usize = 10;
pub const MAX_DEPTH_SENTINEL: &str = "[MaxDepth]";
pub const CIRCULAR_SENTINEL: &str = "[Circular]";

/// Serialize anything into a JSON value, never failing.
pub fn to_safe_value<T: Serialize + ?Sized>(data: &T) -> Value {
    match serde_json::to_value(data) {
        Ok(value) => bound_depth(&value, DEFAULT_MAX_DEPTH),
        Err(e) => serde_json::json!({ "error": format!("unserializable result: {e}") }),
    }
}

/// Copy `value`, replacing anything below `max_depth` with a sentinel.
pub fn bound_depth(value: &Value, max_depth: usize) -> Value {
    bound_at(value, 0, max_depth)
}

fn bound_at(value: &Value, depth: usize, max_depth: usize) -> Value {
    match value {
        Value::Array(_) | Value::Object(_) if depth >= max_depth => {
            Value::String(MAX_DEPTH_SENTINEL.into())
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| bound_at(v, depth + 1, max_depth))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), bound_at(v, depth + 1, max_depth)))
                .collect(),
        ),
        scalar => scalar.clone(),
    }
}

/// Flatten an error and its `source()` chain into one line.
///
/// The chain is capped at [`DEFAULT_MAX_DEPTH`] links and stops with a
/// sentinel if a source repeats.
pub fn error_message(err: &(dyn std::error::Error + 'static)) -> String {
    let mut parts = vec![err.to_string()];
    let mut seen: Vec<*const ()> = vec![err as *const _ as *const ()];
    let mut current = err.source();

    while let Some(source) = current {
        let addr = source as *const _ as *const ();
        if seen.contains(&addr) {
            parts.push(CIRCULAR_SENTINEL.into());
            break;
        }
        if parts.len() >= DEFAULT_MAX_DEPTH {
            parts.push(MAX_DEPTH_SENTINEL.into());
            break;
        }
        let text = source.to_string();
        // thiserror's `transparent` repeats the inner message verbatim
        if parts.last() != Some(&text) {
            parts.push(text);
        }
        seen.push(addr);
        current = source.source();
    }

    parts.join(": ")
}

/// Turn a caught panic payload into text.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn nested(depth: usize) -> Value {
        let mut value = json!("leaf");
        for _ in 0..depth {
            value = json!({ "next": value });
        }
        value
    }

    #[test]
    fn shallow_values_pass_through() {
        let value = json!({"id": "t-1", "tags": [1, 2, {"a": null}]});
        assert_eq!(bound_depth(&value, DEFAULT_MAX_DEPTH), value);
    }

    #[test]
    fn deep_values_are_cut_at_the_cap() {
        let bounded = bound_depth(&nested(15), 10);
        let mut cursor = &bounded;
        for _ in 0..10 {
            cursor = &cursor["next"];
        }
        assert_eq!(cursor, &json!(MAX_DEPTH_SENTINEL));
    }

    #[test]
    fn unserializable_maps_become_error_values() {
        use std::collections::HashMap;
        // Non-string map keys can not become JSON object keys.
        let mut map: HashMap<(u8, u8), u8> = HashMap::new();
        map.insert((1, 2), 3);
        let value = to_safe_value(&map);
        assert!(value["error"].as_str().unwrap().contains("unserializable"));
    }

    #[derive(Debug)]
    struct Chain {
        msg: &'static str,
        source: Option<Box<Chain>>,
    }

    impl std::fmt::Display for Chain {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(self.msg)
        }
    }

    impl std::error::Error for Chain {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            self.source.as_deref().map(|s| s as _)
        }
    }

    #[test]
    fn error_chain_is_flattened() {
        let err = Chain {
            msg: "create_task failed",
            source: Some(Box::new(Chain {
                msg: "storage unavailable",
                source: None,
            })),
        };
        assert_eq!(error_message(&err), "create_task failed: storage unavailable");
    }

    /// An error whose source is itself.
    #[derive(Debug)]
    struct SelfReferential;

    impl std::fmt::Display for SelfReferential {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("loop")
        }
    }

    impl std::error::Error for SelfReferential {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(self)
        }
    }

    #[test]
    fn circular_error_chain_is_cut() {
        assert_eq!(error_message(&SelfReferential), format!("loop: {CIRCULAR_SENTINEL}"));
    }

    #[test]
    fn panic_payloads_become_text() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
    }
}
