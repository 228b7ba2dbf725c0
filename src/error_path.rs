//! Error-path rewriting: a sub-query's
//! response is spliced into a larger one at `outer_path`, so every error the
//! sub-query reports must have its `path` rewritten as
//! `outer_path ++ sub_path[remove_prefix_length:]`, keeping every other
//! field (`message`, `extensions`, …) untouched.

use serde_json::Value;

/// Rewrites one path array. `sub_path` drops its first `remove_prefix_length`
/// segments (typically 1: the upstream root-field name this crate dispatched
/// as the sub-query's own selection root, which duplicates the last segment
/// of `outer_path` once reattached).
pub fn rewrite_path(outer_path: &[Value], sub_path: &[Value], remove_prefix_length: usize) -> Vec<Value> {
    let mut rewritten = outer_path.to_vec();
    rewritten.extend(sub_path.iter().skip(remove_prefix_length).cloned());
    rewritten
}

/// Rewrites every error in `sub_errors` that carries a `path`; errors without
/// one (request-level errors) pass through unchanged — they were never
/// attributable to a point inside the spliced subtree.
pub fn rewrite_errors(sub_errors: &[Value], outer_path: &[Value], remove_prefix_length: usize) -> Vec<Value> {
    sub_errors
        .iter()
        .map(|error| {
            let Some(path) = error.get("path").and_then(Value::as_array) else {
                return error.clone();
            };
            let mut rewritten = error.clone();
            rewritten["path"] = Value::Array(rewrite_path(outer_path, path, remove_prefix_length));
            rewritten
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn concatenates_outer_path_with_stripped_sub_path() {
        let outer = vec![json!("query"), json!("inventory_item")];
        let sub = vec![json!("item"), json!("price"), json!(0)];
        let rewritten = rewrite_path(&outer, &sub, 1);
        assert_eq!(rewritten, vec![json!("query"), json!("inventory_item"), json!("price"), json!(0)]);
    }

    #[test]
    fn path_less_errors_pass_through() {
        let outer = vec![json!("query")];
        let errors = vec![json!({ "message": "rate limited" })];
        let rewritten = rewrite_errors(&errors, &outer, 1);
        assert_eq!(rewritten, errors);
    }

    #[test]
    fn path_bearing_errors_get_outer_prefix() {
        let outer = vec![json!("query"), json!("billing_invoice")];
        let errors = vec![json!({ "message": "not found", "path": ["invoice", "total"] })];
        let rewritten = rewrite_errors(&errors, &outer, 1);
        assert_eq!(
            rewritten[0]["path"],
            json!(["query", "billing_invoice", "total"])
        );
    }
}
