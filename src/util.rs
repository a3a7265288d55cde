//! Small utility helpers used across modules.

use std::collections::BTreeMap;

use serde_json::Value;

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values in a single pass,
/// so substituted values are never scanned for further placeholders.
/// Literal braces that do not name a provided key (e.g. JSON shape examples) are left untouched.
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = String::with_capacity(tpl.len());
  let mut rest = tpl;
  while let Some(open) = rest.find('{') {
    out.push_str(&rest[..open]);
    let after = &rest[open + 1..];
    let value = after
      .find('}')
      .and_then(|close| pairs.iter().find(|(k, _)| *k == &after[..close]).map(|(_, v)| (close, *v)));
    match value {
      Some((close, v)) => {
        out.push_str(v);
        rest = &after[close + 1..];
      }
      None => {
        out.push('{');
        rest = after;
      }
    }
  }
  out.push_str(rest);
  out
}

/// Serialize a JSON value with object keys sorted and no whitespace.
/// Two values that differ only in key order produce the same string.
pub fn to_canonical_json(value: &Value) -> String {
  match value {
    Value::Null => "null".to_string(),
    Value::Bool(b) => b.to_string(),
    Value::Number(n) => n.to_string(),
    Value::String(s) => Value::String(s.clone()).to_string(),
    Value::Array(arr) => {
      let items: Vec<String> = arr.iter().map(to_canonical_json).collect();
      format!("[{}]", items.join(","))
    }
    Value::Object(map) => {
      let tree: BTreeMap<&String, String> = map.iter().map(|(k, v)| (k, to_canonical_json(v))).collect();
      let items: Vec<String> = tree
        .into_iter()
        .map(|(k, v)| format!("{}:{}", Value::String(k.clone()), v))
        .collect();
      format!("{{{}}}", items.join(","))
    }
  }
}

/// Lowercase, ASCII-alphanumeric slug joined by dashes ("Data Structures!" -> "data-structures").
pub fn slugify(s: &str) -> String {
  let mut out = String::with_capacity(s.len());
  for ch in s.chars() {
    if ch.is_ascii_alphanumeric() {
      out.push(ch.to_ascii_lowercase());
    } else if !out.is_empty() && !out.ends_with('-') {
      out.push('-');
    }
  }
  while out.ends_with('-') {
    out.pop();
  }
  out
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge request/response payloads.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.chars().count() <= max {
    s.to_string()
  } else {
    let head: String = s.chars().take(max).collect();
    format!("{}… ({} bytes total)", head, s.len())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn fill_template_keeps_unrelated_braces() {
    let out = fill_template("Topic: {topic}. Return {\"title\": string}", &[("topic", "Rust")]);
    assert_eq!(out, "Topic: Rust. Return {\"title\": string}");
  }

  #[test]
  fn fill_template_does_not_expand_placeholders_inside_values() {
    let out = fill_template(
      "Goal: {career_goal}. Skills: {skills}. Shape: {\"items\": [{\"id\": {n}}]}",
      &[("career_goal", "lead {skills} team"), ("skills", "Rust"), ("n", "1")],
    );
    assert_eq!(out, "Goal: lead {skills} team. Skills: Rust. Shape: {\"items\": [{\"id\": 1}]}");
  }

  #[test]
  fn canonical_json_sorts_nested_keys() {
    let val = json!({ "z": [ { "y": "yes" }, null ], "a": { "x": 10 } });
    assert_eq!(to_canonical_json(&val), "{\"a\":{\"x\":10},\"z\":[{\"y\":\"yes\"},null]}");
  }

  #[test]
  fn slugify_collapses_separators() {
    assert_eq!(slugify("  Data Structures & Algorithms! "), "data-structures-algorithms");
    assert_eq!(slugify("C++"), "c");
  }

  #[test]
  fn trunc_for_log_is_char_safe() {
    assert_eq!(trunc_for_log("short", 10), "short");
    let t = trunc_for_log("héllo wörld", 4);
    assert!(t.starts_with("héll…"));
  }
}
