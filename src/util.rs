//! Small utility helpers used across modules.

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
/// This is intentionally simple (no nested/conditional logic).
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = tpl.to_string();
  for (k, v) in pairs {
    let needle = format!("{{{}}}", k);
    out = out.replace(&needle, v);
  }
  out
}

/// Render items as a "- item" list, one per line. Empty input renders "- (none)".
pub fn bullet_list<S: AsRef<str>>(items: &[S]) -> String {
  if items.is_empty() {
    return "- (none)".into();
  }
  items
    .iter()
    .map(|s| format!("- \"{}\"", s.as_ref()))
    .collect::<Vec<_>>()
    .join("\n")
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge request/response payloads.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  let total = s.chars().count();
  if total <= max {
    s.to_string()
  } else {
    format!("{}… ({} chars total)", s.chars().take(max).collect::<String>(), total)
  }
}

/// Strip wrapping double quotes some models add around a bare translation.
/// Apostrophes are text, never quoting.
pub fn strip_quotes(s: &str) -> &str {
  let t = s.trim();
  for (open, close) in [('"', '"'), ('“', '”')] {
    if t.len() >= 2 && t.starts_with(open) && t.ends_with(close) {
      let inner = &t[open.len_utf8()..t.len() - close.len_utf8()];
      return inner.trim();
    }
  }
  t
}
