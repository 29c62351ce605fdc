use regex::{Captures, Regex};
use serde_json::{Map, Value};
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_\-]+(?:\.[A-Za-z0-9_\-]+)*)\s*\}\}")
        .expect("placeholder pattern is a valid regex")
});

/// Replaces every `{{ name }}` placeholder in `text` in a single pass.
///
/// Dotted names walk nested maps. Unknown names render as the empty string,
/// and substituted text is never scanned again.
pub fn render(text: &str, context: &Map<String, Value>) -> String {
    PLACEHOLDER
        .replace_all(text, |captures: &Captures<'_>| {
            lookup(context, &captures[1])
                .map(render_value)
                .unwrap_or_default()
        })
        .into_owned()
}

fn lookup<'a>(context: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    let mut segments = name.split('.');
    let mut current = context.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn render_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
