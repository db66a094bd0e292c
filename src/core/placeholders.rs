use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::LazyLock;

static MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[([A-Za-z0-9_]+)\]|\{\{([A-Za-z0-9_]+)\}\}|<([A-Za-z0-9_]+)>")
        .expect("marker pattern is valid")
});

const SENTINEL_PREFIX: &str = "MISSING_";

// Markers: [NAME], {{NAME}} or <NAME>. Names are case-insensitive, keyed uppercase.
// Only the exact sentinel shape `[MISSING_...]` is skipped, so a variable such as
// {{MISSING_DATA}} or [missing_data] is still detected. `[MISSING_DATA]` itself
// cannot be a variable.
fn marker_name(caps: &Captures<'_>) -> Option<String> {
    if caps.get(1).is_some_and(|m| m.as_str().starts_with(SENTINEL_PREFIX)) {
        return None;
    }
    let name = caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3))?;
    Some(name.as_str().to_ascii_uppercase())
}

pub fn missing_sentinel(name: &str) -> String {
    format!("[{SENTINEL_PREFIX}{}]", name.to_ascii_uppercase())
}

/// Variable names in first-occurrence order, deduplicated across syntaxes.
pub fn detect_variables(text: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for caps in MARKER.captures_iter(text) {
        if let Some(name) = marker_name(&caps) {
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
    names
}

/// Replaces every marker with its value, or with [`missing_sentinel`] when the
/// value is absent or blank. Lookup is by uppercase name.
pub fn substitute(text: &str, values: &HashMap<String, String>) -> String {
    MARKER
        .replace_all(text, |caps: &Captures<'_>| {
            let Some(name) = marker_name(caps) else {
                return caps[0].to_string();
            };
            match values.get(&name) {
                Some(value) if !value.trim().is_empty() => value.clone(),
                _ => missing_sentinel(&name),
            }
        })
        .into_owned()
}

// After sync the key set equals detect_variables(text); surviving values are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableMap {
    order: Vec<String>,
    values: HashMap<String, String>,
}

impl VariableMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_text(text: &str) -> Self {
        let mut map = Self::new();
        map.sync(text);
        map
    }

    /// Regenerates the key set from `text`. Returns the detected names.
    pub fn sync(&mut self, text: &str) -> &[String] {
        let detected = detect_variables(text);
        let mut values = HashMap::with_capacity(detected.len());
        for name in &detected {
            let value = self.values.remove(name).unwrap_or_default();
            values.insert(name.clone(), value);
        }
        self.order = detected;
        self.values = values;
        &self.order
    }

    /// Sets a value for a tracked variable. Unknown names are ignored and return `false`.
    pub fn set(&mut self, name: &str, value: impl Into<String>) -> bool {
        match self.values.get_mut(&name.to_ascii_uppercase()) {
            Some(slot) => {
                *slot = value.into();
                true
            }
            None => false,
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(&name.to_ascii_uppercase()).map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn unresolved(&self) -> Vec<&str> {
        self.order
            .iter()
            .filter(|name| self.values.get(*name).is_none_or(|v| v.trim().is_empty()))
            .map(String::as_str)
            .collect()
    }

    pub fn apply(&self, text: &str) -> String {
        substitute(text, &self.values)
    }
}
