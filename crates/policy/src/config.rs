use serde::{Deserialize, Serialize};

/// Allow/deny lists supplied by the configuration collaborator. Loaded once
/// per session, read-only afterwards.
///
/// Entries are either a bare tool name (`"shell"`) or a tool name scoped to a
/// literal command prefix (`"shell(git status)"`). A bare name in `core_tools`
/// allows the tool with no per-command restriction; a bare name in
/// `exclude_tools` denies it outright.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyConfig {
    #[serde(default)]
    pub core_tools: Vec<String>,
    #[serde(default)]
    pub exclude_tools: Vec<String>,
}

impl PolicyConfig {
    pub fn from_json(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// True when the tool appears unscoped in the deny list.
    pub fn is_tool_denied(&self, tool: &str) -> bool {
        has_unscoped_entry(&self.exclude_tools, tool)
    }

    /// True when the tool appears unscoped in the allow list.
    pub fn has_wildcard_allow(&self, tool: &str) -> bool {
        has_unscoped_entry(&self.core_tools, tool)
    }

    pub fn deny_prefixes(&self, tool: &str) -> Vec<String> {
        scoped_prefixes(&self.exclude_tools, tool)
    }

    pub fn allow_prefixes(&self, tool: &str) -> Vec<String> {
        scoped_prefixes(&self.core_tools, tool)
    }
}

fn has_unscoped_entry(entries: &[String], tool: &str) -> bool {
    entries.iter().any(|entry| {
        let (name, prefix) = parse_entry(entry);
        name == tool && prefix.is_none()
    })
}

fn scoped_prefixes(entries: &[String], tool: &str) -> Vec<String> {
    entries
        .iter()
        .filter_map(|entry| {
            let (name, prefix) = parse_entry(entry);
            if name == tool {
                prefix.map(str::to_string)
            } else {
                None
            }
        })
        .collect()
}

fn parse_entry(entry: &str) -> (&str, Option<&str>) {
    let entry = entry.trim();
    match entry.find('(') {
        Some(open) if entry.ends_with(')') => (
            entry[..open].trim_end(),
            Some(entry[open + 1..entry.len() - 1].trim()),
        ),
        _ => (entry, None),
    }
}
