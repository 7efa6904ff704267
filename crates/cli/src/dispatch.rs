// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dispatch-template loading: `.sm/dispatch_templates.yaml` discovery and
//! `{key}`-style substitution, run entirely client-side before a message
//! is ever POSTed (SPEC_FULL.md §4.8, grounded in `cli/dispatch.py`). The
//! core never sees template syntax — `queue_message` only ever receives
//! the already-expanded string.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct TemplatesFile {
    #[serde(flatten)]
    templates: HashMap<String, String>,
}

/// Walk up from `start_dir` to `$HOME`, then fall back to
/// `~/.sm/dispatch_templates.yaml`, looking for `.sm/dispatch_templates.yaml`.
pub fn find_templates_file(start_dir: &Path) -> Option<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);

    let mut dir = Some(start_dir.to_path_buf());
    while let Some(d) = dir {
        let candidate = d.join(".sm").join("dispatch_templates.yaml");
        if candidate.is_file() {
            return Some(candidate);
        }
        if home.as_deref() == Some(d.as_path()) {
            break;
        }
        dir = d.parent().map(Path::to_path_buf);
    }

    let fallback = home?.join(".sm").join("dispatch_templates.yaml");
    fallback.is_file().then_some(fallback)
}

/// Load and substitute a named template, applying `{key}` → `value` for
/// every pair in `vars`. Returns an error naming any `{key}` left
/// unsubstituted so a typo'd variable name fails loudly rather than
/// shipping a literal `{key}` into a session's input stream.
pub fn expand_template(path: &Path, name: &str, vars: &HashMap<String, String>) -> anyhow::Result<String> {
    let contents = std::fs::read_to_string(path)?;
    let file: TemplatesFile = serde_yaml::from_str(&contents)?;
    let template = file
        .templates
        .get(name)
        .ok_or_else(|| anyhow::anyhow!("no template named '{name}' in {}", path.display()))?;

    let mut out = template.clone();
    for (key, value) in vars {
        out = out.replace(&format!("{{{key}}}"), value);
    }

    if let Some(start) = out.find('{') {
        if out[start..].contains('}') {
            anyhow::bail!("unsubstituted placeholder remains in expanded template: {out}");
        }
    }
    Ok(out)
}

/// Parse `key=value` CLI args into the substitution map.
pub fn parse_kv_args(args: &[String]) -> anyhow::Result<HashMap<String, String>> {
    let mut map = HashMap::new();
    for arg in args {
        let (key, value) = arg
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("expected key=value, got '{arg}'"))?;
        map.insert(key.to_string(), value.to_string());
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn expands_known_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("templates.yaml");
        fs::write(&path, "standup: \"status for {project} due {due}\"\n").unwrap();
        let vars = parse_kv_args(&["project=core".to_string(), "due=eod".to_string()]).unwrap();
        let expanded = expand_template(&path, "standup", &vars).unwrap();
        assert_eq!(expanded, "status for core due eod");
    }

    #[test]
    fn errors_on_unknown_template() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("templates.yaml");
        fs::write(&path, "standup: \"hi\"\n").unwrap();
        assert!(expand_template(&path, "nope", &HashMap::new()).is_err());
    }

    #[test]
    fn errors_on_unsubstituted_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("templates.yaml");
        fs::write(&path, "standup: \"status for {project}\"\n").unwrap();
        assert!(expand_template(&path, "standup", &HashMap::new()).is_err());
    }

    #[test]
    fn parse_kv_rejects_missing_equals() {
        assert!(parse_kv_args(&["nope".to_string()]).is_err());
    }

    #[test]
    fn finds_templates_file_walking_up() {
        let root = tempfile::tempdir().unwrap();
        let nested = root.path().join("a/b/c");
        fs::create_dir_all(&nested).unwrap();
        fs::create_dir_all(root.path().join(".sm")).unwrap();
        fs::write(root.path().join(".sm/dispatch_templates.yaml"), "x: \"y\"\n").unwrap();

        std::env::set_var("HOME", "/nonexistent-for-this-test");
        let found = find_templates_file(&nested).unwrap();
        assert_eq!(found, root.path().join(".sm/dispatch_templates.yaml"));
    }
}
