use crate::descriptor::LanguageDescriptor;
use anyhow::{Context as _, Result};
use slog::{error, info, warn, Logger};
use std::{collections::HashMap, fs, path::Path};

/// Process-wide collection of language descriptors, loaded once at startup
/// and passed by reference to whoever needs it.
#[derive(Debug, Default)]
pub struct LanguageRegistry {
    languages: HashMap<String, LanguageDescriptor>,
}

impl LanguageRegistry {
    /// Load every `*.json` descriptor in `dir`. A descriptor that fails to
    /// parse or validate is skipped with a logged error; an unreadable
    /// directory is fatal since the service would support nothing at all.
    pub fn load(dir: &Path, log: &Logger) -> Result<Self> {
        let mut languages = HashMap::new();
        let entries = fs::read_dir(dir)
            .with_context(|| format!("reading language config directory {}", dir.display()))?;
        for entry in entries {
            let path = entry?.path();
            if path.extension().map(|ext| ext != "json").unwrap_or(true) {
                continue;
            }
            let descriptor = match load_one(&path) {
                Ok(descriptor) => descriptor,
                Err(err) => {
                    error!(log, "skipping language config"; "path" => %path.display(), "error" => %err);
                    continue;
                }
            };
            if let Some(previous) = languages.insert(descriptor.name.clone(), descriptor) {
                warn!(
                    log, "duplicate language name, keeping the later descriptor";
                    "name" => &previous.name, "path" => %path.display(),
                );
            }
        }
        info!(log, "loaded language registry"; "count" => languages.len());
        Ok(LanguageRegistry { languages })
    }

    pub fn from_descriptors(descriptors: impl IntoIterator<Item = LanguageDescriptor>) -> Self {
        LanguageRegistry {
            languages: descriptors
                .into_iter()
                .map(|descriptor| (descriptor.name.clone(), descriptor))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&LanguageDescriptor> {
        self.languages.get(name)
    }

    /// All descriptors, sorted by name for stable listings.
    pub fn list(&self) -> Vec<&LanguageDescriptor> {
        let mut all: Vec<_> = self.languages.values().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn is_supported(&self, name: &str) -> bool {
        self.languages.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.languages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.languages.is_empty()
    }
}

fn load_one(path: &Path) -> Result<LanguageDescriptor> {
    let contents = fs::read_to_string(path)?;
    let descriptor: LanguageDescriptor = serde_json::from_str(&contents)?;
    descriptor
        .validate()
        .map_err(|reason| anyhow::anyhow!("{reason}"))?;
    Ok(descriptor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use sentinel_util::log;
    use std::fs;

    fn write_config(dir: &Path, name: &str, contents: &str) {
        fs::write(dir.join(name), contents).unwrap();
    }

    #[test]
    fn loads_valid_descriptors_and_skips_broken_ones() {
        let dir = tempfile::tempdir().unwrap();
        write_config(
            dir.path(),
            "python.json",
            indoc! {r#"
                {
                    "name": "python",
                    "displayName": "Python 3",
                    "extension": ".py",
                    "command": "python3",
                    "args": ["{file}"],
                    "timeout": 5000
                }
            "#},
        );
        write_config(
            dir.path(),
            "broken.json",
            r#"{"name": "broken", "displayName": "Broken"}"#,
        );
        write_config(dir.path(), "not-json.json", "flagrantly not json");
        write_config(dir.path(), "notes.txt", "ignored entirely");

        let registry = LanguageRegistry::load(dir.path(), &log::discard()).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.is_supported("python"));
        assert!(!registry.is_supported("broken"));
        assert_eq!(registry.get("python").unwrap().display_name, "Python 3");
    }

    #[test]
    fn skips_descriptors_failing_validation() {
        let dir = tempfile::tempdir().unwrap();
        write_config(
            dir.path(),
            "bad.json",
            indoc! {r#"
                {
                    "name": "bad",
                    "displayName": "Bad",
                    "extension": "noprefix",
                    "command": "bad",
                    "args": [],
                    "timeout": 1000
                }
            "#},
        );
        let registry = LanguageRegistry::load(dir.path(), &log::discard()).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn missing_directory_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(LanguageRegistry::load(&missing, &log::discard()).is_err());
    }

    #[test]
    fn list_is_sorted_by_name() {
        let registry = LanguageRegistry::from_descriptors(["c", "python", "java"].map(|name| {
            LanguageDescriptor {
                name: name.into(),
                display_name: name.to_uppercase(),
                extension: ".x".into(),
                command: name.into(),
                args: vec![],
                timeout: 1000,
                compile: None,
                filename: None,
            }
        }));
        let names: Vec<_> = registry.list().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["c", "java", "python"]);
    }
}
