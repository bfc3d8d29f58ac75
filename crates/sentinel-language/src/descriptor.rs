use serde::{Deserialize, Serialize};
use std::path::Path;

/// How to write, optionally compile, and run source for one language. One
/// JSON file per language in the configured directory; immutable once loaded.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LanguageDescriptor {
    pub name: String,
    pub display_name: String,
    /// Dot-prefixed, e.g. `".py"`.
    pub extension: String,
    pub command: String,
    /// Run-phase arguments. May contain the substitution tokens `{file}`,
    /// `{dir}`, and `{filename}`.
    pub args: Vec<String>,
    /// Run-phase wall-clock cap in milliseconds.
    pub timeout: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compile: Option<CompileSpec>,
    /// Explicit source file name, for toolchains that care (e.g. Java's
    /// public-class rule). Defaults to `main` + extension.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CompileSpec {
    pub command: String,
    pub args: Vec<String>,
    /// Compile wall-clock cap in milliseconds.
    #[serde(default = "default_compile_timeout")]
    pub timeout: u64,
}

fn default_compile_timeout() -> u64 {
    10_000
}

impl LanguageDescriptor {
    /// Name of the source file to materialize in the workspace.
    pub fn source_filename(&self) -> String {
        match &self.filename {
            Some(name) => name.clone(),
            None => format!("main{}", self.extension),
        }
    }

    /// Reject descriptors the executor could not act on. Deserialization
    /// already guarantees the required fields are present; this checks the
    /// values make sense.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("name must not be empty".into());
        }
        if self.name.chars().any(|c| c.is_ascii_uppercase()) {
            return Err(format!("name {:?} must be lowercase", self.name));
        }
        if self.display_name.is_empty() {
            return Err("displayName must not be empty".into());
        }
        if !self.extension.starts_with('.') {
            return Err(format!("extension {:?} must start with '.'", self.extension));
        }
        if self.command.is_empty() {
            return Err("command must not be empty".into());
        }
        if self.timeout == 0 {
            return Err("timeout must be positive".into());
        }
        if let Some(compile) = &self.compile {
            if compile.command.is_empty() {
                return Err("compile.command must not be empty".into());
            }
            if compile.timeout == 0 {
                return Err("compile.timeout must be positive".into());
            }
        }
        Ok(())
    }
}

/// Expand `{file}`, `{dir}`, and `{filename}` in a command or argument
/// template. `file` is the absolute source path, `dir` the workspace.
pub fn substitute(template: &str, file: &Path, dir: &Path, filename: &str) -> String {
    template
        .replace("{file}", &file.to_string_lossy())
        .replace("{dir}", &dir.to_string_lossy())
        .replace("{filename}", filename)
}

pub fn substitute_args(args: &[String], file: &Path, dir: &Path, filename: &str) -> Vec<String> {
    args.iter()
        .map(|arg| substitute(arg, file, dir, filename))
        .collect()
}
