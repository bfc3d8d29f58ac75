//! Content-addressed store of compiled artifacts, shared lock-free by every
//! worker on the host. Identical keys always hold bit-identical artifacts,
//! so an interleaved double-compile wastes a little work and corrupts
//! nothing. Reads fall through to a recompile whenever the expected files
//! are missing.

use sentinel_language::{CompileSpec, LanguageDescriptor};
use sha2::{Digest as _, Sha256};
use slog::{warn, Logger};
use std::{
    io,
    path::{Path, PathBuf},
};
use tokio::fs;

/// Which files a cached compile produces, per language family.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ArtifactLayout {
    /// A single executable named `program` in the workspace root.
    Binary,
    /// A tree of class files with `Main.class` at the top.
    JvmClasses,
    /// A transpiled bundle under `dist/` with `dist/main.js` as the entry.
    Transpiled,
}

/// Languages outside these families recompile every time; there is no
/// artifact set worth keeping for them.
fn layout_for(language: &str) -> Option<ArtifactLayout> {
    match language {
        "c" | "cpp" | "rust" | "go" => Some(ArtifactLayout::Binary),
        "java" | "kotlin" => Some(ArtifactLayout::JvmClasses),
        "typescript" => Some(ArtifactLayout::Transpiled),
        _ => None,
    }
}

pub struct CompileCache {
    root: PathBuf,
    log: Logger,
}

impl CompileCache {
    pub fn new(root: PathBuf, log: Logger) -> Self {
        CompileCache { root, log }
    }

    pub fn default_root() -> PathBuf {
        if cfg!(windows) {
            PathBuf::from(r"C:\temp\sentinel-cache")
        } else {
            PathBuf::from("/tmp/sentinel-cache")
        }
    }

    /// Cache key over everything that determines the artifact: language,
    /// compile invocation, and the exact source bytes.
    pub fn key(lang: &LanguageDescriptor, compile: &CompileSpec, source: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(lang.name.as_bytes());
        hasher.update(b"\n");
        hasher.update(compile.command.as_bytes());
        hasher.update(b" ");
        hasher.update(compile.args.join(" ").as_bytes());
        hasher.update(b"\n");
        hasher.update(source.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Copy a cached artifact set into the workspace. Returns whether the
    /// workspace is now ready to run without compiling.
    pub async fn restore(&self, lang: &LanguageDescriptor, key: &str, workspace: &Path) -> bool {
        let Some(layout) = layout_for(&lang.name) else {
            return false;
        };
        let entry = self.root.join(&lang.name).join(key);
        let restored = match layout {
            ArtifactLayout::Binary => {
                let program = entry.join("program");
                if file_exists(&program).await {
                    fs::copy(&program, workspace.join("program")).await.map(|_| true)
                } else {
                    Ok(false)
                }
            }
            ArtifactLayout::JvmClasses => {
                if file_exists(&entry.join("Main.class")).await {
                    copy_dir(&entry, workspace).await.map(|()| true)
                } else {
                    Ok(false)
                }
            }
            ArtifactLayout::Transpiled => {
                if file_exists(&entry.join("dist").join("main.js")).await {
                    copy_dir(&entry.join("dist"), &workspace.join("dist"))
                        .await
                        .map(|()| true)
                } else {
                    Ok(false)
                }
            }
        };
        match restored {
            Ok(hit) => hit,
            Err(err) => {
                warn!(self.log, "compile cache read failed, recompiling";
                      "language" => &lang.name, "error" => %err);
                false
            }
        }
    }

    /// Publish the workspace's artifacts under `key`. Best-effort: a cache
    /// that cannot be written only costs future compiles.
    pub async fn publish(&self, lang: &LanguageDescriptor, key: &str, workspace: &Path) {
        if let Err(err) = self.publish_inner(lang, key, workspace).await {
            warn!(self.log, "compile cache write failed";
                  "language" => &lang.name, "error" => %err);
        }
    }

    async fn publish_inner(
        &self,
        lang: &LanguageDescriptor,
        key: &str,
        workspace: &Path,
    ) -> io::Result<()> {
        let Some(layout) = layout_for(&lang.name) else {
            return Ok(());
        };
        let lang_dir = self.root.join(&lang.name);
        fs::create_dir_all(&lang_dir).await?;

        // Stage the entry beside its final location, then rename it into
        // place; the hit predicate never observes a half-written entry.
        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(&lang_dir)?;
        match layout {
            ArtifactLayout::Binary => {
                fs::copy(workspace.join("program"), staging.path().join("program")).await?;
            }
            ArtifactLayout::JvmClasses => {
                let mut entries = fs::read_dir(workspace).await?;
                while let Some(entry) = entries.next_entry().await? {
                    let path = entry.path();
                    if path.extension().map(|ext| ext == "class").unwrap_or(false) {
                        fs::copy(&path, staging.path().join(entry.file_name())).await?;
                    }
                }
            }
            ArtifactLayout::Transpiled => {
                copy_dir(&workspace.join("dist"), &staging.path().join("dist")).await?;
            }
        }

        let entry = lang_dir.join(key);
        let staged = staging.into_path();
        if let Err(err) = fs::rename(&staged, &entry).await {
            let _ = fs::remove_dir_all(&staged).await;
            // A concurrent producer already renamed an identical entry into
            // place; anything else is a real write failure.
            if !file_exists(&entry).await {
                return Err(err);
            }
        }
        Ok(())
    }
}

async fn file_exists(path: &Path) -> bool {
    fs::try_exists(path).await.unwrap_or(false)
}

/// Recursive copy, directories first. Grounded on plain `tokio::fs`; no
/// symlink handling because artifacts never contain them.
async fn copy_dir(src: &Path, dst: &Path) -> io::Result<()> {
    fs::create_dir_all(dst).await?;
    let mut entries = fs::read_dir(src).await?;
    while let Some(entry) = entries.next_entry().await? {
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        if entry.file_type().await?.is_dir() {
            Box::pin(copy_dir(&src_path, &dst_path)).await?;
        } else {
            fs::copy(&src_path, &dst_path).await?;
        }
    }
    Ok(())
}
