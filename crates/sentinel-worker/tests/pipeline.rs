//! End-to-end runs through the registry → descriptor → executor pipeline,
//! using throwaway shell-based toolchains so nothing beyond a POSIX shell
//! is required.

use sentinel_base::{ExecStatus, TestCase};
use sentinel_language::LanguageRegistry;
use sentinel_util::log;
use sentinel_worker::{cache::CompileCache, executor::Executor};
use std::{fs, path::Path, time::Duration};
use tempfile::TempDir;

struct Pipeline {
    registry: LanguageRegistry,
    executor: Executor,
    _config_dir: TempDir,
    workspace_root: TempDir,
    cache_root: TempDir,
}

fn pipeline(descriptors: &[serde_json::Value]) -> Pipeline {
    let config_dir = tempfile::tempdir().unwrap();
    for (index, descriptor) in descriptors.iter().enumerate() {
        fs::write(
            config_dir.path().join(format!("lang-{index}.json")),
            serde_json::to_string_pretty(descriptor).unwrap(),
        )
        .unwrap();
    }
    let registry = LanguageRegistry::load(config_dir.path(), &log::discard()).unwrap();
    let workspace_root = tempfile::tempdir().unwrap();
    let cache_root = tempfile::tempdir().unwrap();
    let executor = Executor::new(
        workspace_root.path().into(),
        CompileCache::new(cache_root.path().into(), log::discard()),
        log::discard(),
    );
    Pipeline {
        registry,
        executor,
        _config_dir: config_dir,
        workspace_root,
        cache_root,
    }
}

fn shell_lang(timeout: u64) -> serde_json::Value {
    serde_json::json!({
        "name": "shell",
        "displayName": "POSIX Shell",
        "extension": ".sh",
        "command": "sh",
        "args": ["{file}"],
        "timeout": timeout,
    })
}

#[tokio::test]
async fn hello_world_round_trip() {
    let pipeline = pipeline(&[shell_lang(5000)]);
    let lang = pipeline.registry.get("shell").unwrap();
    let result = pipeline
        .executor
        .run(lang, "echo 'Hello, World!'", "", None)
        .await;
    assert_eq!(result.status, ExecStatus::Success);
    assert_eq!(result.output, "Hello, World!");
    assert_eq!(result.error, "");
    assert!(result.test_cases.is_none());
}

#[tokio::test]
async fn doubling_program_passes_its_test_cases() {
    let pipeline = pipeline(&[shell_lang(5000)]);
    let lang = pipeline.registry.get("shell").unwrap();
    let cases = vec![
        TestCase { input: "5".into(), expected: "10".into() },
        TestCase { input: "0".into(), expected: "0".into() },
        TestCase { input: "-3".into(), expected: "-6".into() },
    ];
    let result = pipeline
        .executor
        .run(lang, "read n; echo $((n * 2))", "", Some(&cases))
        .await;
    assert_eq!(result.status, ExecStatus::Success);
    let results = result.test_cases.unwrap();
    assert_eq!(results.len(), 3);
    for (case, case_result) in cases.iter().zip(&results) {
        assert_eq!(case_result.input, case.input, "echoed in request order");
        assert_eq!(case_result.actual_output, case.expected);
        assert!(case_result.passed);
        assert!(case_result.error.is_none());
    }
}

#[tokio::test]
async fn infinite_loop_times_out_per_case() {
    let pipeline = pipeline(&[shell_lang(400)]);
    let lang = pipeline.registry.get("shell").unwrap();
    let cases = vec![TestCase { input: String::new(), expected: String::new() }];
    let result = pipeline
        .executor
        .run(lang, "while :; do :; done", "", Some(&cases))
        .await;
    assert_eq!(result.status, ExecStatus::Success);
    let results = result.test_cases.unwrap();
    assert!(!results[0].passed);
    assert_eq!(results[0].actual_output, "");
    assert!(results[0].error.as_deref().unwrap().contains("Execution timeout"));
}

#[tokio::test]
async fn warm_cache_skips_the_second_compile() {
    let marker_dir = tempfile::tempdir().unwrap();
    let marker = marker_dir.path().join("compiles.log");
    // A "compiler" that records every invocation, so the cache's effect is
    // observable from outside.
    let compile_cmd = format!(
        "echo ran >> {} && cp {{file}} {{dir}}/program && chmod +x {{dir}}/program",
        marker.display(),
    );
    let pipeline = pipeline(&[serde_json::json!({
        "name": "c",
        "displayName": "C (fake toolchain)",
        "extension": ".c",
        "command": "{dir}/program",
        "args": [],
        "timeout": 5000,
        "compile": {
            "command": "sh",
            "args": ["-c", compile_cmd],
            "timeout": 10000,
        },
    })]);
    let lang = pipeline.registry.get("c").unwrap();
    let code = "#!/bin/sh\necho from-binary\n";

    let first = pipeline.executor.run(lang, code, "", None).await;
    assert_eq!(first.status, ExecStatus::Success, "error: {}", first.error);
    assert_eq!(first.output, "from-binary");

    let second = pipeline.executor.run(lang, code, "", None).await;
    assert_eq!(second.status, ExecStatus::Success);
    assert_eq!(second.output, first.output, "warm runs are byte-identical");

    let compiles = fs::read_to_string(&marker).unwrap();
    assert_eq!(compiles.lines().count(), 1, "second run must hit the cache");

    // Different source means a different key and a fresh compile.
    let other = pipeline.executor.run(lang, "#!/bin/sh\necho other\n", "", None).await;
    assert_eq!(other.output, "other");
    assert_eq!(fs::read_to_string(&marker).unwrap().lines().count(), 2);

    assert!(cache_entries(pipeline.cache_root.path().join("c").as_path()) >= 2);
    assert_eq!(
        fs::read_dir(pipeline.workspace_root.path()).unwrap().count(),
        0,
        "no workspace survives its job"
    );
}

fn cache_entries(dir: &Path) -> usize {
    fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
}

#[tokio::test]
async fn run_timeout_bounds_wall_clock() {
    let pipeline = pipeline(&[shell_lang(300)]);
    let lang = pipeline.registry.get("shell").unwrap();
    let started = std::time::Instant::now();
    let result = pipeline.executor.run(lang, "sleep 10", "", None).await;
    assert_eq!(result.status, ExecStatus::Error);
    assert_eq!(result.error, "Execution timeout");
    assert!(started.elapsed() < Duration::from_millis(300 + 500));
}

#[test]
fn shipped_language_configs_all_load() {
    let shipped = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("languages");
    let registry = LanguageRegistry::load(&shipped, &log::discard()).unwrap();
    for name in ["python", "javascript", "c", "cpp", "java", "typescript"] {
        assert!(registry.is_supported(name), "missing descriptor for {name}");
    }
    let java = registry.get("java").unwrap();
    assert_eq!(java.source_filename(), "Main.java");
    assert!(java.compile.is_some());
    let python = registry.get("python").unwrap();
    assert_eq!(python.source_filename(), "main.py");
    assert!(python.compile.is_none());
}
