//! Runs one job: materialize a workspace, optionally compile (through the
//! cache), invoke the program under resource caps, and fold every failure
//! mode into a structured result. Nothing here returns `Err` to the worker
//! loop; the result *is* the error channel.

use crate::cache::CompileCache;
use sentinel_base::{ExecutionResult, TestCase, TestCaseResult};
use sentinel_language::{substitute, substitute_args, CompileSpec, LanguageDescriptor};
use slog::{debug, Logger};
use std::{
    fmt, io,
    path::{Path, PathBuf},
    process::Stdio,
    time::{Duration, Instant},
};
use tokio::{
    io::{AsyncRead, AsyncReadExt as _, AsyncWriteExt as _},
    process::{Child, Command},
    time,
};

/// Hard cap on captured stdout and stderr, each.
pub const OUTPUT_LIMIT: usize = 1024 * 1024;

/// Where per-job workspaces live. Every job gets a unique directory under
/// this root, destroyed when the job finishes.
pub fn default_workspace_root() -> PathBuf {
    if cfg!(windows) {
        PathBuf::from(r"C:\temp\code-execution")
    } else {
        PathBuf::from("/tmp/code-execution")
    }
}

#[derive(Debug)]
pub(crate) enum ExecError {
    Timeout,
    OutputLimit,
    Spawn(io::Error),
    Io(io::Error),
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ExecError::Timeout => f.write_str("Execution timeout"),
            ExecError::OutputLimit => f.write_str("Output size exceeded limit"),
            ExecError::Spawn(err) => write!(f, "Failed to start process: {err}"),
            ExecError::Io(err) => write!(f, "I/O error: {err}"),
        }
    }
}

pub struct Executor {
    workspace_root: PathBuf,
    cache: CompileCache,
    log: Logger,
}

impl Executor {
    pub fn new(workspace_root: PathBuf, cache: CompileCache, log: Logger) -> Self {
        Executor {
            workspace_root,
            cache,
            log,
        }
    }

    /// Execute `code` for `lang`. With `test_cases`, the program runs once
    /// per case and the aggregate carries per-case outcomes; otherwise it
    /// runs once against `input`.
    pub async fn run(
        &self,
        lang: &LanguageDescriptor,
        code: &str,
        input: &str,
        test_cases: Option<&[TestCase]>,
    ) -> ExecutionResult {
        let started = Instant::now();
        match self.run_inner(lang, code, input, test_cases, started).await {
            Ok(result) => result,
            Err(err) => ExecutionResult::error(err.to_string(), elapsed_ms(started)),
        }
    }

    async fn run_inner(
        &self,
        lang: &LanguageDescriptor,
        code: &str,
        input: &str,
        test_cases: Option<&[TestCase]>,
        started: Instant,
    ) -> Result<ExecutionResult, ExecError> {
        tokio::fs::create_dir_all(&self.workspace_root)
            .await
            .map_err(ExecError::Io)?;
        // The TempDir guard removes the workspace on drop, which covers
        // every exit path out of this function.
        let workspace = tempfile::Builder::new()
            .prefix("job-")
            .tempdir_in(&self.workspace_root)
            .map_err(ExecError::Io)?;
        let dir = workspace.path();
        let filename = lang.source_filename();
        let file = dir.join(&filename);
        tokio::fs::write(&file, code).await.map_err(ExecError::Io)?;

        if let Some(compile) = &lang.compile {
            if let Some(failure) = self
                .compile(lang, compile, code, &file, dir, &filename, started)
                .await?
            {
                return Ok(failure);
            }
        }

        let program = substitute(&lang.command, &file, dir, &filename);
        let args = substitute_args(&lang.args, &file, dir, &filename);
        let timeout = Duration::from_millis(lang.timeout);

        match test_cases {
            Some(cases) => Ok(run_cases(&program, &args, dir, cases, timeout, started).await),
            None => {
                let output = run_command(&program, &args, dir, input, timeout).await?;
                Ok(ExecutionResult::success(
                    output.stdout,
                    output.stderr,
                    elapsed_ms(started),
                ))
            }
        }
    }

    /// Compile, preferring a cached artifact set. Returns `Some(result)` when
    /// compilation failed and the job is over.
    #[allow(clippy::too_many_arguments)]
    async fn compile(
        &self,
        lang: &LanguageDescriptor,
        compile: &CompileSpec,
        code: &str,
        file: &Path,
        dir: &Path,
        filename: &str,
        started: Instant,
    ) -> Result<Option<ExecutionResult>, ExecError> {
        let key = CompileCache::key(lang, compile, code);
        if self.cache.restore(lang, &key, dir).await {
            debug!(self.log, "compile cache hit"; "language" => &lang.name, "key" => &key[..12]);
            return Ok(None);
        }

        let program = substitute(&compile.command, file, dir, filename);
        let args = substitute_args(&compile.args, file, dir, filename);
        let timeout = Duration::from_millis(compile.timeout);
        let output = match run_command(&program, &args, dir, "", timeout).await {
            Ok(output) => output,
            Err(err @ (ExecError::Timeout | ExecError::OutputLimit)) => {
                return Ok(Some(ExecutionResult::error(
                    format!("Compilation failed: {err}"),
                    elapsed_ms(started),
                )));
            }
            Err(err) => return Err(err),
        };
        if output.exit_code != 0 {
            let detail = if output.stderr.is_empty() {
                output.stdout
            } else {
                output.stderr
            };
            return Ok(Some(ExecutionResult::error(
                format!("Compilation failed: {detail}"),
                elapsed_ms(started),
            )));
        }

        self.cache.publish(lang, &key, dir).await;
        Ok(None)
    }
}

/// Test-case mode: run every case in order, each on its own clock. A case
/// that fails to run is recorded and the iteration keeps going.
async fn run_cases(
    program: &str,
    args: &[String],
    dir: &Path,
    cases: &[TestCase],
    timeout: Duration,
    started: Instant,
) -> ExecutionResult {
    let mut results = Vec::with_capacity(cases.len());
    for case in cases {
        let case_started = Instant::now();
        let outcome = run_command(program, args, dir, &case.input, timeout).await;
        let execution_time = elapsed_ms(case_started);
        results.push(match outcome {
            Ok(output) => {
                let passed = output.stdout == case.expected.trim();
                TestCaseResult {
                    input: case.input.clone(),
                    expected: case.expected.clone(),
                    actual_output: output.stdout,
                    passed,
                    error: None,
                    execution_time,
                }
            }
            Err(err) => TestCaseResult {
                input: case.input.clone(),
                expected: case.expected.clone(),
                actual_output: String::new(),
                passed: false,
                error: Some(err.to_string()),
                execution_time,
            },
        });
    }
    ExecutionResult::from_cases(results, elapsed_ms(started))
}

struct CommandOutput {
    stdout: String,
    stderr: String,
    exit_code: i32,
}

/// Run one child process to completion under the output caps and `timeout`.
/// The child is dead by the time this returns, on every path.
async fn run_command(
    program: &str,
    args: &[String],
    dir: &Path,
    input: &str,
    timeout: Duration,
) -> Result<CommandOutput, ExecError> {
    let mut command = Command::new(program);
    command
        .args(args)
        .current_dir(dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(windows)]
    {
        const CREATE_NO_WINDOW: u32 = 0x0800_0000;
        command.creation_flags(CREATE_NO_WINDOW);
    }
    let mut child = command.spawn().map_err(ExecError::Spawn)?;

    let mut stdin = child.stdin.take().expect("stdin was piped");
    let stdout = child.stdout.take().expect("stdout was piped");
    let stderr = child.stderr.take().expect("stderr was piped");

    let input = input.as_bytes().to_vec();
    let feed = async move {
        // Write the whole buffer, then close stdin so programs that read to
        // EOF terminate. The child exiting early is not our error.
        let _ = stdin.write_all(&input).await;
        let _ = stdin.shutdown().await;
        drop(stdin);
        Ok::<_, ExecError>(())
    };
    let gather = async {
        let ((), out, err, status) = tokio::try_join!(
            feed,
            read_capped(stdout, OUTPUT_LIMIT),
            read_capped(stderr, OUTPUT_LIMIT),
            async { child.wait().await.map_err(ExecError::Io) },
        )?;
        Ok::<_, ExecError>((out, err, status))
    };

    // Bind before matching so the gather future (and its borrow of the
    // child) is gone by the time the kill paths need the child.
    let outcome = time::timeout(timeout, gather).await;
    match outcome {
        Ok(Ok((out, err, status))) => Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&out).trim().to_string(),
            stderr: String::from_utf8_lossy(&err).trim().to_string(),
            // A null exit code means the child was signaled; normalize to 0.
            exit_code: status.code().unwrap_or(0),
        }),
        Ok(Err(err)) => {
            kill(&mut child).await;
            Err(err)
        }
        Err(_) => {
            kill(&mut child).await;
            Err(ExecError::Timeout)
        }
    }
}

async fn kill(child: &mut Child) {
    let _ = child.start_kill();
    let _ = child.wait().await;
}

/// Accumulate a stream, refusing to buffer more than `limit` bytes.
async fn read_capped(
    mut stream: impl AsyncRead + Unpin,
    limit: usize,
) -> Result<Vec<u8>, ExecError> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        let n = stream.read(&mut chunk).await.map_err(ExecError::Io)?;
        if n == 0 {
            return Ok(buf);
        }
        if buf.len() + n > limit {
            return Err(ExecError::OutputLimit);
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
