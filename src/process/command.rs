//! Command-line classification into a launch plan.
//!
//! Three launch shapes, decided by the first token of the command:
//!
//! 1. **Shell script** — routed through the platform command interpreter
//!    (`cmd.exe /c` on Windows, `sh -c` elsewhere) so shell built-ins and
//!    piping work and output stays capturable.
//! 2. **Python** — rewritten for unbuffered stdout (`-u` injected,
//!    `PYTHONUNBUFFERED=1` in the environment) so streamed output is
//!    observed promptly instead of arriving in late batches.
//! 3. **Anything else** — whitespace-tokenized into program + args.

use std::path::PathBuf;

/// Environment variable that disables Python's stdout buffering.
const PYTHON_UNBUFFERED_ENV: (&str, &str) = ("PYTHONUNBUFFERED", "1");

/// A fully resolved process launch: program, argument vector, and extra
/// environment entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    /// Program to execute.
    pub program: String,
    /// Argument vector.
    pub args: Vec<String>,
    /// Extra environment entries for the child.
    pub env: Vec<(String, String)>,
}

impl LaunchPlan {
    fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            env: Vec::new(),
        }
    }

    fn with_unbuffered_python(mut self) -> Self {
        let (key, value) = PYTHON_UNBUFFERED_ENV;
        self.env.push((key.to_owned(), value.to_owned()));
        self
    }
}

/// Builds a launch plan from a raw command line.
///
/// Returns `None` for an empty (or whitespace-only) command; the caller
/// reports that as a no-command failure.
pub fn plan_command(command: &str) -> Option<LaunchPlan> {
    let trimmed = command.trim();
    if trimmed.is_empty() {
        return None;
    }

    let mut tokens = trimmed.split_whitespace().map(str::to_owned);
    let first = tokens.next()?;
    let rest: Vec<String> = tokens.collect();

    if is_shell_script(&first) {
        return Some(shell_plan(trimmed));
    }

    let first_lower = first.to_lowercase();
    if is_python_program(&first_lower) {
        // The command already names the interpreter; make sure -u is there.
        let mut args = rest;
        if !args.iter().any(|a| a == "-u") {
            args.insert(0, "-u".to_owned());
        }
        return Some(LaunchPlan::new(first, args).with_unbuffered_python());
    }
    if first_lower.ends_with(".py") {
        // A bare script; prepend a resolved interpreter.
        let mut args = vec!["-u".to_owned(), first];
        args.extend(rest);
        return Some(LaunchPlan::new(default_python(), args).with_unbuffered_python());
    }

    Some(LaunchPlan::new(first, rest))
}

/// Returns `true` if the program token names a shell script for the
/// current platform.
fn is_shell_script(program: &str) -> bool {
    let lower = program.to_lowercase();
    if cfg!(target_os = "windows") {
        lower.ends_with(".bat") || lower.ends_with(".cmd")
    } else {
        lower.ends_with(".sh")
    }
}

/// Routes the whole command line through the platform interpreter.
fn shell_plan(command: &str) -> LaunchPlan {
    if cfg!(target_os = "windows") {
        LaunchPlan::new("cmd.exe", vec!["/c".to_owned(), command.to_owned()])
    } else {
        LaunchPlan::new("sh", vec!["-c".to_owned(), command.to_owned()])
    }
}

/// Returns `true` if the program token is a Python interpreter
/// (`python`, `python3`, `python.exe`, `/usr/bin/python3`, ...).
fn is_python_program(lower: &str) -> bool {
    let stem = lower
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(lower)
        .trim_end_matches(".exe");
    stem == "python" || (stem.starts_with("python") && stem[6..].chars().all(|c| c.is_ascii_digit() || c == '.'))
}

/// Resolves a Python interpreter from PATH, preferring `python3`.
///
/// Falls back to the bare name when nothing resolves; the spawn will then
/// fail with a normal launch error.
fn default_python() -> String {
    for candidate in ["python3", "python"] {
        if let Ok(path) = which::which(candidate) {
            return path.to_string_lossy().into_owned();
        }
    }
    "python3".to_owned()
}

/// Expands a working-directory setting into a path, treating the empty
/// string as "inherit".
pub fn working_dir(path: &str) -> Option<PathBuf> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(PathBuf::from(trimmed))
    }
}
