use crate::heuristics::find_column0;
use std::process::Stdio;
use std::sync::atomic::AtomicI32;
use std::sync::atomic::Ordering;
use tokio::io::AsyncBufReadExt;
use tokio::io::BufReader;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const GREP_PROGRAM: &str = "grep";

/// One admitted `path:line:text` record from the search child.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrepMatch {
    /// Path exactly as reported by grep; may be relative to the search root.
    pub path: String,
    /// 1-based line number.
    pub line: u32,
    /// 0-based byte column of the first code occurrence of the needle.
    pub column: u32,
    /// Matched line with the trailing newline stripped.
    pub text: String,
}

/// Recursive fixed-string search under `root`, skipping `build` and `.git`
/// and honoring an optional comma-separated extension list ("cpp,hpp,h";
/// leading dots tolerated).
pub async fn grep_workspace(
    root: &str,
    needle: &str,
    max_results: usize,
    only_extensions: Option<&str>,
    cancel: &CancellationToken,
    child_pid: &AtomicI32,
) -> Vec<GrepMatch> {
    let mut args: Vec<String> = vec![
        "-RIn".to_string(),
        "--binary-files=without-match".to_string(),
        "--color=never".to_string(),
        "--exclude-dir=build".to_string(),
        "--exclude-dir=.git".to_string(),
    ];
    if let Some(extensions) = only_extensions {
        for ext in extensions.split(',') {
            let ext = ext.strip_prefix('.').unwrap_or(ext);
            if ext.is_empty() {
                continue;
            }
            args.push(format!("--include=*.{ext}"));
        }
    }
    args.push("-F".to_string());
    args.push("--".to_string());
    args.push(needle.to_string());
    args.push(root.to_string());

    run_grep(args, needle, max_results, cancel, child_pid).await
}

/// Fixed-string search over an explicit file list.
pub async fn grep_files(
    files: &[String],
    needle: &str,
    max_results: usize,
    cancel: &CancellationToken,
    child_pid: &AtomicI32,
) -> Vec<GrepMatch> {
    if files.is_empty() {
        return Vec::new();
    }
    let mut args: Vec<String> = vec![
        "-nH".to_string(),
        "--binary-files=without-match".to_string(),
        "--color=never".to_string(),
        "-F".to_string(),
        "--".to_string(),
        needle.to_string(),
    ];
    args.extend(files.iter().cloned());

    run_grep(args, needle, max_results, cancel, child_pid).await
}

/// Best-effort SIGTERM to a still-running search child. Only the spawning
/// worker ever reaps it.
pub fn terminate_child(pid: i32) {
    if pid > 0 {
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
    }
}

fn split_first_two_colons(line: &str) -> Option<(&str, &str, &str)> {
    let first = line.find(':')?;
    let second = line[first + 1..].find(':')? + first + 1;
    Some((&line[..first], &line[first + 1..second], &line[second + 1..]))
}

async fn run_grep(
    args: Vec<String>,
    needle: &str,
    max_results: usize,
    cancel: &CancellationToken,
    child_pid: &AtomicI32,
) -> Vec<GrepMatch> {
    let mut out = Vec::new();
    if needle.is_empty() || max_results == 0 || cancel.is_cancelled() {
        return out;
    }

    let mut child = match Command::new(GREP_PROGRAM)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
    {
        Ok(child) => child,
        Err(err) => {
            // Search is best-effort; a missing tool means no results.
            debug!("failed to spawn {GREP_PROGRAM}: {err}");
            return out;
        }
    };

    let pid = child.id().map(|id| id as i32).unwrap_or(0);
    child_pid.store(pid, Ordering::Release);

    match child.stdout.take() {
        Some(stdout) => {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                let line = tokio::select! {
                    _ = cancel.cancelled() => {
                        // The cancel path may have raced the pid publication;
                        // make sure the child goes down either way.
                        terminate_child(pid);
                        break;
                    }
                    next = lines.next_line() => match next {
                        Ok(Some(line)) => line,
                        _ => break,
                    },
                };

                let Some((path, line_no, text)) = split_first_two_colons(&line) else {
                    continue;
                };
                let Ok(line_no) = line_no.parse::<u32>() else {
                    continue;
                };
                if line_no == 0 {
                    continue;
                }
                let Some(column) = find_column0(text, needle) else {
                    continue;
                };
                out.push(GrepMatch {
                    path: path.to_string(),
                    line: line_no,
                    column: column as u32,
                    text: text.to_string(),
                });
                if out.len() >= max_results {
                    terminate_child(pid);
                    break;
                }
            }
        }
        None => terminate_child(pid),
    }

    let _ = child.wait().await;
    child_pid.store(0, Ordering::Release);
    out
}
