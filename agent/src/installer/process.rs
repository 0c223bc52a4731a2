//! Installer process execution

use std::io;
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

/// How an installer process ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessExit {
    /// The process ran and exited with this code
    Exited(i32),

    /// The process was terminated by a signal
    Killed,

    /// The program could not be found
    NotFound,

    /// The process could not be spawned for another reason
    SpawnFailed(String),
}

/// Run a program to completion, discarding its output
pub async fn run_installer(program: &str, args: &[String]) -> ProcessExit {
    debug!("Running installer: {} {}", program, args.join(" "));

    let status = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;

    match status {
        Ok(status) => match status.code() {
            Some(code) => ProcessExit::Exited(code),
            None => ProcessExit::Killed,
        },
        Err(e) if e.kind() == io::ErrorKind::NotFound => ProcessExit::NotFound,
        Err(e) => ProcessExit::SpawnFailed(e.to_string()),
    }
}
