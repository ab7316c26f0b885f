//! Subprocess workers for [`Command::system`](crate::Command::system) and
//! [`Command::system_streaming`](crate::Command::system_streaming).

use std::process::Stdio;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command as ProcessCommand;
use tokio::sync::mpsc;

use crate::command::{SystemEvent, SystemOutput};
use crate::dispatch::Inbound;

/// Exit status reported when the process could not be spawned at all.
const SPAWN_FAILURE_STATUS: i32 = 127;

fn shell(command_line: &str) -> ProcessCommand {
    let mut cmd = ProcessCommand::new("sh");
    cmd.arg("-c")
        .arg(command_line)
        .stdin(Stdio::null())
        .kill_on_drop(true);
    cmd
}

fn status_code(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

/// Run the command to completion and capture everything it wrote.
///
/// Spawn failures use the same result shape: status [`SPAWN_FAILURE_STATUS`]
/// with the error text in stderr.
pub(crate) async fn run_batch(command_line: &str) -> SystemOutput {
    let mut cmd = shell(command_line);
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    match cmd.output().await {
        Ok(output) => SystemOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            status: status_code(output.status),
        },
        Err(err) => SystemOutput {
            stdout: String::new(),
            stderr: err.to_string(),
            status: SPAWN_FAILURE_STATUS,
        },
    }
}

/// Run the command, forwarding each output line as it is produced, then
/// report the exit status.
///
/// Lines within one stream are delivered in emission order and keep their
/// trailing newline; `Completed` is delivered strictly after every line of
/// both streams. A spawn failure produces exactly one `Error` and no
/// `Completed`.
pub(crate) async fn run_streaming<Msg: Send + 'static>(
    command_line: String,
    tag: Arc<dyn Fn(SystemEvent) -> Msg + Send + Sync>,
    tx: mpsc::UnboundedSender<Inbound<Msg>>,
) {
    let mut cmd = shell(&command_line);
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) => {
            let _ = tx.send(Inbound::App(tag(SystemEvent::Error {
                message: err.to_string(),
            })));
            return;
        }
    };

    // Both pipes must be drained while the child runs, or a chatty process
    // can deadlock against a full pipe buffer.
    let stdout_pump = child.stdout.take().map(|stdout| {
        tokio::spawn(pump_lines(
            stdout,
            SystemEvent::Stdout as fn(String) -> SystemEvent,
            tag.clone(),
            tx.clone(),
        ))
    });
    let stderr_pump = child.stderr.take().map(|stderr| {
        tokio::spawn(pump_lines(
            stderr,
            SystemEvent::Stderr as fn(String) -> SystemEvent,
            tag.clone(),
            tx.clone(),
        ))
    });

    let status = child.wait().await;

    // Join the pumps before Completed so every line precedes it.
    if let Some(pump) = stdout_pump {
        let _ = pump.await;
    }
    if let Some(pump) = stderr_pump {
        let _ = pump.await;
    }

    let status = status.map(status_code).unwrap_or(-1);
    let _ = tx.send(Inbound::App(tag(SystemEvent::Completed { status })));
}

async fn pump_lines<Msg: Send + 'static>(
    reader: impl AsyncRead + Unpin,
    event: fn(String) -> SystemEvent,
    tag: Arc<dyn Fn(SystemEvent) -> Msg + Send + Sync>,
    tx: mpsc::UnboundedSender<Inbound<Msg>>,
) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf).into_owned();
                if tx.send(Inbound::App(tag(event(line)))).is_err() {
                    break;
                }
            }
        }
    }
}
