//! SSH backend interpreter.
//!
//! One connection per case; commands run strictly in order, each as an
//! independent exec channel (no persistent shell: `cd` and environment
//! changes do not carry over to the next command). The first violated
//! expectation fails the command and aborts the rest of the case. The
//! full transcript is always written to a session log file, whatever the
//! outcome.

use std::collections::HashMap;
use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use crate::config::SshConfig;
use crate::engine::{sanitize_filename, Interpreter};
use crate::model::{
    CaseDetail, CaseResult, CaseStatus, CommandExpectation, CommandResult, Module, SshCase,
    TestCase,
};

pub struct SshInterpreter {
    config: SshConfig,
    log_dir: PathBuf,
}

impl SshInterpreter {
    pub fn new(config: SshConfig, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            log_dir: log_dir.into(),
        }
    }
}

/// Captured output of one executed command.
#[derive(Debug, Clone)]
pub(crate) struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// ssh2 takes its timeout in milliseconds as a u32; saturate rather than
/// silently truncate a large configured value.
pub(crate) fn timeout_ms(timeout: Duration) -> u32 {
    u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX)
}

/// Seam between the command loop and the transport, so the loop's
/// ordering and abort semantics are testable without a live server.
pub(crate) trait CommandExec {
    fn exec(&mut self, command: &str, timeout: Duration) -> anyhow::Result<CommandOutput>;
}

struct Ssh2Exec {
    session: ssh2::Session,
}

impl CommandExec for Ssh2Exec {
    fn exec(&mut self, command: &str, timeout: Duration) -> anyhow::Result<CommandOutput> {
        self.session.set_timeout(timeout_ms(timeout));
        let mut channel = self.session.channel_session()?;
        channel.exec(command)?;

        let mut stdout = String::new();
        channel.read_to_string(&mut stdout)?;
        let mut stderr = String::new();
        channel.stderr().read_to_string(&mut stderr)?;
        channel.wait_close()?;
        let exit_code = channel.exit_status()?;

        Ok(CommandOutput {
            stdout,
            stderr,
            exit_code,
        })
    }
}

/// Check one command's output against its declared expectation, in the
/// fixed order exit code, stdout containment, stderr containment.
pub(crate) fn evaluate_expected(
    expected: &CommandExpectation,
    output: &CommandOutput,
) -> Result<(), String> {
    if let Some(code) = expected.exit_code {
        if code != output.exit_code {
            return Err(format!(
                "exit code mismatch: expected {code}, actual {}",
                output.exit_code
            ));
        }
    }
    if let Some(stdout) = &expected.stdout {
        for needle in stdout.as_slice() {
            if !output.stdout.contains(needle) {
                return Err(format!("stdout mismatch: expected to contain '{needle}'"));
            }
        }
    }
    if let Some(stderr) = &expected.stderr {
        for needle in stderr.as_slice() {
            if !output.stderr.contains(needle) {
                return Err(format!("stderr mismatch: expected to contain '{needle}'"));
            }
        }
    }
    Ok(())
}

/// Run the case's commands in declared order over `exec`. Returns the
/// transcript and, when a command failed, the case-level error. Commands
/// after the first failure are not attempted and not recorded.
pub(crate) fn run_commands(
    exec: &mut dyn CommandExec,
    commands: &[crate::model::Command],
    expected_results: &HashMap<String, CommandExpectation>,
    default_timeout: Duration,
) -> (Vec<CommandResult>, Option<String>) {
    let mut transcript = Vec::new();

    for (i, command) in commands.iter().enumerate() {
        let name = command.display_name(i);
        let timeout = command
            .timeout
            .map(Duration::from_secs)
            .unwrap_or(default_timeout);

        tracing::debug!(%name, command = %command.command, "executing command");

        let output = match exec.exec(&command.command, timeout) {
            Ok(o) => o,
            Err(e) => {
                transcript.push(CommandResult {
                    name: name.clone(),
                    command: command.command.clone(),
                    stdout: String::new(),
                    stderr: String::new(),
                    exit_code: -1,
                    status: CaseStatus::Failed,
                    error: e.to_string(),
                });
                return (transcript, Some(format!("command '{name}' failed: {e}")));
            }
        };

        let verdict = match expected_results.get(&name) {
            Some(expected) => evaluate_expected(expected, &output),
            None => Ok(()),
        };

        let mut entry = CommandResult {
            name: name.clone(),
            command: command.command.clone(),
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code: output.exit_code,
            status: CaseStatus::Passed,
            error: String::new(),
        };

        if let Err(e) = verdict {
            entry.status = CaseStatus::Failed;
            entry.error = e.clone();
            transcript.push(entry);
            return (transcript, Some(format!("command '{name}' failed: {e}")));
        }
        transcript.push(entry);
    }

    (transcript, None)
}

/// Write the per-command transcript to `<log_dir>/<name>_<timestamp>.log`.
/// A side effect independent of the case's own status.
pub(crate) fn write_session_log(
    log_dir: &Path,
    case_name: &str,
    transcript: &[CommandResult],
) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(log_dir)?;
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let path = log_dir.join(format!("{}_{stamp}.log", sanitize_filename(case_name)));

    let mut text = format!(
        "SSH session: {case_name}\ntime: {}\n{}\n\n",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(80)
    );
    for (i, entry) in transcript.iter().enumerate() {
        text.push_str(&format!(
            "command {}: {}\ncommand line: {}\nstatus: {}\nexit code: {}\n",
            i + 1,
            entry.name,
            entry.command,
            entry.status,
            entry.exit_code
        ));
        if !entry.error.is_empty() {
            text.push_str(&format!("error: {}\n", entry.error));
        }
        text.push_str(&format!(
            "\nstdout:\n{}\n{}\n\nstderr:\n{}\n{}\n\n{}\n\n",
            "-".repeat(80),
            entry.stdout,
            "-".repeat(80),
            entry.stderr,
            "=".repeat(80)
        ));
    }

    std::fs::write(&path, text)?;
    Ok(path)
}

fn connect(config: &SshConfig, case: &SshCase) -> anyhow::Result<ssh2::Session> {
    let timeout = Duration::from_secs(config.timeout);
    let addr = (case.host.as_str(), case.port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| anyhow::anyhow!("cannot resolve host: {}", case.host))?;
    let tcp = TcpStream::connect_timeout(&addr, timeout)?;

    let mut session = ssh2::Session::new()?;
    session.set_tcp_stream(tcp);
    session.set_timeout(timeout_ms(timeout));
    // Unknown host keys are accepted: no known-hosts check is performed.
    session.handshake()?;

    let username = if case.username.is_empty() {
        config.username.clone().unwrap_or_default()
    } else {
        case.username.clone()
    };
    let key_file = case.key_file.clone().or_else(|| config.key_file.clone());
    let password = if case.password.is_empty() {
        config.password.clone().unwrap_or_default()
    } else {
        case.password.clone()
    };

    // Key takes precedence when both are supplied.
    match key_file {
        Some(key) => session.userauth_pubkey_file(&username, None, &key, None)?,
        None => session.userauth_password(&username, &password)?,
    }

    Ok(session)
}

fn execute_blocking(
    config: &SshConfig,
    log_dir: &Path,
    case: &TestCase<SshCase>,
) -> CaseResult {
    let ssh = &case.payload;
    let mut result = CaseResult::begin(
        case,
        Module::Ssh,
        CaseDetail::Ssh {
            command_results: Vec::new(),
        },
    );

    tracing::info!(case = %case.name, host = %ssh.host, port = ssh.port, "executing ssh case");

    // The session drops (and closes the connection) on every path out.
    match connect(config, ssh) {
        Ok(session) => {
            let mut exec = Ssh2Exec { session };
            let (transcript, case_error) = run_commands(
                &mut exec,
                &ssh.commands,
                &ssh.expected_results,
                Duration::from_secs(config.timeout),
            );
            if let CaseDetail::Ssh { command_results } = &mut result.detail {
                *command_results = transcript;
            }
            match case_error {
                Some(e) => {
                    tracing::error!(case = %case.name, error = %e, "ssh case failed");
                    result.fail(e);
                }
                None => result.pass(),
            }
        }
        Err(e) => {
            tracing::error!(case = %case.name, error = %e, "ssh connection failed");
            result.fail_with_trace(format!("ssh connection failed: {e}"), format!("{e:?}"));
        }
    }

    if let CaseDetail::Ssh { command_results } = &result.detail {
        if let Err(e) = write_session_log(log_dir, &case.name, command_results) {
            tracing::warn!(case = %case.name, error = %e, "failed to write session log");
        }
    }

    result.finish();
    result
}

#[async_trait]
impl Interpreter for SshInterpreter {
    type Payload = SshCase;

    fn module(&self) -> Module {
        Module::Ssh
    }

    async fn execute(&self, case: &TestCase<SshCase>) -> CaseResult {
        let config = self.config.clone();
        let log_dir = self.log_dir.clone();
        let task_case = case.clone();

        let joined = tokio::task::spawn_blocking(move || {
            execute_blocking(&config, &log_dir, &task_case)
        })
        .await;

        match joined {
            Ok(result) => result,
            Err(e) => {
                // A panicked worker still owes the scheduler one result.
                let mut result = CaseResult::begin(
                    case,
                    Module::Ssh,
                    CaseDetail::Ssh {
                        command_results: Vec::new(),
                    },
                );
                result.fail(format!("ssh worker failed: {e}"));
                result.finish();
                result
            }
        }
    }
}
