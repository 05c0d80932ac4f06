//! Remote-shell session management
//!
//! A transfer needs two kinds of remote access: a long-lived command
//! channel whose stdin/stdout carry the copy protocol, and one-shot
//! commands (digest computation, symlink creation) whose output is
//! collected whole. Both are backed by spawned `ssh` processes with
//! piped stdio; the one-shot side is behind the `RemoteExec` trait so
//! tests can substitute a scripted peer.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::{Child, ChildStdin, ChildStdout};

use crate::error::{ScpError, ScpResult};
use crate::logging::*;

/// A `host:path` location on the far side of the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTarget {
	pub host: String,
	pub path: String,
}

impl RemoteTarget {
	/// Parse a location string. Strings starting with `/`, `.` or `~`
	/// are always local; otherwise the first `:` splits host from path.
	/// Returns None for local paths.
	pub fn parse(location: &str) -> Option<RemoteTarget> {
		if location.starts_with('/') || location.starts_with('.') || location.starts_with('~') {
			return None;
		}
		let colon = location.find(':')?;
		Some(RemoteTarget {
			host: location[..colon].to_string(),
			path: location[colon + 1..].to_string(),
		})
	}
}

/// A remote command with piped stdin/stdout
///
/// Owned exclusively by one protocol engine for the lifetime of one
/// transfer. Closing `stdin` is how the local side signals end-of-input.
pub struct CommandChannel {
	pub stdin: ChildStdin,
	pub stdout: ChildStdout,
	pub child: Child,
}

/// An established shell session to one remote host
///
/// Each channel or one-shot command spawns a fresh `ssh` process;
/// connection sharing is the ssh client's business (ControlMaster and
/// friends), not ours.
#[derive(Debug, Clone)]
pub struct SshSession {
	host: String,
	ssh_args: Vec<String>,
}

impl SshSession {
	pub fn new(host: impl Into<String>) -> Self {
		SshSession { host: host.into(), ssh_args: Vec::new() }
	}

	/// Extra arguments passed to every `ssh` invocation (port, identity
	/// file, options)
	pub fn ssh_args<I, S>(mut self, args: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.ssh_args = args.into_iter().map(|a| a.into()).collect();
		self
	}

	pub fn host(&self) -> &str {
		&self.host
	}

	/// Open a command channel: spawn the remote command with piped
	/// stdin/stdout. Stderr passes through to the caller's terminal.
	pub async fn channel(&self, command: &str) -> ScpResult<CommandChannel> {
		debug!("channel host={:?} command={:?}", self.host, command);
		let mut child = tokio::process::Command::new("ssh")
			.args(&self.ssh_args)
			.arg(&self.host)
			.arg(command)
			.stdin(Stdio::piped())
			.stdout(Stdio::piped())
			.spawn()
			.map_err(|e| ScpError::Session { host: self.host.clone(), source: e })?;

		let stdin = child
			.stdin
			.take()
			.ok_or_else(|| ScpError::StdioUnavailable { what: "stdin".to_string() })?;
		let stdout = child
			.stdout
			.take()
			.ok_or_else(|| ScpError::StdioUnavailable { what: "stdout".to_string() })?;

		Ok(CommandChannel { stdin, stdout, child })
	}
}

/// One-shot remote command execution
///
/// On failure the command's stderr text becomes the error message when
/// present, otherwise the exit status is reported.
#[async_trait]
pub trait RemoteExec: Send + Sync {
	async fn run(&self, command: &str) -> ScpResult<String>;
}

#[async_trait]
impl RemoteExec for SshSession {
	async fn run(&self, command: &str) -> ScpResult<String> {
		debug!("run host={:?} command={:?}", self.host, command);
		let output = tokio::process::Command::new("ssh")
			.args(&self.ssh_args)
			.arg(&self.host)
			.arg(command)
			.stdin(Stdio::null())
			.output()
			.await
			.map_err(|e| ScpError::Session { host: self.host.clone(), source: e })?;

		if !output.status.success() {
			let message = String::from_utf8_lossy(&output.stderr).trim().to_string();
			return Err(ScpError::RemoteCommand {
				status: output.status.code().unwrap_or(-1),
				message,
			});
		}

		Ok(String::from_utf8_lossy(&output.stdout).into_owned())
	}
}

/// Create (or replace) a symlink on the remote side.
///
/// Returns false when the link already points at the requested target,
/// in which case nothing was changed.
pub async fn create_symlink<E>(exec: &E, target: &str, dest: &str) -> ScpResult<bool>
where
	E: RemoteExec + ?Sized,
{
	if let Ok(existing) = exec.run(&format!("readlink {}", dest)).await {
		if existing.trim() == target {
			debug!("symlink {:?} already points at {:?}", dest, target);
			return Ok(false);
		}
	}
	exec.run(&format!("ln -sf {} {}", target, dest)).await?;
	Ok(true)
}


// vim: ts=4
