//! Error types for scpr operations

use std::error::Error;
use std::fmt;
use std::io;

/// Result alias used throughout the crate
pub type ScpResult<T> = Result<T, ScpError>;

/// Severity of a remote-reported status line
///
/// The wire protocol distinguishes non-fatal (0x01) from fatal (0x02)
/// responses, but either one aborts the operation that triggered it.
/// The severity is kept so callers can tell them apart after the fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteSeverity {
	/// Status byte 0x01
	Warning,

	/// Status byte 0x02
	Fatal,
}

/// Main error type for remote-copy operations
#[derive(Debug)]
pub enum ScpError {
	/// I/O error on a pipe, stream or the local file system
	Io(io::Error),

	/// Failed to spawn the remote-shell command
	Session { host: String, source: io::Error },

	/// A spawned command did not hand over the expected pipe
	StdioUnavailable { what: String },

	/// The remote peer reported a warning or fatal status line
	Remote { severity: RemoteSeverity, message: String },

	/// The remote peer sent a status byte outside the protocol
	UnsupportedResponse { byte: u8 },

	/// Malformed header, unbalanced framing or a declared size that
	/// did not match the bytes actually available
	Protocol { message: String },

	/// A remote command exited with a non-zero status
	RemoteCommand { status: i32, message: String },

	/// The transfer deadline elapsed
	Timeout,
}

impl fmt::Display for ScpError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ScpError::Io(e) => write!(f, "I/O error: {}", e),
			ScpError::Session { host, source } => {
				write!(f, "Failed to open session to {}: {}", host, source)
			}
			ScpError::StdioUnavailable { what } => {
				write!(f, "Stdio unavailable: {}", what)
			}
			// The remote message text is surfaced verbatim.
			ScpError::Remote { message, .. } => write!(f, "{}", message),
			ScpError::UnsupportedResponse { byte } => {
				write!(f, "Unsupported response type: {:#04x}", byte)
			}
			ScpError::Protocol { message } => write!(f, "Protocol error: {}", message),
			ScpError::RemoteCommand { status, message } => {
				if message.is_empty() {
					write!(f, "Remote command exited with status {}", status)
				} else {
					write!(f, "{}", message)
				}
			}
			ScpError::Timeout => write!(f, "Transfer timed out"),
		}
	}
}

impl Error for ScpError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			ScpError::Io(e) => Some(e),
			ScpError::Session { source, .. } => Some(source),
			_ => None,
		}
	}
}

impl From<io::Error> for ScpError {
	fn from(e: io::Error) -> Self {
		ScpError::Io(e)
	}
}

impl ScpError {
	/// Shorthand for a framing/state violation
	pub(crate) fn protocol(message: impl Into<String>) -> Self {
		ScpError::Protocol { message: message.into() }
	}
}


// vim: ts=4
