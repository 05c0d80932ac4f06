//! The remote-copy wire protocol
//!
//! The classic `scp` dialog is a byte-oriented lockstep: each header line
//! the sender writes is answered by exactly one status byte before any
//! further bytes for that entry may flow. File content is the declared
//! byte count followed by a single 0x00 sentinel; the receiver only
//! advances past content on that sentinel, never on end-of-stream. A
//! single malformed byte desynchronizes the session for good: there is
//! no resynchronization, every violation is fatal.
//!
//! `Protocol` owns both halves of a command channel (or any pair of byte
//! streams in tests) and speaks both directions: header emission for
//! upload, frame parsing for download.

use std::io;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::{RemoteSeverity, ScpError, ScpResult};
use crate::logging::*;

/// Status byte: success
pub const RESP_OK: u8 = 0x00;
/// Status byte: non-fatal error, message line follows
pub const RESP_NON_FATAL: u8 = 0x01;
/// Status byte: fatal error, message line follows
pub const RESP_FATAL: u8 = 0x02;

/// Header type: regular file
pub const REQ_FILE: u8 = b'C';
/// Header type: directory start
pub const REQ_DIR_START: u8 = b'D';
/// Header type: directory end
pub const REQ_DIR_END: u8 = b'E';
/// Header type: timestamp prelude (sent under `-p`)
pub const REQ_TIME: u8 = b'T';

fn resp_name(b: u8) -> &'static str {
	match b {
		RESP_OK => "Ok",
		RESP_NON_FATAL => "NonFatal",
		RESP_FATAL => "Fatal",
		_ => "Unknown",
	}
}

/// One parsed inbound frame (download direction)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
	/// `C<mode> <size> <name>`: file content follows after our ack
	File { mode: u32, size: u64, name: String },
	/// `D<mode> 0 <name>`: entries that follow belong to this directory
	DirStart { mode: u32, name: String },
	/// `E`: closes the innermost open directory
	DirEnd,
	/// `T<mtime> 0 <atime> 0`: timestamps for the next entry
	Time { mtime: i64, atime: i64 },
	/// A bare 0x00 at a frame boundary; carries no information
	Ok,
	/// Orderly end of the inbound stream
	Eof,
}

/// Serialize a file header line
pub fn file_header(mode: u32, size: u64, name: &str) -> String {
	format!("{}{:04o} {} {}\n", REQ_FILE as char, mode & 0o777, size, name)
}

/// Serialize a directory-start header line
pub fn dir_header(mode: u32, name: &str) -> String {
	format!("{}{:04o} 0 {}\n", REQ_DIR_START as char, mode & 0o777, name)
}

/// Parse one header line (with or without the trailing newline) into a
/// frame. Status bytes are not headers and are rejected here.
pub fn parse_header(line: &str) -> ScpResult<Frame> {
	let line = line.strip_suffix('\n').unwrap_or(line);
	let kind = match line.bytes().next() {
		Some(b) => b,
		None => return Err(ScpError::protocol("empty header line")),
	};

	// The recognized kinds are all ASCII, so slicing past the first byte
	// is safe inside these arms.
	match kind {
		REQ_FILE => {
			let (mode, size, name) = parse_entry_fields(&line[1..])?;
			Ok(Frame::File { mode, size, name })
		}
		REQ_DIR_START => {
			// The size field of a directory header is always zero on the
			// wire; its value is ignored on the way in.
			let (mode, _size, name) = parse_entry_fields(&line[1..])?;
			Ok(Frame::DirStart { mode, name })
		}
		REQ_DIR_END => Ok(Frame::DirEnd),
		REQ_TIME => {
			let fields: Vec<&str> = line[1..].split(' ').collect();
			if fields.len() < 4 {
				return Err(ScpError::protocol(format!(
					"timestamp header needs 4 fields, got {}: {:?}",
					fields.len(),
					line
				)));
			}
			let mtime = fields[0]
				.parse()
				.map_err(|e| ScpError::protocol(format!("invalid mtime {:?}: {}", fields[0], e)))?;
			let atime = fields[2]
				.parse()
				.map_err(|e| ScpError::protocol(format!("invalid atime {:?}: {}", fields[2], e)))?;
			Ok(Frame::Time { mtime, atime })
		}
		other => Err(ScpError::UnsupportedResponse { byte: other }),
	}
}

fn parse_entry_fields(rest: &str) -> ScpResult<(u32, u64, String)> {
	let mut fields = rest.splitn(3, ' ');
	let mode_s = fields.next().unwrap_or("");
	let size_s = fields
		.next()
		.ok_or_else(|| ScpError::protocol(format!("header missing size field: {:?}", rest)))?;
	let name = fields
		.next()
		.ok_or_else(|| ScpError::protocol(format!("header missing name field: {:?}", rest)))?;

	let mode = u32::from_str_radix(mode_s, 8)
		.map_err(|e| ScpError::protocol(format!("invalid mode {:?}: {}", mode_s, e)))?;
	let size = size_s
		.parse()
		.map_err(|e| ScpError::protocol(format!("invalid size {:?}: {}", size_s, e)))?;
	if name.is_empty() {
		return Err(ScpError::protocol("empty name in header"));
	}

	Ok((mode, size, name.to_string()))
}

/// Protocol engine bound to one command channel
pub struct Protocol<R, W> {
	recv: BufReader<R>,
	send: Option<W>,
}

impl<R, W> Protocol<R, W>
where
	R: AsyncRead + Unpin,
	W: AsyncWrite + Unpin,
{
	pub fn new(recv: R, send: W) -> Self {
		Protocol { recv: BufReader::new(recv), send: Some(send) }
	}

	fn send_mut(&mut self) -> ScpResult<&mut W> {
		self.send
			.as_mut()
			.ok_or_else(|| ScpError::protocol("write after input stream was closed"))
	}

	/// Close the write side so the peer observes end-of-input. The local
	/// driver calls this as its final act on every exit path; without it
	/// the remote command stalls forever. Further writes error.
	pub async fn close_send(&mut self) -> ScpResult<()> {
		if let Some(mut send) = self.send.take() {
			send.shutdown().await?;
		}
		Ok(())
	}

	/// Read one acknowledgement: exactly one status byte, plus the
	/// message line for 0x01/0x02. End-of-stream instead of a status
	/// byte is success: a peer closing its output without an explicit
	/// ack is not an error at this layer.
	pub async fn read_ack(&mut self, context: &str) -> ScpResult<()> {
		let b = match self.recv.read_u8().await {
			Ok(b) => b,
			Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
				debug!("ack[{}]: eof on status read", context);
				return Ok(());
			}
			Err(e) => {
				debug!("ack[{}]: status read failed: {}", context, e);
				return Err(ScpError::Io(e));
			}
		};

		match b {
			RESP_OK => {
				debug!("ack[{}]: success", context);
				Ok(())
			}
			RESP_NON_FATAL => {
				let message = self.read_message_line().await?;
				debug!("ack[{}]: non-fatal: {:?}", context, message);
				Err(ScpError::Remote { severity: RemoteSeverity::Warning, message })
			}
			RESP_FATAL => {
				let message = self.read_message_line().await?;
				debug!("ack[{}]: fatal: {:?}", context, message);
				Err(ScpError::Remote { severity: RemoteSeverity::Fatal, message })
			}
			other => {
				debug!("ack[{}]: unsupported {}", context, resp_name(other));
				Err(ScpError::UnsupportedResponse { byte: other })
			}
		}
	}

	/// Rest of the current line as UTF-8, newline stripped. EOF before
	/// the newline terminates the line, matching the ack EOF rule.
	async fn read_message_line(&mut self) -> ScpResult<String> {
		let mut buf = Vec::new();
		self.recv.read_until(b'\n', &mut buf).await?;
		if buf.last() == Some(&b'\n') {
			buf.pop();
		}
		Ok(String::from_utf8_lossy(&buf).into_owned())
	}

	/// Write one 0x00 status byte
	pub async fn write_ok(&mut self) -> ScpResult<()> {
		let send = self.send_mut()?;
		send.write_all(&[RESP_OK]).await?;
		send.flush().await?;
		Ok(())
	}

	/// Send a directory-start header and await its acknowledgement.
	/// The caller then sends the nested entries and closes the frame
	/// with `send_dir_end`.
	pub async fn send_dir_start(&mut self, mode: u32, name: &str) -> ScpResult<()> {
		let msg = dir_header(mode, name);
		debug!("send_dir msg={:?}", msg);
		let send = self.send_mut()?;
		send.write_all(msg.as_bytes()).await?;
		send.flush().await?;
		self.read_ack("send-dir-start").await
	}

	/// Close the innermost directory frame and await its acknowledgement
	pub async fn send_dir_end(&mut self) -> ScpResult<()> {
		debug!("send_dir end=E");
		let send = self.send_mut()?;
		send.write_all(&[REQ_DIR_END, b'\n']).await?;
		send.flush().await?;
		self.read_ack("send-dir-end").await
	}

	/// Send one regular file: header, ack, exactly `size` content bytes,
	/// the 0x00 end-of-content sentinel, ack.
	pub async fn send_file<F>(
		&mut self,
		mode: u32,
		size: u64,
		name: &str,
		content: &mut F,
	) -> ScpResult<()>
	where
		F: AsyncRead + Unpin,
	{
		let msg = file_header(mode, size, name);
		debug!("send_file msg={:?}", msg);
		let send = self.send_mut()?;
		send.write_all(msg.as_bytes()).await?;
		send.flush().await?;
		self.read_ack("send-file-start").await?;

		let send = self.send_mut()?;
		let mut body = content.take(size);
		let copied = tokio::io::copy(&mut body, send).await?;
		debug!("send_file content, size={}", copied);
		if copied != size {
			return Err(ScpError::protocol(format!(
				"{}: header declared {} bytes but only {} could be read",
				name, size, copied
			)));
		}

		// The receiver only advances past content on this sentinel, not
		// on end-of-stream.
		debug!("send_file sentinel");
		let send = self.send_mut()?;
		send.write_all(&[RESP_OK]).await?;
		send.flush().await?;
		self.read_ack("send-file-end").await
	}

	/// Read one inbound frame (download direction). Remote 0x01/0x02
	/// status lines surface as errors carrying the message text.
	pub async fn read_frame(&mut self) -> ScpResult<Frame> {
		let b = match self.recv.read_u8().await {
			Ok(b) => b,
			Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(Frame::Eof),
			Err(e) => return Err(ScpError::Io(e)),
		};

		match b {
			RESP_OK => Ok(Frame::Ok),
			RESP_NON_FATAL => {
				let message = self.read_message_line().await?;
				debug!("frame: non-fatal: {:?}", message);
				Err(ScpError::Remote { severity: RemoteSeverity::Warning, message })
			}
			RESP_FATAL => {
				let message = self.read_message_line().await?;
				debug!("frame: fatal: {:?}", message);
				Err(ScpError::Remote { severity: RemoteSeverity::Fatal, message })
			}
			REQ_FILE | REQ_DIR_START | REQ_DIR_END | REQ_TIME => {
				let rest = self.read_message_line().await?;
				let mut line = String::with_capacity(1 + rest.len());
				line.push(b as char);
				line.push_str(&rest);
				debug!("frame: header {:?}", line);
				parse_header(&line)
			}
			other => Err(ScpError::UnsupportedResponse { byte: other }),
		}
	}

	/// Copy exactly `size` inbound content bytes into `out`. The stream
	/// ending early is a protocol violation.
	pub async fn copy_content<O>(&mut self, out: &mut O, size: u64) -> ScpResult<()>
	where
		O: AsyncWrite + Unpin,
	{
		let mut body = (&mut self.recv).take(size);
		let copied = tokio::io::copy(&mut body, out).await?;
		if copied != size {
			return Err(ScpError::protocol(format!(
				"stream ended after {} of {} content bytes",
				copied, size
			)));
		}
		Ok(())
	}
}


// vim: ts=4
