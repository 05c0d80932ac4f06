//! Upload orchestration
//!
//! An upload runs the remote copy command in sink mode (`scp -t`) over a
//! fresh command channel and drives the local tree through the protocol
//! engine: pre-order traversal, one header + one ack per entry, content
//! bodies for regular files. The remote command's completion and the
//! local driver run concurrently and are joined at a single barrier; the
//! driver closes the write side as its final act so the remote command
//! can observe end-of-input.

use async_recursion::async_recursion;
use std::path::Path;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::callbacks::{TransferEvent, TransferOutcome};
use crate::config::CopyOptions;
use crate::digest;
use crate::error::{ScpError, ScpResult};
use crate::logging::*;
use crate::protocol::Protocol;
use crate::session::{self, CommandChannel, RemoteExec, SshSession};
use crate::util::{self, EntryKind};

/// Upload a local file or directory tree to `dest` on the session's host.
///
/// `dest` names the remote path the root entry should end up at; the
/// remote copy command is pointed at its parent directory and the base
/// name travels in the protocol header.
pub async fn upload_file(
	session: &SshSession,
	src: &Path,
	dest: &str,
	opts: &CopyOptions,
) -> ScpResult<()> {
	info!("upload src={:?} dest={:?}", src, dest);

	// Classified before the command is built: a directory root needs the
	// recursive flag on the remote side.
	let root = util::classify(src).await?;
	let mut flags = String::from("-tp");
	if root.kind == EntryKind::Dir {
		flags.push('r');
	}
	let command = format!("/usr/bin/scp {} {}", flags, util::remote_dir_part(dest));
	debug!("scp command: {:?}", command);

	let CommandChannel { stdin, stdout, mut child } = session.channel(&command).await?;
	let mut proto = Protocol::new(stdout, stdin);

	let transfer = async {
		let local = async {
			let res = drive_upload(&mut proto, session, src, dest, opts).await;
			if let Err(e) = proto.close_send().await {
				debug!("closing input stream failed: {}", e);
			}
			res
		};
		let (local_res, wait_res) = tokio::join!(local, child.wait());

		// The local driver's error is authoritative, whatever the remote
		// command went on to report.
		local_res?;
		let status = wait_res.map_err(ScpError::Io)?;
		if !status.success() {
			return Err(ScpError::RemoteCommand {
				status: status.code().unwrap_or(-1),
				message: String::new(),
			});
		}
		Ok(())
	};

	match opts.timeout {
		Some(limit) => {
			let res = tokio::time::timeout(limit, transfer).await;
			match res {
				Ok(res) => res,
				Err(_) => {
					if let Err(e) = child.kill().await {
						debug!("killing timed-out remote command failed: {}", e);
					}
					Err(ScpError::Timeout)
				}
			}
		}
		None => transfer.await,
	}
}

/// Drive the local side of an upload against an already-open sink:
/// initial handshake ack, then the recursive walk.
///
/// Exposed separately so the protocol dialog can be exercised against
/// in-memory streams.
pub async fn drive_upload<R, W, E>(
	proto: &mut Protocol<R, W>,
	exec: &E,
	src: &Path,
	dest: &str,
	opts: &CopyOptions,
) -> ScpResult<()>
where
	R: AsyncRead + Unpin + Send,
	W: AsyncWrite + Unpin + Send,
	E: RemoteExec,
{
	proto.read_ack("start").await?;
	upload_entry(proto, exec, src, dest, opts).await
}

#[async_recursion]
async fn upload_entry<R, W, E>(
	proto: &mut Protocol<R, W>,
	exec: &E,
	src: &Path,
	dest: &str,
	opts: &CopyOptions,
) -> ScpResult<()>
where
	R: AsyncRead + Unpin + Send,
	W: AsyncWrite + Unpin + Send,
	E: RemoteExec,
{
	let entry = util::classify(src).await?;
	let src_label = src.to_string_lossy();

	match entry.kind {
		EntryKind::Dir => {
			opts.trigger(TransferEvent::BeforeSendDir, &src_label, dest, &TransferOutcome::ok());
			let res = async {
				proto.send_dir_start(entry.mode, &entry.file_name).await?;
				let mut children = tokio::fs::read_dir(src).await?;
				while let Some(child) = children.next_entry().await? {
					let name = child.file_name().to_string_lossy().into_owned();
					let child_dest = util::join_remote(dest, &name);
					upload_entry(proto, exec, &child.path(), &child_dest, opts).await?;
				}
				proto.send_dir_end().await
			}
			.await;
			opts.trigger(
				TransferEvent::AfterSendDir,
				&src_label,
				dest,
				&TransferOutcome::from_result(&res),
			);
			res
		}
		EntryKind::Symlink if opts.symbolic_link => {
			opts.trigger(TransferEvent::BeforeSendFile, &src_label, dest, &TransferOutcome::ok());
			let res = replicate_symlink(exec, src, dest).await;
			match res {
				Ok(changed) => {
					opts.trigger(
						TransferEvent::AfterSendFile,
						&src_label,
						dest,
						&TransferOutcome { skipped: !changed, error: None },
					);
					Ok(())
				}
				Err(e) => {
					opts.trigger(
						TransferEvent::AfterSendFile,
						&src_label,
						dest,
						&TransferOutcome::failed(&e),
					);
					Err(e)
				}
			}
		}
		// Regular file, or a symlink being followed.
		_ => {
			opts.trigger(TransferEvent::BeforeSendFile, &src_label, dest, &TransferOutcome::ok());
			let res = send_regular(proto, exec, &entry, src, dest, opts).await;
			match res {
				Ok(skipped) => {
					opts.trigger(
						TransferEvent::AfterSendFile,
						&src_label,
						dest,
						&TransferOutcome { skipped, error: None },
					);
					Ok(())
				}
				Err(e) => {
					opts.trigger(
						TransferEvent::AfterSendFile,
						&src_label,
						dest,
						&TransferOutcome::failed(&e),
					);
					Err(e)
				}
			}
		}
	}
}

async fn replicate_symlink<E>(exec: &E, src: &Path, dest: &str) -> ScpResult<bool>
where
	E: RemoteExec,
{
	let target = tokio::fs::read_link(src).await?;
	debug!("is_link={:?} -> {:?}", src, target);
	session::create_symlink(exec, &target.to_string_lossy(), dest).await
}

/// Send one regular file, applying the skip policy first. Returns true
/// when the transfer was elided.
async fn send_regular<R, W, E>(
	proto: &mut Protocol<R, W>,
	exec: &E,
	entry: &util::LocalEntry,
	src: &Path,
	dest: &str,
	opts: &CopyOptions,
) -> ScpResult<bool>
where
	R: AsyncRead + Unpin,
	W: AsyncWrite + Unpin,
	E: RemoteExec,
{
	if opts.skip_equal_digest && digest::should_skip(exec, src, dest).await {
		debug!("skip {:?}: digest matches {:?}", src, dest);
		return Ok(true);
	}

	// When a symlink is followed its own lstat size would desynchronize
	// the stream; the pointed-to file supplies mode and size.
	let (mode, size) = if entry.kind == EntryKind::Symlink {
		let target = util::stat_entry(src).await?;
		(target.mode, target.size)
	} else {
		(entry.mode, entry.size)
	};

	let mut file = tokio::fs::File::open(src).await?;
	proto.send_file(mode, size, &entry.file_name, &mut file).await?;
	Ok(false)
}

// vim: ts=4
