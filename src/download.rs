//! Download orchestration (sink direction)
//!
//! A download runs the remote copy command in source mode (`scp -f`) and
//! plays the sink's half of the dialog: write one ok byte to request the
//! first item, then loop reading frames (timestamp preludes, file
//! headers with exactly the declared content bytes plus the sender's
//! terminal status byte, directory starts and ends), acknowledging each
//! one and reconstructing the tree locally. The concurrency shape is the
//! same as upload: driver and remote command joined at one barrier, the
//! write side closed as the driver's final act.

use filetime::FileTime;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::callbacks::{TransferEvent, TransferOutcome};
use crate::config::CopyOptions;
use crate::error::{ScpError, ScpResult};
use crate::logging::*;
use crate::protocol::{Frame, Protocol};
use crate::session::{CommandChannel, SshSession};
use crate::util;

/// Download a remote file or directory tree to `dest`.
///
/// When `dest` is an existing directory the received root lands under it
/// by name; otherwise `dest` itself is the target path.
pub async fn download_file(
	session: &SshSession,
	src: &str,
	dest: &Path,
	opts: &CopyOptions,
) -> ScpResult<()> {
	info!("download src={:?} dest={:?}", src, dest);

	// The source's kind is unknowable without an extra round trip, so
	// the recursive flag is always passed; source mode accepts it for
	// plain files too.
	let command = format!("/usr/bin/scp -fpr {}", src);
	debug!("scp command: {:?}", command);

	let CommandChannel { stdin, stdout, mut child } = session.channel(&command).await?;
	let mut proto = Protocol::new(stdout, stdin);

	let transfer = async {
		let local = async {
			let res = drive_download(&mut proto, src, dest, opts).await;
			if let Err(e) = proto.close_send().await {
				debug!("closing input stream failed: {}", e);
			}
			res
		};
		let (local_res, wait_res) = tokio::join!(local, child.wait());

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

/// One open directory frame on the way down
struct DirLevel {
	local: PathBuf,
	remote: String,
	times: Option<(i64, i64)>,
}

/// Drive the sink side of a download against an already-open source.
///
/// Exposed separately so the protocol dialog can be exercised against
/// in-memory streams.
pub async fn drive_download<R, W>(
	proto: &mut Protocol<R, W>,
	src: &str,
	dest: &Path,
	opts: &CopyOptions,
) -> ScpResult<()>
where
	R: AsyncRead + Unpin,
	W: AsyncWrite + Unpin,
{
	// Request the first item.
	proto.write_ok().await?;

	let mut stack: Vec<DirLevel> = Vec::new();
	// Timestamps announced by a T frame apply to the next C or D.
	let mut pending_times: Option<(i64, i64)> = None;

	loop {
		let frame = proto.read_frame().await?;
		match frame {
			Frame::Eof => {
				if !stack.is_empty() {
					return Err(ScpError::protocol(format!(
						"stream ended with {} open directories",
						stack.len()
					)));
				}
				break;
			}
			Frame::Ok => continue,
			Frame::Time { mtime, atime } => {
				pending_times = Some((mtime, atime));
				proto.write_ok().await?;
			}
			Frame::DirStart { mode, name } => {
				let local = target_path(dest, &stack, &name).await?;
				let remote = remote_label(src, &stack, &name);
				opts.trigger(
					TransferEvent::BeforeRecvDir,
					&remote,
					&local.to_string_lossy(),
					&TransferOutcome::ok(),
				);
				debug!("recv_dir start {:?} mode={:04o}", local, mode & 0o777);
				match tokio::fs::create_dir(&local).await {
					Ok(()) => {}
					Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
					Err(e) => return Err(e.into()),
				}
				tokio::fs::set_permissions(
					&local,
					std::fs::Permissions::from_mode(mode & 0o777),
				)
				.await?;
				stack.push(DirLevel { local, remote, times: pending_times.take() });
				proto.write_ok().await?;
			}
			Frame::DirEnd => {
				let level = stack.pop().ok_or_else(|| {
					ScpError::protocol("directory end without a matching start")
				})?;
				debug!("recv_dir end {:?}", level.local);
				// Timestamps go on last, after the contents stopped
				// touching the directory.
				if let Some((mtime, atime)) = level.times {
					apply_times(&level.local, mtime, atime)?;
				}
				proto.write_ok().await?;
				opts.trigger(
					TransferEvent::AfterRecvDir,
					&level.remote,
					&level.local.to_string_lossy(),
					&TransferOutcome::ok(),
				);
			}
			Frame::File { mode, size, name } => {
				let local = target_path(dest, &stack, &name).await?;
				let remote = remote_label(src, &stack, &name);
				let local_label = local.to_string_lossy().into_owned();
				opts.trigger(
					TransferEvent::BeforeRecvFile,
					&remote,
					&local_label,
					&TransferOutcome::ok(),
				);
				let times = pending_times.take();
				let res = receive_file(proto, &local, mode, size, times).await;
				opts.trigger(
					TransferEvent::AfterRecvFile,
					&remote,
					&local_label,
					&TransferOutcome::from_result(&res),
				);
				res?;
			}
		}
	}

	Ok(())
}

/// Receive one file body: ack the header, take exactly `size` bytes,
/// read the sender's terminal status byte, confirm with a final ack.
async fn receive_file<R, W>(
	proto: &mut Protocol<R, W>,
	path: &Path,
	mode: u32,
	size: u64,
	times: Option<(i64, i64)>,
) -> ScpResult<()>
where
	R: AsyncRead + Unpin,
	W: AsyncWrite + Unpin,
{
	debug!("recv_file {:?} size={} mode={:04o}", path, size, mode & 0o777);
	proto.write_ok().await?;

	let mut file = tokio::fs::File::create(path).await?;
	proto.copy_content(&mut file, size).await?;
	file.flush().await?;
	drop(file);

	tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode & 0o777)).await?;
	if let Some((mtime, atime)) = times {
		apply_times(path, mtime, atime)?;
	}

	// The sender's end-of-content sentinel doubles as its status for
	// this file.
	proto.read_ack("recv-file-end").await?;
	proto.write_ok().await
}

fn apply_times(path: &Path, mtime: i64, atime: i64) -> ScpResult<()> {
	filetime::set_file_times(
		path,
		FileTime::from_unix_time(atime, 0),
		FileTime::from_unix_time(mtime, 0),
	)?;
	Ok(())
}

/// Where an inbound entry lands locally. Inside an open directory frame
/// that directory decides; for the root entry an existing directory
/// destination keeps the remote name, anything else is taken literally.
async fn target_path(dest: &Path, stack: &[DirLevel], name: &str) -> ScpResult<PathBuf> {
	check_name(name)?;
	match stack.last() {
		Some(level) => Ok(level.local.join(name)),
		None => match tokio::fs::metadata(dest).await {
			Ok(meta) if meta.is_dir() => Ok(dest.join(name)),
			_ => Ok(dest.to_path_buf()),
		},
	}
}

fn remote_label(src: &str, stack: &[DirLevel], name: &str) -> String {
	match stack.last() {
		Some(level) => util::join_remote(&level.remote, name),
		None => src.to_string(),
	}
}

/// Header names walk straight into local paths, so anything that could
/// escape the destination is rejected outright.
fn check_name(name: &str) -> ScpResult<()> {
	if name.is_empty() || name == "." || name == ".." || name.contains('/') {
		return Err(ScpError::protocol(format!("unsafe entry name in header: {:?}", name)));
	}
	Ok(())
}


// vim: ts=4
