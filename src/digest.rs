//! Digest-based skip policy
//!
//! Before a regular file is uploaded, its local MD5 can be compared with
//! the digest of the remote copy (`md5sum` over the session). A match
//! elides the transfer. Every failure mode (unreadable local file,
//! missing remote file, command error) degrades to "not equal", so the
//! policy can only ever skip work, never abort a transfer.

use md5::{Digest, Md5};
use std::path::Path;

use crate::error::{ScpError, ScpResult};
use crate::logging::*;
use crate::session::RemoteExec;

/// Hex MD5 of a local file's content
pub async fn local_file_md5(path: &Path) -> ScpResult<String> {
	let content = tokio::fs::read(path).await?;
	let mut hasher = Md5::new();
	hasher.update(&content);
	Ok(hex::encode(hasher.finalize()))
}

/// Hex MD5 of a remote file's content, via `md5sum` on the session
pub async fn remote_file_md5<E>(exec: &E, path: &str) -> ScpResult<String>
where
	E: RemoteExec + ?Sized,
{
	let output = exec.run(&format!("md5sum {}", path)).await?;
	output
		.split_whitespace()
		.next()
		.map(|h| h.to_string())
		.ok_or_else(|| ScpError::protocol(format!("empty md5sum output for {}", path)))
}

/// Decide whether the upload of `src` to `dest` can be elided.
pub async fn should_skip<E>(exec: &E, src: &Path, dest: &str) -> bool
where
	E: RemoteExec + ?Sized,
{
	let local = match local_file_md5(src).await {
		Ok(h) => h,
		Err(e) => {
			debug!("skip check: local digest of {:?} failed: {}", src, e);
			return false;
		}
	};
	let remote = match remote_file_md5(exec, dest).await {
		Ok(h) => h,
		Err(e) => {
			debug!("skip check: remote digest of {:?} failed: {}", dest, e);
			return false;
		}
	};

	!remote.is_empty() && local == remote
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;
	use tempfile::TempDir;

	struct FixedExec {
		output: Option<String>,
	}

	#[async_trait]
	impl RemoteExec for FixedExec {
		async fn run(&self, _command: &str) -> ScpResult<String> {
			match &self.output {
				Some(out) => Ok(out.clone()),
				None => Err(ScpError::RemoteCommand {
					status: 1,
					message: "md5sum: No such file or directory".to_string(),
				}),
			}
		}
	}

	#[tokio::test]
	async fn test_local_md5_known_vector() {
		let dir = TempDir::new().unwrap();
		let file = dir.path().join("hello.txt");
		std::fs::write(&file, b"hello").unwrap();
		let digest = local_file_md5(&file).await.unwrap();
		assert_eq!(digest, "5d41402abc4b2a76b9719d911017c592");
	}

	#[tokio::test]
	async fn test_skip_on_equal_digest() {
		let dir = TempDir::new().unwrap();
		let file = dir.path().join("hello.txt");
		std::fs::write(&file, b"hello").unwrap();

		let exec = FixedExec {
			output: Some("5d41402abc4b2a76b9719d911017c592  /remote/hello.txt\n".to_string()),
		};
		assert!(should_skip(&exec, &file, "/remote/hello.txt").await);
	}

	#[tokio::test]
	async fn test_transfer_on_different_digest() {
		let dir = TempDir::new().unwrap();
		let file = dir.path().join("hello.txt");
		std::fs::write(&file, b"hello world").unwrap();

		let exec = FixedExec {
			output: Some("5d41402abc4b2a76b9719d911017c592  /remote/hello.txt\n".to_string()),
		};
		assert!(!should_skip(&exec, &file, "/remote/hello.txt").await);
	}

	#[tokio::test]
	async fn test_fail_open_when_remote_digest_unobtainable() {
		let dir = TempDir::new().unwrap();
		let file = dir.path().join("hello.txt");
		std::fs::write(&file, b"hello").unwrap();

		let exec = FixedExec { output: None };
		assert!(!should_skip(&exec, &file, "/remote/hello.txt").await);
	}

	#[tokio::test]
	async fn test_fail_open_when_local_missing() {
		let exec = FixedExec {
			output: Some("5d41402abc4b2a76b9719d911017c592  x\n".to_string()),
		};
		assert!(!should_skip(&exec, Path::new("/nonexistent/file"), "x").await);
	}
}

// vim: ts=4
