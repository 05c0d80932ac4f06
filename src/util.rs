//! Local file-system classification and remote path helpers

use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use crate::error::ScpResult;

/// Kind of a local file-system node, classified without following links
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
	File,
	Dir,
	Symlink,
}

/// One local node about to cross the wire
#[derive(Debug, Clone)]
pub struct LocalEntry {
	pub kind: EntryKind,
	/// Raw `st_mode` bits; masked to the permission portion at framing time
	pub mode: u32,
	/// Byte size; meaningful for regular files only
	pub size: u64,
	pub file_name: String,
}

/// Classify a path lstat-style: symlinks are reported as symlinks, never
/// followed.
pub async fn classify(path: &Path) -> ScpResult<LocalEntry> {
	let meta = tokio::fs::symlink_metadata(path).await?;
	let file_type = meta.file_type();
	let kind = if file_type.is_dir() {
		EntryKind::Dir
	} else if file_type.is_symlink() {
		EntryKind::Symlink
	} else {
		EntryKind::File
	};

	Ok(LocalEntry {
		kind,
		mode: meta.permissions().mode(),
		size: meta.len(),
		file_name: base_name(path),
	})
}

/// Classify a path following symlinks. Used when link replication is off
/// and the pointed-to file's metadata must accompany its content.
pub async fn stat_entry(path: &Path) -> ScpResult<LocalEntry> {
	let meta = tokio::fs::metadata(path).await?;
	let kind = if meta.is_dir() { EntryKind::Dir } else { EntryKind::File };

	Ok(LocalEntry {
		kind,
		mode: meta.permissions().mode(),
		size: meta.len(),
		file_name: base_name(path),
	})
}

/// Final path component as a string; "." for paths without one
pub fn base_name(path: &Path) -> String {
	path.file_name()
		.map(|n| n.to_string_lossy().into_owned())
		.unwrap_or_else(|| String::from("."))
}

/// Join a remote path and a child name without doubling separators
pub fn join_remote(parent: &str, name: &str) -> String {
	if parent.ends_with('/') {
		format!("{}{}", parent, name)
	} else {
		format!("{}/{}", parent, name)
	}
}

/// Directory portion of a remote destination, up to and including the
/// final separator. The remote copy command is pointed at this directory;
/// base names travel in the protocol headers.
pub fn remote_dir_part(dest: &str) -> String {
	match dest.rfind('/') {
		Some(idx) => dest[..idx + 1].to_string(),
		None => String::from("."),
	}
}


// vim: ts=4
