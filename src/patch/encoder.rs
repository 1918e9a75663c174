use crate::error::{Result, TreePatchError};
use crate::patch::PatchDocument;
use crate::patch::path::quote_path;
use crate::snapshot::{FileRecord, Snapshot};
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Mailbox separator line, with the fixed placeholder date `git format-patch` uses.
pub(crate) const ENVELOPE_FROM: &str = "From 0000000000000000000000000000000000000000 Mon Sep 17 00:00:00 2001";

pub const NO_NEWLINE_MARKER: &str = "\\ No newline at end of file";

/// Line that opens the signature closing every generated document.
pub(crate) const SIGNATURE_SEPARATOR: &str = "-- ";

/// Render a snapshot as one synthetic commit in mailbox format.
///
/// Output depends only on the snapshot, so encoding the same snapshot twice
/// yields identical bytes.
pub fn encode(snapshot: &Snapshot) -> PatchDocument {
	let mut out = Vec::new();
	let identity = snapshot.identity();
	let insertions: usize = snapshot
		.records()
		.iter()
		.map(|record| line_count(&record.content))
		.sum();

	push_line(&mut out, ENVELOPE_FROM);
	push_line(
		&mut out,
		&format!("From: {} <{}>", identity.name, identity.email),
	);
	push_line(&mut out, &format!("Date: {}", identity.date));
	push_line(
		&mut out,
		&format!(
			"Subject: [PATCH] Add {}",
			plural(snapshot.len(), "file", "files")
		),
	);
	push_line(&mut out, "");
	push_line(&mut out, "---");
	push_line(&mut out, &summary_line(snapshot.len(), insertions));
	push_line(&mut out, "");

	for record in snapshot.records() {
		encode_record(&mut out, record);
	}

	push_line(&mut out, SIGNATURE_SEPARATOR);
	push_line(&mut out, &format!("treepatch {}", env!("CARGO_PKG_VERSION")));
	push_line(&mut out, "");

	PatchDocument::from_bytes(out)
}

/// Write one self-contained "new file" block.
fn encode_record(out: &mut Vec<u8>, record: &FileRecord) {
	let old = quote_path(&format!("a/{}", record.path)).into_owned();
	let new = quote_path(&format!("b/{}", record.path)).into_owned();

	push_line(out, &format!("diff --git {} {}", old, new));
	push_line(out, &format!("new file mode {:o}", 0o100000 | record.mode));

	let lines = line_count(&record.content);
	if lines == 0 {
		return;
	}

	push_line(out, "--- /dev/null");
	push_line(out, &format!("+++ {}", new));
	if lines == 1 {
		push_line(out, "@@ -0,0 +1 @@");
	} else {
		push_line(out, &format!("@@ -0,0 +1,{} @@", lines));
	}

	for line in record.content.split_inclusive(|&b| b == b'\n') {
		out.push(b'+');
		out.extend_from_slice(line);
	}
	if !record.content.ends_with(b"\n") {
		out.push(b'\n');
		push_line(out, NO_NEWLINE_MARKER);
	}
}

/// Number of added lines needed to carry `content`.
fn line_count(content: &[u8]) -> usize {
	if content.is_empty() {
		return 0;
	}
	let newlines = content.iter().filter(|&&b| b == b'\n').count();
	if content.ends_with(b"\n") {
		newlines
	} else {
		newlines + 1
	}
}

fn summary_line(files: usize, insertions: usize) -> String {
	let changed = format!(" {} changed", plural(files, "file", "files"));
	if insertions == 0 {
		changed
	} else {
		format!(
			"{}, {}(+)",
			changed,
			plural(insertions, "insertion", "insertions")
		)
	}
}

fn plural(count: usize, one: &str, many: &str) -> String {
	if count == 1 {
		format!("{} {}", count, one)
	} else {
		format!("{} {}", count, many)
	}
}

fn push_line(out: &mut Vec<u8>, line: &str) {
	out.extend_from_slice(line.as_bytes());
	out.push(b'\n');
}

/// Write a document to `output` through a temporary file in the same directory,
/// renamed into place only once fully written.
pub fn write_document(document: &PatchDocument, output: &Path) -> Result<()> {
	let encode_error = |source| TreePatchError::EncodeError {
		path: output.to_path_buf(),
		source,
	};

	let parent = match output.parent() {
		Some(parent) if !parent.as_os_str().is_empty() => parent,
		_ => Path::new("."),
	};

	let mut staged = tempfile::Builder::new()
		.prefix(".treepatch-")
		.suffix(".tmp")
		.tempfile_in(parent)
		.map_err(encode_error)?;
	staged
		.write_all(document.as_bytes())
		.map_err(encode_error)?;
	staged.as_file().sync_all().map_err(encode_error)?;
	set_document_mode(staged.as_file()).map_err(encode_error)?;
	staged
		.persist(output)
		.map_err(|e| encode_error(e.error))?;

	info!(path = %output.display(), bytes = document.as_bytes().len(), "wrote patch document");
	Ok(())
}

/// Temporary files start out owner-only; give the document the usual file mode.
#[cfg(unix)]
fn set_document_mode(file: &std::fs::File) -> std::io::Result<()> {
	use std::os::unix::fs::PermissionsExt;
	file.set_permissions(std::fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn set_document_mode(_file: &std::fs::File) -> std::io::Result<()> {
	Ok(())
}
