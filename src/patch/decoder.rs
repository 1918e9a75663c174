use crate::error::{Result, TreePatchError};
use crate::patch::PatchDocument;
use crate::patch::encoder::{ENVELOPE_FROM, SIGNATURE_SEPARATOR};
use crate::patch::path::{check_relative_path, unquote_prefix};
use crate::snapshot::{DEFAULT_MODE, FileRecord};
use regex::bytes::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::{debug, info};

static HUNK_HEADER: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@").expect("hunk header regex is valid")
});

const REJECTED_HEADERS: &[(&str, &str)] = &[
	("deleted file mode ", "block deletes a file"),
	("old mode ", "block changes the mode of an existing file"),
	("new mode ", "block changes the mode of an existing file"),
	("rename from ", "block renames a file"),
	("rename to ", "block renames a file"),
	("copy from ", "block copies a file"),
	("copy to ", "block copies a file"),
	("similarity index ", "block renames or copies a file"),
	("dissimilarity index ", "block rewrites an existing file"),
	("GIT binary patch", "binary patches are not supported"),
	("Binary files ", "binary patches are not supported"),
];

/// Parse a patch document into the files it adds, in document order.
///
/// Accepts mailbox series and plain `git diff` output as well as bare unified
/// diffs against `/dev/null`. Anything other than a pure file addition is
/// refused, as is any path that could land outside the destination.
pub fn decode(document: &PatchDocument) -> Result<Vec<FileRecord>> {
	let mut parser = Parser::new(document.as_bytes());
	let mut records = Vec::new();
	let mut seen = HashSet::new();
	let own_envelope = parser
		.peek()
		.is_some_and(|line| trim_cr(line) == ENVELOPE_FROM.as_bytes());
	let mut signed = false;

	while let Some(line) = parser.peek() {
		let start = parser.line_number();
		let record = if line.starts_with(b"diff --git ") {
			parser.git_block()?
		} else if line.starts_with(b"--- ")
			&& parser.peek_at(1).is_some_and(|next| next.starts_with(b"+++ "))
		{
			parser.unified_block()?
		} else {
			if trim_cr(line) == SIGNATURE_SEPARATOR.as_bytes() {
				signed = true;
			}
			parser.advance();
			continue;
		};
		signed = false;

		if !seen.insert(record.path.clone()) {
			return Err(TreePatchError::parse(
				start,
				format!("duplicate path `{}`", record.path),
			));
		}
		debug!(path = %record.path, bytes = record.content.len(), line = start, "decoded file");
		records.push(record);
	}

	if records.is_empty() {
		return Err(TreePatchError::parse(
			parser.line_number(),
			"no file blocks found",
		));
	}

	// Our own documents always end with a signature; without it the tail may be cut.
	if own_envelope && !signed {
		return Err(TreePatchError::parse(
			parser.line_number(),
			"truncated document: missing `-- ` signature after the last block",
		));
	}

	info!(files = records.len(), "decoded patch document");
	Ok(records)
}

struct Parser<'a> {
	lines: Vec<&'a [u8]>,
	pos: usize,
	/// The input does not end with `\n`, so its last line may be cut short.
	unterminated: bool,
}

impl<'a> Parser<'a> {
	fn new(bytes: &'a [u8]) -> Self {
		let mut lines: Vec<&[u8]> = bytes.split(|&b| b == b'\n').collect();
		let unterminated = !bytes.is_empty() && !bytes.ends_with(b"\n");
		if !unterminated {
			lines.pop();
		}
		Parser {
			lines,
			pos: 0,
			unterminated,
		}
	}

	fn at_unterminated_last_line(&self) -> bool {
		self.unterminated && self.pos + 1 == self.lines.len()
	}

	/// 1-based number of the line about to be read.
	fn line_number(&self) -> usize {
		self.pos + 1
	}

	fn peek(&self) -> Option<&'a [u8]> {
		self.lines.get(self.pos).copied()
	}

	fn peek_at(&self, offset: usize) -> Option<&'a [u8]> {
		self.lines.get(self.pos + offset).copied()
	}

	fn advance(&mut self) {
		self.pos += 1;
	}

	fn error(&self, message: impl Into<String>) -> TreePatchError {
		TreePatchError::parse(self.line_number(), message)
	}

	/// The current line as header text, without a trailing carriage return.
	fn header_text(&self) -> Result<&'a str> {
		let line = self
			.peek()
			.ok_or_else(|| self.error("unexpected end of document"))?;
		std::str::from_utf8(trim_cr(line)).map_err(|_| self.error("header line is not valid UTF-8"))
	}

	/// A block introduced by `diff --git`.
	fn git_block(&mut self) -> Result<FileRecord> {
		let header_line = self.line_number();
		let header = self.header_text()?;
		let header_path = parse_git_header(&header["diff --git ".len()..]);
		self.advance();

		let mut mode = None;
		let mut new_path = None;
		let mut content = Vec::new();

		while let Some(line) = self.peek() {
			let text = trim_cr(line);
			if text.starts_with(b"diff --git ") {
				break;
			} else if let Some(rest) = text.strip_prefix(b"new file mode ") {
				mode = Some(self.parse_mode(rest)?);
				self.advance();
			} else if text.starts_with(b"index ") {
				self.advance();
			} else if let Some((_, reason)) = REJECTED_HEADERS
				.iter()
				.find(|(prefix, _)| text.starts_with(prefix.as_bytes()))
			{
				return Err(self.error(*reason));
			} else if text.starts_with(b"--- ") {
				new_path = Some(self.file_pair()?);
				content = self.hunk()?;
				break;
			} else if text.starts_with(b"@@") {
				return Err(self.error("hunk without `---`/`+++` file header"));
			} else {
				break;
			}
		}

		if mode.is_none() && new_path.is_none() {
			return Err(TreePatchError::parse(
				header_line,
				"block does not add a new file",
			));
		}

		let path = match (new_path, header_path) {
			(Some(new), Some(header)) if new != header => {
				return Err(TreePatchError::parse(
					header_line,
					format!("block names two different paths: `{}` and `{}`", header, new),
				));
			}
			(Some(path), _) | (None, Some(path)) => path,
			(None, None) => {
				return Err(TreePatchError::parse(
					header_line,
					"cannot determine the file path",
				));
			}
		};

		checked(path, header_line).map(|path| FileRecord {
			path,
			content,
			mode: mode.unwrap_or(DEFAULT_MODE),
		})
	}

	/// A bare unified diff: `--- /dev/null` then `+++ path`, no git header.
	fn unified_block(&mut self) -> Result<FileRecord> {
		let header_line = self.line_number();
		let path = self.file_pair()?;
		let content = if self.peek().is_some_and(|line| line.starts_with(b"@@")) {
			self.hunk()?
		} else {
			Vec::new()
		};

		checked(path, header_line).map(|path| FileRecord {
			path,
			content,
			mode: DEFAULT_MODE,
		})
	}

	/// Consume a `---`/`+++` pair describing an added file; returns the new path.
	fn file_pair(&mut self) -> Result<String> {
		let old = strip_timestamp(&self.header_text()?["--- ".len()..]);
		if old != "/dev/null" {
			return Err(self.error(format!("block modifies existing file `{}`", old)));
		}
		self.advance();

		let new = self
			.header_text()
			.ok()
			.and_then(|text| text.strip_prefix("+++ "))
			.ok_or_else(|| self.error("truncated block: expected `+++` line"))?;
		let new = strip_timestamp(new);
		if new == "/dev/null" {
			return Err(self.error("block deletes a file"));
		}
		let path = parse_side(new).ok_or_else(|| self.error("malformed quoted path"))?;
		self.advance();
		Ok(path)
	}

	/// Consume the single all-added hunk of a new file.
	fn hunk(&mut self) -> Result<Vec<u8>> {
		let header = self
			.peek()
			.ok_or_else(|| self.error("truncated block: expected hunk header"))?;
		let captures = HUNK_HEADER
			.captures(header)
			.ok_or_else(|| self.error("expected hunk header"))?;
		let number = |group: usize, default: usize| match captures.get(group) {
			Some(m) => std::str::from_utf8(m.as_bytes())
				.ok()
				.and_then(|digits| digits.parse::<usize>().ok()),
			None => Some(default),
		};

		let (Some(old_start), Some(old_len), Some(new_start), Some(new_len)) =
			(number(1, 0), number(2, 1), number(3, 0), number(4, 1))
		else {
			return Err(self.error("malformed hunk header"));
		};
		if old_start != 0 || old_len != 0 {
			return Err(self.error("hunk modifies existing lines"));
		}
		if new_start != 1 || new_len == 0 {
			return Err(self.error("malformed hunk header"));
		}
		self.advance();

		let mut content = Vec::new();
		for found in 0..new_len {
			match self.peek() {
				Some(_) if self.at_unterminated_last_line() => {
					return Err(self.error("truncated block: last line has no newline"));
				}
				Some(line) if line.first() == Some(&b'+') => {
					content.extend_from_slice(&line[1..]);
					content.push(b'\n');
					self.advance();
				}
				_ => {
					return Err(self.error(format!(
						"truncated hunk: expected {} added lines, found {}",
						new_len, found
					)));
				}
			}
		}

		if self.peek().is_some_and(|line| line.starts_with(b"\\")) {
			content.pop();
			self.advance();
		}
		if self.peek().is_some_and(|line| line.starts_with(b"+")) {
			return Err(self.error("hunk has more added lines than its header declares"));
		}
		if self.peek().is_some_and(|line| line.starts_with(b"@@")) {
			return Err(self.error("more than one hunk for an added file"));
		}

		Ok(content)
	}

	/// Parse the octal mode of a `new file mode` line into permission bits.
	fn parse_mode(&self, text: &[u8]) -> Result<u32> {
		let mode = std::str::from_utf8(text)
			.ok()
			.and_then(|digits| u32::from_str_radix(digits.trim(), 8).ok())
			.ok_or_else(|| self.error("malformed file mode"))?;
		if mode & 0o170000 != 0o100000 {
			return Err(self.error(format!("not a regular file (mode {:o})", mode)));
		}
		Ok(mode & 0o777)
	}
}

/// Refuse paths that could escape the destination.
fn checked(path: String, line: usize) -> Result<String> {
	match check_relative_path(&path) {
		Ok(()) => Ok(path),
		Err(reason) => Err(TreePatchError::parse(
			line,
			format!("unsafe path `{}`: {}", path, reason),
		)),
	}
}

/// The new-side path from the remainder of a `diff --git` line.
fn parse_git_header(rest: &str) -> Option<String> {
	if rest.starts_with('"') {
		let (_, after) = unquote_prefix(rest)?;
		return parse_side(after.strip_prefix(' ')?);
	}

	// Unquoted sides are ambiguous when paths hold spaces; identical halves settle it.
	if rest.len() % 2 == 1 {
		let half = rest.len() / 2;
		if rest.as_bytes()[half] == b' ' && rest.is_char_boundary(half) {
			let (old, new) = (&rest[..half], &rest[half + 1..]);
			if old.get(2..) == new.get(2..) {
				return parse_side(new);
			}
		}
	}

	rest.split_once(" b/").map(|(_, new)| new.to_string())
}

/// Decode one side of a diff header, dropping a leading `b/`.
fn parse_side(text: &str) -> Option<String> {
	let path = if text.starts_with('"') {
		let (decoded, rest) = unquote_prefix(text)?;
		if !rest.trim().is_empty() {
			return None;
		}
		decoded
	} else {
		text.to_string()
	};
	Some(path.strip_prefix("b/").map(str::to_string).unwrap_or(path))
}

/// Drop a `\t`-separated timestamp as written by `diff -u` and svn.
fn strip_timestamp(text: &str) -> &str {
	text.split('\t').next().unwrap_or(text)
}

fn trim_cr(line: &[u8]) -> &[u8] {
	line.strip_suffix(b"\r").unwrap_or(line)
}
