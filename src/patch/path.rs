use std::borrow::Cow;

/// Quote a diff header path the way git does when it holds `"`, `\` or control
/// characters. Other paths are returned untouched.
pub fn quote_path(path: &str) -> Cow<'_, str> {
	if !path.chars().any(|c| c == '"' || c == '\\' || c.is_ascii_control()) {
		return Cow::Borrowed(path);
	}

	let mut quoted = String::with_capacity(path.len() + 2);
	quoted.push('"');
	for c in path.chars() {
		match c {
			'"' => quoted.push_str("\\\""),
			'\\' => quoted.push_str("\\\\"),
			'\t' => quoted.push_str("\\t"),
			'\n' => quoted.push_str("\\n"),
			'\r' => quoted.push_str("\\r"),
			c if c.is_ascii_control() => quoted.push_str(&format!("\\{:03o}", c as u8)),
			c => quoted.push(c),
		}
	}
	quoted.push('"');
	Cow::Owned(quoted)
}

/// Parse a git-quoted string at the start of `input`.
///
/// Returns the decoded text and whatever follows the closing quote, or `None` if
/// `input` does not start with a well-formed quoted string.
pub fn unquote_prefix(input: &str) -> Option<(String, &str)> {
	let body = input.strip_prefix('"')?;
	let bytes = body.as_bytes();
	let mut decoded = Vec::with_capacity(bytes.len());
	let mut i = 0;

	while i < bytes.len() {
		match bytes[i] {
			b'"' => {
				let text = String::from_utf8(decoded).ok()?;
				return Some((text, &body[i + 1..]));
			}
			b'\\' => {
				let escaped = *bytes.get(i + 1)?;
				i += 2;
				let byte = match escaped {
					b'a' => 0x07,
					b'b' => 0x08,
					b't' => b'\t',
					b'n' => b'\n',
					b'v' => 0x0b,
					b'f' => 0x0c,
					b'r' => b'\r',
					b'"' => b'"',
					b'\\' => b'\\',
					b'0'..=b'3' => {
						let digits = bytes.get(i - 1..i + 2)?;
						if !digits.iter().all(|d| (b'0'..=b'7').contains(d)) {
							return None;
						}
						i += 2;
						digits.iter().fold(0u8, |acc, d| (acc << 3) | (d - b'0'))
					}
					_ => return None,
				};
				decoded.push(byte);
			}
			other => {
				decoded.push(other);
				i += 1;
			}
		}
	}

	None
}

/// Check that a patch path stays inside whatever directory it is applied to.
///
/// Returns the reason the path is refused.
pub fn check_relative_path(path: &str) -> Result<(), &'static str> {
	if path.is_empty() {
		return Err("empty path");
	}
	if path.starts_with('/') {
		return Err("absolute path");
	}
	let bytes = path.as_bytes();
	if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
		return Err("absolute path");
	}
	if path.contains('\\') {
		return Err("backslash in path");
	}
	if path.contains('\0') {
		return Err("NUL byte in path");
	}

	for segment in path.split('/') {
		match segment {
			"" => return Err("empty path segment"),
			"." => return Err("`.` segment in path"),
			".." => return Err("path escapes the destination root"),
			_ => {}
		}
	}

	Ok(())
}
