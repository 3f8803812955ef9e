//! Strips `//` line comments and `/* */` block comments that fall outside
//! string literals, so that tool-server descriptors can be written as
//! JSON-with-comments while still parsing as plain JSON underneath.

/// Returns `source` with all comments outside string literals removed,
/// replaced with spaces (byte offsets of remaining content are preserved,
/// which is convenient for error messages but not otherwise load-bearing).
pub fn strip_comments(source: &str) -> String {
	let mut out = String::with_capacity(source.len());
	let mut chars = source.char_indices().peekable();
	let mut in_string = false;
	let mut escaped = false;

	while let Some((_, c)) = chars.next() {
		if in_string {
			out.push(c);
			if escaped {
				escaped = false;
			} else if c == '\\' {
				escaped = true;
			} else if c == '"' {
				in_string = false;
			}
			continue;
		}

		match c {
			'"' => {
				in_string = true;
				out.push(c);
			}
			'/' if matches!(chars.peek(), Some((_, '/'))) => {
				chars.next();
				for (_, c2) in chars.by_ref() {
					if c2 == '\n' {
						out.push('\n');
						break;
					}
				}
			}
			'/' if matches!(chars.peek(), Some((_, '*'))) => {
				chars.next();
				let mut prev = '\0';
				for (_, c2) in chars.by_ref() {
					if c2 == '\n' {
						out.push('\n');
					}
					if prev == '*' && c2 == '/' {
						break;
					}
					prev = c2;
				}
			}
			_ => out.push(c),
		}
	}

	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn strips_line_comments() {
		let src = "{\n  \"a\": 1, // trailing\n  \"b\": 2\n}";
		let stripped = strip_comments(src);
		let value: serde_json::Value = serde_json::from_str(&stripped).unwrap();
		assert_eq!(value["a"], 1);
		assert_eq!(value["b"], 2);
	}

	#[test]
	fn strips_block_comments() {
		let src = "{ /* comment\nspanning lines */ \"a\": 1 }";
		let stripped = strip_comments(src);
		let value: serde_json::Value = serde_json::from_str(&stripped).unwrap();
		assert_eq!(value["a"], 1);
	}

	#[test]
	fn leaves_slashes_inside_strings_alone() {
		let src = r#"{ "url": "http://example.com/a//b" }"#;
		let stripped = strip_comments(src);
		let value: serde_json::Value = serde_json::from_str(&stripped).unwrap();
		assert_eq!(value["url"], "http://example.com/a//b");
	}
}
