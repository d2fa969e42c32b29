//! Escaping of paths embedded in script text.
//!
//! The interpreter treats `[`, `]` and (in bareword position) spaces specially;
//! a backtick escapes them.

use std::borrow::Cow;
use std::sync::LazyLock;

use fancy_regex::Regex;

static UNESCAPED_OPEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?<!`)\[").expect("valid regex"));
static UNESCAPED_CLOSE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?<!`)\]").expect("valid regex"));
static UNESCAPED_SPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?<!`) ").expect("valid regex"));
static ESCAPE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`(?=[\[\] ])").expect("valid regex"));

/// Escapes `[` and `]` (and spaces when `escape_spaces`) that are not already escaped.
pub fn escape_path(path: &str, escape_spaces: bool) -> String {
	let escaped = UNESCAPED_OPEN.replace_all(path, "`[");
	let escaped = UNESCAPED_CLOSE.replace_all(&escaped, "`]").into_owned();
	if escape_spaces {
		UNESCAPED_SPACE.replace_all(&escaped, "` ").into_owned()
	} else {
		escaped
	}
}

/// Removes backticks escaping `[`, `]` or spaces.
pub fn unescape_path(path: &str) -> Cow<'_, str> {
	ESCAPE.replace_all(path, "")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn escapes_brackets_and_optionally_spaces() {
		assert_eq!(escape_path("/tmp/a [1]/s.ps1", false), "/tmp/a `[1`]/s.ps1");
		assert_eq!(escape_path("/tmp/a [1]/s.ps1", true), "/tmp/a` `[1`]/s.ps1");
		assert_eq!(escape_path("/plain/path.ps1", true), "/plain/path.ps1");
	}

	#[test]
	fn already_escaped_characters_are_left_alone() {
		assert_eq!(escape_path("/tmp/a` `[1]", true), "/tmp/a` `[1`]");
	}

	#[test]
	fn unescape_reverses_escape() {
		for path in ["C:\\Users\\me\\My Scripts\\[x].ps1", "/srv/a]b[c", "no-specials"] {
			assert_eq!(unescape_path(&escape_path(path, true)), path);
		}
		assert_eq!(unescape_path("keep`n"), "keep`n");
	}
}
