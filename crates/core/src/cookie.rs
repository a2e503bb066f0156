//! Cookie header strings and Netscape cookie-jar files.

use std::path::Path;

use indexmap::IndexMap;
use tracing::warn;

use crate::error::Result;
use crate::request::CookieJar;

/// Cookies parsed from a header string; a piece without `=` has no value.
pub type ParsedCookies = IndexMap<String, Option<String>>;

/// Renders cookies as `name=value;` pairs in iteration order.
pub fn cookie_header_string<'a, I>(cookies: I) -> String
where
	I: IntoIterator<Item = (&'a String, &'a String)>,
{
	cookies.into_iter().fold(String::new(), |mut out, (name, value)| {
		out.push_str(name);
		out.push('=');
		out.push_str(value);
		out.push(';');
		out
	})
}

/// Splits a cookie header string back into name/value pairs.
///
/// Pieces are separated by `;` and split on their first `=`. Whitespace around
/// names is dropped and empty pieces are skipped, so `"a=1; b=2"` and
/// `"a=1;b=2;"` parse the same. Later duplicates win.
pub fn parse_cookie_header_string(header: &str) -> ParsedCookies {
	let mut cookies = ParsedCookies::new();
	for piece in header.split(';') {
		if piece.trim().is_empty() {
			continue;
		}
		match piece.split_once('=') {
			Some((name, value)) => {
				cookies.insert(name.trim().to_string(), Some(value.to_string()));
			}
			None => {
				cookies.insert(piece.trim().to_string(), None);
			}
		}
	}
	cookies
}

/// Flattens parsed cookies into a jar, rendering missing values as empty.
pub fn into_jar(parsed: ParsedCookies) -> CookieJar {
	parsed.into_iter().map(|(name, value)| (name, value.unwrap_or_default())).collect()
}

/// Parses Netscape cookie-file content into a name/value jar.
///
/// Blank lines and lines starting with `#` are skipped. The remaining lines are
/// tab separated; the second-to-last field is the name and the last is the
/// value. Later lines override earlier ones.
pub fn parse_cookie_jar(content: &str) -> CookieJar {
	let mut jar = CookieJar::new();
	for (index, line) in content.lines().enumerate() {
		let line = line.trim();
		if line.is_empty() || line.starts_with('#') {
			continue;
		}

		let fields: Vec<&str> = line.split('\t').collect();
		let [.., name, value] = fields.as_slice() else {
			warn!(target = "probe.session", line = index + 1, "skipping cookie jar line without name and value");
			continue;
		};
		jar.insert((*name).to_string(), (*value).to_string());
	}
	jar
}

/// Reads and parses a Netscape cookie file.
pub fn parse_cookie_jar_file(path: &Path) -> Result<CookieJar> {
	let content = std::fs::read_to_string(path)?;
	Ok(parse_cookie_jar(&content))
}
