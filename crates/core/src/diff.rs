//! Diff signature of two response bodies.
//!
//! Bodies are compared as sequences of tokens split at word boundaries: a run
//! of word characters (alphanumerics and `_`) or a run of anything else. A
//! varying word such as a reflected random path drops out whole instead of
//! leaving behind the characters it happens to share with another one.

use std::collections::HashSet;

use similar::{Algorithm, DiffOp, capture_diff_slices};

fn is_word(c: char) -> bool {
	c.is_alphanumeric() || c == '_'
}

/// Splits `text` at every word boundary. Concatenating the tokens gives back
/// `text`.
pub fn tokens(text: &str) -> Vec<&str> {
	let mut out = Vec::new();
	let mut start = 0;
	let mut word = None;
	for (at, c) in text.char_indices() {
		let is = is_word(c);
		if word.is_some_and(|prev| prev != is) {
			out.push(&text[start..at]);
			start = at;
		}
		word = Some(is);
	}
	if start < text.len() {
		out.push(&text[start..]);
	}
	out
}

/// Tokens of `a` that also appear in `b`, in order, as picked by a Myers diff.
///
/// Tokens of `b` that never occur in `a` cannot be part of any common
/// subsequence and are dropped before diffing, so a large body with little in
/// common with `a` stays cheap to compare.
pub fn common_tokens<'a>(a: &[&'a str], b: &[&str]) -> Vec<&'a str> {
	let known: HashSet<&str> = a.iter().copied().collect();
	let b: Vec<&str> = b.iter().copied().filter(|token| known.contains(token)).collect();

	let mut common = Vec::new();
	for op in capture_diff_slices(Algorithm::Myers, a, &b) {
		if let DiffOp::Equal { old_index, len, .. } = op {
			common.extend_from_slice(&a[old_index..old_index + len]);
		}
	}
	common
}

/// Whether `needle` occurs in `haystack` in order, not necessarily contiguously.
pub fn is_subsequence<N: AsRef<str>>(needle: &[N], haystack: &[&str]) -> bool {
	let mut rest = haystack.iter();
	needle.iter().all(|wanted| rest.any(|token| *token == wanted.as_ref()))
}

/// Returns the tokens `a` and `b` have in common, in order, joined back together.
///
/// Everything that differs between the two bodies (reflected tokens,
/// timestamps, the requested path) is dropped; the shared page chrome is kept.
pub fn signature(a: &str, b: &str) -> String {
	common_tokens(&tokens(a), &tokens(b)).concat()
}
