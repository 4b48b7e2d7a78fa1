//! Token patterns written for Python's `re` module.
//!
//! Python's `\w` is letters, numbers and `_` (`str.isalnum()`), while the
//! regex crate's `\w` also takes in combining marks and connector
//! punctuation. Patterns are rewritten so `\w`, `\W` and edge `\b` follow
//! the Python classes.

use anyhow::{Context, Result};
use regex::Regex;

const WORD_CLASS: &str = r"\p{L}\p{N}_";

#[derive(Debug, Clone)]
pub struct TokenPattern {
    regex: Regex,
    word: Regex,
    leading_boundary: bool,
    trailing_boundary: bool,
}

impl TokenPattern {
    pub fn new(pattern: &str) -> Result<Self> {
        let translated = translate(pattern);
        let regex = Regex::new(&translated.body)
            .with_context(|| format!("invalid token_pattern {pattern:?}"))?;
        let word = Regex::new(&format!("^[{WORD_CLASS}]$"))?;
        Ok(Self {
            regex,
            word,
            leading_boundary: translated.leading_boundary,
            trailing_boundary: translated.trailing_boundary,
        })
    }

    fn is_word(&self, c: Option<char>) -> bool {
        let mut buf = [0u8; 4];
        c.is_some_and(|c| self.word.is_match(c.encode_utf8(&mut buf)))
    }

    fn at_boundaries(&self, text: &str, start: usize, end: usize) -> bool {
        let first = text[start..end].chars().next();
        let last = text[start..end].chars().next_back();
        let before = text[..start].chars().next_back();
        let after = text[end..].chars().next();

        (!self.leading_boundary || self.is_word(before) != self.is_word(first))
            && (!self.trailing_boundary || self.is_word(last) != self.is_word(after))
    }

    /// Non-overlapping, non-empty matches from left to right.
    pub fn find_tokens<'t>(&self, text: &'t str) -> Vec<&'t str> {
        let mut tokens = Vec::new();
        let mut pos = 0;
        while pos <= text.len() {
            let Some(m) = self.regex.find_at(text, pos) else {
                break;
            };
            if !m.is_empty() && self.at_boundaries(text, m.start(), m.end()) {
                tokens.push(m.as_str());
                pos = m.end();
            } else {
                // Retry one character further on.
                match text[m.start()..].chars().next() {
                    Some(c) => pos = m.start() + c.len_utf8(),
                    None => break,
                }
            }
        }
        tokens
    }
}

struct Translated {
    body: String,
    leading_boundary: bool,
    trailing_boundary: bool,
}

fn translate(pattern: &str) -> Translated {
    let mut rest = pattern;
    let mut body = String::new();

    // Keep a leading inline flag group such as `(?u)`.
    if let Some(group) = rest.strip_prefix("(?") {
        if let Some(end) = group.find(')') {
            if group[..end].chars().all(|c| c.is_ascii_alphabetic()) {
                body.push_str(&rest[..end + 3]);
                rest = &group[end + 1..];
            }
        }
    }

    let leading_boundary = rest.starts_with(r"\b");
    if leading_boundary {
        rest = &rest[2..];
    }
    let trailing_boundary = ends_with_boundary(rest);
    if trailing_boundary {
        rest = &rest[..rest.len() - 2];
    }

    let mut class_depth = 0usize;
    let mut chars = rest.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('w') if class_depth > 0 => body.push_str(WORD_CLASS),
                Some('w') => {
                    body.push('[');
                    body.push_str(WORD_CLASS);
                    body.push(']');
                }
                Some('W') => {
                    body.push_str("[^");
                    body.push_str(WORD_CLASS);
                    body.push(']');
                }
                Some(next) => {
                    body.push('\\');
                    body.push(next);
                }
                None => body.push('\\'),
            },
            '[' => {
                class_depth += 1;
                body.push(c);
            }
            ']' if class_depth > 0 => {
                class_depth -= 1;
                body.push(c);
            }
            _ => body.push(c),
        }
    }

    Translated {
        body,
        leading_boundary,
        trailing_boundary,
    }
}

/// True when the pattern ends in an unescaped `\b`.
fn ends_with_boundary(pattern: &str) -> bool {
    let Some(head) = pattern.strip_suffix(r"\b") else {
        return false;
    };
    let backslashes = head.chars().rev().take_while(|&c| c == '\\').count();
    backslashes % 2 == 0
}
