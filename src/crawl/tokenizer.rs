//! ASCII token scanner shared by the fingerprinter and page analytics

use std::collections::HashMap;
use std::str::Chars;

/// Iterator over lower-cased ASCII alphanumeric runs.
///
/// Every other character, non-ASCII included, ends the current token and is
/// otherwise dropped.
pub struct Tokens<'a> {
    chars: Chars<'a>,
}

impl<'a> Tokens<'a> {
    pub fn new(text: &'a str) -> Self {
        Self { chars: text.chars() }
    }
}

impl Iterator for Tokens<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let mut token = String::new();
        for c in self.chars.by_ref() {
            if c.is_ascii_alphanumeric() {
                token.push(c.to_ascii_lowercase());
            } else if !token.is_empty() {
                return Some(token);
            }
        }
        (!token.is_empty()).then_some(token)
    }
}

/// Scan `text` into tokens
pub fn tokens(text: &str) -> Tokens<'_> {
    Tokens::new(text)
}

/// Count token frequencies in `text`
pub fn tokenize(text: &str) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for token in tokens(text) {
        *counts.entry(token).or_insert(0) += 1;
    }
    counts
}
