//! `url(...)` references in declaration values
//!
//! Found on the token stream, not the raw text, so escaped function names
//! (`u\72l(..)`) and padded quoted forms (`url( "a" )`) are seen exactly the
//! way a browser sees them. Rewriting splices the value at token positions
//! and leaves everything else byte for byte.

use cssparser::{ParseError, Parser, ParserInput, Token};
use std::collections::HashMap;
use std::ops::Range;

use super::rules::expect_url_string;

/// One `url(...)` reference inside a value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CssUrl {
    /// Unescaped URL
    pub url: String,
    /// Byte range of the whole reference, function name to closing paren
    pub range: Range<usize>,
    /// Quote the reference was written with (`""` when unquoted)
    pub quote: &'static str,
}

impl CssUrl {
    pub fn is_fetchable(&self) -> bool {
        !self.url.is_empty() && !self.url.starts_with("data:")
    }
}

/// Every `url(...)` in `value`, in order of appearance, nested blocks included
pub fn find_css_urls(value: &str) -> Vec<CssUrl> {
    let mut input = ParserInput::new(value);
    let mut parser = Parser::new(&mut input);
    let mut found = Vec::new();
    collect_urls(&mut parser, value, &mut found);
    found
}

fn collect_urls<'i>(parser: &mut Parser<'i, '_>, source: &str, found: &mut Vec<CssUrl>) {
    loop {
        let start = parser.position().byte_index();
        let token = match parser.next_including_whitespace_and_comments() {
            Ok(token) => token.clone(),
            Err(_) => break,
        };

        match token {
            Token::UnquotedUrl(url) => found.push(CssUrl {
                url: url.to_string(),
                range: start..parser.position().byte_index(),
                quote: "",
            }),
            Token::Function(name) if name.eq_ignore_ascii_case("url") => {
                let url = parser.parse_nested_block(|input| expect_url_string(input));
                let range = start..parser.position().byte_index();
                if let Ok(url) = url {
                    let quote = quote_of(&source[range.clone()]);
                    found.push(CssUrl { url, range, quote });
                }
            }
            Token::Function(_)
            | Token::ParenthesisBlock
            | Token::SquareBracketBlock
            | Token::CurlyBracketBlock => {
                let _ = parser.parse_nested_block(|input| -> Result<(), ParseError<'i, ()>> {
                    collect_urls(input, source, found);
                    Ok(())
                });
            }
            _ => {}
        }
    }
}

/// Quote of a `url( "..." )` function form
fn quote_of(raw: &str) -> &'static str {
    let argument = raw.split_once('(').map_or("", |(_, rest)| rest.trim_start());
    if argument.starts_with('\'') {
        "'"
    } else {
        "\""
    }
}

/// Distinct non-empty URLs referenced in `value`, in order of appearance
pub fn extract_css_urls(value: &str) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    for found in find_css_urls(value) {
        if !found.url.is_empty() && !urls.contains(&found.url) {
            urls.push(found.url);
        }
    }
    urls
}

/// Swap every `url(...)` found in `replacements`, keeping its quote style
pub fn replace_css_urls(value: &str, replacements: &HashMap<String, String>) -> String {
    splice_urls(value, &find_css_urls(value), |found| {
        replacements
            .get(&found.url)
            .map(|src| format!("url({q}{src}{q})", q = found.quote))
    })
}

/// Rebuild `value` with each reference in `urls` replaced by `rewrite`'s
/// output, or kept as written when it returns `None`. `urls` must be in
/// source order.
pub(super) fn splice_urls(
    value: &str,
    urls: &[CssUrl],
    mut rewrite: impl FnMut(&CssUrl) -> Option<String>,
) -> String {
    let mut out = String::with_capacity(value.len());
    let mut cursor = 0;
    for found in urls {
        if let Some(replacement) = rewrite(found) {
            out.push_str(&value[cursor..found.range.start]);
            out.push_str(&replacement);
            cursor = found.range.end;
        }
    }
    out.push_str(&value[cursor..]);
    out
}

/// Byte ranges of the top-level comma-separated parts of `value`
pub fn comma_separated_ranges(value: &str) -> Vec<Range<usize>> {
    let mut input = ParserInput::new(value);
    let mut parser = Parser::new(&mut input);
    let mut ranges = Vec::new();
    let mut start = 0;

    loop {
        let before = parser.position().byte_index();
        // Blocks are skipped by the next call, so nested commas never show up
        let token = match parser.next_including_whitespace_and_comments() {
            Ok(token) => token.clone(),
            Err(_) => break,
        };
        if token == Token::Comma {
            ranges.push(start..before);
            start = parser.position().byte_index();
        }
    }

    ranges.push(start..value.len());
    ranges
}
