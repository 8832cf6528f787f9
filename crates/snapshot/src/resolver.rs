//! URL Resolver - relative to absolute, with a mutable base
//!
//! Resolution order:
//! 1. empty input → current base
//! 2. `data:` URI → unchanged
//! 3. explicit base set, input has no `scheme://` and no leading `/`
//!    → plain string concatenation `base + input`
//! 4. everything else → standard URL joining
//!
//! Rule 3 is not what a browser does. Snapshots already stored depend on
//! it, so it stays exactly as is.

use url::Url;

/// Per-document resolver. Never fails: bad input degrades to the input itself.
#[derive(Debug, Clone)]
pub struct UrlResolver {
    base: String,
    has_explicit_base: bool,
}

impl UrlResolver {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            has_explicit_base: false,
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn has_explicit_base(&self) -> bool {
        self.has_explicit_base
    }

    /// Resolve `url` against the current base
    pub fn resolve(&self, url: &str) -> String {
        if url.is_empty() {
            return self.base.clone();
        }
        if url.starts_with("data:") {
            return url.to_string();
        }
        if self.has_explicit_base && !url.starts_with('/') && !has_scheme_prefix(url) {
            return format!("{}{}", self.base, url);
        }
        absolute_url(&self.base, url).unwrap_or_else(|| url.to_string())
    }

    /// Apply a `<base href>`: resolved with standard joining against the old base
    pub fn set_base(&mut self, href: Option<&str>) {
        if let Some(href) = href.filter(|href| !href.is_empty()) {
            self.base = absolute_url(&self.base, href).unwrap_or_else(|| href.to_string());
        }
        self.has_explicit_base = true;
    }
}

/// `^[a-zA-Z]+://`
fn has_scheme_prefix(url: &str) -> bool {
    let letters = url.bytes().take_while(u8::is_ascii_alphabetic).count();
    letters > 0 && url[letters..].starts_with("://")
}

/// Standard URL joining only. `data:` URIs pass through; `None` when the
/// pair cannot be joined (unparsable base and relative input).
pub fn absolute_url(base: &str, url: &str) -> Option<String> {
    let url = url.trim();
    if url.starts_with("data:") {
        return Some(url.to_string());
    }

    match Url::parse(base) {
        Ok(base) => base.join(url).ok().map(String::from),
        Err(_) => Url::parse(url).ok().map(String::from),
    }
}
