//! CSS Sanitizer - rewrite every external reference in a stylesheet
//!
//! Design:
//! - Parse once into the closed `CssRule` enum, then dispatch per variant.
//!   `Unknown` is an error the rule list turns into a dropped rule.
//! - Sibling rules are sanitized concurrently and re-joined by index, so
//!   fetch completion order never changes output order.
//! - A declaration whose URL cannot be fetched is dropped, never kept
//!   pointing at the network.
//! - `@import` recursion carries the chain of stylesheet URLs above it;
//!   revisiting one of them, or going deeper than `max_import_depth`, drops
//!   the import.

mod rules;
mod urls;

pub use rules::{
    declarations_to_css, parse_stylesheet, CssRule, Declaration, FontFaceRule, GroupingRule,
    ImportRule, KeyframesRule, LayerBlockRule, StyleRule, VerbatimRule,
};
pub use urls::{comma_separated_ranges, extract_css_urls, find_css_urls, replace_css_urls, CssUrl};

use futures_util::future::{join_all, BoxFuture};
use futures_util::stream::{FuturesUnordered, StreamExt};
use futures_util::FutureExt;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::error::{Result, SnapshotError};
use crate::events::{ProgressSink, SnapshotEvent};
use crate::resolver::absolute_url;
use crate::resource::ResourceStore;
use urls::splice_urls;

/// Properties whose values may reference images. Custom properties are
/// checked as well.
const URL_PROPERTIES: &[&str] = &[
    "background-image",
    "list-style-image",
    "content",
    "mask-image",
    "background",
    "list-style",
    "mask",
];

fn carries_urls(decl: &Declaration) -> bool {
    decl.is_custom_property() || URL_PROPERTIES.contains(&decl.name.as_str())
}

/// Sanitizer bound to one document's Resource Store
#[derive(Clone)]
pub struct CssSanitizer {
    store: Arc<ResourceStore>,
    progress: Arc<dyn ProgressSink>,
    max_import_depth: usize,
}

impl CssSanitizer {
    pub fn new(
        store: Arc<ResourceStore>,
        progress: Arc<dyn ProgressSink>,
        max_import_depth: usize,
    ) -> Self {
        Self {
            store,
            progress,
            max_import_depth,
        }
    }

    /// Sanitize CSS text found in a document (a `style` element)
    pub async fn sanitize(&self, css: &str, base_url: &str) -> String {
        self.sanitize_text(css, base_url, &[]).await
    }

    /// Sanitize a fetched stylesheet. Its own URL is the base and the
    /// first link of the import chain.
    pub async fn sanitize_stylesheet(&self, content: &[u8], sheet_url: &str) -> String {
        let css = String::from_utf8_lossy(content);
        self.sanitize_text(&css, sheet_url, &[sheet_url.to_string()])
            .await
    }

    /// Sanitize an already parsed rule list
    pub async fn sanitize_rules(&self, rules: &[CssRule], base_url: &str) -> String {
        self.sanitize_rule_list(rules, base_url, &[]).await
    }

    /// Sanitize a `style` attribute value; returns the declaration list only
    pub async fn sanitize_inline_style(&self, value: &str, base_url: &str) -> String {
        let rules = parse_stylesheet(&format!("a{{{}}}", value));
        let Some(CssRule::Style(rule)) = rules.into_iter().next() else {
            return String::new();
        };

        let sanitized = self.sanitize_style_rule(&rule, base_url).await;
        declarations_to_css(&sanitized.declarations)
    }

    async fn sanitize_text(&self, css: &str, base_url: &str, chain: &[String]) -> String {
        let rules = parse_stylesheet(css);
        self.sanitize_rule_list(&rules, base_url, chain).await
    }

    fn sanitize_rule_list<'a>(
        &'a self,
        rules: &'a [CssRule],
        base_url: &'a str,
        chain: &'a [String],
    ) -> BoxFuture<'a, String> {
        async move {
            let mut pending: FuturesUnordered<_> = rules
                .iter()
                .enumerate()
                .map(|(index, rule)| async move {
                    (index, self.sanitize_rule(rule, base_url, chain).await)
                })
                .collect();

            let mut sanitized = BTreeMap::new();
            while let Some((index, result)) = pending.next().await {
                match result {
                    Ok(css) => {
                        sanitized.insert(index, css);
                    }
                    Err(err) => {
                        tracing::warn!("[CssSanitizer] ⚠️  Dropping rule: {}", err);
                        self.progress.on_event(&SnapshotEvent::RuleDropped {
                            reason: err.to_string(),
                        });
                    }
                }
            }

            sanitized.into_values().collect::<String>()
        }
        .boxed()
    }

    async fn sanitize_rule(&self, rule: &CssRule, base_url: &str, chain: &[String]) -> Result<String> {
        match rule {
            CssRule::Style(rule) | CssRule::Keyframe(rule) => {
                Ok(self.sanitize_style_rule(rule, base_url).await.to_css())
            }
            CssRule::Import(import) => self.sanitize_import(import, base_url, chain).await,
            CssRule::Media(group) => Ok(format!(
                "@media {}{{{}}}",
                group.condition,
                self.sanitize_rule_list(&group.rules, base_url, chain).await
            )),
            CssRule::Supports(group) => Ok(format!(
                "@supports {}{{{}}}",
                group.condition,
                self.sanitize_rule_list(&group.rules, base_url, chain).await
            )),
            CssRule::Container(group) => Ok(format!(
                "@container {}{{{}}}",
                group.condition,
                self.sanitize_rule_list(&group.rules, base_url, chain).await
            )),
            CssRule::Keyframes(keyframes) => Ok(format!(
                "@{} {}{{{}}}",
                keyframes.keyword,
                keyframes.name,
                self.sanitize_rule_list(&keyframes.rules, base_url, chain).await
            )),
            CssRule::LayerBlock(layer) => {
                let body = self.sanitize_rule_list(&layer.rules, base_url, chain).await;
                Ok(match (body.is_empty(), layer.name.is_empty()) {
                    (false, _) => format!("@layer {}{{{}}}", layer.name, body),
                    (true, false) => format!("@layer {};", layer.name),
                    (true, true) => String::new(),
                })
            }
            CssRule::FontFace(font) => Ok(self.sanitize_font_face(font, base_url).await),
            CssRule::Page(rule)
            | CssRule::CounterStyle(rule)
            | CssRule::Property(rule)
            | CssRule::ViewTransition(rule)
            | CssRule::LayerStatement(rule) => Ok(rule.text.clone()),
            CssRule::Unknown(rule) => Err(SnapshotError::UnknownCssRule(rule.name.clone())),
        }
    }

    async fn sanitize_style_rule(&self, rule: &StyleRule, base_url: &str) -> StyleRule {
        let declarations = join_all(
            rule.declarations
                .iter()
                .map(|decl| self.sanitize_declaration(decl, base_url)),
        )
        .await;

        StyleRule {
            selector: rule.selector.clone(),
            declarations: declarations.into_iter().flatten().collect(),
        }
    }

    /// `None` drops the declaration
    async fn sanitize_declaration(&self, decl: &Declaration, base_url: &str) -> Option<Declaration> {
        if !carries_urls(decl) {
            return Some(decl.clone());
        }

        let urls: Vec<String> = extract_css_urls(&decl.value)
            .into_iter()
            .filter(|url| !url.starts_with("data:"))
            .collect();
        if urls.is_empty() {
            return Some(decl.clone());
        }

        let fetched = join_all(urls.iter().map(|url| self.fetch_src(url, base_url))).await;

        let mut replacements = HashMap::new();
        for (url, src) in urls.into_iter().zip(fetched) {
            match src {
                Some(src) => {
                    replacements.insert(url, src);
                }
                None => {
                    tracing::warn!(
                        "[CssSanitizer] Dropping declaration {}: {} unavailable",
                        decl.name,
                        url
                    );
                    return None;
                }
            }
        }

        Some(Declaration {
            value: replace_css_urls(&decl.value, &replacements),
            ..decl.clone()
        })
    }

    async fn fetch_src(&self, url: &str, base_url: &str) -> Option<String> {
        let href = absolute_url(base_url, url)?;
        let resource = self.store.create(&href).await?;
        Some(resource.src().to_string())
    }

    async fn sanitize_import(
        &self,
        import: &ImportRule,
        base_url: &str,
        chain: &[String],
    ) -> Result<String> {
        let href = absolute_url(base_url, &import.href).ok_or_else(|| SnapshotError::InvalidUrl {
            url: import.href.clone(),
            base: base_url.to_string(),
        })?;

        if chain.iter().any(|ancestor| *ancestor == href) {
            return Err(SnapshotError::ImportCycle(href));
        }
        if chain.len() >= self.max_import_depth {
            return Err(SnapshotError::MaxImportDepthExceeded {
                current: chain.len() + 1,
                max: self.max_import_depth,
            });
        }

        let resource = self
            .store
            .create(&href)
            .await
            .ok_or_else(|| SnapshotError::ResourceUnavailable(href.clone()))?;

        let mut nested_chain = chain.to_vec();
        nested_chain.push(href.clone());

        let css = String::from_utf8_lossy(resource.content()).into_owned();
        let sanitized = self.sanitize_text(&css, &href, &nested_chain).await;
        let updated = self.store.update_content(&resource, sanitized);

        if import.media.is_empty() {
            Ok(format!("@import url(\"{}\");", updated.src()))
        } else {
            Ok(format!("@import url(\"{}\") {};", updated.src(), import.media))
        }
    }

    /// Sources whose URL cannot be fetched are dropped from the `src` list;
    /// a face with no fetchable URL is kept as written.
    async fn sanitize_font_face(&self, font: &FontFaceRule, base_url: &str) -> String {
        let Some(src) = font.src() else {
            return font.text.clone();
        };

        let urls: Vec<CssUrl> = find_css_urls(&src.value)
            .into_iter()
            .filter(CssUrl::is_fetchable)
            .collect();
        if urls.is_empty() {
            return font.text.clone();
        }

        let fetched = join_all(urls.iter().map(|found| self.fetch_src(&found.url, base_url))).await;
        let fetched: HashMap<&str, Option<String>> =
            urls.iter().map(|found| found.url.as_str()).zip(fetched).collect();

        let sources: Vec<String> = comma_separated_ranges(&src.value)
            .into_iter()
            .filter_map(|range| {
                let entry = &src.value[range];
                let found = find_css_urls(entry);
                if let Some(missing) = found
                    .iter()
                    .find(|f| fetched.get(f.url.as_str()).is_some_and(Option::is_none))
                {
                    tracing::warn!("[CssSanitizer] Dropping font source {}: unavailable", missing.url);
                    return None;
                }

                let source = splice_urls(entry, &found, |f| {
                    fetched
                        .get(f.url.as_str())
                        .cloned()
                        .flatten()
                        .map(|src| format!("url('{src}')"))
                });
                Some(source.trim().to_string()).filter(|source| !source.is_empty())
            })
            .collect();

        let declarations: Vec<Declaration> = font
            .declarations
            .iter()
            .filter_map(|decl| {
                if decl.name != "src" {
                    return Some(decl.clone());
                }
                if sources.is_empty() {
                    return None;
                }
                Some(Declaration {
                    value: sources.join(", "),
                    ..decl.clone()
                })
            })
            .collect();

        format!("@font-face {{{}}}", declarations_to_css(&declarations))
    }
}
