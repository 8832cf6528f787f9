//! Document Transformer - one frame of the page, rewritten in place
//!
//! ## Walk
//!
//! ```text
//! walk(node):
//!   transform(node)      attributes, then the element-kind rule
//!   walk(children...)    concurrently, results ignored
//! ```
//!
//! Pre-order, every node exactly once. Siblings are driven by `join_all`,
//! which polls them in document order, so everything a transform does
//! before its first fetch (resolving `href`s, applying `<base>`) happens in
//! document order. A failing node is logged and the walk goes on.
//!
//! ## Locking
//!
//! The arena and the resolver sit behind `std::sync::RwLock`s that are only
//! ever taken for a synchronous read-modify-write and released before the
//! next `.await`. Nodes are read out as owned values first.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use dom::serializer::serialize;
use dom::{extract_visible_text, parse_html, Attribute, DomArena, NodeId};
use futures_util::future::{join_all, BoxFuture};
use futures_util::FutureExt;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use url::Url;

use crate::config::SnapshotConfig;
use crate::css::CssSanitizer;
use crate::error::{Result, SnapshotError};
use crate::events::{ProgressSink, SnapshotEvent};
use crate::fetch::Fetcher;
use crate::resolver::UrlResolver;
use crate::resource::{merge_resources, Resource, ResourceStore};
use crate::snapshot::RawDocument;

/// Base64 markup of a script-populated frame, set by the capture side
pub const IFRAME_HTML_ATTR: &str = "data-omnom-iframe-html";
/// URL of that frame's document
pub const IFRAME_URL_ATTR: &str = "data-omnom-iframe-url";

const INLINE_FRAME_DOCTYPE: &str = "<!DOCTYPE html>";

const ICON_RELS: &[&str] = &[
    "icon",
    "shortcut icon",
    "apple-touch-icon",
    "apple-touch-icon-precomposed",
    "fluid-icon",
];

/// Everything a document and its nested frames share
#[derive(Clone)]
pub struct SnapshotContext {
    pub config: Arc<SnapshotConfig>,
    pub fetcher: Arc<dyn Fetcher>,
    pub progress: Arc<dyn ProgressSink>,
    /// Captured frame documents, matched to `iframe`s by URL
    pub frames: Arc<[RawDocument]>,
}

/// Element kinds with a rewrite rule of their own
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Script,
    Template,
    Link,
    Style,
    Img,
    Audio,
    Video,
    Source,
    Iframe,
    Base,
    Other,
}

impl ElementKind {
    pub fn from_tag(tag: &str) -> Self {
        match tag.to_ascii_lowercase().as_str() {
            "script" => ElementKind::Script,
            "template" => ElementKind::Template,
            "link" => ElementKind::Link,
            "style" => ElementKind::Style,
            "img" => ElementKind::Img,
            "audio" => ElementKind::Audio,
            "video" => ElementKind::Video,
            "source" => ElementKind::Source,
            "iframe" => ElementKind::Iframe,
            "base" => ElementKind::Base,
            _ => ElementKind::Other,
        }
    }
}

/// One frame: parsed markup, its resolver and its resource store
pub struct Document {
    url: String,
    doctype: String,
    dom: RwLock<DomArena>,
    resolver: RwLock<UrlResolver>,
    store: Arc<ResourceStore>,
    sanitizer: CssSanitizer,
    context: SnapshotContext,

    /// URLs of the documents this one is nested in, outermost first
    ancestry: Vec<String>,

    /// Successful icon links by node, the first in document order wins
    icons: Mutex<BTreeMap<NodeId, String>>,
    favicon: Mutex<Option<String>>,
    multimedia_count: AtomicUsize,
    frame_resources: Mutex<Vec<Arc<Resource>>>,
}

impl Document {
    pub fn new(raw: &RawDocument, context: SnapshotContext) -> Result<Self> {
        Self::with_ancestry(raw, context, Vec::new())
    }

    fn with_ancestry(raw: &RawDocument, context: SnapshotContext, ancestry: Vec<String>) -> Result<Self> {
        let mut dom = parse_html(&raw.markup)?;
        if let Some(root_id) = dom.root_id() {
            let root = dom.get_mut(root_id)?;
            for (name, value) in &raw.attributes {
                root.set_attr(name, value.as_str());
            }
        }

        let config = &context.config;
        let store = Arc::new(ResourceStore::new(
            context.fetcher.clone(),
            context.progress.clone(),
            &config.resource_link_prefix,
        ));
        let sanitizer = CssSanitizer::new(store.clone(), context.progress.clone(), config.max_import_depth);

        Ok(Self {
            url: raw.url.clone(),
            doctype: raw.doctype.clone(),
            dom: RwLock::new(dom),
            resolver: RwLock::new(UrlResolver::new(raw.url.as_str())),
            store,
            sanitizer,
            context,
            ancestry,
            icons: Mutex::new(BTreeMap::new()),
            favicon: Mutex::new(None),
            multimedia_count: AtomicUsize::new(0),
            frame_resources: Mutex::new(Vec::new()),
        })
    }

    /// Child document for a frame of this one
    fn nested(&self, raw: &RawDocument) -> Result<Document> {
        let depth = self.ancestry.len() + 1;
        let max = self.context.config.max_frame_depth;
        if depth > max {
            return Err(SnapshotError::MaxFrameDepthExceeded { current: depth, max });
        }

        let mut ancestry = self.ancestry.clone();
        ancestry.push(self.url.clone());
        Document::with_ancestry(raw, self.context.clone(), ancestry)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn doctype(&self) -> &str {
        &self.doctype
    }

    /// Favicon as a `data:` URI, once `transform` found one
    pub fn favicon(&self) -> Option<String> {
        lock(&self.favicon).clone()
    }

    /// Multimedia references rewritten here and in nested frames
    pub fn multimedia_count(&self) -> usize {
        self.multimedia_count.load(Ordering::SeqCst)
    }

    /// Resources of this document and of every inlined frame, deduplicated
    pub fn resources(&self) -> Vec<Arc<Resource>> {
        let frames = lock(&self.frame_resources).clone();
        merge_resources(self.store.resources().into_iter().chain(frames))
    }

    /// Doctype followed by the serialized tree
    pub fn to_html(&self) -> Result<String> {
        let dom = self.dom();
        Ok(format!("{}{}", self.doctype, serialize(&dom)?))
    }

    /// Visible text blocks of `body`, or of the whole tree without one
    pub fn visible_text(&self) -> Vec<String> {
        let dom = self.dom();
        match dom.first_by_tag("body").or_else(|| dom.root_id()) {
            Some(node_id) => extract_visible_text(&dom, node_id),
            None => Vec::new(),
        }
    }

    /// Text of the first `title` element
    pub fn title(&self) -> Option<String> {
        let dom = self.dom();
        let node_id = dom.first_by_tag("title")?;
        let title = dom.text_content(node_id).ok()?;
        Some(title.trim().to_string()).filter(|title| !title.is_empty())
    }

    /// Rewrite the whole tree, then settle the favicon
    pub async fn transform(&self) {
        let Some(root_id) = self.dom().root_id() else {
            tracing::warn!("[Document] {} has no root element", self.url);
            return;
        };

        self.walk(root_id).await;

        let icon = lock(&self.icons).values().next().cloned();
        if icon.is_some() {
            *lock(&self.favicon) = icon;
        } else if self.context.config.fetch_favicon_fallback {
            self.fallback_favicon().await;
        }
    }

    fn walk(&self, node_id: NodeId) -> BoxFuture<'_, ()> {
        async move {
            if let Err(err) = self.transform_node(node_id).await {
                tracing::warn!("[Document] ⚠️  Failed to transform node {} in {}: {}", node_id, self.url, err);
            }

            let children: Vec<NodeId> = match self.dom().get(node_id) {
                Ok(node) => node.children_ids.to_vec(),
                Err(_) => return,
            };
            join_all(children.into_iter().map(|child_id| self.walk(child_id))).await;
        }
        .boxed()
    }

    async fn transform_node(&self, node_id: NodeId) -> Result<()> {
        let kind = {
            let dom = self.dom();
            let node = dom.get(node_id)?;
            if !node.is_element() {
                return Ok(());
            }
            ElementKind::from_tag(&node.node_name)
        };

        self.rewrite_attributes(node_id, kind)?;
        self.rewrite_style_attribute(node_id).await?;

        match kind {
            ElementKind::Script => self.remove_node(node_id),
            // Template contents are ordinary children in the arena
            ElementKind::Template | ElementKind::Other => Ok(()),
            ElementKind::Link => self.transform_link(node_id).await,
            ElementKind::Style => self.transform_style(node_id).await,
            ElementKind::Img => self.transform_img(node_id).await,
            ElementKind::Audio | ElementKind::Video | ElementKind::Source => {
                self.transform_multimedia(node_id)
            }
            ElementKind::Iframe => self.transform_iframe(node_id).await,
            ElementKind::Base => self.transform_base(node_id),
        }
    }

    /// Drop event handlers, blank `javascript:` values, make `href`s absolute
    fn rewrite_attributes(&self, node_id: NodeId, kind: ElementKind) -> Result<()> {
        let resolver = self.resolver().clone();
        let mut dom = self.dom_mut();
        let node = dom.get_mut(node_id)?;

        node.attributes
            .retain(|attr| !attr.name.to_ascii_lowercase().starts_with("on"));

        for attr in node.attributes.iter_mut() {
            if is_javascript_url(&attr.value) {
                attr.value.clear();
            } else if attr.name == "href" && kind != ElementKind::Base {
                let resolved = resolver.resolve(&attr.value);
                attr.value = if is_javascript_url(&resolved) { String::new() } else { resolved };
            }
        }
        Ok(())
    }

    async fn rewrite_style_attribute(&self, node_id: NodeId) -> Result<()> {
        let Some(style) = self.attr(node_id, "style")? else {
            return Ok(());
        };

        let base = self.base_url();
        let sanitized = self.sanitizer.sanitize_inline_style(&style, &base).await;
        self.set_attr(node_id, "style", sanitized)
    }

    async fn transform_link(&self, node_id: NodeId) -> Result<()> {
        let rel = self.attr(node_id, "rel")?.unwrap_or_default().trim().to_ascii_lowercase();
        let href = self.attr(node_id, "href")?.filter(|href| !href.is_empty());

        match rel.as_str() {
            "stylesheet" => self.link_stylesheet(node_id, href).await,
            rel if ICON_RELS.contains(&rel) => self.link_icon(node_id, href).await,
            "preconnect" | "dns-prefetch" => self.remove_attr(node_id, "href"),
            "modulepreload" => self.remove_node(node_id),
            "preload" => {
                if href.is_none() {
                    return Ok(());
                }
                let kind = self.attr(node_id, "as")?.unwrap_or_default().trim().to_ascii_lowercase();
                match kind.as_str() {
                    "script" | "fetch" | "track" | "worker" => self.remove_node(node_id),
                    "font" => self.link_resource(node_id, href).await,
                    "image" => {
                        self.remove_attr(node_id, "imagesrcset")?;
                        self.link_resource(node_id, href).await
                    }
                    "style" => self.link_stylesheet(node_id, href).await,
                    "document" | "embed" | "audio" | "object" => self.remove_attr(node_id, "href"),
                    _ => Ok(()),
                }
            }
            _ => Ok(()),
        }
    }

    async fn link_stylesheet(&self, node_id: NodeId, href: Option<String>) -> Result<()> {
        let Some(href) = href else {
            return Ok(());
        };
        let url = self.resolve(&href);

        match self.store.create(&url).await {
            Some(resource) => {
                let css = self.sanitizer.sanitize_stylesheet(resource.content(), &url).await;
                let updated = self.store.update_content(&resource, css);
                self.set_attr(node_id, "href", updated.src())
            }
            None => self.remove_attr(node_id, "href"),
        }
    }

    async fn link_resource(&self, node_id: NodeId, href: Option<String>) -> Result<()> {
        let Some(href) = href else {
            return Ok(());
        };

        match self.store.create(&self.resolve(&href)).await {
            Some(resource) => self.set_attr(node_id, "href", resource.src()),
            None => self.remove_attr(node_id, "href"),
        }
    }

    async fn link_icon(&self, node_id: NodeId, href: Option<String>) -> Result<()> {
        let Some(href) = href else {
            return Ok(());
        };

        match self.store.fetch_data_url(&self.resolve(&href)).await {
            Some(icon) => {
                lock(&self.icons).insert(node_id, icon.clone());
                self.set_attr(node_id, "href", icon)
            }
            None => self.remove_attr(node_id, "href"),
        }
    }

    async fn transform_style(&self, node_id: NodeId) -> Result<()> {
        let css = self.dom().text_content(node_id)?;
        let base = self.base_url();
        let sanitized = self.sanitizer.sanitize(&css, &base).await;

        // The text is written back raw, it must not be able to close the element
        self.dom_mut()
            .replace_children_with_text(node_id, sanitized.replace("</", "<\\/"))?;
        Ok(())
    }

    async fn transform_img(&self, node_id: NodeId) -> Result<()> {
        if let Some(src) = self.attr(node_id, "src")? {
            if !src.is_empty() && !src.starts_with("data:") {
                match self.store.create(&self.resolve(&src)).await {
                    Some(resource) => self.set_attr(node_id, "src", resource.src())?,
                    None => self.remove_attr(node_id, "src")?,
                }
            }
        }

        let Some(srcset) = self.attr(node_id, "srcset")?.filter(|s| !s.is_empty()) else {
            return Ok(());
        };
        // A (still) present src makes srcset redundant
        if self.attr(node_id, "src")?.is_some_and(|src| !src.is_empty()) {
            return self.remove_attr(node_id, "srcset");
        }

        let candidates: Vec<(String, String)> = parse_srcset(&srcset)
            .into_iter()
            .map(|(url, descriptor)| (url.to_string(), descriptor.to_string()))
            .collect();

        let rewritten = join_all(candidates.iter().map(|(url, descriptor)| async move {
            if url.starts_with("data:") {
                return Some(srcset_candidate(url, descriptor));
            }
            let resource = self.store.create(&self.resolve(url)).await?;
            Some(srcset_candidate(resource.src(), descriptor))
        }))
        .await;

        let srcset = rewritten.into_iter().flatten().collect::<Vec<_>>().join(", ");
        self.set_attr(node_id, "srcset", srcset)
    }

    /// Multimedia is referenced by absolute URL, never downloaded
    fn transform_multimedia(&self, node_id: NodeId) -> Result<()> {
        let src = self.attr(node_id, "src")?.filter(|src| !src.is_empty());
        let srcset = self.attr(node_id, "srcset")?.filter(|srcset| !srcset.is_empty());
        let poster = self.attr(node_id, "poster")?.filter(|poster| !poster.is_empty());

        if let Some(src) = &src {
            if !src.starts_with("data:") {
                self.multimedia_count.fetch_add(1, Ordering::SeqCst);
                self.set_attr(node_id, "src", self.resolve(src))?;
            }
        }

        if let Some(srcset) = srcset {
            if src.is_some() {
                self.remove_attr(node_id, "srcset")?;
            } else {
                self.multimedia_count.fetch_add(1, Ordering::SeqCst);
                let absolute = parse_srcset(&srcset)
                    .into_iter()
                    .map(|(url, descriptor)| srcset_candidate(&self.resolve(url), descriptor))
                    .collect::<Vec<_>>()
                    .join(", ");
                self.set_attr(node_id, "srcset", absolute)?;
            }
        }

        if let Some(poster) = poster.filter(|poster| !poster.starts_with("data:")) {
            self.set_attr(node_id, "poster", self.resolve(&poster))?;
        }
        Ok(())
    }

    async fn transform_iframe(&self, node_id: NodeId) -> Result<()> {
        if let Some(encoded) = self.attr(node_id, IFRAME_HTML_ATTR)? {
            let declared_url = self.attr(node_id, IFRAME_URL_ATTR)?;
            self.remove_attr(node_id, IFRAME_HTML_ATTR)?;
            self.remove_attr(node_id, IFRAME_URL_ATTR)?;
            // Cleared first so a failed frame is left empty rather than live
            self.set_attr(node_id, "src", "")?;

            let url = match declared_url.as_deref().map(str::trim) {
                None | Some("") | Some("about:blank") => self.base_url(),
                Some(url) => url.to_string(),
            };
            let markup = String::from_utf8_lossy(&STANDARD.decode(encoded.trim())?).into_owned();
            let raw = RawDocument {
                markup,
                url,
                doctype: INLINE_FRAME_DOCTYPE.to_string(),
                ..RawDocument::default()
            };

            let inline = self.render_frame(&raw).await?;
            return self.set_attr(node_id, "src", inline);
        }

        if let Some(srcdoc) = self.attr(node_id, "srcdoc")?.filter(|srcdoc| !srcdoc.is_empty()) {
            let raw = RawDocument {
                markup: srcdoc,
                url: self.base_url(),
                ..RawDocument::default()
            };
            self.remove_attr(node_id, "src")?;
            self.set_attr(node_id, "srcdoc", "")?;

            let child = self.nested(&raw)?;
            child.transform().await;
            self.absorb_frame(&child);
            return self.set_attr(node_id, "srcdoc", child.to_html()?);
        }

        let Some(src) = self.attr(node_id, "src")?.filter(|src| !src.is_empty()) else {
            return Ok(());
        };
        let url = self.resolve(&src);

        let rendered = match self.find_frame(&url) {
            Ok(raw) => self.render_frame(&raw).await,
            Err(err) => Err(err),
        };
        match rendered {
            Ok(inline) => self.set_attr(node_id, "src", inline),
            Err(err) => {
                tracing::warn!("[Document] ⚠️  Frame {} not inlined: {}", url, err);
                self.set_attr(node_id, "src", "")
            }
        }
    }

    /// Captured frame document for `url`, refusing cycles
    fn find_frame(&self, url: &str) -> Result<RawDocument> {
        if same_url(&self.url, url) || self.ancestry.iter().any(|ancestor| same_url(ancestor, url)) {
            return Err(SnapshotError::FrameCycle(url.to_string()));
        }

        self.context
            .frames
            .iter()
            .find(|frame| same_url(&frame.url, url))
            .cloned()
            .ok_or_else(|| SnapshotError::ResourceUnavailable(url.to_string()))
    }

    /// Transform a frame document and return it as a `data:` URI
    async fn render_frame(&self, raw: &RawDocument) -> Result<String> {
        let child = self.nested(raw)?;
        child.transform().await;

        let html = child.to_html()?;
        self.absorb_frame(&child);
        self.context.progress.on_event(&SnapshotEvent::FrameInlined {
            url: raw.url.clone(),
        });

        Ok(format!("data:text/html;base64,{}", STANDARD.encode(html)))
    }

    fn absorb_frame(&self, child: &Document) {
        lock(&self.frame_resources).extend(child.resources());
        self.multimedia_count
            .fetch_add(child.multimedia_count(), Ordering::SeqCst);
    }

    fn transform_base(&self, node_id: NodeId) -> Result<()> {
        let href = self.attr(node_id, "href")?;
        self.resolver_mut().set_base(href.as_deref());
        self.remove_attr(node_id, "href")
    }

    async fn fallback_favicon(&self) {
        let url = self.resolve("/favicon.ico");
        let Some(icon) = self.store.fetch_data_url(&url).await else {
            return;
        };

        let mut dom = self.dom_mut();
        if let Some(head_id) = dom.first_by_tag("head") {
            let link_id = dom.create_element(
                "link",
                vec![Attribute::new("rel", "icon"), Attribute::new("href", icon.as_str())],
            );
            if let Err(err) = dom.append_child(head_id, link_id) {
                tracing::warn!("[Document] Failed to add favicon link: {}", err);
            }
        }
        *lock(&self.favicon) = Some(icon);
    }

    fn dom(&self) -> RwLockReadGuard<'_, DomArena> {
        self.dom.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn dom_mut(&self) -> RwLockWriteGuard<'_, DomArena> {
        self.dom.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn resolver(&self) -> RwLockReadGuard<'_, UrlResolver> {
        self.resolver.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn resolver_mut(&self) -> RwLockWriteGuard<'_, UrlResolver> {
        self.resolver.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn resolve(&self, url: &str) -> String {
        self.resolver().resolve(url)
    }

    fn base_url(&self) -> String {
        self.resolver().base().to_string()
    }

    fn attr(&self, node_id: NodeId, name: &str) -> Result<Option<String>> {
        Ok(self.dom().get(node_id)?.attr(name).map(str::to_string))
    }

    fn set_attr(&self, node_id: NodeId, name: &str, value: impl Into<String>) -> Result<()> {
        self.dom_mut().get_mut(node_id)?.set_attr(name, value);
        Ok(())
    }

    fn remove_attr(&self, node_id: NodeId, name: &str) -> Result<()> {
        self.dom_mut().get_mut(node_id)?.remove_attr(name);
        Ok(())
    }

    fn remove_node(&self, node_id: NodeId) -> Result<()> {
        self.dom_mut().detach(node_id)?;
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scheme check on the value as a URL parser sees it: leading C0 controls
/// and spaces trimmed, ASCII tab and newlines removed anywhere
fn is_javascript_url(value: &str) -> bool {
    let scheme: String = value
        .trim_start_matches(|c: char| c <= ' ')
        .chars()
        .filter(|c| !matches!(c, '\t' | '\n' | '\r'))
        .take(11)
        .collect();
    scheme.eq_ignore_ascii_case("javascript:")
}

/// `a.png 1x, b.png 2x` → `[("a.png", "1x"), ("b.png", "2x")]`
fn parse_srcset(srcset: &str) -> Vec<(&str, &str)> {
    srcset
        .split(',')
        .map(str::trim)
        .filter(|candidate| !candidate.is_empty())
        .map(|candidate| match candidate.split_once(char::is_whitespace) {
            Some((url, descriptor)) => (url, descriptor.trim()),
            None => (candidate, ""),
        })
        .collect()
}

fn srcset_candidate(url: &str, descriptor: &str) -> String {
    if descriptor.is_empty() {
        url.to_string()
    } else {
        format!("{} {}", url, descriptor)
    }
}

/// URL equality after parsing, so `https://x.test` matches `https://x.test/`
fn same_url(a: &str, b: &str) -> bool {
    match (Url::parse(a), Url::parse(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::SilentProgress;
    use crate::fetch::MemoryFetcher;

    const PAGE: &str = "https://x.test/page";

    fn context(fetcher: Arc<MemoryFetcher>, frames: Vec<RawDocument>) -> SnapshotContext {
        SnapshotContext {
            config: Arc::new(SnapshotConfig::default()),
            fetcher,
            progress: Arc::new(SilentProgress),
            frames: frames.into(),
        }
    }

    fn raw(markup: &str) -> RawDocument {
        RawDocument {
            markup: markup.to_string(),
            url: PAGE.to_string(),
            ..RawDocument::default()
        }
    }

    async fn transformed(fetcher: Arc<MemoryFetcher>, markup: &str) -> Document {
        let document = Document::new(&raw(markup), context(fetcher, Vec::new())).unwrap();
        document.transform().await;
        document
    }

    fn decode_frame(src: &str) -> String {
        let payload = src.strip_prefix("data:text/html;base64,").unwrap();
        String::from_utf8(STANDARD.decode(payload).unwrap()).unwrap()
    }

    #[test]
    fn test_element_kind_from_tag() {
        assert_eq!(ElementKind::from_tag("SCRIPT"), ElementKind::Script);
        assert_eq!(ElementKind::from_tag("iframe"), ElementKind::Iframe);
        assert_eq!(ElementKind::from_tag("div"), ElementKind::Other);
    }

    #[test]
    fn test_helpers() {
        assert!(is_javascript_url("  JavaScript:alert(1)"));
        assert!(!is_javascript_url("https://x.test/javascript:"));
        assert!(is_javascript_url("java\tscript:x()"));
        assert!(is_javascript_url("\u{1}\n j\na\rvascript:x()"));
        assert!(!is_javascript_url("java script:x()"));
        assert_eq!(
            parse_srcset(" a.png 1x,b.png  2x , c.png"),
            vec![("a.png", "1x"), ("b.png", "2x"), ("c.png", "")]
        );
        assert!(same_url("https://x.test", "https://x.test/"));
        assert!(!same_url("https://x.test/a", "https://x.test/b"));
    }

    #[tokio::test]
    async fn test_scripts_and_handlers_removed() {
        let fetcher = Arc::new(MemoryFetcher::new());
        let document = transformed(
            fetcher,
            r#"<html><head><script>alert(1)</script></head><body onload="x()"><a href="javascript:evil()" ONCLICK="y()">a</a><template><script>z()</script><p>t</p></template></body></html>"#,
        )
        .await;

        let html = document.to_html().unwrap();
        assert!(!html.contains("<script"));
        assert!(!html.to_lowercase().contains("onload"));
        assert!(!html.to_lowercase().contains("onclick"));
        assert!(html.contains(r#"<a href="">a</a>"#));
        assert!(html.contains("<template><p>t</p></template>"));
    }

    #[tokio::test]
    async fn test_javascript_urls_split_by_control_characters_blanked() {
        let document = transformed(
            Arc::new(MemoryFetcher::new()),
            r#"<html><body><a href="java&#9;script:alert(1)">x</a><a href=" &#10;jav&#13;ascript:b()">y</a><form action="JAVA&#10;SCRIPT:c()"></form></body></html>"#,
        )
        .await;

        let html = document.to_html().unwrap();
        assert!(!html.to_lowercase().contains("script:"));
        assert!(html.contains(r#"<a href="">x</a><a href="">y</a><form action=""></form>"#));
    }

    #[tokio::test]
    async fn test_hrefs_made_absolute() {
        let document = transformed(
            Arc::new(MemoryFetcher::new()),
            r#"<html><body><a href="/about">x</a><a href="next">y</a></body></html>"#,
        )
        .await;

        let html = document.to_html().unwrap();
        assert!(html.contains(r#"href="https://x.test/about""#));
        assert!(html.contains(r#"href="https://x.test/next""#));
    }

    #[tokio::test]
    async fn test_base_changes_resolution_for_later_elements() {
        let document = transformed(
            Arc::new(MemoryFetcher::new()),
            r#"<html><head><base href="/static/"></head><body><a href="doc.html">d</a><a href="/root">r</a><video src="v.mp4"></video></body></html>"#,
        )
        .await;

        let html = document.to_html().unwrap();
        assert!(html.contains("<base>"));
        assert!(html.contains(r#"href="https://x.test/static/doc.html""#));
        assert!(html.contains(r#"href="https://x.test/root""#));
        assert!(html.contains(r#"src="https://x.test/static/v.mp4""#));
        assert_eq!(document.multimedia_count(), 1);
    }

    #[tokio::test]
    async fn test_style_element_sanitized_and_escaped() {
        let fetcher = Arc::new(MemoryFetcher::new());
        fetcher.insert("https://x.test/bg.png", "image/png", "bg");
        let document = transformed(
            fetcher,
            r#"<html><head><style>body { background-image: url(bg.png) } a::after { content: "</div>" }</style></head><body></body></html>"#,
        )
        .await;

        let src = document.resources()[0].src().to_string();
        let html = document.to_html().unwrap();
        assert!(html.contains(&format!("body {{ background-image: url({src}); }}")));
        assert!(html.contains(r#"a::after { content: "<\/div>"; }"#));
    }

    #[tokio::test]
    async fn test_style_attribute_sanitized() {
        let fetcher = Arc::new(MemoryFetcher::new());
        let document = transformed(
            fetcher,
            r#"<html><body><div style="color: red; background-image: url(gone.png)">x</div></body></html>"#,
        )
        .await;

        assert!(document
            .to_html()
            .unwrap()
            .contains(r#"<div style="color: red;">x</div>"#));
    }

    #[tokio::test]
    async fn test_link_rel_dispatch() {
        let fetcher = Arc::new(MemoryFetcher::new());
        fetcher.insert("https://x.test/font.woff2", "font/woff2", "font");
        let document = transformed(
            fetcher,
            r#"<html><head><link rel="preconnect" href="https://cdn.test"><link rel="modulepreload" href="/m.js"><link rel="preload" as="script" href="/s.js"><link rel="preload" as="font" href="/font.woff2"><link rel="preload" as="document" href="/d.html"></head><body></body></html>"#,
        )
        .await;

        let html = document.to_html().unwrap();
        let font = document.resources()[0].src().to_string();
        assert!(html.contains(r#"<link rel="preconnect">"#));
        assert!(!html.contains("m.js"));
        assert!(!html.contains("s.js"));
        assert!(html.contains(&format!(r#"<link rel="preload" as="font" href="{font}">"#)));
        assert!(html.contains(r#"<link rel="preload" as="document">"#));
    }

    #[tokio::test]
    async fn test_preload_image_fetched_and_imagesrcset_dropped() {
        let fetcher = Arc::new(MemoryFetcher::new());
        fetcher.insert("https://x.test/hero.png", "image/png", "hero");
        let document = transformed(
            fetcher.clone(),
            r#"<html><head><link rel="preload" as="image" href="/hero.png" imagesrcset="/hero.png 1x, /hero2x.png 2x"></head><body></body></html>"#,
        )
        .await;

        let hero = document.resources()[0].src().to_string();
        let html = document.to_html().unwrap();
        assert!(html.contains(&format!(r#"<link rel="preload" as="image" href="{hero}">"#)));
        assert_eq!(fetcher.calls("https://x.test/hero2x.png"), 0);
    }

    #[tokio::test]
    async fn test_preload_style_is_sanitized() {
        let fetcher = Arc::new(MemoryFetcher::new());
        fetcher.insert("https://x.test/css/s.css", "text/css", "a { background-image: url(i.png) }");
        fetcher.insert("https://x.test/css/i.png", "image/png", "i");
        let document = transformed(
            fetcher,
            r#"<html><head><link rel="preload" as="style" href="/css/s.css"></head><body></body></html>"#,
        )
        .await;

        let img = document.store.create("https://x.test/css/i.png").await.unwrap();
        let css = document
            .resources()
            .into_iter()
            .find(|resource| resource.extension() == "css")
            .unwrap();
        assert_eq!(
            String::from_utf8_lossy(css.content()),
            format!("a {{ background-image: url({}); }}", img.src())
        );

        let html = document.to_html().unwrap();
        assert!(html.contains(&format!(r#"<link rel="preload" as="style" href="{}">"#, css.src())));
    }

    #[tokio::test]
    async fn test_multimedia_srcset_made_absolute_and_counted() {
        let fetcher = Arc::new(MemoryFetcher::new());
        let document = transformed(
            fetcher.clone(),
            r#"<html><body><video poster="/p.jpg"><source srcset="/v.webm 1x, clip.webm 2x"></video><audio src="/a.mp3" srcset="/b.mp3"></audio></body></html>"#,
        )
        .await;

        let html = document.to_html().unwrap();
        assert!(html.contains(
            r#"<video poster="https://x.test/p.jpg"><source srcset="https://x.test/v.webm 1x, https://x.test/clip.webm 2x"></video>"#
        ));
        assert!(html.contains(r#"<audio src="https://x.test/a.mp3"></audio>"#));
        assert_eq!(document.multimedia_count(), 2);
        assert_eq!(fetcher.calls("https://x.test/v.webm"), 0);
        assert!(document.resources().is_empty());
    }

    #[tokio::test]
    async fn test_img_srcset() {
        let fetcher = Arc::new(MemoryFetcher::new());
        fetcher.insert("https://x.test/a.png", "image/png", "a");
        fetcher.insert("https://x.test/b.png", "image/png", "b");
        let document = transformed(
            fetcher.clone(),
            r#"<html><body><img src="/a.png" srcset="/b.png 2x"><img srcset="/a.png 1x, /missing.png 2x, /b.png 3x"></body></html>"#,
        )
        .await;

        let store = &document.store;
        let a = store.create("https://x.test/a.png").await.unwrap();
        let b = store.create("https://x.test/b.png").await.unwrap();

        let html = document.to_html().unwrap();
        assert!(html.contains(&format!(r#"<img src="{}">"#, a.src())));
        assert!(html.contains(&format!(r#"<img srcset="{} 1x, {} 3x">"#, a.src(), b.src())));
        assert_eq!(fetcher.calls("https://x.test/a.png"), 1);
    }

    #[tokio::test]
    async fn test_icon_link_becomes_favicon() {
        let fetcher = Arc::new(MemoryFetcher::new());
        fetcher.insert("https://x.test/icon.png", "image/png", "ico");
        let document = transformed(
            fetcher.clone(),
            r#"<html><head><link rel="icon" href="/icon.png"></head><body></body></html>"#,
        )
        .await;

        assert_eq!(document.favicon().as_deref(), Some("data:image/png;base64,aWNv"));
        assert!(document
            .to_html()
            .unwrap()
            .contains(r#"<link rel="icon" href="data:image/png;base64,aWNv">"#));
        assert_eq!(fetcher.calls("https://x.test/favicon.ico"), 0);
        assert!(document.resources().is_empty());
    }

    #[tokio::test]
    async fn test_favicon_fallback_injects_link() {
        let fetcher = Arc::new(MemoryFetcher::new());
        fetcher.insert("https://x.test/favicon.ico", "image/x-icon", "ico");
        let document = transformed(fetcher, "<html><head></head><body></body></html>").await;

        assert_eq!(document.favicon().as_deref(), Some("data:image/x-icon;base64,aWNv"));
        assert!(document
            .to_html()
            .unwrap()
            .contains(r#"<head><link rel="icon" href="data:image/x-icon;base64,aWNv"></head>"#));
    }

    #[tokio::test]
    async fn test_iframe_from_frame_pool() {
        let fetcher = Arc::new(MemoryFetcher::new());
        fetcher.insert("https://x.test/c.png", "image/png", "c");
        let child = RawDocument {
            markup: r#"<html><body><script>x()</script><img src="c.png"></body></html>"#.to_string(),
            url: "https://x.test/child".to_string(),
            doctype: "<!DOCTYPE html>".to_string(),
            ..RawDocument::default()
        };
        let document = Document::new(
            &raw(r#"<html><body><iframe src="/child"></iframe><iframe src="/unknown"></iframe></body></html>"#),
            context(fetcher, vec![child]),
        )
        .unwrap();
        document.transform().await;

        let html = document.to_html().unwrap();
        let start = html.find("data:text/html;base64,").unwrap();
        let end = start + html[start..].find('"').unwrap();
        let frame = decode_frame(&html[start..end]);

        let image = document.resources();
        assert_eq!(image.len(), 1);
        assert!(frame.starts_with("<!DOCTYPE html><html>"));
        assert!(!frame.contains("<script"));
        assert!(frame.contains(&format!(r#"<img src="{}">"#, image[0].src())));
        assert!(html.contains(r#"<iframe src=""></iframe>"#));
    }

    #[tokio::test]
    async fn test_inline_iframe_payload() {
        let fetcher = Arc::new(MemoryFetcher::new());
        let payload = STANDARD.encode("<html><body><p onclick=\"x()\">inline</p></body></html>");
        let markup = format!(
            r#"<html><body><iframe {}="{}" {}="about:blank"></iframe></body></html>"#,
            IFRAME_HTML_ATTR, payload, IFRAME_URL_ATTR
        );
        let document = transformed(fetcher, &markup).await;

        let html = document.to_html().unwrap();
        assert!(!html.contains(IFRAME_HTML_ATTR));
        let start = html.find("data:text/html;base64,").unwrap();
        let end = start + html[start..].find('"').unwrap();
        let frame = decode_frame(&html[start..end]);
        assert!(frame.starts_with(INLINE_FRAME_DOCTYPE));
        assert!(frame.contains("<p>inline</p>"));
    }

    #[tokio::test]
    async fn test_self_referencing_frame_is_cut() {
        let fetcher = Arc::new(MemoryFetcher::new());
        let looping = RawDocument {
            markup: r#"<html><body><iframe src="/page"></iframe></body></html>"#.to_string(),
            url: PAGE.to_string(),
            ..RawDocument::default()
        };
        let document = Document::new(&looping, context(fetcher, vec![looping.clone()])).unwrap();
        document.transform().await;

        assert!(document
            .to_html()
            .unwrap()
            .contains(r#"<iframe src=""></iframe>"#));
    }

    #[tokio::test]
    async fn test_srcdoc_transformed() {
        let document = transformed(
            Arc::new(MemoryFetcher::new()),
            r#"<html><body><iframe srcdoc="<script>x()</script><b>hi</b>"></iframe></body></html>"#,
        )
        .await;

        let html = document.to_html().unwrap();
        assert!(!html.contains("script"));
        assert!(html.contains(r#"<iframe srcdoc="<html><head></head><body><b>hi</b></body></html>"></iframe>"#));
    }

    #[tokio::test]
    async fn test_html_attributes_and_visible_text() {
        let mut page = raw("<html><head><title> T </title></head><body><h1>Title</h1><p>Hello <b>you</b></p><div hidden>no</div></body></html>");
        page.attributes.insert("lang".to_string(), "en".to_string());
        let document = Document::new(&page, context(Arc::new(MemoryFetcher::new()), Vec::new())).unwrap();
        document.transform().await;

        assert!(document.to_html().unwrap().starts_with(r#"<html lang="en">"#));
        assert_eq!(document.visible_text(), vec!["Title", "Hello you"]);
        assert_eq!(document.title().as_deref(), Some("T"));
    }
}
