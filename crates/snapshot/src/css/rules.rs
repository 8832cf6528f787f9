//! CSS rule model and parser
//!
//! `cssparser` does the tokenizing and block matching; this module only
//! decides which closed `CssRule` variant a rule becomes and keeps enough raw
//! text to re-emit it. Values are never interpreted here.

use cssparser::{
    AtRuleParser, BasicParseErrorKind, CowRcStr, DeclarationParser, ParseError, Parser,
    ParserInput, ParserState, QualifiedRuleParser, RuleBodyItemParser, RuleBodyParser,
    StyleSheetParser, Token,
};

/// `name: value [!important]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    /// Lowercased, except custom properties which are case-sensitive
    pub name: String,
    /// Raw value text without the `!important` tail
    pub value: String,
    pub important: bool,
}

impl Declaration {
    pub fn new(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            important: false,
        }
    }

    pub fn is_custom_property(&self) -> bool {
        self.name.starts_with("--")
    }

    pub fn to_css(&self) -> String {
        if self.important {
            format!("{}: {} !important;", self.name, self.value)
        } else {
            format!("{}: {};", self.name, self.value)
        }
    }
}

pub fn declarations_to_css(declarations: &[Declaration]) -> String {
    declarations
        .iter()
        .map(Declaration::to_css)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Selector plus declaration block. Also used for keyframe selectors (`from`, `50%`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleRule {
    pub selector: String,
    pub declarations: Vec<Declaration>,
}

impl StyleRule {
    pub fn to_css(&self) -> String {
        if self.declarations.is_empty() {
            return format!("{} {{}}", self.selector);
        }
        format!("{} {{ {} }}", self.selector, declarations_to_css(&self.declarations))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRule {
    pub href: String,
    /// Everything after the URL (media queries, `layer(..)`, `supports(..)`)
    pub media: String,
}

/// `@media`, `@supports` and `@container`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupingRule {
    pub condition: String,
    pub rules: Vec<CssRule>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyframesRule {
    /// At-keyword as written, including vendor prefix (`-webkit-keyframes`)
    pub keyword: String,
    pub name: String,
    pub rules: Vec<CssRule>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerBlockRule {
    pub name: String,
    pub rules: Vec<CssRule>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FontFaceRule {
    pub declarations: Vec<Declaration>,
    /// Source text of the whole rule
    pub text: String,
}

impl FontFaceRule {
    pub fn src(&self) -> Option<&Declaration> {
        self.declarations.iter().find(|decl| decl.name == "src")
    }
}

/// Rule kept as source text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerbatimRule {
    /// Lowercased at-keyword without `@`
    pub name: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CssRule {
    Style(StyleRule),
    Import(ImportRule),
    Media(GroupingRule),
    FontFace(FontFaceRule),
    Page(VerbatimRule),
    Keyframes(KeyframesRule),
    Keyframe(StyleRule),
    Supports(GroupingRule),
    CounterStyle(VerbatimRule),
    Property(VerbatimRule),
    ViewTransition(VerbatimRule),
    Container(GroupingRule),
    LayerBlock(LayerBlockRule),
    LayerStatement(VerbatimRule),
    Unknown(VerbatimRule),
}

impl CssRule {
    pub fn kind(&self) -> &'static str {
        match self {
            CssRule::Style(_) => "style",
            CssRule::Import(_) => "import",
            CssRule::Media(_) => "media",
            CssRule::FontFace(_) => "font-face",
            CssRule::Page(_) => "page",
            CssRule::Keyframes(_) => "keyframes",
            CssRule::Keyframe(_) => "keyframe",
            CssRule::Supports(_) => "supports",
            CssRule::CounterStyle(_) => "counter-style",
            CssRule::Property(_) => "property",
            CssRule::ViewTransition(_) => "view-transition",
            CssRule::Container(_) => "container",
            CssRule::LayerBlock(_) => "layer-block",
            CssRule::LayerStatement(_) => "layer-statement",
            CssRule::Unknown(_) => "unknown",
        }
    }
}

/// Parse a stylesheet into rules. Invalid rules are skipped.
pub fn parse_stylesheet(css: &str) -> Vec<CssRule> {
    let mut input = ParserInput::new(css);
    let mut parser = Parser::new(&mut input);
    parse_rule_list(&mut parser, false)
}

fn parse_rule_list(input: &mut Parser, keyframes: bool) -> Vec<CssRule> {
    let mut rule_parser = RuleListParser { keyframes };
    StyleSheetParser::new(input, &mut rule_parser)
        .filter_map(|result| match result {
            Ok(rule) => Some(rule),
            Err((_, source)) => {
                tracing::debug!("[CssParser] Skipping invalid rule: {:?}", source);
                None
            }
        })
        .collect()
}

fn parse_declaration_block(input: &mut Parser) -> Vec<Declaration> {
    let mut body = DeclarationListParser;
    RuleBodyParser::new(input, &mut body)
        .filter_map(|result| match result {
            Ok(decl) => Some(decl),
            Err((_, source)) => {
                tracing::debug!("[CssParser] Skipping invalid declaration: {:?}", source);
                None
            }
        })
        .collect()
}

/// Consume the rest of `input` and return its trimmed source text
fn consume_raw(input: &mut Parser) -> String {
    let start = input.position();
    while input.next_including_whitespace_and_comments().is_ok() {}
    input.slice_from(start).trim().to_string()
}

fn split_important(raw: &str) -> (String, bool) {
    let trimmed = raw.trim();
    let lower = trimmed.to_ascii_lowercase();

    let head = lower
        .strip_suffix("important")
        .map(str::trim_end)
        .and_then(|head| head.strip_suffix('!'));

    match head {
        Some(head) => (trimmed[..head.len()].trim_end().to_string(), true),
        None => (trimmed.to_string(), false),
    }
}

/// `url("a.css") screen` / `'a.css'` / `url(a.css)` → href and trailing conditions
fn parse_import_prelude(raw: &str) -> Option<ImportRule> {
    let mut input = ParserInput::new(raw);
    let mut parser = Parser::new(&mut input);

    let token = parser.next().ok()?.clone();
    let href = match token {
        Token::UnquotedUrl(url) | Token::QuotedString(url) => url.to_string(),
        Token::Function(name) if name.eq_ignore_ascii_case("url") => parser
            .parse_nested_block(|input| expect_url_string(input))
            .ok()?,
        _ => return None,
    };

    Some(ImportRule {
        href,
        media: consume_raw(&mut parser),
    })
}

pub(super) fn expect_url_string<'i>(input: &mut Parser<'i, '_>) -> Result<String, ParseError<'i, ()>> {
    Ok(input.expect_string()?.to_string())
}

enum AtRulePrelude {
    Import(String),
    Media(String),
    Supports(String),
    Container(String),
    Keyframes { keyword: String, name: String },
    Layer(String),
    FontFace,
    Verbatim(VerbatimKind, String, String),
}

#[derive(Clone, Copy)]
enum VerbatimKind {
    Page,
    CounterStyle,
    Property,
    ViewTransition,
    Unknown,
}

impl VerbatimKind {
    fn into_rule(self, rule: VerbatimRule) -> CssRule {
        match self {
            VerbatimKind::Page => CssRule::Page(rule),
            VerbatimKind::CounterStyle => CssRule::CounterStyle(rule),
            VerbatimKind::Property => CssRule::Property(rule),
            VerbatimKind::ViewTransition => CssRule::ViewTransition(rule),
            VerbatimKind::Unknown => CssRule::Unknown(rule),
        }
    }
}

fn at_rule_head(name: &str, prelude: &str) -> String {
    if prelude.is_empty() {
        format!("@{}", name)
    } else {
        format!("@{} {}", name, prelude)
    }
}

/// Rule list parser, shared by the top level and every nested block
struct RuleListParser {
    /// Qualified rules are keyframe selectors
    keyframes: bool,
}

impl<'i> AtRuleParser<'i> for RuleListParser {
    type Prelude = AtRulePrelude;
    type AtRule = CssRule;
    type Error = ();

    fn parse_prelude<'t>(
        &mut self,
        name: CowRcStr<'i>,
        input: &mut Parser<'i, 't>,
    ) -> Result<Self::Prelude, ParseError<'i, Self::Error>> {
        let name = name.to_ascii_lowercase();
        let raw = consume_raw(input);

        let prelude = match name.as_str() {
            "import" => AtRulePrelude::Import(raw),
            "media" => AtRulePrelude::Media(raw),
            "supports" => AtRulePrelude::Supports(raw),
            "container" => AtRulePrelude::Container(raw),
            "keyframes" | "-webkit-keyframes" | "-moz-keyframes" | "-o-keyframes" => {
                AtRulePrelude::Keyframes {
                    keyword: name,
                    name: raw,
                }
            }
            "layer" => AtRulePrelude::Layer(raw),
            "font-face" => AtRulePrelude::FontFace,
            "page" => AtRulePrelude::Verbatim(VerbatimKind::Page, name, raw),
            "counter-style" => AtRulePrelude::Verbatim(VerbatimKind::CounterStyle, name, raw),
            "property" => AtRulePrelude::Verbatim(VerbatimKind::Property, name, raw),
            "view-transition" => AtRulePrelude::Verbatim(VerbatimKind::ViewTransition, name, raw),
            _ => AtRulePrelude::Verbatim(VerbatimKind::Unknown, name, raw),
        };
        Ok(prelude)
    }

    fn rule_without_block(
        &mut self,
        prelude: Self::Prelude,
        _start: &ParserState,
    ) -> Result<Self::AtRule, ()> {
        match prelude {
            AtRulePrelude::Import(raw) => parse_import_prelude(&raw).map(CssRule::Import).ok_or(()),
            AtRulePrelude::Layer(names) => Ok(CssRule::LayerStatement(VerbatimRule {
                text: format!("{};", at_rule_head("layer", &names)),
                name: "layer".to_string(),
            })),
            AtRulePrelude::Verbatim(kind, name, raw) => Ok(kind.into_rule(VerbatimRule {
                text: format!("{};", at_rule_head(&name, &raw)),
                name,
            })),
            _ => Err(()),
        }
    }

    fn parse_block<'t>(
        &mut self,
        prelude: Self::Prelude,
        _start: &ParserState,
        input: &mut Parser<'i, 't>,
    ) -> Result<Self::AtRule, ParseError<'i, Self::Error>> {
        let rule = match prelude {
            AtRulePrelude::Media(condition) => CssRule::Media(GroupingRule {
                condition,
                rules: parse_rule_list(input, false),
            }),
            AtRulePrelude::Supports(condition) => CssRule::Supports(GroupingRule {
                condition,
                rules: parse_rule_list(input, false),
            }),
            AtRulePrelude::Container(condition) => CssRule::Container(GroupingRule {
                condition,
                rules: parse_rule_list(input, false),
            }),
            AtRulePrelude::Keyframes { keyword, name } => CssRule::Keyframes(KeyframesRule {
                keyword,
                name,
                rules: parse_rule_list(input, true),
            }),
            AtRulePrelude::Layer(name) => CssRule::LayerBlock(LayerBlockRule {
                name,
                rules: parse_rule_list(input, false),
            }),
            AtRulePrelude::FontFace => {
                let body_start = input.position();
                let declarations = parse_declaration_block(input);
                let body = input.slice_from(body_start);
                CssRule::FontFace(FontFaceRule {
                    declarations,
                    text: format!("@font-face {{{}}}", body),
                })
            }
            AtRulePrelude::Verbatim(kind, name, raw) => {
                let body_start = input.position();
                while input.next_including_whitespace_and_comments().is_ok() {}
                let body = input.slice_from(body_start);
                kind.into_rule(VerbatimRule {
                    text: format!("{} {{{}}}", at_rule_head(&name, &raw), body),
                    name,
                })
            }
            AtRulePrelude::Import(_) => {
                return Err(input.new_error(BasicParseErrorKind::AtRuleBodyInvalid));
            }
        };
        Ok(rule)
    }
}

impl<'i> QualifiedRuleParser<'i> for RuleListParser {
    type Prelude = String;
    type QualifiedRule = CssRule;
    type Error = ();

    fn parse_prelude<'t>(
        &mut self,
        input: &mut Parser<'i, 't>,
    ) -> Result<Self::Prelude, ParseError<'i, Self::Error>> {
        Ok(consume_raw(input))
    }

    fn parse_block<'t>(
        &mut self,
        selector: Self::Prelude,
        _start: &ParserState,
        input: &mut Parser<'i, 't>,
    ) -> Result<Self::QualifiedRule, ParseError<'i, Self::Error>> {
        let rule = StyleRule {
            selector,
            declarations: parse_declaration_block(input),
        };
        if self.keyframes {
            Ok(CssRule::Keyframe(rule))
        } else {
            Ok(CssRule::Style(rule))
        }
    }
}

/// Declaration block parser, nested rules are rejected
struct DeclarationListParser;

impl<'i> DeclarationParser<'i> for DeclarationListParser {
    type Declaration = Declaration;
    type Error = ();

    fn parse_value<'t>(
        &mut self,
        name: CowRcStr<'i>,
        input: &mut Parser<'i, 't>,
        _declaration_start: &ParserState,
    ) -> Result<Self::Declaration, ParseError<'i, Self::Error>> {
        let name = if name.starts_with("--") {
            name.to_string()
        } else {
            name.to_ascii_lowercase()
        };
        let (value, important) = split_important(&consume_raw(input));

        Ok(Declaration {
            name,
            value,
            important,
        })
    }
}

impl<'i> AtRuleParser<'i> for DeclarationListParser {
    type Prelude = ();
    type AtRule = Declaration;
    type Error = ();

    fn parse_prelude<'t>(
        &mut self,
        name: CowRcStr<'i>,
        input: &mut Parser<'i, 't>,
    ) -> Result<Self::Prelude, ParseError<'i, Self::Error>> {
        Err(input.new_error(BasicParseErrorKind::AtRuleInvalid(name)))
    }
}

impl<'i> QualifiedRuleParser<'i> for DeclarationListParser {
    type Prelude = ();
    type QualifiedRule = Declaration;
    type Error = ();

    fn parse_prelude<'t>(
        &mut self,
        input: &mut Parser<'i, 't>,
    ) -> Result<Self::Prelude, ParseError<'i, Self::Error>> {
        Err(input.new_error(BasicParseErrorKind::QualifiedRuleInvalid))
    }
}

impl<'i> RuleBodyItemParser<'i, Declaration, ()> for DeclarationListParser {
    fn parse_declarations(&self) -> bool {
        true
    }

    fn parse_qualified(&self) -> bool {
        false
    }
}
