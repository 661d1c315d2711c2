//! A small HTML reader for scoping searches.
//!
//! Content pages are fragments of well-behaved HTML produced by an authoring
//! tool, so this reader keeps exactly what scoping needs:
//! - a token stream where every token remembers its byte range in the source
//! - an element tree over those tokens (void elements, raw-text elements and a
//!   handful of implicit closes)
//! - a CSS selector subset: type, `*`, `.class`, `#id`, attribute tests
//!   (`=`, `~=`, `|=`, `^=`, `$=`, `*=`), descendant and child combinators,
//!   selector lists
//!
//! Nothing here ever re-serializes a document. Rewrites happen by splicing the
//! original source at token ranges, so bytes outside a replaced match are
//! preserved exactly.

use once_cell::sync::Lazy;
use regex::Regex;
use std::ops::Range;

use crate::errors::{ScoutError, ScoutResult};

static TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^<(/)?([A-Za-z][A-Za-z0-9:_-]*)((?:[^>"']|"[^"]*"|'[^']*')*)>"#)
        .expect("tag pattern is valid")
});

static ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([^\s"'=<>/`]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#)
        .expect("attribute pattern is valid")
});

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea", "title"];

/// Start tags that implicitly close an open `<p>`
const CLOSES_PARAGRAPH: &[&str] = &[
    "address", "article", "aside", "blockquote", "div", "dl", "fieldset", "footer", "form",
    "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "main", "nav", "ol", "p", "pre",
    "section", "table", "ul",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Lower-cased attribute name
    pub name: String,
    /// Raw (undecoded) value; empty for bare attributes
    pub value: String,
    /// Source range of the whole attribute including the whitespace before it
    pub span: Range<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    StartTag {
        name: String,
        attributes: Vec<Attribute>,
        self_closing: bool,
    },
    EndTag {
        name: String,
    },
    Text,
    Comment,
    Doctype,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub range: Range<usize>,
}

impl Token {
    pub fn is_text(&self) -> bool {
        matches!(self.kind, TokenKind::Text)
    }
}

#[derive(Debug, Clone)]
pub struct Element {
    pub name: String,
    pub parent: Option<usize>,
    /// Token index of the start tag
    pub open_token: usize,
    /// Token index of the last token belonging to the element
    pub close_token: usize,
}

impl Element {
    pub fn tokens(&self) -> Range<usize> {
        self.open_token..self.close_token + 1
    }
}

/// A tokenized document with its element tree
#[derive(Debug, Clone)]
pub struct Document<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    elements: Vec<Element>,
}

impl<'a> Document<'a> {
    /// Tokenizes `source`. Fails only on an unterminated tag or comment.
    pub fn parse(source: &'a str) -> ScoutResult<Self> {
        let tokens = tokenize(source)?;
        let elements = build_tree(&tokens);
        Ok(Self {
            source,
            tokens,
            elements,
        })
    }

    pub fn source(&self) -> &'a str {
        self.source
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn token_text(&self, index: usize) -> &'a str {
        &self.source[self.tokens[index].range.clone()]
    }

    pub fn attributes(&self, element: usize) -> &[Attribute] {
        match &self.tokens[self.elements[element].open_token].kind {
            TokenKind::StartTag { attributes, .. } => attributes,
            _ => &[],
        }
    }

    pub fn attribute(&self, element: usize, name: &str) -> Option<&str> {
        self.attributes(element)
            .iter()
            .find(|attr| attr.name == name)
            .map(|attr| attr.value.as_str())
    }

    /// Source range covered by an element, start tag to end tag
    pub fn element_range(&self, element: usize) -> Range<usize> {
        let el = &self.elements[element];
        self.tokens[el.open_token].range.start..self.tokens[el.close_token].range.end
    }

    /// Concatenated text tokens of an element
    pub fn text_content(&self, element: usize) -> String {
        self.elements[element]
            .tokens()
            .filter(|&i| self.tokens[i].is_text())
            .map(|i| self.token_text(i))
            .collect()
    }

    /// Whether `ancestor` strictly contains `element`
    pub fn contains(&self, ancestor: usize, element: usize) -> bool {
        let mut current = self.elements[element].parent;
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.elements[parent].parent;
        }
        false
    }

    /// All elements matching `selector`, in document order
    pub fn select(&self, selector: &Selector) -> Vec<usize> {
        (0..self.elements.len())
            .filter(|&el| selector.matches(self, el))
            .collect()
    }

    /// The first element matching `selector`
    pub fn select_first(&self, selector: &Selector) -> Option<usize> {
        (0..self.elements.len()).find(|&el| selector.matches(self, el))
    }

    /// Drops every element nested inside another element of the same list
    pub fn outermost(&self, elements: &[usize]) -> Vec<usize> {
        elements
            .iter()
            .copied()
            .filter(|&el| !elements.iter().any(|&other| other != el && self.contains(other, el)))
            .collect()
    }
}

fn tokenize(source: &str) -> ScoutResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut pos = 0;
    let mut text_start = 0;

    while let Some(found) = source[pos..].find('<') {
        let lt = pos + found;
        let rest = &source[lt..];

        let (kind, end) = if rest.starts_with("<!--") {
            let close = rest[4..].find("-->").ok_or_else(|| {
                ScoutError::parse_failed(format!("unterminated comment at byte {}", lt))
            })?;
            (TokenKind::Comment, lt + 4 + close + 3)
        } else if rest.starts_with("<!") || rest.starts_with("<?") {
            let close = rest.find('>').ok_or_else(|| {
                ScoutError::parse_failed(format!("unterminated declaration at byte {}", lt))
            })?;
            (TokenKind::Doctype, lt + close + 1)
        } else if let Some(caps) = TAG_RE.captures(rest) {
            let whole = caps.get(0).map_or(0, |m| m.end());
            let name = caps[2].to_ascii_lowercase();
            if caps.get(1).is_some() {
                (TokenKind::EndTag { name }, lt + whole)
            } else {
                let attr_match = caps.get(3).map_or(0..0, |m| m.range());
                let attr_text = &rest[attr_match.clone()];
                let self_closing = attr_text.trim_end().ends_with('/');
                let attributes = parse_attributes(attr_text, lt + attr_match.start);
                (
                    TokenKind::StartTag {
                        name,
                        attributes,
                        self_closing,
                    },
                    lt + whole,
                )
            }
        } else if rest[1..].starts_with(|c: char| c.is_ascii_alphabetic() || c == '/') {
            return Err(ScoutError::parse_failed(format!(
                "unterminated tag at byte {}",
                lt
            )));
        } else {
            // A literal '<' in text
            pos = lt + 1;
            continue;
        };

        if text_start < lt {
            tokens.push(Token {
                kind: TokenKind::Text,
                range: text_start..lt,
            });
        }

        let raw_text_name = match &kind {
            TokenKind::StartTag {
                name, self_closing, ..
            } if !self_closing && RAW_TEXT_ELEMENTS.contains(&name.as_str()) => Some(name.clone()),
            _ => None,
        };
        tokens.push(Token {
            kind,
            range: lt..end,
        });
        pos = end;
        text_start = end;

        if let Some(name) = raw_text_name {
            let closing = format!("</{}", name);
            let body_end = source[end..]
                .to_ascii_lowercase()
                .find(&closing)
                .map_or(source.len(), |i| end + i);
            if body_end > end {
                tokens.push(Token {
                    kind: TokenKind::Text,
                    range: end..body_end,
                });
            }
            pos = body_end;
            text_start = body_end;
        }
    }

    if text_start < source.len() {
        tokens.push(Token {
            kind: TokenKind::Text,
            range: text_start..source.len(),
        });
    }
    Ok(tokens)
}

fn parse_attributes(text: &str, base: usize) -> Vec<Attribute> {
    ATTR_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map_or("", |m| m.as_str());
            let lead = text[..whole.start()]
                .chars()
                .rev()
                .take_while(|c| c.is_whitespace())
                .map(char::len_utf8)
                .sum::<usize>();
            Some(Attribute {
                name: caps[1].to_ascii_lowercase(),
                value: value.to_string(),
                span: base + whole.start() - lead..base + whole.end(),
            })
        })
        .collect()
}

fn build_tree(tokens: &[Token]) -> Vec<Element> {
    let mut elements: Vec<Element> = Vec::new();
    let mut open: Vec<usize> = Vec::new();

    for (index, token) in tokens.iter().enumerate() {
        match &token.kind {
            TokenKind::StartTag {
                name, self_closing, ..
            } => {
                if let Some(&top) = open.last() {
                    let top_name = elements[top].name.as_str();
                    let implicit = (top_name == "p" && CLOSES_PARAGRAPH.contains(&name.as_str()))
                        || (top_name == "li" && name == "li")
                        || (matches!(top_name, "td" | "th") && matches!(name.as_str(), "td" | "th" | "tr"))
                        || (top_name == "option" && name == "option");
                    if implicit {
                        open.pop();
                        elements[top].close_token = index - 1;
                    }
                }

                let element = elements.len();
                elements.push(Element {
                    name: name.clone(),
                    parent: open.last().copied(),
                    open_token: index,
                    close_token: index,
                });
                if !self_closing && !VOID_ELEMENTS.contains(&name.as_str()) {
                    open.push(element);
                }
            }
            TokenKind::EndTag { name } => {
                if let Some(pos) = open.iter().rposition(|&el| elements[el].name == *name) {
                    for (offset, el) in open.drain(pos..).enumerate() {
                        elements[el].close_token = if offset == 0 { index } else { index - 1 };
                    }
                }
            }
            _ => {}
        }
    }

    let last = tokens.len().saturating_sub(1);
    for el in open {
        elements[el].close_token = last;
    }
    elements
}

/// A parsed CSS selector list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    alternatives: Vec<Complex>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Complex {
    parts: Vec<Compound>,
    /// `combinators[i]` joins `parts[i]` and `parts[i + 1]`
    combinators: Vec<Combinator>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    ids: Vec<String>,
    classes: Vec<String>,
    attributes: Vec<AttributeTest>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttributeTest {
    name: String,
    test: Option<(AttributeOp, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttributeOp {
    Equals,
    Includes,
    DashMatch,
    Prefix,
    Suffix,
    Substring,
}

impl Selector {
    pub fn parse(input: &str) -> ScoutResult<Self> {
        let mut parser = SelectorParser {
            chars: input.chars().collect(),
            pos: 0,
            input,
        };
        let mut alternatives = vec![parser.complex()?];
        while parser.eat(',') {
            alternatives.push(parser.complex()?);
        }
        parser.skip_whitespace();
        if parser.pos < parser.chars.len() {
            return Err(parser.error("unexpected character"));
        }
        Ok(Self { alternatives })
    }

    pub fn matches(&self, doc: &Document<'_>, element: usize) -> bool {
        self.alternatives.iter().any(|complex| {
            let last = complex.parts.len() - 1;
            complex.parts[last].matches(doc, element) && complex.matches_from(doc, element, last)
        })
    }
}

impl Complex {
    fn matches_from(&self, doc: &Document<'_>, element: usize, index: usize) -> bool {
        if index == 0 {
            return true;
        }
        let target = &self.parts[index - 1];
        let mut current = doc.elements[element].parent;
        match self.combinators[index - 1] {
            Combinator::Child => current.is_some_and(|parent| {
                target.matches(doc, parent) && self.matches_from(doc, parent, index - 1)
            }),
            Combinator::Descendant => {
                while let Some(ancestor) = current {
                    if target.matches(doc, ancestor) && self.matches_from(doc, ancestor, index - 1)
                    {
                        return true;
                    }
                    current = doc.elements[ancestor].parent;
                }
                false
            }
        }
    }
}

impl Compound {
    fn is_empty(&self) -> bool {
        self.tag.is_none() && self.ids.is_empty() && self.classes.is_empty() && self.attributes.is_empty()
    }

    fn matches(&self, doc: &Document<'_>, element: usize) -> bool {
        if let Some(tag) = &self.tag {
            if doc.elements[element].name != *tag {
                return false;
            }
        }
        if !self.ids.is_empty() {
            let id = doc.attribute(element, "id").unwrap_or("");
            if self.ids.iter().any(|wanted| wanted != id) {
                return false;
            }
        }
        if !self.classes.is_empty() {
            let classes = doc.attribute(element, "class").unwrap_or("");
            if !self
                .classes
                .iter()
                .all(|wanted| classes.split_whitespace().any(|c| c == wanted))
            {
                return false;
            }
        }
        self.attributes.iter().all(|test| {
            let Some(value) = doc.attribute(element, &test.name) else {
                return false;
            };
            match &test.test {
                None => true,
                Some((op, expected)) => match op {
                    AttributeOp::Equals => value == expected,
                    AttributeOp::Includes => value.split_whitespace().any(|v| v == expected),
                    AttributeOp::DashMatch => {
                        value == expected || value.starts_with(&format!("{}-", expected))
                    }
                    AttributeOp::Prefix => !expected.is_empty() && value.starts_with(expected.as_str()),
                    AttributeOp::Suffix => !expected.is_empty() && value.ends_with(expected.as_str()),
                    AttributeOp::Substring => !expected.is_empty() && value.contains(expected.as_str()),
                },
            }
        })
    }
}

struct SelectorParser<'s> {
    chars: Vec<char>,
    pos: usize,
    input: &'s str,
}

impl SelectorParser<'_> {
    fn error(&self, what: &str) -> ScoutError {
        ScoutError::parse_failed(format!(
            "invalid selector '{}': {} at position {}",
            self.input, what, self.pos
        ))
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn eat(&mut self, c: char) -> bool {
        self.skip_whitespace();
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn skip_whitespace(&mut self) -> bool {
        let start = self.pos;
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
        self.pos > start
    }

    fn complex(&mut self) -> ScoutResult<Complex> {
        self.skip_whitespace();
        let mut parts = vec![self.compound()?];
        let mut combinators = Vec::new();
        loop {
            let had_whitespace = self.skip_whitespace();
            match self.peek() {
                None | Some(',') => break,
                Some('>') => {
                    self.pos += 1;
                    self.skip_whitespace();
                    combinators.push(Combinator::Child);
                }
                Some('+') | Some('~') => return Err(self.error("sibling combinators are not supported")),
                Some(_) if had_whitespace => combinators.push(Combinator::Descendant),
                Some(_) => return Err(self.error("unexpected character")),
            }
            parts.push(self.compound()?);
        }
        Ok(Complex { parts, combinators })
    }

    fn compound(&mut self) -> ScoutResult<Compound> {
        let mut compound = Compound::default();
        let mut universal = false;
        if self.peek() == Some('*') {
            self.pos += 1;
            universal = true;
        } else if self.peek().is_some_and(is_ident_char) {
            compound.tag = Some(self.ident()?.to_ascii_lowercase());
        }
        loop {
            match self.peek() {
                Some('.') => {
                    self.pos += 1;
                    compound.classes.push(self.ident()?);
                }
                Some('#') => {
                    self.pos += 1;
                    compound.ids.push(self.ident()?);
                }
                Some('[') => {
                    self.pos += 1;
                    compound.attributes.push(self.attribute()?);
                }
                Some(':') => return Err(self.error("pseudo-classes are not supported")),
                _ => break,
            }
        }
        if compound.is_empty() && !universal {
            return Err(self.error("expected a selector"));
        }
        Ok(compound)
    }

    fn ident(&mut self) -> ScoutResult<String> {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_char) {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(self.error("expected a name"));
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn attribute(&mut self) -> ScoutResult<AttributeTest> {
        self.skip_whitespace();
        let name = self.ident()?.to_ascii_lowercase();
        self.skip_whitespace();
        if self.peek() == Some(']') {
            self.pos += 1;
            return Ok(AttributeTest { name, test: None });
        }

        let op = match self.peek() {
            Some('=') => AttributeOp::Equals,
            Some('~') => AttributeOp::Includes,
            Some('|') => AttributeOp::DashMatch,
            Some('^') => AttributeOp::Prefix,
            Some('$') => AttributeOp::Suffix,
            Some('*') => AttributeOp::Substring,
            _ => return Err(self.error("expected an attribute operator")),
        };
        self.pos += 1;
        if op != AttributeOp::Equals {
            if self.peek() != Some('=') {
                return Err(self.error("expected '='"));
            }
            self.pos += 1;
        }
        self.skip_whitespace();

        let value = match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.pos += 1;
                let start = self.pos;
                while self.peek().is_some_and(|c| c != quote) {
                    self.pos += 1;
                }
                if self.peek().is_none() {
                    return Err(self.error("unterminated string"));
                }
                let value: String = self.chars[start..self.pos].iter().collect();
                self.pos += 1;
                value
            }
            _ => self.ident()?,
        };
        self.skip_whitespace();
        if self.peek() != Some(']') {
            return Err(self.error("expected ']'"));
        }
        self.pos += 1;
        Ok(AttributeTest {
            name,
            test: Some((op, value)),
        })
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_' || !c.is_ascii()
}

/// Pretty-prints a document one tag or text node per line, indented by two
/// spaces per level. Unparseable content is returned as is.
pub fn format_html(source: &str) -> String {
    let Ok(doc) = Document::parse(source) else {
        return source.to_string();
    };

    let mut lines = Vec::new();
    let mut depth = 0usize;
    for (index, token) in doc.tokens().iter().enumerate() {
        let text = doc.token_text(index).trim();
        if text.is_empty() {
            continue;
        }
        if matches!(token.kind, TokenKind::EndTag { .. }) {
            depth = depth.saturating_sub(1);
        }
        lines.push(format!("{}{}", "  ".repeat(depth), text));
        if let TokenKind::StartTag {
            name, self_closing, ..
        } = &token.kind
        {
            if !self_closing && !VOID_ELEMENTS.contains(&name.as_str()) {
                depth += 1;
            }
        }
    }
    lines.join("\n")
}

/// Named character references decoded in text nodes
const NAMED_ENTITIES: &[(&str, char)] = &[
    ("amp", '&'),
    ("lt", '<'),
    ("gt", '>'),
    ("quot", '"'),
    ("apos", '\''),
    ("nbsp", '\u{a0}'),
    ("copy", '\u{a9}'),
    ("reg", '\u{ae}'),
    ("trade", '\u{2122}'),
    ("hellip", '\u{2026}'),
    ("ndash", '\u{2013}'),
    ("mdash", '\u{2014}'),
    ("lsquo", '\u{2018}'),
    ("rsquo", '\u{2019}'),
    ("ldquo", '\u{201c}'),
    ("rdquo", '\u{201d}'),
    ("laquo", '\u{ab}'),
    ("raquo", '\u{bb}'),
    ("middot", '\u{b7}'),
    ("bull", '\u{2022}'),
    ("euro", '\u{20ac}'),
];

/// Decodes the character reference at the start of `text`, returning the
/// character and the length of the reference. References must end in `;`.
pub fn decode_entity(text: &str) -> Option<(char, usize)> {
    let body = text.strip_prefix('&')?;
    let end = body.find(';').filter(|&end| end > 0 && end <= 32)?;
    let name = &body[..end];
    let decoded = if let Some(number) = name.strip_prefix('#') {
        let code = match number.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => number.parse().ok()?,
        };
        match char::from_u32(code)? {
            '\0' => '\u{fffd}',
            c => c,
        }
    } else {
        NAMED_ENTITIES
            .iter()
            .find(|(entity, _)| *entity == name)
            .map(|(_, c)| *c)?
    };
    Some((decoded, end + 2))
}

/// Escapes text for insertion into a text node
pub fn escape_text(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Text assembled from slices of a source document, with a map back.
///
/// A segment is either copied verbatim from the source or is a single
/// decoded character reference. Verbatim segments map byte for byte; a
/// decoded segment maps only as a whole, to the full reference. A range maps
/// back when the segments it covers sit on one line and are adjacent in the
/// source.
#[derive(Debug, Clone, Default)]
pub struct Projection {
    text: String,
    segments: Vec<Segment>,
}

#[derive(Debug, Clone)]
struct Segment {
    projected_start: usize,
    projected_len: usize,
    source: Range<usize>,
    text_node: bool,
    decoded: bool,
}

impl Segment {
    fn projected_end(&self) -> usize {
        self.projected_start + self.projected_len
    }
}

impl Projection {
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Appends one line made of the given source slices, verbatim
    pub fn push_line(&mut self, source: &str, pieces: &[Range<usize>], text_node: bool) {
        if !self.start_line(pieces) {
            return;
        }
        for piece in pieces.iter().filter(|r| !r.is_empty()) {
            self.push_verbatim(source, piece.clone(), text_node);
        }
    }

    /// Appends one line of text-node slices with character references decoded
    pub fn push_decoded_line(&mut self, source: &str, pieces: &[Range<usize>]) {
        if !self.start_line(pieces) {
            return;
        }
        for piece in pieces.iter().filter(|r| !r.is_empty()) {
            let mut verbatim_start = piece.start;
            let mut cursor = piece.start;
            while let Some(found) = source[cursor..piece.end].find('&') {
                let at = cursor + found;
                match decode_entity(&source[at..piece.end]) {
                    Some((decoded, len)) => {
                        self.push_verbatim(source, verbatim_start..at, true);
                        self.segments.push(Segment {
                            projected_start: self.text.len(),
                            projected_len: decoded.len_utf8(),
                            source: at..at + len,
                            text_node: true,
                            decoded: true,
                        });
                        self.text.push(decoded);
                        cursor = at + len;
                        verbatim_start = cursor;
                    }
                    None => cursor = at + 1,
                }
            }
            self.push_verbatim(source, verbatim_start..piece.end, true);
        }
    }

    fn start_line(&mut self, pieces: &[Range<usize>]) -> bool {
        if pieces.iter().all(|r| r.is_empty()) {
            return false;
        }
        if !self.text.is_empty() {
            self.text.push('\n');
        }
        true
    }

    fn push_verbatim(&mut self, source: &str, range: Range<usize>, text_node: bool) {
        if range.is_empty() {
            return;
        }
        self.segments.push(Segment {
            projected_start: self.text.len(),
            projected_len: range.len(),
            source: range.clone(),
            text_node,
            decoded: false,
        });
        self.text.push_str(&source[range]);
    }

    /// Maps a projected range back to the source, if it is contiguous there.
    /// With `text_only`, ranges inside tags do not map.
    pub fn source_range(&self, range: Range<usize>, text_only: bool) -> Option<Range<usize>> {
        let first = self
            .segments
            .partition_point(|seg| seg.projected_start <= range.start)
            .checked_sub(1)?;
        let mut start = None;
        let mut previous: Option<&Segment> = None;
        for seg in &self.segments[first..] {
            if text_only && !seg.text_node {
                return None;
            }
            if let Some(prev) = previous {
                if seg.projected_start != prev.projected_end() || seg.source.start != prev.source.end {
                    return None;
                }
            }
            if start.is_none() {
                let offset = range.start - seg.projected_start;
                if offset >= seg.projected_len || (seg.decoded && offset != 0) {
                    return None;
                }
                start = Some(seg.source.start + offset);
            }
            if range.end <= seg.projected_end() {
                let offset = range.end - seg.projected_start;
                let end = if seg.decoded {
                    if offset != seg.projected_len {
                        return None;
                    }
                    seg.source.end
                } else {
                    seg.source.start + offset
                };
                return start.map(|start| start..end);
            }
            previous = Some(seg);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<body><header></header><main><div><h1 id="top">Welcome</h1><p>Hello <a href="https://example.com/x">there</a></p><div class="hero block"><p>Hero text</p></div></div><div><div class="metadata"><div><div>Title</div><div>Hello page</div></div></div></div></main></body>"#;

    #[test]
    fn test_tokenize_keeps_ranges() {
        let doc = Document::parse(PAGE).unwrap();
        let rebuilt: String = doc.tokens().iter().map(|t| &PAGE[t.range.clone()]).collect();
        assert_eq!(rebuilt, PAGE);
        assert!(doc.elements().iter().any(|e| e.name == "main"));
    }

    #[test]
    fn test_attributes() {
        let doc = Document::parse(r#"<img src="a.png" alt='Logo' hidden data-x=1>"#).unwrap();
        let attrs = doc.attributes(0);
        assert_eq!(attrs.len(), 4);
        assert_eq!(attrs[0].name, "src");
        assert_eq!(attrs[0].value, "a.png");
        assert_eq!(attrs[1].value, "Logo");
        assert_eq!(attrs[2].value, "");
        assert_eq!(attrs[3].value, "1");
        assert_eq!(&doc.source()[attrs[0].span.clone()], r#" src="a.png""#);
    }

    #[test]
    fn test_unterminated_tag_fails() {
        assert!(Document::parse("<p>ok</p><div class=\"x\"").is_err());
        assert!(Document::parse("<!-- never closed").is_err());
        // A bare '<' in text is fine
        assert!(Document::parse("<p>1 < 2</p>").is_ok());
    }

    #[test]
    fn test_tree_with_implicit_close() {
        let doc = Document::parse("<div><p>One<p>Two</div><br><span>x</span>").unwrap();
        let names: Vec<_> = doc.elements().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["div", "p", "p", "br", "span"]);
        assert_eq!(doc.text_content(1), "One");
        assert_eq!(doc.text_content(0), "OneTwo");
        assert_eq!(doc.elements()[2].parent, Some(0));
        assert_eq!(doc.elements()[3].parent, None);
    }

    #[test]
    fn test_raw_text_elements() {
        let doc = Document::parse("<script>if (a<b) {}</script><p>x</p>").unwrap();
        assert_eq!(doc.text_content(0), "if (a<b) {}");
        assert_eq!(doc.elements().len(), 2);
    }

    #[test]
    fn test_selectors() {
        let doc = Document::parse(PAGE).unwrap();
        let select = |s: &str| -> Vec<String> {
            doc.select(&Selector::parse(s).unwrap())
                .into_iter()
                .map(|el| doc.text_content(el))
                .collect()
        };

        assert_eq!(select("h1"), vec!["Welcome"]);
        assert_eq!(select("#top"), vec!["Welcome"]);
        assert_eq!(select(".hero"), vec!["Hero text"]);
        assert_eq!(select("[class*=\"block\"]"), vec!["Hero text"]);
        assert_eq!(select("main > div > h1"), vec!["Welcome"]);
        assert_eq!(select("body h1, .hero p").len(), 2);
        assert_eq!(select("a[href^='https://']"), vec!["there"]);
        assert!(select("main > h1").is_empty());
        assert_eq!(select(".metadata").len(), 1);
    }

    #[test]
    fn test_invalid_selectors() {
        for bad in ["", "div >", "p:first-child", "a + b", "[href", "[x=\"y]", ".", "div,"] {
            assert!(
                matches!(Selector::parse(bad), Err(ScoutError::ParseFailed(_))),
                "{bad} should not parse"
            );
        }
    }

    #[test]
    fn test_outermost() {
        let doc = Document::parse(r#"<div class="block"><div class="block">x</div></div>"#).unwrap();
        let all = doc.select(&Selector::parse(".block").unwrap());
        assert_eq!(all.len(), 2);
        assert_eq!(doc.outermost(&all), vec![0]);
    }

    #[test]
    fn test_format_html() {
        let formatted = format_html("<div><p>Hello</p><br><p>World</p></div>");
        assert_eq!(
            formatted,
            "<div>\n  <p>\n    Hello\n  </p>\n  <br>\n  <p>\n    World\n  </p>\n</div>"
        );
    }

    #[test]
    fn test_projection_maps_back() {
        let source = "<p>Hello</p>";
        let mut projection = Projection::default();
        projection.push_line(source, &[0..3], false);
        projection.push_line(source, &[3..8], true);
        assert_eq!(projection.text(), "<p>\nHello");
        assert_eq!(projection.source_range(4..9, true), Some(3..8));
        assert_eq!(projection.source_range(0..2, true), None);
        assert_eq!(projection.source_range(0..2, false), Some(0..2));
        // Spans the line break
        assert_eq!(projection.source_range(2..5, false), None);
    }

    #[test]
    fn test_decoded_projection_maps_whole_references() {
        let source = "<p>Terms &amp; Conditions&nbsp;apply</p>";
        let text = 3..source.len() - 4;
        let mut projection = Projection::default();
        projection.push_decoded_line(source, &[text]);
        assert_eq!(projection.text(), "Terms & Conditions\u{a0}apply");

        let phrase = projection.text().find("Conditions").unwrap();
        assert_eq!(
            projection.source_range(0..phrase + 10, true),
            Some(3..source.find("&nbsp;").unwrap())
        );
        // The decoded '&' alone maps to the whole reference
        assert_eq!(projection.source_range(6..7, true), Some(9..14));
        // A multi-byte decoded character maps to its whole reference
        let nbsp = projection.text().find('\u{a0}').unwrap();
        assert_eq!(projection.source_range(nbsp..nbsp + 2, true), Some(25..31));
    }

    #[test]
    fn test_decode_entity() {
        assert_eq!(decode_entity("&amp; rest"), Some(('&', 5)));
        assert_eq!(decode_entity("&#38;"), Some(('&', 5)));
        assert_eq!(decode_entity("&#x26;"), Some(('&', 6)));
        assert_eq!(decode_entity("&nbsp;"), Some(('\u{a0}', 6)));
        assert_eq!(decode_entity("& amp;"), None);
        assert_eq!(decode_entity("&unknown;"), None);
        assert_eq!(decode_entity("&amp"), None);
        assert_eq!(escape_text("a < b & c"), "a &lt; b &amp; c");
    }
}
