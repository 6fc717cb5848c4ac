//! Inline bracket markup for dialogue text.
//!
//! Lines and option labels may carry a small amount of formatting that the
//! presentation layer interprets. Parsing turns the source into plain text
//! plus a list of [`Segment`]s, each carrying the stack of [`Wrapper`]s that
//! apply to a character range.
//!
//! # Syntax
//! - `[b]bold[/b]` opens and closes a wrapper
//! - `[wave speed=2 loud]...[/wave]` attaches properties (`speed: 2`, `loud: true`)
//! - `[color=red]...[/color]` is shorthand for a property named after the tag
//! - `[br/]` (or `[br]`) is a zero-width marker
//! - `[nomarkup]...[/nomarkup]` disables tag processing inside
//! - `\[`, `\]` and `\\` produce literal characters
//!
//! Malformed markup never fails: anything that cannot be understood is kept
//! as literal text. Segment positions count `char`s, not bytes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tag names treated as conventional inline styles.
pub const DEFAULT_TAGS: [&str; 10] = ["b", "em", "small", "strong", "sub", "sup", "ins", "del", "mark", "br"];

/// Tags that never wrap text.
pub const SELF_CLOSING_TAGS: [&str; 1] = ["br"];

const NOMARKUP: &str = "nomarkup";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WrapperKind {
    Default,
    Custom,
}

impl WrapperKind {
    pub fn classify(name: &str) -> Self {
        if DEFAULT_TAGS.contains(&name) {
            WrapperKind::Default
        } else {
            WrapperKind::Custom
        }
    }
}

/// A typed markup property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MarkupValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wrapper {
    pub name: String,
    pub kind: WrapperKind,
    #[serde(default)]
    pub properties: BTreeMap<String, MarkupValue>,
}

impl Wrapper {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let kind = WrapperKind::classify(&name);
        Self {
            name,
            kind,
            properties: BTreeMap::new(),
        }
    }
}

/// A half-open `[start, end)` char range with its wrapper stack, or a
/// zero-width marker when `self_closing` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: usize,
    pub end: usize,
    #[serde(default)]
    pub wrappers: Vec<Wrapper>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub self_closing: bool,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_false(value: &bool) -> bool {
    !*value
}

impl Segment {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MarkupResult {
    pub text: String,
    #[serde(default)]
    pub segments: Vec<Segment>,
}

impl MarkupResult {
    /// Result for text with no formatting at all.
    pub fn plain(text: impl Into<String>) -> Self {
        let text = text.into();
        let len = text.chars().count();
        Self {
            text,
            segments: merge_segments(Vec::new(), len),
        }
    }

    /// True when any segment is a marker or carries a wrapper.
    pub fn has_formatting(&self) -> bool {
        self.segments.iter().any(|s| s.self_closing || !s.wrappers.is_empty())
    }

    /// `None` when the result carries no formatting, so callers can store
    /// `Option<MarkupResult>` and test for markup cheaply.
    pub fn normalized(self) -> Option<Self> {
        self.has_formatting().then_some(self)
    }

    /// Wrappers covering the char at `index` (empty when unwrapped or out of range).
    pub fn wrappers_at(&self, index: usize) -> &[Wrapper] {
        self.segments
            .iter()
            .find(|s| !s.self_closing && s.start <= index && index < s.end)
            .map_or(&[], |s| s.wrappers.as_slice())
    }

    /// Zero-width markers anchored at `index`.
    pub fn markers_at(&self, index: usize) -> impl Iterator<Item = &Segment> {
        self.segments.iter().filter(move |s| s.self_closing && s.start == index)
    }

    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Incrementally builds a [`MarkupResult`], extending the running segment
/// while the wrapper stack stays the same.
#[derive(Debug, Default)]
pub struct SegmentBuilder {
    text: String,
    len: usize,
    segments: Vec<Segment>,
    current: Option<Segment>,
}

impl SegmentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of chars appended so far.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn push_char(&mut self, ch: char, wrappers: &[Wrapper]) {
        let index = self.len;
        self.text.push(ch);
        self.len += 1;
        if let Some(seg) = self.current.as_mut()
            && seg.end == index
            && seg.wrappers == wrappers
        {
            seg.end = index + 1;
            return;
        }
        self.flush();
        self.current = Some(Segment {
            start: index,
            end: index + 1,
            wrappers: wrappers.to_vec(),
            self_closing: false,
        });
    }

    pub fn push_str(&mut self, text: &str, wrappers: &[Wrapper]) {
        for ch in text.chars() {
            self.push_char(ch, wrappers);
        }
    }

    /// Emit a zero-width marker at the current position.
    pub fn marker(&mut self, wrapper: Wrapper) {
        self.flush();
        self.segments.push(Segment {
            start: self.len,
            end: self.len,
            wrappers: vec![wrapper],
            self_closing: true,
        });
    }

    /// Close the running segment so the next char starts a new one.
    pub fn flush(&mut self) {
        if let Some(seg) = self.current.take() {
            self.segments.push(seg);
        }
    }

    pub fn finish(mut self) -> MarkupResult {
        self.flush();
        MarkupResult {
            segments: merge_segments(self.segments, self.len),
            text: self.text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagKind {
    Open,
    Close,
    SelfClosing,
}

#[derive(Debug)]
struct ParsedTag {
    kind: TagKind,
    name: String,
    properties: BTreeMap<String, MarkupValue>,
}

impl ParsedTag {
    fn into_wrapper(self) -> Wrapper {
        Wrapper {
            kind: WrapperKind::classify(&self.name),
            name: self.name,
            properties: self.properties,
        }
    }
}

/// Source text of an open tag and where its wrapper began applying.
struct OpenTag {
    source: String,
    segment_index: usize,
}

/// Parse inline markup into text and segments.
///
/// ```
/// use parley_data::markup::{WrapperKind, parse_markup};
///
/// let result = parse_markup("[b]bold[/b]");
/// assert_eq!(result.text, "bold");
/// assert_eq!(result.segments.len(), 1);
/// assert_eq!(result.segments[0].wrappers[0].name, "b");
/// assert_eq!(result.segments[0].wrappers[0].kind, WrapperKind::Default);
/// ```
pub fn parse_markup(input: &str) -> MarkupResult {
    let chars: Vec<char> = input.chars().collect();
    let closing = closing_brackets(&chars);
    let mut out = SegmentBuilder::new();
    let mut active: Vec<Wrapper> = Vec::new();
    let mut opened: Vec<OpenTag> = Vec::new();
    let mut nomarkup_depth = 0usize;
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        if ch == '\\'
            && let Some(&next) = chars.get(i + 1)
            && matches!(next, '[' | ']' | '\\')
        {
            out.push_char(next, &active);
            i += 2;
            continue;
        }

        if ch == '['
            && let Some(close) = closing[i + 1]
        {
            let content: String = chars[i + 1..close].iter().collect();
            let original: String = chars[i..=close].iter().collect();
            i = close + 1;

            let Some(tag) = parse_tag(&content) else {
                out.push_str(&original, &active);
                continue;
            };

            if tag.name == NOMARKUP {
                match tag.kind {
                    TagKind::Open => nomarkup_depth += 1,
                    TagKind::Close => nomarkup_depth = nomarkup_depth.saturating_sub(1),
                    TagKind::SelfClosing => {},
                }
                continue;
            }
            if nomarkup_depth > 0 {
                out.push_str(&original, &active);
                continue;
            }

            match tag.kind {
                TagKind::Open => {
                    out.flush();
                    active.push(tag.into_wrapper());
                    opened.push(OpenTag {
                        source: original,
                        segment_index: out.segments.len(),
                    });
                },
                TagKind::SelfClosing => out.marker(tag.into_wrapper()),
                TagKind::Close => {
                    if active.last().is_some_and(|open| open.name == tag.name) {
                        out.flush();
                        active.pop();
                        opened.pop();
                    } else if !SELF_CLOSING_TAGS.contains(&tag.name.as_str()) {
                        out.push_str(&original, &active);
                    }
                },
            }
            continue;
        }

        out.push_char(ch, &active);
        i += 1;
    }

    if opened.is_empty() {
        return out.finish();
    }
    demote_unclosed(out, opened)
}

/// Put the source text of tags still open at end of input back where each
/// was opened and strip their wrappers from the text that followed.
///
/// Unclosed tags are always the bottom of the stack, so every segment built
/// after the first `n` of them opened carries them as its first `n` wrappers.
fn demote_unclosed(mut builder: SegmentBuilder, unclosed: Vec<OpenTag>) -> MarkupResult {
    builder.flush();
    let chars: Vec<char> = builder.text.chars().collect();
    let mut pending = unclosed.into_iter().peekable();
    let mut text = String::with_capacity(builder.text.len());
    let mut segments = Vec::with_capacity(builder.segments.len() + pending.len());
    let mut len = 0;
    let mut demoted = 0;

    for (index, mut seg) in builder.segments.into_iter().enumerate() {
        while let Some(open) = pending.next_if(|open| open.segment_index <= index) {
            splice(&open.source, &mut text, &mut segments, &mut len);
            demoted += 1;
        }
        if seg.self_closing {
            seg.start = len;
            seg.end = len;
        } else {
            let width = seg.len();
            text.extend(&chars[seg.start..seg.end]);
            seg.wrappers.drain(..demoted.min(seg.wrappers.len()));
            seg.start = len;
            seg.end = len + width;
            len += width;
        }
        segments.push(seg);
    }
    for open in pending {
        splice(&open.source, &mut text, &mut segments, &mut len);
    }

    MarkupResult {
        segments: merge_segments(segments, len),
        text,
    }
}

fn splice(source: &str, text: &mut String, segments: &mut Vec<Segment>, len: &mut usize) {
    let width = source.chars().count();
    text.push_str(source);
    segments.push(Segment {
        start: *len,
        end: *len + width,
        wrappers: Vec::new(),
        self_closing: false,
    });
    *len += width;
}

/// For each index, the position of the next `]` at or after it that is not
/// escaped by an odd run of backslashes.
fn closing_brackets(chars: &[char]) -> Vec<Option<usize>> {
    let mut escaped = vec![false; chars.len()];
    let mut run = 0usize;
    for (i, ch) in chars.iter().enumerate() {
        escaped[i] = run % 2 == 1;
        run = if *ch == '\\' { run + 1 } else { 0 };
    }
    let mut next = vec![None; chars.len() + 1];
    for i in (0..chars.len()).rev() {
        next[i] = if chars[i] == ']' && !escaped[i] { Some(i) } else { next[i + 1] };
    }
    next
}

fn parse_tag(content: &str) -> Option<ParsedTag> {
    let content = content.trim();
    if content.is_empty() {
        return None;
    }

    if let Some(rest) = content.strip_prefix('/') {
        let name = rest.trim().to_lowercase();
        if name.is_empty() {
            return None;
        }
        return Some(ParsedTag {
            kind: TagKind::Close,
            name,
            properties: BTreeMap::new(),
        });
    }

    let mut kind = TagKind::Open;
    let mut body = content;
    if let Some(stripped) = body.strip_suffix('/') {
        body = stripped.trim_end();
        kind = TagKind::SelfClosing;
    }

    let (name, rest) = split_identifier(body)?;
    let name = name.to_lowercase();
    let mut properties = BTreeMap::new();
    let mut rest = rest.trim_start();

    if let Some((value, remaining)) = parse_assignment(rest) {
        properties.insert(name.clone(), value);
        rest = remaining.trim_start();
    }

    while !rest.is_empty() {
        let Some((key, after_key)) = split_identifier(rest) else {
            break;
        };
        let key = key.to_lowercase();
        match parse_assignment(after_key) {
            Some((value, remaining)) => {
                properties.insert(key, value);
                rest = remaining.trim_start();
            },
            None => {
                properties.insert(key, MarkupValue::Bool(true));
                rest = after_key.trim_start();
            },
        }
    }

    if SELF_CLOSING_TAGS.contains(&name.as_str()) {
        kind = TagKind::SelfClosing;
    }
    Some(ParsedTag { kind, name, properties })
}

/// Split `[A-Za-z_][A-Za-z0-9_-]*` off the front of `text`.
fn split_identifier(text: &str) -> Option<(&str, &str)> {
    let mut chars = text.char_indices();
    let (_, first) = chars.next()?;
    if !(first.is_ascii_alphabetic() || first == '_') {
        return None;
    }
    let end = chars
        .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
        .map_or(text.len(), |(idx, _)| idx);
    Some(text.split_at(end))
}

/// Parse `= value` where value is double-quoted, single-quoted, or a bare token.
fn parse_assignment(text: &str) -> Option<(MarkupValue, &str)> {
    let text = text.trim_start().strip_prefix('=')?.trim_start();
    let first = text.chars().next()?;
    if first == '"' || first == '\'' {
        let inner = &text[1..];
        let close = inner.find(first)?;
        return Some((coerce_value(&inner[..close]), &inner[close + 1..]));
    }
    let end = text
        .find(|c: char| c.is_whitespace() || c == '"' || c == '\'')
        .unwrap_or(text.len());
    if end == 0 {
        return None;
    }
    Some((coerce_value(&text[..end]), &text[end..]))
}

fn coerce_value(raw: &str) -> MarkupValue {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("true") {
        return MarkupValue::Bool(true);
    }
    if trimmed.eq_ignore_ascii_case("false") {
        return MarkupValue::Bool(false);
    }
    if is_plain_number(trimmed)
        && let Ok(num) = trimmed.parse::<f64>()
    {
        return MarkupValue::Number(num);
    }
    MarkupValue::Text(trimmed.to_string())
}

/// `[+-]?\d+(\.\d+)?`
fn is_plain_number(text: &str) -> bool {
    let unsigned = text.strip_prefix(['+', '-']).unwrap_or(text);
    let (int, frac) = match unsigned.split_once('.') {
        Some((int, frac)) => (int, Some(frac)),
        None => (unsigned, None),
    };
    let digits = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
    digits(int) && frac.is_none_or(digits)
}

/// Sort, drop empty non-markers and coalesce touching segments with equal
/// wrapper stacks. Non-empty text always ends up with at least one segment.
pub fn merge_segments(mut segments: Vec<Segment>, text_len: usize) -> Vec<Segment> {
    segments.sort_by_key(|s| (s.start, s.end));
    let mut merged: Vec<Segment> = Vec::with_capacity(segments.len());

    for seg in segments {
        if seg.is_empty() && !seg.self_closing {
            continue;
        }
        if let Some(last) = merged.last_mut()
            && !seg.self_closing
            && !last.self_closing
            && last.end == seg.start
            && last.wrappers == seg.wrappers
        {
            last.end = seg.end;
            continue;
        }
        merged.push(seg);
    }

    if merged.is_empty() && text_len > 0 {
        merged.push(Segment {
            start: 0,
            end: text_len,
            wrappers: Vec::new(),
            self_closing: false,
        });
    }
    merged
}

/// Project `result` onto the char range `[start, end)`, re-basing offsets.
///
/// `end` defaults to the text length; both bounds are clamped. Markers are
/// kept only when their anchor lies inside the range.
pub fn slice_markup(result: &MarkupResult, start: usize, end: Option<usize>) -> MarkupResult {
    let text_len = result.char_len();
    let from = start.min(text_len);
    let to = end.map_or(text_len, |e| e.clamp(from, text_len));

    let mut sliced = Vec::new();
    for seg in &result.segments {
        if seg.self_closing {
            if (from..=to).contains(&seg.start) {
                sliced.push(Segment {
                    start: seg.start - from,
                    end: seg.start - from,
                    wrappers: seg.wrappers.clone(),
                    self_closing: true,
                });
            }
            continue;
        }
        let seg_start = seg.start.max(from);
        let seg_end = seg.end.min(to);
        if seg_end <= seg_start {
            continue;
        }
        sliced.push(Segment {
            start: seg_start - from,
            end: seg_end - from,
            wrappers: seg.wrappers.clone(),
            self_closing: false,
        });
    }

    MarkupResult {
        text: result.text.chars().skip(from).take(to - from).collect(),
        segments: merge_segments(sliced, to - from),
    }
}
