//! `{expression}` substitution in line and option text.
//!
//! When the text carries markup, segments are rebuilt around the substituted
//! values so wrapper boundaries still line up with the new text.

use log::warn;
use parley_data::{MarkupResult, SegmentBuilder, Wrapper};

use crate::evaluator::Evaluator;

/// A piece of source text: literal chars or a placeholder expression.
enum Piece<'a> {
    Literal { start: usize, text: &'a str },
    Placeholder { start: usize, end: usize, expr: &'a str },
}

/// Split `text` into literal runs and `{...}` placeholders. Offsets are char
/// indices. A `{` without a closing `}` is literal.
fn pieces(text: &str) -> Vec<Piece<'_>> {
    let mut out = Vec::new();
    let mut literal_start: Option<(usize, usize)> = None;
    let mut iter = text.char_indices().enumerate();
    while let Some((ci, (bi, ch))) = iter.next() {
        if ch == '{'
            && let Some(close) = text[bi + 1..].find('}')
        {
            if let Some((lc, lb)) = literal_start.take() {
                out.push(Piece::Literal {
                    start: lc,
                    text: &text[lb..bi],
                });
            }
            let expr = &text[bi + 1..bi + 1 + close];
            let expr_chars = expr.chars().count();
            out.push(Piece::Placeholder {
                start: ci,
                end: ci + expr_chars + 2,
                expr,
            });
            // skip the expression and the closing brace
            for _ in 0..=expr_chars {
                iter.next();
            }
            continue;
        }
        if literal_start.is_none() {
            literal_start = Some((ci, bi));
        }
    }
    if let Some((lc, lb)) = literal_start {
        out.push(Piece::Literal {
            start: lc,
            text: &text[lb..],
        });
    }
    out
}

fn render(expr: &str, evaluator: &Evaluator) -> String {
    match evaluator.evaluate(expr) {
        Ok(value) => value.to_string(),
        Err(e) => {
            warn!("interpolation '{{{expr}}}' rendered empty: {e}");
            String::new()
        },
    }
}

/// Wrappers at `index`, falling back to the nearest covered char before it
/// and then to the first segment.
fn wrappers_near(markup: &MarkupResult, index: usize) -> &[Wrapper] {
    let covering = |i: usize| {
        markup
            .segments
            .iter()
            .find(|s| !s.self_closing && s.start <= i && i < s.end)
    };
    (0..=index)
        .rev()
        .find_map(covering)
        .or_else(|| markup.segments.iter().find(|s| !s.self_closing))
        .map_or(&[], |s| s.wrappers.as_slice())
}

/// Substitute every `{expr}` in `text`. Evaluation failures render as empty
/// text. Returns the new text and, when `markup` was given, markup realigned
/// to it (`None` if nothing in it is formatted).
pub fn interpolate(text: &str, markup: Option<&MarkupResult>, evaluator: &Evaluator) -> (String, Option<MarkupResult>) {
    if !text.contains('{') {
        return (text.to_string(), markup.cloned());
    }
    let pieces = pieces(text);

    let Some(markup) = markup else {
        let mut out = String::with_capacity(text.len());
        for piece in &pieces {
            match piece {
                Piece::Literal { text, .. } => out.push_str(text),
                Piece::Placeholder { expr, .. } => out.push_str(&render(expr, evaluator)),
            }
        }
        return (out, None);
    };

    let mut builder = SegmentBuilder::new();
    let markers_in = |builder: &mut SegmentBuilder, from: usize, to: usize| {
        for seg in markup.segments.iter().filter(|s| s.self_closing && s.start >= from && s.start < to) {
            for wrapper in &seg.wrappers {
                builder.marker(wrapper.clone());
            }
        }
    };
    for piece in &pieces {
        match piece {
            Piece::Literal { start, text } => {
                for (offset, ch) in text.chars().enumerate() {
                    let index = start + offset;
                    markers_in(&mut builder, index, index + 1);
                    builder.push_char(ch, wrappers_near(markup, index));
                }
            },
            Piece::Placeholder { start, end, expr } => {
                markers_in(&mut builder, *start, *end);
                let value = render(expr, evaluator);
                builder.push_str(&value, wrappers_near(markup, *start));
            },
        }
    }
    let len = text.chars().count();
    markers_in(&mut builder, len, len + 1);

    let result = builder.finish();
    (result.text.clone(), result.normalized())
}
