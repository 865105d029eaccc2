//! Inline patterns and the pass that applies them to text runs.
//!
//! A text run is a stretch of consecutive inline events: text, line breaks,
//! emphasis and link markers. Patterns are matched against the run's raw
//! source, in chain order, and each later pattern only gets the text no
//! earlier pattern claimed. Code spans and inline HTML end a run, so nothing
//! inside them is ever matched.

use crate::registry::RuleChain;
use crate::{MarkdownError, image_html, image_src};
use mdmath_build::{MathFragment, RenderPipeline};
use once_cell::sync::Lazy;
use pulldown_cmark::{CowStr, Event, Tag, TagEnd};
use regex::{Captures, Regex};
use std::ops::Range;
use std::sync::Arc;

/// A rule recognising one kind of inline syntax.
pub trait InlinePattern {
    fn regex(&self) -> &Regex;

    /// Builds the replacement HTML for a match, or `None` to leave the
    /// matched text for later patterns.
    fn handle_match(&self, caps: &Captures<'_>) -> Result<Option<String>, MarkdownError>;
}

pub type InlineChain = RuleChain<Box<dyn InlinePattern>>;

// Lazy, so the match ends at the first closing `$$` and never spans one.
static MATH_INLINE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\$(.*?)\$\$").unwrap());

/// `$$ ... $$` inside a text run, replaced by an `inline-math` image.
pub struct MathInlinePattern {
    pipeline: Arc<RenderPipeline>,
}

impl MathInlinePattern {
    pub fn new(pipeline: Arc<RenderPipeline>) -> Self {
        Self { pipeline }
    }
}

impl InlinePattern for MathInlinePattern {
    fn regex(&self) -> &Regex {
        &MATH_INLINE_RE
    }

    fn handle_match(&self, caps: &Captures<'_>) -> Result<Option<String>, MarkdownError> {
        let code = caps.get(1).map_or("", |m| m.as_str()).trim();
        if code.is_empty() {
            return Ok(None);
        }
        let path = self.pipeline.render(&MathFragment::inline(code))?;
        Ok(Some(image_html(&image_src(&path), code, "inline-math")))
    }
}

/// Whether `event` can be part of a text run.
pub(crate) fn is_run_event(event: &Event<'_>) -> bool {
    matches!(
        event,
        Event::Text(_)
            | Event::SoftBreak
            | Event::HardBreak
            | Event::Start(Tag::Emphasis | Tag::Strong | Tag::Strikethrough | Tag::Link { .. })
            | Event::End(TagEnd::Emphasis | TagEnd::Strong | TagEnd::Strikethrough | TagEnd::Link)
    )
}

/// Source bytes taken over by a pattern, and the HTML that replaces them.
struct Claim {
    range: Range<usize>,
    html: Option<String>,
}

fn overlaps(a: &Range<usize>, b: &Range<usize>) -> bool {
    a.start < b.end && b.start < a.end
}

fn covers(outer: &Range<usize>, inner: &Range<usize>) -> bool {
    outer.start <= inner.start && inner.end <= outer.end
}

/// Runs `chain` over one text run and appends the rewritten events to `out`.
pub(crate) fn rewrite_run<'a>(
    chain: &InlineChain,
    source: &'a str,
    run: &[(Event<'a>, Range<usize>)],
    out: &mut Vec<Event<'a>>,
) -> Result<(), MarkdownError> {
    let texts: Vec<Range<usize>> = run
        .iter()
        .filter(|(e, _)| matches!(e, Event::Text(_)))
        .map(|(_, r)| r.clone())
        .collect();
    let span = texts
        .iter()
        .cloned()
        .reduce(|a, b| a.start.min(b.start)..a.end.max(b.end));

    let mut claims = match span {
        Some(span) if !chain.is_empty() => find_claims(chain, source, span, &texts)?,
        _ => Vec::new(),
    };
    if claims.is_empty() {
        out.extend(run.iter().map(|(e, _)| e.clone()));
        return Ok(());
    }

    for (event, range) in run {
        if !matches!(event, Event::Text(_)) {
            // Markers wholly inside a claim (`*` pairs in `$$a*b*c$$`) vanish
            // with it.
            if !claims.iter().any(|c| covers(&c.range, range)) {
                out.push(event.clone());
            }
            continue;
        }

        let mut cursor = range.start;
        let mut touched = false;
        for claim in claims.iter_mut().filter(|c| overlaps(&c.range, range)) {
            touched = true;
            if claim.range.start > cursor {
                out.push(Event::Text(CowStr::Borrowed(&source[cursor..claim.range.start])));
            }
            if let Some(html) = claim.html.take() {
                out.push(Event::Html(html.into()));
            }
            cursor = cursor.max(claim.range.end);
        }
        if !touched {
            out.push(event.clone());
        } else if cursor < range.end {
            out.push(Event::Text(CowStr::Borrowed(&source[cursor..range.end])));
        }
    }
    Ok(())
}

/// Matches every pattern against `source[span]`, earlier patterns first.
///
/// A match must start inside literal text, which keeps link destinations
/// and the markup between text events out of reach.
fn find_claims(
    chain: &InlineChain,
    source: &str,
    span: Range<usize>,
    texts: &[Range<usize>],
) -> Result<Vec<Claim>, MarkdownError> {
    let raw = &source[span.clone()];
    let mut claims: Vec<Claim> = Vec::new();

    for (name, pattern) in chain.iter() {
        for caps in pattern.regex().captures_iter(raw) {
            let Some(whole) = caps.get(0) else { continue };
            let range = span.start + whole.start()..span.start + whole.end();
            if whole.as_str().is_empty()
                || !texts.iter().any(|t| t.contains(&range.start))
                || claims.iter().any(|c| overlaps(&c.range, &range))
            {
                continue;
            }
            if let Some(html) = pattern.handle_match(&caps)? {
                log::trace!("Inline pattern '{}' matched {:?}", name, whole.as_str());
                claims.push(Claim {
                    range,
                    html: Some(html),
                });
            }
        }
    }

    claims.sort_by_key(|c| c.range.start);
    Ok(claims)
}
