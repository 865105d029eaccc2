//! # mdmath Markdown
//!
//! CommonMark to HTML through `pulldown-cmark`, with two ordered rule chains
//! that see the document as written, plus [`MathExtension`], which replaces
//! LaTeX math with pre-rendered images.
//!
//! ## Architecture
//!
//! ```text
//! source ──Parser::into_offset_iter──► (Event, byte range)*
//!                                           │
//!                      paragraph ──► BlockChain on its raw text
//!                      text run  ──► InlineChain on its raw text
//!                                           ▼
//!                              html::push_html ──► HTML
//! ```
//!
//! Rules match the raw source span of a paragraph or a text run, before the
//! parser has decoded backslash escapes or paired emphasis delimiters, so
//! `$$\{x\}$$` and `$$a*b*c$$` reach the math rule intact. A rule's
//! replacement is spliced into the event stream as raw HTML. Code spans,
//! code blocks, raw HTML and image alt text are never handed to a rule.
//!
//! ## Examples
//!
//! ```no_run
//! use mdmath_markdown::{Markdown, MathExtension};
//!
//! let mut md = Markdown::new();
//! md.register_extension(&MathExtension::new("site"))?;
//! let html = md.convert("Energy: $$E = mc^2$$")?;
//! assert!(html.contains(r#"class="inline-math""#));
//! # Ok::<(), mdmath_markdown::MarkdownError>(())
//! ```
//!
//! Any render failure aborts the conversion; no partial document is
//! returned.

use html_escape::encode_double_quoted_attribute;
use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd, html};
use std::ops::Range;
use std::path::Path;

pub mod block;
pub mod extension;
pub mod inline;
pub mod registry;

pub use block::{BlockChain, BlockProcessor, MathBlockProcessor};
pub use extension::{Extension, MathExtension};
pub use inline::{InlineChain, InlinePattern, MathInlinePattern};
pub use registry::{Position, RuleChain};

#[derive(Debug, thiserror::Error)]
pub enum MarkdownError {
    #[error("no rule named '{0}' to position against")]
    UnknownAnchor(String),

    #[error("a rule named '{0}' is already registered")]
    DuplicateRule(String),

    #[error(transparent)]
    Render(#[from] mdmath_build::RenderError),
}

/// Converts Markdown to HTML, running registered rules on the raw source.
pub struct Markdown {
    pub block_processors: BlockChain,
    pub inline_patterns: InlineChain,
    options: Options,
}

impl Default for Markdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Markdown {
    /// No rules, with GitHub-style tables, strikethrough and task lists.
    pub fn new() -> Self {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);
        Self {
            block_processors: BlockChain::new(),
            inline_patterns: InlineChain::new(),
            options,
        }
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn register_extension(&mut self, extension: &dyn Extension) -> Result<(), MarkdownError> {
        extension.extend(self)
    }

    /// Parses `source` and applies both rule chains.
    ///
    /// Line endings are taken as they are; [`Markdown::convert`] normalizes
    /// `\r\n` first.
    pub fn events<'a>(&self, source: &'a str) -> Result<Vec<Event<'a>>, MarkdownError> {
        let parsed: Vec<(Event<'a>, Range<usize>)> = Parser::new_ext(source, self.options)
            .into_offset_iter()
            .collect();

        let mut out = Vec::with_capacity(parsed.len());
        // Inside code blocks and images, text is literal.
        let mut raw_depth = 0usize;
        let mut i = 0;
        while i < parsed.len() {
            let (event, range) = &parsed[i];
            match event {
                Event::Start(Tag::CodeBlock(_) | Tag::Image { .. }) => raw_depth += 1,
                Event::End(TagEnd::CodeBlock | TagEnd::Image) => {
                    raw_depth = raw_depth.saturating_sub(1)
                }
                Event::Start(Tag::Paragraph) if raw_depth == 0 => {
                    let text = block::block_source(source, range.clone());
                    if let Some(html) = block::run_processors(&self.block_processors, text)? {
                        out.push(Event::Html(html.into()));
                        i = paragraph_end(&parsed, i);
                        continue;
                    }
                }
                _ => {}
            }

            if raw_depth == 0 && inline::is_run_event(event) {
                let len = parsed[i..]
                    .iter()
                    .take_while(|(e, _)| inline::is_run_event(e))
                    .count();
                inline::rewrite_run(&self.inline_patterns, source, &parsed[i..i + len], &mut out)?;
                i += len;
            } else {
                out.push(event.clone());
                i += 1;
            }
        }
        Ok(out)
    }

    pub fn convert(&self, source: &str) -> Result<String, MarkdownError> {
        let source = source.replace("\r\n", "\n");
        let events = self.events(&source)?;
        let mut out = String::with_capacity(source.len() * 3 / 2);
        html::push_html(&mut out, events.into_iter());
        Ok(out)
    }
}

/// Index just past the `End(Paragraph)` closing the paragraph opened at `start`.
fn paragraph_end(parsed: &[(Event<'_>, Range<usize>)], start: usize) -> usize {
    parsed[start..]
        .iter()
        .position(|(e, _)| matches!(e, Event::End(TagEnd::Paragraph)))
        .map_or(parsed.len(), |offset| start + offset + 1)
}

/// `src` attribute for an image path, always with `/` separators.
pub(crate) fn image_src(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

pub(crate) fn image_html(src: &str, alt: &str, class: &str) -> String {
    format!(
        r#"<img src="{}" alt="{}" class="{}" />"#,
        encode_double_quoted_attribute(src),
        encode_double_quoted_attribute(alt),
        encode_double_quoted_attribute(class)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_src_uses_forward_slashes() {
        let path = Path::new("assets").join("sub").join("k.png");
        assert_eq!(image_src(&path), "assets/sub/k.png");
    }

    #[test]
    fn test_image_html_escapes_attributes() {
        assert_eq!(
            image_html("assets/a.png", "\"b\" & c", "inline-math"),
            r#"<img src="assets/a.png" alt="&quot;b&quot; &amp; c" class="inline-math" />"#
        );
    }

    #[test]
    fn test_convert_without_extensions() {
        let md = Markdown::new();
        let html = md.convert("# Hi\n\nSome *text* and $$x$$.").unwrap();
        assert_eq!(html, "<h1>Hi</h1>\n<p>Some <em>text</em> and $$x$$.</p>\n");
    }

    #[test]
    fn test_lists_and_links_survive() {
        let html = Markdown::new().convert("- a\n- b\n\n[x](y)").unwrap();
        assert_eq!(
            html,
            "<ul>\n<li>a</li>\n<li>b</li>\n</ul>\n<p><a href=\"y\">x</a></p>\n"
        );
    }

    #[test]
    fn test_crlf_is_normalized() {
        let html = Markdown::new().convert("one\r\n\r\ntwo\r\n").unwrap();
        assert_eq!(html, "<p>one</p>\n<p>two</p>\n");
    }
}
