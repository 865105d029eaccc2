//! Block processors: rules that replace a whole paragraph.

use crate::registry::RuleChain;
use crate::{MarkdownError, image_html, image_src};
use mdmath_build::{MathFragment, RenderPipeline};
use once_cell::sync::Lazy;
use regex::Regex;
use std::ops::Range;
use std::sync::Arc;

/// A rule recognising one kind of block from its raw text.
///
/// `test` is cheap and decides whether `run` is attempted. `run` returns the
/// HTML that replaces the block, or `None` to leave it to later processors
/// and finally to ordinary Markdown rendering.
pub trait BlockProcessor {
    fn test(&self, block: &str) -> bool;

    fn run(&self, block: &str) -> Result<Option<String>, MarkdownError>;
}

pub type BlockChain = RuleChain<Box<dyn BlockProcessor>>;

// The whole block must be `\[`, a newline, any lines, then `\]`.
static MATH_BLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\\\[(?P<formula>\n(?:.*\n?)*)\\\]$").unwrap());

/// Raw text of the block at `range`, without its trailing line break.
pub(crate) fn block_source(source: &str, range: Range<usize>) -> &str {
    source[range].trim_end()
}

/// Replacement HTML from the first processor in `chain` that takes `block`.
pub(crate) fn run_processors(
    chain: &BlockChain,
    block: &str,
) -> Result<Option<String>, MarkdownError> {
    for (name, processor) in chain.iter() {
        if !processor.test(block) {
            continue;
        }
        if let Some(html) = processor.run(block)? {
            log::trace!("Block processor '{}' matched", name);
            return Ok(Some(html));
        }
    }
    Ok(None)
}

/// A block consisting exactly of `\[`, formula lines and `\]`, replaced by a
/// `block-math` image.
pub struct MathBlockProcessor {
    pipeline: Arc<RenderPipeline>,
}

impl MathBlockProcessor {
    pub fn new(pipeline: Arc<RenderPipeline>) -> Self {
        Self { pipeline }
    }
}

impl BlockProcessor for MathBlockProcessor {
    fn test(&self, block: &str) -> bool {
        MATH_BLOCK_RE.is_match(block)
    }

    fn run(&self, block: &str) -> Result<Option<String>, MarkdownError> {
        let Some(formula) = MATH_BLOCK_RE
            .captures(block)
            .and_then(|c| c.name("formula"))
        else {
            return Ok(None);
        };
        let formula = formula.as_str();

        let path = self.pipeline.render(&MathFragment::block(formula))?;
        let mut html = image_html(&image_src(&path), formula, "block-math");
        html.push('\n');
        Ok(Some(html))
    }
}
