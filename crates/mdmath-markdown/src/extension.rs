use crate::block::MathBlockProcessor;
use crate::inline::MathInlinePattern;
use crate::registry::Position;
use crate::{Markdown, MarkdownError};
use mdmath_build::{RenderConfig, RenderPipeline};
use std::path::PathBuf;
use std::sync::Arc;

/// Adds rules to a [`Markdown`] instance.
pub trait Extension {
    fn extend(&self, md: &mut Markdown) -> Result<(), MarkdownError>;
}

/// Renders `$$...$$` and `\[...\]` math to PNG images under
/// `<output_directory>/<destination>`.
#[derive(Debug, Clone)]
pub struct MathExtension {
    pipeline: Arc<RenderPipeline>,
}

impl MathExtension {
    /// Images go to `<output_directory>/assets`.
    pub fn new(output_directory: impl Into<PathBuf>) -> Self {
        Self::from_config(RenderConfig::new(output_directory))
    }

    pub fn with_destination(self, destination: &str) -> Self {
        let config = self.pipeline.config().clone().with_destination(destination);
        Self::from_config(config)
    }

    pub fn from_config(config: RenderConfig) -> Self {
        Self::from_pipeline(RenderPipeline::new(config))
    }

    /// Uses an already built pipeline, e.g. one with a custom executor.
    pub fn from_pipeline(pipeline: RenderPipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }

    pub fn pipeline(&self) -> &RenderPipeline {
        &self.pipeline
    }
}

impl Extension for MathExtension {
    /// Both rules go first: TeX is full of backslashes, underscores and
    /// asterisks that other rules would otherwise take.
    fn extend(&self, md: &mut Markdown) -> Result<(), MarkdownError> {
        md.inline_patterns.register(
            "inlinemath",
            Box::new(MathInlinePattern::new(self.pipeline.clone())),
            Position::Begin,
        )?;
        md.block_processors.register(
            "blockmath",
            Box::new(MathBlockProcessor::new(self.pipeline.clone())),
            Position::Begin,
        )?;
        Ok(())
    }
}
