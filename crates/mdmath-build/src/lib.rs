//! # mdmath build
//!
//! Renders LaTeX math fragments into PNG images through an external
//! `latex` + `dvipng` toolchain, caching the results on disk.
//!
//! ## Overview
//!
//! ```text
//! MathFragment ──► ArtifactKey ──► ArtifactCache ── hit ──► relative path
//!                                        │
//!                                       miss
//!                                        ▼
//!                          CompilationWorkspace (<key>.tex)
//!                                        │ LatexTransform
//!                                        ▼
//!                                    <key>.dvi
//!                                        │ DvipngTransform
//!                                        ▼
//!                                    <key>.png
//! ```
//!
//! The cache has no in-memory index: the presence of `<key>.png` in the
//! destination directory is the hit signal, so rendered images survive
//! across runs and are shared between processes writing the same output
//! directory.
//!
//! ## Examples
//!
//! ```no_run
//! use mdmath_build::{MathFragment, RenderConfig, RenderPipeline};
//!
//! let pipeline = RenderPipeline::new(RenderConfig::new("site"));
//! let path = pipeline.render(&MathFragment::inline("x^2"))?;
//! assert!(path.starts_with("assets"));
//! # Ok::<(), mdmath_build::RenderError>(())
//! ```

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;

pub mod artifacts;
pub mod compiler;
pub mod config;
pub mod log_excerpt;
pub mod pipeline;

pub use artifacts::{ArtifactCache, CacheLookup, CompilationWorkspace, RenderedArtifact};
pub use compiler::{
    CommandExecutor, DvipngTransform, LatexTransform, RealCommandExecutor, ShellTransform,
    Transform,
};
pub use config::{ConfigError, RenderConfig};
pub use pipeline::RenderPipeline;

/// Distinguishes how a fragment is tagged when computing its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    Inline,
    Block,
}

impl RenderMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderMode::Inline => "inline",
            RenderMode::Block => "block",
        }
    }
}

/// TeX delimiters wrapped around the fragment source before typesetting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Framing {
    /// `$$ ... $$`
    DoubleDollar,
    /// `\[ ... \]`
    DisplayBracket,
}

/// One math expression extracted from a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MathFragment {
    source: String,
    mode: RenderMode,
    framing: Framing,
}

impl MathFragment {
    /// A fragment found between `$$` markers inside a text run.
    pub fn inline(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            mode: RenderMode::Inline,
            framing: Framing::DoubleDollar,
        }
    }

    /// A fragment found in a `\[ ... \]` block.
    ///
    /// Block formulas keep the inline mode tag; only the framing differs.
    /// Changing the tag would change every existing block key, so the
    /// rendered cache would be invalidated.
    pub fn block(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            mode: RenderMode::Inline,
            framing: Framing::DisplayBracket,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// The TeX body placed between `\begin{document}` and `\end{document}`.
    pub fn tex_body(&self) -> String {
        match self.framing {
            Framing::DoubleDollar => format!("$${}$$", self.source),
            Framing::DisplayBracket => format!("\\[{}\\]", self.source),
        }
    }

    pub fn key(&self) -> ArtifactKey {
        ArtifactKey::compute(self.mode, &self.tex_body())
    }
}

/// Content address of a rendered fragment: SHA-256 of mode tag and TeX body.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactKey(pub String);

impl ArtifactKey {
    pub fn compute(mode: RenderMode, tex_body: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(mode.as_str().as_bytes());
        hasher.update(tex_body.as_bytes());
        ArtifactKey(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which external program a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Typeset,
    Rasterize,
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("typeset compilation failed for {key}: {detail}")]
    Compilation { key: ArtifactKey, detail: String },

    #[error("rasterization failed for {key}: {detail}")]
    Rasterization { key: ArtifactKey, detail: String },

    #[error("failed to launch `{program}`")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error on {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RenderError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RenderError::Io {
            path: path.into(),
            source,
        }
    }

    /// The error for a failure in `stage`.
    pub fn failed(stage: Stage, key: ArtifactKey, detail: String) -> Self {
        match stage {
            Stage::Typeset => RenderError::Compilation { key, detail },
            Stage::Rasterize => RenderError::Rasterization { key, detail },
        }
    }

    /// The stage that failed, if the error came from an external program.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            RenderError::Compilation { .. } => Some(Stage::Typeset),
            RenderError::Rasterization { .. } => Some(Stage::Rasterize),
            _ => None,
        }
    }
}
