use crate::compiler::Transform;
use crate::{
    ArtifactCache, ArtifactKey, CommandExecutor, CompilationWorkspace, DvipngTransform, LatexTransform,
    MathFragment, RealCommandExecutor, RenderConfig, RenderError,
};
use std::path::PathBuf;

/// Document preamble for every fragment. Kept minimal so the page holds
/// nothing but the formula, which `dvipng -T tight` then crops.
pub const PREAMBLE: &str = "\\documentclass[12pt]{article}
\\usepackage[utf8]{inputenc}
\\usepackage{amsmath}
\\usepackage{amsfonts}
\\usepackage{amssymb}
\\pagestyle{empty}
";

/// Turns fragments into PNG files, compiling only on a cache miss.
///
/// A miss costs two process launches (`latex`, then `dvipng`); a hit costs
/// one `stat`. Failures leave the intermediates on disk for inspection.
#[derive(Debug)]
pub struct RenderPipeline {
    config: RenderConfig,
    cache: ArtifactCache,
    executor: Box<dyn CommandExecutor>,
}

impl RenderPipeline {
    pub fn new(config: RenderConfig) -> Self {
        Self::with_executor(config, Box::new(RealCommandExecutor))
    }

    /// Creates a pipeline that runs the toolchain through `executor`.
    pub fn with_executor(config: RenderConfig, executor: Box<dyn CommandExecutor>) -> Self {
        let cache = ArtifactCache::new(&config.output_directory, &config.destination);
        Self {
            config,
            cache,
            executor,
        }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    /// Returns the path of the fragment's image relative to the output
    /// directory, rendering it first if needed.
    pub fn render(&self, fragment: &MathFragment) -> Result<PathBuf, RenderError> {
        let key = fragment.key();
        let lookup = self.cache.lookup(&key);
        if lookup.hit {
            log::debug!("Cache hit for {:?} ({})", fragment.source(), key);
            return Ok(lookup.artifact.relative_path);
        }

        // The toolchain runs from inside this directory, so every path handed
        // to it has to survive the change of working directory.
        let directory = self.cache.directory();
        let directory =
            std::path::absolute(&directory).map_err(|e| RenderError::io(&directory, e))?;
        std::fs::create_dir_all(&directory).map_err(|e| RenderError::io(&directory, e))?;

        log::info!("Rendering {:?} to {:?}", fragment.source(), lookup.artifact.path);

        let workspace = CompilationWorkspace::new(directory, key);
        workspace.write_source(PREAMBLE, &fragment.tex_body())?;

        let steps: [Box<dyn Transform>; 2] = [
            Box::new(LatexTransform::new(&self.config.latex, &workspace)),
            Box::new(DvipngTransform::new(
                &self.config.dvipng,
                self.config.dpi,
                &workspace,
            )),
        ];
        for step in &steps {
            let result = step
                .execute(self.executor.as_ref())
                .and_then(|()| check_outputs(step.as_ref(), workspace.key()));
            if let Err(e) = result {
                log::warn!(
                    "{} failed; leaving intermediates in {:?}",
                    step.description(),
                    workspace.directory()
                );
                return Err(e);
            }
        }

        workspace.cleanup()?;
        Ok(lookup.artifact.relative_path)
    }
}

/// A step that exits successfully but leaves out one of its files still failed.
fn check_outputs(step: &dyn Transform, key: &ArtifactKey) -> Result<(), RenderError> {
    match step.outputs().into_iter().find(|path| !path.is_file()) {
        None => Ok(()),
        Some(missing) => Err(RenderError::failed(
            step.stage(),
            key.clone(),
            format!("{} did not produce {}", step.description(), missing.display()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preamble_shape() {
        assert!(PREAMBLE.starts_with("\\documentclass[12pt]{article}"));
        assert!(PREAMBLE.contains("\\usepackage{amsmath}"));
        assert!(PREAMBLE.ends_with("\\pagestyle{empty}\n"));
    }

    #[test]
    fn test_cache_hit_skips_toolchain() {
        let temp = tempfile::tempdir().unwrap();
        // A launch would fail loudly: neither program exists.
        let mut config = RenderConfig::new(temp.path());
        config.latex = "/nonexistent/latex".into();
        config.dvipng = "/nonexistent/dvipng".into();
        let pipeline = RenderPipeline::new(config);

        let fragment = MathFragment::inline("e^{i\\pi}");
        let artifact = pipeline.cache().artifact(&fragment.key());
        std::fs::create_dir_all(pipeline.cache().directory()).unwrap();
        std::fs::write(&artifact.path, b"png").unwrap();

        let path = pipeline.render(&fragment).unwrap();
        assert_eq!(path, artifact.relative_path);
    }

    #[test]
    fn test_missing_latex_is_a_launch_error() {
        let temp = tempfile::tempdir().unwrap();
        let mut config = RenderConfig::new(temp.path());
        config.latex = "/nonexistent/latex".into();
        let pipeline = RenderPipeline::new(config);

        let err = pipeline.render(&MathFragment::inline("x")).unwrap_err();
        assert!(matches!(err, RenderError::Launch { .. }));
        // The source is left behind for inspection.
        let key = MathFragment::inline("x").key();
        assert!(pipeline.cache().directory().join(format!("{}.tex", key)).exists());
    }
}
