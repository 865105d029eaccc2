use crate::{ArtifactKey, RenderError};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// A rendered PNG, addressed by its key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedArtifact {
    pub key: ArtifactKey,
    /// `<output_directory>/<destination>/<key>.png`
    pub path: PathBuf,
    /// `<destination>/<key>.png`, the path embedded in the document.
    pub relative_path: PathBuf,
}

/// Result of an [`ArtifactCache::lookup`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLookup {
    pub hit: bool,
    pub artifact: RenderedArtifact,
}

/// Filesystem-backed cache of rendered fragments.
///
/// Lookups only stat the artifact path; nothing is held in memory.
#[derive(Debug, Clone)]
pub struct ArtifactCache {
    output_directory: PathBuf,
    destination: String,
}

impl ArtifactCache {
    pub fn new(output_directory: impl Into<PathBuf>, destination: impl Into<String>) -> Self {
        Self {
            output_directory: output_directory.into(),
            destination: destination.into(),
        }
    }

    /// The directory artifacts and intermediates are written to.
    pub fn directory(&self) -> PathBuf {
        self.output_directory.join(&self.destination)
    }

    pub fn artifact(&self, key: &ArtifactKey) -> RenderedArtifact {
        let file_name = format!("{}.png", key);
        RenderedArtifact {
            key: key.clone(),
            path: self.directory().join(&file_name),
            relative_path: Path::new(&self.destination).join(file_name),
        }
    }

    pub fn lookup(&self, key: &ArtifactKey) -> CacheLookup {
        let artifact = self.artifact(key);
        CacheLookup {
            hit: artifact.path.is_file(),
            artifact,
        }
    }
}

/// Intermediate files of one render attempt, all named after the key.
#[derive(Debug, Clone)]
pub struct CompilationWorkspace {
    directory: PathBuf,
    key: ArtifactKey,
}

impl CompilationWorkspace {
    pub fn new(directory: impl Into<PathBuf>, key: ArtifactKey) -> Self {
        Self {
            directory: directory.into(),
            key,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn key(&self) -> &ArtifactKey {
        &self.key
    }

    fn file(&self, extension: &str) -> PathBuf {
        self.directory.join(format!("{}.{}", self.key, extension))
    }

    pub fn tex(&self) -> PathBuf {
        self.file("tex")
    }

    pub fn dvi(&self) -> PathBuf {
        self.file("dvi")
    }

    pub fn log(&self) -> PathBuf {
        self.file("log")
    }

    pub fn aux(&self) -> PathBuf {
        self.file("aux")
    }

    pub fn png(&self) -> PathBuf {
        self.file("png")
    }

    /// Every file this workspace leaves behind except the PNG.
    pub fn intermediates(&self) -> [PathBuf; 4] {
        [self.tex(), self.log(), self.dvi(), self.aux()]
    }

    /// Writes the complete TeX document for `body`.
    pub fn write_source(&self, preamble: &str, body: &str) -> Result<PathBuf, RenderError> {
        let tex = self.tex();
        let document = format!("{preamble}\\begin{{document}}\n{body}\n\\end{{document}}\n");
        fs::write(&tex, document).map_err(|e| RenderError::io(&tex, e))?;
        Ok(tex)
    }

    /// Removes the intermediates. Files the toolchain did not produce are skipped.
    pub fn cleanup(&self) -> Result<(), RenderError> {
        for path in self.intermediates() {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    log::debug!("No intermediate to remove at {:?}", path);
                }
                Err(e) => return Err(RenderError::io(path, e)),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> ArtifactKey {
        ArtifactKey("0123abcd".to_string())
    }

    #[test]
    fn test_lookup_miss_then_hit() {
        let temp = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::new(temp.path(), "assets");

        let miss = cache.lookup(&key());
        assert!(!miss.hit);
        assert_eq!(miss.artifact.relative_path, PathBuf::from("assets/0123abcd.png"));
        assert_eq!(miss.artifact.path, temp.path().join("assets").join("0123abcd.png"));

        fs::create_dir_all(cache.directory()).unwrap();
        fs::write(&miss.artifact.path, b"png").unwrap();

        let hit = cache.lookup(&key());
        assert!(hit.hit);
        assert_eq!(hit.artifact, miss.artifact);
    }

    #[test]
    fn test_lookup_has_no_side_effects() {
        let temp = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::new(temp.path(), "img");
        cache.lookup(&key());
        assert!(!cache.directory().exists());
    }

    #[test]
    fn test_cache_is_shared_between_instances() {
        let temp = tempfile::tempdir().unwrap();
        let writer = ArtifactCache::new(temp.path(), "assets");
        fs::create_dir_all(writer.directory()).unwrap();
        fs::write(writer.artifact(&key()).path, b"png").unwrap();

        let reader = ArtifactCache::new(temp.path(), "assets");
        assert!(reader.lookup(&key()).hit);
    }

    #[test]
    fn test_workspace_write_and_cleanup() {
        let temp = tempfile::tempdir().unwrap();
        let workspace = CompilationWorkspace::new(temp.path(), key());

        let tex = workspace.write_source("\\documentclass{article}\n", "$$x$$").unwrap();
        let content = fs::read_to_string(&tex).unwrap();
        assert_eq!(
            content,
            "\\documentclass{article}\n\\begin{document}\n$$x$$\n\\end{document}\n"
        );

        fs::write(workspace.dvi(), b"dvi").unwrap();
        fs::write(workspace.log(), b"log").unwrap();
        fs::write(workspace.png(), b"png").unwrap();

        // The .aux file was never produced; cleanup must still succeed.
        workspace.cleanup().unwrap();

        for path in workspace.intermediates() {
            assert!(!path.exists(), "{:?} should be removed", path);
        }
        assert!(workspace.png().exists());
    }
}
