use crate::log_excerpt;
use crate::{ArtifactKey, CompilationWorkspace, RenderError, Stage};
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

/// Runs external programs.
///
/// The pipeline never spawns processes directly, so tests can substitute a
/// fake toolchain.
pub trait CommandExecutor: Send + Sync + std::fmt::Debug {
    /// Executes `program` with `args`, optionally from `working_dir`, and
    /// waits for it to exit.
    fn execute(
        &self,
        program: &Path,
        args: &[String],
        working_dir: Option<&Path>,
    ) -> std::io::Result<Output>;
}

/// Default implementation of [`CommandExecutor`] using `std::process::Command`.
#[derive(Debug, Default)]
pub struct RealCommandExecutor;

impl CommandExecutor for RealCommandExecutor {
    fn execute(
        &self,
        program: &Path,
        args: &[String],
        working_dir: Option<&Path>,
    ) -> std::io::Result<Output> {
        let mut cmd = Command::new(program);
        cmd.args(args).stdin(Stdio::null());
        if let Some(dir) = working_dir {
            cmd.current_dir(dir);
        }
        cmd.output()
    }
}

/// One step of a render: turns input files into output files.
pub trait Transform {
    fn description(&self) -> String;

    fn stage(&self) -> Stage;

    /// Files this step is expected to produce.
    fn outputs(&self) -> Vec<PathBuf>;

    fn execute(&self, executor: &dyn CommandExecutor) -> Result<(), RenderError>;
}

/// ShellTransform executes an external command as a build step.
#[derive(Debug, Clone)]
pub struct ShellTransform {
    description: String,
    command: PathBuf,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    outputs: Vec<PathBuf>,
}

impl ShellTransform {
    pub fn new(description: &str, command: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            description: description.to_string(),
            command: command.into(),
            args,
            working_dir: None,
            outputs: Vec::new(),
        }
    }

    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = Some(dir);
        self
    }

    pub fn with_outputs(mut self, outputs: Vec<PathBuf>) -> Self {
        self.outputs = outputs;
        self
    }

    pub fn command(&self) -> &Path {
        &self.command
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Runs the command. Only a failure to launch is an error here; the
    /// exit status is left to the caller.
    pub fn run(&self, executor: &dyn CommandExecutor) -> Result<Output, RenderError> {
        log::debug!("{}: {:?} {:?}", self.description, self.command, self.args);
        executor
            .execute(&self.command, &self.args, self.working_dir.as_deref())
            .map_err(|source| RenderError::Launch {
                program: self.command.display().to_string(),
                source,
            })
    }
}

/// Runs `latex` in batch mode on a workspace's `.tex` file, producing `.dvi`.
#[derive(Debug, Clone)]
pub struct LatexTransform {
    inner: ShellTransform,
    key: ArtifactKey,
    log: PathBuf,
}

impl LatexTransform {
    pub fn new(program: &str, workspace: &CompilationWorkspace) -> Self {
        let dir = workspace.directory();
        let args = vec![
            "-interaction=batchmode".to_string(),
            format!("-output-directory={}", dir.display()),
            workspace.tex().to_string_lossy().to_string(),
        ];

        let inner = ShellTransform::new("latex compilation", program, args)
            .with_working_dir(dir.to_path_buf())
            .with_outputs(vec![workspace.dvi()]);

        Self {
            inner,
            key: workspace.key().clone(),
            log: workspace.log(),
        }
    }

    pub fn shell(&self) -> &ShellTransform {
        &self.inner
    }
}

impl Transform for LatexTransform {
    fn description(&self) -> String {
        self.inner.description.clone()
    }

    fn stage(&self) -> Stage {
        Stage::Typeset
    }

    fn outputs(&self) -> Vec<PathBuf> {
        self.inner.outputs.clone()
    }

    fn execute(&self, executor: &dyn CommandExecutor) -> Result<(), RenderError> {
        let output = self.inner.run(executor)?;
        if output.status.success() {
            return Ok(());
        }

        // Batch mode keeps the terminal quiet; the diagnosis is in the log.
        let detail = match std::fs::read_to_string(&self.log) {
            Ok(log) => log_excerpt::first_error(&log),
            Err(_) => log_excerpt::tail(&String::from_utf8_lossy(&output.stdout)),
        }
        .unwrap_or_else(|| format!("latex exited with {}", output.status));

        Err(RenderError::Compilation {
            key: self.key.clone(),
            detail,
        })
    }
}

/// Runs `dvipng` on a workspace's `.dvi`, producing a tightly cropped PNG.
#[derive(Debug, Clone)]
pub struct DvipngTransform {
    inner: ShellTransform,
    key: ArtifactKey,
}

impl DvipngTransform {
    pub fn new(program: &str, dpi: u32, workspace: &CompilationWorkspace) -> Self {
        let args = vec![
            "-D".to_string(),
            dpi.to_string(),
            "-T".to_string(),
            "tight".to_string(),
            "-o".to_string(),
            workspace.png().to_string_lossy().to_string(),
            workspace.dvi().to_string_lossy().to_string(),
        ];

        let inner = ShellTransform::new("dvipng rasterization", program, args)
            .with_working_dir(workspace.directory().to_path_buf())
            .with_outputs(vec![workspace.png()]);

        Self {
            inner,
            key: workspace.key().clone(),
        }
    }

    pub fn shell(&self) -> &ShellTransform {
        &self.inner
    }
}

impl Transform for DvipngTransform {
    fn description(&self) -> String {
        self.inner.description.clone()
    }

    fn stage(&self) -> Stage {
        Stage::Rasterize
    }

    fn outputs(&self) -> Vec<PathBuf> {
        self.inner.outputs.clone()
    }

    fn execute(&self, executor: &dyn CommandExecutor) -> Result<(), RenderError> {
        let output = self.inner.run(executor)?;
        if output.status.success() {
            return Ok(());
        }

        let detail = log_excerpt::tail(&String::from_utf8_lossy(&output.stderr))
            .unwrap_or_else(|| format!("dvipng exited with {}", output.status));

        Err(RenderError::Rasterization {
            key: self.key.clone(),
            detail,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records invocations and exits with a fixed status.
    #[derive(Debug)]
    struct MockCommandExecutor {
        status_code: i32,
        stderr: String,
        calls: Mutex<Vec<(PathBuf, Vec<String>)>>,
    }

    impl MockCommandExecutor {
        fn new(status_code: i32, stderr: &str) -> Self {
            Self {
                status_code,
                stderr: stderr.to_string(),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl CommandExecutor for MockCommandExecutor {
        fn execute(
            &self,
            program: &Path,
            args: &[String],
            _working_dir: Option<&Path>,
        ) -> std::io::Result<Output> {
            self.calls
                .lock()
                .unwrap()
                .push((program.to_path_buf(), args.to_vec()));

            #[cfg(unix)]
            let status = {
                use std::os::unix::process::ExitStatusExt;
                std::process::ExitStatus::from_raw(self.status_code << 8)
            };
            #[cfg(windows)]
            let status = {
                use std::os::windows::process::ExitStatusExt;
                std::process::ExitStatus::from_raw(self.status_code as u32)
            };

            Ok(Output {
                status,
                stdout: Vec::new(),
                stderr: self.stderr.as_bytes().to_vec(),
            })
        }
    }

    fn workspace(dir: &Path) -> CompilationWorkspace {
        CompilationWorkspace::new(dir, ArtifactKey("k".to_string()))
    }

    #[test]
    fn test_latex_arguments() {
        let ws = workspace(Path::new("/out/assets"));
        let transform = LatexTransform::new("latex", &ws);
        let args = transform.shell().args();

        assert_eq!(transform.shell().command(), Path::new("latex"));
        assert_eq!(args[0], "-interaction=batchmode");
        assert_eq!(args[1], "-output-directory=/out/assets");
        assert_eq!(args[2], "/out/assets/k.tex");
        assert_eq!(transform.outputs(), vec![PathBuf::from("/out/assets/k.dvi")]);
        assert_eq!(transform.stage(), Stage::Typeset);
    }

    #[test]
    fn test_dvipng_arguments() {
        let ws = workspace(Path::new("/out/assets"));
        let transform = DvipngTransform::new("dvipng", 250, &ws);
        assert_eq!(
            transform.shell().args(),
            &["-D", "250", "-T", "tight", "-o", "/out/assets/k.png", "/out/assets/k.dvi"]
        );
        assert_eq!(transform.outputs(), vec![PathBuf::from("/out/assets/k.png")]);
    }

    #[test]
    fn test_latex_failure_reads_log() {
        let temp = tempfile::tempdir().unwrap();
        let ws = workspace(temp.path());
        std::fs::write(
            ws.log(),
            "This is TeX\n! Undefined control sequence.\nl.7 $$\\foo\n",
        )
        .unwrap();

        let executor = MockCommandExecutor::new(1, "");
        let err = LatexTransform::new("latex", &ws)
            .execute(&executor)
            .unwrap_err();

        match err {
            RenderError::Compilation { detail, .. } => {
                assert!(detail.contains("Undefined control sequence."), "{}", detail);
                assert!(detail.contains("l.7"), "{}", detail);
            }
            other => panic!("Expected Compilation error, got {:?}", other),
        }
    }

    #[test]
    fn test_latex_failure_without_log() {
        let temp = tempfile::tempdir().unwrap();
        let ws = workspace(temp.path());
        let executor = MockCommandExecutor::new(1, "");
        let err = LatexTransform::new("latex", &ws)
            .execute(&executor)
            .unwrap_err();
        assert!(err.to_string().starts_with("typeset compilation failed"));
    }

    #[test]
    fn test_dvipng_failure_uses_stderr() {
        let ws = workspace(Path::new("/nowhere"));
        let executor = MockCommandExecutor::new(2, "dvipng: Fatal error, cannot open k.dvi\n");
        let err = DvipngTransform::new("dvipng", 250, &ws)
            .execute(&executor)
            .unwrap_err();

        match err {
            RenderError::Rasterization { detail, .. } => {
                assert_eq!(detail, "dvipng: Fatal error, cannot open k.dvi");
            }
            other => panic!("Expected Rasterization error, got {:?}", other),
        }
    }

    #[test]
    fn test_success_runs_once() {
        let ws = workspace(Path::new("/out"));
        let executor = MockCommandExecutor::new(0, "");
        DvipngTransform::new("dvipng", 100, &ws)
            .execute(&executor)
            .unwrap();
        let calls = executor.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, PathBuf::from("dvipng"));
    }

    #[test]
    fn test_launch_failure() {
        let ws = workspace(Path::new("/out"));
        let err = LatexTransform::new("/definitely/not/a/latex/binary", &ws)
            .execute(&RealCommandExecutor)
            .unwrap_err();
        assert!(matches!(err, RenderError::Launch { .. }));
    }
}
