use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use mdmath_build::{ArtifactCache, MathFragment, RenderConfig};
use mdmath_markdown::{Markdown, MathExtension};
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mdmath")]
#[command(about = "Render Markdown math to PNG images", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Default)]
struct ConfigArgs {
    /// JSON file with output_directory, destination, latex, dvipng, dpi
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Root directory of the generated output
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Image subdirectory below the output directory [default: assets]
    #[arg(long, value_name = "NAME")]
    destination: Option<String>,
}

impl ConfigArgs {
    /// Config file values, overridden by any flags given.
    fn resolve(&self) -> anyhow::Result<RenderConfig> {
        let mut config = match (&self.config, &self.output_dir) {
            (Some(path), _) => RenderConfig::load(path)?,
            (None, Some(dir)) => RenderConfig::new(dir),
            (None, None) => bail!("either --config or --output-dir is required"),
        };
        if let Some(dir) = &self.output_dir {
            config.output_directory = dir.clone();
        }
        if let Some(destination) = &self.destination {
            config.destination = destination.clone();
        }
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a Markdown file to HTML, rendering its math to images
    Render {
        #[arg(value_name = "FILE")]
        path: PathBuf,

        /// Write HTML here instead of stdout
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,

        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Print the cache key and image path of a fragment as JSON
    Key {
        /// Fragment source, without delimiters
        #[arg(value_name = "TEX")]
        tex: String,

        /// Treat the fragment as a `\[ ... \]` block
        #[arg(long)]
        block: bool,

        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Check that the LaTeX toolchain is installed
    Doctor {
        #[command(flatten)]
        config: ConfigArgs,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    match &cli.command {
        Commands::Render { path, out, config } => {
            let config = config.resolve()?;
            log::debug!("Using {:?}", config);
            let source = fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;

            let mut md = Markdown::new();
            md.register_extension(&MathExtension::from_config(config))?;
            let html = md
                .convert(&source)
                .with_context(|| format!("Failed to render {}", path.display()))?;

            match out {
                Some(out) => {
                    fs::write(out, &html)
                        .with_context(|| format!("Failed to write {}", out.display()))?;
                    log::info!("Wrote {}", out.display());
                }
                None => print!("{}", html),
            }
        }
        Commands::Key { tex, block, config } => {
            let config = resolve_or_default(config)?;
            let fragment = if *block {
                MathFragment::block(tex.as_str())
            } else {
                MathFragment::inline(tex.as_str())
            };
            let cache = ArtifactCache::new(&config.output_directory, &config.destination);
            let lookup = cache.lookup(&fragment.key());
            let report = serde_json::json!({
                "key": lookup.artifact.key,
                "path": lookup.artifact.relative_path,
                "rendered": lookup.hit,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Doctor { config } => {
            let config = resolve_or_default(config)?;
            let mut missing = 0;
            for program in [&config.latex, &config.dvipng] {
                match which::which(program) {
                    Ok(found) => println!("ok       {} ({})", program, found.display()),
                    Err(_) => {
                        println!("missing  {}", program);
                        missing += 1;
                    }
                }
            }
            if missing > 0 {
                bail!("{} required program(s) not found on PATH", missing);
            }
        }
    }
    Ok(())
}

/// `key` and `doctor` do not write anything, so an output directory is optional.
fn resolve_or_default(args: &ConfigArgs) -> anyhow::Result<RenderConfig> {
    if args.config.is_none() && args.output_dir.is_none() {
        let mut config = RenderConfig::new(".");
        if let Some(destination) = &args.destination {
            config.destination = destination.clone();
        }
        return Ok(config);
    }
    args.resolve()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_output_dir_flag() {
        let cli =
            Cli::try_parse_from(["mdmath", "render", "doc.md", "--output-dir", "site"]).unwrap();
        let Commands::Render { config, .. } = cli.command else {
            panic!("Expected render");
        };
        let config = config.resolve().unwrap();
        assert_eq!(config.output_directory, PathBuf::from("site"));
        assert_eq!(config.destination, "assets");
    }

    #[test]
    fn test_flags_override_config_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("mdmath.json");
        RenderConfig::new("from-file")
            .with_destination("img")
            .save(&path)
            .unwrap();

        let args = ConfigArgs {
            config: Some(path.clone()),
            ..Default::default()
        };
        assert_eq!(args.resolve().unwrap().destination, "img");

        let args = ConfigArgs {
            config: Some(path),
            output_dir: None,
            destination: Some("math".into()),
        };
        let config = args.resolve().unwrap();
        assert_eq!(config.output_directory, PathBuf::from("from-file"));
        assert_eq!(config.destination, "math");
    }

    #[test]
    fn test_render_requires_output() {
        assert!(ConfigArgs::default().resolve().is_err());
        assert_eq!(
            resolve_or_default(&ConfigArgs::default()).unwrap().output_directory,
            PathBuf::from(".")
        );
    }
}
