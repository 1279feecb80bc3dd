//! formscope CLI
//!
//! Command-line tool for describing what files, archives, and directories
//! contain.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use formscope::formatter::{AnalysisFormatter, HumanFormatter, JsonFormatter, ShortFormatter};
use formscope::{AnalyzerOptions, Engine};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Recursive content analyzer.
///
/// Recognizes file formats, opens archives and compressed streams, and
/// prints the resulting graph of files and their contents.
#[derive(Parser, Debug)]
#[command(name = "formscope")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Files or directories to analyze
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Output format
    #[arg(short, long, default_value = "human")]
    format: OutputFormat,

    /// Analysis mode
    #[arg(short, long, default_value = "normal")]
    mode: AnalysisMode,

    /// JSON file with analyzer options; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Maximum nesting depth
    #[arg(long)]
    max_depth: Option<usize>,

    /// Analyze sibling entries one at a time
    #[arg(long)]
    no_parallel: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Quiet mode (only output essential info)
    #[arg(short, long)]
    quiet: bool,
}

/// Output format options.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-readable tree
    Human,
    /// JSON graph
    Json,
    /// One tab-separated line per file
    Short,
}

/// Analysis mode options.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum AnalysisMode {
    /// Normal analysis (default)
    Normal,
    /// Fast analysis (shallow, no digests)
    Fast,
    /// Thorough analysis (deeper, every digest)
    Thorough,
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("formscope=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_options(args: &Args) -> Result<AnalyzerOptions> {
    let mut options = match &args.config {
        Some(path) => AnalyzerOptions::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => match args.mode {
            AnalysisMode::Normal => AnalyzerOptions::new(),
            AnalysisMode::Fast => AnalyzerOptions::fast(),
            AnalysisMode::Thorough => AnalyzerOptions::thorough(),
        },
    };
    if let Some(depth) = args.max_depth {
        options.max_depth = depth;
    }
    if args.no_parallel {
        options.parallel = false;
    }
    Ok(options)
}

fn formatter(args: &Args) -> Box<dyn AnalysisFormatter> {
    match args.format {
        OutputFormat::Human if args.quiet => Box::new(HumanFormatter::quiet()),
        OutputFormat::Human if args.verbose => Box::new(HumanFormatter::verbose()),
        OutputFormat::Human => Box::new(HumanFormatter::new()),
        OutputFormat::Json => Box::new(JsonFormatter::new()),
        OutputFormat::Short => Box::new(ShortFormatter::new()),
    }
}

fn analyze_path(engine: &Engine, path: &Path, formatter: &dyn AnalysisFormatter) -> Result<()> {
    let analysis = engine
        .analyze_path(path)
        .with_context(|| format!("analyzing {}", path.display()))?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(formatter.format_analysis(&analysis, path).as_bytes())?;
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    let engine = match build_options(&args).and_then(|o| Ok(Engine::new(o)?)) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };
    let formatter = formatter(&args);

    let mut success = true;
    for path in &args.paths {
        if let Err(e) = analyze_path(&engine, path, formatter.as_ref()) {
            if !args.quiet {
                eprintln!("Error: {:#}", e);
            }
            success = false;
        }
    }

    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parsing() {
        let args = Args::try_parse_from(["formscope", "test.bin"]).unwrap();
        assert_eq!(args.paths.len(), 1);
        assert!(!args.verbose);
        assert!(!args.no_parallel);
    }

    #[test]
    fn test_multiple_paths() {
        let args = Args::try_parse_from(["formscope", "a.zip", "b.tar"]).unwrap();
        assert_eq!(args.paths.len(), 2);
    }

    #[test]
    fn test_format_options() {
        let args = Args::try_parse_from(["formscope", "-f", "json", "test.bin"]).unwrap();
        assert!(matches!(args.format, OutputFormat::Json));
    }

    #[test]
    fn test_option_overrides() {
        let args = Args::try_parse_from([
            "formscope",
            "-m",
            "fast",
            "--max-depth",
            "3",
            "--no-parallel",
            "x",
        ])
        .unwrap();
        let options = build_options(&args).unwrap();
        assert_eq!(options.max_depth, 3);
        assert!(!options.parallel);
    }

    #[test]
    fn test_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("options.json");
        std::fs::write(&path, r#"{"max_depth": 7}"#).unwrap();
        let args =
            Args::try_parse_from(["formscope", "--config", path.to_str().unwrap(), "x"]).unwrap();
        assert_eq!(build_options(&args).unwrap().max_depth, 7);
    }
}
