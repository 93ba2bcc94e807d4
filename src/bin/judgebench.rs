//! Judgebench: grade a candidate tool against reference outputs.
//!
//! ```bash
//! judgebench                                   # ./judge.toml or the default preset
//! judgebench --preset ast-interpreter-project  # rebuild with cmake, inline input
//! judgebench --config judge.toml --json -j 8
//! ```
//!
//! Exit status is 0 when every case passed, 1 when some failed and 2 when the
//! batch could not run at all.

use clap::{ArgAction, Parser};
use judgebench::{
    Harness, HarnessConfig, HarnessError, JsonReporter, Overrides, Preset, TextReporter,
};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// File looked up in the testcase directory when `--config` is absent.
const CONFIG_FILE_NAME: &str = "judge.toml";

const EXIT_FAILED_CASES: u8 = 1;
const EXIT_FATAL: u8 = 2;

#[derive(Parser, Debug)]
#[command(
    name = "judgebench",
    version,
    about = "Batch judge for program-analysis assignments",
    long_about = "Builds reference binaries for every testcase, records their output,\n\
        runs the candidate under a time limit and compares the two byte for byte."
)]
struct Cli {
    /// TOML configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Built-in deployment used when no configuration file is found
    #[arg(long, value_enum)]
    preset: Option<Preset>,

    /// Directory holding the testcase corpus
    #[arg(long, value_name = "DIR")]
    testcase_dir: Option<PathBuf>,

    /// Highest testcase ID; cases 0..=MAX_ID are judged
    #[arg(long, value_name = "N")]
    max_id: Option<u32>,

    /// Worker threads (0 = one per core)
    #[arg(short = 'j', long)]
    jobs: Option<usize>,

    /// Candidate wall-clock limit in milliseconds
    #[arg(long, value_name = "MS")]
    timeout_ms: Option<u64>,

    /// Write a JSON report instead of the per-case lines
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,

    /// Exit 0 even when some testcases fail
    #[arg(long, action = ArgAction::SetTrue)]
    lenient: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            testcase_dir: self.testcase_dir.clone(),
            max_id: self.max_id,
            jobs: self.jobs,
            timeout_ms: self.timeout_ms,
            lenient: self.lenient,
        }
    }
}

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn load_config(cli: &Cli) -> Result<HarnessConfig, HarnessError> {
    let mut config = if let Some(path) = &cli.config {
        HarnessConfig::load(path)?
    } else if let Some(preset) = cli.preset {
        HarnessConfig::preset(preset)
    } else {
        let dir = cli.testcase_dir.as_deref().unwrap_or_else(|| Path::new("."));
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            HarnessConfig::load(&candidate)?
        } else {
            HarnessConfig::preset(Preset::default())
        }
    };
    config.apply(&cli.overrides());
    config.validate()?;
    tracing::debug!(?config, "resolved configuration");
    Ok(config)
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

fn run(cli: &Cli) -> Result<ExitCode, HarnessError> {
    let config = load_config(cli)?;
    let harness = Harness::from_config(&config)?;

    let result = if cli.json {
        let mut sink = JsonReporter::new(io::stdout());
        let result = harness.run(&mut sink)?;
        flush(sink.into_inner())?;
        result
    } else {
        let mut sink = TextReporter::new(io::stdout()).verbose(cli.verbose > 0);
        let result = harness.run(&mut sink)?;
        flush(sink.into_inner())?;
        result
    };

    if result.summary.all_passed() || !config.strict_exit {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(EXIT_FAILED_CASES))
    }
}

fn flush(mut out: impl Write) -> Result<(), HarnessError> {
    out.flush().map_err(HarnessError::Report)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::from(EXIT_FATAL)
        }
    }
}
