use countcrack_core::config::CountcrackConfig;
use countcrack_core::oracle::{CallgrindOracle, CallgrindOracleConfig};
use countcrack_core::progress::StdoutProgress;
use countcrack_core::search::{SearchConfig, SearchError, Searcher};

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Instruction-count side-channel cracker: runs a target binary under
/// callgrind and reconstructs the secret string it compares its stdin
/// against, one character position at a time.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    /// Target executable to attack.
    filename: PathBuf,
    /// Print every per-character measurement as it happens.
    #[clap(short, long)]
    verbose: bool,
    /// Resolve positions starting from the end of the string.
    #[clap(short, long)]
    reverse: bool,
    /// Known leading characters (e.g. "CTF{"); the search starts after them.
    #[clap(short, long, default_value = "")]
    flag_format: String,
    /// Maximum length to probe when inferring the secret's length.
    #[clap(long, visible_alias = "ml")]
    max_length: Option<usize>,
    /// Length of the string, if known; skips length inference.
    #[clap(short, long)]
    length: Option<usize>,
    /// Charset code: 1 lower, 2 upper, 3 lower+upper, 4 lower+digits,
    /// anything else the full set (all plus safe punctuation).
    #[clap(short, long)]
    charset: Option<u32>,
    /// Kill a measurement that runs longer than this many milliseconds
    /// and treat it as unavailable. Default: wait forever.
    #[clap(long)]
    timeout_ms: Option<u64>,
    /// TOML config file with [oracle] and [search] defaults.
    #[clap(long, value_parser)]
    config_file: Option<PathBuf>,
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    let config = match &cli.config_file {
        Some(config_path) => CountcrackConfig::load_from_file(config_path)?,
        None => {
            let default_config_path = PathBuf::from("countcrack.toml");
            if default_config_path.exists() {
                CountcrackConfig::load_from_file(&default_config_path)?
            } else {
                CountcrackConfig::default()
            }
        }
    };

    let search_config = SearchConfig {
        max_length: cli.max_length.unwrap_or(config.search.max_length),
        reverse: cli.reverse,
        known_prefix: cli.flag_format.clone(),
        length: cli.length,
        charset_code: cli.charset.unwrap_or(config.search.charset),
    };

    let mut oracle_config = CallgrindOracleConfig::new(cli.filename.clone());
    oracle_config.valgrind_path = config.oracle.valgrind_path.clone();
    oracle_config.timeout = cli
        .timeout_ms
        .or(config.oracle.timeout_ms)
        .map(Duration::from_millis);
    let mut oracle = CallgrindOracle::new(oracle_config)?;

    let mut progress = StdoutProgress::new(cli.verbose);
    match Searcher::new(&mut oracle, search_config).run(&mut progress) {
        Ok(secret) => {
            println!("{secret}");
            Ok(())
        }
        Err(SearchError::LengthInference) => {
            eprintln!("[countcrack] I couldn't guess the length, sorry. Try -l LENGTH.");
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}
