use regex::Regex;
use std::io::{ErrorKind, Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Line emitted on callgrind's stderr summarizing the run, e.g.
/// `==12345== Collected : 84124412`.
const COLLECTED_PATTERN: &str = r"Collected : (\d+)";

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Error, Debug)]
pub enum OracleError {
    #[error("failed to spawn instrumentation harness '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("I/O error while driving the target: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid instruction-count pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// One side-channel measurement: run the target once with `candidate` on
/// stdin and report how many instructions the run executed.
///
/// `Ok(None)` means the measurement was unavailable for this trial (the
/// harness produced no parseable count, or the bounded wait expired). That
/// is an expected outcome, not an error; callers simply treat the trial as
/// non-competitive.
pub trait Oracle {
    fn measure(&mut self, candidate: &str) -> Result<Option<u64>, OracleError>;
}

pub struct CallgrindOracleConfig {
    /// Path to the target executable under attack.
    pub target: PathBuf,
    /// Valgrind binary to invoke. Overridable mainly for tests.
    pub valgrind_path: String,
    /// Bounded wait per measurement. `None` waits indefinitely, matching
    /// the behavior of running callgrind by hand.
    pub timeout: Option<Duration>,
}

impl CallgrindOracleConfig {
    pub fn new(target: PathBuf) -> Self {
        Self {
            target,
            valgrind_path: "valgrind".to_string(),
            timeout: None,
        }
    }
}

/// Measures instruction counts by running the target under
/// `valgrind --tool=callgrind` and scraping the `Collected :` summary line
/// from its stderr.
///
/// The candidate is delivered on the child's stdin (argument vector plus
/// piped stdin, never a shell command line), followed by a newline as the
/// target's line-oriented read expects. The callgrind output file goes to a
/// scoped temporary file that is removed when the call returns, whether or
/// not parsing succeeded.
pub struct CallgrindOracle {
    config: CallgrindOracleConfig,
    collected: Regex,
}

enum WaitOutcome {
    Exited(ExitStatus),
    TimedOut,
}

impl CallgrindOracle {
    pub fn new(config: CallgrindOracleConfig) -> Result<Self, OracleError> {
        Ok(Self {
            config,
            collected: Regex::new(COLLECTED_PATTERN)?,
        })
    }

    fn wait_bounded(&self, child: &mut Child, timeout: Duration) -> Result<WaitOutcome, OracleError> {
        let start_time = Instant::now();
        loop {
            match child.try_wait()? {
                Some(status) => return Ok(WaitOutcome::Exited(status)),
                None => {
                    if start_time.elapsed() > timeout {
                        child.kill()?;
                        // Reap the killed child so it does not linger.
                        let _ = child.wait();
                        return Ok(WaitOutcome::TimedOut);
                    }
                    std::thread::sleep(WAIT_POLL_INTERVAL);
                }
            }
        }
    }

    fn parse_collected(&self, stderr: &str) -> Option<u64> {
        self.collected
            .captures(stderr)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<u64>().ok())
    }
}

impl Oracle for CallgrindOracle {
    fn measure(&mut self, candidate: &str) -> Result<Option<u64>, OracleError> {
        let outfile = tempfile::NamedTempFile::new()?;

        let mut cmd = Command::new(&self.config.valgrind_path);
        cmd.arg("--tool=callgrind")
            .arg(format!("--callgrind-out-file={}", outfile.path().display()))
            .arg(&self.config.target)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|source| OracleError::Spawn {
            command: self.config.valgrind_path.clone(),
            source,
        })?;

        if let Some(mut child_stdin) = child.stdin.take() {
            let mut line = candidate.as_bytes().to_vec();
            line.push(b'\n');
            // A target that exits without draining stdin yields EPIPE;
            // the measurement may still be valid, so don't abort on it.
            match child_stdin.write_all(&line) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::BrokenPipe => {}
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(OracleError::Io(e));
                }
            }
        }

        let stderr_handle = child.stderr.take();

        let (outcome, diagnostics) = match self.config.timeout {
            None => {
                // Drain stderr to EOF before reaping. A run can emit more
                // stderr than the pipe buffer holds; waiting first would
                // leave the child blocked on a full pipe while we block in
                // wait(), deadlocking on perfectly valid input. EOF arrives
                // when the child exits, so the read cannot outlast it.
                let mut diagnostics = String::new();
                if let Some(mut stderr) = stderr_handle {
                    stderr.read_to_string(&mut diagnostics)?;
                }
                (WaitOutcome::Exited(child.wait()?), diagnostics)
            }
            Some(timeout) => {
                // The poll loop cannot read and wait at once, so a thread
                // drains the pipe while we poll; it sees EOF once the
                // child's write end closes.
                let reader = stderr_handle.map(|mut stderr| {
                    std::thread::spawn(move || {
                        let mut buf = String::new();
                        let _ = stderr.read_to_string(&mut buf);
                        buf
                    })
                });
                let outcome = self.wait_bounded(&mut child, timeout)?;
                let diagnostics = match (&outcome, reader) {
                    // A killed child may leave grandchildren holding the
                    // pipe open; leave the reader detached rather than
                    // blocking on it after a timeout.
                    (WaitOutcome::TimedOut, _) => String::new(),
                    (_, Some(handle)) => handle.join().unwrap_or_default(),
                    (_, None) => String::new(),
                };
                (outcome, diagnostics)
            }
        };

        // The temp file lives until here so callgrind always had a valid
        // destination; it is deleted on drop whatever the outcome.
        drop(outfile);

        match outcome {
            WaitOutcome::TimedOut => Ok(None),
            WaitOutcome::Exited(_) => Ok(self.parse_collected(&diagnostics)),
        }
    }
}

#[cfg(test)]
mod parse_tests {
    use super::*;

    fn test_oracle() -> CallgrindOracle {
        CallgrindOracle::new(CallgrindOracleConfig::new(PathBuf::from("/bin/true"))).unwrap()
    }

    #[test]
    fn parses_collected_line_from_callgrind_stderr() {
        let oracle = test_oracle();
        let stderr = "\
==4242== Callgrind, a call-graph generating cache profiler\n\
==4242== For counts of detected and suppressed errors, rerun with: -v\n\
==4242== Collected : 8412441\n\
==4242== I   refs:      8,412,441\n";
        assert_eq!(oracle.parse_collected(stderr), Some(8_412_441));
    }

    #[test]
    fn missing_collected_line_is_absent_not_error() {
        let oracle = test_oracle();
        assert_eq!(oracle.parse_collected("==1== target crashed early\n"), None);
        assert_eq!(oracle.parse_collected(""), None);
    }

    #[test]
    fn malformed_count_is_absent() {
        let oracle = test_oracle();
        assert_eq!(oracle.parse_collected("Collected : lots\n"), None);
    }
}

#[cfg(test)]
mod command_tests {
    use super::*;

    fn fake_harness_path(name: &str) -> PathBuf {
        let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        manifest_dir.join("../test_targets").join(name)
    }

    fn oracle_with_harness(harness: &str, timeout: Option<Duration>) -> CallgrindOracle {
        let harness_path = fake_harness_path(harness);
        assert!(
            harness_path.exists(),
            "test harness missing: {harness_path:?}"
        );
        let mut config = CallgrindOracleConfig::new(PathBuf::from("/bin/true"));
        config.valgrind_path = harness_path.to_string_lossy().into_owned();
        config.timeout = timeout;
        CallgrindOracle::new(config).unwrap()
    }

    #[test]
    fn measure_reads_count_from_stderr() {
        let mut oracle = oracle_with_harness("fake_callgrind.sh", None);
        // The fake harness scores matched-prefix length against "CTF{zz}".
        let full = oracle.measure("CTF{zz}").unwrap().unwrap();
        let partial = oracle.measure("CTF{za}").unwrap().unwrap();
        let miss = oracle.measure("xxxxxxx").unwrap().unwrap();
        assert!(full > partial, "full match must out-count partial match");
        assert!(partial > miss, "partial match must out-count miss");
    }

    #[test]
    fn measure_without_collected_line_is_absent() {
        let mut oracle = oracle_with_harness("silent_callgrind.sh", None);
        assert_eq!(oracle.measure("anything").unwrap(), None);
    }

    #[test]
    fn measure_survives_stderr_larger_than_pipe_buffer() {
        // A chatty run fills the stderr pipe long before exiting; the
        // untimed path must drain it to EOF before reaping or both sides
        // block forever.
        let mut oracle = oracle_with_harness("chatty_callgrind.sh", None);
        assert_eq!(oracle.measure("x").unwrap(), Some(777));
    }

    #[test]
    fn bounded_wait_also_drains_chatty_stderr() {
        let mut oracle =
            oracle_with_harness("chatty_callgrind.sh", Some(Duration::from_secs(10)));
        assert_eq!(oracle.measure("x").unwrap(), Some(777));
    }

    #[test]
    fn measure_timeout_is_absent_not_error() {
        let mut oracle = oracle_with_harness("hang_callgrind.sh", Some(Duration::from_millis(200)));
        assert_eq!(oracle.measure("anything").unwrap(), None);
    }

    #[test]
    fn end_to_end_search_recovers_fake_secret() {
        use crate::progress::NoOpProgress;
        use crate::search::{SearchConfig, Searcher};

        let mut oracle = oracle_with_harness("fake_callgrind.sh", None);
        let config = SearchConfig {
            length: Some(7),
            known_prefix: "CTF{".to_string(),
            charset_code: 1,
            ..Default::default()
        };
        let secret = Searcher::new(&mut oracle, config)
            .run(&mut NoOpProgress)
            .unwrap();
        assert_eq!(secret, "CTF{zz}");
    }

    #[test]
    fn missing_harness_is_a_spawn_error() {
        let mut config = CallgrindOracleConfig::new(PathBuf::from("/bin/true"));
        config.valgrind_path = "./no_such_valgrind_binary_12345".to_string();
        let mut oracle = CallgrindOracle::new(config).unwrap();
        match oracle.measure("x") {
            Err(OracleError::Spawn { command, .. }) => {
                assert!(command.contains("no_such_valgrind_binary"));
            }
            other => panic!("expected spawn error, got {other:?}"),
        }
    }
}
