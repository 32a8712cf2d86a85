/// Receives search progress events. The search engine never prints on its
/// own; everything user-visible flows through a sink so tests can run the
/// engine silently (or record the stream) against synthetic oracles.
pub trait ProgressSink {
    /// A length-inference probe of `probe` measured `count`.
    fn length_probe(&mut self, probe: &str, count: Option<u64>);
    /// The length the search will use, inferred or supplied.
    fn length_resolved(&mut self, length: usize, inferred: bool);
    /// Scanning of `location` in `candidate` is about to begin.
    fn position_started(&mut self, candidate: &str, location: usize);
    /// One character trial at the current position measured `count`.
    fn trial(&mut self, ch: char, count: Option<u64>);
    /// A position was resolved; `candidate` is the new running best guess.
    fn candidate_updated(&mut self, candidate: &str);
    /// No character at `location` improved on the zero baseline; the
    /// candidate is left unchanged there and the search continues degraded.
    fn no_signal(&mut self, location: usize);
}

#[derive(Default, Debug, Clone, Copy)]
pub struct NoOpProgress;

impl ProgressSink for NoOpProgress {
    fn length_probe(&mut self, _probe: &str, _count: Option<u64>) {}
    fn length_resolved(&mut self, _length: usize, _inferred: bool) {}
    fn position_started(&mut self, _candidate: &str, _location: usize) {}
    fn trial(&mut self, _ch: char, _count: Option<u64>) {}
    fn candidate_updated(&mut self, _candidate: &str) {}
    fn no_signal(&mut self, _location: usize) {}
}

/// Prints candidate updates to stdout as the primary progress signal;
/// per-trial and per-probe lines only when verbose.
pub struct StdoutProgress {
    verbose: bool,
}

impl StdoutProgress {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

/// Wraps the character at `index` in ANSI bold so the position under test
/// stands out in terminal output.
pub fn make_bold(text: &str, index: usize) -> String {
    match text.char_indices().nth(index) {
        Some((byte_idx, ch)) => {
            let after = byte_idx + ch.len_utf8();
            format!("{}\x1b[1m{}\x1b[0m{}", &text[..byte_idx], ch, &text[after..])
        }
        None => text.to_string(),
    }
}

fn fmt_count(count: Option<u64>) -> String {
    match count {
        Some(n) => n.to_string(),
        None => "n/a".to_string(),
    }
}

impl ProgressSink for StdoutProgress {
    fn length_probe(&mut self, probe: &str, count: Option<u64>) {
        if self.verbose {
            println!("{probe} : {}", fmt_count(count));
        }
    }

    fn length_resolved(&mut self, length: usize, inferred: bool) {
        if inferred {
            println!("Length guess: {length}");
        } else {
            println!("Length: {length}");
        }
    }

    fn position_started(&mut self, candidate: &str, location: usize) {
        if self.verbose {
            println!("Testing: {} at {location}", make_bold(candidate, location));
        }
    }

    fn trial(&mut self, ch: char, count: Option<u64>) {
        if self.verbose {
            println!("     {ch} : {}", fmt_count(count));
        }
    }

    fn candidate_updated(&mut self, candidate: &str) {
        println!("{candidate}");
    }

    fn no_signal(&mut self, location: usize) {
        eprintln!("warning: no character stood out at position {location}, continuing with filler");
    }
}
