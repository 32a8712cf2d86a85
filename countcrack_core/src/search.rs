use crate::charset::charset_for;
use crate::oracle::{Oracle, OracleError};
use crate::progress::ProgressSink;
use thiserror::Error;

/// Placeholder byte for positions not yet resolved (and for the length
/// probes). Any charset member would do; 'a' keeps probe strings printable.
const FILLER: u8 = b'a';

#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Upper bound for length inference when no explicit length is given.
    pub max_length: usize,
    /// Resolve positions from the end of the string backward.
    pub reverse: bool,
    /// Leading characters assumed correct; the scan starts after them.
    pub known_prefix: String,
    /// Explicit secret length; skips inference when set.
    pub length: Option<usize>,
    /// Charset code, see `charset::charset_for`.
    pub charset_code: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_length: 35,
            reverse: false,
            known_prefix: String::new(),
            length: None,
            charset_code: 0,
        }
    }
}

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("could not infer the secret's length from the instruction counts")]
    LengthInference,
    #[error("known prefix is {prefix} characters long but the secret length is {length}")]
    PrefixTooLong { prefix: usize, length: usize },
    #[error(transparent)]
    Oracle(#[from] OracleError),
}

/// Greedy single-pass reconstruction of a secret string from an
/// instruction-count oracle.
///
/// At each position every charset character is tried once and the trial
/// with the strictly highest count is kept, whole-string. Resolved
/// positions are never revisited: the search assumes the count grows with
/// the length of the correctly matched prefix (or suffix, in reverse
/// mode). That assumption makes this a deliberate approximation; a later
/// position can never repair an earlier wrong pick.
pub struct Searcher<'a, O: Oracle> {
    oracle: &'a mut O,
    config: SearchConfig,
}

impl<'a, O: Oracle> Searcher<'a, O> {
    pub fn new(oracle: &'a mut O, config: SearchConfig) -> Self {
        Self { oracle, config }
    }

    /// Estimates the secret length by probing filler strings of growing
    /// length and keeping the first length that reaches the maximum count.
    ///
    /// A best count equal to the length-1 baseline means the target did no
    /// length-dependent work, so the probe carried no information; that and
    /// an oracle that never produced a reading both fail the inference.
    pub fn find_length(&mut self, sink: &mut dyn ProgressSink) -> Result<usize, SearchError> {
        let filler = char::from(FILLER).to_string();
        let baseline = self.oracle.measure(&filler)?;

        let mut best: Option<(u64, usize)> = None;
        for i in 1..=self.config.max_length {
            let probe = filler.repeat(i);
            let count = self.oracle.measure(&probe)?;
            sink.length_probe(&probe, count);
            if let Some(count) = count {
                if best.is_none_or(|(max, _)| count > max) {
                    best = Some((count, i));
                }
            }
        }

        match best {
            Some((max, length)) if baseline != Some(max) => Ok(length),
            _ => Err(SearchError::LengthInference),
        }
    }

    /// Scans the charset at `location` and returns the trial string with
    /// the strictly highest count, or `None` when no character improved on
    /// the zero baseline (every trial absent or zero) — the degenerate
    /// no-signal outcome, distinct from any real answer.
    ///
    /// `location` must index into `candidate`.
    pub fn resolve_position(
        &mut self,
        candidate: &[u8],
        location: usize,
        sink: &mut dyn ProgressSink,
    ) -> Result<Option<Vec<u8>>, SearchError> {
        debug_assert!(
            location < candidate.len(),
            "position {location} out of range for a {}-byte candidate",
            candidate.len()
        );
        let charset = charset_for(self.config.charset_code);
        let mut maximum = 0u64;
        let mut best: Option<Vec<u8>> = None;

        for ch in charset.chars() {
            let mut trial = candidate.to_vec();
            trial[location] = ch as u8;
            let trial_str = String::from_utf8_lossy(&trial).into_owned();
            let count = self.oracle.measure(&trial_str)?;
            sink.trial(ch, count);
            if let Some(count) = count {
                // Strict improvement only: charset order is the tie-break.
                if count > maximum {
                    maximum = count;
                    best = Some(trial);
                }
            }
        }

        Ok(best)
    }

    /// Runs the full search: resolve the length, seed the candidate with
    /// the known prefix plus filler, then resolve one position at a time in
    /// the configured direction. Positions without a distinguishing
    /// character are reported and left as filler; the search continues.
    pub fn run(&mut self, sink: &mut dyn ProgressSink) -> Result<String, SearchError> {
        let (length, inferred) = match self.config.length {
            Some(length) => (length, false),
            None => (self.find_length(sink)?, true),
        };
        sink.length_resolved(length, inferred);

        let prefix = self.config.known_prefix.clone();
        if prefix.len() > length {
            return Err(SearchError::PrefixTooLong {
                prefix: prefix.len(),
                length,
            });
        }

        let mut candidate = prefix.into_bytes();
        candidate.resize(length, FILLER);
        let start = self.config.known_prefix.len();

        let positions: Vec<usize> = if self.config.reverse {
            (start..length).rev().collect()
        } else {
            (start..length).collect()
        };

        for location in positions {
            sink.position_started(&String::from_utf8_lossy(&candidate), location);
            match self.resolve_position(&candidate, location, sink)? {
                Some(best) => {
                    candidate = best;
                    sink.candidate_updated(&String::from_utf8_lossy(&candidate));
                }
                None => sink.no_signal(location),
            }
        }

        Ok(String::from_utf8_lossy(&candidate).into_owned())
    }
}
