pub mod charset;
pub mod config;
pub mod oracle;
pub mod progress;
pub mod search;

pub use charset::{DISALLOWED_CHARS, charset_for};
pub use config::CountcrackConfig;
pub use oracle::{CallgrindOracle, CallgrindOracleConfig, Oracle, OracleError};
pub use progress::{NoOpProgress, ProgressSink, StdoutProgress};
pub use search::{SearchConfig, SearchError, Searcher};
