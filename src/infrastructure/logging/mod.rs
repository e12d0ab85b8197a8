//! Logging for the command line tool
//!
//! - bracketed line format shared by the console and the log file
//! - optional timestamped log file next to the console output

mod formatter;
mod setup;

pub use formatter::BracketedFormatter;
pub use setup::setup_logging;
