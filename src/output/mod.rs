//! Output formatting module
//!
//! Renders result trees for terminals and files.

mod formatter;

pub use formatter::{write_result_to_file, OutputFormat, ResultFormatter};
