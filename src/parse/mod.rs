//! Shell command parsing: tree-sitter segmentation and shlex word splitting.

pub mod shell;
pub mod tokenize;

pub use shell::segments;
pub use tokenize::{base_command, command_words, tokenize};
