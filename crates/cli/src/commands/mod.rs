pub(crate) mod get;
pub(crate) mod migrate;
pub(crate) mod put;

/// Result of a subcommand; the error is reported by `main`.
pub(crate) type CmdResult = Result<(), Box<dyn std::error::Error>>;
