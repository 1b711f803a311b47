//! CLI subcommands.

pub mod spawn;
