//! CLI module for deskloop - command-line interface and subcommands.

pub mod commands;

pub use commands::Cli;
