//! # CLI Command Implementations
//!
//! The `sync` and `inspect` subcommands. Each module has an
//! `Args` struct derived with `clap` and an `execute` function that collects
//! what the library needs and calls into `scoped_sync` for the actual work.

pub mod inspect;
pub mod sync;
