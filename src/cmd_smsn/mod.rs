//! Subcommand modules for the `smsn` binary.

pub mod aln;
pub mod check;
pub mod compile;
pub mod context;
pub mod holes;
pub mod run;
