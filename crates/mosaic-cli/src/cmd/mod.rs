//! Command handlers. One module per command family, each exposing clap
//! `Args` structs and a `run_*` function.

pub mod compact;
pub mod frame;
pub mod place;
