//! CLI surface (spec.md §6.2). The core only consumes the parsed
//! `{host, port, wkname, workers, debug}` struct spec.md names; flag
//! parsing itself is an ambient concern, implemented here the way the
//! teacher's `bin/avs.rs` does it.

use clap::Parser;

#[derive(Parser, Clone, Debug)]
pub struct Cli {
    /// Path to the configuration file.
    #[clap(short, long)]
    pub config: Option<String>,

    /// Bind host; overrides the configuration file.
    #[clap(long)]
    pub host: Option<String>,

    /// Bind port; overrides the configuration file.
    #[clap(short, long)]
    pub port: Option<u16>,

    /// Base name used to build this worker's identity.
    #[clap(long, default_value = "qw")]
    pub wkname: String,

    /// Number of worker processes to spawn.
    #[clap(short, long, default_value_t = 1)]
    pub workers: u32,

    #[clap(short, long, action)]
    pub debug: bool,

    /// If set, output logs in JSON format.
    #[clap(short, long, action)]
    pub json: bool,
}

/// Internal env var used to tell a re-exec'd child which index it is
/// (spec.md §9 "Global mutable JOB_LIST" redesign note).
pub const WORKER_INDEX_ENV_VAR: &str = "QW_WORKER_INDEX";
