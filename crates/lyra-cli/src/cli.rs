//! Command-line argument parsing for Lyra.

use std::path::PathBuf;

use clap::Parser;


/// Lyra - a music library player shell.
#[derive( Parser, Debug )]
#[command( name = "lyra" )]
#[command( version, about, long_about = None )]
pub struct Args {
    /// Catalog manifest (JSON array of tracks). Defaults to catalog.json
    /// in the data directory.
    #[arg( short, long )]
    pub catalog: Option<PathBuf>,

    /// Directory for session state, playlists and the lyrics cache.
    #[arg( short, long )]
    pub data_dir: Option<PathBuf>,

    /// Log filter, e.g. "lyra=debug". Overrides RUST_LOG.
    #[arg( short, long )]
    pub log: Option<String>,

    /// Files or URIs to open once the catalog is loaded.
    #[arg( trailing_var_arg = true )]
    pub files: Vec<String>,
}
