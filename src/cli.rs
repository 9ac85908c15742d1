use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "sketchy-launcher")]
#[command(version, about = "Headless front end for the game install queue")]
pub struct Args {
    /// Directory holding the catalog, owned.json and logs (overrides LAUNCHER_ROOT_DIR)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Echo log records to stderr
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub sub: Cmd,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// List catalog games with the action available for each
    List {
        /// Case-insensitive name filter
        #[arg(long, short = 's')]
        search: Option<String>,

        /// Only show owned games
        #[arg(long)]
        owned: bool,
    },
    /// Mark a game as owned
    Claim { app_id: String },
    /// Download and install owned games one after another
    Install {
        #[arg(required = true)]
        app_ids: Vec<String>,

        /// Skip desktop shortcut creation
        #[arg(long)]
        no_shortcut: bool,
    },
    /// Launch an installed game
    Play { app_id: String },
    /// Persist a new install root
    SetInstallFolder { path: PathBuf },
}
