use std::path::PathBuf;

use clap::Parser;

use crate::sequencer::Policy;

#[derive(Parser, Debug)]
#[command(name = "cadence", version = crate::VERSION, about = "Terminal music player")]
pub struct Args {
    /// File to play, or a search string matched against artist, album and title.
    /// Without a target, playback follows the queue policy.
    pub target: Option<String>,

    /// Config file (defaults to ~/.cadence/config.toml, created on first run).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Queue policy, overriding the config file.
    #[arg(long, value_enum)]
    pub policy: Option<Policy>,

    /// Print output devices and exit.
    #[arg(long)]
    pub list_devices: bool,

    /// Output device name (substring match), overriding the config file.
    #[arg(long)]
    pub device: Option<String>,

    /// Skip indexing the configured library roots at startup.
    #[arg(long)]
    pub no_index: bool,
}

/// What the positional argument asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    File(PathBuf),
    Search(String),
    Dynamic,
}

impl Args {
    pub fn target(&self) -> Target {
        match self.target.as_deref().map(str::trim) {
            None | Some("") => Target::Dynamic,
            Some(t) if std::path::Path::new(t).is_file() => Target::File(PathBuf::from(t)),
            Some(t) => Target::Search(t.to_string()),
        }
    }
}
