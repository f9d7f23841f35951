use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "podtrack",
    version,
    about = "Listen to the podcast series and unlock episodes as you go"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the episode catalog with lock markers
    List,
    /// Play one episode and exit when it finishes
    Play {
        /// Episode id as shown by `podtrack list`
        id: u32,
    },
    /// Open the assessment for an episode and unlock its successor
    Assess {
        /// Episode id as shown by `podtrack list`
        id: u32,
    },
    Tui,
}
