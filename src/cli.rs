use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "storyreel",
    version,
    about = "Browse and play 24-hour stories in the terminal"
)]
pub struct Cli {
    /// Viewer identity used for ownership, views and likes.
    #[arg(long, global = true, env = "STORYREEL_VIEWER_ID")]
    pub viewer: Option<String>,

    /// Story service base URL; the local store is used when absent.
    #[arg(long, global = true, env = "STORYREEL_API_URL")]
    pub api_url: Option<String>,

    /// Display time per story in milliseconds.
    #[arg(long, global = true, env = "STORYREEL_STORY_MS")]
    pub story_ms: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print one summary row per author.
    Rail,
    /// Open the story viewer directly.
    View(ViewArgs),
    Tui,
    /// Publish a story that expires in 24 hours.
    Post(PostArgs),
    /// Delete one of your own stories.
    Delete { id: String },
    /// Seed the local store from a JSON feed file.
    Import { file: PathBuf },
}

#[derive(Debug, Args)]
pub struct ViewArgs {
    /// Start at this story id.
    #[arg(long, conflicts_with = "index")]
    pub story: Option<String>,
    /// Start at this position of the fetched feed (0-based).
    #[arg(long)]
    pub index: Option<usize>,
}

#[derive(Debug, Args)]
pub struct PostArgs {
    #[arg(long)]
    pub text: Option<String>,
    #[arg(long)]
    pub media: Option<String>,
    #[arg(long, requires = "audio_title")]
    pub audio_url: Option<String>,
    #[arg(long)]
    pub audio_title: Option<String>,
    #[arg(long)]
    pub audio_artist: Option<String>,
}
