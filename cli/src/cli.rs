use std::path::PathBuf;

use nanogen_engine::{
    Model,
    params::{AspectRatio, Resolution},
};

#[derive(Debug, clap::Parser)]
#[command(name = "nanogen", version, about = "Gemini image generation from the terminal")]
pub struct Cli {
    /// Overrides the key from the config file
    #[arg(short = 'k', long)]
    pub api_key: Option<String>,

    /// Base URL of a compatible proxy, defaults to the Google API
    #[arg(short, long)]
    pub endpoint: Option<String>,

    #[arg(short, long)]
    pub model: Option<Model>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, clap::Subcommand)]
pub enum Command {
    /// Generate images for one prompt and save them
    Generate(GenerateArgs),
    /// Interactive session with a gallery
    Studio,
    /// Inspect or change the config file
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, clap::Args)]
pub struct GenerateArgs {
    pub prompt: String,

    #[arg(short, long, value_enum, default_value_t)]
    pub aspect_ratio: AspectRatio,

    /// Ignored by the flash model
    #[arg(short, long, value_enum, default_value_t)]
    pub resolution: Resolution,

    /// Ground the generation in Google search results (pro model only)
    #[arg(long)]
    pub search: bool,

    /// Reference images, in the order they are sent
    #[arg(long = "reference", value_name = "PATH")]
    pub references: Vec<PathBuf>,

    /// Where to save the images, defaults to the configured output dir
    #[arg(short, long)]
    pub out: Option<PathBuf>,
}

#[derive(Debug, clap::Subcommand)]
pub enum ConfigCommand {
    Show,
    SetKey { key: String },
    /// Leave out the url to go back to the Google API
    SetEndpoint { url: Option<String> },
    SetModel { model: Model },
    SetOutputDir { dir: PathBuf },
}
