use std::{
    fs,
    path::{Path, PathBuf},
};

use color_eyre::{
    Result,
    eyre::{WrapErr as _, bail, eyre},
};
use log::{debug, info};
use nanogen_engine::{
    APP_NAME, GeminiClient, GenerateOutcome, Model, Session, Settings, encoding::Attachment,
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::cli::{Cli, Command, ConfigCommand, GenerateArgs};

pub mod cli;
pub mod studio;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_key: Option<String>,
    pub endpoint: Option<String>,
    pub model: Model,
    pub output_dir: Option<PathBuf>,
}

impl Config {
    /// Command line flags win over the file.
    pub fn settings(&self, cli: &Cli) -> Settings {
        Settings {
            api_key: cli
                .api_key
                .clone()
                .or_else(|| self.api_key.clone())
                .unwrap_or_default(),
            endpoint: cli
                .endpoint
                .clone()
                .or_else(|| self.endpoint.clone())
                .unwrap_or_default(),
        }
    }

    pub fn model(&self, cli: &Cli) -> Model {
        cli.model.unwrap_or(self.model)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .or_else(|| dirs::picture_dir().map(|d| d.join(APP_NAME)))
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    let path = config_path()?;
    let cfg = load_config(&path)?.unwrap_or_default();
    debug!("config from {}: model {}", path.display(), cfg.model);

    match &cli.command {
        Command::Generate(args) => generate(&cli, &cfg, args).await,
        Command::Studio => {
            let mut session = Session::new(cfg.settings(&cli));
            session.set_model(cfg.model(&cli));
            studio::Studio::new(session, cfg.output_dir()).run().await
        }
        Command::Config(cmd) => update_config(&path, cfg, cmd),
    }
}

async fn generate(cli: &Cli, cfg: &Config, args: &GenerateArgs) -> Result<()> {
    let mut session = Session::new(cfg.settings(cli));
    session.set_model(cfg.model(cli));
    session.set_prompt(args.prompt.as_str());
    session.set_aspect_ratio(args.aspect_ratio);
    session.set_resolution(args.resolution);
    session.set_search(args.search);

    let mut attachments = Vec::with_capacity(args.references.len());
    for path in &args.references {
        attachments.push(Attachment::from_path(path).await?);
    }
    session.attach(attachments);
    if let Some(notice) = session.error() {
        eprintln!("{notice}");
    }

    eprintln!("Generating with {} ...", session.model().profile().label);
    match session.generate(&GeminiClient::new()).await {
        GenerateOutcome::Generated(n) => {
            let out = args.out.clone().unwrap_or_else(|| cfg.output_dir());
            for (i, img) in session.gallery().iter().take(n).enumerate() {
                println!("{}", img.save_to(&out, i)?.display());
            }
            Ok(())
        }
        GenerateOutcome::Failed(msg) => bail!(msg),
        GenerateOutcome::Busy => bail!("A generation is already running"),
    }
}

fn update_config(path: &Path, mut cfg: Config, cmd: &ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show => {
            println!("config file: {}", path.display());
            println!(
                "api key:     {}",
                if cfg.api_key.is_some() { "set" } else { "not set" }
            );
            println!(
                "endpoint:    {}",
                cfg.endpoint.as_deref().unwrap_or("(Google API)")
            );
            println!("model:       {}", cfg.model.profile().label);
            println!("output dir:  {}", cfg.output_dir().display());
            return Ok(());
        }
        ConfigCommand::SetKey { key } => cfg.api_key = Some(key.clone()),
        ConfigCommand::SetEndpoint { url } => {
            cfg.endpoint = url.clone().filter(|u| !u.trim().is_empty())
        }
        ConfigCommand::SetModel { model } => cfg.model = *model,
        ConfigCommand::SetOutputDir { dir } => cfg.output_dir = Some(dir.clone()),
    }
    save_config(path, &cfg)?;
    info!("Updated {}", path.display());
    Ok(())
}

pub fn load_ron_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let src = fs::read_to_string(path)?;
    Ok(ron::from_str(&src)?)
}

pub fn save_ron_file<T: Serialize>(path: &Path, x: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(fs::write(path, ron::to_string(x)?)?)
}

pub fn config_path() -> Result<PathBuf> {
    Ok(dirs::config_local_dir()
        .ok_or(eyre!("Couldn't get config dir"))?
        .join("nanogen.ron"))
}

pub fn load_config(path: &Path) -> Result<Option<Config>> {
    if !path.exists() {
        Ok(None)
    } else {
        load_ron_file(path)
            .map(Some)
            .wrap_err_with(|| format!("reading config {}", path.display()))
    }
}

pub fn save_config(path: &Path, cfg: &Config) -> Result<()> {
    save_ron_file(path, cfg)
}
