use std::path::PathBuf;

use clap::Parser;
use color_eyre::{Result, eyre::bail};
use nanogen_engine::{
    GeminiClient, GenerateOutcome, Model, Session, Settings, encoding::Attachment,
};

#[derive(clap::Parser)]
struct Arg {
    model: Model,
    key: String,
    description: String,
    #[arg(short, long)]
    reference: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    pretty_env_logger::init();
    color_eyre::install()?;
    let Arg {
        model,
        key,
        description,
        reference,
    } = Arg::parse();

    let mut session = Session::new(Settings {
        api_key: key,
        endpoint: String::new(),
    });
    session.set_model(model);
    session.set_prompt(description);
    for path in &reference {
        session.attach([Attachment::from_path(path).await?]);
    }

    match session.generate(&GeminiClient::new()).await {
        GenerateOutcome::Generated(n) => {
            for (i, img) in session.gallery().iter().take(n).enumerate() {
                let path = img.save_to(&PathBuf::from("."), i)?;
                println!("Saved {}", path.display());
            }
            Ok(())
        }
        GenerateOutcome::Failed(msg) => bail!(msg),
        GenerateOutcome::Busy => bail!("A generation is already running"),
    }
}
