//! Line based front-end over [`Session`].
//!
//! Generation runs in the background while the prompt stays responsive, so
//! `status` and `gallery` keep working and a second `generate` is ignored
//! until the first one is back.

use std::{
    future::Future,
    io::{Write as _, stdout},
    path::PathBuf,
    pin::Pin,
};

use clap::{ArgAction, Parser, builder::BoolishValueParser};
use color_eyre::Result;
use log::debug;
use nanogen_engine::{
    GeminiClient, GenerateOutcome, Model, Session,
    encoding::Attachment,
    params::{AspectRatio, Resolution},
    session::CompletedGeneration,
};
use tokio::io::{AsyncBufReadExt, BufReader, stdin};

type GenerationFuture = Pin<Box<dyn Future<Output = CompletedGeneration> + Send>>;

#[derive(Debug, Parser)]
#[command(multicall = true)]
struct Line {
    #[command(subcommand)]
    command: StudioCommand,
}

#[derive(Debug, clap::Subcommand)]
enum StudioCommand {
    /// Set the prompt, the rest of the line is taken as is
    Prompt {
        #[arg(required = true, num_args = 1.., trailing_var_arg = true, allow_hyphen_values = true)]
        text: Vec<String>,
    },
    /// Switch model, extra reference images are dropped
    Model { model: Model },
    Ratio {
        #[arg(value_enum)]
        ratio: AspectRatio,
    },
    Resolution {
        #[arg(value_enum)]
        resolution: Resolution,
    },
    /// Toggle search grounding (on/off)
    Search {
        #[arg(action = ArgAction::Set, value_parser = BoolishValueParser::new())]
        enabled: bool,
    },
    /// Add reference images
    Attach {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Remove a reference image by its number
    Detach { number: usize },
    Key { key: String },
    /// Set a proxy base url, no argument resets to the Google API
    Endpoint { url: Option<String> },
    Generate,
    Gallery,
    /// Save one image by its number, or all of them
    Save {
        number: Option<usize>,
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    Status,
    #[command(alias = "exit")]
    Quit,
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

pub struct Studio {
    session: Session,
    client: GeminiClient,
    output_dir: PathBuf,
    in_flight: Option<GenerationFuture>,
}

impl Studio {
    pub fn new(session: Session, output_dir: PathBuf) -> Self {
        Self {
            session,
            client: GeminiClient::new(),
            output_dir,
            in_flight: None,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        println!("{}", indoc::indoc! {"
            NanoGen studio. Type `help` for the list of commands.
            Start with `key <API key>` (unless configured) and `prompt <text>`, then `generate`.
        "});

        let mut lines = BufReader::new(stdin()).lines();
        loop {
            print!("nanogen> ");
            stdout().flush()?;

            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else { break };
                    if self.handle_line(&line).await? == Flow::Quit {
                        break;
                    }
                }
                completed = wait_for(&mut self.in_flight) => {
                    self.in_flight = None;
                    println!();
                    let outcome = self.session.finish_generation(completed);
                    self.report(outcome);
                }
            }
        }

        if self.in_flight.is_some() {
            println!("Dropping the request still in flight");
        }
        Ok(())
    }

    async fn handle_line(&mut self, line: &str) -> Result<Flow> {
        // prompts keep their quotes and spacing, so they skip tokenising
        if let Some(rest) = raw_prompt(line) {
            if rest.is_empty() {
                println!("Usage: prompt <text>");
                return Ok(Flow::Continue);
            }
            let text = vec![rest.to_string()];
            return self.handle(StudioCommand::Prompt { text }).await;
        }

        let words = match shell_words::split(line) {
            Ok(words) => words,
            Err(e) => {
                println!("{e}");
                return Ok(Flow::Continue);
            }
        };
        if words.is_empty() {
            return Ok(Flow::Continue);
        }

        match Line::try_parse_from(words) {
            Ok(Line { command }) => self.handle(command).await,
            Err(e) => {
                println!("{e}");
                Ok(Flow::Continue)
            }
        }
    }

    async fn handle(&mut self, command: StudioCommand) -> Result<Flow> {
        debug!("studio command: {command:?}");
        match command {
            StudioCommand::Prompt { text } => self.session.set_prompt(text.join(" ")),
            StudioCommand::Model { model } => {
                self.session.set_model(model);
                println!("{}", model.profile().description);
                self.print_error();
            }
            StudioCommand::Ratio { ratio } => self.session.set_aspect_ratio(ratio),
            StudioCommand::Resolution { resolution } => {
                self.session.set_resolution(resolution);
                if !self.session.model().profile().configurable_resolution {
                    println!("The current model has a fixed 1024px output, resolution is ignored");
                }
            }
            StudioCommand::Search { enabled } => {
                self.session.set_search(enabled);
                if enabled && !self.session.model().profile().search_available {
                    println!("Search grounding is only used with the pro model");
                }
            }
            StudioCommand::Attach { paths } => {
                let mut files = Vec::with_capacity(paths.len());
                for path in &paths {
                    match Attachment::from_path(path).await {
                        Ok(a) => files.push(a),
                        Err(e) => println!("Skipping {}: {e}", path.display()),
                    }
                }
                let taken = self.session.attach(files);
                println!(
                    "Attached {taken}, {}/{} reference images",
                    self.session.attachments().len(),
                    self.session.model().max_images()
                );
                self.print_error();
            }
            StudioCommand::Detach { number } => match number
                .checked_sub(1)
                .and_then(|i| self.session.detach(i))
            {
                Some(a) => println!("Removed {}", a.name),
                None => println!("No reference image #{number}"),
            },
            StudioCommand::Key { key } => self.session.set_api_key(key),
            StudioCommand::Endpoint { url } => {
                self.session.set_endpoint(url.unwrap_or_default());
                println!("{}", self.session.endpoint_preview());
            }
            StudioCommand::Generate => self.start_generation(),
            StudioCommand::Gallery => self.print_gallery(),
            StudioCommand::Save { number, out } => {
                if let Err(e) = self.save(number, out) {
                    println!("Save failed: {e}");
                }
            }
            StudioCommand::Status => self.print_status(),
            StudioCommand::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    fn start_generation(&mut self) {
        if self.session.is_generating() {
            println!("Still generating, please wait");
            return;
        }
        match self.session.begin_generation() {
            Some(pending) => {
                let client = self.client.clone();
                self.in_flight = Some(Box::pin(async move { pending.run(&client).await }));
                println!("Generating...");
            }
            None => self.print_error(),
        }
    }

    fn report(&self, outcome: GenerateOutcome) {
        match outcome {
            GenerateOutcome::Generated(n) => {
                println!("{n} new images, `gallery` to list them, `save` to write them out")
            }
            GenerateOutcome::Failed(msg) => println!("Error: {msg}"),
            GenerateOutcome::Busy => {}
        }
    }

    fn save(&self, number: Option<usize>, out: Option<PathBuf>) -> Result<()> {
        let dir = out.unwrap_or_else(|| self.output_dir.clone());
        let gallery = self.session.gallery();
        let indices: Vec<usize> = match number {
            Some(n) if (1..=gallery.len()).contains(&n) => vec![n - 1],
            Some(n) => {
                println!("No image #{n}");
                return Ok(());
            }
            None => (0..gallery.len()).collect(),
        };
        for i in indices {
            println!("Saved {}", gallery[i].save_to(&dir, i)?.display());
        }
        Ok(())
    }

    fn print_gallery(&self) {
        let gallery = self.session.gallery();
        if gallery.is_empty() {
            println!("No images yet");
            return;
        }
        for (i, img) in gallery.iter().enumerate() {
            println!(
                "#{:<3} {}  {:<10}  {}",
                i + 1,
                img.created_at().format("%Y-%m-%d %H:%M:%S"),
                img.mime_type(),
                img.prompt()
            );
        }
    }

    fn print_status(&self) {
        let s = &self.session;
        let params = s.params();
        let profile = s.model().profile();
        println!("model:       {}", profile.label);
        println!("endpoint:    {}", s.endpoint_preview());
        println!(
            "api key:     {}",
            if s.settings().api_key.trim().is_empty() { "missing" } else { "set" }
        );
        println!("prompt:      {}", params.prompt);
        println!("ratio:       {}", params.aspect_ratio);
        match params.effective_resolution() {
            Some(r) => println!("resolution:  {r}"),
            None => println!("resolution:  fixed 1024px"),
        }
        if profile.search_available {
            println!(
                "search:      {}",
                if params.search_enabled { "on" } else { "off" }
            );
        }
        println!(
            "references:  {}/{}{}",
            s.attachments().len(),
            profile.max_images,
            if s.can_attach() { "" } else { " (full)" }
        );
        for (i, a) in s.attachments().iter().enumerate() {
            println!("  #{} {} ({})", i + 1, a.name, a.mime_type);
        }
        println!("gallery:     {} images", s.gallery().len());
        if s.is_generating() {
            println!("generating...");
        }
        self.print_error();
    }

    fn print_error(&self) {
        if let Some(e) = self.session.error() {
            println!("! {e}");
        }
    }
}

/// The text after a leading `prompt` word, taken verbatim.
fn raw_prompt(line: &str) -> Option<&str> {
    let line = line.trim_start();
    let rest = line.strip_prefix("prompt")?;
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return None;
    }
    Some(rest.trim_start())
}

async fn wait_for(in_flight: &mut Option<GenerationFuture>) -> CompletedGeneration {
    match in_flight {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use nanogen_engine::{Settings, gemini_api::InlineImage};

    use super::*;

    fn studio() -> Studio {
        Studio::new(
            Session::new(Settings::default()),
            std::env::temp_dir(),
        )
    }

    fn parse(line: &str) -> StudioCommand {
        Line::try_parse_from(shell_words::split(line).unwrap())
            .unwrap()
            .command
    }

    #[test]
    fn parses_commands() {
        assert!(matches!(
            parse("prompt a red fox --in the snow"),
            StudioCommand::Prompt { text } if text.join(" ") == "a red fox --in the snow"
        ));
        assert!(matches!(parse("model flash"), StudioCommand::Model { model: Model::Flash }));
        assert!(matches!(
            parse("ratio 16:9"),
            StudioCommand::Ratio { ratio: AspectRatio::Landscape }
        ));
        assert!(matches!(parse("search on"), StudioCommand::Search { enabled: true }));
        assert!(matches!(parse("search off"), StudioCommand::Search { enabled: false }));
        assert!(matches!(
            parse("attach 'my cat.png' dog.jpg"),
            StudioCommand::Attach { paths } if paths.len() == 2
        ));
        assert!(matches!(parse("exit"), StudioCommand::Quit));
        assert!(Line::try_parse_from(["resolution", "8K"]).is_err());
    }

    #[tokio::test]
    async fn commands_update_the_session() {
        let mut studio = studio();
        studio.handle_line("prompt  a tiny robot").await.unwrap();
        studio.handle_line("resolution 4K").await.unwrap();
        studio.handle_line("endpoint https://proxy.example.com/").await.unwrap();

        let params = studio.session.params();
        assert_eq!(params.prompt, "a tiny robot");
        assert_eq!(params.resolution, Resolution::FourK);
        assert_eq!(
            studio.session.endpoint_preview(),
            "https://proxy.example.com/v1beta/models/gemini-3-pro-image-preview:generateContent"
        );
        assert_eq!(studio.handle_line("quit").await.unwrap(), Flow::Quit);
    }

    #[tokio::test]
    async fn generate_without_key_stays_idle() {
        let mut studio = studio();
        studio.handle_line("prompt a tiny robot").await.unwrap();
        studio.handle_line("generate").await.unwrap();
        assert!(studio.in_flight.is_none());
        assert!(!studio.session.is_generating());
        assert_eq!(studio.session.error(), Some("Please enter an API key"));
    }

    #[tokio::test]
    async fn bad_input_is_reported_not_fatal() {
        let mut studio = studio();
        assert_eq!(studio.handle_line("frobnicate").await.unwrap(), Flow::Continue);
        assert_eq!(studio.handle_line("attach 'unclosed").await.unwrap(), Flow::Continue);
        assert_eq!(studio.handle_line("detach 0").await.unwrap(), Flow::Continue);
        assert_eq!(studio.handle_line("").await.unwrap(), Flow::Continue);
    }

    #[tokio::test]
    async fn prompt_text_is_kept_verbatim() {
        let mut studio = studio();
        studio.handle_line("prompt a cat's hat").await.unwrap();
        assert_eq!(studio.session.params().prompt, "a cat's hat");

        studio
            .handle_line(r#"prompt a sign saying "OPEN"   now"#)
            .await
            .unwrap();
        assert_eq!(studio.session.params().prompt, r#"a sign saying "OPEN"   now"#);

        assert_eq!(raw_prompt("prompts"), None);
        assert_eq!(raw_prompt("  prompt"), Some(""));
        assert_eq!(studio.handle_line("prompt   ").await.unwrap(), Flow::Continue);
        assert_eq!(studio.session.params().prompt, r#"a sign saying "OPEN"   now"#);
    }

    #[tokio::test]
    async fn failed_save_keeps_the_studio_running() {
        let mut studio = studio();
        studio.session.finish_generation(CompletedGeneration {
            prompt: "a tiny robot".into(),
            result: Ok(vec![InlineImage {
                mime_type: "image/png".into(),
                data: "AAAA".into(),
            }]),
        });
        assert_eq!(studio.session.gallery().len(), 1);

        assert_eq!(
            studio.handle_line("save -o /dev/null/nope").await.unwrap(),
            Flow::Continue
        );
        assert_eq!(studio.handle_line("save 7").await.unwrap(), Flow::Continue);
    }
}
