mod config;
mod error;
mod core {
    pub mod types;
    pub mod validate;
}
mod ai {
    pub mod arbiter;
    pub mod client;
    pub mod council;
    pub mod persona;
    pub mod prompts;
    pub mod schema_utils;
    pub mod solo;
    pub mod translator;
}
mod orchestrator;

use ai::arbiter::Arbiter;
use ai::client::{CompletionGateway, OpenAiClient};
use ai::council::Council;
use ai::persona::Persona;
use ai::solo::SoloCritic;
use ai::translator::Translator;
use clap::Parser;
use config::Settings;
use dotenv::dotenv;
use error::MetaError;
use orchestrator::{RefinementSession, Reviser};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Refine an LLM prompt over several rounds of critique.
#[derive(Parser, Debug)]
#[command(name = "magi", version)]
struct Cli {
    /// Prompt text to refine
    #[arg(conflicts_with = "file")]
    prompt: Option<String>,

    /// Read the prompt from a UTF-8 file
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Number of refinement rounds
    #[arg(short, long, default_value_t = 3)]
    rounds: u32,

    /// Fixed user message; the prompt under refinement is then sent as the system message
    #[arg(short, long)]
    user_prompt: Option<String>,

    /// Translate the prompt to English for the rounds and back afterwards
    #[arg(long)]
    translate: bool,

    /// Use a single analyze-then-update critic instead of the persona council
    #[arg(long)]
    solo: bool,

    /// JSON file with an array of {"name", "behavior", "model"?} personas
    #[arg(long, conflicts_with = "solo")]
    personas: Option<PathBuf>,

    /// Model for every call that has no model of its own
    #[arg(short, long)]
    model: Option<String>,

    /// Maximum prompt length in characters
    #[arg(long)]
    max_chars: Option<usize>,

    /// Fail when the prompt itself cannot be completed
    #[arg(long)]
    strict: bool,
}

impl Cli {
    fn apply(&self, settings: &mut Settings) {
        if let Some(model) = &self.model {
            settings.model = model.clone();
        }
        if let Some(max_chars) = self.max_chars {
            settings.max_prompt_chars = max_chars;
        }
        settings.strict |= self.strict;
    }

    fn read_prompt(&self) -> Result<String, MetaError> {
        match (&self.prompt, &self.file) {
            (Some(text), _) => Ok(text.clone()),
            (None, Some(path)) => Ok(std::fs::read_to_string(path)?.trim().to_string()),
            (None, None) => Err(MetaError::ConfigError("Give a prompt or --file <path>".into())),
        }
    }
}

fn load_personas(path: Option<&Path>, default_model: &str) -> Result<Vec<Persona>, MetaError> {
    let Some(path) = path else {
        return Ok(Persona::default_council(default_model));
    };

    let mut personas: Vec<Persona> = serde_json::from_str(&std::fs::read_to_string(path)?)?;
    for persona in personas.iter_mut().filter(|p| p.model.trim().is_empty()) {
        persona.model = default_model.to_string();
    }
    Ok(personas)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .filter_module("reqwest", log::LevelFilter::Warn)
        .filter_module("hyper", log::LevelFilter::Warn)
        .parse_default_env()
        .init();

    let cli = Cli::parse();
    let mut settings = Settings::from_env()?;
    cli.apply(&mut settings);

    let prompt = cli.read_prompt()?;
    let client = OpenAiClient::new(&settings)?;
    let call_budget = client.max_call_duration();
    let gateway: Arc<dyn CompletionGateway> = Arc::new(client);

    let reviser: Box<dyn Reviser> = if cli.solo {
        log::info!("🧑‍🏫 Solo critic on {}", settings.model);
        Box::new(SoloCritic::new(Arc::clone(&gateway), settings.model.clone()))
    } else {
        let personas = load_personas(cli.personas.as_deref(), &settings.model)?;
        let arbiter = Arbiter::new(settings.model.clone());
        let council = Council::new(Arc::clone(&gateway), personas, arbiter)?
            .with_task_timeout(call_budget);
        for persona in council.personas() {
            log::info!("🎭 Council member: {} ({})", persona.name, persona.model);
        }
        Box::new(council)
    };

    let mut session = RefinementSession::new(Arc::clone(&gateway), reviser, &settings);
    if cli.translate {
        let translator = Translator::new(Arc::clone(&gateway), settings.model.clone());
        session = session.with_translation(translator);
    }

    println!("🤖 MAGI PROMPT REFINER");
    println!("📝 Initial Prompt: \"{}\"\n", prompt);

    let outcome = session
        .refine(&prompt, cli.rounds, cli.user_prompt.as_deref())
        .await?;

    println!(
        "\n✨ FINAL PROMPT ({} round(s), {:?})",
        outcome.rounds_completed, outcome.stop_reason
    );
    println!("--------------------------------------------------");
    println!("{}", outcome.final_prompt);

    Ok(())
}
