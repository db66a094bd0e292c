use clap::{Parser, Subcommand};
use dotenv::dotenv;
use orion::ai::client::GeminiClient;
use orion::ai::service::{PromptService, ServiceSettings};
use orion::core::classifier::ErrorKind;
use orion::core::model::{Language, PerformanceMetrics, PromptAnalysis};
use orion::core::placeholders::VariableMap;
use orion::session::display_error;
use orion::storage::FileStore;
use orion::{Config, CredentialProvider, OrionError, Session};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "orion", version, about = "Critique, rewrite and benchmark LLM prompts")]
struct Cli {
    /// Language for critiques and analysis (en|es). Defaults to ORION_LANG.
    #[arg(long, global = true)]
    lang: Option<Language>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args)]
struct PromptInput {
    /// Prompt text. Markers: [NAME], {{NAME}} or <NAME>.
    text: Option<String>,

    /// Read the prompt from a file instead.
    #[arg(long, conflicts_with = "text")]
    file: Option<PathBuf>,

    /// Variable values as NAME=VALUE.
    #[arg(long = "set", value_name = "NAME=VALUE")]
    set: Vec<String>,
}

impl PromptInput {
    fn read(&self) -> Result<String, OrionError> {
        match (&self.text, &self.file) {
            (Some(text), _) => Ok(text.clone()),
            (None, Some(path)) => Ok(std::fs::read_to_string(path)?),
            (None, None) => Err(OrionError::EmptyPrompt),
        }
    }

    fn pairs(&self) -> Result<Vec<(String, String)>, OrionError> {
        self.set
            .iter()
            .map(|s| {
                s.split_once('=')
                    .map(|(k, v)| (k.trim().to_string(), v.to_string()))
                    .ok_or_else(|| OrionError::Config(format!("Invalid --set '{s}', expected NAME=VALUE")))
            })
            .collect()
    }
}

#[derive(Subcommand)]
enum Command {
    /// List the variables detected in a prompt.
    Vars(PromptInput),
    /// Substitute variable values and print the result.
    Fill(PromptInput),
    /// Critique and rewrite a prompt, recording it in history.
    Optimize(PromptInput),
    /// Run a prompt (variables filled) and judge the response.
    Simulate(PromptInput),
    /// Compare two prompts side by side.
    Benchmark {
        original: String,
        optimized: String,
    },
    /// Inspect or edit the optimization history.
    History {
        #[command(subcommand)]
        action: Option<HistoryAction>,
    },
}

#[derive(Subcommand)]
enum HistoryAction {
    List,
    Show { id: String },
    Remove { id: String },
    Clear,
}

/// Credentials come from the environment or `.env`.
struct EnvCredentials;

impl CredentialProvider for EnvCredentials {
    fn has_key(&self) -> bool {
        Config::from_env().has_api_key()
    }

    async fn open_key_picker(&self) -> Result<(), OrionError> {
        dotenv().ok();
        Config::from_env().api_key().map(|_| ())
    }
}

type CliSession = Session<GeminiClient, FileStore, EnvCredentials>;

fn build_session(config: &Config, language: Language) -> CliSession {
    let service = PromptService::new(GeminiClient::new(config), ServiceSettings::from(config));
    Session::new(service, FileStore::new(config.data_dir.clone()), EnvCredentials, language)
}

fn apply_vars(session: &CliSession, input: &PromptInput, text: &str) -> Result<(), OrionError> {
    session.update_text(text);
    for (name, value) in input.pairs()? {
        if !session.set_variable(&name, &value) {
            log::warn!("Variable '{name}' does not appear in the prompt");
        }
    }
    Ok(())
}

fn warn_unresolved(session: &CliSession) {
    let vars = session.variables();
    let unresolved = vars.unresolved();
    if !unresolved.is_empty() {
        log::warn!("No value for {}, sending [MISSING_*] markers", unresolved.join(", "));
    }
}

fn print_analysis(analysis: &PromptAnalysis) {
    println!("SCORE: {}/100\n", analysis.score);
    println!("CRITIQUE:\n{}\n", analysis.critique);
    println!("OPTIMIZED PROMPT:\n{}\n", analysis.optimized_prompt);
    if !analysis.techniques_used.is_empty() {
        println!("TECHNIQUES: {}", analysis.techniques_used.join(", "));
    }
    for issue in &analysis.grammar_issues {
        println!("  [{}] '{}' -> '{}': {}", issue.issue_type, issue.original, issue.correction, issue.explanation);
    }
}

fn print_metrics(label: &str, metrics: &PerformanceMetrics) {
    println!("== {label}");
    println!("quality: {}/100  length: {}  tone: {}", metrics.quality_score, metrics.response_length, metrics.tone);
    if metrics.bias_detected {
        println!("bias: DETECTED - {}", metrics.bias_analysis);
    } else {
        println!("bias: none");
    }
    println!("{}\n", metrics.generated_response);
}

async fn run(cli: Cli, config: Config) -> Result<(), OrionError> {
    let language = cli.lang.unwrap_or(config.language);

    match cli.command {
        Command::Vars(input) => {
            let text = input.read()?;
            for name in VariableMap::from_text(&text).names() {
                println!("{name}");
            }
        }
        Command::Fill(input) => {
            let text = input.read()?;
            let mut vars = VariableMap::from_text(&text);
            for (name, value) in input.pairs()? {
                vars.set(&name, value);
            }
            println!("{}", vars.apply(&text));
        }
        Command::Optimize(input) => {
            let text = input.read()?;
            let session = build_session(&config, language);
            apply_vars(&session, &input, &text)?;
            let analysis = session.optimize(&text).await?;
            print_analysis(&analysis);
        }
        Command::Simulate(input) => {
            let text = input.read()?;
            let session = build_session(&config, language);
            apply_vars(&session, &input, &text)?;
            warn_unresolved(&session);
            let metrics = session.simulate(&text).await?;
            print_metrics("SIMULATION", &metrics);
        }
        Command::Benchmark { original, optimized } => {
            let session = build_session(&config, language);
            let report = session.benchmark(&original, &optimized).await?;
            print_metrics("ORIGINAL", &report.original);
            print_metrics("OPTIMIZED", &report.optimized);
            println!("quality delta: {:+}", report.quality_delta());
        }
        Command::History { action } => {
            let session = build_session(&config, language);
            match action.unwrap_or(HistoryAction::List) {
                HistoryAction::List => {
                    for item in session.history() {
                        println!("{}  {:>3}  {}  ->  {}", item.id, item.score, item.original_preview, item.optimized_preview);
                    }
                }
                HistoryAction::Show { id } => match session.restore(&id) {
                    Some(analysis) => print_analysis(&analysis),
                    None => println!("No history entry '{id}'"),
                },
                HistoryAction::Remove { id } => {
                    if !session.remove_history(&id)? {
                        println!("No history entry '{id}'");
                    }
                }
                HistoryAction::Clear => session.clear_history()?,
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let shown = display_error(&e);
            eprintln!("{}: {}", shown.title(), shown.message);
            if shown.requires_reauth() || shown.kind == ErrorKind::ConfigurationError {
                eprintln!("Set GEMINI_API_KEY in your environment or .env and try again.");
            }
            ExitCode::FAILURE
        }
    }
}
