//! Parley CLI entry point

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use parley::agent::{Agent, AgentExt, ChatAgent, ConsoleInput, MiddlewareAgent, ProviderRegistry, UserProxyAgent};
use parley::chat::{ChatOrchestrator, TerminationReason, Termination};
use parley::config::{self, Config};
use parley::message::Envelope;
use parley::middleware::{ChatConnector, FunctionCallMiddleware, PrintMessageMiddleware};
use parley::tools::{LightPlugin, ToolRunner};
use parley::{ui, Error};

#[derive(Parser)]
#[command(name = "parley")]
#[command(about = "Chat with an assistant that controls a light")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the configuration file
    Init,

    /// Show configuration status
    Status,

    /// Send a single message to the assistant
    Send {
        /// Message to send
        #[arg(short, long)]
        message: String,
    },

    /// Start a chat between the assistant and you
    Chat {
        /// First message of the chat, sent by the assistant
        #[arg(long, default_value = "how can I help you today")]
        opening: String,

        /// Turn limit (defaults to the configured value)
        #[arg(long)]
        max_turns: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            config::init()?;
        }

        Commands::Status => {
            let config = config::load_or_default()?;
            println!("Config: {:?}", config::config_path());
            println!("Provider: {}", config.provider);
            println!("Model: {}", config.model);
            println!("API key: {}", if config.api_key().is_some() { "✓" } else { "not set" });
            println!("Max turns: {}", config.max_turns);
            println!("Human input: {:?}", config.human_input_mode);
        }

        Commands::Send { message } => {
            let config = config::load_or_default()?;
            let assistant = build_assistant(&config)?;
            let inbound = Envelope::text(message, &config.user_name);
            if let Err(e) = assistant.send(inbound).await {
                ui::print_error(&e.to_string());
                return Err(e.into());
            }
        }

        Commands::Chat { opening, max_turns } => {
            let config = config::load_or_default()?;
            run_chat(&config, &opening, max_turns.unwrap_or(config.max_turns)).await?;
        }
    }

    Ok(())
}

/// Assistant wrapped in function calling, the chat connector and console printing
fn build_assistant(config: &Config) -> parley::Result<MiddlewareAgent> {
    let backend = ProviderRegistry::create(config)?;

    let mut runner = ToolRunner::new();
    LightPlugin::new().register(&mut runner);

    Ok(ChatAgent::new(&config.agent_name, backend)
        .with_system_message(&config.system_message)
        .register_middleware(FunctionCallMiddleware::new(Arc::new(runner)))
        .register_middleware(ChatConnector::new())
        .register_middleware(PrintMessageMiddleware::new().with_spinner(true)))
}

async fn run_chat(config: &Config, opening: &str, max_turns: usize) -> Result<()> {
    let assistant: Arc<dyn Agent> = Arc::new(build_assistant(config)?);
    let user: Arc<dyn Agent> = Arc::new(
        UserProxyAgent::new(&config.user_name)
            .with_mode(config.human_input_mode)
            .with_termination_keyword(&config.termination_keyword)
            .with_input(Arc::new(ConsoleInput)),
    );

    let opening = ChatOrchestrator::opening_for(user.as_ref(), opening, assistant.name());
    ui::print_envelope(&opening);

    let mut chat = ChatOrchestrator::new(assistant, user)
        .with_max_turns(max_turns)
        .with_termination(Termination::keyword(&config.termination_keyword));

    let cancel = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    match chat.run_until(opening, cancel).await {
        Ok(outcome) => {
            let reason = match outcome.reason {
                TerminationReason::StopSignal => "stop signal",
                TerminationReason::TurnLimit => "turn limit",
            };
            ui::print_success(&format!("Chat ended by {} after {} turns", reason, outcome.turns));
            Ok(())
        }
        Err(Error::Cancelled) => {
            ui::print_warning(&format!("Chat cancelled after {} turns", chat.turns()));
            Ok(())
        }
        Err(e) => {
            ui::print_error(&e.to_string());
            Err(e.into())
        }
    }
}
