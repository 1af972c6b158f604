use crate::config::ChatConfig;
use crate::providers::Provider;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "turnstream")]
#[command(version)]
#[command(about = "Chat with Gemini or Groq from the terminal, with streamed replies")]
pub struct Args {
    /// Prompt to send; omit to start an interactive session
    pub prompt: Option<String>,

    /// LLM provider: gemini or groq
    #[arg(long, value_enum)]
    pub provider: Option<Provider>,

    /// Model name (e.g. gemini-1.5-flash, llama-3.1-8b-instant)
    #[arg(long)]
    pub model: Option<String>,

    /// TOML config file
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Wait for the whole reply instead of streaming it
    #[arg(long)]
    pub no_stream: bool,

    /// System prompt sent ahead of the conversation
    #[arg(long)]
    pub system: Option<String>,

    /// Use the light color palette
    #[arg(long)]
    pub light: bool,

    /// Enable the /speak command
    #[arg(long)]
    pub voice: bool,

    /// Print shell completions and exit
    #[arg(long, value_enum, value_name = "SHELL")]
    pub completions: Option<clap_complete::Shell>,
}

/// Select the appropriate default model for the given provider when the
/// configured model is the other provider's default.
pub fn resolve_model(provider: &Provider, model: &str) -> String {
    match provider {
        Provider::Groq if model == Provider::Gemini.default_model() => {
            Provider::Groq.default_model().to_string()
        }
        Provider::Gemini if model == Provider::Groq.default_model() => {
            Provider::Gemini.default_model().to_string()
        }
        _ => model.to_string(),
    }
}

/// Layer command-line flags over a loaded config.
pub fn apply_overrides(args: &Args, mut config: ChatConfig) -> ChatConfig {
    if let Some(provider) = args.provider {
        config.provider = provider;
        config.model = config.model.map(|m| resolve_model(&provider, &m));
    }
    if let Some(model) = &args.model {
        config.model = Some(model.clone());
    }
    if args.no_stream {
        config.streaming = false;
    }
    if let Some(system) = &args.system {
        config.system_prompt = Some(system.clone());
    }
    if args.light {
        config.theme = crate::ui::Theme::Light;
    }
    if args.voice {
        config.voice_enabled = true;
    }
    config
}
