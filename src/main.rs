use clap::{CommandFactory, Parser};
use std::io::{self, Write};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use turnstream::cli::{apply_overrides, Args};
use turnstream::ui::Theme;
use turnstream::{ChatConfig, ChatController, ChatError, TurnId, TurnOutcome, TurnStatus, TurnUpdate};

// ---------------------------------------------------------------------------
// Terminal rendering
// ---------------------------------------------------------------------------

/// Prints each mirrored update as the text it adds to the screen.
struct Renderer {
    label: &'static str,
    current: Option<TurnId>,
    printed: usize,
    thinking: bool,
}

impl Renderer {
    fn new(label: &'static str) -> Self {
        Renderer { label, current: None, printed: 0, thinking: false }
    }

    fn show_thinking(&mut self, theme: Theme) {
        print!("{}", theme.dim(&format!("{} is thinking...", self.label)));
        let _ = io::stdout().flush();
        self.thinking = true;
    }

    fn clear_thinking(&mut self) {
        if self.thinking {
            print!("\r\x1B[2K");
            self.thinking = false;
        }
    }

    fn draw(&mut self, update: &TurnUpdate, theme: Theme) {
        if self.current != Some(update.id) {
            self.clear_thinking();
            self.current = Some(update.id);
            self.printed = 0;
            println!("{}", theme.label(self.label));
        }

        let tail = update.content.get(self.printed..).unwrap_or("");
        let had_partial = self.printed > 0;
        match update.status {
            TurnStatus::Pending => print!("{}", theme.assistant(tail)),
            TurnStatus::Complete => println!("{}\n", theme.assistant(tail)),
            TurnStatus::Failed => {
                println!("{}", theme.error(tail));
                if had_partial {
                    println!("{}", theme.dim("(reply interrupted)"));
                }
                println!();
            }
        }
        self.printed = update.content.len();
        let _ = io::stdout().flush();
    }
}

/// Submit one prompt, drawing updates as they arrive.
async fn run_exchange(
    controller: &ChatController,
    updates: &mut mpsc::UnboundedReceiver<TurnUpdate>,
    renderer: &mut Renderer,
    prompt: &str,
) -> Result<TurnOutcome, ChatError> {
    let theme = controller.ui.theme;
    renderer.show_thinking(theme);

    let submit = controller.submit(prompt);
    tokio::pin!(submit);
    let outcome = loop {
        tokio::select! {
            biased;
            Some(update) = updates.recv() => renderer.draw(&update, theme),
            outcome = &mut submit => break outcome,
        }
    };
    while let Ok(update) = updates.try_recv() {
        renderer.draw(&update, theme);
    }
    renderer.clear_thinking();
    outcome
}

// ---------------------------------------------------------------------------
// Interactive session
// ---------------------------------------------------------------------------

async fn repl(
    controller: &mut ChatController,
    updates: &mut mpsc::UnboundedReceiver<TurnUpdate>,
    renderer: &mut Renderer,
) -> Result<(), Box<dyn std::error::Error>> {
    let cfg = controller.config();
    println!(
        "{} {} {}",
        controller.ui.theme.label(cfg.provider.display_name()),
        controller.ui.theme.dim(&cfg.resolved_model()),
        controller.ui.theme.dim("(/clear /theme /speak /quit)")
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{} ", controller.ui.theme.label("you >"));
        io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let theme = controller.ui.theme;
        match line.trim() {
            "" => continue,
            "/quit" | "/exit" => break,
            "/clear" => {
                controller.clear();
                println!("{}", theme.dim("conversation cleared"));
            }
            "/theme" => {
                let theme = controller.ui.toggle_theme();
                println!("{}", theme.dim(&format!("theme: {theme}")));
            }
            "/speak" => match controller.last_assistant_id() {
                None => println!("{}", theme.dim("nothing to read yet")),
                Some(id) if !controller.ui.toggle_speech(id) => {
                    println!("{}", theme.dim("voice playback is disabled (start with --voice)"))
                }
                Some(id) if controller.ui.speaking() == Some(id) => {
                    println!("{}", theme.dim(&format!("reading reply {} aloud", id.short())))
                }
                Some(_) => println!("{}", theme.dim("playback stopped")),
            },
            prompt => {
                if let Err(e) = run_exchange(controller, updates, renderer, prompt).await {
                    eprintln!("{}", theme.error(&e.to_string()));
                }
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if let Some(shell) = args.completions {
        clap_complete::generate(shell, &mut Args::command(), "turnstream", &mut io::stdout());
        return Ok(());
    }

    // stderr keeps log lines out of the streamed reply
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let config = apply_overrides(&args, ChatConfig::load(args.config.as_deref())?);
    config.validate()?;

    let mut controller = ChatController::from_config(config)?;
    let (tx, mut updates) = mpsc::unbounded_channel();
    controller.updates_tx = Some(tx);
    let mut renderer = Renderer::new(controller.config().provider.display_name());

    if let Some(prompt) = &args.prompt {
        let outcome = run_exchange(&controller, &mut updates, &mut renderer, prompt).await?;
        return match outcome {
            TurnOutcome::Failed(e) => Err(e.into()),
            _ => Ok(()),
        };
    }

    repl(&mut controller, &mut updates, &mut renderer).await
}
