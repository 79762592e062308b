use std::sync::Arc;
use anyhow::{Result, bail};
use clap::{Parser, Subcommand};

mod app;
mod config;
mod controller;
mod copy;
mod gemini;
mod handler;
mod logging;
mod markup;
mod proxy;
mod state;
mod tui;
mod ui;

use app::App;
use config::Config;
use controller::{SubmitOutcome, TurnController};
use copy::SystemClipboard;
use gemini::GeminiClient;

#[derive(Parser)]
#[command(name = "dsa-tutor")]
#[command(about = "Ask a data structures and algorithms tutor, in the terminal")]
struct Cli {
    /// Generation proxy URL (overrides config and DSA_TUTOR_PROXY_URL)
    #[arg(long, global = true)]
    proxy_url: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive chat (default)
    Chat,
    /// Run the proxy that holds the Gemini API key
    Proxy {
        /// Address to listen on
        #[arg(short, long)]
        listen: Option<String>,
        /// Upstream base URL
        #[arg(long)]
        upstream: Option<String>,
        /// Gemini model to call
        #[arg(short, long)]
        model: Option<String>,
    },
    /// Ask a single question and print the reply
    Ask {
        /// Your question
        question: String,
        /// Print the reply as HTML with copy buttons
        #[arg(long)]
        html: bool,
    },
    /// Write a default config file
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => {
            let config = load_config(cli.proxy_url)?;
            let log_path = logging::init_file()?;
            tracing::info!(log = %log_path.display(), proxy = %config.proxy_url, "starting chat");
            run_chat(&config).await
        }
        Commands::Proxy { listen, upstream, model } => {
            let mut config = load_config(cli.proxy_url)?;
            logging::init_stderr()?;
            if let Some(listen) = listen {
                config.listen_addr = listen;
            }
            if let Some(upstream) = upstream {
                config.upstream_url = upstream;
            }
            if let Some(model) = model {
                config.model = model;
            }
            proxy::serve(&config).await
        }
        Commands::Ask { question, html } => {
            let config = load_config(cli.proxy_url)?;
            logging::init_stderr()?;
            ask_once(&config, &question, html).await
        }
        // Does not read the existing file, so it can replace a broken one
        Commands::Init { force } => write_default_config(force),
    }
}

/// Config file, then environment, then the command line
fn load_config(proxy_url: Option<String>) -> Result<Config> {
    let mut config = Config::load()?;
    config.apply_env();
    if let Some(url) = proxy_url {
        config.proxy_url = url;
    }
    Ok(config)
}

async fn run_chat(config: &Config) -> Result<()> {
    let client = Arc::new(GeminiClient::new(&config.proxy_url));
    tracing::debug!(endpoint = client.endpoint(), "generation client ready");
    let mut app = App::new(config, client, Box::new(SystemClipboard::new()));

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = tui::EventHandler::new();

    let result = async {
        while !app.should_quit {
            terminal.draw(|frame| ui::render(&mut app, frame))?;

            match events.next().await {
                Some(event) => handler::handle_event(&mut app, event).await?,
                None => break,
            }
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;

    tui::restore()?;
    result
}

fn write_default_config(force: bool) -> Result<()> {
    let path = Config::get_config_path()?;
    if path.exists() && !force {
        println!("Config already exists at {}", path.display());
        return Ok(());
    }

    Config::new().save()?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}

async fn ask_once(config: &Config, question: &str, html: bool) -> Result<()> {
    let client = GeminiClient::new(&config.proxy_url);
    let mut controller = TurnController::new(config.discard_stale_replies);

    let outcome = controller.submit(&client, question).await;
    if outcome == SubmitOutcome::Rejected {
        bail!("Question is empty");
    }

    if let Some(turn) = controller.conversation().last() {
        if html {
            println!("{}", turn.rendered.to_html());
        } else {
            println!("{}", turn.rendered.plain_text().trim_end());
        }
    }

    match outcome {
        SubmitOutcome::Failed(reason) => bail!("No reply from {}: {}", client.endpoint(), reason),
        _ => Ok(()),
    }
}
