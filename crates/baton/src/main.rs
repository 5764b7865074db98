//! Replays a scripted session in the terminal.

#[macro_use]
extern crate tracing;

use std::io::Write as _;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use baton::core::surface::{Anchor, Surface, SurfaceError};
use baton::{Outcome, Script, SessionBuilder};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use tokio::io::{self, AsyncBufReadExt};

const BAR_CHAR: &str = "▎";

#[derive(Parser)]
#[command(name = "baton")]
#[command(about = "Replay a scripted delegation between chat agents")]
#[command(version)]
struct Args {
    /// The replay script (JSON).
    script: PathBuf,

    /// The question to ask, instead of the one in the script.
    #[arg(short, long)]
    question: Option<String>,

    /// Turn budget of every task.
    #[arg(long)]
    max_turns: Option<usize>,

    /// Never ask the user anything.
    #[arg(long)]
    non_interactive: bool,
}

/// Shows the session in the terminal, with a spinner while agents think.
struct TerminalSurface {
    style: ProgressStyle,
    spinner: Mutex<Option<ProgressBar>>,
    steps: AtomicUsize,
}

impl TerminalSurface {
    fn new() -> Self {
        let style = ProgressStyle::with_template("{spinner} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
        Self {
            style,
            spinner: Mutex::new(None),
            steps: AtomicUsize::new(0),
        }
    }

    fn start_spinner(&self) {
        self.spinner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_or_insert_with(|| {
                let spinner = ProgressBar::new_spinner();
                spinner.set_style(self.style.clone());
                spinner.set_message("🤔 Thinking...");
                spinner.enable_steady_tick(Duration::from_millis(100));
                spinner
            });
    }

    // Finish the spinner before printing anything else.
    fn stop_spinner(&self) {
        let spinner = self
            .spinner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(spinner) = spinner {
            spinner.finish_and_clear();
        }
    }
}

#[async_trait]
impl Surface for TerminalSurface {
    async fn ask_user(
        &self,
        prompt: &str,
        anchor: Option<&Anchor>,
    ) -> Result<String, SurfaceError> {
        self.stop_spinner();
        let bar = BAR_CHAR.bright_yellow();
        if let Some(anchor) = anchor {
            println!("{bar}{}", format!("(re: {anchor})").dimmed());
        }
        println!("{bar}❓ {}", prompt.bright_white());
        print!("> ");
        std::io::stdout().flush().ok();

        let Some(line) = read_line().await else {
            return Err(SurfaceError::Closed);
        };
        println!();
        self.start_spinner();
        Ok(line.trim().to_owned())
    }

    fn show_response(
        &self,
        agent: &str,
        content: &str,
        parent: Option<&Anchor>,
    ) -> Option<Anchor> {
        self.stop_spinner();
        let step = self.steps.fetch_add(1, Ordering::Relaxed) + 1;
        let bar = BAR_CHAR.bright_cyan();
        if let Some(parent) = parent {
            println!("{bar}{}", format!("(re: {parent})").dimmed());
        }
        println!(
            "{bar}{}🤖 {} {}",
            indent(parent),
            agent.bold(),
            content.trim().bright_white()
        );
        self.start_spinner();
        Some(Anchor::new(format!("{agent}-{step}")))
    }

    fn show_tool_result(
        &self,
        agent: &str,
        tool: &str,
        result: &str,
        parent: Option<&Anchor>,
    ) {
        self.stop_spinner();
        let bar = BAR_CHAR.bright_magenta();
        let indent = indent(parent);
        println!("{bar}{indent}🔧 {agent} used {tool}");
        for line in result.lines() {
            println!("{bar}{indent}   {}", line.dimmed());
        }
        self.start_spinner();
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let script = match Script::load(&args.script) {
        Ok(script) => script,
        Err(err) => {
            eprintln!("{}: {err}", args.script.display());
            return ExitCode::FAILURE;
        }
    };
    let Some(question) = args.question.or_else(|| script.question.clone()) else {
        eprintln!("no question given, and the script has none");
        return ExitCode::FAILURE;
    };

    let surface = Arc::new(TerminalSurface::new());
    let mut builder = SessionBuilder::from_script(script).with_surface(surface.clone());
    if let Some(max_turns) = args.max_turns {
        builder = builder.with_max_turns(max_turns);
    }
    if args.non_interactive {
        builder = builder.non_interactive();
    }
    let mut session = match builder.build() {
        Ok(session) => session,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    println!("{}👤 {}\n", BAR_CHAR.bright_green(), question.bright_white());
    surface.start_spinner();
    let outcome = session.run(&question).await;
    surface.stop_spinner();

    match outcome {
        Ok(Outcome::Answer(answer)) => {
            println!("\n{}✅ {}", BAR_CHAR.bright_green(), answer.bright_white());
            ExitCode::SUCCESS
        }
        Ok(Outcome::Rounds(rounds)) => {
            for (index, round) in rounds.iter().enumerate() {
                let bar = BAR_CHAR.bright_green();
                println!("\n{bar}Round {}: {}", index + 1, round.question.bold());
                for response in &round.responses {
                    println!("{bar}  {} {}", response.agent.bold(), response.content);
                }
            }
            ExitCode::SUCCESS
        }
        Err(err) if err.is_user_abort() => {
            info!("session stopped: {err}");
            println!("\n{}👋 {err}", BAR_CHAR.bright_yellow());
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("session failed: {err}");
            eprintln!("\n{}❌ {err}", BAR_CHAR.bright_red());
            ExitCode::FAILURE
        }
    }
}

// Steps of delegated tasks are shifted right under their parent's.
fn indent(parent: Option<&Anchor>) -> &'static str {
    if parent.is_some() { "  " } else { "" }
}

async fn read_line() -> Option<String> {
    let mut stdin = io::BufReader::new(io::stdin());
    let mut line = String::new();

    match stdin.read_line(&mut line).await {
        Ok(count) => {
            if count == 0 {
                return None;
            }
            Some(line)
        }
        Err(err) => {
            error!("error reading input: {}", err);
            None
        }
    }
}
