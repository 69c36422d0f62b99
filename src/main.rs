use std::fs::File;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use survival_narrator::config::settings::ModelRole;
use survival_narrator::config::settings_io::{load_settings, save_settings, settings_path};
use survival_narrator::engine::engine::Engine;
use survival_narrator::engine::llm_client::{CustomEndpoint, NarrativeSource};
use survival_narrator::engine::protocol::{EngineCommand, EngineResponse};
use survival_narrator::engine::sse_decoder::WireDialect;
use survival_narrator::engine::stream_aggregator::{NarrativeStream, DEFAULT_READ_CHUNK};
use survival_narrator::engine::turn::{run_judgement, run_narration};
use survival_narrator::model::ending::EndingVerdict;
use survival_narrator::model::survivor_state::SurvivorState;

#[derive(Parser)]
#[command(name = "survival_narrator")]
#[command(about = "Streaming narrator for a text survival game")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Feed a recorded SSE capture through the pipeline
    Replay {
        /// File holding the raw response body
        capture: PathBuf,
        /// Parse as a judged-action turn
        #[arg(long)]
        judge: bool,
        /// Bytes per read, to exercise chunk boundaries
        #[arg(long, default_value_t = DEFAULT_READ_CHUNK)]
        chunk_size: usize,
        /// Capture uses the OpenAI-compatible wire format
        #[arg(long)]
        openai: bool,
    },
    /// Play interactively against the configured backend or model
    Play,
    /// Send a tiny request to the configured model endpoint
    TestConnection,
    /// Print where settings are read from
    ConfigPath {
        /// Write the current settings there
        #[arg(long)]
        write: bool,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("survival_narrator=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Replay {
            capture,
            judge,
            chunk_size,
            openai,
        } => replay(capture, judge, chunk_size, openai),
        Commands::Play => play(),
        Commands::TestConnection => test_connection(),
        Commands::ConfigPath { write } => {
            if write {
                let path = save_settings(&load_settings())?;
                println!("Wrote {}", path.display());
            } else {
                println!("{}", settings_path().display());
            }
            Ok(())
        }
    }
}

fn replay(capture: PathBuf, judge: bool, chunk_size: usize, openai: bool) -> anyhow::Result<()> {
    let file = File::open(&capture)
        .with_context(|| format!("opening capture {}", capture.display()))?;
    let dialect = if openai {
        WireDialect::OpenAiCompatible
    } else {
        WireDialect::Backend
    };
    let stream = NarrativeStream::new(Some(file), dialect)?.with_read_chunk(chunk_size);

    let mut stdout = io::stdout();
    let show = |text: &str| {
        print!("{}", text);
        let _ = io::stdout().flush();
    };

    let json = if judge {
        serde_json::to_string_pretty(&run_judgement(stream, show)?)?
    } else {
        serde_json::to_string_pretty(&run_narration(stream, show)?)?
    };

    writeln!(stdout, "\n\n{}", json)?;
    Ok(())
}

fn test_connection() -> anyhow::Result<()> {
    let settings = load_settings();
    if !settings.is_custom_mode() {
        bail!(
            "no API key configured; set SURVIVAL_API_KEY or edit {}",
            settings_path().display()
        );
    }

    let endpoint = CustomEndpoint::new(
        settings.model_config(ModelRole::Narrator),
        settings.request_timeout(),
    )?;
    println!("{}", endpoint.test_connection()?);
    Ok(())
}

/// How one engine command ended.
enum TurnEnd {
    Crisis(Vec<String>),
    State(SurvivorState),
    Ending(EndingVerdict),
    Failed(String),
}

fn play() -> anyhow::Result<()> {
    let settings = load_settings();
    let source = NarrativeSource::from_settings(&settings)?;

    let (cmd_tx, cmd_rx) = mpsc::channel();
    let (resp_tx, resp_rx) = mpsc::channel();
    let worker = thread::spawn(move || Engine::new(cmd_rx, resp_tx, source).run());

    let result = play_loop(&cmd_tx, &resp_rx);

    let _ = cmd_tx.send(EngineCommand::Shutdown);
    if worker.join().is_err() {
        bail!("engine thread panicked");
    }
    result
}

fn play_loop(cmd_tx: &Sender<EngineCommand>, resp_rx: &Receiver<EngineResponse>) -> anyhow::Result<()> {
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        cmd_tx.send(EngineCommand::Narrate)?;
        let mut end = wait_for_turn(resp_rx)?;

        while let TurnEnd::Crisis(choices) = &end {
            let choices = choices.clone();
            for choice in &choices {
                println!("  {}", choice);
            }
            print!("Your choice (A-D or your own action, q to quit): ");
            io::stdout().flush()?;
            let Some(line) = lines.next().transpose()? else {
                return Ok(());
            };
            if line.trim().eq_ignore_ascii_case("q") {
                return Ok(());
            }
            cmd_tx.send(EngineCommand::Judge { choice: line })?;
            end = match wait_for_turn(resp_rx)? {
                // A failed judgement keeps the crisis open.
                TurnEnd::Failed(message) => {
                    eprintln!("\n{}", message);
                    TurnEnd::Crisis(choices)
                }
                other => other,
            };
        }

        match end {
            TurnEnd::State(state) if state.is_game_over() => {
                println!("\nDay {}: you did not make it.", state.day);
                cmd_tx.send(EngineCommand::Ending)?;
                if let TurnEnd::Ending(verdict) = wait_for_turn(resp_rx)? {
                    print_ending(&verdict);
                }
                return Ok(());
            }
            TurnEnd::State(state) => {
                println!(
                    "\n[day {}] HP {} SAN {} Hunger {}",
                    state.day, state.stats.hp, state.stats.san, state.stats.hunger
                );
            }
            TurnEnd::Failed(message) => eprintln!("\n{}", message),
            TurnEnd::Crisis(_) | TurnEnd::Ending(_) => {}
        }

        print!("Enter to continue, q to quit: ");
        io::stdout().flush()?;
        match lines.next().transpose()? {
            Some(line) if !line.trim().eq_ignore_ascii_case("q") => continue,
            _ => return Ok(()),
        }
    }
}

fn wait_for_turn(resp_rx: &Receiver<EngineResponse>) -> anyhow::Result<TurnEnd> {
    loop {
        let resp = resp_rx.recv().context("engine stopped unexpectedly")?;
        match resp {
            EngineResponse::TextDelta(text) => {
                print!("{}", text);
                io::stdout().flush()?;
            }
            EngineResponse::NarrationReady(result) if result.has_crisis => {
                return Ok(TurnEnd::Crisis(result.choices));
            }
            EngineResponse::NarrationReady(_) | EngineResponse::JudgementReady(_) => {}
            EngineResponse::StateApplied { report, state } => {
                for reason in report.rejections() {
                    eprintln!("(ignored: {})", reason);
                }
                return Ok(TurnEnd::State(state));
            }
            EngineResponse::EndingReady(verdict) => return Ok(TurnEnd::Ending(verdict)),
            EngineResponse::Failed(message) => return Ok(TurnEnd::Failed(message)),
        }
    }
}

fn print_ending(verdict: &EndingVerdict) {
    if let Some(cause) = &verdict.cause_of_death {
        println!("Cause of death: {}", cause);
    }
    println!("{}", verdict.epithet);
    println!("{}", verdict.comment);
    println!("Radar: {:?}", verdict.radar_chart);
}
