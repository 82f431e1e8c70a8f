//! execbox CLI
//!
//! Runs source files through the sandbox interactively and inspects the
//! effective configuration.

use anyhow::Context;
use clap::{Parser, Subcommand};
use console::style;
use execbox::config::{load_config, save_config, validate_config, Config, ExecutionEnv};
use execbox::sandbox::{
    ContainerRuntime, Engine, ExecutionEvent, ExecutionRequest, Language,
};
use execbox::VERSION;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(
    name = "execbox",
    version = VERSION,
    about = "execbox - Interactive sandboxed code execution",
    long_about = None
)]
struct Cli {
    /// Show debug logs
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a source file in the sandbox, answering prompts from the terminal
    Run {
        /// Source file
        file: PathBuf,
        /// Programming language (inferred from the file extension if omitted)
        #[arg(long, short)]
        language: Option<String>,
        /// Initial input line
        #[arg(long)]
        stdin: Option<String>,
        /// Run on the host without isolation
        #[arg(long)]
        host: bool,
    },

    /// List supported languages
    Languages,

    /// Validate the configuration and probe the runtime
    Check,

    /// Print the effective configuration
    Config {
        /// Also write it to this file (.json or .toml)
        #[arg(long)]
        save: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let mut config = load_config()?;

    let mut log = config.log.clone();
    log.level = if cli.verbose { "info,execbox=debug" } else { "warn" }.to_string();
    execbox::logging::init(&log);

    match cli.command {
        Commands::Run {
            file,
            language,
            stdin,
            host,
        } => {
            if host {
                config.sandbox.execution_env = ExecutionEnv::Os;
            }
            run_file(&config, &file, language.as_deref(), stdin).await
        }
        Commands::Languages => {
            list_languages();
            Ok(ExitCode::SUCCESS)
        }
        Commands::Check => check(&config).await,
        Commands::Config { save } => show_config(&config, save.as_deref()),
    }
}

// ============================================================================
// Run
// ============================================================================

/// Language for a source file extension
fn language_for(path: &Path) -> Option<Language> {
    match path.extension()?.to_str()? {
        "py" => Some(Language::Python),
        "cpp" | "cc" | "cxx" => Some(Language::Cpp),
        "js" | "mjs" => Some(Language::JavaScript),
        "java" => Some(Language::Java),
        _ => None,
    }
}

/// Forward terminal lines on a plain thread; a blocked stdin read must not
/// keep the runtime from shutting down.
fn spawn_terminal_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(8);
    std::thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

async fn run_file(
    config: &Config,
    file: &Path,
    language: Option<&str>,
    stdin: Option<String>,
) -> anyhow::Result<ExitCode> {
    let language = match language {
        Some(name) => name.parse::<Language>()?,
        None => language_for(file).with_context(|| {
            format!(
                "cannot infer the language of {}; pass --language",
                file.display()
            )
        })?,
    };
    let code = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;

    let mut request = ExecutionRequest::new(code, language);
    request.stdin = stdin;

    let engine = Engine::from_config(&config.sandbox).await?;
    let mut execution = engine.start(request).await?;
    let handle = execution.handle.clone();
    let mut terminal = spawn_terminal_reader();
    let started = Instant::now();

    eprintln!(
        "{} {} via {}",
        style("▶").cyan(),
        style(language).bold(),
        style(engine.runtime_name()).dim()
    );

    let mut status = ExitCode::FAILURE;
    loop {
        tokio::select! {
            event = execution.events.recv() => {
                let Some(event) = event else { break };
                match event {
                    ExecutionEvent::ProcessStarted { .. } => {}
                    // Idle prompts have nothing to show
                    ExecutionEvent::Output { text, inferred: true, .. } if text.is_empty() => {}
                    ExecutionEvent::Output { text, prompt: true, .. } => {
                        print!("{}", style(text).green());
                        let _ = io::stdout().flush();
                    }
                    ExecutionEvent::Output { text, .. } => println!("{}", text),
                    ExecutionEvent::ErrorLine { text, .. } => eprintln!("{}", style(text).red()),
                    ExecutionEvent::TimedOut { .. } => {
                        eprintln!("\n{} Execution timed out", style("✗").red());
                        break;
                    }
                    ExecutionEvent::Failed { reason, .. } => {
                        eprintln!("\n{} Execution failed: {}", style("✗").red(), reason);
                        break;
                    }
                    ExecutionEvent::Completed { exit_code, .. } => {
                        let code = exit_code.unwrap_or(-1);
                        let mark = if code == 0 { style("✓").green() } else { style("✗").red() };
                        eprintln!(
                            "\n{} Exited with {} in {:.2?}",
                            mark,
                            code,
                            started.elapsed()
                        );
                        status = ExitCode::from(u8::try_from(code).unwrap_or(1));
                        break;
                    }
                }
            }
            Some(line) = terminal.recv() => {
                if let Err(e) = handle.inject_input(line) {
                    eprintln!("{} {}", style("!").yellow(), e);
                }
            }
        }
    }

    Ok(status)
}

// ============================================================================
// Languages
// ============================================================================

fn list_languages() {
    println!("\n{}", style("Supported languages").cyan().bold());
    for language in Language::ALL {
        let profile = language.profile();
        println!(
            "   {:<12} {:<10} {}",
            style(language).bold(),
            profile.image,
            style(profile.filename).dim()
        );
    }
    println!();
}

// ============================================================================
// Check
// ============================================================================

async fn check(config: &Config) -> anyhow::Result<ExitCode> {
    println!();
    println!("{}", style("╔══════════════════════════════════════════════════╗").cyan());
    println!("{}", style("║              execbox configuration check         ║").cyan());
    println!("{}", style("╚══════════════════════════════════════════════════╝").cyan());
    println!();

    let validation = validate_config(config);
    for issue in &validation.errors {
        println!("   {} {}", style("✗").red(), issue);
    }
    for issue in &validation.warnings {
        println!("   {} {}", style("⚠").yellow(), issue);
    }
    if validation.valid && validation.warnings.is_empty() {
        println!("   {} Configuration valid", style("✓").green());
    }

    let mut healthy = validation.valid;

    print!("   {} Runtime ({})... ", style("○").dim(), config.sandbox.execution_env);
    let _ = io::stdout().flush();
    match config.sandbox.execution_env {
        ExecutionEnv::Os => println!("{}", style("✓ Host (no isolation)").yellow()),
        ExecutionEnv::Container => {
            let runtime = ContainerRuntime::new(&config.sandbox.container);
            match runtime.preflight().await {
                Ok(()) => println!("{}", style("✓ Ready").green()),
                Err(e) => {
                    println!("{} {}", style("✗").red(), e);
                    healthy = false;
                }
            }
        }
    }
    println!();

    Ok(if healthy {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

// ============================================================================
// Config
// ============================================================================

fn show_config(config: &Config, save: Option<&Path>) -> anyhow::Result<ExitCode> {
    println!("{}", serde_json::to_string_pretty(config)?);

    if let Some(path) = save {
        save_config(config, path)?;
        eprintln!("{} Saved to {}", style("✓").green(), path.display());
    }

    Ok(ExitCode::SUCCESS)
}
