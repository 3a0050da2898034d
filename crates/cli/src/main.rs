use anyhow::{Context, Result};
use cellbook_core::logging::{self, LoggingConfig};
use cellbook_core::{CellSequence, Config, ProviderConfig};
use cellbook_engine::{Notebook, NotebookState, ProviderModel};
use cellbook_providers::ProviderFactory;
use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Cellbook - run notebook cells against a chat model
#[derive(Parser, Debug)]
#[command(name = "cellbook")]
#[command(about = "A notebook of conversational cells backed by a chat model", long_about = None)]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to cellbook.toml (default: ./cellbook.toml)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start an interactive notebook
    Repl {
        /// Restore cells from a file written by `export`
        #[arg(short, long, value_name = "PATH")]
        load: Option<PathBuf>,
    },
    /// Show the resolved configuration
    Status,
    /// Write an example configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

/// One line of REPL input
#[derive(Debug, Clone, PartialEq, Eq)]
enum ReplCommand {
    Show,
    Run { position: usize, text: String },
    Below { position: usize, text: String },
    Insert(usize),
    Delete(usize),
    Clear,
    Export(PathBuf),
    Help,
    Quit,
}

impl ReplCommand {
    /// Parse a REPL line; blank lines yield `None`.
    fn parse(line: &str) -> std::result::Result<Option<Self>, String> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        let command = match word {
            "show" | "ls" => ReplCommand::Show,
            "run" => {
                let (position, text) = position_and_text(rest)?;
                ReplCommand::Run { position, text }
            }
            "below" => {
                let (position, text) = position_and_text(rest)?;
                ReplCommand::Below { position, text }
            }
            "insert" => ReplCommand::Insert(parse_position(rest)?),
            "delete" | "rm" => ReplCommand::Delete(parse_position(rest)?),
            "clear" => ReplCommand::Clear,
            "export" if !rest.is_empty() => ReplCommand::Export(PathBuf::from(rest)),
            "export" => return Err("usage: export <path>".to_string()),
            "help" | "?" => ReplCommand::Help,
            "quit" | "exit" | "q" => ReplCommand::Quit,
            other => return Err(format!("unknown command `{}` (try `help`)", other)),
        };
        Ok(Some(command))
    }
}

fn parse_position(s: &str) -> std::result::Result<usize, String> {
    s.parse::<usize>().map_err(|_| format!("expected a cell number, got `{}`", s))
}

fn position_and_text(rest: &str) -> std::result::Result<(usize, String), String> {
    let (position, text) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    Ok((parse_position(position)?, text.trim().to_string()))
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(|| PathBuf::from("cellbook.toml"));

    match cli.command {
        Commands::Init { force } => cmd_init(&config_path, force),
        Commands::Status => cmd_status(&load_config(&config_path)?, &config_path),
        Commands::Repl { load } => cmd_repl(load_config(&config_path)?, load.as_deref(), cli.verbose),
    }
}

/// Load config from file, falling back to the offline echo provider
fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        Config::from_file(path).with_context(|| format!("Failed to load config from {}", path.display()))
    } else {
        println!("{} Config not found at {}", "Warning:".yellow().bold(), path.display());
        println!(
            "{} Using the offline mock provider. Run `cellbook init` to create a config.",
            "Info:".blue().bold()
        );
        Ok(Config::default())
    }
}

/// Write the example config
fn cmd_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }

    std::fs::write(path, Config::example()).context("Failed to write config")?;
    println!(
        "{} Created config at {}. Please edit it with your settings.",
        "Success:".green().bold(),
        path.display()
    );
    Ok(())
}

/// Show the resolved configuration
fn cmd_status(config: &Config, path: &Path) -> Result<()> {
    println!("{}", "Cellbook Status".green().bold().underline());
    println!();

    println!("{} Configuration", "Info:".blue().bold());
    println!("  File: {}", path.display().cyan());
    println!("  Provider: {}", config.provider.name().cyan());
    match &config.provider {
        ProviderConfig::OpenAi { model, base_url, .. } => {
            println!("  Model: {}", model.cyan());
            println!("  Base URL: {}", base_url.cyan());
        }
        ProviderConfig::Mock { responses_file: Some(file) } => {
            println!("  Responses: {}", file.display().cyan());
        }
        ProviderConfig::Mock { responses_file: None } => println!("  Responses: {}", "echo".cyan()),
    }

    println!();
    println!("{} Notebook", "Info:".blue().bold());
    println!("  Busy policy: {}", config.notebook.busy_policy.as_str().cyan());
    if let Some(temperature) = config.notebook.temperature {
        println!("  Temperature: {}", temperature.to_string().cyan());
    }
    if let Some(max_tokens) = config.notebook.max_tokens {
        println!("  Max tokens: {}", max_tokens.to_string().cyan());
    }

    println!();
    println!("{} Logging", "Info:".blue().bold());
    println!("  Level: {}", config.logging.level.cyan());
    println!("  Content: {}", config.logging.privacy.log_content.cyan());
    Ok(())
}

/// Build a notebook from config, optionally restoring exported cells
fn build_notebook(config: &Config, load: Option<&Path>, logging: &LoggingConfig) -> Result<Notebook> {
    let provider = ProviderFactory::create_from_config(&config.provider).context("Failed to create provider")?;
    let model = ProviderModel::new(provider)
        .with_temperature(config.notebook.temperature)
        .with_max_tokens(config.notebook.max_tokens);

    let cells = match load {
        Some(path) => load_state(path)?.cells,
        None => CellSequence::new(),
    };

    Ok(Notebook::with_cells(Arc::new(model), cells)
        .with_config(&config.notebook)
        .with_privacy(logging.privacy))
}

/// Run the interactive notebook
fn cmd_repl(config: Config, load: Option<&Path>, verbose: bool) -> Result<()> {
    let mut logging_config = LoggingConfig::from(config.logging.clone());
    if verbose {
        logging_config = logging_config.with_level("debug");
    }
    let _guard = logging::init_logging(Some(logging_config.clone())).context("Failed to initialize logging")?;

    let notebook = build_notebook(&config, load, &logging_config)?;
    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;

    println!(
        "{} Notebook ready ({} provider). Type `help` for commands.",
        "Info:".blue().bold(),
        config.provider.name().cyan()
    );
    print_state(&notebook.state());

    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("{} ", ">".cyan().bold());
        std::io::stdout().flush()?;

        let Some(line) = lines.next() else { break };
        let command = match ReplCommand::parse(&line?) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(message) => {
                eprintln!("{} {}", "Warning:".yellow().bold(), message);
                continue;
            }
        };

        match runtime.block_on(execute(&notebook, command)) {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => eprintln!("{} {:#}", "Error:".red().bold(), e),
        }
    }

    Ok(())
}

/// Execute one REPL command; `false` ends the session.
async fn execute(notebook: &Notebook, command: ReplCommand) -> Result<bool> {
    match command {
        ReplCommand::Show => print_state(&notebook.state()),
        ReplCommand::Run { position, text } => {
            let text = text_or_current(notebook, position, text)?;
            let outcome = notebook.run_cell(position, &text).await?;
            print_output(outcome.position, &outcome.output);
        }
        ReplCommand::Below { position, text } => {
            let text = text_or_current(notebook, position, text)?;
            match notebook.run_from_here(position, &text).await {
                Ok(outcomes) => {
                    for outcome in outcomes {
                        print_output(outcome.position, &outcome.output);
                    }
                }
                Err(e) => {
                    print_state(&notebook.state());
                    println!("{} Run `clear` to reset the remaining cells.", "Info:".blue().bold());
                    return Err(e.into());
                }
            }
        }
        ReplCommand::Insert(position) => {
            let inserted = notebook.insert_blank_after(position).await?;
            println!("{} Inserted cell {}", "Success:".green().bold(), inserted);
        }
        ReplCommand::Delete(position) => {
            notebook.delete(position).await?;
            println!("{} Deleted cell {}", "Success:".green().bold(), position);
        }
        ReplCommand::Clear => {
            let cleared = notebook.clear_running_markers().await?;
            println!("{} Cleared {} running marker(s)", "Success:".green().bold(), cleared);
        }
        ReplCommand::Export(path) => {
            write_state(&path, &notebook.state())?;
            println!("{} Exported to {}", "Success:".green().bold(), path.display());
        }
        ReplCommand::Help => print_help(),
        ReplCommand::Quit => return Ok(false),
    }
    Ok(true)
}

/// `run <n>` without text re-runs the cell's current text.
fn text_or_current(notebook: &Notebook, position: usize, text: String) -> Result<String> {
    if !text.is_empty() {
        return Ok(text);
    }
    Ok(notebook.state().cells.get(position)?.text.clone())
}

fn write_state(path: &Path, state: &NotebookState) -> Result<()> {
    let json = serde_json::to_string_pretty(state).context("Failed to serialize notebook")?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}

fn load_state(path: &Path) -> Result<NotebookState> {
    let json = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("Failed to parse notebook {}", path.display()))
}

fn print_state(state: &NotebookState) {
    println!();
    for (position, cell) in state.cells.iter().enumerate() {
        println!("{:>3} {} {}", position.to_string().dimmed(), cell.run_count.to_string().cyan(), cell.text);
        if cell.has_output() {
            for line in cell.output.lines() {
                println!("        {}", line.green());
            }
        }
    }
    println!("{}", format!("    {} transcript entries", state.transcript.len()).dimmed());
    println!();
}

fn print_output(position: usize, output: &str) {
    println!("{} {}", format!("Out {}:", position).cyan().bold(), output);
}

fn print_help() {
    println!("{}", "Commands".bold().underline());
    println!("  show                 list cells and outputs");
    println!("  run <n> [text]       run cell n (re-runs its current text when omitted)");
    println!("  below <n> [text]     run cell n, then every later cell that has text");
    println!("  insert <n>           insert a blank cell after cell n");
    println!("  delete <n>           delete cell n");
    println!("  clear                clear running markers left by a halted run");
    println!("  export <path>        write cells and transcript as JSON");
    println!("  help                 show this help");
    println!("  quit                 leave the notebook");
}
