use anyhow::{Result, anyhow};
use clap::Parser;
use stagehand_agent::{SessionEngine, SessionHandle};
use stagehand_core::{AppConfig, EngineEvent, SessionError, ToolAnswer, ToolCallRequest};
use stagehand_llm::AnthropicClient;
use std::io::{BufRead, Read, Write};
use std::path::PathBuf;
use std::thread;

#[derive(Parser)]
#[command(name = "stagehand")]
#[command(about = "Model-driven coding session with a human approval gate", long_about = None)]
struct Cli {
    /// The task document for the session. Read from stdin when omitted.
    prompt: Option<String>,

    /// Read the task document from a file instead.
    #[arg(long)]
    file: Option<PathBuf>,

    /// Repository root the session operates on. Defaults to the current directory.
    #[arg(long)]
    workspace: Option<PathBuf>,

    /// Override the configured model for this invocation.
    #[arg(long)]
    model: Option<String>,

    /// Approve every tool call without prompting.
    #[arg(long)]
    yes: bool,

    /// Log engine internals to stderr.
    #[arg(long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Approval {
    Yes,
    No,
    All,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("stagehand: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let workspace = match cli.workspace.clone() {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };

    let mut cfg = AppConfig::ensure(&workspace)?;
    if let Some(ref model) = cli.model {
        cfg.llm.model = model.clone();
    }

    let document = read_document(&cli)?;
    let api_key = resolve_api_key()?;
    let transport = AnthropicClient::new(cfg.llm.clone(), api_key)?;

    let mut engine = SessionEngine::new(&workspace, Box::new(transport), cfg)?;
    engine.set_verbose(cli.verbose);
    let handle = engine.spawn(document)?;

    register_sigint(&handle)?;
    consume_events(handle, cli.yes, cli.verbose)
}

fn read_document(cli: &Cli) -> Result<String> {
    if let Some(ref file) = cli.file {
        return std::fs::read_to_string(file)
            .map_err(|err| anyhow!("failed to read {}: {err}", file.display()));
    }
    if let Some(ref prompt) = cli.prompt {
        return Ok(prompt.clone());
    }
    let mut document = String::new();
    std::io::stdin().read_to_string(&mut document)?;
    if document.trim().is_empty() {
        return Err(anyhow!("no task document: pass a prompt, --file, or pipe stdin"));
    }
    Ok(document)
}

/// Credentials are resolved here, at the outermost shell, and passed down;
/// the engine and transport never read the environment themselves.
fn resolve_api_key() -> Result<String> {
    for var in ["STAGEHAND_API_KEY", "ANTHROPIC_API_KEY"] {
        if let Ok(key) = std::env::var(var)
            && !key.trim().is_empty()
        {
            return Ok(key);
        }
    }
    Err(anyhow!(
        "missing API key: set STAGEHAND_API_KEY or ANTHROPIC_API_KEY"
    ))
}

fn register_sigint(handle: &SessionHandle) -> Result<()> {
    let mut signals = signal_hook::iterator::Signals::new([signal_hook::consts::SIGINT])?;
    let cancel = handle.cancel_token();
    thread::spawn(move || {
        if signals.forever().next().is_some() {
            cancel.cancel("interrupted by user");
        }
    });
    Ok(())
}

fn consume_events(handle: SessionHandle, auto_approve: bool, verbose: bool) -> Result<()> {
    let mut approve_all = auto_approve;
    let mut failure: Option<SessionError> = None;

    while let Ok(event) = handle.events.recv() {
        match event {
            EngineEvent::TextDelta(text) => {
                print!("{text}");
                let _ = std::io::stdout().flush();
            }
            EngineEvent::ThinkingDelta(text) => {
                if verbose {
                    eprint!("{text}");
                }
            }
            EngineEvent::ToolRequest(request) => {
                render_tool_request(&request);
                let approved = if approve_all {
                    println!("  approved (--yes)");
                    true
                } else {
                    match prompt_approval()? {
                        Approval::Yes => true,
                        Approval::No => false,
                        Approval::All => {
                            approve_all = true;
                            true
                        }
                    }
                };
                handle.answer(ToolAnswer {
                    id: request.id,
                    approved,
                });
            }
            EngineEvent::ToolResult { id, content, is_error } => {
                if is_error {
                    eprintln!("\n[tool {id} failed] {}", first_line(&content));
                } else if verbose {
                    eprintln!("\n[tool {id} ok] {}", first_line(&content));
                }
            }
            EngineEvent::Done { stop_reason } => {
                println!("\n[session complete: {stop_reason}]");
            }
            EngineEvent::Error { error } => {
                failure = Some(error);
            }
        }
    }
    handle.join();

    match failure {
        Some(error) => Err(anyhow!(error)),
        None => Ok(()),
    }
}

fn render_tool_request(request: &ToolCallRequest) {
    println!("\n── approval required: {} ──", request.name);
    if let Some(ref path) = request.metadata.path {
        println!("  path: {path}");
    }
    if let Some(ref command) = request.metadata.command {
        println!("  command: {command}");
    }
    if let Some(ref diff) = request.metadata.diff {
        for line in diff.lines() {
            println!("  {line}");
        }
    }
    if request.metadata.path.is_none() && request.metadata.command.is_none() {
        println!(
            "  args: {}",
            serde_json::to_string(&request.args).unwrap_or_default()
        );
    }
}

fn prompt_approval() -> Result<Approval> {
    print!("Approve? [y/N/a]: ");
    let _ = std::io::stdout().flush();
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(parse_approval(&line))
}

fn parse_approval(input: &str) -> Approval {
    match input.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Approval::Yes,
        "a" | "all" => Approval::All,
        _ => Approval::No,
    }
}

fn first_line(content: &str) -> &str {
    content.lines().next().unwrap_or_default()
}
