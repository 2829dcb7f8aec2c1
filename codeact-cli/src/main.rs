//! # codeact CLI
//!
//! Command-line interface for the code-act agent.
//!
//! Usage:
//!   codeact <query>
//!   codeact repl
//!   codeact exec <snippet>
//!
//! Examples:
//!   codeact --groq "What is the 20th Fibonacci number?"
//!   codeact --base-url http://localhost:11434/v1 --model llama3 repl
//!   codeact exec "x = [i*i for i in range(5)]; x"

use clap::{Parser, Subcommand};
use codeact_agent::{AgentConfig, CodeActAgent, OpenAIProvider, ProviderConfig};
use codeact_engine::{ExecutionSession, Segment, SegmentKind, SessionBuilder};
use std::io::{BufRead, Write};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "codeact")]
#[command(author, version, about = "codeact - chat with a code-executing agent")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Query to run (when not using subcommands)
    #[arg(trailing_var_arg = true)]
    query: Vec<String>,

    /// Model name (overrides the provider default)
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Base URL of an OpenAI-compatible endpoint
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// API key (falls back to CODEACT_API_KEY)
    #[arg(long, global = true, env = "CODEACT_API_KEY")]
    api_key: Option<String>,

    /// Use the Groq endpoint
    #[arg(long, global = true)]
    groq: bool,

    /// Per-snippet execution deadline in seconds (0 disables it)
    #[arg(long, global = true, default_value = "30")]
    deadline_secs: u64,

    /// Preload a module into the session, as ALIAS=MODULE or MODULE
    #[arg(long = "import", global = true, value_name = "ALIAS=MODULE")]
    imports: Vec<String>,

    /// Run a Python file against the session at startup (tool definitions)
    #[arg(long, global = true, value_name = "FILE")]
    prelude: Option<String>,

    /// Maximum completion turns per query
    #[arg(long, global = true, default_value = "8")]
    max_turns: usize,

    /// Stream agent progress live instead of printing the final transcript
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print the transcript as JSON segments instead of formatted text
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single query
    Run {
        /// The query text
        #[arg(trailing_var_arg = true, required = true)]
        query: Vec<String>,
    },
    /// Interactive chat loop (:reset, :quit)
    Repl,
    /// Execute a snippet directly against a fresh session
    Exec {
        /// The snippet source
        #[arg(trailing_var_arg = true, required = true)]
        snippet: Vec<String>,
    },
}

fn build_session(cli: &Cli) -> codeact_engine::Result<ExecutionSession> {
    let mut builder = SessionBuilder::new();

    if cli.deadline_secs == 0 {
        builder = builder.no_deadline();
    } else {
        builder = builder.deadline(Duration::from_secs(cli.deadline_secs));
    }

    for spec in &cli.imports {
        let (alias, module) = match spec.split_once('=') {
            Some((alias, module)) => (alias, module),
            None => (spec.as_str(), spec.as_str()),
        };
        builder = builder.import(alias, module);
    }

    if let Some(path) = &cli.prelude {
        let source = std::fs::read_to_string(path)?;
        builder = builder.prelude(source);
    }

    builder.build()
}

fn build_provider(cli: &Cli) -> OpenAIProvider {
    let api_key = cli.api_key.clone().unwrap_or_default();

    let mut config = if cli.groq {
        ProviderConfig::groq(api_key)
    } else {
        ProviderConfig::openai(api_key)
    };

    if let Some(base_url) = &cli.base_url {
        config.base_url = Some(base_url.clone());
    }
    if let Some(model) = &cli.model {
        config = config.with_model(model.clone());
    }

    OpenAIProvider::new(config)
}

fn build_agent(cli: &Cli) -> codeact_engine::Result<CodeActAgent<OpenAIProvider>> {
    let session = build_session(cli)?;
    let provider = build_provider(cli);
    let config = AgentConfig {
        verbose: cli.verbose,
        model: cli.model.clone(),
        max_turns: cli.max_turns,
        ..AgentConfig::default()
    };
    Ok(CodeActAgent::with_config(provider, session, config))
}

fn print_transcript(transcript: &[Segment]) {
    for segment in transcript {
        match segment.kind {
            SegmentKind::Text => println!("{}\n", segment.content),
            SegmentKind::Code => {
                for line in segment.content.lines() {
                    println!(">>> {}", line);
                }
                println!();
            }
            SegmentKind::Tool => {
                for line in segment.content.lines() {
                    println!("=== {}", line);
                }
                println!();
            }
        }
    }
}

async fn run_query(agent: &mut CodeActAgent<OpenAIProvider>, query: &str, cli: &Cli) {
    match agent.run(query).await {
        Ok(transcript) => {
            if cli.json {
                match serde_json::to_string_pretty(&transcript) {
                    Ok(json) => println!("{}", json),
                    Err(e) => eprintln!("Error serializing transcript: {}", e),
                }
            } else if !cli.verbose {
                // verbose mode already printed everything while streaming
                print_transcript(&transcript);
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run_repl(cli: &Cli) {
    let mut agent = match build_agent(cli) {
        Ok(agent) => agent,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    println!("codeact repl - :reset clears the chat, :quit exits\n");

    let stdin = std::io::stdin();
    loop {
        print!("> ");
        let _ = std::io::stdout().flush();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                eprintln!("Error reading input: {}", e);
                break;
            }
        }

        let line = line.trim();
        match line {
            "" => continue,
            ":quit" | ":q" => break,
            ":reset" => {
                agent.reset();
                // a reset also starts over with fresh bindings
                match build_agent(cli) {
                    Ok(fresh) => agent = fresh,
                    Err(e) => {
                        eprintln!("Error: {}", e);
                        break;
                    }
                }
                println!("(chat and session reset)\n");
            }
            query => run_query(&mut agent, query, cli).await,
        }
    }
}

fn run_exec(cli: &Cli, snippet: &str) {
    let session = match build_session(cli) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let outcome = session.execute(snippet);
    println!("{}", outcome.output);
    if !outcome.succeeded {
        std::process::exit(1);
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match &cli.command {
        Some(Commands::Repl) => {
            run_repl(&cli).await;
        }
        Some(Commands::Exec { snippet }) => {
            let snippet = snippet.join(" ");
            run_exec(&cli, &snippet);
        }
        Some(Commands::Run { query }) => {
            let query = query.join(" ");
            match build_agent(&cli) {
                Ok(mut agent) => run_query(&mut agent, &query, &cli).await,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            }
        }
        None => {
            if cli.query.is_empty() {
                eprintln!("Error: No query provided.");
                eprintln!("Usage: codeact [OPTIONS] <QUERY>...");
                eprintln!("       codeact run <QUERY>...");
                eprintln!("       codeact repl");
                eprintln!("       codeact exec <SNIPPET>...");
                eprintln!("\nExamples:");
                eprintln!("  codeact --groq \"What is the 20th Fibonacci number?\"");
                eprintln!("  codeact --import np=numpy repl");
                eprintln!("  codeact exec \"2 + 2\"");
                eprintln!("  codeact --help");
                std::process::exit(1);
            }

            let query = cli.query.join(" ");
            match build_agent(&cli) {
                Ok(mut agent) => run_query(&mut agent, &query, &cli).await,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            }
        }
    }
}
