mod serve;
mod tool_cmd;

use std::path::PathBuf;

use anyhow::Result;
use console::style;

use crate::core::config::RelayConfig;
use crate::core::research::ResearchParams;
use crate::core::terminal::{self, GuideSection, print_error};
use crate::core::tools::RelayTools;

fn print_help() {
    terminal::print_banner();

    GuideSection::new("Server")
        .command("serve", "Start the HTTP API (tools, SSE progress, logs)")
        .print();

    GuideSection::new("Tools")
        .command("agents", "List the agents in the Foundry project")
        .command("ask", "Send a query to a specific agent")
        .command("search", "Run a Bing-grounded search query")
        .command("research", "Run a deep-research request on a conversation")
        .print();

    GuideSection::new("Options")
        .text("--config <path>          TOML tuning file ([server], [query], [research], [retry])")
        .text("--verbose, -v            Debug-level logging")
        .blank()
        .text("serve    [--host H] [--port P]")
        .text("ask      --agent <id> --query <text>")
        .text("search   --query <text>")
        .text("research --topic <text> --conversation <id> [--language en] [--scope overview]")
        .text("         [--timeout 1800] [--no-interactive]")
        .print();

    println!(
        "\n {} {} <command> [options]\n",
        style("Usage:").bold(),
        style("foundry-relay").green()
    );
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct GlobalFlags {
    pub config: Option<PathBuf>,
    pub verbose: bool,
}

/// Pull flags valid for every command out of `args`, returning the rest.
pub(crate) fn parse_global_flags(args: &[String]) -> (GlobalFlags, Vec<String>) {
    let mut flags = GlobalFlags::default();
    let mut rest = Vec::with_capacity(args.len());
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    flags.config = Some(PathBuf::from(&args[i + 1]));
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--verbose" | "-v" => {
                flags.verbose = true;
                i += 1;
            }
            _ => {
                rest.push(args[i].clone());
                i += 1;
            }
        }
    }
    (flags, rest)
}

pub(crate) fn parse_serve_flags(
    args: &[String],
    start: usize,
    mut host: String,
    mut port: u16,
) -> (String, u16) {
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--port" | "-p" => {
                if i + 1 < args.len() {
                    port = args[i + 1].parse().unwrap_or(port);
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--host" => {
                if i + 1 < args.len() {
                    host = args[i + 1].clone();
                    i += 2;
                } else {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    (host, port)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct AskArgs {
    pub agent: String,
    pub query: String,
}

pub(crate) fn parse_ask_args(args: &[String], start: usize) -> AskArgs {
    let mut parsed = AskArgs::default();
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--agent" | "-a" => {
                if i + 1 < args.len() {
                    parsed.agent = args[i + 1].clone();
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--query" | "-q" => {
                if i + 1 < args.len() {
                    parsed.query = args[i + 1].clone();
                    i += 2;
                } else {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    parsed
}

pub(crate) fn parse_research_args(args: &[String], start: usize) -> ResearchParams {
    let mut params = ResearchParams::new("", "");
    let mut i = start;
    while i < args.len() {
        let value = args.get(i + 1).cloned();
        match (args[i].as_str(), value) {
            ("--topic" | "-t", Some(v)) => {
                params.topic = v;
                i += 2;
            }
            ("--conversation" | "--conversation-id", Some(v)) => {
                params.conversation_id = v;
                i += 2;
            }
            ("--language" | "-l", Some(v)) => {
                params.language = Some(v);
                i += 2;
            }
            ("--scope", Some(v)) => {
                params.research_scope = Some(v);
                i += 2;
            }
            ("--timeout", Some(v)) => {
                // Unparseable values surface as an out-of-range timeout.
                params.timeout_seconds = Some(v.parse().unwrap_or(0));
                i += 2;
            }
            ("--no-interactive", _) => {
                params.interactive = Some(false);
                i += 1;
            }
            _ => i += 1,
        }
    }
    params
}

pub async fn run_main() -> Result<()> {
    let raw: Vec<String> = std::env::args().collect();
    let (flags, args) = parse_global_flags(&raw);
    let log_tx = crate::logging::init(flags.verbose);

    let cmd = args.get(1).map(String::as_str).unwrap_or("help");
    if matches!(cmd, "help" | "--help" | "-h") {
        print_help();
        return Ok(());
    }

    let config = RelayConfig::load(flags.config.as_deref()).await?;

    match cmd {
        "serve" => {
            let (host, port) = parse_serve_flags(
                &args,
                2,
                config.file.server.host.clone(),
                config.file.server.port,
            );
            serve::run_serve(&config, host, port, log_tx).await
        }
        "agents" => {
            let tools = RelayTools::from_config(&config)?;
            tool_cmd::run_agents(&tools).await
        }
        "ask" => {
            let parsed = parse_ask_args(&args, 2);
            if parsed.agent.is_empty() || parsed.query.is_empty() {
                print_error("Error: --agent and --query are required for ask.");
                print_help();
                return Ok(());
            }
            let tools = RelayTools::from_config(&config)?;
            tool_cmd::run_ask(&tools, &parsed).await
        }
        "search" => {
            let parsed = parse_ask_args(&args, 2);
            if parsed.query.is_empty() {
                print_error("Error: --query is required for search.");
                print_help();
                return Ok(());
            }
            let tools = RelayTools::from_config(&config)?;
            tool_cmd::run_search(&tools, &parsed.query).await
        }
        "research" => {
            let params = parse_research_args(&args, 2);
            let tools = RelayTools::from_config(&config)?;
            tool_cmd::run_research(&tools, &params).await
        }
        other => {
            print_error(&format!("Unknown command '{}'.", other));
            print_help();
            Ok(())
        }
    }
}
