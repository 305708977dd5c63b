use crate::actors::orchestrator::HealthReport;
use crate::core::mcp::ChannelState;
use crate::tools::ToolSignature;
use colored::*;
use std::io::Write;
use tracing_subscriber::EnvFilter;

pub fn print_header(text: &str) {
    println!("\n{}", text.bright_cyan().bold());
    println!("{}", "=".repeat(text.chars().count()).bright_cyan());
}

pub fn print_success(text: &str) {
    println!("{}", text.green());
}

pub fn print_error(text: &str) {
    eprintln!("{}", text.red().bold());
}

pub fn print_info(text: &str) {
    println!("{}", text.blue());
}

pub fn print_prompt(text: &str) {
    print!("{}", text.yellow().bold());
    let _ = std::io::stdout().flush();
}

/// Streamed answer text, printed without a newline
pub fn print_fragment(text: &str) {
    print!("{}", text);
    let _ = std::io::stdout().flush();
}

pub fn print_tool_call(name: &str, observation: &str, ok: bool) {
    let marker = if ok { "✓".green() } else { "✗".red() };
    eprintln!("  {} {} → {}", marker, name.yellow(), observation.dimmed());
}

pub fn print_tools(agent: &str, signatures: &[ToolSignature]) {
    println!("{}", agent.bright_white().bold());
    if signatures.is_empty() {
        println!("  {}", "(no tools)".dimmed());
    }
    for signature in signatures {
        let params = signature
            .parameters
            .iter()
            .map(|p| {
                if p.required {
                    format!("{}: {}", p.name, p.param_type)
                } else {
                    format!("{}?: {}", p.name, p.param_type)
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        println!(
            "  {}({}) {}",
            signature.name.cyan(),
            params,
            signature.description.dimmed()
        );
    }
}

pub fn print_health(report: &HealthReport) {
    for agent in &report.agents {
        println!("{}", agent.agent.bright_white().bold());
        for channel in &agent.channels {
            let state = match channel.state {
                ChannelState::Alive => "alive".green(),
                ChannelState::Pending => "pending".yellow(),
                ChannelState::Dead => "dead".red(),
            };
            println!(
                "  {:<20} {:<8} {}",
                channel.server,
                state,
                channel.tools.join(", ").dimmed()
            );
        }
    }
}

/// Logging for the CLI: `RUST_LOG` wins over the configured level
pub fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Logging for tool-server processes. Stdout carries the protocol, so
/// everything goes to stderr.
pub fn init_server_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init();
}
