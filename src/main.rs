use anyhow::Result;
use clap::Parser;
use futures::StreamExt;
use mcp_orchestra::cli::{Cli, Commands};
use mcp_orchestra::{init, shutdown, utils, ResponseFragment, Settings};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{self, AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let level = Settings::new()
        .map(|settings| settings.logging.level)
        .unwrap_or_else(|_| "info".to_string());
    utils::init_logging(&level);

    let cli = Cli::parse();

    // Refuses to start if any tool server or credential is missing
    init().await?;

    let result = match cli.command {
        Commands::Ask {
            question,
            customer_id,
            timeout_secs,
        } => handle_ask(question, customer_id, timeout_secs).await,
        Commands::Interactive { customer_id } => handle_interactive(customer_id).await,
        Commands::Batch { file, concurrency } => handle_batch(file, concurrency).await,
        Commands::Tools => handle_tools(),
        Commands::Health => handle_health().await,
    };

    shutdown().await?;

    result
}

async fn handle_ask(
    question: String,
    customer_id: Option<String>,
    timeout_secs: Option<u64>,
) -> Result<()> {
    match timeout_secs {
        Some(secs) => {
            utils::print_info("Sending request...");
            let answer = mcp_orchestra::ask_with_timeout(
                question,
                customer_id,
                Duration::from_secs(secs),
            )
            .await?;
            println!("\n{}", answer);
            Ok(())
        }
        None => stream_answer(&question, customer_id.as_deref()).await,
    }
}

async fn stream_answer(question: &str, customer_id: Option<&str>) -> Result<()> {
    let orchestrator = mcp_orchestra::orchestrator()?;
    let (agent, mut fragments) = orchestrator.handle_stream(question, customer_id).await?;
    utils::print_info(&format!("[{}]", agent.name()));

    while let Some(fragment) = fragments.next().await {
        match fragment? {
            ResponseFragment::Text(text) => utils::print_fragment(&text),
            ResponseFragment::ToolCompleted(metadata) => utils::print_tool_call(
                &metadata.call.name,
                &metadata.result.to_observation(),
                metadata.result.is_ok(),
            ),
        }
    }
    println!();
    Ok(())
}

async fn handle_interactive(customer_id: Option<String>) -> Result<()> {
    utils::print_header("Interactive Mode");
    utils::print_info("Type your questions (Ctrl+D to exit)\n");

    let mut reader = BufReader::new(io::stdin());

    loop {
        utils::print_prompt("You: ");
        let mut input = String::new();
        if reader.read_line(&mut input).await? == 0 {
            println!();
            return Ok(());
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        // A failed request does not end the session
        if let Err(e) = stream_answer(input, customer_id.as_deref()).await {
            utils::print_error(&format!("Error: {}", e));
        }
        println!();
    }
}

async fn handle_batch(file: String, concurrency: usize) -> Result<()> {
    utils::print_header("Batch Processing");

    let file = File::open(&file).await?;
    let mut lines = BufReader::new(file).lines();
    let mut questions = Vec::new();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if !line.is_empty() {
            questions.push(line.to_string());
        }
    }

    utils::print_info(&format!(
        "Processing {} questions with concurrency {}",
        questions.len(),
        concurrency
    ));

    let results = mcp_orchestra::batch::process_questions(questions, concurrency).await;

    let mut failed = 0;
    for (i, (question, result)) in results.into_iter().enumerate() {
        println!("\n[{}] {}", i + 1, question);
        match result {
            Ok(answer) => utils::print_success(&answer),
            Err(e) => {
                failed += 1;
                utils::print_error(&format!("{} ({})", e, e.kind()));
            }
        }
    }

    if failed > 0 {
        utils::print_error(&format!("\n{} question(s) failed", failed));
    }
    Ok(())
}

fn handle_tools() -> Result<()> {
    utils::print_header("Agent Tools");
    for (agent, signatures) in mcp_orchestra::tools()? {
        utils::print_tools(&agent, &signatures);
    }
    Ok(())
}

async fn handle_health() -> Result<()> {
    utils::print_header("Tool Process Health");
    let report = mcp_orchestra::health().await?;
    utils::print_health(&report);

    if report.is_healthy() {
        utils::print_success("\nAll tool processes are alive");
    } else {
        utils::print_error("\nSome tool processes are not alive");
    }
    Ok(())
}
