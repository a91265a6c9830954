//! `pincer agent`: Single-message or interactive chat mode.

use std::io::Write;

use pincer_agent::{DirectRequest, TurnHandlers};
use pincer_core::event::ToolStatus;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::Runtime;

pub async fn run(message: Option<String>, session: String, stream: bool) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = Runtime::load()?;

    if let Some(msg) = message {
        // Single message mode
        let response = turn(&runtime, &session, msg, stream).await?;
        if !stream {
            println!("{response}");
        }
        runtime.drain_outbound().await;
        return Ok(());
    }

    let info = runtime.agent.startup_info();
    println!();
    println!("  Pincer Agent — Interactive Mode");
    println!();
    println!("  Provider:  {}", info["provider"].as_str().unwrap_or("unknown"));
    println!("  Model:     {}", info["model"].as_str().unwrap_or("unknown"));
    println!("  Tools:     {}", info["tools"]["names"]);
    println!("  Session:   {session}");
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+D to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt()?;
    while let Some(line) = lines.next_line().await? {
        let line = line.trim().to_string();
        if line == "exit" || line == "quit" {
            break;
        }
        if line.is_empty() {
            prompt()?;
            continue;
        }

        match turn(&runtime, &session, line, stream).await {
            Ok(response) => {
                if !stream {
                    for text in response.lines() {
                        println!("  Assistant > {text}");
                    }
                }
                println!();
            }
            Err(e) => {
                eprintln!("  [Error] {e}");
                println!();
            }
        }
        runtime.drain_outbound().await;
        prompt()?;
    }

    tracing::debug!(metrics = %runtime.metrics.to_json()?, "Session metrics");
    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}

async fn turn(
    runtime: &Runtime,
    session: &str,
    content: String,
    stream: bool,
) -> Result<String, Box<dyn std::error::Error>> {
    let request = DirectRequest::new(content, session).with_sender("cli");
    if !stream {
        return Ok(runtime.agent.process(request).await?);
    }

    let handlers = TurnHandlers::new()
        .with_on_token(|token| {
            print!("{token}");
            std::io::stdout().flush().map_err(|e| e.to_string())
        })
        .with_on_tool(|event| match event.status {
            ToolStatus::Started => eprintln!("\n  [tool] {} {}", event.name, event.arguments),
            ToolStatus::Finished => eprintln!("  [tool] {} done", event.name),
            ToolStatus::Error => eprintln!(
                "  [tool] {} failed: {}",
                event.name,
                event.result.as_deref().unwrap_or_default()
            ),
        });
    let response = runtime.agent.process_stream(request, handlers).await?;
    println!();
    Ok(response)
}

fn prompt() -> std::io::Result<()> {
    print!("  You > ");
    std::io::stdout().flush()
}
