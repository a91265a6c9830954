//! `pincer run`: Serve the message bus.
//!
//! Each stdin line becomes an inbound message on the `cli` channel. A line
//! of the form `!<sender> <channel>:<chat_id> <text>` is sent as a system
//! message instead. Outbound messages are printed as they are published.

use pincer_core::bus::{InboundMessage, SYSTEM_CHANNEL};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use super::Runtime;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let runtime = Runtime::load()?;
    info!(startup = %runtime.agent.startup_info(), "Serving message bus");

    let bus = runtime.bus.clone();
    let reader = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let Some(msg) = parse_line(&line) else {
                continue;
            };
            if let Err(e) = bus.publish_inbound(msg).await {
                warn!(error = %e, "Inbound queue closed");
                break;
            }
        }
        info!("stdin closed, press Ctrl+C to stop");
    });

    let bus = runtime.bus.clone();
    let writer = tokio::spawn(async move {
        while let Some(msg) = bus.consume_outbound().await {
            println!("[{}:{}] {}", msg.channel, msg.chat_id, msg.content);
        }
    });

    runtime
        .agent
        .run(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    reader.abort();
    writer.abort();
    eprintln!("{}", runtime.metrics.to_json()?);
    Ok(())
}

fn parse_line(line: &str) -> Option<InboundMessage> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    if let Some(rest) = line.strip_prefix('!') {
        let mut parts = rest.splitn(3, ' ');
        let (Some(sender), Some(origin), Some(content)) = (parts.next(), parts.next(), parts.next()) else {
            warn!(line = %line, "System lines need `!<sender> <channel>:<chat_id> <text>`");
            return None;
        };
        return Some(InboundMessage::new(SYSTEM_CHANNEL, sender, origin, content));
    }

    Some(InboundMessage::new("cli", "user", "direct", line))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_lines_are_user_messages() {
        let msg = parse_line("  hello there ").unwrap();
        assert_eq!(msg.channel, "cli");
        assert_eq!(msg.chat_id, "direct");
        assert_eq!(msg.content, "hello there");
        assert_eq!(msg.session_key, "cli:direct");
        assert!(parse_line("   ").is_none());
    }

    #[test]
    fn bang_lines_are_system_messages() {
        let msg = parse_line("!cron telegram:42 nightly report ready").unwrap();
        assert!(msg.is_system());
        assert_eq!(msg.sender_id, "cron");
        assert_eq!(msg.chat_id, "telegram:42");
        assert_eq!(msg.content, "nightly report ready");
        assert!(parse_line("!cron").is_none());
    }
}
