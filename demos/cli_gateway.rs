//! Terminal front end for the gateway.
//!
//! Loads `~/.nanobot/config.json`, builds the agent from it and routes every
//! line typed on stdin through the gateway as a web chat message.
//!
//! # Running
//!
//! ```bash
//! RUST_LOG=nanogate=debug cargo run --example cli_gateway
//! ```
//!
//! Type `/clear` to drop the conversation, Ctrl-D to quit.

use nanogate::channels::WebAdapter;
use nanogate::{
    AgentLoop, ChannelEvent, Config, ConversationKey, FileStore, GatewayRouter, ResponseStatus,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = Config::load_default()?;
    let agent = AgentLoop::builder()
        .config(config.agent_config())
        .provider_registry(config.provider_registry())
        .tools(config.tool_registry())
        .sandbox(config.sandbox_config()?)
        .build()?;

    let store = FileStore::new(config.workspace_path().join("sessions"))?;
    let router = GatewayRouter::new(Arc::new(agent), Arc::new(store))
        .with_adapter(Arc::new(WebAdapter::new(config.channels.web.allow_from.clone())));

    let (session, client) = WebAdapter::connection_ids(Some("cli"), None);
    let key = ConversationKey::new(WebAdapter::CHANNEL_ID, &session);
    println!("nanogate ({}), session {session}", config.agents.defaults.model);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/clear" {
            router.clear(&key).await?;
            println!("(cleared)");
            continue;
        }

        let response = router
            .handle(ChannelEvent::new(WebAdapter::CHANNEL_ID, &session, &client, line))
            .await;
        match response.status {
            ResponseStatus::Degraded => println!("assistant (backup model): {}", response.text),
            ResponseStatus::Ok => println!("assistant: {}", response.text),
            ResponseStatus::Busy | ResponseStatus::Failed => eprintln!("! {}", response.text),
        }
    }

    router.shutdown();
    Ok(())
}
