//! Minimal copilot example using sidekick as a library.
//!
//! Creates a single `Agent` over an HTTP provider with one custom tool,
//! subscribes to its events, and runs a turn from the CLI.
//!
//! ```bash
//! export OPENAI_API_KEY="sk-..."
//! cargo run -p sidekick --example simple_copilot -- "What's the weather in Paris?"
//! ```

use std::sync::Arc;

use serde_json::json;
use sidekick::{Agent, AgentConfig, AgentEvent, FnRunner, HttpProvider, StaticToolContext};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let api_key = std::env::var("OPENAI_API_KEY").expect("set OPENAI_API_KEY");
    let provider = Arc::new(HttpProvider::new(
        "https://api.openai.com/v1",
        &api_key,
        "gpt-4o-mini",
    ));

    let config = AgentConfig::new("copilot")
        .description("A weather-aware copilot")
        .system_prompt("You are a helpful copilot. Be concise.")
        .first_message("Hi! Ask me about the weather.")
        .tool_context(Arc::new(StaticToolContext::new("demo-biz", "demo-session", "demo-user")))
        .with_tool(
            "get_weather",
            "Look up the current weather for a city.",
            json!({
                "type": "object",
                "properties": {
                    "city": { "type": "string", "description": "City name" }
                },
                "required": ["city"]
            }),
            Arc::new(FnRunner::new(|args, _ctx| async move {
                let city = args["city"].as_str().unwrap_or("somewhere");
                Ok(json!(format!("Sunny and 22C in {city}.")))
            })),
        );

    let agent = Agent::new(provider, config);
    agent.subscribe(|event| {
        if let AgentEvent::Message { message } = event {
            println!("[{:?}] {}", message.sender, message.content);
        }
    });

    let text = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "What's the weather in Paris?".into());
    agent.send(&text).await;
}
