//! Orchestration example: a parent copilot delegating to child agents.
//!
//! Builds two specialist children, wraps them as tools of a parent via
//! `orchestrator_config`, and routes "refund" utterances straight to the
//! billing child with a routing rule.
//!
//! ```bash
//! export OPENAI_API_KEY="sk-..."
//! cargo run -p sidekick --example orchestrator -- "Refund order #123"
//! ```

use std::sync::Arc;

use sidekick::{
    Agent, AgentConfig, AgentEvent, DelegateOptions, HttpProvider, RoutingPolicy, RoutingRule,
    StaticToolContext, orchestrator_config,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let api_key = std::env::var("OPENAI_API_KEY").expect("set OPENAI_API_KEY");
    let provider = Arc::new(HttpProvider::new(
        "https://api.openai.com/v1",
        &api_key,
        "gpt-4o-mini",
    ));

    let billing = Arc::new(Agent::new(
        provider.clone(),
        AgentConfig::new("Billing")
            .description("Handles refunds, invoices, and payment questions.")
            .system_prompt("You are a billing specialist. Resolve the task precisely."),
    ));
    let support = Arc::new(Agent::new(
        provider.clone(),
        AgentConfig::new("Support")
            .description("Handles product questions and troubleshooting.")
            .system_prompt("You are a support specialist. Resolve the task precisely."),
    ));

    let base = AgentConfig::new("orchestrator")
        .system_prompt("Route each request to the right specialist and summarize their answer.")
        .routing(RoutingPolicy::new(vec![RoutingRule::keyword(
            "refund", "Billing",
        )]))
        .tool_context(Arc::new(StaticToolContext::new("demo-biz", "demo-session", "demo-user")));

    let config = orchestrator_config(
        base,
        vec![("Billing", billing), ("Support", support)],
        DelegateOptions::default(),
    );
    let orchestrator = Agent::new(provider, config);
    orchestrator.subscribe(|event| {
        if let AgentEvent::Message { message } = event {
            println!("[{:?}] {}", message.sender, message.content);
        }
    });

    let text = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "I'd like a refund for order #123".into());
    orchestrator.send(&text).await;
}
