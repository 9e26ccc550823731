pub mod delegate;
pub mod events;
pub mod history;
pub mod observability;
pub mod prompt;
pub mod routing;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{Value, json};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::AgentConfig;
use crate::error::Error;
use crate::provider::Provider;
use crate::provider::types::{
    ChatRequest, Message, RuntimeTool, StreamChunk, ToolCall, ToolChoice,
};
use crate::tool::{ToolContext, ToolContextIds, ToolRunner, normalize_result, sanitize};

use self::events::{AgentEvent, OnAgentEvent};
use self::history::MessageLog;
use self::observability::emit_event;
use self::prompt::resolve_system_prompt;
use self::routing::RoutingInput;

/// Pushed when a tool batch arrives without a resolved business identifier.
pub const BUSINESS_REQUIRED_MESSAGE: &str = "Select a business to continue";

/// Pushed when both the tool result and its continuation are empty.
pub const EMPTY_CONTINUATION_MESSAGE: &str = "Operation completed with no additional details.";

fn tool_failed_message(name: &str) -> String {
    format!("Tool '{name}' failed.")
}

/// Per-call options for [`Agent::send_with`].
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Explicit tool choice. Wins over the routing policy.
    pub tool_choice: Option<ToolChoice>,
    /// Delegation nesting depth, threaded through by the delegation wrapper.
    pub(crate) depth: u32,
}

impl SendOptions {
    pub fn forced_tool(name: impl Into<String>) -> Self {
        Self {
            tool_choice: Some(ToolChoice::Tool { name: name.into() }),
            depth: 0,
        }
    }

    pub(crate) fn at_depth(depth: u32) -> Self {
        Self {
            tool_choice: None,
            depth,
        }
    }
}

/// A conversational agent bound to one provider and one tool set.
///
/// Owns an append-only conversation log seeded with the configured first
/// assistant message. Public turns (`send`, `send_stream`) are serialized by
/// an internal gate, so overlapping calls on one instance queue rather than
/// interleave. Every turn ends with `Loading { active: false }` — error
/// paths included.
pub struct Agent<P: Provider> {
    provider: Arc<P>,
    config: AgentConfig,
    history: Mutex<MessageLog>,
    subscribers: Mutex<Vec<Arc<OnAgentEvent>>>,
    turn_gate: tokio::sync::Mutex<()>,
}

impl<P: Provider> Agent<P> {
    pub fn new(provider: Arc<P>, config: AgentConfig) -> Self {
        let mut log = MessageLog::new();
        log.push(Message::assistant(&config.first_message));
        Self {
            provider,
            config,
            history: Mutex::new(log),
            subscribers: Mutex::new(Vec::new()),
            turn_gate: tokio::sync::Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Tools this agent advertises to its provider.
    pub fn tools(&self) -> &[RuntimeTool] {
        &self.config.tools
    }

    /// Snapshot of the conversation history.
    pub fn messages(&self) -> Vec<Message> {
        self.history.lock().expect("history lock poisoned").snapshot()
    }

    /// Register an event callback. Subscribers receive all four event kinds
    /// synchronously, in subscription order.
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&AgentEvent) + Send + Sync + 'static,
    {
        self.subscribers
            .lock()
            .expect("subscriber lock poisoned")
            .push(Arc::new(callback));
    }

    fn emit(&self, event: AgentEvent) {
        let subscribers = self
            .subscribers
            .lock()
            .expect("subscriber lock poisoned")
            .clone();
        for subscriber in subscribers {
            subscriber(&event);
        }
    }

    fn push_message(&self, message: Message) -> Uuid {
        let id = self
            .history
            .lock()
            .expect("history lock poisoned")
            .push(message.clone());
        self.emit(AgentEvent::Message { message });
        id
    }

    fn append_message(&self, id: Uuid, delta: &str) {
        let updated = self
            .history
            .lock()
            .expect("history lock poisoned")
            .append_content(id, delta)
            .cloned();
        if let Some(message) = updated {
            self.emit(AgentEvent::Message { message });
        }
    }

    fn replace_message(&self, id: Uuid, content: &str) {
        let updated = self
            .history
            .lock()
            .expect("history lock poisoned")
            .replace_content(id, content)
            .cloned();
        if let Some(message) = updated {
            self.emit(AgentEvent::Message { message });
        }
    }

    /// Seed the first assistant message with a delegation brief.
    ///
    /// See [`MessageLog::seed_first_assistant`] for the reset semantics.
    pub fn seed_first_assistant(&self, brief: &str, reset: bool) -> bool {
        self.history
            .lock()
            .expect("history lock poisoned")
            .seed_first_assistant(brief, reset)
    }

    /// Run one conversational turn.
    ///
    /// Whitespace-only input is a no-op. Failures never escape: the
    /// configured fallback message is appended instead of the answer and an
    /// `Error` event carries the cause.
    pub async fn send(&self, text: &str) {
        self.send_with(text, SendOptions::default()).await;
    }

    pub async fn send_with(&self, text: &str, opts: SendOptions) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let _turn = self.turn_gate.lock().await;

        self.push_message(Message::user(text));
        self.emit(AgentEvent::Loading { active: true });
        let correlation_id = Uuid::new_v4().to_string();

        if let Err(e) = self.run_send_turn(text, &opts, &correlation_id).await {
            warn!(agent = %self.config.name, error = %e, "send failed");
            emit_event(
                "send_error",
                &self.config.observability,
                &correlation_id,
                json!({ "cause": e.to_string() }),
            );
            self.emit(AgentEvent::Error {
                message: e.to_string(),
            });
            self.push_message(Message::assistant(&self.config.fallback_message));
        }

        self.emit(AgentEvent::Loading { active: false });
    }

    async fn run_send_turn(
        &self,
        text: &str,
        opts: &SendOptions,
        correlation_id: &str,
    ) -> Result<(), Error> {
        let tool_choice = self.resolve_tool_choice(text, opts);
        let system_prompt = self.system_prompt().await;

        let request = ChatRequest {
            messages: self.messages(),
            system_prompt: system_prompt.clone(),
            tools: self.config.tools.clone(),
            tool_choice,
            debug: self.config.debug,
        };
        let response = self.provider.send_message(request).await?;

        if response.has_tool_calls() {
            self.handle_tool_calls(
                &response.tool_calls,
                correlation_id,
                opts.depth,
                &system_prompt,
            )
            .await;
        } else if !response.content.trim().is_empty() {
            self.push_message(Message::assistant(&response.content));
        }
        Ok(())
    }

    /// Run one streaming turn.
    ///
    /// The assistant placeholder is appended before the provider call;
    /// deltas mutate it in place. On failure the placeholder's content is
    /// replaced with the fallback message — never appended separately.
    pub async fn send_stream(&self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let _turn = self.turn_gate.lock().await;

        self.push_message(Message::user(text));
        let request_messages = self.messages();
        let placeholder_id = self.push_message(Message::assistant(""));
        self.emit(AgentEvent::Loading { active: true });
        let correlation_id = Uuid::new_v4().to_string();

        let system_prompt = self.system_prompt().await;
        let request = ChatRequest {
            messages: request_messages,
            system_prompt,
            tools: self.config.tools.clone(),
            tool_choice: ToolChoice::Auto,
            debug: self.config.debug,
        };

        let done_seen = AtomicBool::new(false);
        let result = self
            .provider
            .send_message_stream(request, &|chunk: StreamChunk| {
                if chunk.done {
                    done_seen.store(true, Ordering::SeqCst);
                    self.emit(AgentEvent::Loading { active: false });
                    return;
                }
                self.append_message(placeholder_id, &chunk.delta);
                self.emit(AgentEvent::Stream {
                    message_id: placeholder_id,
                    delta: chunk.delta,
                });
            })
            .await;

        match result {
            Ok(()) => {
                // Provider finished without a terminal chunk — still unstick.
                if !done_seen.load(Ordering::SeqCst) {
                    self.emit(AgentEvent::Loading { active: false });
                }
            }
            Err(e) => {
                warn!(agent = %self.config.name, error = %e, "stream failed");
                emit_event(
                    "stream_error",
                    &self.config.observability,
                    &correlation_id,
                    json!({ "cause": e.to_string() }),
                );
                self.emit(AgentEvent::Error {
                    message: e.to_string(),
                });
                self.replace_message(placeholder_id, &self.config.fallback_message);
                self.emit(AgentEvent::Loading { active: false });
            }
        }
    }

    fn resolve_tool_choice(&self, text: &str, opts: &SendOptions) -> ToolChoice {
        if let Some(choice) = &opts.tool_choice {
            return choice.clone();
        }
        match &self.config.routing {
            Some(policy) => {
                let history = self.messages();
                policy.evaluate(&RoutingInput {
                    text,
                    history: &history,
                })
            }
            None => ToolChoice::Auto,
        }
    }

    async fn system_prompt(&self) -> String {
        resolve_system_prompt(
            &self.config.prompt_rules,
            self.config.context_source.as_ref(),
            self.config.context_formatter.as_ref(),
            &self.config.system_prompt,
        )
        .await
    }

    /// Dispatch a batch of tool calls, strictly in order.
    ///
    /// One call's failure never aborts the batch: it surfaces as a single
    /// `Tool '<name>' failed.` message and the loop moves on. A missing
    /// business identifier aborts the whole batch with a user-facing prompt
    /// before any runner is invoked.
    pub(crate) async fn handle_tool_calls(
        &self,
        calls: &[ToolCall],
        correlation_id: &str,
        depth: u32,
        system_prompt: &str,
    ) {
        if calls.is_empty() {
            return;
        }

        let ids = match &self.config.tool_context {
            Some(source) => source.resolve().await,
            None => ToolContextIds::default(),
        };
        if ids.business_id.is_none() {
            warn!(agent = %self.config.name, "tool batch aborted: no business selected");
            self.push_message(Message::assistant(BUSINESS_REQUIRED_MESSAGE));
            return;
        }

        for call in calls {
            let name = sanitize(&call.name);
            let Some(runner) = self.config.runners.get(&name).cloned() else {
                warn!(agent = %self.config.name, tool = %name, "no runner for tool, skipping");
                continue;
            };

            emit_event(
                "tool_call",
                &self.config.observability,
                correlation_id,
                json!({ "tool": name }),
            );

            let ctx = ToolContext {
                business_id: ids.business_id.clone(),
                session_id: ids.session_id.clone(),
                user_id: ids.user_id.clone(),
                depth,
                history: self.messages(),
            };

            if let Err(e) = self
                .run_tool_call(&name, runner.as_ref(), call, &ctx, correlation_id, system_prompt)
                .await
            {
                warn!(agent = %self.config.name, tool = %name, error = %e, "tool call failed");
                emit_event(
                    "tool_call_error",
                    &self.config.observability,
                    correlation_id,
                    json!({ "tool": name, "ok": false, "cause": e.to_string() }),
                );
                self.push_message(Message::assistant(tool_failed_message(&name)));
            }
        }
    }

    async fn run_tool_call(
        &self,
        name: &str,
        runner: &dyn ToolRunner,
        call: &ToolCall,
        ctx: &ToolContext,
        correlation_id: &str,
        system_prompt: &str,
    ) -> Result<(), Error> {
        let mut args = match &call.arguments {
            Value::Object(_) => call.arguments.clone(),
            Value::String(s) => serde_json::from_str(s).unwrap_or_else(|_| json!({})),
            _ => json!({}),
        };
        if !args.is_object() {
            args = json!({});
        }
        if let Value::Object(map) = &mut args {
            map.insert("__context".into(), ctx.injectable());
        }

        let raw = runner.run(args, ctx).await?;

        let normalized = normalize_result(&raw);
        if normalized.used_fallback {
            emit_event(
                "tool_result_fallback",
                &self.config.observability,
                correlation_id,
                json!({ "tool": name }),
            );
        }
        let tool_text = normalized.text;
        self.push_message(Message::assistant(&tool_text));

        // Continuation: let the model wrap the tool result in natural
        // language. Tool choice is forced to none — a continuation that
        // still asks for tools is discarded.
        let request = ChatRequest {
            messages: self.messages(),
            system_prompt: system_prompt.to_string(),
            tools: self.config.tools.clone(),
            tool_choice: ToolChoice::None,
            debug: self.config.debug,
        };
        let continuation = self.provider.send_message(request).await?;

        if continuation.has_tool_calls() {
            debug!(agent = %self.config.name, tool = %name, "continuation requested tools, keeping tool text as final");
            return Ok(());
        }

        let final_text = continuation.content.trim();
        if !final_text.is_empty() {
            self.push_message(Message::assistant(final_text));
        } else if tool_text.trim().is_empty() {
            self.push_message(Message::assistant(EMPTY_CONTINUATION_MESSAGE));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::OnChunk;
    use crate::provider::types::ChatResponse;
    use crate::tool::{FnRunner, StaticToolContext};

    // --- Mock Provider ---

    #[derive(Default)]
    struct MockProvider {
        responses: Mutex<Vec<ChatResponse>>,
        requests: Mutex<Vec<ChatRequest>>,
        stream_chunks: Mutex<Vec<StreamChunk>>,
        stream_fails: bool,
    }

    impl MockProvider {
        fn new(responses: Vec<ChatResponse>) -> Self {
            Self {
                responses: Mutex::new(responses),
                ..Default::default()
            }
        }

        fn streaming(chunks: Vec<StreamChunk>) -> Self {
            Self {
                stream_chunks: Mutex::new(chunks),
                ..Default::default()
            }
        }

        fn failing_stream() -> Self {
            Self {
                stream_fails: true,
                ..Default::default()
            }
        }

        fn requests(&self) -> Vec<ChatRequest> {
            self.requests.lock().expect("mock lock poisoned").clone()
        }
    }

    impl Provider for MockProvider {
        async fn send_message(&self, request: ChatRequest) -> Result<ChatResponse, Error> {
            self.requests
                .lock()
                .expect("mock lock poisoned")
                .push(request);
            let mut responses = self.responses.lock().expect("mock lock poisoned");
            if responses.is_empty() {
                return Err(Error::Agent("no more mock responses".into()));
            }
            Ok(responses.remove(0))
        }

        async fn send_message_stream(
            &self,
            request: ChatRequest,
            on_chunk: &OnChunk<'_>,
        ) -> Result<(), Error> {
            self.requests
                .lock()
                .expect("mock lock poisoned")
                .push(request);
            if self.stream_fails {
                return Err(Error::Agent("stream broke".into()));
            }
            let chunks: Vec<StreamChunk> = self
                .stream_chunks
                .lock()
                .expect("mock lock poisoned")
                .drain(..)
                .collect();
            for chunk in chunks {
                on_chunk(chunk);
            }
            Ok(())
        }
    }

    fn agent_with(provider: Arc<MockProvider>, config: AgentConfig) -> Agent<MockProvider> {
        Agent::new(provider, config)
    }

    fn base_config() -> AgentConfig {
        AgentConfig::new("helper").system_prompt("You help.")
    }

    fn with_business_context(config: AgentConfig) -> AgentConfig {
        config.tool_context(Arc::new(StaticToolContext::new("biz-1", "sess-1", "user-1")))
    }

    fn contents(agent: &Agent<MockProvider>) -> Vec<String> {
        agent.messages().into_iter().map(|m| m.content).collect()
    }

    /// Record loading transitions so tests can assert the bracket property.
    fn track_loading(agent: &Agent<MockProvider>) -> Arc<Mutex<Vec<bool>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        agent.subscribe(move |event| {
            if let AgentEvent::Loading { active } = event {
                sink.lock().expect("lock").push(*active);
            }
        });
        seen
    }

    #[tokio::test]
    async fn history_is_seeded_with_first_message() {
        let provider = Arc::new(MockProvider::new(vec![]));
        let agent = agent_with(provider, base_config().first_message("Welcome!"));
        let messages = agent.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "Welcome!");
        assert_eq!(messages[0].sender, crate::provider::types::Sender::Assistant);
    }

    #[tokio::test]
    async fn send_appends_user_and_assistant_messages() {
        let provider = Arc::new(MockProvider::new(vec![ChatResponse::text("Hello!")]));
        let agent = agent_with(provider.clone(), base_config());

        agent.send("hi there").await;

        let log = contents(&agent);
        assert_eq!(log[1], "hi there");
        assert_eq!(log[2], "Hello!");
        // provider saw the user message in the request
        let requests = provider.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].messages.last().unwrap().content, "hi there");
        assert_eq!(requests[0].system_prompt, "You help.");
    }

    #[tokio::test]
    async fn send_blank_input_is_noop() {
        let provider = Arc::new(MockProvider::new(vec![]));
        let agent = agent_with(provider.clone(), base_config());

        agent.send("   \n\t ").await;

        assert_eq!(agent.messages().len(), 1);
        assert!(provider.requests().is_empty());
    }

    #[tokio::test]
    async fn send_empty_response_content_appends_nothing() {
        let provider = Arc::new(MockProvider::new(vec![ChatResponse::text("  ")]));
        let agent = agent_with(provider, base_config());

        agent.send("hi").await;

        // seed + user only
        assert_eq!(agent.messages().len(), 2);
    }

    #[tokio::test]
    async fn send_failure_pushes_fallback_and_ends_loading() {
        let provider = Arc::new(MockProvider::new(vec![])); // immediate error
        let agent = agent_with(provider, base_config().fallback_message("Oops."));
        let loading = track_loading(&agent);
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = errors.clone();
        agent.subscribe(move |event| {
            if let AgentEvent::Error { message } = event {
                sink.lock().expect("lock").push(message.clone());
            }
        });

        agent.send("hi").await;

        let log = contents(&agent);
        assert_eq!(log.last().unwrap(), "Oops.");
        assert_eq!(*loading.lock().expect("lock"), vec![true, false]);
        assert_eq!(errors.lock().expect("lock").len(), 1);
    }

    #[tokio::test]
    async fn loading_brackets_successful_send() {
        let provider = Arc::new(MockProvider::new(vec![ChatResponse::text("ok")]));
        let agent = agent_with(provider, base_config());
        let loading = track_loading(&agent);

        agent.send("hi").await;

        assert_eq!(*loading.lock().expect("lock"), vec![true, false]);
    }

    #[tokio::test]
    async fn tool_call_pipeline_appends_result_then_continuation() {
        let provider = Arc::new(MockProvider::new(vec![
            ChatResponse {
                content: String::new(),
                tool_calls: vec![ToolCall {
                    name: "Get Weather!!".into(),
                    arguments: json!({"city": "Paris"}),
                }],
            },
            ChatResponse::text("It's a mild 22C in Paris."),
        ]));
        let config = with_business_context(base_config()).with_tool(
            "Get Weather!!",
            "Weather lookup",
            json!({"type": "object"}),
            Arc::new(FnRunner::new(|_, _| async { Ok(json!("22C")) })),
        );
        let agent = agent_with(provider.clone(), config);

        agent.send("weather in paris?").await;

        let log = contents(&agent);
        assert_eq!(log[2], "22C");
        assert_eq!(log[3], "It's a mild 22C in Paris.");

        // continuation forced tool choice to none
        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].tool_choice, ToolChoice::None);
    }

    #[tokio::test]
    async fn runner_receives_injected_context() {
        let provider = Arc::new(MockProvider::new(vec![
            ChatResponse {
                content: String::new(),
                tool_calls: vec![ToolCall {
                    name: "whoami".into(),
                    arguments: json!({}),
                }],
            },
            ChatResponse::text("done"),
        ]));
        let config = with_business_context(base_config()).with_tool(
            "whoami",
            "Identity echo",
            json!({"type": "object"}),
            Arc::new(FnRunner::new(|args, _| async move {
                Ok(args["__context"]["business_id"].clone())
            })),
        );
        let agent = agent_with(provider, config);

        agent.send("who am i").await;

        assert_eq!(contents(&agent)[2], "biz-1");
    }

    #[tokio::test]
    async fn string_arguments_are_json_parsed() {
        let provider = Arc::new(MockProvider::new(vec![
            ChatResponse {
                content: String::new(),
                tool_calls: vec![ToolCall {
                    name: "echo".into(),
                    arguments: json!(r#"{"value": "parsed"}"#),
                }],
            },
            ChatResponse::text("done"),
        ]));
        let config = with_business_context(base_config()).with_tool(
            "echo",
            "Echo",
            json!({"type": "object"}),
            Arc::new(FnRunner::new(|args, _| async move {
                Ok(args["value"].clone())
            })),
        );
        let agent = agent_with(provider, config);

        agent.send("echo").await;

        assert_eq!(contents(&agent)[2], "parsed");
    }

    #[tokio::test]
    async fn malformed_string_arguments_default_to_empty_object() {
        let provider = Arc::new(MockProvider::new(vec![
            ChatResponse {
                content: String::new(),
                tool_calls: vec![ToolCall {
                    name: "echo".into(),
                    arguments: json!("not valid json {"),
                }],
            },
            ChatResponse::text("done"),
        ]));
        let config = with_business_context(base_config()).with_tool(
            "echo",
            "Echo",
            json!({"type": "object"}),
            Arc::new(FnRunner::new(|args, _| async move {
                // only the injected __context key is present
                let keys: Vec<String> = args
                    .as_object()
                    .map(|m| m.keys().cloned().collect())
                    .unwrap_or_default();
                Ok(json!(keys.join(",")))
            })),
        );
        let agent = agent_with(provider, config);

        agent.send("echo").await;

        assert_eq!(contents(&agent)[2], "__context");
    }

    #[tokio::test]
    async fn missing_business_id_aborts_batch_before_any_runner() {
        let invoked = Arc::new(AtomicBool::new(false));
        let flag = invoked.clone();
        let provider = Arc::new(MockProvider::new(vec![ChatResponse {
            content: String::new(),
            tool_calls: vec![ToolCall {
                name: "echo".into(),
                arguments: json!({}),
            }],
        }]));
        // no tool_context configured → no business id
        let config = base_config().with_tool(
            "echo",
            "Echo",
            json!({"type": "object"}),
            Arc::new(FnRunner::new(move |_, _| {
                let flag = flag.clone();
                async move {
                    flag.store(true, Ordering::SeqCst);
                    Ok(json!("ran"))
                }
            })),
        );
        let agent = agent_with(provider, config);

        agent.send("do it").await;

        let log = contents(&agent);
        assert_eq!(
            log.iter().filter(|c| *c == BUSINESS_REQUIRED_MESSAGE).count(),
            1
        );
        assert!(!invoked.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn unknown_tool_is_skipped_silently() {
        let provider = Arc::new(MockProvider::new(vec![ChatResponse {
            content: String::new(),
            tool_calls: vec![ToolCall {
                name: "nonexistent".into(),
                arguments: json!({}),
            }],
        }]));
        let config = with_business_context(base_config());
        let agent = agent_with(provider, config);
        let before = agent.messages().len();

        agent.send("try it").await;

        // only the user message was added — no failure message, no result
        assert_eq!(agent.messages().len(), before + 1);
    }

    #[tokio::test]
    async fn failing_tool_does_not_abort_batch() {
        let provider = Arc::new(MockProvider::new(vec![
            ChatResponse {
                content: String::new(),
                tool_calls: vec![
                    ToolCall {
                        name: "bad!!".into(),
                        arguments: json!({}),
                    },
                    ToolCall {
                        name: "ok".into(),
                        arguments: json!({}),
                    },
                ],
            },
            // continuation for the successful `ok` call
            ChatResponse::text("All done."),
        ]));
        let config = with_business_context(base_config())
            .with_tool(
                "bad!!",
                "Always fails",
                json!({"type": "object"}),
                Arc::new(FnRunner::new(|_, _| async {
                    Err(Error::Tool("boom".into()))
                })),
            )
            .with_tool(
                "ok",
                "Always succeeds",
                json!({"type": "object"}),
                Arc::new(FnRunner::new(|_, _| async { Ok(json!("fine")) })),
            );
        let agent = agent_with(provider, config);

        agent.send("run both").await;

        let log = contents(&agent);
        assert_eq!(
            log.iter().filter(|c| *c == "Tool 'bad' failed.").count(),
            1
        );
        assert!(log.contains(&"fine".to_string()));
        assert!(log.contains(&"All done.".to_string()));
    }

    #[tokio::test]
    async fn continuation_with_tool_calls_is_discarded() {
        let provider = Arc::new(MockProvider::new(vec![
            ChatResponse {
                content: String::new(),
                tool_calls: vec![ToolCall {
                    name: "echo".into(),
                    arguments: json!({}),
                }],
            },
            // misbehaving continuation asks for more tools
            ChatResponse {
                content: "ignore me".into(),
                tool_calls: vec![ToolCall {
                    name: "echo".into(),
                    arguments: json!({}),
                }],
            },
        ]));
        let config = with_business_context(base_config()).with_tool(
            "echo",
            "Echo",
            json!({"type": "object"}),
            Arc::new(FnRunner::new(|_, _| async { Ok(json!("result text")) })),
        );
        let agent = agent_with(provider, config);

        agent.send("echo").await;

        let log = contents(&agent);
        assert_eq!(log.last().unwrap(), "result text");
        assert!(!log.contains(&"ignore me".to_string()));
    }

    #[tokio::test]
    async fn empty_tool_text_and_continuation_yield_literal_message() {
        let provider = Arc::new(MockProvider::new(vec![
            ChatResponse {
                content: String::new(),
                tool_calls: vec![ToolCall {
                    name: "silent".into(),
                    arguments: json!({}),
                }],
            },
            ChatResponse::text(""),
        ]));
        let config = with_business_context(base_config()).with_tool(
            "silent",
            "Returns nothing",
            json!({"type": "object"}),
            Arc::new(FnRunner::new(|_, _| async { Ok(Value::Null) })),
        );
        let agent = agent_with(provider, config);

        agent.send("do it").await;

        let log = contents(&agent);
        assert_eq!(log.last().unwrap(), EMPTY_CONTINUATION_MESSAGE);
    }

    #[tokio::test]
    async fn non_text_result_is_json_encoded() {
        let provider = Arc::new(MockProvider::new(vec![
            ChatResponse {
                content: String::new(),
                tool_calls: vec![ToolCall {
                    name: "lookup".into(),
                    arguments: json!({}),
                }],
            },
            ChatResponse::text("summarized"),
        ]));
        let config = with_business_context(base_config()).with_tool(
            "lookup",
            "Structured result",
            json!({"type": "object"}),
            Arc::new(FnRunner::new(|_, _| async {
                Ok(json!({"total": 3}))
            })),
        );
        let agent = agent_with(provider, config);

        agent.send("lookup").await;

        let log = contents(&agent);
        assert!(log.contains(&r#"{"total":3}"#.to_string()));
    }

    #[tokio::test]
    async fn routing_policy_forces_tool_choice() {
        let provider = Arc::new(MockProvider::new(vec![ChatResponse::text("routed")]));
        let config = base_config().routing(routing::RoutingPolicy::new(vec![
            routing::RoutingRule::keyword("refund", "billing"),
        ]));
        let agent = agent_with(provider.clone(), config);

        agent.send("refund my order").await;

        let requests = provider.requests();
        assert_eq!(
            requests[0].tool_choice,
            ToolChoice::Tool {
                name: "billing".into()
            }
        );
    }

    #[tokio::test]
    async fn explicit_tool_choice_beats_routing() {
        let provider = Arc::new(MockProvider::new(vec![ChatResponse::text("ok")]));
        let config = base_config().routing(routing::RoutingPolicy::new(vec![
            routing::RoutingRule::keyword("refund", "billing"),
        ]));
        let agent = agent_with(provider.clone(), config);

        agent
            .send_with("refund my order", SendOptions::forced_tool("support"))
            .await;

        let requests = provider.requests();
        assert_eq!(
            requests[0].tool_choice,
            ToolChoice::Tool {
                name: "support".into()
            }
        );
    }

    #[tokio::test]
    async fn no_routing_defaults_to_auto() {
        let provider = Arc::new(MockProvider::new(vec![ChatResponse::text("ok")]));
        let agent = agent_with(provider.clone(), base_config());

        agent.send("hello").await;

        assert_eq!(provider.requests()[0].tool_choice, ToolChoice::Auto);
    }

    #[tokio::test]
    async fn stream_accumulates_deltas_into_placeholder() {
        let provider = Arc::new(MockProvider::streaming(vec![
            StreamChunk::delta("Hel"),
            StreamChunk::delta("lo!"),
            StreamChunk::done(),
        ]));
        let agent = agent_with(provider, base_config());
        let loading = track_loading(&agent);
        let streamed = Arc::new(Mutex::new(String::new()));
        let sink = streamed.clone();
        agent.subscribe(move |event| {
            if let AgentEvent::Stream { delta, .. } = event {
                sink.lock().expect("lock").push_str(delta);
            }
        });

        agent.send_stream("say hello").await;

        let log = contents(&agent);
        assert_eq!(log.last().unwrap(), "Hello!");
        assert_eq!(*streamed.lock().expect("lock"), "Hello!");
        assert_eq!(*loading.lock().expect("lock"), vec![true, false]);
    }

    #[tokio::test]
    async fn stream_error_replaces_placeholder_with_fallback() {
        let provider = Arc::new(MockProvider::failing_stream());
        let agent = agent_with(provider, base_config().fallback_message("Oops."));
        let loading = track_loading(&agent);

        agent.send_stream("say hello").await;

        let log = contents(&agent);
        // fallback replaced the placeholder; nothing extra appended
        assert_eq!(log.last().unwrap(), "Oops.");
        assert_eq!(log.iter().filter(|c| *c == "Oops.").count(), 1);
        assert_eq!(*loading.lock().expect("lock"), vec![true, false]);
    }

    #[tokio::test]
    async fn stream_without_done_chunk_still_ends_loading() {
        let provider = Arc::new(MockProvider::streaming(vec![StreamChunk::delta("hi")]));
        let agent = agent_with(provider, base_config());
        let loading = track_loading(&agent);

        agent.send_stream("hello").await;

        assert_eq!(*loading.lock().expect("lock"), vec![true, false]);
    }

    #[tokio::test]
    async fn stream_blank_input_is_noop() {
        let provider = Arc::new(MockProvider::streaming(vec![]));
        let agent = agent_with(provider.clone(), base_config());

        agent.send_stream("  ").await;

        assert_eq!(agent.messages().len(), 1);
        assert!(provider.requests().is_empty());
    }

    #[tokio::test]
    async fn overlapping_sends_are_serialized() {
        let provider = Arc::new(MockProvider::new(vec![
            ChatResponse::text("first"),
            ChatResponse::text("second"),
        ]));
        let agent = Arc::new(agent_with(provider, base_config()));

        let a = agent.clone();
        let b = agent.clone();
        tokio::join!(a.send("one"), b.send("two"));

        let log = contents(&agent);
        // 1 seed + 2 user + 2 assistant, with each user immediately
        // followed by its own assistant reply
        assert_eq!(log.len(), 5);
        let first_user = log.iter().position(|c| c == "one" || c == "two").unwrap();
        assert!(log[first_user + 1] == "first" || log[first_user + 1] == "second");
    }
}
