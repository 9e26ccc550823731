//! Routing policy: pure first-match evaluation of forced tool choices.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::provider::types::{Message, ToolChoice};

/// Input to routing evaluation: the user utterance plus history at the
/// moment of the send.
pub struct RoutingInput<'a> {
    pub text: &'a str,
    pub history: &'a [Message],
}

/// Predicate over routing input.
pub type RouteMatcher = Arc<dyn Fn(&RoutingInput<'_>) -> bool + Send + Sync>;

/// One ordered routing rule. First matching rule wins.
pub struct RoutingRule {
    pub matcher: RouteMatcher,
    /// Tool to force when the rule matches. `None` means "match but keep
    /// auto", which stops evaluation of later rules.
    pub force_tool: Option<String>,
    /// Label used in dry-run and evaluation logs.
    pub label: String,
}

impl RoutingRule {
    pub fn new<F>(label: impl Into<String>, matcher: F, force_tool: Option<String>) -> Self
    where
        F: Fn(&RoutingInput<'_>) -> bool + Send + Sync + 'static,
    {
        Self {
            matcher: Arc::new(matcher),
            force_tool,
            label: label.into(),
        }
    }

    /// Case-insensitive substring rule forcing `tool`.
    pub fn keyword(needle: impl Into<String>, tool: impl Into<String>) -> Self {
        let needle = needle.into().to_lowercase();
        let tool = tool.into();
        let label = format!("keyword:{needle}");
        Self::new(
            label,
            move |input| input.text.to_lowercase().contains(&needle),
            Some(tool),
        )
    }
}

impl std::fmt::Debug for RoutingRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingRule")
            .field("label", &self.label)
            .field("force_tool", &self.force_tool)
            .finish()
    }
}

/// Ordered rule list mapping input to a forced tool choice or auto.
#[derive(Debug, Default)]
pub struct RoutingPolicy {
    pub rules: Vec<RoutingRule>,
    /// When set, rules are evaluated and outcomes logged, but the returned
    /// choice is always `Auto`.
    pub dry_run: bool,
}

impl RoutingPolicy {
    pub fn new(rules: Vec<RoutingRule>) -> Self {
        Self {
            rules,
            dry_run: false,
        }
    }

    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    /// Evaluate the policy. Pure: no state is mutated.
    ///
    /// Returns `Auto` when the rule list is empty, no rule matches, or every
    /// matching attempt panics — a broken rule must never take down a send.
    pub fn evaluate(&self, input: &RoutingInput<'_>) -> ToolChoice {
        for rule in &self.rules {
            let matched = catch_unwind(AssertUnwindSafe(|| (rule.matcher)(input)));
            let matched = match matched {
                Ok(m) => m,
                Err(_) => {
                    warn!(rule = %rule.label, "routing rule panicked, skipping");
                    continue;
                }
            };
            if !matched {
                continue;
            }

            let choice = match &rule.force_tool {
                Some(name) => ToolChoice::Tool { name: name.clone() },
                None => ToolChoice::Auto,
            };
            if self.dry_run {
                debug!(rule = %rule.label, choice = ?choice, "routing dry-run match");
                return ToolChoice::Auto;
            }
            debug!(rule = %rule.label, choice = ?choice, "routing rule matched");
            return choice;
        }
        ToolChoice::Auto
    }
}
