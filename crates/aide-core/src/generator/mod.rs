//! Plan generation strategies.
//!
//! The processor only needs "given an action item, produce a plan body or
//! fail". [`GenerationMethod`] selects one of:
//!
//! - `cli`: a local AI command-line tool ([`CliGenerator`])
//! - `api`: a hosted Messages-style completion API ([`HostedApiGenerator`])
//! - `auto`: cli, then api, then simulation ([`FallbackGenerator`]); never fails
//! - `simulate`: a deterministic template ([`SimulatedGenerator`])
//!
//! Every backend call is time-bounded by the generator itself, so a fallback
//! chain gives each stage its own budget.

pub mod api;
pub mod cli;
pub mod simulate;

use crate::config::Config;
use crate::error::{AideError, Result};
use crate::item::ActionItem;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

pub use api::HostedApiGenerator;
pub use cli::CliGenerator;
pub use simulate::SimulatedGenerator;

// ---------------------------------------------------------------------------
// GenerationMethod
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMethod {
    Cli,
    Api,
    #[default]
    Auto,
    Simulate,
}

impl GenerationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationMethod::Cli => "cli",
            GenerationMethod::Api => "api",
            GenerationMethod::Auto => "auto",
            GenerationMethod::Simulate => "simulate",
        }
    }
}

impl std::fmt::Display for GenerationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for GenerationMethod {
    type Err = AideError;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "cli" | "claude" => Ok(GenerationMethod::Cli),
            "api" => Ok(GenerationMethod::Api),
            "auto" | "fallback" => Ok(GenerationMethod::Auto),
            "simulate" | "simulation" => Ok(GenerationMethod::Simulate),
            _ => Err(AideError::UnknownVariant {
                what: "generation method",
                value: s.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// PlanGenerator
// ---------------------------------------------------------------------------

/// Output of a successful generation. `method` is the backend that actually
/// produced the body, which for `auto` may differ from the one configured.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedPlan {
    pub body: String,
    pub method: GenerationMethod,
}

#[async_trait]
pub trait PlanGenerator: Send + Sync {
    fn method(&self) -> GenerationMethod;

    async fn generate(&self, item: &ActionItem) -> Result<GeneratedPlan>;
}

/// Build the generator selected by `config.processor.method`.
pub fn from_config(config: &Config) -> Box<dyn PlanGenerator> {
    let timeout = Duration::from_secs(config.processor.timeout_secs);
    match config.processor.method {
        GenerationMethod::Cli => Box::new(CliGenerator::from_config(&config.generator, timeout)),
        GenerationMethod::Api => {
            Box::new(HostedApiGenerator::from_config(&config.generator, timeout))
        }
        GenerationMethod::Simulate => Box::new(SimulatedGenerator),
        GenerationMethod::Auto => Box::new(FallbackGenerator::new(
            Box::new(CliGenerator::from_config(&config.generator, timeout)),
            Box::new(HostedApiGenerator::from_config(&config.generator, timeout)),
        )),
    }
}

/// Instructions sent to AI backends ahead of the item.
pub const SYSTEM_PROMPT: &str = "You are a diligent personal assistant. \
Turn the action item below into a short, concrete execution plan in Markdown: \
a one-line summary, then a checklist of steps. Do not carry out the steps; \
a human approves the plan first.";

/// The user prompt for `item`.
pub fn prompt_for(item: &ActionItem) -> String {
    let mut prompt = format!("Action item `{}` from channel `{}`", item.name, item.source);
    if let Some(subject) = &item.subject {
        prompt.push_str(&format!(" (subject: {subject})"));
    }
    if let Some(sender) = &item.sender {
        prompt.push_str(&format!(" (from: {sender})"));
    }
    prompt.push_str(":\n\n");
    prompt.push_str(&item.body);
    prompt
}

// ---------------------------------------------------------------------------
// FallbackGenerator
// ---------------------------------------------------------------------------

/// Primary, then hosted, then simulation. Always produces a plan so that
/// demos and tests make forward progress without any backend.
pub struct FallbackGenerator {
    primary: Box<dyn PlanGenerator>,
    hosted: Box<dyn PlanGenerator>,
    last_resort: SimulatedGenerator,
}

impl FallbackGenerator {
    pub fn new(primary: Box<dyn PlanGenerator>, hosted: Box<dyn PlanGenerator>) -> Self {
        Self {
            primary,
            hosted,
            last_resort: SimulatedGenerator,
        }
    }
}

#[async_trait]
impl PlanGenerator for FallbackGenerator {
    fn method(&self) -> GenerationMethod {
        GenerationMethod::Auto
    }

    async fn generate(&self, item: &ActionItem) -> Result<GeneratedPlan> {
        for backend in [&self.primary, &self.hosted] {
            match backend.generate(item).await {
                Ok(plan) => return Ok(plan),
                Err(e) => warn!(
                    item = %item.name,
                    method = %backend.method(),
                    error = %e,
                    "generator failed, falling back"
                ),
            }
        }
        self.last_resort.generate(item).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
