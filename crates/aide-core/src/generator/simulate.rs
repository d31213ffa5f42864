use async_trait::async_trait;

use super::{GeneratedPlan, GenerationMethod, PlanGenerator};
use crate::error::Result;
use crate::item::ActionItem;
use crate::plan::infer_domain;

/// Longest payload excerpt quoted in a simulated plan.
const QUOTE_LINES: usize = 40;

/// Deterministic template plan. Needs no backend and never fails.
pub struct SimulatedGenerator;

fn steps_for(domain: &str) -> &'static [&'static str] {
    match domain {
        "accounting" => &[
            "Identify the client, amounts, and due dates referenced in the request",
            "Draft the record under `Accounting/Transactions`",
            "Double-check totals before anything is sent",
        ],
        "email" => &[
            "Draft a reply addressing each point in the message",
            "Review recipients and tone",
            "Send once approved",
        ],
        "social" => &[
            "Draft the post text",
            "Check it against the usual voice and guidelines",
            "Publish once approved",
        ],
        _ => &[
            "Clarify the outcome the request is asking for",
            "Carry out the task",
            "Record the result",
        ],
    }
}

#[async_trait]
impl PlanGenerator for SimulatedGenerator {
    fn method(&self) -> GenerationMethod {
        GenerationMethod::Simulate
    }

    async fn generate(&self, item: &ActionItem) -> Result<GeneratedPlan> {
        let domain = infer_domain(&item.body);
        let title = item.subject.as_deref().unwrap_or(&item.name);

        let mut body = format!("# Plan: {title}\n\n");
        body.push_str(&format!(
            "Source: `{}` item `{}` (domain: {domain})\n\n",
            item.source, item.name
        ));
        body.push_str("## Request\n\n");
        let lines: Vec<&str> = item.body.lines().collect();
        for line in lines.iter().take(QUOTE_LINES) {
            body.push_str(&format!("> {line}\n"));
        }
        if lines.len() > QUOTE_LINES {
            body.push_str(&format!("> … ({} more lines)\n", lines.len() - QUOTE_LINES));
        }
        body.push_str("\n## Steps\n\n");
        for step in steps_for(domain) {
            body.push_str(&format!("- [ ] {step}\n"));
        }
        body.push_str("\nMove this file to `Approved/` to release it.\n");

        Ok(GeneratedPlan {
            body,
            method: GenerationMethod::Simulate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn quotes_request_and_picks_domain_steps() {
        let item = ActionItem::new("task_invoice.txt", "manual", "create an invoice for Client A");
        let plan = SimulatedGenerator.generate(&item).await.unwrap();
        assert!(plan.body.contains("> create an invoice for Client A"));
        assert!(plan.body.contains("domain: accounting"));
        assert!(plan.body.contains("Accounting/Transactions"));
    }

    #[tokio::test]
    async fn long_payload_is_truncated() {
        let text = (0..100).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        let item = ActionItem::new("long.txt", "manual", text);
        let plan = SimulatedGenerator.generate(&item).await.unwrap();
        assert!(plan.body.contains("(60 more lines)"));
        assert!(!plan.body.contains("line 99"));
    }
}
