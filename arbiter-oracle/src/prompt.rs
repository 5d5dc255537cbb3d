//! Prompt rendering for decision and review oracle calls.

use std::fmt::Write;

use serde_json::Value;

use crate::contract::OracleRequest;
use crate::review::ReviewRequest;

/// System instruction for the deciding oracle.
pub const DECISION_SYSTEM_PROMPT: &str = "You are an expert rule evaluator for an agentic \
    application system. Be precise, and reply with exactly one JSON object of the form \
    {\"decision\": \"ALLOWED\"|\"DENIED\"|\"ERROR\", \"reason\": string, \
    \"rule_violated\": string|null, \"confidence_score\": number between 0 and 1}. \
    Output nothing besides the JSON object.";

/// System instruction for the review oracle.
pub const REVIEW_SYSTEM_PROMPT: &str = "You are an independent auditor reviewing a decision \
    already taken by another rule evaluator. Judge only whether the decision is consistent \
    with the rules; do not re-decide the request. Reply with exactly one JSON object of the \
    form {\"verdict\": \"CLEAN\"|\"SUSPECT\", \"rationale\": string, \
    \"confidence_score\": number between 0 and 1}. Output nothing besides the JSON object.";

/// Renders the user prompt for a decision evaluation.
#[must_use]
pub fn decision_prompt(request: &OracleRequest) -> String {
    let mut prompt = String::new();

    let _ = writeln!(prompt, "**USER:** {}", request.caller());
    let _ = writeln!(prompt, "**FEATURE:** [{}]", request.feature());
    let _ = writeln!(prompt, "**ACTION:** {}", request.action());

    prompt.push_str("**PARAMETERS:**\n");
    for (name, value) in request.parameters() {
        let _ = writeln!(prompt, "- {name}: {}", format_value(value));
    }

    if !request.environment().is_empty() {
        prompt.push_str("**ENVIRONMENT:**\n");
        for (name, value) in request.environment() {
            let _ = writeln!(prompt, "- {name}: {}", format_value(value));
        }
    }

    prompt.push_str("**APPLICABLE RULES:**\n");
    for rule in request.rules() {
        let _ = writeln!(prompt, "- {rule}");
    }

    prompt.push_str(
        "\n**EVALUATION INSTRUCTIONS:**\n\
         1. Identify which rules apply to the feature and action above.\n\
         2. Check whether the provided parameters satisfy the rule conditions.\n\
         3. Consider any time, location, or other constraints mentioned in the rules.\n\
         4. Answer with the JSON decision object only.\n",
    );

    prompt
}

/// Renders the user prompt for an oversight review.
#[must_use]
pub fn review_prompt(request: &ReviewRequest) -> String {
    let mut prompt = decision_prompt(request.request());

    let decision = request.decision();
    prompt.push_str("\n**DECISION UNDER REVIEW:**\n");
    let _ = writeln!(prompt, "- outcome: {}", decision.outcome());
    let _ = writeln!(prompt, "- reason: {}", decision.reason());
    if let Some(rule) = decision.rule_violated() {
        let _ = writeln!(prompt, "- rule cited: {rule}");
    }
    let _ = writeln!(prompt, "- confidence: {}", decision.confidence_score());

    prompt.push_str(
        "\n**REVIEW INSTRUCTIONS:**\n\
         Flag the decision as SUSPECT when its outcome disagrees with the rules, its \
         reasoning is malformed, or its confidence looks unjustified; otherwise answer \
         CLEAN. Answer with the JSON verdict object only.\n",
    );

    prompt
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
