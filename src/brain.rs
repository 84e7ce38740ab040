// src/brain.rs
// FUSION CORE - NEURAL ENGINE BRIDGE
// Drives the Anthropic Messages API tool-calling loop over plain HTTP.
// The loop is synchronous; the HTTP handler runs it on the blocking pool.

use serde_json::{json, Value};
use std::time::{Duration, Instant};

use crate::tools::ToolRegistry;

const ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const MAX_TOKENS: usize = 2000;

// Soft budget for one research run; checked between tool rounds only,
// the round in flight is never interrupted.
const EXECUTION_BUDGET: Duration = Duration::from_secs(30);
const MAX_TOOL_ROUNDS: usize = 8;

const SYSTEM_PROMPT: &str = "\
You are a comprehensive research assistant that generates detailed, well-structured research summaries.

IMPORTANT INSTRUCTIONS:
1. Create a COMPREHENSIVE summary with multiple sections and subsections
2. Use clear headings with numbers (1., 2., etc.) and subheadings with letters or bullets
3. Include detailed explanations, not just brief overviews
4. The summary should be AT LEAST 300-500 words
5. Include specific examples, steps, or strategies where relevant

CRITICAL FORMATTING RULES:
- DO NOT use any Markdown symbols inside the summary (no **, __, ##, ###, etc.)
- Use only plain text with numbers, letters, dashes, indentation and line breaks

TOOL USAGE:
- Use wikipedia for foundational knowledge
- Use search for current information when available
- If search fails, rely on your training knowledge to provide comprehensive answers
- DO NOT use the save_text_to_file tool during research

Even if tools return limited results, you should still provide a comprehensive,
detailed answer based on your training knowledge about the topic.

FINAL OUTPUT FORMAT:
Respond with exactly one JSON object and no other text:
{\"topic\": \"<the research topic>\", \"summary\": \"<the plain-text summary>\", \"sources\": [\"<source>\", ...], \"tools_used\": [\"<tool name>\", ...]}";

const FINAL_ANSWER_NUDGE: &str =
    "Stop researching and produce the final JSON answer now, without calling any more tools.";

/// The narrow seam between the HTTP pipeline and the model: one research
/// query in, raw model output (or a failure description) out. The handler
/// tests substitute a deterministic stand-in for the live brain.
pub trait ResearchEngine: Send + Sync {
    fn invoke(&self, query: &str, history: &[Value]) -> Result<Value, String>;
}

pub struct AgentBrain {
    http: ureq::Agent,
    api_key: String,
    model: String,
    tools: ToolRegistry,
}

impl AgentBrain {
    /// Constructed once at process start. Missing credentials are a startup
    /// failure, not a per-request one.
    pub fn new(tools: ToolRegistry) -> Self {
        println!("🧠 BRAIN: Waking up Neural Engine (Claude + Tools)...");

        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .expect("ANTHROPIC_API_KEY is not set. Add it to your environment or .env file.");
        let model =
            std::env::var("ANTHROPIC_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        let http = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(60))
            .build();

        println!("✅ BRAIN: Neural Engine Online | Model: {}", model);
        Self {
            http,
            api_key,
            model,
            tools,
        }
    }

    fn run_agent_loop(&self, query: &str, history: &[Value]) -> Result<Value, String> {
        let started = Instant::now();
        let mut messages: Vec<Value> = history.to_vec();
        messages.push(json!({ "role": "user", "content": query }));

        for round in 1..=MAX_TOOL_ROUNDS {
            let closing = started.elapsed() >= EXECUTION_BUDGET || round == MAX_TOOL_ROUNDS;
            if closing {
                println!("⏱️  BRAIN: Budget spent, requesting the final answer");
                messages.push(json!({ "role": "user", "content": FINAL_ANSWER_NUDGE }));
            }

            let body =
                build_request_body(&self.model, SYSTEM_PROMPT, &messages, self.tools.specs());
            let response = self.post_messages(&body)?;

            let content = response
                .get("content")
                .cloned()
                .unwrap_or_else(|| json!([]));
            let stop_reason = response
                .get("stop_reason")
                .and_then(Value::as_str)
                .unwrap_or("");

            if closing || stop_reason != "tool_use" {
                return Ok(content);
            }

            // Execute every tool the model asked for, then hand the
            // results back as tool_result blocks.
            let mut tool_results: Vec<Value> = Vec::new();
            if let Some(blocks) = content.as_array() {
                for block in blocks {
                    if block.get("type").and_then(Value::as_str) != Some("tool_use") {
                        continue;
                    }
                    let id = block.get("id").and_then(Value::as_str).unwrap_or_default();
                    let name = block.get("name").and_then(Value::as_str).unwrap_or_default();
                    let input = block.get("input").cloned().unwrap_or(Value::Null);

                    println!("🛠️  BRAIN: Round {} -> tool '{}'", round, name);
                    let output = self.tools.run(name, &input);

                    tool_results.push(json!({
                        "type": "tool_result",
                        "tool_use_id": id,
                        "content": output,
                    }));
                }
            }

            messages.push(json!({ "role": "assistant", "content": content }));
            messages.push(json!({ "role": "user", "content": tool_results }));
        }

        Err("Agent exceeded the maximum number of tool rounds".to_string())
    }

    fn post_messages(&self, body: &Value) -> Result<Value, String> {
        let response = self
            .http
            .post(ANTHROPIC_URL)
            .set("x-api-key", &self.api_key)
            .set("anthropic-version", ANTHROPIC_VERSION)
            .set("content-type", "application/json")
            .send_json(body);

        match response {
            Ok(res) => res
                .into_json::<Value>()
                .map_err(|e| format!("Failed to decode Messages API response: {}", e)),
            Err(ureq::Error::Status(code, res)) => {
                let detail = res.into_string().unwrap_or_default();
                Err(format!("Messages API returned HTTP {}: {}", code, detail))
            }
            Err(e) => Err(format!("Messages API request failed: {}", e)),
        }
    }
}

impl ResearchEngine for AgentBrain {
    fn invoke(&self, query: &str, history: &[Value]) -> Result<Value, String> {
        self.run_agent_loop(query, history)
    }
}

fn build_request_body(model: &str, system: &str, messages: &[Value], tools: Vec<Value>) -> Value {
    let mut body = json!({
        "model": model,
        "max_tokens": MAX_TOKENS,
        "system": system,
        "messages": messages,
    });

    if !tools.is_empty() {
        body["tools"] = Value::Array(tools);
    }

    body
}
