//! Template oracles backed by a chat-completion API.
//!
//! [`OpenAIOracle`] sends each sample group to `{api_base}/chat/completions`
//! with a single `compile` function tool and returns both the tool-call
//! arguments and the raw message content, leaving decoding to the pipeline.
//! [`DisabledOracle`] refuses every request.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

use logmine_core::extract::{InferenceReply, TemplateOracle};

use crate::config::InferenceConfig;
use crate::http::post_json;

const SYSTEM_PROMPT: &str = "You are a senior regular expression developer. \
Create a regular expression which matches, groups and extracts the template of the log lines below. \
Text that is exactly the same in every line is part of the template; \
text that varies between lines must be captured by a group. \
The pattern must start with `^` and end with `$`. \
Use Rust `regex` syntax: lookaround and backreferences are not supported. \
Answer by calling the `compile` function.";

/// Oracle used when `inference.provider = "disabled"`.
pub struct DisabledOracle;

#[async_trait]
impl TemplateOracle for DisabledOracle {
    async fn infer(&self, _samples: &[String]) -> Result<InferenceReply> {
        bail!("Template inference is disabled")
    }
}

/// OpenAI-compatible chat completion oracle.
///
/// Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAIOracle {
    config: InferenceConfig,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAIOracle {
    pub fn new(config: &InferenceConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            anyhow::anyhow!(
                "OPENAI_API_KEY environment variable not set (required by inference.provider = \"openai\")"
            )
        })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            config: config.clone(),
            api_key,
            client,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.api_base.trim_end_matches('/'))
    }
}

/// Build the chat-completion request body for one sample group.
pub fn request_body(config: &InferenceConfig, samples: &[String]) -> serde_json::Value {
    serde_json::json!({
        "model": config.model,
        "temperature": config.temperature,
        "max_tokens": config.max_tokens,
        "messages": [
            { "role": "system", "content": SYSTEM_PROMPT },
            { "role": "user", "content": samples.join("\n") }
        ],
        "tools": [{
            "type": "function",
            "function": {
                "name": "compile",
                "description": "Compile a regular expression pattern into a regular expression object.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "pattern": {
                            "type": "string",
                            "description": "regular expression"
                        }
                    },
                    "required": ["pattern"]
                }
            }
        }]
    })
}

/// Pull call arguments and content out of `choices[0].message`.
///
/// Both the `tool_calls` shape and the legacy `function_call` shape are
/// understood.
pub fn parse_reply(json: &serde_json::Value) -> Result<InferenceReply> {
    let message = json
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .ok_or_else(|| anyhow::anyhow!("Invalid completion response: missing choices[0].message"))?;

    let tool_args = message
        .get("tool_calls")
        .and_then(|t| t.as_array())
        .and_then(|calls| {
            calls.iter().find_map(|call| {
                call.get("function")
                    .and_then(|f| f.get("arguments"))
                    .and_then(|a| a.as_str())
            })
        });
    let function_args = message
        .get("function_call")
        .and_then(|f| f.get("arguments"))
        .and_then(|a| a.as_str());

    Ok(InferenceReply {
        call_arguments: tool_args.or(function_args).map(String::from),
        content: message
            .get("content")
            .and_then(|c| c.as_str())
            .map(String::from),
    })
}

#[async_trait]
impl TemplateOracle for OpenAIOracle {
    async fn infer(&self, samples: &[String]) -> Result<InferenceReply> {
        let body = request_body(&self.config, samples);
        let url = self.endpoint();
        let json = post_json("Completion API", self.config.max_retries, || {
            self.client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
        })
        .await?;

        let reply = parse_reply(&json)?;
        info!("got reply: {:?}", reply);
        Ok(reply)
    }
}

/// Create the oracle named by `inference.provider`.
pub fn create_oracle(config: &InferenceConfig) -> Result<Box<dyn TemplateOracle>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledOracle)),
        "openai" => Ok(Box::new(OpenAIOracle::new(config)?)),
        other => bail!("Unknown inference provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_carries_samples_and_tool() {
        let config = InferenceConfig::default();
        let samples = vec!["a 1".to_string(), "a 2".to_string()];
        let body = request_body(&config, &samples);
        assert_eq!(body["model"], "gpt-4");
        assert_eq!(body["max_tokens"], 512);
        assert_eq!(body["messages"][1]["content"], "a 1\na 2");
        assert_eq!(body["tools"][0]["function"]["name"], "compile");
        let system = body["messages"][0]["content"].as_str().unwrap();
        assert!(system.contains("lookaround"));
        assert_eq!(
            body["tools"][0]["function"]["parameters"]["required"][0],
            "pattern"
        );
    }

    #[test]
    fn test_parse_tool_call_reply() {
        let json = serde_json::json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "type": "function",
                        "function": { "name": "compile", "arguments": "{\"pattern\": \"^a (\\\\d+)$\"}" }
                    }]
                }
            }]
        });
        let reply = parse_reply(&json).unwrap();
        assert_eq!(
            reply.call_arguments.as_deref(),
            Some("{\"pattern\": \"^a (\\\\d+)$\"}")
        );
        assert_eq!(reply.content, None);
    }

    #[test]
    fn test_parse_legacy_function_call_and_content() {
        let json = serde_json::json!({
            "choices": [{
                "message": {
                    "content": "{\"pattern\": \"^b$\"}",
                    "function_call": { "name": "compile", "arguments": "{}" }
                }
            }]
        });
        let reply = parse_reply(&json).unwrap();
        assert_eq!(reply.call_arguments.as_deref(), Some("{}"));
        assert_eq!(reply.content.as_deref(), Some("{\"pattern\": \"^b$\"}"));
    }

    #[test]
    fn test_parse_reply_without_choices() {
        assert!(parse_reply(&serde_json::json!({ "error": "nope" })).is_err());
    }

    #[tokio::test]
    async fn test_disabled_oracle() {
        let oracle = create_oracle(&InferenceConfig {
            provider: "disabled".into(),
            ..Default::default()
        })
        .unwrap();
        assert!(oracle.infer(&["x".to_string()]).await.is_err());
    }
}
