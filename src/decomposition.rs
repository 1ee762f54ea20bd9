use crate::config::DecompositionConfig;
use crate::errors::{AppError, AppResult};
use crate::models::{Decomposition, Todo};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use std::future::Future;
use std::pin::Pin;

pub type DecomposeFuture<'a> = Pin<Box<dyn Future<Output = AppResult<Decomposition>> + Send + 'a>>;

/// Turns a free-text resource into a Todo with nested issues.
pub trait DecompositionClient: Send + Sync {
    fn decompose<'a>(&'a self, resource: &'a str) -> DecomposeFuture<'a>;
}

static CODE_FENCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^\s*```[A-Za-z0-9_-]*\s*(.*?)\s*```\s*$").expect("valid code fence regex")
});

/// Type checks for decomposed output. Every field is optional.
static TODO_OUTPUT_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "type": "object",
        "properties": {
            "title": { "type": ["string", "null"] },
            "summary": { "type": ["string", "null"] },
            "created_at": { "type": ["string", "null"] },
            "issues": {
                "type": ["array", "null"],
                "items": {
                    "type": "object",
                    "properties": {
                        "title": { "type": ["string", "null"] },
                        "description": { "type": ["string", "null"] },
                        "progression": { "enum": [0, 1, 2] },
                        "estimated_working_hours": { "type": ["number", "null"] }
                    }
                }
            }
        }
    })
});

pub fn build_prompt(resource: &str) -> String {
    format!(
        r##"Below is a problem or situation that needs to be handled. Break it down into the attached structure: one TODO made of concrete issues.

Fields:
- title: short title of the situation
- summary: concise summary of the situation
- issues: the issues needed to resolve it
    - title: name of the issue
    - description: how to approach or resolve the issue
    - estimated_working_hours: estimated hours of work for the issue

Fill every field. Do not repeat issues. Respond with raw JSON only.

Input:
```
{}
```"##,
        resource
    )
}

/// Response schema in the generateContent structured-output dialect.
pub fn gemini_response_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "title": { "type": "STRING", "description": "The main title of the output." },
            "summary": { "type": "STRING", "description": "A brief summary." },
            "issues": {
                "type": "ARRAY",
                "description": "A list of identified issues.",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "title": { "type": "STRING", "description": "Title of the issue." },
                        "description": { "type": "STRING", "description": "Detailed description of the issue." },
                        "estimated_working_hours": { "type": "INTEGER", "description": "Estimated hours to resolve the issue." }
                    },
                    "required": ["title", "description"],
                    "propertyOrdering": ["title", "description", "estimated_working_hours"]
                }
            }
        },
        "required": ["title", "summary", "issues"],
        "propertyOrdering": ["title", "summary", "issues"]
    })
}

/// Concatenates `candidates[0].content.parts[*].text`.
pub fn extract_candidate_text(response: &Value) -> AppResult<String> {
    let content = response
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
        .and_then(|candidate| candidate.get("content"))
        .ok_or_else(|| AppError::Decomposition("response has no candidate content".to_string()))?;

    let parts = content
        .get("parts")
        .and_then(Value::as_array)
        .ok_or_else(|| AppError::Decomposition("candidate content has no parts".to_string()))?;

    Ok(parts
        .iter()
        .filter_map(|part| part.get("text"))
        .filter_map(Value::as_str)
        .collect::<Vec<_>>()
        .join(""))
}

/// Parses model output (optionally wrapped in a code fence) into a `Todo`.
pub fn parse_decomposed_todo(text: &str) -> AppResult<Todo> {
    let unfenced = CODE_FENCE_RE
        .captures(text)
        .and_then(|captures| captures.get(1))
        .map(|body| body.as_str())
        .unwrap_or(text)
        .trim();
    if unfenced.is_empty() {
        return Err(AppError::Decomposition("model returned no output".to_string()));
    }

    let value: Value = serde_json::from_str(unfenced)
        .map_err(|error| AppError::Decomposition(format!("output is not JSON: {}", error)))?;

    let compiled = jsonschema::JSONSchema::compile(&TODO_OUTPUT_SCHEMA)
        .map_err(|error| AppError::Internal(format!("invalid todo output schema: {}", error)))?;
    if let Err(errors) = compiled.validate(&value) {
        let details = errors
            .map(|error| {
                let path = error.instance_path.to_string();
                if path.is_empty() {
                    error.to_string()
                } else {
                    format!("{}: {}", path, error)
                }
            })
            .collect::<Vec<_>>()
            .join("; ");
        return Err(AppError::Decomposition(format!("output did not match schema: {}", details)));
    }

    serde_json::from_value(value).map_err(|error| AppError::Decomposition(error.to_string()))
}

#[derive(Debug, Clone)]
pub struct GeminiClient {
    config: DecompositionConfig,
    http: reqwest::Client,
}

impl GeminiClient {
    pub fn new(config: DecompositionConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    pub fn endpoint(&self) -> String {
        format!(
            "{}/{}:generateContent",
            self.config.api_base_url.trim_end_matches('/'),
            self.config.model
        )
    }

    pub fn request_body(&self, resource: &str) -> Value {
        json!({
            "contents": [{ "parts": [{ "text": build_prompt(resource) }] }],
            "generationConfig": {
                "temperature": self.config.temperature,
                "maxOutputTokens": self.config.max_output_tokens,
                "topK": self.config.top_k,
                "topP": self.config.top_p,
                "response_mime_type": "application/json",
                "response_schema": gemini_response_schema()
            }
        })
    }

    async fn run(&self, resource: &str) -> AppResult<Decomposition> {
        if resource.trim().is_empty() {
            return Err(AppError::Decomposition("resource text is empty".to_string()));
        }

        tracing::info!(
            model = %self.config.model,
            chars = resource.chars().count(),
            "requesting decomposition"
        );
        let response: Value = self
            .http
            .post(self.endpoint())
            .query(&[("key", self.config.api_token.as_str())])
            .json(&self.request_body(resource))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let text = extract_candidate_text(&response)?;
        let todo = parse_decomposed_todo(&text).inspect_err(|error| {
            tracing::error!(error = %error, "failed to parse decomposition output");
        })?;
        let model = response
            .get("modelVersion")
            .and_then(Value::as_str)
            .unwrap_or(self.config.model.as_str())
            .to_string();

        tracing::info!(model = %model, issues = todo.issues.len(), "decomposition parsed");
        Ok(Decomposition { model, todo })
    }
}

impl DecompositionClient for GeminiClient {
    fn decompose<'a>(&'a self, resource: &'a str) -> DecomposeFuture<'a> {
        Box::pin(self.run(resource))
    }
}
