use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::sanitize::extract_json_payload;
use super::types::{StructuredClient, StructuredRequest};
use super::{map_transport_error, LlmError};

/// OpenAI-compatible chat completions client with `json_schema` output.
///
/// With an `api_version` the client speaks the Azure dialect: the model
/// name is the deployment, auth uses the `api-key` header and the version
/// goes in the query string.
pub struct OpenAiClient {
    base_url: String,
    model: String,
    api_key: String,
    api_version: Option<String>,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl OpenAiClient {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: Option<&str>,
        api_version: Option<&str>,
        timeout_secs: u64,
    ) -> Result<Self, LlmError> {
        let api_key = api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| LlmError::MissingCredentials("CONCORD_LLM_API_KEY".into()))?;

        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| LlmError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
            api_version: api_version.map(str::to_string),
            client,
            timeout_secs,
        })
    }

    fn endpoint(&self) -> String {
        match &self.api_version {
            Some(version) => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                self.base_url, self.model, version
            ),
            None => format!("{}/chat/completions", self.base_url),
        }
    }

    fn is_azure(&self) -> bool {
        self.api_version.is_some()
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    response_format: Value,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

fn response_format(request: &StructuredRequest) -> Value {
    json!({
        "type": "json_schema",
        "json_schema": {
            "name": request.schema_name,
            "strict": false,
            "schema": request.schema,
        }
    })
}

impl StructuredClient for OpenAiClient {
    fn complete(&self, request: &StructuredRequest) -> Result<Value, LlmError> {
        let body = ChatCompletionRequest {
            model: (!self.is_azure()).then_some(self.model.as_str()),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            temperature: 0.0,
            response_format: response_format(request),
        };

        let builder = self.client.post(self.endpoint()).json(&body);
        let builder = if self.is_azure() {
            builder.header("api-key", &self.api_key)
        } else {
            builder.bearer_auth(&self.api_key)
        };

        let response = builder
            .send()
            .map_err(|e| map_transport_error(e, &self.base_url, self.timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .map_err(|e| LlmError::MalformedResponse(e.to_string()))?;

        let message = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| LlmError::MalformedResponse("no choices returned".into()))?;

        if let Some(refusal) = message.refusal {
            return Err(LlmError::MalformedResponse(format!("model refused: {refusal}")));
        }
        let content = message
            .content
            .ok_or_else(|| LlmError::MalformedResponse("empty message content".into()))?;

        tracing::debug!(
            schema = %request.schema_name,
            model = %self.model,
            azure = self.is_azure(),
            "Chat completion structured call completed"
        );
        extract_json_payload(&content)
    }

    fn describe(&self) -> String {
        if self.is_azure() {
            format!("azure:{}", self.model)
        } else {
            format!("openai:{}", self.model)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> StructuredRequest {
        StructuredRequest {
            system: "s".into(),
            user: "u".into(),
            schema_name: "category_output".into(),
            schema: json!({"type": "object"}),
        }
    }

    #[test]
    fn missing_key_is_rejected() {
        let err = OpenAiClient::new("https://api.openai.com/v1", "gpt-4o-mini", None, None, 30)
            .err()
            .unwrap();
        assert!(matches!(err, LlmError::MissingCredentials(_)));
        assert!(OpenAiClient::new("https://x", "m", Some("  "), None, 30).is_err());
    }

    #[test]
    fn openai_endpoint() {
        let client = OpenAiClient::new("https://api.openai.com/v1/", "gpt-4o-mini", Some("k"), None, 30).unwrap();
        assert_eq!(client.endpoint(), "https://api.openai.com/v1/chat/completions");
        assert_eq!(client.describe(), "openai:gpt-4o-mini");
    }

    #[test]
    fn azure_endpoint_uses_deployment_and_version() {
        let client = OpenAiClient::new(
            "https://acme.openai.azure.com",
            "report-gpt",
            Some("k"),
            Some("2024-08-01-preview"),
            30,
        )
        .unwrap();
        assert_eq!(
            client.endpoint(),
            "https://acme.openai.azure.com/openai/deployments/report-gpt/chat/completions?api-version=2024-08-01-preview"
        );
        assert_eq!(client.describe(), "azure:report-gpt");
    }

    #[test]
    fn response_format_wraps_schema() {
        let format = response_format(&request());
        assert_eq!(format["type"], "json_schema");
        assert_eq!(format["json_schema"]["name"], "category_output");
        assert_eq!(format["json_schema"]["schema"]["type"], "object");
    }

    #[test]
    fn azure_body_omits_model() {
        let body = ChatCompletionRequest {
            model: None,
            messages: vec![],
            temperature: 0.0,
            response_format: response_format(&request()),
        };
        let value = serde_json::to_value(&body).unwrap();
        assert!(value.get("model").is_none());
    }
}
