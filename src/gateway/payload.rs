//! Wire types for the Ark chat-completions endpoint.

use base64::{engine::general_purpose, Engine};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: Vec<ContentPart>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub message: ResponseMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatCompletionResponse {
    /// Text of the first choice, if the provider returned any
    pub fn first_content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
            .filter(|content| !content.trim().is_empty())
    }
}

/// `data:image/{format};base64,{payload}`
pub fn image_data_uri(image_format: &str, image_bytes: &[u8]) -> String {
    format!(
        "data:image/{};base64,{}",
        image_format,
        general_purpose::STANDARD.encode(image_bytes)
    )
}

impl ChatCompletionRequest {
    /// Single user message: prompt text first, then the image
    pub fn multimodal(
        model: &str,
        prompt: &str,
        image_format: &str,
        image_bytes: &[u8],
        temperature: f32,
        max_tokens: u32,
    ) -> Self {
        Self {
            model: model.to_string(),
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::Text {
                        text: prompt.to_string(),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: image_data_uri(image_format, image_bytes),
                        },
                    },
                ],
            }],
            temperature,
            max_tokens,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_data_uri() {
        assert_eq!(image_data_uri("png", b"hi"), "data:image/png;base64,aGk=");
    }

    #[test]
    fn test_request_shape() {
        let request =
            ChatCompletionRequest::multimodal("vision-model", "describe", "jpeg", b"hi", 0.2, 4096);
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["model"], "vision-model");
        assert_eq!(value["max_tokens"], 4096);
        assert_eq!(
            value["messages"][0]["content"],
            json!([
                { "type": "text", "text": "describe" },
                { "type": "image_url", "image_url": { "url": "data:image/jpeg;base64,aGk=" } }
            ])
        );
        assert_eq!(value["messages"][0]["role"], "user");
    }

    #[test]
    fn test_response_content_extraction() {
        let response: ChatCompletionResponse = serde_json::from_value(json!({
            "id": "chatcmpl-1",
            "choices": [{ "index": 0, "message": { "role": "assistant", "content": "Three services." } }]
        }))
        .unwrap();
        assert_eq!(response.first_content(), Some("Three services."));

        let empty: ChatCompletionResponse =
            serde_json::from_value(json!({ "choices": [] })).unwrap();
        assert_eq!(empty.first_content(), None);

        let blank: ChatCompletionResponse = serde_json::from_value(json!({
            "choices": [{ "message": { "content": "  " } }]
        }))
        .unwrap();
        assert_eq!(blank.first_content(), None);
    }
}
