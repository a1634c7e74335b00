use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use super::{ClassifierError, PhotoClassifier};
use crate::blob::DataUri;
use crate::model::overtime::PersonVerdict;

const ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/models";

const PROMPT: &str = "You are an expert AI that specializes in validating whether a photo is of a person.

You will be provided a photo, and you will determine whether or not the photo is of a person.

If the photo is of a person, set isPerson to true, otherwise set it to false.
Also, set the confidence level that the photo is of a person (0-1).";

/// Gemini `generateContent` with a JSON response schema.
pub struct GeminiClassifier {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl GeminiClassifier {
    pub fn new(api_key: String, model: String) -> Self {
        Self::with_endpoint(api_key, model, ENDPOINT.to_string())
    }

    pub fn with_endpoint(api_key: String, model: String, endpoint: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_key,
            model,
            endpoint,
        }
    }

    fn request_body(photo: &DataUri, encoded: &str) -> serde_json::Value {
        json!({
            "contents": [{
                "parts": [
                    { "text": PROMPT },
                    { "inline_data": { "mime_type": photo.mime, "data": encoded } }
                ]
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": {
                    "type": "OBJECT",
                    "properties": {
                        "isPerson": { "type": "BOOLEAN" },
                        "confidence": { "type": "NUMBER" }
                    },
                    "required": ["isPerson", "confidence"]
                }
            }
        })
    }
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    text: Option<String>,
}

/// Pulls the structured verdict out of a `generateContent` response body.
pub fn parse_response(body: &serde_json::Value) -> Result<PersonVerdict, ClassifierError> {
    let response: GenerateResponse = serde_json::from_value(body.clone())
        .map_err(|e| ClassifierError::Response(e.to_string()))?;

    let text = response
        .candidates
        .into_iter()
        .filter_map(|c| c.content)
        .flat_map(|c| c.parts)
        .find_map(|p| p.text)
        .ok_or_else(|| ClassifierError::Response("no candidate text".into()))?;

    let mut verdict: PersonVerdict = serde_json::from_str(text.trim())
        .map_err(|e| ClassifierError::Response(format!("bad verdict json: {}", e)))?;
    if !verdict.confidence.is_finite() {
        return Err(ClassifierError::Response("confidence is not a number".into()));
    }
    verdict.confidence = verdict.confidence.clamp(0.0, 1.0);
    Ok(verdict)
}

#[async_trait]
impl PhotoClassifier for GeminiClassifier {
    #[instrument(name = "gemini_classify_photo", skip_all, fields(model = %self.model))]
    async fn classify(&self, photo_data_uri: &str) -> Result<PersonVerdict, ClassifierError> {
        let photo =
            DataUri::parse(photo_data_uri).map_err(|e| ClassifierError::Request(e.to_string()))?;
        let encoded = photo_data_uri
            .split_once(',')
            .map(|(_, data)| data)
            .unwrap_or_default();

        let url = format!("{}/{}:generateContent", self.endpoint, self.model);
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&Self::request_body(&photo, encoded))
            .send()
            .await
            .map_err(|e| ClassifierError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClassifierError::Request(format!("status={}", status)));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ClassifierError::Response(e.to_string()))?;

        let verdict = parse_response(&body)?;
        debug!(
            is_person = verdict.is_person,
            confidence = verdict.confidence,
            "Photo classified"
        );
        Ok(verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_verdict_from_candidate_text() {
        let body = json!({
            "candidates": [{
                "content": {
                    "parts": [{ "text": "{\"isPerson\": true, \"confidence\": 0.97}" }],
                    "role": "model"
                },
                "finishReason": "STOP"
            }]
        });
        let verdict = parse_response(&body).unwrap();
        assert!(verdict.is_person);
        assert!((verdict.confidence - 0.97).abs() < f64::EPSILON);
    }

    #[test]
    fn clamps_out_of_range_confidence() {
        let body = json!({
            "candidates": [{ "content": { "parts": [{ "text": "{\"isPerson\": false, \"confidence\": 1.4}" }] } }]
        });
        assert_eq!(parse_response(&body).unwrap().confidence, 1.0);
    }

    #[test]
    fn blocked_prompt_has_no_candidates() {
        let body = json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        assert!(matches!(
            parse_response(&body),
            Err(ClassifierError::Response(_))
        ));
    }

    #[test]
    fn request_carries_inline_image() {
        let photo = DataUri::parse("data:image/jpeg;base64,/9j/4AAQ").unwrap();
        let body = GeminiClassifier::request_body(&photo, "/9j/4AAQ");
        let image = &body["contents"][0]["parts"][1]["inline_data"];
        assert_eq!(image["mime_type"], "image/jpeg");
        assert_eq!(image["data"], "/9j/4AAQ");
        assert_eq!(
            body["generationConfig"]["responseMimeType"],
            "application/json"
        );
    }
}
