use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::models::SyncError;
use crate::services::translate_service::{TextProvider, Translation};

/// Client for a LibreTranslate-compatible HTTP endpoint.
#[derive(Debug)]
pub struct TranslateClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TranslateResponse {
    translated_text: String,
    detected_language: Option<DetectedLanguage>,
}

#[derive(Debug, Deserialize)]
struct DetectedLanguage {
    language: String,
}

impl TranslateClient {
    pub fn new(base_url: String, api_key: Option<String>) -> Result<Self, SyncError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn request(&self, text: &str, target_lang: &str) -> Result<Translation, SyncError> {
        let url = format!("{}/translate", self.base_url);
        let body = TranslateRequest {
            q: text,
            source: "auto",
            target: target_lang,
            format: "text",
            api_key: self.api_key.as_deref(),
        };

        let response = self.client.post(&url).json(&body).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            error!("Translation provider answered {} for target {}", status, target_lang);
            return Err(SyncError::Provider(format!("Provider returned {}", status)));
        }

        let parsed: TranslateResponse = response.json().await?;
        info!("Translated {} chars to {}", text.len(), target_lang);
        Ok(Translation {
            translated_text: parsed.translated_text,
            source_lang: parsed
                .detected_language
                .map(|d| d.language)
                .unwrap_or_else(|| "auto".to_string()),
            target_lang: target_lang.to_string(),
        })
    }
}

impl TextProvider for TranslateClient {
    fn translate<'a>(&'a self, text: &'a str, target_lang: &'a str) -> BoxFuture<'a, Result<Translation, SyncError>> {
        self.request(text, target_lang).boxed()
    }
}
