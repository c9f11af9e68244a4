use application::{ApplicationError, SentimentAnalyzer};
use async_trait::async_trait;
use domain::Sentiment;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};

#[derive(Serialize)]
struct AnalyzeRequest<'a> {
    text: &'a str,
}

/// The service may return extra fields (topics, aspects); only the label matters here.
#[derive(Deserialize, Debug)]
struct AnalyzeResponse {
    sentiment: Option<String>,
}

/// Client for an external classification service exposing `POST /analyze`.
#[derive(Debug, Clone)]
pub struct HttpSentimentAnalyzer {
    client: Client,
    endpoint: String,
}

impl HttpSentimentAnalyzer {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApplicationError> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            ApplicationError::InfrastructureError(format!("Failed to create HTTP client: {}", e))
        })?;
        Ok(Self {
            client,
            endpoint: format!("{}/analyze", base_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn label_from_response(body: AnalyzeResponse) -> Result<Sentiment, ApplicationError> {
    let label = body.sentiment.ok_or_else(|| {
        ApplicationError::SentimentError("Response carried no sentiment label".to_string())
    })?;
    Sentiment::from_label(&label).map_err(|e| ApplicationError::SentimentError(e.to_string()))
}

#[async_trait]
impl SentimentAnalyzer for HttpSentimentAnalyzer {
    #[instrument(skip(self, text), fields(endpoint = %self.endpoint, text_len = text.len()))]
    async fn analyze(&self, text: &str) -> Result<Sentiment, ApplicationError> {
        debug!("Requesting sentiment from external service");
        let response = self
            .client
            .post(&self.endpoint)
            .json(&AnalyzeRequest { text })
            .send()
            .await
            .map_err(|e| {
                warn!("Sentiment service unreachable: {}", e);
                ApplicationError::SentimentError(format!("Request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(%status, "Sentiment service returned an error status");
            return Err(ApplicationError::SentimentError(format!(
                "Service responded with {}",
                status
            )));
        }

        let body: AnalyzeResponse = response.json().await.map_err(|e| {
            ApplicationError::SentimentError(format!("Malformed response: {}", e))
        })?;
        label_from_response(body)
    }
}
