use crate::config::ExtractionConfig;
use crate::error::{EngineError, Result};
use crate::models::{ExtractionOutput, RequestedItem};
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ContextItem<'a> {
    id: i64,
    name: &'a str,
    sku: Option<&'a str>,
    brand: Option<&'a str>,
    model_number: Option<&'a str>,
    quantity: i32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExtractionRequest<'a> {
    document_url: &'a str,
    requested_items: Vec<ContextItem<'a>>,
}

/// Strip a markdown code fence some providers wrap around their JSON.
fn unfence(body: &str) -> &str {
    let trimmed = body.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Classify a provider reply. Rate limits are retryable by the caller, everything else is upstream.
pub fn classify_response(status: u16, body: &str) -> Result<ExtractionOutput> {
    if status == 429 {
        return Err(EngineError::Transient(
            "extraction provider rate limited (HTTP 429)".to_string(),
        ));
    }
    if !(200..300).contains(&status) {
        return Err(EngineError::Upstream(format!(
            "extraction provider returned HTTP {}",
            status
        )));
    }
    let output: ExtractionOutput = serde_json::from_str(unfence(body))
        .map_err(|e| EngineError::Upstream(format!("unparseable extraction output: {}", e)))?;
    if output.extracted_items.is_none() {
        return Err(EngineError::Upstream(
            "extraction output has no extractedItems list".to_string(),
        ));
    }
    Ok(output)
}

/// 文档抽取服务客户端
#[derive(Debug, Clone)]
pub struct ExtractionClient {
    http: reqwest::Client,
    url: String,
}

impl ExtractionClient {
    pub fn new(config: &ExtractionConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EngineError::Upstream(format!("cannot build extraction client: {}", e)))?;
        Ok(Self {
            http,
            url: config.url.clone(),
        })
    }

    pub async fn extract(&self, document_url: &str, items: &[RequestedItem]) -> Result<ExtractionOutput> {
        let request = ExtractionRequest {
            document_url,
            requested_items: items
                .iter()
                .map(|i| ContextItem {
                    id: i.id,
                    name: &i.name,
                    sku: i.sku.as_deref(),
                    brand: i.brand.as_deref(),
                    model_number: i.model_number.as_deref(),
                    quantity: i.quantity,
                })
                .collect(),
        };

        let start = std::time::Instant::now();
        let response = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EngineError::Upstream("extraction provider timed out".to_string())
                } else {
                    EngineError::Upstream(format!("extraction provider unreachable: {}", e.without_url()))
                }
            })?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| EngineError::Upstream(format!("extraction body unreadable: {}", e.without_url())))?;

        tracing::info!(
            "Extraction call for {} requested items finished with HTTP {} in {:?}",
            items.len(),
            status,
            start.elapsed()
        );
        classify_response(status, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_is_transient() {
        let err = classify_response(429, "slow down").unwrap_err();
        assert!(matches!(err, EngineError::Transient(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn server_failure_is_upstream() {
        assert!(matches!(classify_response(503, ""), Err(EngineError::Upstream(_))));
    }

    #[test]
    fn garbage_body_is_upstream_without_echoing_content() {
        let err = classify_response(200, "SECRET PRICE LIST 123").unwrap_err();
        assert!(matches!(err, EngineError::Upstream(_)));
        assert!(!err.to_string().contains("SECRET"));
    }

    #[test]
    fn fenced_json_is_accepted() {
        let body = "```json\n{\"supplierInfo\": {}, \"extractedItems\": [{\"productName\": \"Lamp\"}]}\n```";
        let out = classify_response(200, body).unwrap();
        assert_eq!(out.extracted_items.unwrap().len(), 1);
    }

    #[test]
    fn missing_item_list_is_upstream() {
        let err = classify_response(200, r#"{"supplierInfo": {}}"#).unwrap_err();
        assert!(matches!(err, EngineError::Upstream(_)));
    }
}
