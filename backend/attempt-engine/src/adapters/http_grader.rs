use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::models::grading::{DispatchReceipt, GradingRequest};
use crate::ports::GraderClient;

/// Client of the external grading service.
///
/// The grader answers with a receipt right away and posts the score back to
/// `/api/v1/grader/callback` later.
pub struct HttpGraderClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpGraderClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("Failed to build grader HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn gradings_url(&self) -> String {
        format!("{}/v1/gradings", self.base_url)
    }
}

#[async_trait]
impl GraderClient for HttpGraderClient {
    async fn submit(&self, request: &GradingRequest) -> Result<DispatchReceipt> {
        let response = self
            .client
            .post(self.gradings_url())
            .json(request)
            .send()
            .await
            .context("Failed to call grader")?;

        let status = response.status();
        if status.is_server_error() {
            // Retried by the dispatcher.
            anyhow::bail!("Grader returned status: {}", status);
        }
        if !status.is_success() {
            tracing::warn!(
                "Grader refused grade_process={} with status {}",
                request.grade_process_id,
                status
            );
            return Ok(DispatchReceipt {
                accepted: false,
                job_id: None,
            });
        }

        response
            .json::<DispatchReceipt>()
            .await
            .context("Invalid grader receipt")
    }
}
