use std::time::Duration;

use async_trait::async_trait;
use decision_core::{
    DecisionError, PortfolioRiskCheck, PositionSizer, RiskAssessment, RiskCheckRequest,
    SizingRequest, SizingResult,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path)
}

/// Portfolio risk service client. Transport failures surface as errors so
/// the pipeline can fail open; an explicit rejection comes back as a
/// normal assessment with `passes == false`.
pub struct HttpRiskGate {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRiskGate {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            base_url: base_url.to_string(),
        }
    }
}

#[async_trait]
impl PortfolioRiskCheck for HttpRiskGate {
    async fn check_buy(
        &self,
        request: &RiskCheckRequest,
    ) -> Result<RiskAssessment, DecisionError> {
        let url = endpoint(&self.base_url, "risk/check-buy");
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| DecisionError::CollaboratorUnavailable(format!("risk service: {e}")))?;

        if !response.status().is_success() {
            return Err(DecisionError::CollaboratorUnavailable(format!(
                "risk service returned {}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| DecisionError::CollaboratorUnavailable(format!("risk response: {e}")))
    }
}

/// External position sizing service client.
pub struct HttpPositionSizer {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPositionSizer {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            base_url: base_url.to_string(),
        }
    }
}

#[async_trait]
impl PositionSizer for HttpPositionSizer {
    async fn size_position(
        &self,
        request: &SizingRequest,
    ) -> Result<SizingResult, DecisionError> {
        let url = endpoint(&self.base_url, "sizing/position");
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| DecisionError::CollaboratorUnavailable(format!("sizer service: {e}")))?;

        if !response.status().is_success() {
            return Err(DecisionError::CollaboratorUnavailable(format!(
                "sizer service returned {}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| DecisionError::CollaboratorUnavailable(format!("sizer response: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_handles_trailing_slash() {
        assert_eq!(
            endpoint("http://risk:8010/", "risk/check-buy"),
            "http://risk:8010/risk/check-buy"
        );
        assert_eq!(
            endpoint("http://risk:8010", "risk/check-buy"),
            "http://risk:8010/risk/check-buy"
        );
    }
}
