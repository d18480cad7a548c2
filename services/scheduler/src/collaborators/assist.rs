//! Ranking-assist collaborator.
//!
//! An assist may reorder the top of the rule-based ranking. It never adds or
//! removes candidates; anything other than a permutation is discarded by the
//! ranker.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::availability::CandidateKey;
use crate::ranking::RankedCandidate;
use crate::request::InterviewRequest;

#[derive(Debug, Clone, Error)]
pub enum AssistError {
    #[error("ranking assist unavailable: {0}")]
    Unavailable(String),

    #[error("ranking assist returned an unusable response: {0}")]
    InvalidResponse(String),
}

/// What the assist is told about the request.
#[derive(Debug, Clone, Serialize)]
pub struct AssistContext {
    pub candidate_name: String,
    pub candidate_timezone: String,
    pub interview_type: String,
    pub required_specialties: Vec<String>,
    pub duration_minutes: u32,
}

impl From<&InterviewRequest> for AssistContext {
    fn from(request: &InterviewRequest) -> Self {
        Self {
            candidate_name: request.candidate_name.clone(),
            candidate_timezone: request.candidate_timezone.name().to_string(),
            interview_type: request.interview_type.clone(),
            required_specialties: request
                .required_specialties
                .iter()
                .map(|t| t.as_str().to_string())
                .collect(),
            duration_minutes: request.duration_minutes,
        }
    }
}

/// Optional re-ranking of the top candidates.
#[async_trait]
pub trait RankingAssist: Send + Sync {
    /// Returns the keys of `top_k` in the preferred order.
    async fn reorder(
        &self,
        top_k: &[RankedCandidate],
        context: &AssistContext,
    ) -> Result<Vec<CandidateKey>, AssistError>;
}

#[derive(Debug, Serialize)]
struct ReorderRequest<'a> {
    context: &'a AssistContext,
    candidates: &'a [RankedCandidate],
}

#[derive(Debug, Deserialize)]
struct ReorderResponse {
    order: Vec<CandidateKey>,
}

/// Ranking assist reached over JSON/HTTP.
///
/// POSTs `{ "context": ..., "candidates": [...] }` and expects
/// `{ "order": [{ "interviewer_id": ..., "slot_start": ... }] }`.
#[derive(Debug, Clone)]
pub struct HttpRankingAssist {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpRankingAssist {
    pub fn new(endpoint: impl Into<String>, token: Option<&str>, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(token) = token {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {token}"))
                    .context("Invalid assist token format")?,
            );
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl RankingAssist for HttpRankingAssist {
    async fn reorder(
        &self,
        top_k: &[RankedCandidate],
        context: &AssistContext,
    ) -> Result<Vec<CandidateKey>, AssistError> {
        let body = ReorderRequest {
            context,
            candidates: top_k,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| AssistError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AssistError::Unavailable(format!("HTTP {status}")));
        }

        let parsed: ReorderResponse = response
            .json()
            .await
            .map_err(|e| AssistError::InvalidResponse(e.to_string()))?;

        debug!(
            endpoint = %self.endpoint,
            returned = parsed.order.len(),
            "Ranking assist responded"
        );
        Ok(parsed.order)
    }
}
