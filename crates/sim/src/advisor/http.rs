// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP JSON transport for the advisor seam.

use std::future::Future;
use std::pin::Pin;

use crate::advisor::{parse_response, Advisor, AdvisorContext, AdvisorDecision};
use crate::error::SimError;

/// Advisor that POSTs the context to an endpoint and expects the
/// `{action, speed, reason}` schema back.
pub struct HttpAdvisor {
    client: reqwest::Client,
    url: String,
    v_max: f64,
}

impl HttpAdvisor {
    pub fn new(url: impl Into<String>, v_max: f64) -> Self {
        Self { client: reqwest::Client::new(), url: url.into(), v_max }
    }

    async fn call(&self, ctx: AdvisorContext) -> Result<AdvisorDecision, SimError> {
        // Transport failures count as unavailability; only a well-formed
        // HTTP exchange can produce a malformed-response error.
        let response = self
            .client
            .post(&self.url)
            .json(&ctx)
            .send()
            .await
            .map_err(|_| SimError::AdvisorTimeout)?;
        if !response.status().is_success() {
            return Err(SimError::AdvisorMalformed);
        }
        let body = response.text().await.map_err(|_| SimError::AdvisorTimeout)?;
        parse_response(&body, self.v_max)
    }
}

impl Advisor for HttpAdvisor {
    fn advise(
        &self,
        ctx: AdvisorContext,
    ) -> Pin<Box<dyn Future<Output = Result<AdvisorDecision, SimError>> + Send + '_>> {
        Box::pin(self.call(ctx))
    }
}
