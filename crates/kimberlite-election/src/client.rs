//! Prep-recovery transport (`spec.md` §4.8): the follower asks the
//! leader to wait until it observes the follower's BUFFERING state in
//! the cluster projection before the follower begins fetching.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::wire::{PrepRecoveryRequest, PrepRecoveryResponse};

/// Default prep-recovery timeout (`spec.md` §4.8: "Timeout = 8s default").
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(8);

/// The follower's handle for sending prep-recovery to a leader.
/// Object-safe so `kimberlite-recovery` can depend on the trait and
/// tests can substitute an in-memory fake leader.
#[async_trait]
pub trait PrepRecoveryHandle: Send + Sync {
    async fn prep_recovery(&self, request: &PrepRecoveryRequest) -> Result<PrepRecoveryResponse>;
}

/// `reqwest`-backed [`PrepRecoveryHandle`] targeting a leader's base URL.
pub struct HttpPrepRecoveryClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPrepRecoveryClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client builder with only timeout configured never fails");
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl PrepRecoveryHandle for HttpPrepRecoveryClient {
    async fn prep_recovery(&self, request: &PrepRecoveryRequest) -> Result<PrepRecoveryResponse> {
        let url = format!("{}/admin/cores", self.base_url);
        let resp = self
            .client
            .post(&url)
            .query(&[
                ("action", "PREPRECOVERY"),
                ("coreName", request.core_name.as_str()),
                ("leaderName", request.leader_name.as_str()),
                ("state", request.state.as_str()),
                ("checkIsLeader", if request.check_is_leader { "true" } else { "false" }),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(resp)
    }
}
