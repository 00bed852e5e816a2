//! 2Captcha adapter: `in.php` submission plus `res.php` polling.
//!
//! All protocol calls go through the [`SolverTransport`] trait so the poll
//! loop's timing and failure semantics can be exercised without a network.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use serde::Deserialize;

use super::{
    CaptchaConfig, CaptchaError, CaptchaSolver, ChallengeDescriptor, ChallengeJob, JobStatus,
    SolutionToken,
};

const DEFAULT_BASE_URL: &str = "https://2captcha.com";
const NOT_READY: &str = "CAPCHA_NOT_READY";

/// Wire shape shared by every 2Captcha JSON endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse {
    pub status: i32,
    pub request: String,
}

/// Transport seam for the 2Captcha HTTP protocol.
#[async_trait]
pub trait SolverTransport: Send + Sync {
    /// POST to `/in.php`.
    async fn submit(&self, form: &HashMap<String, String>) -> Result<ApiResponse, CaptchaError>;

    /// GET `/res.php` with the given query parameters.
    async fn result(&self, query: &[(String, String)]) -> Result<ApiResponse, CaptchaError>;
}

/// Reqwest-backed transport against the real service.
pub struct ReqwestSolverTransport {
    client: reqwest::Client,
    base_url: String,
}

impl ReqwestSolverTransport {
    pub fn new() -> Result<Self, CaptchaError> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, CaptchaError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| CaptchaError::Configuration(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl SolverTransport for ReqwestSolverTransport {
    async fn submit(&self, form: &HashMap<String, String>) -> Result<ApiResponse, CaptchaError> {
        let response = self
            .client
            .post(format!("{}/in.php", self.base_url))
            .form(form)
            .send()
            .await
            .map_err(|err| CaptchaError::Transport(err.to_string()))?;
        response
            .json()
            .await
            .map_err(|err| CaptchaError::Transport(err.to_string()))
    }

    async fn result(&self, query: &[(String, String)]) -> Result<ApiResponse, CaptchaError> {
        let response = self
            .client
            .get(format!("{}/res.php", self.base_url))
            .query(query)
            .send()
            .await
            .map_err(|err| CaptchaError::Transport(err.to_string()))?;
        response
            .json()
            .await
            .map_err(|err| CaptchaError::Transport(err.to_string()))
    }
}

/// 2Captcha solving-service client.
pub struct TwoCaptchaClient {
    api_key: String,
    config: CaptchaConfig,
    transport: Arc<dyn SolverTransport>,
}

impl TwoCaptchaClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self, CaptchaError> {
        Ok(Self::with_transport(
            api_key,
            CaptchaConfig::default(),
            Arc::new(ReqwestSolverTransport::new()?),
        ))
    }

    pub fn with_config(
        api_key: impl Into<String>,
        config: CaptchaConfig,
    ) -> Result<Self, CaptchaError> {
        Ok(Self::with_transport(
            api_key,
            config,
            Arc::new(ReqwestSolverTransport::new()?),
        ))
    }

    pub fn with_transport(
        api_key: impl Into<String>,
        config: CaptchaConfig,
        transport: Arc<dyn SolverTransport>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            config,
            transport,
        }
    }

    /// Submit a challenge for solving. Rejections (invalid key, malformed
    /// parameters, exhausted quota) are not retryable.
    pub async fn submit(&self, challenge: &ChallengeDescriptor) -> Result<ChallengeJob, CaptchaError> {
        let mut form = HashMap::new();
        form.insert("key".to_string(), self.api_key.clone());
        form.insert("method".to_string(), "userrecaptcha".to_string());
        form.insert("googlekey".to_string(), challenge.site_key.clone());
        form.insert("pageurl".to_string(), challenge.page_url.to_string());
        form.insert("json".to_string(), "1".to_string());

        let response = self.transport.submit(&form).await?;
        if response.status == 1 {
            info!("captcha submitted, job id {}", response.request);
            Ok(ChallengeJob::new(response.request))
        } else {
            Err(CaptchaError::Submission(response.request))
        }
    }

    /// Poll until the job reaches a terminal state or the overall timeout
    /// elapses. Transient transport failures are logged and retried; any
    /// error status other than "not ready" ends the job immediately.
    pub async fn poll_until_ready(&self, job: &mut ChallengeJob) -> Option<SolutionToken> {
        let query = vec![
            ("key".to_string(), self.api_key.clone()),
            ("action".to_string(), "get".to_string()),
            ("id".to_string(), job.id.clone()),
            ("json".to_string(), "1".to_string()),
        ];

        tokio::time::sleep(self.config.initial_wait).await;

        loop {
            if job.submitted_at.elapsed() >= self.config.timeout {
                warn!(
                    "captcha job {} timed out after {:?}",
                    job.id, self.config.timeout
                );
                job.status = JobStatus::TimedOut;
                return None;
            }

            match self.transport.result(&query).await {
                Ok(response) if response.status == 1 => {
                    job.status = JobStatus::Ready;
                    return Some(SolutionToken::new(response.request));
                }
                Ok(response) if response.request == NOT_READY => {
                    debug!(
                        "captcha job {} still solving ({}s elapsed)",
                        job.id,
                        job.submitted_at.elapsed().as_secs()
                    );
                }
                Ok(response) => {
                    warn!("captcha job {} failed: {}", job.id, response.request);
                    job.status = JobStatus::Failed;
                    return None;
                }
                Err(err) => {
                    // Transient; retried on the next tick up to the budget.
                    warn!("captcha poll failed for job {}: {err}", job.id);
                }
            }

            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// Report an incorrectly solved captcha for a refund. Best-effort.
    pub async fn report_incorrect(&self, job_id: &str) -> bool {
        let query = vec![
            ("key".to_string(), self.api_key.clone()),
            ("action".to_string(), "reportbad".to_string()),
            ("id".to_string(), job_id.to_string()),
            ("json".to_string(), "1".to_string()),
        ];
        match self.transport.result(&query).await {
            Ok(response) => response.status == 1,
            Err(err) => {
                warn!("could not report bad captcha {job_id}: {err}");
                false
            }
        }
    }
}

#[async_trait]
impl CaptchaSolver for TwoCaptchaClient {
    fn name(&self) -> &'static str {
        "twocaptcha"
    }

    async fn solve(&self, challenge: &ChallengeDescriptor) -> Option<SolutionToken> {
        // Page-controlled value; truncate on char boundaries, not bytes.
        let key_prefix: String = challenge.site_key.chars().take(20).collect();
        info!("submitting captcha to 2Captcha (sitekey {key_prefix}...)");

        let mut job = match self.submit(challenge).await {
            Ok(job) => job,
            Err(err) => {
                warn!("captcha submission failed: {err}");
                return None;
            }
        };

        let token = self.poll_until_ready(&mut job).await;
        match &token {
            Some(_) => info!("captcha job {} solved", job.id),
            None => warn!("captcha job {} produced no token ({:?})", job.id, job.status),
        }
        token
    }

    async fn balance(&self) -> f64 {
        let query = vec![
            ("key".to_string(), self.api_key.clone()),
            ("action".to_string(), "getbalance".to_string()),
            ("json".to_string(), "1".to_string()),
        ];
        match self.transport.result(&query).await {
            Ok(response) if response.status == 1 => {
                response.request.parse().unwrap_or(0.0)
            }
            Ok(response) => {
                warn!("could not get balance: {}", response.request);
                0.0
            }
            Err(err) => {
                warn!("balance check failed: {err}");
                0.0
            }
        }
    }
}
