use crate::error::{AuthError, Result};
use async_trait::async_trait;
use rand::Rng;
use serde::Serialize;

/// SMS gateway collaborator. This core owns OTP generation and expiry;
/// delivery mechanics live behind this contract.
#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send(&self, phone_number: &str, message: &str) -> Result<()>;
}

/// Generate a 6-digit OTP code.
pub fn generate_otp_code() -> String {
    let value: u32 = rand::rngs::OsRng.gen_range(0..1_000_000);
    format!("{:06}", value)
}

#[derive(Debug, Serialize)]
struct GatewayRequest<'a> {
    to: &'a str,
    message: &'a str,
}

/// HTTP SMS gateway client (webhook-style provider endpoint).
pub struct HttpSmsSender {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpSmsSender {
    pub fn new(endpoint: String, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key,
        }
    }

    pub fn from_env() -> Result<Self> {
        let endpoint = std::env::var("SMS_GATEWAY_URL")
            .map_err(|_| AuthError::Internal("SMS_GATEWAY_URL not configured".to_string()))?;
        let api_key = std::env::var("SMS_GATEWAY_API_KEY")
            .map_err(|_| AuthError::Internal("SMS_GATEWAY_API_KEY not configured".to_string()))?;
        Ok(Self::new(endpoint, api_key))
    }
}

#[async_trait]
impl SmsSender for HttpSmsSender {
    async fn send(&self, phone_number: &str, message: &str) -> Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&GatewayRequest {
                to: phone_number,
                message,
            })
            .send()
            .await
            .map_err(|e| AuthError::Internal(format!("SMS gateway unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(AuthError::Internal(format!(
                "SMS gateway returned {}",
                response.status()
            )));
        }

        Ok(())
    }
}

/// Logs instead of sending. Development and tests.
#[derive(Debug, Default)]
pub struct NoopSmsSender;

#[async_trait]
impl SmsSender for NoopSmsSender {
    async fn send(&self, phone_number: &str, _message: &str) -> Result<()> {
        tracing::info!(phone_number, "SMS dispatch skipped (noop sender)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_otp_is_six_digits() {
        for _ in 0..100 {
            let code = generate_otp_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }
}
