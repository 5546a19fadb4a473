//! SMS transport over a provider-style HTTP API.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Serialize;

use crate::channels::SmsTransport;
use crate::error::ChannelError;

/// SMS provider configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct SmsConfig {
    /// Provider message endpoint URL.
    pub api_url: String,
    pub api_token: secrecy::SecretString,
    /// Sending number in international format.
    pub from_number: String,
}

impl SmsConfig {
    /// Build config from environment variables.
    /// Returns `None` if `SMS_API_URL` is not set (transport disabled).
    pub fn from_env() -> Option<Self> {
        let api_url = std::env::var("SMS_API_URL").ok()?;
        Some(Self {
            api_url,
            api_token: secrecy::SecretString::from(
                std::env::var("SMS_API_TOKEN").unwrap_or_default(),
            ),
            from_number: std::env::var("SMS_FROM_NUMBER").unwrap_or_default(),
        })
    }
}

#[derive(Serialize)]
struct SmsRequestBody<'a> {
    #[serde(rename = "From")]
    from: &'a str,
    #[serde(rename = "To")]
    to: &'a str,
    #[serde(rename = "Text")]
    text: &'a str,
}

/// Outbound SMS sender posting provider-shaped JSON.
pub struct HttpSmsSender {
    http: reqwest::Client,
    config: SmsConfig,
}

impl HttpSmsSender {
    pub fn new(config: SmsConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl SmsTransport for HttpSmsSender {
    async fn send(&self, to: &str, body: &str) -> Result<(), ChannelError> {
        let payload = SmsRequestBody {
            from: &self.config.from_number,
            to,
            text: body,
        };

        let response = self
            .http
            .post(&self.config.api_url)
            .bearer_auth(self.config.api_token.expose_secret())
            .json(&payload)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                channel: "sms".into(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                channel: "sms".into(),
                reason: format!("HTTP {status}: {detail}"),
            });
        }

        tracing::info!("SMS sent to {to}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_uses_provider_field_names() {
        let body = SmsRequestBody {
            from: "+15550000000",
            to: "+15551234567",
            text: "hello",
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["From"], "+15550000000");
        assert_eq!(json["To"], "+15551234567");
        assert_eq!(json["Text"], "hello");
    }
}
