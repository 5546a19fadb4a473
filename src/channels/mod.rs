//! Outbound channel transports — pure I/O, no business logic.
//!
//! The delivery engine, approval workflow, and drip scheduler only see the
//! traits; real senders (SMTP via lettre, provider HTTP for SMS) and test
//! mocks plug in behind them.

mod sms;
mod smtp;

pub use sms::{HttpSmsSender, SmsConfig};
pub use smtp::{SmtpConfig, SmtpMailer};

use async_trait::async_trait;

use crate::error::ChannelError;

/// Outbound email sender.
#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), ChannelError>;
}

/// Outbound SMS sender.
#[async_trait]
pub trait SmsTransport: Send + Sync {
    async fn send(&self, to: &str, body: &str) -> Result<(), ChannelError>;
}

/// Stand-in used when a transport is not configured. Every send fails with
/// `NotConfigured`, which downstream policy treats as a logged send failure.
pub struct DisabledTransport {
    channel: &'static str,
}

impl DisabledTransport {
    pub fn email() -> Self {
        Self { channel: "email" }
    }

    pub fn sms() -> Self {
        Self { channel: "sms" }
    }
}

#[async_trait]
impl EmailTransport for DisabledTransport {
    async fn send(&self, _to: &str, _subject: &str, _body: &str) -> Result<(), ChannelError> {
        Err(ChannelError::NotConfigured {
            channel: self.channel.to_string(),
        })
    }
}

#[async_trait]
impl SmsTransport for DisabledTransport {
    async fn send(&self, _to: &str, _body: &str) -> Result<(), ChannelError> {
        Err(ChannelError::NotConfigured {
            channel: self.channel.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_transport_always_fails() {
        let email = DisabledTransport::email();
        let err = EmailTransport::send(&email, "a@b.com", "s", "b").await.unwrap_err();
        assert!(matches!(err, ChannelError::NotConfigured { .. }));

        let sms = DisabledTransport::sms();
        let err = SmsTransport::send(&sms, "+15551234567", "b").await.unwrap_err();
        assert!(matches!(err, ChannelError::NotConfigured { .. }));
    }
}
