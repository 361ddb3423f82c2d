//! Outbound email transport seam.
//!
//! Everything that sends mail goes through [`EmailTransport`], so the
//! trigger engine, campaign sender and schedulers can be exercised with
//! the in-memory implementation while production wires up lettre SMTP.

use crate::error::TransportError;
use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart, SinglePart, header::ContentType};
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A fully rendered message ready for the provider.
#[derive(Clone, Debug, PartialEq)]
pub struct OutboundEmail {
    pub to_email: String,
    pub to_name: Option<String>,
    pub subject: String,
    pub html: String,
    /// Plain-text alternative part, derived from the HTML body.
    pub text: String,
    pub reply_to: Option<String>,
}

/// Provider acknowledgement for a delivered message.
#[derive(Clone, Debug, Default)]
pub struct SendReceipt {
    pub message_id: Option<String>,
}

/// Black-box send interface: success with an optional provider message
/// id, or a [`TransportError`]. Implementations must not panic.
#[async_trait]
pub trait EmailTransport: Send + Sync {
    /// Provider name recorded in the communications log.
    fn provider_name(&self) -> &str;

    async fn send(&self, message: &OutboundEmail) -> Result<SendReceipt, TransportError>;

    /// Best-effort reachability probe, used at startup for logging only.
    async fn validate_connection(&self) -> bool;
}

/// Production transport backed by lettre's async SMTP client.
pub struct SmtpMailer {
    transport: Arc<AsyncSmtpTransport<Tokio1Executor>>,
    from: Mailbox,
    provider: String,
}

impl SmtpMailer {
    pub fn new(
        transport: Arc<AsyncSmtpTransport<Tokio1Executor>>,
        from: &str,
        provider: &str,
    ) -> Result<Self, TransportError> {
        let from = from
            .parse()
            .map_err(|_| TransportError::InvalidAddress(from.to_string()))?;
        Ok(Self {
            transport,
            from,
            provider: provider.to_string(),
        })
    }

    fn build_message(&self, message: &OutboundEmail) -> Result<Message, TransportError> {
        let address: Address = message
            .to_email
            .parse()
            .map_err(|_| TransportError::InvalidAddress(message.to_email.clone()))?;
        let to = Mailbox::new(message.to_name.clone(), address);

        let mut builder = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(message.subject.clone())
            .header(lettre::message::header::MIME_VERSION_1_0)
            .message_id(None);

        if let Some(reply_to) = &message.reply_to {
            let reply_to = reply_to
                .parse()
                .map_err(|_| TransportError::InvalidAddress(reply_to.clone()))?;
            builder = builder.reply_to(reply_to);
        }

        builder
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(message.text.clone()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(message.html.clone()),
                    ),
            )
            .map_err(|e| TransportError::Build(e.to_string()))
    }
}

#[async_trait]
impl EmailTransport for SmtpMailer {
    fn provider_name(&self) -> &str {
        &self.provider
    }

    async fn send(&self, message: &OutboundEmail) -> Result<SendReceipt, TransportError> {
        let email_msg = self.build_message(message)?;

        match self.transport.send(email_msg).await {
            Ok(response) => {
                let detail = response.message().collect::<Vec<_>>().join(" ");
                Ok(SendReceipt {
                    message_id: if detail.is_empty() {
                        None
                    } else {
                        Some(detail)
                    },
                })
            }
            Err(e) if e.is_transient() || e.is_timeout() => {
                Err(TransportError::Network(e.to_string()))
            }
            Err(e) => Err(TransportError::Rejected(e.to_string())),
        }
    }

    async fn validate_connection(&self) -> bool {
        self.transport.test_connection().await.unwrap_or(false)
    }
}

/// In-memory transport used by tests: records every accepted message and
/// can be scripted to fail the first N attempts or all of them.
#[derive(Default)]
pub struct InMemoryTransport {
    sent: Mutex<Vec<OutboundEmail>>,
    attempts: AtomicUsize,
    fail_first: usize,
    succeed_first: Option<usize>,
    fail_all: bool,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the first `n` send attempts with a network error, then accept.
    pub fn failing_first(n: usize) -> Self {
        Self {
            fail_first: n,
            ..Self::default()
        }
    }

    /// Fail every send attempt with a network error.
    pub fn always_failing() -> Self {
        Self {
            fail_all: true,
            ..Self::default()
        }
    }

    /// Accept the first `n` send attempts, then fail every later one.
    pub fn failing_after(n: usize) -> Self {
        Self {
            succeed_first: Some(n),
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.lock().expect("lock poisoned").clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmailTransport for InMemoryTransport {
    fn provider_name(&self) -> &str {
        "in-memory"
    }

    async fn send(&self, message: &OutboundEmail) -> Result<SendReceipt, TransportError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        let scripted_failure = self.fail_all
            || attempt < self.fail_first
            || self.succeed_first.is_some_and(|n| attempt >= n);
        if scripted_failure {
            return Err(TransportError::Network("simulated failure".to_string()));
        }
        self.sent
            .lock()
            .expect("lock poisoned")
            .push(message.clone());
        Ok(SendReceipt {
            message_id: Some(format!("mem-{}", attempt + 1)),
        })
    }

    async fn validate_connection(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_message() -> OutboundEmail {
        OutboundEmail {
            to_email: "member@example.com".to_string(),
            to_name: Some("Sarah Doe".to_string()),
            subject: "Welcome".to_string(),
            html: "<p>Hi</p>".to_string(),
            text: "Hi".to_string(),
            reply_to: None,
        }
    }

    #[tokio::test]
    async fn in_memory_records_sent_messages() {
        let transport = InMemoryTransport::new();
        let receipt = transport.send(&sample_message()).await.unwrap();
        assert!(receipt.message_id.is_some());
        assert_eq!(transport.sent().len(), 1);
        assert_eq!(transport.sent()[0].to_email, "member@example.com");
    }

    #[tokio::test]
    async fn in_memory_fails_first_n() {
        let transport = InMemoryTransport::failing_first(2);
        assert!(transport.send(&sample_message()).await.is_err());
        assert!(transport.send(&sample_message()).await.is_err());
        assert!(transport.send(&sample_message()).await.is_ok());
        assert_eq!(transport.attempts(), 3);
        assert_eq!(transport.sent().len(), 1);
    }

    // The pooled transport needs a live reactor even to be dropped.
    #[tokio::test]
    async fn smtp_mailer_rejects_bad_from_address() {
        let transport = Arc::new(
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous("localhost").build(),
        );
        assert!(SmtpMailer::new(transport, "not-an-address", "smtp").is_err());
    }
}
