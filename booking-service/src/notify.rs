use async_trait::async_trait;
use serde::Serialize;
use shared::Appointment;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("mail provider rejected the message: {0}")]
    Rejected(String),
    #[error("mail provider unreachable: {0}")]
    Unreachable(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, to: &[String], subject: &str, body: &str) -> Result<(), NotifyError>;
}

/// Mail delivery through an HTTP mail-provider API.
pub struct HttpMailer {
    client: reqwest::Client,
    endpoint: String,
    api_token: String,
}

#[derive(Serialize)]
struct MailRequest<'a> {
    to: &'a [String],
    subject: &'a str,
    body: &'a str,
}

impl HttpMailer {
    pub fn new(endpoint: String, api_token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            api_token,
        }
    }
}

#[async_trait]
impl Notifier for HttpMailer {
    async fn send(&self, to: &[String], subject: &str, body: &str) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_token)
            .json(&MailRequest { to, subject, body })
            .send()
            .await
            .map_err(|e| NotifyError::Unreachable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(NotifyError::Rejected(format!(
                "status {}",
                response.status()
            )));
        }
        Ok(())
    }
}

pub fn confirmation_message(appointment: &Appointment) -> (String, String) {
    let subject = format!("Appointment confirmed for {}", appointment.slot);
    let body = format!(
        "Hi {},\n\nYour {} appointment is confirmed for {}.\n\nSee you then!",
        appointment.customer_name, appointment.service, appointment.slot
    );
    (subject, body)
}

/// Best-effort confirmation dispatch. Runs after the booking has
/// committed; any failure is logged and swallowed so it can never
/// affect the create response.
pub async fn send_confirmation(
    notifier: &dyn Notifier,
    appointment: &Appointment,
    operator_email: &str,
) {
    let mut recipients = Vec::with_capacity(2);
    if !appointment.customer_email.is_empty() {
        recipients.push(appointment.customer_email.clone());
    }
    recipients.push(operator_email.to_string());

    let (subject, body) = confirmation_message(appointment);
    match notifier.send(&recipients, &subject, &body).await {
        Ok(()) => info!(slot = %appointment.slot, "confirmation sent"),
        Err(e) => warn!(slot = %appointment.slot, "confirmation failed: {}", e),
    }
}
