//! Delivery channel — sends a notification task's rendered content to its
//! recipient. SMTP via async lettre; treated as a black box that may be slow
//! or fail transiently, so the processor wraps every call in a timeout.

use async_trait::async_trait;

use skyroster_core::config::SmtpConfig;
use skyroster_core::{Result, SkyError};

/// External delivery transport for notification tasks.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    async fn send(
        &self,
        recipient: &str,
        subject: &str,
        template_name: &str,
        template_data: &serde_json::Value,
    ) -> Result<()>;
}

/// SMTP delivery via lettre. Supports Gmail, Outlook, custom relays.
pub struct SmtpChannel {
    config: SmtpConfig,
}

impl SmtpChannel {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl DeliveryChannel for SmtpChannel {
    async fn send(
        &self,
        recipient: &str,
        subject: &str,
        template_name: &str,
        template_data: &serde_json::Value,
    ) -> Result<()> {
        use lettre::{
            AsyncSmtpTransport, AsyncTransport, Message, message::Mailbox,
            message::header::ContentType, transport::smtp::authentication::Credentials,
        };

        let from_mailbox: Mailbox =
            format!("{} <{}>", self.config.from_name, self.config.from_address)
                .parse()
                .map_err(|e| SkyError::Delivery(format!("Invalid from: {e}")))?;
        let to_mailbox: Mailbox = recipient
            .parse()
            .map_err(|e| SkyError::Delivery(format!("Invalid to: {e}")))?;

        let body = render_template(template_name, template_data);
        let email = Message::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| SkyError::Delivery(format!("Build message: {e}")))?;

        let creds = Credentials::new(
            self.config.username.clone(),
            self.config.password.clone(),
        );
        let mailer =
            AsyncSmtpTransport::<lettre::Tokio1Executor>::starttls_relay(&self.config.host)
                .map_err(|e| SkyError::Delivery(format!("SMTP relay: {e}")))?
                .port(self.config.port)
                .credentials(creds)
                .build();

        mailer
            .send(email)
            .await
            .map_err(|e| SkyError::Delivery(format!("SMTP send: {e}")))?;

        tracing::info!("📤 Email sent to: {recipient}");
        Ok(())
    }
}

/// Render a plain-text body for a known template name; unknown templates fall
/// back to a pretty-printed payload so nothing silently drops.
pub fn render_template(template_name: &str, data: &serde_json::Value) -> String {
    match template_name {
        "certification-expiry" => {
            let pilot = data["pilot_name"].as_str().unwrap_or("Unknown pilot");
            let check = data["check_code"].as_str().unwrap_or("check");
            let category = data["category"].as_str().unwrap_or("");
            let expiry = data["expiry_date"].as_str().unwrap_or("");
            let days = data["days_remaining"].as_i64().unwrap_or(0);
            format!(
                "Certification expiry warning\n\n\
                 Pilot:      {pilot}\n\
                 Check:      {check} ({category})\n\
                 Expires:    {expiry}\n\
                 Days left:  {days}\n\n\
                 Please schedule renewal before the expiry date.",
            )
        }
        _ => serde_json::to_string_pretty(data).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_certification_expiry() {
        let data = serde_json::json!({
            "pilot_name": "A. Kila",
            "check_code": "PC",
            "category": "Flight Checks",
            "expiry_date": "2025-06-08",
            "days_remaining": 7,
        });
        let body = render_template("certification-expiry", &data);
        assert!(body.contains("A. Kila"));
        assert!(body.contains("PC (Flight Checks)"));
        assert!(body.contains("2025-06-08"));
        assert!(body.contains("Days left:  7"));
    }

    #[test]
    fn test_unknown_template_falls_back_to_payload() {
        let data = serde_json::json!({"key": "value"});
        let body = render_template("mystery", &data);
        assert!(body.contains("\"key\""));
    }
}
