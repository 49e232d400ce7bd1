//! SMTP dispatcher implementation using Lettre.

use crate::error::{CoreError, Result};
use crate::providers::{DispatchReceipt, MessageDispatcher};
use crate::state::ChannelType;
use crate::utils::mask_recipient;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

/// SMTP dispatcher using Lettre.
///
/// Handles the `email` channel only; the core routes other channels to
/// a different dispatcher. Suitable for production use.
///
/// # Examples
///
/// ```ignore
/// use cerberus_auth::providers::SmtpDispatcher;
///
/// let dispatcher = SmtpDispatcher::new(
///     "smtp.example.com".to_string(),
///     587,
///     "mailer@example.com".to_string(),
///     "app_password".to_string(),
///     "noreply@example.com".to_string(),
///     "Example App".to_string(),
/// )?;
/// ```
#[derive(Clone)]
pub struct SmtpDispatcher {
    /// SMTP server address.
    smtp_server: String,

    /// SMTP server port.
    smtp_port: u16,

    /// SMTP credentials.
    credentials: Credentials,

    /// Sender email address.
    from_email: String,

    /// Sender display name.
    from_name: String,
}

impl SmtpDispatcher {
    /// Create a new SMTP dispatcher.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Config`] if the sender address is empty.
    pub fn new(
        smtp_server: String,
        smtp_port: u16,
        smtp_username: String,
        smtp_password: String,
        from_email: String,
        from_name: String,
    ) -> Result<Self> {
        if from_email.is_empty() {
            return Err(CoreError::Config("SMTP sender address is empty".into()));
        }

        Ok(Self {
            smtp_server,
            smtp_port,
            credentials: Credentials::new(smtp_username, smtp_password),
            from_email,
            from_name,
        })
    }

    /// Build the transport. Created per send to avoid held connections.
    fn build_transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
        Ok(
            AsyncSmtpTransport::<Tokio1Executor>::relay(&self.smtp_server)
                .map_err(|e| CoreError::Dispatch(format!("SMTP relay error: {e}")))?
                .port(self.smtp_port)
                .credentials(self.credentials.clone())
                .build(),
        )
    }

    /// Build the "From" header.
    fn from_header(&self) -> String {
        format!("{} <{}>", self.from_name, self.from_email)
    }
}

/// Render a template into `(subject, body)`.
fn render(template_id: &str, variables: &serde_json::Value) -> (String, String) {
    let code = variables["code"].as_str().unwrap_or_default();
    let expires = variables["expires_minutes"].as_str().unwrap_or("5");

    match template_id {
        crate::constants::templates::OTP_EMAIL => (
            "Your verification code".to_string(),
            format!(
                "Your verification code is {code}.\n\n\
                 It expires in {expires} minutes. If you did not request \
                 this code, you can ignore this message."
            ),
        ),
        other => (
            "Notification".to_string(),
            format!("Unrecognized template {other}; code {code}"),
        ),
    }
}

impl MessageDispatcher for SmtpDispatcher {
    async fn dispatch(
        &self,
        channel: ChannelType,
        recipient: &str,
        template_id: &str,
        variables: &serde_json::Value,
    ) -> Result<DispatchReceipt> {
        if channel != ChannelType::Email {
            return Err(CoreError::Dispatch(format!(
                "SMTP dispatcher cannot deliver over {channel}"
            )));
        }

        let (subject, body) = render(template_id, variables);

        let message = Message::builder()
            .from(
                self.from_header()
                    .parse()
                    .map_err(|e| CoreError::Dispatch(format!("invalid sender: {e}")))?,
            )
            .to(recipient
                .parse()
                .map_err(|e| CoreError::Dispatch(format!("invalid recipient: {e}")))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| CoreError::Dispatch(format!("message build error: {e}")))?;

        let transport = self.build_transport()?;
        match transport.send(message).await {
            Ok(response) => {
                tracing::info!(
                    recipient = %mask_recipient(recipient),
                    template = template_id,
                    "SMTP message accepted"
                );
                Ok(DispatchReceipt {
                    message_id: response
                        .message()
                        .collect::<Vec<_>>()
                        .join(" "),
                    delivered: true,
                    error: None,
                })
            }
            Err(e) => {
                tracing::error!(
                    recipient = %mask_recipient(recipient),
                    error = %e,
                    "SMTP send failed"
                );
                Ok(DispatchReceipt {
                    message_id: String::new(),
                    delivered: false,
                    error: Some(e.to_string()),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_otp_email() {
        let variables = serde_json::json!({"code": "123456", "expires_minutes": "5"});
        let (subject, body) = render(crate::constants::templates::OTP_EMAIL, &variables);
        assert_eq!(subject, "Your verification code");
        assert!(body.contains("123456"));
        assert!(body.contains("5 minutes"));
    }

    #[test]
    fn test_rejects_non_email_channel() {
        let dispatcher = SmtpDispatcher::new(
            "smtp.example.com".into(),
            587,
            "user".into(),
            "pass".into(),
            "noreply@example.com".into(),
            "Example".into(),
        )
        .unwrap();
        let receipt = tokio_test::block_on(dispatcher.dispatch(
            ChannelType::Sms,
            "+15551234567",
            crate::constants::templates::OTP_SMS,
            &serde_json::json!({}),
        ));
        assert!(matches!(receipt, Err(CoreError::Dispatch(_))));
    }
}
