//! HTTP gateway dispatcher for messaging providers.
//!
//! Delivers sms/whatsapp/telegram codes through a provider gateway
//! that exposes a JSON send endpoint (Twilio-style aggregators,
//! self-hosted bridges). Email goes through [`SmtpDispatcher`].
//!
//! [`SmtpDispatcher`]: crate::providers::SmtpDispatcher

use crate::error::{CoreError, Result};
use crate::providers::{DispatchReceipt, MessageDispatcher};
use crate::state::ChannelType;
use crate::utils::mask_recipient;
use serde::Deserialize;

/// Gateway response body.
#[derive(Debug, Deserialize)]
struct GatewayResponse {
    #[serde(default)]
    message_id: String,
    #[serde(default)]
    accepted: bool,
    #[serde(default)]
    error: Option<String>,
}

/// HTTP gateway dispatcher.
#[derive(Clone)]
pub struct WebhookDispatcher {
    /// Gateway send endpoint.
    endpoint: String,

    /// Bearer credential for the gateway.
    api_key: String,

    /// Shared HTTP client.
    client: reqwest::Client,
}

impl WebhookDispatcher {
    /// Create a new gateway dispatcher.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Config`] if the endpoint is empty or the
    /// HTTP client cannot be constructed.
    pub fn new(endpoint: String, api_key: String) -> Result<Self> {
        if endpoint.is_empty() {
            return Err(CoreError::Config("gateway endpoint is empty".into()));
        }

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| CoreError::Config(format!("HTTP client build failed: {e}")))?;

        Ok(Self {
            endpoint,
            api_key,
            client,
        })
    }
}

impl MessageDispatcher for WebhookDispatcher {
    async fn dispatch(
        &self,
        channel: ChannelType,
        recipient: &str,
        template_id: &str,
        variables: &serde_json::Value,
    ) -> Result<DispatchReceipt> {
        let payload = serde_json::json!({
            "channel": channel.as_str(),
            "to": recipient,
            "template": template_id,
            "variables": variables,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CoreError::Timeout
                } else {
                    CoreError::Dispatch(format!("gateway unreachable: {e}"))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            tracing::error!(
                channel = %channel,
                recipient = %mask_recipient(recipient),
                status = %status,
                "gateway rejected dispatch"
            );
            return Ok(DispatchReceipt {
                message_id: String::new(),
                delivered: false,
                error: Some(format!("gateway returned {status}")),
            });
        }

        let body: GatewayResponse = response
            .json()
            .await
            .map_err(|e| CoreError::Serialization(format!("gateway response: {e}")))?;

        tracing::info!(
            channel = %channel,
            recipient = %mask_recipient(recipient),
            message_id = %body.message_id,
            accepted = body.accepted,
            "gateway dispatch"
        );

        Ok(DispatchReceipt {
            message_id: body.message_id,
            delivered: body.accepted,
            error: body.error,
        })
    }
}
