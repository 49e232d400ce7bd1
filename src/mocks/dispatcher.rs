//! Mock message dispatcher for testing.

use crate::error::Result;
use crate::providers::{DispatchReceipt, MessageDispatcher};
use crate::state::ChannelType;
use std::sync::{Arc, Mutex};

/// One recorded dispatch.
#[derive(Debug, Clone)]
pub struct RecordedDispatch {
    /// Channel the message went over.
    pub channel: ChannelType,
    /// Recipient address.
    pub recipient: String,
    /// Template identifier.
    pub template_id: String,
    /// Template variables (tests read the code out of here).
    pub variables: serde_json::Value,
}

#[derive(Default)]
struct Inner {
    sent: Vec<RecordedDispatch>,
    fail_next: u32,
}

/// Mock dispatcher.
///
/// Records every dispatch instead of sending. `fail_next_dispatches`
/// makes upcoming sends report provider rejection, for testing the
/// delivery-failure path.
#[derive(Clone, Default)]
pub struct MockDispatcher {
    inner: Arc<Mutex<Inner>>,
}

#[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
impl MockDispatcher {
    /// Create a new mock dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` dispatches report `delivered = false`.
    pub fn fail_next_dispatches(&self, n: u32) {
        self.inner.lock().unwrap().fail_next = n;
    }

    /// Everything dispatched so far.
    #[must_use]
    pub fn sent(&self) -> Vec<RecordedDispatch> {
        self.inner.lock().unwrap().sent.clone()
    }

    /// The `code` variable of the most recent dispatch.
    #[must_use]
    pub fn last_code(&self) -> Option<String> {
        let inner = self.inner.lock().unwrap();
        inner
            .sent
            .last()
            .and_then(|d| d.variables["code"].as_str().map(String::from))
    }
}

#[allow(clippy::unwrap_used)] // Test mock: mutex poisoning is a test failure
impl MessageDispatcher for MockDispatcher {
    async fn dispatch(
        &self,
        channel: ChannelType,
        recipient: &str,
        template_id: &str,
        variables: &serde_json::Value,
    ) -> Result<DispatchReceipt> {
        let mut inner = self.inner.lock().unwrap();
        inner.sent.push(RecordedDispatch {
            channel,
            recipient: recipient.to_string(),
            template_id: template_id.to_string(),
            variables: variables.clone(),
        });

        if inner.fail_next > 0 {
            inner.fail_next -= 1;
            return Ok(DispatchReceipt {
                message_id: String::new(),
                delivered: false,
                error: Some("provider rejected message".into()),
            });
        }

        Ok(DispatchReceipt {
            message_id: format!("mock-{}", inner.sent.len()),
            delivered: true,
            error: None,
        })
    }
}
