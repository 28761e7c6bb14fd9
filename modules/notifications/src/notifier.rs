//! Delivery seam. Real email/SMS transport lives outside this service;
//! this trait is the trigger contract the platform owns.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use thiserror::Error;

use crate::models::OutboundNotification;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("delivery failed: {0}")]
    Delivery(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Hand the notification to the delivery channel. Returns the
    /// channel's message id on acceptance.
    async fn send(&self, notification: &OutboundNotification) -> Result<String, NotifyError>;
}

/// Dev/default notifier: logs the would-be delivery and succeeds.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &OutboundNotification) -> Result<String, NotifyError> {
        let message_id = format!("log-{}", uuid::Uuid::new_v4().simple());
        tracing::info!(
            tenant_id = %notification.tenant_id,
            channel = %notification.channel,
            recipient = %notification.recipient,
            template = %notification.template,
            subject = %notification.subject_line,
            message_id = %message_id,
            "notification dispatched (log channel)"
        );
        Ok(message_id)
    }
}

/// Test notifier with a failure switch and a send counter.
#[derive(Default)]
pub struct StubNotifier {
    fail: AtomicBool,
    sends: AtomicU32,
}

impl StubNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    pub fn sends(&self) -> u32 {
        self.sends.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Notifier for StubNotifier {
    async fn send(&self, _notification: &OutboundNotification) -> Result<String, NotifyError> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            Err(NotifyError::Delivery("stub channel down".to_string()))
        } else {
            Ok(format!("stub-{}", self.sends.load(Ordering::SeqCst)))
        }
    }
}
