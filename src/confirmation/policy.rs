//! Non-interactive confirmation responders

use crate::types::ConfirmationKind;
use async_trait::async_trait;

/// Decides confirmation requests without a human in the loop
#[async_trait]
pub trait ConfirmationPolicy: Send + Sync {
    /// Return `true` to proceed
    async fn decide(&self, kind: ConfirmationKind, prompt: &str) -> bool;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Approves everything
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoApprove;

#[async_trait]
impl ConfirmationPolicy for AutoApprove {
    async fn decide(&self, _kind: ConfirmationKind, _prompt: &str) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "auto-approve"
    }
}

/// Declines everything, including the pre-flight prompt
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoDecline;

#[async_trait]
impl ConfirmationPolicy for AutoDecline {
    async fn decide(&self, _kind: ConfirmationKind, _prompt: &str) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "auto-decline"
    }
}

/// Approves the pre-flight prompt, stops on the first error
#[derive(Debug, Default, Clone, Copy)]
pub struct DeclineErrors;

#[async_trait]
impl ConfirmationPolicy for DeclineErrors {
    async fn decide(&self, kind: ConfirmationKind, _prompt: &str) -> bool {
        matches!(kind, ConfirmationKind::Preflight { .. })
    }

    fn name(&self) -> &'static str {
        "decline-errors"
    }
}
