//! Transfer and confirmation orders forwarded to authorities.
//!
//! Validation runs before any I/O; a failed check surfaces as
//! [`ClientError::Validation`] and is never retried.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::OrderConfig;
use crate::error::{ClientError, ClientResult};

/// Payment order from a sender to a recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferOrder {
    #[serde(default = "Uuid::new_v4")]
    pub order_id: Uuid,
    pub sender: String,
    pub recipient: String,
    /// Amount in the token's smallest unit.
    pub amount: u64,
    pub token: String,
    pub sequence_number: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl TransferOrder {
    pub fn new(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        amount: u64,
        token: impl Into<String>,
        sequence_number: u64,
    ) -> Self {
        Self {
            order_id: Uuid::new_v4(),
            sender: sender.into(),
            recipient: recipient.into(),
            amount,
            token: token.into(),
            sequence_number,
            signature: None,
        }
    }

    pub fn validate(&self, limits: &OrderConfig) -> ClientResult<()> {
        if self.sender.trim().is_empty() {
            return Err(ClientError::Validation("sender is required".into()));
        }
        if self.recipient.trim().is_empty() {
            return Err(ClientError::Validation("recipient is required".into()));
        }
        if self.sender == self.recipient {
            return Err(ClientError::Validation("sender and recipient must differ".into()));
        }
        if self.amount == 0 {
            return Err(ClientError::Validation("amount must be positive".into()));
        }
        if self.amount > limits.max_transfer_amount {
            return Err(ClientError::Validation(format!(
                "amount {} exceeds maximum {}",
                self.amount, limits.max_transfer_amount
            )));
        }
        if !limits.supported_tokens.iter().any(|t| t == &self.token) {
            return Err(ClientError::Validation(format!("unsupported token {}", self.token)));
        }
        if self.sequence_number == 0 {
            return Err(ClientError::Validation("sequence_number must be at least 1".into()));
        }
        Ok(())
    }
}

/// An authority's vote on a previously submitted transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmationOrder {
    #[serde(default = "Uuid::new_v4")]
    pub confirmation_id: Uuid,
    pub transfer_order_id: Uuid,
    pub authority_name: String,
    pub confirmed: bool,
    pub signature: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,
}

impl ConfirmationOrder {
    pub fn validate(&self) -> ClientResult<()> {
        if self.authority_name.trim().is_empty() {
            return Err(ClientError::Validation("authority_name is required".into()));
        }
        if self.signature.trim().is_empty() {
            return Err(ClientError::Validation("signature is required".into()));
        }
        Ok(())
    }
}

/// Check that an authority name can be used as a single URL path segment.
pub fn validate_authority_name(name: &str) -> ClientResult<()> {
    if name.trim().is_empty() {
        return Err(ClientError::Validation("authority name is required".into()));
    }
    if name.contains('/') || name.chars().any(char::is_control) {
        return Err(ClientError::Validation(format!("invalid authority name {:?}", name)));
    }
    Ok(())
}
