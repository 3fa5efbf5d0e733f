use thiserror::Error;

use crate::types::LeadStatus;

#[derive(Error, Debug)]
pub enum ApexError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: LeadStatus, to: LeadStatus },

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
