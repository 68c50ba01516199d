use crate::types::token::Reconciliation;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Serialize)]
pub(crate) struct Token {
    pub(crate) token: String,
}

#[derive(Serialize)]
pub(crate) struct Message {
    pub(crate) message: &'static str,
}

#[derive(Serialize)]
pub(crate) struct AvailableTokens {
    pub(crate) available_tokens: Vec<String>,
}

#[derive(Serialize)]
pub(crate) struct AssignedTokens {
    pub(crate) assigned_tokens: HashMap<String, i64>,
}

#[derive(Serialize)]
pub(crate) struct ReconcileSummary {
    pub(crate) released: u64,
    pub(crate) deleted: u64,
    pub(crate) errors: Vec<String>,
}

impl From<Reconciliation> for ReconcileSummary {
    fn from(reconciliation: Reconciliation) -> Self {
        Self {
            released: reconciliation.released,
            deleted: reconciliation.deleted,
            errors: reconciliation
                .errors
                .iter()
                .map(|(sweep, e)| format!("{sweep} sweep: {e}"))
                .collect(),
        }
    }
}
