//! Per-year, per-category client numbering.
//!
//! Numbers look like `2024-007`: the construction year, a dash and a sequence
//! zero-padded to three digits (wider once it passes 999). The next number is
//! one past the highest sequence already stored for the same year and
//! category, so deleted numbers are only reused when they were the highest.
//!
//! Generation is a plain read. Two sessions numbering the same scope at the
//! same time can both get the same number.

use std::fmt;
use std::sync::Arc;

use tracing::warn;

use crate::db::{Collection, DocumentStore, Filter};
use crate::error::ClientError;
use crate::models::Category;

/// How to treat stored numbers without a numeric suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SequencePolicy {
    /// Refuse to number the scope
    #[default]
    Strict,
    /// Ignore the entry and keep going
    Lenient,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ClientNumber {
    pub year: i32,
    pub sequence: u32,
}

impl fmt::Display for ClientNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:03}", self.year, self.sequence)
    }
}

/// Numeric part after the first `-`
pub fn parse_sequence(client_number: &str) -> Option<u32> {
    client_number.split('-').nth(1)?.trim().parse().ok()
}

/// Highest parsable sequence, 0 for an empty scope
pub fn highest_sequence<'a>(
    client_numbers: impl IntoIterator<Item = &'a str>,
    policy: SequencePolicy,
) -> Result<u32, ClientError> {
    let mut highest = 0;

    for client_number in client_numbers {
        match (parse_sequence(client_number), policy) {
            (Some(sequence), _) => highest = highest.max(sequence),
            (None, SequencePolicy::Lenient) => {
                warn!(client_number, "skipping malformed client number");
            }
            (None, SequencePolicy::Strict) => {
                return Err(ClientError::MalformedSequence {
                    client_number: client_number.to_string(),
                });
            }
        }
    }

    Ok(highest)
}

/// Computes client numbers from what is currently stored
pub struct SequenceGenerator {
    store: Arc<dyn DocumentStore>,
    policy: SequencePolicy,
}

impl SequenceGenerator {
    pub fn new(store: Arc<dyn DocumentStore>, policy: SequencePolicy) -> Self {
        Self { store, policy }
    }

    pub async fn next_client_number(&self, year: i32, category: Category) -> Result<ClientNumber, ClientError> {
        let documents = self
            .store
            .query(
                Collection::Clients,
                &[Filter::eq("year", year), Filter::eq("category", category.as_str())],
            )
            .await
            .map_err(|source| ClientError::persistence("read client numbers", source))?;

        let highest = highest_sequence(
            documents
                .iter()
                .map(|document| document.field_str("clientNumber").unwrap_or_default()),
            self.policy,
        )?;
        let sequence = highest
            .checked_add(1)
            .ok_or(ClientError::SequenceExhausted { year, category })?;

        Ok(ClientNumber { year, sequence })
    }
}
