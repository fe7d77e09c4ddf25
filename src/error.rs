use std::fmt;

use thiserror::Error;

use crate::db::{DocumentId, StoreError};
use crate::models::{Category, RequiredField};

/// A sub-step of a multi-step client operation that already reached the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeStep {
    Contract(DocumentId),
    ProjectTile(DocumentId),
    ClientRecord,
    IconFlag,
}

impl fmt::Display for CascadeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CascadeStep::Contract(id) => write!(f, "contract {id} deleted"),
            CascadeStep::ProjectTile(id) => write!(f, "project tile {id} deleted"),
            CascadeStep::ClientRecord => f.write_str("client record written"),
            CascadeStep::IconFlag => f.write_str("icon flag written"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{0} is required")]
    Validation(RequiredField),

    #[error("existing client number `{client_number}` has no numeric suffix")]
    MalformedSequence { client_number: String },

    #[error("client numbers for {year} {category} are exhausted")]
    SequenceExhausted { year: i32, category: Category },

    #[error("{operation} failed")]
    Persistence {
        operation: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("{operation} stopped partway after {} completed step(s)", .completed.len())]
    PartialCascade {
        operation: &'static str,
        completed: Vec<CascadeStep>,
        #[source]
        source: Box<ClientError>,
    },
}

impl ClientError {
    pub fn persistence(operation: &'static str, source: StoreError) -> Self {
        ClientError::Persistence { operation, source }
    }

    /// Attach steps that completed before this error
    ///
    /// Nested cascades are flattened so `completed` lists every step in order.
    pub fn after(self, operation: &'static str, mut completed: Vec<CascadeStep>) -> Self {
        match self {
            ClientError::PartialCascade {
                completed: inner,
                source,
                ..
            } => {
                completed.extend(inner);
                ClientError::PartialCascade {
                    operation,
                    completed,
                    source,
                }
            }
            other if completed.is_empty() => other,
            other => ClientError::PartialCascade {
                operation,
                completed,
                source: Box::new(other),
            },
        }
    }

    /// Steps that reached the store before the failure
    pub fn completed_steps(&self) -> &[CascadeStep] {
        match self {
            ClientError::PartialCascade { completed, .. } => completed,
            _ => &[],
        }
    }
}
