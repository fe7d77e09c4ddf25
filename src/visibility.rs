use std::collections::HashMap;

use crate::db::DocumentId;
use crate::models::Client;

/// Icon visibility as currently shown, fed by the clients subscription
#[derive(Debug, Default, Clone)]
pub struct IconVisibility {
    hidden: HashMap<DocumentId, bool>,
}

impl IconVisibility {
    #[cfg(test)]
    pub fn from_clients(clients: &[Client]) -> Self {
        let mut visibility = Self::default();
        visibility.sync(clients);
        visibility
    }

    /// Replace local state with a fresh store snapshot
    pub fn sync(&mut self, clients: &[Client]) {
        self.hidden = clients
            .iter()
            .map(|client| (client.id, client.hide_project_icon))
            .collect();
    }

    pub fn is_hidden(&self, client: &Client) -> bool {
        self.hidden
            .get(&client.id)
            .copied()
            .unwrap_or(client.hide_project_icon)
    }

    /// Flip the flag locally, ahead of the store write
    pub fn begin_toggle(&mut self, client: &Client) -> PendingToggle {
        let previous = self.is_hidden(client);
        let hidden = !previous;
        self.hidden.insert(client.id, hidden);

        PendingToggle {
            client_id: client.id,
            previous,
            hidden,
        }
    }
}

/// A local flip waiting for the store to confirm it
#[must_use]
#[derive(Debug)]
pub struct PendingToggle {
    client_id: DocumentId,
    previous: bool,
    hidden: bool,
}

impl PendingToggle {
    pub fn hidden(&self) -> bool {
        self.hidden
    }

    pub fn commit(self) -> bool {
        self.hidden
    }

    /// Apply the inverse mutation
    pub fn revert(self, visibility: &mut IconVisibility) {
        visibility.hidden.insert(self.client_id, self.previous);
    }
}
