//! Client lifecycle operations used by the screens.
//!
//! Each operation talks to the store directly and keeps the project tiles in
//! step. Multi-step operations are not transactional: when a later step fails
//! the earlier ones stay applied and the error lists them.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, to_value, Value};
use tracing::{info, warn};

use crate::contracts::ContractStore;
use crate::db::{Collection, Document, DocumentStore, Patch, StoreError, Subscription};
use crate::error::{CascadeStep, ClientError};
use crate::models::{Category, Client, NewClient};
use crate::numbering::{SequenceGenerator, SequencePolicy};
use crate::tiles::{TileDefaults, TileIndex};
use crate::visibility::IconVisibility;

pub struct ClientController {
    store: Arc<dyn DocumentStore>,
    contracts: Arc<dyn ContractStore>,
    numbers: SequenceGenerator,
    tiles: TileIndex,
}

impl ClientController {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        contracts: Arc<dyn ContractStore>,
        policy: SequencePolicy,
        tile_defaults: TileDefaults,
    ) -> Self {
        Self {
            numbers: SequenceGenerator::new(Arc::clone(&store), policy),
            tiles: TileIndex::new(Arc::clone(&store), tile_defaults),
            store,
            contracts,
        }
    }

    pub fn numbers(&self) -> &SequenceGenerator {
        &self.numbers
    }

    pub async fn load_clients(&self) -> Result<Vec<Client>, ClientError> {
        let documents = self
            .store
            .query(Collection::Clients, &[])
            .await
            .map_err(|source| ClientError::persistence("load clients", source))?;

        documents
            .iter()
            .map(Client::from_document)
            .collect::<Result<_, _>>()
            .map_err(|source| ClientError::persistence("load clients", source))
    }

    /// Push every client after each change; undecodable records are skipped
    pub async fn subscribe_clients<F>(&self, on_change: F) -> Result<Subscription, ClientError>
    where
        F: Fn(Vec<Client>) + Send + Sync + 'static,
    {
        self.store
            .subscribe(
                Collection::Clients,
                Box::new(move |documents: Vec<Document>| {
                    let clients = documents
                        .iter()
                        .filter_map(|document| match Client::from_document(document) {
                            Ok(client) => Some(client),
                            Err(err) => {
                                warn!(id = %document.id, error = %err, "skipping unreadable client");
                                None
                            }
                        })
                        .collect();
                    on_change(clients);
                }),
            )
            .await
            .map_err(|source| ClientError::persistence("subscribe to clients", source))
    }

    pub async fn create_client(&self, draft: &NewClient) -> Result<Client, ClientError> {
        validate(draft)?;

        let number = self.numbers.next_client_number(draft.year, draft.category).await?;
        let mut client = Client {
            id: Default::default(),
            year: draft.year,
            category: draft.category,
            client_number: number.to_string(),
            last_name: draft.last_name.trim().to_string(),
            first_name: draft.first_name.trim().to_string(),
            phone: draft.phone.trim().to_string(),
            hide_project_icon: draft.hide_project_icon,
            created_at: Some(Utc::now()),
        };

        let data = to_value(&client).map_err(|err| ClientError::persistence("create client", StoreError::from(err)))?;
        client.id = self
            .store
            .create(Collection::Clients, data)
            .await
            .map_err(|source| ClientError::persistence("create client", source))?;

        self.tiles
            .on_client_created(&client)
            .await
            .map_err(|err| err.after("create client", vec![CascadeStep::ClientRecord]))?;

        info!(id = %client.id, number = %client.client_number, "client created");
        Ok(client)
    }

    /// Write form changes; a category change renumbers like a move
    pub async fn edit_client(&self, client: &Client, draft: &NewClient) -> Result<Client, ClientError> {
        validate(draft)?;

        let mut updated = client.clone();
        updated.year = draft.year;
        updated.last_name = draft.last_name.trim().to_string();
        updated.first_name = draft.first_name.trim().to_string();
        updated.phone = draft.phone.trim().to_string();

        let mut patch = fields(json!({
            "year": updated.year,
            "lastName": updated.last_name,
            "firstName": updated.first_name,
            "phone": updated.phone,
        }));

        if draft.category != client.category {
            let number = self.numbers.next_client_number(draft.year, draft.category).await?;
            updated.category = draft.category;
            updated.client_number = number.to_string();
            patch.insert("category".to_string(), Value::from(updated.category.as_str()));
            patch.insert("clientNumber".to_string(), Value::from(updated.client_number.clone()));
        }

        self.store
            .update(Collection::Clients, client.id, patch)
            .await
            .map_err(|source| ClientError::persistence("update client", source))?;

        if updated.display_name() != client.display_name() {
            warn!(
                id = %client.id,
                old_title = %client.display_name(),
                new_title = %updated.display_name(),
                "client renamed, project tile keeps its old title"
            );
        }

        info!(id = %client.id, number = %updated.client_number, "client updated");
        Ok(updated)
    }

    /// Move to `category` under the next number of that scope
    pub async fn move_client(&self, client: &Client, category: Category) -> Result<Client, ClientError> {
        let number = self.numbers.next_client_number(client.year, category).await?;

        let mut moved = client.clone();
        moved.category = category;
        moved.client_number = number.to_string();

        let patch = fields(json!({
            "category": category.as_str(),
            "clientNumber": moved.client_number,
        }));
        self.store
            .update(Collection::Clients, client.id, patch)
            .await
            .map_err(|source| ClientError::persistence("move client", source))?;

        info!(
            id = %client.id,
            from = %client.category,
            to = %category,
            number = %moved.client_number,
            "client moved"
        );
        Ok(moved)
    }

    /// Contracts, then tiles, then the client record itself
    pub async fn delete_client(&self, client: &Client) -> Result<(), ClientError> {
        let removed_contracts = self
            .contracts
            .delete_client_contracts(client.id)
            .await
            .map_err(|err| err.after("delete client", Vec::new()))?;
        let mut completed: Vec<_> = removed_contracts.iter().copied().map(CascadeStep::Contract).collect();

        let removed_tiles = self
            .tiles
            .on_client_deleted(client)
            .await
            .map_err(|err| err.after("delete client", completed.clone()))?;
        completed.extend(removed_tiles.iter().copied().map(CascadeStep::ProjectTile));

        self.store
            .delete(Collection::Clients, client.id)
            .await
            .map_err(|source| ClientError::persistence("delete client", source).after("delete client", completed))?;

        info!(
            id = %client.id,
            contracts = removed_contracts.len(),
            tiles = removed_tiles.len(),
            "client deleted"
        );
        Ok(())
    }

    /// Flip the icon flag locally first, revert it if the store refuses
    ///
    /// Returns the new hidden state.
    pub async fn toggle_icon_visibility(
        &self,
        client: &Client,
        visibility: &mut IconVisibility,
    ) -> Result<bool, ClientError> {
        let pending = visibility.begin_toggle(client);

        match self.write_icon_flag(client, pending.hidden()).await {
            Ok(()) => {
                let hidden = pending.commit();
                info!(id = %client.id, hidden, "project icon toggled");
                Ok(hidden)
            }
            Err(err) => {
                pending.revert(visibility);
                Err(err)
            }
        }
    }

    async fn write_icon_flag(&self, client: &Client, hidden: bool) -> Result<(), ClientError> {
        self.store
            .update(Collection::Clients, client.id, fields(json!({ "hideProjectIcon": hidden })))
            .await
            .map_err(|source| ClientError::persistence("update icon visibility", source))?;

        self.tiles
            .on_visibility_toggled(client, hidden)
            .await
            .map_err(|err| err.after("toggle icon visibility", vec![CascadeStep::IconFlag]))
    }
}

fn validate(draft: &NewClient) -> Result<(), ClientError> {
    match draft.missing_field() {
        Some(field) => Err(ClientError::Validation(field)),
        None => Ok(()),
    }
}

fn fields(value: Value) -> Patch {
    match value {
        Value::Object(fields) => fields,
        _ => Patch::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::StoredContracts;
    use crate::db::flaky::{FlakyStore, Op};
    use crate::db::{DocumentId, Filter, MemoryStore};
    use crate::models::RequiredField;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn controller_over(store: Arc<dyn DocumentStore>) -> ClientController {
        let contracts = Arc::new(StoredContracts::new(Arc::clone(&store)));
        ClientController::new(store, contracts, SequencePolicy::Strict, TileDefaults::default())
    }

    fn draft(year: i32, category: Category, last_name: &str, first_name: &str) -> NewClient {
        NewClient {
            year,
            category,
            last_name: last_name.to_string(),
            first_name: first_name.to_string(),
            phone: "555-0100".to_string(),
            hide_project_icon: false,
        }
    }

    async fn tile_count(store: &MemoryStore, title: &str) -> usize {
        store
            .query(Collection::Categories, &[Filter::eq("title", title), Filter::eq("row", 3)])
            .await
            .unwrap()
            .len()
    }

    #[tokio::test]
    async fn numbering_scenario_create_create_move() {
        let store = MemoryStore::new();
        let controller = controller_over(Arc::new(store.clone()));

        let first = controller
            .create_client(&draft(2024, Category::Deposit, "Smith", "John"))
            .await
            .unwrap();
        let second = controller
            .create_client(&draft(2024, Category::Deposit, "Smith", "John"))
            .await
            .unwrap();
        assert_eq!(first.client_number, "2024-001");
        assert_eq!(second.client_number, "2024-002");

        let moved = controller.move_client(&first, Category::Building).await.unwrap();
        assert_eq!(moved.category, Category::Building);
        assert_eq!(moved.client_number, "2024-001");

        let stored = controller.load_clients().await.unwrap();
        let first_stored = stored.iter().find(|client| client.id == first.id).unwrap();
        assert_eq!(first_stored.category, Category::Building);
        assert_eq!(first_stored.client_number, "2024-001");
        assert!(first_stored.created_at.is_some());
    }

    #[tokio::test]
    async fn moving_takes_next_number_of_target_scope() {
        let store = MemoryStore::new();
        let controller = controller_over(Arc::new(store.clone()));
        for name in ["Adams", "Baker", "Clark"] {
            controller
                .create_client(&draft(2024, Category::Building, name, "Ann"))
                .await
                .unwrap();
        }
        let deposit = controller
            .create_client(&draft(2024, Category::Deposit, "Davis", "Dan"))
            .await
            .unwrap();

        let moved = controller.move_client(&deposit, Category::Building).await.unwrap();
        assert_eq!(moved.client_number, "2024-004");

        // Deposit is empty again, so moving back starts over at 001
        let back = controller.move_client(&moved, Category::Deposit).await.unwrap();
        assert_eq!(back.client_number, "2024-001");
        assert_eq!(tile_count(&store, "Davis Dan").await, 1);
    }

    #[tokio::test]
    async fn create_adds_tile_only_for_visible_clients() {
        let store = MemoryStore::new();
        let controller = controller_over(Arc::new(store.clone()));

        controller
            .create_client(&draft(2024, Category::Deposit, "Smith", "John"))
            .await
            .unwrap();
        let mut hidden = draft(2024, Category::Deposit, "Doe", "Jane");
        hidden.hide_project_icon = true;
        controller.create_client(&hidden).await.unwrap();

        assert_eq!(tile_count(&store, "Smith John").await, 1);
        assert_eq!(tile_count(&store, "Doe Jane").await, 0);
    }

    #[tokio::test]
    async fn validation_blocks_before_any_write() {
        let store = MemoryStore::new();
        let flaky = Arc::new(FlakyStore::new(store.clone()));
        flaky.fail_after(Op::Query, Collection::Clients, 0);
        let controller = controller_over(flaky);

        let mut incomplete = draft(2024, Category::Deposit, "Smith", "John");
        incomplete.phone = String::new();

        let err = controller.create_client(&incomplete).await.unwrap_err();
        assert!(matches!(err, ClientError::Validation(RequiredField::Phone)));
        assert!(store.query(Collection::Clients, &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn edit_with_category_change_renumbers() {
        let store = MemoryStore::new();
        let controller = controller_over(Arc::new(store.clone()));
        controller
            .create_client(&draft(2024, Category::Completed, "Evans", "Eve"))
            .await
            .unwrap();
        let client = controller
            .create_client(&draft(2024, Category::Deposit, "Smith", "John"))
            .await
            .unwrap();

        let mut changes = NewClient::from_existing(&client);
        changes.phone = "555-0199".to_string();
        let same_category = controller.edit_client(&client, &changes).await.unwrap();
        assert_eq!(same_category.client_number, "2024-001");
        assert_eq!(same_category.phone, "555-0199");

        changes.category = Category::Completed;
        let moved = controller.edit_client(&same_category, &changes).await.unwrap();
        assert_eq!(moved.category, Category::Completed);
        assert_eq!(moved.client_number, "2024-002");

        let stored = controller.load_clients().await.unwrap();
        let record = stored.iter().find(|stored| stored.id == client.id).unwrap();
        assert_eq!(record, &Client { created_at: record.created_at, ..moved });
    }

    #[tokio::test]
    async fn rename_leaves_tile_title_stale() {
        let store = MemoryStore::new();
        let controller = controller_over(Arc::new(store.clone()));
        let client = controller
            .create_client(&draft(2024, Category::Deposit, "Smith", "John"))
            .await
            .unwrap();

        let mut renamed = NewClient::from_existing(&client);
        renamed.last_name = "Smyth".to_string();
        controller.edit_client(&client, &renamed).await.unwrap();

        assert_eq!(tile_count(&store, "Smith John").await, 1);
        assert_eq!(tile_count(&store, "Smyth John").await, 0);
    }

    #[tokio::test]
    async fn toggle_removes_then_restores_tile() {
        let store = MemoryStore::new();
        let controller = controller_over(Arc::new(store.clone()));
        let client = controller
            .create_client(&draft(2024, Category::Deposit, "Smith", "John"))
            .await
            .unwrap();
        let mut visibility = IconVisibility::from_clients(std::slice::from_ref(&client));

        let hidden = controller.toggle_icon_visibility(&client, &mut visibility).await.unwrap();
        assert!(hidden);
        assert!(visibility.is_hidden(&client));
        assert_eq!(tile_count(&store, "Smith John").await, 0);

        let hidden = controller.toggle_icon_visibility(&client, &mut visibility).await.unwrap();
        assert!(!hidden);
        assert_eq!(tile_count(&store, "Smith John").await, 1);

        let stored = controller.load_clients().await.unwrap();
        assert!(!stored[0].hide_project_icon);
    }

    #[tokio::test]
    async fn toggle_failure_rolls_back_local_state() {
        let store = MemoryStore::new();
        let flaky = Arc::new(FlakyStore::new(store.clone()));
        let controller = controller_over(flaky.clone());
        let client = controller
            .create_client(&draft(2024, Category::Deposit, "Smith", "John"))
            .await
            .unwrap();
        let mut visibility = IconVisibility::from_clients(std::slice::from_ref(&client));

        flaky.fail_after(Op::Update, Collection::Clients, 0);
        let err = controller
            .toggle_icon_visibility(&client, &mut visibility)
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::Persistence { .. }));
        assert!(!visibility.is_hidden(&client));
        assert_eq!(tile_count(&store, "Smith John").await, 1);
    }

    #[tokio::test]
    async fn toggle_tile_failure_reports_written_flag() {
        let store = MemoryStore::new();
        let flaky = Arc::new(FlakyStore::new(store.clone()));
        let controller = controller_over(flaky.clone());
        let client = controller
            .create_client(&draft(2024, Category::Deposit, "Smith", "John"))
            .await
            .unwrap();
        let mut visibility = IconVisibility::default();

        flaky.fail_after(Op::Query, Collection::Categories, 0);
        let err = controller
            .toggle_icon_visibility(&client, &mut visibility)
            .await
            .unwrap_err();

        assert_eq!(err.completed_steps(), &[CascadeStep::IconFlag]);
        assert!(!visibility.is_hidden(&client));
        // Remote flag already flipped, the next snapshot corrects local state
        assert!(controller.load_clients().await.unwrap()[0].hide_project_icon);
    }

    #[tokio::test]
    async fn delete_removes_contracts_tiles_and_record() {
        let store = MemoryStore::new();
        let controller = controller_over(Arc::new(store.clone()));
        let client = controller
            .create_client(&draft(2024, Category::Deposit, "Smith", "John"))
            .await
            .unwrap();
        let keeper = controller
            .create_client(&draft(2024, Category::Deposit, "Doe", "Jane"))
            .await
            .unwrap();
        for owner in [client.id, client.id, keeper.id] {
            store
                .create(Collection::Contracts, json!({ "clientId": owner.to_string() }))
                .await
                .unwrap();
        }

        controller.delete_client(&client).await.unwrap();

        let contracts = store
            .query(Collection::Contracts, &[Filter::eq("clientId", client.id.to_string())])
            .await
            .unwrap();
        assert!(contracts.is_empty());
        assert_eq!(tile_count(&store, "Smith John").await, 0);
        let clients = controller.load_clients().await.unwrap();
        assert_eq!(clients.len(), 1);
        assert_eq!(clients[0].id, keeper.id);
        assert_eq!(tile_count(&store, "Doe Jane").await, 1);
    }

    #[tokio::test]
    async fn deleted_number_is_reused_only_when_highest() {
        let store = MemoryStore::new();
        let controller = controller_over(Arc::new(store.clone()));
        let mut created = Vec::new();
        for name in ["Adams", "Baker", "Clark"] {
            created.push(
                controller
                    .create_client(&draft(2024, Category::Deposit, name, "Ann"))
                    .await
                    .unwrap(),
            );
        }

        controller.delete_client(&created[1]).await.unwrap();
        let next = controller
            .create_client(&draft(2024, Category::Deposit, "Evans", "Eve"))
            .await
            .unwrap();
        assert_eq!(next.client_number, "2024-004");

        controller.delete_client(&next).await.unwrap();
        let again = controller
            .create_client(&draft(2024, Category::Deposit, "Ford", "Fay"))
            .await
            .unwrap();
        assert_eq!(again.client_number, "2024-004");
    }

    #[tokio::test]
    async fn delete_failure_keeps_client_record_and_lists_steps() {
        let store = MemoryStore::new();
        let flaky = Arc::new(FlakyStore::new(store.clone()));
        let controller = controller_over(flaky.clone());
        let client = controller
            .create_client(&draft(2024, Category::Deposit, "Smith", "John"))
            .await
            .unwrap();

        let contract = store
            .create(Collection::Contracts, json!({ "clientId": client.id.to_string() }))
            .await
            .unwrap();

        flaky.fail_after(Op::Delete, Collection::Clients, 0);
        let err = controller.delete_client(&client).await.unwrap_err();

        let steps = err.completed_steps();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0], CascadeStep::Contract(contract));
        assert!(matches!(steps[1], CascadeStep::ProjectTile(_)));
        assert_eq!(tile_count(&store, "Smith John").await, 0);
        assert_eq!(controller.load_clients().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn contract_failure_stops_delete_before_anything_else() {
        let store = MemoryStore::new();
        let flaky = Arc::new(FlakyStore::new(store.clone()));
        let controller = controller_over(flaky.clone());
        let client = controller
            .create_client(&draft(2024, Category::Deposit, "Smith", "John"))
            .await
            .unwrap();

        flaky.fail_after(Op::Query, Collection::Contracts, 0);
        let err = controller.delete_client(&client).await.unwrap_err();

        assert!(matches!(err, ClientError::Persistence { operation: "delete client contracts", .. }));
        assert_eq!(tile_count(&store, "Smith John").await, 1);
        assert_eq!(controller.load_clients().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn contract_failure_partway_reports_deleted_contracts() {
        let store = MemoryStore::new();
        let flaky = Arc::new(FlakyStore::new(store.clone()));
        let controller = controller_over(flaky.clone());
        let client = controller
            .create_client(&draft(2024, Category::Deposit, "Smith", "John"))
            .await
            .unwrap();
        for title in ["Foundation", "Roof"] {
            store
                .create(Collection::Contracts, json!({ "clientId": client.id.to_string(), "title": title }))
                .await
                .unwrap();
        }

        flaky.fail_after(Op::Delete, Collection::Contracts, 1);
        let err = controller.delete_client(&client).await.unwrap_err();

        assert!(matches!(err, ClientError::PartialCascade { operation: "delete client", .. }));
        let steps = err.completed_steps();
        assert_eq!(steps.len(), 1);
        assert!(matches!(steps[0], CascadeStep::Contract(_)));

        let left = store.query(Collection::Contracts, &[]).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_ne!(steps[0], CascadeStep::Contract(left[0].id));
        assert_eq!(tile_count(&store, "Smith John").await, 1);
        assert_eq!(controller.load_clients().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn create_tile_failure_keeps_client_record() {
        let store = MemoryStore::new();
        let flaky = Arc::new(FlakyStore::new(store.clone()));
        let controller = controller_over(flaky.clone());

        flaky.fail_after(Op::Create, Collection::Categories, 0);
        let err = controller
            .create_client(&draft(2024, Category::Deposit, "Smith", "John"))
            .await
            .unwrap_err();

        assert_eq!(err.completed_steps(), &[CascadeStep::ClientRecord]);
        assert_eq!(controller.load_clients().await.unwrap().len(), 1);

        flaky.heal();
        let next = controller
            .create_client(&draft(2024, Category::Deposit, "Doe", "Jane"))
            .await
            .unwrap();
        assert_eq!(next.client_number, "2024-002");
    }

    #[tokio::test]
    async fn move_of_missing_client_is_persistence_error() {
        let controller = controller_over(Arc::new(MemoryStore::new()));
        let ghost = Client {
            id: DocumentId::new(),
            year: 2024,
            category: Category::Deposit,
            client_number: "2024-001".to_string(),
            last_name: "Ghost".to_string(),
            first_name: "Gus".to_string(),
            phone: "555-0000".to_string(),
            hide_project_icon: false,
            created_at: None,
        };

        let err = controller.move_client(&ghost, Category::Completed).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Persistence { source: StoreError::NotFound { .. }, .. }
        ));
    }

    #[tokio::test]
    async fn subscription_delivers_decoded_clients() {
        let store = MemoryStore::new();
        let controller = controller_over(Arc::new(store.clone()));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _subscription = controller
            .subscribe_clients(move |clients| {
                let _ = tx.send(clients);
            })
            .await
            .unwrap();

        assert!(rx.recv().await.unwrap().is_empty());

        // Malformed records are dropped from the snapshot
        store.create(Collection::Clients, json!({ "year": "soon" })).await.unwrap();
        assert!(rx.recv().await.unwrap().is_empty());

        controller
            .create_client(&draft(2024, Category::Deposit, "Smith", "John"))
            .await
            .unwrap();
        let snapshot = tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                let clients = rx.recv().await.unwrap();
                if !clients.is_empty() {
                    break clients;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(snapshot[0].client_number, "2024-001");
    }
}
