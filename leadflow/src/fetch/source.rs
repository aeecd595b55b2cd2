//! Lead sources: where a batch gets its leads and reference dictionaries.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::paginator::{PageTransport, Paginator, PaginatorConfig, Query};
use super::retry::Sleeper;
use super::TokenRefresher;
use crate::errors::FetchError;
use crate::model::{
    Contact, Deletion, Event, EventKind, Note, Pipeline, PipelineDirectory, RawLead,
    ReferenceData, Task, User, UserDirectory,
};
use crate::utils::FetchWindow;

/// Event types requested alongside leads.
const EVENT_TYPES: [&str; 9] = [
    "lead_added",
    "lead_deleted",
    "incoming_call",
    "incoming_chat_message",
    "entity_merged",
    "outgoing_call",
    "outgoing_chat_message",
    "entity_responsible_changed",
    "lead_status_changed",
];

/// Supplies leads and reference data to a batch run.
#[async_trait]
pub trait LeadSource: Send + Sync + Debug {
    /// Leads created inside `window`, timelines attached.
    async fn leads(&self, window: FetchWindow) -> Result<Vec<RawLead>, FetchError>;

    /// Pipeline and status dictionary.
    async fn pipelines(&self) -> Result<PipelineDirectory, FetchError>;

    /// User dictionary.
    async fn users(&self) -> Result<UserDirectory, FetchError>;

    /// Both dictionaries.
    async fn reference_data(&self) -> Result<ReferenceData, FetchError> {
        let pipelines = self.pipelines().await?;
        let users = self.users().await?;
        Ok(ReferenceData::new(pipelines, users))
    }
}

/// In-memory source over pre-loaded data.
#[derive(Debug, Clone, Default)]
pub struct StaticLeadSource {
    leads: Vec<RawLead>,
    refs: ReferenceData,
}

impl StaticLeadSource {
    /// Creates a source serving `leads` and `refs`.
    #[must_use]
    pub const fn new(leads: Vec<RawLead>, refs: ReferenceData) -> Self {
        Self { leads, refs }
    }
}

#[async_trait]
impl LeadSource for StaticLeadSource {
    async fn leads(&self, window: FetchWindow) -> Result<Vec<RawLead>, FetchError> {
        Ok(self
            .leads
            .iter()
            .filter(|l| l.created_at >= window.from_ts && l.created_at <= window.to_ts)
            .cloned()
            .collect())
    }

    async fn pipelines(&self) -> Result<PipelineDirectory, FetchError> {
        Ok(self.refs.pipelines.clone())
    }

    async fn users(&self) -> Result<UserDirectory, FetchError> {
        Ok(self.refs.users.clone())
    }
}

/// Request sizes used by [`CrmLeadSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLimits {
    /// Lead ids per events request; the API accepts at most 10.
    pub event_ids: usize,
    /// Events per page.
    pub event_page: usize,
    /// Entity ids per notes, tasks and contacts request.
    pub entity_ids: usize,
    /// Items per page for notes, tasks, contacts and users.
    pub entity_page: usize,
}

impl Default for SourceLimits {
    fn default() -> Self {
        Self {
            event_ids: 10,
            event_page: 100,
            entity_ids: 50,
            entity_page: 50,
        }
    }
}

/// Lead source backed by the CRM REST API.
///
/// Leads come from `leads` filtered by creation time. Events, notes, tasks
/// and contacts are fetched by id chunks and attached to their lead.
pub struct CrmLeadSource<T: PageTransport + 'static> {
    transport: Arc<T>,
    paginator: Paginator,
    limits: SourceLimits,
}

impl<T: PageTransport + 'static> Debug for CrmLeadSource<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrmLeadSource")
            .field("paginator", &self.paginator)
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

fn pair(key: &str, value: impl ToString) -> (String, String) {
    (key.to_string(), value.to_string())
}

fn entity_id(item: &Value) -> Option<i64> {
    item.get("entity_id").and_then(Value::as_i64)
}

fn group_by_entity<V: DeserializeOwned>(items: Vec<Value>, what: &str) -> HashMap<i64, Vec<V>> {
    let mut grouped: HashMap<i64, Vec<V>> = HashMap::new();
    for item in items {
        let Some(id) = entity_id(&item) else {
            continue;
        };
        match serde_json::from_value(item) {
            Ok(v) => grouped.entry(id).or_default().push(v),
            Err(e) => warn!(entity_id = id, what, error = %e, "Skipping malformed item"),
        }
    }
    grouped
}

fn contact_ids(lead: &Value) -> Vec<i64> {
    lead.pointer("/_embedded/contacts")
        .and_then(Value::as_array)
        .map(|cs| cs.iter().filter_map(|c| c.get("id").and_then(Value::as_i64)).collect())
        .unwrap_or_default()
}

fn parse_pipelines(body: &Value) -> PipelineDirectory {
    let mut dir = PipelineDirectory::new();
    let Some(pipelines) = body.pointer("/_embedded/pipelines").and_then(Value::as_array) else {
        return dir;
    };
    for p in pipelines {
        let Some(id) = p.get("id").and_then(Value::as_i64) else {
            continue;
        };
        let mut pipeline = Pipeline::new(p.get("name").and_then(Value::as_str).unwrap_or(""));
        for s in p
            .pointer("/_embedded/statuses")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
        {
            if let (Some(sid), Some(name)) =
                (s.get("id").and_then(Value::as_i64), s.get("name").and_then(Value::as_str))
            {
                pipeline = pipeline.with_status(sid, name);
            }
        }
        dir.insert(id, pipeline);
    }
    dir
}

fn parse_user(item: &Value) -> Option<(i64, User)> {
    let id = item.get("id").and_then(Value::as_i64)?;
    let user = User {
        name: item.get("name").and_then(Value::as_str).unwrap_or("").to_string(),
        email: item.get("email").and_then(Value::as_str).map(str::to_string),
        group: item
            .pointer("/_embedded/groups/0/name")
            .and_then(Value::as_str)
            .map(str::to_string),
    };
    Some((id, user))
}

impl<T: PageTransport + 'static> CrmLeadSource<T> {
    /// Creates a source over `transport` with default paging.
    #[must_use]
    pub fn new(transport: T) -> Self {
        let transport = Arc::new(transport);
        let paginator = Paginator::new(transport.clone());
        Self {
            transport,
            paginator,
            limits: SourceLimits::default(),
        }
    }

    /// Sets the token refresher.
    #[must_use]
    pub fn with_refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.paginator = self.paginator.with_refresher(refresher);
        self
    }

    /// Replaces the sleeper.
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.paginator = self.paginator.with_sleeper(sleeper);
        self
    }

    /// Replaces the paging config.
    #[must_use]
    pub fn with_config(mut self, config: PaginatorConfig) -> Self {
        self.paginator = self.paginator.with_config(config);
        self
    }

    /// Replaces the request sizes.
    #[must_use]
    pub const fn with_limits(mut self, limits: SourceLimits) -> Self {
        self.limits = limits;
        self
    }

    /// The underlying transport.
    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    async fn by_ids(
        &self,
        path: &str,
        collection: &str,
        id_key: &str,
        ids: &[i64],
        chunk: usize,
        page: usize,
        extra: &[(String, String)],
    ) -> Result<Vec<Value>, FetchError> {
        let mut items = Vec::new();
        for ids in ids.chunks(chunk.max(1)) {
            let mut query: Query = ids.iter().map(|id| pair(id_key, id)).collect();
            query.extend_from_slice(extra);
            items.extend(
                self.paginator
                    .collect(path, collection, &query, Some(page))
                    .await?,
            );
        }
        Ok(items)
    }

    async fn events(&self, ids: &[i64]) -> Result<Vec<Value>, FetchError> {
        let mut extra: Query = vec![pair("filter[entity]", "lead")];
        extra.extend(EVENT_TYPES.iter().map(|t| pair("filter[type][]", t)));
        extra.push(pair("order[created_at]", "asc"));
        self.by_ids(
            "events",
            "events",
            "filter[entity_id][]",
            ids,
            self.limits.event_ids,
            self.limits.event_page,
            &extra,
        )
        .await
    }

    async fn entity_items(
        &self,
        path: &str,
        collection: &str,
        id_key: &str,
        ids: &[i64],
    ) -> Result<Vec<Value>, FetchError> {
        self.by_ids(
            path,
            collection,
            id_key,
            ids,
            self.limits.entity_ids,
            self.limits.entity_page,
            &[],
        )
        .await
    }
}

#[async_trait]
impl<T: PageTransport + 'static> LeadSource for CrmLeadSource<T> {
    async fn leads(&self, window: FetchWindow) -> Result<Vec<RawLead>, FetchError> {
        let query = vec![
            pair("filter[created_at][from]", window.from_ts),
            pair("filter[created_at][to]", window.to_ts),
            pair("with", "contacts,loss_reason"),
            pair("order[created_at]", "asc"),
        ];
        let raw = self.paginator.collect("leads", "leads", &query, None).await?;

        let mut leads = Vec::with_capacity(raw.len());
        let mut links: Vec<Vec<i64>> = Vec::with_capacity(raw.len());
        for item in raw {
            let contacts = contact_ids(&item);
            match serde_json::from_value::<RawLead>(item) {
                Ok(lead) => {
                    leads.push(lead);
                    links.push(contacts);
                }
                Err(e) => warn!(error = %e, "Skipping malformed lead"),
            }
        }
        let ids: Vec<i64> = leads.iter().map(|l| l.id).collect();
        let mut all_contacts: Vec<i64> = links.iter().flatten().copied().collect();
        all_contacts.sort_unstable();
        all_contacts.dedup();
        info!(leads = ids.len(), contacts = all_contacts.len(), "Fetched leads");

        let mut events: HashMap<i64, Vec<Event>> = group_by_entity(self.events(&ids).await?, "event");
        let mut notes: HashMap<i64, Vec<Note>> = group_by_entity(
            self.entity_items("leads/notes", "notes", "filter[entity_id][]", &ids)
                .await?,
            "note",
        );
        let mut tasks: HashMap<i64, Vec<Task>> = group_by_entity(
            self.entity_items("tasks", "tasks", "filter[entity_id][]", &ids)
                .await?,
            "task",
        );
        let contact_notes: HashMap<i64, Vec<Note>> = group_by_entity(
            self.entity_items("contacts/notes", "notes", "filter[entity_id][]", &all_contacts)
                .await?,
            "contact note",
        );
        let contacts: HashMap<i64, Contact> = self
            .entity_items("contacts", "contacts", "filter[id][]", &all_contacts)
            .await?
            .into_iter()
            .filter_map(|c| {
                let id = c.get("id").and_then(Value::as_i64)?;
                serde_json::from_value(c).ok().map(|contact| (id, contact))
            })
            .collect();

        for (lead, linked) in leads.iter_mut().zip(links) {
            lead.events = events.remove(&lead.id).unwrap_or_default();
            lead.notes = notes.remove(&lead.id).unwrap_or_default();
            lead.tasks = tasks.remove(&lead.id).unwrap_or_default();
            for contact_id in linked {
                if let Some(contact) = contacts.get(&contact_id) {
                    lead.contacts.push(contact.clone());
                }
                if let Some(extra) = contact_notes.get(&contact_id) {
                    lead.notes.extend(extra.iter().cloned());
                }
            }
            lead.events.sort_by_key(|e| e.created_at);
            lead.notes.sort_by_key(|n| n.created_at);
            if lead.deleted.is_none() {
                lead.deleted = lead
                    .events
                    .iter()
                    .find(|e| e.kind == EventKind::LeadDeleted)
                    .map(|e| Deletion {
                        user_id: Some(e.created_by),
                        at: Some(e.created_at),
                    });
            }
        }
        debug!(leads = leads.len(), "Attached timelines");
        Ok(leads)
    }

    async fn pipelines(&self) -> Result<PipelineDirectory, FetchError> {
        let body = self.paginator.get_document("leads/pipelines", &[]).await?;
        Ok(body.as_ref().map(parse_pipelines).unwrap_or_default())
    }

    async fn users(&self) -> Result<UserDirectory, FetchError> {
        let query = vec![pair("with", "role,group")];
        let items = self
            .paginator
            .collect("users", "users", &query, Some(self.limits.entity_page))
            .await?;
        let mut users = UserDirectory::new();
        for (id, user) in items.iter().filter_map(parse_user) {
            users.insert(id, user);
        }
        Ok(users)
    }
}
