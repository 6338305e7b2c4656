//! Entity synchronization - client-side cache of a remote collection
//!
//! Every mutation runs validate -> remote call (carrying its timeline entry)
//! -> re-fetch with the active query -> detail refresh -> notify. The cache is
//! only ever replaced by an authoritative re-fetch.

mod view;

pub use view::{derive_view, paginate, DateRange, Page, SortOrder, ViewFilter};

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::api::{EntityApi, ListQuery};
use crate::errors::{AppError, AppResult};
use crate::events::{self, Actor, AppEvent, Audited, EntityChange, EntityChanged, EventBus, Severity, TimelineEntry, TimelineKind};
use crate::notify::{Confirm, Notifier};

/// Status vocabulary of an entity type.
pub trait EntityStatus: Clone + PartialEq + fmt::Display + fmt::Debug + Send + Sync + Serialize + DeserializeOwned {
    /// Terminal statuses forbid any further edit or transition.
    fn is_terminal(&self) -> bool {
        false
    }
}

/// A record type kept in an [`EntityStore`].
pub trait SyncEntity:
    Audited + Clone + fmt::Debug + Send + Sync + Serialize + DeserializeOwned + 'static
{
    type Status: EntityStatus;
    type Draft: Clone + fmt::Debug + Send + Sync + Serialize;
    type Patch: Clone + fmt::Debug + Send + Sync + Serialize;

    /// Path segment of the remote collection (e.g. "candidates")
    fn collection() -> &'static str;

    fn id(&self) -> &str;

    fn display_name(&self) -> String;

    fn status(&self) -> &Self::Status;

    /// Required identifying fields are present.
    fn is_valid(&self) -> bool;

    /// `needle` is already trimmed and lowercased.
    fn matches_search(&self, needle: &str) -> bool;

    fn department(&self) -> Option<&str>;

    fn created_at(&self) -> Option<DateTime<Utc>>;

    fn sort_name(&self) -> String {
        self.display_name().to_lowercase()
    }

    fn timeline(&self) -> &[TimelineEntry] {
        &[]
    }

    fn draft_name(draft: &Self::Draft) -> String;

    fn validate_draft(draft: &Self::Draft) -> Result<(), String>;

    // Materialization, used by backends that hold records in process.

    fn from_draft(id: String, draft: &Self::Draft, created_at: DateTime<Utc>) -> Self;

    fn apply_patch(&mut self, patch: &Self::Patch);

    fn set_status(&mut self, status: Self::Status);

    /// Append an audit entry; entity types without a timeline ignore it.
    fn record(&mut self, _entry: TimelineEntry) {}
}

/// Client-side cache of one remote collection.
pub struct EntityStore<E: SyncEntity> {
    api: Arc<dyn EntityApi<E>>,
    bus: EventBus,
    notifier: Notifier,
    confirm: Arc<dyn Confirm>,
    actor: Actor,
    query: ListQuery,
    items: Vec<E>,
    detail: Option<E>,
}

impl<E: SyncEntity> EntityStore<E> {
    pub fn new(
        api: Arc<dyn EntityApi<E>>,
        bus: EventBus,
        notifier: Notifier,
        confirm: Arc<dyn Confirm>,
        actor: Actor,
    ) -> Self {
        Self {
            api,
            bus,
            notifier,
            confirm,
            actor,
            query: ListQuery::default(),
            items: Vec::new(),
            detail: None,
        }
    }

    pub fn items(&self) -> &[E] {
        &self.items
    }

    pub fn query(&self) -> &ListQuery {
        &self.query
    }

    pub fn detail(&self) -> Option<&E> {
        self.detail.as_ref()
    }

    pub fn find(&self, id: &str) -> Option<&E> {
        self.items.iter().find(|record| record.id() == id)
    }

    pub fn view(&self, filter: &ViewFilter, now: DateTime<Utc>) -> Vec<&E> {
        derive_view(&self.items, filter, now)
    }

    pub fn page(&self, filter: &ViewFilter, now: DateTime<Utc>, page: usize, per_page: usize) -> Page<E> {
        let view: Vec<E> = self.view(filter, now).into_iter().cloned().collect();
        paginate(&view, page, per_page)
    }

    /// Re-fetch with the active query, replacing the cache on success.
    pub async fn try_refresh(&mut self) -> AppResult<()> {
        let records = self.api.list(&self.query).await?;
        tracing::debug!(
            entity = E::entity_type(),
            count = records.len(),
            page = self.query.page,
            "cache refreshed"
        );
        self.items = records;
        Ok(())
    }

    /// Background refresh: failures are logged and the cache is kept.
    pub async fn refresh(&mut self) {
        if let Err(err) = self.try_refresh().await {
            tracing::warn!(
                entity = E::entity_type(),
                error = %err,
                "refresh failed, keeping last known list"
            );
        }
    }

    /// Switch filters/pagination and reload.
    pub async fn set_query(&mut self, query: ListQuery) {
        self.query = query;
        self.refresh().await;
    }

    /// Open a record in the detail slot.
    pub async fn open(&mut self, id: &str) -> AppResult<&E> {
        let record = match self.find(id) {
            Some(record) => record.clone(),
            None => self.api.get(id).await?,
        };
        let record: &E = self.detail.insert(record);
        Ok(record)
    }

    pub fn close(&mut self) {
        self.detail = None;
    }

    pub async fn create(&mut self, draft: E::Draft) -> AppResult<E> {
        if let Err(reason) = E::validate_draft(&draft) {
            return Err(self.reject(reason));
        }

        let name = E::draft_name(&draft);
        let entry = TimelineEntry::created::<E>(&name, &self.actor);
        let created = self
            .api
            .create(&draft, &entry)
            .await
            .map_err(|err| self.fail("create", &name, err))?;

        self.reconcile(created.id()).await;
        self.announce(created.id(), EntityChange::Created, format!("{} {} created", E::label(), name));
        Ok(created)
    }

    pub async fn update(&mut self, id: &str, patch: E::Patch) -> AppResult<E> {
        let current = self.require_mutable(id).await?;
        let name = current.display_name();
        let entry = TimelineEntry::updated::<E>(&name, &self.actor)
            .with_severity(current.severity_for(TimelineKind::Updated));

        let updated = self
            .api
            .update(id, &patch, &entry)
            .await
            .map_err(|err| self.fail("update", &name, err))?;

        self.reconcile(id).await;
        self.announce(id, EntityChange::Updated, format!("{} {} updated", E::label(), name));
        Ok(updated)
    }

    /// Move a record to `status`.
    ///
    /// Returns `Ok(false)` when the operator declines the confirmation that a
    /// terminal transition requires.
    pub async fn change_status(&mut self, id: &str, status: E::Status) -> AppResult<bool> {
        let current = self.require_mutable(id).await?;
        let name = current.display_name();

        if current.status() == &status {
            return Err(self.reject(format!("{} {} is already {}", E::label(), name, status)));
        }

        if status.is_terminal() {
            let prompt = format!(
                "Mark {} {} as {}? This cannot be undone.",
                E::label().to_lowercase(),
                name,
                status
            );
            if !self.confirm.confirm(&prompt).await {
                tracing::info!(entity = E::entity_type(), id = %id, "terminal transition declined");
                return Ok(false);
            }
        }

        let severity = if status.is_terminal() {
            Severity::Critical
        } else {
            current.severity_for(TimelineKind::StatusChange)
        };
        let entry = TimelineEntry::status_change(&current.status().to_string(), &status.to_string(), &self.actor)
            .with_severity(severity);

        self.api
            .change_status(id, &status, &entry)
            .await
            .map_err(|err| self.fail("change status of", &name, err))?;

        self.reconcile(id).await;
        self.announce(
            id,
            EntityChange::StatusChanged,
            format!("{} {} moved to {}", E::label(), name, status),
        );
        Ok(true)
    }

    /// Delete after a confirmation naming the record; `Ok(false)` when declined.
    pub async fn delete(&mut self, id: &str) -> AppResult<bool> {
        let current = self.require_known(id).await?;
        let name = current.display_name();

        let prompt = format!("Delete {} {}?", E::label().to_lowercase(), name);
        if !self.confirm.confirm(&prompt).await {
            tracing::info!(entity = E::entity_type(), id = %id, "deletion declined");
            return Ok(false);
        }

        let entry = TimelineEntry::deleted::<E>(&name, &self.actor);
        self.api
            .delete(id, &entry)
            .await
            .map_err(|err| self.fail("delete", &name, err))?;

        if self.detail.as_ref().is_some_and(|open| open.id() == id) {
            self.detail = None;
        }
        self.reconcile(id).await;
        self.announce(id, EntityChange::Deleted, format!("{} {} deleted", E::label(), name));
        Ok(true)
    }

    async fn require_known(&self, id: &str) -> AppResult<E> {
        if let Some(record) = self.find(id).or(self.detail.as_ref().filter(|open| open.id() == id)) {
            return Ok(record.clone());
        }
        self.api.get(id).await.map_err(|err| {
            self.notifier.error(err.user_message());
            err
        })
    }

    async fn require_mutable(&self, id: &str) -> AppResult<E> {
        let current = self.require_known(id).await?;
        if current.status().is_terminal() {
            return Err(self.reject(format!(
                "{} {} is {} and can no longer be changed",
                E::label(),
                current.display_name(),
                current.status()
            )));
        }
        Ok(current)
    }

    /// Re-fetch the list and the open detail after a successful mutation.
    async fn reconcile(&mut self, id: &str) {
        self.refresh().await;

        let Some(open) = self.detail.as_ref() else { return };
        if open.id() != id {
            return;
        }

        if let Some(fresh) = self.find(id).cloned() {
            self.detail = Some(fresh);
            return;
        }

        match self.api.get(id).await {
            Ok(fresh) => self.detail = Some(fresh),
            Err(err) => tracing::warn!(
                entity = E::entity_type(),
                id = %id,
                error = %err,
                "detail refresh failed"
            ),
        }
    }

    fn announce(&self, id: &str, change: EntityChange, message: String) {
        tracing::info!(entity = E::entity_type(), id = %id, change = ?change, "mutation applied");
        self.notifier.success(message);
        events::publish(
            &self.bus,
            Some(&self.actor.id),
            AppEvent::EntityChanged(EntityChanged {
                entity_type: E::entity_type().to_string(),
                entity_id: id.to_string(),
                change,
            }),
        );
    }

    fn reject(&self, reason: String) -> AppError {
        tracing::warn!(entity = E::entity_type(), reason = %reason, "mutation refused");
        self.notifier.error(reason.clone());
        AppError::validation(reason)
    }

    fn fail(&self, action: &str, name: &str, err: AppError) -> AppError {
        tracing::error!(
            entity = E::entity_type(),
            target = %name,
            error = %err,
            "failed to {action} record"
        );
        self.notifier.error(format!("Failed to {action} {name}: {}", err.user_message()));
        err
    }
}
