//! The sync cycle: pull source changes and mirror them downstream.

use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::feed::{ChangeBatch, SourceEntity, SourceFeed};
use crate::identity_map::IdentityMap;
use crate::ics;
use crate::mirror::DestinationMirror;
use crate::state::StateStore;
use crate::token::SyncToken;

/// Knobs for a [`Reconciler`].
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Poll the destination before syncing (informational)
    pub poll_destination: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        SyncOptions {
            poll_destination: true,
        }
    }
}

/// What one sync run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub created: usize,
    pub updated: usize,
    /// Mapped events that had vanished downstream and were created again
    pub recreated: usize,
    pub deleted: usize,
    /// Source events that could not be normalized
    pub skipped: usize,
    /// Source removals with no destination counterpart
    pub unmapped_removals: usize,
    /// Source polls that returned a batch
    pub batches: usize,
    /// Times a rejected source token forced a full enumeration
    pub full_resyncs: usize,
    pub destination_changes: usize,
}

impl SyncReport {
    /// Number of writes issued to the destination.
    pub fn mutations(&self) -> usize {
        self.created + self.updated + self.recreated + self.deleted
    }
}

/// Drives a source feed into a destination mirror, remembering progress in a state store.
pub struct Reconciler<S, D, St> {
    source: S,
    destination: D,
    store: St,
    options: SyncOptions,
}

impl<S, D, St> Reconciler<S, D, St>
where
    S: SourceFeed,
    D: DestinationMirror,
    St: StateStore,
{
    pub fn new(source: S, destination: D, store: St, options: SyncOptions) -> Self {
        Reconciler {
            source,
            destination,
            store,
            options,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn destination(&self) -> &D {
        &self.destination
    }

    pub fn store(&self) -> &St {
        &self.store
    }

    /// Run one full sync cycle.
    ///
    /// The identity map is persisted after every applied batch. Tokens are
    /// only persisted once the loop finishes, so an aborted run re-polls the
    /// same window next time.
    pub async fn sync(&mut self) -> SyncResult<SyncReport> {
        let mut report = SyncReport::default();

        let mut source_token = self.store.source_token()?;
        let mut destination_token = self.store.destination_token()?;

        if self.options.poll_destination {
            destination_token = self
                .poll_destination(destination_token, &mut report)
                .await?;
        }

        let mut map = self.store.identity_map()?;

        loop {
            let batch = match self.source.poll(source_token.as_ref()).await {
                Ok(batch) => batch,
                Err(e) if e.is_invalid_token() && source_token.is_some() => {
                    warn!("Source rejected sync token, starting a full sync: {}", e);
                    source_token = None;
                    report.full_resyncs += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };

            report.batches += 1;
            let was_empty = batch.is_empty();
            let next_token = batch.next_token.clone();

            info!(
                added = batch.added.len(),
                changed = batch.changed.len(),
                removed = batch.removed.len(),
                "Applying source batch"
            );

            let applied = self.apply_batch(batch, &mut map, &mut report).await;
            self.store.save_identity_map(&map)?;
            applied?;

            match next_token {
                Some(token) => {
                    source_token = Some(token);
                    if was_empty {
                        break;
                    }
                }
                None => break,
            }
        }

        self.store.set_source_token(source_token.as_ref())?;
        self.store
            .set_destination_token(destination_token.as_ref())?;

        info!(
            created = report.created,
            updated = report.updated,
            recreated = report.recreated,
            deleted = report.deleted,
            skipped = report.skipped,
            "Sync finished"
        );

        Ok(report)
    }

    /// Returns the destination token to persist.
    async fn poll_destination(
        &self,
        token: Option<SyncToken>,
        report: &mut SyncReport,
    ) -> SyncResult<Option<SyncToken>> {
        let (batch, polled_with) = match self.destination.poll(token.as_ref()).await {
            Ok(batch) => (batch, token),
            Err(e) if e.is_invalid_token() && token.is_some() => {
                warn!("Destination rejected sync token, re-listing: {}", e);
                (self.destination.poll(None).await?, None)
            }
            Err(e) => return Err(e),
        };

        report.destination_changes = batch.len();
        for event in batch.added.iter().chain(&batch.changed).chain(&batch.removed) {
            debug!(id = %event.id, status = %event.status, "Destination change");
        }

        Ok(batch.next_token.or(polled_with))
    }

    async fn apply_batch(
        &self,
        batch: ChangeBatch<SourceEntity>,
        map: &mut IdentityMap,
        report: &mut SyncReport,
    ) -> SyncResult<()> {
        for entity in batch.added.iter().chain(&batch.changed) {
            self.upsert(entity, map, report).await?;
        }

        for entity in &batch.removed {
            self.remove(entity, map, report).await?;
        }

        Ok(())
    }

    async fn upsert(
        &self,
        entity: &SourceEntity,
        map: &mut IdentityMap,
        report: &mut SyncReport,
    ) -> SyncResult<()> {
        let Some(data) = entity.data.as_deref() else {
            warn!(href = %entity.href, "Skipping source entry without calendar data");
            report.skipped += 1;
            return Ok(());
        };

        let event = match ics::normalize(data) {
            Ok(event) => event,
            Err(e @ SyncError::MalformedEvent(_)) => {
                warn!(href = %entity.href, "Skipping event: {}", e);
                report.skipped += 1;
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        map.remember_href(&entity.href, &event.uid);

        let Some(id) = map.destination_id(&event.uid).map(str::to_string) else {
            let id = self.destination.create(&event, &event.uid).await?;
            debug!(
                uid = %event.uid,
                id = %id,
                start = %event.start,
                all_day = event.is_all_day(),
                "Created"
            );
            map.insert(&event.uid, &id);
            report.created += 1;
            return Ok(());
        };

        match self.destination.update(&id, &event).await {
            Ok(()) => {
                debug!(uid = %event.uid, id = %id, start = %event.start, "Updated");
                report.updated += 1;
            }
            Err(e) if e.is_not_found() => {
                warn!(uid = %event.uid, id = %id, "Mirrored event is gone, creating it again");
                let new_id = self.destination.create(&event, &event.uid).await?;
                map.insert(&event.uid, &new_id);
                report.recreated += 1;
            }
            Err(e) => return Err(e),
        }

        Ok(())
    }

    async fn remove(
        &self,
        entity: &SourceEntity,
        map: &mut IdentityMap,
        report: &mut SyncReport,
    ) -> SyncResult<()> {
        let Some(uid) = removed_uid(entity, map) else {
            debug!(href = %entity.href, "Removal does not resolve to a UID");
            report.unmapped_removals += 1;
            return Ok(());
        };

        if let Some(current) = map.href_for_uid(&uid).filter(|h| *h != entity.href) {
            debug!(uid = %uid, href = %entity.href, current = %current, "Event moved, keeping it");
            report.unmapped_removals += 1;
            return Ok(());
        }

        match map.destination_id(&uid).map(str::to_string) {
            Some(id) => {
                self.destination.delete(&id).await?;
                debug!(uid = %uid, id = %id, "Deleted");
                report.deleted += 1;
            }
            None => {
                debug!(uid = %uid, "Removed event was never mirrored");
                report.unmapped_removals += 1;
            }
        }

        map.remove(&uid);
        Ok(())
    }
}

/// Resolve a removal to a UID: remembered href first, then any data it still
/// carries, then the resource name.
fn removed_uid(entity: &SourceEntity, map: &IdentityMap) -> Option<String> {
    if let Some(uid) = map.uid_for_href(&entity.href) {
        return Some(uid.to_string());
    }

    if let Some(event) = entity.data.as_deref().and_then(|d| ics::normalize(d).ok()) {
        return Some(event.uid);
    }

    uid_from_href(&entity.href)
}

fn uid_from_href(href: &str) -> Option<String> {
    let name = href.trim_end_matches('/').rsplit('/').next()?;
    let stem = name.strip_suffix(".ics")?;
    (!stem.is_empty()).then(|| stem.to_string())
}
