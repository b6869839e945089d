use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Weak};

use anyhow::anyhow;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::store::{ItemStore, Shared};
use crate::error::SyncError;
use crate::item::{CheckIn, CheckInFields, TrackedItem};
use crate::remote::Remote;

/// What a second operation on an entity with one already in flight
/// does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// Fail fast with [`SyncError::Busy`].
    #[default]
    Reject,
    /// Wait for the pending operation to settle, then run.
    Queue,
}

impl FromStr for ConflictPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" | "busy" => Ok(ConflictPolicy::Reject),
            "queue" | "wait" => Ok(ConflictPolicy::Queue),
            other => Err(anyhow!("invalid sync.on_conflict value: {other}")),
        }
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictPolicy::Reject => f.write_str("reject"),
            ConflictPolicy::Queue => f.write_str("queue"),
        }
    }
}

/// Sole writer of an [`ItemStore`].
///
/// Holds the store weakly, so a controller never keeps a closed view's
/// state alive and never writes to it after teardown.
pub struct MutationController<T: TrackedItem, R> {
    store: Weak<Shared<T>>,
    remote: R,
    policy: ConflictPolicy,
}

/// What a [`Claim`] does to its entity when it is dropped.
enum Settle<F> {
    Release,
    Restore(F),
    Remove,
}

/// Pending mark on one entity.
///
/// The entity is released when the claim drops, including when the
/// operation's future is dropped mid-flight. A claim still holding
/// `Settle::Restore` puts the pre-mutation fields back.
struct Claim<T: TrackedItem> {
    store: Weak<Shared<T>>,
    id: T::Id,
    settle: Settle<T::Fields>,
}

impl<T: TrackedItem> Drop for Claim<T> {
    fn drop(&mut self) {
        let Some(shared) = self.store.upgrade().filter(|shared| shared.is_open()) else {
            debug!(id = %self.id, "view closed before the operation settled; discarding");
            return;
        };

        {
            let mut state = shared.lock();
            state.release(&self.id);
            let changed = match std::mem::replace(&mut self.settle, Settle::Release) {
                Settle::Release => false,
                Settle::Restore(before) => match state.find(&self.id) {
                    Some(idx) => {
                        state.item_mut(idx).set_fields(before);
                        true
                    }
                    None => false,
                },
                Settle::Remove => state
                    .find(&self.id)
                    .map(|idx| state.remove(idx))
                    .is_some(),
            };
            if changed {
                shared.publish(&mut state);
            }
        }
        shared.released.notify_waiters();
    }
}

/// State captured when an update is applied locally.
struct Applied<T: TrackedItem> {
    claim: Claim<T>,
    next: T,
}

impl<T, R> MutationController<T, R>
where
    T: TrackedItem,
    R: Remote<T>,
{
    pub fn new(store: &ItemStore<T>, remote: R, policy: ConflictPolicy) -> Self {
        Self {
            store: store.downgrade(),
            remote,
            policy,
        }
    }

    /// Bulk fetch at mount. Replaces the whole collection.
    #[instrument(skip(self))]
    pub async fn load(&self) -> Result<usize, SyncError> {
        self.shared()?;
        let items = self.remote.fetch_all().await?;

        let shared = self.shared()?;
        let mut state = shared.lock();
        if let Some(id) = state.first_pending() {
            warn!(pending = %id, "refusing to replace collection with operations in flight");
            return Err(SyncError::busy(id));
        }
        state.replace(items)?;
        shared.publish(&mut state);
        let count = state.len();
        info!(count, "loaded collection");
        Ok(count)
    }

    /// Applies `mutator` to the fields of `id` immediately, then asks
    /// the backend to confirm. On any remote failure, or if this future
    /// is dropped before the backend answers, the previous fields are
    /// restored verbatim.
    #[instrument(skip(self, mutator), fields(id = %id, request_id = tracing::field::Empty))]
    pub async fn mutate<F>(&self, id: &T::Id, mutator: F) -> Result<T, SyncError>
    where
        F: FnOnce(&T::Fields) -> T::Fields,
    {
        let request_id = Uuid::new_v4();
        tracing::Span::current().record("request_id", tracing::field::display(request_id));

        let Applied { mut claim, next } = self.apply(id, mutator).await?;
        debug!(%request_id, "optimistic value applied; confirming");

        let result = self.remote.update(&next).await;
        if result.is_ok() {
            claim.settle = Settle::Release;
        }
        drop(claim);

        match result {
            Ok(()) => {
                info!(%request_id, "mutation confirmed");
                Ok(next)
            }
            Err(err) => {
                warn!(%request_id, error = %err, "mutation rolled back");
                Err(err)
            }
        }
    }

    /// Confirmed-first removal: the local entry disappears only after
    /// the backend acknowledges the delete.
    #[instrument(skip(self), fields(id = %id))]
    pub async fn delete_item(&self, id: &T::Id) -> Result<T, SyncError> {
        let (shared, mut claim, claimed) = self.claim(id).await?;
        drop(shared);

        let result = self.remote.delete(id).await;
        if result.is_ok() {
            claim.settle = Settle::Remove;
        }
        drop(claim);

        match result {
            Ok(()) => {
                info!("delete confirmed");
                Ok(claimed)
            }
            Err(err) => {
                warn!(error = %err, "delete failed; local collection unchanged");
                Err(err)
            }
        }
    }

    fn shared(&self) -> Result<Arc<Shared<T>>, SyncError> {
        self.store
            .upgrade()
            .filter(|shared| shared.is_open())
            .ok_or(SyncError::Detached)
    }

    /// Applies the mutation once `id` has been claimed. Nothing awaits
    /// between the claim and the write, so the entry is still present.
    async fn apply<F>(&self, id: &T::Id, mutator: F) -> Result<Applied<T>, SyncError>
    where
        F: FnOnce(&T::Fields) -> T::Fields,
    {
        let (shared, mut claim, _) = self.claim(id).await?;
        let mut state = shared.lock();
        let Some(idx) = state.find(id) else {
            drop(state);
            return Err(SyncError::not_found(id));
        };

        let before = state.item(idx).fields();
        let next_fields = mutator(&before);
        state.item_mut(idx).set_fields(next_fields);
        let next = state.item(idx).clone();
        shared.publish(&mut state);
        drop(state);

        claim.settle = Settle::Restore(before);
        Ok(Applied { claim, next })
    }

    /// Marks `id` pending, waiting out an operation already in flight
    /// when the policy says so. Returns the entry as it was when claimed.
    async fn claim(&self, id: &T::Id) -> Result<(Arc<Shared<T>>, Claim<T>, T), SyncError> {
        loop {
            let shared = self.shared()?;
            let released = Arc::clone(&shared.released);
            let notified = released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = shared.lock();
                let idx = state.find(id).ok_or_else(|| SyncError::not_found(id))?;
                if state.claim(id) {
                    let current = state.item(idx).clone();
                    drop(state);
                    let claim = Claim {
                        store: Arc::downgrade(&shared),
                        id: id.clone(),
                        settle: Settle::Release,
                    };
                    return Ok((shared, claim, current));
                }
                if self.policy == ConflictPolicy::Reject {
                    debug!("entity busy; rejecting");
                    return Err(SyncError::busy(id));
                }
            }

            debug!("entity busy; queued behind pending operation");
            drop(shared);
            notified.await;
        }
    }
}

impl<R> MutationController<CheckIn, R>
where
    R: Remote<CheckIn>,
{
    pub async fn toggle_completed(&self, id: i64) -> Result<CheckIn, SyncError> {
        self.mutate(&id, |fields: &CheckInFields| CheckInFields {
            completed: !fields.completed,
            ..fields.clone()
        })
        .await
    }

    pub async fn toggle_active(&self, id: i64) -> Result<CheckIn, SyncError> {
        self.mutate(&id, |fields: &CheckInFields| CheckInFields {
            active: !fields.active,
            ..fields.clone()
        })
        .await
    }
}
