use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use solace_shared::{HabitCreate, HabitDto, JournalCreate, JournalDto};
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::error::SyncError;
use crate::item::TrackedItem;

/// Backend resource holding a collection of tracked items.
#[async_trait]
pub trait Remote<T: TrackedItem>: Send + Sync {
    async fn fetch_all(&self) -> Result<Vec<T>, SyncError>;

    /// Sends the complete next state of `item`.
    async fn update(&self, item: &T) -> Result<(), SyncError>;

    async fn delete(&self, id: &T::Id) -> Result<(), SyncError>;
}

#[async_trait]
impl<T, R> Remote<T> for Arc<R>
where
    T: TrackedItem,
    R: Remote<T> + ?Sized,
{
    async fn fetch_all(&self) -> Result<Vec<T>, SyncError> {
        (**self).fetch_all().await
    }

    async fn update(&self, item: &T) -> Result<(), SyncError> {
        (**self).update(item).await
    }

    async fn delete(&self, id: &T::Id) -> Result<(), SyncError> {
        (**self).delete(id).await
    }
}

#[async_trait]
pub trait HabitBackend: Send + Sync {
    async fn list_habits(&self, user_id: &str) -> Result<Vec<HabitDto>, SyncError>;

    /// Completion flags for the last seven days, oldest first.
    async fn habit_days(&self, habit_id: i64) -> Result<Vec<bool>, SyncError>;

    async fn add_habit(&self, create: &HabitCreate) -> Result<HabitDto, SyncError>;

    async fn complete_habit(
        &self,
        habit_id: i64,
        date: Option<NaiveDate>,
    ) -> Result<bool, SyncError>;
}

#[async_trait]
impl<B: HabitBackend + ?Sized> HabitBackend for Arc<B> {
    async fn list_habits(&self, user_id: &str) -> Result<Vec<HabitDto>, SyncError> {
        (**self).list_habits(user_id).await
    }

    async fn habit_days(&self, habit_id: i64) -> Result<Vec<bool>, SyncError> {
        (**self).habit_days(habit_id).await
    }

    async fn add_habit(&self, create: &HabitCreate) -> Result<HabitDto, SyncError> {
        (**self).add_habit(create).await
    }

    async fn complete_habit(
        &self,
        habit_id: i64,
        date: Option<NaiveDate>,
    ) -> Result<bool, SyncError> {
        (**self).complete_habit(habit_id, date).await
    }
}

#[async_trait]
pub trait JournalBackend: Send + Sync {
    async fn list_journals(&self, user_id: &str) -> Result<Vec<JournalDto>, SyncError>;

    async fn add_journal(&self, create: &JournalCreate) -> Result<JournalDto, SyncError>;
}

#[async_trait]
impl<B: JournalBackend + ?Sized> JournalBackend for Arc<B> {
    async fn list_journals(&self, user_id: &str) -> Result<Vec<JournalDto>, SyncError> {
        (**self).list_journals(user_id).await
    }

    async fn add_journal(&self, create: &JournalCreate) -> Result<JournalDto, SyncError> {
        (**self).add_journal(create).await
    }
}

/// Supplies bearer tokens. Called once per request; implementations
/// must not hand back a cached token that may have expired.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token(&self) -> Result<String, SyncError>;
}

#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

#[async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self) -> Result<String, SyncError> {
        Ok(self.0.clone())
    }
}

/// Reads the token from an environment variable on every call, so an
/// external refresher can rotate it while we run.
#[derive(Debug, Clone)]
pub struct EnvToken {
    pub var: String,
}

#[async_trait]
impl TokenProvider for EnvToken {
    async fn token(&self) -> Result<String, SyncError> {
        let value = std::env::var(&self.var).map_err(|_| {
            SyncError::Unauthenticated(format!("environment variable {} is not set", self.var))
        })?;
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(SyncError::Unauthenticated(format!(
                "environment variable {} is empty",
                self.var
            )));
        }
        Ok(trimmed.to_string())
    }
}

/// Runs a shell command per request and uses its trimmed stdout.
#[derive(Debug, Clone)]
pub struct CommandToken {
    pub command: String,
}

#[async_trait]
impl TokenProvider for CommandToken {
    #[instrument(skip(self))]
    async fn token(&self) -> Result<String, SyncError> {
        let output = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .output()
            .await
            .map_err(|err| SyncError::Unauthenticated(format!("failed to run token command: {err}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SyncError::Unauthenticated(format!(
                "token command exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if token.is_empty() {
            return Err(SyncError::Unauthenticated(
                "token command printed nothing".to_string(),
            ));
        }
        debug!(len = token.len(), "obtained token from command");
        Ok(token)
    }
}
