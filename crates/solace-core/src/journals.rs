use chrono::{NaiveDate, NaiveDateTime};
use solace_shared::{JournalCreate, JournalDto};
use tracing::{info, instrument};

use crate::error::SyncError;
use crate::remote::JournalBackend;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Journal {
    pub id: i64,
    pub user_id: String,
    pub content: String,
    pub created_at: Option<NaiveDateTime>,
}

impl TryFrom<JournalDto> for Journal {
    type Error = SyncError;

    fn try_from(dto: JournalDto) -> Result<Self, Self::Error> {
        let id = dto
            .id
            .ok_or_else(|| SyncError::MalformedPayload("journal entry has no id".to_string()))?;
        let created_at = dto
            .created_at
            .as_deref()
            .map(parse_timestamp)
            .transpose()?;
        Ok(Self {
            id,
            user_id: dto.user_id,
            content: dto.content,
            created_at,
        })
    }
}

/// Accepts ISO timestamps with `T` or space separators, with or without
/// fractional seconds, and bare dates.
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, SyncError> {
    let trimmed = raw.trim();
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(parsed);
        }
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .ok_or_else(|| SyncError::MalformedPayload(format!("invalid timestamp {raw:?}")))
}

pub struct JournalService<B> {
    backend: B,
    user_id: String,
}

impl<B: JournalBackend> JournalService<B> {
    pub fn new(backend: B, user_id: impl Into<String>) -> Self {
        Self {
            backend,
            user_id: user_id.into(),
        }
    }

    /// Journal history, newest first.
    #[instrument(skip(self), fields(user_id = %self.user_id))]
    pub async fn history(&self) -> Result<Vec<Journal>, SyncError> {
        let mut entries = self
            .backend
            .list_journals(&self.user_id)
            .await?
            .into_iter()
            .map(Journal::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        info!(count = entries.len(), "loaded journal history");
        Ok(entries)
    }

    #[instrument(skip(self, content), fields(content_len = content.len()))]
    pub async fn add(&self, content: &str) -> Result<Journal, SyncError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(SyncError::Invalid("journal entry is empty".to_string()));
        }
        let create = JournalCreate {
            user_id: self.user_id.clone(),
            content: content.to_string(),
        };
        let created = Journal::try_from(self.backend.add_journal(&create).await?)?;
        info!(journal_id = created.id, "journal entry saved");
        Ok(created)
    }
}
