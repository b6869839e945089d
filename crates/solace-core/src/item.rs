use std::fmt::{Debug, Display};
use std::hash::Hash;

use solace_shared::CheckInDto;

use crate::error::SyncError;

/// A backend-owned record mirrored locally.
///
/// The identity is fixed once the backend assigns it; everything that
/// may change lives in `Fields`, which is what gets snapshotted and
/// restored on rollback.
pub trait TrackedItem: Clone + Debug + Send + Sync + 'static {
    type Id: Clone + Eq + Hash + Debug + Display + Send + Sync + 'static;
    type Fields: Clone + PartialEq + Debug + Send + Sync + 'static;

    fn id(&self) -> &Self::Id;

    fn fields(&self) -> Self::Fields;

    fn set_fields(&mut self, fields: Self::Fields);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckIn {
    pub id: i64,
    pub user_id: String,
    pub title: String,
    pub description: String,
    pub time: String,
    pub completed: bool,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckInFields {
    pub title: String,
    pub description: String,
    pub time: String,
    pub completed: bool,
    pub active: bool,
}

impl TrackedItem for CheckIn {
    type Id = i64;
    type Fields = CheckInFields;

    fn id(&self) -> &i64 {
        &self.id
    }

    fn fields(&self) -> CheckInFields {
        CheckInFields {
            title: self.title.clone(),
            description: self.description.clone(),
            time: self.time.clone(),
            completed: self.completed,
            active: self.active,
        }
    }

    fn set_fields(&mut self, fields: CheckInFields) {
        self.title = fields.title;
        self.description = fields.description;
        self.time = fields.time;
        self.completed = fields.completed;
        self.active = fields.active;
    }
}

impl TryFrom<CheckInDto> for CheckIn {
    type Error = SyncError;

    fn try_from(dto: CheckInDto) -> Result<Self, Self::Error> {
        let id = dto.id.ok_or_else(|| {
            SyncError::MalformedPayload(format!("check-in {:?} has no id", dto.title))
        })?;
        Ok(Self {
            id,
            user_id: dto.user_id,
            title: dto.title,
            description: dto.description,
            time: dto.time,
            completed: dto.completed,
            active: dto.active,
        })
    }
}

impl From<&CheckIn> for CheckInDto {
    fn from(item: &CheckIn) -> Self {
        CheckInDto {
            id: Some(item.id),
            user_id: item.user_id.clone(),
            title: item.title.clone(),
            description: item.description.clone(),
            time: item.time.clone(),
            completed: item.completed,
            active: item.active,
        }
    }
}
