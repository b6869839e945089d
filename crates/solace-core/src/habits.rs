use chrono::NaiveDate;
use solace_shared::{HabitCreate, HabitDto};
use tracing::{debug, info, instrument, warn};

use crate::error::SyncError;
use crate::remote::HabitBackend;
use crate::streak::{self, WINDOW_DAYS};

const MIN_TEXT_LEN: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Habit {
    pub id: i64,
    pub user_id: String,
    pub name: String,
    pub description: String,
    pub target: u32,
    pub created_at: Option<NaiveDate>,
}

/// A habit joined with its recent history, ready to render.
#[derive(Debug, Clone, PartialEq)]
pub struct HabitView {
    pub habit: Habit,
    /// Oldest first.
    pub days: [bool; WINDOW_DAYS],
    pub streak: u8,
    pub progress: f64,
}

impl TryFrom<HabitDto> for Habit {
    type Error = SyncError;

    fn try_from(dto: HabitDto) -> Result<Self, Self::Error> {
        let id = dto
            .id
            .ok_or_else(|| SyncError::MalformedPayload(format!("habit {:?} has no id", dto.name)))?;
        let target = u32::try_from(dto.target).map_err(|_| {
            SyncError::MalformedPayload(format!("habit {id} has invalid target {}", dto.target))
        })?;
        let created_at = dto
            .created_at
            .as_deref()
            .map(parse_created_date)
            .transpose()?;

        Ok(Self {
            id,
            user_id: dto.user_id,
            name: dto.name,
            description: dto.description,
            target,
            created_at,
        })
    }
}

fn parse_created_date(raw: &str) -> Result<NaiveDate, SyncError> {
    let date_part = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .map_err(|err| SyncError::MalformedPayload(format!("invalid habit date {raw:?}: {err}")))
}

/// Validated input of the "add habit" form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewHabit {
    pub name: String,
    pub description: String,
    pub target: u32,
}

impl NewHabit {
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.name.trim().chars().count() < MIN_TEXT_LEN {
            return Err(SyncError::Invalid(
                "name must be at least 2 characters".to_string(),
            ));
        }
        if self.description.trim().chars().count() < MIN_TEXT_LEN {
            return Err(SyncError::Invalid(
                "description must be at least 2 characters".to_string(),
            ));
        }
        Ok(())
    }
}

pub struct HabitService<B> {
    backend: B,
    user_id: String,
}

impl<B: HabitBackend> HabitService<B> {
    pub fn new(backend: B, user_id: impl Into<String>) -> Self {
        Self {
            backend,
            user_id: user_id.into(),
        }
    }

    /// Fetches every habit of the user together with its last week.
    #[instrument(skip(self), fields(user_id = %self.user_id))]
    pub async fn overview(&self) -> Result<Vec<HabitView>, SyncError> {
        let dtos = self.backend.list_habits(&self.user_id).await?;
        let mut views = Vec::with_capacity(dtos.len());

        for dto in dtos {
            let habit = Habit::try_from(dto)?;
            let raw_days = self.backend.habit_days(habit.id).await?;
            if raw_days.len() != WINDOW_DAYS {
                warn!(
                    habit_id = habit.id,
                    len = raw_days.len(),
                    "unexpected day history length; normalizing"
                );
            }
            let days = streak::normalize(&raw_days);
            let current = streak::streak(&days);
            debug!(habit_id = habit.id, streak = current, "computed streak");
            views.push(HabitView {
                progress: streak::progress(current, habit.target),
                streak: current,
                days,
                habit,
            });
        }

        info!(count = views.len(), "loaded habits");
        Ok(views)
    }

    #[instrument(skip(self, new_habit), fields(name = %new_habit.name))]
    pub async fn add(&self, new_habit: NewHabit) -> Result<Habit, SyncError> {
        new_habit.validate()?;
        let create = HabitCreate {
            user_id: self.user_id.clone(),
            name: new_habit.name.trim().to_string(),
            description: new_habit.description.trim().to_string(),
            target: new_habit.target,
        };
        let created = Habit::try_from(self.backend.add_habit(&create).await?)?;
        info!(habit_id = created.id, "habit created");
        Ok(created)
    }

    /// Marks the habit done for `date` (today when `None`).
    #[instrument(skip(self))]
    pub async fn complete(&self, habit_id: i64, date: Option<NaiveDate>) -> Result<(), SyncError> {
        if self.backend.complete_habit(habit_id, date).await? {
            info!(habit_id, "habit completion recorded");
            Ok(())
        } else {
            Err(SyncError::RemoteRejected {
                status: 200,
                body: "completion was not recorded".to_string(),
            })
        }
    }
}
