use serde::{
  Deserialize,
  Deserializer,
  Serialize
};

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct CheckInDto {
  #[serde(
    default,
    deserialize_with = "lenient_id"
  )]
  pub id:          Option<i64>,
  #[serde(default)]
  pub user_id:     String,
  pub title:       String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub time:        String,
  pub completed:   bool,
  pub active:      bool
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct HabitDto {
  #[serde(
    default,
    deserialize_with = "lenient_id"
  )]
  pub id:          Option<i64>,
  #[serde(default)]
  pub user_id:     String,
  pub name:        String,
  #[serde(default)]
  pub description: String,
  pub target:      i64,
  pub created_at:  Option<String>
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
pub struct HabitCreate {
  pub user_id:     String,
  pub name:        String,
  pub description: String,
  pub target:      u32
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct JournalDto {
  #[serde(
    default,
    deserialize_with = "lenient_id"
  )]
  pub id:         Option<i64>,
  pub content:    String,
  #[serde(default)]
  pub user_id:    String,
  pub created_at: Option<String>
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
pub struct JournalCreate {
  pub user_id: String,
  pub content: String
}

/// The backend types record ids as
/// integers but some routes echo them
/// back as strings.
fn lenient_id<'de, D>(
  deserializer: D
) -> Result<Option<i64>, D::Error>
where
  D: Deserializer<'de>
{
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum RawId {
    Int(i64),
    Text(String)
  }

  match Option::<RawId>::deserialize(
    deserializer
  )? {
    | None => Ok(None),
    | Some(RawId::Int(value)) => {
      Ok(Some(value))
    }
    | Some(RawId::Text(text)) => text
      .trim()
      .parse::<i64>()
      .map(Some)
      .map_err(|_| {
        serde::de::Error::custom(
          format!(
            "invalid record id: \
             {text:?}"
          )
        )
      })
  }
}
