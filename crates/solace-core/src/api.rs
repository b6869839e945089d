use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Method, StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use solace_shared::{CheckInDto, HabitCreate, HabitDto, JournalCreate, JournalDto};
use tracing::{debug, instrument, warn};

use crate::error::SyncError;
use crate::item::CheckIn;
use crate::remote::{HabitBackend, JournalBackend, Remote, TokenProvider};

const CHECKINS_LIST_PATH: &str = "checkins";
const CHECKINS_ITEM_PATH: &str = "api/checkins";
const HABITS_PATH: &str = "api/habits";
const HABIT_DAYS_PATH: &str = "api/habit/days";
const ADD_HABIT_PATH: &str = "api/addHabit";
const COMPLETE_HABIT_PATH: &str = "api/completeHabit";
const JOURNALS_PATH: &str = "api/journals/";
const ADD_JOURNAL_PATH: &str = "api/addjournal";

/// Largest error body kept in a [`SyncError::RemoteRejected`].
const MAX_ERROR_BODY: usize = 512;

/// Thin REST client for the wellness backend.
///
/// Every call asks the token provider for a fresh bearer token and
/// validates the response body against the typed DTOs before handing it
/// on.
pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
    tokens: Arc<dyn TokenProvider>,
}

impl ApiClient {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Self, SyncError> {
        let mut base = Url::parse(base_url.trim())
            .map_err(|err| SyncError::Invalid(format!("invalid backend url {base_url:?}: {err}")))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| SyncError::TransportFailure(format!("failed building HTTP client: {err}")))?;

        Ok(Self { http, base, tokens })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    pub(crate) fn endpoint(&self, path: &str, query: &[(&str, String)]) -> Result<Url, SyncError> {
        let mut url = self
            .base
            .join(path)
            .map_err(|err| SyncError::Invalid(format!("invalid endpoint {path:?}: {err}")))?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    #[instrument(skip_all, fields(method = %method, url = %url))]
    async fn send<B>(&self, method: Method, url: Url, body: Option<&B>) -> Result<String, SyncError>
    where
        B: Serialize + ?Sized + Sync,
    {
        let token = self.tokens.token().await?;
        let mut request = self
            .http
            .request(method, url)
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "application/json");

        if let Some(body) = body {
            let payload = serde_json::to_vec(body)
                .map_err(|err| SyncError::Invalid(format!("failed encoding request: {err}")))?;
            request = request
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(payload);
        }

        let response = request.send().await.map_err(|err| {
            warn!(error = %err, "request failed");
            SyncError::TransportFailure(err.to_string())
        })?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            warn!(status = status.as_u16(), "backend rejected request");
            return Err(rejected(status, &text));
        }

        debug!(status = status.as_u16(), bytes = text.len(), "request succeeded");
        Ok(text)
    }

    async fn get_json<R: DeserializeOwned>(&self, url: Url) -> Result<R, SyncError> {
        let text = self.send::<()>(Method::GET, url, None).await?;
        decode(&text)
    }

    async fn post_json<B, R>(&self, url: Url, body: &B) -> Result<R, SyncError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let text = self.send(Method::POST, url, Some(body)).await?;
        decode(&text)
    }
}

#[async_trait]
impl Remote<CheckIn> for ApiClient {
    #[instrument(skip(self))]
    async fn fetch_all(&self) -> Result<Vec<CheckIn>, SyncError> {
        let url = self.endpoint(CHECKINS_LIST_PATH, &[])?;
        let dtos: Vec<CheckInDto> = self.get_json(url).await?;
        dtos.into_iter().map(CheckIn::try_from).collect()
    }

    #[instrument(skip(self, item), fields(id = item.id))]
    async fn update(&self, item: &CheckIn) -> Result<(), SyncError> {
        let url = self.endpoint(&format!("{CHECKINS_ITEM_PATH}/{}", item.id), &[])?;
        let body = CheckInDto::from(item);
        self.send(Method::PUT, url, Some(&body)).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: &i64) -> Result<(), SyncError> {
        let url = self.endpoint(&format!("{CHECKINS_ITEM_PATH}/{id}"), &[])?;
        self.send::<()>(Method::DELETE, url, None).await?;
        Ok(())
    }
}

#[async_trait]
impl HabitBackend for ApiClient {
    #[instrument(skip(self))]
    async fn list_habits(&self, user_id: &str) -> Result<Vec<HabitDto>, SyncError> {
        let url = self.endpoint(HABITS_PATH, &[("user_id", user_id.to_string())])?;
        self.get_json(url).await
    }

    #[instrument(skip(self))]
    async fn habit_days(&self, habit_id: i64) -> Result<Vec<bool>, SyncError> {
        let url = self.endpoint(HABIT_DAYS_PATH, &[("habitId", habit_id.to_string())])?;
        self.get_json(url).await
    }

    #[instrument(skip(self, create), fields(name = %create.name))]
    async fn add_habit(&self, create: &HabitCreate) -> Result<HabitDto, SyncError> {
        let url = self.endpoint(ADD_HABIT_PATH, &[])?;
        self.post_json(url, create).await
    }

    #[instrument(skip(self))]
    async fn complete_habit(
        &self,
        habit_id: i64,
        date: Option<NaiveDate>,
    ) -> Result<bool, SyncError> {
        let mut query = vec![("habitId", habit_id.to_string())];
        if let Some(date) = date {
            query.push(("date", date.format("%Y-%m-%d").to_string()));
        }
        let url = self.endpoint(COMPLETE_HABIT_PATH, &query)?;
        self.get_json(url).await
    }
}

#[async_trait]
impl JournalBackend for ApiClient {
    #[instrument(skip(self))]
    async fn list_journals(&self, user_id: &str) -> Result<Vec<JournalDto>, SyncError> {
        let url = self.endpoint(JOURNALS_PATH, &[("user_id", user_id.to_string())])?;
        self.get_json(url).await
    }

    #[instrument(skip(self, create), fields(content_len = create.content.len()))]
    async fn add_journal(&self, create: &JournalCreate) -> Result<JournalDto, SyncError> {
        let url = self.endpoint(ADD_JOURNAL_PATH, &[])?;
        self.post_json(url, create).await
    }
}

fn decode<R: DeserializeOwned>(text: &str) -> Result<R, SyncError> {
    serde_json::from_str(text).map_err(|err| {
        SyncError::MalformedPayload(format!("unexpected response body: {err}"))
    })
}

fn rejected(status: StatusCode, body: &str) -> SyncError {
    let mut body = body.trim().to_string();
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    SyncError::RemoteRejected {
        status: status.as_u16(),
        body,
    }
}
