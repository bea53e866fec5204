//! Realtime-database feed over its REST interface.
//!
//! Collections live at `{database_url}/{collection}.json`. A `GET` returns
//! the whole collection as an object keyed by record id (or `null` when
//! empty); a `POST` appends a record and answers `{"name": "<id>"}`.
//! Live updates are emulated by polling and only delivered when the
//! collection actually changed.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::retry::{self, RetryPolicy};
use crate::{
    Collection, FeedError, NewAlert, NewReport, RawRecord, RemoteFeed, SnapshotCallback,
    Subscription,
};

/// Default interval between snapshot polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Connection settings for [`RtdbFeed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtdbConfig {
    /// Base URL of the database, e.g. `https://relief-default-rtdb.firebaseio.com`.
    pub database_url: String,
    /// Auth token appended as the `auth` query parameter.
    pub auth_token: Option<String>,
    /// Interval between snapshot polls.
    pub poll_interval: Duration,
}

impl RtdbConfig {
    /// Settings for `database_url` with no auth and the default poll
    /// interval.
    #[must_use]
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            auth_token: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// REST endpoint of a collection.
    #[must_use]
    pub fn collection_url(&self, collection: Collection) -> String {
        format!(
            "{}/{}.json",
            self.database_url.trim_end_matches('/'),
            collection.as_ref()
        )
    }
}

/// [`RemoteFeed`] backed by a hosted realtime database.
#[derive(Debug, Clone)]
pub struct RtdbFeed {
    client: reqwest::Client,
    config: RtdbConfig,
}

impl RtdbFeed {
    /// Creates a feed client.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::Http`] if the HTTP client cannot be built.
    pub fn new(config: RtdbConfig) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("relief-map/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client, config })
    }

    /// The settings this feed was created with.
    #[must_use]
    pub const fn config(&self) -> &RtdbConfig {
        &self.config
    }

    fn request(&self, method: reqwest::Method, collection: Collection) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, self.config.collection_url(collection));
        match &self.config.auth_token {
            Some(token) => builder.query(&[("auth", token)]),
            None => builder,
        }
    }

    /// Fetches the current contents of a collection.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError`] if the request fails or the body is not a
    /// collection.
    pub async fn fetch(&self, collection: Collection) -> Result<Vec<RawRecord>, FeedError> {
        let body = retry::send_json(RetryPolicy::READ, || {
            self.request(reqwest::Method::GET, collection)
        })
        .await?;
        parse_collection(body)
    }

    async fn subscribe(
        &self,
        collection: Collection,
        on_snapshot: SnapshotCallback,
    ) -> Result<Subscription, FeedError> {
        let initial = self
            .fetch(collection)
            .await
            .map_err(|e| FeedError::Subscription {
                collection,
                message: e.to_string(),
            })?;
        log::info!(
            "Subscribed to '{collection}' ({} records, polling every {:?})",
            initial.len(),
            self.config.poll_interval
        );
        on_snapshot(initial.clone());

        let feed = self.clone();
        let handle = tokio::spawn(async move {
            let mut last = initial;
            let mut interval = tokio::time::interval(feed.config.poll_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            interval.tick().await;
            loop {
                interval.tick().await;
                match feed.fetch(collection).await {
                    Ok(records) if records != last => {
                        log::debug!("'{collection}' changed: {} records", records.len());
                        last = records;
                        on_snapshot(last.clone());
                    }
                    Ok(_) => {}
                    Err(e) => log::warn!("Polling '{collection}' failed: {e}"),
                }
            }
        });

        Ok(Subscription::new(move || handle.abort()))
    }

    async fn push(&self, collection: Collection, body: Value) -> Result<String, FeedError> {
        let body = with_server_fields(body, collection);
        let response = retry::send_json(RetryPolicy::WRITE, || {
            self.request(reqwest::Method::POST, collection).json(&body)
        })
        .await
        .map_err(|e| FeedError::Write {
            collection,
            message: e.to_string(),
        })?;

        let id = parse_push_name(&response).map_err(|e| FeedError::Write {
            collection,
            message: e.to_string(),
        })?;
        log::info!("Created {collection} record {id}");
        Ok(id)
    }
}

/// Server-side timestamp placeholder.
fn server_timestamp() -> Value {
    let mut placeholder = Map::new();
    placeholder.insert(".sv".to_string(), Value::from("timestamp"));
    Value::Object(placeholder)
}

/// Adds the fields the store fills in on write.
fn with_server_fields(mut body: Value, collection: Collection) -> Value {
    if let Some(object) = body.as_object_mut() {
        object.insert("createdAt".to_string(), server_timestamp());
        match collection {
            Collection::Reports => {
                object.insert("updatedAt".to_string(), server_timestamp());
            }
            Collection::Alerts => {
                object.insert("active".to_string(), Value::Bool(true));
            }
        }
    }
    body
}

/// Turns a collection body into records. `null` means an empty collection.
fn parse_collection(body: Value) -> Result<Vec<RawRecord>, FeedError> {
    match body {
        Value::Null => Ok(Vec::new()),
        Value::Object(entries) => Ok(entries
            .into_iter()
            .map(|(id, fields)| RawRecord::new(id, fields))
            .collect()),
        other => Err(FeedError::Decode {
            message: format!("expected an object of records, got {other}"),
        }),
    }
}

fn parse_push_name(response: &Value) -> Result<String, FeedError> {
    response
        .get("name")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .ok_or_else(|| FeedError::Decode {
            message: format!("missing 'name' in write response: {response}"),
        })
}

#[async_trait]
impl RemoteFeed for RtdbFeed {
    async fn subscribe_reports(
        &self,
        on_snapshot: SnapshotCallback,
    ) -> Result<Subscription, FeedError> {
        self.subscribe(Collection::Reports, on_snapshot).await
    }

    async fn subscribe_alerts(
        &self,
        on_snapshot: SnapshotCallback,
    ) -> Result<Subscription, FeedError> {
        self.subscribe(Collection::Alerts, on_snapshot).await
    }

    async fn create_report(&self, report: &NewReport) -> Result<String, FeedError> {
        self.push(Collection::Reports, serde_json::to_value(report)?)
            .await
    }

    async fn create_alert(&self, alert: &NewAlert) -> Result<String, FeedError> {
        self.push(Collection::Alerts, serde_json::to_value(alert)?)
            .await
    }
}
