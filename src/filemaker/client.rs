use reqwest::{Method, StatusCode};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tokio::sync::Mutex;
use url::Url;

use super::types::{CreateResponse, Envelope, Record, RecordsResponse, SessionResponse};
use super::FileMakerError;
use crate::config::FileMakerConfig;

const PAGE_SIZE: usize = 100;

/// Data API client holding one cached session token.
///
/// A request answered with HTTP 401 drops the token, logs in again and is
/// retried exactly once.
pub struct FileMakerClient {
    http: reqwest::Client,
    base_url: Url,
    username: String,
    password: String,
    token: Mutex<Option<String>>,
}

impl FileMakerClient {
    pub fn new(config: &FileMakerConfig) -> Result<Self, FileMakerError> {
        if config.database.trim().is_empty() {
            return Err(FileMakerError::InvalidConfig("database must not be empty".to_string()));
        }
        if config.username.trim().is_empty() {
            return Err(FileMakerError::InvalidConfig("username must not be empty".to_string()));
        }

        let mut host = config.host.trim().to_string();
        if !host.ends_with('/') {
            host.push('/');
        }
        let base_url = Url::parse(&host)
            .and_then(|host| host.join(&format!("fmi/data/vLatest/databases/{}/", config.database)))
            .map_err(|err| FileMakerError::InvalidConfig(format!("host: {}", err)))?;

        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            http,
            base_url,
            username: config.username.clone(),
            password: config.password.clone(),
            token: Mutex::new(None),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, path: &str) -> Result<Url, FileMakerError> {
        self.base_url
            .join(path)
            .map_err(|err| FileMakerError::InvalidConfig(format!("path '{}': {}", path, err)))
    }

    async fn login(&self) -> Result<String, FileMakerError> {
        let response = self
            .http
            .post(self.url("sessions")?)
            .basic_auth(&self.username, Some(&self.password))
            .json(&json!({}))
            .send()
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(FileMakerError::Unauthorized);
        }

        let envelope = decode(response).await?;
        let session: SessionResponse = serde_json::from_value(envelope.response)
            .map_err(|err| FileMakerError::Decode(format!("session token: {}", err)))?;

        log::debug!("Opened FileMaker session");
        Ok(session.token)
    }

    async fn session_token(&self) -> Result<String, FileMakerError> {
        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_ref() {
            return Ok(token.clone());
        }
        let token = self.login().await?;
        *guard = Some(token.clone());
        Ok(token)
    }

    async fn invalidate(&self, stale: &str) {
        let mut guard = self.token.lock().await;
        // Another request may already have replaced it.
        if guard.as_deref() == Some(stale) {
            *guard = None;
        }
    }

    async fn request(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> Result<Envelope, FileMakerError> {
        let token = self.session_token().await?;
        let response = self.execute(method.clone(), url.clone(), body, &token).await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return decode(response).await;
        }

        log::info!("FileMaker session expired, logging in again");
        self.invalidate(&token).await;
        let token = self.session_token().await?;
        let response = self.execute(method, url, body, &token).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            self.invalidate(&token).await;
            return Err(FileMakerError::Unauthorized);
        }
        decode(response).await
    }

    async fn execute(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
        token: &str,
    ) -> Result<reqwest::Response, FileMakerError> {
        let mut builder = self.http.request(method, url).bearer_auth(token);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        Ok(builder.send().await?)
    }

    /// Reads one page of records; `offset` is 1-based like the Data API.
    ///
    /// An offset past the found set, or an empty layout, yields an empty page.
    pub async fn get_records(
        &self,
        layout: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Record>, FileMakerError> {
        let mut url = self.url(&format!("layouts/{}/records", layout))?;
        url.query_pairs_mut()
            .append_pair("_offset", &offset.max(1).to_string())
            .append_pair("_limit", &limit.to_string());

        match self.request(Method::GET, url, None).await {
            Ok(envelope) => records_from(envelope),
            Err(err) if err.is_no_records() => Ok(Vec::new()),
            Err(err) => Err(err),
        }
    }

    pub async fn get_all_records(&self, layout: &str) -> Result<Vec<Record>, FileMakerError> {
        let mut records = Vec::new();
        let mut offset = 1;
        loop {
            let page = self.get_records(layout, offset, PAGE_SIZE).await?;
            let returned = page.len();
            records.extend(page);
            if returned < PAGE_SIZE {
                break;
            }
            offset += returned;
        }
        Ok(records)
    }

    /// Runs a find request; no matches yields an empty list rather than an error.
    pub async fn find(
        &self,
        layout: &str,
        query: Map<String, Value>,
        limit: usize,
    ) -> Result<Vec<Record>, FileMakerError> {
        let url = self.url(&format!("layouts/{}/_find", layout))?;
        let body = json!({
            "query": [query],
            "limit": limit.to_string(),
        });

        match self.request(Method::POST, url, Some(&body)).await {
            Ok(envelope) => records_from(envelope),
            Err(err) if err.is_no_records() => Ok(Vec::new()),
            Err(err) => Err(err),
        }
    }

    pub async fn create_record(
        &self,
        layout: &str,
        field_data: Map<String, Value>,
    ) -> Result<String, FileMakerError> {
        let url = self.url(&format!("layouts/{}/records", layout))?;
        let body = json!({ "fieldData": field_data });

        let envelope = self.request(Method::POST, url, Some(&body)).await?;
        let created: CreateResponse = serde_json::from_value(envelope.response)
            .map_err(|err| FileMakerError::Decode(format!("create response: {}", err)))?;
        Ok(created.record_id)
    }

    pub async fn update_record(
        &self,
        layout: &str,
        record_id: &str,
        field_data: Map<String, Value>,
    ) -> Result<(), FileMakerError> {
        let url = self.url(&format!("layouts/{}/records/{}", layout, record_id))?;
        let body = json!({ "fieldData": field_data });

        self.request(Method::PATCH, url, Some(&body)).await?;
        Ok(())
    }

    /// Closes the cached session, if any.
    pub async fn logout(&self) -> Result<(), FileMakerError> {
        let token = self.token.lock().await.take();
        let Some(token) = token else {
            return Ok(());
        };

        let response = self
            .http
            .delete(self.url(&format!("sessions/{}", token))?)
            .send()
            .await?;
        // An already expired session is as good as closed.
        if response.status() == StatusCode::UNAUTHORIZED {
            return Ok(());
        }
        decode(response).await?;
        Ok(())
    }
}

async fn decode(response: reqwest::Response) -> Result<Envelope, FileMakerError> {
    let status = response.status();
    let body = response.text().await?;

    let envelope: Envelope = match serde_json::from_str(&body) {
        Ok(envelope) => envelope,
        Err(_) if !status.is_success() => {
            return Err(FileMakerError::Api {
                status: status.as_u16(),
                code: String::new(),
                message: body,
            })
        }
        Err(err) => return Err(FileMakerError::Decode(err.to_string())),
    };

    if status.is_success() && envelope.is_ok() {
        return Ok(envelope);
    }

    let (code, message) = envelope
        .first_message()
        .map(|m| (m.code.clone(), m.message.clone()))
        .unwrap_or_default();
    Err(FileMakerError::Api {
        status: status.as_u16(),
        code,
        message,
    })
}

fn records_from(envelope: Envelope) -> Result<Vec<Record>, FileMakerError> {
    let records: RecordsResponse = serde_json::from_value(envelope.response)
        .map_err(|err| FileMakerError::Decode(format!("records: {}", err)))?;
    if let Some(info) = &records.data_info {
        log::debug!(
            "FileMaker layout {} returned {} of {} records",
            info.layout,
            info.returned_count,
            info.found_count
        );
    }
    Ok(records.data)
}
