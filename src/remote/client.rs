//! Blocking BatiSimply HTTP client

use super::payload::{ProjectListing, ProjectPayload, RemoteProject, TimeSlot};
use super::token::fetch_access_token;
use super::RemoteApi;
use crate::config::RemoteCredentials;
use crate::error::SyncError;
use chrono::NaiveDate;
use reqwest::blocking::{Client, Response};
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT_SECS: u64 = 30;
const PROJECT_ENDPOINT: &str = "/api/project";
const TIME_SLOT_ENDPOINT: &str = "/api/timeSlotManagement/allUsers";

/// Authenticated client over the BatiSimply REST API
pub struct BatiSimplyClient {
    client: Client,
    api_url: String,
    token: String,
}

impl BatiSimplyClient {
    /// Authenticate against Keycloak and return a ready client
    pub fn connect(creds: &RemoteCredentials) -> Result<Self, SyncError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        let token = fetch_access_token(&client, creds)?;
        Ok(Self {
            client,
            api_url: creds.api_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    /// Turn a non-2xx response into a typed rejection carrying the body
    fn check(response: Response) -> Result<Response, SyncError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        Err(SyncError::RemoteStatus {
            status: status.as_u16(),
            body,
        })
    }
}

impl RemoteApi for BatiSimplyClient {
    fn list_projects(&self) -> Result<Vec<RemoteProject>, SyncError> {
        let response = self
            .client
            .get(self.url(PROJECT_ENDPOINT))
            .bearer_auth(&self.token)
            .send()?;
        let listing: ProjectListing = Self::check(response)?.json()?;
        debug!(count = listing.elements.len(), "fetched project listing");
        Ok(listing.elements)
    }

    fn create_project(&self, payload: &ProjectPayload) -> Result<(), SyncError> {
        let response = self
            .client
            .post(self.url(PROJECT_ENDPOINT))
            .bearer_auth(&self.token)
            .json(payload)
            .send()?;
        Self::check(response)?;
        Ok(())
    }

    fn update_project(&self, payload: &ProjectPayload) -> Result<(), SyncError> {
        let response = self
            .client
            .put(self.url(PROJECT_ENDPOINT))
            .bearer_auth(&self.token)
            .json(payload)
            .send()?;
        Self::check(response)?;
        Ok(())
    }

    fn list_time_slots(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<TimeSlot>, SyncError> {
        let window = [
            ("startDate", format!("{}T00:00:00Z", start.format("%Y-%m-%d"))),
            ("endDate", format!("{}T23:59:59Z", end.format("%Y-%m-%d"))),
        ];
        let response = self
            .client
            .get(self.url(TIME_SLOT_ENDPOINT))
            .bearer_auth(&self.token)
            .query(&window)
            .send()?;
        let slots: Vec<TimeSlot> = Self::check(response)?.json()?;
        debug!(count = slots.len(), "fetched time slots");
        Ok(slots)
    }
}
