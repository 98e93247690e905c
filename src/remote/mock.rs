//! Scripted in-memory remote, for flow tests and offline dry runs

use super::payload::{ProjectPayload, RemoteProject, TimeSlot};
use super::RemoteApi;
use crate::error::SyncError;
use chrono::NaiveDate;
use std::cell::RefCell;
use uuid::Uuid;

/// [`RemoteApi`] double that serves canned data and records every write.
/// Rejections can be scripted per project code to exercise partial-batch
/// behavior.
#[derive(Default)]
pub struct MockRemote {
    projects: Vec<RemoteProject>,
    slots: Vec<TimeSlot>,
    rejected_codes: Vec<String>,
    fail_listing: bool,
    pub created: RefCell<Vec<ProjectPayload>>,
    pub updated: RefCell<Vec<ProjectPayload>>,
    pub windows: RefCell<Vec<(NaiveDate, NaiveDate)>>,
}

impl MockRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the project listing with a known code/id pair
    pub fn with_project(mut self, code: &str, id: Uuid) -> Self {
        self.projects.push(RemoteProject {
            id,
            project_code: Some(code.to_string()),
        });
        self
    }

    /// Seed the time-slot listing
    pub fn with_slots(mut self, slots: Vec<TimeSlot>) -> Self {
        self.slots = slots;
        self
    }

    /// Make create/update fail with a 422 for one project code
    pub fn with_rejection(mut self, code: &str) -> Self {
        self.rejected_codes.push(code.to_string());
        self
    }

    /// Make the project listing itself fail
    pub fn with_listing_failure(mut self) -> Self {
        self.fail_listing = true;
        self
    }

    fn reject_if_scripted(&self, payload: &ProjectPayload) -> Result<(), SyncError> {
        if self.rejected_codes.iter().any(|c| c == &payload.project_code) {
            return Err(SyncError::RemoteStatus {
                status: 422,
                body: format!("scripted rejection for {}", payload.project_code),
            });
        }
        Ok(())
    }
}

impl RemoteApi for MockRemote {
    fn list_projects(&self) -> Result<Vec<RemoteProject>, SyncError> {
        if self.fail_listing {
            return Err(SyncError::RemoteStatus {
                status: 500,
                body: "scripted listing failure".to_string(),
            });
        }
        Ok(self.projects.clone())
    }

    fn create_project(&self, payload: &ProjectPayload) -> Result<(), SyncError> {
        self.reject_if_scripted(payload)?;
        self.created.borrow_mut().push(payload.clone());
        Ok(())
    }

    fn update_project(&self, payload: &ProjectPayload) -> Result<(), SyncError> {
        self.reject_if_scripted(payload)?;
        self.updated.borrow_mut().push(payload.clone());
        Ok(())
    }

    fn list_time_slots(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<TimeSlot>, SyncError> {
        self.windows.borrow_mut().push((start, end));
        Ok(self.slots.clone())
    }
}
