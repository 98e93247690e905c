//! BatiSimply REST surface
//!
//! Token acquisition, the project and time-slot payload shapes, and the
//! blocking HTTP client. Flows depend on the [`RemoteApi`] trait so tests can
//! substitute a scripted implementation.

mod client;
mod mock;
mod payload;
mod token;

pub use client::BatiSimplyClient;
pub use mock::MockRemote;
pub use payload::{ProjectPayload, ProjectListing, RemoteProject, SlotProject, SlotUser, TimeSlot};
pub use token::fetch_access_token;

use crate::error::SyncError;
use chrono::NaiveDate;

/// Remote operations the sync flows rely on
pub trait RemoteApi {
    /// Full project listing, used to split creates from updates and to
    /// refresh buffer linkage
    fn list_projects(&self) -> Result<Vec<RemoteProject>, SyncError>;

    /// POST a project that has no remote counterpart yet
    fn create_project(&self, payload: &ProjectPayload) -> Result<(), SyncError>;

    /// PUT a project whose payload carries the remote id
    fn update_project(&self, payload: &ProjectPayload) -> Result<(), SyncError>;

    /// Time slots for every user over an inclusive day window
    fn list_time_slots(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<TimeSlot>, SyncError>;
}
