//! Identifier Mapping
//!
//! Associations between ERP natural codes and remote UUIDs. Employee mapping
//! lives ERP-side in a lookup column; project mapping lives in the buffer's
//! linkage columns, refreshed from the remote listing before a timesheet push
//! so newly created projects become resolvable.

use crate::buffer::BufferStore;
use crate::erp::{ErpLink, ErpValue};
use crate::error::SyncError;
use crate::remote::RemoteApi;
use tracing::debug;
use uuid::Uuid;

const EMPLOYEE_LOOKUP_SQL: &str = "SELECT TOP 1 Code FROM Salarie WHERE codebs = ?";

/// ERP employee code for a remote user id. No match is `None`, not an error.
pub fn resolve_employee_code(
    erp: &mut dyn ErpLink,
    user_id: &Uuid,
) -> Result<Option<String>, SyncError> {
    let batch = erp.query(EMPLOYEE_LOOKUP_SQL, &[ErpValue::Text(user_id.to_string())])?;
    let code = batch.scalar().and_then(|value| match value {
        ErpValue::Text(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        ErpValue::Int(n) => Some(n.to_string()),
        _ => None,
    });
    Ok(code)
}

/// Remote project id stored for an ERP project code, chantiers first, then
/// devis
pub fn resolve_project_link(
    store: &BufferStore,
    code: &str,
) -> Result<Option<Uuid>, SyncError> {
    if let Some(id) = store.chantier_project_id(code)? {
        return Ok(Some(id));
    }
    store.devis_project_id(code)
}

/// Reconcile every buffer linkage column against the remote listing.
///
/// Returns how many heures rows gained or changed their chantier code.
pub fn refresh_project_links(
    store: &BufferStore,
    remote: &dyn RemoteApi,
) -> Result<usize, SyncError> {
    let projects = remote.list_projects()?;
    let mut relinked = 0;
    for project in &projects {
        let code = match project.project_code.as_deref() {
            Some(code) if !code.is_empty() => code,
            _ => continue,
        };
        relinked += store.update_heures_code_projet(&project.id, code)?;
        store.set_chantier_project_id(code, &project.id)?;
        store.set_devis_project_id(code, &project.id)?;
    }
    debug!(projects = projects.len(), relinked, "refreshed project links");
    Ok(relinked)
}
