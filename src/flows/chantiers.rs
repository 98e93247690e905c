//! Chantier sync flow
//!
//! Pull reads open sites from the ERP and stages them; push mirrors pending
//! rows onto the remote project endpoint, updating when the project code is
//! already known remotely and creating otherwise.

use super::{project_index, SyncOutcome};
use crate::buffer::{BufferStore, ChantierRecord};
use crate::config::ErpKind;
use crate::erp::ErpLink;
use crate::remote::{ProjectPayload, RemoteApi};
use tracing::{error, info, warn};

const BATIGEST_CHANTIERS_SQL: &str = r#"
SELECT ChantierDef.Code, ChantierDef.DateDebut, ChantierDef.DateFin,
       ChantierDef.NomClient, ChantierDef.Libelle, ChantierDef.AdrChantier,
       ChantierDef.CPChantier, ChantierDef.VilleChantier,
       (SELECT SUM(Devis.TempsMO) FROM dbo.Devis
         WHERE Devis.Code = ChantierDef.Code) AS TotalMO
FROM dbo.ChantierDef
WHERE ChantierDef.Etat = 'E'
"#;

const CODIAL_CHANTIERS_SQL: &str = r#"
SELECT Code, DateDebut, DateFin, NomClient, Libelle, AdrChantier,
       CPChantier, VilleChantier, TotalMO
FROM ChantierDef
WHERE DateFin IS NULL OR DateFin > NOW()
"#;

/// Stage open ERP chantiers into the buffer. One transaction for the whole
/// batch; a failure stages nothing.
pub fn pull_chantiers(
    erp: &mut dyn ErpLink,
    store: &mut BufferStore,
    kind: ErpKind,
) -> SyncOutcome {
    let sql = match kind {
        ErpKind::Batigest => BATIGEST_CHANTIERS_SQL,
        ErpKind::Codial => CODIAL_CHANTIERS_SQL,
    };

    let batch = match erp.query(sql, &[]) {
        Ok(batch) => batch,
        Err(e) => {
            error!(error = %e, "chantier read failed");
            return SyncOutcome::failed(format!("chantier pull failed: {e}"));
        }
    };

    let mut records = Vec::new();
    for row in &batch.rows {
        match ChantierRecord::from_erp_row(&batch.columns, row) {
            Some(record) => records.push(record),
            None => warn!("skipping chantier row without a usable code"),
        }
    }

    match store.upsert_chantiers(&records) {
        Ok(count) => {
            info!(count, "chantiers staged");
            SyncOutcome::ok(format!("{count} chantier(s) staged from {kind}"))
        }
        Err(e) => {
            error!(error = %e, "chantier staging failed");
            SyncOutcome::failed(format!("chantier pull failed: {e}"))
        }
    }
}

/// Push pending chantiers to the remote project endpoint.
///
/// Returns true when at least one pending row reached the remote, or there
/// was nothing to push. Rejected rows stay pending, are logged, and retry on
/// the next invocation.
pub fn push_chantiers(
    store: &mut BufferStore,
    remote: &dyn RemoteApi,
    head_quarter_id: i64,
) -> bool {
    let pending = match store.unsynced_chantiers() {
        Ok(pending) => pending,
        Err(e) => {
            error!(error = %e, "could not read pending chantiers");
            return false;
        }
    };
    if pending.is_empty() {
        info!("no chantiers awaiting push");
        return true;
    }

    let existing = project_index(remote);
    let mut pushed = 0;
    for record in &pending {
        let payload = chantier_payload(record, head_quarter_id);
        let result = match existing.get(record.code.as_str()) {
            Some(id) => remote.update_project(&payload.with_id(*id)),
            None => remote.create_project(&payload),
        };
        match result {
            Ok(()) => {
                if let Err(e) = store.mark_chantier_synced(&record.code) {
                    error!(code = %record.code, error = %e, "pushed but could not mark synced");
                    continue;
                }
                pushed += 1;
            }
            Err(e) => {
                warn!(code = %record.code, error = %e, "remote rejected chantier, row left pending");
            }
        }
    }

    info!(pushed, pending = pending.len() - pushed, "chantier push finished");
    pushed > 0
}

/// Payload for one chantier, with the site's naming fallbacks when the ERP
/// row is sparse
fn chantier_payload(record: &ChantierRecord, head_quarter_id: i64) -> ProjectPayload {
    let fallback = format!("Chantier {}", record.code);
    ProjectPayload::new(
        record.code.clone(),
        record.nom_client.clone().unwrap_or_else(|| fallback.clone()),
        Some(record.nom_client.clone().unwrap_or_else(|| fallback.clone())),
        Some(record.description.clone().unwrap_or_else(|| fallback.clone())),
        record.adr_chantier.clone().unwrap_or_default(),
        record.cp_chantier.clone().unwrap_or_default(),
        record.ville_chantier.clone().unwrap_or_default(),
        Some(record.total_mo.unwrap_or(0.0)),
        record.date_debut,
        record.date_fin,
        head_quarter_id,
    )
}
