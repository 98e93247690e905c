//! ERP Link
//!
//! Boundary to the on-premises ERP database (Batigest over SQL Server, Codial
//! over HFSQL). The engine only ever issues fixed parameterized SQL through
//! the `ErpLink` trait; the native driver behind it is site infrastructure.
//! Values cross the boundary as `ErpValue`, the input domain of the
//! normalizer.

use crate::config::ErpCredentials;
use crate::error::SyncError;
use chrono::{NaiveDate, NaiveDateTime};

/// A value as returned by (or bound into) the ERP driver
#[derive(Debug, Clone, PartialEq)]
pub enum ErpValue {
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl ErpValue {
    /// Null, or text that trims to nothing
    pub fn is_empty(&self) -> bool {
        match self {
            ErpValue::Null => true,
            ErpValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }
}

/// One result set: column names in select order, then rows of values
#[derive(Debug, Clone, Default)]
pub struct ErpBatch {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<ErpValue>>,
}

impl ErpBatch {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<ErpValue>>) -> Self {
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First value of the first row, for single-cell lookups
    pub fn scalar(&self) -> Option<&ErpValue> {
        self.rows.first().and_then(|row| row.first())
    }
}

/// Synchronous query surface over a live ERP connection
///
/// Writes are only visible after `commit`; the timesheet push commits after
/// each placed record so an interrupted run keeps what it already wrote.
pub trait ErpLink {
    /// Run a read query and fetch every row
    fn query(&mut self, sql: &str, params: &[ErpValue]) -> Result<ErpBatch, SyncError>;

    /// Run a write statement, returning the affected row count
    fn execute(&mut self, sql: &str, params: &[ErpValue]) -> Result<usize, SyncError>;

    /// Commit pending writes
    fn commit(&mut self) -> Result<(), SyncError>;
}

/// Open an ERP connection for the configured backend.
///
/// Credentials are checked first so missing settings surface as configuration
/// errors before any driver work. This build carries no native ODBC bridge;
/// deployments link one in by providing their own `ErpLink` to the flows, and
/// a direct `connect` reports the absence as an ERP error.
pub fn connect(creds: &ErpCredentials) -> Result<Box<dyn ErpLink>, SyncError> {
    creds.validate()?;
    Err(SyncError::Erp(format!(
        "no ODBC driver manager is linked into this build; cannot open {} source at {}",
        creds.kind,
        creds.redacted_connection_string()
    )))
}

/// [`ErpLink`] double backed by scripted result sets.
///
/// Queries are answered by the first script whose needle appears in the SQL
/// text; unmatched queries return an empty batch. Every statement and commit
/// is recorded so tests can assert on what reached the ERP.
#[derive(Default)]
pub struct MockErp {
    scripts: Vec<(String, ErpBatch)>,
    fail_queries: bool,
    pub queries: Vec<(String, Vec<ErpValue>)>,
    pub executed: Vec<(String, Vec<ErpValue>)>,
    pub commits: usize,
}

impl MockErp {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer any query containing `needle` with `batch`
    pub fn with_batch(mut self, needle: &str, batch: ErpBatch) -> Self {
        self.scripts.push((needle.to_string(), batch));
        self
    }

    /// Make every query fail, as a dropped connection would
    pub fn with_query_failure(mut self) -> Self {
        self.fail_queries = true;
        self
    }
}

impl ErpLink for MockErp {
    fn query(&mut self, sql: &str, params: &[ErpValue]) -> Result<ErpBatch, SyncError> {
        self.queries.push((sql.to_string(), params.to_vec()));
        if self.fail_queries {
            return Err(SyncError::Erp("scripted query failure".to_string()));
        }
        let batch = self
            .scripts
            .iter()
            .find(|(needle, _)| sql.contains(needle.as_str()))
            .map(|(_, batch)| batch.clone())
            .unwrap_or_default();
        Ok(batch)
    }

    fn execute(&mut self, sql: &str, params: &[ErpValue]) -> Result<usize, SyncError> {
        self.executed.push((sql.to_string(), params.to_vec()));
        Ok(1)
    }

    fn commit(&mut self) -> Result<(), SyncError> {
        self.commits += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ErpKind;

    fn test_creds(server: &str) -> ErpCredentials {
        ErpCredentials {
            kind: ErpKind::Batigest,
            server: server.to_string(),
            user: "sa".to_string(),
            password: "pw".to_string(),
            database: "Batigest".to_string(),
            port: None,
            dsn: None,
        }
    }

    #[test]
    fn test_empty_values() {
        assert!(ErpValue::Null.is_empty());
        assert!(ErpValue::Text("   ".to_string()).is_empty());
        assert!(!ErpValue::Text("D001".to_string()).is_empty());
        assert!(!ErpValue::Int(0).is_empty());
    }

    #[test]
    fn test_scalar_reads_first_cell() {
        let batch = ErpBatch::new(
            vec!["Code".to_string()],
            vec![vec![ErpValue::Text("S042".to_string())]],
        );
        assert_eq!(batch.scalar(), Some(&ErpValue::Text("S042".to_string())));
        assert!(ErpBatch::default().scalar().is_none());
    }

    #[test]
    fn test_connect_checks_credentials_first() {
        let err = connect(&test_creds("")).unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }

    #[test]
    fn test_connect_reports_missing_bridge() {
        let err = connect(&test_creds("SRV")).unwrap_err();
        assert!(matches!(err, SyncError::Erp(_)));
        assert!(!err.to_string().contains("pw"));
    }
}
