//! Wire shapes for the BatiSimply API
//!
//! The project payload mirrors what the portal itself sends, including the
//! fixed head-office defaults the API insists on. Field names follow the
//! API's camelCase convention via serde renames.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

const COUNTRY_CODE: &str = "FR";
const DEFAULT_X_LON: f64 = 3.8777;
const DEFAULT_Y_LAT: f64 = 43.6119;
const DEFAULT_BUDGET_AMOUNT: f64 = 500_000.0;
const BUDGET_CURRENCY: &str = "EUR";
const DEFAULT_PROJECT_MANAGER: &str = "DEFINIR";
const DEFAULT_PROJECT_COLOR: &str = "#9b1ff1";

/// Project create/update body. `id` is only present on updates.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub address: Address,
    pub budget: Budget,
    pub end_estimated: Option<NaiveDate>,
    pub head_quarter: HeadQuarterRef,
    pub hours_sold: Option<f64>,
    pub project_code: String,
    pub comment: Option<String>,
    pub project_name: String,
    pub customer_name: Option<String>,
    pub project_manager: String,
    pub start_estimated: Option<NaiveDate>,
    pub is_archived: bool,
    pub is_finished: bool,
    pub project_color: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub city: String,
    pub country_code: String,
    pub geo_point: GeoPoint,
    pub google_formatted_address: String,
    pub postal_code: String,
    pub street: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoPoint {
    pub x_lon: f64,
    pub y_lat: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Budget {
    pub amount: f64,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HeadQuarterRef {
    pub id: i64,
}

impl ProjectPayload {
    /// Assemble a payload with the portal's fixed defaults filled in
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        project_code: String,
        project_name: String,
        customer_name: Option<String>,
        comment: Option<String>,
        street: String,
        postal_code: String,
        city: String,
        hours_sold: Option<f64>,
        start_estimated: Option<NaiveDate>,
        end_estimated: Option<NaiveDate>,
        head_quarter_id: i64,
    ) -> Self {
        let google_formatted_address = google_formatted_address(&street, &postal_code, &city);
        Self {
            id: None,
            address: Address {
                city,
                country_code: COUNTRY_CODE.to_string(),
                geo_point: GeoPoint {
                    x_lon: DEFAULT_X_LON,
                    y_lat: DEFAULT_Y_LAT,
                },
                google_formatted_address,
                postal_code,
                street,
            },
            budget: Budget {
                amount: DEFAULT_BUDGET_AMOUNT,
                currency: BUDGET_CURRENCY.to_string(),
            },
            end_estimated,
            head_quarter: HeadQuarterRef {
                id: head_quarter_id,
            },
            hours_sold,
            project_code,
            comment,
            project_name,
            customer_name,
            project_manager: DEFAULT_PROJECT_MANAGER.to_string(),
            start_estimated,
            is_archived: false,
            is_finished: false,
            project_color: DEFAULT_PROJECT_COLOR.to_string(),
        }
    }

    /// Same payload addressed at an existing remote project
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = Some(id);
        self
    }
}

/// "street, postal, city, France" with empty segments dropped
fn google_formatted_address(street: &str, postal_code: &str, city: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in [street, postal_code, city] {
        let part = part.trim();
        if !part.is_empty() {
            parts.push(part);
        }
    }
    parts.push("France");
    parts.join(", ")
}

/// Project as returned by the listing endpoint
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteProject {
    pub id: Uuid,
    #[serde(default)]
    pub project_code: Option<String>,
}

/// Listing envelope, `{"elements": [...]}`
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectListing {
    #[serde(default)]
    pub elements: Vec<RemoteProject>,
}

/// One time slot from the management endpoint. The API has served `id` both
/// as a number and as a string, so both are accepted.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSlot {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub management_status: Option<String>,
    #[serde(default)]
    pub user: Option<SlotUser>,
    #[serde(default)]
    pub project: Option<SlotProject>,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_time_minutes: Option<f64>,
    #[serde(default)]
    pub basket: bool,
    #[serde(default)]
    pub travel: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlotUser {
    pub id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlotProject {
    pub id: Uuid,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number for slot id, got {other}"
        ))),
    }
}
