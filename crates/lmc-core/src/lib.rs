use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub mod api;
pub mod clock;
pub mod events;
pub mod memory;
pub mod push_frames;

pub use api::{ApiError, AssignAck, BulkUpdateResult, LeadApi, LeadPage, LeadUpdates, PageQuery};
pub use clock::{Clock, ManualClock, SystemClock};
pub use events::{LeadPatch, PushEvent, PushEventKind};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    #[serde(
        alias = "_id",
        alias = "leadId",
        alias = "lead_id",
        deserialize_with = "deserialize_id"
    )]
    pub id: String,
    #[serde(default)]
    pub field_data: Vec<FieldValue>,
    #[serde(default)]
    pub status: LeadStatus,
    #[serde(default, alias = "assignee", alias = "callerId")]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_contacted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub bookings: Bookings,
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Lead {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            field_data: Vec::new(),
            status: LeadStatus::default(),
            assigned_to: None,
            created_at: None,
            updated_at: None,
            last_contacted_at: None,
            bookings: Bookings::default(),
            extra: BTreeMap::new(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.field_data.iter().find(|field| field.name == name)
    }

    /// First value of a named field, the way list columns display it.
    pub fn field_text(&self, name: &str) -> Option<&str> {
        self.field(name)
            .and_then(|field| field.values.first())
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldValue {
    pub name: String,
    #[serde(default, alias = "value", deserialize_with = "deserialize_values")]
    pub values: Vec<String>,
}

impl FieldValue {
    pub fn new(name: impl Into<String>, values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn single(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: vec![value.into()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LeadStatus {
    New,
    Contacted,
    Interested,
    NotInterested,
    FollowUp,
    Booked,
    Converted,
    Lost,
    Invalid,
    Other(String),
}

impl Default for LeadStatus {
    fn default() -> Self {
        Self::New
    }
}

impl LeadStatus {
    pub fn as_str(&self) -> &str {
        match self {
            LeadStatus::New => "new",
            LeadStatus::Contacted => "contacted",
            LeadStatus::Interested => "interested",
            LeadStatus::NotInterested => "not-interested",
            LeadStatus::FollowUp => "follow-up",
            LeadStatus::Booked => "booked",
            LeadStatus::Converted => "converted",
            LeadStatus::Lost => "lost",
            LeadStatus::Invalid => "invalid",
            LeadStatus::Other(raw) => raw.as_str(),
        }
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, LeadStatus::Other(raw) if raw.trim().is_empty())
    }
}

impl fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeadStatus {
    type Err = std::convert::Infallible;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().to_lowercase().replace(['_', ' '], "-");
        Ok(match normalized.as_str() {
            "new" => LeadStatus::New,
            "contacted" => LeadStatus::Contacted,
            "interested" => LeadStatus::Interested,
            "not-interested" | "notinterested" => LeadStatus::NotInterested,
            "follow-up" | "followup" => LeadStatus::FollowUp,
            "booked" => LeadStatus::Booked,
            "converted" => LeadStatus::Converted,
            "lost" => LeadStatus::Lost,
            "invalid" => LeadStatus::Invalid,
            _ => LeadStatus::Other(input.trim().to_string()),
        })
    }
}

impl From<String> for LeadStatus {
    fn from(value: String) -> Self {
        match value.parse() {
            Ok(status) => status,
            Err(never) => match never {},
        }
    }
}

impl From<LeadStatus> for String {
    fn from(value: LeadStatus) -> Self {
        value.as_str().to_string()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum BookingStatus {
    #[default]
    None,
    Scheduled,
    Completed,
    Cancelled,
    NoShow,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Booking {
    #[serde(default)]
    pub status: BookingStatus,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Bookings {
    #[serde(default)]
    pub outpatient: Booking,
    #[serde(default)]
    pub inpatient: Booking,
}

/// A caller leads are assigned to. Read-only from the console's side.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Agent {
    #[serde(alias = "_id", deserialize_with = "deserialize_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Deserialize an ID that can be either a string or a number into a String
pub(crate) fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let val = Value::deserialize(deserializer)?;
    match val {
        Value::String(s) if !s.trim().is_empty() => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(serde::de::Error::custom(
            "expected non-empty string or number for id",
        )),
    }
}

pub(crate) fn deserialize_ids<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let v: Vec<Value> = Vec::deserialize(deserializer)?;
    let mut ids = Vec::new();
    for val in v {
        if let Some(s) = val.as_str() {
            if !s.trim().is_empty() {
                ids.push(s.to_string());
            }
        } else if let Some(i) = val.as_i64() {
            ids.push(i.to_string());
        } else if let Some(u) = val.as_u64() {
            ids.push(u.to_string());
        }
    }
    Ok(ids)
}

/// Field values arrive as a scalar or a list depending on the form that wrote them.
fn deserialize_values<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let val = Value::deserialize(deserializer)?;
    Ok(match val {
        Value::Null => Vec::new(),
        Value::Array(items) => items.into_iter().filter_map(scalar_text).collect(),
        other => scalar_text(other).into_iter().collect(),
    })
}

fn scalar_text(val: Value) -> Option<String> {
    match val {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lead_accepts_aliased_id_and_scalar_field_values() {
        let lead: Lead = serde_json::from_str(
            r#"{
                "_id": 4412,
                "fieldData": [
                    {"name": "full_name", "value": "Ada Lovelace"},
                    {"name": "interests", "values": ["knee", "hip"]}
                ],
                "status": "Follow_Up",
                "assignee": "caller-7",
                "source": "meta-ads"
            }"#,
        )
        .expect("parse lead");

        assert_eq!(lead.id, "4412");
        assert_eq!(lead.field_text("full_name"), Some("Ada Lovelace"));
        assert_eq!(
            lead.field("interests").map(|field| field.values.len()),
            Some(2)
        );
        assert_eq!(lead.status, LeadStatus::FollowUp);
        assert_eq!(lead.assigned_to.as_deref(), Some("caller-7"));
        assert_eq!(lead.bookings.inpatient.status, BookingStatus::None);
        assert_eq!(
            lead.extra.get("source"),
            Some(&Value::String("meta-ads".to_string()))
        );
    }

    #[test]
    fn unknown_status_survives_round_trip() {
        let status: LeadStatus = "Callback Requested".parse().expect("infallible");
        assert_eq!(status, LeadStatus::Other("Callback Requested".to_string()));
        let json = serde_json::to_string(&status).expect("serialize");
        assert_eq!(json, "\"Callback Requested\"");
        assert!(!status.is_blank());
        assert!(LeadStatus::from(String::new()).is_blank());
    }

    #[test]
    fn booking_status_tolerates_unknown_values() {
        let bookings: Bookings = serde_json::from_str(
            r#"{"outpatient": {"status": "no-show"}, "inpatient": {"status": "waitlisted"}}"#,
        )
        .expect("parse bookings");
        assert_eq!(bookings.outpatient.status, BookingStatus::NoShow);
        assert_eq!(bookings.inpatient.status, BookingStatus::Unknown);
    }

    #[test]
    fn empty_id_is_rejected() {
        let result = serde_json::from_str::<Lead>(r#"{"id": "  "}"#);
        assert!(result.is_err());
    }
}
