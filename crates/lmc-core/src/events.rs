use crate::{deserialize_id, deserialize_ids, Booking, FieldValue, LeadStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Partial lead payload carried by push events and bulk edits.
///
/// Every field except `id` is optional; the reconciler only overwrites fields
/// that are present and non-empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LeadPatch {
    #[serde(
        alias = "_id",
        alias = "leadId",
        alias = "lead_id",
        deserialize_with = "deserialize_id"
    )]
    pub id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub field_data: Vec<FieldValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<LeadStatus>,
    #[serde(
        default,
        alias = "assignee",
        alias = "callerId",
        skip_serializing_if = "Option::is_none"
    )]
    pub assigned_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_contacted_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bookings: Option<BookingsPatch>,
}

impl LeadPatch {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BookingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outpatient: Option<Booking>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inpatient: Option<Booking>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PushEventKind {
    LeadCreated,
    LeadUpdated,
    StatusChanged,
    ActivityRecorded,
    CallLogged,
    LeadsAssigned,
    Intake,
}

impl PushEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PushEventKind::LeadCreated => "lead_created",
            PushEventKind::LeadUpdated => "lead_updated",
            PushEventKind::StatusChanged => "status_changed",
            PushEventKind::ActivityRecorded => "activity_recorded",
            PushEventKind::CallLogged => "call_logged",
            PushEventKind::LeadsAssigned => "leads_assigned",
            PushEventKind::Intake => "intake",
        }
    }

    /// Kinds that announce a lead the user has not seen yet.
    pub fn is_arrival(&self) -> bool {
        matches!(self, PushEventKind::LeadCreated | PushEventKind::Intake)
    }
}

impl fmt::Display for PushEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum PushEvent {
    LeadCreated(LeadPatch),
    LeadUpdated(LeadPatch),
    StatusChanged(StatusChangedPayload),
    ActivityRecorded(ActivityPayload),
    CallLogged(CallLoggedPayload),
    LeadsAssigned(LeadsAssignedPayload),
    Intake(LeadPatch),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusChangedPayload {
    #[serde(alias = "id", alias = "_id", alias = "lead_id", deserialize_with = "deserialize_id")]
    pub lead_id: String,
    #[serde(alias = "status")]
    pub new_status: LeadStatus,
    #[serde(default)]
    pub previous_status: Option<LeadStatus>,
    #[serde(default)]
    pub changed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub lead: Option<LeadPatch>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActivityPayload {
    #[serde(alias = "id", alias = "_id", alias = "lead_id", deserialize_with = "deserialize_id")]
    pub lead_id: String,
    pub activity: ActivityDescriptor,
    #[serde(default)]
    pub lead: Option<LeadPatch>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ActivityDescriptor {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, alias = "timestamp")]
    pub at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub performed_by: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CallLoggedPayload {
    #[serde(alias = "id", alias = "_id", alias = "lead_id", deserialize_with = "deserialize_id")]
    pub lead_id: String,
    pub outcome: String,
    #[serde(default, alias = "timestamp")]
    pub called_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub caller_id: Option<String>,
    #[serde(default)]
    pub lead: Option<LeadPatch>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LeadsAssignedPayload {
    #[serde(alias = "ids", alias = "lead_ids", deserialize_with = "deserialize_ids")]
    pub lead_ids: Vec<String>,
    #[serde(default, alias = "assignee", alias = "agentId", alias = "callerId")]
    pub assigned_to: Option<String>,
}

impl PushEvent {
    pub fn kind(&self) -> PushEventKind {
        match self {
            PushEvent::LeadCreated(_) => PushEventKind::LeadCreated,
            PushEvent::LeadUpdated(_) => PushEventKind::LeadUpdated,
            PushEvent::StatusChanged(_) => PushEventKind::StatusChanged,
            PushEvent::ActivityRecorded(_) => PushEventKind::ActivityRecorded,
            PushEvent::CallLogged(_) => PushEventKind::CallLogged,
            PushEvent::LeadsAssigned(_) => PushEventKind::LeadsAssigned,
            PushEvent::Intake(_) => PushEventKind::Intake,
        }
    }

    /// Stable identity of one logical occurrence, used to spot redelivery.
    pub fn dedupe_key(&self) -> String {
        let kind = self.kind().as_str();
        match self {
            PushEvent::LeadCreated(patch) | PushEvent::Intake(patch) => {
                format!("{kind}:{}", patch.id)
            }
            PushEvent::LeadUpdated(patch) => {
                format!("{kind}:{}:{}", patch.id, stamp(patch.updated_at))
            }
            PushEvent::StatusChanged(payload) => {
                format!("{kind}:{}:{}", payload.lead_id, payload.new_status)
            }
            PushEvent::ActivityRecorded(payload) => format!(
                "{kind}:{}:{}:{}",
                payload.lead_id,
                payload.activity.kind,
                stamp(payload.activity.at)
            ),
            PushEvent::CallLogged(payload) => format!(
                "{kind}:{}:{}:{}",
                payload.lead_id,
                payload.outcome,
                stamp(payload.called_at)
            ),
            PushEvent::LeadsAssigned(payload) => {
                let mut ids = payload.lead_ids.clone();
                ids.sort();
                format!(
                    "{kind}:{}:{}",
                    payload.assigned_to.as_deref().unwrap_or("unassigned"),
                    ids.join(",")
                )
            }
        }
    }

    /// Partial records this event implies for rows that may be on screen.
    pub fn patches(&self) -> Vec<LeadPatch> {
        match self {
            PushEvent::LeadCreated(patch)
            | PushEvent::LeadUpdated(patch)
            | PushEvent::Intake(patch) => vec![patch.clone()],
            PushEvent::StatusChanged(payload) => {
                let mut patch = payload
                    .lead
                    .clone()
                    .unwrap_or_else(|| LeadPatch::new(payload.lead_id.clone()));
                patch.id = payload.lead_id.clone();
                patch.status = Some(payload.new_status.clone());
                if patch.updated_at.is_none() {
                    patch.updated_at = payload.changed_at;
                }
                vec![patch]
            }
            PushEvent::ActivityRecorded(payload) => {
                let mut patch = payload
                    .lead
                    .clone()
                    .unwrap_or_else(|| LeadPatch::new(payload.lead_id.clone()));
                patch.id = payload.lead_id.clone();
                if patch.updated_at.is_none() {
                    patch.updated_at = payload.activity.at;
                }
                vec![patch]
            }
            PushEvent::CallLogged(payload) => {
                let mut patch = payload
                    .lead
                    .clone()
                    .unwrap_or_else(|| LeadPatch::new(payload.lead_id.clone()));
                patch.id = payload.lead_id.clone();
                if patch.last_contacted_at.is_none() {
                    patch.last_contacted_at = payload.called_at;
                }
                vec![patch]
            }
            PushEvent::LeadsAssigned(payload) => payload
                .lead_ids
                .iter()
                .map(|id| LeadPatch {
                    assigned_to: payload.assigned_to.clone(),
                    ..LeadPatch::new(id.clone())
                })
                .collect(),
        }
    }
}

fn stamp(at: Option<DateTime<Utc>>) -> String {
    at.map(|value| value.timestamp_millis().to_string())
        .unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_change_accepts_aliases_and_builds_patch() {
        let event: PushEvent = serde_json::from_str(
            r#"{
                "event": "status_changed",
                "data": {"leadId": "L-1", "status": "booked", "changedAt": "2026-03-02T10:00:00Z"}
            }"#,
        )
        .expect("parse event");

        assert_eq!(event.kind(), PushEventKind::StatusChanged);
        assert_eq!(event.dedupe_key(), "status_changed:L-1:booked");

        let patches = event.patches();
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].status, Some(LeadStatus::Booked));
        assert!(patches[0].updated_at.is_some());
        assert!(patches[0].field_data.is_empty());
    }

    #[test]
    fn assignment_key_ignores_id_order() {
        let forward: PushEvent = serde_json::from_str(
            r#"{"event": "leads_assigned", "data": {"leadIds": ["b", "a"], "agentId": "caller-2"}}"#,
        )
        .expect("parse forward");
        let reversed: PushEvent = serde_json::from_str(
            r#"{"event": "leads_assigned", "data": {"ids": ["a", "b"], "assignedTo": "caller-2"}}"#,
        )
        .expect("parse reversed");

        assert_eq!(forward.dedupe_key(), reversed.dedupe_key());
        assert_eq!(forward.dedupe_key(), "leads_assigned:caller-2:a,b");

        let patches = forward.patches();
        assert_eq!(patches.len(), 2);
        assert!(patches
            .iter()
            .all(|patch| patch.assigned_to.as_deref() == Some("caller-2")));
    }

    #[test]
    fn repeated_updates_are_distinguished_by_timestamp() {
        let first = PushEvent::LeadUpdated(LeadPatch {
            updated_at: "2026-03-02T10:00:00Z".parse().ok(),
            ..LeadPatch::new("L-9")
        });
        let second = PushEvent::LeadUpdated(LeadPatch {
            updated_at: "2026-03-02T10:00:05Z".parse().ok(),
            ..LeadPatch::new("L-9")
        });
        assert_ne!(first.dedupe_key(), second.dedupe_key());

        let untimed = PushEvent::LeadUpdated(LeadPatch::new("L-9"));
        assert_eq!(untimed.dedupe_key(), "lead_updated:L-9:-");
    }

    #[test]
    fn call_logged_sets_last_contacted() {
        let event: PushEvent = serde_json::from_str(
            r#"{
                "event": "call_logged",
                "data": {"_id": 77, "outcome": "no_answer", "timestamp": "2026-03-02T11:30:00Z"}
            }"#,
        )
        .expect("parse call");

        assert!(event.dedupe_key().starts_with("call_logged:77:no_answer:"));
        let patch = &event.patches()[0];
        assert_eq!(patch.id, "77");
        assert!(patch.last_contacted_at.is_some());
    }

    #[test]
    fn unknown_event_name_is_rejected() {
        let result = serde_json::from_str::<PushEvent>(r#"{"event": "export_ready", "data": {}}"#);
        assert!(result.is_err());
    }
}
