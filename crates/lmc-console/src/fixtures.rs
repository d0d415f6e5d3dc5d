use anyhow::{Context, Result};
use lmc_core::push_frames::{FrameError, PushFrameDecoder, DEFAULT_MAX_EVENT_BYTES};
use lmc_core::{Lead, LeadPage, PushEvent};
use serde_json::Value;
use std::path::Path;
use tokio::io::AsyncReadExt;
use tracing::warn;

const READ_CHUNK_BYTES: usize = 8 * 1024;

/// Leads from a captured list response, or from a bare JSON array of leads.
pub async fn load_leads(path: &Path) -> Result<Vec<Lead>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_leads(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

pub fn parse_leads(content: &str) -> Result<Vec<Lead>> {
    let value: Value = serde_json::from_str(content)?;
    if value.is_array() {
        return Ok(serde_json::from_value(value)?);
    }
    let page: LeadPage = serde_json::from_value(value)?;
    Ok(page.leads)
}

#[derive(Debug, Default)]
pub struct RecordedEvents {
    pub events: Vec<PushEvent>,
    pub errors: Vec<FrameError>,
}

/// Stream an NDJSON capture through the push decoder. Bad lines are kept as
/// errors and skipped.
pub async fn load_events(path: &Path) -> Result<RecordedEvents> {
    let mut file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let mut decoder = PushFrameDecoder::new(DEFAULT_MAX_EVENT_BYTES);
    let mut recorded = RecordedEvents::default();
    let mut buf = vec![0u8; READ_CHUNK_BYTES];
    loop {
        let read = file
            .read(&mut buf)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let batch = if read == 0 {
            decoder.finish()
        } else {
            decoder.push_chunk(&buf[..read])
        };
        recorded.events.extend(batch.events);
        for err in batch.errors {
            warn!(event = "replay_frame_skipped", error = %err);
            recorded.errors.push(err);
        }
        if read == 0 {
            break;
        }
    }
    Ok(recorded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parses_page_or_array() {
        let page = r#"{"records": [{"_id": "L-1"}, {"id": 7}], "total": 2, "totalPages": 1}"#;
        let ids = parse_leads(page)
            .expect("page")
            .into_iter()
            .map(|lead| lead.id)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["L-1", "7"]);

        let array = r#"[{"leadId": "L-9", "status": "booked"}]"#;
        let leads = parse_leads(array).expect("array");
        assert_eq!(leads[0].id, "L-9");
        assert!(parse_leads("42").is_err());
    }

    #[tokio::test]
    async fn reads_capture_and_keeps_bad_lines_as_errors() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("events.ndjson");
        let capture = [
            r#"{"event": "lead_updated", "data": {"id": "L-1", "status": "contacted"}}"#,
            "not json at all",
            r#"{"event": "call_logged", "data": {"leadId": "L-2", "outcome": "no_answer"}}"#,
        ]
        .join("\n");
        tokio::fs::write(&path, capture).await.expect("write capture");

        let recorded = load_events(&path).await.expect("load events");
        assert_eq!(recorded.events.len(), 2);
        assert_eq!(recorded.errors.len(), 1);
        assert!(matches!(recorded.errors[0], FrameError::Decode { line: 2, .. }));
    }
}
