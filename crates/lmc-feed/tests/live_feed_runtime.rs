use lmc_core::events::LeadPatch;
use lmc_core::memory::InMemoryLeadApi;
use lmc_core::{FieldValue, Lead, LeadStatus, PageQuery, PushEvent, SystemClock};
use lmc_feed::{FeedNotice, LiveView, LiveViewConfig, ViewSnapshot};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

type View = LiveView<Arc<InMemoryLeadApi>>;

fn lead(n: u32) -> Lead {
    Lead {
        created_at: format!("2026-03-02T10:{n:02}:00Z").parse().ok(),
        field_data: vec![FieldValue::single("full_name", format!("Lead {n}"))],
        ..Lead::new(format!("L-{n}"))
    }
}

fn status_event(id: &str, status: LeadStatus) -> PushEvent {
    PushEvent::StatusChanged(
        serde_json::from_value(serde_json::json!({
            "leadId": id,
            "newStatus": status.as_str(),
        }))
        .expect("status payload"),
    )
}

struct Harness {
    api: Arc<InMemoryLeadApi>,
    events: mpsc::Sender<PushEvent>,
    snapshots: watch::Receiver<ViewSnapshot>,
    notices: broadcast::Receiver<FeedNotice>,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<View>,
}

async fn launch(leads: Vec<Lead>, page_size: u32) -> Harness {
    let api = Arc::new(InMemoryLeadApi::new(leads));
    let mut view = LiveView::new(
        api.clone(),
        PageQuery::default().on_page(1, page_size),
        LiveViewConfig::list(),
        Arc::new(SystemClock),
    );
    view.load().await.expect("initial load");
    let snapshots = view.subscribe();
    let notices = view.subscribe_notices();
    let (events, events_rx) = mpsc::channel(64);
    let (shutdown, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(view.run(events_rx, shutdown_rx));
    Harness {
        api,
        events,
        snapshots,
        notices,
        shutdown,
        handle,
    }
}

impl Harness {
    fn snapshot(&self) -> ViewSnapshot {
        self.snapshots.borrow().clone()
    }

    async fn stop(self) -> View {
        let _ = self.shutdown.send(true);
        self.handle.await.expect("join live view")
    }
}

#[tokio::test(start_paused = true)]
async fn burst_of_events_is_reconciled_and_resynced_once() {
    let harness = launch((1..=6).map(lead).collect(), 3).await;
    assert_eq!(harness.api.fetch_count(), 1);

    let mut booked = lead(6);
    booked.status = LeadStatus::Booked;
    harness.api.put_lead(booked);

    harness
        .events
        .send(status_event("L-6", LeadStatus::Booked))
        .await
        .expect("send");
    harness
        .events
        .send(status_event("L-6", LeadStatus::Booked))
        .await
        .expect("send duplicate");
    for n in 1..=3 {
        harness
            .events
            .send(status_event(&format!("L-{n}"), LeadStatus::Lost))
            .await
            .expect("send offscreen");
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    let snapshot = harness.snapshot();
    assert_eq!(snapshot.leads[0].id, "L-6");
    assert_eq!(snapshot.leads[0].status, LeadStatus::Booked);
    assert_eq!(snapshot.highlighted, vec!["L-6".to_string()]);
    assert!(snapshot.resync_pending);
    assert_eq!(harness.api.fetch_count(), 1, "no fetch inside the window");

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(harness.api.fetch_count(), 2, "burst coalesced into one fetch");
    let snapshot = harness.snapshot();
    assert!(!snapshot.resync_pending);
    assert_eq!(snapshot.leads[0].status, LeadStatus::Booked);
    assert_eq!(snapshot.highlighted, vec!["L-6".to_string()]);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(harness.snapshot().highlighted.is_empty());

    let view = harness.stop().await;
    assert_eq!(view.leads().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn re_marked_highlight_expires_after_second_deadline() {
    let harness = launch((1..=2).map(lead).collect(), 5).await;

    harness
        .events
        .send(PushEvent::LeadUpdated(LeadPatch {
            updated_at: "2026-03-02T11:00:00Z".parse().ok(),
            ..LeadPatch::new("L-1")
        }))
        .await
        .expect("send first");
    tokio::time::sleep(Duration::from_secs(1)).await;
    harness
        .events
        .send(PushEvent::LeadUpdated(LeadPatch {
            updated_at: "2026-03-02T11:00:01Z".parse().ok(),
            ..LeadPatch::new("L-1")
        }))
        .await
        .expect("send second");

    tokio::time::sleep(Duration::from_millis(2_000)).await;
    assert_eq!(harness.snapshot().highlighted, vec!["L-1".to_string()]);

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(harness.snapshot().highlighted.is_empty());

    harness.stop().await;
}

#[tokio::test(start_paused = true)]
async fn closed_transport_still_flushes_pending_resync() {
    let harness = launch((1..=2).map(lead).collect(), 5).await;

    harness
        .events
        .send(PushEvent::Intake(LeadPatch::new("L-77")))
        .await
        .expect("send intake");
    let Harness {
        api,
        events,
        snapshots,
        shutdown,
        handle,
        ..
    } = harness;
    drop(events);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(api.fetch_count(), 2);
    assert!(!snapshots.borrow().resync_pending);

    let _ = shutdown.send(true);
    let mut view = handle.await.expect("join live view");
    assert_eq!(view.drain_notices().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn arrival_notice_reaches_subscriber_while_running() {
    let mut harness = launch((1..=2).map(lead).collect(), 5).await;

    harness
        .events
        .send(PushEvent::Intake(LeadPatch {
            field_data: vec![FieldValue::single("full_name", "Grace Hopper")],
            ..LeadPatch::new("L-77")
        }))
        .await
        .expect("send intake");
    let notice = tokio::time::timeout(Duration::from_millis(500), harness.notices.recv())
        .await
        .expect("notice before timeout")
        .expect("notice channel open");
    assert_eq!(
        notice,
        FeedNotice::NewLead {
            lead_id: "L-77".to_string(),
            name: Some("Grace Hopper".to_string()),
        }
    );
    assert!(!harness.handle.is_finished());

    harness.stop().await;
}
