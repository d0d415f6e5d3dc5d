use lmc_core::events::{BookingsPatch, LeadPatch};
use lmc_core::{Lead, LeadPage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// The lead is on the page; `changed` is false when the patch was a replay.
    Patched { changed: bool },
    /// The lead is not on the page. The page is untouched and a re-sync should
    /// decide whether it belongs there.
    NotVisible,
}

/// Apply a partial record to the page if, and only if, that lead is already
/// displayed. Never inserts: the page is a filtered, paginated server slice.
pub fn upsert(page: &mut LeadPage, patch: &LeadPatch) -> UpsertOutcome {
    match page.leads.iter_mut().find(|lead| lead.id == patch.id) {
        Some(lead) => UpsertOutcome::Patched {
            changed: merge_into(lead, patch),
        },
        None => UpsertOutcome::NotVisible,
    }
}

/// Shallow merge where a patch field wins only if present and non-empty.
/// Returns whether anything changed.
pub fn merge_into(lead: &mut Lead, patch: &LeadPatch) -> bool {
    let mut changed = false;

    if !patch.field_data.is_empty() && lead.field_data != patch.field_data {
        lead.field_data = patch.field_data.clone();
        changed = true;
    }
    if let Some(status) = patch.status.as_ref().filter(|status| !status.is_blank()) {
        changed |= replace(&mut lead.status, status.clone());
    }
    if let Some(agent) = patch
        .assigned_to
        .as_ref()
        .filter(|agent| !agent.trim().is_empty())
    {
        changed |= replace(&mut lead.assigned_to, Some(agent.clone()));
    }
    if let Some(at) = patch.created_at {
        changed |= replace(&mut lead.created_at, Some(at));
    }
    if let Some(at) = patch.updated_at {
        changed |= replace(&mut lead.updated_at, Some(at));
    }
    if let Some(at) = patch.last_contacted_at {
        changed |= replace(&mut lead.last_contacted_at, Some(at));
    }
    if let Some(BookingsPatch {
        outpatient,
        inpatient,
    }) = &patch.bookings
    {
        if let Some(booking) = outpatient {
            changed |= replace(&mut lead.bookings.outpatient, booking.clone());
        }
        if let Some(booking) = inpatient {
            changed |= replace(&mut lead.bookings.inpatient, booking.clone());
        }
    }

    changed
}

fn replace<T: PartialEq>(slot: &mut T, next: T) -> bool {
    if *slot == next {
        return false;
    }
    *slot = next;
    true
}
