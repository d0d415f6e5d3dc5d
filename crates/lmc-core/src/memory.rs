use crate::api::{ApiError, AssignAck, BulkUpdateResult, LeadApi, LeadPage, LeadUpdates, PageQuery};
use crate::{Lead, LeadStatus};
use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Calls observed by [`InMemoryLeadApi`], in issue order.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiCall {
    FetchPage(PageQuery),
    Assign {
        lead_ids: Vec<String>,
        agent_id: String,
    },
    BulkUpdate {
        lead_ids: Vec<String>,
        updates: LeadUpdates,
    },
}

#[derive(Debug, Default)]
struct MemoryState {
    leads: Vec<Lead>,
    calls: Vec<ApiCall>,
    assign_calls: usize,
    fail_assign_on: Option<usize>,
    fail_fetches: bool,
}

/// Lead backend held entirely in memory.
///
/// Serves the console's fixture mode and the test suites. Filtering mirrors
/// the server's list endpoint closely enough for paging behavior to be real:
/// `status` and `assignedTo` match exactly, `search` matches any field value,
/// any other key matches a named field value.
#[derive(Debug, Default)]
pub struct InMemoryLeadApi {
    state: Mutex<MemoryState>,
}

impl InMemoryLeadApi {
    pub fn new(leads: Vec<Lead>) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                leads,
                ..MemoryState::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn leads(&self) -> Vec<Lead> {
        self.lock().leads.clone()
    }

    pub fn lead(&self, lead_id: &str) -> Option<Lead> {
        self.lock()
            .leads
            .iter()
            .find(|lead| lead.id == lead_id)
            .cloned()
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.lock().calls.clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| matches!(call, ApiCall::FetchPage(_)))
            .count()
    }

    /// Simulate a change made elsewhere on the server.
    pub fn put_lead(&self, lead: Lead) {
        let mut state = self.lock();
        match state.leads.iter_mut().find(|existing| existing.id == lead.id) {
            Some(existing) => *existing = lead,
            None => state.leads.push(lead),
        }
    }

    /// Make the `nth` assign call (1-based) fail with a server error.
    pub fn fail_assign_on(&self, nth: usize) {
        self.lock().fail_assign_on = Some(nth);
    }

    pub fn fail_fetches(&self, fail: bool) {
        self.lock().fail_fetches = fail;
    }
}

#[async_trait]
impl LeadApi for InMemoryLeadApi {
    async fn fetch_page(&self, query: &PageQuery) -> Result<LeadPage, ApiError> {
        let mut state = self.lock();
        state.calls.push(ApiCall::FetchPage(query.clone()));
        if state.fail_fetches {
            return Err(ApiError::Transport {
                message: "connection reset".to_string(),
            });
        }

        let mut matching = state
            .leads
            .iter()
            .filter(|lead| matches_filters(lead, query))
            .cloned()
            .collect::<Vec<_>>();
        matching.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });

        let page_size = query.page_size.max(1) as usize;
        let total = matching.len();
        let total_pages = total.div_ceil(page_size) as u32;
        let start = (query.page.max(1) as usize - 1).saturating_mul(page_size);
        let leads = matching.into_iter().skip(start).take(page_size).collect();
        debug!(event = "memory_fetch_page", page = query.page, total);

        Ok(LeadPage {
            leads,
            total: total as u64,
            total_pages,
        })
    }

    async fn assign(&self, lead_ids: &[String], agent_id: &str) -> Result<AssignAck, ApiError> {
        let mut state = self.lock();
        state.assign_calls += 1;
        state.calls.push(ApiCall::Assign {
            lead_ids: lead_ids.to_vec(),
            agent_id: agent_id.to_string(),
        });
        if state.fail_assign_on == Some(state.assign_calls) {
            return Err(ApiError::Http {
                status: 503,
                body: "assignment service unavailable".to_string(),
            });
        }

        let mut assigned = 0;
        for lead in state.leads.iter_mut() {
            if lead_ids.contains(&lead.id) {
                lead.assigned_to = Some(agent_id.to_string());
                assigned += 1;
            }
        }
        Ok(AssignAck { assigned })
    }

    async fn bulk_update(
        &self,
        lead_ids: &[String],
        updates: &LeadUpdates,
    ) -> Result<BulkUpdateResult, ApiError> {
        let mut state = self.lock();
        state.calls.push(ApiCall::BulkUpdate {
            lead_ids: lead_ids.to_vec(),
            updates: updates.clone(),
        });
        if updates.is_empty() {
            return Err(ApiError::Rejected {
                message: "no updates supplied".to_string(),
            });
        }

        let mut count = 0;
        for lead in state.leads.iter_mut() {
            if !lead_ids.contains(&lead.id) {
                continue;
            }
            if let Some(status) = &updates.status {
                lead.status = status.clone();
            }
            if let Some(agent) = &updates.assigned_to {
                lead.assigned_to = Some(agent.clone());
            }
            for field in &updates.field_data {
                match lead.field_data.iter_mut().find(|f| f.name == field.name) {
                    Some(existing) => existing.values = field.values.clone(),
                    None => lead.field_data.push(field.clone()),
                }
            }
            count += 1;
        }
        Ok(BulkUpdateResult {
            success: true,
            count,
        })
    }
}

fn matches_filters(lead: &Lead, query: &PageQuery) -> bool {
    query.filters.iter().all(|(key, value)| match key.as_str() {
        "status" => value
            .parse::<LeadStatus>()
            .map(|status| status == lead.status)
            .unwrap_or(false),
        "assignedTo" => match value.as_str() {
            "unassigned" => lead.assigned_to.is_none(),
            agent => lead.assigned_to.as_deref() == Some(agent),
        },
        "search" => {
            let needle = value.to_lowercase();
            lead.field_data.iter().any(|field| {
                field
                    .values
                    .iter()
                    .any(|v| v.to_lowercase().contains(&needle))
            })
        }
        name => lead
            .field(name)
            .map(|field| field.values.iter().any(|v| v == value))
            .unwrap_or(false),
    })
}
