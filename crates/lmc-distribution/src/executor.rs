use crate::allocator::Allocation;
use lmc_core::{ApiError, LeadApi};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("allocation covers {allocated} leads but {selected} are selected")]
    LengthMismatch { allocated: usize, selected: usize },
}

#[derive(Debug, Error)]
pub enum AssignmentError {
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error(
        "assigning {} leads to {agent_id} failed after {} slices; {} leads left unassigned: {source}",
        .slice_len, .completed.len(), .remaining.len()
    )]
    SliceFailed {
        batch_id: Uuid,
        agent_id: String,
        slice_len: usize,
        completed: Vec<AssignmentSlice>,
        /// The failed slice and everything after it, in selection order.
        remaining: Vec<String>,
        #[source]
        source: ApiError,
    },
}

/// Contiguous run of the selection handed to one agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentSlice {
    pub agent_id: String,
    pub lead_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    pub batch_id: Uuid,
    pub slices: Vec<AssignmentSlice>,
    pub assigned: usize,
}

/// Cut the ordered selection into one slice per non-zero entry, in allocation
/// order. The same selection and allocation always produce the same slices.
pub fn plan_slices(
    lead_ids: &[String],
    allocation: &Allocation,
) -> Result<Vec<AssignmentSlice>, PlanError> {
    let allocated = allocation.total();
    if allocated != lead_ids.len() {
        return Err(PlanError::LengthMismatch {
            allocated,
            selected: lead_ids.len(),
        });
    }

    let mut offset = 0;
    let mut slices = Vec::new();
    for entry in &allocation.entries {
        if entry.count == 0 {
            continue;
        }
        slices.push(AssignmentSlice {
            agent_id: entry.agent_id.clone(),
            lead_ids: lead_ids[offset..offset + entry.count].to_vec(),
        });
        offset += entry.count;
    }
    Ok(slices)
}

/// Assign every slice, one call at a time.
///
/// Stops at the first failed call. Slices already sent stay assigned on the
/// server; the error carries them and the leads still unassigned.
pub async fn execute<A: LeadApi + ?Sized>(
    api: &A,
    lead_ids: &[String],
    allocation: &Allocation,
) -> Result<ExecutionReport, AssignmentError> {
    let slices = plan_slices(lead_ids, allocation)?;
    let batch_id = Uuid::new_v4();
    info!(
        event = "assignment_batch_start",
        batch_id = %batch_id,
        leads = lead_ids.len(),
        slices = slices.len()
    );

    let mut completed = Vec::with_capacity(slices.len());
    let mut offset = 0;
    for slice in slices {
        match api.assign(&slice.lead_ids, &slice.agent_id).await {
            Ok(ack) => {
                info!(
                    event = "assignment_slice_sent",
                    batch_id = %batch_id,
                    agent_id = %slice.agent_id,
                    leads = slice.lead_ids.len(),
                    acknowledged = ack.assigned
                );
                offset += slice.lead_ids.len();
                completed.push(slice);
            }
            Err(source) => {
                warn!(
                    event = "assignment_slice_failed",
                    batch_id = %batch_id,
                    agent_id = %slice.agent_id,
                    completed = completed.len(),
                    error = %source
                );
                return Err(AssignmentError::SliceFailed {
                    batch_id,
                    agent_id: slice.agent_id,
                    slice_len: slice.lead_ids.len(),
                    completed,
                    remaining: lead_ids[offset..].to_vec(),
                    source,
                });
            }
        }
    }

    info!(event = "assignment_batch_done", batch_id = %batch_id, assigned = offset);
    Ok(ExecutionReport {
        batch_id,
        slices: completed,
        assigned: offset,
    })
}
