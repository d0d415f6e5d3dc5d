use crate::allocator::{allocate, Allocation, AllocationMode, AllocationRequest};
use serde::Serialize;

/// Allocated total against the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "by", rename_all = "snake_case")]
pub enum Balance {
    Balanced,
    Remaining(usize),
    Over(usize),
}

impl Balance {
    pub fn of(allocated: usize, target: usize) -> Self {
        if allocated < target {
            Balance::Remaining(target - allocated)
        } else if allocated > target {
            Balance::Over(allocated - target)
        } else {
            Balance::Balanced
        }
    }

    pub fn label(&self) -> String {
        match self {
            Balance::Balanced => "balanced".to_string(),
            Balance::Remaining(n) => format!("{n} remaining"),
            Balance::Over(n) => format!("{n} over"),
        }
    }
}

/// Typed percentages against 100, to the hundredth of a percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "state", content = "by", rename_all = "snake_case")]
pub enum PercentBalance {
    Balanced,
    Remaining(f64),
    Over(f64),
}

impl PercentBalance {
    pub fn of_basis_points(total: u128) -> Self {
        const WHOLE: u128 = 10_000;
        if total < WHOLE {
            PercentBalance::Remaining((WHOLE - total) as f64 / 100.0)
        } else if total > WHOLE {
            PercentBalance::Over(total.saturating_sub(WHOLE) as f64 / 100.0)
        } else {
            PercentBalance::Balanced
        }
    }

    pub fn label(&self) -> String {
        match self {
            PercentBalance::Balanced => "balanced".to_string(),
            PercentBalance::Remaining(gap) => format!("{gap}% remaining"),
            PercentBalance::Over(gap) => format!("{gap}% over"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewRow {
    pub agent_id: String,
    pub raw: f64,
    pub count: usize,
    /// Share of the pool this agent ends up with.
    pub percent: f64,
}

/// Everything the distribution dialog renders while the user types: one row
/// per selected agent (zero rows included), the running total, and whether
/// the allocation can be submitted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationPreview {
    pub mode: AllocationMode,
    pub target: usize,
    pub rows: Vec<PreviewRow>,
    pub allocated: usize,
    pub balance: Balance,
    /// Sum of the typed percentages, percentage mode only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent_total: Option<f64>,
    /// How far the typed percentages are from 100, percentage mode only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent_balance: Option<PercentBalance>,
    pub allocation: Allocation,
}

impl AllocationPreview {
    pub fn build(request: &AllocationRequest) -> Self {
        let allocation = allocate(request);
        let target = request.pool_size;
        let rows = request
            .agents
            .iter()
            .map(|share| {
                let count = allocation.count_for(&share.agent_id);
                PreviewRow {
                    agent_id: share.agent_id.clone(),
                    raw: share.clamped(),
                    count,
                    percent: percent_of(count, target),
                }
            })
            .collect::<Vec<_>>();
        let allocated = allocation.total();
        let (percent_total, percent_balance) = match request.mode {
            AllocationMode::Count => (None, None),
            AllocationMode::Percentage => {
                let typed = request
                    .agents
                    .iter()
                    .map(|share| share.clamped())
                    .sum::<f64>();
                let basis_points = request
                    .agents
                    .iter()
                    .map(|share| u128::from(share.basis_points()))
                    .sum::<u128>();
                (Some(typed), Some(PercentBalance::of_basis_points(basis_points)))
            }
        };

        Self {
            mode: request.mode,
            target,
            rows,
            allocated,
            balance: Balance::of(allocated, target),
            percent_total,
            percent_balance,
            allocation,
        }
    }

    /// Gate for the submit button: something to assign, every lead in the
    /// pool accounted for exactly once, and in percentage mode the typed
    /// values adding up to 100.
    pub fn is_submittable(&self) -> bool {
        self.target > 0
            && !self.allocation.is_empty()
            && self.balance == Balance::Balanced
            && self
                .percent_balance
                .map_or(true, |gap| gap == PercentBalance::Balanced)
    }

    /// What is still wrong with the typed values, in the unit the user typed.
    pub fn gap_label(&self) -> String {
        match self.percent_balance {
            Some(gap) if gap != PercentBalance::Balanced => gap.label(),
            _ => self.balance.label(),
        }
    }
}

fn percent_of(count: usize, target: usize) -> f64 {
    if target == 0 {
        return 0.0;
    }
    (count as f64 / target as f64 * 10_000.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_mode_reports_remaining_and_over() {
        let short = AllocationPreview::build(
            &AllocationRequest::new(10, AllocationMode::Count)
                .with_agent("a", 4.0)
                .with_agent("b", 0.0)
                .with_agent("c", 3.0),
        );
        assert_eq!(short.rows.len(), 3);
        assert_eq!(short.rows[1].count, 0);
        assert_eq!(short.allocated, 7);
        assert_eq!(short.balance, Balance::Remaining(3));
        assert_eq!(short.balance.label(), "3 remaining");
        assert!(!short.is_submittable());
        assert_eq!(short.percent_total, None);

        let over = AllocationPreview::build(
            &AllocationRequest::new(5, AllocationMode::Count).with_agent("a", 6.0),
        );
        assert_eq!(over.balance, Balance::Over(1));
        assert!(!over.is_submittable());
    }

    #[test]
    fn percentage_mode_totalling_hundred_is_submittable() {
        let preview = AllocationPreview::build(
            &AllocationRequest::new(10, AllocationMode::Percentage)
                .with_agent("a", 33.0)
                .with_agent("b", 33.0)
                .with_agent("c", 34.0),
        );
        assert_eq!(preview.balance, Balance::Balanced);
        assert!(preview.is_submittable());
        assert_eq!(preview.percent_total, Some(100.0));
        assert_eq!(preview.percent_balance, Some(PercentBalance::Balanced));
        let percents = preview.rows.iter().map(|row| row.percent).collect::<Vec<_>>();
        assert_eq!(percents, vec![30.0, 30.0, 40.0]);
    }

    #[test]
    fn percentages_short_of_hundred_block_submission() {
        let short = AllocationPreview::build(
            &AllocationRequest::new(9, AllocationMode::Percentage)
                .with_agent("a", 20.0)
                .with_agent("b", 10.0),
        );
        assert_eq!(short.balance, Balance::Balanced);
        assert_eq!(short.percent_balance, Some(PercentBalance::Remaining(70.0)));
        assert_eq!(short.gap_label(), "70% remaining");
        assert!(!short.is_submittable());

        let over = AllocationPreview::build(
            &AllocationRequest::new(9, AllocationMode::Percentage)
                .with_agent("a", 60.0)
                .with_agent("b", 45.5),
        );
        assert_eq!(over.percent_balance, Some(PercentBalance::Over(5.5)));
        assert_eq!(over.gap_label(), "5.5% over");
        assert!(!over.is_submittable());

        let fractional = AllocationPreview::build(
            &AllocationRequest::new(3, AllocationMode::Percentage)
                .with_agent("a", 33.33)
                .with_agent("b", 33.33)
                .with_agent("c", 33.34),
        );
        assert_eq!(fractional.percent_balance, Some(PercentBalance::Balanced));
        assert!(fractional.is_submittable());
    }

    #[test]
    fn absurd_counts_read_as_over() {
        let preview = AllocationPreview::build(
            &AllocationRequest::new(5, AllocationMode::Count)
                .with_agent("a", 1e20)
                .with_agent("b", 1e20),
        );
        assert_eq!(preview.allocated, usize::MAX);
        assert_eq!(preview.balance, Balance::Over(usize::MAX - 5));
        assert!(!preview.is_submittable());
    }

    #[test]
    fn nothing_typed_is_not_submittable() {
        let preview = AllocationPreview::build(
            &AllocationRequest::new(8, AllocationMode::Percentage)
                .with_agent("a", 0.0)
                .with_agent("b", 0.0),
        );
        assert!(preview.allocation.is_empty());
        assert_eq!(preview.balance, Balance::Remaining(8));
        assert!(!preview.is_submittable());
    }

    #[test]
    fn serializes_for_the_dialog() {
        let preview = AllocationPreview::build(
            &AllocationRequest::new(2, AllocationMode::Count).with_agent("a", 1.0),
        );
        let value = serde_json::to_value(&preview).expect("serialize preview");
        assert_eq!(value["balance"], serde_json::json!({"state": "remaining", "by": 1}));
        assert_eq!(value["rows"][0]["agentId"], "a");
        assert!(value.get("percentTotal").is_none());
    }
}
