use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Percentages are apportioned in hundredths of a percent.
const PERCENT_SCALE: f64 = 100.0;
const WHOLE_PERCENT: usize = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationMode {
    #[default]
    Count,
    Percentage,
}

impl AllocationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AllocationMode::Count => "count",
            AllocationMode::Percentage => "percentage",
        }
    }

    /// What an equal split divides: the pool itself, or 100 percent.
    pub fn split_target(&self, pool_size: usize) -> usize {
        match self {
            AllocationMode::Count => pool_size,
            AllocationMode::Percentage => WHOLE_PERCENT,
        }
    }
}

impl fmt::Display for AllocationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AllocationMode {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_lowercase().as_str() {
            "count" | "counts" => Ok(AllocationMode::Count),
            "percentage" | "percent" | "pct" => Ok(AllocationMode::Percentage),
            other => Err(format!("Unknown allocation mode: {other}")),
        }
    }
}

/// One agent and the value the user typed for them: a lead count in count
/// mode, a percentage in percentage mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentShare {
    pub agent_id: String,
    #[serde(default)]
    pub raw: f64,
}

impl AgentShare {
    pub fn new(agent_id: impl Into<String>, raw: f64) -> Self {
        Self {
            agent_id: agent_id.into(),
            raw,
        }
    }

    /// Negative, NaN and infinite inputs count as zero.
    pub fn clamped(&self) -> f64 {
        if self.raw.is_finite() && self.raw > 0.0 {
            self.raw
        } else {
            0.0
        }
    }

    fn whole_count(&self) -> usize {
        self.clamped().floor() as usize
    }

    pub(crate) fn basis_points(&self) -> u64 {
        (self.clamped() * PERCENT_SCALE).round() as u64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationRequest {
    pub pool_size: usize,
    pub mode: AllocationMode,
    #[serde(default)]
    pub agents: Vec<AgentShare>,
}

impl AllocationRequest {
    pub fn new(pool_size: usize, mode: AllocationMode) -> Self {
        Self {
            pool_size,
            mode,
            agents: Vec::new(),
        }
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>, raw: f64) -> Self {
        self.agents.push(AgentShare::new(agent_id, raw));
        self
    }

    pub fn agent_ids(&self) -> Vec<String> {
        self.agents
            .iter()
            .map(|share| share.agent_id.clone())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationEntry {
    pub agent_id: String,
    pub count: usize,
}

/// Per-agent lead counts, in the order the agents were selected.
///
/// Agents whose raw value was zero have no entry at all. Use
/// [`Allocation::count_for`] when every selected agent has to be shown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Allocation {
    pub mode: AllocationMode,
    pub pool_size: usize,
    pub entries: Vec<AllocationEntry>,
}

impl Allocation {
    pub fn count_for(&self, agent_id: &str) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.agent_id == agent_id)
            .map(|entry| entry.count)
            .fold(0, usize::saturating_add)
    }

    /// Saturates rather than wrapping, so absurd typed counts read as over.
    pub fn total(&self) -> usize {
        self.entries
            .iter()
            .map(|entry| entry.count)
            .fold(0, usize::saturating_add)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_balanced(&self) -> bool {
        self.total() == self.pool_size
    }
}

/// `target / k` each, with the first `target % k` agents getting one more.
pub fn equal_split(target: usize, agents: &[String]) -> Vec<AllocationEntry> {
    if agents.is_empty() {
        return Vec::new();
    }
    let base = target / agents.len();
    let extra = target % agents.len();
    agents
        .iter()
        .enumerate()
        .map(|(idx, agent_id)| AllocationEntry {
            agent_id: agent_id.clone(),
            count: base + usize::from(idx < extra),
        })
        .collect()
}

/// The "distribute equally" action: fills in raw values for every agent so
/// that they add up to the pool (count mode) or to 100 (percentage mode).
pub fn distribute_equally(
    pool_size: usize,
    agents: &[String],
    mode: AllocationMode,
) -> AllocationRequest {
    AllocationRequest {
        pool_size,
        mode,
        agents: equal_split(mode.split_target(pool_size), agents)
            .into_iter()
            .map(|entry| AgentShare::new(entry.agent_id, entry.count as f64))
            .collect(),
    }
}

/// Turn raw values into lead counts.
///
/// Count mode takes the values as given and never corrects the total.
/// Percentage mode apportions the pool by largest remainder, so the counts
/// always add up to `pool_size` unless every raw value is zero.
pub fn allocate(request: &AllocationRequest) -> Allocation {
    let entries = match request.mode {
        AllocationMode::Count => request
            .agents
            .iter()
            .map(|share| (share, share.whole_count()))
            .filter(|(_, count)| *count > 0)
            .map(|(share, count)| AllocationEntry {
                agent_id: share.agent_id.clone(),
                count,
            })
            .collect(),
        AllocationMode::Percentage => {
            let weighted = request
                .agents
                .iter()
                .map(|share| (share, share.basis_points()))
                .filter(|(_, weight)| *weight > 0)
                .collect::<Vec<_>>();
            let weights = weighted.iter().map(|(_, weight)| *weight).collect::<Vec<_>>();
            weighted
                .iter()
                .zip(largest_remainder(request.pool_size, &weights))
                .map(|((share, _), count)| AllocationEntry {
                    agent_id: share.agent_id.clone(),
                    count,
                })
                .collect()
        }
    };

    Allocation {
        mode: request.mode,
        pool_size: request.pool_size,
        entries,
    }
}

/// Hamilton apportionment of `pool` units over `weights`.
///
/// Floors first, then one extra unit to each of the largest fractional
/// remainders. Equal remainders keep input order.
fn largest_remainder(pool: usize, weights: &[u64]) -> Vec<usize> {
    let total = weights.iter().map(|weight| u128::from(*weight)).sum::<u128>();
    if total == 0 {
        return vec![0; weights.len()];
    }

    let mut counts = Vec::with_capacity(weights.len());
    let mut remainders = Vec::with_capacity(weights.len());
    for weight in weights {
        let exact = u128::from(*weight) * pool as u128;
        counts.push((exact / total) as usize);
        remainders.push(exact % total);
    }

    let leftover = pool - counts.iter().sum::<usize>();
    let mut order = (0..weights.len()).collect::<Vec<_>>();
    order.sort_by(|a, b| remainders[*b].cmp(&remainders[*a]));
    for idx in order.into_iter().take(leftover) {
        counts[idx] += 1;
    }
    counts
}
