use std::collections::BTreeMap;

use super::domain::AgentId;

/// Pick the eligible agent with the lightest active caseload.
///
/// `caseloads` holds only assignable agents. Ties go to the lowest id; the map is ordered by
/// id and `min_by_key` keeps the first minimum, so the result is deterministic.
pub fn select_agent(caseloads: &BTreeMap<AgentId, usize>) -> Option<AgentId> {
    caseloads
        .iter()
        .min_by_key(|(_, load)| **load)
        .map(|(agent, _)| *agent)
}
