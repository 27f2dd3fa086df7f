use crate::reports::{Audience, Report};

pub const EMPTY_TIMELINE: &str = "Actions executed, but no reports generated.";

/// Agent facts and errors of one turn, in emission order, joined by `; `.
pub fn execution_timeline(reports: &[Report]) -> String {
    let facts = reports
        .iter()
        .filter(|report| matches!(report.audience, Audience::Agent | Audience::Error))
        .map(|report| report.text.trim())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>();
    if facts.is_empty() {
        return EMPTY_TIMELINE.to_string();
    }
    facts.join("; ")
}

/// Prompt that asks the agent for its final answer once the batch ran.
pub fn feedback_prompt(reports: &[Report], user_request: &str) -> String {
    format!(
        "SYSTEM_REPORT: {}. User request: '{}'. BASED ON THESE REAL FACTS, provide a brief final answer to the user.",
        execution_timeline(reports),
        user_request.trim()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reports::ReportBus;

    #[test]
    fn timeline_keeps_agent_facts_and_errors_only() {
        let bus = ReportBus::default();
        bus.system("mapped 1 field");
        bus.agent("[by_category] (Assign: '$q1'): Items found: 4 (Walls).");
        bus.warning("scope defaulted");
        bus.error("Step 2 (move_element) failed: boom");
        assert_eq!(
            execution_timeline(&bus.drain()),
            "[by_category] (Assign: '$q1'): Items found: 4 (Walls).; Step 2 (move_element) failed: boom"
        );
    }

    #[test]
    fn empty_turns_use_the_fallback() {
        let prompt = feedback_prompt(&[], " how many walls? ");
        assert_eq!(
            prompt,
            "SYSTEM_REPORT: Actions executed, but no reports generated.. User request: 'how many walls?'. BASED ON THESE REAL FACTS, provide a brief final answer to the user."
        );
    }
}
