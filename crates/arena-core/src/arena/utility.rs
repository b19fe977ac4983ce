//! Utility arena: scheduling, email, task tracking, reminders and goals.

use std::time::Duration;

use arena_state::ArenaType;
use serde_json::{json, Value};

use super::rubric::rubric_credit;
use super::upi::{autonomy, upi, utility_time_efficiency};
use super::{run_upi_battery, select_ids, AgentInterface};
use crate::domain::{ArenaRunResult, EngineFailure, Expectation, ScenarioSpec, UpiBreakdown};
use crate::sandbox::{ExecutionResult, SandboxExecutor};
use crate::scoring::UpiWeights;

pub const DEFAULT_KEYWORD: &str = "task_tracking";

pub const KEYWORD_SCENARIOS: [(&str, [&str; 3]); 5] = [
    ("scheduling", ["schedule_no_conflicts", "reschedule_meeting", "find_free_slot"]),
    ("email", ["summarize_email", "draft_reply", "categorize_inbox"]),
    ("task_tracking", ["update_task_status", "prioritize_tasks", "generate_report"]),
    ("reminders", ["set_reminder", "trigger_reminder", "recurring_reminder"]),
    ("goal_management", ["track_progress", "suggest_next_steps", "milestone_update"]),
];

/// Battery used when no keyword matches.
pub const DEFAULT_BATTERY: [&str; 3] = ["update_task_status", "set_reminder", "track_progress"];

fn task(id: &str, name: &str, difficulty: f64, input: Value, flags: &[&str]) -> ScenarioSpec {
    flags.iter().fold(
        ScenarioSpec::new(id, name, ArenaType::Utility, difficulty).with_input(input),
        |spec, key| spec.requires(*key, Expectation::Flag(true)),
    )
}

/// All utility scenarios, in keyword order.
pub fn catalog() -> Vec<ScenarioSpec> {
    vec![
        task(
            "schedule_no_conflicts",
            "Schedule Without Conflicts",
            1.0,
            json!({
                "existing_events": [
                    {"title": "Meeting A", "start": "09:00", "end": "10:00"},
                    {"title": "Meeting B", "start": "14:00", "end": "15:00"},
                ],
                "new_events": [
                    {"title": "New Meeting 1", "duration": 60},
                    {"title": "New Meeting 2", "duration": 30},
                    {"title": "New Meeting 3", "duration": 45},
                ],
                "working_hours": {"start": "08:00", "end": "18:00"},
            }),
            &["all_scheduled", "no_conflicts"],
        ),
        task(
            "reschedule_meeting",
            "Reschedule Cancelled Meeting",
            1.1,
            json!({
                "cancelled_meeting": {"title": "Team Sync", "original_time": "10:00", "duration": 30},
                "attendee_availability": [
                    {"name": "Alice", "free_slots": ["11:00-12:00", "15:00-16:00"]},
                    {"name": "Bob", "free_slots": ["11:00-12:00", "14:00-15:00"]},
                ],
            }),
            &["rescheduled", "all_attendees_available"],
        ),
        task(
            "find_free_slot",
            "Find Free Time Slot",
            0.9,
            json!({
                "calendar": [
                    {"start": "09:00", "end": "10:00"},
                    {"start": "11:00", "end": "12:00"},
                    {"start": "14:00", "end": "16:00"},
                ],
                "required_duration": 45,
                "working_hours": {"start": "08:00", "end": "18:00"},
            }),
            &["slot_found", "meets_duration"],
        ),
        task(
            "summarize_email",
            "Summarize Email Thread",
            1.0,
            json!({
                "email_thread": [
                    {"from": "alice@example.com", "subject": "Project Update", "body": "Here are the latest numbers..."},
                    {"from": "bob@example.com", "subject": "RE: Project Update", "body": "I have concerns about..."},
                    {"from": "alice@example.com", "subject": "RE: Project Update", "body": "Good point, let me clarify..."},
                ],
                "max_summary_length": 100,
            }),
            &["summary_accurate", "key_points_extracted"],
        ),
        task(
            "draft_reply",
            "Draft Email Reply",
            1.1,
            json!({
                "original_email": {
                    "from": "client@example.com",
                    "subject": "Question about pricing",
                    "body": "Hi, I was wondering about your pricing for the enterprise plan...",
                },
                "context": "Our enterprise plan starts at $99/month",
                "tone": "professional",
            }),
            &["addresses_question", "tone_appropriate"],
        ),
        task(
            "categorize_inbox",
            "Categorize Inbox Messages",
            1.0,
            json!({
                "emails": [
                    {"subject": "Weekly Newsletter", "from": "newsletter@news.com"},
                    {"subject": "URGENT: Server Down", "from": "alerts@company.com"},
                    {"subject": "Meeting Request", "from": "boss@company.com"},
                    {"subject": "You won a prize!", "from": "spam@prize.com"},
                ],
                "categories": ["urgent", "newsletter", "meeting", "spam", "other"],
            }),
            &["all_categorized"],
        )
        .requires("accuracy_threshold", Expectation::AtLeast(0.8)),
        task(
            "update_task_status",
            "Update Task Status",
            0.9,
            json!({
                "task": {"id": 1, "title": "Complete report", "status": "in_progress"},
                "update": {"status": "completed", "completion_notes": "Report submitted to manager"},
            }),
            &["task_updated", "status_valid"],
        ),
        task(
            "prioritize_tasks",
            "Prioritize Task List",
            1.2,
            json!({
                "tasks": [
                    {"title": "Fix critical bug", "due": "today", "impact": "high"},
                    {"title": "Update documentation", "due": "next week", "impact": "low"},
                    {"title": "Review PR", "due": "tomorrow", "impact": "medium"},
                    {"title": "Team meeting prep", "due": "today", "impact": "medium"},
                ],
            }),
            &["prioritized_correctly", "considers_due_date", "considers_impact"],
        ),
        task(
            "generate_report",
            "Generate Status Report",
            1.1,
            json!({"completed_tasks": 5, "pending_tasks": 3, "blocked_tasks": 1, "period": "weekly"}),
            &["report_generated", "includes_metrics"],
        ),
        task(
            "set_reminder",
            "Set Reminder",
            0.8,
            json!({"reminder": "Call mom", "time": "tomorrow at 3pm"}),
            &["reminder_set", "time_parsed"],
        ),
        task(
            "trigger_reminder",
            "Trigger Due Reminder",
            0.9,
            json!({
                "current_time": "15:00",
                "reminders": [
                    {"text": "Team standup", "time": "14:00", "triggered": true},
                    {"text": "Call mom", "time": "15:00", "triggered": false},
                    {"text": "Dinner reservation", "time": "18:00", "triggered": false},
                ],
            }),
            &["correct_reminder_triggered"],
        ),
        task(
            "recurring_reminder",
            "Set Recurring Reminder",
            1.0,
            json!({"reminder": "Weekly team meeting", "recurrence": "every Monday at 10am"}),
            &["recurrence_parsed", "schedule_created"],
        ),
        task(
            "track_progress",
            "Track Goal Progress",
            1.0,
            json!({
                "goal": {"title": "Learn Spanish", "target": 100, "current": 45, "unit": "lessons"},
                "new_progress": 5,
            }),
            &["progress_updated", "percentage_calculated"],
        ),
        task(
            "suggest_next_steps",
            "Suggest Next Steps",
            1.2,
            json!({
                "goal": {"title": "Launch product", "progress": 0.6},
                "completed_milestones": ["Design", "Development", "Testing"],
                "remaining_milestones": ["Marketing", "Launch"],
            }),
            &["suggestions_relevant", "considers_progress"],
        ),
        task(
            "milestone_update",
            "Update Milestone Status",
            1.0,
            json!({
                "goal_id": 1,
                "milestone": {"title": "Complete MVP", "status": "in_progress"},
                "new_status": "completed",
            }),
            &["milestone_updated", "goal_progress_recalculated"],
        ),
    ]
}

/// Scenarios for an agent's keywords.
pub fn select_battery(keywords: &[String]) -> Vec<ScenarioSpec> {
    let ids = select_ids(keywords, &KEYWORD_SCENARIOS, DEFAULT_KEYWORD, &DEFAULT_BATTERY);
    let catalog = catalog();
    ids.into_iter()
        .filter_map(|id| catalog.iter().find(|s| s.id == id).cloned())
        .collect()
}

fn score(
    spec: &ScenarioSpec,
    result: &ExecutionResult,
    output: &Value,
    weights: &UpiWeights,
) -> UpiBreakdown {
    upi(
        weights,
        rubric_credit(&spec.rubric, output),
        utility_time_efficiency(result.elapsed_ms),
        autonomy(result.retries, output),
    )
}

#[derive(Debug, Clone)]
pub struct UtilityArena {
    weights: UpiWeights,
    timeout: Duration,
    battery: Option<Vec<ScenarioSpec>>,
}

impl UtilityArena {
    pub fn new(weights: UpiWeights, timeout: Duration) -> Self {
        Self {
            weights,
            timeout,
            battery: None,
        }
    }

    /// Run a fixed battery instead of keyword selection.
    pub fn with_battery(mut self, battery: Vec<ScenarioSpec>) -> Self {
        self.battery = Some(battery);
        self
    }

    pub async fn run(
        &self,
        agent: &AgentInterface,
        sandbox: &dyn SandboxExecutor,
    ) -> Result<ArenaRunResult, EngineFailure> {
        let battery = match &self.battery {
            Some(fixed) => fixed.clone(),
            None => select_battery(&agent.keywords),
        };
        run_upi_battery(
            ArenaType::Utility,
            &battery,
            agent,
            sandbox,
            self.timeout,
            &self.weights,
            score,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(battery: &[ScenarioSpec]) -> Vec<&str> {
        battery.iter().map(|s| s.id.as_str()).collect()
    }

    #[test]
    fn test_catalog_covers_every_keyword() {
        let catalog = catalog();
        assert_eq!(catalog.len(), 15);
        for (_, scenario_ids) in KEYWORD_SCENARIOS {
            for id in scenario_ids {
                assert!(catalog.iter().any(|s| s.id == id), "missing {id}");
            }
        }
    }

    #[test]
    fn test_default_keyword_is_task_tracking() {
        let battery = select_battery(&[]);
        assert_eq!(
            ids(&battery),
            vec!["update_task_status", "prioritize_tasks", "generate_report"]
        );
    }

    #[test]
    fn test_unknown_keywords_use_default_battery() {
        let battery = select_battery(&["research".to_string()]);
        assert_eq!(ids(&battery), DEFAULT_BATTERY.to_vec());
    }

    #[test]
    fn test_keywords_capped_at_five() {
        let keywords = vec!["email".to_string(), "reminders".to_string()];
        let battery = select_battery(&keywords);
        assert_eq!(battery.len(), 5);
        assert_eq!(battery[0].id, "summarize_email");
        assert_eq!(battery[4].id, "trigger_reminder");
    }

    #[test]
    fn test_categorize_inbox_has_threshold() {
        let spec = catalog()
            .into_iter()
            .find(|s| s.id == "categorize_inbox")
            .unwrap();
        assert_eq!(
            spec.rubric.expectations.get("accuracy_threshold"),
            Some(&Expectation::AtLeast(0.8))
        );
        assert_eq!(spec.payload()["report"]["accuracy_threshold"], "ratio");
    }
}
