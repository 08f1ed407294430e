//! Canned flows used across the test suites.
//!
//! All flows belong to [`TENANT`].

use chrono::{Duration, Utc};

use convoflow_core::domain::block::ConditionOperator;
use convoflow_core::InteractiveFlow;

use crate::builders::{rule, FlowBuilder};

/// Tenant of every canned flow
pub const TENANT: &str = "acme";

/// `start -> message("Hi") -> buttons[A, B]`, `A -> end`, `B -> human_handoff`.
///
/// Keyword-triggered by "hello".
pub fn linear_menu() -> InteractiveFlow {
    FlowBuilder::new("linear-menu", TENANT)
        .name("Linear menu")
        .keywords(&["hello"])
        .message("hi", "Hi")
        .buttons("menu", "How can we help?", &[("A", "All good"), ("B", "Talk to someone")])
        .end("end")
        .human_handoff("human")
        .chain(&["start", "hi", "menu"])
        .route("menu", "A", "end")
        .route("menu", "B", "human")
        .build()
}

/// Keyword flow for `keyword` that only sends a message and ends
pub fn promo(keyword: &str) -> InteractiveFlow {
    FlowBuilder::new("promo", TENANT)
        .keywords(&[keyword])
        .message("offer", "20% off today")
        .end("end")
        .chain(&["start", "offer", "end"])
        .created_at(Utc::now() - Duration::hours(1))
        .build()
}

/// Sets `level` to `value`, then `level == 1 -> x`, `level == 2 -> y`,
/// default `z`. Each branch sends its own name and ends.
pub fn condition_routing(value: f64) -> InteractiveFlow {
    FlowBuilder::new("routing", TENANT)
        .set_variable("set", "level", value)
        .condition(
            "check",
            vec![
                rule("level", ConditionOperator::Equals, 1.0, "x"),
                rule("level", ConditionOperator::Equals, 2.0, "y"),
            ],
            Some("z"),
        )
        .message("x", "x")
        .message("y", "y")
        .message("z", "z")
        .end("end")
        .chain(&["start", "set", "check"])
        .edge("x", "end")
        .edge("y", "end")
        .edge("z", "end")
        .build()
}

/// `score = 5`, then `[score > 1 -> first, score == 5 -> second]`: both match
pub fn overlapping_conditions() -> InteractiveFlow {
    FlowBuilder::new("overlap", TENANT)
        .set_variable("set", "score", 5.0)
        .condition(
            "check",
            vec![
                rule("score", ConditionOperator::GreaterThan, 1.0, "first"),
                rule("score", ConditionOperator::Equals, 5.0, "second"),
            ],
            None,
        )
        .end("first")
        .end("second")
        .chain(&["start", "set", "check"])
        .build()
}

/// Two messages pointing at each other, no suspension point
pub fn runaway_loop() -> InteractiveFlow {
    FlowBuilder::new("loop", TENANT)
        .message("ping", "ping")
        .message("pong", "pong")
        .chain(&["start", "ping", "pong", "ping"])
        .build()
}

/// Two questions with captured answers, a counter and a branch on the
/// second answer:
///
/// `q1(list: fast|slow) -> count -> q2(buttons: yes|no)`,
/// `answer == "Yes" -> thanks(end)`, otherwise `agent(ai_handoff)`.
pub fn survey() -> InteractiveFlow {
    FlowBuilder::new("survey", TENANT)
        .always()
        .list("q1", "How was delivery?", &[("fast", "Fast"), ("slow", "Slow")])
        .capture("q1", "speed")
        .increment("count", "answers", 1.0)
        .buttons("q2", "Recommend us?", &[("yes", "Yes"), ("no", "No")])
        .capture("q2", "answer")
        .condition(
            "check",
            vec![rule("answer", ConditionOperator::Equals, "Yes", "thanks")],
            Some("agent"),
        )
        .end("thanks")
        .ai_handoff("agent")
        .chain(&["start", "q1"])
        .route("q1", "fast", "count")
        .route("q1", "slow", "count")
        .edge("count", "q2")
        .route("q2", "yes", "check")
        .route("q2", "no", "check")
        .build()
}
