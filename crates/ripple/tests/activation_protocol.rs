//! End-to-end behavior of the activation protocol: matching, arbitration,
//! wipes and action outcomes, driven through a real context.

use ripple_core::{
    s, ActionContext, ContextConfig, FiringStatus, Module, Outcome, Property, State,
};
use ripple_testing::{Recorder, TestHarness};
use serde_json::{json, Value};
use std::future::{ready, Ready};
use std::time::Duration;

fn rawio() -> Module {
    Module::new("rawio")
        .property(Property::new("rawio", "in").default_value(""))
        .property(Property::new("rawio", "out").default_value(""))
}

/// Sets `rawio:out` to `text`.
fn say(
    text: &'static str,
) -> impl Fn(ActionContext) -> Ready<anyhow::Result<Outcome>> + Send + Sync + 'static {
    move |ctx: ActionContext| {
        let result = ctx.set("rawio:out", text).map(|()| Outcome::Nothing);
        ready(result.map_err(Into::into))
    }
}

// ============================================================================
// Constraint derivation
// ============================================================================

#[tokio::test]
async fn derived_constraint_fires_on_any_read_property() {
    let recorder = Recorder::new();
    let mut harness = TestHarness::new().module(
        rawio()
            .property(Property::new("rawio", "mood"))
            .state(
                State::builder("watch")
                    .read("rawio:in")
                    .read("rawio:mood")
                    .action(recorder.action(Outcome::Nothing)),
            ),
    );

    harness.set_and_settle("rawio:in", "hello").await;
    assert_eq!(recorder.count("rawio:watch"), 1);

    harness.set_and_settle("rawio:mood", "happy").await;
    assert_eq!(recorder.count("rawio:watch"), 2);
}

#[tokio::test]
async fn state_without_trigger_never_activates() {
    let recorder = Recorder::new();
    let mut harness = TestHarness::new().module(
        rawio().state(
            State::builder("orphan")
                .write("rawio:out")
                .action(recorder.action(Outcome::Nothing)),
        ),
    );

    harness.set_and_settle("rawio:in", "anything").await;
    harness.emit_and_settle("rawio:orphan").await;

    assert_eq!(recorder.total(), 0);
    assert!(harness
        .context()
        .activations()
        .iter()
        .all(|a| a.state != "rawio:orphan"));
}

#[tokio::test]
async fn repeated_signal_in_one_round_fires_once() {
    let recorder = Recorder::new();
    let mut harness = TestHarness::new().module(
        Module::new("m").state(
            State::builder("a")
                .cond(s("go"))
                .action(recorder.action(Outcome::Nothing)),
        ),
    );

    harness.context().emit("go");
    harness.context().emit("go");
    let reports = harness.settle().await;

    assert_eq!(reports[0].new_instances, 2);
    assert_eq!(reports[0].retired, 1);
    assert_eq!(recorder.count("m:a"), 1);
}

// ============================================================================
// Arbitration
// ============================================================================

#[tokio::test]
async fn more_specific_writer_wins_and_other_is_wiped() {
    let mut harness = TestHarness::new().module(
        rawio()
            .state(
                State::builder("generic")
                    .write("rawio:out")
                    .cond(s("rawio:in:changed"))
                    .action(say("generic")),
            )
            .state(
                State::builder("specific")
                    .write("rawio:out")
                    .cond(s("rawio:in:changed").weight(2.0))
                    .action(say("specific")),
            ),
    );

    let reports = harness.set_and_settle("rawio:in", "hi").await;

    assert_eq!(reports[0].fired, vec!["rawio:specific"]);
    assert_eq!(reports[0].wiped, vec!["rawio:generic"]);
    assert_eq!(harness.property("rawio:out"), json!("specific"));
    harness.assert_not_fired("rawio:generic");

    // The loser starts over with a fresh activation.
    let generic = harness
        .context()
        .activations()
        .into_iter()
        .find(|a| a.state == "rawio:generic")
        .unwrap();
    assert!(generic.signals.is_empty());
    assert!(generic.claims.is_empty());
}

#[tokio::test]
async fn equal_specificity_falls_back_to_declaration_order() {
    let mut harness = TestHarness::new().module(
        rawio()
            .state(
                State::builder("first")
                    .write("rawio:out")
                    .cond(s("tick"))
                    .action(say("first")),
            )
            .state(
                State::builder("second")
                    .write("rawio:out")
                    .cond(s("tick"))
                    .action(say("second")),
            ),
    );

    for _ in 0..5 {
        harness.emit_and_settle("tick").await;
    }
    assert_eq!(harness.fired_count("rawio:first"), 5);
    harness.assert_not_fired("rawio:second");
}

#[tokio::test]
async fn more_bound_signals_outrank_fewer() {
    let mut harness = TestHarness::new().module(
        rawio()
            .state(
                State::builder("any")
                    .write("rawio:out")
                    .cond(s("a"))
                    .action(say("any")),
            )
            .state(
                State::builder("both")
                    .write("rawio:out")
                    .cond(s("a") & s("b"))
                    .action(say("both")),
            ),
    );

    // Only `b` first: `both` stays Pending and nothing competes.
    harness.emit_and_settle("b").await;
    harness.emit_and_settle("a").await;

    harness.assert_fired("rawio:both");
    harness.assert_not_fired("rawio:any");
    assert_eq!(harness.property("rawio:out"), json!("both"));
}

#[tokio::test]
async fn disjoint_writers_fire_in_the_same_round() {
    let recorder = Recorder::new();
    let mut harness = TestHarness::new().module(
        rawio()
            .property(Property::new("rawio", "log"))
            .state(
                State::builder("speak")
                    .write("rawio:out")
                    .cond(s("go"))
                    .action(recorder.action(Outcome::Nothing)),
            )
            .state(
                State::builder("note")
                    .write("rawio:log")
                    .cond(s("go"))
                    .action(recorder.action(Outcome::Nothing)),
            ),
    );

    let reports = harness.emit_and_settle("go").await;
    assert_eq!(reports[0].fired, vec!["rawio:speak", "rawio:note"]);
    assert!(reports[0].wiped.is_empty());
}

#[tokio::test]
async fn writer_waits_for_running_action_on_same_property() {
    let slow = State::builder("slow")
        .write("rawio:out")
        .cond(s("slow"))
        .action(|ctx: ActionContext| async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            ctx.set("rawio:out", "slow")?;
            Outcome::done()
        });
    let mut harness = TestHarness::new().module(rawio().state(slow).state(
        State::builder("fast")
            .write("rawio:out")
            .cond(s("fast"))
            .action(say("fast")),
    ));

    let ctx = harness.context_mut();
    ctx.emit("slow");
    let first = ctx.step().await;
    assert_eq!(first.fired, vec!["rawio:slow"]);

    ctx.emit("fast");
    let second = ctx.step().await;
    assert!(second.fired.is_empty());
    assert_eq!(second.deferred, vec!["rawio:fast"]);

    harness.settle().await;
    assert_eq!(harness.fired_states(), vec!["rawio:slow", "rawio:fast"]);
    assert_eq!(harness.property("rawio:out"), json!("fast"));
}

#[tokio::test]
async fn deferred_writer_still_outranks_weaker_rivals() {
    let holder = State::builder("holder")
        .write("m:p")
        .cond(s("hold"))
        .action(|ctx: ActionContext| async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            ctx.set("m:p", "holder")?;
            Outcome::done()
        });
    let recorder = Recorder::new();
    let mut harness = TestHarness::new().module(
        Module::new("m")
            .property(Property::new("m", "p"))
            .property(Property::new("m", "q"))
            .state(holder)
            .state(
                State::builder("big")
                    .write("m:p")
                    .write("m:q")
                    .cond(s("go").weight(2.0))
                    .action(recorder.action(Outcome::Nothing)),
            )
            .state(
                State::builder("small")
                    .write("m:q")
                    .cond(s("go"))
                    .action(recorder.action(Outcome::Nothing)),
            ),
    );

    let ctx = harness.context_mut();
    ctx.emit("hold");
    let first = ctx.step().await;
    assert_eq!(first.fired, vec!["m:holder"]);

    // `big` waits on m:p but keeps m:q, so `small` may not take it.
    ctx.emit("go");
    let second = ctx.step().await;
    assert!(second.fired.is_empty());
    assert_eq!(second.deferred, vec!["m:big"]);
    assert_eq!(second.wiped, vec!["m:small"]);

    harness.settle().await;
    assert_eq!(harness.fired_states(), vec!["m:holder", "m:big"]);
    harness.assert_not_fired("m:small");
    assert_eq!(recorder.count("m:small"), 0);
}

// ============================================================================
// Outcomes
// ============================================================================

#[tokio::test]
async fn delete_deregisters_the_state() {
    let recorder = Recorder::new();
    let mut harness = TestHarness::new().module(
        Module::new("m").state(
            State::builder("once")
                .cond(s("go"))
                .action(recorder.action(Outcome::Delete)),
        ),
    );

    let reports = harness.emit_and_settle("go").await;
    assert!(reports.iter().any(|r| r.deleted == vec!["m:once"]));

    harness.emit_and_settle("go").await;
    harness.emit_and_settle("go").await;
    assert_eq!(recorder.count("m:once"), 1);

    let ctx = harness.context();
    let id = ctx.state_id("m:once").unwrap();
    assert!(ctx.is_deleted(id));
    assert!(ctx.activations().iter().all(|a| a.state != "m:once"));
}

#[tokio::test]
async fn deleted_receptor_rejects_invocation() {
    let recorder = Recorder::new();
    let mut harness = TestHarness::new().module(
        Module::new("m").state(
            State::builder("input")
                .receptor()
                .action(recorder.action(Outcome::Delete)),
        ),
    );

    harness.invoke_and_settle("m:input", vec![]).await;
    let err = harness
        .context_mut()
        .invoke_receptor("m:input", vec![])
        .unwrap_err();
    assert_eq!(err.code(), "ENGINE_STATE_DELETED");
}

#[tokio::test]
async fn emitted_signal_is_matched_in_a_later_round() {
    let recorder = Recorder::new();
    let mut harness = TestHarness::new().module(
        Module::new("nlp")
            .state(
                State::builder("parse")
                    .signal("parsed")
                    .cond(s("go"))
                    .action(recorder.action(Outcome::Emit)),
            )
            .state(
                State::builder("answer")
                    .cond(s("nlp:parsed"))
                    .action(recorder.action(Outcome::Nothing)),
            ),
    );

    harness.emit_and_settle("go").await;

    let history = harness.context().history();
    let parse = history.iter().find(|r| r.state == "nlp:parse").unwrap();
    let answer = history.iter().find(|r| r.state == "nlp:answer").unwrap();
    assert!(answer.round > parse.round);
    assert_eq!(answer.signals, vec!["nlp:parsed"]);
    assert_eq!(harness.fired_in_round(parse.round), vec!["nlp:parse"]);
}

#[tokio::test]
async fn emit_without_signal_is_ignored() {
    let recorder = Recorder::new();
    let mut harness = TestHarness::new().module(
        Module::new("m").state(
            State::builder("mute")
                .cond(s("go"))
                .action(recorder.action(Outcome::Emit)),
        ),
    );

    let reports = harness.emit_and_settle("go").await;
    assert_eq!(reports.iter().map(|r| r.new_instances).sum::<usize>(), 1);
    assert_eq!(
        harness.context().history()[0].status,
        FiringStatus::Finished(Outcome::Emit)
    );
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn failing_and_panicking_actions_are_recorded() {
    let recorder = Recorder::new();
    let mut harness = TestHarness::new().module(
        Module::new("m")
            .state(
                State::builder("broken")
                    .cond(s("go"))
                    .action(recorder.failing("no model loaded")),
            )
            .state(
                State::builder("boom")
                    .cond(s("go"))
                    .action(|_ctx: ActionContext| async move {
                        if true {
                            panic!("kaboom");
                        }
                        Outcome::done()
                    }),
            ),
    );

    harness.emit_and_settle("go").await;

    let history = harness.context().history();
    let status = |state: &str| {
        history
            .iter()
            .find(|r| r.state == state)
            .map(|r| r.status.clone())
            .unwrap()
    };
    assert_eq!(status("m:broken"), FiringStatus::Failed("no model loaded".into()));
    match status("m:boom") {
        FiringStatus::Failed(message) => assert!(message.contains("kaboom"), "{message}"),
        other => panic!("unexpected status {other:?}"),
    }

    // A failure is not retried, and the context keeps working.
    harness.emit_and_settle("go").await;
    assert_eq!(recorder.count("m:broken"), 2);
}

#[tokio::test]
async fn undeclared_write_fails_the_action() {
    let mut harness = TestHarness::new().module(
        rawio().state(
            State::builder("sneaky")
                .read("rawio:in")
                .action(|ctx: ActionContext| async move {
                    ctx.set("rawio:out", "leak")?;
                    Outcome::done()
                }),
        ),
    );

    harness.set_and_settle("rawio:in", "x").await;

    assert_eq!(harness.property("rawio:out"), json!(""));
    match &harness.context().history()[0].status {
        FiringStatus::Failed(message) => assert!(message.contains("may not write")),
        other => panic!("unexpected status {other:?}"),
    }
}

// ============================================================================
// Child properties and receptors
// ============================================================================

fn interloc() -> Module {
    let all = Property::new("interloc", "all");
    Module::new("interloc")
        .depends_on("rawio")
        .property(all.clone())
        .state(
            State::builder("arrive")
                .receptor()
                .write(&all)
                .action(|ctx: ActionContext| async move {
                    let who = ctx.arg(0).and_then(Value::as_str).unwrap_or("anon").to_string();
                    ctx.push("interloc:all", &who, json!({ "name": who }))?;
                    Outcome::done()
                }),
        )
        .state(
            State::builder("leave")
                .receptor()
                .write(&all)
                .action(|ctx: ActionContext| async move {
                    let who = ctx.arg(0).and_then(Value::as_str).unwrap_or("anon");
                    ctx.pop(&format!("interloc:all:{who}"))?;
                    Outcome::done()
                }),
        )
        .state(
            State::builder("greeting")
                .read(&all)
                .write("rawio:out")
                .cond(all.pushed())
                .action(say("Hello!")),
        )
        .state(
            State::builder("farewell")
                .read(&all)
                .write("rawio:out")
                .cond(all.popped())
                .action(say("Bye!")),
        )
}

#[tokio::test]
async fn push_and_pop_drive_greeting_and_farewell() {
    let mut harness = TestHarness::new().module(rawio()).module(interloc());

    harness
        .invoke_and_settle("interloc:arrive", vec![json!("ada")])
        .await;
    assert_eq!(harness.property("rawio:out"), json!("Hello!"));
    assert_eq!(
        harness.context().properties().children("interloc:all"),
        vec!["interloc:all:ada"]
    );

    harness
        .invoke_and_settle("interloc:leave", vec![json!("ada")])
        .await;
    assert_eq!(harness.property("rawio:out"), json!("Bye!"));
    assert!(harness
        .context()
        .properties()
        .children("interloc:all")
        .is_empty());

    assert_eq!(
        harness.fired_states(),
        vec![
            "interloc:arrive",
            "interloc:greeting",
            "interloc:leave",
            "interloc:farewell"
        ]
    );
}

#[tokio::test]
async fn queued_receptor_call_runs_through_the_handle() {
    let recorder = Recorder::new();
    let mut harness = TestHarness::new().module(
        Module::new("m").state(
            State::builder("input")
                .receptor()
                .action(recorder.action(Outcome::Nothing)),
        ),
    );

    let handle = harness.context().handle();
    assert!(handle.invoke_receptor("m:input", vec![json!(1)]));
    assert!(handle.invoke_receptor("m:missing", vec![]));
    harness.settle().await;

    assert_eq!(recorder.calls().len(), 1);
    assert_eq!(recorder.calls()[0].args, vec![json!(1)]);
}

// ============================================================================
// Configuration
// ============================================================================

#[tokio::test]
async fn ttl_from_toml_retires_stale_halves() {
    let config = ContextConfig::from_toml_str("instance_ttl_rounds = 1").unwrap();
    let recorder = Recorder::new();
    let mut harness = TestHarness::with_config(config).module(
        Module::new("m").state(
            State::builder("pair")
                .cond(s("a") & s("b"))
                .action(recorder.action(Outcome::Nothing)),
        ),
    );

    harness.emit_and_settle("a").await;
    // One quiet round lets `a` expire.
    harness.context_mut().step().await;
    harness.emit_and_settle("b").await;
    assert_eq!(recorder.total(), 0);

    harness.context().emit("a");
    harness.emit_and_settle("b").await;
    assert_eq!(recorder.total(), 1);
}
