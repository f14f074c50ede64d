//! Integration Tests for the Document Engine
//!
//! These tests drive whole documents through the public API: typing,
//! committing, clicking and dragging, and check what every component shows
//! afterwards.

use livedoc_core::value::parse_math;
use livedoc_core::{
    ActionCall, Content, DerivedSpec, DocumentBuilder, ComponentKind, EngineError, ExtendOptions,
    FormatOptions, InputSpec, NewValue, PointSpec, RecordingExecutor, Tier, Transform,
    TriggerSpec, UiEvent, Value, ValueKind, VarRef,
};

fn math(text: &str) -> Value {
    ValueKind::Math.parse(text)
}

fn text_of(value: &Value) -> String {
    match value {
        Value::Text(text) => text.clone(),
        _ => String::new(),
    }
}

fn append(target: &str, suffix: &'static str) -> NewValue {
    NewValue::function(vec![VarRef::value(target)], move |values| {
        Value::text(format!("{}{}", text_of(&values[0]), suffix))
    })
}

/// Typing into a bound view and committing writes back to the source.
#[test]
fn bound_view_round_trip() {
    let mut runtime = DocumentBuilder::new()
        .input("a", InputSpec::math().prefill("x+1"))
        .input("b", InputSpec::math().bind_to(VarRef::value("a")))
        .build()
        .unwrap();

    runtime.set_immediate_text("b", "x+12").unwrap();
    let view = runtime.editable_view("b").unwrap();
    assert_eq!(view.immediate, math("x+12"));
    assert_eq!(view.settled, math("x+1"));
    assert_eq!(runtime.value_of("a").unwrap(), math("x+1"));

    let report = runtime.commit("b").unwrap();
    assert!(!report.reverted);
    assert_eq!(runtime.value_of("a").unwrap(), math("x+12"));
    assert_eq!(runtime.value_of("b").unwrap(), math("x+12"));
    assert_eq!(runtime.editable_view("a").unwrap().immediate, math("x+12"));
}

/// A commit through a fixed source snaps back instead of failing.
#[test]
fn fixed_source_reverts_the_edit() {
    let mut runtime = DocumentBuilder::new()
        .input("a", InputSpec::math().prefill("x").fixed())
        .input("b", InputSpec::math().bind_to(VarRef::value("a")))
        .build()
        .unwrap();

    runtime.set_immediate_text("b", "y").unwrap();
    let report = runtime.commit("b").unwrap();

    assert!(report.reverted);
    assert_eq!(report.rejected, vec!["b.value"]);
    assert_eq!(runtime.value_of("a").unwrap(), math("x"));

    let view = runtime.editable_view("b").unwrap();
    assert_eq!(view.settled, math("x"));
    assert_eq!(view.immediate, math("x"));
    assert_eq!(view.raw_text, "x");
    assert!(!view.value_changed);
}

/// Text that does not parse is discarded on commit.
#[test]
fn unparseable_commit_keeps_the_settled_value() {
    let mut runtime = DocumentBuilder::new()
        .input("a", InputSpec::math().prefill("x"))
        .build()
        .unwrap();

    runtime.set_immediate_text("a", "x+").unwrap();
    assert_eq!(runtime.editable_view("a").unwrap().raw_text, "x+");

    let report = runtime.commit("a").unwrap();
    assert!(report.reverted);
    let view = runtime.editable_view("a").unwrap();
    assert_eq!(view.settled, math("x"));
    assert_eq!(view.immediate, math("x"));
}

/// Absurdly nested text is just another unparseable edit.
#[test]
fn deeply_nested_text_is_unparseable() {
    let mut runtime = DocumentBuilder::new()
        .input("a", InputSpec::math().prefill("x"))
        .build()
        .unwrap();

    let text = format!("{}x{}", "(".repeat(2000), ")".repeat(2000));
    runtime.set_immediate_text("a", &text).unwrap();
    let view = runtime.editable_view("a").unwrap();
    assert!(view.immediate.is_unparseable());
    assert_eq!(view.settled, math("x"));

    let report = runtime.commit("a").unwrap();
    assert!(report.reverted);
    assert_eq!(runtime.value_of("a").unwrap(), math("x"));
}

/// An alias and its source read identically through every step.
#[test]
fn extension_mirrors_both_tiers() {
    let mut runtime = DocumentBuilder::new()
        .input("a", InputSpec::number().prefill("1"))
        .extend("b", "a", ExtendOptions::new())
        .build()
        .unwrap();

    runtime.set_immediate_text("a", "5").unwrap();
    assert_eq!(runtime.editable_view("b").unwrap().immediate, Value::from(5.0));
    assert!(runtime.editable_view("b").unwrap().immediate_value_changed);

    runtime.set_immediate_text("b", "7").unwrap();
    assert_eq!(runtime.editable_view("a").unwrap().immediate, Value::from(7.0));

    runtime.commit("b").unwrap();
    assert_eq!(runtime.value_of("a").unwrap(), Value::from(7.0));
    assert!(runtime.editable_view("a").unwrap().value_changed);
}

/// An alias with its own literal keeps its own value.
#[test]
fn extension_override_detaches_one_variable() {
    let mut runtime = DocumentBuilder::new()
        .input("a", InputSpec::number().prefill("1"))
        .extend("b", "a", ExtendOptions::new().literal("value", 9.0))
        .build()
        .unwrap();

    runtime.set_immediate_text("a", "2").unwrap();
    runtime.commit("a").unwrap();
    assert_eq!(runtime.value_of("a").unwrap(), Value::from(2.0));
    assert_eq!(runtime.value_of("b").unwrap(), Value::from(9.0));
    assert_eq!(
        runtime.component("b").unwrap().extends(),
        Some(runtime.component_id("a").unwrap())
    );
}

/// Typing only flags the live tier of the typed component; a commit at the
/// end of a bound chain flags every component along the chain.
#[test]
fn changed_flags_follow_the_chain() {
    let build = || {
        DocumentBuilder::new()
            .input("a", InputSpec::number().prefill("1"))
            .input("b", InputSpec::number().bind_to(VarRef::value("a")))
            .input("c", InputSpec::number().bind_to(VarRef::value("b")))
            .build()
            .unwrap()
    };

    let mut runtime = build();
    runtime.set_immediate_text("a", "2").unwrap();
    let a = runtime.editable_view("a").unwrap();
    assert!(a.immediate_value_changed);
    assert!(!a.value_changed);
    for name in ["b", "c"] {
        let view = runtime.editable_view(name).unwrap();
        assert!(!view.immediate_value_changed);
        assert!(!view.value_changed);
    }

    runtime.commit("a").unwrap();
    assert!(runtime.editable_view("a").unwrap().value_changed);
    assert!(!runtime.editable_view("b").unwrap().value_changed);
    assert_eq!(runtime.value_of("c").unwrap(), Value::from(2.0));

    let mut runtime = build();
    runtime.set_immediate_text("c", "7").unwrap();
    runtime.commit("c").unwrap();
    for name in ["a", "b", "c"] {
        let view = runtime.editable_view(name).unwrap();
        assert!(view.value_changed, "{} should be flagged", name);
        assert_eq!(view.settled, Value::from(7.0));
    }
}

/// Committing the value already settled changes nothing.
#[test]
fn recommitting_is_idempotent() {
    let mut runtime = DocumentBuilder::new()
        .input("a", InputSpec::number().prefill("1"))
        .input("b", InputSpec::number().bind_to(VarRef::value("a")))
        .build()
        .unwrap();

    runtime.set_immediate_text("b", "4").unwrap();
    runtime.commit("b").unwrap();
    let before = runtime.editable_view("b").unwrap();
    runtime.editable_view("a").unwrap();
    runtime.reset_stats();

    runtime.commit("b").unwrap();
    assert_eq!(runtime.editable_view("b").unwrap(), before);
    assert_eq!(runtime.stats().recomputes, 0);
}

/// A view bound through a transform inverts through it.
#[test]
fn expression_transform_inverts_on_commit() {
    let mut runtime = DocumentBuilder::new()
        .input("a", InputSpec::number().prefill("3"))
        .input(
            "twice",
            InputSpec::number()
                .bind_to(VarRef::value("a"))
                .transform(Transform::expression(parse_math("2s").unwrap(), "s")),
        )
        .build()
        .unwrap();

    assert_eq!(runtime.value_of("twice").unwrap(), Value::from(6.0));
    runtime.set_immediate_text("twice", "10").unwrap();
    runtime.commit("twice").unwrap();
    assert_eq!(runtime.value_of("a").unwrap(), Value::from(5.0));
    assert_eq!(runtime.value_of("twice").unwrap(), Value::from(10.0));
}

/// A product inverts only when one factor is held.
#[test]
fn held_factor_makes_a_product_invertible() {
    let build = |hold: bool| {
        let mut area = DerivedSpec::expression(ComponentKind::Number, "w h")
            .input("w", VarRef::value("w"))
            .input("h", VarRef::value("h"));
        if hold {
            area = area.hold("h");
        }
        DocumentBuilder::new()
            .input("w", InputSpec::number().prefill("3"))
            .input("h", InputSpec::number().prefill("4"))
            .derived("area", area)
            .input("view", InputSpec::number().bind_to(VarRef::value("area")))
            .build()
            .unwrap()
    };

    let mut runtime = build(false);
    runtime.set_immediate_text("view", "20").unwrap();
    assert!(runtime.commit("view").unwrap().reverted);
    assert_eq!(runtime.value_of("area").unwrap(), Value::from(12.0));

    let mut runtime = build(true);
    runtime.set_immediate_text("view", "20").unwrap();
    assert!(!runtime.commit("view").unwrap().reverted);
    assert_eq!(runtime.value_of("w").unwrap(), Value::from(5.0));
    assert_eq!(runtime.value_of("h").unwrap(), Value::from(4.0));
    assert_eq!(runtime.value_of("area").unwrap(), Value::from(20.0));
}

/// A quotient can never be zero, so asking for zero reverts the view.
#[test]
fn quotient_rejects_an_unreachable_value() {
    let mut runtime = DocumentBuilder::new()
        .input("a", InputSpec::number().prefill("3"))
        .derived(
            "d",
            DerivedSpec::expression(ComponentKind::Number, "12/a").input("a", VarRef::value("a")),
        )
        .input("b", InputSpec::number().bind_to(VarRef::value("d")))
        .build()
        .unwrap();

    runtime.set_immediate_text("b", "0").unwrap();
    let report = runtime.commit("b").unwrap();
    assert!(report.reverted);
    assert_eq!(runtime.value_of("a").unwrap(), Value::from(3.0));
    assert_eq!(runtime.value_of("d").unwrap(), Value::from(4.0));
    assert_eq!(runtime.editable_view("b").unwrap().immediate, Value::from(4.0));

    runtime.set_immediate_text("b", "6").unwrap();
    assert!(!runtime.commit("b").unwrap().reverted);
    assert_eq!(runtime.value_of("a").unwrap(), Value::from(2.0));
}

/// Display options only touch `valueForDisplay`.
#[test]
fn display_options_never_touch_settled() {
    let mut runtime = DocumentBuilder::new()
        .input("a", InputSpec::number().prefill("3.14159"))
        .input("b", InputSpec::number().bind_to(VarRef::value("a")))
        .build()
        .unwrap();

    runtime
        .set_display_options("a", FormatOptions::decimals(2))
        .unwrap();
    let a = runtime.editable_view("a").unwrap();
    assert_eq!(a.settled, Value::from(3.14159));
    assert_eq!(a.value_for_display, Value::from(3.14));
    assert_eq!(a.display_text, "3.14");

    // Inherited through the binding.
    assert_eq!(
        runtime.editable_view("b").unwrap().value_for_display,
        Value::from(3.14)
    );

    runtime
        .set_display_options("b", FormatOptions::digits(1))
        .unwrap();
    assert_eq!(
        runtime.editable_view("b").unwrap().value_for_display,
        Value::from(3.0)
    );
    assert_eq!(runtime.value_of("b").unwrap(), Value::from(3.14159));
    assert_eq!(
        runtime.editable_view("a").unwrap().value_for_display,
        Value::from(3.14)
    );
}

/// A predicate trigger fires once per false-to-true transition.
#[test]
fn predicate_trigger_fires_on_rising_edges() {
    let mut runtime = DocumentBuilder::new()
        .input("flag", InputSpec::boolean())
        .input("n", InputSpec::number().prefill("0"))
        .trigger(
            "bump",
            TriggerSpec::update_value(
                VarRef::value("n"),
                NewValue::expression(parse_math("n+1").unwrap()).input("n", VarRef::value("n")),
            )
            .when(VarRef::value("flag")),
        )
        .build()
        .unwrap();

    let report = runtime.click("flag").unwrap();
    assert_eq!(report.firing.fired, vec!["bump"]);
    assert_eq!(runtime.value_of("n").unwrap(), Value::from(1.0));

    // Re-affirming true does not fire.
    let report = runtime
        .set_essential(&VarRef::value("flag"), Value::Bool(true), Tier::Settled)
        .unwrap();
    assert!(report.firing.fired.is_empty());

    runtime.click("flag").unwrap();
    runtime.click("flag").unwrap();
    assert_eq!(runtime.value_of("n").unwrap(), Value::from(2.0));
    assert_eq!(runtime.trigger("bump").unwrap().fire_count(), 2);
}

/// A chained trigger runs after the whole step list of its source.
#[test]
fn chain_after_runs_after_all_steps() {
    let mut runtime = DocumentBuilder::new()
        .input("log", InputSpec::text())
        .trigger(
            "second",
            TriggerSpec::update_value(VarRef::value("log"), append("log", "3")).after(["first"]),
        )
        .trigger(
            "first",
            TriggerSpec::update_value(VarRef::value("log"), append("log", "1"))
                .update(VarRef::value("log"), append("log", "2")),
        )
        .build()
        .unwrap();

    let report = runtime.fire("first").unwrap();
    assert_eq!(report.firing.fired, vec!["first", "second"]);
    assert_eq!(runtime.value_of("log").unwrap(), Value::text("123"));

    runtime.fire("first").unwrap();
    assert_eq!(runtime.value_of("log").unwrap(), Value::text("123123"));
}

/// A failing external action is skipped and the chain goes on.
#[test]
fn failed_external_action_continues_the_chain() {
    let recorder = RecordingExecutor::new();
    recorder.fail_on("explode");

    let mut runtime = DocumentBuilder::new()
        .executor(recorder.clone())
        .input("n", InputSpec::number().prefill("0"))
        .trigger(
            "t",
            TriggerSpec::call_action(ActionCall::new("graph", "explode"))
                .update(VarRef::value("n"), NewValue::literal(5.0))
                .call(ActionCall::new("graph", "reset").arg(1.0)),
        )
        .build()
        .unwrap();

    let report = runtime.click("t").unwrap();
    assert_eq!(report.firing.failed_actions, vec!["graph.explode"]);
    assert_eq!(report.firing.external_calls.len(), 1);
    assert_eq!(recorder.calls(), vec![ActionCall::new("graph", "reset").arg(1.0)]);
    assert_eq!(runtime.value_of("n").unwrap(), Value::from(5.0));
}

/// A trigger reached again while it is firing is skipped.
#[test]
fn reentrant_firing_is_skipped() {
    let mut runtime = DocumentBuilder::new()
        .trigger("ping", TriggerSpec::button(["pong"]))
        .trigger("pong", TriggerSpec::button(["ping"]))
        .build()
        .unwrap();

    let report = runtime.fire("ping").unwrap();
    assert_eq!(report.firing.fired, vec!["ping", "pong"]);
    assert_eq!(report.firing.skipped, vec!["ping"]);
}

/// A group runs its members, and only the group decides when.
#[test]
fn trigger_set_supersedes_member_firing() {
    let mut runtime = DocumentBuilder::new()
        .input("flag", InputSpec::boolean())
        .input("n", InputSpec::number().prefill("0"))
        .trigger(
            "set_one",
            TriggerSpec::update_value(VarRef::value("n"), NewValue::literal(1.0))
                .when(VarRef::value("flag")),
        )
        .trigger(
            "add_ten",
            TriggerSpec::update_value(
                VarRef::value("n"),
                NewValue::expression(parse_math("n+10").unwrap()).input("n", VarRef::value("n")),
            ),
        )
        .trigger("group", TriggerSpec::trigger_set(["set_one", "add_ten"]))
        .build()
        .unwrap();

    runtime.click("flag").unwrap();
    assert_eq!(runtime.value_of("n").unwrap(), Value::from(0.0));

    let report = runtime.fire("group").unwrap();
    assert_eq!(report.firing.fired, vec!["group", "set_one", "add_ten"]);
    assert_eq!(runtime.value_of("n").unwrap(), Value::from(11.0));
}

/// Dragging moves each coordinate on its own.
#[test]
fn drag_follows_inversion_per_coordinate() {
    let mut runtime = DocumentBuilder::new()
        .input("s", InputSpec::number().prefill("2"))
        .input("t", InputSpec::number().prefill("1"))
        .point(
            "p",
            PointSpec::new(
                Content::literal(1.0),
                Content::expression("2s").input("s", VarRef::value("s")),
            ),
        )
        .point(
            "q",
            PointSpec::new(
                Content::literal(0.0),
                Content::expression("s t")
                    .input("s", VarRef::value("s"))
                    .input("t", VarRef::value("t")),
            ),
        )
        .point("fixed", PointSpec::at(0.0, 0.0).fixed())
        .build()
        .unwrap();

    let report = runtime
        .dispatch(UiEvent::Drag {
            component: "p".into(),
            dx: 1.0,
            dy: 2.0,
        })
        .unwrap();
    assert!(report.rejected.is_empty());
    let p = runtime.point_coords("p").unwrap();
    assert_eq!((p.x, p.y), (Value::from(2.0), Value::from(6.0)));
    assert_eq!(runtime.value_of("s").unwrap(), Value::from(3.0));

    let report = runtime.drag("q", 1.0, 1.0).unwrap();
    assert_eq!(report.rejected, vec!["q.y"]);
    let q = runtime.point_coords("q").unwrap();
    assert_eq!((q.x, q.y), (Value::from(1.0), Value::from(3.0)));

    let report = runtime.drag("fixed", 1.0, 1.0).unwrap();
    assert_eq!(report.rejected.len(), 2);
    let f = runtime.point_coords("fixed").unwrap();
    assert_eq!((f.x, f.y), (Value::from(0.0), Value::from(0.0)));
}

/// UI events arrive as JSON from the rendering layer.
#[test]
fn dispatch_json_events() {
    let mut runtime = DocumentBuilder::new()
        .input("a", InputSpec::math().prefill("x"))
        .build()
        .unwrap();

    let events = r#"[
        {"type": "setImmediate", "component": "a", "text": "2x"},
        {"type": "commit", "component": "a"}
    ]"#;
    let events: Vec<UiEvent> = serde_json::from_str(events).unwrap();
    for event in events {
        runtime.dispatch(event).unwrap();
    }
    assert_eq!(runtime.value_of("a").unwrap(), math("2x"));
}

/// Unknown names and wrong kinds are API errors.
#[test]
fn unknown_names_are_errors() {
    let mut runtime = DocumentBuilder::new().build().unwrap();
    assert_eq!(
        runtime.commit("ghost").unwrap_err(),
        EngineError::UnknownComponent("ghost".into())
    );
    assert_eq!(
        runtime.fire("document").unwrap_err(),
        EngineError::NotTrigger("document".into())
    );
}
