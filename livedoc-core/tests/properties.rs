//! Property tests for propagation and firing.

use livedoc_core::value::parse_math;
use livedoc_core::{
    ComponentKind, DerivedSpec, DocumentBuilder, FormatOptions, InputSpec, NewValue, Runtime,
    Tier, TriggerSpec, Value, VarRef,
};
use proptest::prelude::*;

/// `a -> b = a+1 -> c = 2b -> d = c+a`: a diamond over one source.
fn diamond() -> Runtime {
    DocumentBuilder::new()
        .input("a", InputSpec::number().prefill("0"))
        .derived(
            "b",
            DerivedSpec::expression(ComponentKind::Number, "a+1").input("a", VarRef::value("a")),
        )
        .derived(
            "c",
            DerivedSpec::expression(ComponentKind::Number, "2b").input("b", VarRef::value("b")),
        )
        .derived(
            "d",
            DerivedSpec::expression(ComponentKind::Number, "c+a")
                .input("c", VarRef::value("c"))
                .input("a", VarRef::value("a")),
        )
        .build()
        .unwrap()
}

fn number(runtime: &mut Runtime, component: &str) -> f64 {
    runtime.value_of(component).unwrap().as_number().unwrap()
}

fn commit_number(runtime: &mut Runtime, component: &str, n: i32) {
    runtime.set_immediate_text(component, &n.to_string()).unwrap();
    runtime.commit(component).unwrap();
}

proptest! {
    /// Every read after any sequence of commits sees one consistent state.
    #[test]
    fn reads_never_mix_old_and_new_inputs(writes in prop::collection::vec(-1000i32..1000, 1..20)) {
        let mut runtime = diamond();
        for n in writes {
            commit_number(&mut runtime, "a", n);
            let a = f64::from(n);
            prop_assert_eq!(number(&mut runtime, "d"), 2.0 * (a + 1.0) + a);
            prop_assert_eq!(number(&mut runtime, "b"), a + 1.0);
        }
    }

    /// Keystrokes only move the live tier; one commit then publishes the last.
    #[test]
    fn keystrokes_then_one_commit(
        start in -1000i32..1000,
        typed in prop::collection::vec(-1000i32..1000, 1..12),
    ) {
        let mut runtime = diamond();
        commit_number(&mut runtime, "a", start);
        let settled_d = number(&mut runtime, "d");

        for n in &typed {
            runtime.set_immediate_text("a", &n.to_string()).unwrap();
            let view = runtime.editable_view("a").unwrap();
            prop_assert_eq!(view.immediate, Value::from(f64::from(*n)));
            prop_assert_eq!(view.settled, Value::from(f64::from(start)));
            prop_assert_eq!(number(&mut runtime, "d"), settled_d);
        }

        runtime.commit("a").unwrap();
        let last = f64::from(typed[typed.len() - 1]);
        let view = runtime.editable_view("a").unwrap();
        prop_assert_eq!(view.settled, Value::from(last));
        prop_assert_eq!(view.immediate, Value::from(last));
        prop_assert_eq!(number(&mut runtime, "b"), last + 1.0);
        prop_assert_eq!(number(&mut runtime, "c"), 2.0 * (last + 1.0));
        prop_assert_eq!(number(&mut runtime, "d"), 2.0 * (last + 1.0) + last);
    }

    /// Committing the same value again changes nothing and recomputes nothing.
    #[test]
    fn recommit_is_a_no_op(n in -1000i32..1000) {
        let mut runtime = diamond();
        commit_number(&mut runtime, "a", n);
        let before = runtime.editable_view("a").unwrap();
        number(&mut runtime, "d");
        runtime.reset_stats();

        runtime.commit("a").unwrap();
        number(&mut runtime, "d");
        prop_assert_eq!(runtime.stats().recomputes, 0);
        prop_assert_eq!(runtime.editable_view("a").unwrap(), before);
    }

    /// Display options only ever change how a value is shown.
    #[test]
    fn display_options_leave_values_alone(n in -1000i32..1000, digits in 1u32..8) {
        let mut runtime = diamond();
        commit_number(&mut runtime, "a", n);
        let before = runtime.value_of("d").unwrap();

        runtime.set_display_options("d", FormatOptions::digits(digits)).unwrap();
        runtime.set_display_options("a", FormatOptions::digits(digits)).unwrap();
        prop_assert_eq!(runtime.value_of("d").unwrap(), before);
        prop_assert_eq!(number(&mut runtime, "a"), f64::from(n));
    }

    /// A predicate trigger fires once per false-to-true transition.
    #[test]
    fn predicate_fires_once_per_rising_edge(flags in prop::collection::vec(any::<bool>(), 0..24)) {
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

        let mut previous = false;
        let mut edges = 0u64;
        for flag in flags {
            runtime
                .set_essential(&VarRef::value("flag"), Value::Bool(flag), Tier::Settled)
                .unwrap();
            if flag && !previous {
                edges += 1;
            }
            previous = flag;
        }

        prop_assert_eq!(runtime.trigger("bump").unwrap().fire_count(), edges);
        prop_assert_eq!(number(&mut runtime, "n"), edges as f64);
    }
}
