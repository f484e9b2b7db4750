use diagscope::data::math::{apply, validate_expression, MathChannelDef};
use diagscope::data::slots::SlotBindings;
use diagscope::{Channel, EngineError, Import};

// Helper: an import with the given channels built from [t, v] samples.
fn import_with(id: u64, name: &str, channels: &[(&str, Vec<[f64; 2]>)]) -> Import {
    let mut im = Import::new(id, name);
    for (ch_name, samples) in channels {
        im.insert_channel(*ch_name, Channel::from_samples(samples.clone()));
    }
    im
}

fn ramp(n: usize) -> Vec<[f64; 2]> {
    (0..n).map(|i| [i as f64, i as f64]).collect()
}

fn def(name: &str, expression: &str, x1: &str) -> MathChannelDef {
    MathChannelDef {
        name: name.into(),
        expression: expression.into(),
        slots: SlotBindings::single(x1),
        unit: String::new(),
    }
}

#[test]
fn derives_channel_into_every_import_with_the_input() {
    let mut imports = vec![
        import_with(0, "run1", &[("speed", ramp(5))]),
        import_with(1, "run2", &[("speed", ramp(3))]),
    ];
    let mut d = def("speed_kmh", "x1 * 3.6", "speed");
    d.unit = "km/h".into();
    apply(&[d], &mut imports);

    for im in &imports {
        let ch = im.channel("speed_kmh").expect("derived channel missing");
        assert!(ch.derived, "math channels carry the derived flag");
        assert_eq!(ch.unit, "km/h");
        assert_eq!(ch.len(), im.channel("speed").unwrap().len());
        assert_eq!(ch.values[1], 3.6);
        assert!(
            im.channel_order.last().map(|s| s.as_str()) == Some("speed_kmh"),
            "derived channels append to the channel order"
        );
    }
}

#[test]
fn missing_mandatory_input_skips_that_import_only() {
    let mut imports = vec![
        import_with(0, "run1", &[("rpm", ramp(4))]),
        import_with(1, "run2", &[("speed", ramp(4))]),
    ];
    apply(&[def("rpm_x2", "x1 * 2", "rpm")], &mut imports);

    assert!(imports[0].has_channel("rpm_x2"));
    assert!(
        !imports[1].has_channel("rpm_x2"),
        "an import without the mandatory input is skipped, not failed"
    );
}

#[test]
fn scalar_results_broadcast_to_the_time_base() {
    let mut imports = vec![import_with(0, "run1", &[("a", ramp(4))])];
    apply(&[def("mean_a", "np_mean(x1)", "a")], &mut imports);
    let ch = imports[0].channel("mean_a").unwrap();
    assert_eq!(ch.values, vec![1.5; 4]);
    assert_eq!(ch.times, imports[0].channel("a").unwrap().times);
}

#[test]
fn unbound_slots_read_as_zero() {
    let mut imports = vec![import_with(0, "run1", &[("a", ramp(3))])];
    apply(&[def("sum", "x1 + x2", "a")], &mut imports);
    let ch = imports[0].channel("sum").unwrap();
    assert_eq!(ch.values, vec![0.0, 1.0, 2.0]);
}

#[test]
fn optional_slots_align_onto_the_mandatory_time_base() {
    let a = vec![[0.0, 0.0], [1.0, 10.0], [2.0, 20.0]];
    let b = vec![[0.4, 1.0], [1.6, 2.0]];
    let mut imports = vec![import_with(0, "run1", &[("a", a), ("b", b)])];
    let mut d = def("ab", "x1 + x2", "a");
    d.slots.x2 = Some("b".into());
    apply(&[d], &mut imports);
    let ch = imports[0].channel("ab").unwrap();
    // b aligned onto a's grid: [1, 2, 2] (midway tie at t=1 goes to the later sample)
    assert_eq!(ch.values, vec![1.0, 12.0, 22.0]);
}

#[test]
fn evaluation_failure_skips_only_the_failing_import() {
    let ones = vec![[0.0, 1.0], [1.0, 1.0]];
    let with_zero = vec![[0.0, 1.0], [1.0, 0.0]];
    let mut imports = vec![
        import_with(0, "good", &[("a", ramp(2)), ("b", ones)]),
        import_with(1, "bad", &[("a", ramp(2)), ("b", with_zero)]),
    ];
    let mut d = def("ratio", "x1 / x2", "a");
    d.slots.x2 = Some("b".into());
    apply(&[d], &mut imports);

    assert!(imports[0].has_channel("ratio"), "healthy import gets the channel");
    assert!(
        !imports[1].has_channel("ratio"),
        "the import whose data divides by zero is skipped"
    );
}

#[test]
fn existing_output_channels_are_left_alone() {
    let mut imports = vec![import_with(0, "run1", &[("a", ramp(3)), ("out", ramp(3))])];
    apply(&[def("out", "x1 * 100", "a")], &mut imports);
    let ch = imports[0].channel("out").unwrap();
    assert_eq!(ch.values, vec![0.0, 1.0, 2.0], "existing channel is not overwritten");
    assert!(!ch.derived);
}

#[test]
fn bound_slot_referencing_absent_channel_skips_the_import() {
    let mut imports = vec![
        import_with(0, "has_b", &[("a", ramp(3)), ("b", ramp(3))]),
        import_with(1, "no_b", &[("a", ramp(3))]),
    ];
    let mut d = def("ab", "x1 + x2", "a");
    d.slots.x2 = Some("b".into());
    apply(&[d], &mut imports);
    assert!(imports[0].has_channel("ab"));
    assert!(!imports[1].has_channel("ab"));
}

#[test]
fn validation_blocks_bad_expressions() {
    let d = def("bad", "x1 +* 2", "a");
    assert!(matches!(d.validate(), Err(EngineError::Validation { .. })));

    let d = def("unknown", "boost_pressure + 1", "a");
    let err = d.validate().unwrap_err();
    match err {
        EngineError::Validation { reason } => {
            assert!(reason.contains("unknown name"), "got: {reason}")
        }
        other => panic!("expected Validation, got {other:?}"),
    }
}

#[test]
fn validation_requires_name_and_mandatory_slot() {
    let mut d = def("", "x1", "a");
    assert!(d.validate().is_err(), "empty name is rejected");
    d.name = "ok".into();
    d.slots.x1 = String::new();
    assert!(d.validate().is_err(), "unassigned x1 is rejected");
}

#[test]
fn validation_previews_the_synthetic_ramp() {
    // synthetic inputs are a 1..5 ramp per bound slot
    let preview = validate_expression("x1 * 2", &SlotBindings::single("a")).unwrap();
    assert!(preview.contains("2.0000"), "got: {preview}");
    assert!(preview.contains("10.0000"), "got: {preview}");
}

#[test]
fn validation_and_apply_share_semantics() {
    // an expression that validates also applies, including window functions
    let d = def("smooth", "rolling_avg(x1, 2)", "a");
    assert!(d.validate().is_ok());
    let mut imports = vec![import_with(0, "run1", &[("a", ramp(5))])];
    apply(&[d], &mut imports);
    assert!(imports[0].has_channel("smooth"));
}
