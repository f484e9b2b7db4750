use diagscope::expr::{evaluate, EvalContext, Value};

// Helper: evaluate over a 1 Hz time base with x1 bound to `x`.
fn eval_x1(src: &str, x: &[f64]) -> Result<Value, diagscope::ExpressionError> {
    let times: Vec<f64> = (0..x.len()).map(|i| i as f64).collect();
    let ctx = EvalContext::new(&times).bind("x1", x);
    evaluate(src, &ctx)
}

fn array(v: Value) -> Vec<f64> {
    match v {
        Value::Array(a) => a,
        Value::Scalar(s) => panic!("expected array result, got scalar {s}"),
    }
}

fn scalar(v: Value) -> f64 {
    match v {
        Value::Scalar(s) => s,
        Value::Array(a) => panic!("expected scalar result, got array of {}", a.len()),
    }
}

#[test]
fn arithmetic_precedence() {
    let ctx = EvalContext::new(&[]);
    assert_eq!(scalar(evaluate("1 + 2 * 3", &ctx).unwrap()), 7.0);
    assert_eq!(scalar(evaluate("(1 + 2) * 3", &ctx).unwrap()), 9.0);
    assert_eq!(scalar(evaluate("-2 * 3", &ctx).unwrap()), -6.0);
    assert_eq!(scalar(evaluate("7 % 4", &ctx).unwrap()), 3.0);
}

#[test]
fn scalar_broadcasts_against_arrays() {
    let out = array(eval_x1("x1 * 2 + 1", &[1.0, 2.0, 3.0]).unwrap());
    assert_eq!(out, vec![3.0, 5.0, 7.0]);
}

#[test]
fn comparisons_produce_zero_one_masks() {
    let out = array(eval_x1("x1 >= 2", &[1.0, 2.0, 3.0]).unwrap());
    assert_eq!(out, vec![0.0, 1.0, 1.0]);
}

#[test]
fn boolean_operators_combine_masks() {
    let x = [0.0, 1.0, 2.0, 3.0, 4.0];
    let out = array(eval_x1("x1 >= 1 & x1 <= 3", &x).unwrap());
    assert_eq!(out, vec![0.0, 1.0, 1.0, 1.0, 0.0]);
    let out = array(eval_x1("x1 < 1 | x1 > 3", &x).unwrap());
    assert_eq!(out, vec![1.0, 0.0, 0.0, 0.0, 1.0]);
    // doubled forms are the same operators
    let out = array(eval_x1("x1 >= 1 && x1 <= 3", &x).unwrap());
    assert_eq!(out, vec![0.0, 1.0, 1.0, 1.0, 0.0]);
    let out = array(eval_x1("!(x1 == 2)", &x).unwrap());
    assert_eq!(out, vec![1.0, 1.0, 0.0, 1.0, 1.0]);
}

#[test]
fn constants_resolve() {
    let ctx = EvalContext::new(&[]);
    assert!((scalar(evaluate("pi", &ctx).unwrap()) - std::f64::consts::PI).abs() < 1e-15);
    assert!((scalar(evaluate("e", &ctx).unwrap()) - std::f64::consts::E).abs() < 1e-15);
}

#[test]
fn elementwise_function_library() {
    let out = array(eval_x1("abs(x1)", &[-1.0, 2.0]).unwrap());
    assert_eq!(out, vec![1.0, 2.0]);
    let out = array(eval_x1("min(x1, 2)", &[1.0, 5.0]).unwrap());
    assert_eq!(out, vec![1.0, 2.0]);
    let out = array(eval_x1("max(x1, 2)", &[1.0, 5.0]).unwrap());
    assert_eq!(out, vec![2.0, 5.0]);
    let out = array(eval_x1("pow(x1, 2)", &[2.0, 3.0]).unwrap());
    assert_eq!(out, vec![4.0, 9.0]);
    let out = array(eval_x1("clip(x1, 1, 3)", &[0.0, 2.0, 9.0]).unwrap());
    assert_eq!(out, vec![1.0, 2.0, 3.0]);
    let ctx = EvalContext::new(&[]);
    assert_eq!(scalar(evaluate("sqrt(16)", &ctx).unwrap()), 4.0);
    assert_eq!(scalar(evaluate("log10(1000)", &ctx).unwrap()), 3.0);
    assert_eq!(scalar(evaluate("floor(2.7) + ceil(2.2)", &ctx).unwrap()), 5.0);
    assert_eq!(scalar(evaluate("round(2.5)", &ctx).unwrap()), 3.0);
    assert!((scalar(evaluate("log(exp(1))", &ctx).unwrap()) - 1.0).abs() < 1e-15);
    assert!(scalar(evaluate("sin(0) + cos(0) + tan(0)", &ctx).unwrap()) == 1.0);
}

#[test]
fn if_else_selects_elementwise() {
    let out = array(eval_x1("if_else(x1 > 1, x1, 0 - x1)", &[1.0, 2.0, 3.0]).unwrap());
    assert_eq!(out, vec![-1.0, 2.0, 3.0]);
}

#[test]
fn delta_and_cumsum() {
    let out = array(eval_x1("delta(x1)", &[1.0, 4.0, 6.0]).unwrap());
    assert_eq!(out, vec![0.0, 3.0, 2.0], "first delta element is zero");
    let out = array(eval_x1("cumsum(x1)", &[1.0, 2.0, 3.0]).unwrap());
    assert_eq!(out, vec![1.0, 3.0, 6.0]);
}

#[test]
fn whole_array_reductions() {
    let x = [1.0, 2.0, 3.0, 4.0];
    assert_eq!(scalar(eval_x1("np_min(x1)", &x).unwrap()), 1.0);
    assert_eq!(scalar(eval_x1("np_max(x1)", &x).unwrap()), 4.0);
    assert_eq!(scalar(eval_x1("np_mean(x1)", &x).unwrap()), 2.5);
    // population standard deviation of 1..4
    let std = scalar(eval_x1("np_std(x1)", &x).unwrap());
    assert!((std - 1.118033988749895).abs() < 1e-12, "got {std}");
}

#[test]
fn rolling_window_converts_seconds_to_samples() {
    // 1 Hz sampling: a 3 s window is 3 samples, centered.
    let x: Vec<f64> = (0..10).map(|i| i as f64).collect();
    let out = array(eval_x1("rolling_avg(x1, 3)", &x).unwrap());
    assert_eq!(out[5], 5.0, "interior centered mean of a ramp is the midpoint");
    assert_eq!(out[0], 0.5, "left edge shrinks to the available partial window");
    assert_eq!(out[9], 8.5, "right edge shrinks to the available partial window");
}

#[test]
fn rolling_min_max_use_clipped_centered_windows() {
    let x = [5.0, 1.0, 4.0, 2.0, 8.0];
    // times 0..4 at 1 Hz, 3 s window = 3 samples
    let out = array(eval_x1("rolling_min(x1, 3)", &x).unwrap());
    assert_eq!(out, vec![1.0, 1.0, 1.0, 2.0, 2.0]);
    let out = array(eval_x1("rolling_max(x1, 3)", &x).unwrap());
    assert_eq!(out, vec![5.0, 5.0, 4.0, 8.0, 8.0]);
}

#[test]
fn rolling_window_falls_back_to_raw_count_on_single_sample() {
    // one sample: seconds cannot convert, the value is a raw count
    let out = array(eval_x1("rolling_avg(x1, 5)", &[7.0]).unwrap());
    assert_eq!(out, vec![7.0]);
}

#[test]
fn rolling_window_clamps_to_one_sample() {
    let x = [1.0, 5.0, 9.0];
    // 0 s window clamps to a single sample: identity
    let out = array(eval_x1("rolling_avg(x1, 0)", &x).unwrap());
    assert_eq!(out, vec![1.0, 5.0, 9.0]);
}

#[test]
fn unknown_names_are_rejected() {
    let err = eval_x1("bogus + 1", &[1.0]).unwrap_err();
    assert!(err.0.contains("unknown name"), "got: {}", err.0);
}

#[test]
fn unknown_functions_are_rejected() {
    // the namespace is closed: nothing outside the library resolves
    let err = eval_x1("open(x1)", &[1.0]).unwrap_err();
    assert!(err.0.contains("unknown function"), "got: {}", err.0);
    let err = eval_x1("eval(x1)", &[1.0]).unwrap_err();
    assert!(err.0.contains("unknown function"), "got: {}", err.0);
}

#[test]
fn arity_mismatch_is_rejected() {
    let err = eval_x1("rolling_avg(x1)", &[1.0]).unwrap_err();
    assert!(err.0.contains("argument"), "got: {}", err.0);
}

#[test]
fn division_by_zero_fails() {
    let err = eval_x1("x1 / 0", &[1.0]).unwrap_err();
    assert!(err.0.contains("division by zero"), "got: {}", err.0);
    let err = eval_x1("1 / (x1 - 1)", &[0.0, 1.0]).unwrap_err();
    assert!(err.0.contains("division by zero"), "got: {}", err.0);
}

#[test]
fn trailing_garbage_is_rejected() {
    let ctx = EvalContext::new(&[]);
    assert!(evaluate("1 + 2 )", &ctx).is_err());
    assert!(evaluate("", &ctx).is_err());
    assert!(evaluate("1 @ 2", &ctx).is_err());
}

#[test]
fn array_length_mismatch_is_rejected() {
    let times = [0.0, 1.0, 2.0];
    let a = [1.0, 2.0, 3.0];
    let b = [1.0, 2.0];
    let ctx = EvalContext::new(&times).bind("x1", &a).bind("x2", &b);
    let err = evaluate("x1 + x2", &ctx).unwrap_err();
    assert!(err.0.contains("length mismatch"), "got: {}", err.0);
}
