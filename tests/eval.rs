//! End-to-end scenarios driving the engine through source text, the
//! way the REPL does.

use ratcalc::engine::Engine;
use ratcalc::value::Value;

fn eval(eng: &mut Engine, src: &str) -> Value {
    eng.eval_str(src)
        .unwrap_or_else(|e| panic!("eval failed with code {}: {:?}", e.code, e.msg))
        .expect("expected a value")
}

fn n(i: i64) -> Value {
    Value::from_i64(i)
}

#[test]
fn cos_of_one_displays_nineteen_digits() {
    let mut eng = Engine::new();
    eng.echo = true;
    eng.capture_output();
    eval(&mut eng, "config(\"display\", 19);");
    eng.take_captured();
    eng.eval_str("cos(1, 1e-20);").unwrap();
    let out = eng.take_captured();
    assert_eq!(out, vec![".5403023058681397174".to_string()]);
}

#[test]
fn factoring_a_mersenne_number() {
    let mut eng = Engine::new();
    assert_eq!(
        eval(&mut eng, "factor(2 ** 67 - 1);"),
        Value::from_q("193707721".parse().unwrap())
    );
    // consistency: the cofactor divides exactly
    assert_eq!(
        eval(&mut eng, "(2 ** 67 - 1) % 193707721 == 0;"),
        n(1)
    );
    assert_eq!(
        eval(&mut eng, "(2 ** 67 - 1) / 193707721;"),
        Value::from_q("761838257287".parse().unwrap())
    );
}

#[test]
fn matrix_inverse_times_original_is_identity() {
    let mut eng = Engine::new();
    let src = "
        mat m[3, 3] = {{1, 2, 3}, {4, 5, 6}, {7, 8, 10}};
        p = inverse(m) * m;
        ok = 1;
        for (i = 0; i < 3; i++)
            for (j = 0; j < 3; j++)
                ok = ok && p[i, j] == (i == j);
        ok;
    ";
    assert_eq!(eval(&mut eng, src), n(1));
    assert_eq!(eval(&mut eng, "det(m);"), n(-3));
}

#[test]
fn object_operator_override_dispatch() {
    let mut eng = Engine::new();
    let src = "
        obj point { x, y }
        define point_add(a, b) {
            obj point r;
            r.x = a.x + b.x;
            r.y = a.y + b.y;
            return r;
        }
        obj point a, b;
        a.x = 3; a.y = 4; b.x = 30; b.y = 40;
        c = a + b;
        c.x + c.y;
    ";
    assert_eq!(eval(&mut eng, src), n(77));
    // an operator with no override is a Type-kind failure
    assert_eq!(eval(&mut eng, "errno(a * b);"), n(203));
    assert_eq!(eval(&mut eng, "iserr(a * b);"), n(1));
}

#[test]
fn division_by_zero_error_value_vs_abort() {
    let mut eng = Engine::new();
    // default: the error is a value on the stack
    assert_eq!(eval(&mut eng, "iserr(1/0);"), n(1));
    assert_eq!(eval(&mut eng, "errno(1/0);"), n(101));
    // stoponerror makes the next error abort the statement
    eval(&mut eng, "config(\"stoponerror\", 1);");
    let r = eng.eval_str("1/0;");
    assert_eq!(r.unwrap_err().code, 101);
    // the counter has decremented; errors are values again
    assert_eq!(eval(&mut eng, "iserr(1/0);"), n(1));
}

#[test]
fn carmichael_number_is_flagged_composite() {
    let mut eng = Engine::new();
    assert_eq!(eval(&mut eng, "ptest(561, 5);"), n(0));
    assert_eq!(eval(&mut eng, "ptest(2 ** 61 - 1, 10);"), n(1));
}

#[test]
fn quomod_identity_in_language() {
    let mut eng = Engine::new();
    let src = "
        ok = 1;
        mat pairs[4, 2] = {{7, 3}, {-7, 3}, {22, -5}, {-22, -5}};
        for (i = 0; i < 4; i++) {
            a = pairs[i, 0];
            b = pairs[i, 1];
            qr = quomod(a, b);
            ok = ok && qr[0] * b + qr[1] == a;
            ok = ok && (a // b) * b + (a % b) == a;
        }
        ok;
    ";
    assert_eq!(eval(&mut eng, src), n(1));
}

#[test]
fn parse_print_roundtrip_for_atoms() {
    let mut eng = Engine::new();
    eval(&mut eng, "config(\"mode\", \"frac\");");
    for literal in ["0", "-5", "22/7", "-3/8", "123456789123456789"] {
        let v = eval(&mut eng, &format!("{};", literal));
        let shown = eng.render(&v);
        let back = eval(&mut eng, &format!("{};", shown));
        assert_eq!(back, v, "round trip of {}", literal);
    }
}

#[test]
fn reduction_is_idempotent() {
    let mut eng = Engine::new();
    assert_eq!(eval(&mut eng, "6/4 == 3/2;"), n(1));
    assert_eq!(eval(&mut eng, "num(6/4);"), n(3));
    assert_eq!(eval(&mut eng, "den(6/4);"), n(2));
}

#[test]
fn epsilon_contract_for_sin() {
    let mut eng = Engine::new();
    // |sin(1, 1e-12) - sin(1)| < 0.75e-12; compare against a finer run
    let src = "abs(sin(1, 1e-12) - sin(1, 1e-18)) < 1e-12;";
    assert_eq!(eval(&mut eng, src), n(1));
}

#[test]
fn script_with_functions_and_loops() {
    let mut eng = Engine::new();
    let src = "
        define sum_of_squares(n) {
            local s = 0;
            local k;
            for (k = 1; k <= n; k++)
                s += k ** 2;
            return s;
        }
        sum_of_squares(10);
    ";
    assert_eq!(eval(&mut eng, src), n(385));
}

#[test]
fn try_catch_at_language_level() {
    let mut eng = Engine::new();
    let src = "
        caught = 0;
        try {
            raise(error(10042, \"boom\"));
            caught = -1;
        } catch (e) {
            caught = errno(e);
        }
        caught;
    ";
    assert_eq!(eval(&mut eng, src), n(10042));
}

#[test]
fn assoc_and_list_end_to_end() {
    let mut eng = Engine::new();
    let src = "
        prices = assoc();
        prices[\"apple\"] = 3/2;
        prices[\"pear\"] = 2;
        basket = list(\"apple\", \"apple\", \"pear\");
        total = 0;
        for (i = 0; i < size(basket); i++)
            total += prices[basket[i]];
        total;
    ";
    assert_eq!(eval(&mut eng, src), Value::from_ratio(5, 1));
}

#[test]
fn pure_function_leaves_environment_alone() {
    let mut eng = Engine::new();
    eval(&mut eng, "define pure(a) { local t = a * 2; return t + 1; } x = 5; pure(x);");
    // x untouched, t not leaked
    assert_eq!(eng.global("x"), Some(n(5)));
    assert_eq!(eng.global("t"), None);
}

#[test]
fn tilde_marks_inexact_results() {
    let mut eng = Engine::new();
    eng.echo = true;
    eng.capture_output();
    eng.eval_str("config(\"tilde\", 1); config(\"display\", 4);")
        .unwrap();
    eng.take_captured();
    eng.eval_str("1/3;").unwrap();
    assert_eq!(eng.take_captured(), vec!["~.3333".to_string()]);
    eng.eval_str("1/4;").unwrap();
    assert_eq!(eng.take_captured(), vec![".25".to_string()]);
}
