//! End-to-end checks through the public API: read, evaluate, render.

#![expect(clippy::unwrap_used)] // test code OK

use minilisp::ast::{sym, val};
use minilisp::builtinops::Arity;
use minilisp::reader::{ReaderConfig, read_all_with_config, read_one};
use minilisp::{Environment, Error, Evaluator, MAX_ENV_DEPTH, Registry, Value};

/// A top-level session: one environment shared by every form, like the REPL
struct Session {
    evaluator: Evaluator<'static>,
    env: Environment,
}

impl Session {
    fn new() -> Self {
        Session {
            evaluator: Evaluator::standard(),
            env: Environment::root(),
        }
    }

    fn eval(&self, source: &str) -> Result<Value, Error> {
        self.evaluator.eval(&read_one(source)?, &self.env)
    }

    /// Evaluate and render the way the REPL prints a result
    fn show(&self, source: &str) -> String {
        match self.eval(source) {
            Ok(value) => format!("=> {value}"),
            Err(e) => format!("Error: {e}"),
        }
    }
}

#[test]
fn bindings_are_visible_below_and_shadowed_locally() {
    let root = Environment::root();
    root.set("k", val(1));
    let child = Environment::new(&[], vec![], Some(&root)).unwrap();
    let grandchild = Environment::new(&[], vec![], Some(&child)).unwrap();

    assert_eq!(root.get("k").unwrap(), val(1));
    assert_eq!(grandchild.get("k").unwrap(), val(1));

    child.set("k", val(2));
    assert_eq!(child.get("k").unwrap(), val(2));
    assert_eq!(grandchild.get("k").unwrap(), val(2));
    assert_eq!(root.get("k").unwrap(), val(1));
}

#[test]
fn mismatched_frame_arity_is_an_error() {
    let root = Environment::root();
    let params = vec!["a".to_owned(), "b".to_owned()];

    for args in [vec![], vec![val(1)], vec![val(1), val(2), val(3)]] {
        let got = args.len();
        assert_eq!(
            Environment::new(&params, args, Some(&root)).unwrap_err(),
            Error::Arity {
                expected: Arity::Exact(2),
                got,
                expression: None,
            }
        );
    }
}

#[test]
fn frame_chain_stops_at_the_ceiling() {
    let mut env = Environment::root();
    for _ in 1..MAX_ENV_DEPTH {
        env = Environment::new(&[], vec![], Some(&env)).unwrap();
    }
    assert_eq!(env.depth(), MAX_ENV_DEPTH - 1);

    assert!(matches!(
        Environment::new(&[], vec![], Some(&env)),
        Err(Error::StackLimit { .. })
    ));
}

#[test]
fn documented_examples() {
    let session = Session::new();

    let cases = [
        ("(quote (1 2 3))", "=> (1 2 3)"),
        ("(quote (1 unbound 3))", "=> (1 unbound 3)"),
        ("(if 0 1 2)", "=> 1"),
        ("(define (add2 x) (+ x 2))", "=> #<closure>"),
        ("(add2 5)", "=> 7"),
        ("(car (quote (1 2)))", "=> 1"),
        ("(cdr (quote (1)))", "=> nil"),
        ("(= 1 1 1)", "=> #t"),
        ("(= 1 2)", "=> #f"),
        ("(= 1 (quote a))", "=> #f"),
        ("(define x 10)", "=> x"),
        ("(+ x 5)", "=> 15"),
    ];

    for (input, expected) in cases {
        assert_eq!(session.show(input), expected, "input: {input}");
    }
}

#[test]
fn failures_are_errors_not_crashes() {
    let session = Session::new();

    assert!(matches!(
        session.eval("(cdr (quote ()))"),
        Err(Error::Eval(_))
    ));
    assert!(matches!(
        session.eval("(+ 1 (quote a))"),
        Err(Error::Type(_))
    ));
    assert!(matches!(
        session.eval("(1 2)"),
        Err(Error::Call(_))
    ));
    assert!(matches!(
        session.eval("(lambda (x 1) x)"),
        Err(Error::Structural(_))
    ));
    assert_eq!(
        session.show("missing"),
        "Error: Unbound symbol: missing"
    );

    // The session carries on with the same environment
    session.eval("(define y 3)").unwrap();
    assert_eq!(session.eval("y").unwrap(), val(3));
}

#[test]
fn free_symbols_resolve_at_the_call_site() {
    let session = Session::new();
    let program = "
        (define (make-reader) (lambda () secret))
        (define reader (make-reader))
        (define (with-secret secret f) (f))
    ";
    for form in read_all_with_config(program, ReaderConfig::default()).unwrap() {
        session.evaluator.eval(&form, &session.env).unwrap();
    }

    // The outer call that made the closure is gone, nothing was captured
    assert_eq!(
        session.eval("(reader)").unwrap_err(),
        Error::UnboundSymbol("secret".to_owned())
    );

    // Whatever binding is live where the closure is invoked is used
    assert_eq!(session.eval("(with-secret 7 reader)").unwrap(), val(7));
    session.eval("(define secret 1)").unwrap();
    assert_eq!(session.eval("(reader)").unwrap(), val(1));
    assert_eq!(session.eval("(with-secret 8 reader)").unwrap(), val(8));
}

#[test]
fn runaway_recursion_reports_stack_limit() {
    let session = Session::new();
    session
        .eval("(define (down n) (if (= n 0) 0 (down (- n 1))))")
        .unwrap();

    assert_eq!(session.eval("(down 500)").unwrap(), val(0));
    assert!(matches!(
        session.eval("(down 5000)"),
        Err(Error::StackLimit { depth }) if depth == MAX_ENV_DEPTH
    ));
}

#[test]
fn source_text_with_comments_runs_form_by_form() {
    let session = Session::new();
    let source = "
        ; list helpers
        (define (second l)
          (car (cdr l)))
        (define (third l) (car (cdr (cdr l))))
        (second '(10 20 30)) ; => 20
    ";

    let results: Vec<Value> = read_all_with_config(source, ReaderConfig::with_comments())
        .unwrap()
        .iter()
        .map(|form| session.evaluator.eval(form, &session.env).unwrap())
        .collect();

    assert_eq!(results.len(), 3);
    assert_eq!(results[2], val(20));
    assert_eq!(session.eval("(third '(1 2 3))").unwrap(), val(3));
}

#[test]
fn alternate_registry_changes_the_language() {
    fn negate(n: i64) -> i64 {
        -n
    }

    let mut registry = Registry::standard().clone();
    registry.register_builtin_operation::<_, (i64,)>("neg", negate);
    let evaluator = Evaluator::new(&registry);
    let env = Environment::root();

    assert_eq!(
        evaluator.eval(&read_one("(neg (+ 1 2))").unwrap(), &env).unwrap(),
        val(-3)
    );

    // The standard registry is untouched
    assert_eq!(
        Evaluator::standard()
            .eval(&read_one("(neg 1)").unwrap(), &env)
            .unwrap_err(),
        Error::UnboundSymbol("neg".to_owned())
    );
    assert_eq!(read_one("neg").unwrap(), sym("neg"));
}
