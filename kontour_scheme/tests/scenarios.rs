//! End-to-end analysis scenarios, run under the AAM, global-store, and
//! free machines with the TypeSet lattice, plus concrete-execution spot
//! checks of the exact results.

use kontour::lattice::JoinSemiLattice;
use kontour::machine::{Aam, AamGlobalStore, ActorsAam, ConcreteMachine, ConcurrentAam, Free};
use kontour::semantics::DomainValue;
use kontour::{MachineConfig, Output, Semantics, ValueDomain};
use kontour_scheme::{ConcreteSemantics, TypeSetSemantics};
use std::time::Duration;

type TypeSetValue = DomainValue<TypeSetSemantics>;
type ConcreteValue = DomainValue<ConcreteSemantics>;

fn config() -> MachineConfig {
    MachineConfig {
        timeout: Some(Duration::from_secs(60)),
        ..MachineConfig::default()
    }
}

fn parse(sem: &TypeSetSemantics, source: &str) -> kontour_scheme::SchemeExp {
    sem.parse(source).expect("program parses")
}

fn run_aam(source: &str) -> Output<TypeSetValue> {
    let sem = TypeSetSemantics::type_set();
    let program = parse(&sem, source);
    Aam::new(sem, config()).run(program)
}

fn run_global(source: &str) -> Output<TypeSetValue> {
    let sem = TypeSetSemantics::type_set();
    let program = parse(&sem, source);
    AamGlobalStore::new(sem, config()).run(program)
}

fn run_free(source: &str) -> Output<TypeSetValue> {
    let sem = TypeSetSemantics::type_set();
    let program = parse(&sem, source);
    Free::new(sem, config()).run(program)
}

fn run_concrete(source: &str) -> Output<ConcreteValue> {
    let sem = ConcreteSemantics::concrete();
    let program = sem.parse(source).expect("program parses");
    ConcreteMachine::new(sem, config()).run(program)
}

/// Assert that all three abstract machines reach a final value subsuming
/// the expected injection, with a finite state graph.
fn check_all_machines(source: &str, expect: impl Fn(&TypeSetSemantics) -> TypeSetValue) {
    for (name, output) in [
        ("AAM", run_aam(source)),
        ("AAMGlobalStore", run_global(source)),
        ("Free", run_free(source)),
    ] {
        assert!(!output.timed_out, "{name} timed out");
        assert!(output.num_states > 0, "{name} explored no states");
        let expected = expect(&TypeSetSemantics::type_set());
        assert!(
            output.contains_final_value(&expected),
            "{name}: expected a final value subsuming {expected}, got {:?}",
            output.final_values
        );
    }
}

const FACT: &str = "
(define (fact n)
  (if (= n 0) 1 (* n (fact (- n 1)))))
(fact 5)";

const FIB: &str = "
(define (fib n)
  (if (< n 2) n (+ (fib (- n 1)) (fib (- n 2)))))
(fib 4)";

const ACK: &str = "
(define (ack m n)
  (cond ((= m 0) (+ n 1))
        ((= n 0) (ack (- m 1) 1))
        (else (ack (- m 1) (ack m (- n 1))))))
(ack 2 1)";

const COLLATZ: &str = "
(define (collatz n)
  (let loop ((n n) (steps 0))
    (if (= n 1)
        steps
        (loop (if (= (modulo n 2) 0) (quotient n 2) (+ (* 3 n) 1))
              (+ steps 1)))))
(collatz 5)";

const SQ: &str = "
(define (sq x) (* x x))
(sq 3)";

const BLUR: &str = "
(define (id x) x)
(define (blur y) y)
(define (lp a n)
  (if (<= n 1)
      (id a)
      (let ((r ((blur id) #t))
            (s ((blur id) #f)))
        (not ((blur lp) s (- n 1))))))
(lp #f 2)";

#[test]
fn fact_reaches_an_integer() {
    check_all_machines(FACT, |sem| sem.domain().int(120));
}

#[test]
fn fib_reaches_an_integer() {
    check_all_machines(FIB, |sem| sem.domain().int(3));
}

#[test]
fn ack_reaches_an_integer() {
    check_all_machines(ACK, |sem| sem.domain().int(4));
}

#[test]
fn collatz_reaches_an_integer() {
    check_all_machines(COLLATZ, |sem| sem.domain().int(5));
}

#[test]
fn sq_reaches_an_integer() {
    check_all_machines(SQ, |sem| sem.domain().int(9));
}

#[test]
fn blur_reaches_a_boolean() {
    check_all_machines(BLUR, |sem| sem.domain().boolean(true));
}

#[test]
fn bounded_integers_saturate_past_the_bound() {
    use kontour_scheme::BoundedIntSemantics;
    let sem = BoundedIntSemantics::bounded(100);
    let program = sem.parse(FACT).unwrap();
    let output = Aam::new(sem, config()).run(program);
    assert!(!output.timed_out);
    // 120 exceeds the bound, so the final value is the integer summary,
    // which still covers the exact result
    let probe = BoundedIntSemantics::bounded(100);
    let exact = probe.domain().int(120);
    assert!(output.contains_final_value(&exact));
}

#[test]
fn value_sensitive_allocation_still_reaches_the_result() {
    use kontour_scheme::TypeSetValueSensitiveSemantics;
    let sem = TypeSetValueSensitiveSemantics::new(
        kontour::value::TypeSetDomain::type_set(),
        kontour::ValueSensitiveAllocator,
    );
    let program = sem.parse(SQ).unwrap();
    let output = Aam::new(sem, config()).run(program);
    assert!(!output.timed_out);
    let probe = TypeSetSemantics::type_set();
    let nine = probe.domain().int(9);
    assert!(output.contains_final_value(&nine));
}

#[test]
fn concrete_machine_computes_exact_results() {
    for (source, expected) in [(FACT, 120), (FIB, 3), (SQ, 9), (COLLATZ, 5)] {
        let output = run_concrete(source);
        assert!(!output.timed_out);
        let sem = ConcreteSemantics::concrete();
        let want = sem.domain().int(expected);
        assert!(
            output.contains_final_value(&want),
            "expected {expected}, got {:?}",
            output.final_values
        );
        assert_eq!(output.errors.len(), 0);
    }
}

#[test]
fn actor_pipeline_delivers_to_the_sink() {
    // three +1 nodes in front of a terminating sink, seeded with 0: the
    // sink must be reachable with the value 3 in its mailbox
    let source = "
(define node
  (actor \"node\" (next)
    (value (v) (begin (send next value (+ v 1)) (become node next)))))
(define sink
  (actor \"sink\" ()
    (value (v) (terminate))))
(define s (create sink))
(define n1 (create node s))
(define n2 (create node n1))
(define n3 (create node n2))
(send n3 value 0)";
    let sem = TypeSetSemantics::type_set();
    let program = sem.parse(source).expect("program parses");
    let output = ActorsAam::new(sem, config()).run(program);
    assert!(!output.timed_out);
    assert!(output.num_states > 0);
    let sem = TypeSetSemantics::type_set();
    let three = sem.domain().int(3);
    assert!(
        output.delivered.iter().any(|v| v.subsumes(&three)),
        "no delivered message subsumes 3: {:?}",
        output.delivered
    );
    assert!(output.terminated_actors >= 1, "the sink never terminated");
}

#[test]
fn indexer_joins_complete_and_the_table_is_filled() {
    let source = "
(define table (make-vector 128 '()))
(define lk (new-lock))
(define (hash w) (modulo (string-length w) 128))
(define (insert w)
  (begin (acquire lk)
         (vector-set! table (hash w) w)
         (release lk)))
(define (worker a b) (begin (insert a) (insert b) #t))
(define t1 (spawn (worker \"aa\" \"bbb\")))
(define t2 (spawn (worker \"cccc\" \"ddddd\")))
(begin (join t1) (join t2) (vector-ref table 0))";
    let sem = TypeSetSemantics::type_set();
    let program = sem.parse(source).expect("program parses");
    let output = ConcurrentAam::new(sem, config()).run(program);
    assert!(!output.timed_out);
    // both joins completed: the main thread reached a final value
    assert!(
        !output.final_values.is_empty(),
        "main thread never halted; joins did not complete"
    );
    // the table read sees inserted words (or the nil fill)
    let sem = TypeSetSemantics::type_set();
    let word = sem.domain().string("aa");
    assert!(
        output.final_values.iter().any(|v| v.subsumes(&word)),
        "table contents lost the inserted words: {:?}",
        output.final_values
    );
}
