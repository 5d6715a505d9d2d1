//! Golden program tests: whole !~ATH programs run against the simulated
//! host on a virtual clock, asserting exact output.

use std::rc::Rc;

use tildeath::{run_source, AthError, ErrorKind, SimHost};

fn run_on(host: &Rc<SimHost>, source: &str) -> Result<(), AthError> {
    let host: Rc<dyn tildeath::Host> = Rc::clone(host) as Rc<dyn tildeath::Host>;
    run_source(source, host)
}

fn run_ok(source: &str) -> Vec<String> {
    let host = Rc::new(SimHost::new());
    run_on(&host, source).expect("program should succeed");
    host.captured_output()
}

fn run_err(source: &str) -> AthError {
    let host = Rc::new(SimHost::new());
    run_on(&host, source).expect_err("program should fail")
}

// ============ Golden scenarios ============

#[test]
fn hello_world() {
    let output = run_ok(
        r#"
        import timer T(1ms);
        ~ATH(T) { } EXECUTE(UTTER("Hello, world!"));
        THIS.DIE();
        "#,
    );
    assert_eq!(output, vec!["Hello, world!"]);
}

#[test]
fn countdown_over_timer_chain() {
    let output = run_ok(
        r#"
        RITE countdown(n) {
            SHOULD n > 0 {
                UTTER(n);
                import timer T(1ms);
                ~ATH(T) { } EXECUTE(countdown(n - 1));
            } LEST {
                UTTER("Liftoff!");
            }
        }
        countdown(5);
        THIS.DIE();
        "#,
    );
    assert_eq!(output, vec!["5", "4", "3", "2", "1", "Liftoff!"]);
}

#[test]
fn entity_or_fires_with_the_earlier_timer() {
    let host = Rc::new(SimHost::new());
    run_on(
        &host,
        r#"
        import timer T1(10ms);
        import timer T2(1ms);
        ~ATH(T1 || T2) { } EXECUTE(UTTER("done"));
        THIS.DIE();
        "#,
    )
    .expect("program should succeed");
    assert_eq!(host.captured_output(), vec!["done"]);
    assert!(host.clock_ms() <= 3, "fired at {}ms", host.clock_ms());
}

#[test]
fn bifurcation_runs_both_branches() {
    let output = run_ok(
        r#"
        bifurcate THIS[LEFT, RIGHT];

        ~ATH(LEFT) {
            import timer T1(1ms);
            ~ATH(T1) { } EXECUTE(UTTER("left"));
        } EXECUTE(VOID);

        ~ATH(RIGHT) {
            import timer T2(1ms);
            ~ATH(T2) { } EXECUTE(UTTER("right"));
        } EXECUTE(VOID);

        [LEFT, RIGHT].DIE();
        "#,
    );
    let lines: std::collections::HashSet<&str> = output.iter().map(String::as_str).collect();
    assert_eq!(lines, ["left", "right"].into_iter().collect());
}

#[test]
fn error_caught_inside_timer_execute() {
    let output = run_ok(
        r#"
        import timer T(1ms);
        ~ATH(T) { } EXECUTE(
            ATTEMPT {
                BIRTH x WITH PARSE_INT("not a number");
            } SALVAGE err {
                UTTER("Error: " + err);
            }
        );
        THIS.DIE();
        "#,
    );
    assert_eq!(output.len(), 1);
    assert!(output[0].starts_with("Error: "), "{}", output[0]);
    assert_eq!(output[0], "Error: Cannot parse 'not a number' as integer");
}

#[test]
fn fizzbuzz_via_timer_chain() {
    let output = run_ok(
        r#"
        RITE fizzbuzz(n, limit) {
            SHOULD n > limit {
                BEQUEATH;
            } LEST {
                SHOULD n % 15 == 0 {
                    UTTER("FizzBuzz");
                } LEST SHOULD n % 3 == 0 {
                    UTTER("Fizz");
                } LEST SHOULD n % 5 == 0 {
                    UTTER("Buzz");
                } LEST {
                    UTTER(n);
                }
                import timer T(1ms);
                ~ATH(T) { } EXECUTE(fizzbuzz(n + 1, limit));
            }
        }
        fizzbuzz(1, 15);
        THIS.DIE();
        "#,
    );
    assert_eq!(
        output,
        vec![
            "1", "2", "Fizz", "4", "Buzz", "Fizz", "7", "8", "Fizz", "Buzz", "11", "Fizz", "13",
            "14", "FizzBuzz",
        ]
    );
}

// ============ Variables and scopes ============

#[test]
fn birth_and_reassignment() {
    let output = run_ok(
        r#"
        BIRTH x WITH 10;
        UTTER(x);
        x = 25;
        UTTER(x);
        THIS.DIE();
        "#,
    );
    assert_eq!(output, vec!["10", "25"]);
}

#[test]
fn entombed_constant_rejects_reassignment() {
    let err = run_err(
        r#"
        ENTOMB k WITH 1;
        k = 2;
        THIS.DIE();
        "#,
    );
    assert_eq!(err.kind, ErrorKind::Constraint);
    assert_eq!(err.message, "Cannot reassign constant: k");
}

#[test]
fn undefined_variable_is_a_lookup_error() {
    let err = run_err("UTTER(missing); THIS.DIE();");
    assert_eq!(err.kind, ErrorKind::Lookup);
    assert_eq!(err.message, "Undefined variable: missing");
}

// ============ Arithmetic and comparison ============

#[test]
fn arithmetic_follows_precedence() {
    let output = run_ok(
        r#"
        UTTER(2 + 3 * 4);
        UTTER((2 + 3) * 4);
        UTTER(7 / 2);
        UTTER(-7 / 2);
        UTTER(7 % 3);
        UTTER(1.5 + 2.5);
        UTTER(10 - 3 - 2);
        THIS.DIE();
        "#,
    );
    assert_eq!(output, vec!["14", "20", "3", "-3", "1", "4", "5"]);
}

#[test]
fn division_by_zero_fails() {
    let err = run_err("UTTER(1 / 0); THIS.DIE();");
    assert_eq!(err.message, "Division by zero");
    let err = run_err("UTTER(1 % 0); THIS.DIE();");
    assert_eq!(err.message, "Modulo by zero");
}

#[test]
fn comparisons_and_equality() {
    let output = run_ok(
        r#"
        UTTER(1 < 2, 2 <= 2, 3 > 4, 4 >= 4);
        UTTER(1 == 1.0, "a" == "a", "a" != "b");
        UTTER("apple" < "banana");
        THIS.DIE();
        "#,
    );
    assert_eq!(
        output,
        vec!["ALIVE ALIVE DEAD ALIVE", "ALIVE ALIVE ALIVE", "ALIVE"]
    );
}

#[test]
fn string_concatenation_coerces_either_side() {
    let output = run_ok(
        r#"
        UTTER("n = " + 42);
        UTTER(1 + "!");
        UTTER("have " + [1, 2]);
        THIS.DIE();
        "#,
    );
    assert_eq!(output, vec!["n = 42", "1!", "have [1, 2]"]);
}

#[test]
fn logical_operators_return_the_deciding_value() {
    let output = run_ok(
        r#"
        UTTER(0 AND 5);
        UTTER(2 AND 3);
        UTTER("" OR "fallback");
        UTTER(1 OR 2);
        UTTER(NOT 0, NOT "x");
        THIS.DIE();
        "#,
    );
    assert_eq!(output, vec!["0", "3", "fallback", "1", "ALIVE DEAD"]);
}

#[test]
fn logical_operators_short_circuit() {
    let output = run_ok(
        r#"
        RITE touch(v) {
            UTTER("evaluated");
            BEQUEATH v;
        }
        BIRTH a WITH DEAD AND touch(ALIVE);
        BIRTH b WITH ALIVE OR touch(ALIVE);
        UTTER(a, b);
        THIS.DIE();
        "#,
    );
    assert_eq!(output, vec!["DEAD ALIVE"]);
}

// ============ Collections ============

#[test]
fn arrays_index_and_mutate_through_aliases() {
    let output = run_ok(
        r#"
        BIRTH arr WITH [1, "two", 3.5];
        BIRTH alias WITH arr;
        UTTER(arr);
        UTTER(arr[1]);
        arr[0] = 99;
        UTTER(alias);
        UTTER(LENGTH(arr));
        THIS.DIE();
        "#,
    );
    assert_eq!(output, vec!["[1, two, 3.5]", "two", "[99, two, 3.5]", "3"]);
}

#[test]
fn array_index_out_of_bounds_fails() {
    let err = run_err("BIRTH a WITH [1]; UTTER(a[5]); THIS.DIE();");
    assert_eq!(err.message, "Array index out of bounds: 5");
}

#[test]
fn maps_support_member_and_index_access() {
    let output = run_ok(
        r#"
        BIRTH m WITH {name: "ath", "size": 3};
        UTTER(m);
        UTTER(m.name);
        UTTER(m["size"]);
        m.grew = ALIVE;
        m["size"] = 4;
        UTTER(m);
        UTTER(KEYS(m));
        THIS.DIE();
        "#,
    );
    assert_eq!(
        output,
        vec![
            "{name: ath, size: 3}",
            "ath",
            "3",
            "{name: ath, size: 4, grew: ALIVE}",
            "[name, size, grew]",
        ]
    );
}

#[test]
fn missing_map_key_is_a_lookup_error() {
    let err = run_err("BIRTH m WITH {a: 1}; UTTER(m.b); THIS.DIE();");
    assert_eq!(err.kind, ErrorKind::Lookup);
    assert_eq!(err.message, "Key not found in map: b");
}

#[test]
fn string_indexing_yields_single_characters() {
    let output = run_ok(
        r#"
        BIRTH s WITH "hello";
        UTTER(s[1]);
        UTTER("déjà"[1]);
        THIS.DIE();
        "#,
    );
    assert_eq!(output, vec!["e", "é"]);
}

// ============ Conditionals ============

#[test]
fn chained_conditionals_pick_the_first_truthy_branch() {
    let output = run_ok(
        r#"
        RITE classify(n) {
            SHOULD n < 0 {
                BEQUEATH "negative";
            } LEST SHOULD n == 0 {
                BEQUEATH "zero";
            } LEST {
                BEQUEATH "positive";
            }
        }
        UTTER(classify(-5), classify(0), classify(5));
        THIS.DIE();
        "#,
    );
    assert_eq!(output, vec!["negative zero positive"]);
}

// ============ Rites ============

#[test]
fn rites_bind_parameters_and_bequeath() {
    let output = run_ok(
        r#"
        RITE add(a, b) {
            BEQUEATH a + b;
        }
        UTTER(add(2, 3));
        RITE greet(name) {
            UTTER("hi " + name);
        }
        UTTER(greet("ath"));
        THIS.DIE();
        "#,
    );
    assert_eq!(output, vec!["5", "hi ath", "VOID"]);
}

#[test]
fn recursive_rites_work_without_timers() {
    let output = run_ok(
        r#"
        RITE fact(n) {
            SHOULD n <= 1 { BEQUEATH 1; }
            BEQUEATH n * fact(n - 1);
        }
        UTTER(fact(10));
        THIS.DIE();
        "#,
    );
    assert_eq!(output, vec!["3628800"]);
}

#[test]
fn rites_close_over_their_definition_scope() {
    let output = run_ok(
        r#"
        RITE make_counter() {
            BIRTH count WITH 0;
            RITE increment() {
                count = count + 1;
                BEQUEATH count;
            }
            BEQUEATH increment;
        }
        BIRTH counter WITH make_counter();
        UTTER(counter());
        UTTER(counter());
        UTTER(counter());
        THIS.DIE();
        "#,
    );
    assert_eq!(output, vec!["1", "2", "3"]);
}

#[test]
fn mutually_recursive_rites_resolve_through_the_shared_scope() {
    let output = run_ok(
        r#"
        RITE is_even(n) {
            SHOULD n == 0 { BEQUEATH ALIVE; }
            BEQUEATH is_odd(n - 1);
        }
        RITE is_odd(n) {
            SHOULD n == 0 { BEQUEATH DEAD; }
            BEQUEATH is_even(n - 1);
        }
        UTTER(is_even(10), is_odd(10));
        THIS.DIE();
        "#,
    );
    assert_eq!(output, vec!["ALIVE DEAD"]);
}

#[test]
fn rite_bindings_stay_inside_the_call() {
    let err = run_err(
        r#"
        RITE f() {
            BIRTH inner WITH 1;
        }
        f();
        UTTER(inner);
        THIS.DIE();
        "#,
    );
    assert_eq!(err.message, "Undefined variable: inner");
}

#[test]
fn rite_arity_mismatch_fails() {
    let err = run_err(
        r#"
        RITE f(a, b) { BEQUEATH a; }
        f(1);
        THIS.DIE();
        "#,
    );
    assert_eq!(err.message, "Rite 'f' expects 2 arguments, got 1");
}

// ============ Errors and unwinding ============

#[test]
fn condemn_is_catchable_with_its_message() {
    let output = run_ok(
        r#"
        ATTEMPT {
            CONDEMN "the ritual failed";
        } SALVAGE e {
            UTTER("caught: " + e);
        }
        THIS.DIE();
        "#,
    );
    assert_eq!(output, vec!["caught: the ritual failed"]);
}

#[test]
fn uncaught_condemn_fails_the_program() {
    let err = run_err("CONDEMN \"doom\";");
    assert_eq!(err.kind, ErrorKind::Condemn);
    assert_eq!(err.to_string(), "[line 1, col 1] condemned: doom");
}

#[test]
fn attempt_without_error_skips_salvage() {
    let output = run_ok(
        r#"
        ATTEMPT {
            UTTER("fine");
        } SALVAGE e {
            UTTER("never");
        }
        THIS.DIE();
        "#,
    );
    assert_eq!(output, vec!["fine"]);
}

#[test]
fn nested_attempts_catch_at_the_nearest_level() {
    let output = run_ok(
        r#"
        ATTEMPT {
            ATTEMPT {
                CONDEMN "inner";
            } SALVAGE e {
                UTTER("inner caught " + e);
                CONDEMN "outer";
            }
        } SALVAGE e {
            UTTER("outer caught " + e);
        }
        THIS.DIE();
        "#,
    );
    assert_eq!(output, vec!["inner caught inner", "outer caught outer"]);
}

#[test]
fn bequeath_passes_through_attempt() {
    let output = run_ok(
        r#"
        RITE f() {
            ATTEMPT {
                BEQUEATH 42;
            } SALVAGE e {
                UTTER("must not run");
            }
            BEQUEATH 0;
        }
        UTTER(f());
        THIS.DIE();
        "#,
    );
    assert_eq!(output, vec!["42"]);
}

#[test]
fn bequeath_outside_a_rite_is_an_error() {
    let err = run_err("BEQUEATH 1;");
    assert_eq!(err.message, "BEQUEATH outside of a rite");
}

#[test]
fn salvage_binding_is_scoped_to_the_salvage_block() {
    let err = run_err(
        r#"
        ATTEMPT {
            CONDEMN "x";
        } SALVAGE e {
            UTTER(e);
        }
        UTTER(e);
        THIS.DIE();
        "#,
    );
    assert_eq!(err.message, "Undefined variable: e");
}

// ============ Entities and death ============

#[test]
fn death_is_observed_on_a_later_tick() {
    let host = Rc::new(SimHost::new());
    run_on(
        &host,
        r#"
        import timer T(1h);
        T.DIE();
        ~ATH(T) { } EXECUTE(UTTER("observed"));
        THIS.DIE();
        "#,
    )
    .expect("program should succeed");
    assert_eq!(host.captured_output(), vec!["observed"]);
    assert_eq!(host.clock_ms(), 0, "a cancelled timer must not be waited on");
}

#[test]
fn killing_this_early_still_schedules_the_waiter() {
    let output = run_ok(
        r#"
        THIS.DIE();
        ~ATH(THIS) { } EXECUTE(UTTER("THIS died"));
        "#,
    );
    assert_eq!(output, vec!["THIS died"]);
}

#[test]
fn entity_and_waits_for_both() {
    let host = Rc::new(SimHost::new());
    run_on(
        &host,
        r#"
        import timer T1(1ms);
        import timer T2(5ms);
        ~ATH(T1 && T2) { } EXECUTE(UTTER("both at " + TIME()));
        THIS.DIE();
        "#,
    )
    .expect("program should succeed");
    assert_eq!(host.captured_output(), vec!["both at 5"]);
}

#[test]
fn entity_not_dies_once_observed() {
    let host = Rc::new(SimHost::new());
    run_on(
        &host,
        r#"
        import timer T(1h);
        ~ATH(!T) { } EXECUTE(UTTER("timer exists"));
        T.DIE();
        THIS.DIE();
        "#,
    )
    .expect("program should succeed");
    assert_eq!(host.captured_output(), vec!["timer exists"]);
    assert_eq!(host.clock_ms(), 0);
}

#[test]
fn reimporting_a_name_replaces_the_entity() {
    let host = Rc::new(SimHost::new());
    run_on(
        &host,
        r#"
        import timer T(1h);
        import timer T(1ms);
        ~ATH(T) { } EXECUTE(UTTER("replaced"));
        THIS.DIE();
        "#,
    )
    .expect("program should succeed");
    assert_eq!(host.captured_output(), vec!["replaced"]);
    assert!(host.clock_ms() <= 2, "old timer must be cancelled");
}

#[test]
fn nested_timer_executes_run_in_order() {
    let output = run_ok(
        r#"
        import timer T1(1ms);
        ~ATH(T1) { } EXECUTE(
            UTTER("first");
            import timer T2(1ms);
            ~ATH(T2) { } EXECUTE(
                UTTER("second");
            );
        );
        THIS.DIE();
        "#,
    );
    assert_eq!(output, vec!["first", "second"]);
}

#[test]
fn die_on_unknown_entity_fails() {
    let err = run_err("GHOST.DIE();");
    assert_eq!(err.kind, ErrorKind::Lookup);
    assert_eq!(err.message, "Unknown entity: GHOST");
}

#[test]
fn die_pairs_kill_every_leaf() {
    let output = run_ok(
        r#"
        import timer A(1h);
        import timer B(1h);
        import timer C(1h);
        [[A, B], C].DIE();
        ~ATH(A && B && C) { } EXECUTE(UTTER("all dead"));
        THIS.DIE();
        "#,
    );
    assert_eq!(output, vec!["all dead"]);
}

#[test]
fn timer_below_one_millisecond_is_rejected() {
    let err = run_err("import timer T(0ms); THIS.DIE();");
    assert_eq!(err.kind, ErrorKind::Constraint);
    assert_eq!(err.message, "Timer duration must be at least 1ms (got 0ms)");
}

#[test]
fn duration_units_convert_exactly() {
    let host = Rc::new(SimHost::new());
    run_on(
        &host,
        r#"
        import timer T(2s);
        ~ATH(T) { } EXECUTE(UTTER(TIME()));
        THIS.DIE();
        "#,
    )
    .expect("program should succeed");
    assert_eq!(host.captured_output(), vec!["2000"]);
}

#[test]
fn wait_mode_body_rejects_plain_statements() {
    let err = run_err(
        r#"
        import timer T(1ms);
        ~ATH(T) { UTTER("no"); } EXECUTE(VOID);
        THIS.DIE();
        "#,
    );
    assert_eq!(
        err.message,
        "Only nested ~ATH statements are allowed in a wait body"
    );
}

#[test]
fn wait_mode_body_allows_but_does_not_run_nested_ath() {
    let output = run_ok(
        r#"
        import timer T(1ms);
        ~ATH(T) {
            ~ATH(T) { } EXECUTE(UTTER("inner"));
        } EXECUTE(UTTER("outer"));
        THIS.DIE();
        "#,
    );
    assert_eq!(output, vec!["outer"]);
}

#[test]
fn process_imports_fail_on_a_host_without_processes() {
    let err = run_err("import process P(\"true\"); THIS.DIE();");
    assert_eq!(
        err.message,
        "process entities is not supported by this host"
    );
    let err = run_err("import connection C(\"localhost\", 80); THIS.DIE();");
    assert_eq!(
        err.message,
        "connection entities is not supported by this host"
    );
}

// ============ Bifurcation ============

#[test]
fn branches_share_the_enclosing_scope() {
    let output = run_ok(
        r#"
        BIRTH total WITH 0;
        bifurcate THIS[L, R];
        ~ATH(L) { total = total + 1; } EXECUTE(VOID);
        ~ATH(R) { total = total + 10; } EXECUTE(VOID);
        import timer T(1ms);
        ~ATH(T) { } EXECUTE(UTTER(total));
        [L, R].DIE();
        THIS.DIE();
        "#,
    );
    assert_eq!(output, vec!["11"]);
}

#[test]
fn branch_errors_fail_the_program_after_both_ran() {
    let err = run_err(
        r#"
        bifurcate THIS[L, R];
        ~ATH(L) { CONDEMN "left broke"; } EXECUTE(VOID);
        ~ATH(R) { } EXECUTE(VOID);
        [L, R].DIE();
        THIS.DIE();
        "#,
    );
    assert_eq!(err.kind, ErrorKind::Condemn);
    assert_eq!(err.message, "left broke");
}

#[test]
fn branch_errors_are_catchable_locally() {
    let output = run_ok(
        r#"
        bifurcate THIS[L, R];
        ~ATH(L) {
            ATTEMPT { CONDEMN "contained"; } SALVAGE e { UTTER("caught " + e); }
        } EXECUTE(VOID);
        ~ATH(R) { } EXECUTE(VOID);
        [L, R].DIE();
        THIS.DIE();
        "#,
    );
    assert_eq!(output, vec!["caught contained"]);
}

#[test]
fn bifurcating_an_unknown_entity_fails() {
    let err = run_err("bifurcate GHOST[L, R]; THIS.DIE();");
    assert_eq!(err.message, "Cannot bifurcate unknown entity: GHOST");
}

#[test]
fn waiting_on_a_branch_blocks_until_it_dies() {
    let output = run_ok(
        r#"
        bifurcate THIS[WORKER, IDLE];
        ~ATH(WORKER) {
            import timer T(1ms);
            ~ATH(T) { } EXECUTE(UTTER("worked"));
        } EXECUTE(VOID);
        ~ATH(WORKER && WORKER) { } EXECUTE(UTTER("joined"));
        [WORKER, IDLE].DIE();
        THIS.DIE();
        "#,
    );
    assert_eq!(output, vec!["worked", "joined"]);
}

// ============ Host-facing built-ins ============

#[test]
fn heed_reads_queued_input() {
    let host = Rc::new(SimHost::new());
    host.push_input("Gamzee");
    run_on(
        &host,
        r#"
        BIRTH name WITH HEED();
        UTTER("hello " + name);
        UTTER("then: '" + HEED() + "'");
        THIS.DIE();
        "#,
    )
    .expect("program should succeed");
    assert_eq!(host.captured_output(), vec!["hello Gamzee", "then: ''"]);
}

#[test]
fn scry_and_inscribe_use_the_host_file_table() {
    let host = Rc::new(SimHost::new());
    host.write_file("in.txt", "payload");
    run_on(
        &host,
        r#"
        BIRTH content WITH SCRY("in.txt");
        INSCRIBE("out.txt", UPPERCASE(content));
        UTTER(SCRY("out.txt"));
        THIS.DIE();
        "#,
    )
    .expect("program should succeed");
    assert_eq!(host.captured_output(), vec!["PAYLOAD"]);
    assert_eq!(host.file("out.txt").as_deref(), Some("PAYLOAD"));
}

#[test]
fn scry_missing_file_is_catchable() {
    let output = run_ok(
        r#"
        ATTEMPT {
            BIRTH c WITH SCRY("ghost.txt");
        } SALVAGE e {
            UTTER(e);
        }
        THIS.DIE();
        "#,
    );
    assert_eq!(output, vec!["File not found: ghost.txt"]);
}

#[test]
fn watcher_on_a_missing_path_dies_immediately_but_asynchronously() {
    let output = run_ok(
        r#"
        import watcher W("never-existed.txt");
        ~ATH(W) { } EXECUTE(UTTER("gone"));
        THIS.DIE();
        "#,
    );
    assert_eq!(output, vec!["gone"]);
}

#[test]
fn time_reads_the_virtual_clock() {
    let host = Rc::new(SimHost::new());
    run_on(
        &host,
        r#"
        UTTER(TIME());
        import timer T(7ms);
        ~ATH(T) { } EXECUTE(UTTER(TIME()));
        THIS.DIE();
        "#,
    )
    .expect("program should succeed");
    assert_eq!(host.captured_output(), vec!["0", "7"]);
}

// ============ Modules ============

#[test]
fn watcher_imports_load_ath_modules() {
    let host = Rc::new(SimHost::new());
    host.write_file(
        "math.~ATH",
        r#"
        RITE double(x) { BEQUEATH x * 2; }
        ENTOMB magic WITH 21;
        THIS.DIE();
        "#,
    );
    run_on(
        &host,
        r#"
        import watcher MATH("math.~ATH");
        UTTER(MATH.double(MATH.magic));
        THIS.DIE();
        "#,
    )
    .expect("program should succeed");
    assert_eq!(host.captured_output(), vec!["42"]);
}

#[test]
fn module_missing_export_is_a_lookup_error() {
    let host = Rc::new(SimHost::new());
    host.write_file("m.~ATH", "BIRTH x WITH 1; THIS.DIE();");
    let err = run_on(
        &host,
        r#"
        import watcher M("m.~ATH");
        UTTER(M.nope);
        THIS.DIE();
        "#,
    )
    .expect_err("program should fail");
    assert_eq!(err.message, "Module 'M' has no export 'nope'");
}

#[test]
fn circular_imports_are_detected() {
    let host = Rc::new(SimHost::new());
    host.write_file("a.~ATH", "import watcher B(\"b.~ATH\"); THIS.DIE();");
    host.write_file("b.~ATH", "import watcher A(\"a.~ATH\"); THIS.DIE();");
    let err = run_on(&host, "import watcher A(\"a.~ATH\"); THIS.DIE();")
        .expect_err("program should fail");
    assert!(
        err.message.contains("Circular import detected"),
        "{}",
        err.message
    );
}

#[test]
fn missing_module_file_fails_the_import() {
    let err = run_err("import watcher M(\"ghost.~ATH\"); THIS.DIE();");
    assert!(
        err.message.contains("Cannot read module 'ghost.~ATH'"),
        "{}",
        err.message
    );
}

// ============ Termination ============

#[test]
fn program_without_this_die_still_exits_cleanly() {
    let output = run_ok("UTTER(\"done\");");
    assert_eq!(output, vec!["done"]);
}

#[test]
fn pending_timers_settle_before_exit() {
    // The 1h timer never fires on the virtual clock; releasing the entity
    // table after the top-level stream lets its lifecycle settle.
    let host = Rc::new(SimHost::new());
    run_on(
        &host,
        r#"
        import timer SLOW(1h);
        UTTER("bye");
        THIS.DIE();
        "#,
    )
    .expect("program should succeed");
    assert_eq!(host.captured_output(), vec!["bye"]);
    assert_eq!(host.clock_ms(), 0);
}
