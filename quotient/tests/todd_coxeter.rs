//! End-to-end enumeration scenarios, from trivial monoids up to `S_5`.

use quotient::{
    Answer, DefVersion, Error, Kind, LookaheadStyle, Order, Presentation, SourceGraph, Strategy,
    ToddCoxeter, Word, POSITIVE_INFINITY,
};

fn presentation(alphabet: usize, rules: &[(&[u32], &[u32])], empty_word: bool) -> Presentation {
    let mut p = Presentation::new(alphabet);
    if empty_word {
        p = p.with_empty_word();
    }
    for (u, v) in rules {
        p.add_rule(u.to_vec(), v.to_vec()).unwrap();
    }
    p
}

/// The symmetric group `S_5` as a monoid: four Coxeter generators with the standard
/// braid and commutation relations.
fn s5() -> Presentation {
    presentation(
        4,
        &[
            (&[0, 0], &[]),
            (&[1, 1], &[]),
            (&[2, 2], &[]),
            (&[3, 3], &[]),
            (&[0, 1, 0, 1, 0, 1], &[]),
            (&[1, 2, 1, 2, 1, 2], &[]),
            (&[2, 3, 2, 3, 2, 3], &[]),
            (&[0, 2, 0, 2], &[]),
            (&[0, 3, 0, 3], &[]),
            (&[1, 3, 1, 3], &[]),
        ],
        true,
    )
}

#[track_caller]
fn assert_same_graph(g1: &SourceGraph, g2: &SourceGraph, num_nodes: usize) {
    for s in 0..num_nodes {
        for a in 0..g1.out_degree() as u32 {
            assert_eq!(
                g1.target(quotient::Node(s as u32), a),
                g2.target(quotient::Node(s as u32), a),
                "graphs differ at node {s}, label {a}"
            );
        }
    }
}

#[test]
fn trivial_monoid() {
    // aa = a and a = b collapse every non-empty word into one class
    let p = presentation(2, &[(&[0, 0], &[0]), (&[0], &[1])], true);
    let mut tc = ToddCoxeter::new(Kind::TwoSided, p).unwrap();
    assert_eq!(tc.number_of_classes().unwrap(), 2);
    assert_eq!(tc.reduce(&[0, 0, 0, 0]).unwrap(), vec![0]);
    assert_eq!(tc.reduce(&[0, 0]).unwrap(), vec![0]);
    assert!(tc.contains(&[0, 0, 0, 0], &[0, 0]).unwrap());
    assert!(tc.contains(&[1, 0, 1], &[0]).unwrap());
    assert!(!tc.contains(&[1, 0, 1], &[]).unwrap());
}

#[test]
fn symmetric_group_s5() {
    let mut tc = ToddCoxeter::new(Kind::TwoSided, s5()).unwrap();
    assert_eq!(tc.number_of_classes().unwrap(), 120);
    assert!(tc.finished());
    assert!(tc.standardize(Order::Shortlex).is_ok());
    assert_eq!(tc.index_of(&[]).unwrap(), 0);
    assert_eq!(tc.word_of(0).unwrap(), Vec::<u32>::new());
    // A Coxeter generator is an involution
    assert!(tc.contains(&[0, 0], &[]).unwrap());
    assert_eq!(tc.reduce(&[0, 0, 1]).unwrap(), vec![1]);
}

#[test]
fn s5_all_strategies_agree() {
    for strategy in [
        Strategy::Hlt,
        Strategy::Felsch,
        Strategy::CR,
        Strategy::ROverC,
        Strategy::Cr,
        Strategy::Rc,
    ] {
        let mut tc = ToddCoxeter::new(Kind::TwoSided, s5()).unwrap();
        tc.strategy(strategy);
        assert_eq!(
            tc.number_of_classes().unwrap(),
            120,
            "strategy {strategy} found the wrong number of classes"
        );
    }
}

#[test]
fn s5_with_save_and_tiny_lookahead() {
    // A tiny lookahead threshold forces repeated lookahead phases mid-HLT
    let mut tc = ToddCoxeter::new(Kind::TwoSided, s5()).unwrap();
    tc.lookahead_next(5).lookahead_min(5);
    assert_eq!(tc.number_of_classes().unwrap(), 120);

    let mut tc = ToddCoxeter::new(Kind::TwoSided, s5()).unwrap();
    tc.save(true);
    assert_eq!(tc.number_of_classes().unwrap(), 120);

    let mut tc = ToddCoxeter::new(Kind::TwoSided, s5()).unwrap();
    tc.lookahead_next(5)
        .lookahead_min(5)
        .lookahead_style(LookaheadStyle::Felsch);
    assert_eq!(tc.number_of_classes().unwrap(), 120);
}

#[test]
fn def_versions_produce_identical_graphs() {
    let mut one = ToddCoxeter::new(Kind::TwoSided, s5()).unwrap();
    one.strategy(Strategy::Felsch).def_version(DefVersion::One);
    let mut two = ToddCoxeter::new(Kind::TwoSided, s5()).unwrap();
    two.strategy(Strategy::Felsch).def_version(DefVersion::Two);
    assert_eq!(one.number_of_classes().unwrap(), 120);
    assert_eq!(two.number_of_classes().unwrap(), 120);
    let g1 = one.word_graph().unwrap().clone();
    let g2 = two.word_graph().unwrap().clone();
    assert_same_graph(&g1, &g2, 120);
}

#[test]
fn two_sided_generating_pairs_collapse_free_semigroup() {
    // Free semigroup on two generators, quotiented by the pairs aa = a and a = b:
    // every non-empty word is equivalent to a
    let p = presentation(2, &[], false);
    let mut tc = ToddCoxeter::new(Kind::TwoSided, p).unwrap();
    tc.add_generating_pair(vec![0, 0], vec![0]).unwrap();
    tc.add_generating_pair(vec![0], vec![1]).unwrap();
    assert_eq!(tc.number_of_classes().unwrap(), 1);
    assert!(tc.contains(&[0, 1, 0, 1, 0], &[1]).unwrap());
    assert_eq!(
        tc.reduce(&[0, 1, 0, 1, 0]).unwrap(),
        tc.reduce(&[1]).unwrap()
    );
}

#[test]
fn pair_insertion_order_is_irrelevant() {
    let build = |flip: bool| {
        let p = presentation(2, &[], false);
        let mut tc = ToddCoxeter::new(Kind::TwoSided, p).unwrap();
        let pairs: [(Word, Word); 2] = [(vec![0, 0], vec![0]), (vec![0], vec![1])];
        let order = if flip { [1, 0] } else { [0, 1] };
        for i in order {
            let (u, v) = pairs[i].clone();
            tc.add_generating_pair(u, v).unwrap();
        }
        tc.run().unwrap();
        tc.standardize(Order::Shortlex).unwrap();
        tc.current_word_graph().clone()
    };
    let g1 = build(false);
    let g2 = build(true);
    assert_same_graph(&g1, &g2, 2);
}

#[test]
fn obviously_infinite_monoid() {
    // One generator and no relations: obviously infinite
    let p = presentation(1, &[], true);
    let mut tc = ToddCoxeter::new(Kind::TwoSided, p).unwrap();
    assert!(tc.is_obviously_infinite());
    assert_eq!(tc.run(), Err(Error::UnboundedEnumeration));
    // A budgeted run returns normally without finishing
    tc.run_for(std::time::Duration::from_millis(100)).unwrap();
    assert!(!tc.finished());
    assert_eq!(tc.number_of_classes().unwrap(), POSITIVE_INFINITY);
}

#[test]
fn large_collapse_threshold_does_not_change_the_answer() {
    let build = |large_collapse: usize| {
        let mut tc = ToddCoxeter::new(Kind::TwoSided, s5()).unwrap();
        tc.large_collapse(large_collapse);
        assert_eq!(tc.number_of_classes().unwrap(), 120);
        tc.word_graph().unwrap().clone()
    };
    // Forcing the bulk path from the first coincidence must yield a graph identical
    // to per-merge repair
    let g1 = build(1);
    let g2 = build(1_000_000);
    assert_same_graph(&g1, &g2, 120);
}

#[test]
fn run_until_stops_and_resumes() {
    let mut tc = ToddCoxeter::new(Kind::TwoSided, s5()).unwrap();
    let mut checks = 0;
    tc.run_until(move || {
        checks += 1;
        checks > 20
    })
    .unwrap();
    // Finish the interrupted enumeration: the same cursor and queues carry on
    let mut rounds = 0;
    while !tc.finished() {
        rounds += 1;
        assert!(rounds < 10_000, "enumeration failed to converge");
        let mut checks = 0;
        tc.run_until(move || {
            checks += 1;
            checks > 20
        })
        .unwrap();
    }
    assert_eq!(tc.number_of_classes().unwrap(), 120);
}

#[test]
fn reduce_is_idempotent_and_respects_the_congruence() {
    let mut tc = ToddCoxeter::new(Kind::TwoSided, s5()).unwrap();
    let words: [&[u32]; 6] = [
        &[],
        &[0],
        &[0, 1, 2, 3],
        &[3, 3, 2, 1],
        &[0, 1, 0, 1, 0, 1, 2],
        &[2, 2, 2, 2, 2],
    ];
    for u in words {
        let r = tc.reduce(u).unwrap();
        assert_eq!(tc.reduce(&r).unwrap(), r, "reduce is not idempotent on {u:?}");
        assert!(tc.contains(u, &r).unwrap());
        for v in words {
            let contains = tc.contains(u, v).unwrap();
            let reduce_eq = tc.reduce(u).unwrap() == tc.reduce(v).unwrap();
            assert_eq!(contains, reduce_eq, "containment mismatch for {u:?}, {v:?}");
        }
    }
}

#[test]
fn finished_graphs_are_confluent() {
    // On termination, every relator traces to the same node from every active node
    let mut tc = ToddCoxeter::new(Kind::TwoSided, s5()).unwrap();
    tc.run().unwrap();
    tc.standardize(Order::Shortlex).unwrap();
    let rules = tc.presentation().rules().to_vec();
    let n = tc.number_of_nodes_active();
    let graph = tc.current_word_graph();
    for i in 0..n {
        let node = quotient::Node(i as u32);
        for (u, v) in &rules {
            let end_u = wordgraph::follow_path(graph, node, u);
            let end_v = wordgraph::follow_path(graph, node, v);
            assert_ne!(end_u, quotient::UNDEFINED, "incomplete path at node {i}");
            assert_eq!(end_u, end_v, "relator unsatisfied at node {i}");
        }
    }
}

#[test]
fn index_word_bijection() {
    let mut tc = ToddCoxeter::new(Kind::TwoSided, s5()).unwrap();
    let n = tc.number_of_classes().unwrap();
    for index in 0..n {
        let w = tc.word_of(index).unwrap();
        assert_eq!(tc.index_of(&w).unwrap(), index);
    }
    assert_eq!(
        tc.word_of(n),
        Err(Error::IndexOutOfBounds { index: n, bound: n })
    );
}

#[test]
fn currently_contains_is_three_valued() {
    let p = presentation(2, &[(&[0, 0], &[0]), (&[0], &[1])], true);
    let mut tc = ToddCoxeter::new(Kind::TwoSided, p).unwrap();
    // Nothing has been traced yet
    assert_eq!(
        tc.currently_contains(&[0, 0], &[0]).unwrap(),
        Answer::Unknown
    );
    assert_eq!(tc.currently_contains(&[0], &[0]).unwrap(), Answer::True);
    tc.run().unwrap();
    assert_eq!(tc.currently_contains(&[0, 0], &[0]).unwrap(), Answer::True);
    assert_eq!(tc.currently_contains(&[0], &[]).unwrap(), Answer::False);
}

#[test]
fn standardisation_orders() {
    for order in [Order::Shortlex, Order::Lex, Order::Recursive] {
        let mut tc = ToddCoxeter::new(Kind::TwoSided, s5()).unwrap();
        tc.run().unwrap();
        tc.standardize(order).unwrap();
        assert!(tc.is_standardized(order));
        // Standardising twice is a no-op
        assert!(!tc.standardize(order).unwrap());
        // The quotient itself is untouched
        assert!(tc.contains(&[0, 0], &[]).unwrap());
    }
    let mut tc = ToddCoxeter::new(Kind::TwoSided, s5()).unwrap();
    assert_eq!(tc.standardize(Order::None), Err(Error::InvalidOrder));
}

#[test]
fn determinism_across_identical_engines() {
    let run = || {
        let mut tc = ToddCoxeter::new(Kind::TwoSided, s5()).unwrap();
        tc.run().unwrap();
        tc.standardize(Order::Shortlex).unwrap();
        tc.current_word_graph().clone()
    };
    assert_same_graph(&run(), &run(), 120);
}

#[test]
fn shrink_to_fit_compacts_only_when_finished() {
    let mut tc = ToddCoxeter::new(Kind::TwoSided, s5()).unwrap();
    tc.shrink_to_fit(); // unfinished: a silent no-op
    tc.run().unwrap();
    tc.shrink_to_fit();
    assert_eq!(tc.current_word_graph().num_nodes(), 120);
    assert_eq!(tc.number_of_classes().unwrap(), 120);
}

#[test]
fn precondition_errors() {
    let p = presentation(2, &[(&[0, 0], &[0])], false);
    let mut tc = ToddCoxeter::new(Kind::TwoSided, p.clone()).unwrap();
    assert!(matches!(
        tc.add_generating_pair(vec![0], vec![2]),
        Err(Error::LetterOutOfBounds {
            letter: 2,
            alphabet_size: 2
        })
    ));
    assert!(matches!(
        tc.add_generating_pair(vec![], vec![0]),
        Err(Error::EmptyWord)
    ));
    tc.run_for(std::time::Duration::from_millis(10)).unwrap();
    assert!(matches!(
        tc.add_generating_pair(vec![0], vec![1]),
        Err(Error::AlreadyStarted)
    ));

    // Composite strategies reject run_until
    let mut tc = ToddCoxeter::new(Kind::TwoSided, p).unwrap();
    tc.strategy(Strategy::CR);
    assert!(matches!(
        tc.run_until(|| false),
        Err(Error::UnsupportedStrategy { .. })
    ));

    // A flat rule list must pair up
    assert!(matches!(
        ToddCoxeter::from_flat_rules(Kind::TwoSided, 1, &[vec![0]], false),
        Err(Error::InvalidRule)
    ));

    // HLT has nothing to trace without relations or two-sided pairs
    let free = presentation(2, &[], false);
    let mut tc = ToddCoxeter::new(Kind::OneSided, free).unwrap();
    assert!(matches!(
        tc.run(),
        Err(Error::UnsupportedStrategy { .. }) | Err(Error::UnboundedEnumeration)
    ));
}

#[test]
fn one_sided_congruence() {
    // Right congruence on <a, b | ab = ba, aa = a, bb = b> generated by (a, b):
    // a small example whose one- and two-sided answers differ from the plain monoid
    let p = presentation(
        2,
        &[(&[0, 1], &[1, 0]), (&[0, 0], &[0]), (&[1, 1], &[1])],
        true,
    );
    let mut two = ToddCoxeter::new(Kind::TwoSided, p.clone()).unwrap();
    // The monoid itself: {e, a, b, ab}
    assert_eq!(two.number_of_classes().unwrap(), 4);

    let mut one = ToddCoxeter::new(Kind::OneSided, p).unwrap();
    one.add_generating_pair(vec![0], vec![1]).unwrap();
    // Identifying a with b on the right collapses {a, b, ab} together
    assert_eq!(one.number_of_classes().unwrap(), 2);
    assert!(one.contains(&[0], &[1]).unwrap());
    assert!(!one.contains(&[0], &[]).unwrap());
}

#[test]
fn lookbehind_and_explicit_lookahead() {
    let mut tc = ToddCoxeter::new(Kind::TwoSided, s5()).unwrap();
    tc.run().unwrap();
    let before = tc.number_of_nodes_active();
    tc.perform_lookahead(false).unwrap();
    assert_eq!(tc.number_of_nodes_active(), before);

    // Interrupt an enumeration, run a lookbehind pass over the partial graph, then
    // finish with HLT
    let mut tc = ToddCoxeter::new(Kind::TwoSided, s5()).unwrap();
    let mut checks = 0;
    tc.run_until(move || {
        checks += 1;
        checks > 30
    })
    .unwrap();
    assert!(!tc.finished());
    tc.strategy(Strategy::Lookbehind);
    tc.run().unwrap();
    assert!(!tc.finished());
    tc.strategy(Strategy::Hlt);
    assert_eq!(tc.number_of_classes().unwrap(), 120);

    // A caller-supplied reducer which changes nothing merges nothing
    let mut tc = ToddCoxeter::new(Kind::TwoSided, s5()).unwrap();
    tc.run().unwrap();
    let before = tc.number_of_nodes_active();
    tc.perform_lookbehind(|w| w.to_vec()).unwrap();
    assert_eq!(tc.number_of_nodes_active(), before);

    // The timed variants leave a finished graph untouched, and a deadline in the past
    // is tolerated (the pass just ends at its first cooperative point)
    tc.perform_lookahead_for(std::time::Duration::from_millis(50), false)
        .unwrap();
    tc.perform_lookbehind_for(std::time::Duration::ZERO, |w| w.to_vec())
        .unwrap();
    assert_eq!(tc.number_of_nodes_active(), before);
}

#[test]
fn stop_early_abandons_a_lookahead_with_a_low_kill_rate() {
    // A thousand self-loop nodes are all compatible with aa = a, so the sweep kills
    // nothing until it reaches the one violation at the tail of the active list.
    let quiet: u32 = 1000;
    let p = presentation(1, &[(&[0, 0], &[0])], true);
    let mut graph = SourceGraph::new(quiet as usize + 3, 1);
    for i in 0..quiet {
        graph.set_target(quotient::Node(i), 0, quotient::Node(i));
    }
    graph.set_target(quotient::Node(quiet), 0, quotient::Node(quiet + 1));
    graph.set_target(quotient::Node(quiet + 1), 0, quotient::Node(quiet + 2));
    graph.set_target(quotient::Node(quiet + 2), 0, quotient::Node(quiet + 2));

    // Sampling after every node against a kill-rate target no sweep can meet, the
    // heuristic must abandon the pass among the quiet nodes, leaving the violation
    // unmerged
    let mut tc = ToddCoxeter::with_word_graph(Kind::TwoSided, p.clone(), graph.clone()).unwrap();
    tc.lookahead_stop_early_interval(std::time::Duration::ZERO)
        .lookahead_stop_early_ratio(1.0);
    tc.perform_lookahead(true).unwrap();
    assert_eq!(tc.number_of_nodes_active(), quiet as usize + 3);

    // Without stop-early the same pass reaches the tail and merges the violating pair
    let mut tc = ToddCoxeter::with_word_graph(Kind::TwoSided, p, graph).unwrap();
    tc.perform_lookahead(false).unwrap();
    assert_eq!(tc.number_of_nodes_active(), quiet as usize + 2);
}

#[test]
fn from_engine_presents_the_quotient() {
    let p = presentation(2, &[], false);
    let mut tc = ToddCoxeter::new(Kind::TwoSided, p).unwrap();
    tc.add_generating_pair(vec![0, 0], vec![0]).unwrap();
    tc.add_generating_pair(vec![0], vec![1]).unwrap();
    let mut quotient_engine = ToddCoxeter::from_engine(Kind::TwoSided, &tc).unwrap();
    assert_eq!(quotient_engine.number_of_classes().unwrap(), 1);
}

#[test]
fn with_word_graph_resumes_a_partial_enumeration() {
    // Build the two-class graph for <a | aa = a> by hand and hand it over
    let p = presentation(1, &[(&[0, 0], &[0])], true);
    let mut graph = SourceGraph::new(2, 1);
    graph.set_target(quotient::Node(0), 0, quotient::Node(1));
    graph.set_target(quotient::Node(1), 0, quotient::Node(1));
    let mut tc = ToddCoxeter::with_word_graph(Kind::TwoSided, p, graph).unwrap();
    assert_eq!(tc.number_of_classes().unwrap(), 2);
    assert_eq!(tc.reduce(&[0, 0, 0]).unwrap(), vec![0]);
}

#[test]
fn reporter_receives_phase_events() {
    use quotient::report::Event;
    use std::sync::{Arc, Mutex};

    let events: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&events);
    let mut tc = ToddCoxeter::new(Kind::TwoSided, s5()).unwrap();
    tc.set_reporter(Arc::new(move |event| {
        let tag = match event {
            Event::PhaseStart(_) => "start",
            Event::PhaseStop(_) => "stop",
            Event::Progress(_) => "tick",
        };
        seen.lock().unwrap().push(tag);
    }));
    tc.run().unwrap();
    let events = events.lock().unwrap();
    assert!(events.contains(&"start"));
    assert!(events.contains(&"stop"));
}
