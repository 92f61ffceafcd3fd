//! Scenarios for the Stephen construction.

use quotient::{stephen, InversePresentation, Presentation, Stephen, Word};

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

#[test]
fn idempotents_with_braid_square() {
    // <a, b | a^2 = a, b^2 = b, (ab)^2 = (ba)^2> with w = ab.  The class of ab is
    // exactly { a^i b^j : i, j >= 1 }, so ba is not accepted and every left factor is
    // of the form a^i or a^i b^j.
    let p = presentation(
        2,
        &[
            (&[0, 0], &[0]),
            (&[1, 1], &[1]),
            (&[0, 1, 0, 1], &[1, 0, 1, 0]),
        ],
        false,
    );
    let mut s = Stephen::new(p).unwrap();
    s.set_word(vec![0, 1]).unwrap();
    assert!(stephen::accepts(&mut s, &[0, 1]).unwrap());
    assert!(stephen::accepts(&mut s, &[0, 0, 1, 1]).unwrap());
    assert!(!stephen::accepts(&mut s, &[1, 0]).unwrap());
    assert!(stephen::is_left_factor(&mut s, &[0]).unwrap());
    assert!(!stephen::is_left_factor(&mut s, &[1]).unwrap());

    let factors: Vec<Word> = stephen::left_factors(&mut s).unwrap().take(5).collect();
    assert_eq!(
        factors,
        vec![
            vec![],
            vec![0],
            vec![0, 0],
            vec![0, 1],
            vec![0, 0, 0],
        ]
    );
}

#[test]
fn commuting_idempotents_accept_both_orders() {
    // In the semilattice <a, b | a^2 = a, b^2 = b, ab = ba>, the class of ab is every
    // word containing both letters, so all words are left factors
    let p = presentation(
        2,
        &[(&[0, 0], &[0]), (&[1, 1], &[1]), (&[0, 1], &[1, 0])],
        false,
    );
    let mut s = Stephen::new(p).unwrap();
    s.set_word(vec![0, 1]).unwrap();
    assert!(stephen::accepts(&mut s, &[0, 1]).unwrap());
    assert!(stephen::accepts(&mut s, &[1, 0]).unwrap());
    assert!(stephen::accepts(&mut s, &[1, 0, 1, 0, 1]).unwrap());
    assert!(!stephen::accepts(&mut s, &[0]).unwrap());
    assert!(stephen::is_left_factor(&mut s, &[1]).unwrap());

    let factors: Vec<Word> = stephen::left_factors(&mut s).unwrap().take(7).collect();
    assert_eq!(
        factors,
        vec![
            vec![],
            vec![0],
            vec![1],
            vec![0, 0],
            vec![0, 1],
            vec![1, 0],
            vec![1, 1],
        ]
    );

    let accepted: Vec<Word> = stephen::words_accepted(&mut s).unwrap().take(2).collect();
    assert_eq!(accepted, vec![vec![0, 1], vec![1, 0]]);
}

#[test]
fn accepted_language_is_the_class() {
    // Property: x is accepted iff x is congruent to the fixed word.  Cross-check a few
    // words against the coset enumerator over the same presentation
    use quotient::{Kind, ToddCoxeter};

    let p = presentation(
        2,
        &[(&[0, 0], &[0]), (&[1, 1], &[1]), (&[0, 1], &[1, 0])],
        false,
    );
    let mut s = Stephen::new(p.clone()).unwrap();
    s.set_word(vec![0, 1]).unwrap();
    let mut tc = ToddCoxeter::new(Kind::TwoSided, p).unwrap();
    let words: [&[u32]; 6] = [
        &[0],
        &[1],
        &[0, 1],
        &[1, 0],
        &[0, 0, 1],
        &[1, 1, 0, 0],
    ];
    for w in words {
        assert_eq!(
            stephen::accepts(&mut s, w).unwrap(),
            tc.contains(w, &[0, 1]).unwrap(),
            "acceptance mismatch for {w:?}"
        );
    }
}

#[test]
fn empty_relator_side() {
    // <a | aa = empty>, w = a: the endpoint of aa merges with the start node, giving
    // the two-node graph of the cyclic group of order 2
    let p = presentation(1, &[(&[0, 0], &[])], true);
    let mut s = Stephen::new(p).unwrap();
    s.set_word(vec![0]).unwrap();
    assert!(stephen::accepts(&mut s, &[0]).unwrap());
    assert!(stephen::accepts(&mut s, &[0, 0, 0]).unwrap());
    assert!(!stephen::accepts(&mut s, &[0, 0]).unwrap());
    assert_eq!(s.word_graph().num_nodes(), 2);
}

#[test]
fn inverse_presentation_gives_schutzenberger_graph() {
    // Free inverse monoid on one generator a with inverse A; w = aA.  The graph is
    // closed under edge reversal, so it is the Munn tree of aA: two nodes with the
    // accept state back at the root
    let p = presentation(2, &[], true);
    let ip = InversePresentation::new(p, vec![1, 0]).unwrap();
    let mut s = Stephen::new_inverse(ip).unwrap();
    s.set_word(vec![0, 1]).unwrap();
    assert!(stephen::accepts(&mut s, &[0, 1]).unwrap());
    assert!(!stephen::accepts(&mut s, &[0]).unwrap());
    assert_eq!(s.word_graph().num_nodes(), 2);
}

#[test]
fn rerunning_after_set_word() {
    let p = presentation(
        2,
        &[(&[0, 0], &[0]), (&[1, 1], &[1]), (&[0, 1], &[1, 0])],
        false,
    );
    let mut s = Stephen::new(p).unwrap();
    s.set_word(vec![0]).unwrap();
    assert!(stephen::accepts(&mut s, &[0, 0]).unwrap());
    assert!(!stephen::accepts(&mut s, &[0, 1]).unwrap());

    // Choosing a new word discards the previous graph
    s.set_word(vec![0, 1]).unwrap();
    assert!(!s.finished());
    assert!(stephen::accepts(&mut s, &[1, 0]).unwrap());
}
