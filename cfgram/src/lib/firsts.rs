use std::marker::PhantomData;

use num_traits::{AsPrimitive, PrimInt, Unsigned};
use vob::Vob;

use crate::{Grammar, RIdx, Symbol, TIdx};

/// `Firsts` stores all the FIRST sets for a given grammar. For example, given
/// the grammar:
/// ```text
///   S -> A 'b'
///   A -> 'a' | epsilon
/// ```
/// the following assertions (and only the following assertions) about the
/// FIRST sets are correct:
/// ```text
///   assert!(firsts.is_set(grm.rule_idx("S").unwrap(), grm.token_idx("a").unwrap()));
///   assert!(firsts.is_set(grm.rule_idx("S").unwrap(), grm.token_idx("b").unwrap()));
///   assert!(firsts.is_set(grm.rule_idx("A").unwrap(), grm.token_idx("a").unwrap()));
///   assert!(firsts.is_epsilon_set(grm.rule_idx("A").unwrap()));
/// ```
/// FIRST of a token is, by definition, the token itself and is not stored.
/// Epsilon-derivability is tracked separately from the token bitsets and is
/// only queryable through [`is_epsilon_set`](#method.is_epsilon_set).
#[derive(Debug)]
pub struct Firsts<StorageT> {
    firsts: Vec<Vob>,
    epsilons: Vob,
    phantom: PhantomData<StorageT>,
}

impl<StorageT: 'static + PrimInt + Unsigned> Firsts<StorageT>
where
    usize: AsPrimitive<StorageT>,
{
    /// Generate and return the FIRST sets for the given grammar.
    pub fn new(grm: &Grammar<StorageT>) -> Self {
        let mut firsts = Firsts {
            firsts: vec![
                Vob::from_elem(false, usize::from(grm.tokens_len()));
                usize::from(grm.rules_len())
            ],
            epsilons: Vob::from_elem(false, usize::from(grm.rules_len())),
            phantom: PhantomData,
        };

        // Loop looking for changes to the FIRST sets until we reach a fixed
        // point. In essence, we look at each rule E and see if any of the
        // rules at the start of its productions have new elements in since we
        // last looked. If they do, we'll have to do another round.
        loop {
            let mut changed = false;
            for ridx in grm.iter_rules() {
                for &pidx in grm.rule_to_prods(ridx).iter() {
                    let prod = grm.prod(pidx);
                    // Walk the leading symbols of the production for as long
                    // as they are epsilon-derivable. An empty production
                    // leaves the walk vacuously nullable.
                    let mut nullable = true;
                    for sym in prod.iter() {
                        match *sym {
                            Symbol::Token(s_tidx) => {
                                if !firsts.set(ridx, s_tidx) {
                                    changed = true;
                                }
                                nullable = false;
                                break;
                            }
                            Symbol::Rule(s_ridx) => {
                                // Union the referenced rule's FIRSTs into this
                                // rule's. Note this is (intentionally) a no-op
                                // if the two rules are one and the same.
                                for tidx in grm.iter_tidxs() {
                                    if firsts.is_set(s_ridx, tidx) && !firsts.set(ridx, tidx) {
                                        changed = true;
                                    }
                                }
                                if !firsts.is_epsilon_set(s_ridx) {
                                    nullable = false;
                                    break;
                                }
                            }
                        }
                    }
                    if nullable && !firsts.is_epsilon_set(ridx) {
                        firsts.epsilons.set(usize::from(ridx), true);
                        changed = true;
                    }
                }
            }
            if !changed {
                return firsts;
            }
        }
    }

    /// Return all the firsts for rule `ridx` as a token bitset.
    pub fn firsts(&self, ridx: RIdx<StorageT>) -> &Vob {
        &self.firsts[usize::from(ridx)]
    }

    /// Returns true if the token `tidx` is in the first set for rule `ridx`.
    pub fn is_set(&self, ridx: RIdx<StorageT>, tidx: TIdx<StorageT>) -> bool {
        self.firsts[usize::from(ridx)][usize::from(tidx)]
    }

    /// Returns true if rule `ridx` can derive the empty string.
    pub fn is_epsilon_set(&self, ridx: RIdx<StorageT>) -> bool {
        self.epsilons[usize::from(ridx)]
    }

    /// Ensure that the firsts bit for token `tidx` of rule `ridx` is set.
    /// Returns true if it was already set, false otherwise.
    fn set(&mut self, ridx: RIdx<StorageT>, tidx: TIdx<StorageT>) -> bool {
        let r = &mut self.firsts[usize::from(ridx)];
        if r[usize::from(tidx)] {
            true
        } else {
            r.set(usize::from(tidx), true);
            false
        }
    }
}
