use std::collections::hash_map::{Entry, HashMap};
use std::hash::{BuildHasherDefault, Hash};

use cfgram::{Firsts, Grammar, PIdx, SIdx, Symbol};
use fnv::FnvHasher;
use num_traits::{AsPrimitive, PrimInt, Unsigned};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use vob::Vob;

/// The type of lookahead sets ("contexts"): a bitset over the grammar's
/// tokens (the EOF token included).
pub type Ctx = Vob;

/// A set of LR(1) items. Core-equal items (same production, same dot) are
/// stored as a single entry whose context is the union of their lookaheads,
/// so a state never holds two items differing only in lookahead.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Itemset<StorageT: Eq + Hash> {
    pub items: HashMap<(PIdx<StorageT>, SIdx<StorageT>), Ctx, BuildHasherDefault<FnvHasher>>,
}

impl<StorageT: 'static + Hash + PrimInt + Unsigned> Itemset<StorageT>
where
    usize: AsPrimitive<StorageT>,
{
    /// Create a blank Itemset.
    pub fn new() -> Self {
        Itemset {
            items: HashMap::with_hasher(BuildHasherDefault::<FnvHasher>::default()),
        }
    }

    /// Add an item `(pidx, dot)` with context `ctx` to this itemset. If a
    /// core-equal item is already present, `ctx` is unioned into its context
    /// instead. Returns true if this led to any change in the itemset.
    pub fn add(&mut self, pidx: PIdx<StorageT>, dot: SIdx<StorageT>, ctx: &Ctx) -> bool {
        match self.items.entry((pidx, dot)) {
            Entry::Occupied(mut e) => e.get_mut().or(ctx),
            Entry::Vacant(e) => {
                e.insert(ctx.clone());
                true
            }
        }
    }

    /// Create a new itemset which is a closed version of `self`.
    pub fn close(&self, grm: &Grammar<StorageT>, firsts: &Firsts<StorageT>) -> Self {
        // A typical description of this algorithm keeps a todo set of
        // (pidx, dot) pairs, but searching and resizing such a set is slow
        // and this function dominates table generation time. Two
        // observations cut the cost down:
        //   1) The initial todos are exactly self.items.keys(), so there is
        //      no point copying them anywhere.
        //   2) Every subsequently discovered item has dot 0, so those todos
        //      are fully described by which productions need (re)visiting: a
        //      fixed-size bitfield over productions suffices, and it also
        //      bounds the worklist, guaranteeing termination even when a
        //      merged item's lookahead grows and forces reprocessing.
        let mut cls = self.clone();

        let mut seed_keys = self.items.keys();
        let mut zero_todos = Vob::from_elem(false, usize::from(grm.prods_len()));
        let mut new_ctx = Vob::from_elem(false, usize::from(grm.tokens_len()));
        loop {
            let pidx;
            let dot;
            // Find the next todo item or, if there are none left, break: pump
            // the seed keys first, then fall back to the dot-0 bitfield.
            match seed_keys.next() {
                Some(&(x, y)) => {
                    pidx = x;
                    dot = y;
                }
                None => {
                    match zero_todos.iter_set_bits(..).next() {
                        Some(i) => pidx = PIdx(i.as_()),
                        None => break,
                    }
                    dot = SIdx(StorageT::zero());
                    zero_todos.set(usize::from(pidx), false);
                }
            }
            let prod = grm.prod(pidx);
            if usize::from(dot) == prod.len() {
                continue;
            }
            if let Symbol::Rule(ridx) = prod[usize::from(dot)] {
                // The context of the new dot-0 items is FIRST of everything
                // after the referenced rule; if that remainder is nullable,
                // the parent item's own context joins in. This models the
                // one-token lookahead exactly (canonical LR(1), not an
                // approximation).
                new_ctx.set_all(false);
                let mut nullable = true;
                for sym in prod.iter().skip(usize::from(dot) + 1) {
                    match *sym {
                        Symbol::Token(s_tidx) => {
                            new_ctx.set(usize::from(s_tidx), true);
                            nullable = false;
                            break;
                        }
                        Symbol::Rule(s_ridx) => {
                            new_ctx.or(firsts.firsts(s_ridx));
                            if !firsts.is_epsilon_set(s_ridx) {
                                nullable = false;
                                break;
                            }
                        }
                    }
                }
                if nullable {
                    new_ctx.or(&cls.items[&(pidx, dot)]);
                }

                for &s_pidx in grm.rule_to_prods(ridx).iter() {
                    if cls.add(s_pidx, SIdx(StorageT::zero()), &new_ctx) {
                        zero_todos.set(usize::from(s_pidx), true);
                    }
                }
            }
        }
        cls
    }

    /// Create a new itemset based on calculating the goto of `sym` on the
    /// current itemset: every item with `sym` immediately after its dot is
    /// advanced one position, carrying its context unchanged.
    pub fn goto(&self, grm: &Grammar<StorageT>, sym: &Symbol<StorageT>) -> Self {
        let mut nis = Itemset::new();
        for (&(pidx, dot), ctx) in &self.items {
            let prod = grm.prod(pidx);
            if usize::from(dot) == prod.len() {
                continue;
            }
            if sym == &prod[usize::from(dot)] {
                nis.add(pidx, SIdx((usize::from(dot) + 1).as_()), ctx);
            }
        }
        nis
    }
}
