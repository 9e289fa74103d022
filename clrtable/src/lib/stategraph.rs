use std::collections::hash_map::HashMap;
use std::fmt::Write;
use std::hash::Hash;

use cfgram::{Grammar, Symbol};
use num_traits::{AsPrimitive, PrimInt, Unsigned};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{itemset::Itemset, StIdx};

/// The canonical collection of LR(1) item sets for a grammar, along with the
/// goto transitions between them. States are closed item sets; no two states
/// are equal (cores and lookaheads both considered), which is what makes this
/// the canonical automaton rather than an LALR one.
#[derive(Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StateGraph<StorageT: Eq + Hash> {
    states: Vec<Itemset<StorageT>>,
    edges: Vec<HashMap<Symbol<StorageT>, StIdx>>,
}

impl<StorageT: 'static + Hash + PrimInt + Unsigned> StateGraph<StorageT>
where
    usize: AsPrimitive<StorageT>,
{
    pub(crate) fn new(
        states: Vec<Itemset<StorageT>>,
        edges: Vec<HashMap<Symbol<StorageT>, StIdx>>,
    ) -> Self {
        debug_assert_eq!(states.len(), edges.len());
        // States are indexed by StIdx, so the state count must fit in one.
        assert!(states.len() - 1 <= usize::from(StIdx::max_value()));
        StateGraph { states, edges }
    }

    /// The automaton's start state. By construction this is always the state
    /// numbered 0.
    pub fn start_state(&self) -> StIdx {
        StIdx::from(0usize)
    }

    /// Return the itemset for state `stidx` or panic if it doesn't exist.
    pub fn state(&self, stidx: StIdx) -> &Itemset<StorageT> {
        &self.states[usize::from(stidx)]
    }

    /// Return an iterator over all states in this `StateGraph`.
    pub fn iter_states(&self) -> impl Iterator<Item = &Itemset<StorageT>> {
        self.states.iter()
    }

    /// Return an iterator over all state indices in this `StateGraph`.
    pub fn iter_stidxs(&self) -> impl Iterator<Item = StIdx> {
        (0..self.states.len()).map(StIdx::from)
    }

    /// How many states does this `StateGraph` have?
    pub fn all_states_len(&self) -> usize {
        self.states.len()
    }

    /// Return the state pointed to by `sym` from `stidx` or `None` otherwise.
    pub fn edge(&self, stidx: StIdx, sym: Symbol<StorageT>) -> Option<StIdx> {
        self.edges
            .get(usize::from(stidx))
            .and_then(|x| x.get(&sym))
            .copied()
    }

    /// Return the edges for state `stidx` or panic if it doesn't exist.
    pub fn edges(&self, stidx: StIdx) -> &HashMap<Symbol<StorageT>, StIdx> {
        &self.edges[usize::from(stidx)]
    }

    /// How many edges does this `StateGraph` have?
    pub fn all_edges_len(&self) -> usize {
        self.edges.iter().map(|x| x.len()).sum()
    }

    /// Pretty print the state graph. Items within a state are ordered by
    /// (production, dot) and edges by symbol, so the output for a given
    /// grammar is identical from run to run.
    pub fn pp(&self, grm: &Grammar<StorageT>) -> String {
        let pp_sym = |sym: &Symbol<StorageT>| match *sym {
            Symbol::Rule(ridx) => grm.rule_name(ridx).to_string(),
            Symbol::Token(tidx) => match grm.token_name(tidx) {
                Some(n) => format!("'{}'", n),
                None => "'$'".to_string(),
            },
        };

        let mut s = String::new();
        for stidx in self.iter_stidxs() {
            writeln!(s, "{}:", usize::from(stidx)).ok();

            let mut items = self
                .state(stidx)
                .items
                .iter()
                .collect::<Vec<_>>();
            items.sort_by_key(|&(&(pidx, dot), _)| (usize::from(pidx), usize::from(dot)));
            for (&(pidx, dot), ctx) in items {
                let prod = grm.prod(pidx);
                let mut syms = Vec::with_capacity(prod.len() + 1);
                for (i, sym) in prod.iter().enumerate() {
                    if i == usize::from(dot) {
                        syms.push(".".to_string());
                    }
                    syms.push(pp_sym(sym));
                }
                if usize::from(dot) == prod.len() {
                    syms.push(".".to_string());
                }
                let las = ctx
                    .iter_set_bits(..)
                    .map(|i| match grm.token_name(cfgram::TIdx(i.as_())) {
                        Some(n) => format!("'{}'", n),
                        None => "'$'".to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                writeln!(
                    s,
                    "   [{} -> {}, {{{}}}]",
                    grm.rule_name(grm.prod_to_rule(pidx)),
                    syms.join(" "),
                    las
                )
                .ok();
            }

            let mut edges = self.edges(stidx).iter().collect::<Vec<_>>();
            edges.sort_by_key(|&(sym, _)| match *sym {
                Symbol::Rule(ridx) => (0, usize::from(ridx)),
                Symbol::Token(tidx) => (1, usize::from(tidx)),
            });
            for (sym, to_stidx) in edges {
                writeln!(s, "   {} -> {}", pp_sym(sym), usize::from(*to_stidx)).ok();
            }
        }
        s
    }
}

/// Assert that the item `(rule rn, production prod_off, dot)` exists in `is`
/// with exactly the lookaheads `la` ("$" meaning the EOF token).
#[cfg(test)]
pub(crate) fn state_exists<StorageT: 'static + std::fmt::Debug + Hash + PrimInt + Unsigned>(
    grm: &Grammar<StorageT>,
    is: &Itemset<StorageT>,
    rn: &str,
    prod_off: usize,
    dot: cfgram::SIdx<StorageT>,
    la: &[&str],
) where
    usize: AsPrimitive<StorageT>,
{
    let ab_prod_off = grm.rule_to_prods(grm.rule_idx(rn).unwrap())[prod_off];
    let ctx = match is.items.get(&(ab_prod_off, dot)) {
        Some(x) => x,
        None => panic!(
            "itemset has no item ({}.{}, {:?})",
            rn,
            prod_off,
            usize::from(dot)
        ),
    };
    for tidx in grm.iter_tidxs() {
        let bit = ctx[usize::from(tidx)];
        let mut found = false;
        for t in la.iter() {
            let off = if *t == "$" {
                grm.eof_token_idx()
            } else {
                grm.token_idx(t).unwrap()
            };
            if off == tidx {
                found = true;
                break;
            }
        }
        if bit && !found {
            panic!(
                "itemset item ({}.{}, {:?}) has extra lookahead {:?}",
                rn,
                prod_off,
                usize::from(dot),
                grm.token_name(tidx).unwrap_or("$")
            );
        } else if !bit && found {
            panic!(
                "itemset item ({}.{}, {:?}) is missing lookahead {:?}",
                rn,
                prod_off,
                usize::from(dot),
                grm.token_name(tidx).unwrap_or("$")
            );
        }
    }
}
