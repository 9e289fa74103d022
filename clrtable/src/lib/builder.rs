use std::collections::hash_map::HashMap;
use std::collections::VecDeque;
use std::hash::{Hash, Hasher};

use cfgram::{Firsts, Grammar, RIdx, SIdx, Symbol, TIdx};
use fnv::FnvHasher;
use num_traits::{AsPrimitive, PrimInt, Unsigned};
use vob::Vob;

use crate::{itemset::Itemset, stategraph::StateGraph, StIdx};

/// Build the canonical collection of closed LR(1) item sets for `grm`,
/// starting from the item `^ -> . <start rule>` with lookahead EOF.
///
/// States are deduplicated by full itemset equality: same cores with
/// different lookaheads are distinct states. A hash of each itemset is used
/// to prefilter the (potentially expensive) equality checks.
///
/// States are numbered in breadth-first discovery order, and a state's
/// outgoing symbols are visited rules-first in ascending index order, so the
/// automaton for a given grammar is identical from run to run.
pub(crate) fn build_stategraph<StorageT: 'static + Hash + PrimInt + Unsigned>(
    grm: &Grammar<StorageT>,
    firsts: &Firsts<StorageT>,
) -> StateGraph<StorageT>
where
    usize: AsPrimitive<StorageT>,
{
    let mut states = Vec::new();
    let mut edges: Vec<HashMap<Symbol<StorageT>, StIdx>> = Vec::new();
    // Maps an itemset hash to the states with that hash. Candidate states
    // only need comparing against the (almost always empty or singleton)
    // bucket their hash lands in.
    let mut by_hash: HashMap<u64, Vec<StIdx>> = HashMap::new();
    let mut todo = VecDeque::new();

    let mut la = Vob::from_elem(false, usize::from(grm.tokens_len()));
    la.set(usize::from(grm.eof_token_idx()), true);
    let mut seed = Itemset::new();
    seed.add(grm.start_prod(), SIdx(StorageT::zero()), &la);
    let state0 = seed.close(grm, firsts);
    by_hash
        .entry(itemset_hash(&state0))
        .or_default()
        .push(StIdx::from(0usize));
    states.push(state0);
    edges.push(HashMap::new());
    todo.push_back(StIdx::from(0usize));

    // Bitfields over rules and tokens keep the symbol collection allocation
    // free and, read back in index order, give the deterministic visit order.
    let mut seen_rules = Vob::from_elem(false, usize::from(grm.rules_len()));
    let mut seen_tokens = Vob::from_elem(false, usize::from(grm.tokens_len()));
    while let Some(stidx) = todo.pop_front() {
        seen_rules.set_all(false);
        seen_tokens.set_all(false);
        for &(pidx, dot) in states[usize::from(stidx)].items.keys() {
            let prod = grm.prod(pidx);
            if usize::from(dot) == prod.len() {
                continue;
            }
            match prod[usize::from(dot)] {
                Symbol::Rule(s_ridx) => {
                    seen_rules.set(usize::from(s_ridx), true);
                }
                Symbol::Token(s_tidx) => {
                    seen_tokens.set(usize::from(s_tidx), true);
                }
            }
        }
        let syms = seen_rules
            .iter_set_bits(..)
            .map(|i| Symbol::Rule(RIdx(i.as_())))
            .chain(
                seen_tokens
                    .iter_set_bits(..)
                    .map(|i| Symbol::Token(TIdx(i.as_()))),
            )
            .collect::<Vec<_>>();

        for sym in syms {
            let nis = states[usize::from(stidx)]
                .goto(grm, &sym)
                .close(grm, firsts);
            let bucket = by_hash.entry(itemset_hash(&nis)).or_default();
            let mut nstidx = None;
            for &cnd_stidx in bucket.iter() {
                if states[usize::from(cnd_stidx)] == nis {
                    nstidx = Some(cnd_stidx);
                    break;
                }
            }
            let nstidx = match nstidx {
                Some(x) => x,
                None => {
                    let x = StIdx::from(states.len());
                    bucket.push(x);
                    states.push(nis);
                    edges.push(HashMap::new());
                    todo.push_back(x);
                    x
                }
            };
            edges[usize::from(stidx)].insert(sym, nstidx);
        }
    }

    StateGraph::new(states, edges)
}

/// Hash an itemset such that equal itemsets (per `PartialEq`) hash equally,
/// whatever order their internal HashMap happens to iterate in.
fn itemset_hash<StorageT: 'static + Hash + PrimInt + Unsigned>(is: &Itemset<StorageT>) -> u64
where
    usize: AsPrimitive<StorageT>,
{
    let mut keys = is.items.keys().collect::<Vec<_>>();
    keys.sort_by_key(|&&(pidx, dot)| (usize::from(pidx), usize::from(dot)));
    let mut hasher = FnvHasher::default();
    for &(pidx, dot) in keys {
        usize::from(pidx).hash(&mut hasher);
        usize::from(dot).hash(&mut hasher);
        // The Vob implementation guarantees that the last block's unused
        // bits are zeroed out, so equal contexts hash equal storage.
        for blk in is.items[&(pidx, dot)].iter_storage() {
            blk.hash(&mut hasher);
        }
    }
    hasher.finish()
}

#[cfg(test)]
mod test {
    use super::build_stategraph;
    use crate::stategraph::state_exists;
    use cfgram::{Grammar, SIdx, Symbol};

    fn grammar3() -> Grammar {
        Grammar::new(
            &[
                ("S", &["S", "b"]),
                ("S", &["b", "A", "a"]),
                ("A", &["a", "S", "c"]),
                ("A", &["a"]),
                ("A", &["a", "S", "b"]),
            ],
            "S",
            &["a", "b", "c", "d"],
        )
        .unwrap()
    }

    #[test]
    fn test_stategraph_basics() {
        let grm = grammar3();
        let firsts = grm.firsts();
        let sg = build_stategraph(&grm, &firsts);

        assert_eq!(usize::from(sg.start_state()), 0);
        let s0 = sg.state(sg.start_state());
        state_exists(&grm, s0, "^", 0, SIdx(0), &["$"]);
        state_exists(&grm, s0, "S", 0, SIdx(0), &["b", "$"]);
        state_exists(&grm, s0, "S", 1, SIdx(0), &["b", "$"]);

        // The only edges out of the start state are on S and 'b'.
        assert_eq!(sg.edges(sg.start_state()).len(), 2);
        let s1 = sg
            .edge(sg.start_state(), Symbol::Rule(grm.rule_idx("S").unwrap()))
            .unwrap();
        state_exists(&grm, sg.state(s1), "^", 0, SIdx(1), &["$"]);
        state_exists(&grm, sg.state(s1), "S", 0, SIdx(1), &["b", "$"]);
        let s2 = sg
            .edge(
                sg.start_state(),
                Symbol::Token(grm.token_idx("b").unwrap()),
            )
            .unwrap();
        state_exists(&grm, sg.state(s2), "S", 1, SIdx(1), &["b", "$"]);
        assert!(sg
            .edge(
                sg.start_state(),
                Symbol::Token(grm.token_idx("a").unwrap()),
            )
            .is_none());
    }

    #[test]
    fn test_lookaheads_differentiate_states() {
        // An LALR construction would merge the states reached by "a c" and
        // "b c" (equal cores), manufacturing two reduce/reduce conflicts.
        // The canonical construction keeps them apart.
        let grm = Grammar::new(
            &[
                ("S", &["a", "A", "d"]),
                ("S", &["b", "B", "d"]),
                ("S", &["a", "B", "e"]),
                ("S", &["b", "A", "e"]),
                ("A", &["c"]),
                ("B", &["c"]),
            ],
            "S",
            &["a", "b", "c", "d", "e"],
        )
        .unwrap();
        let firsts = grm.firsts();
        let sg = build_stategraph(&grm, &firsts);

        let a = grm.token_idx("a").unwrap();
        let b = grm.token_idx("b").unwrap();
        let c = grm.token_idx("c").unwrap();
        let s_a = sg.edge(sg.start_state(), Symbol::Token(a)).unwrap();
        let s_b = sg.edge(sg.start_state(), Symbol::Token(b)).unwrap();
        let s_ac = sg.edge(s_a, Symbol::Token(c)).unwrap();
        let s_bc = sg.edge(s_b, Symbol::Token(c)).unwrap();

        assert_ne!(s_ac, s_bc);
        state_exists(&grm, sg.state(s_ac), "A", 0, SIdx(1), &["d"]);
        state_exists(&grm, sg.state(s_ac), "B", 0, SIdx(1), &["e"]);
        state_exists(&grm, sg.state(s_bc), "A", 0, SIdx(1), &["e"]);
        state_exists(&grm, sg.state(s_bc), "B", 0, SIdx(1), &["d"]);
    }

    #[test]
    fn test_deterministic_construction() {
        let grm = grammar3();
        let firsts = grm.firsts();
        let sg1 = build_stategraph(&grm, &firsts);
        let sg2 = build_stategraph(&grm, &firsts);
        assert_eq!(sg1.all_states_len(), sg2.all_states_len());
        assert_eq!(sg1.pp(&grm), sg2.pp(&grm));
    }
}
