//! Build action and goto tables from a [`StateGraph`].

use std::hash::Hash;

use cfgram::{Grammar, PIdx, RIdx, Symbol, TIdx};
use num_traits::{AsPrimitive, PrimInt, Unsigned};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{stategraph::StateGraph, StIdx};

// Action cells are encoded as `payload << 2 | tag`. An empty cell is all
// zeroes, so a freshly allocated table is all-error.
const ACTION_TAG_MASK: usize = 0b11;
const SHIFT: usize = 1;
const REDUCE: usize = 2;
const ERROR: usize = 0;

/// The action to take when encountering a token in a given state.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Action<StorageT> {
    /// Shift the token and move to the given state.
    Shift(StIdx),
    /// Reduce by the given production. Reducing by production 0 on the EOF
    /// token is acceptance.
    Reduce(PIdx<StorageT>),
    /// A parse error.
    Error,
}

/// A conflict detected (and resolved) while filling in the action table.
/// Conflicts do not stop table construction: the resolution below is applied
/// and the conflict recorded.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Conflict<StorageT> {
    /// A shift/reduce conflict: the shift was kept, the reduce by `pidx`
    /// dropped.
    ShiftReduce {
        stidx: StIdx,
        tidx: TIdx<StorageT>,
        pidx: PIdx<StorageT>,
    },
    /// A reduce/reduce conflict: the reduce by the later-numbered production
    /// `kept` replaced the earlier reduce by `dropped`.
    ReduceReduce {
        stidx: StIdx,
        tidx: TIdx<StorageT>,
        kept: PIdx<StorageT>,
        dropped: PIdx<StorageT>,
    },
}

impl<StorageT: 'static + Hash + PrimInt + Unsigned> Conflict<StorageT>
where
    usize: AsPrimitive<StorageT>,
{
    /// Pretty print this conflict, naming tokens and productions per `grm`.
    pub fn pp(&self, grm: &Grammar<StorageT>) -> String {
        match *self {
            Conflict::ShiftReduce { stidx, tidx, pidx } => format!(
                "Shift/Reduce in state {} on '{}': shift kept, reduce ({}) dropped",
                usize::from(stidx),
                grm.token_name(tidx).unwrap_or("$"),
                grm.pp_production(pidx)
            ),
            Conflict::ReduceReduce {
                stidx,
                tidx,
                kept,
                dropped,
            } => format!(
                "Reduce/Reduce in state {} on '{}': ({}) kept, ({}) dropped",
                usize::from(stidx),
                grm.token_name(tidx).unwrap_or("$"),
                grm.pp_production(kept),
                grm.pp_production(dropped)
            ),
        }
    }
}

/// A parser's action and goto tables, indexed by (state, token) and
/// (state, rule) respectively.
#[derive(Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StateTable<StorageT> {
    actions: Vec<usize>,
    gotos: Vec<StIdx>,
    states_len: usize,
    rules_len: usize,
    prods_len: usize,
    tokens_len: usize,
    final_state: StIdx,
    conflicts: Vec<Conflict<StorageT>>,
    sr_conflicts: usize,
    rr_conflicts: usize,
}

impl<StorageT: 'static + Hash + PrimInt + Unsigned> StateTable<StorageT>
where
    usize: AsPrimitive<StorageT>,
{
    pub fn new(grm: &Grammar<StorageT>, sg: &StateGraph<StorageT>) -> Self {
        let states_len = sg.all_states_len();
        let tokens_len = usize::from(grm.tokens_len());
        let rules_len = usize::from(grm.rules_len());
        // Shift and reduce payloads lose 2 bits to the action tag.
        assert!(states_len < usize::MAX >> 2);
        assert!(usize::from(grm.prods_len()) < usize::MAX >> 2);

        let mut actions = vec![ERROR; states_len * tokens_len];
        let mut gotos = vec![StIdx::max_value(); states_len * rules_len];
        let mut conflicts = Vec::new();
        let mut sr_conflicts = 0;
        let mut rr_conflicts = 0;
        let mut final_state = StIdx::max_value();

        for stidx in sg.iter_stidxs() {
            // Shifts and gotos come straight off the state's edges. The edges
            // live in a HashMap, so order them by symbol before processing;
            // not needed for the table cells themselves (each edge touches a
            // distinct cell) but it keeps debug output stable.
            let mut edges = sg.edges(stidx).iter().collect::<Vec<_>>();
            edges.sort_by_key(|&(sym, _)| match *sym {
                Symbol::Rule(ridx) => (0, usize::from(ridx)),
                Symbol::Token(tidx) => (1, usize::from(tidx)),
            });
            for (sym, &ref_stidx) in edges {
                match *sym {
                    Symbol::Rule(s_ridx) => {
                        let off = usize::from(stidx) * rules_len + usize::from(s_ridx);
                        debug_assert_eq!(gotos[off], StIdx::max_value());
                        gotos[off] = ref_stidx;
                    }
                    Symbol::Token(s_tidx) => {
                        let off = usize::from(stidx) * tokens_len + usize::from(s_tidx);
                        debug_assert_eq!(actions[off] & ACTION_TAG_MASK, ERROR);
                        actions[off] = usize::from(ref_stidx) << 2 | SHIFT;
                    }
                }
            }

            // Reduces come from the state's final items. Ordering them by
            // production index makes conflict resolution deterministic: when
            // two reduces compete for a cell, the later-numbered production
            // is the one processed second, and it wins.
            let mut final_items = sg
                .state(stidx)
                .items
                .iter()
                .filter(|&(&(pidx, dot), _)| usize::from(dot) == grm.prod(pidx).len())
                .collect::<Vec<_>>();
            final_items.sort_by_key(|&(&(pidx, _), _)| usize::from(pidx));
            for (&(pidx, _), ctx) in final_items {
                for tidx_off in ctx.iter_set_bits(..) {
                    let tidx = TIdx(tidx_off.as_());
                    if pidx == grm.start_prod() && tidx == grm.eof_token_idx() {
                        final_state = stidx;
                    }
                    let off = usize::from(stidx) * tokens_len + tidx_off;
                    match decode(actions[off]) {
                        Action::Error => {
                            actions[off] = usize::from(pidx) << 2 | REDUCE;
                        }
                        Action::Shift(_) => {
                            conflicts.push(Conflict::ShiftReduce { stidx, tidx, pidx });
                            sr_conflicts += 1;
                        }
                        Action::Reduce(r_pidx) => {
                            conflicts.push(Conflict::ReduceReduce {
                                stidx,
                                tidx,
                                kept: pidx,
                                dropped: r_pidx,
                            });
                            rr_conflicts += 1;
                            actions[off] = usize::from(pidx) << 2 | REDUCE;
                        }
                    }
                }
            }
        }
        debug_assert_ne!(final_state, StIdx::max_value());

        StateTable {
            actions,
            gotos,
            states_len,
            rules_len,
            prods_len: usize::from(grm.prods_len()),
            tokens_len,
            final_state,
            conflicts,
            sr_conflicts,
            rr_conflicts,
        }
    }

    /// Return the action for `stidx` and token `tidx`.
    pub fn action(&self, stidx: StIdx, tidx: TIdx<StorageT>) -> Action<StorageT> {
        decode(self.actions[usize::from(stidx) * self.tokens_len + usize::from(tidx)])
    }

    /// Return the goto state for `stidx` and rule `ridx`, or `None` if there
    /// isn't one.
    pub fn goto(&self, stidx: StIdx, ridx: RIdx<StorageT>) -> Option<StIdx> {
        let st = self.gotos[usize::from(stidx) * self.rules_len + usize::from(ridx)];
        if st == StIdx::max_value() {
            None
        } else {
            Some(st)
        }
    }

    /// The state in which reducing by production 0 on EOF accepts the input.
    pub fn final_state(&self) -> StIdx {
        self.final_state
    }

    /// The conflicts detected during construction, in the deterministic
    /// order they were resolved in. Empty for a conflict-free grammar.
    pub fn conflicts(&self) -> &[Conflict<StorageT>] {
        &self.conflicts
    }

    /// How many shift/reduce conflicts were resolved?
    pub fn sr_conflicts_len(&self) -> usize {
        self.sr_conflicts
    }

    /// How many reduce/reduce conflicts were resolved?
    pub fn rr_conflicts_len(&self) -> usize {
        self.rr_conflicts
    }

    pub fn states_len(&self) -> usize {
        self.states_len
    }

    pub fn rules_len(&self) -> usize {
        self.rules_len
    }

    pub fn prods_len(&self) -> usize {
        self.prods_len
    }

    pub fn tokens_len(&self) -> usize {
        self.tokens_len
    }
}

fn decode<StorageT: 'static + PrimInt + Unsigned>(v: usize) -> Action<StorageT>
where
    usize: AsPrimitive<StorageT>,
{
    match v & ACTION_TAG_MASK {
        SHIFT => Action::Shift(StIdx::from(v >> 2)),
        REDUCE => Action::Reduce(PIdx((v >> 2).as_())),
        _ => Action::Error,
    }
}

#[cfg(test)]
mod test {
    use super::{Action, Conflict};
    use crate::from_grammar;
    use cfgram::{Grammar, Symbol, EPSILON};

    // Expr : Term '-' Expr | Term;
    // Term : Factor '*' Term | Factor;
    // Factor : 'id';
    fn arith_grammar() -> Grammar {
        Grammar::new(
            &[
                ("Expr", &["Term", "-", "Expr"]),
                ("Expr", &["Term"]),
                ("Term", &["Factor", "*", "Term"]),
                ("Term", &["Factor"]),
                ("Factor", &["id"]),
            ],
            "Expr",
            &["-", "*", "id"],
        )
        .unwrap()
    }

    #[test]
    fn test_statetable() {
        let grm = arith_grammar();
        let (sg, st) = from_grammar(&grm);
        assert!(st.conflicts().is_empty());
        assert_eq!(st.states_len(), sg.all_states_len());
        assert_eq!(st.tokens_len(), 4);
        assert_eq!(st.rules_len(), 4);
        assert_eq!(st.prods_len(), 6);

        let s0 = sg.start_state();
        let eof = grm.eof_token_idx();
        let t_minus = grm.token_idx("-").unwrap();
        let t_star = grm.token_idx("*").unwrap();
        let t_id = grm.token_idx("id").unwrap();
        let r_expr = grm.rule_idx("Expr").unwrap();
        let r_term = grm.rule_idx("Term").unwrap();
        let r_factor = grm.rule_idx("Factor").unwrap();
        let p_expr_single = grm.rule_to_prods(r_expr)[1];
        let p_term_single = grm.rule_to_prods(r_term)[1];
        let p_factor = grm.rule_to_prods(r_factor)[0];

        // Shifting 'id' reaches a state which reduces Factor : 'id' whatever
        // comes next.
        let s_id = sg.edge(s0, Symbol::Token(t_id)).unwrap();
        assert_eq!(st.action(s0, t_id), Action::Shift(s_id));
        assert_eq!(st.action(s_id, t_minus), Action::Reduce(p_factor));
        assert_eq!(st.action(s_id, t_star), Action::Reduce(p_factor));
        assert_eq!(st.action(s_id, eof), Action::Reduce(p_factor));

        // After a Factor, '*' shifts and anything else reduces Term : Factor.
        let s_factor = sg.edge(s0, Symbol::Rule(r_factor)).unwrap();
        assert_eq!(st.goto(s0, r_factor), Some(s_factor));
        assert!(matches!(st.action(s_factor, t_star), Action::Shift(_)));
        assert_eq!(st.action(s_factor, t_minus), Action::Reduce(p_term_single));
        assert_eq!(st.action(s_factor, eof), Action::Reduce(p_term_single));

        // After a Term, '-' shifts and EOF reduces Expr : Term.
        let s_term = sg.edge(s0, Symbol::Rule(r_term)).unwrap();
        let s_tm = sg.edge(s_term, Symbol::Token(t_minus)).unwrap();
        assert_eq!(st.action(s_term, t_minus), Action::Shift(s_tm));
        assert_eq!(st.action(s_term, eof), Action::Reduce(p_expr_single));

        // The right-recursive tail after "Term -" closes over the same items
        // as the start state, so its gotos land in the very same states.
        assert_eq!(sg.edge(s_tm, Symbol::Rule(r_term)), Some(s_term));
        assert_eq!(sg.edge(s_tm, Symbol::Rule(r_factor)), Some(s_factor));
        assert_eq!(sg.edge(s_tm, Symbol::Token(t_id)), Some(s_id));

        // "Term - Expr" then reduces Expr : Term '-' Expr on EOF.
        let s_tme = sg.edge(s_tm, Symbol::Rule(r_expr)).unwrap();
        assert_eq!(st.goto(s_tm, r_expr), Some(s_tme));
        assert_eq!(
            st.action(s_tme, eof),
            Action::Reduce(grm.rule_to_prods(r_expr)[0])
        );

        // Reducing by production 0 on EOF is acceptance.
        let s_accept = sg.edge(s0, Symbol::Rule(r_expr)).unwrap();
        assert_eq!(st.action(s_accept, eof), Action::Reduce(grm.start_prod()));
        assert_eq!(st.final_state(), s_accept);

        // Cells with no action are errors.
        assert_eq!(st.action(s0, t_minus), Action::Error);
        assert_eq!(st.action(s_id, t_id), Action::Error);
        assert_eq!(st.goto(s_id, r_expr), None);
    }

    #[test]
    fn test_shift_wins_over_reduce() {
        // S : S '+' S | 'a';
        let grm = Grammar::new(
            &[("S", &["S", "+", "S"]), ("S", &["a"])],
            "S",
            &["+", "a"],
        )
        .unwrap();
        let (sg, st) = from_grammar(&grm);

        let t_plus = grm.token_idx("+").unwrap();
        let r_s = grm.rule_idx("S").unwrap();
        let p_sps = grm.rule_to_prods(r_s)[0];

        let s1 = sg.edge(sg.start_state(), Symbol::Rule(r_s)).unwrap();
        assert_eq!(st.final_state(), s1);
        let s2 = sg.edge(s1, Symbol::Token(t_plus)).unwrap();
        let s3 = sg.edge(s2, Symbol::Rule(r_s)).unwrap();

        // In s3 both "S : S '+' S ." and "S : S . '+' S" hold on '+': the
        // shift is kept and the reduce dropped.
        assert!(matches!(st.action(s3, t_plus), Action::Shift(_)));
        assert_eq!(st.action(s3, grm.eof_token_idx()), Action::Reduce(p_sps));
        assert_eq!(st.sr_conflicts_len(), 1);
        assert_eq!(st.rr_conflicts_len(), 0);
        assert_eq!(
            st.conflicts(),
            &[Conflict::ShiftReduce {
                stidx: s3,
                tidx: t_plus,
                pidx: p_sps
            }]
        );
    }

    #[test]
    fn test_ambiguous_expr_conflicts() {
        // E : E '+' E | T;
        // T : '(' E ')' | T '*' T | 'i';
        let grm = Grammar::new(
            &[
                ("E", &["E", "+", "E"]),
                ("E", &["T"]),
                ("T", &["(", "E", ")"]),
                ("T", &["T", "*", "T"]),
                ("T", &["i"]),
            ],
            "E",
            &["+", "*", "(", ")", "i"],
        )
        .unwrap();
        let (_, st) = from_grammar(&grm);

        // The ambiguity surfaces purely as shift/reduce conflicts on the two
        // binary operators; construction still completes.
        assert!(st.sr_conflicts_len() > 0);
        assert_eq!(st.rr_conflicts_len(), 0);
        let t_plus = grm.token_idx("+").unwrap();
        let t_star = grm.token_idx("*").unwrap();
        for c in st.conflicts() {
            match *c {
                Conflict::ShiftReduce { stidx, tidx, .. } => {
                    assert!(tidx == t_plus || tidx == t_star);
                    // The table really does hold the shift.
                    assert!(matches!(st.action(stidx, tidx), Action::Shift(_)));
                }
                Conflict::ReduceReduce { .. } => panic!("unexpected reduce/reduce"),
            }
        }
    }

    #[test]
    fn test_empty_production_reduces_on_eof() {
        // S : '(' S ')' | S ',' S | ;
        let grm = Grammar::new(
            &[
                ("S", &["(", "S", ")"]),
                ("S", &["S", ",", "S"]),
                ("S", &[EPSILON]),
            ],
            "S",
            &["(", ")", ","],
        )
        .unwrap();
        let (sg, st) = from_grammar(&grm);

        let r_s = grm.rule_idx("S").unwrap();
        let p_empty = grm.rule_to_prods(r_s)[2];
        assert_eq!(grm.prod(p_empty).len(), 0);

        // The empty input is valid: state 0 reduces the empty production on
        // EOF (and on ','), then accepts.
        let s0 = sg.start_state();
        assert_eq!(st.action(s0, grm.eof_token_idx()), Action::Reduce(p_empty));
        assert_eq!(
            st.action(s0, grm.token_idx(",").unwrap()),
            Action::Reduce(p_empty)
        );
        assert!(matches!(
            st.action(s0, grm.token_idx("(").unwrap()),
            Action::Shift(_)
        ));
        assert_eq!(st.final_state(), st.goto(s0, r_s).unwrap());
    }

    #[test]
    fn test_nullable_chain_grammar_is_conflict_free() {
        // S : 'a' B D 'h'; B : 'c' C; C : 'b' C | ; D : E F;
        // E : 'g' | ; F : 'f' | ;
        let grm = Grammar::new(
            &[
                ("S", &["a", "B", "D", "h"]),
                ("B", &["c", "C"]),
                ("C", &["b", "C"]),
                ("C", &[EPSILON]),
                ("D", &["E", "F"]),
                ("E", &["g"]),
                ("E", &[EPSILON]),
                ("F", &["f"]),
                ("F", &[EPSILON]),
            ],
            "S",
            &["a", "b", "c", "f", "g", "h"],
        )
        .unwrap();
        let (sg, st) = from_grammar(&grm);
        assert!(st.conflicts().is_empty());

        // After "a c", the lookahead for the C items is FIRST of the
        // nullable remainder "D 'h'": {'g', 'f', 'h'}.
        let s_a = sg
            .edge(sg.start_state(), Symbol::Token(grm.token_idx("a").unwrap()))
            .unwrap();
        let s_ac = sg
            .edge(s_a, Symbol::Token(grm.token_idx("c").unwrap()))
            .unwrap();
        let p_c_empty = grm.rule_to_prods(grm.rule_idx("C").unwrap())[1];
        for t in ["g", "f", "h"] {
            assert_eq!(
                st.action(s_ac, grm.token_idx(t).unwrap()),
                Action::Reduce(p_c_empty)
            );
        }
    }

    #[test]
    fn test_reduce_reduce_later_production_wins() {
        // A : B 'x' | C 'x';
        // B : 'a';
        // C : 'a';
        let grm = Grammar::new(
            &[
                ("A", &["B", "x"]),
                ("A", &["C", "x"]),
                ("B", &["a"]),
                ("C", &["a"]),
            ],
            "A",
            &["x", "a"],
        )
        .unwrap();
        let (sg, st) = from_grammar(&grm);

        let t_x = grm.token_idx("x").unwrap();
        let p_b = grm.rule_to_prods(grm.rule_idx("B").unwrap())[0];
        let p_c = grm.rule_to_prods(grm.rule_idx("C").unwrap())[0];
        assert!(usize::from(p_b) < usize::from(p_c));

        let s_a = sg
            .edge(sg.start_state(), Symbol::Token(grm.token_idx("a").unwrap()))
            .unwrap();
        // Both "B : 'a' ." and "C : 'a' ." reduce on 'x'; the later-numbered
        // production is kept.
        assert_eq!(st.action(s_a, t_x), Action::Reduce(p_c));
        assert_eq!(st.sr_conflicts_len(), 0);
        assert_eq!(st.rr_conflicts_len(), 1);
        assert_eq!(
            st.conflicts(),
            &[Conflict::ReduceReduce {
                stidx: s_a,
                tidx: t_x,
                kept: p_c,
                dropped: p_b
            }]
        );
    }

    #[test]
    fn test_conflict_pp() {
        let grm = Grammar::new(
            &[("S", &["S", "+", "S"]), ("S", &["a"])],
            "S",
            &["+", "a"],
        )
        .unwrap();
        let (_, st) = from_grammar(&grm);
        assert_eq!(st.conflicts().len(), 1);
        let s = st.conflicts()[0].pp(&grm);
        assert!(s.starts_with("Shift/Reduce in state "));
        assert!(s.contains("S -> S '+' S"));
    }

    #[test]
    fn test_decode_roundtrip() {
        let grm = arith_grammar();
        let (sg, st) = from_grammar(&grm);
        // Every (state, token) cell decodes to a well-formed action.
        for stidx in sg.iter_stidxs() {
            for tidx in grm.iter_tidxs() {
                match st.action(stidx, tidx) {
                    Action::Shift(to) => assert!(usize::from(to) < st.states_len()),
                    Action::Reduce(pidx) => assert!(usize::from(pidx) < st.prods_len()),
                    Action::Error => (),
                }
            }
        }
    }
}
