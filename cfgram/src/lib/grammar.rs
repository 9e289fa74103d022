use std::{collections::HashMap, error::Error, fmt};

use indexmap::IndexSet;
use num_traits::{self, AsPrimitive, PrimInt, Unsigned};

use crate::{firsts::Firsts, PIdx, RIdx, SIdx, Symbol, TIdx};

/// The name accepted as the empty-derivation marker inside right-hand sides.
/// It is implicitly part of every terminal set and is stripped from
/// right-hand sides during normalization.
pub const EPSILON: &str = "epsilon";

const START_RULE: &str = "^";

/// Any error from grammar construction returns an instance of this struct.
#[derive(Debug, Eq, PartialEq)]
pub struct GrammarError {
    pub kind: GrammarErrorKind,
}

/// The various ways a production list can fail to describe a usable grammar.
/// These are contract violations on the caller's side: none of them is
/// recoverable and no grammar is produced.
#[derive(Debug, Eq, PartialEq)]
pub enum GrammarErrorKind {
    /// The production list was empty.
    NoProductions,
    /// The start symbol is not the left-hand side of any production.
    StartRuleMissing(String),
    /// A right-hand side referenced a symbol which is neither a declared
    /// terminal nor the left-hand side of any production.
    DanglingSymbol { rule: String, symbol: String },
    /// A declared terminal (or the epsilon marker) was used as a left-hand
    /// side.
    TerminalAsRule(String),
}

impl Error for GrammarError {}

impl fmt::Display for GrammarError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.kind {
            GrammarErrorKind::NoProductions => write!(f, "Grammar has no productions"),
            GrammarErrorKind::StartRuleMissing(ref n) => {
                write!(f, "Start symbol '{}' is not defined by any production", n)
            }
            GrammarErrorKind::DanglingSymbol {
                ref rule,
                ref symbol,
            } => write!(
                f,
                "Symbol '{}' in a production of '{}' is neither a terminal nor a rule",
                symbol, rule
            ),
            GrammarErrorKind::TerminalAsRule(ref n) => {
                write!(f, "Terminal '{}' cannot be used as a left-hand side", n)
            }
        }
    }
}

/// Representation of a normalized grammar. See the
/// [top-level documentation](../index.html) for the guarantees this struct
/// makes about rules, tokens, productions, and symbols.
#[derive(Debug)]
pub struct Grammar<StorageT = u32> {
    /// How many rules does this grammar have?
    rules_len: RIdx<StorageT>,
    /// A mapping from `RIdx` -> `String`.
    rule_names: Vec<String>,
    /// A mapping from `TIdx` -> `Option<String>`. Every user-declared
    /// terminal has a name; the reserved EOF token does not.
    token_names: Vec<Option<String>>,
    /// How many tokens does this grammar have?
    tokens_len: TIdx<StorageT>,
    /// The offset of the EOF token.
    eof_token_idx: TIdx<StorageT>,
    /// How many productions does this grammar have?
    prods_len: PIdx<StorageT>,
    /// A list of all productions. `prods[0]` is always the augmented
    /// production `^ -> <start rule>`.
    prods: Vec<Vec<Symbol<StorageT>>>,
    /// A mapping from rules to their productions, in declaration order.
    rules_prods: Vec<Vec<PIdx<StorageT>>>,
    /// A mapping from productions to their rule indexes.
    prods_rules: Vec<RIdx<StorageT>>,
}

impl Grammar<u32> {
    /// Build a grammar from a normalized production list (alternatives
    /// pre-expanded into separate `(lhs, rhs)` pairs), a start symbol, and a
    /// terminal alphabet, using `u32` index storage.
    pub fn new(
        prods: &[(&str, &[&str])],
        start: &str,
        terminals: &[&str],
    ) -> Result<Self, GrammarError> {
        Grammar::new_with_storaget(prods, start, terminals)
    }
}

impl<StorageT: 'static + PrimInt + Unsigned> Grammar<StorageT>
where
    usize: AsPrimitive<StorageT>,
{
    /// As [`Grammar::new`](#method.new), but generic over the index storage
    /// type.
    ///
    /// A fresh start rule (referred to as `^`, though the actual name is
    /// guaranteed unique) is synthesized; its sole production `^ -> <start>`
    /// has the reserved index `PIdx(0)`. User productions are numbered from
    /// `1` in declaration order. Any symbol not in `terminals` which appears
    /// as some production's left-hand side is a rule; any remaining symbol is
    /// an error.
    pub fn new_with_storaget(
        prods: &[(&str, &[&str])],
        start: &str,
        terminals: &[&str],
    ) -> Result<Self, GrammarError> {
        if prods.is_empty() {
            return Err(GrammarError {
                kind: GrammarErrorKind::NoProductions,
            });
        }

        // Terminal names in declaration order. The epsilon marker is
        // implicitly a terminal but never becomes a token.
        let mut token_set = IndexSet::new();
        for &t in terminals {
            if t != EPSILON {
                token_set.insert(t);
            }
        }

        // Rule names in declaration order of their first production.
        let mut rule_set = IndexSet::new();
        for &(lhs, _) in prods {
            if lhs == EPSILON || token_set.contains(lhs) {
                return Err(GrammarError {
                    kind: GrammarErrorKind::TerminalAsRule(lhs.to_string()),
                });
            }
            rule_set.insert(lhs);
        }
        if !rule_set.contains(start) {
            return Err(GrammarError {
                kind: GrammarErrorKind::StartRuleMissing(start.to_string()),
            });
        }

        // Check that StorageT is big enough to hold RIdx/PIdx/SIdx/TIdx
        // values; after these checks things like RIdx(x.as_()) are safe.
        if rule_set.len() + 1 > num_traits::cast(StorageT::max_value()).unwrap() {
            panic!("StorageT is not big enough to store this grammar's rules.");
        }
        if token_set.len() + 1 > num_traits::cast(StorageT::max_value()).unwrap() {
            panic!("StorageT is not big enough to store this grammar's tokens.");
        }
        if prods.len() + 1 > num_traits::cast(StorageT::max_value()).unwrap() {
            panic!("StorageT is not big enough to store this grammar's productions.");
        }

        // Generate a guaranteed unique start rule name by extending it until
        // it no longer clashes with a user rule.
        let mut start_rule = START_RULE.to_string();
        while rule_set.contains(start_rule.as_str()) {
            start_rule += START_RULE;
        }

        let mut rule_names = Vec::with_capacity(rule_set.len() + 1);
        rule_names.push(start_rule);
        rule_names.extend(rule_set.iter().map(|s| s.to_string()));
        let mut rule_map = HashMap::<&str, RIdx<StorageT>>::new();
        for (i, n) in rule_names.iter().enumerate() {
            rule_map.insert(n, RIdx(i.as_()));
        }

        let mut token_names: Vec<Option<String>> = Vec::with_capacity(token_set.len() + 1);
        let mut token_map = HashMap::<&str, TIdx<StorageT>>::new();
        for (i, n) in token_set.iter().enumerate() {
            token_names.push(Some(n.to_string()));
            token_map.insert(n, TIdx(i.as_()));
        }
        let eof_token_idx = TIdx(token_names.len().as_());
        token_names.push(None);

        let mut prods_syms: Vec<Vec<Symbol<StorageT>>> = Vec::with_capacity(prods.len() + 1);
        let mut prods_rules: Vec<RIdx<StorageT>> = Vec::with_capacity(prods.len() + 1);
        let mut rules_prods: Vec<Vec<PIdx<StorageT>>> = vec![Vec::new(); rule_names.len()];

        // The augmented production `^ -> <start>` has the reserved PIdx(0)
        // and seeds the initial automaton state; it is not part of the user
        // grammar's production list.
        rules_prods[0].push(PIdx(StorageT::zero()));
        prods_syms.push(vec![Symbol::Rule(rule_map[start])]);
        prods_rules.push(RIdx(StorageT::zero()));

        for &(lhs, rhs) in prods {
            let ridx = rule_map[lhs];
            let mut syms = Vec::with_capacity(rhs.len());
            for &name in rhs {
                if name == EPSILON {
                    // A pure-epsilon alternative normalizes to the empty
                    // production.
                    continue;
                }
                if let Some(&tidx) = token_map.get(name) {
                    syms.push(Symbol::Token(tidx));
                } else if let Some(&s_ridx) = rule_map.get(name) {
                    syms.push(Symbol::Rule(s_ridx));
                } else {
                    return Err(GrammarError {
                        kind: GrammarErrorKind::DanglingSymbol {
                            rule: lhs.to_string(),
                            symbol: name.to_string(),
                        },
                    });
                }
            }
            if syms.len() > num_traits::cast(StorageT::max_value()).unwrap() {
                panic!("StorageT is not big enough to store the symbols of at least one of this grammar's productions.");
            }
            rules_prods[usize::from(ridx)].push(PIdx(prods_syms.len().as_()));
            prods_rules.push(ridx);
            prods_syms.push(syms);
        }

        Ok(Grammar {
            rules_len: RIdx(rule_names.len().as_()),
            rule_names,
            tokens_len: TIdx(token_names.len().as_()),
            token_names,
            eof_token_idx,
            prods_len: PIdx(prods_syms.len().as_()),
            prods: prods_syms,
            rules_prods,
            prods_rules,
        })
    }

    /// How many productions does this grammar have (including the augmented
    /// production)?
    pub fn prods_len(&self) -> PIdx<StorageT> {
        self.prods_len
    }

    /// Return an iterator which produces (in order from `0..prods_len()`) all
    /// this grammar's valid `PIdx`s.
    pub fn iter_pidxs(&self) -> impl Iterator<Item = PIdx<StorageT>> {
        // The checks in the constructor mean the as_ calls are safe.
        (0..usize::from(self.prods_len)).map(|x| PIdx(x.as_()))
    }

    /// Get the sequence of symbols for production `pidx`. Panics if `pidx`
    /// doesn't exist.
    pub fn prod(&self, pidx: PIdx<StorageT>) -> &[Symbol<StorageT>] {
        &self.prods[usize::from(pidx)]
    }

    /// How many symbols does production `pidx` have? Panics if `pidx` doesn't
    /// exist.
    pub fn prod_len(&self, pidx: PIdx<StorageT>) -> SIdx<StorageT> {
        SIdx(self.prods[usize::from(pidx)].len().as_())
    }

    /// Return the rule index of production `pidx`. Panics if `pidx` doesn't
    /// exist.
    pub fn prod_to_rule(&self, pidx: PIdx<StorageT>) -> RIdx<StorageT> {
        self.prods_rules[usize::from(pidx)]
    }

    /// Return the production index of the augmented start production.
    pub fn start_prod(&self) -> PIdx<StorageT> {
        PIdx(StorageT::zero())
    }

    /// How many rules does this grammar have (including the synthesized start
    /// rule)?
    pub fn rules_len(&self) -> RIdx<StorageT> {
        self.rules_len
    }

    /// Return an iterator which produces (in order from `0..rules_len()`) all
    /// this grammar's valid `RIdx`s.
    pub fn iter_rules(&self) -> impl Iterator<Item = RIdx<StorageT>> {
        (0..usize::from(self.rules_len)).map(|x| RIdx(x.as_()))
    }

    /// Return the productions of rule `ridx`. Panics if `ridx` doesn't exist.
    pub fn rule_to_prods(&self, ridx: RIdx<StorageT>) -> &[PIdx<StorageT>] {
        &self.rules_prods[usize::from(ridx)]
    }

    /// Return the name of rule `ridx`. Panics if `ridx` doesn't exist.
    pub fn rule_name(&self, ridx: RIdx<StorageT>) -> &str {
        &self.rule_names[usize::from(ridx)]
    }

    /// Return the index of the rule named `n` or `None` if it doesn't exist.
    pub fn rule_idx(&self, n: &str) -> Option<RIdx<StorageT>> {
        self.rule_names
            .iter()
            .position(|x| x == n)
            .map(|x| RIdx(x.as_()))
    }

    /// Return the index of the synthesized start rule.
    pub fn start_rule_idx(&self) -> RIdx<StorageT> {
        self.prod_to_rule(self.start_prod())
    }

    /// How many tokens does this grammar have (including the reserved EOF
    /// token)?
    pub fn tokens_len(&self) -> TIdx<StorageT> {
        self.tokens_len
    }

    /// Return an iterator which produces (in order from `0..tokens_len()`)
    /// all this grammar's valid `TIdx`s.
    pub fn iter_tidxs(&self) -> impl Iterator<Item = TIdx<StorageT>> {
        (0..usize::from(self.tokens_len)).map(|x| TIdx(x.as_()))
    }

    /// Return the name of token `tidx` or `None` if it is the reserved EOF
    /// token. Panics if `tidx` doesn't exist.
    pub fn token_name(&self, tidx: TIdx<StorageT>) -> Option<&str> {
        self.token_names[usize::from(tidx)].as_deref()
    }

    /// Return the index of the token named `n` or `None` if it doesn't exist.
    pub fn token_idx(&self, n: &str) -> Option<TIdx<StorageT>> {
        self.token_names
            .iter()
            .position(|x| x.as_deref() == Some(n))
            .map(|x| TIdx(x.as_()))
    }

    /// Return the index of the reserved EOF token.
    pub fn eof_token_idx(&self) -> TIdx<StorageT> {
        self.eof_token_idx
    }

    /// Compute this grammar's FIRST sets.
    pub fn firsts(&self) -> Firsts<StorageT> {
        Firsts::new(self)
    }

    /// Pretty print production `pidx` as a `String`, e.g. `E -> E '+' E`.
    pub fn pp_production(&self, pidx: PIdx<StorageT>) -> String {
        let mut o = format!("{} ->", self.rule_name(self.prod_to_rule(pidx)));
        for sym in self.prod(pidx) {
            match *sym {
                Symbol::Rule(ridx) => o.push_str(&format!(" {}", self.rule_name(ridx))),
                Symbol::Token(tidx) => {
                    o.push_str(&format!(" '{}'", self.token_name(tidx).unwrap_or("$")))
                }
            }
        }
        o
    }
}

#[cfg(test)]
mod test {
    use super::{Grammar, GrammarErrorKind, EPSILON};
    use crate::{PIdx, RIdx, SIdx, Symbol};

    #[test]
    fn test_augmented_production() {
        let grm = Grammar::new(
            &[("S", &["a", "S"]), ("S", &["b"])],
            "S",
            &["a", "b"],
        )
        .unwrap();
        assert_eq!(grm.start_prod(), PIdx(0));
        assert_eq!(grm.prod(PIdx(0)), &[Symbol::Rule(grm.rule_idx("S").unwrap())]);
        assert_eq!(grm.rule_name(grm.start_rule_idx()), "^");
        // User productions are numbered from 1 in declaration order.
        assert_eq!(usize::from(grm.prods_len()), 3);
        assert_eq!(
            grm.rule_to_prods(grm.rule_idx("S").unwrap()),
            &[PIdx(1), PIdx(2)]
        );
        assert_eq!(grm.prod_to_rule(PIdx(2)), grm.rule_idx("S").unwrap());
    }

    #[test]
    fn test_start_rule_name_is_fresh() {
        let grm = Grammar::new(&[("^", &["x"]), ("S", &["^"])], "S", &["x"]).unwrap();
        assert_eq!(grm.rule_name(grm.start_rule_idx()), "^^");
        assert_eq!(grm.rule_idx("^"), Some(RIdx(1)));
    }

    #[test]
    fn test_epsilon_stripped() {
        let grm = Grammar::new(
            &[("S", &["A", "a"]), ("A", &[EPSILON]), ("A", &["b", EPSILON])],
            "S",
            &["a", "b"],
        )
        .unwrap();
        let a_prods = grm.rule_to_prods(grm.rule_idx("A").unwrap());
        assert_eq!(grm.prod_len(a_prods[0]), SIdx(0));
        assert!(grm.prod(a_prods[0]).is_empty());
        assert_eq!(grm.prod_len(a_prods[1]), SIdx(1));
    }

    #[test]
    fn test_eof_token() {
        let grm = Grammar::new(&[("S", &["a"])], "S", &["a"]).unwrap();
        assert_eq!(usize::from(grm.tokens_len()), 2);
        assert_eq!(grm.token_name(grm.eof_token_idx()), None);
        assert!(grm.token_idx("a").is_some());
    }

    #[test]
    fn test_undeclared_lhs_symbol_is_rule() {
        // "B" is not a terminal but is an lhs, so a reference to it resolves.
        let grm = Grammar::new(&[("S", &["B"]), ("B", &["b"])], "S", &["b"]).unwrap();
        assert!(grm.rule_idx("B").is_some());
        assert!(grm.token_idx("B").is_none());
    }

    #[test]
    fn test_start_rule_missing() {
        match Grammar::new(&[("S", &["a"])], "T", &["a"]) {
            Err(e) => assert_eq!(e.kind, GrammarErrorKind::StartRuleMissing("T".to_string())),
            Ok(_) => panic!("undefined start symbol accepted"),
        }
    }

    #[test]
    fn test_dangling_symbol() {
        match Grammar::new(&[("S", &["a", "X"])], "S", &["a"]) {
            Err(e) => assert_eq!(
                e.kind,
                GrammarErrorKind::DanglingSymbol {
                    rule: "S".to_string(),
                    symbol: "X".to_string()
                }
            ),
            Ok(_) => panic!("dangling symbol accepted"),
        }
    }

    #[test]
    fn test_terminal_as_rule() {
        match Grammar::new(&[("a", &["a"])], "a", &["a"]) {
            Err(e) => assert_eq!(e.kind, GrammarErrorKind::TerminalAsRule("a".to_string())),
            Ok(_) => panic!("terminal lhs accepted"),
        }
    }

    #[test]
    fn test_no_productions() {
        match Grammar::new(&[], "S", &["a"]) {
            Err(e) => assert_eq!(e.kind, GrammarErrorKind::NoProductions),
            Ok(_) => panic!("empty grammar accepted"),
        }
    }

    #[test]
    fn test_pp_production() {
        let grm = Grammar::new(&[("E", &["E", "+", "E"]), ("E", &["i"])], "E", &["+", "i"]).unwrap();
        assert_eq!(grm.pp_production(PIdx(1)), "E -> E '+' E");
        assert_eq!(grm.pp_production(PIdx(0)), "^ -> E");
    }
}
