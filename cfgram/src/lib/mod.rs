#![allow(clippy::new_without_default)]
#![allow(clippy::upper_case_acronyms)]

//! A library for representing context-free grammars in the normalized form
//! needed by LR table generation. The input is deliberately small: a list of
//! productions whose alternatives have already been expanded into separate
//! `(lhs, rhs)` pairs, a start symbol, and a terminal alphabet. From this a
//! [`Grammar`](grammar/struct.Grammar.html) is built which makes the
//! following guarantees:
//!
//!   * Productions are numbered from `0` to `prods_len() - 1` (inclusive).
//!     Production `0` is always the synthesized augmented production
//!     `^ -> <start rule>`; user productions are numbered from `1` in
//!     declaration order.
//!   * Rules are numbered from `0` to `rules_len() - 1` (inclusive), with
//!     rule `0` the synthesized start rule.
//!   * Tokens are numbered from `0` to `tokens_len() - 1` (inclusive), with
//!     token `tokens_len() - 1` the reserved (nameless) end-of-input token.
//!   * The `StorageT` type used to store production, rule, and token indices
//!     can be infallibly converted into `usize` (see [`TIdx`](struct.TIdx.html)
//!     and friends for details).
//!
//! The empty-derivation marker (see [`EPSILON`](grammar/constant.EPSILON.html))
//! is accepted inside right-hand sides and stripped during normalization, so a
//! production never carries it as a literal symbol: a pure-epsilon alternative
//! becomes the empty production.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub mod firsts;
pub mod grammar;
mod idxnewtype;

pub use crate::firsts::Firsts;
pub use crate::grammar::{Grammar, GrammarError, GrammarErrorKind, EPSILON};
pub use crate::idxnewtype::{PIdx, RIdx, SIdx, TIdx};

/// A symbol within a production: either a reference to a rule (nonterminal)
/// or to a token (terminal).
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Symbol<StorageT> {
    Rule(RIdx<StorageT>),
    Token(TIdx<StorageT>),
}
