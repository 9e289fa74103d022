// This macro generates newtype structs which expose a usize-convertible API
// while internally using a (possibly smaller) storage type.

use std::mem::size_of;

use num_traits::{self, PrimInt, Unsigned};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

macro_rules! IdxNewtype {
    ($(#[$attr:meta])* $n: ident) => {
        $(#[$attr])*
        #[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
        #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
        pub struct $n<T>(pub T);

        impl<T: PrimInt + Unsigned> From<$n<T>> for usize {
            fn from(idx: $n<T>) -> Self {
                debug_assert!(size_of::<usize>() >= size_of::<T>());
                num_traits::cast(idx.0).unwrap()
            }
        }

        impl<T: PrimInt + Unsigned> From<$n<T>> for u32 {
            fn from(idx: $n<T>) -> Self {
                debug_assert!(size_of::<u32>() >= size_of::<T>());
                num_traits::cast(idx.0).unwrap()
            }
        }

        impl<T: PrimInt + Unsigned> $n<T> {
            pub fn as_storaget(&self) -> T {
                self.0
            }
        }
    }
}

IdxNewtype!(
    /// A type specifically for rule indices.
    ///
    /// It is guaranteed that `RIdx` can be converted, without loss of
    /// precision, to `usize` with `usize::from(x_ridx)`.
    RIdx
);
IdxNewtype!(
    /// A type specifically for production indices. A rule with two
    /// alternatives contributes two productions, each with its own `PIdx`.
    ///
    /// It is guaranteed that `PIdx` can be converted, without loss of
    /// precision, to `usize` with `usize::from(x_pidx)`.
    PIdx
);
IdxNewtype!(
    /// A type specifically for symbol offsets within a production (i.e. "dot"
    /// positions, which range over `0..=prod_len`).
    ///
    /// It is guaranteed that `SIdx` can be converted, without loss of
    /// precision, to `usize` with `usize::from(x_sidx)`.
    SIdx
);
IdxNewtype!(
    /// A type specifically for token indices.
    ///
    /// It is guaranteed that `TIdx` can be converted, without loss of
    /// precision, to `usize` with `usize::from(x_tidx)`.
    TIdx
);
