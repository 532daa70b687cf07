use std::ops::Add;

/// Merges two messages bound for the same vertex. Must be associative and
/// commutative: the engine combines in arbitrary order, on both the sending
/// and the receiving side.
pub trait Combine<M>: Send + Sync {
    fn combine(&self, a: M, b: M) -> M;
}

impl<M, F> Combine<M> for F
where
    F: Fn(M, M) -> M + Send + Sync,
{
    fn combine(&self, a: M, b: M) -> M {
        self(a, b)
    }
}

pub struct SumCombiner;

impl<M: Add<Output = M>> Combine<M> for SumCombiner {
    fn combine(&self, a: M, b: M) -> M {
        a + b
    }
}

pub struct MinCombiner;

impl<M: PartialOrd> Combine<M> for MinCombiner {
    fn combine(&self, a: M, b: M) -> M {
        if b < a {
            b
        } else {
            a
        }
    }
}
