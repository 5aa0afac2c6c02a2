//! Join combinators for composite fetches.
//!
//! The inputs run concurrently; `merge` sees all of their outputs at once and
//! runs exactly once, after the last input has completed. Nothing is shared
//! between the inputs, so the merge needs no locking.

use std::future::Future;

use futures::future;

pub async fn join2_with<A, B, R>(
    a: A,
    b: B,
    merge: impl FnOnce(A::Output, B::Output) -> R,
) -> R
where
    A: Future,
    B: Future,
{
    let (a, b) = future::join(a, b).await;
    tracing::trace!("joined 2 results");
    merge(a, b)
}

pub async fn join3_with<A, B, C, R>(
    a: A,
    b: B,
    c: C,
    merge: impl FnOnce(A::Output, B::Output, C::Output) -> R,
) -> R
where
    A: Future,
    B: Future,
    C: Future,
{
    let (a, b, c) = future::join3(a, b, c).await;
    tracing::trace!("joined 3 results");
    merge(a, b, c)
}
