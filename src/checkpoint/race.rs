//! Race two result sources; the first to yield `Some` wins.

use std::future::Future;

/// Drive both futures until one yields `Some`, then drop the other.
///
/// A source that finishes with `None` drops out of the race; if both do,
/// the result is `None`. Dropping the loser cancels whatever it owned
/// (subscriptions, timers).
pub async fn first_some<T, A, B>(a: A, b: B) -> Option<T>
where
    A: Future<Output = Option<T>>,
    B: Future<Output = Option<T>>,
{
    tokio::pin!(a);
    tokio::pin!(b);
    let mut a_live = true;
    let mut b_live = true;

    loop {
        tokio::select! {
            out = &mut a, if a_live => match out {
                Some(value) => return Some(value),
                None => a_live = false,
            },
            out = &mut b, if b_live => match out {
                Some(value) => return Some(value),
                None => b_live = false,
            },
            else => return None,
        }
    }
}
