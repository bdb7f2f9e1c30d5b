//! Ordered fan-out / fan-in.
//!
//! Operations run concurrently on the current task; results come back in
//! input order regardless of completion order.

use std::future::Future;

use futures_util::future::{join_all, try_join_all};

/// Run `op` over every item; a failing item yields an error at its position.
pub async fn fan_out<I, F, Fut, T, E>(items: I, op: F) -> Vec<Result<T, E>>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    join_all(items.into_iter().map(op)).await
}

/// Run `op` over every item and stop at the first failure.
///
/// Operations already completed are not undone.
pub async fn fan_out_or_abort<I, F, Fut, T, E>(items: I, op: F) -> Result<Vec<T>, E>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    try_join_all(items.into_iter().map(op)).await
}

/// Successes and failures of a fan-out, keyed by item id.
#[derive(Debug)]
pub struct Partitioned<T, E> {
    pub ok: Vec<T>,
    pub failed: Vec<(String, E)>,
}

pub fn partition<T, E>(ids: &[String], results: Vec<Result<T, E>>) -> Partitioned<T, E> {
    let mut out = Partitioned {
        ok: Vec::new(),
        failed: Vec::new(),
    };
    for (id, r) in ids.iter().zip(results) {
        match r {
            Ok(v) => out.ok.push(v),
            Err(e) => out.failed.push((id.clone(), e)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn results_keep_input_order_under_reordered_completion() {
        let delays = vec![30u64, 5, 20, 0, 10];
        let out = fan_out(delays.clone(), |d| async move {
            tokio::time::sleep(Duration::from_millis(d)).await;
            if d == 20 {
                Err(format!("item {d} failed"))
            } else {
                Ok(d)
            }
        })
        .await;

        assert_eq!(out.len(), delays.len());
        assert_eq!(out[0], Ok(30));
        assert_eq!(out[1], Ok(5));
        assert_eq!(out[2], Err("item 20 failed".to_string()));
        assert_eq!(out[3], Ok(0));
        assert_eq!(out[4], Ok(10));
    }

    #[tokio::test]
    async fn abort_variant_returns_first_error() {
        let out: Result<Vec<u32>, &str> =
            fan_out_or_abort(vec![1u32, 2, 3], |n| async move {
                if n == 2 {
                    Err("two")
                } else {
                    Ok(n)
                }
            })
            .await;
        assert_eq!(out, Err("two"));

        let ok: Result<Vec<u32>, &str> =
            fan_out_or_abort(vec![1u32, 2], |n| async move { Ok(n * 10) }).await;
        assert_eq!(ok, Ok(vec![10, 20]));
    }

    #[test]
    fn partition_pairs_failures_with_ids() {
        let ids = vec!["a".to_string(), "b".to_string()];
        let p = partition(&ids, vec![Ok(1), Err("boom")]);
        assert_eq!(p.ok, vec![1]);
        assert_eq!(p.failed, vec![("b".to_string(), "boom")]);
    }
}
