use std::sync::Arc;

use app::user;
use dashmap::{mapref::entry::Entry, DashMap};
use std::time::Duration;

/// Per-user request limiter: at most `limit` requests within any `span`. Customers and staff
/// share the same budget per user.
pub struct RateLimit {
    limit: usize,
    span: Duration,
    counter: Arc<DashMap<user::Id, usize>>,
}

impl RateLimit {
    pub fn new(limit: usize, span: Duration) -> Self {
        Self {
            limit,
            span,
            counter: Arc::new(Default::default()),
        }
    }

    /// Returns true if the user should be rate limited, false otherwise. Every request that is
    /// let through is counted for `span`.
    pub fn limit(&self, user_id: user::Id) -> bool {
        match self.counter.entry(user_id) {
            Entry::Occupied(mut count) => {
                let count = count.get_mut();
                if *count >= self.limit {
                    return true;
                }
                *count += 1;
            }
            Entry::Vacant(e) => {
                if self.limit == 0 {
                    return true;
                }
                e.insert(1);
            }
        }
        self.decrement_later(user_id);
        false
    }

    fn decrement_later(&self, user_id: user::Id) {
        let counter = Arc::clone(&self.counter);
        let span = self.span;
        tokio::spawn(async move {
            tokio::time::sleep(span).await;
            match counter.entry(user_id) {
                Entry::Occupied(mut e) => {
                    let v = e.get_mut();
                    *v -= 1;
                    if *v == 0 {
                        e.remove();
                    }
                }
                Entry::Vacant(_) => {
                    log::error!(
                        "entry should not be vacant, this is a bug. user id {:?}",
                        user_id
                    );
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn limits_within_span_and_recovers_after() {
        let rate_limit = RateLimit::new(2, Duration::from_millis(50));
        let user_id = user::Id(Uuid::new_v4());
        let other = user::Id(Uuid::new_v4());

        assert!(!rate_limit.limit(user_id));
        assert!(!rate_limit.limit(user_id));
        assert!(rate_limit.limit(user_id));
        assert!(!rate_limit.limit(other));

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(!rate_limit.limit(user_id));
    }
}
