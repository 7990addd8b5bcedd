//! Which objects have outlived the retention window.

use crate::container::ObjectDescriptor;
use std::time::Duration;
use sweep_time::Time;

/// How long an object is kept after it was last modified: 90 days.
pub const RETENTION_WINDOW: Duration = Duration::from_secs(90 * 24 * 60 * 60);

/// Age-based expiry with a fixed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    window: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            window: RETENTION_WINDOW,
        }
    }
}

impl RetentionPolicy {
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Objects last modified before the returned instant have expired.
    pub fn cutoff(&self, now: Time) -> Time {
        now.checked_sub(self.window).unwrap_or(Time::MIN)
    }

    /// Strictly older than `cutoff`; an object modified exactly at the cutoff
    /// is kept.
    pub fn is_expired(&self, object: &ObjectDescriptor, cutoff: Time) -> bool {
        object.last_modified < cutoff
    }

    /// Split a page into `(expired, retained)`, each in page order.
    pub fn partition(
        &self,
        objects: Vec<ObjectDescriptor>,
        cutoff: Time,
    ) -> (Vec<ObjectDescriptor>, Vec<ObjectDescriptor>) {
        objects
            .into_iter()
            .partition(|object| self.is_expired(object, cutoff))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    fn now() -> Time {
        Time::from_rfc3339("2024-06-30T12:00:00Z").unwrap()
    }

    fn aged(name: &str, age: Duration) -> ObjectDescriptor {
        ObjectDescriptor::new(name, now().checked_sub(age).unwrap())
    }

    #[test]
    fn cutoff_is_ninety_days_back() {
        let policy = RetentionPolicy::default();
        assert_eq!(policy.window(), 90 * DAY);
        assert_eq!(
            policy.cutoff(now()),
            Time::from_rfc3339("2024-04-01T12:00:00Z").unwrap()
        );
    }

    #[test]
    fn cutoff_saturates() {
        assert_eq!(RetentionPolicy::default().cutoff(Time::MIN), Time::MIN);
    }

    #[test]
    fn object_at_the_cutoff_is_retained() {
        let policy = RetentionPolicy::default();
        let cutoff = policy.cutoff(now());

        assert!(!policy.is_expired(&aged("at", 90 * DAY), cutoff));
        assert!(policy.is_expired(
            &aged("just-before", 90 * DAY + Duration::from_nanos(1)),
            cutoff
        ));
    }

    #[test]
    fn partition_keeps_page_order() {
        let policy = RetentionPolicy::default();
        let page = vec![
            aged("a", 120 * DAY),
            aged("b", 10 * DAY),
            aged("c", 91 * DAY),
            aged("d", 90 * DAY),
        ];

        let (expired, retained) = policy.partition(page, policy.cutoff(now()));

        let names = |objects: &[ObjectDescriptor]| {
            objects
                .iter()
                .map(|o| o.location.to_string())
                .collect::<Vec<_>>()
        };
        assert_eq!(names(&expired), ["a", "c"]);
        assert_eq!(names(&retained), ["b", "d"]);
    }

    proptest! {
        #[test]
        fn partition_splits_on_the_cutoff(
            ages in prop::collection::vec(0u64..400 * 24 * 60 * 60, 0..64),
            cutoff_age in 0u64..400 * 24 * 60 * 60,
        ) {
            let policy = RetentionPolicy::default();
            let cutoff = now().checked_sub(Duration::from_secs(cutoff_age)).unwrap();
            let page: Vec<_> = ages
                .iter()
                .enumerate()
                .map(|(i, age)| aged(&format!("object-{i}"), Duration::from_secs(*age)))
                .collect();

            let (expired, retained) = policy.partition(page.clone(), cutoff);

            prop_assert_eq!(expired.len() + retained.len(), page.len());
            prop_assert!(expired.iter().all(|o| o.last_modified < cutoff));
            prop_assert!(retained.iter().all(|o| o.last_modified >= cutoff));
        }
    }
}
