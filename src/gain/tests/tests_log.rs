#[cfg(test)]
mod tests {
    use crate::gain::{GainCurve, GainLog, HORIZON};

    #[test]
    fn untouched_log_is_empty_and_worthless() {
        let log = GainLog::new();
        let curve = GainCurve::new();
        assert_eq!(log.bucket_count(), 0);
        assert_eq!(log.value(1, &curve), 0.0);
    }

    #[test]
    fn same_tick_recordings_share_one_bucket() {
        let mut log = GainLog::new();
        log.record(7, 3);
        log.record(7, 1);
        log.record(7, 5);
        assert_eq!(log.bucket_count(), 1);

        let curve = GainCurve::new();
        // Three requests, sizes 3+1+5: value = w(0) * (9 + 3).
        assert!((log.value(7, &curve) - 2.0 * 12.0).abs() < 1e-9);
    }

    #[test]
    fn older_buckets_weigh_less() {
        let mut log = GainLog::new();
        log.record(1, 4);
        log.record(2, 4);
        let curve = GainCurve::new();

        let now = 2;
        let fresh = curve.weight(0) * 5.0;
        let aged = curve.weight(1) * 5.0;
        assert!((log.value(now, &curve) - (fresh + aged)).abs() < 1e-9);
        assert!(aged < fresh);
    }

    #[test]
    fn remove_undoes_record() {
        let mut log = GainLog::new();
        log.record(3, 2);
        log.record(3, 4);
        log.remove(3, 2);
        let curve = GainCurve::new();
        assert!((log.value(3, &curve) - 2.0 * 5.0).abs() < 1e-9);

        log.remove(3, 4);
        assert_eq!(log.value(3, &curve), 0.0);
    }

    #[test]
    fn remove_of_pruned_arrival_is_harmless() {
        let mut log = GainLog::new();
        log.record(1, 2);
        log.prune(HORIZON + 2);
        assert_eq!(log.bucket_count(), 0);
        // The bucket is gone; removing from it must not panic.
        log.remove(1, 2);
    }

    #[test]
    fn prune_drops_only_expired_buckets() {
        let mut log = GainLog::new();
        log.record(1, 1);
        log.record(50, 1);
        log.record(100, 1);
        log.prune(HORIZON + 1);
        // The tick-1 bucket has age HORIZON at now = 106: still in.
        assert_eq!(log.bucket_count(), 3);
        log.prune(HORIZON + 2);
        assert_eq!(log.bucket_count(), 2);
    }

    #[test]
    fn value_is_monotone_in_outstanding_requests() {
        let curve = GainCurve::new();
        let mut smaller = GainLog::new();
        let mut larger = GainLog::new();
        for tick in [10, 20, 30] {
            smaller.record(tick, 2);
            larger.record(tick, 2);
            larger.record(tick, 2);
        }
        assert!(larger.value(30, &curve) > smaller.value(30, &curve));
    }
}
