//! Integration tests for the service pool lifecycle: capacity, eviction, replacement and
//! teardown, driven through the public API the way a connection registry would use it.

use std::panic::{self, AssertUnwindSafe};

use service_pool::{Capacity, Error, Health, ServiceDescriptor, ServicePool};
use testing::{LifecycleEvent, LifecycleLog, with_watchdog};

fn descriptor(id: &'static str, log: &LifecycleLog) -> ServiceDescriptor<&'static str, String> {
    ServiceDescriptor::builder()
        .id(id)
        .on_add(log.creator(id))
        .on_test(log.tester())
        .on_destroy(log.destroyer())
        .build()
}

#[test]
fn config_exposes_max() {
    let pool: ServicePool<&str, String> = ServicePool::builder().max(2).build();

    assert_eq!(pool.config().max().max(), 2);
    assert!(pool.config().max().is_bounded());
}

#[test]
fn add_then_get_returns_created_service() {
    with_watchdog(|| {
        let log = LifecycleLog::new();
        let mut pool = ServicePool::builder().max(2).build();

        let created = pool.add(descriptor("id111", &log)).unwrap().clone();

        assert_eq!(created, "id111");
        assert_eq!(pool.get(&"id111"), Some(&created));
        assert_eq!(pool.len(), 1);
        assert_eq!(log.created("id111"), 1);
    });
}

#[test]
fn three_into_two_evicts_first() {
    with_watchdog(|| {
        let log = LifecycleLog::new();
        let mut pool = ServicePool::builder().max(2).build();

        for id in ["id111", "id222", "id333"] {
            pool.add(descriptor(id, &log)).unwrap();
        }

        assert_eq!(pool.len(), 2);
        assert_eq!(pool.active_ids(), vec!["id222", "id333"]);
        assert!(pool.get(&"id111").is_none());
        assert!(pool.get(&"id222").is_some());
        assert!(pool.get(&"id333").is_some());
        assert_eq!(log.destroyed("id111"), 1);
    });
}

#[test]
fn readding_live_id_tears_down_previous_once() {
    with_watchdog(|| {
        let log = LifecycleLog::new();
        let mut pool = ServicePool::builder().max(2).build();

        for id in ["id111", "id222", "id333"] {
            pool.add(descriptor(id, &log)).unwrap();
        }

        log.clear();
        pool.add(descriptor("id222", &log)).unwrap();

        assert_eq!(pool.len(), 2);
        assert_eq!(
            log.events(),
            vec![
                LifecycleEvent::Destroyed("id222".to_string()),
                LifecycleEvent::Created("id222".to_string()),
            ]
        );
        assert_eq!(pool.active_ids(), vec!["id333", "id222"]);
    });
}

#[test]
fn later_eviction_picks_oldest_survivor() {
    with_watchdog(|| {
        let log = LifecycleLog::new();
        let mut pool = ServicePool::builder().max(2).build();

        for id in ["a", "b", "c", "d"] {
            pool.add(descriptor(id, &log)).unwrap();
        }

        assert_eq!(log.destroyed("a"), 1);
        assert_eq!(log.destroyed("b"), 1);
        assert_eq!(log.destroyed("c"), 0);
        assert_eq!(pool.active_ids(), vec!["c", "d"]);
    });
}

#[test]
fn count_never_exceeds_capacity() {
    with_watchdog(|| {
        let log = LifecycleLog::new();
        let mut pool = ServicePool::builder().max(3).build();
        let ids = ["a", "b", "c", "d", "b", "e", "a", "a", "f"];

        for id in ids {
            pool.add(descriptor(id, &log)).unwrap();
            assert!(pool.len() <= 3);
        }

        let creations = log
            .events()
            .iter()
            .filter(|event| matches!(event, LifecycleEvent::Created(_)))
            .count();
        let teardowns = log
            .events()
            .iter()
            .filter(|event| matches!(event, LifecycleEvent::Destroyed(_)))
            .count();

        // Every service that is no longer live was torn down exactly once.
        assert_eq!(creations, ids.len());
        assert_eq!(creations - teardowns, pool.len());
    });
}

#[test]
fn test_outcomes() {
    with_watchdog(|| {
        let log = LifecycleLog::new();
        let mut pool = ServicePool::new();

        pool.add(descriptor("checked", &log)).unwrap();
        pool.add(ServiceDescriptor::new("unchecked", || "plain".to_string()))
            .unwrap();

        assert_eq!(pool.test(&"checked"), Some(Health::Healthy));
        assert_eq!(log.tested("checked"), 1);

        // Not an error and not "unhealthy" either.
        assert_eq!(pool.test(&"unchecked"), Some(Health::Unknown));
        assert_eq!(pool.test(&"absent"), None);
    });
}

#[test]
fn destroy_twice_reports_not_found() {
    with_watchdog(|| {
        let log = LifecycleLog::new();
        let mut pool = ServicePool::new();

        pool.add(descriptor("id111", &log)).unwrap();

        assert!(pool.destroy(&"id111"));
        assert_eq!(pool.len(), 0);
        assert!(!pool.destroy(&"id111"));
        assert_eq!(log.destroyed("id111"), 1);
    });
}

#[test]
fn reset_tears_down_all() {
    with_watchdog(|| {
        let log = LifecycleLog::new();
        let mut pool = ServicePool::builder().max(0).build();

        for id in ["a", "b", "c"] {
            pool.add(descriptor(id, &log)).unwrap();
        }

        assert_eq!(pool.config().max(), Capacity::Unbounded);
        assert_eq!(pool.reset(), 3);
        assert!(pool.is_empty());

        for id in ["a", "b", "c"] {
            assert_eq!(log.destroyed(id), 1);
        }
    });
}

#[test]
fn incomplete_descriptor_leaves_pool_untouched() {
    with_watchdog(|| {
        let log = LifecycleLog::new();
        let mut pool = ServicePool::builder().max(1).build();

        pool.add(descriptor("id111", &log)).unwrap();

        let incomplete = ServiceDescriptor::builder()
            .id("id111")
            .on_destroy(log.destroyer())
            .build();

        assert!(matches!(
            pool.add(incomplete),
            Err(Error::MissingOnAdd { .. })
        ));

        // Neither replacement nor eviction ran.
        assert_eq!(log.destroyed("id111"), 0);
        assert_eq!(pool.active_ids(), vec!["id111"]);
    });
}

#[test]
fn dropping_pool_tears_down_services() {
    with_watchdog(|| {
        let log = LifecycleLog::new();

        {
            let mut pool = ServicePool::new();
            pool.add(descriptor("a", &log)).unwrap();
            pool.add(descriptor("b", &log)).unwrap();
        }

        assert_eq!(log.destroyed("a"), 1);
        assert_eq!(log.destroyed("b"), 1);
    });
}

#[test]
fn failed_teardown_keeps_service_until_retried() {
    with_watchdog(|| {
        let log = LifecycleLog::new();
        let mut pool = ServicePool::new();

        let mut record = log.destroyer();
        let mut failed_once = false;

        pool.add(
            ServiceDescriptor::builder()
                .id("id111")
                .on_add(log.creator("id111"))
                .on_destroy(move |service: &mut String| {
                    record(service);

                    if !failed_once {
                        failed_once = true;
                        panic!("connection refused to close");
                    }
                })
                .build(),
        )
        .unwrap();

        let result = panic::catch_unwind(AssertUnwindSafe(|| pool.destroy(&"id111")));

        assert!(result.is_err());
        assert!(pool.contains(&"id111"));
        assert_eq!(pool.len(), 1);
        assert_eq!(log.destroyed("id111"), 1);

        assert!(pool.destroy(&"id111"));
        assert!(pool.is_empty());
        assert_eq!(log.destroyed("id111"), 2);
    });
}
