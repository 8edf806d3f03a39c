//! Registers a few fake database connections in a pool with room for two, showing eviction,
//! replacement, health checks and teardown.
//!
//! Run with `RUST_LOG=service_pool=debug` to see the pool's own log events.

use service_pool::{ServiceDescriptor, ServicePool};
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
struct Connection {
    url: String,
    ready: bool,
}

fn connection(id: &'static str) -> ServiceDescriptor<&'static str, Connection> {
    ServiceDescriptor::builder()
        .id(id)
        .on_add(move || {
            println!("opening {id}");
            Connection {
                url: format!("db://127.0.0.1/{id}"),
                ready: true,
            }
        })
        .on_test(|conn: &Connection| conn.ready)
        .on_destroy(|conn: &mut Connection| println!("closing {}", conn.url))
        .build()
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Service Pool README Example ===");

    let mut pool = ServicePool::builder().max(2).build();
    println!("capacity: {}", pool.config().max());

    for id in ["id111", "id222", "id333"] {
        if let Err(error) = pool.add(connection(id)) {
            eprintln!("failed to add {id}: {error}");
            return;
        }
    }

    // "id111" was evicted to make room for "id333".
    println!("active: {:?}", pool.active_ids());
    assert_eq!(pool.len(), 2);
    assert!(pool.get(&"id111").is_none());

    println!("id222 health: {:?}", pool.test(&"id222"));

    // Re-adding a live id closes the old connection before opening the new one.
    if let Err(error) = pool.add(connection("id222")) {
        eprintln!("failed to replace id222: {error}");
        return;
    }
    println!("active after replace: {:?}", pool.active_ids());

    println!("destroyed id333: {}", pool.destroy(&"id333"));
    println!("destroyed id333 again: {}", pool.destroy(&"id333"));

    println!("reset closed {} connection(s)", pool.reset());

    println!("README example completed successfully!");
}
