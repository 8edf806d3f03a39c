#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! A bounded registry of stateful services, such as database connections, sockets or other
//! handles, that manages their lifecycle on behalf of the caller.
//!
//! This crate provides [`ServicePool`], which stores services under caller-chosen identifiers.
//! Each service is registered via a [`ServiceDescriptor`] that tells the pool how to create the
//! service and, optionally, how to health-check it and how to tear it down.
//!
//! # Features
//!
//! - **Lifecycle callbacks**: `on_add` creates the service, `on_test` reports its [`Health`] and
//!   `on_destroy` releases it.
//! - **Bounded capacity**: A pool holds at most a configured number of services. Adding one more
//!   tears down the oldest service (first in, first out; reads do not refresh a service).
//! - **Replacement**: Registering an identifier that is already in use tears down the existing
//!   service first. There is never more than one live service per identifier.
//! - **Synchronous, fallible and asynchronous creation**: [`ServicePool::add()`],
//!   [`ServicePool::try_add()`] and [`ServicePool::add_async()`].
//! - **No lost teardowns**: Services still in the pool when it is dropped are torn down too.
//!
//! # Example
//!
//! ```rust
//! use service_pool::{Health, ServiceDescriptor, ServicePool};
//!
//! struct Connection {
//!     url: String,
//!     open: bool,
//! }
//!
//! let mut pool = ServicePool::builder().max(2).build();
//!
//! pool.add(
//!     ServiceDescriptor::builder()
//!         .id("orders")
//!         .on_add(|| Connection {
//!             url: "db://orders".to_string(),
//!             open: true,
//!         })
//!         .on_test(|conn: &Connection| conn.open)
//!         .on_destroy(|conn: &mut Connection| println!("closing {}", conn.url))
//!         .build(),
//! )
//! .unwrap();
//!
//! assert_eq!(pool.test(&"orders"), Some(Health::Healthy));
//! assert_eq!(pool.get(&"orders").map(|c| c.url.as_str()), Some("db://orders"));
//!
//! // Tears down the connection via `on_destroy`.
//! assert!(pool.destroy(&"orders"));
//! assert!(pool.is_empty());
//! ```
//!
//! # Logging
//!
//! The pool emits [`tracing`] events: `debug` when services are admitted, replaced, evicted or
//! destroyed and `trace` for lookups. Installing a subscriber is up to the application.

mod builder;
mod capacity;
mod descriptor;
mod entry;
mod error;
mod health;
mod pool;

pub use builder::*;
pub use capacity::*;
pub use descriptor::{ServiceDescriptor, ServiceDescriptorBuilder};
pub use error::{AddError, Error};
pub(crate) use error::Result;
pub use health::*;
pub use pool::*;
