//! # retention_sweep
//!
//! Walks an object storage container page by page and deletes every object
//! whose last-modified time is older than the retention window.
//!
//! The pieces, in the order the sweep uses them:
//!
//! * [`account::StorageAccount`] parses a storage connection string and builds
//!   a container handle.
//! * [`container::ContainerClient`] is the only view of the container the sweep
//!   has: list one page, delete one object.
//! * [`policy::RetentionPolicy`] decides which objects have expired.
//! * [`sweep::Sweeper`] runs the loop and reports a [`sweep::SweepSummary`].

#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(
    missing_debug_implementations,
    clippy::explicit_iter_loop,
    clippy::use_self,
    clippy::clone_on_ref_ptr,
    clippy::future_not_send
)]

pub mod account;
pub mod container;
pub mod policy;
pub mod sweep;

pub use account::{ConfigurationError, StorageAccount};
pub use container::{ContainerClient, MemContainer, ObjectStoreContainer};
pub use policy::{RETENTION_WINDOW, RetentionPolicy};
pub use sweep::{SweepSummary, Sweeper};
