//! Document store adapter.
//!
//! The backing store is external; this module defines the trait the engine
//! consumes (one-shot reads/writes, predicate queries, live query
//! subscriptions, and atomic write batches) plus an in-memory implementation
//! that doubles as the contract's executable semantics in tests.

mod adapter;
mod memory;

pub use adapter::{
    collections, from_doc, to_doc, DocumentStore, LiveQuery, Predicate, StoreError, StoreEvent,
    UnsubscribeGuard, WriteOp,
};
pub use memory::MemoryStore;
