//! Cache-through persistence for the marketplace.
//!
//! Entities are stored as JSON documents behind a [`store::DocumentStore`],
//! fronted by a [`cache::CacheStore`], with every mutation announced through
//! the [`webhook::WebhookPublisher`]. [`repository::Repository`] composes the
//! three and [`pagination`] supplies cursor paging over its list reads.

pub mod cache;
pub mod cli;
pub mod commands;
pub mod pagination;
pub mod repository;
pub mod store;
pub mod webhook;

pub use cache::{CacheKeys, CacheStore, MemoryCache, RedisCache};
pub use pagination::{Cursor, Page, PageArgs};
pub use repository::{Repository, RepositoryContext, UserRepository, UserStore};
pub use store::{DocumentStore, Filter, MemoryDocumentStore, PostgresDocumentStore};
pub use webhook::{RecordingTransport, TracingTransport, WebhookPublisher};
