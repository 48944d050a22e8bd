//! Dynaquery – dynamic query composition over stored fragments, plus rule based
//! indicators for the rows it returns.
//!
//! Queries are not written by clients. Administrators store named fragments of
//! SQL text, and clients pick them by name:
//! * A *base* fragment is a complete `SELECT` statement.
//! * A *filter* fragment is appended after the base, e.g. `AND c.active = 1`.
//! * An *order* fragment is appended last, e.g. `ORDER BY c.name ASC`.
//!
//! Fragments may use `:name` parameters whose values travel with the request.
//! Fragment text is never parsed or rewritten, apart from the derivation of a
//! count statement from the composed text (see [`compose::to_count_form`]).
//!
//! ## Modules
//! * [`fragment`] – Fragment records, kinds and the [`fragment::FragmentStore`] trait.
//! * [`compose`] – Resolution of names to fragments and assembly of the final text.
//! * [`coerce`] – Named conversions applied to parameters before binding.
//! * [`execute`] – The [`execute::QueryExecutor`] boundary and its SQLite implementation.
//! * [`service`] – [`service::DynamicQueryService`], composing and running requests.
//! * [`preview`] – Trial runs of unregistered fragment text.
//! * [`rule`] / [`indicator`] – Indicator rules and their evaluation against any
//!   [`indicator::Attributes`] implementor.
//! * [`persist`] – SQLite schema and storage for fragments and rules.
//! * [`customer`] – The customer search use case tying both engines together.
//! * [`admin`] – CRUD over fragments and rules.
//! * [`server`] – The HTTP surface.
//!
//! ## Quick Start
//! ```
//! use std::sync::Arc;
//! use dynaquery::execute::SqliteExecutor;
//! use dynaquery::persist::{PersistenceMode, Persistor};
//! use dynaquery::service::{DynamicQueryRequest, DynamicQueryService};
//! let persistor = Persistor::new(PersistenceMode::InMemory).unwrap();
//! persistor.seed().unwrap();
//! let executor = Arc::new(SqliteExecutor::new(persistor.connection()));
//! let service = DynamicQueryService::new(Arc::new(persistor), executor);
//! let request = DynamicQueryRequest::new("customer_base_query")
//!     .filter("active_only")
//!     .order_by("name_asc");
//! assert_eq!(service.execute(&request).unwrap().len(), 2);
//! assert_eq!(service.count(&request).unwrap(), 2);
//! ```

pub mod admin;
pub mod coerce;
pub mod compose;
pub mod customer;
pub mod datatype;
pub mod error;
pub mod execute;
pub mod fragment;
pub mod indicator;
pub mod persist;
pub mod preview;
pub mod rule;
pub mod server;
pub mod service;
pub mod settings;
