//! Glowcart — checkout and payment reconciliation engine.
//!
//! The backend of a cosmetics shop, focused on the part that has to stay
//! consistent under concurrency: cart contents, per-shade stock, order state
//! and payment state. Catalog management, identity and the payment provider
//! are external collaborators consumed through narrow seams.
//!
//! ## Layout
//! - [`domain`] — cart and order aggregates, catalog read models, the order
//!   status transition table.
//! - [`store`] — the persistence seam; the stock ledger's conditional
//!   decrement lives behind it.
//! - [`services`] — cart consistency, order creation/lifecycle, payment
//!   reconciliation.
//! - [`api`] — axum router and handlers.

pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod services;
pub mod store;
