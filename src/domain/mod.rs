//! Domain model: catalog read side, cart aggregate, order aggregate.

pub mod cart;
pub mod catalog;
pub mod events;
pub mod order;

pub use cart::{Cart, CartLine, IssueCode, LineIssue};
pub use catalog::{resolve_price, Product, Shade};
pub use events::OrderEvent;
pub use order::{
    Order, OrderError, OrderLine, OrderStatus, PaymentMethod, PaymentStatus, ShippingAddress,
};
