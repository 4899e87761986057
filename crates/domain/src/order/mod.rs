//! Order aggregate and related types.

mod aggregate;
mod state;

pub use aggregate::{FulfillmentMethod, NewOrder, Order, OrderItem, OrderLine};
pub use state::OrderStatus;
