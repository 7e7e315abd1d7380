//! Validate/authorize/initialize subscription lifecycle and the root that
//! drives it.
pub mod adapter;
pub mod callback;
pub mod root;
pub mod subscriber;

pub use adapter::Adapter;
pub use root::{Root, SubscribedNode};
pub use subscriber::{Subscriber, SubscriberHandle};
