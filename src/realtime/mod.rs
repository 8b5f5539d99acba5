pub mod event;
pub mod state;
pub mod subscriber;

pub use event::{ChangeEvent, ChangeKind};
pub use state::{ConnectionState, SubscriptionStatus};
pub use subscriber::{dispatch, subscribe, ChangeHandler, Subscription};
