//! Client state layer for the Parley chat service.
//!
//! [`ChatSession`] drives an explicit [`ChatStore`] from the HTTP API and the
//! change-event stream; every operation reports back as an [`Outcome`].

pub mod api;
pub mod error;
pub mod outcome;
pub mod pending;
pub mod session;
pub mod store;
pub mod subscriptions;
pub mod types;

pub use api::ApiClient;
pub use error::ClientError;
pub use outcome::{Failure, Outcome};
pub use pending::PendingOps;
pub use session::{ChatSession, TurnSummary};
pub use store::{ActiveChat, ChatStore, StoreAction};
pub use subscriptions::{SubscriptionKey, SubscriptionManager};
