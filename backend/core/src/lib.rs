pub mod error;
pub mod i18n;
pub mod message;
pub mod traits;
pub mod types;

pub use error::CoreError;
pub use i18n::Catalog;
pub use message::{DispatchResult, Outcome, Utterance};
pub use traits::NluClient;
pub use types::{Destinations, HandlerUid, SessionId, ZoneId};
