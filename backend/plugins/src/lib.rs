pub mod manifest;
pub mod registry;
pub mod store;

pub use manifest::{HandlerManifest, IntentDecl};
pub use registry::{HandlerRegistry, HandlerSummary};
pub use store::{
    CronRecord, FileStore, HandlerRecord, IntentRecord, MemoryStore, RegistrationStore, StoreDocument, StoreError,
};
