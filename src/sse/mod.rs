pub mod models;
pub use models::*;

mod hub;
pub use hub::*;

mod events_sse;

pub use events_sse::events_sse;
