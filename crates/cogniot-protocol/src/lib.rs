pub mod credentials;
pub mod events;

pub use credentials::*;
pub use events::*;
