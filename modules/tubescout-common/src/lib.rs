pub mod config;
pub mod degradable;
pub mod error;
pub mod types;

pub use config::Config;
pub use degradable::Degradable;
pub use error::TubescoutError;
pub use types::*;
