pub mod assigner;
pub mod config;
pub mod error;
pub mod workspace;

pub use assigner::*;
pub use config::*;
pub use error::*;
pub use rota_storage::next_user;
pub use workspace::*;
