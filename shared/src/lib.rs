pub mod config;
pub mod error;
pub mod ipc;
pub mod types;

pub use config::*;
pub use error::*;
pub use ipc::*;
pub use types::*;
