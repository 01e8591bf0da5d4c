pub mod client;
pub mod error;
pub mod protocol;
pub mod reassembly;

pub use client::{SonioxClient, SonioxConnector};
pub use error::SonioxError;
