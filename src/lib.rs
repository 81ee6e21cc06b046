pub mod server;
pub mod shared;
pub mod utils;

pub use server::{AdminServer, ServerConfig};
pub use shared::RemoteEndpoint;
