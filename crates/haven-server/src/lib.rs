pub mod client;
pub mod connectivity;
pub mod event_bridge;
pub mod handlers;
pub mod rpc;
pub mod server;
pub mod service;
pub mod wire;

pub use connectivity::Connectivity;
pub use handlers::HandlerState;
pub use server::{start, ServerConfig, ServerHandle};
pub use service::{CrisisService, EngineService};
