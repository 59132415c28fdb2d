pub mod config;
pub mod pipeline;
pub mod provider;
pub mod proxy;
pub mod routes;
pub mod state;
pub mod storage;

pub use state::AppState;
