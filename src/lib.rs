pub mod classifier;
pub mod config;
pub mod constants;
pub mod device;
pub mod history;
pub mod logging;
pub mod middleware;
pub mod mood;
pub mod response;
pub mod routes;
pub mod session;
pub mod state;
