mod routes;
mod server;

pub use routes::{AppState, routes};
pub use server::serve;
