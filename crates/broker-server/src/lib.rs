pub mod app;
pub mod error;
pub mod models;
pub mod routes;
pub mod sessions;
pub mod state;

pub use app::build_app;
pub use state::AppState;
