pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod pubs;
pub mod rating;
pub mod store;
pub mod validation;

pub use api::{router, AppState};
pub use auth::{AuthService, TokenIssuer};
pub use config::{Backend, Config};
pub use error::{Error, Result};
pub use models::*;
pub use orchestrator::ReviewOrchestrator;
pub use pubs::PubService;
pub use rating::{average_rating, recompute_pub_rating};
pub use store::{JsonStore, PostgresStore, Store, Transaction};
pub use validation::ReviewInput;
