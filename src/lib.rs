//! Code Letters backend: opaque sessions, envelope encryption and the
//! chunked card payload store behind a small axum API.

pub mod config;
pub mod db;
pub mod error;
pub mod router;
pub mod state;
pub mod transport;

pub mod crypto {
    pub mod aes;
    pub mod envelope;
    pub mod ids;
    pub mod key_material;
    pub mod keyring;
    pub mod mac;
    pub mod password;
    pub mod web_token;
}

pub mod codec {
    pub mod binary;
    pub mod packet;
}

pub mod models {
    pub mod card;
    pub mod session;
    pub mod user;
}

pub mod repositories {
    pub mod card;
    pub mod memory;
    pub mod postgres;
    pub mod session;
    pub mod user;
}

pub mod services {
    pub mod auth;
    pub mod cards;
    pub mod sessions;
}

pub mod handlers {
    pub mod auth;
    pub mod cards;
    pub mod users;
}

pub mod middleware_layer {
    pub mod request;
    pub mod session;
}

pub mod validation {
    pub mod auth;
}

pub mod utils {
    pub mod time;
}

pub use config::Config;
pub use error::{AppError, Result};
pub use router::build_router;
pub use state::AppState;
