//! HTTP request handlers

pub mod attendance;
pub mod auth;
pub mod certificates;
pub mod editions;
pub mod extract;
pub mod health;
pub mod lessons;
pub mod middleware;
pub mod notifications;

pub use attendance::*;
pub use auth::*;
pub use certificates::*;
pub use editions::*;
pub use extract::*;
pub use health::*;
pub use lessons::*;
pub use notifications::*;

use crate::notify::Notifier;
use crate::storage::CertificateStore;
use sqlx::PgPool;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub store: CertificateStore,
    pub notifier: Notifier,
    pub max_certificate_size: usize,
    pub is_production: bool,
}
