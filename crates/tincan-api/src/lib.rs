pub mod auth;
pub mod chats;
pub mod error;
pub mod hydrate;
pub mod messages;
pub mod middleware;
pub mod reactions;
pub mod router;

use std::sync::Arc;

use tincan_db::Store;
use tincan_gateway::dispatcher::Dispatcher;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub store: Store,
    pub dispatcher: Dispatcher,
    pub jwt_secret: String,
}
