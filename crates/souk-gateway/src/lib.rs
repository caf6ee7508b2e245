pub mod connection;
pub mod dispatcher;
pub mod distributor;
pub mod fanout;
pub mod polls;
pub mod reactions;
pub mod registry;
pub mod resolver;

use std::sync::Arc;

use souk_db::Database;

use crate::dispatcher::Dispatcher;

/// Shared handles the connection loop and the chat engine run on.
#[derive(Clone)]
pub struct GatewayState {
    pub db: Arc<Database>,
    pub dispatcher: Dispatcher,
}

impl GatewayState {
    pub fn new(db: Arc<Database>, dispatcher: Dispatcher) -> Self {
        Self { db, dispatcher }
    }
}
