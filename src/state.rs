use crate::{
    config::Config,
    services::{profile_client::ProfileDirectory, rate_limit::RateGovernor},
    websocket::ConnectionRegistry,
};
use sqlx::{Pool, Postgres};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: Pool<Postgres>,
    pub registry: ConnectionRegistry,
    pub redis: redis::Client,
    pub config: Arc<Config>,
    pub governor: Arc<RateGovernor>,
    pub profiles: Arc<dyn ProfileDirectory>,
}
