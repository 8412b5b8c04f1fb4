use crate::{
    config::AppConfig,
    db::{DbPool, OrmConn},
    payment::PaymentGateway,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub orm: OrmConn,
    pub config: AppConfig,
    pub payment: PaymentGateway,
}
