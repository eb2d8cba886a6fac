use std::sync::Arc;

use crate::{
    db::{DbPool, OrmConn},
    store::OrmStore,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub orm: OrmConn,
    pub jwt_secret: Arc<str>,
}

impl AppState {
    pub fn new(pool: DbPool, jwt_secret: impl Into<Arc<str>>) -> Self {
        let orm = crate::db::orm_from_pool(pool.clone());
        Self {
            pool,
            orm,
            jwt_secret: jwt_secret.into(),
        }
    }

    pub fn store(&self) -> OrmStore {
        OrmStore::new(self.orm.clone())
    }
}
