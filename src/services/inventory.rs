use uuid::Uuid;

use crate::{
    domain::{Product, cart::ensure_positive_quantity},
    error::{AppError, AppResult},
    store::ProductStore,
};

/// Stock reservations against the product store.
pub struct InventoryLedger<'a, S> {
    store: &'a S,
}

impl<'a, S: ProductStore> InventoryLedger<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Takes `quantity` units out of stock and returns the product as it is
    /// after the reservation.
    pub async fn reserve(&self, product_id: Uuid, quantity: i32) -> AppResult<Product> {
        ensure_positive_quantity(quantity)?;

        let product = self
            .store
            .find_product(product_id)
            .await?
            .ok_or(AppError::not_found("product", product_id))?;
        if product.stock < quantity {
            return Err(AppError::InsufficientInventory {
                product_id,
                available: product.stock,
                requested: quantity,
            });
        }

        // the read above is advisory; the conditional decrement is what decides
        match self
            .store
            .decrement_stock_if_available(product_id, quantity)
            .await?
        {
            Some(updated) => {
                tracing::debug!(%product_id, quantity, stock = updated.stock, "inventory reserved");
                Ok(updated)
            }
            None => {
                let available = self
                    .store
                    .find_product(product_id)
                    .await?
                    .map(|p| p.stock)
                    .unwrap_or(0);
                Err(AppError::InsufficientInventory {
                    product_id,
                    available,
                    requested: quantity,
                })
            }
        }
    }

    pub async fn release(&self, product_id: Uuid, quantity: i32) -> AppResult<Product> {
        ensure_positive_quantity(quantity)?;

        let updated = self
            .store
            .increment_stock(product_id, quantity)
            .await?
            .ok_or(AppError::not_found("product", product_id))?;
        tracing::debug!(%product_id, quantity, stock = updated.stock, "inventory released");
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn store_with(stock: i32) -> (MemoryStore, Uuid) {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();
        store
            .insert_product(Product {
                id,
                name: "Widget".into(),
                price: 100,
                stock,
            })
            .unwrap();
        (store, id)
    }

    #[tokio::test]
    async fn reserve_and_release_adjust_stock() {
        let (store, id) = store_with(5);
        let ledger = InventoryLedger::new(&store);

        assert_eq!(ledger.reserve(id, 5).await.unwrap().stock, 0);
        assert_eq!(ledger.release(id, 2).await.unwrap().stock, 2);
    }

    #[tokio::test]
    async fn reserve_refuses_to_oversell() {
        let (store, id) = store_with(1);
        let ledger = InventoryLedger::new(&store);

        let err = ledger.reserve(id, 2).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::InsufficientInventory {
                available: 1,
                requested: 2,
                ..
            }
        ));
        assert_eq!(store.find_product(id).await.unwrap().unwrap().stock, 1);
    }

    #[tokio::test]
    async fn release_past_i32_max_is_rejected() {
        let (store, id) = store_with(i32::MAX - 1);
        let ledger = InventoryLedger::new(&store);

        assert!(matches!(
            ledger.release(id, 2).await,
            Err(AppError::OutOfRange("stock"))
        ));
        assert_eq!(store.find_product(id).await.unwrap().unwrap().stock, i32::MAX - 1);
    }

    #[tokio::test]
    async fn unknown_product_is_not_found() {
        let store = MemoryStore::new();
        let ledger = InventoryLedger::new(&store);

        assert!(matches!(
            ledger.reserve(Uuid::new_v4(), 1).await,
            Err(AppError::ResourceNotFound { resource: "product", .. })
        ));
        assert!(matches!(
            ledger.release(Uuid::new_v4(), 1).await,
            Err(AppError::ResourceNotFound { .. })
        ));
    }
}
