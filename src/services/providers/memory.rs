use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::RwLock;

use crate::{
    error::AppResult,
    models::{InteractionSnapshot, Item, ItemKey, UserId},
    services::providers::{Catalog, InteractionStore},
};

/// Catalog held in process memory
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    items: RwLock<BTreeMap<ItemKey, Item>>,
}

impl MemoryCatalog {
    pub fn new(items: Vec<Item>) -> Self {
        Self {
            items: RwLock::new(items.into_iter().map(|item| (item.key, item)).collect()),
        }
    }

    pub async fn clear(&self) {
        self.items.write().await.clear();
    }
}

#[async_trait::async_trait]
impl Catalog for MemoryCatalog {
    async fn list_items(&self) -> AppResult<Vec<Item>> {
        Ok(self.items.read().await.values().cloned().collect())
    }

    async fn find_items_by_keys(&self, keys: &[ItemKey]) -> AppResult<Vec<Item>> {
        let items = self.items.read().await;
        Ok(keys.iter().filter_map(|key| items.get(key).cloned()).collect())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Interaction store held in process memory
#[derive(Debug, Default)]
pub struct MemoryInteractionStore {
    sets: RwLock<InteractionSnapshot>,
}

impl MemoryInteractionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, user_id: UserId, item: ItemKey) {
        self.sets
            .write()
            .await
            .entry(user_id)
            .or_default()
            .insert(item);
    }

    pub async fn remove(&self, user_id: UserId, item: ItemKey) {
        if let Some(items) = self.sets.write().await.get_mut(&user_id) {
            items.remove(&item);
        }
    }

    pub async fn set_user(&self, user_id: UserId, items: impl IntoIterator<Item = ItemKey>) {
        self.sets
            .write()
            .await
            .insert(user_id, items.into_iter().collect());
    }
}

#[async_trait::async_trait]
impl InteractionStore for MemoryInteractionStore {
    async fn get_user_set(&self, user_id: UserId) -> AppResult<BTreeSet<ItemKey>> {
        Ok(self
            .sets
            .read()
            .await
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn all_user_sets(&self) -> AppResult<InteractionSnapshot> {
        // Cloned under one read guard, so no writer can interleave
        Ok(self.sets.read().await.clone())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_find_items_skips_unknown_keys() {
        let catalog = MemoryCatalog::new(vec![
            Item::new(1, "Up", "", &[], 3.0),
            Item::new(2, "Coco", "", &[], 4.0),
        ]);

        let found = catalog
            .find_items_by_keys(&[ItemKey(2), ItemKey(99)])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].key, ItemKey(2));
    }

    #[tokio::test]
    async fn test_most_popular_default_ranking() {
        let catalog = MemoryCatalog::new(vec![
            Item::new(1, "Up", "", &[], 3.0),
            Item::new(2, "Coco", "", &[], 4.0),
            Item::new(3, "Cars", "", &[], 1.0),
        ]);

        let keys = catalog.most_popular(2).await.unwrap();
        assert_eq!(keys, vec![ItemKey(2), ItemKey(1)]);
    }

    #[tokio::test]
    async fn test_store_add_and_remove() {
        let store = MemoryInteractionStore::new();
        let user = UserId(Uuid::new_v4());

        store.add(user, ItemKey(1)).await;
        store.add(user, ItemKey(2)).await;
        store.add(user, ItemKey(2)).await;
        store.remove(user, ItemKey(1)).await;

        let items = store.get_user_set(user).await.unwrap();
        assert_eq!(items, BTreeSet::from([ItemKey(2)]));
    }

    #[tokio::test]
    async fn test_unknown_user_has_empty_set() {
        let store = MemoryInteractionStore::new();
        let items = store.get_user_set(UserId(Uuid::new_v4())).await.unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_unaffected_by_later_writes() {
        let store = MemoryInteractionStore::new();
        let user = UserId(Uuid::new_v4());
        store.set_user(user, [ItemKey(1), ItemKey(2)]).await;

        let snapshot = store.all_user_sets().await.unwrap();
        store.add(user, ItemKey(3)).await;

        assert_eq!(snapshot[&user].len(), 2);
        assert_eq!(store.get_user_set(user).await.unwrap().len(), 3);
    }
}
