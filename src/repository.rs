//! Menu persistence.
//!
//! The pipeline only hands its result over; storage lives behind
//! [`MenuRepository`]. [`InMemoryMenuRepository`] keeps records in process
//! memory, which is enough for a single instance and for tests.

use crate::schema::{MenuAnalysis, StructuredMenu};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("venue id must not be empty")]
    EmptyVenueId,
    #[error("menu store is unavailable: {0}")]
    Unavailable(String),
}

#[async_trait::async_trait]
pub trait MenuRepository: Send + Sync {
    /// Store an analysis for a venue. Returns the stored record with its
    /// generated id, venue reference and creation time filled in.
    async fn create_menu(
        &self,
        analysis: MenuAnalysis,
        venue_id: &str,
    ) -> Result<MenuAnalysis, RepositoryError>;

    async fn get_menu(&self, id: &str) -> Result<Option<MenuAnalysis>, RepositoryError>;

    /// Most recently stored menu for a venue.
    async fn menu_for_venue(&self, venue_id: &str)
        -> Result<Option<StructuredMenu>, RepositoryError>;
}

#[derive(Debug, Default)]
struct Records {
    menus: HashMap<String, MenuAnalysis>,
    by_venue: HashMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryMenuRepository {
    inner: Arc<RwLock<Records>>,
}

impl InMemoryMenuRepository {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.read().map(|r| r.menus.len()).unwrap_or(0)
    }
}

fn poisoned<T>(_: T) -> RepositoryError {
    RepositoryError::Unavailable("lock poisoned".to_string())
}

#[async_trait::async_trait]
impl MenuRepository for InMemoryMenuRepository {
    async fn create_menu(
        &self,
        mut analysis: MenuAnalysis,
        venue_id: &str,
    ) -> Result<MenuAnalysis, RepositoryError> {
        if venue_id.trim().is_empty() {
            return Err(RepositoryError::EmptyVenueId);
        }

        let id = format!("menu_{}", Uuid::new_v4().simple());
        analysis.id = Some(id.clone());
        analysis.venue_id = Some(venue_id.to_string());
        analysis.created_at = Some(
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
        );

        let mut records = self.inner.write().map_err(poisoned)?;
        records.menus.insert(id.clone(), analysis.clone());
        records.by_venue.insert(venue_id.to_string(), id.clone());
        tracing::debug!("MenuRepository: stored '{}' for venue '{}'", id, venue_id);

        Ok(analysis)
    }

    async fn get_menu(&self, id: &str) -> Result<Option<MenuAnalysis>, RepositoryError> {
        let records = self.inner.read().map_err(poisoned)?;
        Ok(records.menus.get(id).cloned())
    }

    async fn menu_for_venue(
        &self,
        venue_id: &str,
    ) -> Result<Option<StructuredMenu>, RepositoryError> {
        let records = self.inner.read().map_err(poisoned)?;
        Ok(records
            .by_venue
            .get(venue_id)
            .and_then(|id| records.menus.get(id))
            .map(|m| m.category_result.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Category, VisionExtraction};

    fn analysis(category: &str) -> MenuAnalysis {
        MenuAnalysis {
            id: None,
            venue_id: None,
            source_file: "menu.jpg".to_string(),
            image_digest: "00".to_string(),
            vision_result: VisionExtraction::new(),
            raw_category_result: String::new(),
            category_result: StructuredMenu {
                categories: vec![Category {
                    name: category.to_string(),
                    items: vec![],
                }],
            },
            created_at: None,
        }
    }

    #[tokio::test]
    async fn test_create_assigns_id_and_venue() {
        let repo = InMemoryMenuRepository::new();
        let stored = repo.create_menu(analysis("Drinks"), "venue_1").await.unwrap();

        let id = stored.id.clone().unwrap();
        assert!(id.starts_with("menu_"));
        assert_eq!(stored.venue_id.as_deref(), Some("venue_1"));
        assert!(stored.created_at.is_some());

        let fetched = repo.get_menu(&id).await.unwrap().unwrap();
        assert_eq!(fetched.category_result, stored.category_result);
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn test_latest_menu_per_venue_wins() {
        let repo = InMemoryMenuRepository::new();
        repo.create_menu(analysis("Old"), "venue_1").await.unwrap();
        repo.create_menu(analysis("New"), "venue_1").await.unwrap();

        let menu = repo.menu_for_venue("venue_1").await.unwrap().unwrap();
        assert_eq!(menu.categories[0].name, "New");
        assert!(repo.menu_for_venue("venue_2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_venue_rejected() {
        let repo = InMemoryMenuRepository::new();
        let err = repo.create_menu(analysis("Drinks"), "  ").await.unwrap_err();
        assert!(matches!(err, RepositoryError::EmptyVenueId));
        assert_eq!(repo.len(), 0);
    }
}
