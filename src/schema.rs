//! Menu analysis data model.
//!
//! Field names on the wire follow the stored menu record:
//! `venueId`, `visionResult`, `rawCategoryResult`, `categoryResult`.

use crate::shape::{Describe, Field, Shape, StructShape};
use serde::{Deserialize, Deserializer, Serialize};

/// Unstructured key/value output of the vision service, in response order.
pub type VisionExtraction = serde_json::Map<String, serde_json::Value>;

/// Result of one successful analysis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuAnalysis {
    /// Assigned by the persistence layer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Venue this menu belongs to, assigned by the persistence layer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub venue_id: Option<String>,
    pub source_file: String,
    /// SHA-256 of the uploaded image bytes.
    pub image_digest: String,
    #[serde(default)]
    pub vision_result: VisionExtraction,
    /// Completion text exactly as returned, before fence stripping.
    #[serde(default)]
    pub raw_category_result: String,
    pub category_result: StructuredMenu,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<u64>,
}

/// Categorized menu produced by the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredMenu {
    pub categories: Vec<Category>,
}

impl StructuredMenu {
    pub fn item_count(&self) -> usize {
        self.categories.iter().map(|c| c.items.len()).sum()
    }
}

/// A menu section such as "Drinks" or "Starters".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub items: Vec<MenuItem>,
}

/// Accept `null` where a list is expected and treat it as empty.
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuItem {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub price: f64,
}

impl Describe for StructuredMenu {
    fn shape() -> Shape {
        Shape::Struct(StructShape {
            name: "Menu",
            fields: vec![Field::new("categories", || Shape::list(Category::shape()))],
        })
    }
}

impl Describe for Category {
    fn shape() -> Shape {
        Shape::Struct(StructShape {
            name: "Category",
            fields: vec![
                Field::new("name", || Shape::String),
                Field::new("items", || Shape::list(MenuItem::shape())),
            ],
        })
    }
}

impl Describe for MenuItem {
    fn shape() -> Shape {
        Shape::Struct(StructShape {
            name: "MenuItem",
            fields: vec![
                Field::new("name", || Shape::String),
                Field::new("description", || Shape::optional(Shape::String)),
                Field::new("price", || Shape::Number),
            ],
        })
    }
}
