//! Mapping of raw completion text onto [`StructuredMenu`].

use crate::error::AnalysisError;
use crate::schema::StructuredMenu;

/// Fence markers removed from completion text before parsing. `` ```json ``
/// goes first so its trailing `json` is not left behind.
const FENCE_MARKERS: [&str; 2] = ["```json", "```"];

/// Remove every code-fence marker, wherever it appears, and trim.
pub fn strip_fences(text: &str) -> String {
    let mut cleaned = text.to_string();
    for marker in FENCE_MARKERS {
        cleaned = cleaned.replace(marker, "");
    }
    cleaned.trim().to_string()
}

/// Parse completion text into a menu.
///
/// The error carries the unmodified `raw` text so a failed run can still be
/// diagnosed.
pub fn parse_menu(raw: &str) -> Result<StructuredMenu, AnalysisError> {
    let cleaned = strip_fences(raw);

    let menu: StructuredMenu = serde_json::from_str(&cleaned).map_err(|e| AnalysisError::Parse {
        message: format!(
            "{} (near: {})",
            e,
            cleaned.chars().take(200).collect::<String>()
        ),
        raw: raw.to_string(),
    })?;

    validate(&menu).map_err(|message| AnalysisError::Parse {
        message,
        raw: raw.to_string(),
    })?;

    Ok(menu)
}

fn validate(menu: &StructuredMenu) -> Result<(), String> {
    for category in &menu.categories {
        for item in &category.items {
            if !item.price.is_finite() || item.price < 0.0 {
                return Err(format!(
                    "item '{}' in category '{}' has invalid price {}",
                    item.name, category.name, item.price
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCause;
    use crate::schema::{Category, MenuItem};

    const MENU_JSON: &str =
        r#"{"categories":[{"name":"Drinks","items":[{"name":"Tea","price":2.5}]}]}"#;

    #[test]
    fn test_parse_fenced_json() {
        let raw = format!("```json\n{}\n```", MENU_JSON);
        let menu = parse_menu(&raw).unwrap();

        assert_eq!(menu.categories.len(), 1);
        assert_eq!(menu.categories[0].name, "Drinks");
        assert_eq!(menu.categories[0].items.len(), 1);
        assert_eq!(menu.categories[0].items[0].name, "Tea");
        assert_eq!(menu.categories[0].items[0].price, 2.5);
    }

    #[test]
    fn test_strip_markers_anywhere() {
        let raw = format!("```{}```json\n```", MENU_JSON);
        assert_eq!(strip_fences(&raw), MENU_JSON);
        assert!(parse_menu(&raw).is_ok());
    }

    #[test]
    fn test_strip_fences_is_idempotent() {
        let inputs = [
            MENU_JSON.to_string(),
            format!("```json{}```", MENU_JSON),
            format!("```\n```json\n{}\n```\n```", MENU_JSON),
        ];
        for input in inputs {
            let once = strip_fences(&input);
            assert_eq!(strip_fences(&once), once);
            assert_eq!(once, MENU_JSON);
        }
    }

    #[test]
    fn test_plain_json_without_fences() {
        let menu = parse_menu(MENU_JSON).unwrap();
        assert_eq!(menu.item_count(), 1);
    }

    #[test]
    fn test_null_items_is_empty_category() {
        let raw = r#"{"categories":[{"name":"Specials","items":null},{"name":"Drinks","items":[{"name":"Tea","description":null,"price":2.5}]}]}"#;
        let menu = parse_menu(raw).unwrap();

        assert_eq!(menu.categories.len(), 2);
        assert_eq!(menu.categories[0].name, "Specials");
        assert!(menu.categories[0].items.is_empty());
        assert_eq!(menu.categories[1].items[0].name, "Tea");
        assert_eq!(menu.categories[1].items[0].description, None);
    }

    #[test]
    fn test_prose_is_parse_error() {
        let raw = "I'm sorry, I could not find any menu items in that data.";
        let err = parse_menu(raw).unwrap_err();
        assert_eq!(err.cause(), ErrorCause::ResultParse);
        assert_eq!(err.raw_completion(), Some(raw));
    }

    #[test]
    fn test_schema_mismatch_is_parse_error() {
        let err = parse_menu(r#"{"menu":[{"category":"Food"}]}"#).unwrap_err();
        assert_eq!(err.cause(), ErrorCause::ResultParse);
    }

    #[test]
    fn test_negative_price_rejected() {
        let raw = r#"{"categories":[{"name":"Food","items":[{"name":"Soup","price":-1}]}]}"#;
        let err = parse_menu(raw).unwrap_err();
        assert!(err.to_string().contains("Soup"));
    }

    #[test]
    fn test_round_trip_preserves_order_and_duplicates() {
        let menu = StructuredMenu {
            categories: vec![
                Category {
                    name: "Food".to_string(),
                    items: vec![
                        MenuItem {
                            name: "Garlic Bread".to_string(),
                            description: Some("Toasted bread with garlic.".to_string()),
                            price: 4.99,
                        },
                        MenuItem {
                            name: "Garlic Bread".to_string(),
                            description: None,
                            price: 0.0,
                        },
                    ],
                },
                Category {
                    name: "Drinks".to_string(),
                    items: vec![MenuItem {
                        name: "Latte".to_string(),
                        description: None,
                        price: 3.99,
                    }],
                },
                Category {
                    name: "Food".to_string(),
                    items: vec![],
                },
            ],
        };

        let serialized = serde_json::to_string(&menu).unwrap();
        let parsed = parse_menu(&format!("```json\n{}\n```", serialized)).unwrap();
        assert_eq!(parsed, menu);
    }
}
