//! Menu boundary: plain CRUD against the remote store.
//!
//! No lifecycle semantics here; items are validated for required fields
//! at the boundary and stored as-is. Orders snapshot a menu item's name
//! and price at creation time, so menu edits never rewrite existing
//! orders or their totals.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::api::StoreClient;
use crate::error::BoardError;
use crate::orders::OrderLine;

/// Path of the menu collection under the database root.
pub const MENU_PATH: &str = "menu";

fn default_available() -> bool {
    true
}

/// A menu item as held in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuItem {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: f64,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Legacy documents spell this `availability`.
    #[serde(default = "default_available", alias = "availability")]
    pub available: bool,
}

impl MenuItem {
    /// Decode a store document, injecting the collection key as the id.
    pub fn from_document(id: &str, mut doc: Value) -> Result<MenuItem, BoardError> {
        let obj = doc.as_object_mut().ok_or_else(|| {
            BoardError::FetchFailure(format!("menu document {id} is not an object"))
        })?;
        obj.insert("id".to_string(), Value::String(id.to_string()));
        serde_json::from_value(doc)
            .map_err(|e| BoardError::FetchFailure(format!("malformed menu document {id}: {e}")))
    }
}

/// Creation payload. `name`, `price` and `category` are mandatory;
/// everything else defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMenuItem {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub image: Option<String>,
}

impl NewMenuItem {
    /// Required-field check, applied before any network call.
    pub fn validate(&self) -> Result<(), BoardError> {
        let mut missing = Vec::new();
        if self.name.trim().is_empty() {
            missing.push("name");
        }
        if self.price.is_none() {
            missing.push("price");
        }
        if self.category.trim().is_empty() {
            missing.push("category");
        }
        if !missing.is_empty() {
            return Err(BoardError::Validation(format!(
                "missing required fields: {}",
                missing.join(", ")
            )));
        }
        let price = self.price.unwrap_or_default();
        if !price.is_finite() || price < 0.0 {
            return Err(BoardError::Validation(
                "price must be a non-negative number".into(),
            ));
        }
        Ok(())
    }
}

/// Partial update; absent fields are left untouched by the store's merge
/// semantics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuItemPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available: Option<bool>,
}

impl MenuItemPatch {
    pub fn validate(&self) -> Result<(), BoardError> {
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(BoardError::Validation("name cannot be blank".into()));
            }
        }
        if let Some(category) = &self.category {
            if category.trim().is_empty() {
                return Err(BoardError::Validation("category cannot be blank".into()));
            }
        }
        if let Some(price) = self.price {
            if !price.is_finite() || price < 0.0 {
                return Err(BoardError::Validation(
                    "price must be a non-negative number".into(),
                ));
            }
        }
        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.price.is_none()
            && self.category.is_none()
            && self.image.is_none()
            && self.available.is_none()
    }
}

/// Snapshot a menu item into an order line. The line keeps its own copy
/// of the name and price; later menu edits do not reach it.
pub fn order_line_from_item(item: &MenuItem, quantity: u32, note: Option<String>) -> OrderLine {
    OrderLine {
        menu_item_id: Some(item.id.clone()),
        name: item.name.clone(),
        price: item.price,
        quantity,
        special_instructions: note,
    }
}

// ---------------------------------------------------------------------------
// CRUD client
// ---------------------------------------------------------------------------

/// Menu CRUD over the store's REST surface.
pub struct MenuClient {
    client: StoreClient,
}

impl MenuClient {
    pub fn new(client: StoreClient) -> Self {
        MenuClient { client }
    }

    /// Fetch the whole menu. Malformed documents are skipped with a
    /// warning, matching the order snapshot decoder.
    pub async fn list_items(&self) -> Result<Vec<MenuItem>, BoardError> {
        let snapshot = self.client.get(MENU_PATH).await?;
        match snapshot {
            Value::Null => Ok(Vec::new()),
            Value::Object(map) => {
                let mut items = Vec::with_capacity(map.len());
                for (id, doc) in map {
                    match MenuItem::from_document(&id, doc) {
                        Ok(item) => items.push(item),
                        Err(e) => {
                            warn!(item_id = %id, error = %e, "skipping malformed menu document")
                        }
                    }
                }
                Ok(items)
            }
            other => Err(BoardError::FetchFailure(format!(
                "unexpected menu snapshot: {other}"
            ))),
        }
    }

    pub async fn get_item(&self, id: &str) -> Result<MenuItem, BoardError> {
        let doc = self.client.get(&format!("{MENU_PATH}/{id}")).await?;
        if doc.is_null() {
            return Err(BoardError::NotFound(format!("menu item {id}")));
        }
        MenuItem::from_document(id, doc)
    }

    /// Create a menu item. Validation runs before any network call;
    /// `available` starts true and description/image default.
    pub async fn create_item(&self, new: &NewMenuItem) -> Result<MenuItem, BoardError> {
        new.validate()?;

        let item = serde_json::json!({
            "name": new.name.trim(),
            "description": new.description,
            "price": new.price,
            "category": new.category.trim(),
            "image": new.image,
            "available": true,
        });
        let resp = self.client.post(MENU_PATH, &item).await?;
        let id = resp
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                BoardError::StoreUnavailable("store did not return an id for the menu item".into())
            })?;
        MenuItem::from_document(id, item)
    }

    /// Merge changed fields into an existing item. Checks existence first
    /// so a patch never conjures a partial document out of a bad id.
    pub async fn update_item(&self, id: &str, patch: &MenuItemPatch) -> Result<(), BoardError> {
        patch.validate()?;
        if patch.is_empty() {
            return Err(BoardError::Validation("no fields to update".into()));
        }
        self.get_item(id).await?;
        let fields = serde_json::to_value(patch)
            .map_err(|e| BoardError::Validation(format!("unserializable patch: {e}")))?;
        self.client
            .patch(&format!("{MENU_PATH}/{id}"), &fields)
            .await
            .map(|_| ())
    }

    pub async fn delete_item(&self, id: &str) -> Result<MenuItem, BoardError> {
        let item = self.get_item(id).await?;
        self.client.delete(&format!("{MENU_PATH}/{id}")).await?;
        Ok(item)
    }
}
