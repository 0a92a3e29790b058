use log::debug;
use serde::Serialize;
use serde_json::{Value, json};

use super::TgtgClient;
use crate::error::{Error, Result};
use crate::http::ApiResponse;
use crate::runtime::Runtime;

pub(crate) const ITEM_ENDPOINT: &str = "item/v9/";
pub(crate) const FAVORITES_PAGE_SIZE: u32 = 100;

const MANUFACTURER_ITEM_ENDPOINT: &str = "manufactureritem/v2/";
const ACTIVE_ORDERS_ENDPOINT: &str = "order/v8/active";
const INACTIVE_ORDERS_ENDPOINT: &str = "order/v8/inactive";

const ACCEPTED_ACTION_TYPES: &[&str] = &["QUERY"];
const ACCEPTED_DISPLAY_TYPES: &[&str] = &["LIST", "FILL"];
const ACCEPTED_ELEMENT_TYPES: &[&str] = &[
    "ITEM",
    "HIGHLIGHTED_ITEM",
    "MANUFACTURER_STORY_CARD",
    "DUO_ITEMS",
    "DUO_ITEMS_V2",
    "TEXT",
    "PARCEL_TEXT",
    "NPS",
    "SMALL_CARDS_CAROUSEL",
    "ITEM_CARDS_CAROUSEL",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Origin {
    pub latitude: f64,
    pub longitude: f64,
}

/// Filters for an item listing. Serializes to the listing request body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemQuery {
    pub origin: Origin,
    pub radius: u32,
    pub page_size: u32,
    pub page: u32,
    pub discover: bool,
    pub favorites_only: bool,
    pub item_categories: Vec<String>,
    pub diet_categories: Vec<String>,
    pub pickup_earliest: Option<String>,
    pub pickup_latest: Option<String>,
    pub search_phrase: Option<String>,
    pub with_stock_only: bool,
    pub hidden_only: bool,
    pub we_care_only: bool,
}

impl Default for ItemQuery {
    fn default() -> Self {
        Self {
            origin: Origin::default(),
            radius: 21,
            page_size: 20,
            page: 1,
            discover: false,
            favorites_only: true,
            item_categories: Vec::new(),
            diet_categories: Vec::new(),
            pickup_earliest: None,
            pickup_latest: None,
            search_phrase: None,
            with_stock_only: false,
            hidden_only: false,
            we_care_only: false,
        }
    }
}

impl ItemQuery {
    /// Everything around a point, not just favorites.
    pub fn near(latitude: f64, longitude: f64, radius: u32) -> Self {
        Self {
            origin: Origin {
                latitude,
                longitude,
            },
            radius,
            favorites_only: false,
            ..Default::default()
        }
    }

    fn favorites_page(page: u32) -> Self {
        Self {
            page_size: FAVORITES_PAGE_SIZE,
            page,
            ..Default::default()
        }
    }

    fn to_body(&self) -> Result<Value> {
        let mut query = self.clone();
        query.search_phrase = query.search_phrase.filter(|s| !s.is_empty());
        Ok(serde_json::to_value(query)?)
    }
}

/// Fails unless the business outcome in the body is `SUCCESS`.
fn ensure_success_state(response: &ApiResponse) -> Result<Value> {
    let body: Value = response.json()?;
    if body["state"].as_str() != Some("SUCCESS") {
        return Err(Error::api(
            response.status.as_u16(),
            response.body.clone(),
        ));
    }
    Ok(body)
}

impl<R: Runtime> TgtgClient<R> {
    /// Lists items matching `query`.
    pub async fn get_items(&mut self, query: &ItemQuery) -> Result<Vec<Value>> {
        self.login().await?;
        let body = query.to_body()?;
        let response = self.post(ITEM_ENDPOINT, Some(&body)).await?;
        match response.json()? {
            Value::Object(mut listing) => Ok(match listing.remove("items") {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            }),
            _ => Err(Error::api(response.status.as_u16(), response.body)),
        }
    }

    pub async fn get_item(&mut self, item_id: &str) -> Result<Value> {
        self.login().await?;
        let path = format!("{}{}", ITEM_ENDPOINT, item_id);
        let response = self.post(&path, Some(&json!({ "origin": null }))).await?;
        response.json()
    }

    /// All favorite items, fetched page by page until a short page.
    pub async fn get_favorites(&mut self) -> Result<Vec<Value>> {
        let mut items = Vec::new();
        let mut page = 1;
        loop {
            let batch = self.get_items(&ItemQuery::favorites_page(page)).await?;
            let done = batch.len() < FAVORITES_PAGE_SIZE as usize;
            items.extend(batch);
            if done {
                break;
            }
            page += 1;
        }
        debug!("Fetched {} favorites over {} pages", items.len(), page);
        Ok(items)
    }

    pub async fn set_favorite(&mut self, item_id: &str, is_favorite: bool) -> Result<()> {
        self.login().await?;
        let path = format!("user/favorite/v1/{}/update", item_id);
        self.post(&path, Some(&json!({ "is_favorite": is_favorite })))
            .await?;
        Ok(())
    }

    /// Reserves `item_count` units of an item and returns the order.
    pub async fn create_order(&mut self, item_id: &str, item_count: u32) -> Result<Value> {
        self.login().await?;
        let path = format!("order/v8/create/{}", item_id);
        let response = self
            .post(&path, Some(&json!({ "item_count": item_count })))
            .await?;
        let mut body = ensure_success_state(&response)?;
        Ok(match body.get_mut("order").map(Value::take) {
            None | Some(Value::Null) => json!({}),
            Some(order) => order,
        })
    }

    pub async fn get_order_status(&mut self, order_id: &str) -> Result<Value> {
        self.login().await?;
        let path = format!("order/v8/{}/status", order_id);
        self.post(&path, None).await?.json()
    }

    pub async fn abort_order(&mut self, order_id: &str) -> Result<()> {
        self.login().await?;
        let path = format!("order/v8/{}/abort", order_id);
        let response = self
            .post(&path, Some(&json!({ "cancel_reason_id": 1 })))
            .await?;
        ensure_success_state(&response)?;
        Ok(())
    }

    pub async fn get_manufactureritems(&mut self) -> Result<Value> {
        self.login().await?;
        let body = json!({
            "action_types_accepted": ACCEPTED_ACTION_TYPES,
            "display_types_accepted": ACCEPTED_DISPLAY_TYPES,
            "element_types_accepted": ACCEPTED_ELEMENT_TYPES,
        });
        self.post(MANUFACTURER_ITEM_ENDPOINT, Some(&body))
            .await?
            .json()
    }

    pub async fn get_active_orders(&mut self) -> Result<Value> {
        self.login().await?;
        self.post(ACTIVE_ORDERS_ENDPOINT, Some(&json!({})))
            .await?
            .json()
    }

    pub async fn get_inactive_orders(&mut self, page: u32, page_size: u32) -> Result<Value> {
        self.login().await?;
        let body = json!({ "paging": { "page": page, "size": page_size } });
        self.post(INACTIVE_ORDERS_ENDPOINT, Some(&body))
            .await?
            .json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_item_query_defaults() {
        let body = ItemQuery::default().to_body().unwrap();
        assert_eq!(
            body,
            json!({
                "origin": {"latitude": 0.0, "longitude": 0.0},
                "radius": 21,
                "page_size": 20,
                "page": 1,
                "discover": false,
                "favorites_only": true,
                "item_categories": [],
                "diet_categories": [],
                "pickup_earliest": null,
                "pickup_latest": null,
                "search_phrase": null,
                "with_stock_only": false,
                "hidden_only": false,
                "we_care_only": false,
            })
        );
    }

    #[test]
    fn test_empty_search_phrase_is_sent_as_null() {
        let query = ItemQuery {
            search_phrase: Some(String::new()),
            ..ItemQuery::near(52.5, 13.4, 5)
        };
        let body = query.to_body().unwrap();
        assert_eq!(body["search_phrase"], Value::Null);
        assert_eq!(body["favorites_only"], json!(false));
        assert_eq!(body["origin"]["latitude"], json!(52.5));
    }

    #[test]
    fn test_ensure_success_state() {
        let ok = ApiResponse {
            status: StatusCode::OK,
            body: r#"{"state":"SUCCESS","order":{"id":"o1"}}"#.to_string(),
        };
        assert_eq!(ensure_success_state(&ok).unwrap()["order"]["id"], "o1");

        let sold_out = ApiResponse {
            status: StatusCode::OK,
            body: r#"{"state":"SOLD_OUT"}"#.to_string(),
        };
        let err = ensure_success_state(&sold_out).unwrap_err();
        assert!(matches!(err, Error::Api { status: 200, .. }));
    }
}
