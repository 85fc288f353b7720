//! Product Aggregate
//!
//! Catalog records are owned elsewhere; the storefront core only reads them.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::value_objects::Money;
use crate::StorefrontError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category { MenClothing, WomenClothing, Accessories, Electronics }

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MenClothing => "men-clothing",
            Self::WomenClothing => "women-clothing",
            Self::Accessories => "accessories",
            Self::Electronics => "electronics",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Category {
    type Err = StorefrontError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "men-clothing" => Ok(Self::MenClothing),
            "women-clothing" => Ok(Self::WomenClothing),
            "accessories" => Ok(Self::Accessories),
            "electronics" => Ok(Self::Electronics),
            other => Err(StorefrontError::validation(format!("Unknown category {other}"))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub price: Money,
    pub category: Category,
    pub image_url: String,
    pub in_stock: bool,
    pub created_at: DateTime<Utc>,
}

impl Product {
    pub fn new(name: impl Into<String>, price: Money, category: Category, image_url: impl Into<String>) -> Result<Self, StorefrontError> {
        if price.is_negative() { return Err(StorefrontError::validation("Price cannot be negative")); }
        Ok(Self {
            id: Uuid::now_v7(), name: name.into(), price, category,
            image_url: image_url.into(), in_stock: true, created_at: Utc::now(),
        })
    }
}
