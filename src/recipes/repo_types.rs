use std::fmt;

use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Recipe row, without its associations.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Recipe {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub time_minutes: i32,
    pub price: Decimal,
    pub link: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>, // storage key, not a URL
    pub created_at: OffsetDateTime,
}

impl fmt::Display for Recipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.title)
    }
}

/// A tag or an ingredient. Both are a name owned by one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct Label {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
}

pub type Tag = Label;
pub type Ingredient = Label;

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A recipe with its tags and ingredients, read as one unit.
#[derive(Debug, Clone)]
pub struct RecipeAggregate {
    pub recipe: Recipe,
    pub tags: Vec<Tag>,
    pub ingredients: Vec<Ingredient>,
}

impl fmt::Display for RecipeAggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.recipe, f)
    }
}

/// A recipe after its image was replaced, with the key it pointed at before.
#[derive(Debug, Clone, FromRow)]
pub struct ImageSwap {
    #[sqlx(flatten)]
    pub recipe: Recipe,
    pub previous_image: Option<String>,
}

/// Values for a recipe that does not exist yet, with the label names to attach.
#[derive(Debug, Clone)]
pub struct NewRecipe {
    pub title: String,
    pub time_minutes: i32,
    pub price: Decimal,
    pub link: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub ingredients: Vec<String>,
}

/// Partial recipe update.
///
/// `None` leaves a field untouched. For `link`/`description`, `Some(None)` clears
/// the value. For `tags`/`ingredients`, `Some(names)` replaces every association
/// of that kind, so `Some(vec![])` detaches them all.
#[derive(Debug, Clone, Default)]
pub struct RecipeChanges {
    pub title: Option<String>,
    pub time_minutes: Option<i32>,
    pub price: Option<Decimal>,
    pub link: Option<Option<String>>,
    pub description: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
    pub ingredients: Option<Vec<String>>,
}

/// List filter. A recipe matches a list when it has any of its ids.
#[derive(Debug, Clone, Default)]
pub struct RecipeFilter {
    pub tags: Option<Vec<Uuid>>,
    pub ingredients: Option<Vec<Uuid>>,
}
