use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::recipes::repo_types::{Label, NewRecipe, RecipeAggregate, RecipeChanges, RecipeFilter};

/// Column width of titles, links and label names.
pub const MAX_TEXT_LEN: usize = 255;
const MAX_PRICE_SCALE: u32 = 2;
// NUMERIC(5, 2)
const MAX_PRICE_EXCLUSIVE: i64 = 1000;

/// `{ "name": ... }` as submitted for a tag or an ingredient. A read-only `id`
/// echoed back by clients is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct LabelInput {
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LabelResponse {
    pub id: Uuid,
    pub name: String,
}

impl From<Label> for LabelResponse {
    fn from(l: Label) -> Self {
        Self {
            id: l.id,
            name: l.name,
        }
    }
}

/// List representation.
#[derive(Debug, Serialize)]
pub struct RecipeResponse {
    pub id: Uuid,
    pub title: String,
    pub time_minutes: i32,
    pub price: Decimal,
    pub link: Option<String>,
    pub tags: Vec<LabelResponse>,
    pub ingredients: Vec<LabelResponse>,
}

impl From<RecipeAggregate> for RecipeResponse {
    fn from(a: RecipeAggregate) -> Self {
        Self {
            id: a.recipe.id,
            title: a.recipe.title,
            time_minutes: a.recipe.time_minutes,
            price: a.recipe.price,
            link: a.recipe.link,
            tags: a.tags.into_iter().map(Into::into).collect(),
            ingredients: a.ingredients.into_iter().map(Into::into).collect(),
        }
    }
}

/// Detail representation: the list fields plus description and image URL.
#[derive(Debug, Serialize)]
pub struct RecipeDetailResponse {
    #[serde(flatten)]
    pub summary: RecipeResponse,
    pub description: Option<String>,
    pub image: Option<String>,
}

impl RecipeDetailResponse {
    pub fn new(aggregate: RecipeAggregate, image_url: Option<String>) -> Self {
        let description = aggregate.recipe.description.clone();
        Self {
            summary: aggregate.into(),
            description,
            image: image_url,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RecipeImageResponse {
    pub id: Uuid,
    pub image: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateRecipeRequest {
    pub title: String,
    pub time_minutes: i32,
    pub price: Decimal,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<LabelInput>,
    #[serde(default)]
    pub ingredients: Vec<LabelInput>,
}

impl CreateRecipeRequest {
    pub fn validate(&self) -> Result<(), String> {
        validate_title(&self.title)?;
        validate_minutes(self.time_minutes)?;
        validate_price(self.price)?;
        if let Some(link) = &self.link {
            validate_link(link)?;
        }
        validate_labels("tags", &self.tags)?;
        validate_labels("ingredients", &self.ingredients)
    }

    pub fn into_new_recipe(self) -> NewRecipe {
        NewRecipe {
            title: self.title,
            time_minutes: self.time_minutes,
            price: self.price,
            link: self.link.and_then(non_empty),
            description: self.description.and_then(non_empty),
            tags: label_names(self.tags),
            ingredients: label_names(self.ingredients),
        }
    }
}

/// Body of PUT and PATCH. A missing key keeps the stored value; PUT
/// additionally requires the scalar fields a recipe cannot exist without.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateRecipeRequest {
    pub title: Option<String>,
    pub time_minutes: Option<i32>,
    pub price: Option<Decimal>,
    pub link: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<LabelInput>>,
    pub ingredients: Option<Vec<LabelInput>>,
}

impl UpdateRecipeRequest {
    pub fn validate(&self, full: bool) -> Result<(), String> {
        if full {
            for (field, present) in [
                ("title", self.title.is_some()),
                ("time_minutes", self.time_minutes.is_some()),
                ("price", self.price.is_some()),
            ] {
                if !present {
                    return Err(format!("{} is required", field));
                }
            }
        }
        if let Some(title) = &self.title {
            validate_title(title)?;
        }
        if let Some(minutes) = self.time_minutes {
            validate_minutes(minutes)?;
        }
        if let Some(price) = self.price {
            validate_price(price)?;
        }
        if let Some(link) = &self.link {
            validate_link(link)?;
        }
        if let Some(tags) = &self.tags {
            validate_labels("tags", tags)?;
        }
        if let Some(ingredients) = &self.ingredients {
            validate_labels("ingredients", ingredients)?;
        }
        Ok(())
    }

    pub fn into_changes(self) -> RecipeChanges {
        RecipeChanges {
            title: self.title,
            time_minutes: self.time_minutes,
            price: self.price,
            // an empty string clears the stored value
            link: self.link.map(non_empty),
            description: self.description.map(non_empty),
            tags: self.tags.map(label_names),
            ingredients: self.ingredients.map(label_names),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RecipeQuery {
    pub tags: Option<String>,
    pub ingredients: Option<String>,
}

impl RecipeQuery {
    pub fn into_filter(self) -> Result<RecipeFilter, String> {
        Ok(RecipeFilter {
            tags: self.tags.as_deref().map(parse_ids).transpose()?,
            ingredients: self.ingredients.as_deref().map(parse_ids).transpose()?,
        })
    }
}

/// Parses `id,id,...`; blank segments are skipped.
fn parse_ids(raw: &str) -> Result<Vec<Uuid>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| Uuid::parse_str(s).map_err(|_| format!("invalid id {:?}", s)))
        .collect()
}

fn label_names(labels: Vec<LabelInput>) -> Vec<String> {
    labels.into_iter().map(|l| l.name).collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

fn validate_title(title: &str) -> Result<(), String> {
    if title.trim().is_empty() {
        return Err("title may not be blank".into());
    }
    validate_len("title", title)
}

fn validate_minutes(minutes: i32) -> Result<(), String> {
    if minutes < 0 {
        return Err("time_minutes must be zero or more".into());
    }
    Ok(())
}

fn validate_price(price: Decimal) -> Result<(), String> {
    if price.is_sign_negative() && !price.is_zero() {
        return Err("price must be zero or more".into());
    }
    if price.normalize().scale() > MAX_PRICE_SCALE {
        return Err(format!(
            "price may have at most {} decimal places",
            MAX_PRICE_SCALE
        ));
    }
    if price >= Decimal::from(MAX_PRICE_EXCLUSIVE) {
        return Err(format!("price must be below {}", MAX_PRICE_EXCLUSIVE));
    }
    Ok(())
}

fn validate_link(link: &str) -> Result<(), String> {
    validate_len("link", link)
}

fn validate_labels(field: &str, labels: &[LabelInput]) -> Result<(), String> {
    for label in labels {
        if label.name.trim().is_empty() {
            return Err(format!("{}: name may not be blank", field));
        }
        validate_len(field, &label.name)?;
    }
    Ok(())
}

fn validate_len(field: &str, value: &str) -> Result<(), String> {
    if value.chars().count() > MAX_TEXT_LEN {
        return Err(format!(
            "{} may not be longer than {} characters",
            field, MAX_TEXT_LEN
        ));
    }
    Ok(())
}
