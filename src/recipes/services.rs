use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use crate::recipes::{
    images::{mime_from_filename, new_recipe_image_path},
    labels::{unique_names, LabelKind},
    repo::{DuplicateLabel, RecipeStore},
    repo_types::{Label, NewRecipe, Recipe, RecipeAggregate, RecipeChanges, RecipeFilter},
};
use crate::storage::ImageStore;

const IMAGE_URL_TTL: Duration = Duration::from_secs(30 * 60);
const PRICE_SCALE: u32 = 2;

#[derive(Debug, thiserror::Error)]
pub enum RecipeError {
    #[error("recipe not found")]
    NotFound,
    #[error("{0} not found")]
    LabelNotFound(&'static str),
    #[error(transparent)]
    DuplicateLabel(#[from] DuplicateLabel),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Prices always carry two decimal places, so `5.5` reads back as `5.50`.
fn money(mut price: Decimal) -> Decimal {
    price.rescale(PRICE_SCALE);
    price
}

pub async fn list_recipes(
    store: &dyn RecipeStore,
    owner: Uuid,
    filter: &RecipeFilter,
) -> Result<Vec<RecipeAggregate>, RecipeError> {
    Ok(store.list_recipes(owner, filter).await?)
}

pub async fn get_recipe(
    store: &dyn RecipeStore,
    owner: Uuid,
    id: Uuid,
) -> Result<RecipeAggregate, RecipeError> {
    store
        .get_recipe(owner, id)
        .await?
        .ok_or(RecipeError::NotFound)
}

/// Creates the recipe and attaches its labels, reusing the owner's existing
/// tags and ingredients by exact name.
pub async fn create_recipe(
    store: &dyn RecipeStore,
    owner: Uuid,
    mut recipe: NewRecipe,
) -> Result<RecipeAggregate, RecipeError> {
    recipe.price = money(recipe.price);
    recipe.tags = unique_names(recipe.tags);
    recipe.ingredients = unique_names(recipe.ingredients);

    let created = store.create_recipe(owner, recipe).await?;
    info!(
        recipe_id = %created.recipe.id,
        %owner,
        tags = created.tags.len(),
        ingredients = created.ingredients.len(),
        "recipe created"
    );
    Ok(created)
}

/// Applies `changes`. A present label list replaces that kind wholesale; an
/// absent one leaves the current associations alone.
pub async fn update_recipe(
    store: &dyn RecipeStore,
    owner: Uuid,
    id: Uuid,
    mut changes: RecipeChanges,
) -> Result<RecipeAggregate, RecipeError> {
    changes.price = changes.price.map(money);
    changes.tags = changes.tags.map(unique_names);
    changes.ingredients = changes.ingredients.map(unique_names);

    let updated = store
        .update_recipe(owner, id, changes)
        .await?
        .ok_or(RecipeError::NotFound)?;
    info!(recipe_id = %id, %owner, "recipe updated");
    Ok(updated)
}

pub async fn delete_recipe(
    store: &dyn RecipeStore,
    storage: &dyn ImageStore,
    owner: Uuid,
    id: Uuid,
) -> Result<(), RecipeError> {
    let deleted = store
        .delete_recipe(owner, id)
        .await?
        .ok_or(RecipeError::NotFound)?;
    if let Some(key) = deleted.image {
        remove_image(storage, &key).await;
    }
    info!(recipe_id = %id, %owner, "recipe deleted");
    Ok(())
}

/// Stores an uploaded image under a generated key and points the recipe at it.
/// Returns the updated recipe and a presigned URL for the new image.
pub async fn upload_image(
    store: &dyn RecipeStore,
    storage: &dyn ImageStore,
    owner: Uuid,
    id: Uuid,
    filename: &str,
    content_type: Option<&str>,
    body: Bytes,
) -> Result<(Recipe, String), RecipeError> {
    // fail before touching the bucket when the recipe is not the caller's
    get_recipe(store, owner, id).await?;

    let key = new_recipe_image_path(filename);
    let content_type = content_type.unwrap_or_else(|| mime_from_filename(filename));
    storage
        .store(&key, body, content_type)
        .await
        .with_context(|| format!("store image {}", key))?;

    let swap = match store.set_recipe_image(owner, id, Some(key.clone())).await {
        Ok(Some(swap)) => swap,
        Ok(None) => {
            remove_image(storage, &key).await;
            return Err(RecipeError::NotFound);
        }
        Err(e) => {
            remove_image(storage, &key).await;
            return Err(e.into());
        }
    };
    if let Some(old) = swap.previous_image.filter(|old| *old != key) {
        remove_image(storage, &old).await;
    }

    let url = image_url(storage, &key).await?;
    info!(recipe_id = %id, %key, "recipe image stored");
    Ok((swap.recipe, url))
}

pub async fn image_url(storage: &dyn ImageStore, key: &str) -> anyhow::Result<String> {
    storage
        .signed_url(key, IMAGE_URL_TTL)
        .await
        .with_context(|| format!("presign url for {}", key))
}

async fn remove_image(storage: &dyn ImageStore, key: &str) {
    if let Err(e) = storage.remove(key).await {
        warn!(error = %e, %key, "failed to remove recipe image");
    }
}

pub async fn list_labels(
    store: &dyn RecipeStore,
    owner: Uuid,
    kind: LabelKind,
    assigned_only: bool,
) -> Result<Vec<Label>, RecipeError> {
    Ok(store.list_labels(owner, kind, assigned_only).await?)
}

pub async fn rename_label(
    store: &dyn RecipeStore,
    owner: Uuid,
    kind: LabelKind,
    id: Uuid,
    name: &str,
) -> Result<Label, RecipeError> {
    match store.rename_label(owner, kind, id, name).await {
        Ok(Some(label)) => Ok(label),
        Ok(None) => Err(RecipeError::LabelNotFound(kind.as_str())),
        Err(e) => match e.downcast::<DuplicateLabel>() {
            Ok(dup) => Err(dup.into()),
            Err(e) => Err(e.into()),
        },
    }
}

pub async fn delete_label(
    store: &dyn RecipeStore,
    owner: Uuid,
    kind: LabelKind,
    id: Uuid,
) -> Result<(), RecipeError> {
    if !store.delete_label(owner, kind, id).await? {
        return Err(RecipeError::LabelNotFound(kind.as_str()));
    }
    info!(label_id = %id, kind = kind.as_str(), %owner, "label deleted");
    Ok(())
}
