use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::db::is_unique_violation;
use crate::recipes::{
    labels::LabelKind,
    repo_types::{
        ImageSwap, Label, NewRecipe, Recipe, RecipeAggregate, RecipeChanges, RecipeFilter,
    },
};

const RECIPE_COLUMNS: &str =
    "id, user_id, title, time_minutes, price, link, description, image, created_at";

/// Raised when an owner already has a label with the requested name.
#[derive(Debug, thiserror::Error)]
#[error("{kind} {name:?} already exists")]
pub struct DuplicateLabel {
    pub kind: &'static str,
    pub name: String,
}

/// Persistence port for recipes and their per-owner labels.
///
/// Every call is scoped to `owner`; rows of other users behave as missing.
#[async_trait]
pub trait RecipeStore: Send + Sync {
    /// Newest first.
    async fn list_recipes(
        &self,
        owner: Uuid,
        filter: &RecipeFilter,
    ) -> anyhow::Result<Vec<RecipeAggregate>>;

    async fn get_recipe(&self, owner: Uuid, id: Uuid) -> anyhow::Result<Option<RecipeAggregate>>;

    /// Inserts the recipe, then gets-or-creates each label name for `owner` and
    /// attaches it. Runs atomically.
    async fn create_recipe(&self, owner: Uuid, recipe: NewRecipe)
        -> anyhow::Result<RecipeAggregate>;

    /// Applies scalar changes and rebuilds the label lists that are present.
    /// Runs atomically; `None` when the recipe does not exist for `owner`.
    async fn update_recipe(
        &self,
        owner: Uuid,
        id: Uuid,
        changes: RecipeChanges,
    ) -> anyhow::Result<Option<RecipeAggregate>>;

    /// Points the recipe at `image` and returns the key it replaced. The old
    /// key is read under the row lock, so concurrent swaps each see a
    /// distinct predecessor.
    async fn set_recipe_image(
        &self,
        owner: Uuid,
        id: Uuid,
        image: Option<String>,
    ) -> anyhow::Result<Option<ImageSwap>>;

    /// Returns the deleted row.
    async fn delete_recipe(&self, owner: Uuid, id: Uuid) -> anyhow::Result<Option<Recipe>>;

    /// Ordered by name, descending.
    async fn list_labels(
        &self,
        owner: Uuid,
        kind: LabelKind,
        assigned_only: bool,
    ) -> anyhow::Result<Vec<Label>>;

    /// Fails with [`DuplicateLabel`] when the owner already uses `name`.
    async fn rename_label(
        &self,
        owner: Uuid,
        kind: LabelKind,
        id: Uuid,
        name: &str,
    ) -> anyhow::Result<Option<Label>>;

    async fn delete_label(&self, owner: Uuid, kind: LabelKind, id: Uuid) -> anyhow::Result<bool>;
}

#[derive(Clone)]
pub struct PgRecipeStore {
    db: PgPool,
}

impl PgRecipeStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[derive(FromRow)]
struct LinkedLabel {
    recipe_id: Uuid,
    id: Uuid,
    user_id: Uuid,
    name: String,
}

/// Labels of the given recipes, keyed by recipe id.
async fn linked_labels(
    conn: &mut PgConnection,
    kind: LabelKind,
    recipe_ids: &[Uuid],
) -> anyhow::Result<HashMap<Uuid, Vec<Label>>> {
    let sql = format!(
        r#"
        SELECT j.recipe_id, l.id, l.user_id, l.name
          FROM {table} l
          JOIN {join} j ON j.{column} = l.id
         WHERE j.recipe_id = ANY($1)
         ORDER BY l.name
        "#,
        table = kind.table(),
        join = kind.join_table(),
        column = kind.join_column(),
    );
    let rows = sqlx::query_as::<_, LinkedLabel>(&sql)
        .bind(recipe_ids)
        .fetch_all(&mut *conn)
        .await
        .with_context(|| format!("load {} links", kind.as_str()))?;

    let mut by_recipe: HashMap<Uuid, Vec<Label>> = HashMap::new();
    for row in rows {
        by_recipe.entry(row.recipe_id).or_default().push(Label {
            id: row.id,
            user_id: row.user_id,
            name: row.name,
        });
    }
    Ok(by_recipe)
}

async fn attach_labels(
    conn: &mut PgConnection,
    recipes: Vec<Recipe>,
) -> anyhow::Result<Vec<RecipeAggregate>> {
    let ids: Vec<Uuid> = recipes.iter().map(|r| r.id).collect();
    let mut tags = linked_labels(conn, LabelKind::Tag, &ids).await?;
    let mut ingredients = linked_labels(conn, LabelKind::Ingredient, &ids).await?;

    Ok(recipes
        .into_iter()
        .map(|recipe| RecipeAggregate {
            tags: tags.remove(&recipe.id).unwrap_or_default(),
            ingredients: ingredients.remove(&recipe.id).unwrap_or_default(),
            recipe,
        })
        .collect())
}

async fn load_aggregate(conn: &mut PgConnection, recipe: Recipe) -> anyhow::Result<RecipeAggregate> {
    attach_labels(conn, vec![recipe])
        .await?
        .pop()
        .context("recipe vanished while loading labels")
}

/// Gets-or-creates each name for `owner` and links it to the recipe.
///
/// The upsert leans on `UNIQUE (user_id, name)`, so concurrent requests
/// resolving the same name end up on the same row. Names are upserted in
/// sorted order: each upsert holds its row lock until commit, and two
/// transactions taking the same locks in opposite order deadlock.
async fn resolve_labels(
    conn: &mut PgConnection,
    kind: LabelKind,
    owner: Uuid,
    recipe_id: Uuid,
    names: &[String],
) -> anyhow::Result<()> {
    let upsert = format!(
        r#"
        INSERT INTO {table} (user_id, name)
        VALUES ($1, $2)
        ON CONFLICT (user_id, name) DO UPDATE SET name = EXCLUDED.name
        RETURNING id, user_id, name
        "#,
        table = kind.table(),
    );
    let link = format!(
        "INSERT INTO {join} (recipe_id, {column}) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        join = kind.join_table(),
        column = kind.join_column(),
    );

    let mut ordered: Vec<&String> = names.iter().collect();
    ordered.sort();

    for name in ordered {
        let label = sqlx::query_as::<_, Label>(&upsert)
            .bind(owner)
            .bind(name)
            .fetch_one(&mut *conn)
            .await
            .with_context(|| format!("get or create {} {:?}", kind.as_str(), name))?;
        sqlx::query(&link)
            .bind(recipe_id)
            .bind(label.id)
            .execute(&mut *conn)
            .await
            .with_context(|| format!("link {} {}", kind.as_str(), label.id))?;
    }
    Ok(())
}

async fn clear_labels(conn: &mut PgConnection, kind: LabelKind, recipe_id: Uuid) -> anyhow::Result<()> {
    sqlx::query(&format!(
        "DELETE FROM {join} WHERE recipe_id = $1",
        join = kind.join_table()
    ))
    .bind(recipe_id)
    .execute(&mut *conn)
    .await
    .with_context(|| format!("clear {} links", kind.as_str()))?;
    Ok(())
}

#[async_trait]
impl RecipeStore for PgRecipeStore {
    async fn list_recipes(
        &self,
        owner: Uuid,
        filter: &RecipeFilter,
    ) -> anyhow::Result<Vec<RecipeAggregate>> {
        let mut conn = self.db.acquire().await.context("acquire connection")?;
        let recipes = sqlx::query_as::<_, Recipe>(&format!(
            r#"
            SELECT {RECIPE_COLUMNS}
              FROM recipes r
             WHERE r.user_id = $1
               AND ($2::uuid[] IS NULL OR EXISTS (
                    SELECT 1 FROM recipe_tags rt
                     WHERE rt.recipe_id = r.id AND rt.tag_id = ANY($2)))
               AND ($3::uuid[] IS NULL OR EXISTS (
                    SELECT 1 FROM recipe_ingredients ri
                     WHERE ri.recipe_id = r.id AND ri.ingredient_id = ANY($3)))
             ORDER BY r.created_at DESC, r.id DESC
            "#
        ))
        .bind(owner)
        .bind(filter.tags.clone())
        .bind(filter.ingredients.clone())
        .fetch_all(&mut *conn)
        .await
        .context("list recipes")?;

        attach_labels(&mut conn, recipes).await
    }

    async fn get_recipe(&self, owner: Uuid, id: Uuid) -> anyhow::Result<Option<RecipeAggregate>> {
        let mut conn = self.db.acquire().await.context("acquire connection")?;
        let recipe = sqlx::query_as::<_, Recipe>(&format!(
            "SELECT {RECIPE_COLUMNS} FROM recipes WHERE id = $1 AND user_id = $2"
        ))
        .bind(id)
        .bind(owner)
        .fetch_optional(&mut *conn)
        .await
        .context("get recipe")?;

        match recipe {
            Some(recipe) => Ok(Some(load_aggregate(&mut conn, recipe).await?)),
            None => Ok(None),
        }
    }

    async fn create_recipe(
        &self,
        owner: Uuid,
        new: NewRecipe,
    ) -> anyhow::Result<RecipeAggregate> {
        let mut tx = self.db.begin().await.context("begin tx")?;

        let recipe = sqlx::query_as::<_, Recipe>(&format!(
            r#"
            INSERT INTO recipes (user_id, title, time_minutes, price, link, description)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {RECIPE_COLUMNS}
            "#
        ))
        .bind(owner)
        .bind(&new.title)
        .bind(new.time_minutes)
        .bind(new.price)
        .bind(&new.link)
        .bind(&new.description)
        .fetch_one(&mut *tx)
        .await
        .context("insert recipe")?;

        resolve_labels(&mut tx, LabelKind::Tag, owner, recipe.id, &new.tags).await?;
        resolve_labels(&mut tx, LabelKind::Ingredient, owner, recipe.id, &new.ingredients).await?;
        let aggregate = load_aggregate(&mut tx, recipe).await?;

        tx.commit().await.context("commit tx")?;
        Ok(aggregate)
    }

    async fn update_recipe(
        &self,
        owner: Uuid,
        id: Uuid,
        changes: RecipeChanges,
    ) -> anyhow::Result<Option<RecipeAggregate>> {
        let mut tx = self.db.begin().await.context("begin tx")?;

        let recipe = sqlx::query_as::<_, Recipe>(&format!(
            r#"
            UPDATE recipes
               SET title = COALESCE($3, title),
                   time_minutes = COALESCE($4, time_minutes),
                   price = COALESCE($5, price),
                   link = CASE WHEN $6 THEN $7 ELSE link END,
                   description = CASE WHEN $8 THEN $9 ELSE description END
             WHERE id = $1 AND user_id = $2
            RETURNING {RECIPE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(owner)
        .bind(changes.title)
        .bind(changes.time_minutes)
        .bind(changes.price)
        .bind(changes.link.is_some())
        .bind(changes.link.flatten())
        .bind(changes.description.is_some())
        .bind(changes.description.flatten())
        .fetch_optional(&mut *tx)
        .await
        .context("update recipe")?;

        // dropping tx rolls back
        let Some(recipe) = recipe else {
            return Ok(None);
        };

        for (kind, names) in [
            (LabelKind::Tag, changes.tags),
            (LabelKind::Ingredient, changes.ingredients),
        ] {
            if let Some(names) = names {
                clear_labels(&mut tx, kind, recipe.id).await?;
                resolve_labels(&mut tx, kind, owner, recipe.id, &names).await?;
            }
        }
        let aggregate = load_aggregate(&mut tx, recipe).await?;

        tx.commit().await.context("commit tx")?;
        Ok(Some(aggregate))
    }

    async fn set_recipe_image(
        &self,
        owner: Uuid,
        id: Uuid,
        image: Option<String>,
    ) -> anyhow::Result<Option<ImageSwap>> {
        let swap = sqlx::query_as::<_, ImageSwap>(
            r#"
            WITH old AS (
                SELECT id, image FROM recipes
                 WHERE id = $1 AND user_id = $2
                   FOR UPDATE
            )
            UPDATE recipes r
               SET image = $3
              FROM old
             WHERE r.id = old.id
            RETURNING r.id, r.user_id, r.title, r.time_minutes, r.price, r.link,
                      r.description, r.image, r.created_at, old.image AS previous_image
            "#,
        )
        .bind(id)
        .bind(owner)
        .bind(image)
        .fetch_optional(&self.db)
        .await
        .context("set recipe image")?;
        Ok(swap)
    }

    async fn delete_recipe(&self, owner: Uuid, id: Uuid) -> anyhow::Result<Option<Recipe>> {
        let recipe = sqlx::query_as::<_, Recipe>(&format!(
            "DELETE FROM recipes WHERE id = $1 AND user_id = $2 RETURNING {RECIPE_COLUMNS}"
        ))
        .bind(id)
        .bind(owner)
        .fetch_optional(&self.db)
        .await
        .context("delete recipe")?;
        Ok(recipe)
    }

    async fn list_labels(
        &self,
        owner: Uuid,
        kind: LabelKind,
        assigned_only: bool,
    ) -> anyhow::Result<Vec<Label>> {
        let sql = format!(
            r#"
            SELECT l.id, l.user_id, l.name
              FROM {table} l
             WHERE l.user_id = $1
               AND (NOT $2 OR EXISTS (SELECT 1 FROM {join} j WHERE j.{column} = l.id))
             ORDER BY l.name DESC
            "#,
            table = kind.table(),
            join = kind.join_table(),
            column = kind.join_column(),
        );
        let labels = sqlx::query_as::<_, Label>(&sql)
            .bind(owner)
            .bind(assigned_only)
            .fetch_all(&self.db)
            .await
            .with_context(|| format!("list {}s", kind.as_str()))?;
        Ok(labels)
    }

    async fn rename_label(
        &self,
        owner: Uuid,
        kind: LabelKind,
        id: Uuid,
        name: &str,
    ) -> anyhow::Result<Option<Label>> {
        let sql = format!(
            "UPDATE {table} SET name = $3 WHERE id = $1 AND user_id = $2 RETURNING id, user_id, name",
            table = kind.table(),
        );
        let result = sqlx::query_as::<_, Label>(&sql)
            .bind(id)
            .bind(owner)
            .bind(name)
            .fetch_optional(&self.db)
            .await
            .with_context(|| format!("rename {}", kind.as_str()));

        match result {
            Err(e) if is_unique_violation(&e) => Err(DuplicateLabel {
                kind: kind.as_str(),
                name: name.to_string(),
            }
            .into()),
            other => other,
        }
    }

    async fn delete_label(&self, owner: Uuid, kind: LabelKind, id: Uuid) -> anyhow::Result<bool> {
        let sql = format!(
            "DELETE FROM {table} WHERE id = $1 AND user_id = $2",
            table = kind.table(),
        );
        let done = sqlx::query(&sql)
            .bind(id)
            .bind(owner)
            .execute(&self.db)
            .await
            .with_context(|| format!("delete {}", kind.as_str()))?;
        Ok(done.rows_affected() > 0)
    }
}
