//! In-memory store adapters backing `AppState::fake()`.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::{
    repo::UserStore,
    repo_types::{NewUser, User, UserChanges},
};
use crate::recipes::{
    labels::LabelKind,
    repo::{DuplicateLabel, RecipeStore},
    repo_types::{
        ImageSwap, Label, NewRecipe, Recipe, RecipeAggregate, RecipeChanges, RecipeFilter,
    },
};
use crate::storage::ImageStore;

#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<Vec<User>>,
}

impl MemoryUserStore {
    fn users(&self) -> MutexGuard<'_, Vec<User>> {
        self.users.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn len(&self) -> usize {
        self.users().len()
    }

    pub fn deactivate(&self, id: Uuid) {
        if let Some(user) = self.users().iter_mut().find(|u| u.id == id) {
            user.is_active = false;
        }
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        Ok(self.users().iter().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        Ok(self.users().iter().find(|u| u.id == id).cloned())
    }

    async fn create(&self, new: NewUser) -> anyhow::Result<User> {
        let mut users = self.users();
        anyhow::ensure!(
            users.iter().all(|u| u.email != new.email),
            "email {} already stored",
            new.email
        );
        let user = User {
            id: Uuid::new_v4(),
            email: new.email,
            name: new.name,
            password_hash: new.password_hash,
            is_active: true,
            is_staff: new.is_staff,
            is_superuser: new.is_superuser,
            created_at: OffsetDateTime::now_utc(),
        };
        users.push(user.clone());
        Ok(user)
    }

    async fn update(&self, id: Uuid, changes: UserChanges) -> anyhow::Result<Option<User>> {
        let mut users = self.users();
        let Some(user) = users.iter_mut().find(|u| u.id == id) else {
            return Ok(None);
        };
        if let Some(email) = changes.email {
            user.email = email;
        }
        if let Some(name) = changes.name {
            user.name = name;
        }
        if let Some(hash) = changes.password_hash {
            user.password_hash = hash;
        }
        Ok(Some(user.clone()))
    }
}

#[derive(Default)]
struct Tables {
    recipes: Vec<Recipe>,
    labels: HashMap<LabelKind, Vec<Label>>,
    // (recipe id, label id)
    links: HashMap<LabelKind, BTreeSet<(Uuid, Uuid)>>,
}

impl Tables {
    fn labels_of(&self, kind: LabelKind, recipe_id: Uuid) -> Vec<Label> {
        let links = self.links.get(&kind);
        let mut labels: Vec<Label> = self
            .labels
            .get(&kind)
            .into_iter()
            .flatten()
            .filter(|l| links.is_some_and(|set| set.contains(&(recipe_id, l.id))))
            .cloned()
            .collect();
        labels.sort_by(|a, b| a.name.cmp(&b.name));
        labels
    }

    fn aggregate(&self, recipe: &Recipe) -> RecipeAggregate {
        RecipeAggregate {
            recipe: recipe.clone(),
            tags: self.labels_of(LabelKind::Tag, recipe.id),
            ingredients: self.labels_of(LabelKind::Ingredient, recipe.id),
        }
    }

    fn has_any(&self, kind: LabelKind, recipe_id: Uuid, ids: &[Uuid]) -> bool {
        self.links
            .get(&kind)
            .is_some_and(|set| ids.iter().any(|id| set.contains(&(recipe_id, *id))))
    }

    fn resolve(&mut self, kind: LabelKind, owner: Uuid, recipe_id: Uuid, names: &[String]) {
        for name in names {
            let labels = self.labels.entry(kind).or_default();
            let id = match labels.iter().find(|l| l.user_id == owner && &l.name == name) {
                Some(existing) => existing.id,
                None => {
                    let label = Label {
                        id: Uuid::new_v4(),
                        user_id: owner,
                        name: name.clone(),
                    };
                    let id = label.id;
                    labels.push(label);
                    id
                }
            };
            self.links.entry(kind).or_default().insert((recipe_id, id));
        }
    }

    fn clear(&mut self, kind: LabelKind, recipe_id: Uuid) {
        if let Some(set) = self.links.get_mut(&kind) {
            set.retain(|(r, _)| *r != recipe_id);
        }
    }
}

#[derive(Default)]
pub struct MemoryRecipeStore {
    tables: Mutex<Tables>,
}

impl MemoryRecipeStore {
    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Every stored label of `kind`, across all owners.
    pub fn all_labels(&self, kind: LabelKind) -> Vec<Label> {
        self.tables().labels.get(&kind).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl RecipeStore for MemoryRecipeStore {
    async fn list_recipes(
        &self,
        owner: Uuid,
        filter: &RecipeFilter,
    ) -> anyhow::Result<Vec<RecipeAggregate>> {
        let tables = self.tables();
        let mut recipes: Vec<&Recipe> = tables
            .recipes
            .iter()
            .filter(|r| r.user_id == owner)
            .filter(|r| {
                filter
                    .tags
                    .as_deref()
                    .map_or(true, |ids| tables.has_any(LabelKind::Tag, r.id, ids))
            })
            .filter(|r| {
                filter
                    .ingredients
                    .as_deref()
                    .map_or(true, |ids| tables.has_any(LabelKind::Ingredient, r.id, ids))
            })
            .collect();
        // insertion order stands in for created_at
        recipes.reverse();
        Ok(recipes.into_iter().map(|r| tables.aggregate(r)).collect())
    }

    async fn get_recipe(&self, owner: Uuid, id: Uuid) -> anyhow::Result<Option<RecipeAggregate>> {
        let tables = self.tables();
        Ok(tables
            .recipes
            .iter()
            .find(|r| r.id == id && r.user_id == owner)
            .map(|r| tables.aggregate(r)))
    }

    async fn create_recipe(
        &self,
        owner: Uuid,
        new: NewRecipe,
    ) -> anyhow::Result<RecipeAggregate> {
        let mut tables = self.tables();
        let recipe = Recipe {
            id: Uuid::new_v4(),
            user_id: owner,
            title: new.title,
            time_minutes: new.time_minutes,
            price: new.price,
            link: new.link,
            description: new.description,
            image: None,
            created_at: OffsetDateTime::now_utc(),
        };
        tables.resolve(LabelKind::Tag, owner, recipe.id, &new.tags);
        tables.resolve(LabelKind::Ingredient, owner, recipe.id, &new.ingredients);
        tables.recipes.push(recipe.clone());
        Ok(tables.aggregate(&recipe))
    }

    async fn update_recipe(
        &self,
        owner: Uuid,
        id: Uuid,
        changes: RecipeChanges,
    ) -> anyhow::Result<Option<RecipeAggregate>> {
        let mut tables = self.tables();
        let Some(recipe) = tables
            .recipes
            .iter_mut()
            .find(|r| r.id == id && r.user_id == owner)
        else {
            return Ok(None);
        };

        if let Some(title) = changes.title {
            recipe.title = title;
        }
        if let Some(minutes) = changes.time_minutes {
            recipe.time_minutes = minutes;
        }
        if let Some(price) = changes.price {
            recipe.price = price;
        }
        if let Some(link) = changes.link {
            recipe.link = link;
        }
        if let Some(description) = changes.description {
            recipe.description = description;
        }
        let recipe = recipe.clone();

        if let Some(names) = changes.tags {
            tables.clear(LabelKind::Tag, id);
            tables.resolve(LabelKind::Tag, owner, id, &names);
        }
        if let Some(names) = changes.ingredients {
            tables.clear(LabelKind::Ingredient, id);
            tables.resolve(LabelKind::Ingredient, owner, id, &names);
        }
        Ok(Some(tables.aggregate(&recipe)))
    }

    async fn set_recipe_image(
        &self,
        owner: Uuid,
        id: Uuid,
        image: Option<String>,
    ) -> anyhow::Result<Option<ImageSwap>> {
        let mut tables = self.tables();
        Ok(tables
            .recipes
            .iter_mut()
            .find(|r| r.id == id && r.user_id == owner)
            .map(|r| {
                let previous_image = std::mem::replace(&mut r.image, image);
                ImageSwap {
                    recipe: r.clone(),
                    previous_image,
                }
            }))
    }

    async fn delete_recipe(&self, owner: Uuid, id: Uuid) -> anyhow::Result<Option<Recipe>> {
        let mut tables = self.tables();
        let Some(pos) = tables
            .recipes
            .iter()
            .position(|r| r.id == id && r.user_id == owner)
        else {
            return Ok(None);
        };
        let recipe = tables.recipes.remove(pos);
        tables.clear(LabelKind::Tag, id);
        tables.clear(LabelKind::Ingredient, id);
        Ok(Some(recipe))
    }

    async fn list_labels(
        &self,
        owner: Uuid,
        kind: LabelKind,
        assigned_only: bool,
    ) -> anyhow::Result<Vec<Label>> {
        let tables = self.tables();
        let links = tables.links.get(&kind);
        let mut labels: Vec<Label> = tables
            .labels
            .get(&kind)
            .into_iter()
            .flatten()
            .filter(|l| l.user_id == owner)
            .filter(|l| {
                !assigned_only || links.is_some_and(|set| set.iter().any(|(_, id)| *id == l.id))
            })
            .cloned()
            .collect();
        labels.sort_by(|a, b| b.name.cmp(&a.name));
        Ok(labels)
    }

    async fn rename_label(
        &self,
        owner: Uuid,
        kind: LabelKind,
        id: Uuid,
        name: &str,
    ) -> anyhow::Result<Option<Label>> {
        let mut tables = self.tables();
        let labels = tables.labels.entry(kind).or_default();
        if labels
            .iter()
            .any(|l| l.user_id == owner && l.name == name && l.id != id)
        {
            return Err(DuplicateLabel {
                kind: kind.as_str(),
                name: name.to_string(),
            }
            .into());
        }
        Ok(labels
            .iter_mut()
            .find(|l| l.id == id && l.user_id == owner)
            .map(|l| {
                l.name = name.to_string();
                l.clone()
            }))
    }

    async fn delete_label(&self, owner: Uuid, kind: LabelKind, id: Uuid) -> anyhow::Result<bool> {
        let mut tables = self.tables();
        let labels = tables.labels.entry(kind).or_default();
        let before = labels.len();
        labels.retain(|l| !(l.id == id && l.user_id == owner));
        let removed = labels.len() < before;
        if removed {
            if let Some(set) = tables.links.get_mut(&kind) {
                set.retain(|(_, label_id)| *label_id != id);
            }
        }
        Ok(removed)
    }
}

/// Object storage kept in a map; presigned URLs point at a fake host.
#[derive(Default)]
pub struct MemoryStorage {
    objects: Mutex<HashMap<String, (Bytes, String)>>,
}

impl MemoryStorage {
    fn objects(&self) -> MutexGuard<'_, HashMap<String, (Bytes, String)>> {
        self.objects.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        self.objects().get(key).map(|(_, ct)| ct.clone())
    }
}

#[async_trait]
impl ImageStore for MemoryStorage {
    async fn store(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()> {
        self.objects()
            .insert(key.to_string(), (body, content_type.to_string()));
        Ok(())
    }

    async fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.objects().remove(key);
        Ok(())
    }

    async fn signed_url(&self, key: &str, _ttl: std::time::Duration) -> anyhow::Result<String> {
        Ok(format!("https://fake.local/{}", key))
    }
}
