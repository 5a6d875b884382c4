use std::collections::HashSet;

/// Which of the two per-owner label tables an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LabelKind {
    Tag,
    Ingredient,
}

impl LabelKind {
    pub fn table(self) -> &'static str {
        match self {
            Self::Tag => "tags",
            Self::Ingredient => "ingredients",
        }
    }

    pub fn join_table(self) -> &'static str {
        match self {
            Self::Tag => "recipe_tags",
            Self::Ingredient => "recipe_ingredients",
        }
    }

    pub fn join_column(self) -> &'static str {
        match self {
            Self::Tag => "tag_id",
            Self::Ingredient => "ingredient_id",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tag => "tag",
            Self::Ingredient => "ingredient",
        }
    }
}

/// Collapses repeated names, keeping first-seen order.
///
/// Names compare exactly: `Vegan` and `vegan` are two labels.
pub fn unique_names<I>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    names
        .into_iter()
        .filter(|name| seen.insert(name.clone()))
        .collect()
}
