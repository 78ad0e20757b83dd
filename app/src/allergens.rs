//! Allergen vocabulary, per-ingredient flags, per-recipe declarations and
//! the aggregation of ingredient flags into recipe suggestions.
//!
//! Declarations on a recipe are authoritative. What the ingredients imply is
//! only ever returned as an `AllergenSuggestion`; it reaches a recipe's
//! `contains` tier through `AllergenInfo::confirm` and nothing else.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use err_derive::Error;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use infra::ids::Id;

use crate::catalog::MasterIngredient;
use crate::lenient;
use crate::recipes::{IngredientRef, Recipe};

pub const MAX_CUSTOM_ALLERGENS: usize = 3;

macro_rules! allergen_types {
    ($($variant:ident => $field:ident, $key:literal, $label:literal;)*) => {
        /// The fixed allergen vocabulary every ingredient is flagged against.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum AllergenType {
            $($variant,)*
        }

        impl AllergenType {
            pub const ALL: &'static [AllergenType] = &[$(AllergenType::$variant,)*];

            pub fn key(self) -> &'static str {
                match self {
                    $(AllergenType::$variant => $key,)*
                }
            }

            pub fn label(self) -> &'static str {
                match self {
                    $(AllergenType::$variant => $label,)*
                }
            }

            pub fn from_key(key: &str) -> Option<Self> {
                match key {
                    $($key => Some(AllergenType::$variant),)*
                    _ => None,
                }
            }
        }

        /// Allergen flags on a purchased ingredient.
        #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(rename_all = "camelCase")]
        pub struct AllergenFlags {
            $(
                #[serde(default, deserialize_with = "lenient::flag")]
                pub $field: bool,
            )*
            #[serde(default)]
            custom: Vec<CustomAllergen>,
            #[serde(default)]
            pub notes: String,
        }

        impl AllergenFlags {
            pub fn is_flagged(&self, allergen: AllergenType) -> bool {
                match allergen {
                    $(AllergenType::$variant => self.$field,)*
                }
            }

            pub fn set(&mut self, allergen: AllergenType, flagged: bool) {
                match allergen {
                    $(AllergenType::$variant => self.$field = flagged,)*
                }
            }
        }
    };
}

allergen_types! {
    Peanut => peanut, "peanut", "Peanut";
    Crustacean => crustacean, "crustacean", "Crustacean";
    Treenut => treenut, "treenut", "Tree Nut";
    Shellfish => shellfish, "shellfish", "Shellfish";
    Sesame => sesame, "sesame", "Sesame";
    Soy => soy, "soy", "Soy";
    Fish => fish, "fish", "Fish";
    Wheat => wheat, "wheat", "Wheat";
    Milk => milk, "milk", "Milk";
    Sulphite => sulphite, "sulphite", "Sulphite";
    Egg => egg, "egg", "Egg";
    Gluten => gluten, "gluten", "Gluten";
    Mustard => mustard, "mustard", "Mustard";
    Celery => celery, "celery", "Celery";
    Garlic => garlic, "garlic", "Garlic";
    Onion => onion, "onion", "Onion";
    Nitrite => nitrite, "nitrite", "Nitrite";
    Mushroom => mushroom, "mushroom", "Mushroom";
    HotPepper => hot_pepper, "hotPepper", "Hot Pepper";
    Citrus => citrus, "citrus", "Citrus";
}

/// An allergen identifier: one of the fixed types, or a custom name kept in
/// lower case.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Allergen {
    Known(AllergenType),
    Custom(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomAllergen {
    pub name: String,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(display = "at most {} custom allergens are allowed", _0)]
pub struct TooManyCustomAllergens(pub usize);

/// How strongly a recipe declares an allergen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Tier {
    Contains,
    MayContain,
    CrossContactRisk,
}

/// Three disjoint declaration tiers. Declaring an allergen in one tier
/// removes it from the others.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "StoredAllergenInfo")]
pub struct AllergenInfo {
    contains: BTreeSet<Allergen>,
    may_contain: BTreeSet<Allergen>,
    cross_contact_risk: BTreeSet<Allergen>,
    pub notes: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredAllergenInfo {
    #[serde(default)]
    contains: BTreeSet<Allergen>,
    #[serde(default)]
    may_contain: BTreeSet<Allergen>,
    #[serde(default)]
    cross_contact_risk: BTreeSet<Allergen>,
    #[serde(default)]
    notes: String,
}

/// What a recipe's ingredients imply, for a person to review.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllergenSuggestion {
    pub contains: BTreeSet<Allergen>,
    /// References found in neither the catalog nor the recipe book.
    pub unresolved: Vec<IngredientRef>,
}

impl Allergen {
    /// Normalizes a name: fixed keys (in any case) become `Known`, anything
    /// else is trimmed and lower-cased.
    pub fn named(name: &str) -> Self {
        let name = name.trim();
        AllergenType::ALL
            .iter()
            .find(|t| t.key().eq_ignore_ascii_case(name))
            .map(|t| Allergen::Known(*t))
            .unwrap_or_else(|| Allergen::Custom(name.to_lowercase()))
    }

    pub fn key(&self) -> &str {
        match self {
            Allergen::Known(t) => t.key(),
            Allergen::Custom(name) => name,
        }
    }
}

impl From<AllergenType> for Allergen {
    fn from(t: AllergenType) -> Self {
        Allergen::Known(t)
    }
}

impl fmt::Display for Allergen {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}", self.key())
    }
}

impl std::str::FromStr for Allergen {
    type Err = std::convert::Infallible;
    fn from_str(src: &str) -> Result<Self, Self::Err> {
        Ok(Allergen::named(src))
    }
}

impl Serialize for Allergen {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.key())
    }
}

impl<'de> Deserialize<'de> for Allergen {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        if name.trim().is_empty() {
            return Err(de::Error::custom("empty allergen name"));
        }
        Ok(Allergen::named(&name))
    }
}

impl AllergenFlags {
    pub fn custom(&self) -> &[CustomAllergen] {
        &self.custom
    }

    /// Adds or updates a custom allergen by name. Names are compared after
    /// normalization, so `"Lupin "` and `"lupin"` are the same entry.
    pub fn set_custom(&mut self, name: &str, active: bool) -> Result<(), TooManyCustomAllergens> {
        let wanted = Allergen::named(name);
        if let Allergen::Known(t) = wanted {
            self.set(t, active);
            return Ok(());
        }
        if let Some(existing) = self
            .custom
            .iter_mut()
            .find(|c| Allergen::named(&c.name) == wanted)
        {
            existing.active = active;
            return Ok(());
        }
        if self.custom.len() >= MAX_CUSTOM_ALLERGENS {
            return Err(TooManyCustomAllergens(MAX_CUSTOM_ALLERGENS));
        }
        self.custom.push(CustomAllergen {
            name: name.trim().to_string(),
            active,
        });
        Ok(())
    }

    pub fn remove_custom(&mut self, name: &str) -> bool {
        let wanted = Allergen::named(name);
        let before = self.custom.len();
        self.custom.retain(|c| Allergen::named(&c.name) != wanted);
        self.custom.len() != before
    }

    /// Every flagged fixed allergen, plus active custom ones.
    pub fn active(&self) -> BTreeSet<Allergen> {
        let fixed = AllergenType::ALL
            .iter()
            .filter(|t| self.is_flagged(**t))
            .map(|t| Allergen::Known(*t));
        let custom = self
            .custom
            .iter()
            .filter(|c| c.active && !c.name.trim().is_empty())
            .map(|c| Allergen::named(&c.name));
        fixed.chain(custom).collect()
    }
}

impl From<StoredAllergenInfo> for AllergenInfo {
    fn from(stored: StoredAllergenInfo) -> Self {
        let mut info = AllergenInfo {
            notes: stored.notes,
            ..AllergenInfo::default()
        };
        // Least severe first, so an allergen stored in several tiers ends up
        // in the most severe one.
        for a in stored.cross_contact_risk {
            info.declare(a, Tier::CrossContactRisk);
        }
        for a in stored.may_contain {
            info.declare(a, Tier::MayContain);
        }
        for a in stored.contains {
            info.declare(a, Tier::Contains);
        }
        info
    }
}

impl AllergenInfo {
    pub fn contains(&self) -> &BTreeSet<Allergen> {
        &self.contains
    }

    pub fn may_contain(&self) -> &BTreeSet<Allergen> {
        &self.may_contain
    }

    pub fn cross_contact_risk(&self) -> &BTreeSet<Allergen> {
        &self.cross_contact_risk
    }

    pub fn tier_of(&self, allergen: &Allergen) -> Option<Tier> {
        if self.contains.contains(allergen) {
            Some(Tier::Contains)
        } else if self.may_contain.contains(allergen) {
            Some(Tier::MayContain)
        } else if self.cross_contact_risk.contains(allergen) {
            Some(Tier::CrossContactRisk)
        } else {
            None
        }
    }

    pub fn declare(&mut self, allergen: Allergen, tier: Tier) {
        self.clear(&allergen);
        match tier {
            Tier::Contains => self.contains.insert(allergen),
            Tier::MayContain => self.may_contain.insert(allergen),
            Tier::CrossContactRisk => self.cross_contact_risk.insert(allergen),
        };
    }

    /// Removes the allergen from whichever tier holds it.
    pub fn clear(&mut self, allergen: &Allergen) -> bool {
        let a = self.contains.remove(allergen);
        let b = self.may_contain.remove(allergen);
        let c = self.cross_contact_risk.remove(allergen);
        a || b || c
    }

    /// Suggested allergens not yet declared as contained.
    pub fn unconfirmed(&self, suggestion: &AllergenSuggestion) -> BTreeSet<Allergen> {
        suggestion
            .contains
            .difference(&self.contains)
            .cloned()
            .collect()
    }

    /// Moves explicitly confirmed allergens into `contains`; returns those
    /// that were not already there.
    pub fn confirm<I: IntoIterator<Item = Allergen>>(&mut self, confirmed: I) -> Vec<Allergen> {
        let mut added = Vec::new();
        for allergen in confirmed {
            if !self.contains.contains(&allergen) {
                self.declare(allergen.clone(), Tier::Contains);
                added.push(allergen);
            }
        }
        added
    }
}

/// Aggregates what a list of ingredient references implies. Purchased
/// ingredients contribute their active flags. A sub-recipe contributes its
/// declared `contains` set plus whatever its own ingredients imply, however
/// deep the nesting; a recipe already visited is not walked again. Anything
/// that resolves in neither index is listed as unresolved and contributes
/// nothing.
pub fn derive_contains_set<'a, I>(
    ingredients: I,
    master_ingredients: &BTreeMap<Id<MasterIngredient>, MasterIngredient>,
    recipes: &BTreeMap<Id<Recipe>, Recipe>,
) -> AllergenSuggestion
where
    I: IntoIterator<Item = &'a IngredientRef>,
{
    let mut suggestion = AllergenSuggestion::default();
    let mut visited = BTreeSet::new();
    collect_contains(
        ingredients,
        master_ingredients,
        recipes,
        &mut visited,
        &mut suggestion,
    );
    suggestion.unresolved.sort();
    suggestion.unresolved.dedup();
    suggestion
}

fn collect_contains<'a, 'r, I>(
    ingredients: I,
    master_ingredients: &BTreeMap<Id<MasterIngredient>, MasterIngredient>,
    recipes: &'r BTreeMap<Id<Recipe>, Recipe>,
    visited: &mut BTreeSet<Id<Recipe>>,
    suggestion: &mut AllergenSuggestion,
) where
    I: IntoIterator<Item = &'a IngredientRef>,
{
    for reference in ingredients {
        match reference {
            IngredientRef::Purchased {
                master_ingredient_id,
            } => match master_ingredients.get(master_ingredient_id) {
                Some(item) => suggestion.contains.extend(item.allergens.active()),
                None => suggestion.unresolved.push(*reference),
            },
            IngredientRef::SubRecipe { recipe_id } => match recipes.get(recipe_id) {
                Some(recipe) => {
                    if !visited.insert(*recipe_id) {
                        continue;
                    }
                    suggestion
                        .contains
                        .extend(recipe.allergen_info.contains().iter().cloned());
                    collect_contains(
                        recipe.ingredient_refs(),
                        master_ingredients,
                        recipes,
                        visited,
                        suggestion,
                    );
                }
                None => suggestion.unresolved.push(*reference),
            },
        }
    }
}
