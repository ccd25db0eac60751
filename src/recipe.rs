//! recipe records as the backend sends them, plus the detail projection.
//!
//! the backend ships `ingredients` as one `", "`-joined string and
//! `instructions` as a legacy `c("step one", "step two")` encoding.
//! `decode_instructions` is the only code that knows about the latter, so the
//! wire format can move to a real list without touching the ui.

use serde::{Deserialize, Deserializer, Serialize};

/// one recommendation attached to an assistant turn. immutable once received.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub title: String,
    pub ingredients: String,
    pub instructions: String,
    pub cook_time: String,
    pub prep_time: String,
    pub rating: f32,
    /// missing on the wire is treated as no images.
    #[serde(default)]
    pub images: Vec<String>,
    pub description: String,
    pub category: String,
    /// any json number; vector-store metadata hands back `4.0`.
    #[serde(deserialize_with = "lenient_count")]
    pub servings: u32,
}

/// read a count from any json number, truncating fractions and saturating
/// at the `u32` bounds (negatives and nan become 0).
fn lenient_count<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let n = f64::deserialize(deserializer)?;
    Ok(n as u32)
}

impl Recipe {
    pub fn first_image(&self) -> Option<&str> {
        self.images.first().map(String::as_str)
    }
}

/// one numbered instruction step (numbering starts at 1).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Step {
    pub number: usize,
    pub text: String,
}

/// human-readable breakdown of a single recipe, ready for any ui to lay out.
#[derive(Clone, Debug, PartialEq)]
pub struct RecipeDetail {
    pub title: String,
    pub rating: f32,
    pub servings: u32,
    pub cook_time: String,
    pub prep_time: String,
    pub image: Option<String>,
    pub ingredients: Vec<String>,
    pub steps: Vec<Step>,
}

impl RecipeDetail {
    pub fn from_recipe(recipe: &Recipe) -> Self {
        let steps = decode_instructions(&recipe.instructions)
            .into_iter()
            .enumerate()
            .map(|(i, text)| Step { number: i + 1, text })
            .collect();
        Self {
            title: recipe.title.clone(),
            rating: recipe.rating,
            servings: recipe.servings,
            cook_time: recipe.cook_time.clone(),
            prep_time: recipe.prep_time.clone(),
            image: recipe.first_image().map(str::to_string),
            ingredients: split_ingredients(&recipe.ingredients),
            steps,
        }
    }
}

const INGREDIENT_DELIMITER: &str = ", ";
const STEP_SEPARATOR: &str = "\", \"";

/// split on `", "`; segments keep their whitespace and order.
pub fn split_ingredients(ingredients: &str) -> Vec<String> {
    ingredients
        .split(INGREDIENT_DELIMITER)
        .map(str::to_string)
        .collect()
}

/// decode the legacy `c("a", "b")` list encoding into ordered steps.
///
/// every strip is conditional, so input that doesn't follow the encoding still
/// yields at least one step (the whole string, minus whatever matched).
pub fn decode_instructions(instructions: &str) -> Vec<String> {
    let body = instructions.strip_prefix("c(").unwrap_or(instructions);
    let body = body.strip_suffix(')').unwrap_or(body);
    body.split(STEP_SEPARATOR)
        .map(|piece| {
            let piece = piece.strip_prefix('"').unwrap_or(piece);
            piece.strip_suffix('"').unwrap_or(piece).to_string()
        })
        .collect()
}
