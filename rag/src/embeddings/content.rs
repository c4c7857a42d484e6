//! Text representations of recipes for embedding.

use sha2::{Digest, Sha256};

use crate::types::RecipeRow;

/// Longest description excerpt kept in embedded content.
const MAX_DESCRIPTION_CHARS: usize = 400;

/// Build embeddable text for a recipe.
///
/// Name first, then category and difficulty, then ingredients and steps so
/// ingredient-centric questions land near the right recipes.
pub fn build_recipe_content(recipe: &RecipeRow) -> String {
    let mut content = format!("Recipe: {}", recipe.name);
    if let Some(category) = &recipe.category {
        content.push_str(&format!("\nCategory: {category}"));
    }
    if let Some(difficulty) = &recipe.difficulty {
        content.push_str(&format!("\nDifficulty: {difficulty}"));
    }
    if let Some(description) = recipe.description.as_deref().filter(|d| !d.is_empty()) {
        let excerpt: String = description.chars().take(MAX_DESCRIPTION_CHARS).collect();
        content.push_str(&format!("\nDescription: {excerpt}"));
    }
    if !recipe.ingredients.is_empty() {
        content.push_str(&format!("\nIngredients: {}", recipe.ingredients.join(", ")));
    }
    if !recipe.steps.is_empty() {
        content.push_str("\nSteps:");
        for (i, step) in recipe.steps.iter().enumerate() {
            content.push_str(&format!("\n{}. {step}", i + 1));
        }
    }
    content
}

/// Compute a SHA-256 content hash for deduplication.
pub fn compute_content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}
