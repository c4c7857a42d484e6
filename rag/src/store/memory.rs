//! In-process recipe graph.
//!
//! Holds recipes, ingredients, steps and categories in a petgraph `DiGraph`
//! and evaluates [`GraphPattern`]s the same way the Neo4j adapter's Cypher
//! does. Used for tests and for running without a graph database.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};

use super::{GraphPattern, GraphStore};
use crate::error::ServiceError;
use crate::types::RecipeRow;

/// Nodes in the recipe graph.
#[derive(Debug, Clone)]
enum RecipeNode {
    Recipe {
        id: String,
        name: String,
        description: Option<String>,
        difficulty: Option<String>,
    },
    Ingredient {
        name: String,
    },
    Step {
        order: usize,
        description: String,
    },
    Category {
        name: String,
    },
}

impl RecipeNode {
    fn name(&self) -> Option<&str> {
        match self {
            RecipeNode::Recipe { name, .. }
            | RecipeNode::Ingredient { name }
            | RecipeNode::Category { name } => Some(name),
            RecipeNode::Step { .. } => None,
        }
    }
}

/// Edges always point away from the recipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecipeEdge {
    Requires,
    ContainsStep,
    BelongsToCategory,
}

/// Input for [`MemoryGraph::add_recipe`]; also the record format of an
/// offline recipe catalogue file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecipeSpec {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub ingredients: Vec<String>,
    /// In cooking order
    #[serde(default)]
    pub steps: Vec<String>,
}

/// Recipe graph kept in memory.
#[derive(Debug, Default)]
pub struct MemoryGraph {
    graph: DiGraph<RecipeNode, RecipeEdge>,
    recipes: BTreeMap<String, NodeIndex>,
    /// Lowercased ingredient name -> node
    ingredients: HashMap<String, NodeIndex>,
    /// Lowercased category name -> node
    categories: HashMap<String, NodeIndex>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_recipes(specs: impl IntoIterator<Item = RecipeSpec>) -> Self {
        let mut graph = Self::new();
        for spec in specs {
            graph.add_recipe(spec);
        }
        graph
    }

    /// Insert a recipe and link it to its ingredients, steps and category.
    ///
    /// Ingredient and category nodes are shared between recipes.
    pub fn add_recipe(&mut self, spec: RecipeSpec) {
        let recipe = self.graph.add_node(RecipeNode::Recipe {
            id: spec.id.clone(),
            name: spec.name,
            description: spec.description,
            difficulty: spec.difficulty,
        });
        self.recipes.insert(spec.id, recipe);

        for ingredient in spec.ingredients {
            let key = ingredient.to_lowercase();
            let node = *self
                .ingredients
                .entry(key)
                .or_insert_with(|| self.graph.add_node(RecipeNode::Ingredient { name: ingredient }));
            self.graph.add_edge(recipe, node, RecipeEdge::Requires);
        }

        for (order, description) in spec.steps.into_iter().enumerate() {
            let step = self.graph.add_node(RecipeNode::Step {
                order: order + 1,
                description,
            });
            self.graph.add_edge(recipe, step, RecipeEdge::ContainsStep);
        }

        if let Some(category) = spec.category {
            let key = category.to_lowercase();
            let node = *self
                .categories
                .entry(key)
                .or_insert_with(|| self.graph.add_node(RecipeNode::Category { name: category }));
            self.graph.add_edge(recipe, node, RecipeEdge::BelongsToCategory);
        }
    }

    pub fn recipe_count(&self) -> usize {
        self.recipes.len()
    }

    pub fn ingredient_count(&self) -> usize {
        self.ingredients.len()
    }

    /// Recipes reached from `term`, with their hop distance.
    ///
    /// `exact` compares whole names; otherwise `term` only has to be a substring.
    fn reach(&self, term: &str, exact: bool) -> Vec<(NodeIndex, u32)> {
        let matches = |name: &str| {
            let name = name.to_lowercase();
            if exact { name == term } else { name.contains(term) }
        };

        let mut reached = Vec::new();
        for &recipe in self.recipes.values() {
            if self.graph[recipe].name().is_some_and(matches) {
                reached.push((recipe, 0));
            }
        }

        let linked = self
            .ingredients
            .values()
            .chain(self.categories.values())
            .filter(|&&node| self.graph[node].name().is_some_and(matches));
        for &node in linked {
            for edge in self.graph.edges_directed(node, Direction::Incoming) {
                reached.push((edge.source(), 1));
            }
        }
        reached
    }

    /// Collect matches for every term and expand the reached recipes into rows.
    fn collect_rows(&self, terms: &[String], exact: bool, limit: usize) -> Vec<RecipeRow> {
        // recipe -> (matched terms, min hops)
        let mut hits: BTreeMap<NodeIndex, (Vec<String>, u32)> = BTreeMap::new();
        for term in terms {
            let term = term.to_lowercase();
            for (recipe, hops) in self.reach(&term, exact) {
                let entry = hits.entry(recipe).or_insert_with(|| (Vec::new(), hops));
                if !entry.0.contains(&term) {
                    entry.0.push(term.clone());
                }
                entry.1 = entry.1.min(hops);
            }
        }

        let mut rows: Vec<RecipeRow> = hits
            .into_iter()
            .filter_map(|(recipe, (matched, hops))| {
                let mut row = self.expand(recipe)?;
                row.matched = matched;
                row.hops = hops;
                Some(row)
            })
            .collect();

        rows.sort_by(|a, b| {
            b.matched
                .len()
                .cmp(&a.matched.len())
                .then(a.hops.cmp(&b.hops))
                .then_with(|| a.name.cmp(&b.name))
        });
        rows.truncate(limit);
        rows
    }

    /// Follow a recipe's outgoing edges to build its row.
    fn expand(&self, recipe: NodeIndex) -> Option<RecipeRow> {
        let RecipeNode::Recipe {
            id,
            name,
            description,
            difficulty,
        } = &self.graph[recipe]
        else {
            return None;
        };

        let mut row = RecipeRow {
            recipe_id: id.clone(),
            name: name.clone(),
            description: description.clone(),
            difficulty: difficulty.clone(),
            ..Default::default()
        };

        let mut steps = Vec::new();
        for edge in self.graph.edges_directed(recipe, Direction::Outgoing) {
            match (edge.weight(), &self.graph[edge.target()]) {
                (RecipeEdge::Requires, RecipeNode::Ingredient { name }) => {
                    row.ingredients.push(name.clone())
                }
                (RecipeEdge::ContainsStep, RecipeNode::Step { order, description }) => {
                    steps.push((*order, description.clone()))
                }
                (RecipeEdge::BelongsToCategory, RecipeNode::Category { name }) => {
                    row.category = Some(name.clone())
                }
                _ => {}
            }
        }
        // petgraph yields edges newest first
        row.ingredients.reverse();
        steps.sort_by_key(|(order, _)| *order);
        row.steps = steps.into_iter().map(|(_, text)| text).collect();
        Some(row)
    }
}

#[async_trait]
impl GraphStore for MemoryGraph {
    async fn query(&self, pattern: &GraphPattern) -> Result<Vec<RecipeRow>, ServiceError> {
        let rows = match pattern {
            GraphPattern::Neighborhood { entities, limit } => {
                self.collect_rows(entities, true, *limit)
            }
            GraphPattern::Keyword { keywords, limit } => self.collect_rows(keywords, false, *limit),
            GraphPattern::Catalog { limit } => self
                .recipes
                .values()
                .take(limit.unwrap_or(usize::MAX))
                .filter_map(|&recipe| self.expand(recipe))
                .collect(),
        };
        Ok(rows)
    }

    async fn entity_names(&self) -> Result<Vec<String>, ServiceError> {
        Ok(self
            .graph
            .node_weights()
            .filter_map(|node| node.name().map(str::to_string))
            .collect())
    }
}
