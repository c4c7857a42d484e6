//! Neo4j adapter over the HTTP transactional endpoint.
//!
//! Each [`GraphPattern`] is rendered to one parameterized Cypher statement and
//! POSTed to `{uri}/db/{database}/tx/commit`. Rows come back as positional
//! arrays; they are zipped with the column names and deserialized into
//! [`RecipeRow`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::{GraphPattern, GraphStore};
use crate::error::ServiceError;
use crate::types::RecipeRow;

const SERVICE: &str = "graph";

/// Columns every recipe query returns, expanded from the matched recipe `r`.
const RECIPE_PROJECTION: &str = "\
OPTIONAL MATCH (r)-[:REQUIRES]->(i:Ingredient)
WITH r, matched, hops, collect(DISTINCT i.name) AS ingredients
OPTIONAL MATCH (r)-[:CONTAINS_STEP]->(s:CookingStep)
WITH r, matched, hops, ingredients, s ORDER BY s.stepNumber
WITH r, matched, hops, ingredients, collect(s.description) AS steps
OPTIONAL MATCH (r)-[:BELONGS_TO_CATEGORY]->(c:Category)
RETURN toString(r.nodeId) AS recipe_id, r.name AS name, r.description AS description,
       head(collect(c.name)) AS category, toString(r.difficulty) AS difficulty,
       ingredients, steps, matched, hops";

const NEIGHBORHOOD_MATCH: &str = "\
UNWIND $terms AS term
CALL {
  WITH term
  MATCH (r:Recipe) WHERE toLower(r.name) = term
  RETURN r, 0 AS hops
  UNION
  WITH term
  MATCH (r:Recipe)-[:REQUIRES|BELONGS_TO_CATEGORY]->(n)
  WHERE toLower(n.name) = term
  RETURN r, 1 AS hops
}
WITH r, collect(DISTINCT term) AS matched, min(hops) AS hops";

const KEYWORD_MATCH: &str = "\
UNWIND $terms AS term
CALL {
  WITH term
  MATCH (r:Recipe) WHERE toLower(r.name) CONTAINS term
  RETURN r, 0 AS hops
  UNION
  WITH term
  MATCH (r:Recipe)-[:REQUIRES|BELONGS_TO_CATEGORY]->(n)
  WHERE toLower(n.name) CONTAINS term
  RETURN r, 1 AS hops
}
WITH r, collect(DISTINCT term) AS matched, min(hops) AS hops";

const CATALOG_MATCH: &str = "\
MATCH (r:Recipe)
WITH r, [] AS matched, 0 AS hops";

const RANKED_ORDER: &str = "ORDER BY size(matched) DESC, hops ASC, name ASC";

const ENTITY_NAMES: &str = "\
MATCH (n) WHERE (n:Recipe OR n:Ingredient OR n:Category) AND n.name IS NOT NULL
RETURN DISTINCT n.name AS name";

fn default_uri() -> String {
    "http://localhost:7474".to_string()
}

fn default_user() -> String {
    "neo4j".to_string()
}

fn default_database() -> String {
    "neo4j".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

/// Connection settings for [`Neo4jStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neo4jSettings {
    /// HTTP base URL of the server
    #[serde(default = "default_uri")]
    pub uri: String,
    #[serde(default = "default_user")]
    pub user: String,
    /// Password stored directly in config (prefer `password_env`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Environment variable holding the password
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for Neo4jSettings {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            user: default_user(),
            password: None,
            password_env: Some("NEO4J_PASSWORD".to_string()),
            database: default_database(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Neo4jSettings {
    /// Resolve the password, preferring the environment variable.
    pub fn resolve_password(&self) -> Option<String> {
        self.password_env
            .as_ref()
            .and_then(|var| std::env::var(var).ok())
            .or_else(|| self.password.clone())
    }

    fn commit_url(&self) -> String {
        format!(
            "{}/db/{}/tx/commit",
            self.uri.trim_end_matches('/'),
            self.database
        )
    }
}

#[derive(Debug, Deserialize)]
struct TxResponse {
    #[serde(default)]
    results: Vec<TxResult>,
    #[serde(default)]
    errors: Vec<TxError>,
}

#[derive(Debug, Deserialize)]
struct TxResult {
    columns: Vec<String>,
    #[serde(default)]
    data: Vec<TxRow>,
}

#[derive(Debug, Deserialize)]
struct TxRow {
    row: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct TxError {
    code: String,
    message: String,
}

/// Graph store backed by a Neo4j server.
pub struct Neo4jStore {
    client: Client,
    settings: Neo4jSettings,
    password: Option<String>,
}

impl Neo4jStore {
    pub fn new(settings: Neo4jSettings) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| ServiceError::Config {
                service: SERVICE.to_string(),
                message: format!("failed to build HTTP client: {e}"),
            })?;
        let password = settings.resolve_password();
        Ok(Self {
            client,
            settings,
            password,
        })
    }

    pub fn settings(&self) -> &Neo4jSettings {
        &self.settings
    }

    /// Run one statement and return its rows as column-keyed objects.
    async fn run(&self, statement: &str, parameters: Value) -> Result<Vec<Value>, ServiceError> {
        log::debug!("Running Cypher against {}", self.settings.commit_url());

        let mut request = self
            .client
            .post(self.settings.commit_url())
            .json(&statement_body(statement, parameters));
        if let Some(password) = &self.password {
            request = request.basic_auth(&self.settings.user, Some(password));
        }

        let response = request
            .send()
            .await
            .map_err(|e| ServiceError::from_http(SERVICE, e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::from_status(SERVICE, status.as_u16(), body));
        }

        let body: TxResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::parse(SERVICE, e.to_string()))?;
        rows_from_response(body)
    }
}

#[async_trait]
impl GraphStore for Neo4jStore {
    async fn query(&self, pattern: &GraphPattern) -> Result<Vec<RecipeRow>, ServiceError> {
        let (statement, parameters) = render_pattern(pattern);
        let rows = self.run(&statement, parameters).await?;
        rows.into_iter()
            .map(|row| {
                serde_json::from_value(row)
                    .map_err(|e| ServiceError::parse(SERVICE, format!("bad recipe row: {e}")))
            })
            .collect()
    }

    async fn entity_names(&self) -> Result<Vec<String>, ServiceError> {
        let rows = self.run(ENTITY_NAMES, json!({})).await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.get("name").and_then(Value::as_str).map(str::to_string))
            .collect())
    }
}

/// Render a pattern as Cypher plus its parameters.
fn render_pattern(pattern: &GraphPattern) -> (String, Value) {
    match pattern {
        GraphPattern::Neighborhood { entities, limit } => (
            format!("{NEIGHBORHOOD_MATCH}\n{RECIPE_PROJECTION}\n{RANKED_ORDER}\nLIMIT $limit"),
            json!({ "terms": lowercase(entities), "limit": limit }),
        ),
        GraphPattern::Keyword { keywords, limit } => (
            format!("{KEYWORD_MATCH}\n{RECIPE_PROJECTION}\n{RANKED_ORDER}\nLIMIT $limit"),
            json!({ "terms": lowercase(keywords), "limit": limit }),
        ),
        GraphPattern::Catalog { limit: Some(limit) } => (
            format!("{CATALOG_MATCH}\n{RECIPE_PROJECTION}\nORDER BY recipe_id\nLIMIT $limit"),
            json!({ "limit": limit }),
        ),
        GraphPattern::Catalog { limit: None } => (
            format!("{CATALOG_MATCH}\n{RECIPE_PROJECTION}\nORDER BY recipe_id"),
            json!({}),
        ),
    }
}

fn lowercase(terms: &[String]) -> Vec<String> {
    terms.iter().map(|t| t.to_lowercase()).collect()
}

fn statement_body(statement: &str, parameters: Value) -> Value {
    json!({
        "statements": [{ "statement": statement, "parameters": parameters }]
    })
}

/// Map Neo4j status codes onto service errors.
///
/// `Neo.TransientError.*` and `Neo.DatabaseError.*` may clear on retry;
/// `Neo.ClientError.*` means the statement itself is wrong.
fn classify_error(error: &TxError) -> ServiceError {
    let message = format!("{}: {}", error.code, error.message);
    if error.code.starts_with("Neo.TransientError") || error.code.starts_with("Neo.DatabaseError")
    {
        ServiceError::unavailable(SERVICE, message)
    } else {
        ServiceError::rejected(SERVICE, message)
    }
}

fn rows_from_response(response: TxResponse) -> Result<Vec<Value>, ServiceError> {
    if let Some(error) = response.errors.first() {
        return Err(classify_error(error));
    }

    let mut rows = Vec::new();
    for result in response.results {
        for data in result.data {
            if data.row.len() != result.columns.len() {
                return Err(ServiceError::parse(
                    SERVICE,
                    format!(
                        "row has {} values for {} columns",
                        data.row.len(),
                        result.columns.len()
                    ),
                ));
            }
            let object: Map<String, Value> =
                result.columns.iter().cloned().zip(data.row).collect();
            rows.push(Value::Object(object));
        }
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(body: Value) -> TxResponse {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn test_commit_url_strips_trailing_slash() {
        let settings = Neo4jSettings {
            uri: "http://db:7474/".to_string(),
            database: "recipes".to_string(),
            ..Default::default()
        };
        assert_eq!(settings.commit_url(), "http://db:7474/db/recipes/tx/commit");
    }

    #[test]
    fn test_settings_defaults_from_empty_json() {
        let settings: Neo4jSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings.uri, "http://localhost:7474");
        assert_eq!(settings.database, "neo4j");
        assert_eq!(settings.timeout_secs, 30);
        assert!(settings.password_env.is_none());
    }

    #[test]
    fn test_explicit_password_used_without_env() {
        let settings = Neo4jSettings {
            password: Some("secret".to_string()),
            password_env: None,
            ..Default::default()
        };
        assert_eq!(settings.resolve_password().as_deref(), Some("secret"));
    }

    #[test]
    fn test_neighborhood_statement_is_parameterized() {
        let (statement, params) = render_pattern(&GraphPattern::Neighborhood {
            entities: vec!["Chicken".to_string(), "Soy Sauce".to_string()],
            limit: 7,
        });
        assert!(statement.contains("UNWIND $terms AS term"));
        assert!(statement.contains("toLower(n.name) = term"));
        assert!(statement.contains("LIMIT $limit"));
        assert!(!statement.contains("Chicken"));
        assert_eq!(params["terms"], json!(["chicken", "soy sauce"]));
        assert_eq!(params["limit"], 7);
    }

    #[test]
    fn test_keyword_statement_uses_contains() {
        let (statement, _) = render_pattern(&GraphPattern::Keyword {
            keywords: vec!["spicy".to_string()],
            limit: 3,
        });
        assert!(statement.contains("CONTAINS term"));
    }

    #[test]
    fn test_unbounded_catalog_has_no_limit() {
        let (statement, params) = render_pattern(&GraphPattern::Catalog { limit: None });
        assert!(!statement.contains("LIMIT"));
        assert_eq!(params, json!({}));
    }

    #[test]
    fn test_statement_body_shape() {
        let body = statement_body("RETURN 1", json!({ "a": 1 }));
        assert_eq!(body["statements"][0]["statement"], "RETURN 1");
        assert_eq!(body["statements"][0]["parameters"]["a"], 1);
    }

    #[test]
    fn test_rows_zip_columns_into_recipe_rows() {
        let response = parse(json!({
            "results": [{
                "columns": ["recipe_id", "name", "description", "category", "difficulty",
                            "ingredients", "steps", "matched", "hops"],
                "data": [{
                    "row": ["200000001", "Mapo Tofu", null, "Sichuan", "3",
                            ["Tofu", "Pork"], ["Brown pork", "Add tofu"], ["tofu"], 1]
                }]
            }],
            "errors": []
        }));

        let rows = rows_from_response(response).unwrap();
        let recipe: RecipeRow = serde_json::from_value(rows[0].clone()).unwrap();
        assert_eq!(recipe.recipe_id, "200000001");
        assert_eq!(recipe.description, None);
        assert_eq!(recipe.difficulty.as_deref(), Some("3"));
        assert_eq!(recipe.steps.len(), 2);
        assert_eq!(recipe.hops, 1);
    }

    #[test]
    fn test_transient_error_code_is_retryable() {
        let response = parse(json!({
            "results": [],
            "errors": [{ "code": "Neo.TransientError.Transaction.DeadlockDetected", "message": "x" }]
        }));
        let err = rows_from_response(response).unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn test_client_error_code_is_rejected() {
        let response = parse(json!({
            "results": [],
            "errors": [{ "code": "Neo.ClientError.Statement.SyntaxError", "message": "bad" }]
        }));
        let err = rows_from_response(response).unwrap_err();
        assert!(matches!(err, ServiceError::Rejected { .. }));
        assert!(err.to_string().contains("SyntaxError"));
    }

    #[test]
    fn test_ragged_row_is_parse_error() {
        let response = parse(json!({
            "results": [{ "columns": ["a", "b"], "data": [{ "row": [1] }] }]
        }));
        assert!(matches!(
            rows_from_response(response),
            Err(ServiceError::Parse { .. })
        ));
    }
}
