use crate::config::RouterConfig;
use crate::types::Document;

const SYSTEM_PROMPT: &str = "You are a cooking assistant backed by a recipe knowledge base.

When answering questions:
- Ground your answer in the provided recipes and cite them by name
- Keep ingredient lists and steps in the order the recipe gives them
- Be concise and practical
- If the recipes only partly answer the question, say which part they cover";

const NO_EVIDENCE: &str = "No matching recipe was found in the knowledge base for this question. \
Answer from general cooking knowledge, and tell the user up front that no matching recipe was found.";

/// A prompt split into system and user parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    /// System and user parts joined, for providers without a system role.
    pub fn combined(&self) -> String {
        format!("{}\n\n{}", self.system, self.user)
    }
}

/// Renders a query and its evidence into a bounded prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptBuilder {
    /// Budget for the whole evidence section
    pub max_context_chars: usize,
    /// Per-document content cap
    pub max_doc_chars: usize,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::from_config(&RouterConfig::default())
    }
}

impl PromptBuilder {
    pub fn from_config(config: &RouterConfig) -> Self {
        Self {
            max_context_chars: config.max_context_chars,
            max_doc_chars: config.max_doc_chars,
        }
    }

    pub fn build(&self, query: &str, evidence: &[Document]) -> Prompt {
        let user = if evidence.is_empty() {
            format!("**Question:** {query}\n\n{NO_EVIDENCE}")
        } else {
            format!(
                "**Question:** {query}\n\n**Recipes:**\n{}\n\nAnswer the question using these recipes.",
                self.render_evidence(evidence)
            )
        };

        Prompt {
            system: SYSTEM_PROMPT.to_string(),
            user,
        }
    }

    /// Render documents in rank order until the context budget is spent.
    ///
    /// The first document is always included (truncated if needed) so a tiny
    /// budget never produces an empty evidence section.
    fn render_evidence(&self, evidence: &[Document]) -> String {
        let mut rendered = String::new();
        let mut used = 0;

        for (i, doc) in evidence.iter().enumerate() {
            let block = self.render_document(i + 1, doc);
            let len = block.chars().count();
            if i > 0 && used + len > self.max_context_chars {
                rendered.push_str(&format!(
                    "({} more recipe(s) omitted)\n",
                    evidence.len() - i
                ));
                break;
            }
            let block = if len > self.max_context_chars {
                truncate_chars(&block, self.max_context_chars)
            } else {
                block
            };
            used += block.chars().count();
            rendered.push_str(&block);
        }
        rendered.trim_end().to_string()
    }

    fn render_document(&self, rank: usize, doc: &Document) -> String {
        let name = doc.metadata.recipe_name.as_deref().unwrap_or("Unknown recipe");
        let mut block = format!("[{rank}] {name}");

        let facts: Vec<String> = ["category", "difficulty"]
            .iter()
            .filter_map(|key| {
                doc.metadata
                    .extra
                    .get(*key)
                    .map(|value| format!("{key}: {value}"))
            })
            .collect();
        if !facts.is_empty() {
            block.push_str(&format!(" ({})", facts.join(", ")));
        }
        block.push('\n');
        block.push_str(&truncate_chars(doc.content.trim(), self.max_doc_chars));
        block.push_str("\n\n");
        block
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(max.saturating_sub(3)).collect();
    truncated.push_str("...");
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SourceType;

    fn doc(id: &str, name: &str, content: &str) -> Document {
        Document::new(id, SourceType::Graph, content, Some(name.to_string()), 1.0)
            .with_extra("category", "Stir-fry")
    }

    #[test]
    fn test_empty_evidence_discloses_no_match() {
        let prompt = PromptBuilder::default().build("How do I make bread?", &[]);
        assert!(prompt.user.contains("How do I make bread?"));
        assert!(prompt.user.contains("No matching recipe was found"));
        assert!(prompt.user.contains("general cooking knowledge"));
        assert!(!prompt.user.contains("**Recipes:**"));
        assert!(!prompt.user.contains("using these recipes"));
        assert!(prompt.user.ends_with("no matching recipe was found."));
    }

    #[test]
    fn test_evidence_rendered_in_rank_order() {
        let evidence = vec![
            doc("r1", "Kung Pao Chicken", "Dice the chicken."),
            doc("r2", "Mapo Tofu", "Brown the pork."),
        ];
        let prompt = PromptBuilder::default().build("spicy dinner?", &evidence);

        let first = prompt.user.find("[1] Kung Pao Chicken (category: Stir-fry)").unwrap();
        let second = prompt.user.find("[2] Mapo Tofu").unwrap();
        assert!(first < second);
        assert!(prompt.user.contains("Brown the pork."));
        assert!(!prompt.user.contains("No matching recipe"));
        assert!(prompt.user.ends_with("Answer the question using these recipes."));
    }

    #[test]
    fn test_document_content_truncated() {
        let builder = PromptBuilder {
            max_context_chars: 10_000,
            max_doc_chars: 20,
        };
        let evidence = vec![doc("r1", "Soup", &"a".repeat(100))];
        let prompt = builder.build("q", &evidence);
        assert!(prompt.user.contains(&format!("{}...", "a".repeat(17))));
        assert!(!prompt.user.contains(&"a".repeat(18)));
    }

    #[test]
    fn test_context_budget_drops_lower_ranked_documents() {
        let builder = PromptBuilder {
            max_context_chars: 120,
            max_doc_chars: 60,
        };
        let evidence: Vec<Document> = (0..5)
            .map(|i| doc(&format!("r{i}"), &format!("Recipe {i}"), &"x".repeat(60)))
            .collect();
        let prompt = builder.build("q", &evidence);

        assert!(prompt.user.contains("[1] Recipe 0"));
        assert!(!prompt.user.contains("[5] Recipe 4"));
        assert!(prompt.user.contains("more recipe(s) omitted"));
    }

    #[test]
    fn test_first_document_always_included() {
        let builder = PromptBuilder {
            max_context_chars: 10,
            max_doc_chars: 500,
        };
        let prompt = builder.build("q", &[doc("r1", "Long", &"y".repeat(200))]);
        assert!(prompt.user.contains("[1] Lo"));
    }

    #[test]
    fn test_combined_prompt() {
        let prompt = Prompt {
            system: "sys".to_string(),
            user: "usr".to_string(),
        };
        assert_eq!(prompt.combined(), "sys\n\nusr");
    }
}
