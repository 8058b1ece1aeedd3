//! Answer synthesis seam
//!
//! Turns a [`QueryResponse`] into a prompt for a text-generation provider.
//! Generation failures never fail the question: the caller gets fallback
//! text built from the retrieved payload instead.

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::engine::{QueryPayload, QueryResponse};
use crate::error::Result;

/// Items of each kind rendered into a prompt
const PROMPT_ITEMS: usize = 10;
/// Characters of document content rendered per document
const DOCUMENT_EXCERPT: usize = 400;

/// Text generation provider
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// A synthesized answer
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub text: String,
    /// Set when generation failed and `text` is the fallback
    pub fallback: bool,
}

fn excerpt(text: &str) -> &str {
    match text.char_indices().nth(DOCUMENT_EXCERPT) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Render the retrieved payload as plain-text context lines
pub fn render_context(payload: &QueryPayload) -> String {
    let mut out = String::new();
    match payload {
        QueryPayload::Profile(profile) => {
            let _ = writeln!(
                out,
                "{} ({})",
                profile.entity.name, profile.entity.entity_type
            );
            if !profile.entity.description.is_empty() {
                let _ = writeln!(out, "Description: {}", profile.entity.description);
            }
            for group in &profile.groups {
                let names: Vec<&str> = group
                    .entities
                    .iter()
                    .take(PROMPT_ITEMS)
                    .map(|e| e.name.as_str())
                    .collect();
                let _ = writeln!(out, "{}: {}", group.label, names.join(", "));
            }
        }
        QueryPayload::SectorListing(listing) => {
            for company in listing.companies.iter().take(PROMPT_ITEMS) {
                if company.investors.is_empty() {
                    let _ = writeln!(out, "- {}", company.entity.name);
                } else {
                    let _ = writeln!(
                        out,
                        "- {} (investors: {})",
                        company.entity.name,
                        company.investors.join(", ")
                    );
                }
            }
        }
        QueryPayload::Insights(insights) => {
            let _ = writeln!(
                out,
                "Graph: {} entities, {} relationships, {} communities",
                insights.stats.total_entities,
                insights.stats.total_relationships,
                insights.stats.communities
            );
            for community in &insights.communities {
                let _ = writeln!(
                    out,
                    "Community {} ({} members): {}",
                    community.community_id,
                    community.size,
                    community.top_members.join(", ")
                );
            }
            for triple in &insights.strongest {
                let _ = writeln!(out, "{}", triple.render());
            }
        }
        QueryPayload::MultiHop(result) => {
            if let Some(path) = &result.path {
                let _ = writeln!(out, "Connection: {}", path.render());
            }
            for triple in result.context.triples.iter().take(PROMPT_ITEMS) {
                let _ = writeln!(out, "{}", triple.render());
            }
            render_documents(&mut out, &result.documents);
        }
        QueryPayload::Search(search) => {
            for hit in search.hits.iter().take(PROMPT_ITEMS) {
                let _ = writeln!(out, "- {} ({})", hit.entity.name, hit.entity.entity_type);
            }
            for triple in search.context.triples.iter().take(PROMPT_ITEMS) {
                let _ = writeln!(out, "{}", triple.render());
            }
            render_documents(&mut out, &search.documents);
        }
        QueryPayload::Documents(documents) => render_documents(&mut out, documents),
    }
    out
}

fn render_documents(out: &mut String, documents: &[super::fusion::FusedDocument]) {
    for document in documents.iter().take(PROMPT_ITEMS) {
        let _ = writeln!(out, "[{}] {}", document.title, excerpt(&document.content));
    }
}

/// Full prompt: instructions, context and the question
pub fn build_prompt(response: &QueryResponse) -> String {
    let context = render_context(&response.payload);
    let context = if context.trim().is_empty() {
        "No relevant information was found in the knowledge graph.\n".to_string()
    } else {
        context
    };
    format!(
        "Answer the question using only the context below. \
         If the context does not contain the answer, say so.\n\n\
         Context:\n{}\nQuestion: {}\nAnswer:",
        context, response.question
    )
}

/// Text returned when generation fails
pub fn fallback_answer(response: &QueryResponse, reason: &str) -> String {
    let context = render_context(&response.payload);
    if context.trim().is_empty() {
        format!(
            "An answer could not be generated ({}), and no relevant information was found.",
            reason
        )
    } else {
        format!(
            "An answer could not be generated ({}). Retrieved information:\n{}",
            reason,
            context.trim_end()
        )
    }
}

/// Produces answers from retrieval responses
pub struct AnswerSynthesizer {
    generator: Arc<dyn AnswerGenerator>,
}

impl AnswerSynthesizer {
    pub fn new(generator: Arc<dyn AnswerGenerator>) -> Self {
        Self { generator }
    }

    pub async fn answer(&self, response: &QueryResponse) -> Answer {
        let prompt = build_prompt(response);
        debug!(
            generator = self.generator.name(),
            prompt_chars = prompt.len(),
            "Generating answer"
        );

        match self.generator.generate(&prompt).await {
            Ok(text) if !text.trim().is_empty() => Answer {
                text,
                fallback: false,
            },
            Ok(_) => {
                warn!(generator = self.generator.name(), "Generator returned an empty answer");
                Answer {
                    text: fallback_answer(response, "empty response"),
                    fallback: true,
                }
            }
            Err(e) => {
                warn!(generator = self.generator.name(), error = %e, "Answer generation failed");
                Answer {
                    text: fallback_answer(response, &e.to_string()),
                    fallback: true,
                }
            }
        }
    }
}
