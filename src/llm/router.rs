//! Query Router - picks the domain agents that can answer a question

use crate::error::AssistantResult;
use crate::knowledge::Domain;
use crate::llm::chat_client::ChatModel;
use crate::llm::extract::{extract_or_default, Literal, Shape};
use crate::llm::prompts;
use std::sync::Arc;

pub struct QueryRouter {
    model: Arc<dyn ChatModel>,
}

impl QueryRouter {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    /// Domains whose tables can answer `question`. Never fails on a malformed
    /// reply, only on transport errors.
    pub async fn route(&self, question: &str) -> AssistantResult<Vec<Domain>> {
        let prompt = prompts::ROUTER.render(&[("question", question)]);
        tracing::debug!(model = self.model.name(), "Routing question");
        let reply = self.model.complete(&prompt).await?;
        Ok(parse_route(&reply))
    }
}

/// Parse the router reply; unknown labels are dropped, repeats collapsed
pub fn parse_route(reply: &str) -> Vec<Domain> {
    let labels: Vec<Literal> = extract_or_default("router", reply, Shape::JsonArray, |lit| match lit {
        Literal::List(items) => Some(items),
        _ => None,
    });

    let mut domains = Vec::new();
    for label in labels {
        match label.as_str().and_then(Domain::parse) {
            Some(domain) if !domains.contains(&domain) => domains.push(domain),
            Some(_) => {}
            None => tracing::debug!(label = ?label, "Ignoring unknown router label"),
        }
    }
    domains
}
