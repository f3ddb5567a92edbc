//! Builds the candidate-enumeration prompt for one taxonomy node and
//! parses the AI's selection back into a child code (§4.E).

use refnorm_models::TaxonomyNode;
use refnorm_providers::{AggregatedResult, Completion};
use refnorm_similarity::{jaro_winkler, token_jaccard};

const SYSTEM_PROMPT: &str = "You classify a product or service name into one of a fixed set of \
industry taxonomy categories. Reply with only the matching category code.";

pub fn build_user_prompt(node: &TaxonomyNode, query: &str, category: Option<&str>) -> String {
    let mut prompt = String::new();
    prompt.push_str("Item: ");
    prompt.push_str(query);
    if let Some(category) = category {
        prompt.push_str("\nCategory hint: ");
        prompt.push_str(category);
    }
    prompt.push_str("\nCandidates:\n");
    for child in &node.children {
        prompt.push_str(&format!("{}: {}\n", child.code, child.name));
    }
    prompt
}

pub fn system_prompt() -> &'static str {
    SYSTEM_PROMPT
}

/// The outcome of matching an AI completion back to one of `node`'s children.
#[derive(Debug, Clone)]
pub struct Selection {
    pub child_code: String,
    pub confidence: f64,
}

/// Match the completion's text against the node's children, preferring an
/// exact code mention, falling back to the best fuzzy name match. `None`
/// when nothing in the response resembles any candidate.
pub fn parse_selection(node: &TaxonomyNode, aggregated: &AggregatedResult) -> Option<Selection> {
    let completion = aggregated.chosen.as_ref()?;
    match_against_children(node, completion)
}

fn match_against_children(node: &TaxonomyNode, completion: &Completion) -> Option<Selection> {
    let text = completion.text.trim();
    if let Some(child) = node.children.iter().find(|c| text.contains(&c.code)) {
        return Some(Selection { child_code: child.code.clone(), confidence: completion.confidence.unwrap_or(1.0) });
    }

    node.children
        .iter()
        .map(|child| {
            let score = jaro_winkler(text, &child.name).max(token_jaccard(text, &child.name));
            (child, score)
        })
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .filter(|(_, score)| *score > 0.5)
        .map(|(child, score)| Selection {
            child_code: child.code.clone(),
            confidence: completion.confidence.unwrap_or(score),
        })
}
