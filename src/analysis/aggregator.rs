//! Citation aggregation and document statistics.
//!
//! Results are walked in selection-rank order, documents in the order each
//! agent returned them. Every new `(file name, page)` pair gets the next
//! `DOC_XXX` id; a pair seen before is merged into the existing id and the
//! later agent is added to its owners.

use crate::models::{
    AgentResult, CitedDocument, Diagnostic, DiagnosticKind, DocId, DocumentRef, DocumentSummary,
    SourceDocument,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, warn};

/// Source type label for documents that carry none.
pub const UNCLASSIFIED: &str = "unclassified";

/// Deduplicated, numbered evidence for one query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CitationSet {
    pub documents: Vec<CitedDocument>,
    pub summary: DocumentSummary,
    /// Citation block handed to the text generator.
    pub instructions: String,
    pub diagnostics: Vec<Diagnostic>,
}

impl CitationSet {
    /// DOC ids contributed by `agent_id`, in walk order.
    pub fn ids_for(&self, agent_id: &str) -> &[DocId] {
        self.summary
            .by_agent
            .get(agent_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn contains(&self, id: DocId) -> bool {
        id.seq() >= 1 && (id.seq() as usize) <= self.documents.len()
    }
}

#[derive(Debug, Clone)]
pub struct CitationAggregator {
    high_relevance_threshold: f32,
}

impl Default for CitationAggregator {
    fn default() -> Self {
        Self::new(0.7)
    }
}

impl CitationAggregator {
    pub fn new(high_relevance_threshold: f32) -> Self {
        Self {
            high_relevance_threshold,
        }
    }

    /// Numbers and deduplicates the documents of the successful results.
    ///
    /// Output depends only on the results and their ranks, never on the
    /// order they are passed in.
    pub fn aggregate(&self, results: &[AgentResult]) -> CitationSet {
        let mut ordered: Vec<&AgentResult> = results.iter().collect();
        ordered.sort_by(|a, b| a.rank.cmp(&b.rank).then_with(|| a.agent_id.cmp(&b.agent_id)));

        let mut documents: Vec<CitedDocument> = Vec::new();
        let mut index: HashMap<(String, Option<String>), usize> = HashMap::new();
        let mut positions: Vec<(String, Vec<usize>)> = Vec::new();

        for result in &ordered {
            let mut own: Vec<usize> = Vec::new();

            for doc in &result.documents {
                let key = doc.dedup_key();
                let pos = match index.get(&key) {
                    Some(&pos) => {
                        let existing = &mut documents[pos];
                        if !existing.agents.contains(&result.agent_id) {
                            existing.agents.push(result.agent_id.clone());
                        }
                        merge_metadata(existing, doc);
                        debug!(
                            "Merged {} from '{}' into {}",
                            doc.location(),
                            result.agent_id,
                            existing.id
                        );
                        pos
                    }
                    None => {
                        let pos = documents.len();
                        documents.push(CitedDocument {
                            id: DocId::from_index(pos),
                            agents: vec![result.agent_id.clone()],
                            document: doc.clone(),
                        });
                        index.insert(key, pos);
                        pos
                    }
                };

                if !own.contains(&pos) {
                    own.push(pos);
                }
            }

            positions.push((result.agent_id.clone(), own));
        }

        let diagnostics = renumber(&mut documents);

        let mut by_agent: BTreeMap<String, Vec<DocId>> = BTreeMap::new();
        let mut agents_used: Vec<String> = Vec::new();
        for (agent_id, own) in &positions {
            if own.is_empty() {
                continue;
            }
            if !agents_used.contains(agent_id) {
                agents_used.push(agent_id.clone());
            }
            by_agent
                .entry(agent_id.clone())
                .or_default()
                .extend(own.iter().map(|&pos| documents[pos].id));
        }

        let summary = self.summarize(&documents, agents_used, by_agent);
        let instructions = citation_instructions(&documents);

        CitationSet {
            documents,
            summary,
            instructions,
            diagnostics,
        }
    }

    fn summarize(
        &self,
        documents: &[CitedDocument],
        agents_used: Vec<String>,
        by_agent: BTreeMap<String, Vec<DocId>>,
    ) -> DocumentSummary {
        let mut by_extension: BTreeMap<String, usize> = BTreeMap::new();
        let mut by_source_type: BTreeMap<String, usize> = BTreeMap::new();

        for doc in documents {
            *by_extension.entry(doc.document.extension.clone()).or_default() += 1;

            let source_type = doc
                .document
                .source_type
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or(UNCLASSIFIED);
            *by_source_type.entry(source_type.to_string()).or_default() += 1;
        }

        let high_relevance = documents
            .iter()
            .filter(|d| d.document.relevance > self.high_relevance_threshold)
            .map(DocumentRef::from)
            .collect();

        DocumentSummary {
            total_documents: documents.len(),
            by_extension,
            agents_used,
            high_relevance,
            by_source_type,
            by_agent,
        }
    }
}

/// Keeps the best relevance and fills metadata gaps from a duplicate.
fn merge_metadata(existing: &mut CitedDocument, duplicate: &SourceDocument) {
    let doc = &mut existing.document;
    if duplicate.relevance > doc.relevance {
        doc.relevance = duplicate.relevance;
    }
    if doc.section.is_none() {
        doc.section = duplicate.section.clone();
    }
    if doc.company.is_none() {
        doc.company = duplicate.company.clone();
    }
    if doc.date.is_none() {
        doc.date = duplicate.date.clone();
    }
    if doc.source_type.is_none() {
        doc.source_type = duplicate.source_type.clone();
    }
    if doc.excerpt.is_empty() {
        doc.excerpt = duplicate.excerpt.clone();
    }
}

/// Forces ids to be unique and contiguous from `DOC_001`, reporting any fix.
pub(crate) fn renumber(documents: &mut [CitedDocument]) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    let mut seen: HashSet<DocId> = HashSet::new();

    for (i, doc) in documents.iter_mut().enumerate() {
        let expected = DocId::from_index(i);
        if doc.id != expected || !seen.insert(doc.id) {
            let message = format!(
                "{} at position {} reassigned to {}",
                doc.id,
                i + 1,
                expected
            );
            warn!("Citation inconsistency: {}", message);
            diagnostics.push(Diagnostic::new(DiagnosticKind::CitationInconsistency, message));
            doc.id = expected;
            seen.insert(expected);
        }
    }

    diagnostics
}

/// Lists the available ids and the inline citation convention.
pub fn citation_instructions(documents: &[CitedDocument]) -> String {
    if documents.is_empty() {
        return "DOCUMENT CITATIONS: none. No source documents were retrieved for this query; \
                do not include [DOC_XXX] citations."
            .to_string();
    }

    let mut text = String::from("DOCUMENT CITATIONS:\n");
    for doc in documents {
        text.push_str(&format!(
            "- {}: {} ({}) [{}]\n",
            doc.id,
            doc.document.title,
            doc.document.location(),
            doc.agents.join(", ")
        ));
    }
    text.push_str(
        "\nINSTRUCTIONS: Cite supporting evidence inline as [DOC_XXX], using only the ids listed \
         above. Every factual claim drawn from a document must carry its citation.",
    );
    text
}
