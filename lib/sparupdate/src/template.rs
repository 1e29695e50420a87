//! Instantiation of `DELETE`/`INSERT` templates and validation of `INSERT DATA`/`DELETE DATA` blocks.

use crate::command::{ConstructTemplate, GraphSpecifier};
use crate::error::UpdateEvaluationError;
use oxrdf::{BlankNode, GraphName, NamedNode, Subject, Term, Triple};
use rustc_hash::FxHashMap;
use sparesults::QuerySolution;
use spargebra::algebra::GraphPattern;
use spargebra::term::{NamedNodePattern, TermPattern, TriplePattern};

/// Triples grouped by the graph they belong to, in first-seen graph order.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct GraphTriples {
    graphs: Vec<(GraphName, Vec<Triple>)>,
}

impl GraphTriples {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, graph: &GraphName, triple: Triple) {
        self.entry(graph).push(triple);
    }

    fn entry(&mut self, graph: &GraphName) -> &mut Vec<Triple> {
        let position = if let Some(position) = self.graphs.iter().position(|(g, _)| g == graph) {
            position
        } else {
            self.graphs.push((graph.clone(), Vec::new()));
            self.graphs.len() - 1
        };
        &mut self.graphs[position].1
    }

    /// The triples for the given graph, empty if there are none.
    pub fn graph(&self, graph: &GraphName) -> &[Triple] {
        self.graphs
            .iter()
            .find(|(g, _)| g == graph)
            .map_or(&[], |(_, triples)| triples.as_slice())
    }

    /// The graphs with at least one triple.
    pub fn graph_names(&self) -> impl Iterator<Item = &GraphName> {
        self.iter().map(|(name, _)| name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&GraphName, &[Triple])> {
        self.graphs
            .iter()
            .filter(|(_, triples)| !triples.is_empty())
            .map(|(name, triples)| (name, triples.as_slice()))
    }

    /// Total number of triples.
    pub fn len(&self) -> usize {
        self.graphs.iter().map(|(_, triples)| triples.len()).sum()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn clear(&mut self) {
        self.graphs.clear();
    }
}

impl IntoIterator for GraphTriples {
    type Item = (GraphName, Vec<Triple>);
    type IntoIter = std::vec::IntoIter<(GraphName, Vec<Triple>)>;

    fn into_iter(mut self) -> Self::IntoIter {
        self.graphs.retain(|(_, triples)| !triples.is_empty());
        self.graphs.into_iter()
    }
}

/// Instantiates a template for one solution and appends the resulting triples to `output`.
///
/// The top level triples go to `default_graph`, the `GRAPH` clauses to the graph they name.
/// A triple that can't be built from the solution (unbound variable, literal subject...) is skipped.
/// A `GRAPH` clause whose variable is unbound or bound to a literal is skipped for this solution.
/// Blank nodes of the template are fresh for each call.
pub fn construct_triples(
    template: &ConstructTemplate,
    solution: &QuerySolution,
    default_graph: &GraphName,
    output: &mut GraphTriples,
) -> Result<(), UpdateEvaluationError> {
    let mut bnodes = FxHashMap::default();
    for pattern in &template.triples {
        if let Some(triple) = construct_triple(pattern, solution, &mut bnodes) {
            output.push(default_graph, triple);
        }
    }
    for graph_template in &template.graphs {
        let Some(graph) = resolve_graph_specifier(&graph_template.graph, solution)? else {
            continue;
        };
        for pattern in &graph_template.triples {
            if let Some(triple) = construct_triple(pattern, solution, &mut bnodes) {
                output.push(&graph, triple);
            }
        }
    }
    Ok(())
}

/// Returns the graph a `GRAPH` clause targets for a solution, `None` if the clause must be skipped.
pub fn resolve_graph_specifier(
    specifier: &GraphSpecifier,
    solution: &QuerySolution,
) -> Result<Option<GraphName>, UpdateEvaluationError> {
    Ok(match specifier {
        GraphSpecifier::NamedNode(node) => Some(node.clone().into()),
        GraphSpecifier::Variable(variable) => match solution.get(variable) {
            Some(Term::NamedNode(node)) => Some(node.clone().into()),
            Some(Term::BlankNode(node)) => Some(node.clone().into()),
            _ => None,
        },
        GraphSpecifier::PrefixedName(name) => {
            return Err(UpdateEvaluationError::UnsupportedGraphSpecifier(
                name.clone(),
            ));
        }
    })
}

fn construct_triple(
    pattern: &TriplePattern,
    solution: &QuerySolution,
    bnodes: &mut FxHashMap<BlankNode, BlankNode>,
) -> Option<Triple> {
    Some(Triple::new(
        construct_subject(&pattern.subject, solution, bnodes)?,
        construct_predicate(&pattern.predicate, solution)?,
        construct_term(&pattern.object, solution, bnodes)?,
    ))
}

fn construct_subject(
    pattern: &TermPattern,
    solution: &QuerySolution,
    bnodes: &mut FxHashMap<BlankNode, BlankNode>,
) -> Option<Subject> {
    match construct_term(pattern, solution, bnodes)? {
        Term::NamedNode(node) => Some(node.into()),
        Term::BlankNode(node) => Some(node.into()),
        Term::Literal(_) => None,
        #[cfg(feature = "rdf-star")]
        Term::Triple(triple) => Some(Subject::Triple(triple)),
    }
}

fn construct_predicate(pattern: &NamedNodePattern, solution: &QuerySolution) -> Option<NamedNode> {
    match pattern {
        NamedNodePattern::NamedNode(node) => Some(node.clone()),
        NamedNodePattern::Variable(variable) => match solution.get(variable)? {
            Term::NamedNode(node) => Some(node.clone()),
            _ => None,
        },
    }
}

fn construct_term(
    pattern: &TermPattern,
    solution: &QuerySolution,
    bnodes: &mut FxHashMap<BlankNode, BlankNode>,
) -> Option<Term> {
    match pattern {
        TermPattern::NamedNode(node) => Some(node.clone().into()),
        TermPattern::BlankNode(node) => Some(bnodes.entry(node.clone()).or_default().clone().into()),
        TermPattern::Literal(literal) => Some(literal.clone().into()),
        TermPattern::Variable(variable) => solution.get(variable).cloned(),
        #[cfg(feature = "rdf-star")]
        TermPattern::Triple(triple) => {
            Some(construct_triple(triple, solution, bnodes).map(Box::new)?.into())
        }
    }
}

/// Checks that an `INSERT DATA` or `DELETE DATA` block only contains concrete triples and
/// returns them grouped by graph.
///
/// The block may only be made of basic graph patterns and `GRAPH <iri>` clauses, without nested
/// `GRAPH` clauses. Blank nodes are only allowed if `allow_blank_nodes` is set, they are then
/// replaced by fresh ones.
pub fn validate_data_pattern(
    pattern: &GraphPattern,
    allow_blank_nodes: bool,
) -> Result<GraphTriples, UpdateEvaluationError> {
    let mut validator = DataValidator {
        allow_blank_nodes,
        bnodes: FxHashMap::default(),
        output: GraphTriples::new(),
    };
    validator.validate(pattern, &GraphName::DefaultGraph, false)?;
    Ok(validator.output)
}

struct DataValidator {
    allow_blank_nodes: bool,
    bnodes: FxHashMap<BlankNode, BlankNode>,
    output: GraphTriples,
}

impl DataValidator {
    fn validate(
        &mut self,
        pattern: &GraphPattern,
        graph: &GraphName,
        in_graph: bool,
    ) -> Result<(), UpdateEvaluationError> {
        match pattern {
            GraphPattern::Bgp { patterns } => {
                for pattern in patterns {
                    let triple = self.ground_triple(pattern)?;
                    self.output.push(graph, triple);
                }
                Ok(())
            }
            GraphPattern::Join { left, right } => {
                self.validate(left, graph, in_graph)?;
                self.validate(right, graph, in_graph)
            }
            GraphPattern::Graph { name, inner } => {
                if in_graph {
                    return Err(UpdateEvaluationError::InvalidDataPattern(
                        "GRAPH clauses can't be nested".into(),
                    ));
                }
                match name {
                    NamedNodePattern::NamedNode(name) => {
                        self.validate(inner, &name.clone().into(), true)
                    }
                    NamedNodePattern::Variable(variable) => {
                        Err(UpdateEvaluationError::InvalidDataPattern(format!(
                            "the graph name {variable} is not an IRI"
                        )))
                    }
                }
            }
            _ => Err(UpdateEvaluationError::InvalidDataPattern(format!(
                "{} is not allowed, only triples and GRAPH clauses are",
                construct_name(pattern)
            ))),
        }
    }

    fn ground_triple(&mut self, pattern: &TriplePattern) -> Result<Triple, UpdateEvaluationError> {
        let subject = match self.ground_term(&pattern.subject, pattern)? {
            Term::NamedNode(node) => Subject::from(node),
            Term::BlankNode(node) => node.into(),
            Term::Literal(_) => return Err(not_concrete(pattern)),
            #[cfg(feature = "rdf-star")]
            Term::Triple(triple) => Subject::Triple(triple),
        };
        let NamedNodePattern::NamedNode(predicate) = &pattern.predicate else {
            return Err(not_concrete(pattern));
        };
        let object = self.ground_term(&pattern.object, pattern)?;
        Ok(Triple::new(subject, predicate.clone(), object))
    }

    fn ground_term(
        &mut self,
        term: &TermPattern,
        pattern: &TriplePattern,
    ) -> Result<Term, UpdateEvaluationError> {
        match term {
            TermPattern::NamedNode(node) => Ok(node.clone().into()),
            TermPattern::Literal(literal) => Ok(literal.clone().into()),
            TermPattern::BlankNode(node) if self.allow_blank_nodes => {
                Ok(self.bnodes.entry(node.clone()).or_default().clone().into())
            }
            TermPattern::BlankNode(_) => Err(UpdateEvaluationError::InvalidDataPattern(format!(
                "blank nodes are not allowed in {pattern}"
            ))),
            TermPattern::Variable(_) => Err(not_concrete(pattern)),
            #[cfg(feature = "rdf-star")]
            TermPattern::Triple(triple) => Ok(Box::new(self.ground_triple(triple)?).into()),
        }
    }
}

fn not_concrete(pattern: &TriplePattern) -> UpdateEvaluationError {
    UpdateEvaluationError::InvalidDataPattern(format!(
        "{pattern} is not a concrete triple, variables are not permitted"
    ))
}

fn construct_name(pattern: &GraphPattern) -> &'static str {
    match pattern {
        GraphPattern::Path { .. } => "a property path",
        GraphPattern::LeftJoin { .. } => "OPTIONAL",
        GraphPattern::Filter { expr, .. } => match expr {
            spargebra::algebra::Expression::Exists(_) => "EXISTS",
            spargebra::algebra::Expression::Not(inner)
                if matches!(**inner, spargebra::algebra::Expression::Exists(_)) =>
            {
                "NOT EXISTS"
            }
            _ => "FILTER",
        },
        GraphPattern::Union { .. } => "UNION",
        GraphPattern::Minus { .. } => "MINUS",
        GraphPattern::Service { .. } => "SERVICE",
        GraphPattern::Extend { .. } => "BIND",
        GraphPattern::Values { .. } => "VALUES",
        GraphPattern::Project { .. }
        | GraphPattern::Distinct { .. }
        | GraphPattern::Reduced { .. }
        | GraphPattern::Slice { .. }
        | GraphPattern::OrderBy { .. }
        | GraphPattern::Group { .. } => "a sub-query",
        _ => "this construct",
    }
}
