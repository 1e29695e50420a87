//! Evaluation of the `WHERE` patterns of update commands.
//!
//! [`QueryPatternEvaluator`] evaluates them with [`spareval`]. Another SPARQL engine can be
//! plugged in through the [`PatternEvaluator`] trait.

use crate::dataset::{GraphSelection, UpdatableDataset};
use crate::error::UpdateEvaluationError;
use oxrdf::{Dataset, GraphNameRef, QuadRef, Term, Variable};
use sparesults::QuerySolution;
use spareval::{QueryEvaluator, QueryResults};
use spargebra::Query;
use spargebra::algebra::GraphPattern;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// The solutions of a graph pattern.
#[derive(Debug)]
pub enum Multiset {
    /// The multiset with a single solution that binds no variable.
    ///
    /// It is the result of evaluating an empty pattern.
    Identity,
    Solutions {
        variables: Arc<[Variable]>,
        solutions: Vec<QuerySolution>,
    },
}

impl Multiset {
    #[inline]
    pub fn empty() -> Self {
        Self::Solutions {
            variables: Arc::new([]),
            solutions: Vec::new(),
        }
    }

    #[inline]
    pub fn is_identity(&self) -> bool {
        matches!(self, Self::Identity)
    }

    /// Number of solutions, the identity having exactly one.
    #[inline]
    pub fn len(&self) -> usize {
        match self {
            Self::Identity => 1,
            Self::Solutions { solutions, .. } => solutions.len(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the solutions, the identity being turned into one solution over no variable.
    pub fn into_solutions(self) -> Vec<QuerySolution> {
        match self {
            Self::Identity => vec![QuerySolution::from((
                Arc::<[Variable]>::from([]),
                Vec::<Option<Term>>::new(),
            ))],
            Self::Solutions { solutions, .. } => solutions,
        }
    }
}

impl From<Vec<QuerySolution>> for Multiset {
    fn from(solutions: Vec<QuerySolution>) -> Self {
        let variables = solutions
            .first()
            .map_or_else(|| Arc::from([]), |s| Arc::from(s.variables()));
        Self::Solutions {
            variables,
            solutions,
        }
    }
}

/// Evaluates graph patterns against an [`UpdatableDataset`].
///
/// The pattern is evaluated against the dataset [active graph](UpdatableDataset::active_graph).
pub trait PatternEvaluator: Send + Sync {
    /// Evaluates the pattern.
    ///
    /// `timeout` is the remaining execution time of the command set, if bounded.
    fn evaluate(
        &self,
        pattern: &GraphPattern,
        dataset: &dyn UpdatableDataset,
        timeout: Option<Duration>,
    ) -> Result<Multiset, UpdateEvaluationError>;
}

/// A rewriting applied to `WHERE` patterns before their evaluation.
pub trait AlgebraOptimiser: Send + Sync {
    fn optimise(&self, pattern: GraphPattern) -> GraphPattern;
}

impl<F: Fn(GraphPattern) -> GraphPattern + Send + Sync> AlgebraOptimiser for F {
    #[inline]
    fn optimise(&self, pattern: GraphPattern) -> GraphPattern {
        self(pattern)
    }
}

/// Evaluates patterns with the [`spareval`] SPARQL query evaluator.
///
/// The [active graph](UpdatableDataset::active_graph) is copied into an [`oxrdf::Dataset`]:
/// its default graph is the merge of the selected default graphs and its named graphs are
/// the selected named graphs.
/// The timeout is checked between two solutions.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryPatternEvaluator;

impl QueryPatternEvaluator {
    #[inline]
    pub fn new() -> Self {
        Self
    }
}

impl PatternEvaluator for QueryPatternEvaluator {
    fn evaluate(
        &self,
        pattern: &GraphPattern,
        dataset: &dyn UpdatableDataset,
        timeout: Option<Duration>,
    ) -> Result<Multiset, UpdateEvaluationError> {
        if matches!(pattern, GraphPattern::Bgp { patterns } if patterns.is_empty()) {
            return Ok(Multiset::Identity);
        }
        let deadline = timeout.map(|timeout| (Instant::now() + timeout, timeout));
        let QueryResults::Solutions(results) = QueryEvaluator::new().execute(
            active_dataset(dataset),
            &Query::Select {
                dataset: None,
                pattern: pattern.clone(),
                base_iri: None,
            },
        )?
        else {
            return Err(UpdateEvaluationError::Unexpected(
                "A SELECT query must return solutions".into(),
            ));
        };
        let variables = Arc::<[Variable]>::from(results.variables());
        let mut solutions = Vec::new();
        for solution in results {
            if let Some((deadline, timeout)) = deadline {
                if Instant::now() > deadline {
                    return Err(UpdateEvaluationError::Timeout(timeout));
                }
            }
            solutions.push(solution?);
        }
        Ok(Multiset::Solutions {
            variables,
            solutions,
        })
    }
}

fn active_dataset(dataset: &dyn UpdatableDataset) -> Dataset {
    let GraphSelection { default, named } = dataset.active_graph();
    let named = named.unwrap_or_else(|| dataset.graph_names());
    let mut active = Dataset::new();
    for graph in default.iter().filter_map(|name| dataset.graph(name)) {
        for triple in graph {
            active.insert(QuadRef::new(
                triple.subject,
                triple.predicate,
                triple.object,
                GraphNameRef::DefaultGraph,
            ));
        }
    }
    for name in named.iter().filter(|name| !name.is_default_graph()) {
        let Some(graph) = dataset.graph(name) else {
            continue;
        };
        for triple in graph {
            active.insert(QuadRef::new(
                triple.subject,
                triple.predicate,
                triple.object,
                name.as_ref(),
            ));
        }
    }
    active
}

#[cfg(test)]
#[expect(clippy::panic_in_result_fn)]
mod tests {
    use super::*;
    use crate::dataset::MemoryDataset;
    use oxrdf::{GraphName, Literal, NamedNode, Quad};
    use std::error::Error;

    fn ex(name: &str) -> NamedNode {
        NamedNode::new_unchecked(format!("http://example.com/{name}"))
    }

    fn where_pattern(query: &str) -> Result<GraphPattern, Box<dyn Error>> {
        let Query::Select { pattern, .. } = Query::parse(
            &format!("PREFIX ex: <http://example.com/> SELECT * {query}"),
            None,
        )?
        else {
            return Err("a SELECT query was expected".into());
        };
        Ok(pattern)
    }

    fn dataset() -> MemoryDataset {
        [
            Quad::new(ex("a"), ex("p"), ex("b"), GraphName::DefaultGraph),
            Quad::new(ex("b"), ex("p"), ex("c"), GraphName::DefaultGraph),
            Quad::new(ex("a"), ex("name"), Literal::from("a"), ex("g")),
        ]
        .into_iter()
        .collect()
    }

    fn evaluate(
        pattern: &str,
        dataset: &MemoryDataset,
    ) -> Result<Vec<QuerySolution>, Box<dyn Error>> {
        Ok(QueryPatternEvaluator
            .evaluate(&where_pattern(pattern)?, dataset, None)?
            .into_solutions())
    }

    #[test]
    fn empty_pattern_is_identity() -> Result<(), Box<dyn Error>> {
        let dataset = dataset();
        let result = QueryPatternEvaluator.evaluate(&where_pattern("{}")?, &dataset, None)?;
        assert!(result.is_identity());
        let solutions = result.into_solutions();
        assert_eq!(solutions.len(), 1);
        assert!(solutions[0].variables().is_empty());
        Ok(())
    }

    #[test]
    fn bgp_join() -> Result<(), Box<dyn Error>> {
        let solutions = evaluate("{ ?x ex:p ?y . ?y ex:p ?z }", &dataset())?;
        assert_eq!(solutions.len(), 1);
        assert_eq!(solutions[0].get("x"), Some(&ex("a").into()));
        assert_eq!(solutions[0].get("z"), Some(&ex("c").into()));
        Ok(())
    }

    #[test]
    fn graph_variable_ranges_over_named_graphs() -> Result<(), Box<dyn Error>> {
        let mut dataset = dataset();
        let pattern = where_pattern("{ GRAPH ?g { ?s ?p ?o } }")?;
        let solutions = QueryPatternEvaluator
            .evaluate(&pattern, &dataset, None)?
            .into_solutions();
        assert_eq!(solutions.len(), 1);
        assert_eq!(solutions[0].get("g"), Some(&ex("g").into()));

        dataset.set_active_graph(GraphSelection::new(
            vec![GraphName::DefaultGraph],
            Some(Vec::new()),
        ));
        let result = QueryPatternEvaluator.evaluate(&pattern, &dataset, None)?;
        assert!(result.is_empty());
        Ok(())
    }

    #[test]
    fn selected_default_graphs_are_merged() -> Result<(), Box<dyn Error>> {
        let mut dataset = dataset();
        dataset.set_active_graph(GraphSelection::new(
            vec![GraphName::DefaultGraph, ex("g").into()],
            Some(Vec::new()),
        ));
        let solutions = evaluate("{ ex:a ?p ?o }", &dataset)?;
        assert_eq!(solutions.len(), 2);
        Ok(())
    }

    #[test]
    fn filters_and_optionals() -> Result<(), Box<dyn Error>> {
        let dataset = dataset();
        let solutions = evaluate("{ ?s ex:p ?o OPTIONAL { ?o ex:p ?n } }", &dataset)?;
        assert_eq!(solutions.len(), 2);
        assert!(solutions.iter().any(|s| s.get("n").is_none()));

        let solutions = evaluate("{ ?s ?p ?o FILTER(?o = ex:b) }", &dataset)?;
        assert_eq!(solutions.len(), 1);
        assert_eq!(solutions[0].get("s"), Some(&ex("a").into()));

        let solutions = evaluate(
            "{ ?s ex:p ?o FILTER NOT EXISTS { ?o ex:p ?n } }",
            &dataset,
        )?;
        assert_eq!(solutions.len(), 1);
        assert_eq!(solutions[0].get("o"), Some(&ex("c").into()));
        Ok(())
    }

    #[test]
    fn paths_and_binds() -> Result<(), Box<dyn Error>> {
        let dataset = dataset();
        let solutions = evaluate("{ ex:a ex:p+ ?o }", &dataset)?;
        assert_eq!(solutions.len(), 2);

        let solutions = evaluate("{ ?s ex:p ?o BIND(STR(?o) AS ?iri) }", &dataset)?;
        assert!(solutions.iter().all(|s| s.get("iri").is_some()));
        Ok(())
    }
}
