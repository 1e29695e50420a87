use crate::algebra::AlgebraOptimiser;
use oxiri::Iri;
use oxrdf::{GraphName, NamedNode, Variable};
use spargebra::algebra::{GraphPattern, GraphTarget};
use spargebra::term::{
    GraphNamePattern, GroundQuad, GroundSubject, GroundTerm, GroundTermPattern,
    NamedNodePattern, Subject, Term, TermPattern, TriplePattern,
};
use spargebra::{GraphUpdateOperation, SparqlSyntaxError, Update};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// The kind of an [`UpdateCommand`].
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum UpdateCommandKind {
    Add,
    Clear,
    Copy,
    Create,
    Delete,
    DeleteData,
    Drop,
    Insert,
    InsertData,
    Load,
    Modify,
    Move,
}

impl UpdateCommandKind {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Add => "ADD",
            Self::Clear => "CLEAR",
            Self::Copy => "COPY",
            Self::Create => "CREATE",
            Self::Delete => "DELETE",
            Self::DeleteData => "DELETE DATA",
            Self::Drop => "DROP",
            Self::Insert => "INSERT",
            Self::InsertData => "INSERT DATA",
            Self::Load => "LOAD",
            Self::Modify => "MODIFY",
            Self::Move => "MOVE",
        }
    }
}

impl fmt::Display for UpdateCommandKind {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single [SPARQL 1.1 Update](https://www.w3.org/TR/sparql11-update/) command.
///
/// Commands carry data only: their meaning is given by the processor executing them.
/// The default graph is encoded as [`GraphName::DefaultGraph`].
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum UpdateCommand {
    /// [ADD](https://www.w3.org/TR/sparql11-update/#add): merges the source graph into the destination graph.
    Add {
        source: GraphName,
        destination: GraphName,
        silent: bool,
    },
    /// [CLEAR](https://www.w3.org/TR/sparql11-update/#clear): removes all the triples of the targeted graphs.
    Clear { graph: GraphTarget, silent: bool },
    /// [COPY](https://www.w3.org/TR/sparql11-update/#copy): replaces the destination graph content by the source graph content.
    Copy {
        source: GraphName,
        destination: GraphName,
        silent: bool,
    },
    /// [CREATE](https://www.w3.org/TR/sparql11-update/#create): creates a new empty graph.
    Create { graph: NamedNode, silent: bool },
    /// `DELETE WHERE`-like command: a delete template applied to each solution of a pattern.
    Delete {
        delete: ConstructTemplate,
        clause: WhereClause,
    },
    /// [DELETE DATA](https://www.w3.org/TR/sparql11-update/#deleteData).
    DeleteData { data: GraphPattern },
    /// [DROP](https://www.w3.org/TR/sparql11-update/#drop): removes the targeted graphs.
    Drop { graph: GraphTarget, silent: bool },
    /// `INSERT WHERE`-like command: an insert template applied to each solution of a pattern.
    Insert {
        insert: ConstructTemplate,
        clause: WhereClause,
    },
    /// [INSERT DATA](https://www.w3.org/TR/sparql11-update/#insertData).
    InsertData { data: GraphPattern },
    /// [LOAD](https://www.w3.org/TR/sparql11-update/#load): loads a remote RDF document into a graph.
    Load {
        source: NamedNode,
        destination: GraphName,
        silent: bool,
    },
    /// [DELETE/INSERT](https://www.w3.org/TR/sparql11-update/#deleteInsert) with both templates.
    Modify {
        delete: ConstructTemplate,
        insert: ConstructTemplate,
        clause: WhereClause,
    },
    /// [MOVE](https://www.w3.org/TR/sparql11-update/#move): like COPY but also drops the source graph.
    Move {
        source: GraphName,
        destination: GraphName,
        silent: bool,
    },
}

impl UpdateCommand {
    #[inline]
    pub fn kind(&self) -> UpdateCommandKind {
        match self {
            Self::Add { .. } => UpdateCommandKind::Add,
            Self::Clear { .. } => UpdateCommandKind::Clear,
            Self::Copy { .. } => UpdateCommandKind::Copy,
            Self::Create { .. } => UpdateCommandKind::Create,
            Self::Delete { .. } => UpdateCommandKind::Delete,
            Self::DeleteData { .. } => UpdateCommandKind::DeleteData,
            Self::Drop { .. } => UpdateCommandKind::Drop,
            Self::Insert { .. } => UpdateCommandKind::Insert,
            Self::InsertData { .. } => UpdateCommandKind::InsertData,
            Self::Load { .. } => UpdateCommandKind::Load,
            Self::Modify { .. } => UpdateCommandKind::Modify,
            Self::Move { .. } => UpdateCommandKind::Move,
        }
    }

    /// Returns the `SILENT` flag.
    ///
    /// Commands that have no `SILENT` keyword in the SPARQL grammar always return `false`.
    #[inline]
    pub fn is_silent(&self) -> bool {
        match self {
            Self::Add { silent, .. }
            | Self::Clear { silent, .. }
            | Self::Copy { silent, .. }
            | Self::Create { silent, .. }
            | Self::Drop { silent, .. }
            | Self::Load { silent, .. }
            | Self::Move { silent, .. } => *silent,
            Self::Delete { .. }
            | Self::DeleteData { .. }
            | Self::Insert { .. }
            | Self::InsertData { .. }
            | Self::Modify { .. } => false,
        }
    }

    /// Checks if executing the command may change the content of the given graph.
    ///
    /// Templates whose `GRAPH` clause is a variable may affect any graph.
    pub fn affects_graph(&self, graph: &GraphName) -> bool {
        match self {
            Self::Add { destination, .. }
            | Self::Copy { destination, .. }
            | Self::Load { destination, .. } => destination == graph,
            Self::Move {
                source,
                destination,
                ..
            } => source == graph || destination == graph,
            Self::Clear { graph: target, .. } | Self::Drop { graph: target, .. } => match target {
                GraphTarget::NamedNode(target) => {
                    matches!(graph, GraphName::NamedNode(g) if g == target)
                }
                GraphTarget::DefaultGraph => graph.is_default_graph(),
                GraphTarget::NamedGraphs => !graph.is_default_graph(),
                GraphTarget::AllGraphs => true,
            },
            Self::Create { graph: created, .. } => {
                matches!(graph, GraphName::NamedNode(g) if g == created)
            }
            Self::Delete { delete, clause } => delete.affects_graph(graph, clause.with.as_ref()),
            Self::Insert { insert, clause } => insert.affects_graph(graph, clause.with.as_ref()),
            Self::Modify {
                delete,
                insert,
                clause,
            } => {
                delete.affects_graph(graph, clause.with.as_ref())
                    || insert.affects_graph(graph, clause.with.as_ref())
            }
            Self::InsertData { data } | Self::DeleteData { data } => {
                data_affects_graph(data, graph, &GraphName::DefaultGraph)
            }
        }
    }

    /// Checks if executing the command may change the content of any of the given graphs.
    pub fn affects_graphs<'a>(&self, graphs: impl IntoIterator<Item = &'a GraphName>) -> bool {
        graphs.into_iter().any(|graph| self.affects_graph(graph))
    }
}

fn data_affects_graph(pattern: &GraphPattern, graph: &GraphName, current: &GraphName) -> bool {
    match pattern {
        GraphPattern::Bgp { patterns } => !patterns.is_empty() && current == graph,
        GraphPattern::Graph { name, inner } => match name {
            NamedNodePattern::NamedNode(name) => {
                data_affects_graph(inner, graph, &name.clone().into())
            }
            NamedNodePattern::Variable(_) => true,
        },
        GraphPattern::Join { left, right } => {
            data_affects_graph(left, graph, current) || data_affects_graph(right, graph, current)
        }
        _ => false,
    }
}

impl fmt::Display for UpdateCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add {
                source,
                destination,
                silent,
            } => fmt_transfer(f, "ADD", source, destination, *silent),
            Self::Copy {
                source,
                destination,
                silent,
            } => fmt_transfer(f, "COPY", source, destination, *silent),
            Self::Move {
                source,
                destination,
                silent,
            } => fmt_transfer(f, "MOVE", source, destination, *silent),
            Self::Clear { graph, silent } => {
                f.write_str("CLEAR ")?;
                if *silent {
                    f.write_str("SILENT ")?;
                }
                write!(f, "{graph}")
            }
            Self::Drop { graph, silent } => {
                f.write_str("DROP ")?;
                if *silent {
                    f.write_str("SILENT ")?;
                }
                write!(f, "{graph}")
            }
            Self::Create { graph, silent } => {
                f.write_str("CREATE ")?;
                if *silent {
                    f.write_str("SILENT ")?;
                }
                write!(f, "GRAPH {graph}")
            }
            Self::Load {
                source,
                destination,
                silent,
            } => {
                f.write_str("LOAD ")?;
                if *silent {
                    f.write_str("SILENT ")?;
                }
                write!(f, "{source}")?;
                if let GraphName::NamedNode(destination) = destination {
                    write!(f, " INTO GRAPH {destination}")?;
                }
                Ok(())
            }
            Self::InsertData { data } => write!(f, "INSERT DATA {{ {data} }}"),
            Self::DeleteData { data } => write!(f, "DELETE DATA {{ {data} }}"),
            Self::Delete { delete, clause } => {
                clause.fmt_with(f)?;
                writeln!(f, "DELETE {{ {delete} }}")?;
                clause.fmt_where(f)
            }
            Self::Insert { insert, clause } => {
                clause.fmt_with(f)?;
                writeln!(f, "INSERT {{ {insert} }}")?;
                clause.fmt_where(f)
            }
            Self::Modify {
                delete,
                insert,
                clause,
            } => {
                clause.fmt_with(f)?;
                writeln!(f, "DELETE {{ {delete} }}")?;
                writeln!(f, "INSERT {{ {insert} }}")?;
                clause.fmt_where(f)
            }
        }
    }
}

fn fmt_transfer(
    f: &mut fmt::Formatter<'_>,
    keyword: &str,
    source: &GraphName,
    destination: &GraphName,
    silent: bool,
) -> fmt::Result {
    f.write_str(keyword)?;
    if silent {
        f.write_str(" SILENT")?;
    }
    write!(f, " {source} TO {destination}")
}

/// The `WITH`, `USING`, `USING NAMED` and `WHERE` parts of a pattern based command.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct WhereClause {
    pub pattern: GraphPattern,
    /// The graph modified by the top level template triples and queried by default.
    pub with: Option<NamedNode>,
    pub using: Vec<NamedNode>,
    pub using_named: Vec<NamedNode>,
}

impl WhereClause {
    #[inline]
    pub fn new(pattern: GraphPattern) -> Self {
        Self {
            pattern,
            with: None,
            using: Vec::new(),
            using_named: Vec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn with_graph(mut self, graph: NamedNode) -> Self {
        self.with = Some(graph);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_using(mut self, graph: NamedNode) -> Self {
        self.using.push(graph);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_using_named(mut self, graph: NamedNode) -> Self {
        self.using_named.push(graph);
        self
    }

    /// The graph the top level template triples are applied to.
    #[inline]
    pub fn target_graph(&self) -> GraphName {
        self.with
            .clone()
            .map_or(GraphName::DefaultGraph, GraphName::NamedNode)
    }

    /// `true` if the clause defines its own dataset with `USING` or `USING NAMED`.
    #[inline]
    pub fn has_using(&self) -> bool {
        !self.using.is_empty() || !self.using_named.is_empty()
    }

    fn fmt_with(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(with) = &self.with {
            writeln!(f, "WITH {with}")?;
        }
        Ok(())
    }

    fn fmt_where(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for graph in &self.using {
            writeln!(f, "USING {graph}")?;
        }
        for graph in &self.using_named {
            writeln!(f, "USING NAMED {graph}")?;
        }
        write!(f, "WHERE {{ {} }}", self.pattern)
    }
}

/// The graph of a `GRAPH` clause inside a template.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum GraphSpecifier {
    NamedNode(NamedNode),
    Variable(Variable),
    /// A prefixed name that has not been resolved to an IRI.
    ///
    /// Templates using it can't be evaluated.
    PrefixedName(String),
}

impl fmt::Display for GraphSpecifier {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NamedNode(node) => node.fmt(f),
            Self::Variable(var) => var.fmt(f),
            Self::PrefixedName(name) => f.write_str(name),
        }
    }
}

impl From<NamedNode> for GraphSpecifier {
    #[inline]
    fn from(node: NamedNode) -> Self {
        Self::NamedNode(node)
    }
}

impl From<Variable> for GraphSpecifier {
    #[inline]
    fn from(var: Variable) -> Self {
        Self::Variable(var)
    }
}

/// A `GRAPH` clause of a template.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct GraphTemplate {
    pub graph: GraphSpecifier,
    pub triples: Vec<TriplePattern>,
}

/// A [`DELETE` or `INSERT` template](https://www.w3.org/TR/sparql11-update/#deleteInsert).
///
/// The top level triples target the `WITH` graph (or the default graph),
/// the `GRAPH` clauses target the graph they name.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Default)]
pub struct ConstructTemplate {
    pub triples: Vec<TriplePattern>,
    pub graphs: Vec<GraphTemplate>,
}

impl ConstructTemplate {
    #[inline]
    pub fn new(triples: Vec<TriplePattern>) -> Self {
        Self {
            triples,
            graphs: Vec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn with_graph(
        mut self,
        graph: impl Into<GraphSpecifier>,
        triples: Vec<TriplePattern>,
    ) -> Self {
        self.graphs.push(GraphTemplate {
            graph: graph.into(),
            triples,
        });
        self
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.triples.is_empty() && self.graphs.iter().all(|g| g.triples.is_empty())
    }

    fn affects_graph(&self, graph: &GraphName, with: Option<&NamedNode>) -> bool {
        if !self.triples.is_empty() {
            let target_matches = match with {
                Some(with) => matches!(graph, GraphName::NamedNode(g) if g == with),
                None => graph.is_default_graph(),
            };
            if target_matches {
                return true;
            }
        }
        self.graphs.iter().any(|template| match &template.graph {
            GraphSpecifier::NamedNode(node) => {
                matches!(graph, GraphName::NamedNode(g) if g == node)
            }
            GraphSpecifier::Variable(_) | GraphSpecifier::PrefixedName(_) => true,
        })
    }
}

impl fmt::Display for ConstructTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for triple in &self.triples {
            write!(f, "{triple} . ")?;
        }
        for graph in &self.graphs {
            write!(f, "GRAPH {} {{ ", graph.graph)?;
            for triple in &graph.triples {
                write!(f, "{triple} . ")?;
            }
            f.write_str("} ")?;
        }
        Ok(())
    }
}

/// An ordered list of [`UpdateCommand`]s executed as a unit.
///
/// ```
/// use sparupdate::UpdateCommandSet;
///
/// let commands = UpdateCommandSet::parse(
///     "INSERT DATA { <http://example.com/s> <http://example.com/p> <http://example.com/o> }",
///     None,
/// )?;
/// assert_eq!(commands.len(), 1);
/// assert!(commands.update_execution_time().is_none());
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
#[derive(Clone, Default)]
pub struct UpdateCommandSet {
    base_iri: Option<Iri<String>>,
    prefixes: Vec<(String, String)>,
    commands: Vec<UpdateCommand>,
    timeout: Option<Duration>,
    optimisers: Vec<Arc<dyn AlgebraOptimiser>>,
    update_execution_time: Option<Duration>,
}

impl UpdateCommandSet {
    #[inline]
    pub fn new(commands: impl IntoIterator<Item = UpdateCommand>) -> Self {
        Self {
            commands: commands.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Parses a SPARQL update with an optional base IRI to resolve relative IRIs in the update.
    ///
    /// `ADD`, `COPY` and `MOVE` operations are received in their expanded
    /// `DROP` + `INSERT` form.
    pub fn parse(update: &str, base_iri: Option<&str>) -> Result<Self, SparqlSyntaxError> {
        Ok(Update::parse(update, base_iri)?.into())
    }

    /// Sets the maximal execution time of the command set.
    ///
    /// A zero duration means no limit.
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_base_iri(mut self, base_iri: Iri<String>) -> Self {
        self.base_iri = Some(base_iri);
        self
    }

    /// Adds a `PREFIX` declaration to the textual form of the command set.
    #[inline]
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>, iri: impl Into<String>) -> Self {
        self.prefixes.push((prefix.into(), iri.into()));
        self
    }

    /// Adds an optimiser applied to the `WHERE` patterns before their evaluation.
    #[inline]
    #[must_use]
    pub fn with_optimiser(mut self, optimiser: impl AlgebraOptimiser + 'static) -> Self {
        self.optimisers.push(Arc::new(optimiser));
        self
    }

    #[inline]
    pub fn commands(&self) -> &[UpdateCommand] {
        &self.commands
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    #[inline]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    #[inline]
    pub fn base_iri(&self) -> Option<&Iri<String>> {
        self.base_iri.as_ref()
    }

    #[inline]
    pub fn optimisers(&self) -> &[Arc<dyn AlgebraOptimiser>] {
        &self.optimisers
    }

    /// Duration of the last execution of the command set, `None` if it has never been executed.
    #[inline]
    pub fn update_execution_time(&self) -> Option<Duration> {
        self.update_execution_time
    }

    #[inline]
    pub(crate) fn set_update_execution_time(&mut self, time: Option<Duration>) {
        self.update_execution_time = time;
    }
}

impl fmt::Debug for UpdateCommandSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateCommandSet")
            .field("base_iri", &self.base_iri)
            .field("prefixes", &self.prefixes)
            .field("commands", &self.commands)
            .field("timeout", &self.timeout)
            .field("optimisers", &self.optimisers.len())
            .field("update_execution_time", &self.update_execution_time)
            .finish()
    }
}

impl fmt::Display for UpdateCommandSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(base_iri) = &self.base_iri {
            writeln!(f, "BASE <{base_iri}>")?;
        }
        for (prefix, iri) in &self.prefixes {
            writeln!(f, "PREFIX {prefix}: <{iri}>")?;
        }
        for command in &self.commands {
            writeln!(f, "{command} ;")?;
        }
        Ok(())
    }
}

impl From<UpdateCommand> for UpdateCommandSet {
    #[inline]
    fn from(command: UpdateCommand) -> Self {
        Self::new([command])
    }
}

impl From<Update> for UpdateCommandSet {
    fn from(update: Update) -> Self {
        Self {
            base_iri: update.base_iri,
            commands: update
                .operations
                .into_iter()
                .map(UpdateCommand::from)
                .collect(),
            ..Self::default()
        }
    }
}

impl From<GraphUpdateOperation> for UpdateCommand {
    fn from(operation: GraphUpdateOperation) -> Self {
        match operation {
            GraphUpdateOperation::InsertData { data } => Self::InsertData {
                data: data_pattern(data.into_iter().map(|quad| {
                    (
                        quad_to_triple_pattern(quad.subject, quad.predicate, quad.object),
                        quad.graph_name,
                    )
                })),
            },
            GraphUpdateOperation::DeleteData { data } => Self::DeleteData {
                data: data_pattern(data.into_iter().map(ground_quad_to_triple_pattern)),
            },
            GraphUpdateOperation::DeleteInsert {
                delete,
                insert,
                using,
                pattern,
            } => {
                let mut clause = WhereClause::new(*pattern);
                if let Some(using) = using {
                    clause.using = using.default;
                    clause.using_named = using.named.unwrap_or_default();
                }
                let delete = template(delete.into_iter().map(|quad| {
                    (
                        TriplePattern {
                            subject: ground_term_pattern(quad.subject),
                            predicate: quad.predicate,
                            object: ground_term_pattern(quad.object),
                        },
                        quad.graph_name,
                    )
                }));
                let insert = template(insert.into_iter().map(|quad| {
                    (
                        TriplePattern {
                            subject: quad.subject,
                            predicate: quad.predicate,
                            object: quad.object,
                        },
                        quad.graph_name,
                    )
                }));
                match (delete.is_empty(), insert.is_empty()) {
                    (false, true) => Self::Delete { delete, clause },
                    (true, false) => Self::Insert { insert, clause },
                    _ => Self::Modify {
                        delete,
                        insert,
                        clause,
                    },
                }
            }
            GraphUpdateOperation::Load {
                silent,
                source,
                destination,
            } => Self::Load {
                source,
                destination: match destination {
                    spargebra::term::GraphName::NamedNode(node) => node.into(),
                    spargebra::term::GraphName::DefaultGraph => GraphName::DefaultGraph,
                },
                silent,
            },
            GraphUpdateOperation::Clear { silent, graph } => Self::Clear { graph, silent },
            GraphUpdateOperation::Create { silent, graph } => Self::Create { graph, silent },
            GraphUpdateOperation::Drop { silent, graph } => Self::Drop { graph, silent },
        }
    }
}

/// Groups concrete triples into a data block: a basic graph pattern for the default graph
/// followed by one `GRAPH` clause per named graph.
fn data_pattern(
    quads: impl IntoIterator<Item = (TriplePattern, spargebra::term::GraphName)>,
) -> GraphPattern {
    let mut default = Vec::new();
    let mut named: Vec<(NamedNode, Vec<TriplePattern>)> = Vec::new();
    for (triple, graph_name) in quads {
        match graph_name {
            spargebra::term::GraphName::DefaultGraph => default.push(triple),
            spargebra::term::GraphName::NamedNode(graph_name) => {
                if let Some((_, triples)) = named.iter_mut().find(|(g, _)| *g == graph_name) {
                    triples.push(triple);
                } else {
                    named.push((graph_name, vec![triple]));
                }
            }
        }
    }
    named.into_iter().fold(
        GraphPattern::Bgp { patterns: default },
        |left, (name, patterns)| GraphPattern::Join {
            left: Box::new(left),
            right: Box::new(GraphPattern::Graph {
                name: name.into(),
                inner: Box::new(GraphPattern::Bgp { patterns }),
            }),
        },
    )
}

fn template(quads: impl IntoIterator<Item = (TriplePattern, GraphNamePattern)>) -> ConstructTemplate {
    let mut template = ConstructTemplate::default();
    for (triple, graph_name) in quads {
        let graph = match graph_name {
            GraphNamePattern::DefaultGraph => {
                template.triples.push(triple);
                continue;
            }
            GraphNamePattern::NamedNode(node) => GraphSpecifier::NamedNode(node),
            GraphNamePattern::Variable(var) => GraphSpecifier::Variable(var),
        };
        if let Some(existing) = template.graphs.iter_mut().find(|g| g.graph == graph) {
            existing.triples.push(triple);
        } else {
            template.graphs.push(GraphTemplate {
                graph,
                triples: vec![triple],
            });
        }
    }
    template
}

fn quad_to_triple_pattern(
    subject: Subject,
    predicate: NamedNode,
    object: Term,
) -> TriplePattern {
    TriplePattern {
        subject: match subject {
            Subject::NamedNode(node) => node.into(),
            Subject::BlankNode(node) => node.into(),
            #[cfg(feature = "rdf-star")]
            Subject::Triple(triple) => TermPattern::Triple(Box::new(quad_to_triple_pattern(
                triple.subject,
                triple.predicate,
                triple.object,
            ))),
        },
        predicate: predicate.into(),
        object: term_pattern(object),
    }
}

fn term_pattern(term: Term) -> TermPattern {
    match term {
        Term::NamedNode(node) => node.into(),
        Term::BlankNode(node) => node.into(),
        Term::Literal(literal) => literal.into(),
        #[cfg(feature = "rdf-star")]
        Term::Triple(triple) => TermPattern::Triple(Box::new(quad_to_triple_pattern(
            triple.subject,
            triple.predicate,
            triple.object,
        ))),
    }
}

fn ground_quad_to_triple_pattern(
    quad: GroundQuad,
) -> (TriplePattern, spargebra::term::GraphName) {
    (
        TriplePattern {
            subject: ground_subject(quad.subject),
            predicate: quad.predicate.into(),
            object: ground_term(quad.object),
        },
        quad.graph_name,
    )
}

fn ground_subject(subject: GroundSubject) -> TermPattern {
    match subject {
        GroundSubject::NamedNode(node) => node.into(),
        #[cfg(feature = "rdf-star")]
        GroundSubject::Triple(triple) => TermPattern::Triple(Box::new(TriplePattern {
            subject: ground_subject(triple.subject),
            predicate: triple.predicate.into(),
            object: ground_term(triple.object),
        })),
    }
}

fn ground_term(term: GroundTerm) -> TermPattern {
    match term {
        GroundTerm::NamedNode(node) => node.into(),
        GroundTerm::Literal(literal) => literal.into(),
        #[cfg(feature = "rdf-star")]
        GroundTerm::Triple(triple) => TermPattern::Triple(Box::new(TriplePattern {
            subject: ground_subject(triple.subject),
            predicate: triple.predicate.into(),
            object: ground_term(triple.object),
        })),
    }
}

fn ground_term_pattern(term: GroundTermPattern) -> TermPattern {
    match term {
        GroundTermPattern::NamedNode(node) => node.into(),
        GroundTermPattern::Literal(literal) => literal.into(),
        GroundTermPattern::Variable(var) => var.into(),
        #[cfg(feature = "rdf-star")]
        GroundTermPattern::Triple(triple) => TermPattern::Triple(Box::new(TriplePattern {
            subject: ground_term_pattern(triple.subject),
            predicate: triple.predicate,
            object: ground_term_pattern(triple.object),
        })),
    }
}

#[cfg(test)]
#[expect(clippy::panic_in_result_fn)]
mod tests {
    use super::*;
    use std::error::Error;

    fn ex(name: &str) -> NamedNode {
        NamedNode::new_unchecked(format!("http://example.com/{name}"))
    }

    #[test]
    fn parse_delete_insert_kinds() -> Result<(), Box<dyn Error>> {
        let commands = UpdateCommandSet::parse(
            "PREFIX ex: <http://example.com/>
            DELETE { ?s ex:p ?o } WHERE { ?s ex:p ?o } ;
            INSERT { GRAPH ex:g { ?s ex:q ?o } } WHERE { ?s ex:p ?o } ;
            DELETE { ?s ex:p ?o } INSERT { ?s ex:q ?o } WHERE { ?s ex:p ?o }",
            None,
        )?;
        let kinds = commands
            .commands()
            .iter()
            .map(UpdateCommand::kind)
            .collect::<Vec<_>>();
        assert_eq!(
            kinds,
            [
                UpdateCommandKind::Delete,
                UpdateCommandKind::Insert,
                UpdateCommandKind::Modify
            ]
        );
        let UpdateCommand::Insert { insert, .. } = &commands.commands()[1] else {
            panic!("an insert was expected");
        };
        assert!(insert.triples.is_empty());
        assert_eq!(insert.graphs.len(), 1);
        assert_eq!(insert.graphs[0].graph, GraphSpecifier::NamedNode(ex("g")));
        Ok(())
    }

    #[test]
    fn parse_data_groups_graphs() -> Result<(), Box<dyn Error>> {
        let commands = UpdateCommandSet::parse(
            "INSERT DATA {
                <http://example.com/a> <http://example.com/p> <http://example.com/b> .
                GRAPH <http://example.com/g> {
                    <http://example.com/c> <http://example.com/p> <http://example.com/d>
                }
            }",
            None,
        )?;
        let command = &commands.commands()[0];
        assert!(command.affects_graph(&GraphName::DefaultGraph));
        assert!(command.affects_graph(&ex("g").into()));
        assert!(!command.affects_graph(&ex("h").into()));
        Ok(())
    }

    #[test]
    fn display_transfer_commands() {
        let command = UpdateCommand::Copy {
            source: GraphName::DefaultGraph,
            destination: ex("g").into(),
            silent: true,
        };
        assert_eq!(
            command.to_string(),
            "COPY SILENT DEFAULT TO <http://example.com/g>"
        );
        assert!(command.is_silent());
        assert!(command.affects_graph(&ex("g").into()));
        assert!(!command.affects_graph(&GraphName::DefaultGraph));
    }

    #[test]
    fn display_command_set_reparses() -> Result<(), Box<dyn Error>> {
        let commands = UpdateCommandSet::parse(
            "CREATE SILENT GRAPH <http://example.com/g> ;
            LOAD <http://example.com/data.ttl> INTO GRAPH <http://example.com/g> ;
            DELETE { GRAPH ?g { ?s ?p ?o } } USING NAMED <http://example.com/g> WHERE { GRAPH ?g { ?s ?p ?o } } ;
            CLEAR ALL",
            Some("http://example.com/"),
        )?;
        let text = commands.to_string();
        assert!(text.starts_with("BASE <http://example.com/>"));
        let reparsed = UpdateCommandSet::parse(&text, None)?;
        assert_eq!(reparsed.commands(), commands.commands());
        Ok(())
    }

    #[test]
    fn with_clause_display() {
        let clause = WhereClause::new(GraphPattern::Bgp {
            patterns: Vec::new(),
        })
        .with_graph(ex("g"))
        .with_using(ex("u"));
        let command = UpdateCommand::Delete {
            delete: ConstructTemplate::default(),
            clause,
        };
        let text = command.to_string();
        assert!(text.starts_with("WITH <http://example.com/g>\nDELETE"));
        assert!(text.contains("USING <http://example.com/u>\nWHERE"));
    }

    #[test]
    fn zero_timeout_is_unbounded() {
        let commands = UpdateCommandSet::default().with_timeout(Duration::ZERO);
        assert_eq!(commands.timeout(), None);
        let commands = commands.with_timeout(Duration::from_secs(1));
        assert_eq!(commands.timeout(), Some(Duration::from_secs(1)));
    }
}
