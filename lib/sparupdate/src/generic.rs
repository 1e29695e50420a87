use crate::capabilities::IoFacet;
use crate::command::{ConstructTemplate, UpdateCommand, UpdateCommandSet, WhereClause};
use crate::context::UpdateEvaluationContext;
use crate::error::UpdateEvaluationError;
use crate::options::UpdateOptions;
use crate::processor::{UpdateProcessor, suppress_if_silent};
use crate::storage::{StorageBackend, StorageProvider, UpdateableStorage};
use crate::template::{GraphTriples, construct_triples, validate_data_pattern};
use oxrdf::{Graph, GraphName, NamedNode, Triple, TripleRef};
use spargebra::Query;
use spargebra::algebra::{GraphPattern, GraphTarget, QueryDataset};
use std::time::Instant;
use tracing::{debug, trace};

/// How triples are added to or removed from a graph.
#[derive(Debug, Clone, Copy)]
enum WriteStrategy {
    /// [`StorageProvider::update_graph`] with the changed triples only.
    Delta,
    /// The whole graph is loaded, modified and saved.
    Overwrite,
}

/// How a graph is emptied.
#[derive(Debug, Clone, Copy)]
enum ClearStrategy {
    Delete,
    /// An empty graph is saved in place of the existing one.
    Overwrite,
    /// All the triples are removed with [`StorageProvider::update_graph`].
    Delta,
}

/// Executes updates against a [`StorageProvider`] using only the primitives it supports.
///
/// If the store executes updates natively ([`StorageBackend::NativeUpdate`]) the commands are
/// forwarded to it. Otherwise each command is translated into graph loads, saves, deletions and
/// triple level updates, depending on the store [capabilities](StorageProvider::capabilities).
/// A graph management command that can't be translated fails with
/// [`UpdateEvaluationError::NoApproximation`] before any change is made, an error `SILENT` swallows.
/// `DELETE`/`INSERT` commands over a store that can't evaluate queries fail with
/// [`UpdateEvaluationError::Unsupported`].
///
/// There are no transactions: [`flush`](UpdateProcessor::flush) and
/// [`discard`](UpdateProcessor::discard) do nothing.
pub struct StorageUpdateProcessor {
    backend: StorageBackend,
    options: UpdateOptions,
}

impl StorageUpdateProcessor {
    /// Fails with [`UpdateEvaluationError::ReadOnlyStorage`] if the store is read-only.
    pub fn new(backend: StorageBackend) -> Result<Self, UpdateEvaluationError> {
        if backend.provider().is_read_only() {
            return Err(UpdateEvaluationError::ReadOnlyStorage);
        }
        Ok(Self {
            backend,
            options: UpdateOptions::default(),
        })
    }

    #[inline]
    #[must_use]
    pub fn with_options(mut self, options: UpdateOptions) -> Self {
        self.options = options;
        self
    }

    #[inline]
    pub fn backend(&self) -> &StorageBackend {
        &self.backend
    }

    fn storage(&self) -> &dyn StorageProvider {
        self.backend.provider()
    }

    fn forward(
        &self,
        storage: &dyn UpdateableStorage,
        update: &str,
    ) -> Result<(), UpdateEvaluationError> {
        debug!(update, "forwarding the update to the storage");
        storage.update(update)?;
        Ok(())
    }

    fn execute(
        &self,
        command: &UpdateCommand,
        context: &UpdateEvaluationContext<'_>,
    ) -> Result<(), UpdateEvaluationError> {
        debug!(command = %command.kind(), silent = command.is_silent(), "executing update command");
        let result = match command {
            UpdateCommand::Add {
                source,
                destination,
                ..
            } => self.eval_add(source, destination),
            UpdateCommand::Copy {
                source,
                destination,
                ..
            } => self.eval_copy(source, destination, false),
            UpdateCommand::Move {
                source,
                destination,
                ..
            } => self.eval_copy(source, destination, true),
            UpdateCommand::Clear { graph, .. } => self.eval_clear(graph, false),
            UpdateCommand::Drop { graph, .. } => self.eval_clear(graph, true),
            UpdateCommand::Create { graph, .. } => self.eval_create(graph),
            UpdateCommand::Load {
                source,
                destination,
                ..
            } => self.eval_load(source, destination),
            UpdateCommand::InsertData { data } => self.eval_insert_data(data),
            UpdateCommand::DeleteData { data } => self.eval_delete_data(data),
            UpdateCommand::Delete { delete, clause } => {
                self.eval_modify(Some(delete), None, clause, context)
            }
            UpdateCommand::Insert { insert, clause } => {
                self.eval_modify(None, Some(insert), clause, context)
            }
            UpdateCommand::Modify {
                delete,
                insert,
                clause,
            } => self.eval_modify(Some(delete), Some(insert), clause, context),
        };
        suppress_if_silent(command, result)
    }

    fn eval_add(
        &self,
        source: &GraphName,
        destination: &GraphName,
    ) -> Result<(), UpdateEvaluationError> {
        if source == destination {
            return Ok(());
        }
        self.check_graph_kind(source)?;
        let strategy = self.write_strategy(destination, IoFacet::CanUpdateAddTriples)?;
        let source = self.load(source)?;
        self.add_triples(destination, &triples(&source), strategy)
    }

    fn eval_copy(
        &self,
        source: &GraphName,
        destination: &GraphName,
        move_source: bool,
    ) -> Result<(), UpdateEvaluationError> {
        if source == destination {
            return Ok(());
        }
        self.check_graph_kind(source)?;
        self.check_graph_kind(destination)?;
        let capabilities = self.storage().capabilities();
        let strategy = if capabilities.can_overwrite_graph(destination.is_default_graph()) {
            WriteStrategy::Overwrite
        } else if self.storage().update_supported()
            && capabilities.contains(IoFacet::CanUpdateAddTriples)
            && capabilities.contains(IoFacet::CanUpdateDeleteTriples)
        {
            WriteStrategy::Delta
        } else {
            return Err(no_approximation(if move_source { "MOVE" } else { "COPY" }));
        };
        trace!(graph = %destination, ?strategy, "graph replacement strategy");
        let source_strategy = if move_source {
            Some(self.clear_strategy(source, true, "MOVE")?)
        } else {
            None
        };

        let source_graph = self.load(source)?;
        match strategy {
            WriteStrategy::Overwrite => self.storage().save_graph(destination, &source_graph)?,
            WriteStrategy::Delta => {
                let existing = self.load(destination)?;
                let additions = source_graph
                    .iter()
                    .filter(|t| !existing.contains(*t))
                    .map(TripleRef::into_owned)
                    .collect::<Vec<_>>();
                let removals = existing
                    .iter()
                    .filter(|t| !source_graph.contains(*t))
                    .map(TripleRef::into_owned)
                    .collect::<Vec<_>>();
                self.storage()
                    .update_graph(destination, &additions, &removals)?;
            }
        }
        if let Some(strategy) = source_strategy {
            self.clear(source, strategy)?;
        }
        Ok(())
    }

    fn eval_clear(
        &self,
        target: &GraphTarget,
        drop_graphs: bool,
    ) -> Result<(), UpdateEvaluationError> {
        let keyword = if drop_graphs { "DROP" } else { "CLEAR" };
        let graphs = match target {
            GraphTarget::NamedNode(graph) => vec![graph.clone().into()],
            GraphTarget::DefaultGraph => vec![GraphName::DefaultGraph],
            GraphTarget::NamedGraphs | GraphTarget::AllGraphs => self.all_graphs(
                matches!(target, GraphTarget::AllGraphs),
                keyword,
            )?,
        };
        // All strategies are chosen before the first change
        let strategies = graphs
            .iter()
            .map(|graph| self.clear_strategy(graph, drop_graphs, keyword))
            .collect::<Result<Vec<_>, _>>()?;
        for (graph, strategy) in graphs.iter().zip(strategies) {
            self.clear(graph, strategy)?;
        }
        Ok(())
    }

    fn all_graphs(
        &self,
        with_default_graph: bool,
        keyword: &str,
    ) -> Result<Vec<GraphName>, UpdateEvaluationError> {
        let capabilities = self.storage().capabilities();
        if !capabilities.contains(IoFacet::HasNamedGraphs) {
            return Err(UpdateEvaluationError::no_approximation(format!(
                "Unable to {keyword} named graphs as the storage does not support named graphs"
            )));
        }
        if !self.storage().list_graphs_supported() {
            return Err(UpdateEvaluationError::no_approximation(format!(
                "Unable to {keyword} named graphs as the storage can't list its graphs"
            )));
        }
        let mut graphs = self.storage().list_graph_names()?;
        let with_default_graph =
            with_default_graph && capabilities.contains(IoFacet::HasDefaultGraph);
        graphs.retain(|graph| with_default_graph || !graph.is_default_graph());
        if with_default_graph && !graphs.contains(&GraphName::DefaultGraph) {
            graphs.push(GraphName::DefaultGraph);
        }
        Ok(graphs)
    }

    fn eval_create(&self, graph: &NamedNode) -> Result<(), UpdateEvaluationError> {
        let graph = GraphName::from(graph.clone());
        if !self
            .storage()
            .capabilities()
            .contains(IoFacet::ExplicitEmptyGraphs)
        {
            // Graphs only exist when they are not empty
            trace!(%graph, "CREATE ignored by a storage without empty graphs");
            return Ok(());
        }
        self.check_graph_kind(&graph)?;
        if self.storage().list_graphs_supported()
            && self.storage().list_graph_names()?.contains(&graph)
        {
            return Err(UpdateEvaluationError::GraphAlreadyExists(graph));
        }
        self.storage().save_graph(&graph, &Graph::new())?;
        Ok(())
    }

    fn eval_load(
        &self,
        source: &NamedNode,
        destination: &GraphName,
    ) -> Result<(), UpdateEvaluationError> {
        let strategy = self.write_strategy(destination, IoFacet::CanUpdateAddTriples)?;
        let graph = self.options.loader()?.load(source)?;
        self.add_triples(destination, &triples(&graph), strategy)
    }

    fn eval_insert_data(&self, data: &GraphPattern) -> Result<(), UpdateEvaluationError> {
        let data = validate_data_pattern(data, true)?;
        let strategies = self.write_strategies(&data, IoFacet::CanUpdateAddTriples)?;
        for ((graph, triples), strategy) in data.into_iter().zip(strategies) {
            self.add_triples(&graph, &triples, strategy)?;
        }
        Ok(())
    }

    fn eval_delete_data(&self, data: &GraphPattern) -> Result<(), UpdateEvaluationError> {
        let data = validate_data_pattern(data, false)?;
        let strategies = self.write_strategies(&data, IoFacet::CanUpdateDeleteTriples)?;
        for ((graph, triples), strategy) in data.into_iter().zip(strategies) {
            self.remove_triples(&graph, &triples, strategy)?;
        }
        Ok(())
    }

    fn eval_modify(
        &self,
        delete: Option<&ConstructTemplate>,
        insert: Option<&ConstructTemplate>,
        clause: &WhereClause,
        context: &UpdateEvaluationContext<'_>,
    ) -> Result<(), UpdateEvaluationError> {
        let Some(storage) = self.backend.queryable_storage() else {
            return Err(UpdateEvaluationError::unsupported(
                "DELETE and INSERT commands require a storage able to evaluate queries",
            ));
        };
        let target = clause.target_graph();
        if let Some(delete) = delete {
            self.check_template(delete, &target, IoFacet::CanUpdateDeleteTriples)?;
        }
        if let Some(insert) = insert {
            self.check_template(insert, &target, IoFacet::CanUpdateAddTriples)?;
        }

        let query = where_query(clause, context);
        let solutions = storage.query(&query)?.into_solutions();
        let mut deleted = GraphTriples::new();
        let mut inserted = GraphTriples::new();
        for solution in &solutions {
            if let Some(delete) = delete {
                construct_triples(delete, solution, &target, &mut deleted)?;
            }
            if let Some(insert) = insert {
                construct_triples(insert, solution, &target, &mut inserted)?;
            }
        }
        for (graph, triples) in deleted {
            let strategy = self.write_strategy(&graph, IoFacet::CanUpdateDeleteTriples)?;
            self.remove_triples(&graph, &triples, strategy)?;
        }
        for (graph, triples) in inserted {
            let strategy = self.write_strategy(&graph, IoFacet::CanUpdateAddTriples)?;
            self.add_triples(&graph, &triples, strategy)?;
        }
        Ok(())
    }

    /// Checks that the triples a template produces could be written.
    fn check_template(
        &self,
        template: &ConstructTemplate,
        target: &GraphName,
        facet: IoFacet,
    ) -> Result<(), UpdateEvaluationError> {
        if !template.triples.is_empty() {
            self.write_strategy(target, facet)?;
        }
        if !template.graphs.is_empty() {
            if !self
                .storage()
                .capabilities()
                .contains(IoFacet::HasNamedGraphs)
            {
                return Err(UpdateEvaluationError::unsupported(
                    "The storage does not support the named graphs required by the template",
                ));
            }
            self.kind_write_strategy(false, facet)?;
        }
        Ok(())
    }

    fn check_graph_kind(&self, graph: &GraphName) -> Result<(), UpdateEvaluationError> {
        if self
            .storage()
            .capabilities()
            .has_graph_kind(graph.is_default_graph())
        {
            Ok(())
        } else {
            Err(UpdateEvaluationError::GraphNotAddressable(graph.clone()))
        }
    }

    fn write_strategies(
        &self,
        data: &GraphTriples,
        facet: IoFacet,
    ) -> Result<Vec<WriteStrategy>, UpdateEvaluationError> {
        data.graph_names()
            .map(|graph| self.write_strategy(graph, facet))
            .collect()
    }

    fn write_strategy(
        &self,
        graph: &GraphName,
        facet: IoFacet,
    ) -> Result<WriteStrategy, UpdateEvaluationError> {
        self.check_graph_kind(graph)?;
        let strategy = self.kind_write_strategy(graph.is_default_graph(), facet)?;
        trace!(%graph, ?facet, ?strategy, "write strategy");
        Ok(strategy)
    }

    fn kind_write_strategy(
        &self,
        default_graph: bool,
        facet: IoFacet,
    ) -> Result<WriteStrategy, UpdateEvaluationError> {
        let capabilities = self.storage().capabilities();
        if self.storage().update_supported() && capabilities.contains(facet) {
            Ok(WriteStrategy::Delta)
        } else if capabilities.can_overwrite_graph(default_graph) {
            Ok(WriteStrategy::Overwrite)
        } else {
            Err(no_approximation(match facet {
                IoFacet::CanUpdateDeleteTriples => "triple deletions",
                _ => "triple insertions",
            }))
        }
    }

    fn clear_strategy(
        &self,
        graph: &GraphName,
        allow_deletion: bool,
        keyword: &str,
    ) -> Result<ClearStrategy, UpdateEvaluationError> {
        self.check_graph_kind(graph)?;
        let storage = self.storage();
        let capabilities = storage.capabilities();
        let strategy = if allow_deletion && storage.delete_supported() {
            ClearStrategy::Delete
        } else if capabilities.can_overwrite_graph(graph.is_default_graph()) {
            ClearStrategy::Overwrite
        } else if storage.update_supported() && capabilities.contains(IoFacet::CanUpdateDeleteTriples)
        {
            ClearStrategy::Delta
        } else {
            return Err(no_approximation(keyword));
        };
        trace!(%graph, ?strategy, "clear strategy");
        Ok(strategy)
    }

    fn load(&self, graph: &GraphName) -> Result<Graph, UpdateEvaluationError> {
        let mut content = Graph::new();
        self.storage().load_graph(&mut content, graph)?;
        Ok(content)
    }

    fn clear(&self, graph: &GraphName, strategy: ClearStrategy) -> Result<(), UpdateEvaluationError> {
        match strategy {
            ClearStrategy::Delete => self.storage().delete_graph(graph)?,
            ClearStrategy::Overwrite => self.storage().save_graph(graph, &Graph::new())?,
            ClearStrategy::Delta => {
                let existing = self.load(graph)?;
                if !existing.is_empty() {
                    self.storage().update_graph(graph, &[], &triples(&existing))?;
                }
            }
        }
        Ok(())
    }

    fn add_triples(
        &self,
        graph: &GraphName,
        triples: &[Triple],
        strategy: WriteStrategy,
    ) -> Result<(), UpdateEvaluationError> {
        if triples.is_empty() {
            return Ok(());
        }
        match strategy {
            WriteStrategy::Delta => self.storage().update_graph(graph, triples, &[])?,
            WriteStrategy::Overwrite => {
                let mut content = self.load(graph)?;
                for triple in triples {
                    content.insert(triple);
                }
                self.storage().save_graph(graph, &content)?;
            }
        }
        Ok(())
    }

    fn remove_triples(
        &self,
        graph: &GraphName,
        triples: &[Triple],
        strategy: WriteStrategy,
    ) -> Result<(), UpdateEvaluationError> {
        if triples.is_empty() {
            return Ok(());
        }
        match strategy {
            WriteStrategy::Delta => self.storage().update_graph(graph, &[], triples)?,
            WriteStrategy::Overwrite => {
                let mut content = self.load(graph)?;
                if content.is_empty() {
                    return Ok(());
                }
                for triple in triples {
                    content.remove(triple);
                }
                self.storage().save_graph(graph, &content)?;
            }
        }
        Ok(())
    }

    fn run(&self, commands: &UpdateCommandSet) -> Result<(), UpdateEvaluationError> {
        if let StorageBackend::NativeUpdate(storage) = &self.backend {
            return self.forward(storage.as_ref(), &commands.to_string());
        }
        let context = UpdateEvaluationContext::new(
            commands.timeout(),
            self.options.timeout(),
            commands.optimisers(),
        );
        debug!(
            commands = commands.len(),
            timeout = ?context.timeout(),
            "executing update command set"
        );
        for command in commands.commands() {
            self.execute(command, &context)?;
            context.check_timeout()?;
        }
        Ok(())
    }
}

impl UpdateProcessor for StorageUpdateProcessor {
    fn process_command(&self, command: &UpdateCommand) -> Result<(), UpdateEvaluationError> {
        if let StorageBackend::NativeUpdate(storage) = &self.backend {
            return self.forward(storage.as_ref(), &command.to_string());
        }
        let context = UpdateEvaluationContext::new(None, self.options.timeout(), &[]);
        self.execute(command, &context)
    }

    fn process_command_set(
        &self,
        commands: &mut UpdateCommandSet,
    ) -> Result<(), UpdateEvaluationError> {
        let start = Instant::now();
        commands.set_update_execution_time(None);
        let result = self.run(commands);
        let elapsed = start.elapsed();
        commands.set_update_execution_time(Some(elapsed));
        debug!(?elapsed, success = result.is_ok(), "update command set executed");
        result
    }

    fn flush(&self) -> Result<(), UpdateEvaluationError> {
        Ok(())
    }

    fn discard(&self) -> Result<(), UpdateEvaluationError> {
        Ok(())
    }
}

/// The `SELECT` query giving the solutions of a `WHERE` clause.
///
/// `USING` and `USING NAMED` take precedence over `WITH`.
fn where_query(clause: &WhereClause, context: &UpdateEvaluationContext<'_>) -> Query {
    let dataset = if clause.has_using() {
        Some(QueryDataset {
            default: clause.using.clone(),
            named: Some(clause.using_named.clone()),
        })
    } else {
        clause.with.as_ref().map(|with| QueryDataset {
            default: vec![with.clone()],
            named: None,
        })
    };
    Query::Select {
        dataset,
        pattern: context.optimise(&clause.pattern),
        base_iri: None,
    }
}

fn triples(graph: &Graph) -> Vec<Triple> {
    graph.iter().map(TripleRef::into_owned).collect()
}

fn no_approximation(operation: &str) -> UpdateEvaluationError {
    UpdateEvaluationError::no_approximation(format!(
        "Unable to evaluate {operation} as the storage does not provide the input/output behaviour required to approximate it"
    ))
}
