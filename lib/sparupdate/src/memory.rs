use crate::algebra::{PatternEvaluator, QueryPatternEvaluator};
use crate::command::{ConstructTemplate, UpdateCommand, UpdateCommandSet, WhereClause};
use crate::context::UpdateEvaluationContext;
use crate::dataset::{GraphSelection, UpdatableDataset};
use crate::error::{StorageError, UpdateEvaluationError, poison_corruption_error};
use crate::options::UpdateOptions;
use crate::processor::{UpdateProcessor, suppress_if_silent};
use crate::template::{GraphTriples, construct_triples, validate_data_pattern};
use oxrdf::{Graph, GraphName, NamedNode, Triple};
use spargebra::algebra::{GraphPattern, GraphTarget};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockWriteGuard};
use std::time::Instant;
use tracing::{debug, error, warn};

/// Executes updates against an [`UpdatableDataset`].
///
/// Writers are serialized by a lock: it is held for the whole command set in auto-commit mode
/// and command by command otherwise.
///
/// ```
/// use sparupdate::{
///     DatasetUpdateProcessor, MemoryDataset, UpdatableDataset, UpdateCommandSet, UpdateProcessor,
/// };
/// use sparupdate::model::GraphName;
///
/// let processor = DatasetUpdateProcessor::new(MemoryDataset::new())?;
/// let mut commands = UpdateCommandSet::parse(
///     "INSERT DATA { <http://example.com/s> <http://example.com/p> <http://example.com/o> }",
///     None,
/// )?;
/// processor.process_command_set(&mut commands)?;
/// assert!(commands.update_execution_time().is_some());
///
/// let dataset = processor.dataset().read().map_err(|e| e.to_string())?;
/// assert_eq!(dataset.graph(&GraphName::DefaultGraph).map(|g| g.len()), Some(1));
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
pub struct DatasetUpdateProcessor<D: UpdatableDataset> {
    dataset: Arc<RwLock<D>>,
    can_commit: AtomicBool,
    evaluator: Arc<dyn PatternEvaluator>,
    options: UpdateOptions,
}

impl<D: UpdatableDataset> DatasetUpdateProcessor<D> {
    /// Builds a processor owning the dataset.
    ///
    /// The default graph is created (and flushed) if the dataset does not have one.
    pub fn new(dataset: D) -> Result<Self, UpdateEvaluationError> {
        Self::with_shared(Arc::new(RwLock::new(dataset)))
    }

    /// Builds a processor over a dataset whose lock is shared with other users.
    pub fn with_shared(dataset: Arc<RwLock<D>>) -> Result<Self, UpdateEvaluationError> {
        {
            let mut dataset = dataset.write().map_err(poison_corruption_error)?;
            if !dataset.has_graph(&GraphName::DefaultGraph) {
                dataset.add_graph(GraphName::DefaultGraph, Graph::new());
                dataset.flush()?;
            }
        }
        Ok(Self {
            dataset,
            can_commit: AtomicBool::new(true),
            evaluator: Arc::new(QueryPatternEvaluator),
            options: UpdateOptions::default(),
        })
    }

    /// Sets the evaluator of the `WHERE` clauses.
    ///
    /// By default a [`QueryPatternEvaluator`] is used.
    #[inline]
    #[must_use]
    pub fn with_evaluator(mut self, evaluator: impl PatternEvaluator + 'static) -> Self {
        self.evaluator = Arc::new(evaluator);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_options(mut self, options: UpdateOptions) -> Self {
        self.options = options;
        self
    }

    #[inline]
    pub fn dataset(&self) -> &Arc<RwLock<D>> {
        &self.dataset
    }

    #[inline]
    pub fn options(&self) -> &UpdateOptions {
        &self.options
    }

    /// `false` if a command failed since the last [`discard`](UpdateProcessor::discard) while auto-commit was disabled.
    #[inline]
    pub fn can_commit(&self) -> bool {
        self.can_commit.load(Ordering::Acquire)
    }

    fn lock(&self) -> Result<RwLockWriteGuard<'_, D>, StorageError> {
        self.dataset.write().map_err(poison_corruption_error)
    }

    fn commit(&self, dataset: &mut D) -> Result<(), UpdateEvaluationError> {
        if !self.can_commit() {
            return Err(UpdateEvaluationError::UncommittableTransaction);
        }
        dataset.flush()?;
        Ok(())
    }

    /// The timer of `context` starts once the first lock is held.
    fn run(
        &self,
        commands: &[UpdateCommand],
        context: &mut UpdateEvaluationContext<'_>,
    ) -> Result<(), UpdateEvaluationError> {
        if self.options.auto_commit() {
            let mut dataset = self.lock()?;
            context.restart();
            let result = self.run_transaction(&mut dataset, commands, context);
            if let Err(error) = &result {
                warn!(%error, "update failed, discarding its changes");
                if let Err(error) = dataset.discard() {
                    error!(%error, "unable to discard the changes of a failed update");
                }
            }
            result
        } else {
            for (i, command) in commands.iter().enumerate() {
                let result = {
                    let mut dataset = self.lock()?;
                    if i == 0 {
                        context.restart();
                    }
                    self.execute(&mut dataset, command, context)
                }
                .and_then(|()| context.check_timeout());
                if let Err(error) = result {
                    self.can_commit.store(false, Ordering::Release);
                    warn!(%error, "update failed, the current transaction can't be committed anymore");
                    return Err(error);
                }
            }
            Ok(())
        }
    }

    fn run_transaction(
        &self,
        dataset: &mut D,
        commands: &[UpdateCommand],
        context: &UpdateEvaluationContext<'_>,
    ) -> Result<(), UpdateEvaluationError> {
        self.commit(dataset)?;
        for command in commands {
            self.execute(dataset, command, context)?;
            context.check_timeout()?;
        }
        self.commit(dataset)
    }

    fn execute(
        &self,
        dataset: &mut D,
        command: &UpdateCommand,
        context: &UpdateEvaluationContext<'_>,
    ) -> Result<(), UpdateEvaluationError> {
        debug!(command = %command.kind(), silent = command.is_silent(), "executing update command");
        let result = match command {
            UpdateCommand::Add {
                source,
                destination,
                ..
            } => eval_add(dataset, source, destination),
            UpdateCommand::Copy {
                source,
                destination,
                ..
            } => eval_copy(dataset, source, destination, false),
            UpdateCommand::Move {
                source,
                destination,
                ..
            } => eval_copy(dataset, source, destination, true),
            UpdateCommand::Clear { graph, .. } => eval_clear(dataset, graph, false),
            UpdateCommand::Drop { graph, .. } => eval_clear(dataset, graph, true),
            UpdateCommand::Create { graph, .. } => eval_create(dataset, graph),
            UpdateCommand::Load {
                source,
                destination,
                ..
            } => self.eval_load(dataset, source, destination),
            UpdateCommand::InsertData { data } => eval_insert_data(dataset, data),
            UpdateCommand::DeleteData { data } => eval_delete_data(dataset, data),
            UpdateCommand::Delete { delete, clause } => {
                self.eval_modify(dataset, Some(delete), None, clause, context)
            }
            UpdateCommand::Insert { insert, clause } => {
                self.eval_modify(dataset, None, Some(insert), clause, context)
            }
            UpdateCommand::Modify {
                delete,
                insert,
                clause,
            } => self.eval_modify(dataset, Some(delete), Some(insert), clause, context),
        };
        suppress_if_silent(command, result)
    }

    fn eval_load(
        &self,
        dataset: &mut D,
        source: &NamedNode,
        destination: &GraphName,
    ) -> Result<(), UpdateEvaluationError> {
        let graph = self.options.loader()?.load(source)?;
        dataset.add_graph(destination.clone(), graph);
        Ok(())
    }

    fn eval_modify(
        &self,
        dataset: &mut D,
        delete: Option<&ConstructTemplate>,
        insert: Option<&ConstructTemplate>,
        clause: &WhereClause,
        context: &UpdateEvaluationContext<'_>,
    ) -> Result<(), UpdateEvaluationError> {
        let target = clause.target_graph();
        let selection = if clause.has_using() {
            GraphSelection::using(&clause.using, &clause.using_named)
        } else {
            GraphSelection::graph(target.clone())
        };
        dataset.set_active_graph(selection);
        let result = self.evaluator.evaluate(
            &context.optimise(&clause.pattern),
            &*dataset,
            context.remaining_timeout(),
        );
        dataset.reset_active_graph();
        let solutions = result?.into_solutions();

        let created = insert.is_some() && !dataset.has_graph(&target);
        if created {
            dataset.add_graph(target.clone(), Graph::new());
        }
        let mut deleted = GraphTriples::new();
        let mut inserted = GraphTriples::new();
        for solution in &solutions {
            if let Some(delete) = delete {
                deleted.clear();
                construct_triples(delete, solution, &target, &mut deleted)?;
                for (graph, triples) in deleted.iter() {
                    remove_triples(dataset, graph, triples);
                }
            }
            if let Some(insert) = insert {
                construct_triples(insert, solution, &target, &mut inserted)?;
            }
        }
        for (graph, triples) in inserted {
            insert_triples(dataset, graph, &triples);
        }
        if created
            && !target.is_default_graph()
            && dataset.graph(&target).is_none_or(Graph::is_empty)
        {
            dataset.remove_graph(&target);
        }
        Ok(())
    }
}

impl<D: UpdatableDataset> UpdateProcessor for DatasetUpdateProcessor<D> {
    fn process_command(&self, command: &UpdateCommand) -> Result<(), UpdateEvaluationError> {
        let mut context = UpdateEvaluationContext::new(None, self.options.timeout(), &[]);
        self.run(std::slice::from_ref(command), &mut context)
    }

    fn process_command_set(
        &self,
        commands: &mut UpdateCommandSet,
    ) -> Result<(), UpdateEvaluationError> {
        let start = Instant::now();
        commands.set_update_execution_time(None);
        let result = {
            let mut context = UpdateEvaluationContext::new(
                commands.timeout(),
                self.options.timeout(),
                commands.optimisers(),
            );
            debug!(
                commands = commands.len(),
                timeout = ?context.timeout(),
                "executing update command set"
            );
            self.run(commands.commands(), &mut context)
        };
        let elapsed = start.elapsed();
        commands.set_update_execution_time(Some(elapsed));
        debug!(?elapsed, success = result.is_ok(), "update command set executed");
        result
    }

    fn flush(&self) -> Result<(), UpdateEvaluationError> {
        let mut dataset = self.lock()?;
        self.commit(&mut dataset)
    }

    fn discard(&self) -> Result<(), UpdateEvaluationError> {
        let mut dataset = self.lock()?;
        self.can_commit.store(true, Ordering::Release);
        dataset.discard()?;
        Ok(())
    }
}

fn source_graph(
    dataset: &impl UpdatableDataset,
    source: &GraphName,
) -> Result<Graph, UpdateEvaluationError> {
    dataset
        .graph(source)
        .cloned()
        .ok_or_else(|| UpdateEvaluationError::GraphDoesNotExist(source.clone()))
}

fn eval_add(
    dataset: &mut impl UpdatableDataset,
    source: &GraphName,
    destination: &GraphName,
) -> Result<(), UpdateEvaluationError> {
    if source == destination {
        return Ok(());
    }
    let graph = source_graph(dataset, source)?;
    dataset.add_graph(destination.clone(), graph);
    Ok(())
}

fn eval_copy(
    dataset: &mut impl UpdatableDataset,
    source: &GraphName,
    destination: &GraphName,
    move_source: bool,
) -> Result<(), UpdateEvaluationError> {
    if source == destination {
        return Ok(());
    }
    let graph = source_graph(dataset, source)?;
    if let Some(existing) = dataset.graph_mut(destination) {
        existing.clear();
    }
    dataset.add_graph(destination.clone(), graph);
    if move_source {
        if source.is_default_graph() {
            clear_default_graph(dataset);
        } else {
            dataset.remove_graph(source);
        }
    }
    Ok(())
}

fn eval_clear(
    dataset: &mut impl UpdatableDataset,
    target: &GraphTarget,
    drop_graphs: bool,
) -> Result<(), UpdateEvaluationError> {
    match target {
        GraphTarget::NamedNode(graph) => {
            let graph = GraphName::from(graph.clone());
            if drop_graphs {
                if !dataset.remove_graph(&graph) {
                    return Err(UpdateEvaluationError::GraphDoesNotExist(graph));
                }
            } else {
                dataset
                    .graph_mut(&graph)
                    .ok_or_else(|| UpdateEvaluationError::GraphDoesNotExist(graph.clone()))?
                    .clear();
            }
        }
        // The default graph always exists: dropping it only removes its content
        GraphTarget::DefaultGraph => clear_default_graph(dataset),
        GraphTarget::NamedGraphs | GraphTarget::AllGraphs => {
            for graph in dataset.graph_names() {
                if graph.is_default_graph() {
                    continue;
                }
                if drop_graphs {
                    dataset.remove_graph(&graph);
                } else if let Some(graph) = dataset.graph_mut(&graph) {
                    graph.clear();
                }
            }
            if matches!(target, GraphTarget::AllGraphs) {
                clear_default_graph(dataset);
            }
        }
    }
    Ok(())
}

fn eval_create(
    dataset: &mut impl UpdatableDataset,
    graph: &NamedNode,
) -> Result<(), UpdateEvaluationError> {
    let graph = GraphName::from(graph.clone());
    if dataset.has_graph(&graph) {
        return Err(UpdateEvaluationError::GraphAlreadyExists(graph));
    }
    dataset.add_graph(graph, Graph::new());
    Ok(())
}

fn eval_insert_data(
    dataset: &mut impl UpdatableDataset,
    data: &GraphPattern,
) -> Result<(), UpdateEvaluationError> {
    for (graph, triples) in validate_data_pattern(data, true)? {
        insert_triples(dataset, graph, &triples);
    }
    Ok(())
}

fn eval_delete_data(
    dataset: &mut impl UpdatableDataset,
    data: &GraphPattern,
) -> Result<(), UpdateEvaluationError> {
    for (graph, triples) in validate_data_pattern(data, false)? {
        remove_triples(dataset, &graph, &triples);
    }
    Ok(())
}

fn clear_default_graph(dataset: &mut impl UpdatableDataset) {
    if let Some(graph) = dataset.graph_mut(&GraphName::DefaultGraph) {
        graph.clear();
    } else {
        dataset.add_graph(GraphName::DefaultGraph, Graph::new());
    }
}

fn insert_triples(dataset: &mut impl UpdatableDataset, graph: GraphName, triples: &[Triple]) {
    if let Some(existing) = dataset.graph_mut(&graph) {
        for triple in triples {
            existing.insert(triple);
        }
    } else {
        let mut new_graph = Graph::new();
        for triple in triples {
            new_graph.insert(triple);
        }
        dataset.add_graph(graph, new_graph);
    }
}

/// Triples of missing graphs are ignored.
fn remove_triples(dataset: &mut impl UpdatableDataset, graph: &GraphName, triples: &[Triple]) {
    if let Some(existing) = dataset.graph_mut(graph) {
        for triple in triples {
            existing.remove(triple);
        }
    }
}
