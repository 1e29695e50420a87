#![cfg(test)]
#![allow(clippy::panic_in_result_fn)]

use sparupdate::model::*;
use sparupdate::{
    GraphSelection, IoBehaviour, IoFacet, MemoryDataset, Multiset, PatternEvaluator,
    QueryPatternEvaluator, QueryableStorage, StorageBackend, StorageError, StorageProvider,
    StorageUpdateProcessor, UpdatableDataset, UpdateCommand, UpdateCommandSet,
    UpdateEvaluationError, UpdateProcessor, UpdateableStorage,
};
use spargebra::Query;
use std::error::Error;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::sleep;
use std::time::Duration;

fn ex(name: &str) -> NamedNode {
    NamedNode::new_unchecked(format!("http://example.com/{name}"))
}

fn triple(s: &str, p: &str, o: &str) -> Triple {
    Triple::new(ex(s), ex(p), ex(o))
}

#[derive(Default)]
struct StorageState {
    dataset: MemoryDataset,
    log: Vec<String>,
    updates: Vec<String>,
}

/// A storage with configurable primitives that logs the calls it receives.
#[derive(Clone)]
struct TestStorage {
    capabilities: IoBehaviour,
    update: bool,
    delete: bool,
    list: bool,
    read_only: bool,
    load_delay: Duration,
    state: Arc<Mutex<StorageState>>,
}

impl TestStorage {
    fn new(capabilities: IoBehaviour) -> Self {
        Self {
            capabilities,
            update: false,
            delete: false,
            list: false,
            read_only: false,
            load_delay: Duration::ZERO,
            state: Arc::default(),
        }
    }

    fn updatable() -> Self {
        Self {
            update: true,
            delete: true,
            list: true,
            ..Self::new(IoBehaviour::updatable_graph_store())
        }
    }

    fn with_triples(self, graph: impl Into<GraphName>, triples: &[Triple]) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state
                .dataset
                .add_graph(graph.into(), triples.iter().collect());
        }
        self
    }

    fn state(&self) -> Result<MutexGuard<'_, StorageState>, StorageError> {
        self.state
            .lock()
            .map_err(|e| io::Error::other(e.to_string()).into())
    }

    fn log(&self) -> Vec<String> {
        self.state().map(|s| s.log.clone()).unwrap_or_default()
    }

    fn updates(&self) -> Vec<String> {
        self.state().map(|s| s.updates.clone()).unwrap_or_default()
    }

    fn graph(&self, graph: impl Into<GraphName>) -> Option<Graph> {
        self.state()
            .ok()
            .and_then(|s| s.dataset.graph(&graph.into()).cloned())
    }
}

impl StorageProvider for TestStorage {
    fn capabilities(&self) -> IoBehaviour {
        self.capabilities
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn update_supported(&self) -> bool {
        self.update
    }

    fn delete_supported(&self) -> bool {
        self.delete
    }

    fn list_graphs_supported(&self) -> bool {
        self.list
    }

    fn load_graph(&self, graph: &mut Graph, name: &GraphName) -> Result<(), StorageError> {
        sleep(self.load_delay);
        let mut state = self.state()?;
        state.log.push(format!("load {name}"));
        if let Some(content) = state.dataset.graph(name) {
            graph.extend(content.iter());
        }
        Ok(())
    }

    fn save_graph(&self, name: &GraphName, graph: &Graph) -> Result<(), StorageError> {
        let mut state = self.state()?;
        state.log.push(format!("save {name}"));
        if self.capabilities.can_overwrite_graph(name.is_default_graph()) {
            state.dataset.remove_graph(name);
        }
        state.dataset.add_graph(name.clone(), graph.clone());
        Ok(())
    }

    fn delete_graph(&self, name: &GraphName) -> Result<(), StorageError> {
        if !self.delete {
            return Err(StorageError::unsupported("graph deletion"));
        }
        let mut state = self.state()?;
        state.log.push(format!("delete {name}"));
        state.dataset.remove_graph(name);
        Ok(())
    }

    fn list_graph_names(&self) -> Result<Vec<GraphName>, StorageError> {
        if !self.list {
            return Err(StorageError::unsupported("graph listing"));
        }
        Ok(self.state()?.dataset.graph_names())
    }

    fn update_graph(
        &self,
        name: &GraphName,
        additions: &[Triple],
        removals: &[Triple],
    ) -> Result<(), StorageError> {
        if !self.update {
            return Err(StorageError::unsupported("triple level updates"));
        }
        let mut state = self.state()?;
        state.log.push(format!(
            "update {name} +{} -{}",
            additions.len(),
            removals.len()
        ));
        if let Some(graph) = state.dataset.graph_mut(name) {
            for triple in removals {
                graph.remove(triple);
            }
        }
        if !additions.is_empty() {
            state
                .dataset
                .add_graph(name.clone(), additions.iter().collect());
        }
        Ok(())
    }
}

impl QueryableStorage for TestStorage {
    fn query(&self, query: &Query) -> Result<Multiset, StorageError> {
        let Query::Select {
            dataset, pattern, ..
        } = query
        else {
            return Err(StorageError::unsupported("non SELECT queries"));
        };
        let mut state = self.state()?;
        let selection = dataset.as_ref().map_or_else(GraphSelection::default, |d| {
            GraphSelection::new(
                d.default.iter().cloned().map(GraphName::from).collect(),
                d.named
                    .as_ref()
                    .map(|named| named.iter().cloned().map(GraphName::from).collect()),
            )
        });
        state.dataset.set_active_graph(selection);
        let result = QueryPatternEvaluator.evaluate(pattern, &state.dataset, None);
        state.dataset.reset_active_graph();
        result.map_err(|e| io::Error::other(e.to_string()).into())
    }
}

impl UpdateableStorage for TestStorage {
    fn update(&self, update: &str) -> Result<(), StorageError> {
        self.state()?.updates.push(update.to_owned());
        Ok(())
    }
}

fn execute(storage: &TestStorage, update: &str) -> Result<(), UpdateEvaluationError> {
    let processor = StorageUpdateProcessor::new(StorageBackend::queryable(storage.clone()))?;
    let mut commands = UpdateCommandSet::parse(update, None).map_err(io::Error::other)?;
    processor.process_command_set(&mut commands)
}

#[test]
fn test_read_only_storage() {
    let storage = TestStorage {
        read_only: true,
        ..TestStorage::updatable()
    };
    assert!(matches!(
        StorageUpdateProcessor::new(StorageBackend::basic(storage)),
        Err(UpdateEvaluationError::ReadOnlyStorage)
    ));
}

#[test]
fn test_drop_without_named_graphs() -> Result<(), Box<dyn Error>> {
    let storage = TestStorage::new(IoBehaviour::graph_store().without(IoFacet::HasNamedGraphs));
    assert!(matches!(
        execute(&storage, "DROP GRAPH <http://example.com/g>"),
        Err(UpdateEvaluationError::GraphNotAddressable(_))
    ));
    execute(&storage, "DROP SILENT GRAPH <http://example.com/g>")?;
    assert!(storage.log().is_empty());
    Ok(())
}

#[test]
fn test_insert_data_with_triple_updates() -> Result<(), Box<dyn Error>> {
    let storage = TestStorage::updatable();
    execute(
        &storage,
        "INSERT DATA { <http://example.com/s> <http://example.com/p> <http://example.com/o> }",
    )?;
    assert_eq!(storage.log(), ["update DEFAULT +1 -0"]);
    assert!(
        storage
            .graph(GraphName::DefaultGraph)
            .is_some_and(|g| g.contains(&triple("s", "p", "o")))
    );
    Ok(())
}

#[test]
fn test_insert_data_with_overwrite() -> Result<(), Box<dyn Error>> {
    let storage = TestStorage::new(IoBehaviour::graph_store())
        .with_triples(ex("g"), &[triple("s", "p", "o1")]);
    execute(
        &storage,
        "INSERT DATA { GRAPH <http://example.com/g> { <http://example.com/s> <http://example.com/p> <http://example.com/o2> } }",
    )?;
    assert_eq!(
        storage.log(),
        ["load <http://example.com/g>", "save <http://example.com/g>"]
    );
    assert_eq!(storage.graph(ex("g")).map(|g| g.len()), Some(2));
    Ok(())
}

#[test]
fn test_delete_data_with_overwrite() -> Result<(), Box<dyn Error>> {
    let storage = TestStorage::new(IoBehaviour::graph_store()).with_triples(
        GraphName::DefaultGraph,
        &[triple("s", "p", "o1"), triple("s", "p", "o2")],
    );
    execute(
        &storage,
        "DELETE DATA { <http://example.com/s> <http://example.com/p> <http://example.com/o1> }",
    )?;
    let graph = storage.graph(GraphName::DefaultGraph).unwrap_or_default();
    assert!(!graph.contains(&triple("s", "p", "o1")));
    assert!(graph.contains(&triple("s", "p", "o2")));
    Ok(())
}

#[test]
fn test_insert_without_write_primitive() {
    let storage = TestStorage::new(
        IoBehaviour::empty()
            .with(IoFacet::HasDefaultGraph)
            .with(IoFacet::HasNamedGraphs),
    );
    assert!(matches!(
        execute(
            &storage,
            "INSERT DATA { <http://example.com/s> <http://example.com/p> <http://example.com/o> }"
        ),
        Err(UpdateEvaluationError::NoApproximation(_))
    ));
    assert!(storage.log().is_empty());
}

#[test]
fn test_add_without_write_primitive_does_no_io() -> Result<(), Box<dyn Error>> {
    let storage = TestStorage::new(
        IoBehaviour::empty()
            .with(IoFacet::HasDefaultGraph)
            .with(IoFacet::HasNamedGraphs),
    );
    let processor = StorageUpdateProcessor::new(StorageBackend::basic(storage.clone()))?;
    let result = processor.process_command(&UpdateCommand::Add {
        source: ex("g").into(),
        destination: GraphName::DefaultGraph,
        silent: false,
    });
    assert!(matches!(
        result,
        Err(UpdateEvaluationError::NoApproximation(_))
    ));
    processor.process_command(&UpdateCommand::Add {
        source: ex("g").into(),
        destination: GraphName::DefaultGraph,
        silent: true,
    })?;
    execute(&storage, "COPY SILENT <http://example.com/g> TO DEFAULT")?;
    execute(&storage, "MOVE SILENT <http://example.com/g> TO DEFAULT")?;
    execute(&storage, "CLEAR SILENT GRAPH <http://example.com/g>")?;
    assert!(storage.log().is_empty());
    Ok(())
}

#[test]
fn test_add_same_graph() -> Result<(), Box<dyn Error>> {
    let storage = TestStorage::new(IoBehaviour::empty());
    let processor = StorageUpdateProcessor::new(StorageBackend::basic(storage.clone()))?;
    processor.process_command(&UpdateCommand::Add {
        source: ex("g").into(),
        destination: ex("g").into(),
        silent: false,
    })?;
    assert!(storage.log().is_empty());
    Ok(())
}

#[test]
fn test_copy_with_overwrite() -> Result<(), Box<dyn Error>> {
    let storage = TestStorage::new(IoBehaviour::graph_store())
        .with_triples(ex("g"), &[triple("s", "p", "o1")])
        .with_triples(GraphName::DefaultGraph, &[triple("s", "p", "o2")]);
    let processor = StorageUpdateProcessor::new(StorageBackend::basic(storage.clone()))?;
    processor.process_command(&UpdateCommand::Copy {
        source: ex("g").into(),
        destination: GraphName::DefaultGraph,
        silent: false,
    })?;
    assert_eq!(storage.log(), ["load <http://example.com/g>", "save DEFAULT"]);
    assert_eq!(
        storage.graph(GraphName::DefaultGraph),
        Some([triple("s", "p", "o1")].iter().collect())
    );
    assert_eq!(storage.graph(ex("g")).map(|g| g.len()), Some(1));
    Ok(())
}

#[test]
fn test_copy_with_triple_updates() -> Result<(), Box<dyn Error>> {
    let storage = TestStorage {
        update: true,
        ..TestStorage::new(
            IoBehaviour::empty()
                .with(IoFacet::HasDefaultGraph)
                .with(IoFacet::HasNamedGraphs)
                .with(IoFacet::CanUpdateAddTriples)
                .with(IoFacet::CanUpdateDeleteTriples),
        )
    }
    .with_triples(ex("g1"), &[triple("s", "p", "o1"), triple("s", "p", "o2")])
    .with_triples(ex("g2"), &[triple("s", "p", "o2"), triple("s", "p", "o3")]);
    let processor = StorageUpdateProcessor::new(StorageBackend::basic(storage.clone()))?;
    processor.process_command(&UpdateCommand::Copy {
        source: ex("g1").into(),
        destination: ex("g2").into(),
        silent: false,
    })?;
    assert_eq!(
        storage.log(),
        [
            "load <http://example.com/g1>",
            "load <http://example.com/g2>",
            "update <http://example.com/g2> +1 -1"
        ]
    );
    assert_eq!(storage.graph(ex("g2")), storage.graph(ex("g1")));
    Ok(())
}

#[test]
fn test_move_deletes_source() -> Result<(), Box<dyn Error>> {
    let storage = TestStorage::updatable().with_triples(ex("g1"), &[triple("s", "p", "o")]);
    let processor = StorageUpdateProcessor::new(StorageBackend::basic(storage.clone()))?;
    processor.process_command(&UpdateCommand::Move {
        source: ex("g1").into(),
        destination: ex("g2").into(),
        silent: false,
    })?;
    assert_eq!(
        storage.log(),
        [
            "load <http://example.com/g1>",
            "save <http://example.com/g2>",
            "delete <http://example.com/g1>"
        ]
    );
    assert!(storage.graph(ex("g1")).is_none());
    assert_eq!(storage.graph(ex("g2")).map(|g| g.len()), Some(1));
    Ok(())
}

#[test]
fn test_clear_all_requires_listing() -> Result<(), Box<dyn Error>> {
    let storage = TestStorage::new(IoBehaviour::graph_store())
        .with_triples(ex("g"), &[triple("s", "p", "o")])
        .with_triples(GraphName::DefaultGraph, &[triple("s", "p", "o")]);
    assert!(matches!(
        execute(&storage, "CLEAR ALL"),
        Err(UpdateEvaluationError::NoApproximation(_))
    ));
    execute(&storage, "CLEAR SILENT ALL")?;
    assert!(storage.log().is_empty());
    assert_eq!(storage.graph(ex("g")).map(|g| g.len()), Some(1));

    let storage = TestStorage {
        list: true,
        ..storage
    };
    execute(&storage, "CLEAR ALL")?;
    assert!(storage.graph(ex("g")).is_none_or(|g| g.is_empty()));
    assert!(
        storage
            .graph(GraphName::DefaultGraph)
            .is_none_or(|g| g.is_empty())
    );
    Ok(())
}

#[test]
fn test_drop_named_keeps_default_graph() -> Result<(), Box<dyn Error>> {
    let storage = TestStorage::updatable()
        .with_triples(ex("g1"), &[triple("s", "p", "o")])
        .with_triples(ex("g2"), &[triple("s", "p", "o")])
        .with_triples(GraphName::DefaultGraph, &[triple("s", "p", "o")]);
    execute(&storage, "DROP NAMED")?;
    assert!(storage.graph(ex("g1")).is_none());
    assert!(storage.graph(ex("g2")).is_none());
    assert_eq!(
        storage.graph(GraphName::DefaultGraph).map(|g| g.len()),
        Some(1)
    );
    Ok(())
}

#[test]
fn test_create_without_empty_graphs() -> Result<(), Box<dyn Error>> {
    let storage = TestStorage::new(IoBehaviour::graph_store());
    execute(&storage, "CREATE GRAPH <http://example.com/g>")?;
    assert!(storage.log().is_empty());
    Ok(())
}

#[test]
fn test_create_existing_graph() -> Result<(), Box<dyn Error>> {
    let storage = TestStorage::updatable().with_triples(ex("g"), &[triple("s", "p", "o")]);
    assert!(matches!(
        execute(&storage, "CREATE GRAPH <http://example.com/g>"),
        Err(UpdateEvaluationError::GraphAlreadyExists(_))
    ));
    execute(&storage, "CREATE SILENT GRAPH <http://example.com/g>")?;
    execute(&storage, "CREATE GRAPH <http://example.com/g2>")?;
    assert_eq!(storage.graph(ex("g2")).map(|g| g.len()), Some(0));
    Ok(())
}

#[test]
fn test_pattern_commands_need_queries() -> Result<(), Box<dyn Error>> {
    let processor =
        StorageUpdateProcessor::new(StorageBackend::basic(TestStorage::updatable()))?;
    let mut commands = UpdateCommandSet::parse("DELETE WHERE { ?s ?p ?o }", None)?;
    assert!(matches!(
        processor.process_command_set(&mut commands),
        Err(UpdateEvaluationError::Unsupported(_))
    ));
    Ok(())
}

#[test]
fn test_modify_over_queryable_storage() -> Result<(), Box<dyn Error>> {
    let storage = TestStorage::updatable().with_triples(
        GraphName::DefaultGraph,
        &[triple("s", "p", "o1"), triple("s", "q", "o2")],
    );
    execute(
        &storage,
        "PREFIX ex: <http://example.com/>
        DELETE { ?s ex:p ?o } INSERT { GRAPH ex:g { ?s ex:p ?o } } WHERE { ?s ex:p ?o }",
    )?;
    assert_eq!(
        storage.graph(GraphName::DefaultGraph),
        Some([triple("s", "q", "o2")].iter().collect())
    );
    assert_eq!(
        storage.graph(ex("g")),
        Some([triple("s", "p", "o1")].iter().collect())
    );
    Ok(())
}

#[test]
fn test_modify_with_using() -> Result<(), Box<dyn Error>> {
    let storage = TestStorage::updatable()
        .with_triples(ex("g"), &[triple("s", "p", "o")])
        .with_triples(GraphName::DefaultGraph, &[]);
    execute(
        &storage,
        "PREFIX ex: <http://example.com/>
        INSERT { ?s ex:q ?o } USING ex:g WHERE { ?s ex:p ?o }",
    )?;
    assert_eq!(
        storage.graph(GraphName::DefaultGraph),
        Some([triple("s", "q", "o")].iter().collect())
    );
    Ok(())
}

#[test]
fn test_timeout_between_commands() -> Result<(), Box<dyn Error>> {
    let storage = TestStorage {
        load_delay: Duration::from_millis(80),
        ..TestStorage::updatable()
    }
    .with_triples(ex("g1"), &[triple("s", "p", "o")])
    .with_triples(ex("g3"), &[triple("s", "p", "o")]);
    let processor = StorageUpdateProcessor::new(StorageBackend::basic(storage.clone()))?;
    let mut commands = UpdateCommandSet::parse(
        "PREFIX ex: <http://example.com/>
        ADD ex:g1 TO ex:g2 ;
        DROP GRAPH ex:g3",
        None,
    )?
    .with_timeout(Duration::from_millis(50));
    let error = processor
        .process_command_set(&mut commands)
        .err()
        .ok_or("a timeout was expected")?;
    assert!(error.is_timeout());
    assert!(commands.update_execution_time().is_some());
    // Without transactions the first command stays applied
    assert_eq!(
        storage.graph(ex("g2")),
        Some([triple("s", "p", "o")].iter().collect())
    );
    assert!(storage.graph(ex("g3")).is_some());
    assert!(!storage.log().iter().any(|entry| entry.starts_with("delete")));
    Ok(())
}

#[test]
fn test_native_update_forwarding() -> Result<(), Box<dyn Error>> {
    let storage = TestStorage::new(IoBehaviour::empty());
    let processor = StorageUpdateProcessor::new(StorageBackend::native_update(storage.clone()))?;
    let mut commands = UpdateCommandSet::parse(
        "CLEAR DEFAULT ; INSERT DATA { <http://example.com/s> <http://example.com/p> <http://example.com/o> }",
        None,
    )?;
    processor.process_command_set(&mut commands)?;
    assert_eq!(storage.updates(), [commands.to_string()]);
    assert!(storage.log().is_empty());
    assert!(commands.update_execution_time().is_some());
    Ok(())
}
