mod common;

use common::{random_graph, Hooked, Scratch};
use pregel_computer::algorithms::{
    ClusterCountMapReduce, ClusterPopulationMapReduce, PageRankVertexProgram, PeerPressureVertexProgram, CLUSTER,
    CLUSTER_COUNT, CLUSTER_POPULATION, PAGE_RANK, VOTE_STRENGTH,
};
use pregel_computer::{
    graph_location, modern_graph, ComputerConfig, Error, GraphComputer, Location, MemoryFormat, Persist, Record,
    ResultGraph, Storage, Value,
};

use std::collections::{BTreeMap, BTreeSet};

fn computer(scratch: &Scratch, input: Location) -> GraphComputer {
    GraphComputer::new(
        scratch.storage.clone(),
        ComputerConfig::new(input, scratch.location("output")),
    )
}

#[test]
fn peer_pressure_clusters_the_modern_graph() {
    let scratch = Scratch::new();
    let input = scratch.input(&modern_graph());
    let output = scratch.location("output");
    assert!(!scratch.storage.exists(&output));

    let result = computer(&scratch, input)
        .program(PeerPressureVertexProgram::new())
        .map_reduce(ClusterCountMapReduce::new())
        .submit()
        .join()
        .unwrap();

    let graph = result.graph();
    assert_eq!(graph.vertex_count(), 6);
    assert_eq!(graph.edge_count(), 0);
    assert_eq!(graph.values("name").count(), 6);
    assert_eq!(graph.values(CLUSTER).count(), 6);
    assert_eq!(graph.values(VOTE_STRENGTH).count(), 0);

    let clusters: BTreeSet<i64> = graph.values(CLUSTER).filter_map(|v| v.get::<i64>()).collect();
    assert_eq!(clusters, BTreeSet::from([1, 6]));

    let memory = result.memory();
    assert_eq!(memory.get::<i64>(CLUSTER_COUNT).unwrap(), 2);
    assert!(memory.is_converged());
    assert!(memory.iteration() <= 7);
    assert!(!memory.exists("voteToHalt"));

    assert!(scratch.storage.exists(&output));
    for limit in 0..=6 {
        assert_eq!(scratch.storage.head_limit(&graph_location(&output), limit).unwrap().count(), limit);
    }
    assert_eq!(scratch.storage.head_limit(&graph_location(&output), 10).unwrap().count(), 6);

    for format in [MemoryFormat::Sequence, MemoryFormat::Object] {
        let records: Vec<Record> = scratch
            .storage
            .head_memory(&output, CLUSTER_COUNT, format)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key(), Some(CLUSTER_COUNT));
        assert_eq!(records[0].value(), Some(&Value::Int(2)));
    }
    assert!(matches!(
        scratch.storage.head_memory(&output, "voteToHalt", MemoryFormat::Sequence),
        Err(Error::NotFound { .. })
    ));
}

#[test]
fn clusters_do_not_depend_on_worker_count() {
    let graph = random_graph(7, 200, 4);
    let mut outcomes = Vec::new();

    for workers in 1..=5 {
        let scratch = Scratch::new();
        let input = scratch.input(&graph);
        let result = computer(&scratch, input)
            .workers(workers)
            .program(PeerPressureVertexProgram::new())
            .map_reduce(ClusterPopulationMapReduce::new())
            .submit()
            .join()
            .unwrap();

        let clusters: BTreeMap<i64, Value> = result
            .graph()
            .vertices()
            .map(|v| (v.id, v.property(CLUSTER).cloned().unwrap_or(Value::Null)))
            .collect();
        let population = result.memory().get_value(CLUSTER_POPULATION).unwrap().clone();
        outcomes.push((clusters, population, result.memory().iteration()));
    }

    for outcome in &outcomes[1..] {
        assert_eq!(outcome, &outcomes[0]);
    }
}

#[test]
fn original_graph_is_returned_untouched() {
    let scratch = Scratch::new();
    let input = scratch.input(&modern_graph());
    let output = scratch.location("output");

    let result = computer(&scratch, input)
        .program(PeerPressureVertexProgram::new())
        .map_reduce(ClusterCountMapReduce::new())
        .result_graph(ResultGraph::Original)
        .persist(Persist::Nothing)
        .submit()
        .join()
        .unwrap();

    assert_eq!(result.graph(), &modern_graph());
    assert_eq!(result.memory().get::<i64>(CLUSTER_COUNT).unwrap(), 2);
    assert!(!scratch.storage.exists(&graph_location(&output)));
    assert!(scratch.storage.exists(&output));
}

#[test]
fn persisting_edges_keeps_the_adjacency() {
    let scratch = Scratch::new();
    let input = scratch.input(&modern_graph());
    let output = scratch.location("output");

    let result = computer(&scratch, input)
        .program(PeerPressureVertexProgram::new())
        .persist(Persist::Edges)
        .submit()
        .join()
        .unwrap();

    assert_eq!(result.graph().edge_count(), 6);
    let persisted = scratch.storage.read_graph(&graph_location(&output)).unwrap();
    assert_eq!(&persisted, result.graph());
}

#[test]
fn nothing_persisted_means_an_empty_result_graph() {
    let scratch = Scratch::new();
    let input = scratch.input(&modern_graph());

    let result = computer(&scratch, input)
        .program(PeerPressureVertexProgram::new())
        .map_reduce(ClusterCountMapReduce::new())
        .persist(Persist::Nothing)
        .submit()
        .join()
        .unwrap();

    assert!(result.graph().is_empty());
    assert_eq!(result.memory().get::<i64>(CLUSTER_COUNT).unwrap(), 2);
}

#[test]
fn map_reduce_runs_without_a_program() {
    let scratch = Scratch::new();
    let mut graph = modern_graph();
    let clustered: Vec<_> = graph
        .vertices()
        .cloned()
        .map(|v| {
            let cluster = v.id % 3;
            v.with_property(CLUSTER, cluster)
        })
        .collect();
    graph = clustered.into_iter().collect();
    let input = scratch.input(&graph);

    let result = computer(&scratch, input)
        .map_reduce(ClusterCountMapReduce::new())
        .map_reduce(ClusterPopulationMapReduce::new())
        .submit()
        .join()
        .unwrap();

    let memory = result.memory();
    assert_eq!(memory.get::<i64>(CLUSTER_COUNT).unwrap(), 3);
    let population: BTreeMap<String, Value> = memory.get(CLUSTER_POPULATION).unwrap();
    assert_eq!(population["0"], Value::Int(2));
    assert_eq!(population["1"], Value::Int(2));
    assert_eq!(population["2"], Value::Int(2));
    assert_eq!(result.graph(), &graph);
}

#[test]
fn a_previous_job_output_is_valid_input() {
    let scratch = Scratch::new();
    let input = scratch.input(&modern_graph());
    let first = scratch.location("output");

    computer(&scratch, input)
        .program(PeerPressureVertexProgram::new())
        .persist(Persist::Edges)
        .submit()
        .join()
        .unwrap();

    let config = ComputerConfig::new(first, scratch.location("second"));
    let result = GraphComputer::new(scratch.storage.clone(), config)
        .map_reduce(ClusterCountMapReduce::new())
        .submit()
        .join()
        .unwrap();
    assert_eq!(result.memory().get::<i64>(CLUSTER_COUNT).unwrap(), 2);
}

#[test]
fn existing_output_is_kept_unless_overwriting() {
    let scratch = Scratch::new();
    let input = scratch.input(&modern_graph());
    let output = scratch.location("output");

    computer(&scratch, input.clone())
        .map_reduce(ClusterCountMapReduce::new())
        .submit()
        .join()
        .unwrap();

    let again = computer(&scratch, input.clone())
        .program(PageRankVertexProgram::new())
        .submit()
        .join();
    assert!(matches!(again, Err(Error::Configuration(_))));
    assert!(scratch.storage.exists(&output));

    let mut config = ComputerConfig::new(input, output.clone());
    config.overwrite_output = true;
    let result = GraphComputer::new(scratch.storage.clone(), config)
        .program(PageRankVertexProgram::new())
        .submit()
        .join()
        .unwrap();
    assert_eq!(result.graph().values(PAGE_RANK).count(), 6);
    assert!(matches!(
        scratch.storage.head_memory(&output, CLUSTER_COUNT, MemoryFormat::Sequence),
        Err(Error::NotFound { .. })
    ));
}

#[test]
fn failed_overwrite_keeps_the_previous_output() {
    let scratch = Scratch::new();
    let input = scratch.input(&modern_graph());
    let output = scratch.location("output");

    computer(&scratch, input.clone())
        .map_reduce(ClusterCountMapReduce::new())
        .submit()
        .join()
        .unwrap();

    let mut config = ComputerConfig::new(input, output.clone());
    config.overwrite_output = true;
    let result = GraphComputer::new(Hooked::failing(), config)
        .program(PageRankVertexProgram::new())
        .submit()
        .join();

    assert!(matches!(result, Err(Error::Io { .. })));
    assert!(scratch
        .storage
        .head_memory(&output, CLUSTER_COUNT, MemoryFormat::Sequence)
        .is_ok());
}

#[test]
fn missing_input_fails_the_job() {
    let scratch = Scratch::new();
    let result = computer(&scratch, scratch.location("nowhere"))
        .program(PeerPressureVertexProgram::new())
        .submit()
        .join();
    assert!(matches!(result, Err(Error::NotFound { .. })));
    assert!(!scratch.storage.exists(&scratch.location("output")));
}

#[test]
fn page_rank_settles_on_the_modern_graph() {
    let scratch = Scratch::new();
    let input = scratch.input(&modern_graph());

    let result = computer(&scratch, input)
        .workers(3)
        .program(PageRankVertexProgram::new())
        .submit()
        .join()
        .unwrap();

    let rank = |id: i64| result.graph().vertex(id).unwrap().property(PAGE_RANK).unwrap().get::<f64>().unwrap();
    assert!((rank(1) - 0.15).abs() < 1e-9);
    assert!((rank(6) - 0.15).abs() < 1e-9);
    assert!((rank(2) - (0.15 + 0.85 * 0.15 / 3.0)).abs() < 1e-9);
    assert!(rank(3) > rank(2));
    assert_eq!(result.memory().iteration(), 30);
}
