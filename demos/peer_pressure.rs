use pregel_computer::algorithms::{
    ClusterCountMapReduce, ClusterPopulationMapReduce, PeerPressureVertexProgram, CLUSTER_COUNT, CLUSTER_POPULATION,
};
use pregel_computer::{
    graph_location, ComputerConfig, Edge, Error, FileSystemStorage, Graph, GraphComputer, Location, Result, StarVertex,
    Storage, Value,
};

use rand::prelude::*;
use tracing_subscriber::EnvFilter;

use std::collections::BTreeMap;
use std::sync::Arc;

const VERTICES: i64 = 10_000;
const AVG_DEGREE: usize = 3;

fn random_graph(rng: &mut StdRng) -> Result<Graph> {
    let mut graph = Graph::new();
    for id in 0..VERTICES {
        graph.add_vertex(StarVertex::new(id, "node"));
    }
    for source in 0..VERTICES {
        for _ in 0..rng.gen_range(0..=2 * AVG_DEGREE) {
            let target = rng.gen_range(0..VERTICES);
            if target != source {
                graph.add_edge(Edge::new(source, target, "link"))?;
            }
        }
    }
    Ok(graph)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let dir = tempfile::tempdir().map_err(|source| Error::Io {
        location: "temporary directory".to_string(),
        source,
    })?;
    let input = Location::from(dir.path().join("input"));
    let output = Location::from(dir.path().join("output"));

    let storage = Arc::new(FileSystemStorage::new());
    let mut rng = StdRng::seed_from_u64(42);
    storage.write_graph(&input, &random_graph(&mut rng)?)?;

    let result = GraphComputer::new(storage.clone(), ComputerConfig::new(input, output.clone()))
        .program(PeerPressureVertexProgram::new())
        .map_reduce(ClusterCountMapReduce::new())
        .map_reduce(ClusterPopulationMapReduce::new())
        .submit()
        .join()?;

    let memory = result.memory();
    println!(
        "{} clusters after {} supersteps (converged: {})",
        memory.get::<i64>(CLUSTER_COUNT)?,
        memory.iteration(),
        memory.is_converged()
    );

    let population: BTreeMap<String, Value> = memory.get(CLUSTER_POPULATION)?;
    let mut sizes: Vec<(i64, &String)> = population
        .iter()
        .filter_map(|(cluster, size)| size.get::<i64>().map(|size| (size, cluster)))
        .collect();
    sizes.sort_by(|a, b| b.cmp(a));
    for (size, cluster) in sizes.iter().take(5) {
        println!("cluster {}: {} vertices", cluster, size);
    }

    for record in storage.head_limit(&graph_location(&output), 3)? {
        println!("{:?}", record?);
    }
    Ok(())
}
