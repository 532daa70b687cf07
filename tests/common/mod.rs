#![allow(dead_code)]

use pregel_computer::{
    Edge, Error, FileSystemStorage, Graph, Location, MemoryFormat, Output, Records, Result, StarVertex, Storage,
};

use rand::prelude::*;
use tempfile::TempDir;

use std::io;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

pub struct Scratch {
    pub dir: TempDir,
    pub storage: Arc<FileSystemStorage>,
}

impl Scratch {
    pub fn new() -> Self {
        Scratch {
            dir: TempDir::new().unwrap(),
            storage: Arc::new(FileSystemStorage::new()),
        }
    }

    pub fn location(&self, name: &str) -> Location {
        Location::from(self.dir.path().join(name))
    }

    /// Writes `graph` to a fresh input location.
    pub fn input(&self, graph: &Graph) -> Location {
        let location = self.location("input");
        self.storage.write_graph(&location, graph).unwrap();
        location
    }
}

pub fn random_graph(seed: u64, vertices: i64, max_degree: usize) -> Graph {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut graph = Graph::new();
    for id in 0..vertices {
        graph.add_vertex(StarVertex::new(id, "node"));
    }
    for source in 0..vertices {
        for _ in 0..rng.gen_range(0..=max_degree) {
            let target = rng.gen_range(0..vertices);
            graph.add_edge(Edge::new(source, target, "link")).unwrap();
        }
    }
    graph
}

/// What [`Hooked`] does when a job publishes.
pub enum Publish {
    /// Reports that publishing started, then waits to be released.
    Gated {
        started: Mutex<Sender<()>>,
        release: Mutex<Receiver<()>>,
    },
    /// Fails without writing anything.
    Failing,
}

/// A filesystem storage that intercepts publishing.
pub struct Hooked {
    pub inner: FileSystemStorage,
    publish: Publish,
}

impl Hooked {
    /// Returns the storage, a receiver signalled when publishing starts and
    /// a sender that lets it continue.
    pub fn gated() -> (Arc<Hooked>, Receiver<()>, Sender<()>) {
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let storage = Hooked {
            inner: FileSystemStorage::new(),
            publish: Publish::Gated {
                started: Mutex::new(started_tx),
                release: Mutex::new(release_rx),
            },
        };
        (Arc::new(storage), started_rx, release_tx)
    }

    pub fn failing() -> Arc<Hooked> {
        Arc::new(Hooked {
            inner: FileSystemStorage::new(),
            publish: Publish::Failing,
        })
    }

    fn before_publish(&self, root: &Location) -> Result<()> {
        match &self.publish {
            Publish::Gated { started, release } => {
                started.lock().unwrap().send(()).unwrap();
                release.lock().unwrap().recv().unwrap();
                Ok(())
            }
            Publish::Failing => Err(Error::Io {
                location: root.to_string(),
                source: io::Error::new(io::ErrorKind::Other, "disk full"),
            }),
        }
    }
}

impl Storage for Hooked {
    fn exists(&self, location: &Location) -> bool {
        self.inner.exists(location)
    }

    fn ls(&self, location: &Location) -> Result<Vec<Location>> {
        self.inner.ls(location)
    }

    fn rm(&self, location: &Location) -> Result<bool> {
        self.inner.rm(location)
    }

    fn head(&self, location: &Location) -> Result<Records> {
        self.inner.head(location)
    }

    fn head_limit(&self, location: &Location, limit: usize) -> Result<Records> {
        self.inner.head_limit(location, limit)
    }

    fn head_memory(&self, root: &Location, key: &str, format: MemoryFormat) -> Result<Records> {
        self.inner.head_memory(root, key, format)
    }

    fn read_graph(&self, location: &Location) -> Result<Graph> {
        self.inner.read_graph(location)
    }

    fn write_graph(&self, location: &Location, graph: &Graph) -> Result<()> {
        self.inner.write_graph(location, graph)
    }

    fn write_output(&self, root: &Location, output: &Output) -> Result<()> {
        self.before_publish(root)?;
        self.inner.write_output(root, output)
    }

    fn replace_output(&self, root: &Location, output: &Output) -> Result<()> {
        self.before_publish(root)?;
        self.inner.replace_output(root, output)
    }
}
