use crate::codec::{self, GraphFormat, GraphReader, MemoryFormat, MemoryReader};
use crate::{graph_location, memory_location, Edge, Error, Graph, KeyValue, Location, Record, Result, StarVertex};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

pub const DEFAULT_HEAD: usize = 20;

const SUCCESS_MARKER: &str = "_SUCCESS";

/// Lazily decoded records. Each call to a `head` method reopens the artifact.
pub type Records = Box<dyn Iterator<Item = Result<Record>> + Send>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub graph_format: GraphFormat,
    pub default_head: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            graph_format: GraphFormat::default(),
            default_head: DEFAULT_HEAD,
        }
    }
}

/// Everything a finished job publishes: the graph, split by partition, and
/// the memory entries.
#[derive(Debug, Clone, Default)]
pub struct Output {
    pub graph: Option<Vec<Vec<StarVertex>>>,
    pub memory: Vec<KeyValue>,
}

pub trait Storage: Send + Sync {
    /// True iff an artifact is present at exactly `location`.
    fn exists(&self, location: &Location) -> bool;

    fn ls(&self, location: &Location) -> Result<Vec<Location>>;

    /// Removes the artifact, returning whether anything was there.
    fn rm(&self, location: &Location) -> Result<bool>;

    fn head(&self, location: &Location) -> Result<Records>;

    fn head_limit(&self, location: &Location, limit: usize) -> Result<Records>;

    /// Entries stored for `key` beneath the output root `root`, decoded with
    /// `format`.
    fn head_memory(&self, root: &Location, key: &str, format: MemoryFormat) -> Result<Records>;

    fn read_graph(&self, location: &Location) -> Result<Graph>;

    fn write_graph(&self, location: &Location, graph: &Graph) -> Result<()>;

    /// Publishes a job's output under `root` in one step. Either everything
    /// becomes visible or nothing does.
    fn write_output(&self, root: &Location, output: &Output) -> Result<()>;

    /// Like [`write_output`](Storage::write_output), but swaps out whatever
    /// is already at `root`. If publishing fails the previous artifact stays
    /// in place.
    fn replace_output(&self, root: &Location, output: &Output) -> Result<()>;
}

#[derive(Debug, Clone, Copy)]
enum Decoder {
    Graph(GraphFormat),
    Memory(MemoryFormat),
}

/// Chains the part files of one artifact, opening each only when reached.
struct PartFiles {
    files: VecDeque<PathBuf>,
    decoder: Decoder,
    current: Option<Records>,
}

impl PartFiles {
    fn new(files: VecDeque<PathBuf>, decoder: Decoder) -> Self {
        PartFiles {
            files,
            decoder,
            current: None,
        }
    }

    fn fail(&mut self, err: Error) -> Option<Result<Record>> {
        self.files.clear();
        self.current = None;
        Some(Err(err))
    }
}

impl Iterator for PartFiles {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(current) = self.current.as_mut() {
                match current.next() {
                    Some(Ok(record)) => return Some(Ok(record)),
                    Some(Err(e)) => return self.fail(e),
                    None => self.current = None,
                }
            }

            let path = self.files.pop_front()?;
            let location = path.to_string_lossy().into_owned();
            let file = match File::open(&path) {
                Ok(file) => file,
                Err(e) => return self.fail(Error::io(location, e)),
            };

            let reader = BufReader::new(file);
            let records: Records = match self.decoder {
                Decoder::Graph(format) => Box::new(GraphReader::new(reader, format, location)),
                Decoder::Memory(format) => Box::new(
                    MemoryReader::new(reader, format, location).map(|entry| entry.map(Record::Entry)),
                ),
            };
            self.current = Some(records);
        }
    }
}

/// [`Storage`] over a hierarchical filesystem. An artifact is a single file
/// or a directory of `part-*` files.
#[derive(Debug, Clone, Default)]
pub struct FileSystemStorage {
    config: StorageConfig,
}

impl FileSystemStorage {
    pub fn new() -> Self {
        FileSystemStorage::default()
    }

    pub fn open(config: StorageConfig) -> Self {
        FileSystemStorage { config }
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    fn part_files(&self, location: &Location) -> Result<VecDeque<PathBuf>> {
        let path = location.to_path();
        let metadata = fs::metadata(&path).map_err(|e| Error::io(location, e))?;
        if metadata.is_file() {
            return Ok(VecDeque::from(vec![path]));
        }

        let mut files = Vec::new();
        for entry in fs::read_dir(&path).map_err(|e| Error::io(location, e))? {
            let entry = entry.map_err(|e| Error::io(location, e))?;
            if is_hidden(&entry.file_name().to_string_lossy()) {
                continue;
            }
            if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files.into())
    }

    fn records(&self, location: &Location, decoder: Decoder) -> Result<PartFiles> {
        Ok(PartFiles::new(self.part_files(location)?, decoder))
    }

    fn write_graph_part(&self, dir: &Path, index: usize, vertices: &[StarVertex]) -> Result<()> {
        let path = dir.join(format!("part-r-{:05}", index));
        let file = File::create(&path).map_err(|e| Error::io(path.display(), e))?;
        let mut writer = BufWriter::new(file);
        let records: Vec<Record> = vertices.iter().cloned().map(Record::Vertex).collect();
        codec::write_graph_records(self.config.graph_format, &mut writer, &records)?;
        writer.flush().map_err(|e| Error::io(path.display(), e))
    }

    fn write_memory_part(&self, dir: &Path, entry: &KeyValue) -> Result<()> {
        let path = dir.join("part-r-00000");
        let file = File::create(&path).map_err(|e| Error::io(path.display(), e))?;
        let mut writer = BufWriter::new(file);
        codec::write_memory_entries(MemoryFormat::Sequence, &mut writer, [entry])?;
        writer.flush().map_err(|e| Error::io(path.display(), e))
    }

    fn write_staged(&self, staging: &Path, output: &Output) -> Result<()> {
        create_dir(staging)?;

        if let Some(partitions) = output.graph.as_ref() {
            let dir = staging.join(crate::location::GRAPH_DIR);
            create_dir(&dir)?;
            for (index, vertices) in partitions.iter().enumerate() {
                self.write_graph_part(&dir, index, vertices)?;
            }
            touch(&dir.join(SUCCESS_MARKER))?;
        }

        for entry in &output.memory {
            let dir = staging.join(&entry.key);
            create_dir(&dir)?;
            self.write_memory_part(&dir, entry)?;
            touch(&dir.join(SUCCESS_MARKER))?;
        }

        touch(&staging.join(SUCCESS_MARKER))
    }

    /// Writes into a hidden sibling of `root` and renames it into place. With
    /// `replace`, an existing artifact is moved aside first and only removed
    /// once the new one is in place.
    fn publish(&self, root: &Location, replace: bool, write: impl FnOnce(&Path) -> Result<()>) -> Result<()> {
        let target = root.to_path();
        if target.exists() && !replace {
            return Err(Error::configuration(format!("{} already exists", root)));
        }

        let parent = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(|e| Error::io(parent.display(), e))?;
        let staging = parent.join(format!(".{}.staging", root.name()));
        let backup = parent.join(format!(".{}.previous", root.name()));
        if staging.exists() {
            warn!("Removing stale staging directory {}", staging.display());
            remove_path(&staging)?;
        }

        let written = write(&staging).and_then(|_| swap_into_place(&staging, &target, &backup));
        if written.is_err() && staging.exists() {
            if let Err(e) = remove_path(&staging) {
                debug!("Failed to clean up {}: {}", staging.display(), e);
            }
        }
        written
    }
}

/// Renames `staging` to `target`, parking any existing `target` at `backup`
/// until the rename has succeeded.
fn swap_into_place(staging: &Path, target: &Path, backup: &Path) -> Result<()> {
    if !target.exists() {
        return fs::rename(staging, target).map_err(|e| Error::io(target.display(), e));
    }

    if backup.exists() {
        warn!("Removing stale backup {}", backup.display());
        remove_path(backup)?;
    }
    fs::rename(target, backup).map_err(|e| Error::io(target.display(), e))?;

    if let Err(e) = fs::rename(staging, target) {
        if let Err(restore) = fs::rename(backup, target) {
            warn!(
                "Failed to restore {} from {}: {}",
                target.display(),
                backup.display(),
                restore
            );
        }
        return Err(Error::io(target.display(), e));
    }

    if let Err(e) = remove_path(backup) {
        warn!("Failed to remove previous output {}: {}", backup.display(), e);
    }
    Ok(())
}

fn remove_path(path: &Path) -> Result<()> {
    let removed = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    removed.map_err(|e| Error::io(path.display(), e))
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('_') || name.starts_with('.')
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|e| Error::io(path.display(), e))
}

fn touch(path: &Path) -> Result<()> {
    File::create(path)
        .map(|_| ())
        .map_err(|e| Error::io(path.display(), e))
}

impl Storage for FileSystemStorage {
    fn exists(&self, location: &Location) -> bool {
        location.to_path().exists()
    }

    fn ls(&self, location: &Location) -> Result<Vec<Location>> {
        let path = location.to_path();
        if path.is_file() {
            return Ok(vec![location.clone()]);
        }

        let mut children = Vec::new();
        for entry in fs::read_dir(&path).map_err(|e| Error::io(location, e))? {
            let entry = entry.map_err(|e| Error::io(location, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with('.') {
                children.push(location.join(&name));
            }
        }
        children.sort();
        Ok(children)
    }

    fn rm(&self, location: &Location) -> Result<bool> {
        let path = location.to_path();
        if !path.exists() {
            return Ok(false);
        }
        remove_path(&path)?;
        debug!("Removed {}", location);
        Ok(true)
    }

    fn head(&self, location: &Location) -> Result<Records> {
        self.head_limit(location, self.config.default_head)
    }

    fn head_limit(&self, location: &Location, limit: usize) -> Result<Records> {
        let records = self.records(location, Decoder::Graph(self.config.graph_format))?;
        Ok(Box::new(records.take(limit)))
    }

    fn head_memory(&self, root: &Location, key: &str, format: MemoryFormat) -> Result<Records> {
        let location = memory_location(root, key);
        let mut records = self.records(&location, Decoder::Memory(format))?;

        // Find the first entry for `key` now so a missing key fails the call
        // instead of yielding an empty sequence.
        let key = key.to_string();
        let first = loop {
            match records.next() {
                Some(Ok(record)) if record.key() == Some(key.as_str()) => break record,
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e),
                None => {
                    return Err(Error::NotFound {
                        location: location.to_string(),
                    })
                }
            }
        };

        let rest = records.filter(move |record| match record {
            Ok(record) => record.key() == Some(key.as_str()),
            Err(_) => true,
        });
        Ok(Box::new(std::iter::once(Ok(first)).chain(rest)))
    }

    fn read_graph(&self, location: &Location) -> Result<Graph> {
        let mut graph = Graph::new();
        let mut loose_edges: Vec<Edge> = Vec::new();

        for record in self.records(location, Decoder::Graph(self.config.graph_format))? {
            match record? {
                Record::Vertex(vertex) => {
                    graph.add_vertex(vertex);
                }
                Record::Edge(edge) => loose_edges.push(edge),
                Record::Entry(entry) => {
                    return Err(Error::decode(
                        location,
                        self.config.graph_format.name(),
                        format!("memory entry {} inside a graph", entry.key),
                    ))
                }
            }
        }

        for edge in loose_edges {
            graph.add_edge(edge)?;
        }

        debug!(
            "Read graph from {}: {} vertices, {} edges",
            location,
            graph.vertex_count(),
            graph.edge_count()
        );
        Ok(graph)
    }

    fn write_graph(&self, location: &Location, graph: &Graph) -> Result<()> {
        let vertices: Vec<StarVertex> = graph.vertices().cloned().collect();
        self.publish(location, false, |staging| {
            create_dir(staging)?;
            self.write_graph_part(staging, 0, &vertices)?;
            touch(&staging.join(SUCCESS_MARKER))
        })?;
        info!("Wrote graph with {} vertices to {}", vertices.len(), location);
        Ok(())
    }

    fn write_output(&self, root: &Location, output: &Output) -> Result<()> {
        self.publish(root, false, |staging| self.write_staged(staging, output))?;
        info!(
            "Published output to {} (graph: {}, memory keys: {})",
            root,
            output.graph.is_some(),
            output.memory.len()
        );
        debug!("Graph written under {}", graph_location(root));
        Ok(())
    }

    fn replace_output(&self, root: &Location, output: &Output) -> Result<()> {
        self.publish(root, true, |staging| self.write_staged(staging, output))?;
        info!(
            "Replaced output at {} (graph: {}, memory keys: {})",
            root,
            output.graph.is_some(),
            output.memory.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{modern_graph, Value};

    use tempfile::TempDir;

    fn root_in(dir: &TempDir, name: &str) -> Location {
        Location::from(dir.path().join(name))
    }

    #[test]
    fn staging_is_invisible_after_publish() {
        let dir = TempDir::new().unwrap();
        let storage = FileSystemStorage::new();
        let root = root_in(&dir, "out");

        let output = Output {
            graph: Some(vec![modern_graph().into_iter().collect()]),
            memory: vec![KeyValue::new("answer", 42_i64)],
        };
        storage.write_output(&root, &output).unwrap();

        let names: Vec<String> = storage
            .ls(&Location::from(dir.path()))
            .unwrap()
            .iter()
            .map(|l| l.name().to_string())
            .collect();
        assert_eq!(names, vec!["out".to_string()]);
        assert!(storage.exists(&root.join("~g").join("part-r-00000")));
        assert!(storage.exists(&root.join("answer").join("_SUCCESS")));
    }

    #[test]
    fn publish_refuses_to_overwrite() {
        let dir = TempDir::new().unwrap();
        let storage = FileSystemStorage::new();
        let root = root_in(&dir, "out");
        storage.write_output(&root, &Output::default()).unwrap();
        assert!(matches!(
            storage.write_output(&root, &Output::default()),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn replacing_swaps_the_whole_artifact() {
        let dir = TempDir::new().unwrap();
        let storage = FileSystemStorage::new();
        let root = root_in(&dir, "out");
        let first = Output {
            graph: None,
            memory: vec![KeyValue::new("old", 1_i64)],
        };
        let second = Output {
            graph: None,
            memory: vec![KeyValue::new("new", 2_i64)],
        };

        storage.write_output(&root, &first).unwrap();
        storage.replace_output(&root, &second).unwrap();

        assert!(!storage.exists(&root.join("old")));
        assert!(storage.exists(&root.join("new")));
        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["out".to_string()]);
    }

    #[test]
    fn failed_replace_keeps_the_previous_artifact() {
        let dir = TempDir::new().unwrap();
        let storage = FileSystemStorage::new();
        let root = root_in(&dir, "out");
        storage
            .write_output(&root, &Output {
                graph: None,
                memory: vec![KeyValue::new("old", 1_i64)],
            })
            .unwrap();

        // A file where a memory key directory has to go makes staging fail.
        let replacement = Output {
            graph: None,
            memory: vec![KeyValue::new("new", 2_i64), KeyValue::new("new/part-r-00000", 3_i64)],
        };
        assert!(storage.replace_output(&root, &replacement).is_err());

        assert!(storage.exists(&root.join("old").join("part-r-00000")));
        assert!(!storage.exists(&root.join("new")));
        assert!(!dir.path().join(".out.staging").exists());
        assert!(!dir.path().join(".out.previous").exists());
    }

    #[test]
    fn graph_read_back_matches_in_binary() {
        let dir = TempDir::new().unwrap();
        let storage = FileSystemStorage::open(StorageConfig {
            graph_format: GraphFormat::Binary,
            ..StorageConfig::default()
        });
        let location = root_in(&dir, "modern");
        storage.write_graph(&location, &modern_graph()).unwrap();
        assert_eq!(storage.read_graph(&location).unwrap(), modern_graph());
    }

    #[test]
    fn infinite_properties_read_back_from_json() {
        let dir = TempDir::new().unwrap();
        let storage = FileSystemStorage::new();
        let location = root_in(&dir, "distances");

        let mut graph = Graph::new();
        graph.add_vertex(StarVertex::new(1, "city").with_property("distance", 0.0));
        graph.add_vertex(StarVertex::new(2, "city").with_property("distance", f64::INFINITY));
        storage.write_graph(&location, &graph).unwrap();

        let read = storage.read_graph(&location).unwrap();
        assert_eq!(read, graph);
        assert_eq!(read.vertex(2).unwrap().property("distance"), Some(&Value::Float(f64::INFINITY)));
    }

    #[test]
    fn loose_edge_records_attach_to_their_source() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("edges.json");
        fs::write(
            &path,
            concat!(
                "{\"vertex\":{\"id\":1,\"label\":\"v\"}}\n",
                "{\"edge\":{\"source\":1,\"target\":2,\"label\":\"e\"}}\n",
                "{\"vertex\":{\"id\":2,\"label\":\"v\"}}\n",
            ),
        )
        .unwrap();

        let graph = FileSystemStorage::new().read_graph(&Location::from(path)).unwrap();
        assert_eq!(graph.vertex_count(), 2);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.vertex(1).unwrap().out_edges[0].target, 2);
    }

    #[test]
    fn memory_key_must_be_present() {
        let dir = TempDir::new().unwrap();
        let storage = FileSystemStorage::new();
        let root = root_in(&dir, "out");
        let output = Output {
            graph: None,
            memory: vec![KeyValue::new("a", Value::Bool(true))],
        };
        storage.write_output(&root, &output).unwrap();

        assert!(matches!(
            storage.head_memory(&root, "b", MemoryFormat::Sequence),
            Err(Error::NotFound { .. })
        ));
        let first = storage
            .head_memory(&root, "a", MemoryFormat::Object)
            .unwrap()
            .next()
            .unwrap()
            .unwrap();
        assert_eq!(first.value(), Some(&Value::Bool(true)));
    }
}
