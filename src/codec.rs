//! Wire formats for persisted graphs and memory.
//!
//! Graph artifacts are either newline-delimited JSON records or
//! length-prefixed bincode frames. Memory artifacts use a small sequence
//! container:
//!
//! ```text
//! "SEQ" | version: u8 | [header_len: u32 | header]   (header since version 2)
//! ( frame_len: u32 | bincode((key: Value, value: Value)) )*
//! ```
//!
//! All integers are little endian. Version 1 files carried no header. The
//! current reader insists on a version 2 header declaring the key and value
//! types; the legacy object reader ignores the header and decodes both halves
//! of every frame as untyped objects, so it reads files of either version.

use crate::{Error, KeyValue, Record, Result, Value};

use serde::{Deserialize, Serialize};

use std::fmt;
use std::io::{self, BufRead, Read, Write};

const SEQUENCE_MAGIC: &[u8; 3] = b"SEQ";
const LEGACY_VERSION: u8 = 1;
const CURRENT_VERSION: u8 = 2;
const KEY_TYPE: &str = "string";
const VALUE_TYPE: &str = "value";
const MAX_FRAME_LEN: usize = 1 << 28;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphFormat {
    #[default]
    Json,
    Binary,
}

impl GraphFormat {
    pub fn name(&self) -> &'static str {
        match self {
            GraphFormat::Json => "json",
            GraphFormat::Binary => "binary",
        }
    }
}

impl fmt::Display for GraphFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How memory entries are decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryFormat {
    /// Typed sequence container, the format written today.
    #[default]
    Sequence,
    /// Deprecated untyped object reader. Still needed for files written
    /// before the container header existed.
    Object,
}

impl MemoryFormat {
    pub fn name(&self) -> &'static str {
        match self {
            MemoryFormat::Sequence => "sequence",
            MemoryFormat::Object => "object",
        }
    }
}

impl fmt::Display for MemoryFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SequenceHeader {
    key_type: String,
    value_type: String,
}

fn encode_err(err: impl fmt::Display) -> Error {
    Error::Encode(err.to_string())
}

fn write_frame<W: Write>(writer: &mut W, bytes: &[u8]) -> io::Result<()> {
    let len = u32::try_from(bytes.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "frame larger than 4 GiB"))?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(bytes)
}

/// Reads one length-prefixed frame. `Ok(None)` only on a clean end of input
/// at a frame boundary.
fn read_frame<R: Read>(reader: &mut R) -> io::Result<Option<Vec<u8>>> {
    let mut len = [0_u8; 4];
    let mut filled = 0;
    while filled < len.len() {
        match reader.read(&mut len[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    let len = u32::from_le_bytes(len) as usize;
    if len > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {} bytes exceeds the {} byte limit", len, MAX_FRAME_LEN),
        ));
    }
    let mut frame = vec![0_u8; len];
    reader.read_exact(&mut frame)?;
    Ok(Some(frame))
}

pub fn write_graph_records<'a, W, I>(format: GraphFormat, writer: &mut W, records: I) -> Result<()>
where
    W: Write,
    I: IntoIterator<Item = &'a Record>,
{
    for record in records {
        match format {
            GraphFormat::Json => {
                serde_json::to_writer(&mut *writer, record).map_err(encode_err)?;
                writer.write_all(b"\n").map_err(encode_err)?;
            }
            GraphFormat::Binary => {
                let bytes = bincode::serialize(record).map_err(encode_err)?;
                write_frame(writer, &bytes).map_err(encode_err)?;
            }
        }
    }
    Ok(())
}

/// Lazily decodes graph records from one artifact file.
pub struct GraphReader<R> {
    reader: R,
    format: GraphFormat,
    location: String,
    line: String,
    failed: bool,
}

impl<R: BufRead> GraphReader<R> {
    pub fn new(reader: R, format: GraphFormat, location: impl Into<String>) -> Self {
        GraphReader {
            reader,
            format,
            location: location.into(),
            line: String::new(),
            failed: false,
        }
    }

    fn decode_error(&mut self, reason: impl ToString) -> Error {
        self.failed = true;
        Error::decode(&self.location, self.format.name(), reason)
    }

    fn next_json(&mut self) -> Option<Result<Record>> {
        loop {
            self.line.clear();
            match self.reader.read_line(&mut self.line) {
                Ok(0) => return None,
                Ok(_) => {
                    let line = self.line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    return Some(match serde_json::from_str(line) {
                        Ok(record) => Ok(record),
                        Err(e) => Err(self.decode_error(e)),
                    });
                }
                Err(e) => return Some(Err(self.decode_error(e))),
            }
        }
    }

    fn next_binary(&mut self) -> Option<Result<Record>> {
        match read_frame(&mut self.reader) {
            Ok(None) => None,
            Ok(Some(frame)) => Some(match bincode::deserialize(&frame) {
                Ok(record) => Ok(record),
                Err(e) => Err(self.decode_error(e)),
            }),
            Err(e) => Some(Err(self.decode_error(e))),
        }
    }
}

impl<R: BufRead> Iterator for GraphReader<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.format {
            GraphFormat::Json => self.next_json(),
            GraphFormat::Binary => self.next_binary(),
        }
    }
}

/// Writes memory entries. `MemoryFormat::Object` produces the old headerless
/// layout.
pub fn write_memory_entries<'a, W, I>(format: MemoryFormat, writer: &mut W, entries: I) -> Result<()>
where
    W: Write,
    I: IntoIterator<Item = &'a KeyValue>,
{
    writer.write_all(SEQUENCE_MAGIC).map_err(encode_err)?;
    match format {
        MemoryFormat::Sequence => {
            writer.write_all(&[CURRENT_VERSION]).map_err(encode_err)?;
            let header = SequenceHeader {
                key_type: KEY_TYPE.to_string(),
                value_type: VALUE_TYPE.to_string(),
            };
            let bytes = bincode::serialize(&header).map_err(encode_err)?;
            write_frame(writer, &bytes).map_err(encode_err)?;
        }
        MemoryFormat::Object => writer.write_all(&[LEGACY_VERSION]).map_err(encode_err)?,
    }

    for entry in entries {
        let pair = (Value::String(entry.key.clone()), &entry.value);
        let bytes = bincode::serialize(&pair).map_err(encode_err)?;
        write_frame(writer, &bytes).map_err(encode_err)?;
    }
    Ok(())
}

/// Lazily decodes memory entries from one artifact file.
pub struct MemoryReader<R> {
    reader: R,
    format: MemoryFormat,
    location: String,
    opened: bool,
    failed: bool,
}

impl<R: Read> MemoryReader<R> {
    pub fn new(reader: R, format: MemoryFormat, location: impl Into<String>) -> Self {
        MemoryReader {
            reader,
            format,
            location: location.into(),
            opened: false,
            failed: false,
        }
    }

    fn decode_error(&mut self, reason: impl ToString) -> Error {
        self.failed = true;
        Error::decode(&self.location, self.format.name(), reason)
    }

    fn read_preamble(&mut self) -> Result<()> {
        let mut magic = [0_u8; 4];
        if let Err(e) = self.reader.read_exact(&mut magic) {
            return Err(self.decode_error(format!("missing container preamble: {}", e)));
        }
        if &magic[..3] != SEQUENCE_MAGIC {
            return Err(self.decode_error("not a sequence container"));
        }

        let version = magic[3];
        match (self.format, version) {
            (MemoryFormat::Sequence, CURRENT_VERSION) => {
                let header: SequenceHeader = match read_frame(&mut self.reader) {
                    Ok(Some(bytes)) => match bincode::deserialize(&bytes) {
                        Ok(header) => header,
                        Err(e) => return Err(self.decode_error(e)),
                    },
                    Ok(None) => return Err(self.decode_error("missing container header")),
                    Err(e) => return Err(self.decode_error(e)),
                };
                if header.key_type != KEY_TYPE || header.value_type != VALUE_TYPE {
                    return Err(self.decode_error(format!(
                        "unexpected entry types {}/{}",
                        header.key_type, header.value_type
                    )));
                }
            }
            (MemoryFormat::Sequence, v) => {
                return Err(self.decode_error(format!("unsupported container version {}", v)));
            }
            (MemoryFormat::Object, LEGACY_VERSION) => (),
            (MemoryFormat::Object, CURRENT_VERSION) => {
                if let Err(e) = read_frame(&mut self.reader) {
                    return Err(self.decode_error(e));
                }
            }
            (MemoryFormat::Object, v) => {
                return Err(self.decode_error(format!("unsupported container version {}", v)));
            }
        }
        Ok(())
    }

    fn decode_entry(&mut self, frame: &[u8]) -> Result<KeyValue> {
        let (key, value): (Value, Value) = match bincode::deserialize(frame) {
            Ok(pair) => pair,
            Err(e) => return Err(self.decode_error(e)),
        };

        let key = match (self.format, key) {
            (_, Value::String(key)) => key,
            (MemoryFormat::Object, other) => other.to_string(),
            (MemoryFormat::Sequence, other) => {
                return Err(self.decode_error(format!("entry key is a {}", other.type_name())));
            }
        };
        Ok(KeyValue { key, value })
    }
}

impl<R: Read> Iterator for MemoryReader<R> {
    type Item = Result<KeyValue>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        if !self.opened {
            self.opened = true;
            if let Err(e) = self.read_preamble() {
                return Some(Err(e));
            }
        }

        match read_frame(&mut self.reader) {
            Ok(None) => None,
            Ok(Some(frame)) => Some(self.decode_entry(&frame)),
            Err(e) => Some(Err(self.decode_error(e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Edge, StarVertex};

    use std::io::Cursor;

    fn entries() -> Vec<KeyValue> {
        vec![
            KeyValue::new("clusterCount", 2_i64),
            KeyValue::new("ratio", 0.5_f64),
        ]
    }

    fn sequence_bytes(format: MemoryFormat) -> Vec<u8> {
        let mut bytes = Vec::new();
        write_memory_entries(format, &mut bytes, &entries()).unwrap();
        bytes
    }

    fn read_all(bytes: &[u8], format: MemoryFormat) -> Result<Vec<KeyValue>> {
        MemoryReader::new(Cursor::new(bytes), format, "mem").collect()
    }

    #[test]
    fn both_readers_decode_current_files() {
        let bytes = sequence_bytes(MemoryFormat::Sequence);
        assert_eq!(read_all(&bytes, MemoryFormat::Sequence).unwrap(), entries());
        assert_eq!(read_all(&bytes, MemoryFormat::Object).unwrap(), entries());
    }

    #[test]
    fn headerless_files_need_the_object_reader() {
        let bytes = sequence_bytes(MemoryFormat::Object);
        assert_eq!(read_all(&bytes, MemoryFormat::Object).unwrap(), entries());
        assert!(matches!(
            read_all(&bytes, MemoryFormat::Sequence),
            Err(Error::Decode { format: "sequence", .. })
        ));
    }

    #[test]
    fn truncated_frames_are_decode_errors() {
        let bytes = sequence_bytes(MemoryFormat::Sequence);
        let truncated = &bytes[..bytes.len() - 3];
        let results: Vec<_> = MemoryReader::new(Cursor::new(truncated), MemoryFormat::Sequence, "mem").collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(Error::Decode { .. })));
    }

    #[test]
    fn text_is_not_a_container() {
        let text = b"{\"entry\":{}}\n";
        assert!(matches!(
            read_all(text, MemoryFormat::Object),
            Err(Error::Decode { .. })
        ));
    }

    #[test]
    fn graph_records_survive_both_formats() {
        let mut vertex = StarVertex::new(1, "person").with_property("name", "marko");
        vertex.out_edges.push(Edge::new(1, 2, "knows").with_property("weight", 0.5));
        let records = vec![Record::Vertex(vertex), Record::Vertex(StarVertex::new(2, "person"))];

        for format in [GraphFormat::Json, GraphFormat::Binary] {
            let mut bytes = Vec::new();
            write_graph_records(format, &mut bytes, &records).unwrap();
            let decoded: Vec<Record> = GraphReader::new(Cursor::new(bytes), format, "g")
                .collect::<Result<_>>()
                .unwrap();
            assert_eq!(decoded, records);
        }
    }

    #[test]
    fn unreachable_distances_survive_json() {
        let records = vec![
            Record::Vertex(StarVertex::new(1, "city").with_property("distance", f64::INFINITY)),
            Record::Vertex(StarVertex::new(2, "city").with_property("distance", f64::NEG_INFINITY)),
        ];

        let mut bytes = Vec::new();
        write_graph_records(GraphFormat::Json, &mut bytes, &records).unwrap();
        let decoded: Vec<Record> = GraphReader::new(Cursor::new(bytes), GraphFormat::Json, "g")
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(decoded, records);
    }

    #[test]
    fn json_reader_skips_blank_lines_and_stops_on_garbage() {
        let text = "\n{\"vertex\":{\"id\":7,\"label\":\"x\"}}\n\nnot json\n{\"vertex\":{\"id\":8,\"label\":\"x\"}}\n";
        let results: Vec<_> = GraphReader::new(Cursor::new(text), GraphFormat::Json, "g").collect();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap().as_vertex().map(|v| v.id), Some(7));
        assert!(matches!(results[1], Err(Error::Decode { format: "json", .. })));
    }
}
