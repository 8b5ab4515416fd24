//! Per-KB knowledge graph store.
//!
//! Entities and relations extracted at ingest time, held in a petgraph
//! stable graph with a label index and persisted as GraphML under the KB's
//! working directory. The extractor living upstream of this store is simple
//! by design; the store, persistence, and traversal are the real surface.

#[cfg(test)]
mod tests;

use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use petgraph::Undirected;
use petgraph::stable_graph::{NodeIndex, StableGraph};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from the graph store.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Disk I/O failed.
    #[error("graph storage failure at {path}: {source}")]
    Storage {
        /// Path involved.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The GraphML file could not be parsed.
    #[error("corrupted graph file at {path}: {detail}")]
    Corrupt {
        /// Path involved.
        path: PathBuf,
        /// Parse detail.
        detail: String,
    },
}

/// An extracted entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphNode {
    /// Entity label (unique within one graph).
    pub label: String,
    /// Entity kind tag.
    pub kind: String,
    /// Ids of chunks the entity appeared in.
    pub chunk_ids: Vec<String>,
}

/// A relation between two entities.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphEdge {
    /// Relation description.
    pub relation: String,
    /// Accumulated co-occurrence weight.
    pub weight: f32,
}

/// A subgraph extraction result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subgraph {
    /// Nodes in the neighborhood.
    pub nodes: Vec<GraphNode>,
    /// Edges among those nodes as (source label, target label, edge).
    pub edges: Vec<(String, String, GraphEdge)>,
}

/// Node/edge counts.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct GraphStats {
    /// Node count.
    pub nodes: usize,
    /// Edge count.
    pub edges: usize,
}

/// The store: an undirected labeled graph with GraphML persistence.
#[derive(Debug)]
pub struct GraphStore {
    path: PathBuf,
    graph: StableGraph<GraphNode, GraphEdge, Undirected>,
    labels: HashMap<String, NodeIndex>,
}

impl GraphStore {
    /// Opens the store, parsing the GraphML file when present.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, GraphError> {
        let path = path.into();
        let mut store = Self {
            path: path.clone(),
            graph: StableGraph::default(),
            labels: HashMap::new(),
        };

        if path.exists() && fs::metadata(&path).map(|m| m.len() > 0).unwrap_or(false) {
            store.load()?;
        } else {
            store.persist()?;
        }
        Ok(store)
    }

    /// Counts.
    pub fn stats(&self) -> GraphStats {
        GraphStats {
            nodes: self.graph.node_count(),
            edges: self.graph.edge_count(),
        }
    }

    /// Inserts or merges a node by label.
    pub fn upsert_node(&mut self, label: &str, kind: &str, chunk_id: &str) -> NodeIndex {
        match self.labels.get(label) {
            Some(&idx) => {
                let node = &mut self.graph[idx];
                if !node.chunk_ids.iter().any(|c| c == chunk_id) {
                    node.chunk_ids.push(chunk_id.to_string());
                }
                idx
            }
            None => {
                let idx = self.graph.add_node(GraphNode {
                    label: label.to_string(),
                    kind: kind.to_string(),
                    chunk_ids: vec![chunk_id.to_string()],
                });
                self.labels.insert(label.to_string(), idx);
                idx
            }
        }
    }

    /// Inserts or strengthens an edge between two labels.
    pub fn upsert_edge(&mut self, a: &str, b: &str, relation: &str, weight: f32) {
        let (Some(&ia), Some(&ib)) = (self.labels.get(a), self.labels.get(b)) else {
            return;
        };
        if ia == ib {
            return;
        }
        match self.graph.find_edge(ia, ib) {
            Some(edge) => {
                self.graph[edge].weight += weight;
            }
            None => {
                self.graph.add_edge(
                    ia,
                    ib,
                    GraphEdge {
                        relation: relation.to_string(),
                        weight,
                    },
                );
            }
        }
    }

    /// Breadth-first neighborhood of `label` up to `depth` hops.
    pub fn neighborhood(&self, label: &str, depth: usize) -> Option<Subgraph> {
        let &start = self.labels.get(label)?;

        let mut seen: HashSet<NodeIndex> = HashSet::new();
        let mut queue: VecDeque<(NodeIndex, usize)> = VecDeque::new();
        seen.insert(start);
        queue.push_back((start, 0));

        while let Some((idx, dist)) = queue.pop_front() {
            if dist >= depth {
                continue;
            }
            for neighbor in self.graph.neighbors(idx) {
                if seen.insert(neighbor) {
                    queue.push_back((neighbor, dist + 1));
                }
            }
        }

        let mut nodes: Vec<GraphNode> = seen.iter().map(|&i| self.graph[i].clone()).collect();
        nodes.sort_by(|a, b| a.label.cmp(&b.label));

        let mut edges = Vec::new();
        for edge in self.graph.edge_indices() {
            let Some((a, b)) = self.graph.edge_endpoints(edge) else {
                continue;
            };
            if seen.contains(&a) && seen.contains(&b) {
                edges.push((
                    self.graph[a].label.clone(),
                    self.graph[b].label.clone(),
                    self.graph[edge].clone(),
                ));
            }
        }
        edges.sort_by(|(a1, b1, _), (a2, b2, _)| a1.cmp(a2).then_with(|| b1.cmp(b2)));

        Some(Subgraph { nodes, edges })
    }

    /// All node labels, strongest-connected first.
    pub fn labels_by_degree(&self) -> Vec<(String, usize)> {
        let mut labels: Vec<(String, usize)> = self
            .graph
            .node_indices()
            .map(|i| (self.graph[i].label.clone(), self.graph.neighbors(i).count()))
            .collect();
        labels.sort_by(|(la, da), (lb, db)| db.cmp(da).then_with(|| la.cmp(lb)));
        labels
    }

    /// Removes all nodes introduced only by the given chunks.
    pub fn remove_chunks(&mut self, chunk_ids: &HashSet<String>) {
        let doomed: Vec<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|&i| {
                let node = &self.graph[i];
                node.chunk_ids.iter().all(|c| chunk_ids.contains(c))
            })
            .collect();
        for idx in doomed {
            let label = self.graph[idx].label.clone();
            self.graph.remove_node(idx);
            self.labels.remove(&label);
        }
        for idx in self.graph.node_indices().collect::<Vec<_>>() {
            self.graph[idx].chunk_ids.retain(|c| !chunk_ids.contains(c));
        }
    }

    /// Drops the whole graph and persists the empty file.
    pub fn clear(&mut self) -> Result<GraphStats, GraphError> {
        let stats = self.stats();
        self.graph = StableGraph::default();
        self.labels.clear();
        self.persist()?;
        Ok(stats)
    }

    // -- persistence --

    /// Writes the graph as GraphML (atomic rename).
    pub fn persist(&self) -> Result<(), GraphError> {
        let mut writer = quick_xml::Writer::new_with_indent(Vec::new(), b' ', 2);

        let io_err = |e: std::io::Error| GraphError::Storage {
            path: self.path.clone(),
            source: e,
        };

        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(|e| io_err(std::io::Error::other(e)))?;

        let mut graphml = BytesStart::new("graphml");
        graphml.push_attribute(("xmlns", "http://graphml.graphdrawing.org/xmlns"));
        writer
            .write_event(Event::Start(graphml))
            .map_err(|e| io_err(std::io::Error::other(e)))?;

        for (id, name) in [("d0", "kind"), ("d1", "chunks"), ("d2", "relation"), ("d3", "weight")] {
            let mut key = BytesStart::new("key");
            key.push_attribute(("id", id));
            key.push_attribute(("attr.name", name));
            key.push_attribute(("for", if id == "d2" || id == "d3" { "edge" } else { "node" }));
            writer
                .write_event(Event::Empty(key))
                .map_err(|e| io_err(std::io::Error::other(e)))?;
        }

        let mut graph_el = BytesStart::new("graph");
        graph_el.push_attribute(("edgedefault", "undirected"));
        writer
            .write_event(Event::Start(graph_el))
            .map_err(|e| io_err(std::io::Error::other(e)))?;

        let write_data = |writer: &mut quick_xml::Writer<Vec<u8>>,
                          key: &str,
                          value: &str|
         -> Result<(), std::io::Error> {
            let mut data = BytesStart::new("data");
            data.push_attribute(("key", key));
            writer
                .write_event(Event::Start(data))
                .map_err(std::io::Error::other)?;
            writer
                .write_event(Event::Text(BytesText::new(value)))
                .map_err(std::io::Error::other)?;
            writer
                .write_event(Event::End(BytesEnd::new("data")))
                .map_err(std::io::Error::other)?;
            Ok(())
        };

        for idx in self.graph.node_indices() {
            let node = &self.graph[idx];
            let mut el = BytesStart::new("node");
            el.push_attribute(("id", node.label.as_str()));
            writer
                .write_event(Event::Start(el))
                .map_err(|e| io_err(std::io::Error::other(e)))?;
            write_data(&mut writer, "d0", &node.kind).map_err(io_err)?;
            write_data(&mut writer, "d1", &node.chunk_ids.join(";")).map_err(io_err)?;
            writer
                .write_event(Event::End(BytesEnd::new("node")))
                .map_err(|e| io_err(std::io::Error::other(e)))?;
        }

        for edge in self.graph.edge_indices() {
            let Some((a, b)) = self.graph.edge_endpoints(edge) else {
                continue;
            };
            let data = &self.graph[edge];
            let mut el = BytesStart::new("edge");
            el.push_attribute(("source", self.graph[a].label.as_str()));
            el.push_attribute(("target", self.graph[b].label.as_str()));
            writer
                .write_event(Event::Start(el))
                .map_err(|e| io_err(std::io::Error::other(e)))?;
            write_data(&mut writer, "d2", &data.relation).map_err(io_err)?;
            write_data(&mut writer, "d3", &data.weight.to_string()).map_err(io_err)?;
            writer
                .write_event(Event::End(BytesEnd::new("edge")))
                .map_err(|e| io_err(std::io::Error::other(e)))?;
        }

        writer
            .write_event(Event::End(BytesEnd::new("graph")))
            .map_err(|e| io_err(std::io::Error::other(e)))?;
        writer
            .write_event(Event::End(BytesEnd::new("graphml")))
            .map_err(|e| io_err(std::io::Error::other(e)))?;

        let bytes = writer.into_inner();
        let dir = self
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(io_err)?;
        tmp.write_all(&bytes).map_err(io_err)?;
        tmp.persist(&self.path).map_err(|e| io_err(e.error))?;
        Ok(())
    }

    fn load(&mut self) -> Result<(), GraphError> {
        let raw = fs::read_to_string(&self.path).map_err(|e| GraphError::Storage {
            path: self.path.clone(),
            source: e,
        })?;
        let corrupt = |detail: String| GraphError::Corrupt {
            path: self.path.clone(),
            detail,
        };

        let mut reader = quick_xml::Reader::from_str(&raw);
        reader.config_mut().trim_text(true);

        #[derive(Default)]
        struct PendingNode {
            id: String,
            kind: String,
            chunks: Vec<String>,
        }
        #[derive(Default)]
        struct PendingEdge {
            source: String,
            target: String,
            relation: String,
            weight: f32,
        }

        let mut node: Option<PendingNode> = None;
        let mut edge: Option<PendingEdge> = None;
        let mut data_key: Option<String> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(el)) | Ok(Event::Empty(el)) => {
                    let name = String::from_utf8_lossy(el.name().as_ref()).to_string();
                    let attr = |key: &str| -> Option<String> {
                        el.attributes().flatten().find_map(|a| {
                            (String::from_utf8_lossy(a.key.as_ref()) == key)
                                .then(|| String::from_utf8_lossy(&a.value).to_string())
                        })
                    };
                    match name.as_str() {
                        "node" => {
                            node = Some(PendingNode {
                                id: attr("id").ok_or_else(|| corrupt("node without id".into()))?,
                                ..Default::default()
                            });
                        }
                        "edge" => {
                            edge = Some(PendingEdge {
                                source: attr("source")
                                    .ok_or_else(|| corrupt("edge without source".into()))?,
                                target: attr("target")
                                    .ok_or_else(|| corrupt("edge without target".into()))?,
                                weight: 1.0,
                                ..Default::default()
                            });
                        }
                        "data" => {
                            data_key = attr("key");
                        }
                        _ => {}
                    }
                }
                Ok(Event::Text(text)) => {
                    let value = text
                        .unescape()
                        .map_err(|e| corrupt(e.to_string()))?
                        .to_string();
                    match data_key.as_deref() {
                        Some("d0") => {
                            if let Some(node) = node.as_mut() {
                                node.kind = value;
                            }
                        }
                        Some("d1") => {
                            if let Some(node) = node.as_mut() {
                                node.chunks = value
                                    .split(';')
                                    .filter(|s| !s.is_empty())
                                    .map(str::to_string)
                                    .collect();
                            }
                        }
                        Some("d2") => {
                            if let Some(edge) = edge.as_mut() {
                                edge.relation = value;
                            }
                        }
                        Some("d3") => {
                            if let Some(edge) = edge.as_mut() {
                                edge.weight = value.parse().unwrap_or(1.0);
                            }
                        }
                        _ => {}
                    }
                }
                Ok(Event::End(el)) => {
                    match el.name().as_ref() {
                        b"node" => {
                            if let Some(pending) = node.take() {
                                let idx = self.graph.add_node(GraphNode {
                                    label: pending.id.clone(),
                                    kind: pending.kind,
                                    chunk_ids: pending.chunks,
                                });
                                self.labels.insert(pending.id, idx);
                            }
                        }
                        b"edge" => {
                            if let Some(pending) = edge.take() {
                                let (Some(&a), Some(&b)) = (
                                    self.labels.get(&pending.source),
                                    self.labels.get(&pending.target),
                                ) else {
                                    return Err(corrupt(format!(
                                        "edge references unknown node: {} -> {}",
                                        pending.source, pending.target
                                    )));
                                };
                                self.graph.add_edge(
                                    a,
                                    b,
                                    GraphEdge {
                                        relation: pending.relation,
                                        weight: pending.weight,
                                    },
                                );
                            }
                        }
                        b"data" => data_key = None,
                        _ => {}
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => return Err(corrupt(e.to_string())),
            }
        }
        Ok(())
    }
}
