//! Tensor bundle: dense edge index, node feature matrix and one-hot edge
//! features, written as Arrow IPC files.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, Int64Array, UInt8Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::ipc::writer::FileWriter;
use arrow::record_batch::RecordBatch;
use serde::{Deserialize, Serialize};

use crate::errors::{GraphError, Result};
use crate::graph::{Graph, IndexMap};
use crate::io::write_atomic;
use crate::node_attributes::{feature_names, FEATURE_COUNT};
use crate::vocab::EdgeType;

const EDGE_TYPES: usize = EdgeType::ALL.len();

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub num_nodes: usize,
    pub num_edges: usize,
    /// Edges per node, E / N.
    pub avg_edges: f64,
    pub feature_names: Vec<String>,
    pub edge_types: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct TensorBundle {
    pub index: IndexMap,
    pub src: Vec<i64>,
    pub dst: Vec<i64>,
    /// Row `i` belongs to node id `i`.
    pub node_feat: Vec<[f64; FEATURE_COUNT]>,
    pub edge_feat: Vec<[u8; EDGE_TYPES]>,
}

impl TensorBundle {
    /// Indexes `graph` afresh and lays out its tensors. Every indexed node must
    /// carry a record.
    pub fn build(graph: &Graph) -> Result<Self> {
        let index = graph.index_map();

        let node_feat = index
            .names()
            .iter()
            .map(|name| {
                graph
                    .node(name)
                    .map(|n| n.features())
                    .ok_or_else(|| GraphError::IncompleteGraph { node: name.clone() })
            })
            .collect::<Result<Vec<_>>>()?;

        let id = |name: &str| {
            index
                .id(name)
                .map(|i| i as i64)
                .ok_or_else(|| GraphError::IncompleteGraph { node: name.to_string() })
        };
        let mut src = Vec::with_capacity(graph.num_edges());
        let mut dst = Vec::with_capacity(graph.num_edges());
        let mut edge_feat = Vec::with_capacity(graph.num_edges());
        for edge in graph.edges() {
            src.push(id(&edge.source)?);
            dst.push(id(&edge.target)?);
            edge_feat.push(edge.edge_type.one_hot());
        }

        Ok(TensorBundle {
            index,
            src,
            dst,
            node_feat,
            edge_feat,
        })
    }

    pub fn num_nodes(&self) -> usize {
        self.node_feat.len()
    }

    pub fn num_edges(&self) -> usize {
        self.src.len()
    }

    pub fn summary(&self) -> Summary {
        let avg_edges = if self.num_nodes() == 0 {
            0.0
        } else {
            self.num_edges() as f64 / self.num_nodes() as f64
        };
        Summary {
            num_nodes: self.num_nodes(),
            num_edges: self.num_edges(),
            avg_edges,
            feature_names: feature_names(),
            edge_types: EdgeType::ALL.iter().map(|t| t.as_str().to_string()).collect(),
        }
    }

    pub fn edge_index_batch(&self) -> Result<RecordBatch> {
        let schema = Schema::new(vec![
            Field::new("src", DataType::Int64, false),
            Field::new("dst", DataType::Int64, false),
        ]);
        let columns: Vec<ArrayRef> = vec![
            Arc::new(Int64Array::from(self.src.clone())),
            Arc::new(Int64Array::from(self.dst.clone())),
        ];
        Ok(RecordBatch::try_new(Arc::new(schema), columns)?)
    }

    pub fn node_feat_batch(&self) -> Result<RecordBatch> {
        let names = feature_names();
        let schema = Schema::new(
            names
                .iter()
                .map(|n| Field::new(n, DataType::Float64, false))
                .collect::<Vec<_>>(),
        );
        let columns: Vec<ArrayRef> = (0..FEATURE_COUNT)
            .map(|col| {
                let values: Float64Array = self.node_feat.iter().map(|row| row[col]).collect();
                Arc::new(values) as ArrayRef
            })
            .collect();
        Ok(RecordBatch::try_new(Arc::new(schema), columns)?)
    }

    pub fn edge_feat_batch(&self) -> Result<RecordBatch> {
        let schema = Schema::new(
            EdgeType::ALL
                .iter()
                .map(|t| Field::new(t.as_str(), DataType::UInt8, false))
                .collect::<Vec<_>>(),
        );
        let columns: Vec<ArrayRef> = (0..EDGE_TYPES)
            .map(|col| {
                let values: UInt8Array = self.edge_feat.iter().map(|row| row[col]).collect();
                Arc::new(values) as ArrayRef
            })
            .collect();
        Ok(RecordBatch::try_new(Arc::new(schema), columns)?)
    }

    /// Writes the bundle into `dir` and returns its summary.
    pub fn write(&self, dir: &Path) -> Result<Summary> {
        write_ipc(&dir.join("edge_index.arrow"), &self.edge_index_batch()?)?;
        write_ipc(&dir.join("node_feat.arrow"), &self.node_feat_batch()?)?;
        write_ipc(&dir.join("edge_feat.arrow"), &self.edge_feat_batch()?)?;
        self.index.write(&dir.join("index_map.tsv"))?;

        let summary = self.summary();
        write_atomic(&dir.join("summary.json"), |w| {
            serde_json::to_writer_pretty(&mut *w, &summary)?;
            writeln!(w)?;
            Ok(())
        })?;
        log::info!(
            "exported {} nodes, {} edges ({:.2} edges per node) to {:?}",
            summary.num_nodes,
            summary.num_edges,
            summary.avg_edges,
            dir
        );
        Ok(summary)
    }
}

fn write_ipc(path: &Path, batch: &RecordBatch) -> Result<()> {
    write_atomic(path, |w| {
        let mut writer = FileWriter::try_new(w, &batch.schema())?;
        writer.write(batch)?;
        writer.finish()?;
        Ok(())
    })
}

/// Builds and writes the bundle for one graph.
pub fn export(graph: &Graph, dir: &Path) -> Result<Summary> {
    TensorBundle::build(graph)?.write(dir)
}
