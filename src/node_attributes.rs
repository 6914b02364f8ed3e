//! Per-node attribute reference: coordinates, type and the fixed attribute
//! block for every prepared node.

use std::collections::BTreeMap;
use std::io::BufRead;
use std::path::Path;

use crate::aggregate::AttributeRow;
use crate::diagnostics::Diagnostics;
use crate::errors::{GraphError, Result};
use crate::interval_set::IntervalSet;
use crate::io::{open_reader, write_rows};
use crate::vocab::{Attribute, NodeClass, NodeType};

/// 12 node-type columns, start, end, size, the attribute block, is_gene, is_tf.
pub const FEATURE_COUNT: usize = NodeType::ALL.len() + 3 + Attribute::COLUMNS + 2;

pub fn feature_names() -> Vec<String> {
    let mut names: Vec<String> = NodeType::ALL
        .iter()
        .map(|t| format!("type_{}", t.as_str()))
        .collect();
    names.extend(["start", "end", "size"].map(String::from));
    names.extend(Attribute::column_names());
    names.extend(["is_gene", "is_tf"].map(String::from));
    names
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeRecord {
    pub name: String,
    pub node_type: Option<NodeType>,
    pub chrom: String,
    pub start: u32,
    pub end: u32,
    pub attributes: [f64; Attribute::COLUMNS],
    pub class: NodeClass,
}

impl NodeRecord {
    pub fn new(name: impl Into<String>, node_type: Option<NodeType>, chrom: &str, start: u32, end: u32) -> Self {
        let name = name.into();
        let class = NodeClass::of(&name);
        NodeRecord {
            name,
            node_type,
            chrom: chrom.to_string(),
            start,
            end,
            attributes: [0.0; Attribute::COLUMNS],
            class,
        }
    }

    /// A node referenced by an edge but missing from the reference.
    pub fn zero(name: impl Into<String>) -> Self {
        NodeRecord::new(name, None, ".", 0, 0)
    }

    pub fn size(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    /// The same node under another name. The class derived from the original
    /// name is kept.
    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn set_attribute(&mut self, attribute: Attribute, values: &[f64]) {
        let col = attribute.column();
        for (offset, v) in values.iter().enumerate() {
            if let Some(slot) = self.attributes.get_mut(col + offset) {
                *slot = *v;
            }
        }
    }

    pub fn attribute(&self, attribute: Attribute) -> f64 {
        self.attributes[attribute.column()]
    }

    pub fn features(&self) -> [f64; FEATURE_COUNT] {
        let mut f = [0.0; FEATURE_COUNT];
        if let Some(t) = self.node_type {
            f[..NodeType::ALL.len()].copy_from_slice(&t.one_hot());
        }
        let mut i = NodeType::ALL.len();
        for v in [self.start as f64, self.end as f64, self.size() as f64] {
            f[i] = v;
            i += 1;
        }
        f[i..i + Attribute::COLUMNS].copy_from_slice(&self.attributes);
        i += Attribute::COLUMNS;
        f[i] = (self.class == NodeClass::Gene) as u8 as f64;
        f[i + 1] = (self.class == NodeClass::Tf) as u8 as f64;
        f
    }

    fn header() -> String {
        let mut cols = vec!["name", "node_type", "chrom", "start", "end", "size"]
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>();
        cols.extend(Attribute::column_names());
        cols.join("\t")
    }

    pub fn to_line(&self) -> String {
        let mut line = format!(
            "{}\t{}\t{}\t{}\t{}\t{}",
            self.name,
            self.node_type.map(|t| t.as_str()).unwrap_or("."),
            self.chrom,
            self.start,
            self.end,
            self.size()
        );
        for v in &self.attributes {
            line.push('\t');
            line.push_str(&v.to_string());
        }
        line
    }

    pub fn parse_line(line: &str, path: &str, line_no: usize) -> Result<Self> {
        let malformed = |reason: String| GraphError::MalformedInterval {
            path: path.to_string(),
            line: line_no,
            reason,
        };
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != 6 + Attribute::COLUMNS {
            return Err(malformed(format!(
                "expected {} columns, found {}",
                6 + Attribute::COLUMNS,
                fields.len()
            )));
        }
        let node_type = match fields[1] {
            "." => None,
            t => Some(t.parse::<NodeType>()?),
        };
        let coord = |s: &str| s.parse::<u32>().map_err(|_| malformed(format!("bad coordinate '{s}'")));
        let mut record = NodeRecord::new(fields[0], node_type, fields[2], coord(fields[3])?, coord(fields[4])?);
        for (slot, v) in record.attributes.iter_mut().zip(&fields[6..]) {
            *slot = v
                .parse()
                .map_err(|_| malformed(format!("bad attribute value '{v}'")))?;
        }
        Ok(record)
    }
}

/// Attribute reference for every prepared node, keyed by node name.
#[derive(Debug, Clone, Default)]
pub struct NodeAttributeTable {
    records: BTreeMap<String, NodeRecord>,
}

impl NodeAttributeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one node type. `rows` holds, per attribute, rows aligned with
    /// `nodes`; attributes without rows stay 0. A name already present keeps
    /// its first record.
    pub fn add_node_type(
        &mut self,
        node_type: NodeType,
        nodes: &IntervalSet,
        rows: &[(Attribute, Vec<AttributeRow>)],
    ) -> Result<()> {
        for (attribute, attribute_rows) in rows {
            if attribute_rows.len() != nodes.len() {
                return Err(GraphError::IncompleteBarrier {
                    stage: format!("aggregate {node_type}"),
                    expected: nodes.len(),
                    completed: attribute_rows.len(),
                    failed: vec![attribute.to_string()],
                });
            }
        }

        for (i, node) in nodes.iter().enumerate() {
            if self.records.contains_key(&node.name) {
                continue;
            }
            let mut record = NodeRecord::new(node.name.clone(), Some(node_type), &node.chrom, node.start, node.end);
            for (attribute, attribute_rows) in rows {
                record.set_attribute(*attribute, &attribute_rows[i].values);
            }
            self.records.insert(node.name.clone(), record);
        }
        Ok(())
    }

    pub fn insert(&mut self, record: NodeRecord) {
        self.records.entry(record.name.clone()).or_insert(record);
    }

    pub fn get(&self, name: &str) -> Option<&NodeRecord> {
        self.records.get(name)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeRecord> {
        self.records.values()
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let header = NodeRecord::header();
        write_rows(path, Some(&header), self.records.values().map(NodeRecord::to_line))
    }

    pub fn load(path: &Path, diagnostics: &mut Diagnostics) -> Result<Self> {
        let source = path.display().to_string();
        let mut table = NodeAttributeTable::new();
        for (n, line) in open_reader(path)?.lines().enumerate().skip(1) {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            match NodeRecord::parse_line(&line, &source, n + 1) {
                Ok(record) => table.insert(record),
                Err(e) if e.is_recoverable() => diagnostics.record(&source, &e),
                Err(e) => return Err(e),
            }
        }
        Ok(table)
    }
}
