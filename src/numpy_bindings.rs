use std::path::PathBuf;

use numpy::ndarray::Array2;
use numpy::{IntoPyArray, PyArray1, PyArray2, PyReadonlyArray1};
use pyo3::exceptions::PyRuntimeError;
use pyo3::prelude::*;
use pyo3::wrap_pyfunction;

use crate::diagnostics::Diagnostics;
use crate::errors::GraphError;
use crate::export::TensorBundle;
use crate::graph::Graph;
use crate::merge::sweep_line_merge;
use crate::node_attributes::FEATURE_COUNT;
use crate::overlaps;
use crate::vocab::EdgeType;

fn to_py(e: GraphError) -> PyErr {
    PyRuntimeError::new_err(e.to_string())
}

#[pyfunction]
#[pyo3(signature = (chrs, starts, ends, chrs2, starts2, ends2, slack=0))]
pub fn chromsweep_numpy(
    py: Python,
    chrs: PyReadonlyArray1<u32>,
    starts: PyReadonlyArray1<i64>,
    ends: PyReadonlyArray1<i64>,
    chrs2: PyReadonlyArray1<u32>,
    starts2: PyReadonlyArray1<i64>,
    ends2: PyReadonlyArray1<i64>,
    slack: i64,
) -> PyResult<(Py<PyArray1<usize>>, Py<PyArray1<usize>>)> {
    let pairs = overlaps::sweep_line_overlaps(
        chrs.as_slice()?,
        starts.as_slice()?,
        ends.as_slice()?,
        chrs2.as_slice()?,
        starts2.as_slice()?,
        ends2.as_slice()?,
        slack,
    );
    let (idx, idx2): (Vec<usize>, Vec<usize>) = pairs.into_iter().map(|p| (p.idx, p.idx2)).unzip();
    Ok((
        idx.into_pyarray(py).to_owned().into(),
        idx2.into_pyarray(py).to_owned().into(),
    ))
}

#[pyfunction]
#[pyo3(signature = (chrs, starts, ends, distance=0))]
pub fn merge_numpy(
    chrs: PyReadonlyArray1<u32>,
    starts: PyReadonlyArray1<i64>,
    ends: PyReadonlyArray1<i64>,
    distance: i64,
    py: Python,
) -> PyResult<(Py<PyArray1<usize>>, Py<PyArray1<i64>>, Py<PyArray1<i64>>, Py<PyArray1<usize>>)> {
    let (indices, starts, ends, counts) = sweep_line_merge(chrs.as_slice()?, starts.as_slice()?, ends.as_slice()?, distance);
    Ok((
        indices.into_pyarray(py).to_owned().into(),
        starts.into_pyarray(py).to_owned().into(),
        ends.into_pyarray(py).to_owned().into(),
        counts.into_pyarray(py).to_owned().into(),
    ))
}

/// Node names, edge_index (src, dst), node_feat and edge_feat of the graph
/// stored in `graph_dir`.
#[pyfunction]
pub fn tensor_bundle_numpy(
    graph_dir: PathBuf,
    py: Python,
) -> PyResult<(
    Vec<String>,
    Py<PyArray1<i64>>,
    Py<PyArray1<i64>>,
    Py<PyArray2<f64>>,
    Py<PyArray2<u8>>,
)> {
    let mut diagnostics = Diagnostics::new();
    let graph = Graph::read(&graph_dir, &mut diagnostics).map_err(to_py)?;
    let bundle = TensorBundle::build(&graph).map_err(to_py)?;
    diagnostics.log_summary("tensor bundle");

    let n = bundle.num_nodes();
    let e = bundle.num_edges();
    let node_feat = Array2::from_shape_vec(
        (n, FEATURE_COUNT),
        bundle.node_feat.iter().flatten().copied().collect(),
    )
    .map_err(|err| PyRuntimeError::new_err(err.to_string()))?;
    let edge_feat = Array2::from_shape_vec(
        (e, EdgeType::ALL.len()),
        bundle.edge_feat.iter().flatten().copied().collect(),
    )
    .map_err(|err| PyRuntimeError::new_err(err.to_string()))?;

    Ok((
        bundle.index.names().to_vec(),
        bundle.src.into_pyarray(py).to_owned().into(),
        bundle.dst.into_pyarray(py).to_owned().into(),
        node_feat.into_pyarray(py).to_owned().into(),
        edge_feat.into_pyarray(py).to_owned().into(),
    ))
}

#[pymodule]
fn ruomics(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(chromsweep_numpy, m)?)?;
    m.add_function(wrap_pyfunction!(merge_numpy, m)?)?;
    m.add_function(wrap_pyfunction!(tensor_bundle_numpy, m)?)?;
    Ok(())
}
