//! Device residency for the flat index.
//!
//! A [`DeviceMatrix`] mirrors the host matrix as a candle tensor and scores
//! queries with one matmul. Opening a device that this build was not compiled
//! for (`cuda`, `metal` features) fails with [`Error::Accelerator`].
use std::fmt;
use std::str::FromStr;

use candle_core::{Device, Tensor};

use sectrag_core::error::{Error, Result};
use sectrag_core::types::Metric;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accelerator {
    /// candle's host backend; same tensor path, no GPU needed.
    Cpu,
    Cuda(usize),
    Metal(usize),
}

impl Accelerator {
    pub fn open(self) -> Result<Device> {
        match self {
            Accelerator::Cpu => Ok(Device::Cpu),
            Accelerator::Cuda(ordinal) => Device::new_cuda(ordinal).map_err(accel_err),
            Accelerator::Metal(ordinal) => Device::new_metal(ordinal).map_err(accel_err),
        }
    }
}

impl fmt::Display for Accelerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Accelerator::Cpu => f.write_str("cpu"),
            Accelerator::Cuda(i) => write!(f, "cuda:{i}"),
            Accelerator::Metal(i) => write!(f, "metal:{i}"),
        }
    }
}

impl FromStr for Accelerator {
    type Err = Error;

    /// `cpu`, `cuda`, `cuda:N`, `metal`, `metal:N`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_ascii_lowercase();
        let (kind, ordinal) = match s.split_once(':') {
            Some((kind, n)) => {
                let n = n.parse::<usize>().map_err(|_| Error::Config(format!("bad device ordinal in '{s}'")))?;
                (kind.to_string(), n)
            }
            None => (s.clone(), 0),
        };
        match kind.as_str() {
            "cpu" => Ok(Accelerator::Cpu),
            "cuda" | "gpu" => Ok(Accelerator::Cuda(ordinal)),
            "metal" | "mps" => Ok(Accelerator::Metal(ordinal)),
            _ => Err(Error::Config(format!("unknown accelerator '{s}'"))),
        }
    }
}

fn accel_err(e: candle_core::Error) -> Error { Error::Accelerator(e.to_string()) }

/// Row-major `(rows, dim)` matrix resident on a candle device, plus its
/// squared row norms for L2 scoring.
#[derive(Debug, Clone)]
pub struct DeviceMatrix {
    accelerator: Accelerator,
    device: Device,
    rows: usize,
    dim: usize,
    matrix: Tensor,
    sq_norms: Tensor,
}

impl DeviceMatrix {
    pub fn upload(accelerator: Accelerator, data: &[f32], rows: usize, dim: usize) -> Result<Self> {
        let device = accelerator.open()?;
        let matrix = Tensor::from_slice(data, (rows, dim), &device).map_err(accel_err)?;
        let sq_norms = matrix.sqr().and_then(|m| m.sum_keepdim(1)).map_err(accel_err)?;
        Ok(Self { accelerator, device, rows, dim, matrix, sq_norms })
    }

    pub fn accelerator(&self) -> Accelerator { self.accelerator }

    pub fn rows(&self) -> usize { self.rows }

    /// Append `rows` more rows. On failure the matrix is left as it was.
    pub fn append(&mut self, data: &[f32], rows: usize) -> Result<()> {
        let extra = Tensor::from_slice(data, (rows, self.dim), &self.device).map_err(accel_err)?;
        let extra_norms = extra.sqr().and_then(|m| m.sum_keepdim(1)).map_err(accel_err)?;
        let matrix = Tensor::cat(&[&self.matrix, &extra], 0).map_err(accel_err)?;
        let sq_norms = Tensor::cat(&[&self.sq_norms, &extra_norms], 0).map_err(accel_err)?;
        self.matrix = matrix;
        self.sq_norms = sq_norms;
        self.rows += rows;
        Ok(())
    }

    /// One raw score per row: squared L2 distance, or inner product for cosine.
    pub fn scores(&self, metric: Metric, query: &[f32]) -> Result<Vec<f32>> {
        let q = Tensor::from_slice(query, (self.dim, 1), &self.device).map_err(accel_err)?;
        let dot = self.matrix.matmul(&q).map_err(accel_err)?;
        let column = match metric {
            Metric::Cosine => dot,
            Metric::L2 => {
                let q_sq: f32 = query.iter().map(|x| x * x).sum();
                // ||x||² - 2·x·q + ||q||², clamped at zero against rounding
                dot.affine(-2.0, f64::from(q_sq))
                    .and_then(|t| t.add(&self.sq_norms))
                    .and_then(|t| t.relu())
                    .map_err(accel_err)?
            }
        };
        column.squeeze(1).and_then(|t| t.to_vec1::<f32>()).map_err(accel_err)
    }
}
