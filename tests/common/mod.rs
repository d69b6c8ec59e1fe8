#![allow(dead_code)]

use ndarray::{Array1, Array2};
use neural_parameters::{Layer, Parameters, Result};

/// A fully connected layer holding its weights in `ndarray` buffers.
pub struct Dense {
    name: String,
    pub w: Array2<f32>,
    pub b: Array1<f32>,
}

impl Dense {
    pub fn new(name: &str, inputs: usize, outputs: usize) -> Self {
        Self {
            name: name.to_string(),
            w: Array2::zeros((inputs, outputs)),
            b: Array1::zeros(outputs),
        }
    }

    /// Creates a layer whose weights count up from `start`.
    pub fn counting(name: &str, inputs: usize, outputs: usize, start: f32) -> Self {
        let mut dense = Self::new(name, inputs, outputs);
        let mut next = start;

        dense.w.iter_mut().chain(dense.b.iter_mut()).for_each(|x| {
            *x = next;
            next += 1.0;
        });

        dense
    }
}

impl Layer for Dense {
    fn name(&self) -> &str {
        &self.name
    }

    fn add_parameters<'a>(&'a mut self, params: &mut Parameters<'a>) -> Result<()> {
        params.add_array2(0, "w", &mut self.w)?;
        params.add_array1(1, "b", &mut self.b)?;
        Ok(())
    }
}

/// A stack of dense layers, registered as nested collections.
pub struct Mlp {
    pub layers: Vec<Dense>,
}

impl Mlp {
    pub fn new(sizes: &[usize]) -> Self {
        let layers = sizes
            .windows(2)
            .enumerate()
            .map(|(i, dim)| Dense::new(&format!("dense_{i}"), dim[0], dim[1]))
            .collect();

        Self { layers }
    }
}

impl Layer for Mlp {
    fn name(&self) -> &str {
        "mlp"
    }

    fn add_parameters<'a>(&'a mut self, params: &mut Parameters<'a>) -> Result<()> {
        for (i, layer) in self.layers.iter_mut().enumerate() {
            params.add_subparams(i, layer)?;
        }

        Ok(())
    }
}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}
