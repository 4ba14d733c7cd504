//! Recurrent state and the stacked LSTM used by the actor-critic.
//!
//! State tensors are laid out `(layers, batch, hidden)`. Burn's `Lstm` is a
//! single layer, so the stack keeps one `Lstm` per layer and slices its own
//! row of the state.
//!
//! Gate weights are redrawn from the caller's seeded `fastrand::Rng`,
//! uniform in `±1/sqrt(hidden)`, so a seed fixes the whole stack.

use burn::module::{Module, Param};
use burn::nn::{GateController, Linear, Lstm, LstmConfig, LstmState};
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{Tensor, TensorData};

/// LSTM hidden/cell pair, each `(layers, batch, hidden)`.
#[derive(Debug, Clone)]
pub struct RecurrentState<B: Backend> {
    pub hidden: Tensor<B, 3>,
    pub cell: Tensor<B, 3>,
}

impl<B: Backend> RecurrentState<B> {
    pub fn new(hidden: Tensor<B, 3>, cell: Tensor<B, 3>) -> Self {
        assert_eq!(hidden.dims(), cell.dims(), "hidden and cell shapes differ");
        Self { hidden, cell }
    }

    /// All-zero state.
    pub fn zeros(layers: usize, batch: usize, hidden: usize, device: &B::Device) -> Self {
        Self {
            hidden: Tensor::zeros([layers, batch, hidden], device),
            cell: Tensor::zeros([layers, batch, hidden], device),
        }
    }

    pub fn layers(&self) -> usize {
        self.hidden.dims()[0]
    }

    pub fn batch_size(&self) -> usize {
        self.hidden.dims()[1]
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden.dims()[2]
    }

    /// Zero the rows whose flag is set, leaving the others untouched.
    ///
    /// # Panics
    /// Panics if `reset.len()` differs from the batch size.
    pub fn reset_where(self, reset: &[bool]) -> Self {
        let [layers, batch, hidden] = self.hidden.dims();
        assert_eq!(reset.len(), batch, "reset mask length must equal batch size");
        if !reset.iter().any(|&r| r) {
            return self;
        }
        if reset.iter().all(|&r| r) {
            let device = self.hidden.device();
            return Self::zeros(layers, batch, hidden, &device);
        }

        let device = self.hidden.device();
        let keep: Vec<f32> = reset.iter().map(|&r| if r { 0.0 } else { 1.0 }).collect();
        let keep = Tensor::<B, 1>::from_floats(keep.as_slice(), &device).reshape([1, batch, 1]);
        Self {
            hidden: self.hidden * keep.clone(),
            cell: self.cell * keep,
        }
    }

    /// Copy without autodiff history.
    pub fn detach(&self) -> Self {
        Self {
            hidden: self.hidden.clone().detach(),
            cell: self.cell.clone().detach(),
        }
    }

    fn layer(&self, l: usize) -> LstmState<B, 2> {
        let [_, batch, hidden] = self.hidden.dims();
        let h = self.hidden.clone().slice([l..l + 1, 0..batch, 0..hidden]).reshape([batch, hidden]);
        let c = self.cell.clone().slice([l..l + 1, 0..batch, 0..hidden]).reshape([batch, hidden]);
        LstmState::new(c, h)
    }

    fn from_layers(layers: Vec<LstmState<B, 2>>) -> Self {
        let (hidden, cell): (Vec<_>, Vec<_>) = layers
            .into_iter()
            .map(|s| (s.hidden.unsqueeze_dim::<3>(0), s.cell.unsqueeze_dim::<3>(0)))
            .unzip();
        Self {
            hidden: Tensor::cat(hidden, 0),
            cell: Tensor::cat(cell, 0),
        }
    }
}

impl<B: AutodiffBackend> RecurrentState<B> {
    /// Lift a state captured on the inference backend into the autodiff backend.
    pub fn from_inner(state: RecurrentState<B::InnerBackend>) -> Self {
        Self {
            hidden: Tensor::from_inner(state.hidden),
            cell: Tensor::from_inner(state.cell),
        }
    }
}

/// Configuration for [`StackedLstm`].
#[derive(Debug, Clone)]
pub struct StackedLstmConfig {
    pub d_input: usize,
    pub d_hidden: usize,
    pub n_layers: usize,
    pub bias: bool,
}

impl StackedLstmConfig {
    pub fn new(d_input: usize, d_hidden: usize) -> Self {
        Self {
            d_input,
            d_hidden,
            n_layers: 1,
            bias: true,
        }
    }

    pub fn with_layers(mut self, n_layers: usize) -> Self {
        self.n_layers = n_layers;
        self
    }

    pub fn with_bias(mut self, bias: bool) -> Self {
        self.bias = bias;
        self
    }

    /// # Panics
    /// Panics if `n_layers` is zero.
    pub fn init<B: Backend>(&self, rng: &mut fastrand::Rng, device: &B::Device) -> StackedLstm<B> {
        assert!(self.n_layers > 0, "LSTM needs at least one layer");
        let bound = 1.0 / (self.d_hidden as f32).sqrt();
        let layers = (0..self.n_layers)
            .map(|l| {
                let d_in = if l == 0 { self.d_input } else { self.d_hidden };
                let mut lstm = LstmConfig::new(d_in, self.d_hidden, self.bias).init(device);
                for gate in [
                    &mut lstm.input_gate,
                    &mut lstm.forget_gate,
                    &mut lstm.output_gate,
                    &mut lstm.cell_gate,
                ] {
                    redraw_gate(gate, bound, rng, device);
                }
                lstm
            })
            .collect();
        StackedLstm {
            layers,
            d_hidden: self.d_hidden,
        }
    }
}

fn redraw_gate<B: Backend>(
    gate: &mut GateController<B>,
    bound: f32,
    rng: &mut fastrand::Rng,
    device: &B::Device,
) {
    redraw_linear(&mut gate.input_transform, bound, rng, device);
    redraw_linear(&mut gate.hidden_transform, bound, rng, device);
}

fn redraw_linear<B: Backend>(
    linear: &mut Linear<B>,
    bound: f32,
    rng: &mut fastrand::Rng,
    device: &B::Device,
) {
    let mut uniform = |n: usize| -> Vec<f32> {
        (0..n).map(|_| (rng.f32() * 2.0 - 1.0) * bound).collect()
    };
    let [d_in, d_out] = linear.weight.dims();
    let weight = Tensor::from_data(TensorData::new(uniform(d_in * d_out), [d_in, d_out]), device);
    linear.weight = Param::from_tensor(weight);
    if linear.bias.is_some() {
        let bias = Tensor::from_data(TensorData::new(uniform(d_out), [d_out]), device);
        linear.bias = Some(Param::from_tensor(bias));
    }
}

/// Multi-layer LSTM over `[batch, seq, features]` inputs.
#[derive(Module, Debug)]
pub struct StackedLstm<B: Backend> {
    layers: Vec<Lstm<B>>,
    d_hidden: usize,
}

impl<B: Backend> StackedLstm<B> {
    /// Run a sequence through every layer.
    ///
    /// Returns the top layer's outputs `[batch, seq, hidden]` and the final state.
    pub fn forward(
        &self,
        input: Tensor<B, 3>,
        state: RecurrentState<B>,
    ) -> (Tensor<B, 3>, RecurrentState<B>) {
        assert_eq!(state.layers(), self.layers.len(), "state layer count mismatch");

        let mut x = input;
        let mut next = Vec::with_capacity(self.layers.len());
        for (l, lstm) in self.layers.iter().enumerate() {
            let (out, s) = lstm.forward(x, Some(state.layer(l)));
            next.push(s);
            x = out;
        }
        (x, RecurrentState::from_layers(next))
    }

    pub fn initial_state(&self, batch_size: usize, device: &B::Device) -> RecurrentState<B> {
        RecurrentState::zeros(self.layers.len(), batch_size, self.d_hidden, device)
    }

    pub fn n_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn hidden_size(&self) -> usize {
        self.d_hidden
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray<f32>;

    #[test]
    fn test_stacked_lstm_shapes() {
        let device = Default::default();
        let lstm = StackedLstmConfig::new(4, 8)
            .with_layers(2)
            .init::<B>(&mut fastrand::Rng::with_seed(0), &device);

        let input: Tensor<B, 3> = Tensor::ones([3, 5, 4], &device);
        let state = lstm.initial_state(3, &device);
        let (out, next) = lstm.forward(input, state);

        assert_eq!(out.dims(), [3, 5, 8]);
        assert_eq!(next.hidden.dims(), [2, 3, 8]);
        assert_eq!(next.cell.dims(), [2, 3, 8]);
    }

    #[test]
    fn test_final_hidden_matches_last_output() {
        let device = Default::default();
        let lstm = StackedLstmConfig::new(2, 6).init::<B>(&mut fastrand::Rng::with_seed(0), &device);

        let input: Tensor<B, 3> = Tensor::ones([1, 3, 2], &device) * 0.5;
        let (out, next) = lstm.forward(input, lstm.initial_state(1, &device));

        let last: Vec<f32> = out.slice([0..1, 2..3, 0..6]).into_data().iter::<f32>().collect();
        let hidden: Vec<f32> = next.hidden.into_data().iter::<f32>().collect();
        for (a, b) in last.iter().zip(&hidden) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    /// INTENT: the seed alone fixes every gate weight.
    #[test]
    fn test_same_seed_same_gates() {
        let device = Default::default();
        let build = |seed| {
            StackedLstmConfig::new(3, 5)
                .with_layers(2)
                .init::<B>(&mut fastrand::Rng::with_seed(seed), &device)
        };
        let (a, b, c) = (build(9), build(9), build(10));

        let weights = |lstm: &StackedLstm<B>| -> Vec<f32> {
            let mut out = Vec::new();
            for layer in &lstm.layers {
                let w = layer.forget_gate.hidden_transform.weight.val();
                out.extend(w.into_data().iter::<f32>());
            }
            out
        };
        assert_eq!(weights(&a), weights(&b));
        assert_ne!(weights(&a), weights(&c));

        let bound = 1.0 / 5f32.sqrt();
        assert!(weights(&a).iter().all(|w| w.abs() <= bound));

        let input: Tensor<B, 3> = Tensor::ones([2, 4, 3], &device);
        let (out_a, _) = a.forward(input.clone(), a.initial_state(2, &device));
        let (out_b, _) = b.forward(input, b.initial_state(2, &device));
        let out_a: Vec<f32> = out_a.into_data().iter::<f32>().collect();
        let out_b: Vec<f32> = out_b.into_data().iter::<f32>().collect();
        assert_eq!(out_a, out_b);
    }

    #[test]
    fn test_reset_where_zeroes_selected_rows() {
        let device = Default::default();
        let state = RecurrentState::<B>::new(
            Tensor::ones([1, 3, 2], &device),
            Tensor::ones([1, 3, 2], &device) * 2.0,
        );

        let reset = state.reset_where(&[false, true, false]);
        let h: Vec<f32> = reset.hidden.into_data().iter::<f32>().collect();
        let c: Vec<f32> = reset.cell.into_data().iter::<f32>().collect();

        assert_eq!(h, vec![1.0, 1.0, 0.0, 0.0, 1.0, 1.0]);
        assert_eq!(c, vec![2.0, 2.0, 0.0, 0.0, 2.0, 2.0]);
    }

    #[test]
    fn test_reset_where_all_rows() {
        let device = Default::default();
        let state = RecurrentState::<B>::new(
            Tensor::ones([2, 1, 3], &device),
            Tensor::ones([2, 1, 3], &device),
        );
        let reset = state.reset_where(&[true]);
        let h: Vec<f32> = reset.hidden.into_data().iter::<f32>().collect();
        assert!(h.iter().all(|&x| x == 0.0));
    }
}
