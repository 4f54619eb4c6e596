use crate::error::{Error, Result};
use itertools::Itertools;
use ndarray::{Array, Array1, Array2, ArrayView2, Axis, Zip, linalg::general_mat_mul};
use ndarray_rand::{RandomExt, rand::Rng, rand_distr::Uniform};

/// Widths of the input, hidden and output layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkShape {
    pub inputs: usize,
    pub hidden: usize,
    pub outputs: usize,
}

// The trainable state of the classifier. `w1` is [inputs x hidden] and `w2` is [hidden x outputs],
// so a batch whose rows are samples can be multiplied straight through: x.w1 + b1, then h.w2 + b2.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameters {
    pub w1: Array2<f32>,
    pub b1: Array1<f32>,
    pub w2: Array2<f32>,
    pub b2: Array1<f32>,
}

/// Partial derivatives of a batch loss, one entry per parameter.
pub type Gradient = Parameters;

impl Parameters {
    pub fn zeros(shape: NetworkShape) -> Parameters {
        Parameters {
            w1: Array::zeros((shape.inputs, shape.hidden)),
            b1: Array::zeros(shape.hidden),
            w2: Array::zeros((shape.hidden, shape.outputs)),
            b2: Array::zeros(shape.outputs),
        }
    }

    // Every weight and bias of a layer with fan-in n is drawn from U(-1/sqrt(n), 1/sqrt(n)), which
    // keeps the variance of the pre-activations bounded regardless of how wide the input is.
    pub fn random<R: Rng + ?Sized>(shape: NetworkShape, rng: &mut R) -> Parameters {
        let first = || fan_in_uniform(shape.inputs);
        let second = || fan_in_uniform(shape.hidden);

        Parameters {
            w1: Array::random_using((shape.inputs, shape.hidden), first(), rng),
            b1: Array::random_using(shape.hidden, first(), rng),
            w2: Array::random_using((shape.hidden, shape.outputs), second(), rng),
            b2: Array::random_using(shape.outputs, second(), rng),
        }
    }

    pub fn shape(&self) -> NetworkShape {
        let (inputs, hidden) = self.w1.dim();
        NetworkShape {
            inputs,
            hidden,
            outputs: self.w2.ncols(),
        }
    }

    /// Total number of scalar parameters.
    pub fn len(&self) -> usize {
        self.w1.len() + self.b1.len() + self.w2.len() + self.b2.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &f32> {
        self.w1
            .iter()
            .chain(self.b1.iter())
            .chain(self.w2.iter())
            .chain(self.b2.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut f32> {
        self.w1
            .iter_mut()
            .chain(self.b1.iter_mut())
            .chain(self.w2.iter_mut())
            .chain(self.b2.iter_mut())
    }
}

fn fan_in_uniform(fan_in: usize) -> Uniform<f32> {
    let bound = 1.0 / (fan_in as f32).sqrt();
    Uniform::new_inclusive(-bound, bound)
}

/// Intermediate values of one forward pass, kept for backpropagation.
#[derive(Debug, Clone)]
pub struct Activations {
    /// x.w1 + b1, before the ReLU.
    pub hidden_pre: Array2<f32>,
    /// max(0, hidden_pre).
    pub hidden: Array2<f32>,
    pub logits: Array2<f32>,
}

#[derive(Debug, Clone)]
pub struct Network {
    parameters: Parameters,
}

impl Network {
    pub fn new<R: Rng + ?Sized>(shape: NetworkShape, rng: &mut R) -> Result<Network> {
        if shape.inputs == 0 || shape.hidden == 0 || shape.outputs == 0 {
            return Err(Error::InvalidConfig(format!(
                "every layer needs at least one unit, got {shape:?}"
            )));
        }

        Ok(Network {
            parameters: Parameters::random(shape, rng),
        })
    }

    pub fn from_parameters(parameters: Parameters) -> Network {
        Network { parameters }
    }

    pub fn shape(&self) -> NetworkShape {
        self.parameters.shape()
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn parameters_mut(&mut self) -> &mut Parameters {
        &mut self.parameters
    }

    // Run a [batch x inputs] matrix through both layers, keeping the hidden pre-activations and
    // activations around since backpropagation needs both.
    pub fn forward(&self, input: ArrayView2<f32>) -> Result<Activations> {
        self.check_input(input)?;
        let Parameters { w1, b1, w2, b2 } = &self.parameters;

        let mut hidden_pre = input.dot(w1);
        hidden_pre += b1;
        let hidden = hidden_pre.mapv(|z| z.max(0.0));
        let mut logits = hidden.dot(w2);
        logits += b2;

        Ok(Activations {
            hidden_pre,
            hidden,
            logits,
        })
    }

    pub fn feedforward(&self, input: ArrayView2<f32>) -> Result<Array2<f32>> {
        Ok(self.forward(input)?.logits)
    }

    /// The most likely class of each row of `input`.
    pub fn predict(&self, input: ArrayView2<f32>) -> Result<Vec<usize>> {
        Ok(argmax_rows(self.feedforward(input)?.view()))
    }

    // Push the gradient of the loss with respect to the logits back through both layers by the chain
    // rule, writing the result into `gradient`. Every entry of `gradient` is overwritten, so nothing
    // carries over from a previous batch.
    //
    // With G = dL/dlogits ([batch x outputs]):
    //  - dL/dw2 = h^T.G and dL/db2 is G summed over the batch
    //  - dL/dh = G.w2^T, zeroed wherever the pre-activation was <= 0 (ReLU)
    //  - dL/dw1 = x^T.dL/dh and dL/db1 is dL/dh summed over the batch
    pub fn backpropagate(
        &self,
        input: ArrayView2<f32>,
        activations: &Activations,
        logit_grad: ArrayView2<f32>,
        gradient: &mut Gradient,
    ) -> Result<()> {
        self.check_input(input)?;
        let shape = self.shape();
        if gradient.shape() != shape {
            return Err(Error::ShapeMismatch {
                what: "gradient parameters",
                expected: self.parameters.len(),
                found: gradient.len(),
            });
        }
        if logit_grad.dim() != activations.logits.dim()
            || input.nrows() != activations.hidden.nrows()
        {
            return Err(Error::ShapeMismatch {
                what: "logit gradient",
                expected: activations.logits.len(),
                found: logit_grad.len(),
            });
        }

        general_mat_mul(
            1.0,
            &activations.hidden.t(),
            &logit_grad,
            0.0,
            &mut gradient.w2,
        );
        gradient.b2.assign(&logit_grad.sum_axis(Axis(0)));

        let mut hidden_grad = logit_grad.dot(&self.parameters.w2.t());
        Zip::from(&mut hidden_grad)
            .and(&activations.hidden_pre)
            .for_each(|grad, &z| {
                if z <= 0.0 {
                    *grad = 0.0;
                }
            });

        general_mat_mul(1.0, &input.t(), &hidden_grad, 0.0, &mut gradient.w1);
        gradient.b1.assign(&hidden_grad.sum_axis(Axis(0)));

        Ok(())
    }

    fn check_input(&self, input: ArrayView2<f32>) -> Result<()> {
        let inputs = self.parameters.w1.nrows();
        if input.ncols() != inputs {
            return Err(Error::ShapeMismatch {
                what: "input width",
                expected: inputs,
                found: input.ncols(),
            });
        }
        Ok(())
    }
}

// Index of the largest logit in every row. Ties go to the lowest index: position_min_by keeps the
// first of several equal elements, and the comparison is reversed to turn it into a maximum.
pub fn argmax_rows(logits: ArrayView2<f32>) -> Vec<usize> {
    logits
        .rows()
        .into_iter()
        .map(|row| {
            row.iter()
                .position_min_by(|a, b| b.total_cmp(a))
                .unwrap_or(0)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loss;
    use ndarray::array;
    use ndarray_rand::rand::{SeedableRng, rngs::StdRng};

    const SHAPE: NetworkShape = NetworkShape {
        inputs: 3,
        hidden: 4,
        outputs: 2,
    };

    // Hidden units 0 and 2 are always active and 1 and 3 always dead for inputs in [0, 1]: the
    // biases are +-1 and the shrunken weights can move the pre-activation by at most ~0.2.
    fn kinked_network() -> Network {
        let mut rng = StdRng::seed_from_u64(11);
        let mut parameters = Parameters::random(SHAPE, &mut rng);
        parameters.w1 *= 0.1;
        parameters.b1 = array![1.0, -1.0, 1.0, -1.0];
        Network::from_parameters(parameters)
    }

    fn batch() -> (Array2<f32>, Vec<usize>) {
        (array![[0.9, 0.1, 0.4], [0.0, 0.7, 1.0], [0.5, 0.5, 0.5]], vec![1, 0, 1])
    }

    #[test]
    fn initialization_is_seeded_and_bounded() {
        let a = Network::new(SHAPE, &mut StdRng::seed_from_u64(5)).unwrap();
        let b = Network::new(SHAPE, &mut StdRng::seed_from_u64(5)).unwrap();
        let c = Network::new(SHAPE, &mut StdRng::seed_from_u64(6)).unwrap();

        assert_eq!(a.parameters(), b.parameters());
        assert_ne!(a.parameters(), c.parameters());
        assert_eq!(a.shape(), SHAPE);
        assert_eq!(a.parameters().len(), 3 * 4 + 4 + 4 * 2 + 2);

        let first = 1.0 / 3f32.sqrt();
        let second = 1.0 / 4f32.sqrt();
        let p = a.parameters();
        assert!(p.w1.iter().chain(p.b1.iter()).all(|v| v.abs() <= first));
        assert!(p.w2.iter().chain(p.b2.iter()).all(|v| v.abs() <= second));
    }

    #[test]
    fn zero_width_layers_are_rejected() {
        let shape = NetworkShape { hidden: 0, ..SHAPE };
        let result = Network::new(shape, &mut StdRng::seed_from_u64(0));
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn forward_matches_hand_computation() {
        let network = Network::from_parameters(Parameters {
            w1: array![[1.0, -1.0], [2.0, 0.5]],
            b1: array![0.0, -1.0],
            w2: array![[1.0, 0.0, -1.0], [0.5, 2.0, 1.0]],
            b2: array![0.25, 0.5, -0.5],
        });

        let activations = network.forward(array![[1.0, 1.0], [-1.0, 2.0]].view()).unwrap();

        assert_eq!(activations.hidden_pre, array![[3.0, -1.5], [3.0, 1.0]]);
        assert_eq!(activations.hidden, array![[3.0, 0.0], [3.0, 1.0]]);
        assert_eq!(
            activations.logits,
            array![[3.25, 0.5, -3.5], [3.75, 2.5, -2.5]]
        );
    }

    #[test]
    fn wrong_input_width_is_rejected() {
        let network = kinked_network();
        let result = network.forward(Array2::zeros((2, 5)).view());
        assert!(matches!(
            result,
            Err(Error::ShapeMismatch {
                expected: 3,
                found: 5,
                ..
            })
        ));
    }

    #[test]
    fn backpropagation_matches_finite_differences() {
        let network = kinked_network();
        let (x, labels) = batch();

        let activations = network.forward(x.view()).unwrap();
        let (_, logit_grad) =
            loss::cross_entropy_with_grad(activations.logits.view(), &labels).unwrap();
        let mut gradient = Parameters::zeros(SHAPE);
        network
            .backpropagate(x.view(), &activations, logit_grad.view(), &mut gradient)
            .unwrap();

        let loss_with = |parameters: Parameters| {
            let logits = Network::from_parameters(parameters)
                .feedforward(x.view())
                .unwrap();
            loss::cross_entropy(logits.view(), &labels).unwrap()
        };

        let eps = 1e-3;
        for (index, &analytic) in gradient.iter().enumerate() {
            let mut plus = network.parameters().clone();
            *plus.iter_mut().nth(index).unwrap() += eps;
            let mut minus = network.parameters().clone();
            *minus.iter_mut().nth(index).unwrap() -= eps;

            let numeric = (loss_with(plus) - loss_with(minus)) / (2.0 * eps);
            assert!(
                (analytic - numeric).abs() < 1e-3,
                "parameter {index}: analytic {analytic}, numeric {numeric}"
            );
        }
    }

    #[test]
    fn dead_hidden_units_get_no_gradient() {
        let network = kinked_network();
        let (x, labels) = batch();

        let activations = network.forward(x.view()).unwrap();
        let (_, logit_grad) =
            loss::cross_entropy_with_grad(activations.logits.view(), &labels).unwrap();
        let mut gradient = Parameters::zeros(SHAPE);
        gradient.iter_mut().for_each(|v| *v = 123.0);
        network
            .backpropagate(x.view(), &activations, logit_grad.view(), &mut gradient)
            .unwrap();

        assert!(gradient.iter().all(|&v| v != 123.0));
        for dead in [1, 3] {
            assert_eq!(gradient.b1[dead], 0.0);
            assert!(gradient.w1.column(dead).iter().all(|&v| v == 0.0));
            assert!(gradient.w2.row(dead).iter().all(|&v| v == 0.0));
        }
        assert!(gradient.b1[0] != 0.0 && gradient.b1[2] != 0.0);
    }

    #[test]
    fn argmax_prefers_the_first_maximum() {
        let logits = array![[0.1, 0.7, 0.2], [1.0, 1.0, 0.0], [-3.0, -2.0, -2.0]];
        assert_eq!(argmax_rows(logits.view()), vec![1, 0, 1]);
    }
}
