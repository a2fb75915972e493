//! Feed-forward network brains for Wanderbots agents.
//!
//! Topologies are bred by an evolutionary trainer outside this workspace and
//! shipped in as flat, topologically pre-sorted neuron lists: inputs first,
//! then a single bias neuron, then hidden and output neurons in an order
//! where every neuron's sources precede it. [`Network`] compiles such a list
//! into an index-linked arena and evaluates it in one pass per tick;
//! [`NetworkRunner`] adapts the result to the core's [`BrainRunner`] seam.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;
use wanderbots_core::{BrainRunner, TrackSpeeds};

/// Steepness of the logistic activation. The trainer bakes its weights
/// against this exact response curve, so it is not configurable.
pub const ACTIVATION_STEEPNESS: f64 = 4.9;

fn logistic(value: f64) -> f64 {
    1.0 / (1.0 + (-ACTIVATION_STEEPNESS * value).exp())
}

/// Role of a neuron within the network.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum NeuronKind {
    Input,
    Bias,
    Hidden,
    Output,
}

/// Wire form of one incoming connection: source neuron id and weight.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct LinkSpec {
    pub source: u32,
    pub weight: f64,
}

/// Wire form of one neuron record as produced by the trainer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NeuronSpec {
    pub id: u32,
    pub kind: NeuronKind,
    #[serde(default)]
    pub links: Vec<LinkSpec>,
}

/// Errors raised while compiling a network definition.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// The definition contained no neurons at all.
    #[error("network definition contains no neurons")]
    Empty,
    /// Two neuron records share an id.
    #[error("duplicate neuron id {id}")]
    DuplicateNeuron { id: u32 },
    /// A link names a source id with no matching neuron record.
    #[error("link references neuron id {id} which is not in the definition")]
    UnknownNeuron { id: u32 },
    /// The definition does not contain exactly one bias neuron.
    #[error("expected exactly one bias neuron, found {count}")]
    BiasCount { count: usize },
    /// Inputs must form a contiguous prefix immediately followed by the bias.
    #[error("input neurons must form a contiguous prefix followed by the bias neuron")]
    MalformedOrder,
    /// The definition declares no output neurons.
    #[error("network declares no output neurons")]
    NoOutputs,
    /// A drive network needs a left and a right track output.
    #[error("a drive network needs at least two outputs, found {count}")]
    OutputArity { count: usize },
    /// The JSON payload could not be parsed into neuron records.
    #[error("malformed network definition: {0}")]
    Wire(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
struct Link {
    source: usize,
    weight: f64,
}

#[derive(Debug, Clone)]
struct Neuron {
    kind: NeuronKind,
    links: Vec<Link>,
    output: f64,
}

/// A compiled feed-forward network.
///
/// Links hold indices into one flat neuron arena, so arbitrary wiring never
/// creates ownership cycles and source lookup stays O(1). Evaluation trusts
/// the supplied ordering: it runs a single pass and never re-sorts, exactly
/// like the trainer that produced the list expects. Output signals persist
/// between passes, so a link that points forward reads its source's value
/// from the previous evaluation.
#[derive(Debug, Clone)]
pub struct Network {
    neurons: Vec<Neuron>,
    input_count: usize,
    output_count: usize,
}

impl Network {
    /// Compile an ordered neuron list, failing fast on any structural defect.
    pub fn new(specs: &[NeuronSpec]) -> Result<Self, NetworkError> {
        if specs.is_empty() {
            return Err(NetworkError::Empty);
        }

        let mut index_of = HashMap::with_capacity(specs.len());
        for (index, spec) in specs.iter().enumerate() {
            if index_of.insert(spec.id, index).is_some() {
                return Err(NetworkError::DuplicateNeuron { id: spec.id });
            }
        }

        let bias_count = specs
            .iter()
            .filter(|spec| spec.kind == NeuronKind::Bias)
            .count();
        if bias_count != 1 {
            return Err(NetworkError::BiasCount { count: bias_count });
        }
        let input_count = specs
            .iter()
            .take_while(|spec| spec.kind == NeuronKind::Input)
            .count();
        if specs[input_count].kind != NeuronKind::Bias
            || specs
                .iter()
                .skip(input_count + 1)
                .any(|spec| spec.kind == NeuronKind::Input)
        {
            return Err(NetworkError::MalformedOrder);
        }
        let output_count = specs
            .iter()
            .filter(|spec| spec.kind == NeuronKind::Output)
            .count();
        if output_count == 0 {
            return Err(NetworkError::NoOutputs);
        }

        let neurons = specs
            .iter()
            .map(|spec| {
                let links = spec
                    .links
                    .iter()
                    .map(|link| {
                        index_of
                            .get(&link.source)
                            .map(|&source| Link {
                                source,
                                weight: link.weight,
                            })
                            .ok_or(NetworkError::UnknownNeuron { id: link.source })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Neuron {
                    kind: spec.kind,
                    links,
                    output: 0.0,
                })
            })
            .collect::<Result<Vec<_>, NetworkError>>()?;

        debug!(
            neurons = neurons.len(),
            inputs = input_count,
            outputs = output_count,
            "network compiled"
        );
        Ok(Self {
            neurons,
            input_count,
            output_count,
        })
    }

    /// Compile a network from its JSON wire form.
    pub fn from_json(text: &str) -> Result<Self, NetworkError> {
        let specs: Vec<NeuronSpec> = serde_json::from_str(text)?;
        Self::new(&specs)
    }

    /// Number of input neurons, i.e. signals consumed per evaluation.
    #[must_use]
    pub const fn input_count(&self) -> usize {
        self.input_count
    }

    /// Number of output neurons produced per evaluation.
    #[must_use]
    pub const fn output_count(&self) -> usize {
        self.output_count
    }

    /// Total neuron count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.neurons.len()
    }

    /// Returns true if the network holds no neurons (never, post-compile).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.neurons.is_empty()
    }

    /// Run one full evaluation pass.
    ///
    /// Signals are consumed positionally, one per input neuron; the bias
    /// neuron is pinned to `1.0`. Every remaining neuron sums
    /// `weight × source output` over its links and applies the logistic
    /// response. Outputs are returned in neuron-sequence order.
    pub fn activate(&mut self, inputs: &[f64]) -> Vec<f64> {
        debug_assert_eq!(inputs.len(), self.input_count, "input arity mismatch");
        for (neuron, signal) in self.neurons[..self.input_count].iter_mut().zip(inputs) {
            neuron.output = *signal;
        }
        self.neurons[self.input_count].output = 1.0;

        let mut outputs = Vec::with_capacity(self.output_count);
        for index in self.input_count + 1..self.neurons.len() {
            let sum: f64 = self.neurons[index]
                .links
                .iter()
                .map(|link| link.weight * self.neurons[link.source].output)
                .sum();
            let value = logistic(sum);
            let neuron = &mut self.neurons[index];
            neuron.output = value;
            if neuron.kind == NeuronKind::Output {
                outputs.push(value);
            }
        }
        outputs
    }
}

/// Bridges a [`Network`] into the core's [`BrainRunner`] seam.
///
/// Outputs 0 and 1 drive the left and right tracks; construction rejects
/// networks without both.
#[derive(Debug, Clone)]
pub struct NetworkRunner {
    network: Network,
}

impl NetworkRunner {
    /// Wrap a compiled network, checking the drive-output convention.
    pub fn new(network: Network) -> Result<Self, NetworkError> {
        let count = network.output_count();
        if count < 2 {
            return Err(NetworkError::OutputArity { count });
        }
        Ok(Self { network })
    }

    /// Compile and wrap a network straight from its JSON wire form.
    pub fn from_json(text: &str) -> Result<Self, NetworkError> {
        Self::new(Network::from_json(text)?)
    }

    /// The wrapped network.
    #[must_use]
    pub const fn network(&self) -> &Network {
        &self.network
    }
}

impl BrainRunner for NetworkRunner {
    fn kind(&self) -> &'static str {
        "neat.feedforward"
    }

    fn input_arity(&self) -> usize {
        self.network.input_count()
    }

    fn drive(&mut self, inputs: &[f64]) -> TrackSpeeds {
        let outputs = self.network.activate(inputs);
        TrackSpeeds::new(outputs[0], outputs[1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn neuron(id: u32, kind: NeuronKind, links: &[(u32, f64)]) -> NeuronSpec {
        NeuronSpec {
            id,
            kind,
            links: links
                .iter()
                .map(|&(source, weight)| LinkSpec { source, weight })
                .collect(),
        }
    }

    /// Two inputs, bias, one output wired straight to the first input.
    fn direct_specs(weight: f64, bias_weight: f64) -> Vec<NeuronSpec> {
        vec![
            neuron(0, NeuronKind::Input, &[]),
            neuron(1, NeuronKind::Input, &[]),
            neuron(2, NeuronKind::Bias, &[]),
            neuron(3, NeuronKind::Output, &[(0, weight), (2, bias_weight)]),
        ]
    }

    #[test]
    fn compiles_a_wire_definition_from_json() {
        let network = Network::from_json(
            r#"[
                {"id": 0, "kind": "INPUT"},
                {"id": 1, "kind": "BIAS"},
                {"id": 2, "kind": "HIDDEN", "links": [{"source": 0, "weight": 0.5}]},
                {"id": 3, "kind": "OUTPUT", "links": [{"source": 2, "weight": 1.5}]},
                {"id": 4, "kind": "OUTPUT", "links": [{"source": 1, "weight": -0.5}]}
            ]"#,
        )
        .expect("network");
        assert_eq!(network.input_count(), 1);
        assert_eq!(network.output_count(), 2);
        assert_eq!(network.len(), 5);
    }

    #[test]
    fn malformed_json_is_a_wire_error() {
        assert!(matches!(
            Network::from_json("[{\"id\": 0}]"),
            Err(NetworkError::Wire(_))
        ));
    }

    #[test]
    fn empty_definition_is_rejected() {
        assert!(matches!(Network::new(&[]), Err(NetworkError::Empty)));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let specs = vec![
            neuron(0, NeuronKind::Input, &[]),
            neuron(0, NeuronKind::Bias, &[]),
            neuron(1, NeuronKind::Output, &[]),
        ];
        assert!(matches!(
            Network::new(&specs),
            Err(NetworkError::DuplicateNeuron { id: 0 })
        ));
    }

    #[test]
    fn unknown_link_target_is_rejected() {
        let specs = vec![
            neuron(0, NeuronKind::Input, &[]),
            neuron(1, NeuronKind::Bias, &[]),
            neuron(2, NeuronKind::Output, &[(9, 1.0)]),
        ];
        assert!(matches!(
            Network::new(&specs),
            Err(NetworkError::UnknownNeuron { id: 9 })
        ));
    }

    #[test]
    fn exactly_one_bias_neuron_is_required() {
        let none = vec![
            neuron(0, NeuronKind::Input, &[]),
            neuron(1, NeuronKind::Output, &[]),
        ];
        assert!(matches!(
            Network::new(&none),
            Err(NetworkError::BiasCount { count: 0 })
        ));

        let two = vec![
            neuron(0, NeuronKind::Input, &[]),
            neuron(1, NeuronKind::Bias, &[]),
            neuron(2, NeuronKind::Bias, &[]),
            neuron(3, NeuronKind::Output, &[]),
        ];
        assert!(matches!(
            Network::new(&two),
            Err(NetworkError::BiasCount { count: 2 })
        ));
    }

    #[test]
    fn inputs_must_immediately_precede_the_bias() {
        let input_after_bias = vec![
            neuron(0, NeuronKind::Bias, &[]),
            neuron(1, NeuronKind::Input, &[]),
            neuron(2, NeuronKind::Output, &[]),
        ];
        assert!(matches!(
            Network::new(&input_after_bias),
            Err(NetworkError::MalformedOrder)
        ));

        let hidden_between = vec![
            neuron(0, NeuronKind::Input, &[]),
            neuron(1, NeuronKind::Hidden, &[]),
            neuron(2, NeuronKind::Bias, &[]),
            neuron(3, NeuronKind::Output, &[]),
        ];
        assert!(matches!(
            Network::new(&hidden_between),
            Err(NetworkError::MalformedOrder)
        ));
    }

    #[test]
    fn at_least_one_output_is_required() {
        let specs = vec![
            neuron(0, NeuronKind::Input, &[]),
            neuron(1, NeuronKind::Bias, &[]),
            neuron(2, NeuronKind::Hidden, &[(0, 1.0)]),
        ];
        assert!(matches!(Network::new(&specs), Err(NetworkError::NoOutputs)));
    }

    #[test]
    fn direct_link_follows_the_logistic_response_exactly() {
        let mut network = Network::new(&direct_specs(0.7, 0.0)).expect("network");
        let outputs = network.activate(&[0.5, 0.0]);
        let expected = 1.0 / (1.0 + (-ACTIVATION_STEEPNESS * (0.7 * 0.5)).exp());
        assert_eq!(outputs, vec![expected]);
    }

    #[test]
    fn bias_neuron_is_pinned_to_one() {
        // Only the bias feeds the output, so the result is logistic(weight).
        let mut network = Network::new(&direct_specs(0.0, 0.3)).expect("network");
        let outputs = network.activate(&[0.9, 0.9]);
        let expected = 1.0 / (1.0 + (-ACTIVATION_STEEPNESS * 0.3_f64).exp());
        assert_eq!(outputs, vec![expected]);
    }

    #[test]
    fn hidden_layers_compose_activations() {
        let specs = vec![
            neuron(0, NeuronKind::Input, &[]),
            neuron(1, NeuronKind::Bias, &[]),
            neuron(2, NeuronKind::Hidden, &[(0, 0.8)]),
            neuron(3, NeuronKind::Output, &[(2, -1.2)]),
        ];
        let mut network = Network::new(&specs).expect("network");
        let outputs = network.activate(&[0.25]);
        let hidden = 1.0 / (1.0 + (-ACTIVATION_STEEPNESS * (0.8 * 0.25)).exp());
        let expected = 1.0 / (1.0 + (-ACTIVATION_STEEPNESS * (-1.2 * hidden)).exp());
        assert_eq!(outputs, vec![expected]);
    }

    #[test]
    fn repeated_evaluation_is_bit_identical() {
        let specs = vec![
            neuron(0, NeuronKind::Input, &[]),
            neuron(1, NeuronKind::Input, &[]),
            neuron(2, NeuronKind::Bias, &[]),
            neuron(3, NeuronKind::Hidden, &[(0, 0.4), (1, -0.9), (2, 0.1)]),
            neuron(4, NeuronKind::Output, &[(3, 1.1), (0, 0.2)]),
            neuron(5, NeuronKind::Output, &[(3, -0.7), (2, 0.5)]),
        ];
        let inputs = [0.625, -1.0];
        let mut network = Network::new(&specs).expect("network");
        let first = network.activate(&inputs);
        let second = network.activate(&inputs);
        assert_eq!(first, second);

        let mut fresh = Network::new(&specs).expect("network");
        assert_eq!(fresh.activate(&inputs), first);
    }

    #[test]
    fn forward_links_read_the_previous_pass() {
        // Neuron 2 taps neuron 3, which is evaluated after it: the first pass
        // sees 3's initial zero signal, the second pass sees its settled one.
        let specs = vec![
            neuron(0, NeuronKind::Input, &[]),
            neuron(1, NeuronKind::Bias, &[]),
            neuron(2, NeuronKind::Output, &[(3, 1.0), (1, 0.0)]),
            neuron(3, NeuronKind::Hidden, &[(0, 1.0)]),
        ];
        let mut network = Network::new(&specs).expect("network");

        let first = network.activate(&[0.5]);
        assert_eq!(first, vec![0.5]); // logistic(1.0 * 0.0)

        let hidden = 1.0 / (1.0 + (-ACTIVATION_STEEPNESS * 0.5_f64).exp());
        let second = network.activate(&[0.5]);
        assert_eq!(
            second,
            vec![1.0 / (1.0 + (-ACTIVATION_STEEPNESS * hidden).exp())]
        );
    }

    #[test]
    fn runner_requires_two_drive_outputs() {
        let network = Network::new(&direct_specs(1.0, 0.0)).expect("network");
        assert!(matches!(
            NetworkRunner::new(network),
            Err(NetworkError::OutputArity { count: 1 })
        ));
    }

    #[test]
    fn runner_maps_the_first_two_outputs_onto_the_tracks() {
        let specs = vec![
            neuron(0, NeuronKind::Input, &[]),
            neuron(1, NeuronKind::Bias, &[]),
            neuron(2, NeuronKind::Output, &[(0, 2.0)]),
            neuron(3, NeuronKind::Output, &[(0, -2.0)]),
        ];
        let mut runner = NetworkRunner::new(Network::new(&specs).expect("network")).expect("runner");
        assert_eq!(runner.input_arity(), 1);
        assert_eq!(runner.kind(), "neat.feedforward");

        let tracks = runner.drive(&[0.5]);
        assert_eq!(tracks.left, 1.0 / (1.0 + (-ACTIVATION_STEEPNESS).exp()));
        assert_eq!(tracks.right, 1.0 / (1.0 + ACTIVATION_STEEPNESS.exp()));
    }
}
