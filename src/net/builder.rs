//! Builds a [`Sequential`] model from a declarative layer list,
//! threading the running shape through every layer and materialising
//! Xavier-initialised parameters.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::net::gru::GruCell;
use crate::net::layer::Layer;
use crate::net::lstm::LstmCell;
use crate::net::rnn::xavier_tensor;
use crate::net::tensor::Tensor;
use crate::net::Sequential;

/// Hidden size used when an rnn spec leaves `units` at zero.
const DEFAULT_RNN_UNITS: usize = 32;

/// One entry of the model architecture list in the config file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LayerSpec {
    #[serde(rename = "type")]
    pub layer_type: String,
    #[serde(default)]
    pub filters: usize,
    #[serde(default)]
    pub kernel: usize,
    #[serde(default)]
    pub stride: usize,
    #[serde(default)]
    pub padding: usize,
    #[serde(default)]
    pub units: usize,
}

/// Builds the model for the given input shape. An empty spec list
/// yields the default `[dense(units=1), sigmoid]` classifier head.
pub fn build_model<R: Rng>(
    specs: &[LayerSpec],
    input_shape: &[usize],
    rng: &mut R,
) -> Result<Sequential> {
    if specs.is_empty() {
        let default = [
            LayerSpec {
                layer_type: "dense".into(),
                units: 1,
                ..LayerSpec::default()
            },
            LayerSpec {
                layer_type: "sigmoid".into(),
                ..LayerSpec::default()
            },
        ];
        return build_model(&default, input_shape, rng);
    }

    let mut layers = Vec::with_capacity(specs.len());
    let mut shape = input_shape.to_vec();

    for spec in specs {
        let layer = match spec.layer_type.as_str() {
            "conv2d" => {
                if shape.len() != 3 {
                    return Err(Error::ShapeMismatch(format!(
                        "conv2d needs a 3-D running shape, got {shape:?}"
                    )));
                }
                let in_channels = shape[0];
                let fan_in = in_channels * spec.kernel * spec.kernel;
                let fan_out = spec.filters * spec.kernel * spec.kernel;
                let weights = xavier_tensor(
                    &[spec.filters, in_channels, spec.kernel, spec.kernel],
                    fan_in,
                    fan_out,
                    rng,
                );
                let layer = Layer::conv2d(weights, vec![0.0; spec.filters], spec.stride, spec.padding);

                let out_h = (shape[1] + 2 * spec.padding - spec.kernel) / spec.stride + 1;
                let out_w = (shape[2] + 2 * spec.padding - spec.kernel) / spec.stride + 1;
                shape = vec![spec.filters, out_h, out_w];
                layer
            }
            "relu" => Layer::ReLU,
            "sigmoid" => Layer::Sigmoid,
            "maxpool2d" => {
                if shape.len() != 3 {
                    return Err(Error::ShapeMismatch(format!(
                        "maxpool2d needs a 3-D running shape, got {shape:?}"
                    )));
                }
                let out_h = (shape[1] - spec.kernel) / spec.stride + 1;
                let out_w = (shape[2] - spec.kernel) / spec.stride + 1;
                shape = vec![shape[0], out_h, out_w];
                Layer::MaxPool2D {
                    kernel: spec.kernel,
                    stride: spec.stride,
                }
            }
            "dense" => {
                let in_size: usize = shape.iter().product();
                let weights = xavier_tensor(&[spec.units, in_size], in_size, spec.units, rng);
                shape = vec![spec.units];
                Layer::dense(weights, vec![0.0; spec.units])
            }
            "gru" | "lstm" => {
                // Recurrent layers treat a 3-D [C, H, W] shape as H
                // timesteps of C*W features.
                let input_size = match shape.len() {
                    3 => shape[0] * shape[2],
                    2 => shape[1],
                    _ => {
                        return Err(Error::ShapeMismatch(format!(
                            "{} needs a 2-D or 3-D running shape, got {shape:?}",
                            spec.layer_type
                        )))
                    }
                };
                let hidden = if spec.units == 0 { DEFAULT_RNN_UNITS } else { spec.units };
                shape = vec![hidden];
                if spec.layer_type == "gru" {
                    Layer::Gru(GruCell::new(input_size, hidden, rng))
                } else {
                    Layer::Lstm(LstmCell::new(input_size, hidden, rng))
                }
            }
            other => return Err(Error::UnsupportedLayer(other.to_string())),
        };
        layers.push(layer);
    }

    Ok(Sequential::new(layers))
}

/// The model a legacy v1 file describes: one dense unit and a sigmoid.
pub fn legacy_model(weights: Tensor, bias: Vec<f32>) -> Sequential {
    Sequential::new(vec![Layer::dense(weights, bias), Layer::Sigmoid])
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn spec(layer_type: &str) -> LayerSpec {
        LayerSpec {
            layer_type: layer_type.into(),
            ..LayerSpec::default()
        }
    }

    #[test]
    fn empty_spec_builds_default_head() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut model = build_model(&[], &[1, 61, 40], &mut rng).unwrap();
        assert_eq!(model.layers.len(), 2);
        assert_eq!(model.layers[0].type_name(), "dense");
        assert_eq!(model.layers[1].type_name(), "sigmoid");

        let input = Tensor::new(&[1, 61, 40]);
        let out = model.forward(&input).unwrap();
        assert_eq!(out.shape, vec![1]);
    }

    #[test]
    fn conv_stack_threads_shapes() {
        let mut rng = StdRng::seed_from_u64(1);
        let specs = vec![
            LayerSpec {
                layer_type: "conv2d".into(),
                filters: 4,
                kernel: 3,
                stride: 1,
                padding: 1,
                ..LayerSpec::default()
            },
            spec("relu"),
            LayerSpec {
                layer_type: "maxpool2d".into(),
                kernel: 2,
                stride: 2,
                ..LayerSpec::default()
            },
            LayerSpec {
                layer_type: "dense".into(),
                units: 1,
                ..LayerSpec::default()
            },
            spec("sigmoid"),
        ];
        let mut model = build_model(&specs, &[1, 10, 10], &mut rng).unwrap();
        let out = model.forward(&Tensor::new(&[1, 10, 10])).unwrap();
        assert_eq!(out.shape, vec![1]);
    }

    #[test]
    fn rnn_after_conv_uses_channel_width_features() {
        let mut rng = StdRng::seed_from_u64(1);
        let specs = vec![
            LayerSpec {
                layer_type: "conv2d".into(),
                filters: 2,
                kernel: 3,
                stride: 1,
                padding: 1,
                ..LayerSpec::default()
            },
            LayerSpec {
                layer_type: "gru".into(),
                units: 16,
                ..LayerSpec::default()
            },
            LayerSpec {
                layer_type: "dense".into(),
                units: 1,
                ..LayerSpec::default()
            },
            spec("sigmoid"),
        ];
        let mut model = build_model(&specs, &[1, 61, 40], &mut rng).unwrap();
        let out = model.forward(&Tensor::new(&[1, 61, 40])).unwrap();
        assert_eq!(out.shape, vec![1]);
    }

    #[test]
    fn rnn_units_default_to_32() {
        let mut rng = StdRng::seed_from_u64(1);
        let specs = vec![spec("lstm")];
        let model = build_model(&specs, &[1, 61, 40], &mut rng).unwrap();
        match &model.layers[0] {
            Layer::Lstm(cell) => assert_eq!(cell.hidden_size, 32),
            other => panic!("expected lstm, got {}", other.type_name()),
        }
    }

    #[test]
    fn unknown_type_is_unsupported_layer() {
        let mut rng = StdRng::seed_from_u64(1);
        let err = build_model(&[spec("softmax")], &[1, 61, 40], &mut rng).unwrap_err();
        match err {
            Error::UnsupportedLayer(t) => assert_eq!(t, "softmax"),
            other => panic!("unexpected error {other:?}"),
        }
    }
}
