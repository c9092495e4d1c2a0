//! Versioned binary model format.
//!
//! ```text
//! magic "HWMD" | version u16 LE | layer_count u32 LE | layer records
//! ```
//!
//! Every layer record starts with a `u32` type id followed by a
//! type-specific body. Tensors serialise as `ndims u32, dims u32...,
//! f32 LE payload`; bias vectors as `len u32, f32 LE payload`. The
//! current writer always emits version 2; the loader also accepts the
//! legacy version 1 layout (a single dense row-major weight matrix plus
//! bias) and materialises it as `[Dense, Sigmoid]`.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::error::{Error, Result};
use crate::net::gru::GruCell;
use crate::net::layer::Layer;
use crate::net::lstm::LstmCell;
use crate::net::builder::legacy_model;
use crate::net::tensor::Tensor;
use crate::net::Sequential;

const MAGIC: &[u8; 4] = b"HWMD";
const VERSION: u16 = 2;

const TYPE_CONV2D: u32 = 1;
const TYPE_RELU: u32 = 2;
const TYPE_SIGMOID: u32 = 3;
const TYPE_MAXPOOL2D: u32 = 4;
const TYPE_DENSE: u32 = 5;
const TYPE_GRU: u32 = 6;
const TYPE_LSTM: u32 = 7;

pub fn save_model(path: &Path, model: &Sequential) -> Result<()> {
    let file = File::create(path)?;
    save_model_writer(BufWriter::new(file), model)
}

pub fn load_model(path: &Path) -> Result<Sequential> {
    let file = File::open(path)?;
    load_model_reader(BufReader::new(file))
}

pub fn save_model_writer<W: Write>(mut w: W, model: &Sequential) -> Result<()> {
    w.write_all(MAGIC)?;
    write_u16(&mut w, VERSION)?;
    write_u32(&mut w, model.layers.len() as u32)?;

    for layer in &model.layers {
        match layer {
            Layer::Conv2D {
                weights,
                bias,
                stride,
                padding,
            } => {
                write_u32(&mut w, TYPE_CONV2D)?;
                write_tensor(&mut w, weights)?;
                write_bias(&mut w, bias)?;
                write_u32(&mut w, *stride as u32)?;
                write_u32(&mut w, *padding as u32)?;
            }
            Layer::ReLU => write_u32(&mut w, TYPE_RELU)?,
            Layer::Sigmoid => write_u32(&mut w, TYPE_SIGMOID)?,
            Layer::MaxPool2D { kernel, stride } => {
                write_u32(&mut w, TYPE_MAXPOOL2D)?;
                write_u32(&mut w, *kernel as u32)?;
                write_u32(&mut w, *stride as u32)?;
            }
            Layer::Dense { weights, bias } => {
                write_u32(&mut w, TYPE_DENSE)?;
                write_tensor(&mut w, weights)?;
                write_bias(&mut w, bias)?;
            }
            Layer::Gru(cell) => {
                write_u32(&mut w, TYPE_GRU)?;
                write_u32(&mut w, cell.input_size as u32)?;
                write_u32(&mut w, cell.hidden_size as u32)?;
                for t in [&cell.wz, &cell.wr, &cell.wh, &cell.uz, &cell.ur, &cell.uh] {
                    write_tensor(&mut w, t)?;
                }
                for b in [&cell.bz, &cell.br, &cell.bh] {
                    write_bias(&mut w, b)?;
                }
            }
            Layer::Lstm(cell) => {
                write_u32(&mut w, TYPE_LSTM)?;
                write_u32(&mut w, cell.input_size as u32)?;
                write_u32(&mut w, cell.hidden_size as u32)?;
                for t in [
                    &cell.wi, &cell.wf, &cell.wo, &cell.wg, &cell.ui, &cell.uf, &cell.uo,
                    &cell.ug,
                ] {
                    write_tensor(&mut w, t)?;
                }
                for b in [&cell.bi, &cell.bf, &cell.bo, &cell.bg] {
                    write_bias(&mut w, b)?;
                }
            }
        }
    }

    Ok(())
}

pub fn load_model_reader<R: Read>(mut r: R) -> Result<Sequential> {
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(Error::InvalidFormat("bad model magic".into()));
    }

    let version = read_u16(&mut r)?;
    match version {
        1 => load_v1(r),
        2 => load_v2(r),
        other => Err(Error::VersionUnsupported(other)),
    }
}

/// Legacy layout: numRows, numCols, numBias, then the weight and bias
/// payloads of a single `[Dense, Sigmoid]` classifier.
fn load_v1<R: Read>(mut r: R) -> Result<Sequential> {
    let rows = read_u32(&mut r)? as usize;
    let cols = read_u32(&mut r)? as usize;
    let num_bias = read_u32(&mut r)? as usize;

    let data = read_f32_vec(&mut r, rows * cols)?;
    let bias = read_f32_vec(&mut r, num_bias)?;

    Ok(legacy_model(Tensor::from_vec(data, &[rows, cols]), bias))
}

fn load_v2<R: Read>(mut r: R) -> Result<Sequential> {
    let layer_count = read_u32(&mut r)? as usize;
    let mut layers = Vec::with_capacity(layer_count);

    for _ in 0..layer_count {
        let type_id = read_u32(&mut r)?;
        let layer = match type_id {
            TYPE_CONV2D => {
                let weights = read_tensor(&mut r)?;
                let bias = read_bias(&mut r)?;
                let stride = read_u32(&mut r)? as usize;
                let padding = read_u32(&mut r)? as usize;
                Layer::conv2d(weights, bias, stride, padding)
            }
            TYPE_RELU => Layer::ReLU,
            TYPE_SIGMOID => Layer::Sigmoid,
            TYPE_MAXPOOL2D => {
                let kernel = read_u32(&mut r)? as usize;
                let stride = read_u32(&mut r)? as usize;
                Layer::MaxPool2D { kernel, stride }
            }
            TYPE_DENSE => {
                let weights = read_tensor(&mut r)?;
                let bias = read_bias(&mut r)?;
                Layer::dense(weights, bias)
            }
            TYPE_GRU => {
                let input_size = read_u32(&mut r)? as usize;
                let hidden_size = read_u32(&mut r)? as usize;
                let weights = [
                    read_tensor(&mut r)?,
                    read_tensor(&mut r)?,
                    read_tensor(&mut r)?,
                    read_tensor(&mut r)?,
                    read_tensor(&mut r)?,
                    read_tensor(&mut r)?,
                ];
                let biases = [read_bias(&mut r)?, read_bias(&mut r)?, read_bias(&mut r)?];
                Layer::Gru(GruCell::from_parts(input_size, hidden_size, weights, biases))
            }
            TYPE_LSTM => {
                let input_size = read_u32(&mut r)? as usize;
                let hidden_size = read_u32(&mut r)? as usize;
                let weights = [
                    read_tensor(&mut r)?,
                    read_tensor(&mut r)?,
                    read_tensor(&mut r)?,
                    read_tensor(&mut r)?,
                    read_tensor(&mut r)?,
                    read_tensor(&mut r)?,
                    read_tensor(&mut r)?,
                    read_tensor(&mut r)?,
                ];
                let biases = [
                    read_bias(&mut r)?,
                    read_bias(&mut r)?,
                    read_bias(&mut r)?,
                    read_bias(&mut r)?,
                ];
                Layer::Lstm(LstmCell::from_parts(input_size, hidden_size, weights, biases))
            }
            other => {
                return Err(Error::InvalidFormat(format!("unknown layer id {other}")));
            }
        };
        layers.push(layer);
    }

    Ok(Sequential::new(layers))
}

fn write_u16<W: Write>(w: &mut W, v: u16) -> Result<()> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

fn write_u32<W: Write>(w: &mut W, v: u32) -> Result<()> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

fn write_tensor<W: Write>(w: &mut W, t: &Tensor) -> Result<()> {
    write_u32(w, t.shape.len() as u32)?;
    for &dim in &t.shape {
        write_u32(w, dim as u32)?;
    }
    for &v in &t.data {
        w.write_all(&v.to_le_bytes())?;
    }
    Ok(())
}

fn write_bias<W: Write>(w: &mut W, bias: &[f32]) -> Result<()> {
    write_u32(w, bias.len() as u32)?;
    for &v in bias {
        w.write_all(&v.to_le_bytes())?;
    }
    Ok(())
}

fn read_u16<R: Read>(r: &mut R) -> Result<u16> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32<R: Read>(r: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_f32_vec<R: Read>(r: &mut R, len: usize) -> Result<Vec<f32>> {
    let mut out = Vec::with_capacity(len);
    let mut buf = [0u8; 4];
    for _ in 0..len {
        r.read_exact(&mut buf)?;
        out.push(f32::from_le_bytes(buf));
    }
    Ok(out)
}

fn read_tensor<R: Read>(r: &mut R) -> Result<Tensor> {
    let ndims = read_u32(r)? as usize;
    let mut shape = Vec::with_capacity(ndims);
    for _ in 0..ndims {
        shape.push(read_u32(r)? as usize);
    }
    let len = shape.iter().product();
    let data = read_f32_vec(r, len)?;
    Ok(Tensor::from_vec(data, &shape))
}

fn read_bias<R: Read>(r: &mut R) -> Result<Vec<f32>> {
    let len = read_u32(r)? as usize;
    read_f32_vec(r, len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::io::Cursor;

    use crate::net::builder::{build_model, LayerSpec};

    fn round_trip(model: &Sequential) -> Sequential {
        let mut buf = Vec::new();
        save_model_writer(&mut buf, model).unwrap();
        load_model_reader(Cursor::new(buf)).unwrap()
    }

    fn layer_spec(layer_type: &str) -> LayerSpec {
        LayerSpec {
            layer_type: layer_type.into(),
            ..LayerSpec::default()
        }
    }

    #[test]
    fn dense_sigmoid_round_trip_is_bitwise() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut model = build_model(&[], &[1, 61, 40], &mut rng).unwrap();
        let mut loaded = round_trip(&model);

        let input = Tensor::from_vec(vec![0.5; 61 * 40], &[1, 61, 40]);
        let a = model.forward(&input).unwrap();
        let b = loaded.forward(&input).unwrap();
        assert_eq!(a.data[0].to_bits(), b.data[0].to_bits());
    }

    #[test]
    fn conv_stack_round_trip_is_bitwise() {
        let mut rng = StdRng::seed_from_u64(3);
        let specs = vec![
            LayerSpec {
                layer_type: "conv2d".into(),
                filters: 4,
                kernel: 3,
                stride: 1,
                padding: 1,
                ..LayerSpec::default()
            },
            layer_spec("relu"),
            LayerSpec {
                layer_type: "dense".into(),
                units: 1,
                ..LayerSpec::default()
            },
            layer_spec("sigmoid"),
        ];
        let mut model = build_model(&specs, &[1, 10, 10], &mut rng).unwrap();
        let mut loaded = round_trip(&model);

        let input = Tensor::from_vec(vec![0.5; 100], &[1, 10, 10]);
        let a = model.forward(&input).unwrap();
        let b = loaded.forward(&input).unwrap();
        assert_eq!(a.data[0].to_bits(), b.data[0].to_bits());
    }

    #[test]
    fn recurrent_models_round_trip_is_bitwise() {
        for kind in ["gru", "lstm"] {
            let mut rng = StdRng::seed_from_u64(9);
            let specs = vec![
                LayerSpec {
                    layer_type: kind.into(),
                    units: 8,
                    ..LayerSpec::default()
                },
                LayerSpec {
                    layer_type: "dense".into(),
                    units: 1,
                    ..LayerSpec::default()
                },
                layer_spec("sigmoid"),
            ];
            let mut model = build_model(&specs, &[1, 20, 10], &mut rng).unwrap();
            let mut loaded = round_trip(&model);

            let input = Tensor::from_vec(vec![0.25; 200], &[1, 20, 10]);
            let a = model.forward(&input).unwrap();
            let b = loaded.forward(&input).unwrap();
            assert_eq!(a.data[0].to_bits(), b.data[0].to_bits(), "{kind} round trip");
        }
    }

    #[test]
    fn v1_file_loads_as_dense_sigmoid() {
        // Hand-build a v1 byte stream: 1x3 weights, 1 bias.
        let mut buf = Vec::new();
        buf.extend_from_slice(b"HWMD");
        buf.extend_from_slice(&1u16.to_le_bytes());
        buf.extend_from_slice(&1u32.to_le_bytes()); // rows
        buf.extend_from_slice(&3u32.to_le_bytes()); // cols
        buf.extend_from_slice(&1u32.to_le_bytes()); // bias len
        for v in [0.1f32, 0.2, 0.3, 0.4] {
            buf.extend_from_slice(&v.to_le_bytes());
        }

        let model = load_model_reader(Cursor::new(buf)).unwrap();
        assert_eq!(model.layers.len(), 2);
        assert_eq!(model.layers[0].type_name(), "dense");
        assert_eq!(model.layers[1].type_name(), "sigmoid");
        match &model.layers[0] {
            Layer::Dense { weights, bias } => {
                assert_eq!(weights.shape, vec![1, 3]);
                assert_eq!(weights.data, vec![0.1, 0.2, 0.3]);
                assert_eq!(bias, &vec![0.4]);
            }
            other => panic!("expected dense, got {}", other.type_name()),
        }
    }

    #[test]
    fn bad_magic_is_invalid_format() {
        let err = load_model_reader(Cursor::new(b"XXXX\x02\x00".to_vec())).unwrap_err();
        assert!(matches!(err, Error::InvalidFormat(_)));
    }

    #[test]
    fn unknown_version_is_unsupported() {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"HWMD");
        buf.extend_from_slice(&9u16.to_le_bytes());
        let err = load_model_reader(Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, Error::VersionUnsupported(9)));
    }

    #[test]
    fn unknown_layer_id_is_invalid_format() {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"HWMD");
        buf.extend_from_slice(&2u16.to_le_bytes());
        buf.extend_from_slice(&1u32.to_le_bytes()); // one layer
        buf.extend_from_slice(&99u32.to_le_bytes()); // bogus id
        let err = load_model_reader(Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, Error::InvalidFormat(_)));
    }
}
