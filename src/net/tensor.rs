/// Dense n-dimensional array of f32 values in row-major order.
///
/// The buffer length always equals the product of the shape dimensions.
/// Every tensor owns its buffer; `clone` deep-copies.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    pub data: Vec<f32>,
    pub shape: Vec<usize>,
}

impl Tensor {
    /// Zero-filled tensor with the given shape.
    pub fn new(shape: &[usize]) -> Self {
        let size = shape.iter().product();
        Tensor {
            data: vec![0.0; size],
            shape: shape.to_vec(),
        }
    }

    /// Wraps an existing buffer. Panics if the buffer length does not
    /// match the shape product; that is a programmer error, not input.
    pub fn from_vec(data: Vec<f32>, shape: &[usize]) -> Self {
        let size: usize = shape.iter().product();
        assert_eq!(data.len(), size, "tensor buffer does not match shape");
        Tensor {
            data,
            shape: shape.to_vec(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Flat index for multi-dimensional indices:
    /// index = sum(indices[i] * product(shape[i+1..])).
    pub fn flat_index(&self, indices: &[usize]) -> usize {
        let mut index = 0;
        let mut multiplier = 1;
        for i in (0..indices.len()).rev() {
            index += indices[i] * multiplier;
            multiplier *= self.shape[i];
        }
        index
    }

    pub fn get(&self, indices: &[usize]) -> f32 {
        self.data[self.flat_index(indices)]
    }

    pub fn set(&mut self, indices: &[usize], value: f32) {
        let i = self.flat_index(indices);
        self.data[i] = value;
    }
}
