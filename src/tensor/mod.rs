//! Typed tensor views over raw byte storage.
//!
//! Provides [`ElementType`] (the element dtypes the decode loop moves around)
//! and [`TensorView`] / [`TensorViewMut`]: shape-carrying, dtype-checked views
//! over a byte slice. Views never own memory — the backing block belongs to a
//! [`crate::memory::MemoryBlock`] or to an external collaborator. All
//! reinterpretation goes through `bytemuck` casts so misaligned or
//! wrongly-sized storage is caught rather than silently misread.

use half::f16;

use crate::error::GenerationError;

/// Element data type of a tensor view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    F32,
    F16,
    I32,
    I64,
}

impl ElementType {
    /// Size in bytes of one element.
    pub fn size_in_bytes(&self) -> usize {
        match self {
            ElementType::F32 => 4,
            ElementType::F16 => 2,
            ElementType::I32 => 4,
            ElementType::I64 => 8,
        }
    }
}

/// Number of bytes needed for `shape` elements of `elem`, with overflow
/// checked (batch × length × vocab products can overflow on 32-bit hosts).
pub fn byte_size_of(shape: &[usize], elem: ElementType) -> Result<usize, GenerationError> {
    let mut elements: usize = 1;
    for &dim in shape {
        elements = elements.checked_mul(dim).ok_or_else(|| {
            GenerationError::SizeOverflow(format!("element count of shape {:?}", shape))
        })?;
    }
    elements.checked_mul(elem.size_in_bytes()).ok_or_else(|| {
        GenerationError::SizeOverflow(format!("byte size of shape {:?} as {:?}", shape, elem))
    })
}

/// Read-only typed view over borrowed bytes.
#[derive(Debug, Clone, Copy)]
pub struct TensorView<'a> {
    shape: &'a [usize],
    elem: ElementType,
    bytes: &'a [u8],
}

impl<'a> TensorView<'a> {
    /// Create a view over `bytes` with the given shape and element type.
    ///
    /// # Panics
    /// Panics if `bytes.len()` does not match the shape's byte size.
    pub fn new(shape: &'a [usize], elem: ElementType, bytes: &'a [u8]) -> Self {
        let expected = byte_size_of(shape, elem).expect("shape byte size overflowed");
        assert_eq!(
            bytes.len(),
            expected,
            "Byte length {} does not match shape {:?} as {:?} (expected {})",
            bytes.len(),
            shape,
            elem,
            expected
        );
        Self { shape, elem, bytes }
    }

    /// Returns the shape of the view.
    pub fn shape(&self) -> &[usize] {
        self.shape
    }

    /// Returns the element type of the view.
    pub fn element_type(&self) -> ElementType {
        self.elem
    }

    /// Returns the total number of elements.
    pub fn n_elements(&self) -> usize {
        self.shape.iter().product()
    }

    /// Returns the raw backing bytes.
    pub fn as_bytes(&self) -> &[u8] {
        self.bytes
    }

    /// Reinterpret the view as an f32 slice.
    ///
    /// # Panics
    /// Panics if the element type is not F32 or the storage is misaligned.
    pub fn as_f32(&self) -> &'a [f32] {
        assert_eq!(self.elem, ElementType::F32, "View is {:?}, not F32", self.elem);
        bytemuck::cast_slice(self.bytes)
    }

    /// Reinterpret the view as raw f16 bit patterns.
    ///
    /// # Panics
    /// Panics if the element type is not F16 or the storage is misaligned.
    pub fn as_f16_bits(&self) -> &'a [u16] {
        assert_eq!(self.elem, ElementType::F16, "View is {:?}, not F16", self.elem);
        bytemuck::cast_slice(self.bytes)
    }

    /// Reinterpret the view as an i32 slice.
    ///
    /// # Panics
    /// Panics if the element type is not I32 or the storage is misaligned.
    pub fn as_i32(&self) -> &'a [i32] {
        assert_eq!(self.elem, ElementType::I32, "View is {:?}, not I32", self.elem);
        bytemuck::cast_slice(self.bytes)
    }

    /// Reinterpret the view as an i64 slice.
    ///
    /// # Panics
    /// Panics if the element type is not I64 or the storage is misaligned.
    pub fn as_i64(&self) -> &'a [i64] {
        assert_eq!(self.elem, ElementType::I64, "View is {:?}, not I64", self.elem);
        bytemuck::cast_slice(self.bytes)
    }

    /// Convert the view's contents to f32, widening F16 element-wise.
    ///
    /// # Panics
    /// Panics if the element type is neither F32 nor F16.
    pub fn to_f32_vec(&self) -> Vec<f32> {
        match self.elem {
            ElementType::F32 => self.as_f32().to_vec(),
            ElementType::F16 => self
                .as_f16_bits()
                .iter()
                .map(|&b| f16::from_bits(b).to_f32())
                .collect(),
            other => panic!("to_f32_vec on non-float view ({:?})", other),
        }
    }
}

/// Mutable typed view over borrowed bytes.
#[derive(Debug)]
pub struct TensorViewMut<'a> {
    shape: Vec<usize>,
    elem: ElementType,
    bytes: &'a mut [u8],
}

impl<'a> TensorViewMut<'a> {
    /// Create a mutable view over `bytes` with the given shape and element type.
    ///
    /// # Panics
    /// Panics if `bytes.len()` does not match the shape's byte size.
    pub fn new(shape: &[usize], elem: ElementType, bytes: &'a mut [u8]) -> Self {
        let expected = byte_size_of(shape, elem).expect("shape byte size overflowed");
        assert_eq!(
            bytes.len(),
            expected,
            "Byte length {} does not match shape {:?} as {:?} (expected {})",
            bytes.len(),
            shape,
            elem,
            expected
        );
        Self {
            shape: shape.to_vec(),
            elem,
            bytes,
        }
    }

    /// Returns the shape of the view.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Returns the element type of the view.
    pub fn element_type(&self) -> ElementType {
        self.elem
    }

    /// Returns the raw backing bytes.
    pub fn as_bytes(&self) -> &[u8] {
        self.bytes
    }

    /// Reinterpret the view as a mutable f32 slice.
    ///
    /// # Panics
    /// Panics if the element type is not F32 or the storage is misaligned.
    pub fn as_f32_mut(&mut self) -> &mut [f32] {
        assert_eq!(self.elem, ElementType::F32, "View is {:?}, not F32", self.elem);
        bytemuck::cast_slice_mut(self.bytes)
    }

    /// Consume the view, yielding the f32 slice with the full borrow lifetime.
    ///
    /// # Panics
    /// Panics if the element type is not F32 or the storage is misaligned.
    pub fn into_f32_mut(self) -> &'a mut [f32] {
        assert_eq!(self.elem, ElementType::F32, "View is {:?}, not F32", self.elem);
        bytemuck::cast_slice_mut(self.bytes)
    }

    /// Reinterpret the view as a mutable i32 slice.
    ///
    /// # Panics
    /// Panics if the element type is not I32 or the storage is misaligned.
    pub fn as_i32_mut(&mut self) -> &mut [i32] {
        assert_eq!(self.elem, ElementType::I32, "View is {:?}, not I32", self.elem);
        bytemuck::cast_slice_mut(self.bytes)
    }

    /// Zero-fill the backing bytes.
    pub fn fill_zero(&mut self) {
        self.bytes.fill(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_sizes() {
        assert_eq!(ElementType::F32.size_in_bytes(), 4);
        assert_eq!(ElementType::F16.size_in_bytes(), 2);
        assert_eq!(ElementType::I32.size_in_bytes(), 4);
        assert_eq!(ElementType::I64.size_in_bytes(), 8);
    }

    #[test]
    fn test_byte_size_of() {
        assert_eq!(byte_size_of(&[2, 3], ElementType::F32).unwrap(), 24);
        assert_eq!(byte_size_of(&[4], ElementType::F16).unwrap(), 8);
        assert_eq!(byte_size_of(&[], ElementType::I64).unwrap(), 8);
    }

    #[test]
    fn test_byte_size_overflow() {
        let err = byte_size_of(&[usize::MAX, 2], ElementType::F32).unwrap_err();
        assert!(matches!(err, GenerationError::SizeOverflow(_)));
    }

    #[test]
    fn test_view_as_f32_round_trip() {
        let data: Vec<f32> = vec![1.0, -2.5, 3.0, 0.0];
        let bytes: &[u8] = bytemuck::cast_slice(&data);
        let view = TensorView::new(&[2, 2], ElementType::F32, bytes);
        assert_eq!(view.shape(), &[2, 2]);
        assert_eq!(view.n_elements(), 4);
        assert_eq!(view.as_f32(), &[1.0, -2.5, 3.0, 0.0]);
    }

    #[test]
    fn test_view_as_i64() {
        // i64 carries position ids wider than i32 can hold.
        let data: Vec<i64> = vec![-1, 0, 1 << 40];
        let bytes: &[u8] = bytemuck::cast_slice(&data);
        let view = TensorView::new(&[3], ElementType::I64, bytes);
        assert_eq!(view.as_i64(), &[-1, 0, 1 << 40]);
    }

    #[test]
    #[should_panic(expected = "Byte length")]
    fn test_view_size_mismatch() {
        let bytes = [0u8; 10];
        TensorView::new(&[4], ElementType::F32, &bytes);
    }

    #[test]
    #[should_panic(expected = "not F32")]
    fn test_view_wrong_dtype_access() {
        let data = [0i32; 4];
        let bytes: &[u8] = bytemuck::cast_slice(&data);
        let view = TensorView::new(&[4], ElementType::I32, bytes);
        view.as_f32();
    }

    #[test]
    fn test_f16_to_f32_vec() {
        let bits: Vec<u16> = [1.0f32, -0.5, 2.0]
            .iter()
            .map(|&v| f16::from_f32(v).to_bits())
            .collect();
        let bytes: &[u8] = bytemuck::cast_slice(&bits);
        let view = TensorView::new(&[3], ElementType::F16, bytes);
        let widened = view.to_f32_vec();
        assert_eq!(widened.len(), 3);
        for (got, expected) in widened.iter().zip([1.0f32, -0.5, 2.0]) {
            assert!((got - expected).abs() < 0.01);
        }
    }

    #[test]
    fn test_view_mut_write_through() {
        let mut data = [0.0f32; 4];
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut data);
        let mut view = TensorViewMut::new(&[4], ElementType::F32, bytes);
        view.as_f32_mut()[2] = 7.0;
        view.fill_zero();
        view.as_f32_mut()[0] = 1.5;
        assert_eq!(data, [1.5, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_view_mut_i32() {
        let mut data = [0i32; 3];
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut data);
        let mut view = TensorViewMut::new(&[3], ElementType::I32, bytes);
        view.as_i32_mut().copy_from_slice(&[1, 2, 3]);
        assert_eq!(data, [1, 2, 3]);
    }
}
