/// 4-bit cells packed two per byte, low nibble first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NibbleArray {
    data: Vec<u8>,
}

impl NibbleArray {
    /// Array of `len` zeroed cells. `len` is rounded up to an even count.
    pub fn new(len: usize) -> Self {
        NibbleArray {
            data: vec![0; len.div_ceil(2)],
        }
    }

    pub fn from_bytes(data: Vec<u8>) -> Self {
        NibbleArray { data }
    }

    pub fn get(&self, index: usize) -> u8 {
        let byte = self.data[index >> 1];
        if index & 1 == 0 {
            byte & 0x0F
        } else {
            byte >> 4
        }
    }

    pub fn set(&mut self, index: usize, value: u8) {
        let byte = &mut self.data[index >> 1];
        let value = value & 0x0F;
        if index & 1 == 0 {
            *byte = (*byte & 0xF0) | value;
        } else {
            *byte = (*byte & 0x0F) | (value << 4);
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.data.len() * 2
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
