//! The register file: the interpreter's only mutable state

/// Number of register slots; index 0 through 20
pub const REGISTER_COUNT: usize = 21;

/// Fixed array of string slots owned by one function execution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registers {
    slots: [String; REGISTER_COUNT],
}

impl Registers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw stored text; out of range reads as empty
    pub fn get(&self, index: usize) -> &str {
        self.slots.get(index).map(String::as_str).unwrap_or("")
    }

    /// Store text, returning `false` if the index is out of range
    pub fn set(&mut self, index: usize, text: String) -> bool {
        match self.slots.get_mut(index) {
            Some(slot) => {
                *slot = text;
                true
            }
            None => false,
        }
    }

    pub fn append(&mut self, index: usize, text: &str) -> bool {
        match self.slots.get_mut(index) {
            Some(slot) => {
                slot.push_str(text);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(String::clear);
    }

    /// Copy inputs into registers `0..inputs.len()`; higher slots are untouched
    pub fn load<S: AsRef<str>>(&mut self, inputs: &[S]) {
        for (slot, input) in self.slots.iter_mut().zip(inputs) {
            *slot = input.as_ref().to_string();
        }
        if inputs.len() > REGISTER_COUNT {
            log::warn!(
                "Ignoring {} inputs beyond register {}",
                inputs.len() - REGISTER_COUNT,
                REGISTER_COUNT - 1
            );
        }
    }

    pub fn is_clear(&self) -> bool {
        self.slots.iter().all(String::is_empty)
    }
}
