use serde_json::Value;

use crate::errors::LearningError;

/// Opening mode of a [`Serializer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    /// Not open.
    Closed,
    /// Accepting `put_*` calls.
    Write,
    /// Serving `get_*` calls.
    Read,
}

/// Positional stream used to transfer statistics objects between processes.
///
/// Fields carry no names or tags: every type reads its fields back in exactly the order
/// it wrote them.
#[derive(Debug, Clone)]
pub struct Serializer {
    mode: StreamMode,
    tokens: Vec<Value>,
    position: usize,
}

impl Default for Serializer {
    fn default() -> Self {
        Self {
            mode: StreamMode::Closed,
            tokens: Vec::new(),
            position: 0,
        }
    }
}

/// Types that write and read themselves through a [`Serializer`].
pub trait StreamSerializable {
    /// Appends the fields to the stream.
    fn serialize(&self, stream: &mut Serializer) -> Result<(), LearningError>;
    /// Reads the fields back in the same order.
    fn deserialize(&mut self, stream: &mut Serializer) -> Result<(), LearningError>;
}

impl Serializer {
    /// Creates a closed stream.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens for writing, discarding previous content.
    pub fn open_for_write(&mut self) {
        debug_assert_eq!(self.mode, StreamMode::Closed);
        self.mode = StreamMode::Write;
        self.tokens.clear();
        self.position = 0;
    }

    /// Opens for reading the given tokens.
    pub fn open_for_read(&mut self, tokens: Vec<Value>) {
        debug_assert_eq!(self.mode, StreamMode::Closed);
        self.mode = StreamMode::Read;
        self.tokens = tokens;
        self.position = 0;
    }

    /// Closes the stream.
    pub fn close(&mut self) {
        self.mode = StreamMode::Closed;
    }

    /// Current mode.
    #[must_use]
    pub const fn mode(&self) -> StreamMode {
        self.mode
    }

    /// Written tokens.
    #[must_use]
    pub fn tokens(&self) -> &[Value] {
        &self.tokens
    }

    /// Consumes the stream, returning its tokens.
    #[must_use]
    pub fn into_tokens(self) -> Vec<Value> {
        self.tokens
    }

    /// Encodes the tokens as a JSON array.
    pub fn to_bytes(&self) -> Result<Vec<u8>, LearningError> {
        Ok(serde_json::to_vec(&self.tokens)?)
    }

    /// Decodes tokens produced by [`Serializer::to_bytes`] and opens for reading.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LearningError> {
        let tokens: Vec<Value> = serde_json::from_slice(bytes)?;
        let mut stream = Self::new();
        stream.open_for_read(tokens);
        Ok(stream)
    }

    /// Whether every token was read.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.position >= self.tokens.len()
    }

    /// Writes a string.
    pub fn put_string(&mut self, value: &str) -> Result<(), LearningError> {
        self.put(Value::String(value.to_owned()))
    }

    /// Writes an integer.
    pub fn put_int(&mut self, value: i64) -> Result<(), LearningError> {
        self.put(Value::from(value))
    }

    /// Writes a count.
    pub fn put_count(&mut self, value: usize) -> Result<(), LearningError> {
        self.put(Value::from(value))
    }

    /// Writes a double; infinities are kept through a string token.
    pub fn put_double(&mut self, value: f64) -> Result<(), LearningError> {
        if value.is_finite() {
            self.put(Value::from(value))
        } else if value.is_nan() {
            self.put(Value::String("nan".into()))
        } else if value > 0.0 {
            self.put(Value::String("+inf".into()))
        } else {
            self.put(Value::String("-inf".into()))
        }
    }

    /// Writes a boolean.
    pub fn put_boolean(&mut self, value: bool) -> Result<(), LearningError> {
        self.put(Value::Bool(value))
    }

    /// Reads a string.
    pub fn get_string(&mut self) -> Result<String, LearningError> {
        match self.next_token()? {
            Value::String(value) => Ok(value),
            other => Err(mismatch("string", &other)),
        }
    }

    /// Reads an integer.
    pub fn get_int(&mut self) -> Result<i64, LearningError> {
        let token = self.next_token()?;
        token.as_i64().ok_or_else(|| mismatch("int", &token))
    }

    /// Reads a count.
    pub fn get_count(&mut self) -> Result<usize, LearningError> {
        let token = self.next_token()?;
        token
            .as_u64()
            .and_then(|value| usize::try_from(value).ok())
            .ok_or_else(|| mismatch("count", &token))
    }

    /// Reads a double.
    pub fn get_double(&mut self) -> Result<f64, LearningError> {
        match self.next_token()? {
            Value::Number(number) => number
                .as_f64()
                .ok_or_else(|| LearningError::Stream("number out of range".into())),
            Value::String(text) if text == "+inf" => Ok(f64::INFINITY),
            Value::String(text) if text == "-inf" => Ok(f64::NEG_INFINITY),
            Value::String(text) if text == "nan" => Ok(f64::NAN),
            other => Err(mismatch("double", &other)),
        }
    }

    /// Reads a boolean.
    pub fn get_boolean(&mut self) -> Result<bool, LearningError> {
        match self.next_token()? {
            Value::Bool(value) => Ok(value),
            other => Err(mismatch("boolean", &other)),
        }
    }

    fn put(&mut self, value: Value) -> Result<(), LearningError> {
        if self.mode != StreamMode::Write {
            return Err(LearningError::Stream("stream not open for write".into()));
        }
        self.tokens.push(value);
        Ok(())
    }

    fn next_token(&mut self) -> Result<Value, LearningError> {
        if self.mode != StreamMode::Read {
            return Err(LearningError::Stream("stream not open for read".into()));
        }
        let token = self
            .tokens
            .get(self.position)
            .cloned()
            .ok_or_else(|| LearningError::Stream(format!("underflow at token {}", self.position)))?;
        self.position += 1;
        Ok(token)
    }
}

fn mismatch(expected: &str, found: &Value) -> LearningError {
    LearningError::Stream(format!("expected {expected}, found {found}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_back_in_write_order() {
        let mut stream = Serializer::new();
        stream.open_for_write();
        stream.put_boolean(true).unwrap();
        stream.put_string("Age").unwrap();
        stream.put_double(f64::NEG_INFINITY).unwrap();
        stream.put_count(12).unwrap();
        stream.close();

        let bytes = stream.to_bytes().unwrap();
        let mut reader = Serializer::from_bytes(&bytes).unwrap();
        assert!(reader.get_boolean().unwrap());
        assert_eq!(reader.get_string().unwrap(), "Age");
        assert_eq!(reader.get_double().unwrap(), f64::NEG_INFINITY);
        assert_eq!(reader.get_count().unwrap(), 12);
        assert!(reader.is_exhausted());
        assert!(matches!(reader.get_int(), Err(LearningError::Stream(_))));
    }

    #[test]
    fn type_mismatch_is_reported() {
        let mut stream = Serializer::new();
        stream.open_for_write();
        stream.put_string("x").unwrap();
        let tokens = stream.into_tokens();
        let mut reader = Serializer::new();
        reader.open_for_read(tokens);
        assert!(reader.get_boolean().is_err());
    }

    #[test]
    fn writing_requires_write_mode() {
        let mut stream = Serializer::new();
        assert!(stream.put_int(1).is_err());
    }
}
