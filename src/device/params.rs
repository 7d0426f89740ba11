use crate::device::DeviceError;

#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
}

impl ParamValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    /// Raw bytes of string or byte values.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::String(value) => Some(value.as_bytes()),
            Self::Bytes(value) => Some(value),
            _ => None,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Double(_) => "double",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
        }
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Vec<u8>> for ParamValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub value: ParamValue,
}

/// Ordered list of named values.  Names are unique; setting an existing name replaces its value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamList {
    params: Vec<Param>,
}

impl ParamList {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        let name = name.into();
        let value = value.into();
        match self.params.iter_mut().find(|p| p.name == name) {
            Some(existing) => existing.value = value,
            None => self.params.push(Param { name, value }),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.params.iter().find(|p| p.name == name).map(|p| &p.value)
    }

    pub fn bool_param(&self, name: &str) -> Result<bool, DeviceError> {
        let value = self.require(name)?;
        value
            .as_bool()
            .ok_or_else(|| DeviceError::invalid_param(name, value, "bool"))
    }

    /// String or byte value, as raw bytes.
    pub fn bytes_param(&self, name: &str) -> Result<&[u8], DeviceError> {
        let value = self.require(name)?;
        value
            .as_bytes()
            .ok_or_else(|| DeviceError::invalid_param(name, value, "string or bytes"))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Param> {
        self.params.iter()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    fn require(&self, name: &str) -> Result<&ParamValue, DeviceError> {
        self.get(name).ok_or_else(|| DeviceError::InvalidParam {
            name: name.to_string(),
            reason: "missing".to_string(),
        })
    }
}

impl DeviceError {
    fn invalid_param(name: &str, value: &ParamValue, expected: &str) -> Self {
        Self::InvalidParam {
            name: name.to_string(),
            reason: format!("expected {expected}, got {}", value.type_name()),
        }
    }
}
