use crate::discovery::NameResolver;

/// Resolves every endpoint to the same name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstantResolver {
    name: String,
}

impl ConstantResolver {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// A resolver that never knows a name.
    pub fn noop() -> Self {
        Self::default()
    }
}

impl NameResolver for ConstantResolver {
    fn get_name(&self, _host: &str, _port: u16) -> String {
        self.name.clone()
    }
}
