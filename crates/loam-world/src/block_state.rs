use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

pub const AIR: &str = "minecraft:air";

struct StateData {
    runtime_id: u32,
    name: String,
    properties: BTreeMap<String, String>,
}

/// An interned block state. Instances are only created by a
/// [`BlockRegistry`](crate::registry::BlockRegistry); cloning shares the same
/// allocation, so identity and equality coincide.
#[derive(Clone)]
pub struct BlockState(Arc<StateData>);

impl BlockState {
    pub(crate) fn new(runtime_id: u32, name: String, properties: BTreeMap<String, String>) -> Self {
        BlockState(Arc::new(StateData {
            runtime_id,
            name,
            properties,
        }))
    }

    pub fn runtime_id(&self) -> u32 {
        self.0.runtime_id
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.0.properties.get(key).map(String::as_str)
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.0.properties
    }

    pub fn is_air(&self) -> bool {
        self.0.name == AIR
    }

    /// True when both handles point at the same interned state.
    pub fn same_instance(&self, other: &BlockState) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for BlockState {
    fn eq(&self, other: &Self) -> bool {
        self.same_instance(other)
            || (self.0.runtime_id == other.0.runtime_id && self.0.name == other.0.name)
    }
}

impl Eq for BlockState {}

impl Hash for BlockState {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.runtime_id.hash(state);
    }
}

/// `minecraft:oak_stairs[facing=west,half=bottom]`
impl fmt::Display for BlockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.name)?;
        if !self.0.properties.is_empty() {
            write!(f, "[")?;
            for (i, (key, value)) in self.0.properties.iter().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                write!(f, "{}={}", key, value)?;
            }
            write!(f, "]")?;
        }
        Ok(())
    }
}

impl fmt::Debug for BlockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockState#{}({})", self.0.runtime_id, self)
    }
}
