use crate::block_state::{BlockState, AIR};
use log::warn;
use loam_common::Result;
use serde::Deserialize;
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};

/// Block list entry, in the layout of the `blocks.json` files published for
/// each protocol version.
#[derive(Deserialize, Debug)]
struct BlockEntry {
    name: String,
    #[serde(rename = "minStateId", default)]
    min_state_id: Option<u32>,
    #[serde(default)]
    states: Vec<StateEntry>,
    #[serde(rename = "defaultState", default)]
    default_state: Option<u32>,
}

#[derive(Deserialize, Debug)]
struct StateEntry {
    name: String,
    #[serde(rename = "type", default)]
    state_type: String,
    #[serde(default)]
    num_values: usize,
    #[serde(default)]
    values: Vec<String>,
}

impl StateEntry {
    fn values(&self) -> Vec<String> {
        if !self.values.is_empty() {
            return self.values.clone();
        }
        match self.state_type.as_str() {
            "bool" => vec!["true".to_string(), "false".to_string()],
            _ => (0..self.num_values).map(|v| v.to_string()).collect(),
        }
    }
}

/// Legacy `(id, data)` to state mapping entry.
#[derive(Deserialize, Debug)]
struct LegacyEntry {
    id: i32,
    data: u8,
    name: String,
    #[serde(default)]
    properties: BTreeMap<String, String>,
}

struct BlockVariants {
    default: BlockState,
    variants: Vec<BlockState>,
}

/// Prefixes bare names with the `minecraft:` namespace.
pub fn canonical_name(name: &str) -> Cow<'_, str> {
    if name.contains(':') {
        Cow::Borrowed(name)
    } else {
        Cow::Owned(format!("minecraft:{}", name))
    }
}

/// Name, runtime id and legacy `(id, metadata)` lookups over the interned set of
/// block states, plus variant resolution for property changes.
pub struct BlockRegistry {
    by_runtime_id: HashMap<u32, BlockState>,
    blocks: HashMap<String, BlockVariants>,
    legacy: HashMap<(i32, u8), BlockState>,
    air: BlockState,
}

impl BlockRegistry {
    pub fn builder() -> BlockRegistryBuilder {
        BlockRegistryBuilder::new()
    }

    /// Loads a block list and an optional legacy mapping, both JSON.
    pub fn from_json(blocks_json: &str, legacy_json: Option<&str>) -> Result<Self> {
        let mut builder = BlockRegistryBuilder::new().blocks_json(blocks_json)?;
        if let Some(legacy_json) = legacy_json {
            builder = builder.legacy_json(legacy_json)?;
        }
        Ok(builder.build())
    }

    pub fn air(&self) -> &BlockState {
        &self.air
    }

    pub fn len(&self) -> usize {
        self.by_runtime_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_runtime_id.is_empty()
    }

    pub fn by_runtime_id(&self, runtime_id: u32) -> Option<&BlockState> {
        self.by_runtime_id.get(&runtime_id)
    }

    /// Default state of the named block.
    pub fn by_name(&self, name: &str) -> Option<&BlockState> {
        self.blocks
            .get(canonical_name(name).as_ref())
            .map(|block| &block.default)
    }

    /// The state mapped to a legacy numeric id and metadata value.
    pub fn by_legacy(&self, id: i32, meta: u8) -> Option<&BlockState> {
        self.legacy.get(&(id, meta))
    }

    pub fn with_property(&self, state: &BlockState, key: &str, value: &str) -> BlockState {
        self.with_properties(state, &[(key, value)], &[])
    }

    /// Resolves the registered variant of `state`'s block that has `changes`
    /// applied and every `cleared` property reset to the block default.
    /// Returns `state` unchanged when the block has no such variant, so a
    /// change is never partially applied.
    pub fn with_properties(
        &self,
        state: &BlockState,
        changes: &[(&str, &str)],
        cleared: &[&str],
    ) -> BlockState {
        let Some(block) = self.blocks.get(state.name()) else {
            return state.clone();
        };

        let mut desired = state.properties().clone();
        for (key, value) in changes {
            match desired.get_mut(*key) {
                Some(current) => *current = value.to_string(),
                None => return state.clone(),
            }
        }
        for key in cleared {
            if let (Some(current), Some(default)) =
                (desired.get_mut(*key), block.default.property(key))
            {
                *current = default.to_string();
            }
        }

        block
            .variants
            .iter()
            .find(|variant| variant.properties() == &desired)
            .cloned()
            .unwrap_or_else(|| state.clone())
    }
}

pub struct BlockRegistryBuilder {
    by_runtime_id: HashMap<u32, BlockState>,
    blocks: HashMap<String, BlockVariants>,
    legacy: Vec<(i32, u8, String, BTreeMap<String, String>)>,
    next_runtime_id: u32,
}

impl Default for BlockRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockRegistryBuilder {
    /// Starts a registry holding `minecraft:air` at runtime id 0.
    pub fn new() -> Self {
        let mut builder = BlockRegistryBuilder {
            by_runtime_id: HashMap::new(),
            blocks: HashMap::new(),
            legacy: Vec::new(),
            next_runtime_id: 0,
        };
        builder.push_block(AIR, Vec::new(), None, None);
        builder
    }

    /// Registers every combination of `properties`; the first value of each
    /// property makes up the default state.
    pub fn block(mut self, name: &str, properties: &[(&str, &[&str])]) -> Self {
        let properties = properties
            .iter()
            .map(|(key, values)| {
                (
                    key.to_string(),
                    values.iter().map(|v| v.to_string()).collect(),
                )
            })
            .collect();
        self.push_block(name, properties, None, None);
        self
    }

    /// Maps a legacy `(id, meta)` pair to the variant of `name` carrying
    /// `properties` (the default state when empty).
    pub fn legacy(mut self, id: i32, meta: u8, name: &str, properties: &[(&str, &str)]) -> Self {
        self.legacy.push((
            id,
            meta,
            canonical_name(name).into_owned(),
            properties
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        ));
        self
    }

    pub fn blocks_json(mut self, json: &str) -> Result<Self> {
        let entries: Vec<BlockEntry> = serde_json::from_str(json)?;
        for entry in entries {
            let properties = entry
                .states
                .iter()
                .map(|state| (state.name.clone(), state.values()))
                .collect();
            self.push_block(
                &entry.name,
                properties,
                entry.min_state_id,
                entry.default_state,
            );
        }
        Ok(self)
    }

    pub fn legacy_json(mut self, json: &str) -> Result<Self> {
        let entries: Vec<LegacyEntry> = serde_json::from_str(json)?;
        for entry in entries {
            self.legacy.push((
                entry.id,
                entry.data,
                canonical_name(&entry.name).into_owned(),
                entry.properties,
            ));
        }
        Ok(self)
    }

    fn push_block(
        &mut self,
        name: &str,
        properties: Vec<(String, Vec<String>)>,
        first_id: Option<u32>,
        default_id: Option<u32>,
    ) {
        let name = canonical_name(name).into_owned();
        if self.blocks.contains_key(&name) {
            if name != AIR {
                warn!("Block {} registered twice, keeping the first", name);
            }
            return;
        }

        if let Some(first_id) = first_id {
            self.next_runtime_id = first_id;
        }

        // Last property varies fastest, matching state id order in blocks.json
        let combinations: usize = properties.iter().map(|(_, v)| v.len().max(1)).product();
        let mut variants = Vec::with_capacity(combinations);
        for offset in 0..combinations {
            let mut remaining = offset;
            let mut values = BTreeMap::new();
            for (key, choices) in properties.iter().rev() {
                if choices.is_empty() {
                    continue;
                }
                values.insert(key.clone(), choices[remaining % choices.len()].clone());
                remaining /= choices.len();
            }

            let state = BlockState::new(self.next_runtime_id, name.clone(), values);
            self.by_runtime_id.insert(self.next_runtime_id, state.clone());
            self.next_runtime_id += 1;
            variants.push(state);
        }

        let default = default_id
            .and_then(|id| variants.iter().find(|v| v.runtime_id() == id))
            .unwrap_or(&variants[0])
            .clone();

        self.blocks.insert(name, BlockVariants { default, variants });
    }

    pub fn build(self) -> BlockRegistry {
        let mut legacy = HashMap::new();
        for (id, meta, name, properties) in self.legacy {
            let Some(block) = self.blocks.get(&name) else {
                warn!("Legacy mapping {}:{} names unknown block {}", id, meta, name);
                continue;
            };
            let found = if properties.is_empty() {
                Some(block.default.clone())
            } else {
                block
                    .variants
                    .iter()
                    .find(|variant| {
                        properties
                            .iter()
                            .all(|(k, v)| variant.property(k) == Some(v.as_str()))
                    })
                    .cloned()
            };
            match found {
                Some(state) => {
                    legacy.insert((id, meta), state);
                }
                None => warn!(
                    "Legacy mapping {}:{} has no matching variant of {}",
                    id, meta, name
                ),
            }
        }

        let air = self.blocks[AIR].default.clone();
        BlockRegistry {
            by_runtime_id: self.by_runtime_id,
            blocks: self.blocks,
            legacy,
            air,
        }
    }
}
