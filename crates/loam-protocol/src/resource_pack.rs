//! Reassembly of resource packs sent as ordered fragments.

use bytes::Bytes;
use log::{info, warn};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Invoked once per pack with the reassembled bytes.
pub type PackCompletion = Arc<dyn Fn(&PackId, &[u8]) + Send + Sync>;

/// Bedrock pack type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PackType {
    #[default]
    Invalid,
    Addon,
    Cached,
    CopyProtected,
    Behavior,
    PersonaPiece,
    Resource,
    Skins,
    WorldTemplate,
}

impl PackType {
    /// Unknown codes map to `Invalid`.
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => PackType::Addon,
            2 => PackType::Cached,
            3 => PackType::CopyProtected,
            4 => PackType::Behavior,
            5 => PackType::PersonaPiece,
            6 => PackType::Resource,
            7 => PackType::Skins,
            8 => PackType::WorldTemplate,
            _ => PackType::Invalid,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Pack uuid and version. Ids that are not valid uuids are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackId {
    pub uuid: Option<Uuid>,
    raw: String,
    pub version: String,
}

impl PackId {
    pub fn new(uuid: &str, version: &str) -> Self {
        PackId {
            uuid: Uuid::parse_str(uuid).ok(),
            raw: uuid.to_string(),
            version: version.to_string(),
        }
    }

    /// Parses the `<uuid>_<version>` form used in transfer messages.
    pub fn parse(pack_id: &str) -> Self {
        match pack_id.split_once('_') {
            Some((uuid, version)) => PackId::new(uuid, version),
            None => PackId::new(pack_id, ""),
        }
    }
}

impl fmt::Display for PackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.version.is_empty() {
            write!(f, "{}", self.raw)
        } else {
            write!(f, "{}_{}", self.raw, self.version)
        }
    }
}

/// Largest pack a transfer may announce unless overridden.
pub const DEFAULT_MAX_PACK_SIZE: u64 = 256 * 1024 * 1024;

/// How far an announced fragment count may stray from the one implied by
/// the sizes.
const FRAGMENT_COUNT_SLACK: u64 = 1;

/// Transfer state of a single pack.
pub struct ResourcePackEntry {
    id: PackId,
    pack_type: PackType,
    hash: Vec<u8>,
    // Accepted fragments, always indices 0..next_expected
    fragments: Vec<Bytes>,
    fragment_count: u32,
    max_fragment_size: u32,
    expected_size: u64,
    max_pack_size: u64,
    received: u64,
    next_expected: u32,
    completed: Option<Bytes>,
    on_complete: Option<PackCompletion>,
}

impl ResourcePackEntry {
    pub fn new(uuid: &str, version: &str) -> Self {
        Self::with_id(PackId::new(uuid, version))
    }

    pub fn with_id(id: PackId) -> Self {
        ResourcePackEntry {
            id,
            pack_type: PackType::Invalid,
            hash: Vec::new(),
            fragments: Vec::new(),
            fragment_count: 0,
            max_fragment_size: 0,
            expected_size: 0,
            max_pack_size: DEFAULT_MAX_PACK_SIZE,
            received: 0,
            next_expected: 0,
            completed: None,
            on_complete: None,
        }
    }

    pub fn set_on_complete(&mut self, hook: PackCompletion) {
        self.on_complete = Some(hook);
    }

    /// Upper bound on the `total_size` a transfer may announce.
    pub fn set_max_pack_size(&mut self, max_pack_size: u64) {
        self.max_pack_size = max_pack_size;
    }

    pub fn max_pack_size(&self) -> u64 {
        self.max_pack_size
    }

    /// Starts (or restarts) a transfer. Slots follow `fragment_count`.
    ///
    /// A header announcing more than the maximum pack size, or a fragment
    /// count that cannot describe `total_size`, is refused: the entry is left
    /// without a transfer and every fragment is rejected until a valid header
    /// arrives.
    pub fn set_transfer_info(
        &mut self,
        pack_type: PackType,
        hash: &[u8],
        fragment_count: u32,
        max_fragment_size: u32,
        total_size: u64,
    ) -> bool {
        self.reset_transfer();

        if total_size > self.max_pack_size {
            warn!(
                "Pack {}: refusing {} byte transfer, limit is {} bytes",
                self.id, total_size, self.max_pack_size
            );
            return false;
        }

        let derived = if max_fragment_size == 0 {
            0
        } else {
            total_size.div_ceil(max_fragment_size as u64)
        };
        if derived.abs_diff(fragment_count as u64) > FRAGMENT_COUNT_SLACK {
            warn!(
                "Pack {}: refusing transfer, {} fragments announced but {} bytes in {} byte fragments needs {}",
                self.id, fragment_count, total_size, max_fragment_size, derived
            );
            return false;
        }
        if derived != fragment_count as u64 {
            warn!(
                "Pack {}: {} fragments announced, {} bytes in {} byte fragments needs {}",
                self.id, fragment_count, total_size, max_fragment_size, derived
            );
        }

        self.pack_type = pack_type;
        self.hash = hash.to_vec();
        self.fragment_count = fragment_count;
        self.max_fragment_size = max_fragment_size;
        self.expected_size = total_size;
        true
    }

    fn reset_transfer(&mut self) {
        self.fragments.clear();
        self.fragment_count = 0;
        self.max_fragment_size = 0;
        self.expected_size = 0;
        self.received = 0;
        self.next_expected = 0;
        self.completed = None;
    }

    /// Accepts fragment `index` only if it is the next one expected.
    pub fn set_fragment(&mut self, index: u32, data: Bytes) -> bool {
        if index != self.next_expected || index >= self.fragment_count {
            warn!(
                "Pack {}: received wrong fragment index, expected={} received={}",
                self.id, self.next_expected, index
            );
            return false;
        }

        if self.received + data.len() as u64 > self.expected_size {
            warn!(
                "Pack {}: fragment {} of {} bytes overruns the {} byte pack",
                self.id,
                index,
                data.len(),
                self.expected_size
            );
            return false;
        }

        self.received += data.len() as u64;
        self.fragments.push(data);
        self.next_expected += 1;

        if self.next_expected == self.fragment_count {
            self.complete();
        }
        true
    }

    fn complete(&mut self) {
        let mut data: Vec<u8> = Vec::new();
        let reserved = usize::try_from(self.expected_size)
            .ok()
            .filter(|expected| data.try_reserve_exact(*expected).is_ok());
        let Some(expected) = reserved else {
            warn!(
                "Pack {}: cannot allocate {} bytes, transfer dropped",
                self.id, self.expected_size
            );
            self.reset_transfer();
            return;
        };

        for fragment in &self.fragments {
            data.extend_from_slice(fragment);
        }
        data.resize(expected, 0);
        let data = Bytes::from(data);
        self.fragments.clear();

        info!(
            "Pack {} ({:?}) complete, {} bytes",
            self.id,
            self.pack_type,
            data.len()
        );
        if let Some(hook) = &self.on_complete {
            hook(&self.id, &data);
        }
        self.completed = Some(data);
    }

    /// Indices still missing, ascending. Each call starts over.
    pub fn missing_fragments(&self) -> impl Iterator<Item = u32> + '_ {
        self.next_expected..self.fragment_count
    }

    pub fn total_received(&self) -> u64 {
        self.received
    }

    pub fn expected_size(&self) -> u64 {
        self.expected_size
    }

    pub fn is_complete(&self) -> bool {
        self.completed.is_some()
    }

    pub fn data(&self) -> Option<&Bytes> {
        self.completed.as_ref()
    }

    pub fn next_expected(&self) -> u32 {
        self.next_expected
    }

    pub fn fragment_count(&self) -> usize {
        self.fragment_count as usize
    }

    pub fn max_fragment_size(&self) -> u32 {
        self.max_fragment_size
    }

    pub fn id(&self) -> &PackId {
        &self.id
    }

    pub fn pack_type(&self) -> PackType {
        self.pack_type
    }

    pub fn hash(&self) -> &[u8] {
        &self.hash
    }
}

/// Transfers keyed by the `<uuid>_<version>` pack id string.
#[derive(Default)]
pub struct ResourcePackManager {
    entries: HashMap<String, ResourcePackEntry>,
    on_complete: Option<PackCompletion>,
    max_pack_size: Option<u64>,
}

impl ResourcePackManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hook handed to every entry created afterwards.
    pub fn set_on_complete(&mut self, hook: PackCompletion) {
        self.on_complete = Some(hook);
    }

    /// Size limit for entries created afterwards.
    pub fn set_max_pack_size(&mut self, max_pack_size: u64) {
        self.max_pack_size = Some(max_pack_size);
    }

    /// False when the entry refused the header.
    pub fn set_transfer_info(
        &mut self,
        pack_id: &str,
        pack_type: PackType,
        hash: &[u8],
        fragment_count: u32,
        max_fragment_size: u32,
        total_size: u64,
    ) -> bool {
        let hook = self.on_complete.clone();
        let max_pack_size = self.max_pack_size;
        let entry = self.entries.entry(pack_id.to_string()).or_insert_with(|| {
            let mut entry = ResourcePackEntry::with_id(PackId::parse(pack_id));
            if let Some(hook) = hook {
                entry.set_on_complete(hook);
            }
            if let Some(max_pack_size) = max_pack_size {
                entry.set_max_pack_size(max_pack_size);
            }
            entry
        });
        entry.set_transfer_info(pack_type, hash, fragment_count, max_fragment_size, total_size)
    }

    pub fn set_fragment(&mut self, pack_id: &str, index: u32, data: Bytes) -> bool {
        match self.entries.get_mut(pack_id) {
            Some(entry) => entry.set_fragment(index, data),
            None => {
                warn!("Fragment {} for unknown pack {}", index, pack_id);
                false
            }
        }
    }

    /// Empty for unknown packs.
    pub fn missing_fragments(&self, pack_id: &str) -> impl Iterator<Item = u32> + '_ {
        self.entries
            .get(pack_id)
            .into_iter()
            .flat_map(|entry| entry.missing_fragments())
    }

    pub fn entry(&self, pack_id: &str) -> Option<&ResourcePackEntry> {
        self.entries.get(pack_id)
    }

    /// Removes a completed transfer and hands back its bytes.
    pub fn take_completed(&mut self, pack_id: &str) -> Option<(PackId, Bytes)> {
        if !self.entries.get(pack_id)?.is_complete() {
            return None;
        }
        let entry = self.entries.remove(pack_id)?;
        let data = entry.completed?;
        Some((entry.id, data))
    }

    pub fn discard(&mut self, pack_id: &str) -> bool {
        self.entries.remove(pack_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
