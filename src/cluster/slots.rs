use crate::network::HostKey;

/// Fixed size of the cluster slot space
pub const SLOT_COUNT: usize = 16384;

/// State of the slot table. Only `Ok` permits direct dispatch; in the other
/// two states commands are parked until the next successful refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Invalid,
    Updating,
    Ok,
}

/// One row of the slot table: the nodes serving this slot, master first.
/// Replicas are tracked but never dispatched to.
#[derive(Debug, Clone)]
pub struct Slot {
    index: u16,
    pub(crate) hosts: Vec<HostKey>,
}

impl Slot {
    pub(crate) fn new(index: u16) -> Self {
        Slot {
            index,
            hosts: Vec::new(),
        }
    }

    /// Position of this row in the slot table, immutable for its lifetime
    pub fn index(&self) -> u16 {
        self.index
    }

    /// Current master, if the row is populated
    pub fn master(&self) -> Option<&HostKey> {
        self.hosts.first()
    }

    /// All nodes serving the slot, master first
    pub fn hosts(&self) -> &[HostKey] {
        &self.hosts
    }
}

/// Maps a key to its slot: CRC16 over the hash tag (or the whole key) masked
/// into the slot space.
pub fn key_slot(key: &[u8]) -> u16 {
    crc16(hash_tag(key)) & (SLOT_COUNT as u16 - 1)
}

/// Extracts the `{...}` hash tag if present and non-empty, so that keys
/// sharing a tag land on the same slot. First `{`, first following `}`.
fn hash_tag(key: &[u8]) -> &[u8] {
    let open = match key.iter().position(|byte| *byte == b'{') {
        Some(position) => position,
        None => return key,
    };

    match key[open + 1..].iter().position(|byte| *byte == b'}') {
        Some(length) if length > 0 => &key[open + 1..open + 1 + length],
        _ => key,
    }
}

/// CRC16/XMODEM: polynomial 0x1021, init 0, no reflection, no final xor
pub(crate) fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;

    for byte in data {
        crc ^= (*byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }

    crc
}
