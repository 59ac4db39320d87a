//! Chain primitives exchanged across the engine boundary

use sha2::{Digest, Sha256};
use std::fmt;
use std::time::Duration;

/// Country code prefix of user-facing addresses
const ADDRESS_COUNTRY_CODE: &str = "NQ";

/// Base32 alphabet used for user-facing addresses (no I, O, W, Z)
const ADDRESS_ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHJKLMNPQRSTUVXY";

/// Lunas per coin
pub const LUNAS_PER_COIN: u64 = 100_000;

/// Convert an amount in lunas to coins for display
pub fn lunas_to_coins(lunas: u64) -> f64 {
    lunas as f64 / LUNAS_PER_COIN as f64
}

/// 20-byte account address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; 20]);

impl Address {
    pub const SIZE: usize = 20;

    pub fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Derive an address from arbitrary seed material
    pub fn derive(seed: &[u8]) -> Self {
        let digest = Sha256::digest(seed);
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest[..Self::SIZE]);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// IBAN-style representation, e.g. `NQ07 0000 0000 0000 0000 0000 0000 0000 0000`
    pub fn to_user_friendly(&self) -> String {
        let base32 = base32_encode(&self.0);
        let check = 98 - iban_check(&format!("{base32}{ADDRESS_COUNTRY_CODE}00"));
        let plain = format!("{ADDRESS_COUNTRY_CODE}{check:02}{base32}");

        plain
            .as_bytes()
            .chunks(4)
            .map(|chunk| String::from_utf8_lossy(chunk))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_user_friendly())
    }
}

fn base32_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 8 / 5 + 1);
    let mut buffer: u32 = 0;
    let mut bits: u32 = 0;

    for &byte in bytes {
        buffer = (buffer << 8) | u32::from(byte);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(ADDRESS_ALPHABET[((buffer >> bits) & 0x1f) as usize] as char);
        }
    }
    if bits > 0 {
        out.push(ADDRESS_ALPHABET[((buffer << (5 - bits)) & 0x1f) as usize] as char);
    }
    out
}

/// ISO 7064 mod 97 over the alphanumeric expansion of `input`
fn iban_check(input: &str) -> u32 {
    let mut remainder: u32 = 0;
    for c in input.chars() {
        let value = match c.to_digit(10) {
            Some(digit) => digit,
            None => c.to_ascii_uppercase() as u32 - 'A' as u32 + 10,
        };
        remainder = if value >= 10 {
            (remainder * 100 + value) % 97
        } else {
            (remainder * 10 + value) % 97
        };
    }
    remainder
}

/// 32-byte content hash (blocks and transactions)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Hash([u8; 32]);

impl Hash {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn digest(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// A basic value transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub sender: Address,
    pub recipient: Address,
    /// Amount in lunas
    pub value: u64,
    pub fee: u64,
    pub validity_start_height: u32,
    pub data: Vec<u8>,
}

impl Transaction {
    pub fn basic(sender: Address, recipient: Address, value: u64, validity_start_height: u32) -> Self {
        Self {
            sender,
            recipient,
            value,
            fee: 0,
            validity_start_height,
            data: Vec::new(),
        }
    }

    /// Canonical content serialization (the bytes the hash commits to)
    pub fn serialize_content(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(2 + self.data.len() + 2 * Address::SIZE + 8 + 8 + 4);
        buf.extend_from_slice(&(self.data.len() as u16).to_be_bytes());
        buf.extend_from_slice(&self.data);
        buf.extend_from_slice(self.sender.as_bytes());
        buf.extend_from_slice(self.recipient.as_bytes());
        buf.extend_from_slice(&self.value.to_be_bytes());
        buf.extend_from_slice(&self.fee.to_be_bytes());
        buf.extend_from_slice(&self.validity_start_height.to_be_bytes());
        buf
    }

    pub fn hash(&self) -> Hash {
        Hash::digest(&self.serialize_content())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub prev_hash: Hash,
    pub height: u32,
    pub timestamp: u64,
    pub body_hash: Hash,
}

impl BlockHeader {
    pub fn hash(&self) -> Hash {
        let mut buf = Vec::with_capacity(32 + 4 + 8 + 32);
        buf.extend_from_slice(self.prev_hash.as_bytes());
        buf.extend_from_slice(&self.height.to_be_bytes());
        buf.extend_from_slice(&self.timestamp.to_be_bytes());
        buf.extend_from_slice(self.body_hash.as_bytes());
        Hash::digest(&buf)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BlockBody {
    pub transactions: Vec<Transaction>,
}

impl BlockBody {
    pub fn hash(&self) -> Hash {
        let mut buf = Vec::with_capacity(self.transactions.len() * 32);
        for tx in &self.transactions {
            buf.extend_from_slice(tx.hash().as_bytes());
        }
        Hash::digest(&buf)
    }
}

/// Block as returned by a fetch; `body` is `None` when fetched header-only
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub header: BlockHeader,
    pub body: Option<BlockBody>,
}

impl Block {
    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    pub fn height(&self) -> u32 {
        self.header.height
    }

    pub fn without_body(&self) -> Self {
        Self {
            header: self.header.clone(),
            body: None,
        }
    }
}

/// Network-level peer address, e.g. `wss://seed-1.nimiq.com:8443`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerAddress(String);

impl PeerAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Peer as reported by the network layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub address: PeerAddress,
    /// Remote clock minus local clock, in milliseconds
    pub time_offset_ms: i64,
}

impl PeerInfo {
    pub fn time_offset(&self) -> Duration {
        Duration::from_millis(self.time_offset_ms.unsigned_abs())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    Joined(PeerInfo),
    Left(PeerInfo),
}

/// Named genesis configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenesisConfig {
    pub network: String,
    pub network_id: u8,
    pub seed_peers: Vec<PeerAddress>,
}

impl GenesisConfig {
    pub fn is_seed(&self, peer: &PeerAddress) -> bool {
        self.seed_peers.iter().any(|seed| seed == peer)
    }
}

/// Local node identity announced to peers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIdentity {
    pub peer_address: PeerAddress,
    pub public_key: [u8; 32],
}

impl NodeIdentity {
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key)
    }
}

/// Wallet managed by the wallet store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wallet {
    pub address: Address,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burn_address_user_friendly_form() {
        let address = Address::new([0u8; 20]);
        assert_eq!(
            address.to_user_friendly(),
            "NQ07 0000 0000 0000 0000 0000 0000 0000 0000"
        );
    }

    #[test]
    fn sequential_address_user_friendly_form() {
        let mut bytes = [0u8; 20];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = i as u8;
        }
        assert_eq!(
            Address::new(bytes).to_user_friendly(),
            "NQ72 000G 40Q4 0L30 E209 185G Q38E 1U81 24GK"
        );
    }

    #[test]
    fn user_friendly_form_has_nine_groups() {
        let address = Address::derive(b"wallet");
        let friendly = address.to_user_friendly();
        assert_eq!(friendly.split(' ').count(), 9);
        assert!(friendly.starts_with("NQ"));
    }

    #[test]
    fn transaction_hash_commits_to_value() {
        let a = Address::derive(b"a");
        let b = Address::derive(b"b");
        let t1 = Transaction::basic(a, b, 100, 1);
        let t2 = Transaction::basic(a, b, 101, 1);
        assert_ne!(t1.hash(), t2.hash());
        assert_eq!(t1.hash().to_hex().len(), 64);
    }

    #[test]
    fn lunas_convert_to_coins() {
        assert_eq!(lunas_to_coins(250_000), 2.5);
        assert_eq!(lunas_to_coins(0), 0.0);
    }

    #[test]
    fn time_offset_is_absolute() {
        let peer = PeerInfo {
            address: PeerAddress::new("ws://peer:8443"),
            time_offset_ms: -2_000,
        };
        assert_eq!(peer.time_offset(), Duration::from_secs(2));
    }
}
