// Antelope Binary Codec
//
// Reader (and a small writer used to build packed fixtures) for the subset of
// the Antelope/EOSIO wire format this tool consumes: names, assets, actions
// and packed transactions.

use rust_decimal::Decimal;
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Antelope caps asset precision at 18 decimals.
const MAX_PRECISION: u8 = 18;

/// Base32 alphabet used by 64-bit account/action names
const NAME_CHARMAP: &[u8; 32] = b".12345abcdefghijklmnopqrstuvwxyz";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unexpected end of input at offset {offset}: need {needed} bytes, {remaining} left")]
    UnexpectedEof {
        offset: usize,
        needed: usize,
        remaining: usize,
    },
    #[error("varuint32 overflow at offset {0}")]
    VarintOverflow(usize),
    #[error("invalid utf-8 string: {0}")]
    Utf8(String),
    #[error("invalid symbol: {0}")]
    InvalidSymbol(String),
    #[error("invalid name: {0}")]
    InvalidName(String),
    #[error("invalid asset: {0}")]
    InvalidAsset(String),
    #[error("invalid hex: {0}")]
    Hex(String),
    #[error("{remaining} trailing bytes after {what}")]
    TrailingBytes { remaining: usize, what: &'static str },
    #[error("unexpected action {account}::{name}, expected {expected}")]
    UnexpectedAction {
        account: Name,
        name: Name,
        expected: &'static str,
    },
    #[error("value is {0} bytes, exceeds 256 bits")]
    ValueTooLarge(usize),
}

pub type Result<T> = std::result::Result<T, DecodeError>;

// ============================================================================
// PRIMITIVES
// ============================================================================

/// 64-bit Antelope name (accounts, actions, permissions, proposal names)
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Name(pub u64);

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut chars = [b'.'; 13];
        let mut tmp = self.0;
        for i in 0..=12 {
            let mask = if i == 0 { 0x0f } else { 0x1f };
            chars[12 - i] = NAME_CHARMAP[(tmp & mask) as usize];
            tmp >>= if i == 0 { 4 } else { 5 };
        }

        let len = chars
            .iter()
            .rposition(|&c| c != b'.')
            .map_or(0, |last| last + 1);
        // charmap is ASCII
        f.write_str(std::str::from_utf8(&chars[..len]).map_err(|_| fmt::Error)?)
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({self})")
    }
}

impl FromStr for Name {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self> {
        if s.len() > 13 {
            return Err(DecodeError::InvalidName(s.to_string()));
        }

        let mut value = 0u64;
        for (i, c) in s.bytes().enumerate() {
            let symbol = match c {
                b'a'..=b'z' => u64::from(c - b'a') + 6,
                b'1'..=b'5' => u64::from(c - b'1') + 1,
                b'.' => 0,
                _ => return Err(DecodeError::InvalidName(s.to_string())),
            };

            if i < 12 {
                value |= symbol << (64 - 5 * (i + 1));
            } else {
                // 13th character only has 4 bits
                if symbol > 0x0f {
                    return Err(DecodeError::InvalidName(s.to_string()));
                }
                value |= symbol;
            }
        }

        Ok(Name(value))
    }
}

impl Serialize for Name {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Token symbol: precision in the low byte, upper-case code in the rest
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Symbol {
    pub precision: u8,
    pub code: String,
}

impl Symbol {
    pub fn new(precision: u8, code: &str) -> Result<Self> {
        if precision > MAX_PRECISION
            || code.is_empty()
            || code.len() > 7
            || !code.bytes().all(|c| c.is_ascii_uppercase())
        {
            return Err(DecodeError::InvalidSymbol(format!("{precision},{code}")));
        }
        Ok(Self {
            precision,
            code: code.to_string(),
        })
    }

    fn from_raw(raw: u64) -> Result<Self> {
        let precision = (raw & 0xff) as u8;
        let code: String = raw.to_le_bytes()[1..]
            .iter()
            .take_while(|&&c| c != 0)
            .map(|&c| c as char)
            .collect();
        Self::new(precision, &code)
    }

    fn to_raw(&self) -> u64 {
        let mut bytes = [0u8; 8];
        bytes[0] = self.precision;
        let code = &self.code.as_bytes()[..self.code.len().min(7)];
        bytes[1..=code.len()].copy_from_slice(code);
        u64::from_le_bytes(bytes)
    }
}

/// Fixed-point token amount, e.g. `337.0000 EOS`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Asset {
    pub amount: i64,
    pub symbol: Symbol,
}

impl Asset {
    /// Amount as a decimal carrying the symbol's precision as its scale.
    pub fn to_decimal(&self) -> Decimal {
        Decimal::new(self.amount, u32::from(self.symbol.precision))
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.to_decimal(), self.symbol.code)
    }
}

impl FromStr for Asset {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self> {
        let (amount, code) = s
            .trim()
            .split_once(' ')
            .ok_or_else(|| DecodeError::InvalidAsset(s.to_string()))?;

        let amount = Decimal::from_str_exact(amount)
            .map_err(|_| DecodeError::InvalidAsset(s.to_string()))?;
        let precision = u8::try_from(amount.scale())
            .map_err(|_| DecodeError::InvalidAsset(s.to_string()))?;
        let units = i64::try_from(amount.mantissa())
            .map_err(|_| DecodeError::InvalidAsset(s.to_string()))?;

        Ok(Self {
            amount: units,
            symbol: Symbol::new(precision, code.trim())?,
        })
    }
}

impl Serialize for Asset {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// ============================================================================
// TRANSACTIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PermissionLevel {
    pub actor: Name,
    pub permission: Name,
}

/// A single action with its still-packed payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub account: Name,
    pub name: Name,
    pub authorization: Vec<PermissionLevel>,
    pub data: Vec<u8>,
}

impl Action {
    pub fn is(&self, account: Name, name: Name) -> bool {
        self.account == account && self.name == name
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionHeader {
    pub expiration: u32,
    pub ref_block_num: u16,
    pub ref_block_prefix: u32,
    pub max_net_usage_words: u32,
    pub max_cpu_usage_ms: u8,
    pub delay_sec: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transaction {
    pub header: TransactionHeader,
    pub context_free_actions: Vec<Action>,
    pub actions: Vec<Action>,
    pub extensions: Vec<(u16, Vec<u8>)>,
}

impl Transaction {
    /// Decode a full packed transaction; trailing bytes are an error.
    pub fn unpack(bytes: &[u8]) -> Result<Self> {
        let mut reader = BinaryReader::new(bytes);
        let trx = reader.read_transaction()?;
        reader.finish("transaction")?;
        Ok(trx)
    }

    pub fn pack(&self) -> Vec<u8> {
        let mut writer = BinaryWriter::new();
        writer.write_transaction(self);
        writer.into_inner()
    }
}

// ============================================================================
// READER
// ============================================================================

pub struct BinaryReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BinaryReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    fn read_exact(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(DecodeError::UnexpectedEof {
                offset: self.pos,
                needed: len,
                remaining: self.remaining(),
            });
        }
        let start = self.pos;
        self.pos += len;
        Ok(&self.data[start..self.pos])
    }

    fn read_fixed<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_exact(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_exact(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.read_fixed()?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_fixed()?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.read_fixed()?))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.read_fixed()?))
    }

    /// LEB128-encoded u32 used for lengths and a few header fields
    pub fn read_varuint32(&mut self) -> Result<u32> {
        let start = self.pos;
        let mut value = 0u64;
        let mut shift = 0u32;
        loop {
            let byte = self.read_u8()?;
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
            if shift >= 35 {
                return Err(DecodeError::VarintOverflow(start));
            }
        }
        u32::try_from(value).map_err(|_| DecodeError::VarintOverflow(start))
    }

    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.read_varuint32()? as usize;
        Ok(self.read_exact(len)?.to_vec())
    }

    pub fn read_string(&mut self) -> Result<String> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes).map_err(|e| DecodeError::Utf8(e.to_string()))
    }

    pub fn read_checksum256(&mut self) -> Result<[u8; 32]> {
        self.read_fixed()
    }

    pub fn read_name(&mut self) -> Result<Name> {
        Ok(Name(self.read_u64()?))
    }

    pub fn read_asset(&mut self) -> Result<Asset> {
        let amount = self.read_i64()?;
        let symbol = Symbol::from_raw(self.read_u64()?)?;
        Ok(Asset { amount, symbol })
    }

    pub fn read_permission_level(&mut self) -> Result<PermissionLevel> {
        Ok(PermissionLevel {
            actor: self.read_name()?,
            permission: self.read_name()?,
        })
    }

    /// Length-prefixed vector of `T`
    pub fn read_vec<T>(&mut self, mut item: impl FnMut(&mut Self) -> Result<T>) -> Result<Vec<T>> {
        let len = self.read_varuint32()? as usize;
        // Length is attacker-controlled; cap the reservation by what is left.
        let mut out = Vec::with_capacity(len.min(self.remaining()));
        for _ in 0..len {
            out.push(item(self)?);
        }
        Ok(out)
    }

    pub fn read_action(&mut self) -> Result<Action> {
        Ok(Action {
            account: self.read_name()?,
            name: self.read_name()?,
            authorization: self.read_vec(Self::read_permission_level)?,
            data: self.read_bytes()?,
        })
    }

    pub fn read_transaction(&mut self) -> Result<Transaction> {
        let header = TransactionHeader {
            expiration: self.read_u32()?,
            ref_block_num: self.read_u16()?,
            ref_block_prefix: self.read_u32()?,
            max_net_usage_words: self.read_varuint32()?,
            max_cpu_usage_ms: self.read_u8()?,
            delay_sec: self.read_varuint32()?,
        };

        Ok(Transaction {
            header,
            context_free_actions: self.read_vec(Self::read_action)?,
            actions: self.read_vec(Self::read_action)?,
            extensions: self.read_vec(|r| Ok((r.read_u16()?, r.read_bytes()?)))?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn finish(self, what: &'static str) -> Result<()> {
        match self.remaining() {
            0 => Ok(()),
            remaining => Err(DecodeError::TrailingBytes { remaining, what }),
        }
    }
}

/// Decode a hex payload as delivered by node and indexer JSON APIs.
pub fn decode_hex(data: &str) -> Result<Vec<u8>> {
    hex::decode(data.trim_start_matches("0x")).map_err(|e| DecodeError::Hex(e.to_string()))
}

// ============================================================================
// WRITER
// ============================================================================

#[derive(Default)]
pub struct BinaryWriter {
    buf: Vec<u8>,
}

impl BinaryWriter {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i64(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_varuint32(&mut self, mut value: u32) {
        loop {
            let byte = (value & 0x7f) as u8;
            value >>= 7;
            if value == 0 {
                self.write_u8(byte);
                return;
            }
            self.write_u8(byte | 0x80);
        }
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.write_varuint32(bytes.len() as u32);
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_name(&mut self, name: Name) {
        self.write_u64(name.0);
    }

    pub fn write_asset(&mut self, asset: &Asset) {
        self.write_i64(asset.amount);
        self.write_u64(asset.symbol.to_raw());
    }

    pub fn write_permission_level(&mut self, level: &PermissionLevel) {
        self.write_name(level.actor);
        self.write_name(level.permission);
    }

    pub fn write_action(&mut self, action: &Action) {
        self.write_name(action.account);
        self.write_name(action.name);
        self.write_varuint32(action.authorization.len() as u32);
        for level in &action.authorization {
            self.write_permission_level(level);
        }
        self.write_bytes(&action.data);
    }

    pub fn write_transaction(&mut self, trx: &Transaction) {
        let h = &trx.header;
        self.write_u32(h.expiration);
        self.write_u16(h.ref_block_num);
        self.write_u32(h.ref_block_prefix);
        self.write_varuint32(h.max_net_usage_words);
        self.write_u8(h.max_cpu_usage_ms);
        self.write_varuint32(h.delay_sec);

        for actions in [&trx.context_free_actions, &trx.actions] {
            self.write_varuint32(actions.len() as u32);
            for action in actions {
                self.write_action(action);
            }
        }

        self.write_varuint32(trx.extensions.len() as u32);
        for (kind, data) in &trx.extensions {
            self.write_u16(*kind);
            self.write_bytes(data);
        }
    }
}
