//! Script assembly and parsing.
//!
//! Scripts use the Bitcoin opcode byte values for the handful of operations
//! the push-drop template needs: data pushes, `OP_DROP`/`OP_2DROP`, and
//! `OP_CHECKSIG`.

use collectibles_core::error::ScriptError;

pub const OP_0: u8 = 0x00;
pub const OP_PUSHDATA1: u8 = 0x4c;
pub const OP_PUSHDATA2: u8 = 0x4d;
pub const OP_PUSHDATA4: u8 = 0x4e;
pub const OP_2DROP: u8 = 0x6d;
pub const OP_DROP: u8 = 0x75;
pub const OP_CHECKSIG: u8 = 0xac;

/// Largest push that fits in the opcode byte itself
const MAX_DIRECT_PUSH: usize = 0x4b;

/// One parsed element of a script
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptChunk {
    /// Data pushed onto the stack
    Push(Vec<u8>),
    /// Any non-push opcode
    Op(u8),
}

/// Incrementally assembles a script
#[derive(Debug, Default, Clone)]
pub struct ScriptBuilder {
    bytes: Vec<u8>,
}

impl ScriptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a data push using the smallest encoding for its length
    pub fn push(mut self, data: &[u8]) -> Result<Self, ScriptError> {
        let len = data.len();
        match len {
            0 => self.bytes.push(OP_0),
            1..=MAX_DIRECT_PUSH => self.bytes.push(len as u8),
            _ if len <= u8::MAX as usize => {
                self.bytes.push(OP_PUSHDATA1);
                self.bytes.push(len as u8);
            }
            _ if len <= u16::MAX as usize => {
                self.bytes.push(OP_PUSHDATA2);
                self.bytes.extend_from_slice(&(len as u16).to_le_bytes());
            }
            _ => {
                let len = u32::try_from(len).map_err(|_| {
                    ScriptError::Encoding(format!("push of {} bytes is too large", data.len()))
                })?;
                self.bytes.push(OP_PUSHDATA4);
                self.bytes.extend_from_slice(&len.to_le_bytes());
            }
        }
        self.bytes.extend_from_slice(data);
        Ok(self)
    }

    pub fn op(mut self, opcode: u8) -> Self {
        self.bytes.push(opcode);
        self
    }

    /// Append the drops needed to clear `count` stack items
    pub fn drops(mut self, count: usize) -> Self {
        for _ in 0..count / 2 {
            self.bytes.push(OP_2DROP);
        }
        if count % 2 == 1 {
            self.bytes.push(OP_DROP);
        }
        self
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Split a script into pushes and opcodes
pub fn parse_chunks(script: &[u8]) -> Result<Vec<ScriptChunk>, ScriptError> {
    let mut chunks = Vec::new();
    let mut cursor = 0;

    while cursor < script.len() {
        let opcode = script[cursor];
        cursor += 1;

        let len = match opcode {
            OP_0 => {
                chunks.push(ScriptChunk::Push(Vec::new()));
                continue;
            }
            1..=0x4b => opcode as usize,
            OP_PUSHDATA1 => read_length(script, &mut cursor, 1)?,
            OP_PUSHDATA2 => read_length(script, &mut cursor, 2)?,
            OP_PUSHDATA4 => read_length(script, &mut cursor, 4)?,
            _ => {
                chunks.push(ScriptChunk::Op(opcode));
                continue;
            }
        };

        let end = cursor
            .checked_add(len)
            .filter(|end| *end <= script.len())
            .ok_or_else(|| {
                ScriptError::Decoding(format!(
                    "push of {} bytes at offset {} runs past end of script",
                    len, cursor
                ))
            })?;
        chunks.push(ScriptChunk::Push(script[cursor..end].to_vec()));
        cursor = end;
    }

    Ok(chunks)
}

/// Read a little-endian push length of `width` bytes
fn read_length(script: &[u8], cursor: &mut usize, width: usize) -> Result<usize, ScriptError> {
    let bytes = script.get(*cursor..*cursor + width).ok_or_else(|| {
        ScriptError::Decoding(format!("truncated push length at offset {}", cursor))
    })?;
    *cursor += width;

    let mut buf = [0u8; 4];
    buf[..width].copy_from_slice(bytes);
    Ok(u32::from_le_bytes(buf) as usize)
}
