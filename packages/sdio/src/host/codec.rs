//! Fixed wire layouts exchanged with the SDIO service.
//!
//! Every field is a 32-bit big-endian word.
//!
//! ```text
//! request   (36 bytes): cmd | cmd_type | rsp_type | arg | blk_cnt | blk_size | dma_addr | is_dma | pad
//! response  (16 bytes): rsp_fields[0] | rsp_fields[1] | rsp_fields[2] | acmd12_response
//! hcr query (24 bytes): reg | 0 | 0 | size | value | 0
//! ```

pub const SDIO_REQUEST_LEN: usize = 36;
pub const SDIO_RESPONSE_LEN: usize = 16;
pub const HCR_QUERY_LEN: usize = 24;
pub const HCR_VALUE_LEN: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandType {
    /// Broadcast, no response.
    Bc,
    /// Broadcast with response.
    Bcr,
    /// Addressed, no data.
    Ac,
    /// Addressed with data transfer.
    Adtc,
}

impl CommandType {
    pub const fn as_u32(self) -> u32 {
        match self {
            Self::Bc => 1,
            Self::Bcr => 2,
            Self::Ac => 3,
            Self::Adtc => 4,
        }
    }

    pub const fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::Bc),
            2 => Some(Self::Bcr),
            3 => Some(Self::Ac),
            4 => Some(Self::Adtc),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseType {
    None,
    R1,
    /// R1 followed by a busy phase on DAT0.
    R1b,
    R2,
    R3,
    R4,
    R5,
    R6,
}

impl ResponseType {
    pub const fn as_u32(self) -> u32 {
        match self {
            Self::None => 0,
            Self::R1 => 1,
            Self::R1b => 2,
            Self::R2 => 3,
            Self::R3 => 4,
            Self::R4 => 5,
            Self::R5 => 6,
            Self::R6 => 7,
        }
    }

    pub const fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::None),
            1 => Some(Self::R1),
            2 => Some(Self::R1b),
            3 => Some(Self::R2),
            4 => Some(Self::R3),
            5 => Some(Self::R4),
            6 => Some(Self::R5),
            7 => Some(Self::R6),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SdioRequest {
    pub cmd: u32,
    pub cmd_type: CommandType,
    pub rsp_type: ResponseType,
    pub arg: u32,
    pub blk_cnt: u32,
    pub blk_size: u32,
    pub dma_addr: u32,
    pub is_dma: bool,
}

impl SdioRequest {
    pub fn encode(&self) -> [u8; SDIO_REQUEST_LEN] {
        let mut out = [0u8; SDIO_REQUEST_LEN];
        let words = [
            self.cmd,
            self.cmd_type.as_u32(),
            self.rsp_type.as_u32(),
            self.arg,
            self.blk_cnt,
            self.blk_size,
            self.dma_addr,
            self.is_dma as u32,
            0,
        ];
        put_words(&mut out, &words);
        out
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < SDIO_REQUEST_LEN {
            return None;
        }
        Some(Self {
            cmd: word(bytes, 0),
            cmd_type: CommandType::from_u32(word(bytes, 1))?,
            rsp_type: ResponseType::from_u32(word(bytes, 2))?,
            arg: word(bytes, 3),
            blk_cnt: word(bytes, 4),
            blk_size: word(bytes, 5),
            dma_addr: word(bytes, 6),
            is_dma: word(bytes, 7) != 0,
        })
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SdioResponse {
    pub rsp_fields: [u32; 3],
    pub acmd12_response: u32,
}

impl SdioResponse {
    pub fn encode(&self) -> [u8; SDIO_RESPONSE_LEN] {
        let mut out = [0u8; SDIO_RESPONSE_LEN];
        let words = [
            self.rsp_fields[0],
            self.rsp_fields[1],
            self.rsp_fields[2],
            self.acmd12_response,
        ];
        put_words(&mut out, &words);
        out
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < SDIO_RESPONSE_LEN {
            return None;
        }
        Some(Self {
            rsp_fields: [word(bytes, 0), word(bytes, 1), word(bytes, 2)],
            acmd12_response: word(bytes, 3),
        })
    }
}

/// Host-controller register read or write request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HcrQuery {
    pub reg: u8,
    pub size: u8,
    pub value: u32,
}

impl HcrQuery {
    pub fn encode(&self) -> [u8; HCR_QUERY_LEN] {
        let mut out = [0u8; HCR_QUERY_LEN];
        let words = [self.reg as u32, 0, 0, self.size as u32, self.value, 0];
        put_words(&mut out, &words);
        out
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < HCR_QUERY_LEN {
            return None;
        }
        let reg = u8::try_from(word(bytes, 0)).ok()?;
        let size = u8::try_from(word(bytes, 3)).ok()?;
        Some(Self {
            reg,
            size,
            value: word(bytes, 4),
        })
    }
}

pub(crate) fn encode_word(value: u32) -> [u8; HCR_VALUE_LEN] {
    value.to_be_bytes()
}

pub(crate) fn decode_word(bytes: &[u8]) -> u32 {
    word(bytes, 0)
}

fn put_words(out: &mut [u8], words: &[u32]) {
    for (chunk, value) in out.chunks_exact_mut(4).zip(words) {
        chunk.copy_from_slice(&value.to_be_bytes());
    }
}

fn word(bytes: &[u8], index: usize) -> u32 {
    let off = index * 4;
    u32::from_be_bytes([bytes[off], bytes[off + 1], bytes[off + 2], bytes[off + 3]])
}
