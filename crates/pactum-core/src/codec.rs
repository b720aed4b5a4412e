// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// CANONICAL BYTE CODEC
//
// Little-endian put/parse helpers shared by the action codec and the block
// serializer. The wire/commit hash-exactness invariant depends on every
// producer using exactly these helpers — no derived serde format is used
// for consensus-critical bytes.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use pactum_crypto::{Hash, Signature, Token};

pub fn put_u32(v: u32, out: &mut Vec<u8>) {
    out.extend_from_slice(&v.to_le_bytes());
}

pub fn put_u64(v: u64, out: &mut Vec<u8>) {
    out.extend_from_slice(&v.to_le_bytes());
}

pub fn put_hash(h: &Hash, out: &mut Vec<u8>) {
    out.extend_from_slice(h.as_bytes());
}

pub fn put_token(t: &Token, out: &mut Vec<u8>) {
    out.extend_from_slice(t.as_bytes());
}

pub fn put_signature(s: &Signature, out: &mut Vec<u8>) {
    out.extend_from_slice(s.as_bytes());
}

pub fn put_bytes_u16(data: &[u8], out: &mut Vec<u8>) {
    out.extend_from_slice(&(data.len() as u16).to_le_bytes());
    out.extend_from_slice(data);
}

pub fn put_bytes_u32(data: &[u8], out: &mut Vec<u8>) {
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(data);
}

pub fn put_hash_array(hashes: &[Hash], out: &mut Vec<u8>) {
    put_u32(hashes.len() as u32, out);
    for h in hashes {
        put_hash(h, out);
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Cursor<'a> {
    pub data: &'a [u8],
    pub pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Cursor { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn is_exhausted(&self) -> bool {
        self.pos == self.data.len()
    }

    pub fn take(&mut self, len: usize) -> Option<&'a [u8]> {
        if self.remaining() < len {
            return None;
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Some(slice)
    }

    pub fn u32(&mut self) -> Option<u32> {
        let b = self.take(4)?;
        Some(u32::from_le_bytes(b.try_into().ok()?))
    }

    pub fn u64(&mut self) -> Option<u64> {
        let b = self.take(8)?;
        Some(u64::from_le_bytes(b.try_into().ok()?))
    }

    pub fn hash(&mut self) -> Option<Hash> {
        let b = self.take(Hash::LEN)?;
        Hash::from_slice(b).ok()
    }

    pub fn token(&mut self) -> Option<Token> {
        let b = self.take(Token::LEN)?;
        Token::from_slice(b).ok()
    }

    pub fn signature(&mut self) -> Option<Signature> {
        let b = self.take(Signature::LEN)?;
        Signature::from_slice(b).ok()
    }

    pub fn bytes_u16(&mut self) -> Option<&'a [u8]> {
        let len_bytes = self.take(2)?;
        let len = u16::from_le_bytes(len_bytes.try_into().ok()?);
        self.take(len as usize)
    }

    pub fn bytes_u32(&mut self) -> Option<&'a [u8]> {
        let len = self.u32()?;
        self.take(len as usize)
    }

    pub fn hash_array(&mut self) -> Option<Vec<Hash>> {
        let count = self.u32()?;
        let mut out = Vec::with_capacity(count as usize);
        for _ in 0..count {
            out.push(self.hash()?);
        }
        Some(out)
    }
}
