//! Hostile payload generation
//!
//! Produces byte strings that must never decode as a `ChatMessage`:
//! - Truncated keys and varints
//! - Unknown or zero field numbers
//! - Wrong wire types for known fields
//! - Duplicate and conflicting fields
//! - Invalid UTF-8 text
//! - Oversized buffers
//! - Random noise

use bytes::{BufMut, BytesMut};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use rayo_wire::varint::{put_key, put_varint};
use rayo_wire::{ChatMessage, WireType, MAX_MESSAGE_SIZE, SEED_FIELD, TEXT_FIELD};

/// Category of malformed payload
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostileKind {
    Empty,
    TruncatedVarint,
    TruncatedBytes,
    UnknownField,
    ZeroField,
    WrongWireType,
    DuplicateSeed,
    SeedAndText,
    InvalidUtf8,
    Oversized,
    Noise,
}

impl HostileKind {
    pub const ALL: [HostileKind; 11] = [
        HostileKind::Empty,
        HostileKind::TruncatedVarint,
        HostileKind::TruncatedBytes,
        HostileKind::UnknownField,
        HostileKind::ZeroField,
        HostileKind::WrongWireType,
        HostileKind::DuplicateSeed,
        HostileKind::SeedAndText,
        HostileKind::InvalidUtf8,
        HostileKind::Oversized,
        HostileKind::Noise,
    ];
}

/// Deterministic generator of undecodable payloads
pub struct HostileGenerator {
    rng: StdRng,
    generated: u64,
}

impl HostileGenerator {
    pub fn new(seed: u64) -> Self {
        HostileGenerator {
            rng: StdRng::seed_from_u64(seed),
            generated: 0,
        }
    }

    pub fn generated(&self) -> u64 {
        self.generated
    }

    /// Next payload of a randomly chosen kind
    pub fn next_payload(&mut self) -> (HostileKind, Vec<u8>) {
        let kind = HostileKind::ALL[self.rng.gen_range(0..HostileKind::ALL.len())];
        (kind, self.payload(kind))
    }

    /// Payload of a given kind. Guaranteed to fail `ChatMessage::decode`.
    pub fn payload(&mut self, kind: HostileKind) -> Vec<u8> {
        self.generated += 1;
        loop {
            let candidate = self.build(kind);
            if ChatMessage::decode(&candidate).is_err() {
                return candidate;
            }
        }
    }

    fn build(&mut self, kind: HostileKind) -> Vec<u8> {
        let mut buf = BytesMut::new();
        match kind {
            HostileKind::Empty => {}
            HostileKind::TruncatedVarint => {
                put_key(&mut buf, SEED_FIELD, WireType::Varint);
                let continuation = self.rng.gen_range(0..9);
                for _ in 0..continuation {
                    buf.put_u8(0x80 | self.rng.gen_range(0..0x80u8));
                }
            }
            HostileKind::TruncatedBytes => {
                put_key(&mut buf, TEXT_FIELD, WireType::LengthDelimited);
                let declared: u64 = self.rng.gen_range(2..64);
                put_varint(&mut buf, declared);
                let present = self.rng.gen_range(0..declared) as usize;
                buf.put_slice(&vec![b'a'; present]);
            }
            HostileKind::UnknownField => {
                let field = loop {
                    let field = self.rng.gen_range(1..4096u32);
                    if field != SEED_FIELD && field != TEXT_FIELD {
                        break field;
                    }
                };
                put_key(&mut buf, field, WireType::Varint);
                put_varint(&mut buf, self.rng.gen());
            }
            HostileKind::ZeroField => {
                buf.put_u8(WireType::Varint.to_byte());
                put_varint(&mut buf, self.rng.gen());
            }
            HostileKind::WrongWireType => {
                if self.rng.gen_bool(0.5) {
                    put_key(&mut buf, SEED_FIELD, WireType::Fixed64);
                    buf.put_u64_le(self.rng.gen());
                } else {
                    put_key(&mut buf, TEXT_FIELD, WireType::Varint);
                    put_varint(&mut buf, self.rng.gen());
                }
            }
            HostileKind::DuplicateSeed => {
                for _ in 0..2 {
                    put_key(&mut buf, SEED_FIELD, WireType::Varint);
                    put_varint(&mut buf, self.rng.gen::<i64>() as u64);
                }
            }
            HostileKind::SeedAndText => {
                put_key(&mut buf, SEED_FIELD, WireType::Varint);
                put_varint(&mut buf, self.rng.gen::<i64>() as u64);
                put_key(&mut buf, TEXT_FIELD, WireType::LengthDelimited);
                put_varint(&mut buf, 2);
                buf.put_slice(b"hi");
            }
            HostileKind::InvalidUtf8 => {
                let len = self.rng.gen_range(1..16);
                put_key(&mut buf, TEXT_FIELD, WireType::LengthDelimited);
                put_varint(&mut buf, len as u64 + 1);
                buf.put_u8(0xFF);
                for _ in 0..len {
                    buf.put_u8(self.rng.gen_range(b'a'..=b'z'));
                }
            }
            HostileKind::Oversized => {
                buf.put_slice(&vec![0u8; MAX_MESSAGE_SIZE + 1]);
            }
            HostileKind::Noise => {
                let len = self.rng.gen_range(1..48);
                for _ in 0..len {
                    buf.put_u8(self.rng.gen());
                }
            }
        }
        buf.to_vec()
    }
}
