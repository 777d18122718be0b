//! Delivery flag word codec.
//!
//! Each persisted record carries a 16-bit metadata word alongside its
//! content. The word is a disjoint union of independent sub-fields:
//!
//! ```text
//! bit  0      pending (set on append, cleared on unload)
//! bits 1-3    reserved
//! bits 4-5    QoS level (0/1/2)
//! bit  6      retain
//! bit  7      dup
//! bits 8-9    direction (inbound / outbound)
//! bits 10-11  origin (client / broker)
//! bits 12-15  protocol delivery state
//! ```
//!
//! Setting one sub-field never disturbs another; every setter masks out its
//! own field before writing.

use std::fmt;

/// Mask for the pending bit, usable as a scan predicate mask.
pub const PENDING_MASK: u16 = 0x0001;

const RESERVED_MASK: u16 = 0x000E;
const QOS_MASK: u16 = 0x0030;
const QOS_SHIFT: u16 = 4;
const RETAIN_MASK: u16 = 0x0040;
const DUP_MASK: u16 = 0x0080;
const DIRECTION_MASK: u16 = 0x0300;
const DIRECTION_SHIFT: u16 = 8;
const ORIGIN_MASK: u16 = 0x0C00;
const ORIGIN_SHIFT: u16 = 10;
const STATE_MASK: u16 = 0xF000;
const STATE_SHIFT: u16 = 12;

/// MQTT quality-of-service level stored in bits 4-5.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Qos {
    #[default]
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

impl Qos {
    fn from_bits(bits: u16) -> Self {
        match bits & 0x3 {
            1 => Qos::AtLeastOnce,
            2 => Qos::ExactlyOnce,
            // 3 is a reserved combination; decode as QoS 0.
            _ => Qos::AtMostOnce,
        }
    }

    fn bits(self) -> u16 {
        match self {
            Qos::AtMostOnce => 0,
            Qos::AtLeastOnce => 1,
            Qos::ExactlyOnce => 2,
        }
    }

    pub fn level(self) -> u8 {
        self.bits() as u8
    }
}

/// Message direction relative to the client, bits 8-9.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Direction {
    #[default]
    Unset,
    /// From the client into the broker.
    Inbound,
    /// From the broker out to the client.
    Outbound,
}

impl Direction {
    fn from_bits(bits: u16) -> Self {
        match bits & 0x3 {
            1 => Direction::Inbound,
            2 => Direction::Outbound,
            _ => Direction::Unset,
        }
    }

    fn bits(self) -> u16 {
        match self {
            Direction::Unset => 0,
            Direction::Inbound => 1,
            Direction::Outbound => 2,
        }
    }
}

/// Who created the message, bits 10-11.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Origin {
    #[default]
    Unset,
    Client,
    Broker,
}

impl Origin {
    fn from_bits(bits: u16) -> Self {
        match bits & 0x3 {
            1 => Origin::Client,
            2 => Origin::Broker,
            _ => Origin::Unset,
        }
    }

    fn bits(self) -> u16 {
        match self {
            Origin::Unset => 0,
            Origin::Client => 1,
            Origin::Broker => 2,
        }
    }
}

/// Protocol delivery state, bits 12-15.
///
/// Transitions between these states are driven by the protocol layer; the
/// queue engine only stores whatever state the caller writes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProtocolState {
    #[default]
    Invalid,
    PublishQos0,
    PublishQos1,
    WaitPuback,
    PublishQos2,
    WaitPubrec,
    ResendPubrel,
    WaitPubrel,
    ResendPubcomp,
    WaitPubcomp,
    SendPubrec,
    Queued,
}

impl ProtocolState {
    fn from_bits(bits: u16) -> Self {
        match bits & 0xF {
            1 => ProtocolState::PublishQos0,
            2 => ProtocolState::PublishQos1,
            3 => ProtocolState::WaitPuback,
            4 => ProtocolState::PublishQos2,
            5 => ProtocolState::WaitPubrec,
            6 => ProtocolState::ResendPubrel,
            7 => ProtocolState::WaitPubrel,
            8 => ProtocolState::ResendPubcomp,
            9 => ProtocolState::WaitPubcomp,
            10 => ProtocolState::SendPubrec,
            11 => ProtocolState::Queued,
            _ => ProtocolState::Invalid,
        }
    }

    fn bits(self) -> u16 {
        match self {
            ProtocolState::Invalid => 0,
            ProtocolState::PublishQos0 => 1,
            ProtocolState::PublishQos1 => 2,
            ProtocolState::WaitPuback => 3,
            ProtocolState::PublishQos2 => 4,
            ProtocolState::WaitPubrec => 5,
            ProtocolState::ResendPubrel => 6,
            ProtocolState::WaitPubrel => 7,
            ProtocolState::ResendPubcomp => 8,
            ProtocolState::WaitPubcomp => 9,
            ProtocolState::SendPubrec => 10,
            ProtocolState::Queued => 11,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ProtocolState::Invalid => "invalid",
            ProtocolState::PublishQos0 => "publish-qos0",
            ProtocolState::PublishQos1 => "publish-qos1",
            ProtocolState::WaitPuback => "wait-puback",
            ProtocolState::PublishQos2 => "publish-qos2",
            ProtocolState::WaitPubrec => "wait-pubrec",
            ProtocolState::ResendPubrel => "resend-pubrel",
            ProtocolState::WaitPubrel => "wait-pubrel",
            ProtocolState::ResendPubcomp => "resend-pubcomp",
            ProtocolState::WaitPubcomp => "wait-pubcomp",
            ProtocolState::SendPubrec => "send-pubrec",
            ProtocolState::Queued => "queued",
        }
    }
}

/// Packed 16-bit delivery metadata word.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlagWord(u16);

impl FlagWord {
    pub fn new() -> Self {
        FlagWord(0)
    }

    pub fn from_bits(bits: u16) -> Self {
        FlagWord(bits)
    }

    pub fn bits(self) -> u16 {
        self.0
    }

    pub fn pending(self) -> bool {
        self.0 & PENDING_MASK != 0
    }

    pub fn set_pending(&mut self, pending: bool) {
        if pending {
            self.0 |= PENDING_MASK;
        } else {
            self.0 &= !PENDING_MASK;
        }
    }

    pub fn qos(self) -> Qos {
        Qos::from_bits(self.0 >> QOS_SHIFT)
    }

    pub fn set_qos(&mut self, qos: Qos) {
        self.0 = (self.0 & !QOS_MASK) | (qos.bits() << QOS_SHIFT);
    }

    pub fn retain(self) -> bool {
        self.0 & RETAIN_MASK != 0
    }

    pub fn set_retain(&mut self, retain: bool) {
        if retain {
            self.0 |= RETAIN_MASK;
        } else {
            self.0 &= !RETAIN_MASK;
        }
    }

    pub fn dup(self) -> bool {
        self.0 & DUP_MASK != 0
    }

    pub fn set_dup(&mut self, dup: bool) {
        if dup {
            self.0 |= DUP_MASK;
        } else {
            self.0 &= !DUP_MASK;
        }
    }

    pub fn direction(self) -> Direction {
        Direction::from_bits(self.0 >> DIRECTION_SHIFT)
    }

    pub fn set_direction(&mut self, direction: Direction) {
        self.0 = (self.0 & !DIRECTION_MASK) | (direction.bits() << DIRECTION_SHIFT);
    }

    pub fn origin(self) -> Origin {
        Origin::from_bits(self.0 >> ORIGIN_SHIFT)
    }

    pub fn set_origin(&mut self, origin: Origin) {
        self.0 = (self.0 & !ORIGIN_MASK) | (origin.bits() << ORIGIN_SHIFT);
    }

    pub fn state(self) -> ProtocolState {
        ProtocolState::from_bits(self.0 >> STATE_SHIFT)
    }

    pub fn set_state(&mut self, state: ProtocolState) {
        self.0 = (self.0 & !STATE_MASK) | (state.bits() << STATE_SHIFT);
    }

    pub fn reserved(self) -> u16 {
        (self.0 & RESERVED_MASK) >> 1
    }
}

impl fmt::Display for FlagWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = Vec::new();
        if self.pending() {
            parts.push("pending".to_string());
        }
        parts.push(format!("qos{}", self.qos().level()));
        if self.retain() {
            parts.push("retain".to_string());
        }
        if self.dup() {
            parts.push("dup".to_string());
        }
        match self.direction() {
            Direction::Unset => {}
            Direction::Inbound => parts.push("in".to_string()),
            Direction::Outbound => parts.push("out".to_string()),
        }
        match self.origin() {
            Origin::Unset => {}
            Origin::Client => parts.push("client".to_string()),
            Origin::Broker => parts.push("broker".to_string()),
        }
        if self.state() != ProtocolState::Invalid {
            parts.push(self.state().name().to_string());
        }
        write!(f, "{}", parts.join("|"))
    }
}
