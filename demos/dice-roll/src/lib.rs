//! Dice rolling example demonstrating a typed client over Scribe
//!
//! This example shows how to lay a typed API on top of the raw byte
//! surface: requests are encoded with `MessageWriter`, replies decoded
//! with `FieldReader`, and the call itself goes through `ScribeClient`.

use bytes::Bytes;
use scribe_client::ScribeClient;
use scribe_core::{FieldReader, MessageWriter, ScribeError, WireType};

/// Full method path of the roll operation.
pub const ROLL_DICE_PATH: &str = "/api.v1alpha1.DiceService/RollDice";

/// Request for one batch of dice rolls.
#[derive(Debug, Clone)]
pub struct RollRequest {
    /// Who is rolling, e.g. a character or session id
    pub entity_id: String,
    /// Dice notation such as "3d6+2"
    pub notation: String,
    /// How many independent rolls to make
    pub count: u64,
    /// How long the server keeps the result
    pub ttl_seconds: u64,
    /// Free-form label for the modifier, e.g. "+2 STR"
    pub modifier_description: String,
}

impl RollRequest {
    pub fn new(entity_id: impl Into<String>, notation: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            notation: notation.into(),
            count: 1,
            ttl_seconds: 300,
            modifier_description: String::new(),
        }
    }

    /// Encode the request message.
    pub fn encode(&self) -> Bytes {
        let mut writer = MessageWriter::new();
        writer
            .write_string(1, &self.entity_id)
            .write_string(2, "dice_roll")
            .write_string(3, &self.notation)
            .write_varint(4, self.count)
            .write_varint(5, self.ttl_seconds)
            .write_string(6, &self.modifier_description);
        writer.finish()
    }
}

/// One rolled set of dice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiceRoll {
    pub roll_id: String,
    pub notation: String,
    /// Individual die results
    pub dice: Vec<u64>,
    pub total: i32,
    pub modifier: i32,
}

impl DiceRoll {
    fn decode(payload: &[u8]) -> Result<Self, ScribeError> {
        let mut reader = FieldReader::new(payload);
        let mut roll = Self::default();
        while let Some((field, wire)) = reader.next_field()? {
            match (field, wire) {
                (1, WireType::LengthDelimited) => {
                    roll.roll_id = reader.read_string()?.to_string();
                }
                (2, WireType::LengthDelimited) => {
                    roll.notation = reader.read_string()?.to_string();
                }
                (3, WireType::LengthDelimited) => roll.dice = reader.read_packed_varints()?,
                // Unpacked encodings of the same field are legal too
                (3, WireType::Varint) => roll.dice.push(reader.read_varint()?),
                (4, WireType::Varint) => roll.total = reader.read_varint()? as i32,
                (8, WireType::Varint) => roll.modifier = reader.read_varint()? as i32,
                (_, wire) => reader.skip(wire)?,
            }
        }
        Ok(roll)
    }
}

/// Reply carrying every roll the server produced.
#[derive(Debug, Clone, Default)]
pub struct RollReply {
    pub rolls: Vec<DiceRoll>,
}

impl RollReply {
    /// Decode the reply message.
    pub fn decode(payload: &[u8]) -> Result<Self, ScribeError> {
        let mut reader = FieldReader::new(payload);
        let mut rolls = Vec::new();
        while let Some((field, wire)) = reader.next_field()? {
            match (field, wire) {
                (1, WireType::LengthDelimited) => {
                    rolls.push(DiceRoll::decode(reader.read_bytes()?)?);
                }
                // Field 2 holds the expiry timestamp, which we don't need
                (_, wire) => reader.skip(wire)?,
            }
        }
        Ok(Self { rolls })
    }
}

/// Typed client for the dice service.
#[derive(Debug)]
pub struct DiceClient {
    client: ScribeClient,
}

impl DiceClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ScribeError> {
        Ok(Self {
            client: ScribeClient::new(base_url)?,
        })
    }

    pub fn with_client(client: ScribeClient) -> Self {
        Self { client }
    }

    /// Roll dice and wait for the result.
    pub async fn roll(&self, request: &RollRequest) -> Result<RollReply, ScribeError> {
        let reply = self.client.call(ROLL_DICE_PATH, request.encode()).await?;
        let reply = match reply.message() {
            Some(payload) => RollReply::decode(payload)?,
            None => RollReply::default(),
        };
        tracing::info!(
            "Received {} roll(s) for {}",
            reply.rolls.len(),
            request.notation
        );
        Ok(reply)
    }
}
