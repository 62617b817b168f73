//! src/keybag/parse.rs
//! Key bag TLV parsing: explicit record state machine, no silent truncation
//!
//! The blob is a flat run of `tag (4 ASCII bytes) | length (u32 BE) | value`.
//! The first `UUID` names the bag; every later `UUID` closes the class-key record
//! being built and opens the next one.

use crate::consts::{CLASS_KEY_TAGS, UUID_LENGTH};
use crate::error::BackupError;
use crate::keybag::types::{ClassKeyRecord, KeyBag, KeyBagType};
use crate::utils::{be_u32, tag_display};
use tracing::{debug, warn};

/// Walks the tag/length/value triples of a key bag blob.
struct TlvReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> TlvReader<'a> {
    const fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn next_tlv(&mut self) -> Result<Option<([u8; 4], &'a [u8])>, BackupError> {
        let remaining = &self.buf[self.pos..];
        if remaining.is_empty() {
            return Ok(None);
        }
        if remaining.len() < 8 {
            return Err(BackupError::MalformedKeyBag(format!(
                "truncated tag header at offset {}",
                self.pos
            )));
        }

        let mut tag = [0u8; 4];
        tag.copy_from_slice(&remaining[..4]);
        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&remaining[4..8]);
        let length = u32::from_be_bytes(len_bytes) as usize;

        let body = &remaining[8..];
        if length > body.len() {
            return Err(BackupError::MalformedKeyBag(format!(
                "tag {} at offset {} claims {length} bytes, {} remain",
                tag_display(&tag),
                self.pos,
                body.len()
            )));
        }

        self.pos += 8 + length;
        Ok(Some((tag, &body[..length])))
    }
}

/// Class-key record under construction.
#[derive(Default)]
struct RecordBuilder {
    uuid: Option<[u8; UUID_LENGTH]>,
    class: Option<u32>,
    wrap: Option<u32>,
    wrapped_key: Option<Vec<u8>>,
    key_type: Option<u32>,
    public_key: Option<Vec<u8>>,
}

impl RecordBuilder {
    fn with_uuid(uuid: [u8; UUID_LENGTH]) -> Self {
        Self {
            uuid: Some(uuid),
            ..Self::default()
        }
    }

    fn set(&mut self, tag: &[u8; 4], value: &[u8]) -> Result<(), BackupError> {
        match tag {
            b"CLAS" => self.class = Some(be_u32(value, "CLAS")?),
            b"WRAP" => self.wrap = Some(be_u32(value, "WRAP")?),
            b"WPKY" => self.wrapped_key = Some(value.to_vec()),
            b"KTYP" => self.key_type = Some(be_u32(value, "KTYP")?),
            b"PBKY" => self.public_key = Some(value.to_vec()),
            _ => {
                return Err(BackupError::MalformedKeyBag(format!(
                    "{} is not a class key attribute",
                    tag_display(tag)
                )))
            }
        }
        Ok(())
    }

    fn finish(self) -> Option<ClassKeyRecord> {
        Some(ClassKeyRecord {
            uuid: self.uuid,
            class: self.class?,
            wrap: self.wrap.unwrap_or(0),
            wrapped_key: self.wrapped_key,
            key_type: self.key_type,
            public_key: self.public_key,
        })
    }
}

/// Record under construction; `None` until the first class record opens.
type ParseState = Option<RecordBuilder>;

fn commit(bag: &mut KeyBag, state: ParseState) {
    let Some(builder) = state else {
        return;
    };
    let uuid = builder.uuid;
    match builder.finish() {
        Some(record) => {
            if bag.class_keys.insert(record.class, record).is_some() {
                warn!("duplicate class key record; keeping the later one");
            }
        }
        None => warn!(
            uuid = %uuid.map(hex::encode).unwrap_or_default(),
            "dropping class key record without CLAS"
        ),
    }
}

/// Parse a raw key bag blob into a [`KeyBag`].
///
/// Any length field that would read past the end of the buffer is fatal
/// ([`BackupError::MalformedKeyBag`]); no partial bag is ever returned.
pub fn parse_keybag(bytes: &[u8]) -> Result<KeyBag, BackupError> {
    let mut bag = KeyBag::default();
    let mut state: ParseState = None;
    let mut reader = TlvReader::new(bytes);

    while let Some((tag, value)) = reader.next_tlv()? {
        match &tag {
            b"TYPE" => {
                if value.len() != 4 {
                    return Err(BackupError::MalformedKeyBag(format!(
                        "TYPE must be 4 bytes, got {}",
                        value.len()
                    )));
                }
                let code = be_u32(value, "TYPE")?;
                bag.kind = KeyBagType::from_code(code).ok_or_else(|| {
                    BackupError::MalformedKeyBag(format!("unknown key bag TYPE {code}"))
                })?;
            }
            b"UUID" => {
                let uuid: [u8; UUID_LENGTH] = value.try_into().map_err(|_| {
                    BackupError::MalformedKeyBag(format!(
                        "UUID must be {UUID_LENGTH} bytes, got {}",
                        value.len()
                    ))
                })?;
                if bag.uuid.is_none() {
                    bag.uuid = Some(uuid);
                } else {
                    let previous = state.replace(RecordBuilder::with_uuid(uuid));
                    commit(&mut bag, previous);
                }
            }
            b"WRAP" if bag.wrap.is_none() && state.is_none() => {
                bag.wrap = Some(be_u32(value, "WRAP")?);
            }
            t if CLASS_KEY_TAGS.contains(&t) => state.get_or_insert_with(RecordBuilder::default).set(t, value)?,
            _ => {
                bag.attributes.insert(tag, value.to_vec());
            }
        }
    }
    commit(&mut bag, state);

    debug!(
        kind = ?bag.kind,
        class_keys = bag.class_keys.len(),
        attributes = bag.attributes.len(),
        "parsed key bag"
    );
    Ok(bag)
}
