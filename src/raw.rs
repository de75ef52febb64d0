// Descriptor wallet library extending bitcoin & miniscript functionality
// by LNP/BP Association (https://lnp-bp.org)
// Written in 2020-2022 by
//     Dr. Maxim Orlovsky <orlovsky@pandoracore.com>
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.
//
// You should have received a copy of the Apache-2.0 License
// along with this software.
// If not, see <https://opensource.org/licenses/Apache-2.0>.

//! Raw PSBT key-value records: the substrate for all PSBT map sections.
//!
//! Each record is `<compact_size keylen> <compact_size keytype> <keydata>
//! <compact_size valuelen> <value>`; a zero `keylen` terminates the section.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::io::{self, Read, Write};

use bitcoin::consensus::encode::VarInt;
use bitcoin::consensus::{Decodable, Encodable};
#[cfg(feature = "serde")]
use serde_with::{hex::Hex, As};

use crate::consts::{MAX_PSBT_KEY_LENGTH, MAX_PSBT_KEY_TYPE};
use crate::Error;

/// Key of a PSBT record, split into the key type and type-specific key data.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct Key {
    /// Key type value.
    pub type_value: u64,

    /// Type-specific key data following the key type.
    pub key: Vec<u8>,
}

impl Key {
    /// Serializes key type together with the key data, as it is stored inside
    /// the record.
    pub fn to_raw(&self) -> Vec<u8> {
        let mut raw = Vec::with_capacity(self.key.len() + 9);
        VarInt(self.type_value)
            .consensus_encode(&mut raw)
            .expect("in-memory writers don't error");
        raw.extend_from_slice(&self.key);
        raw
    }

    /// Checks that the key has no type-specific key data, which is required
    /// for all singleton records.
    pub fn ensure_no_key_data(&self) -> Result<(), Error> {
        if self.key.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidKeyData(self.type_value))
        }
    }

    /// Converts key into an [`Unknown`] record with the given value.
    #[inline]
    pub fn into_unknown(self, value: Vec<u8>) -> Unknown {
        Unknown {
            key: self.to_raw(),
            value,
        }
    }
}

/// Key-value pair of a record type which is not recognized by this library.
/// The key contains the encoded key type followed by the key data; both key
/// and value are kept verbatim.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
pub struct Unknown {
    /// Record key, including key type prefix.
    #[cfg_attr(feature = "serde", serde(with = "As::<Hex>"))]
    pub key: Vec<u8>,

    /// Record value.
    #[cfg_attr(feature = "serde", serde(with = "As::<Hex>"))]
    pub value: Vec<u8>,
}

impl Unknown {
    /// Writes unknown record into a section.
    #[inline]
    pub fn encode<W: Write>(&self, w: &mut W) -> Result<usize, io::Error> {
        write_raw_kv(w, &self.key, &self.value)
    }
}

/// Appends unknown record to the list, failing with [`Error::DuplicateKey`]
/// if a record with the same key is already present.
pub(crate) fn push_unknown(list: &mut Vec<Unknown>, unknown: Unknown) -> Result<(), Error> {
    if list.iter().any(|u| u.key == unknown.key) {
        return Err(Error::DuplicateKey);
    }
    list.push(unknown);
    Ok(())
}

/// Assigns a singleton record value, failing on a repeated record.
pub(crate) fn set_once<T>(slot: &mut Option<T>, value: T) -> Result<(), Error> {
    if slot.is_some() {
        return Err(Error::DuplicateKey);
    }
    *slot = Some(value);
    Ok(())
}

/// Inserts keyed record value, failing on a repeated key.
pub(crate) fn insert_once<K: Ord, V>(map: &mut BTreeMap<K, V>, key: K, value: V) -> Result<(), Error> {
    match map.entry(key) {
        Entry::Occupied(_) => Err(Error::DuplicateKey),
        Entry::Vacant(entry) => {
            entry.insert(value);
            Ok(())
        }
    }
}

/// Reads the next record key. Returns `None` if the end-of-section separator
/// was read.
///
/// # Errors
///
/// - [`Error::OversizedKey`] if the key is longer than
///   [`MAX_PSBT_KEY_LENGTH`];
/// - [`Error::InvalidFormat`] if the key type can't be read from the key;
/// - [`Error::InvalidKeyType`] if the key type exceeds
///   [`MAX_PSBT_KEY_TYPE`];
/// - [`Error::Consensus`] on I/O errors and non-canonical length prefixes.
pub fn read_key<R: Read>(r: &mut R) -> Result<Option<Key>, Error> {
    let VarInt(len) = VarInt::consensus_decode(r)?;
    if len == 0 {
        return Ok(None);
    }
    if len > MAX_PSBT_KEY_LENGTH {
        return Err(Error::OversizedKey(len));
    }

    let mut data = vec![0u8; len as usize];
    r.read_exact(&mut data)?;

    let mut cursor = &data[..];
    let VarInt(type_value) =
        VarInt::consensus_decode(&mut cursor).map_err(|_| Error::InvalidFormat)?;
    if type_value >= MAX_PSBT_KEY_TYPE {
        return Err(Error::InvalidKeyType(type_value));
    }

    trace!("read PSBT key type {:#x} with {} bytes of key data", type_value, cursor.len());
    Ok(Some(Key {
        type_value,
        key: cursor.to_vec(),
    }))
}

/// Reads a record value no longer than `max_len` bytes. The buffer grows with
/// the data actually present in the stream, so a forged length prefix does not
/// result in a large allocation.
pub fn read_value<R: Read>(r: &mut R, max_len: u64) -> Result<Vec<u8>, Error> {
    let VarInt(len) = VarInt::consensus_decode(r)?;
    if len > max_len {
        return Err(Error::OversizedValue(len));
    }

    let mut value = Vec::new();
    let read = r.by_ref().take(len).read_to_end(&mut value)?;
    if read as u64 != len {
        return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
    }
    Ok(value)
}

/// Writes a record with the given key type, key data and value.
pub fn write_kv<W: Write>(
    w: &mut W,
    type_value: u64,
    key: &[u8],
    value: &[u8],
) -> Result<usize, io::Error> {
    let key_type = VarInt(type_value);
    let mut len = VarInt((key_type.len() + key.len()) as u64).consensus_encode(w)?;
    len += key_type.consensus_encode(w)?;
    w.write_all(key)?;
    len += key.len();
    len += write_value(w, value)?;
    Ok(len)
}

/// Writes a record whose key already contains the encoded key type.
pub fn write_raw_kv<W: Write>(w: &mut W, key: &[u8], value: &[u8]) -> Result<usize, io::Error> {
    let mut len = VarInt(key.len() as u64).consensus_encode(w)?;
    w.write_all(key)?;
    len += key.len();
    len += write_value(w, value)?;
    Ok(len)
}

/// Writes the end-of-section separator.
#[inline]
pub fn write_separator<W: Write>(w: &mut W) -> Result<usize, io::Error> {
    w.write_all(&[0x00])?;
    Ok(1)
}

fn write_value<W: Write>(w: &mut W, value: &[u8]) -> Result<usize, io::Error> {
    let len = VarInt(value.len() as u64).consensus_encode(w)?;
    w.write_all(value)?;
    Ok(len + value.len())
}
