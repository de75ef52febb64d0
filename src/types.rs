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

use bitcoin::consensus::encode::VarInt;
use bitcoin::consensus::{Decodable, Encodable};
use bitcoin::util::bip32::{ChildNumber, DerivationPath, Fingerprint, KeySource};
use bitcoin::util::taproot::{ControlBlock, LeafVersion, TapLeafHash};
use bitcoin::Script;
#[cfg(feature = "serde")]
use serde_with::{hex::Hex, As};

use crate::consts::XPUB_LENGTH;
use crate::{Error, KeyValidator};

/// Public key and ECDSA signature pair contained in the partial signature
/// record of a PSBT input.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
pub struct PartialSig {
    /// Serialized compressed or uncompressed public key.
    #[cfg_attr(feature = "serde", serde(with = "As::<Hex>"))]
    pub pubkey: Vec<u8>,

    /// DER-encoded signature followed by the sighash type byte.
    #[cfg_attr(feature = "serde", serde(with = "As::<Hex>"))]
    pub signature: Vec<u8>,
}

impl PartialSig {
    /// Constructs partial signature from the public key and signature bytes.
    pub fn new(pubkey: impl Into<Vec<u8>>, signature: impl Into<Vec<u8>>) -> Self {
        PartialSig {
            pubkey: pubkey.into(),
            signature: signature.into(),
        }
    }

    /// Checks that both the public key and the signature are well-formed.
    pub fn check_valid(&self, validator: &impl KeyValidator) -> bool {
        validator.validate_pubkey(&self.pubkey) && validator.validate_der_signature(&self.signature)
    }

    /// Returns sighash type byte trailing the signature.
    #[inline]
    pub fn sighash_type(&self) -> Option<u8> { self.signature.last().copied() }
}

/// Global extended public key record.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
pub struct XPub {
    /// BIP-32 serialization of the extended public key.
    #[cfg_attr(feature = "serde", serde(with = "As::<Hex>"))]
    pub extended_key: Vec<u8>,

    /// Fingerprint of the master key.
    pub master_fingerprint: Fingerprint,

    /// Derivation path from the master key to the extended key.
    pub derivation_path: DerivationPath,
}

impl XPub {
    pub(crate) fn decode(
        type_value: u64,
        key: Vec<u8>,
        value: &[u8],
        validator: &impl KeyValidator,
    ) -> Result<Self, Error> {
        if key.len() != XPUB_LENGTH || !validator.validate_pubkey(&key[45..]) {
            return Err(Error::InvalidKeyData(type_value));
        }
        let (master_fingerprint, derivation_path) = decode_key_source(type_value, value)?;
        Ok(XPub {
            extended_key: key,
            master_fingerprint,
            derivation_path,
        })
    }

    /// Returns fingerprint and derivation path as a BIP-32 key source.
    #[inline]
    pub fn key_source(&self) -> KeySource {
        (self.master_fingerprint, self.derivation_path.clone())
    }
}

/// Taproot leaf script, keyed in PSBT inputs by its control block.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
pub struct TapLeafScript {
    /// Leaf script.
    pub script: Script,

    /// Consensus-encoded leaf version.
    pub leaf_version: u8,
}

impl TapLeafScript {
    pub(crate) fn decode(type_value: u64, control_block: &[u8], value: &[u8]) -> Result<Self, Error> {
        let err = || Error::InvalidKeyData(type_value);
        ControlBlock::from_slice(control_block).map_err(|_| err())?;
        let (leaf_version, script) = value.split_last().ok_or_else(err)?;
        LeafVersion::from_consensus(*leaf_version).map_err(|_| err())?;
        Ok(TapLeafScript {
            script: Script::from(script.to_vec()),
            leaf_version: *leaf_version,
        })
    }

    pub(crate) fn encode(&self) -> Vec<u8> {
        let mut value = self.script.to_bytes();
        value.push(self.leaf_version);
        value
    }

    /// Computes BIP-341 leaf hash of this script.
    pub fn leaf_hash(&self) -> Option<TapLeafHash> {
        LeafVersion::from_consensus(self.leaf_version)
            .ok()
            .map(|version| TapLeafHash::from_script(&self.script, version))
    }
}

/// Origin information for a taproot key: hashes of the leaves the key is
/// used in and the BIP-32 key source.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
pub struct TapKeySource {
    /// Leaf hashes.
    #[cfg_attr(feature = "serde", serde(with = "As::<Vec<Hex>>"))]
    pub leaf_hashes: Vec<[u8; 32]>,

    /// Master key fingerprint and derivation path.
    pub key_source: KeySource,
}

impl TapKeySource {
    pub(crate) fn decode(type_value: u64, value: &[u8]) -> Result<Self, Error> {
        let err = || Error::InvalidKeyData(type_value);
        let mut cursor = value;
        let VarInt(count) = VarInt::consensus_decode(&mut cursor).map_err(|_| err())?;
        if count > (cursor.len() / 32) as u64 {
            return Err(err());
        }
        let (hashes, rest) = cursor.split_at(count as usize * 32);
        let leaf_hashes = hashes
            .chunks(32)
            .map(|chunk| {
                let mut hash = [0u8; 32];
                hash.copy_from_slice(chunk);
                hash
            })
            .collect();
        let key_source = decode_key_source(type_value, rest)?;
        Ok(TapKeySource {
            leaf_hashes,
            key_source,
        })
    }

    pub(crate) fn encode(&self) -> Vec<u8> {
        let mut value = vec![];
        VarInt(self.leaf_hashes.len() as u64)
            .consensus_encode(&mut value)
            .expect("in-memory writers don't error");
        for hash in &self.leaf_hashes {
            value.extend_from_slice(hash);
        }
        value.extend(encode_key_source(&self.key_source));
        value
    }
}

/// Decodes BIP-32 key source: 4-byte master key fingerprint followed by
/// derivation indexes as 32-bit little-endian integers.
pub(crate) fn decode_key_source(type_value: u64, value: &[u8]) -> Result<KeySource, Error> {
    if value.len() < 4 || value.len() % 4 != 0 {
        return Err(Error::InvalidKeyData(type_value));
    }
    let fingerprint = Fingerprint::from(&value[..4]);
    let path = value[4..]
        .chunks(4)
        .map(|chunk| ChildNumber::from(u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]])))
        .collect::<Vec<_>>();
    Ok((fingerprint, DerivationPath::from(path)))
}

pub(crate) fn encode_key_source(source: &KeySource) -> Vec<u8> {
    let (fingerprint, path) = source;
    let mut value = Vec::with_capacity(4 + path.as_ref().len() * 4);
    value.extend_from_slice(&fingerprint[..]);
    for child in path.as_ref() {
        value.extend_from_slice(&u32::from(*child).to_le_bytes());
    }
    value
}
