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

use std::collections::BTreeMap;
use std::io::{self, Read, Write};

use bitcoin::util::bip32::KeySource;
use bitcoin::Script;
#[cfg(feature = "serde")]
use serde_with::{hex::Hex, As, Same};

use crate::consts::*;
use crate::raw::{self, insert_once, set_once, Unknown};
use crate::types::{decode_key_source, encode_key_source};
use crate::{Error, KeyValidator, TapKeySource};

/// PSBT output key-value map.
#[derive(Clone, Eq, PartialEq, Debug, Default)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
pub struct Output {
    /// The redeem script for this output.
    pub redeem_script: Option<Script>,

    /// The witness script for this output.
    pub witness_script: Option<Script>,

    /// A map from public keys needed to spend this output to their
    /// corresponding master key fingerprints and derivation paths.
    #[cfg_attr(feature = "serde", serde(with = "As::<BTreeMap<Hex, Same>>"))]
    pub bip32_derivation: BTreeMap<Vec<u8>, KeySource>,

    /// The internal x-only public key for a taproot output.
    #[cfg_attr(feature = "serde", serde(with = "As::<Option<Hex>>"))]
    pub tap_internal_key: Option<Vec<u8>>,

    /// Serialized taproot tree, kept as an opaque sequence of
    /// `<depth> <leaf version> <script>` tuples.
    #[cfg_attr(feature = "serde", serde(with = "As::<Option<Hex>>"))]
    pub tap_tree: Option<Vec<u8>>,

    /// Map of x-only keys to origin info and leaf hashes contained in it.
    #[cfg_attr(feature = "serde", serde(with = "As::<BTreeMap<Hex, Same>>"))]
    pub tap_bip32_derivation: BTreeMap<Vec<u8>, TapKeySource>,

    /// Unknown key-value pairs for this output.
    pub unknown: Vec<Unknown>,
}

impl Output {
    /// Constructs empty output.
    #[inline]
    pub fn new() -> Output { Output::default() }

    /// Detects whether the output has no records.
    #[inline]
    pub fn is_empty(&self) -> bool { *self == Output::default() }

    pub(crate) fn decode<R: Read>(r: &mut R, validator: &impl KeyValidator) -> Result<Self, Error> {
        let mut output = Output::default();

        while let Some(key) = raw::read_key(r)? {
            let value = raw::read_value(r, MAX_PSBT_VALUE_LENGTH)?;
            let type_value = key.type_value;
            match type_value {
                PSBT_OUT_REDEEM_SCRIPT => {
                    key.ensure_no_key_data()?;
                    set_once(&mut output.redeem_script, Script::from(value))?;
                }
                PSBT_OUT_WITNESS_SCRIPT => {
                    key.ensure_no_key_data()?;
                    set_once(&mut output.witness_script, Script::from(value))?;
                }
                PSBT_OUT_BIP32_DERIVATION => {
                    if !validator.validate_pubkey(&key.key) {
                        return Err(Error::InvalidKeyData(type_value));
                    }
                    let source = decode_key_source(type_value, &value)?;
                    insert_once(&mut output.bip32_derivation, key.key, source)?;
                }
                PSBT_OUT_TAP_INTERNAL_KEY => {
                    key.ensure_no_key_data()?;
                    if !validator.validate_xonly_pubkey(&value) {
                        return Err(Error::InvalidKeyData(type_value));
                    }
                    set_once(&mut output.tap_internal_key, value)?;
                }
                PSBT_OUT_TAP_TREE => {
                    key.ensure_no_key_data()?;
                    if value.is_empty() {
                        return Err(Error::InvalidKeyData(type_value));
                    }
                    set_once(&mut output.tap_tree, value)?;
                }
                PSBT_OUT_TAP_BIP32_DERIVATION => {
                    if !validator.validate_xonly_pubkey(&key.key) {
                        return Err(Error::InvalidKeyData(type_value));
                    }
                    let source = TapKeySource::decode(type_value, &value)?;
                    insert_once(&mut output.tap_bip32_derivation, key.key, source)?;
                }
                _ => raw::push_unknown(&mut output.unknown, key.into_unknown(value))?,
            }
        }

        Ok(output)
    }

    pub(crate) fn encode<W: Write>(&self, w: &mut W) -> Result<usize, io::Error> {
        let mut len = 0;

        if let Some(script) = &self.redeem_script {
            len += raw::write_kv(w, PSBT_OUT_REDEEM_SCRIPT, &[], script.as_bytes())?;
        }
        if let Some(script) = &self.witness_script {
            len += raw::write_kv(w, PSBT_OUT_WITNESS_SCRIPT, &[], script.as_bytes())?;
        }
        for (pubkey, source) in &self.bip32_derivation {
            len += raw::write_kv(w, PSBT_OUT_BIP32_DERIVATION, pubkey, &encode_key_source(source))?;
        }
        if let Some(key) = &self.tap_internal_key {
            len += raw::write_kv(w, PSBT_OUT_TAP_INTERNAL_KEY, &[], key)?;
        }
        if let Some(tree) = &self.tap_tree {
            len += raw::write_kv(w, PSBT_OUT_TAP_TREE, &[], tree)?;
        }
        for (xonly, source) in &self.tap_bip32_derivation {
            len += raw::write_kv(w, PSBT_OUT_TAP_BIP32_DERIVATION, xonly, &source.encode())?;
        }
        for unknown in &self.unknown {
            len += unknown.encode(w)?;
        }

        len += raw::write_separator(w)?;
        Ok(len)
    }
}

#[cfg(test)]
mod test {
    use bitcoin::hashes::hex::FromHex;

    use super::*;
    use crate::Secp256k1Validator;

    fn decode(hex: &str) -> Result<Output, Error> {
        let data = Vec::<u8>::from_hex(hex).unwrap();
        Output::decode(&mut &data[..], &Secp256k1Validator)
    }

    #[test]
    fn bip32_derivation() {
        let hex = "\
            2202\
            03a9a4c37f5996d3aa25dbac6b570af0650394492942460b354753ed9eeca58771\
            10\
            d90c6a4f000000800000008004000080\
            00";
        let output = decode(hex).unwrap();
        assert!(!output.is_empty());
        let (fingerprint, path) = output.bip32_derivation.values().next().unwrap();
        assert_eq!(&fingerprint[..], &[0xd9, 0x0c, 0x6a, 0x4f]);
        assert_eq!(path.to_string(), "m/0'/0'/4'");

        let mut buf = vec![];
        assert_eq!(output.encode(&mut buf).unwrap(), buf.len());
        assert_eq!(buf, Vec::<u8>::from_hex(hex).unwrap());
    }

    #[test]
    fn bip32_derivation_bad_pubkey() {
        let hex = "\
            2102\
            a9a4c37f5996d3aa25dbac6b570af0650394492942460b354753ed9eeca58771\
            04\
            d90c6a4f\
            00";
        assert!(matches!(decode(hex), Err(Error::InvalidKeyData(0x02))));
    }

    #[test]
    fn duplicate_redeem_script() {
        assert!(matches!(decode("010001510100015100"), Err(Error::DuplicateKey)));
    }

    #[test]
    fn scripts_ordered() {
        let mut output = Output::new();
        output.witness_script = Some(Script::from(vec![0x52]));
        output.redeem_script = Some(Script::from(vec![0x51]));
        let mut buf = vec![];
        output.encode(&mut buf).unwrap();
        assert_eq!(buf, vec![0x01, 0x00, 0x01, 0x51, 0x01, 0x01, 0x01, 0x52, 0x00]);
        assert_eq!(decode("010001510101015200").unwrap(), output);
    }

    #[test]
    fn taproot_records() {
        let xonly = "b1341ccba7683b6af4f1238cd6e97e7167d569fac47f1e48d47541844355bd46";
        let hex = format!(
            "010520{xonly}01060401c001512107{xonly}2901{}d90c6a4f0000008000",
            "11".repeat(32)
        );
        let output = decode(&hex).unwrap();
        assert_eq!(output.tap_internal_key, Some(Vec::<u8>::from_hex(xonly).unwrap()));
        assert_eq!(output.tap_tree, Some(vec![0x01, 0xc0, 0x01, 0x51]));
        let source = output.tap_bip32_derivation.values().next().unwrap();
        assert_eq!(source.leaf_hashes, vec![[0x11; 32]]);

        let mut buf = vec![];
        output.encode(&mut buf).unwrap();
        assert_eq!(buf, Vec::<u8>::from_hex(&hex).unwrap());

        let hex = format!("2107{}0500d90c6a4f00", "ff".repeat(32));
        assert!(matches!(decode(&hex), Err(Error::InvalidKeyData(0x07))));
    }

    #[test]
    fn empty_tap_tree() {
        assert!(matches!(decode("01060000"), Err(Error::InvalidKeyData(0x06))));
    }
}
