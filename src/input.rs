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

use bitcoin::consensus;
use bitcoin::hashes::{hash160, ripemd160, sha256, sha256d, Hash};
use bitcoin::util::bip32::KeySource;
use bitcoin::{Script, Transaction, TxOut, Witness};
#[cfg(feature = "serde")]
use serde_with::{hex::Hex, As, Same};

use crate::consts::*;
use crate::raw::{self, insert_once, set_once, Unknown};
use crate::types::{decode_key_source, encode_key_source};
use crate::{Error, KeyValidator, PartialSig, TapKeySource, TapLeafScript};

/// Observable signing state of a PSBT input.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Display)]
pub enum InputState {
    /// Input has no signature material.
    #[display("unsigned")]
    Unsigned,

    /// Input has one or more partial signatures or taproot signatures, but
    /// was not finalized yet.
    #[display("partially-signed")]
    PartiallySigned,

    /// Input has final `scriptSig` and/or witness.
    #[display("finalized")]
    Finalized,
}

/// Data used by PSBT signers for producing signatures for an input. All of
/// them are removed when the input gets finalized.
#[derive(Clone, Eq, PartialEq, Debug, Default)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
pub struct SigningData {
    /// A map from public keys to their corresponding signature as would be
    /// pushed to the stack from a scriptSig or witness for a non-taproot
    /// inputs.
    #[cfg_attr(feature = "serde", serde(with = "As::<BTreeMap<Hex, Hex>>"))]
    pub partial_sigs: BTreeMap<Vec<u8>, Vec<u8>>,

    /// The sighash type to be used for this input. Signatures for this input
    /// must use the sighash type.
    pub sighash_type: Option<u32>,

    /// The redeem script for this input.
    pub redeem_script: Option<Script>,

    /// The witness script for this input.
    pub witness_script: Option<Script>,

    /// A map from public keys needed to sign this input to their corresponding
    /// master key fingerprints and derivation paths.
    #[cfg_attr(feature = "serde", serde(with = "As::<BTreeMap<Hex, Same>>"))]
    pub bip32_derivation: BTreeMap<Vec<u8>, KeySource>,

    /// RIPEMD160 hash to preimage map.
    #[cfg_attr(feature = "serde", serde(with = "As::<BTreeMap<Hex, Hex>>"))]
    pub ripemd160_preimages: BTreeMap<Vec<u8>, Vec<u8>>,

    /// SHA256 hash to preimage map.
    #[cfg_attr(feature = "serde", serde(with = "As::<BTreeMap<Hex, Hex>>"))]
    pub sha256_preimages: BTreeMap<Vec<u8>, Vec<u8>>,

    /// HASH160 hash to preimage map.
    #[cfg_attr(feature = "serde", serde(with = "As::<BTreeMap<Hex, Hex>>"))]
    pub hash160_preimages: BTreeMap<Vec<u8>, Vec<u8>>,

    /// HASH256 hash to preimage map.
    #[cfg_attr(feature = "serde", serde(with = "As::<BTreeMap<Hex, Hex>>"))]
    pub hash256_preimages: BTreeMap<Vec<u8>, Vec<u8>>,

    /// Serialized schnorr signature with sighash type for key spend.
    #[cfg_attr(feature = "serde", serde(with = "As::<Option<Hex>>"))]
    pub tap_key_sig: Option<Vec<u8>>,

    /// Map of `<xonlypubkey>|<leafhash>` with signature.
    #[cfg_attr(feature = "serde", serde(with = "As::<Vec<((Hex, Hex), Hex)>>"))]
    pub tap_script_sigs: BTreeMap<([u8; 32], [u8; 32]), Vec<u8>>,

    /// Map of control blocks to the leaf scripts.
    #[cfg_attr(feature = "serde", serde(with = "As::<BTreeMap<Hex, Same>>"))]
    pub tap_leaf_scripts: BTreeMap<Vec<u8>, TapLeafScript>,

    /// Map of x-only keys to origin info and leaf hashes contained in it.
    #[cfg_attr(feature = "serde", serde(with = "As::<BTreeMap<Hex, Same>>"))]
    pub tap_bip32_derivation: BTreeMap<Vec<u8>, TapKeySource>,

    /// Taproot internal key.
    #[cfg_attr(feature = "serde", serde(with = "As::<Option<Hex>>"))]
    pub tap_internal_key: Option<Vec<u8>>,

    /// Taproot merkle root.
    #[cfg_attr(feature = "serde", serde(with = "As::<Option<Hex>>"))]
    pub tap_merkle_root: Option<[u8; 32]>,
}

impl SigningData {
    /// Detects whether none of the signing fields is present.
    pub fn is_empty(&self) -> bool { *self == SigningData::default() }

    /// Detects presence of ECDSA or schnorr signatures.
    pub fn has_signatures(&self) -> bool {
        !self.partial_sigs.is_empty() || self.tap_key_sig.is_some() || !self.tap_script_sigs.is_empty()
    }

    /// Adds partial signature, failing with [`Error::DuplicateKey`] if there
    /// is already a signature for the same public key.
    pub fn insert_partial_sig(&mut self, sig: PartialSig) -> Result<(), Error> {
        insert_once(&mut self.partial_sigs, sig.pubkey, sig.signature)
    }

    /// Returns partial signatures ordered by their public keys.
    pub fn partial_sig_list(&self) -> Vec<PartialSig> {
        self.partial_sigs
            .iter()
            .map(|(pubkey, sig)| PartialSig::new(pubkey.clone(), sig.clone()))
            .collect()
    }
}

/// Finalized spending data of an input.
#[derive(Clone, Eq, PartialEq, Debug, Default)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
pub struct FinalData {
    /// The finalized, fully-constructed scriptSig with signatures and any other
    /// scripts necessary for this input to pass validation.
    pub final_script_sig: Option<Script>,

    /// The finalized, fully-constructed scriptWitness with signatures and any
    /// other scripts necessary for this input to pass validation.
    pub final_script_witness: Option<Witness>,
}

impl FinalData {
    /// Detects whether neither `scriptSig` nor witness is present.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.final_script_sig.is_none() && self.final_script_witness.is_none()
    }
}

/// Stage of the input lifecycle. Signing data can be accessed only until the
/// input gets finalized; the transition is one-way.
#[derive(Clone, Eq, PartialEq, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
pub enum InputStage {
    /// Input is being signed.
    Signing(SigningData),

    /// Input is finalized.
    Finalized(FinalData),
}

impl Default for InputStage {
    fn default() -> Self { InputStage::Signing(SigningData::default()) }
}

/// PSBT input key-value map.
#[derive(Clone, Eq, PartialEq, Debug, Default)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
pub struct Input {
    /// The non-witness transaction this input spends from. Should only be
    /// `Some` for inputs which spend non-segwit outputs or if it is unknown
    /// whether an input spends a segwit output.
    pub non_witness_utxo: Option<Transaction>,

    /// The transaction output this input spends from. Should only be `Some` for
    /// inputs which spend segwit outputs, including P2SH embedded ones.
    pub witness_utxo: Option<TxOut>,

    /// Proof-of-reserves commitment message (BIP-127).
    pub por_commitment: Option<String>,

    /// Signing or finalized data.
    pub stage: InputStage,

    /// Unknown key-value pairs for this input.
    pub unknown: Vec<Unknown>,
}

impl Input {
    /// Constructs empty input.
    #[inline]
    pub fn new() -> Input { Input::default() }

    /// Returns current signing state of the input.
    pub fn state(&self) -> InputState {
        match &self.stage {
            InputStage::Finalized(_) => InputState::Finalized,
            InputStage::Signing(data) if data.has_signatures() => InputState::PartiallySigned,
            InputStage::Signing(_) => InputState::Unsigned,
        }
    }

    /// Detects whether the input is finalized.
    #[inline]
    pub fn is_finalized(&self) -> bool { matches!(self.stage, InputStage::Finalized(_)) }

    /// Returns signing data, unless the input is finalized.
    pub fn signing(&self) -> Option<&SigningData> {
        match &self.stage {
            InputStage::Signing(data) => Some(data),
            InputStage::Finalized(_) => None,
        }
    }

    /// Returns mutable signing data, unless the input is finalized.
    pub fn signing_mut(&mut self) -> Option<&mut SigningData> {
        match &mut self.stage {
            InputStage::Signing(data) => Some(data),
            InputStage::Finalized(_) => None,
        }
    }

    /// Returns final spending data, if the input is finalized.
    pub fn final_data(&self) -> Option<&FinalData> {
        match &self.stage {
            InputStage::Finalized(data) => Some(data),
            InputStage::Signing(_) => None,
        }
    }

    /// Returns final `scriptSig`, if any.
    #[inline]
    pub fn final_script_sig(&self) -> Option<&Script> {
        self.final_data().and_then(|data| data.final_script_sig.as_ref())
    }

    /// Returns final witness, if any.
    #[inline]
    pub fn final_script_witness(&self) -> Option<&Witness> {
        self.final_data().and_then(|data| data.final_script_witness.as_ref())
    }

    /// Checks consistency of the input data:
    /// - witness script and final witness require witness UTXO;
    /// - finalized input must have either `scriptSig` or witness.
    pub fn is_sane(&self) -> bool {
        match &self.stage {
            InputStage::Signing(data) => {
                !(self.witness_utxo.is_none() && data.witness_script.is_some())
            }
            InputStage::Finalized(data) => {
                !data.is_empty()
                    && !(self.witness_utxo.is_none() && data.final_script_witness.is_some())
            }
        }
    }

    /// Replaces signing data with the final data, keeping UTXOs,
    /// proof-of-reserves and unknown records.
    pub(crate) fn set_final(&mut self, data: FinalData) { self.stage = InputStage::Finalized(data); }

    pub(crate) fn decode<R: Read>(r: &mut R, validator: &impl KeyValidator) -> Result<Self, Error> {
        let mut input = Input::default();
        let mut signing = SigningData::default();
        let mut fin = FinalData::default();

        while let Some(key) = raw::read_key(r)? {
            let value = raw::read_value(r, MAX_PSBT_VALUE_LENGTH)?;
            let type_value = key.type_value;
            let invalid = || Error::InvalidKeyData(type_value);
            match type_value {
                PSBT_IN_NON_WITNESS_UTXO => {
                    key.ensure_no_key_data()?;
                    let tx = consensus::deserialize(&value).map_err(|_| invalid())?;
                    set_once(&mut input.non_witness_utxo, tx)?;
                }
                PSBT_IN_WITNESS_UTXO => {
                    key.ensure_no_key_data()?;
                    let txout = consensus::deserialize(&value).map_err(|_| invalid())?;
                    set_once(&mut input.witness_utxo, txout)?;
                }
                PSBT_IN_PARTIAL_SIG => {
                    let sig = PartialSig::new(key.key, value);
                    if !sig.check_valid(validator) {
                        return Err(invalid());
                    }
                    signing.insert_partial_sig(sig)?;
                }
                PSBT_IN_SIGHASH_TYPE => {
                    key.ensure_no_key_data()?;
                    let bytes: [u8; 4] = value.as_slice().try_into().map_err(|_| invalid())?;
                    set_once(&mut signing.sighash_type, u32::from_le_bytes(bytes))?;
                }
                PSBT_IN_REDEEM_SCRIPT => {
                    key.ensure_no_key_data()?;
                    set_once(&mut signing.redeem_script, Script::from(value))?;
                }
                PSBT_IN_WITNESS_SCRIPT => {
                    key.ensure_no_key_data()?;
                    set_once(&mut signing.witness_script, Script::from(value))?;
                }
                PSBT_IN_BIP32_DERIVATION => {
                    if !validator.validate_pubkey(&key.key) {
                        return Err(invalid());
                    }
                    let source = decode_key_source(type_value, &value)?;
                    insert_once(&mut signing.bip32_derivation, key.key, source)?;
                }
                PSBT_IN_FINAL_SCRIPTSIG => {
                    key.ensure_no_key_data()?;
                    set_once(&mut fin.final_script_sig, Script::from(value))?;
                }
                PSBT_IN_FINAL_SCRIPTWITNESS => {
                    key.ensure_no_key_data()?;
                    let witness = consensus::deserialize(&value).map_err(|_| invalid())?;
                    set_once(&mut fin.final_script_witness, witness)?;
                }
                PSBT_IN_POR_COMMITMENT => {
                    key.ensure_no_key_data()?;
                    let commitment = String::from_utf8(value).map_err(|_| invalid())?;
                    set_once(&mut input.por_commitment, commitment)?;
                }
                PSBT_IN_RIPEMD160 => {
                    if ripemd160::Hash::hash(&value)[..] != key.key[..] {
                        return Err(invalid());
                    }
                    insert_once(&mut signing.ripemd160_preimages, key.key, value)?;
                }
                PSBT_IN_SHA256 => {
                    if sha256::Hash::hash(&value)[..] != key.key[..] {
                        return Err(invalid());
                    }
                    insert_once(&mut signing.sha256_preimages, key.key, value)?;
                }
                PSBT_IN_HASH160 => {
                    if hash160::Hash::hash(&value)[..] != key.key[..] {
                        return Err(invalid());
                    }
                    insert_once(&mut signing.hash160_preimages, key.key, value)?;
                }
                PSBT_IN_HASH256 => {
                    if sha256d::Hash::hash(&value)[..] != key.key[..] {
                        return Err(invalid());
                    }
                    insert_once(&mut signing.hash256_preimages, key.key, value)?;
                }
                PSBT_IN_TAP_KEY_SIG => {
                    key.ensure_no_key_data()?;
                    if !validator.validate_schnorr_signature(&value) {
                        return Err(invalid());
                    }
                    set_once(&mut signing.tap_key_sig, value)?;
                }
                PSBT_IN_TAP_SCRIPT_SIG => {
                    if key.key.len() != 64
                        || !validator.validate_xonly_pubkey(&key.key[..32])
                        || !validator.validate_schnorr_signature(&value)
                    {
                        return Err(invalid());
                    }
                    let mut xonly = [0u8; 32];
                    let mut leaf_hash = [0u8; 32];
                    xonly.copy_from_slice(&key.key[..32]);
                    leaf_hash.copy_from_slice(&key.key[32..]);
                    insert_once(&mut signing.tap_script_sigs, (xonly, leaf_hash), value)?;
                }
                PSBT_IN_TAP_LEAF_SCRIPT => {
                    let leaf_script = TapLeafScript::decode(type_value, &key.key, &value)?;
                    insert_once(&mut signing.tap_leaf_scripts, key.key, leaf_script)?;
                }
                PSBT_IN_TAP_BIP32_DERIVATION => {
                    if !validator.validate_xonly_pubkey(&key.key) {
                        return Err(invalid());
                    }
                    let source = TapKeySource::decode(type_value, &value)?;
                    insert_once(&mut signing.tap_bip32_derivation, key.key, source)?;
                }
                PSBT_IN_TAP_INTERNAL_KEY => {
                    key.ensure_no_key_data()?;
                    if !validator.validate_xonly_pubkey(&value) {
                        return Err(invalid());
                    }
                    set_once(&mut signing.tap_internal_key, value)?;
                }
                PSBT_IN_TAP_MERKLE_ROOT => {
                    key.ensure_no_key_data()?;
                    let root: [u8; 32] = value.as_slice().try_into().map_err(|_| invalid())?;
                    set_once(&mut signing.tap_merkle_root, root)?;
                }
                _ => raw::push_unknown(&mut input.unknown, key.into_unknown(value))?,
            }
        }

        input.stage = match (fin.is_empty(), signing.is_empty()) {
            (true, _) => InputStage::Signing(signing),
            (false, true) => InputStage::Finalized(fin),
            (false, false) => {
                debug!("finalized PSBT input carries signing data");
                return Err(Error::InvalidFormat);
            }
        };
        Ok(input)
    }

    pub(crate) fn encode<W: Write>(&self, w: &mut W) -> Result<usize, io::Error> {
        let mut len = 0;

        if let Some(tx) = &self.non_witness_utxo {
            len += raw::write_kv(w, PSBT_IN_NON_WITNESS_UTXO, &[], &consensus::serialize(tx))?;
        }
        if let Some(txout) = &self.witness_utxo {
            len += raw::write_kv(w, PSBT_IN_WITNESS_UTXO, &[], &consensus::serialize(txout))?;
        }

        match &self.stage {
            InputStage::Signing(data) => {
                for (pubkey, sig) in &data.partial_sigs {
                    len += raw::write_kv(w, PSBT_IN_PARTIAL_SIG, pubkey, sig)?;
                }
                if let Some(sighash_type) = data.sighash_type {
                    len += raw::write_kv(w, PSBT_IN_SIGHASH_TYPE, &[], &sighash_type.to_le_bytes())?;
                }
                if let Some(script) = &data.redeem_script {
                    len += raw::write_kv(w, PSBT_IN_REDEEM_SCRIPT, &[], script.as_bytes())?;
                }
                if let Some(script) = &data.witness_script {
                    len += raw::write_kv(w, PSBT_IN_WITNESS_SCRIPT, &[], script.as_bytes())?;
                }
                for (pubkey, source) in &data.bip32_derivation {
                    len += raw::write_kv(
                        w,
                        PSBT_IN_BIP32_DERIVATION,
                        pubkey,
                        &encode_key_source(source),
                    )?;
                }
            }
            InputStage::Finalized(data) => {
                if let Some(script) = &data.final_script_sig {
                    len += raw::write_kv(w, PSBT_IN_FINAL_SCRIPTSIG, &[], script.as_bytes())?;
                }
                if let Some(witness) = &data.final_script_witness {
                    len += raw::write_kv(
                        w,
                        PSBT_IN_FINAL_SCRIPTWITNESS,
                        &[],
                        &consensus::serialize(witness),
                    )?;
                }
            }
        }

        if let Some(commitment) = &self.por_commitment {
            len += raw::write_kv(w, PSBT_IN_POR_COMMITMENT, &[], commitment.as_bytes())?;
        }

        if let InputStage::Signing(data) = &self.stage {
            for (type_value, preimages) in [
                (PSBT_IN_RIPEMD160, &data.ripemd160_preimages),
                (PSBT_IN_SHA256, &data.sha256_preimages),
                (PSBT_IN_HASH160, &data.hash160_preimages),
                (PSBT_IN_HASH256, &data.hash256_preimages),
            ] {
                for (hash, preimage) in preimages {
                    len += raw::write_kv(w, type_value, hash, preimage)?;
                }
            }
            if let Some(sig) = &data.tap_key_sig {
                len += raw::write_kv(w, PSBT_IN_TAP_KEY_SIG, &[], sig)?;
            }
            for ((xonly, leaf_hash), sig) in &data.tap_script_sigs {
                let key = [&xonly[..], &leaf_hash[..]].concat();
                len += raw::write_kv(w, PSBT_IN_TAP_SCRIPT_SIG, &key, sig)?;
            }
            for (control_block, leaf_script) in &data.tap_leaf_scripts {
                len += raw::write_kv(
                    w,
                    PSBT_IN_TAP_LEAF_SCRIPT,
                    control_block,
                    &leaf_script.encode(),
                )?;
            }
            for (xonly, source) in &data.tap_bip32_derivation {
                len += raw::write_kv(w, PSBT_IN_TAP_BIP32_DERIVATION, xonly, &source.encode())?;
            }
            if let Some(key) = &data.tap_internal_key {
                len += raw::write_kv(w, PSBT_IN_TAP_INTERNAL_KEY, &[], key)?;
            }
            if let Some(root) = &data.tap_merkle_root {
                len += raw::write_kv(w, PSBT_IN_TAP_MERKLE_ROOT, &[], root)?;
            }
        }

        for unknown in &self.unknown {
            len += unknown.encode(w)?;
        }

        len += raw::write_separator(w)?;
        Ok(len)
    }
}
