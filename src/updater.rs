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

//! PSBT updater role: typed mutation of a packet applying the same checks as
//! the parser does.

use bitcoin::consensus::encode::VarInt;
use bitcoin::consensus::Decodable;
use bitcoin::util::bip32::KeySource;
use bitcoin::{Script, Transaction, TxOut, Txid};

use crate::consts::{
    MAX_PSBT_KEY_TYPE, PSBT_GLOBAL_UNSIGNED_TX, PSBT_GLOBAL_XPUB, SIGHASH_ALL, XPUB_LENGTH,
};
use crate::raw::{self, insert_once};
use crate::{
    Error, Input, KeyValidator, Output, PartialSig, Psbt, Secp256k1Validator, SigningData,
    Unknown, XPub,
};

/// Errors updating PSBT data.
#[derive(Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum UpdateError {
    /// PSBT has less than {0} inputs.
    WrongInputNo(usize),

    /// PSBT has less than {0} outputs.
    WrongOutputNo(usize),

    /// input #{0} is already finalized and can't be updated.
    AlreadyFinalized(usize),

    /// previous transaction does not match transaction {1} spent by input #{0}.
    PrevoutMismatch(usize, Txid),

    /// invalid public key, signature or record key data.
    InvalidKeyData,

    /// partial signature for input #{0} does not match the sighash type of the
    /// input.
    InvalidSighashFlags(usize),

    /// the record with the same key is already present.
    DuplicateKey,

    /// update results in an invalid PSBT: {0}
    #[from]
    Sanity(Error),
}

/// PSBT updater, adding UTXOs, scripts, derivation information and partial
/// signatures to a sane PSBT. Every update leaves the PSBT sane; failed updates
/// leave it unchanged.
pub struct Updater<'psbt, V: KeyValidator = Secp256k1Validator> {
    psbt: &'psbt mut Psbt,
    validator: V,
}

impl<'psbt> Updater<'psbt> {
    /// Constructs updater validating keys with [`Secp256k1Validator`]. Fails
    /// if the PSBT is not sane.
    #[inline]
    pub fn new(psbt: &'psbt mut Psbt) -> Result<Self, Error> {
        Updater::with_validator(psbt, Secp256k1Validator)
    }
}

impl<'psbt, V: KeyValidator> Updater<'psbt, V> {
    /// Constructs updater using custom key validator. Fails if the PSBT is not
    /// sane.
    pub fn with_validator(psbt: &'psbt mut Psbt, validator: V) -> Result<Self, Error> {
        psbt.sanity_check()?;
        Ok(Updater { psbt, validator })
    }

    /// Returns PSBT being updated.
    #[inline]
    pub fn psbt(&self) -> &Psbt { self.psbt }

    fn update_input(
        &mut self,
        index: usize,
        f: impl FnOnce(&mut Input) -> Result<(), UpdateError>,
    ) -> Result<(), UpdateError> {
        let input = self.psbt.inputs.get_mut(index).ok_or(UpdateError::WrongInputNo(index))?;
        if input.is_finalized() {
            return Err(UpdateError::AlreadyFinalized(index));
        }
        let backup = input.clone();
        f(input)?;
        if let Err(err) = self.psbt.sanity_check() {
            self.psbt.inputs[index] = backup;
            return Err(err.into());
        }
        trace!("PSBT input #{} is updated", index);
        Ok(())
    }

    fn update_signing(
        &mut self,
        index: usize,
        f: impl FnOnce(&mut SigningData) -> Result<(), UpdateError>,
    ) -> Result<(), UpdateError> {
        self.update_input(index, |input| {
            input.signing_mut().ok_or(UpdateError::AlreadyFinalized(index)).and_then(f)
        })
    }

    fn update_output(
        &mut self,
        index: usize,
        f: impl FnOnce(&mut Output) -> Result<(), UpdateError>,
    ) -> Result<(), UpdateError> {
        let output = self.psbt.outputs.get_mut(index).ok_or(UpdateError::WrongOutputNo(index))?;
        f(output)?;
        trace!("PSBT output #{} is updated", index);
        Ok(())
    }

    /// Adds previous transaction spent by the input. The transaction id must
    /// match the input outpoint.
    pub fn add_in_non_witness_utxo(&mut self, index: usize, tx: Transaction) -> Result<(), UpdateError> {
        let txin = self.psbt.unsigned_tx.input.get(index).ok_or(UpdateError::WrongInputNo(index))?;
        let txid = txin.previous_output.txid;
        if tx.txid() != txid {
            return Err(UpdateError::PrevoutMismatch(index, txid));
        }
        self.update_input(index, |input| {
            input.non_witness_utxo = Some(tx);
            Ok(())
        })
    }

    /// Adds output spent by a segwit input.
    pub fn add_in_witness_utxo(&mut self, index: usize, txout: TxOut) -> Result<(), UpdateError> {
        self.update_input(index, |input| {
            input.witness_utxo = Some(txout);
            Ok(())
        })
    }

    /// Sets sighash type which must be used by the input signatures.
    pub fn add_in_sighash_type(&mut self, index: usize, sighash_type: u32) -> Result<(), UpdateError> {
        self.update_signing(index, |data| {
            data.sighash_type = Some(sighash_type);
            Ok(())
        })
    }

    /// Sets input redeem script.
    pub fn add_in_redeem_script(&mut self, index: usize, script: Script) -> Result<(), UpdateError> {
        self.update_signing(index, |data| {
            data.redeem_script = Some(script);
            Ok(())
        })
    }

    /// Sets input witness script. Requires witness UTXO to be present.
    pub fn add_in_witness_script(&mut self, index: usize, script: Script) -> Result<(), UpdateError> {
        self.update_signing(index, |data| {
            data.witness_script = Some(script);
            Ok(())
        })
    }

    /// Adds derivation information for a public key signing the input.
    pub fn add_in_bip32_derivation(
        &mut self,
        index: usize,
        pubkey: Vec<u8>,
        source: KeySource,
    ) -> Result<(), UpdateError> {
        if !self.validator.validate_pubkey(&pubkey) {
            return Err(UpdateError::InvalidKeyData);
        }
        self.update_signing(index, |data| {
            insert_once(&mut data.bip32_derivation, pubkey, source)
                .map_err(|_| UpdateError::DuplicateKey)
        })
    }

    /// Adds partial signature. The signature must be well-formed and use the
    /// sighash type of the input; a signature for the same public key must not
    /// be present.
    pub fn add_partial_sig(&mut self, index: usize, sig: PartialSig) -> Result<(), UpdateError> {
        if !sig.check_valid(&self.validator) {
            return Err(UpdateError::InvalidKeyData);
        }
        self.update_signing(index, |data| {
            let sighash_type = data.sighash_type.unwrap_or(SIGHASH_ALL);
            if sig.sighash_type().map(u32::from) != Some(sighash_type) {
                return Err(UpdateError::InvalidSighashFlags(index));
            }
            data.insert_partial_sig(sig).map_err(|_| UpdateError::DuplicateKey)
        })
    }

    /// Sets output redeem script.
    pub fn add_out_redeem_script(&mut self, index: usize, script: Script) -> Result<(), UpdateError> {
        self.update_output(index, |output| {
            output.redeem_script = Some(script);
            Ok(())
        })
    }

    /// Sets output witness script.
    pub fn add_out_witness_script(&mut self, index: usize, script: Script) -> Result<(), UpdateError> {
        self.update_output(index, |output| {
            output.witness_script = Some(script);
            Ok(())
        })
    }

    /// Adds derivation information for a public key used in the output.
    pub fn add_out_bip32_derivation(
        &mut self,
        index: usize,
        pubkey: Vec<u8>,
        source: KeySource,
    ) -> Result<(), UpdateError> {
        if !self.validator.validate_pubkey(&pubkey) {
            return Err(UpdateError::InvalidKeyData);
        }
        self.update_output(index, |output| {
            insert_once(&mut output.bip32_derivation, pubkey, source)
                .map_err(|_| UpdateError::DuplicateKey)
        })
    }

    /// Adds global extended public key.
    pub fn add_xpub(&mut self, xpub: XPub) -> Result<(), UpdateError> {
        if xpub.extended_key.len() != XPUB_LENGTH
            || !self.validator.validate_pubkey(&xpub.extended_key[45..])
        {
            return Err(UpdateError::InvalidKeyData);
        }
        if self.psbt.xpubs.iter().any(|known| known.extended_key == xpub.extended_key) {
            return Err(UpdateError::DuplicateKey);
        }
        self.psbt.xpubs.push(xpub);
        Ok(())
    }

    /// Adds global record of a type not known to this library. The key must
    /// start with a valid key type which is not used by BIP-174 global
    /// records.
    pub fn add_unknown(&mut self, unknown: Unknown) -> Result<(), UpdateError> {
        let VarInt(type_value) = VarInt::consensus_decode(&mut &unknown.key[..])
            .map_err(|_| UpdateError::InvalidKeyData)?;
        if type_value >= MAX_PSBT_KEY_TYPE
            || type_value == PSBT_GLOBAL_UNSIGNED_TX
            || type_value == PSBT_GLOBAL_XPUB
        {
            return Err(UpdateError::InvalidKeyData);
        }
        raw::push_unknown(&mut self.psbt.unknown, unknown).map_err(|_| UpdateError::DuplicateKey)
    }
}
