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

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use bitcoin::Txid;

use crate::{Error, Input, InputStage, Output, Psbt, SigningData, Unknown};

/// Errors combining two PSBTs.
#[derive(Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum CombineError {
    /// unable to combine PSBTs for different transactions {0} and {1}.
    TxMismatch(Txid, Txid),

    /// PSBTs contain different values for the same global key.
    GlobalConflict,

    /// PSBTs contain different values for the same key in input #{0}.
    InputConflict(usize),

    /// PSBTs contain different values for the same key in output #{0}.
    OutputConflict(usize),

    /// combined PSBT is not sane: {0}
    #[from]
    Sanity(Error),
}

/// Marker of two different values found under the same key.
struct Conflict;

fn merge_option<T: PartialEq>(slot: &mut Option<T>, other: Option<T>) -> Result<(), Conflict> {
    let other = match other {
        Some(other) => other,
        None => return Ok(()),
    };
    if let Some(mine) = slot.as_ref() {
        return if *mine == other { Ok(()) } else { Err(Conflict) };
    }
    *slot = Some(other);
    Ok(())
}

fn merge_map<K: Ord, V: PartialEq>(
    map: &mut BTreeMap<K, V>,
    other: BTreeMap<K, V>,
) -> Result<(), Conflict> {
    for (key, value) in other {
        match map.entry(key) {
            Entry::Vacant(entry) => {
                entry.insert(value);
            }
            Entry::Occupied(entry) if *entry.get() == value => {}
            Entry::Occupied(_) => return Err(Conflict),
        }
    }
    Ok(())
}

fn merge_unknown(list: &mut Vec<Unknown>, other: Vec<Unknown>) -> Result<(), Conflict> {
    for unknown in other {
        match list.iter().find(|known| known.key == unknown.key) {
            None => list.push(unknown),
            Some(known) if known.value == unknown.value => {}
            Some(_) => return Err(Conflict),
        }
    }
    Ok(())
}

impl SigningData {
    fn combine(&mut self, other: SigningData) -> Result<(), Conflict> {
        merge_map(&mut self.partial_sigs, other.partial_sigs)?;
        merge_option(&mut self.sighash_type, other.sighash_type)?;
        merge_option(&mut self.redeem_script, other.redeem_script)?;
        merge_option(&mut self.witness_script, other.witness_script)?;
        merge_map(&mut self.bip32_derivation, other.bip32_derivation)?;
        merge_map(&mut self.ripemd160_preimages, other.ripemd160_preimages)?;
        merge_map(&mut self.sha256_preimages, other.sha256_preimages)?;
        merge_map(&mut self.hash160_preimages, other.hash160_preimages)?;
        merge_map(&mut self.hash256_preimages, other.hash256_preimages)?;
        merge_option(&mut self.tap_key_sig, other.tap_key_sig)?;
        merge_map(&mut self.tap_script_sigs, other.tap_script_sigs)?;
        merge_map(&mut self.tap_leaf_scripts, other.tap_leaf_scripts)?;
        merge_map(&mut self.tap_bip32_derivation, other.tap_bip32_derivation)?;
        merge_option(&mut self.tap_internal_key, other.tap_internal_key)?;
        merge_option(&mut self.tap_merkle_root, other.tap_merkle_root)
    }
}

impl Input {
    /// Finalized data take precedence over the signing data of the other
    /// input.
    fn combine(&mut self, other: Input) -> Result<(), Conflict> {
        merge_option(&mut self.non_witness_utxo, other.non_witness_utxo)?;
        merge_option(&mut self.witness_utxo, other.witness_utxo)?;
        merge_option(&mut self.por_commitment, other.por_commitment)?;
        merge_unknown(&mut self.unknown, other.unknown)?;

        match other.stage {
            InputStage::Finalized(theirs) => {
                if !self.is_finalized() {
                    self.set_final(theirs);
                } else if self.final_data() != Some(&theirs) {
                    return Err(Conflict);
                }
            }
            InputStage::Signing(theirs) => {
                if let Some(mine) = self.signing_mut() {
                    mine.combine(theirs)?;
                }
            }
        }
        Ok(())
    }
}

impl Output {
    fn combine(&mut self, other: Output) -> Result<(), Conflict> {
        merge_option(&mut self.redeem_script, other.redeem_script)?;
        merge_option(&mut self.witness_script, other.witness_script)?;
        merge_map(&mut self.bip32_derivation, other.bip32_derivation)?;
        merge_option(&mut self.tap_internal_key, other.tap_internal_key)?;
        merge_option(&mut self.tap_tree, other.tap_tree)?;
        merge_map(&mut self.tap_bip32_derivation, other.tap_bip32_derivation)?;
        merge_unknown(&mut self.unknown, other.unknown)
    }
}

impl Psbt {
    /// Combines this [`Psbt`] with `other` PSBT for the same unsigned
    /// transaction as described by BIP 174.
    ///
    /// Records present in only one of the PSBTs are copied into the result;
    /// records present in both must be equal. Finalized inputs take precedence
    /// over the inputs which are still being signed. Up to the order of the
    /// unknown records and xpubs the operation is commutative.
    pub fn combine(mut self, other: Self) -> Result<Self, CombineError> {
        if self.unsigned_tx != other.unsigned_tx {
            return Err(CombineError::TxMismatch(
                self.unsigned_tx.txid(),
                other.unsigned_tx.txid(),
            ));
        }

        for xpub in other.xpubs {
            match self.xpubs.iter().find(|known| known.extended_key == xpub.extended_key) {
                None => self.xpubs.push(xpub),
                Some(known) if *known == xpub => {}
                Some(_) => return Err(CombineError::GlobalConflict),
            }
        }
        merge_unknown(&mut self.unknown, other.unknown)
            .map_err(|_| CombineError::GlobalConflict)?;

        for (index, (input, theirs)) in self.inputs.iter_mut().zip(other.inputs).enumerate() {
            input.combine(theirs).map_err(|_| CombineError::InputConflict(index))?;
        }
        for (index, (output, theirs)) in self.outputs.iter_mut().zip(other.outputs).enumerate() {
            output.combine(theirs).map_err(|_| CombineError::OutputConflict(index))?;
        }

        self.sanity_check()?;
        debug!("combined PSBTs for transaction {}", self.unsigned_tx.txid());
        Ok(self)
    }
}
