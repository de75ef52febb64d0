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

//! Input finalization: conversion of the collected signatures and scripts into
//! the final `scriptSig` and witness for standard script types.

use std::mem;

use bitcoin::blockdata::opcodes::all::{OP_CHECKMULTISIG, OP_PUSHNUM_1, OP_PUSHNUM_16};
use bitcoin::blockdata::script::{Builder, Instruction};
use bitcoin::hashes::{hash160, Hash};
use bitcoin::{Script, Witness};

use crate::consts::{SIGHASH_ALL, SIGHASH_DEFAULT};
use crate::{
    Error, FinalData, InputPreviousTxo, InputStage, MatchError, Psbt, SigningData,
};

/// Errors happening during input finalization.
#[derive(Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum FinalizeError {
    /// input #{0} is already finalized.
    AlreadyFinalized(usize),

    /// input #{0} does not contain signatures or scripts required for the
    /// finalization.
    NotFinalizable(usize),

    /// partial signature in input #{0} does not match the sighash type of the
    /// input.
    InvalidSighashFlags(usize),

    /// input #{0} spends an output of unsupported script type.
    UnsupportedScriptType(usize),

    /// unable to get output spent by the input: {0}
    #[from]
    Utxo(MatchError),

    /// PSBT is not sane: {0}
    #[from]
    Sanity(Error),

    /// PSBT has less than {0} inputs.
    WrongInputNo(usize),
}

/// Public keys of a bare `m-of-n` multisig script.
struct Multisig<'script> {
    threshold: usize,
    pubkeys: Vec<&'script [u8]>,
}

impl<'script> Multisig<'script> {
    fn parse(script: &'script Script) -> Option<Self> {
        let pushnum = |instruction: &Instruction| match instruction {
            Instruction::Op(op)
                if (OP_PUSHNUM_1.to_u8()..=OP_PUSHNUM_16.to_u8()).contains(&op.to_u8()) =>
            {
                Some((op.to_u8() - OP_PUSHNUM_1.to_u8() + 1) as usize)
            }
            _ => None,
        };

        let instructions = script.instructions().collect::<Result<Vec<_>, _>>().ok()?;
        let (first, rest) = instructions.split_first()?;
        let (last, rest) = rest.split_last()?;
        let (total, keys) = rest.split_last()?;

        let threshold = pushnum(first)?;
        let total = pushnum(total)?;
        if *last != Instruction::Op(OP_CHECKMULTISIG) || keys.len() != total || threshold > total
        {
            return None;
        }
        let pubkeys = keys
            .iter()
            .map(|instruction| match instruction {
                Instruction::PushBytes(key) => Some(*key),
                Instruction::Op(_) => None,
            })
            .collect::<Option<Vec<_>>>()?;
        Some(Multisig { threshold, pubkeys })
    }

    /// Selects `threshold` signatures in the order of the public keys in the
    /// script. Fails if any of the signatures does not belong to the script.
    fn signatures(&self, data: &SigningData) -> Option<Vec<Vec<u8>>> {
        if data.partial_sigs.keys().any(|pubkey| !self.pubkeys.contains(&pubkey.as_slice())) {
            return None;
        }
        let sigs = self
            .pubkeys
            .iter()
            .filter_map(|pubkey| data.partial_sigs.get(*pubkey))
            .take(self.threshold)
            .cloned()
            .collect::<Vec<_>>();
        if sigs.len() < self.threshold {
            return None;
        }
        Some(sigs)
    }
}

/// Finalizer for the signing data of a single input.
struct InputFinalizer<'data> {
    index: usize,
    data: &'data SigningData,
    has_witness_utxo: bool,
}

impl<'data> InputFinalizer<'data> {
    fn not_finalizable(&self) -> FinalizeError { FinalizeError::NotFinalizable(self.index) }

    fn check_sighash_flags(&self) -> Result<(), FinalizeError> {
        let sighash_type = self.data.sighash_type.unwrap_or(SIGHASH_ALL);
        let valid = self
            .data
            .partial_sigs
            .values()
            .all(|sig| sig.last().map(|flag| *flag as u32) == Some(sighash_type));
        if !valid {
            return Err(FinalizeError::InvalidSighashFlags(self.index));
        }
        Ok(())
    }

    fn require_witness_utxo(&self) -> Result<(), FinalizeError> {
        if !self.has_witness_utxo {
            debug!("input #{} spends segwit output but has no witness UTXO", self.index);
            return Err(self.not_finalizable());
        }
        Ok(())
    }

    /// Finds signature made with the public key matching the hash.
    fn pubkey_hash_sig(&self, pubkey_hash: &[u8]) -> Result<(Vec<u8>, Vec<u8>), FinalizeError> {
        self.data
            .partial_sigs
            .iter()
            .find(|(pubkey, _)| hash160::Hash::hash(pubkey)[..] == *pubkey_hash)
            .map(|(pubkey, sig)| (sig.clone(), pubkey.clone()))
            .ok_or_else(|| self.not_finalizable())
    }

    fn multisig_sigs(&self, script: &Script) -> Result<Vec<Vec<u8>>, FinalizeError> {
        let multisig = Multisig::parse(script)
            .ok_or(FinalizeError::UnsupportedScriptType(self.index))?;
        multisig.signatures(self.data).ok_or_else(|| self.not_finalizable())
    }

    fn finalize(&self, script_pubkey: &Script) -> Result<FinalData, FinalizeError> {
        let spk = script_pubkey.as_bytes();

        if script_pubkey.is_p2pk() {
            trace!("finalizing P2PK input #{}", self.index);
            let pubkey = match script_pubkey.instructions().next() {
                Some(Ok(Instruction::PushBytes(pubkey))) => pubkey,
                _ => return Err(FinalizeError::UnsupportedScriptType(self.index)),
            };
            let sig = self.data.partial_sigs.get(pubkey).ok_or_else(|| self.not_finalizable())?;
            return Ok(FinalData {
                final_script_sig: Some(Builder::new().push_slice(sig).into_script()),
                final_script_witness: None,
            });
        }

        if script_pubkey.is_p2pkh() {
            trace!("finalizing P2PKH input #{}", self.index);
            let (sig, pubkey) = self.pubkey_hash_sig(&spk[3..23])?;
            return Ok(FinalData {
                final_script_sig: Some(
                    Builder::new().push_slice(&sig).push_slice(&pubkey).into_script(),
                ),
                final_script_witness: None,
            });
        }

        if script_pubkey.is_v0_p2wpkh() {
            trace!("finalizing P2WPKH input #{}", self.index);
            self.require_witness_utxo()?;
            let (sig, pubkey) = self.pubkey_hash_sig(&spk[2..22])?;
            return Ok(FinalData {
                final_script_sig: None,
                final_script_witness: Some(Witness::from_vec(vec![sig, pubkey])),
            });
        }

        if script_pubkey.is_p2sh() {
            let redeem_script = self.data.redeem_script.as_ref().ok_or_else(|| self.not_finalizable())?;
            if Script::new_p2sh(&redeem_script.script_hash()) != *script_pubkey {
                debug!("redeem script of input #{} does not match the spent output", self.index);
                return Err(self.not_finalizable());
            }
            let script_sig = Builder::new().push_slice(redeem_script.as_bytes()).into_script();

            if redeem_script.is_v0_p2wpkh() {
                trace!("finalizing P2SH-P2WPKH input #{}", self.index);
                self.require_witness_utxo()?;
                let (sig, pubkey) = self.pubkey_hash_sig(&redeem_script.as_bytes()[2..22])?;
                return Ok(FinalData {
                    final_script_sig: Some(script_sig),
                    final_script_witness: Some(Witness::from_vec(vec![sig, pubkey])),
                });
            }

            if redeem_script.is_v0_p2wsh() {
                trace!("finalizing P2SH-P2WSH input #{}", self.index);
                let witness = self.multisig_witness(redeem_script)?;
                return Ok(FinalData {
                    final_script_sig: Some(script_sig),
                    final_script_witness: Some(witness),
                });
            }

            trace!("finalizing P2SH multisig input #{}", self.index);
            let sigs = self.multisig_sigs(redeem_script)?;
            let builder = sigs
                .iter()
                .fold(Builder::new().push_int(0), |builder, sig| builder.push_slice(sig));
            return Ok(FinalData {
                final_script_sig: Some(builder.push_slice(redeem_script.as_bytes()).into_script()),
                final_script_witness: None,
            });
        }

        if script_pubkey.is_v0_p2wsh() {
            trace!("finalizing P2WSH input #{}", self.index);
            let witness = self.multisig_witness(script_pubkey)?;
            return Ok(FinalData {
                final_script_sig: None,
                final_script_witness: Some(witness),
            });
        }

        if script_pubkey.is_v1_p2tr() {
            self.require_witness_utxo()?;
            return self.taproot_witness().map(|witness| FinalData {
                final_script_sig: None,
                final_script_witness: Some(witness),
            });
        }

        Err(FinalizeError::UnsupportedScriptType(self.index))
    }

    /// Constructs witness for the multisig witness script committed to by
    /// the P2WSH `program`.
    fn multisig_witness(&self, program: &Script) -> Result<Witness, FinalizeError> {
        self.require_witness_utxo()?;
        let witness_script = self.data.witness_script.as_ref().ok_or_else(|| self.not_finalizable())?;
        if Script::new_v0_p2wsh(&witness_script.wscript_hash()) != *program {
            debug!("witness script of input #{} does not match the spent output", self.index);
            return Err(self.not_finalizable());
        }
        let sigs = self.multisig_sigs(witness_script)?;
        let mut stack = Vec::with_capacity(sigs.len() + 2);
        stack.push(vec![]);
        stack.extend(sigs);
        stack.push(witness_script.to_bytes());
        Ok(Witness::from_vec(stack))
    }

    fn taproot_witness(&self) -> Result<Witness, FinalizeError> {
        if let Some(sig) = &self.data.tap_key_sig {
            trace!("finalizing P2TR key path input #{}", self.index);
            let mut sig = sig.clone();
            if let Some(sighash_type) = self.data.sighash_type {
                let invalid = || FinalizeError::InvalidSighashFlags(self.index);
                let flag = u8::try_from(sighash_type).map_err(|_| invalid())?;
                match sig.len() {
                    64 if sighash_type != SIGHASH_DEFAULT => sig.push(flag),
                    65 if sig[64] != flag => return Err(invalid()),
                    _ => {}
                }
            }
            return Ok(Witness::from_vec(vec![sig]));
        }

        if self.data.tap_script_sigs.len() > 1 {
            return Err(FinalizeError::UnsupportedScriptType(self.index));
        }
        let ((_, leaf_hash), sig) =
            self.data.tap_script_sigs.iter().next().ok_or_else(|| self.not_finalizable())?;
        trace!("finalizing P2TR script path input #{}", self.index);
        let (control_block, leaf_script) = self
            .data
            .tap_leaf_scripts
            .iter()
            .find(|(_, leaf_script)| {
                leaf_script.leaf_hash().map(|hash| hash.into_inner()) == Some(*leaf_hash)
            })
            .ok_or_else(|| self.not_finalizable())?;
        Ok(Witness::from_vec(vec![
            sig.clone(),
            leaf_script.script.to_bytes(),
            control_block.clone(),
        ]))
    }
}

impl Psbt {
    /// Finalizes input, replacing its signing data with the final `scriptSig`
    /// and/or witness. UTXOs, proof-of-reserves commitment and unknown
    /// records are kept.
    pub fn finalize(&mut self, index: usize) -> Result<(), FinalizeError> {
        self.sanity_check()?;

        let input = self.inputs.get(index).ok_or(FinalizeError::WrongInputNo(index))?;
        let data = match &input.stage {
            InputStage::Finalized(_) => return Err(FinalizeError::AlreadyFinalized(index)),
            InputStage::Signing(data) => data,
        };
        let finalizer = InputFinalizer {
            index,
            data,
            has_witness_utxo: input.witness_utxo.is_some(),
        };
        finalizer.check_sighash_flags()?;
        let script_pubkey = &self.input_previous_txo(index)?.script_pubkey;
        let final_data = finalizer.finalize(script_pubkey)?;

        let signing = mem::replace(&mut self.inputs[index].stage, InputStage::Finalized(final_data));
        if let Err(err) = self.sanity_check() {
            self.inputs[index].stage = signing;
            return Err(err.into());
        }
        debug!("PSBT input #{} is finalized", index);
        Ok(())
    }

    /// Finalizes input unless it is already finalized. Returns whether the
    /// input is finalized; inputs lacking data for the finalization are left
    /// intact.
    pub fn maybe_finalize(&mut self, index: usize) -> Result<bool, FinalizeError> {
        match self.finalize(index) {
            Ok(()) | Err(FinalizeError::AlreadyFinalized(_)) => Ok(true),
            Err(FinalizeError::NotFinalizable(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Finalizes all inputs which are not finalized yet, failing on the first
    /// input which can't be finalized.
    pub fn finalize_all(&mut self) -> Result<(), FinalizeError> {
        for index in 0..self.inputs.len() {
            if !self.inputs[index].is_finalized() {
                self.finalize(index)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use bitcoin::blockdata::opcodes::all::{OP_CHECKSIG, OP_PUSHNUM_2, OP_PUSHNUM_3};
    use bitcoin::hashes::hex::FromHex;

    use super::*;
    use crate::test_helpers::*;
    use crate::{ExtractError, InputState, TapLeafScript};

    fn multisig_script(seeds: &[u8]) -> Script {
        let builder = seeds
            .iter()
            .fold(Builder::new().push_opcode(OP_PUSHNUM_2), |builder, seed| {
                builder.push_slice(&pubkey(*seed))
            });
        builder.push_opcode(OP_PUSHNUM_3).push_opcode(OP_CHECKMULTISIG).into_script()
    }

    fn p2sh_multisig_psbt(signers: &[u8]) -> (Psbt, Script) {
        let redeem_script = multisig_script(&[1, 2, 3]);
        let mut psbt = legacy_psbt(Script::new_p2sh(&redeem_script.script_hash()));
        let data = psbt.inputs[0].signing_mut().unwrap();
        data.redeem_script = Some(redeem_script.clone());
        for seed in signers {
            data.partial_sigs.insert(pubkey(*seed), ecdsa_sig(*seed, 0x01));
        }
        (psbt, redeem_script)
    }

    #[test]
    fn multisig_one_of_two_sigs() {
        let (mut psbt, _) = p2sh_multisig_psbt(&[3]);
        assert_eq!(psbt.inputs[0].state(), InputState::PartiallySigned);
        assert!(matches!(psbt.finalize(0), Err(FinalizeError::NotFinalizable(0))));
        assert_eq!(psbt.inputs[0].state(), InputState::PartiallySigned);
        assert_eq!(psbt.maybe_finalize(0).unwrap(), false);
    }

    #[test]
    fn multisig_two_sigs() {
        let (mut psbt, redeem_script) = p2sh_multisig_psbt(&[3, 1]);
        psbt.finalize(0).unwrap();

        let input = &psbt.inputs[0];
        assert_eq!(input.state(), InputState::Finalized);
        assert!(input.non_witness_utxo.is_some());
        assert!(input.final_script_witness().is_none());
        let expected = Builder::new()
            .push_int(0)
            .push_slice(&ecdsa_sig(1, 0x01))
            .push_slice(&ecdsa_sig(3, 0x01))
            .push_slice(redeem_script.as_bytes())
            .into_script();
        assert_eq!(input.final_script_sig(), Some(&expected));
        assert!(psbt.is_complete());

        let tx = psbt.extract_tx().unwrap();
        assert_eq!(tx.input[0].script_sig, expected);
        assert_eq!(Psbt::deserialize(&psbt.serialize()).unwrap(), psbt);
    }

    #[test]
    fn multisig_all_sigs_uses_threshold() {
        let (mut psbt, _) = p2sh_multisig_psbt(&[1, 2, 3]);
        psbt.finalize(0).unwrap();
        let script_sig = psbt.inputs[0].final_script_sig().unwrap();
        // OP_0, two signatures and the redeem script
        assert_eq!(script_sig.instructions().count(), 4);
    }

    #[test]
    fn multisig_foreign_sig() {
        let (mut psbt, _) = p2sh_multisig_psbt(&[1, 2]);
        let data = psbt.inputs[0].signing_mut().unwrap();
        data.partial_sigs.insert(pubkey(4), ecdsa_sig(4, 0x01));
        assert!(matches!(psbt.finalize(0), Err(FinalizeError::NotFinalizable(0))));
    }

    #[test]
    fn wrong_redeem_script() {
        let (mut psbt, _) = p2sh_multisig_psbt(&[1, 2]);
        psbt.inputs[0].signing_mut().unwrap().redeem_script = Some(multisig_script(&[1, 2, 4]));
        assert!(matches!(psbt.finalize(0), Err(FinalizeError::NotFinalizable(0))));
    }

    #[test]
    fn already_finalized() {
        let (mut psbt, _) = p2sh_multisig_psbt(&[1, 2]);
        psbt.finalize(0).unwrap();
        let finalized = psbt.inputs[0].clone();
        assert!(matches!(psbt.finalize(0), Err(FinalizeError::AlreadyFinalized(0))));
        assert_eq!(psbt.inputs[0], finalized);
        assert_eq!(psbt.maybe_finalize(0).unwrap(), true);
    }

    #[test]
    fn sighash_mismatch() {
        let (mut psbt, _) = p2sh_multisig_psbt(&[1]);
        let data = psbt.inputs[0].signing_mut().unwrap();
        data.partial_sigs.insert(pubkey(2), ecdsa_sig(2, 0x03));
        assert!(matches!(psbt.finalize(0), Err(FinalizeError::InvalidSighashFlags(0))));

        psbt.inputs[0].signing_mut().unwrap().sighash_type = Some(0x03);
        assert!(matches!(psbt.finalize(0), Err(FinalizeError::InvalidSighashFlags(0))));
    }

    #[test]
    fn p2pkh() {
        let pk = pubkey(5);
        let mut psbt = legacy_psbt(Script::new_p2pkh(&bitcoin::PubkeyHash::hash(&pk)));
        assert!(matches!(psbt.finalize(0), Err(FinalizeError::NotFinalizable(0))));

        psbt.inputs[0].signing_mut().unwrap().partial_sigs.insert(pk.clone(), ecdsa_sig(5, 0x01));
        psbt.finalize(0).unwrap();
        let expected = Builder::new().push_slice(&ecdsa_sig(5, 0x01)).push_slice(&pk).into_script();
        assert_eq!(psbt.inputs[0].final_script_sig(), Some(&expected));
    }

    #[test]
    fn p2pk() {
        let pk = pubkey(6);
        let script_pubkey = Builder::new().push_slice(&pk).push_opcode(OP_CHECKSIG).into_script();
        let mut psbt = legacy_psbt(script_pubkey);
        psbt.inputs[0].signing_mut().unwrap().partial_sigs.insert(pk, ecdsa_sig(6, 0x01));
        psbt.finalize(0).unwrap();
        let expected = Builder::new().push_slice(&ecdsa_sig(6, 0x01)).into_script();
        assert_eq!(psbt.inputs[0].final_script_sig(), Some(&expected));
    }

    #[test]
    fn p2wpkh() {
        let pk = pubkey(7);
        let mut psbt = segwit_psbt(Script::new_v0_p2wpkh(&bitcoin::WPubkeyHash::hash(&pk)));
        psbt.inputs[0].signing_mut().unwrap().partial_sigs.insert(pk.clone(), ecdsa_sig(7, 0x01));
        psbt.finalize(0).unwrap();

        let input = &psbt.inputs[0];
        assert!(input.final_script_sig().is_none());
        assert_eq!(
            input.final_script_witness(),
            Some(&Witness::from_vec(vec![ecdsa_sig(7, 0x01), pk]))
        );
        assert!(input.witness_utxo.is_some());
    }

    #[test]
    fn p2wpkh_without_witness_utxo() {
        let pk = pubkey(7);
        let mut psbt = legacy_psbt(Script::new_v0_p2wpkh(&bitcoin::WPubkeyHash::hash(&pk)));
        psbt.inputs[0].signing_mut().unwrap().partial_sigs.insert(pk, ecdsa_sig(7, 0x01));
        assert!(matches!(psbt.finalize(0), Err(FinalizeError::NotFinalizable(0))));
        assert!(!psbt.inputs[0].is_finalized());
    }

    #[test]
    fn p2sh_p2wpkh() {
        let pk = pubkey(8);
        let redeem_script = Script::new_v0_p2wpkh(&bitcoin::WPubkeyHash::hash(&pk));
        let mut psbt = segwit_psbt(Script::new_p2sh(&redeem_script.script_hash()));
        let data = psbt.inputs[0].signing_mut().unwrap();
        data.redeem_script = Some(redeem_script.clone());
        data.partial_sigs.insert(pk.clone(), ecdsa_sig(8, 0x01));
        psbt.finalize(0).unwrap();

        let input = &psbt.inputs[0];
        let script_sig = Builder::new().push_slice(redeem_script.as_bytes()).into_script();
        assert_eq!(input.final_script_sig(), Some(&script_sig));
        assert_eq!(
            input.final_script_witness(),
            Some(&Witness::from_vec(vec![ecdsa_sig(8, 0x01), pk]))
        );
    }

    #[test]
    fn p2wsh_multisig() {
        let witness_script = multisig_script(&[1, 2, 3]);
        let mut psbt = segwit_psbt(Script::new_v0_p2wsh(&witness_script.wscript_hash()));
        let data = psbt.inputs[0].signing_mut().unwrap();
        data.witness_script = Some(witness_script.clone());
        data.partial_sigs.insert(pubkey(2), ecdsa_sig(2, 0x01));
        data.partial_sigs.insert(pubkey(3), ecdsa_sig(3, 0x01));
        psbt.finalize(0).unwrap();

        let expected = Witness::from_vec(vec![
            vec![],
            ecdsa_sig(2, 0x01),
            ecdsa_sig(3, 0x01),
            witness_script.to_bytes(),
        ]);
        assert_eq!(psbt.inputs[0].final_script_witness(), Some(&expected));
        assert!(psbt.inputs[0].final_script_sig().is_none());
    }

    #[test]
    fn p2sh_p2wsh_multisig() {
        let witness_script = multisig_script(&[1, 2, 3]);
        let redeem_script = Script::new_v0_p2wsh(&witness_script.wscript_hash());
        let mut psbt = segwit_psbt(Script::new_p2sh(&redeem_script.script_hash()));
        let data = psbt.inputs[0].signing_mut().unwrap();
        data.redeem_script = Some(redeem_script.clone());
        data.witness_script = Some(witness_script.clone());
        data.partial_sigs.insert(pubkey(1), ecdsa_sig(1, 0x01));
        data.partial_sigs.insert(pubkey(3), ecdsa_sig(3, 0x01));
        psbt.finalize(0).unwrap();

        let input = &psbt.inputs[0];
        let script_sig = Builder::new().push_slice(redeem_script.as_bytes()).into_script();
        assert_eq!(input.final_script_sig(), Some(&script_sig));
        assert_eq!(input.final_script_witness().map(Witness::len), Some(4));
    }

    #[test]
    fn non_multisig_witness_script() {
        let witness_script = Builder::new().push_slice(&pubkey(1)).push_opcode(OP_CHECKSIG).into_script();
        let mut psbt = segwit_psbt(Script::new_v0_p2wsh(&witness_script.wscript_hash()));
        let data = psbt.inputs[0].signing_mut().unwrap();
        data.witness_script = Some(witness_script);
        data.partial_sigs.insert(pubkey(1), ecdsa_sig(1, 0x01));
        assert!(matches!(psbt.finalize(0), Err(FinalizeError::UnsupportedScriptType(0))));
    }

    #[test]
    fn unsupported_output() {
        let mut psbt = segwit_psbt(Builder::new().push_opcode(OP_PUSHNUM_3).into_script());
        assert!(matches!(psbt.finalize(0), Err(FinalizeError::UnsupportedScriptType(0))));
    }

    fn p2tr_script_pubkey() -> Script {
        let mut spk = vec![0x51, 0x20];
        spk.extend([0x22u8; 32]);
        Script::from(spk)
    }

    #[test]
    fn taproot_key_path() {
        let mut psbt = segwit_psbt(p2tr_script_pubkey());
        assert!(matches!(psbt.finalize(0), Err(FinalizeError::NotFinalizable(0))));

        let data = psbt.inputs[0].signing_mut().unwrap();
        data.tap_key_sig = Some(vec![0x11; 64]);
        data.sighash_type = Some(0x83);
        assert_eq!(psbt.inputs[0].state(), InputState::PartiallySigned);
        psbt.finalize(0).unwrap();

        let mut sig = vec![0x11; 64];
        sig.push(0x83);
        assert_eq!(psbt.inputs[0].final_script_witness(), Some(&Witness::from_vec(vec![sig])));
    }

    #[test]
    fn taproot_key_path_sighash() {
        let mut sig = vec![0x11; 64];
        sig.push(0x01);

        let mut psbt = segwit_psbt(p2tr_script_pubkey());
        let data = psbt.inputs[0].signing_mut().unwrap();
        data.tap_key_sig = Some(sig.clone());
        data.sighash_type = Some(0x02);
        assert!(matches!(psbt.finalize(0), Err(FinalizeError::InvalidSighashFlags(0))));
        assert_eq!(psbt.inputs[0].state(), InputState::PartiallySigned);

        psbt.inputs[0].signing_mut().unwrap().sighash_type = Some(SIGHASH_DEFAULT);
        assert!(matches!(psbt.finalize(0), Err(FinalizeError::InvalidSighashFlags(0))));

        psbt.inputs[0].signing_mut().unwrap().sighash_type = Some(0x01);
        psbt.finalize(0).unwrap();
        assert_eq!(psbt.inputs[0].final_script_witness(), Some(&Witness::from_vec(vec![sig])));

        // sighash type which does not fit into the signature flag byte
        let mut psbt = segwit_psbt(p2tr_script_pubkey());
        let data = psbt.inputs[0].signing_mut().unwrap();
        data.tap_key_sig = Some(vec![0x11; 64]);
        data.sighash_type = Some(0x0101);
        assert!(matches!(psbt.finalize(0), Err(FinalizeError::InvalidSighashFlags(0))));
    }

    #[test]
    fn taproot_script_path() {
        let control_block = Vec::<u8>::from_hex(
            "c079be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798",
        )
        .unwrap();
        let leaf_script = TapLeafScript {
            script: Builder::new()
                .push_slice(&[0x33; 32])
                .push_opcode(OP_CHECKSIG)
                .into_script(),
            leaf_version: 0xc0,
        };
        let leaf_hash = leaf_script.leaf_hash().unwrap().into_inner();

        let mut psbt = segwit_psbt(p2tr_script_pubkey());
        let data = psbt.inputs[0].signing_mut().unwrap();
        data.tap_leaf_scripts.insert(control_block.clone(), leaf_script.clone());
        data.tap_script_sigs.insert(([0x33; 32], leaf_hash), vec![0x44; 64]);
        psbt.finalize(0).unwrap();

        let expected =
            Witness::from_vec(vec![vec![0x44; 64], leaf_script.script.to_bytes(), control_block]);
        assert_eq!(psbt.inputs[0].final_script_witness(), Some(&expected));
    }

    #[test]
    fn taproot_multiple_script_sigs() {
        let mut psbt = segwit_psbt(p2tr_script_pubkey());
        let data = psbt.inputs[0].signing_mut().unwrap();
        data.tap_script_sigs.insert(([0x33; 32], [0x01; 32]), vec![0x44; 64]);
        data.tap_script_sigs.insert(([0x34; 32], [0x01; 32]), vec![0x45; 64]);
        assert!(matches!(psbt.finalize(0), Err(FinalizeError::UnsupportedScriptType(0))));
    }

    #[test]
    fn missing_utxo() {
        let (mut psbt, _) = p2sh_multisig_psbt(&[1, 2]);
        psbt.inputs[0].non_witness_utxo = None;
        assert!(matches!(
            psbt.finalize(0),
            Err(FinalizeError::Utxo(MatchError::NoInputTx(0)))
        ));
        assert!(matches!(psbt.finalize(1), Err(FinalizeError::WrongInputNo(1))));
    }

    #[test]
    fn finalize_all() {
        let redeem_script = multisig_script(&[1, 2, 3]);
        let prev = funding_tx(Script::new_p2sh(&redeem_script.script_hash()), 100_000);
        let outpoints = [
            bitcoin::OutPoint::new(prev.txid(), 0),
            bitcoin::OutPoint::new(prev.txid(), 0),
        ];
        let mut psbt = Psbt::new(&outpoints, vec![], 2, 0, &[bitcoin::Sequence::MAX; 2]).unwrap();
        for input in &mut psbt.inputs {
            input.non_witness_utxo = Some(prev.clone());
            let data = input.signing_mut().unwrap();
            data.redeem_script = Some(redeem_script.clone());
            data.partial_sigs.insert(pubkey(1), ecdsa_sig(1, 0x01));
        }
        assert!(matches!(psbt.finalize_all(), Err(FinalizeError::NotFinalizable(0))));

        for input in &mut psbt.inputs {
            input.signing_mut().unwrap().partial_sigs.insert(pubkey(2), ecdsa_sig(2, 0x01));
        }
        psbt.finalize(1).unwrap();
        assert!(!psbt.is_complete());
        assert!(matches!(psbt.extract_tx(), Err(ExtractError::Incomplete(0))));

        psbt.finalize_all().unwrap();
        assert!(psbt.is_complete());
        assert_eq!(psbt.extract_tx().unwrap().input.len(), 2);
    }
}
