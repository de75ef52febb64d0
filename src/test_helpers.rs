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

//! Deterministic keys, signatures and transactions shared by unit tests.

use bitcoin::secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use bitcoin::{OutPoint, PackedLockTime, Script, Transaction, TxIn, TxOut};

use crate::Psbt;

pub fn pubkey(seed: u8) -> Vec<u8> {
    let secp = Secp256k1::signing_only();
    let sk = SecretKey::from_slice(&[seed; 32]).unwrap();
    PublicKey::from_secret_key(&secp, &sk).serialize().to_vec()
}

/// DER signature of a fixed message with the sighash byte appended.
pub fn ecdsa_sig(seed: u8, sighash: u8) -> Vec<u8> {
    let secp = Secp256k1::signing_only();
    let sk = SecretKey::from_slice(&[seed; 32]).unwrap();
    let msg = Message::from_slice(&[0x01; 32]).unwrap();
    let mut sig = secp.sign_ecdsa(&msg, &sk).serialize_der().to_vec();
    sig.push(sighash);
    sig
}

pub fn funding_tx(script_pubkey: Script, value: u64) -> Transaction {
    Transaction {
        version: 2,
        lock_time: PackedLockTime::ZERO,
        input: vec![TxIn::default()],
        output: vec![TxOut {
            value,
            script_pubkey,
        }],
    }
}

/// Single-input PSBT spending the first output of `prev`, with no UTXO
/// information set.
pub fn spending_psbt(prev: &Transaction) -> Psbt {
    let outputs = vec![TxOut {
        value: prev.output[0].value - 1_000,
        script_pubkey: Script::new(),
    }];
    Psbt::new(
        &[OutPoint::new(prev.txid(), 0)],
        outputs,
        2,
        0,
        &[bitcoin::Sequence::MAX],
    )
    .unwrap()
}

/// PSBT spending a legacy output, with the previous transaction attached.
pub fn legacy_psbt(script_pubkey: Script) -> Psbt {
    let prev = funding_tx(script_pubkey, 100_000);
    let mut psbt = spending_psbt(&prev);
    psbt.inputs[0].non_witness_utxo = Some(prev);
    psbt
}

/// PSBT spending a segwit output, with the witness UTXO attached.
pub fn segwit_psbt(script_pubkey: Script) -> Psbt {
    let prev = funding_tx(script_pubkey, 100_000);
    let mut psbt = spending_psbt(&prev);
    psbt.inputs[0].witness_utxo = Some(prev.output[0].clone());
    psbt
}
