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

//! Byte-level validation of keys and signatures contained in PSBT records.
//!
//! Validation only checks that the data are well-formed; signatures are never
//! verified against the transaction.

use bitcoin::secp256k1::{ecdsa, schnorr, PublicKey, XOnlyPublicKey};

/// Capability checking well-formedness of the public keys and signatures
/// found in PSBT records. Used by the parser and by the
/// [`Updater`](crate::Updater).
pub trait KeyValidator {
    /// Checks that `data` is a valid compressed or uncompressed public key.
    fn validate_pubkey(&self, data: &[u8]) -> bool;

    /// Checks that `data` is a strict DER-encoded ECDSA signature followed by
    /// a single sighash type byte.
    fn validate_der_signature(&self, data: &[u8]) -> bool;

    /// Checks that `data` is a valid BIP-340 x-only public key.
    fn validate_xonly_pubkey(&self, data: &[u8]) -> bool;

    /// Checks that `data` is a BIP-340 signature, optionally followed by a
    /// non-default sighash type byte.
    fn validate_schnorr_signature(&self, data: &[u8]) -> bool;
}

/// [`KeyValidator`] backed by libsecp256k1 parsing functions.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub struct Secp256k1Validator;

impl KeyValidator for Secp256k1Validator {
    fn validate_pubkey(&self, data: &[u8]) -> bool { PublicKey::from_slice(data).is_ok() }

    fn validate_der_signature(&self, data: &[u8]) -> bool {
        match data.split_last() {
            Some((_, der)) => ecdsa::Signature::from_der(der).is_ok(),
            None => false,
        }
    }

    fn validate_xonly_pubkey(&self, data: &[u8]) -> bool {
        XOnlyPublicKey::from_slice(data).is_ok()
    }

    fn validate_schnorr_signature(&self, data: &[u8]) -> bool {
        match data.len() {
            64 => schnorr::Signature::from_slice(data).is_ok(),
            // 0x00 sighash must be expressed with a 64-byte signature
            65 if data[64] != 0x00 => schnorr::Signature::from_slice(&data[..64]).is_ok(),
            _ => false,
        }
    }
}
