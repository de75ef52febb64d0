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

//! Constants defined by BIP-174 and the limits this library enforces while
//! reading untrusted data.

/// Magic bytes starting every serialized PSBT: ASCII `psbt` followed by
/// `0xff` separator.
pub const PSBT_MAGIC: [u8; 5] = [0x70, 0x73, 0x62, 0x74, 0xff];

/// Maximum length of a single key (including its type prefix) accepted by
/// the parser.
pub const MAX_PSBT_KEY_LENGTH: u64 = 10_000;

/// Maximum length of a single value accepted by the parser. This is larger
/// than any standard transaction which may be put into `non_witness_utxo`.
pub const MAX_PSBT_VALUE_LENGTH: u64 = 4_000_000;

/// Upper (exclusive) bound for the key type value. It is not defined by
/// BIP-174, but matches the limit used by Bitcoin Core.
pub const MAX_PSBT_KEY_TYPE: u64 = 0x0200_0000;

/// Length of BIP-32 serialized extended key.
pub const XPUB_LENGTH: usize = 78;

/// Default value for `SIGHASH_ALL`, which is required from ECDSA signatures
/// when an input does not specify its own sighash type.
pub const SIGHASH_ALL: u32 = 0x01;

/// Taproot `SIGHASH_DEFAULT`, which is omitted from 64-byte signatures.
pub const SIGHASH_DEFAULT: u32 = 0x00;

/// Global: the unsigned transaction in non-witness format.
pub const PSBT_GLOBAL_UNSIGNED_TX: u64 = 0x00;
/// Global: extended public key with its key source.
pub const PSBT_GLOBAL_XPUB: u64 = 0x01;

/// Input: full previous transaction.
pub const PSBT_IN_NON_WITNESS_UTXO: u64 = 0x00;
/// Input: spent transaction output.
pub const PSBT_IN_WITNESS_UTXO: u64 = 0x01;
/// Input: ECDSA signature keyed by its public key.
pub const PSBT_IN_PARTIAL_SIG: u64 = 0x02;
/// Input: sighash type required from signatures.
pub const PSBT_IN_SIGHASH_TYPE: u64 = 0x03;
/// Input: P2SH redeem script.
pub const PSBT_IN_REDEEM_SCRIPT: u64 = 0x04;
/// Input: P2WSH witness script.
pub const PSBT_IN_WITNESS_SCRIPT: u64 = 0x05;
/// Input: BIP-32 derivation of a public key.
pub const PSBT_IN_BIP32_DERIVATION: u64 = 0x06;
/// Input: finalized `scriptSig`.
pub const PSBT_IN_FINAL_SCRIPTSIG: u64 = 0x07;
/// Input: finalized witness stack.
pub const PSBT_IN_FINAL_SCRIPTWITNESS: u64 = 0x08;
/// Input: proof-of-reserves commitment (UTF-8 string).
pub const PSBT_IN_POR_COMMITMENT: u64 = 0x09;
/// Input: RIPEMD-160 preimage.
pub const PSBT_IN_RIPEMD160: u64 = 0x0a;
/// Input: SHA-256 preimage.
pub const PSBT_IN_SHA256: u64 = 0x0b;
/// Input: HASH160 preimage.
pub const PSBT_IN_HASH160: u64 = 0x0c;
/// Input: double SHA-256 preimage.
pub const PSBT_IN_HASH256: u64 = 0x0d;
/// Input: taproot key path signature.
pub const PSBT_IN_TAP_KEY_SIG: u64 = 0x13;
/// Input: taproot script path signature keyed by x-only key and leaf hash.
pub const PSBT_IN_TAP_SCRIPT_SIG: u64 = 0x14;
/// Input: taproot leaf script keyed by its control block.
pub const PSBT_IN_TAP_LEAF_SCRIPT: u64 = 0x15;
/// Input: taproot key derivation with leaf hashes.
pub const PSBT_IN_TAP_BIP32_DERIVATION: u64 = 0x16;
/// Input: taproot internal key.
pub const PSBT_IN_TAP_INTERNAL_KEY: u64 = 0x17;
/// Input: taproot script tree merkle root.
pub const PSBT_IN_TAP_MERKLE_ROOT: u64 = 0x18;

/// Output: P2SH redeem script.
pub const PSBT_OUT_REDEEM_SCRIPT: u64 = 0x00;
/// Output: P2WSH witness script.
pub const PSBT_OUT_WITNESS_SCRIPT: u64 = 0x01;
/// Output: BIP-32 derivation of a public key.
pub const PSBT_OUT_BIP32_DERIVATION: u64 = 0x02;
/// Output: taproot internal key.
pub const PSBT_OUT_TAP_INTERNAL_KEY: u64 = 0x05;
/// Output: taproot script tree.
pub const PSBT_OUT_TAP_TREE: u64 = 0x06;
/// Output: taproot key derivation with leaf hashes.
pub const PSBT_OUT_TAP_BIP32_DERIVATION: u64 = 0x07;
