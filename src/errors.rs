// Wallet-level libraries for bitcoin protocol by LNP/BP Association
//
// Written in 2020-2022 by
//     Dr. Maxim Orlovsky <orlovsky@lnp-bp.org>
//
// This software is distributed without any warranty.
//
// You should have received a copy of the Apache-2.0 License
// along with this software.
// If not, see <https://opensource.org/licenses/Apache-2.0>.

use std::io;

use bitcoin::consensus;

/// Errors in the unsigned transaction input found while constructing or
/// parsing a PSBT.
#[derive(
    Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Display, Error
)]
#[display(doc_comments)]
pub enum TxinError {
    /// the scriptSig in the input #{0} of the unsigned transaction is not
    /// empty.
    UnsignedTxHasScriptSigs(usize),

    /// the witness in the input #{0} of the unsigned transaction is not empty.
    UnsignedTxHasScriptWitnesses(usize),
}

/// Errors during [`Psbt`](super::Psbt) construction from an unsigned
/// transaction data (see [`Psbt::from_unsigned_tx`](super::Psbt::from_unsigned_tx)).
#[derive(
    Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Display, Error, From
)]
#[display(doc_comments)]
pub enum TxError {
    /// Error in an unsigned transaction input (see [`TxinError`]).
    #[from]
    #[display(inner)]
    Txin(TxinError),

    /// {0} sequence numbers were provided, which does not match the number of
    /// transaction inputs.
    SequenceMismatch(usize),
}

/// Errors of PSBT binary encoding, raised by the parser and by the sanity
/// check of an in-memory PSBT.
#[derive(Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum Error {
    /// PSBT data does not start with the magic bytes.
    InvalidMagic,

    /// PSBT serialization does not follow the format rules of BIP-174: a
    /// mandatory record is missing or misplaced.
    InvalidFormat,

    /// PSBT contains a duplicated key.
    DuplicateKey,

    /// PSBT key length {0} exceeds the maximum allowed size.
    OversizedKey(u64),

    /// PSBT value length {0} exceeds the maximum allowed size.
    OversizedValue(u64),

    /// PSBT key type {0} is outside of the allowed range.
    InvalidKeyType(u64),

    /// PSBT record of type {0} contains invalid key or value data.
    InvalidKeyData(u64),

    /// PSBT unsigned transaction is invalid: {0}
    #[from]
    UnsignedTx(TxinError),

    /// consensus encoding error: {0}
    #[from]
    Consensus(consensus::encode::Error),
}

impl From<io::Error> for Error {
    #[inline]
    fn from(err: io::Error) -> Self { Error::Consensus(consensus::encode::Error::Io(err)) }
}

/// Errors happening during transaction extraction from the PSBT.
#[derive(Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum ExtractError {
    /// PSBT can't be extracted since it is incomplete: input #{0} is not
    /// finalized.
    Incomplete(usize),

    /// PSBT is not sane: {0}
    #[from]
    Sanity(Error),
}
