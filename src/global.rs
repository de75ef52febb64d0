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

use std::fmt::{self, Display, Formatter};
use std::io::{self, Read, Write};
use std::str::FromStr;

use base64::Engine;
use bitcoin::consensus::{Decodable, Encodable};
use bitcoin::{OutPoint, PackedLockTime, Script, Sequence, Transaction, TxIn, TxOut, Witness};

use crate::consts::*;
use crate::raw::{self, Unknown};
use crate::types::encode_key_source;
use crate::{
    Error, ExtractError, Input, KeyValidator, Output, Secp256k1Validator, TxError, TxinError, XPub,
};

/// Partially signed bitcoin transaction (BIP-174) packet.
#[derive(Clone, Eq, PartialEq, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
pub struct Psbt {
    /// The unsigned transaction, with empty `scriptSig`s and witnesses.
    pub unsigned_tx: Transaction,

    /// The corresponding key-value map for each input.
    pub inputs: Vec<Input>,

    /// The corresponding key-value map for each output.
    pub outputs: Vec<Output>,

    /// Global extended public keys with their origin, as defined by BIP 32.
    pub xpubs: Vec<XPub>,

    /// Unknown global key-value pairs.
    pub unknown: Vec<Unknown>,
}

/// Checks that unsigned transaction does not have scriptSig's or witness
/// data
pub(crate) fn check_unsigned_tx(tx: &Transaction) -> Result<(), TxinError> {
    for (index, txin) in tx.input.iter().enumerate() {
        if !txin.script_sig.is_empty() {
            return Err(TxinError::UnsignedTxHasScriptSigs(index));
        }
        if !txin.witness.is_empty() {
            return Err(TxinError::UnsignedTxHasScriptWitnesses(index));
        }
    }
    Ok(())
}

/// Writes the unsigned transaction in the legacy (non-witness) format, which
/// never carries the segwit marker and flag, even for zero inputs.
fn encode_unsigned_tx(tx: &Transaction) -> Vec<u8> {
    let mut buf = vec![];
    tx.version.consensus_encode(&mut buf).expect("in-memory writers don't error");
    tx.input.consensus_encode(&mut buf).expect("in-memory writers don't error");
    tx.output.consensus_encode(&mut buf).expect("in-memory writers don't error");
    tx.lock_time.consensus_encode(&mut buf).expect("in-memory writers don't error");
    buf
}

/// Reads the unsigned transaction in the legacy (non-witness) format. The
/// value must be consumed completely.
fn decode_unsigned_tx(data: &[u8]) -> Result<Transaction, Error> {
    let mut cursor = data;
    let tx = Transaction {
        version: Decodable::consensus_decode(&mut cursor)?,
        input: Decodable::consensus_decode(&mut cursor)?,
        output: Decodable::consensus_decode(&mut cursor)?,
        lock_time: Decodable::consensus_decode(&mut cursor)?,
    };
    if !cursor.is_empty() {
        debug!("{} bytes of data after the unsigned transaction", cursor.len());
        return Err(Error::InvalidFormat);
    }
    Ok(tx)
}

fn base64_engine() -> base64::engine::GeneralPurpose {
    base64::engine::GeneralPurpose::new(
        &base64::alphabet::STANDARD,
        base64::engine::GeneralPurposeConfig::new(),
    )
}

impl Psbt {
    /// Constructs PSBT with empty inputs and outputs from an unsigned
    /// transaction. Fails if any of the transaction inputs has a `scriptSig`
    /// or witness.
    pub fn from_unsigned_tx(tx: Transaction) -> Result<Self, TxinError> {
        check_unsigned_tx(&tx)?;
        debug!(
            "creating PSBT for transaction {} with {} inputs and {} outputs",
            tx.txid(),
            tx.input.len(),
            tx.output.len()
        );
        Ok(Psbt {
            inputs: vec![Input::default(); tx.input.len()],
            outputs: vec![Output::default(); tx.output.len()],
            unsigned_tx: tx,
            xpubs: vec![],
            unknown: vec![],
        })
    }

    /// Constructs PSBT spending `outpoints` into `outputs`. Each of the
    /// inputs gets the sequence number under the same index from
    /// `sequences`.
    pub fn new(
        outpoints: &[OutPoint],
        outputs: Vec<TxOut>,
        version: i32,
        lock_time: u32,
        sequences: &[Sequence],
    ) -> Result<Self, TxError> {
        if outpoints.len() != sequences.len() {
            return Err(TxError::SequenceMismatch(sequences.len()));
        }
        let input = outpoints
            .iter()
            .zip(sequences)
            .map(|(outpoint, sequence)| TxIn {
                previous_output: *outpoint,
                script_sig: Script::new(),
                sequence: *sequence,
                witness: Witness::new(),
            })
            .collect();
        let tx = Transaction {
            version,
            lock_time: PackedLockTime(lock_time),
            input,
            output: outputs,
        };
        Psbt::from_unsigned_tx(tx).map_err(TxError::from)
    }

    /// Parses binary PSBT serialization, validating keys and signatures with
    /// [`Secp256k1Validator`].
    #[inline]
    pub fn deserialize(data: &[u8]) -> Result<Self, Error> {
        Psbt::deserialize_with(data, &Secp256k1Validator)
    }

    /// Parses binary PSBT serialization using custom key validator. Data
    /// remaining after the last output section are an error.
    pub fn deserialize_with(data: &[u8], validator: &impl KeyValidator) -> Result<Self, Error> {
        let mut cursor = data;
        let psbt = Psbt::deserialize_from_reader(&mut cursor, validator)?;
        if !cursor.is_empty() {
            debug!("{} bytes of data after the end of PSBT", cursor.len());
            return Err(Error::InvalidFormat);
        }
        Ok(psbt)
    }

    /// Parses PSBT from a binary stream, leaving the data following the last
    /// output section unread.
    pub fn deserialize_from_reader<R: Read>(
        r: &mut R,
        validator: &impl KeyValidator,
    ) -> Result<Self, Error> {
        let mut magic = [0u8; 5];
        r.read_exact(&mut magic).map_err(|_| Error::InvalidMagic)?;
        if magic != PSBT_MAGIC {
            return Err(Error::InvalidMagic);
        }

        let key = raw::read_key(r)?.ok_or(Error::InvalidFormat)?;
        if key.type_value != PSBT_GLOBAL_UNSIGNED_TX || !key.key.is_empty() {
            return Err(Error::InvalidFormat);
        }
        let value = raw::read_value(r, MAX_PSBT_VALUE_LENGTH)?;
        let unsigned_tx = decode_unsigned_tx(&value)?;
        check_unsigned_tx(&unsigned_tx)?;

        let mut xpubs = Vec::<XPub>::new();
        let mut unknown = vec![];
        while let Some(key) = raw::read_key(r)? {
            let value = raw::read_value(r, MAX_PSBT_VALUE_LENGTH)?;
            match key.type_value {
                PSBT_GLOBAL_UNSIGNED_TX => return Err(Error::DuplicateKey),
                PSBT_GLOBAL_XPUB => {
                    if xpubs.iter().any(|xpub| xpub.extended_key == key.key) {
                        return Err(Error::DuplicateKey);
                    }
                    xpubs.push(XPub::decode(key.type_value, key.key, &value, validator)?);
                }
                _ => raw::push_unknown(&mut unknown, key.into_unknown(value))?,
            }
        }

        let inputs = (0..unsigned_tx.input.len())
            .map(|_| Input::decode(r, validator))
            .collect::<Result<Vec<_>, _>>()?;
        let outputs = (0..unsigned_tx.output.len())
            .map(|_| Output::decode(r, validator))
            .collect::<Result<Vec<_>, _>>()?;

        let psbt = Psbt {
            unsigned_tx,
            inputs,
            outputs,
            xpubs,
            unknown,
        };
        psbt.sanity_check()?;
        debug!(
            "parsed PSBT for transaction {} with {} inputs and {} outputs",
            psbt.unsigned_tx.txid(),
            psbt.inputs.len(),
            psbt.outputs.len()
        );
        Ok(psbt)
    }

    /// Parses PSBT from binary or, if `b64` is set, from base64-encoded
    /// data.
    pub fn from_raw_bytes(data: &[u8], b64: bool) -> Result<Self, PsbtParseError> {
        if b64 {
            let bin = base64_engine().decode(data)?;
            Psbt::deserialize(&bin).map_err(PsbtParseError::from)
        } else {
            Psbt::deserialize(data).map_err(PsbtParseError::from)
        }
    }

    /// Writes binary PSBT serialization into a stream.
    pub fn encode<W: Write>(&self, w: &mut W) -> Result<usize, io::Error> {
        w.write_all(&PSBT_MAGIC)?;
        let mut len = PSBT_MAGIC.len();

        len += raw::write_kv(
            w,
            PSBT_GLOBAL_UNSIGNED_TX,
            &[],
            &encode_unsigned_tx(&self.unsigned_tx),
        )?;
        for xpub in &self.xpubs {
            len += raw::write_kv(
                w,
                PSBT_GLOBAL_XPUB,
                &xpub.extended_key,
                &encode_key_source(&xpub.key_source()),
            )?;
        }
        for unknown in &self.unknown {
            len += unknown.encode(w)?;
        }
        len += raw::write_separator(w)?;

        for input in &self.inputs {
            len += input.encode(w)?;
        }
        for output in &self.outputs {
            len += output.encode(w)?;
        }
        Ok(len)
    }

    /// Returns binary PSBT serialization.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = vec![];
        self.encode(&mut buf).expect("in-memory writers don't error");
        buf
    }

    /// Returns base64-encoded PSBT serialization.
    #[inline]
    pub fn to_base64(&self) -> String { base64_engine().encode(self.serialize()) }

    /// Checks structural consistency of the PSBT:
    /// - unsigned transaction has no `scriptSig`s and witnesses;
    /// - number of inputs and outputs matches the transaction;
    /// - all inputs are sane (see [`Input::is_sane`]).
    pub fn sanity_check(&self) -> Result<(), Error> {
        check_unsigned_tx(&self.unsigned_tx)?;
        if self.inputs.len() != self.unsigned_tx.input.len()
            || self.outputs.len() != self.unsigned_tx.output.len()
        {
            return Err(Error::InvalidFormat);
        }
        if let Some(index) = self.inputs.iter().position(|input| !input.is_sane()) {
            debug!("PSBT input #{} is not sane", index);
            return Err(Error::InvalidFormat);
        }
        Ok(())
    }

    /// Detects whether all inputs are finalized, such that the signed
    /// transaction can be extracted.
    pub fn is_complete(&self) -> bool { self.inputs.iter().all(Input::is_finalized) }

    /// Extracts signed transaction, filling in final `scriptSig`s and
    /// witnesses. Fails unless all of the inputs are finalized.
    pub fn extract_tx(&self) -> Result<Transaction, ExtractError> {
        self.sanity_check()?;
        if let Some(index) = self.inputs.iter().position(|input| !input.is_finalized()) {
            return Err(ExtractError::Incomplete(index));
        }

        let mut tx = self.unsigned_tx.clone();
        for (txin, input) in tx.input.iter_mut().zip(&self.inputs) {
            txin.script_sig = input.final_script_sig().cloned().unwrap_or_default();
            txin.witness = input.final_script_witness().cloned().unwrap_or_default();
        }
        debug!("extracted signed transaction {}", tx.txid());
        Ok(tx)
    }
}

impl Display for Psbt {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result { f.write_str(&self.to_base64()) }
}

/// Errors parsing PSBT from its textual or raw representation.
#[derive(Debug, Display, Error, From)]
#[display(inner)]
pub enum PsbtParseError {
    /// Invalid PSBT data.
    #[from]
    Data(Error),

    /// Invalid base64 encoding.
    #[from]
    Base64(base64::DecodeError),
}

impl FromStr for Psbt {
    type Err = PsbtParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Psbt::from_raw_bytes(s.trim().as_bytes(), true)
    }
}
