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

use bitcoin::{TxOut, Txid};

use crate::Psbt;

/// Errors happening when PSBT input data does not match the structure of the
/// unsigned transaction
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display, Error
)]
#[display(doc_comments)]
pub enum MatchError {
    /// No `witness_utxo` and `non_witness_utxo` is provided for input {0}
    NoInputTx(usize),

    /// Provided `non_witness_utxo` does not match transaction {1} spent by
    /// input {0}
    NoTxidMatch(usize, Txid),

    /// Provided `non_witness_utxo` for input {0} does not contain the output
    /// spent by the input
    UnmatchingInputNumber(usize),

    /// Transaction has less than {0} inputs
    WrongInputNo(usize),
}

/// API for accessing previous transaction output data
pub trait InputPreviousTxo {
    /// Returns [`TxOut`] spent by the input, taken either from witness UTXO
    /// or from the previous transaction, or reports the specific matching
    /// error which prevented getting the output
    fn input_previous_txo(&self, index: usize) -> Result<&TxOut, MatchError>;
}

/// Errors happening during fee computation
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display, Error, From
)]
#[display(doc_comments)]
pub enum FeeError {
    /// No input source information found because of wrong or incomplete PSBT
    /// structure
    #[from]
    MatchError(MatchError),

    /// Sum of inputs is less than sum of outputs
    InputsLessThanOutputs,

    /// Sum of input values overflows
    Overflow,
}

/// Fee computing API
pub trait Fee {
    /// Returns fee for a transaction, or returns error reporting missing
    /// input data or wrong transaction structure
    fn fee(&self) -> Result<u64, FeeError>;
}

impl InputPreviousTxo for Psbt {
    fn input_previous_txo(&self, index: usize) -> Result<&TxOut, MatchError> {
        let (input, txin) = match (self.inputs.get(index), self.unsigned_tx.input.get(index)) {
            (Some(input), Some(txin)) => (input, txin),
            _ => return Err(MatchError::WrongInputNo(index)),
        };
        if let Some(txout) = &input.witness_utxo {
            return Ok(txout);
        }
        let tx = input.non_witness_utxo.as_ref().ok_or(MatchError::NoInputTx(index))?;
        let txid = txin.previous_output.txid;
        if txid != tx.txid() {
            return Err(MatchError::NoTxidMatch(index, txid));
        }
        tx.output
            .get(txin.previous_output.vout as usize)
            .ok_or(MatchError::UnmatchingInputNumber(index))
    }
}

impl Psbt {
    /// Sums values of all outputs spent by the transaction. Inputs without
    /// UTXO information, or with the previous transaction not matching the
    /// outpoint, result in an error.
    pub fn sum_utxo_input_values(&self) -> Result<u64, FeeError> {
        (0..self.unsigned_tx.input.len()).try_fold(0u64, |sum, index| {
            let value = self.input_previous_txo(index)?.value;
            sum.checked_add(value).ok_or(FeeError::Overflow)
        })
    }
}

impl Fee for Psbt {
    fn fee(&self) -> Result<u64, FeeError> {
        let input_sum = self.sum_utxo_input_values()?;
        let output_sum = self
            .unsigned_tx
            .output
            .iter()
            .try_fold(0u64, |sum, txout| sum.checked_add(txout.value))
            .ok_or(FeeError::Overflow)?;

        input_sum
            .checked_sub(output_sum)
            .ok_or(FeeError::InputsLessThanOutputs)
    }
}
