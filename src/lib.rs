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

// Coding conventions
#![recursion_limit = "256"]
#![deny(dead_code)]
#![warn(missing_docs)]

//! Partially signed bitcoin transaction (BIP-174) library: binary and base64
//! codec, sanity validation, updating, combining, finalization and fee
//! accounting for PSBT v0 packets.

#[macro_use]
extern crate amplify;
#[macro_use]
extern crate log;
#[cfg(feature = "serde")]
#[macro_use]
extern crate serde_crate as serde;

pub mod consts;
mod errors;
mod combine;
mod finalize;
mod global;
mod input;
mod output;
pub mod raw;
mod structure;
mod types;
mod updater;
pub mod validate;
#[cfg(test)]
mod test_helpers;

pub use combine::CombineError;
pub use errors::{Error, ExtractError, TxError, TxinError};
pub use finalize::FinalizeError;
pub use global::{Psbt, PsbtParseError};
pub use input::{FinalData, Input, InputStage, InputState, SigningData};
pub use output::Output;
pub use raw::Unknown;
pub use structure::{Fee, FeeError, InputPreviousTxo, MatchError};
pub use types::{PartialSig, TapKeySource, TapLeafScript, XPub};
pub use updater::{UpdateError, Updater};
pub use validate::{KeyValidator, Secp256k1Validator};
