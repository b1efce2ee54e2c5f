//! Reader for AdLib instrument bank (`.BNK`) files.
//!
//! Banks carry named 28-byte FM instrument definitions that the IMS and
//! ROL players look up at load time and whenever a song switches
//! instruments mid-play.
//!
//! ```no_run
//! use ym3812_bnk::InstrumentBank;
//!
//! let bank = InstrumentBank::load("standard.bnk")?;
//! if let Some(piano) = bank.find("piano") {
//!     println!("piano uses voice {}", piano.voice_num);
//! }
//! # Ok::<(), ym3812_bnk::BnkError>(())
//! ```

mod error;
mod format;

pub use error::BnkError;
pub use format::{BankEntry, BankRecord, InstrumentBank};

pub type Result<T> = std::result::Result<T, BnkError>;
