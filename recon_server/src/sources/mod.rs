//! Ledger sources the server can poll.
//!
//! Fetching the live exchange ledger with signed requests is outside this server. Instead, a collector process keeps
//! an export of the account ledger up to date and the server polls that export.
mod json_file;

pub use json_file::FileLedgerSource;
