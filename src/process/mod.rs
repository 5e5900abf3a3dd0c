// src/process/mod.rs
//! Pure pipeline stages: CSV bytes in, CSV bytes out.

pub mod aggregate;
pub mod format;
pub mod read;
pub mod rename;
pub mod write;

pub use aggregate::{prepare_measures, summarize, Ranked, LOANS_TABLE, TOP_N};
pub use format::{format_number, format_summaries};
pub use read::{load_csv, ReadOptions};
pub use rename::{rename_columns, COLUMN_RENAMES};
pub use write::{encode_csv, write_output, PART_FILE, SUCCESS_MARKER};
