//! Utility functions for display formatting.

pub mod format;

pub use format::{
    contains_ignore_case, examination_code, format_date, format_thousands, sex_label,
    truncate_string,
};
