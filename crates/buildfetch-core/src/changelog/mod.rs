//! Change log: what a build picked up, in a durable document.
//!
//! - [`builder`] turns the accept outcome into a [`ChangeReport`]
//! - [`writer`] serializes it to the persisted XML document
//! - [`reader`] parses the document back for report viewers
//!
//! `read_change_log(&write_change_log(&report)?)? == report` holds for
//! every report the builder produces.

pub mod builder;
pub mod model;
pub mod reader;
pub mod writer;

pub use builder::{build_report, change_set_entry, TOO_MANY_CHANGES_THRESHOLD, UNKNOWN_PATH};
pub use model::{
    ChangeDesc, ChangeReport, ChangeSetEntry, ComponentChangeEntry, ModificationKind,
};
pub use reader::{read_change_log, read_change_log_file};
pub use writer::{write_change_log, write_change_log_file, xml_escape};

/// Version attribute of the root element.
pub const FORMAT_VERSION: u32 = 1;

/// Errors reading or writing the change-log document.
#[derive(Debug, thiserror::Error)]
pub enum ChangeLogError {
    #[error("malformed change log: {0}")]
    Malformed(String),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("XML attribute error: {0}")]
    Attr(#[from] quick_xml::events::attributes::AttrError),

    #[error("formatting error: {0}")]
    Format(#[from] std::fmt::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
