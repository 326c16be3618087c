//! In-memory representation of a coreboot CMOS option layout.
//!
//! A [`Layout`] holds the named bit-range entries, the enumerations that
//! give Enum entries their display texts, and the checksum region. It can
//! be loaded from the machine's coreboot table, from a binary option
//! table dump, or from the human-readable text form.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use crate::error::{Error, Result};

mod checksum;
mod entry;
pub(crate) mod table;
mod text;

pub use checksum::ChecksumRegion;
pub use entry::{CmosEntry, EntryKind};

pub(crate) use entry::verify_cmos_op;

/// Where a layout comes from.
#[derive(Debug, Clone, Default)]
pub enum LayoutSource {
    /// Scan the machine's coreboot table from physical memory.
    #[default]
    CorebootTable,
    /// Decode a binary CMOS option table dump.
    BinaryFile(PathBuf),
    /// Parse the human-readable layout form.
    TextFile(PathBuf),
}

impl LayoutSource {
    pub(crate) fn load(&self) -> Result<Layout> {
        match self {
            LayoutSource::CorebootTable => Layout::from_coreboot_table(),
            LayoutSource::BinaryFile(path) => Layout::from_option_table_file(path),
            LayoutSource::TextFile(path) => Layout::from_text_file(path),
        }
    }
}

/// A CMOS enumeration item binding a value to its display text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumItem {
    pub(crate) id: u32,
    pub(crate) value: u64,
    pub(crate) text: String,
}

impl EnumItem {
    /// Create a new enumeration item.
    pub fn new(id: u32, value: u64, text: impl Into<String>) -> Self {
        Self {
            id,
            value,
            text: text.into(),
        }
    }

    /// Enumeration id, matched against entry `config_id`s.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// The stored value.
    pub fn value(&self) -> u64 {
        self.value
    }

    /// The display text.
    pub fn text(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for EnumItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.id, self.value, self.text)
    }
}

/// Bidirectional value/text maps for one enumeration id.
#[derive(Debug, Default)]
struct CmosEnum {
    value_to_text: HashMap<u64, String>,
    text_to_value: HashMap<String, u64>,
}

/// A complete CMOS option layout.
#[derive(Debug)]
pub struct Layout {
    /// Entries sorted by starting bit; no two overlap.
    entries: Vec<CmosEntry>,
    /// Entry name to starting bit.
    names: HashMap<String, u32>,
    enums: HashMap<u32, CmosEnum>,
    checksum: ChecksumRegion,
}

impl Layout {
    /// Create an empty layout with the canonical checksum region.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            names: HashMap::new(),
            enums: HashMap::new(),
            checksum: ChecksumRegion::DEFAULT,
        }
    }

    /// Add an entry, keeping the list sorted by starting bit.
    ///
    /// Rejects entries that fail [`CmosEntry`] validity, reuse a name, or
    /// overlap an existing entry's bit-range.
    pub fn add_entry(&mut self, entry: CmosEntry) -> Result<()> {
        entry::verify_entry(&entry)?;

        if self.names.contains_key(entry.name()) {
            return Err(Error::DuplicateEntry(entry.name().to_string()));
        }

        let pos = self.entries.partition_point(|e| e.bit < entry.bit);

        if pos > 0 {
            let prev = &self.entries[pos - 1];
            if entry.overlaps(prev) {
                return Err(Error::EntryOverlap {
                    entry: entry.to_string(),
                    other: prev.to_string(),
                });
            }
        }

        if let Some(next) = self.entries.get(pos) {
            if entry.overlaps(next) {
                return Err(Error::EntryOverlap {
                    entry: entry.to_string(),
                    other: next.to_string(),
                });
            }
        }

        self.names.insert(entry.name.clone(), entry.bit);
        self.entries.insert(pos, entry);
        Ok(())
    }

    /// The entries sorted by starting bit.
    pub fn entries(&self) -> &[CmosEntry] {
        &self.entries
    }

    /// Look up an entry by parameter name.
    pub fn find_entry(&self, name: &str) -> Option<&CmosEntry> {
        let bit = *self.names.get(name)?;
        let pos = self.entries.partition_point(|e| e.bit < bit);
        self.entries.get(pos)
    }

    /// Add an enumeration item.
    ///
    /// Within one id, both the value and the text must be unique.
    pub fn add_enum_item(&mut self, item: EnumItem) -> Result<()> {
        let cmos_enum = self.enums.entry(item.id).or_default();

        if cmos_enum.value_to_text.contains_key(&item.value)
            || cmos_enum.text_to_value.contains_key(&item.text)
        {
            return Err(Error::DuplicateEnumItem {
                id: item.id,
                value: item.value,
            });
        }

        cmos_enum.value_to_text.insert(item.value, item.text.clone());
        cmos_enum.text_to_value.insert(item.text, item.value);
        Ok(())
    }

    /// The display text for a value of an enumeration id.
    pub fn find_enum_text(&self, id: u32, value: u64) -> Option<&str> {
        self.enums
            .get(&id)?
            .value_to_text
            .get(&value)
            .map(String::as_str)
    }

    /// The stored value for a display text of an enumeration id.
    pub fn find_enum_value(&self, id: u32, text: &str) -> Option<u64> {
        self.enums.get(&id)?.text_to_value.get(text).copied()
    }

    /// All items of one enumeration id, sorted by value.
    pub fn enum_items_by_id(&self, id: u32) -> Option<Vec<EnumItem>> {
        let cmos_enum = self.enums.get(&id)?;

        let mut items: Vec<EnumItem> = cmos_enum
            .value_to_text
            .iter()
            .map(|(&value, text)| EnumItem::new(id, value, text.clone()))
            .collect();
        items.sort_by_key(|item| item.value);
        Some(items)
    }

    /// All enumeration items, sorted by id then value.
    pub fn enum_items(&self) -> Vec<EnumItem> {
        let mut ids: Vec<u32> = self.enums.keys().copied().collect();
        ids.sort_unstable();

        let mut items = Vec::new();
        for id in ids {
            if let Some(for_id) = self.enum_items_by_id(id) {
                items.extend(for_id);
            }
        }
        items
    }

    /// The layout's checksum region.
    pub fn checksum_region(&self) -> ChecksumRegion {
        self.checksum
    }

    pub(crate) fn set_checksum_region(&mut self, region: ChecksumRegion) {
        self.checksum = region;
    }
}

impl Default for Layout {
    fn default() -> Self {
        Self::new()
    }
}
