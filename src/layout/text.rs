//! Parser for the human-readable CMOS layout form.
//!
//! The format is line oriented. Blank lines and `#` comments are
//! ignored. A line with a single token opens a section: `entries`,
//! `enumerations` or `checksums`. Data lines belong to the current
//! section:
//!
//! ```text
//! entries
//! 392 3 e 4 baud_rate
//! 395 4 r 0 reserved_bits
//!
//! enumerations
//! 4 0 115200
//! 4 1 57600
//!
//! checksums
//! checksum 392 1007 1008
//! ```

use std::fmt::Display;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use crate::debug_layout;
use crate::error::{Error, Result};
use crate::layout::{ChecksumRegion, CmosEntry, EntryKind, EnumItem, Layout};

enum Section {
    None,
    Entries,
    Enumerations,
    Checksums,
}

fn parse_error(line: usize, message: impl Display) -> Error {
    Error::Parse {
        line,
        message: message.to_string(),
    }
}

fn parse_field<T: std::str::FromStr>(field: &str, line: usize, what: &str) -> Result<T> {
    field
        .parse()
        .map_err(|_| parse_error(line, format!("unexpected data in {}", what)))
}

impl Layout {
    /// Parse a layout from the text form in a file.
    pub fn from_text_file<P: AsRef<Path>>(path: P) -> Result<Layout> {
        let path = path.as_ref();
        debug_layout!("Reading CMOS layout text file {}", path.display());
        Self::from_text(File::open(path)?)
    }

    /// Parse a layout from the text form.
    pub fn from_text<R: Read>(reader: R) -> Result<Layout> {
        let mut layout = Layout::new();
        let mut section = Section::None;

        for (index, line) in BufReader::new(reader).lines().enumerate() {
            let line = line?;
            let linenum = index + 1;

            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let fields: Vec<&str> = line.split_whitespace().collect();

            // A single token opens a new section.
            if fields.len() == 1 {
                section = match fields[0] {
                    "entries" => Section::Entries,
                    "enumerations" => Section::Enumerations,
                    "checksums" => Section::Checksums,
                    _ => return Err(parse_error(linenum, "unexpected section header")),
                };
                continue;
            }

            match section {
                Section::Entries => {
                    if fields.len() != 5 {
                        return Err(parse_error(linenum, "unexpected data in entries"));
                    }

                    let bit = parse_field(fields[0], linenum, "entries")?;
                    let length = parse_field(fields[1], linenum, "entries")?;

                    let mut chars = fields[2].chars();
                    let kind = match (chars.next(), chars.next()) {
                        (Some(c), None) => EntryKind::from_char(c)
                            .ok_or_else(|| parse_error(linenum, "unexpected config type"))?,
                        _ => return Err(parse_error(linenum, "unexpected data in entries")),
                    };

                    let config_id = parse_field(fields[3], linenum, "entries")?;
                    let entry = CmosEntry::new(bit, length, kind, config_id, fields[4]);

                    layout
                        .add_entry(entry)
                        .map_err(|err| parse_error(linenum, err))?;
                }

                Section::Enumerations => {
                    if fields.len() != 3 {
                        return Err(parse_error(linenum, "unexpected data in enumerations"));
                    }

                    let id = parse_field(fields[0], linenum, "enumerations")?;
                    let value = parse_field(fields[1], linenum, "enumerations")?;

                    layout
                        .add_enum_item(EnumItem::new(id, value, fields[2]))
                        .map_err(|err| parse_error(linenum, err))?;
                }

                Section::Checksums => {
                    if fields.len() != 4 {
                        return Err(parse_error(linenum, "unexpected data in checksums"));
                    }

                    if fields[0] != "checksum" {
                        return Err(parse_error(linenum, "missing checksum label"));
                    }

                    let start = parse_field(fields[1], linenum, "checksums")?;
                    let end = parse_field(fields[2], linenum, "checksums")?;
                    let index = parse_field(fields[3], linenum, "checksums")?;

                    let region = ChecksumRegion::new(start, end, index)
                        .map_err(|err| parse_error(linenum, err))?;
                    layout.set_checksum_region(region);
                }

                Section::None => {
                    return Err(parse_error(linenum, "unexpected data"));
                }
            }
        }

        Ok(layout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# coreboot CMOS layout
entries
392 3 e 4 baud_rate
400 8 h 0 boot_count
408 16 r 0 reserved_bits
432 64 s 0 boot_tag

enumerations
4 0 115200
4 1 57600

checksums
checksum 440 1007 1008
";

    #[test]
    fn test_parse_sample_layout() {
        let layout = Layout::from_text(SAMPLE.as_bytes()).unwrap();

        assert_eq!(layout.entries().len(), 4);

        let baud = layout.find_entry("baud_rate").unwrap();
        assert_eq!(baud.bit(), 392);
        assert_eq!(baud.length(), 3);
        assert_eq!(baud.kind(), EntryKind::Enum);
        assert_eq!(baud.config_id(), 4);

        assert_eq!(layout.find_enum_text(4, 1), Some("57600"));
        assert_eq!(layout.find_enum_value(4, "115200"), Some(0));

        let region = layout.checksum_region();
        assert_eq!(region.start(), 55);
        assert_eq!(region.end(), 125);
        assert_eq!(region.index(), 126);
    }

    #[test]
    fn test_missing_checksums_section_keeps_default() {
        let layout = Layout::from_text("entries\n392 8 h 0 speed\n".as_bytes()).unwrap();
        assert_eq!(layout.checksum_region().start(), 49);
        assert_eq!(layout.checksum_region().index(), 126);
    }

    #[test]
    fn test_unknown_section_header() {
        let err = Layout::from_text("options\n".as_bytes()).unwrap_err();
        assert!(matches!(err, Error::Parse { line: 1, .. }));
    }

    #[test]
    fn test_data_before_any_section() {
        let err = Layout::from_text("392 8 h 0 speed\n".as_bytes()).unwrap_err();
        assert!(matches!(err, Error::Parse { line: 1, .. }));
    }

    #[test]
    fn test_entry_field_count_and_types() {
        let err = Layout::from_text("entries\n392 8 h speed\n".as_bytes()).unwrap_err();
        assert!(matches!(err, Error::Parse { line: 2, .. }));

        let err = Layout::from_text("entries\n392 eight h 0 speed\n".as_bytes()).unwrap_err();
        assert!(matches!(err, Error::Parse { line: 2, .. }));

        let err = Layout::from_text("entries\n392 8 x 0 speed\n".as_bytes()).unwrap_err();
        assert!(matches!(err, Error::Parse { line: 2, .. }));
    }

    #[test]
    fn test_semantic_errors_carry_line_numbers() {
        // Overlap is reported against the offending line.
        let text = "entries\n392 8 h 0 first\n395 4 h 0 second\n";
        let err = Layout::from_text(text.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::Parse { line: 3, .. }));

        // So are duplicate enumeration values.
        let text = "enumerations\n4 0 off\n4 0 on\n";
        let err = Layout::from_text(text.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::Parse { line: 3, .. }));
    }

    #[test]
    fn test_checksum_line_label_required() {
        let err = Layout::from_text("checksums\nsum 392 1007 1008\n".as_bytes()).unwrap_err();
        assert!(matches!(err, Error::Parse { line: 2, .. }));
    }

    #[test]
    fn test_comments_and_blank_lines_skipped() {
        let text = "\n# leading comment\n\nentries\n# inner comment\n392 8 h 0 speed\n";
        let layout = Layout::from_text(text.as_bytes()).unwrap();
        assert!(layout.find_entry("speed").is_some());
    }
}
