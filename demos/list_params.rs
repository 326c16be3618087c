//! List all CMOS parameters and their current values.
//!
//! Usage:
//!   list_params [LAYOUT_FILE] [CMOS_IMAGE]
//!
//! With no arguments the machine's coreboot table and NVRAM hardware are
//! used (requires root). A layout file ending in .bin is decoded as a
//! binary option table dump.

use std::process;

use nvram::{EntryKind, Nvram};

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run() -> nvram::Result<()> {
    let args: Vec<String> = std::env::args().collect();

    let mut builder = Nvram::builder();
    if let Some(layout) = args.get(1).filter(|a| !a.is_empty()) {
        builder = builder.layout_file(layout);
    }
    if let Some(image) = args.get(2) {
        builder = builder.cmos_file(image);
    }

    let mut nv = builder.open()?;

    if let Err(err) = nv.validate_checksum() {
        eprintln!("{}", err);
    }

    let entries: Vec<_> = nv.layout().entries().to_vec();
    for entry in entries {
        if entry.kind() == EntryKind::Reserved || entry.name() == "check_sum" {
            continue;
        }
        match nv.read_parameter(entry.name()) {
            Ok(value) => println!("{} = {}", entry.name(), value),
            Err(err) => println!("{} = <{}>", entry.name(), err),
        }
    }

    nv.close()
}
