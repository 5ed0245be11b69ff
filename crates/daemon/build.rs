// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::env;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

/// Environment variables courierd reads, with their doc lines.
const ENV_VARS: &[(&str, &str)] = &[
    ("COURIER_STATE_DIR", "override the courier state directory"),
    ("XDG_STATE_HOME", "XDG base directory for state data"),
    (
        "RUST_LOG",
        "controls log level filtering (used by tracing-subscriber)",
    ),
];

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let out_dir = match env::var("OUT_DIR") {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("cargo:warning=OUT_DIR not set: {e}");
            std::process::exit(1);
        }
    };

    let mut contents = String::new();
    for (name, doc) in ENV_VARS {
        let _ = writeln!(contents, "/// Environment variable: {doc}.");
        let _ = writeln!(contents, "pub const {name}: &str = \"{name}\";");
    }

    let dest_path = Path::new(&out_dir).join("env_names.rs");
    if let Err(e) = fs::write(&dest_path, contents) {
        eprintln!("cargo:warning=failed to write env_names.rs: {e}");
        std::process::exit(1);
    }
}
