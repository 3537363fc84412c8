//! Build script for regenerating Rust code from protobuf definitions.
//!
//! Generated code is committed under `src/generated/`, so a normal build
//! needs neither protoc nor this script's output. Enable the `codegen`
//! feature to regenerate after editing `proto/provider.proto`.

use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::var_os("CARGO_FEATURE_CODEGEN").is_none() {
        return Ok(());
    }

    let out_dir = PathBuf::from("src/generated");
    std::fs::create_dir_all(&out_dir)?;

    let proto = PathBuf::from("proto/provider.proto");
    println!("cargo:rerun-if-changed={}", proto.display());

    // Client-only build: provider runtimes implement the server side
    // out-of-tree against the same .proto.
    tonic_build::configure()
        .build_server(false)
        .build_client(true)
        .out_dir(&out_dir)
        .compile(&[proto], &[PathBuf::from("proto")])?;

    Ok(())
}
