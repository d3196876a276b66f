//! Build script compiling the `sensors` gRPC contract.

use std::env;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=proto/sensors.proto");
    println!("cargo:rerun-if-env-changed=PROTOC");

    // Fall back to the vendored protoc when none is installed
    if env::var_os("PROTOC").is_none() {
        env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    }
    if env::var_os("PROTOC_INCLUDE").is_none() {
        env::set_var("PROTOC_INCLUDE", protoc_bin_vendored::include_path()?);
    }

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&["proto/sensors.proto"], &["proto/"])?;

    Ok(())
}
