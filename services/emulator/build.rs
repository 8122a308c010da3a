use std::env;
use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let out_dir = PathBuf::from(env::var("OUT_DIR")?);

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .file_descriptor_set_path(out_dir.join("emulator_descriptor.bin"))
        .compile_protos(
            &[
                "../../proto/invest/v1/common.proto",
                "../../proto/invest/v1/instruments.proto",
                "../../proto/invest/v1/marketdata.proto",
                "../../proto/invest/v1/orders.proto",
                "../../proto/invest/v1/operations.proto",
                "../../proto/invest/v1/users.proto",
            ],
            &["../../proto"],
        )?;

    println!("cargo:rerun-if-changed=../../proto/invest/v1");
    Ok(())
}
